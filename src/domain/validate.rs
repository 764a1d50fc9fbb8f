use chrono::{Datelike, NaiveDate, NaiveTime};
use thiserror::Error;

pub const LINE_MIN: u8 = 1;
pub const LINE_MAX: u8 = 15;

/// Digits of a ZNP suffix ("D0126-1234" carries four).
pub const ZNP_SUFFIX_LEN: usize = 4;

pub const DATE_FORMAT: &str = "%d.%m.%Y";
pub const TIME_FORMAT: &str = "%H:%M";

/// A field the operator typed did not parse. Always recovered locally by
/// re-prompting the same step; never surfaced as a system error.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("line number must be {LINE_MIN}-{LINE_MAX}")]
    Line,
    #[error("date must match dd.mm.yyyy")]
    Date,
    #[error("time must match hh:mm")]
    Time,
    #[error("meters must be a positive whole number")]
    Meters,
    #[error("ZNP code must be PREFIX-NNNN with a current or previous month prefix")]
    Znp,
}

pub fn parse_line(input: &str) -> Result<u8, ValidationError> {
    let line: u8 = input.trim().parse().map_err(|_| ValidationError::Line)?;
    if (LINE_MIN..=LINE_MAX).contains(&line) {
        Ok(line)
    } else {
        Err(ValidationError::Line)
    }
}

pub fn parse_date(input: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(input.trim(), DATE_FORMAT).map_err(|_| ValidationError::Date)
}

pub fn parse_time(input: &str) -> Result<NaiveTime, ValidationError> {
    let input = input.trim();
    // hh:mm only; chrono alone would also admit "7:30".
    if input.len() != 5 || input.as_bytes()[2] != b':' {
        return Err(ValidationError::Time);
    }
    NaiveTime::parse_from_str(input, TIME_FORMAT).map_err(|_| ValidationError::Time)
}

pub fn parse_meters(input: &str) -> Result<u32, ValidationError> {
    let meters: u32 = input.trim().parse().map_err(|_| ValidationError::Meters)?;
    if meters > 0 {
        Ok(meters)
    } else {
        Err(ValidationError::Meters)
    }
}

fn month_code(date: NaiveDate) -> String {
    date.format("%m%y").to_string()
}

fn previous_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1)
        .and_then(|first| first.pred_opt())
        .unwrap_or(date)
}

/// The four valid ZNP prefixes for a given calendar day:
/// {D,L} x {current month, previous month} in MMYY form.
pub fn znp_prefixes(today: NaiveDate) -> [String; 4] {
    let current = month_code(today);
    let previous = month_code(previous_month(today));
    [
        format!("D{current}"),
        format!("L{current}"),
        format!("D{previous}"),
        format!("L{previous}"),
    ]
}

pub fn is_valid_znp_prefix(prefix: &str, today: NaiveDate) -> bool {
    znp_prefixes(today).iter().any(|valid| valid == prefix)
}

pub fn parse_znp_suffix(input: &str) -> Result<String, ValidationError> {
    let input = input.trim();
    if input.len() == ZNP_SUFFIX_LEN && input.bytes().all(|b| b.is_ascii_digit()) {
        Ok(input.to_string())
    } else {
        Err(ValidationError::Znp)
    }
}

/// Full manually typed ZNP code: 5-char prefix, hyphen, 4 digits.
/// Case-normalized to upper before the prefix check.
pub fn parse_znp_code(input: &str, today: NaiveDate) -> Result<String, ValidationError> {
    let code = input.trim().to_uppercase();
    // The byte-index split below needs ASCII; anything else cannot be a ZNP.
    if !code.is_ascii() || code.len() != 10 {
        return Err(ValidationError::Znp);
    }
    let (prefix, rest) = code.split_at(5);
    let Some(suffix) = rest.strip_prefix('-') else {
        return Err(ValidationError::Znp);
    };
    if !is_valid_znp_prefix(prefix, today) {
        return Err(ValidationError::Znp);
    }
    parse_znp_suffix(suffix)?;
    Ok(code)
}
