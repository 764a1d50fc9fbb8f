/// Button captions shared by the keyboards and the engine's input matching.
pub mod labels {
    pub const START_STOP: &str = "Start/Stop";
    pub const DEFECT: &str = "Defect";
    pub const NEW_RECORD: &str = "New record";
    pub const CANCEL_LAST: &str = "Cancel last record";
    pub const BACK: &str = "Back";
    pub const ABORT: &str = "Cancel";
    pub const OTHER: &str = "Other";
    pub const OTHER_DATE: &str = "Other date";
    pub const OTHER_TIME: &str = "Other time";
    pub const START: &str = "Start";
    pub const STOP: &str = "Stop";
    pub const NO_DEFECT: &str = "No defect";
    pub const CONFIRM_CANCEL: &str = "Yes, cancel it";
    pub const KEEP_RECORD: &str = "No, keep it";
    pub const APPROVE: &str = "Approve";
    pub const REJECT: &str = "Reject";
}

use labels::*;

use crate::domain::command::ApprovalCommand;
use crate::domain::models::Role;

/// Transport-agnostic keyboard description. The Telegram adapter renders it
/// into reply_markup JSON.
#[derive(Debug, Clone, PartialEq)]
pub enum Keyboard {
    Reply {
        rows: Vec<Vec<String>>,
        one_time: bool,
        placeholder: Option<String>,
    },
    Inline { rows: Vec<Vec<InlineButton>> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct InlineButton {
    pub label: String,
    pub data: String,
}

impl Keyboard {
    pub fn reply(rows: Vec<Vec<&str>>) -> Self {
        Keyboard::Reply {
            rows: rows
                .into_iter()
                .map(|row| row.into_iter().map(str::to_string).collect())
                .collect(),
            one_time: false,
            placeholder: None,
        }
    }

    pub fn inline(rows: Vec<Vec<InlineButton>>) -> Self {
        Keyboard::Inline { rows }
    }
}

pub fn main_menu() -> Keyboard {
    Keyboard::reply(vec![vec![START_STOP, DEFECT]])
}

pub fn flow_menu() -> Keyboard {
    Keyboard::reply(vec![vec![NEW_RECORD], vec![CANCEL_LAST], vec![BACK]])
}

pub fn abort_only() -> Keyboard {
    Keyboard::reply(vec![vec![ABORT]])
}

/// Numeric grid for the line number, 1-15 plus abort.
pub fn line_pad() -> Keyboard {
    Keyboard::Reply {
        rows: vec![
            (1..=5).map(|n: u8| n.to_string()).collect(),
            (6..=10).map(|n: u8| n.to_string()).collect(),
            (11..=15).map(|n: u8| n.to_string()).collect(),
            vec![ABORT.to_string()],
        ],
        one_time: true,
        placeholder: Some("Line number 1\u{2013}15".to_string()),
    }
}

/// Phone-style digit pad used for the ZNP suffix and the meter count.
pub fn digit_pad(placeholder: &str) -> Keyboard {
    Keyboard::Reply {
        rows: vec![
            vec!["1".into(), "2".into(), "3".into()],
            vec!["4".into(), "5".into(), "6".into()],
            vec!["7".into(), "8".into(), "9".into()],
            vec!["0".into(), ABORT.to_string()],
        ],
        one_time: true,
        placeholder: Some(placeholder.to_string()),
    }
}

pub fn date_choices(today: &str, yesterday: &str) -> Keyboard {
    Keyboard::reply(vec![vec![today, yesterday], vec![OTHER_DATE, ABORT]])
}

pub fn time_choices(quick: &[String; 4]) -> Keyboard {
    Keyboard::reply(vec![
        vec![quick[0].as_str(), quick[1].as_str(), OTHER_TIME],
        vec![quick[2].as_str(), quick[3].as_str(), ABORT],
    ])
}

pub fn action_choices() -> Keyboard {
    Keyboard::reply(vec![vec![START, STOP], vec![ABORT]])
}

pub fn znp_prefix_choices(prefixes: &[String; 4]) -> Keyboard {
    Keyboard::reply(vec![
        vec![prefixes[0].as_str(), prefixes[1].as_str()],
        vec![prefixes[2].as_str(), prefixes[3].as_str()],
        vec![OTHER, ABORT],
    ])
}

/// A cached pick list (stop reasons, defect types) chunked two per row, with
/// the extra free-text choices appended and an abort row at the bottom.
pub fn pick_list(items: &[String], extras: &[&str]) -> Keyboard {
    let all: Vec<String> = items
        .iter()
        .cloned()
        .chain(extras.iter().map(|extra| extra.to_string()))
        .collect();
    let mut rows: Vec<Vec<String>> = all.chunks(2).map(<[String]>::to_vec).collect();
    rows.push(vec![ABORT.to_string()]);
    Keyboard::Reply {
        rows,
        one_time: false,
        placeholder: None,
    }
}

pub fn confirm_cancel() -> Keyboard {
    Keyboard::reply(vec![vec![CONFIRM_CANCEL, KEEP_RECORD]])
}

/// Inline approve/reject pair sent to approvers with a registration request.
pub fn approval_request(target: i64) -> Keyboard {
    Keyboard::inline(vec![vec![
        InlineButton {
            label: APPROVE.to_string(),
            data: ApprovalCommand::Approve { target }.encode(),
        },
        InlineButton {
            label: REJECT.to_string(),
            data: ApprovalCommand::Reject { target }.encode(),
        },
    ]])
}

/// One inline button per role the approver is allowed to hand out.
pub fn role_choices(target: i64, grantable: &[Role]) -> Keyboard {
    Keyboard::inline(vec![
        grantable
            .iter()
            .map(|role| InlineButton {
                label: role.title().to_string(),
                data: ApprovalCommand::SetRole {
                    target,
                    role: *role,
                }
                .encode(),
            })
            .collect(),
    ])
}

#[cfg(test)]
mod tests {
    use super::{Keyboard, labels, line_pad, pick_list};

    fn rows(keyboard: &Keyboard) -> &Vec<Vec<String>> {
        match keyboard {
            Keyboard::Reply { rows, .. } => rows,
            Keyboard::Inline { .. } => panic!("expected reply keyboard"),
        }
    }

    #[test]
    fn line_pad_offers_every_line_once() {
        let keyboard = line_pad();
        let flat: Vec<&String> = rows(&keyboard).iter().flatten().collect();
        for n in 1..=15 {
            assert_eq!(
                flat.iter().filter(|label| ***label == n.to_string()).count(),
                1,
                "line {n}"
            );
        }
        assert!(flat.iter().any(|label| *label == labels::ABORT));
    }

    #[test]
    fn pick_list_chunks_pairs_and_appends_extras() {
        let items = vec!["Stains".to_string(), "Tears".to_string(), "Holes".to_string()];
        let keyboard = pick_list(&items, &[labels::OTHER, labels::NO_DEFECT]);
        let rows = rows(&keyboard);

        assert_eq!(rows[0], vec!["Stains", "Tears"]);
        assert_eq!(rows[1], vec!["Holes", labels::OTHER]);
        assert_eq!(rows[2], vec![labels::NO_DEFECT]);
        assert_eq!(rows[3], vec![labels::ABORT]);
    }

    #[test]
    fn pick_list_on_empty_cache_still_offers_extras() {
        let keyboard = pick_list(&[], &[labels::OTHER]);
        let rows = rows(&keyboard);
        assert_eq!(rows[0], vec![labels::OTHER]);
        assert_eq!(rows[1], vec![labels::ABORT]);
    }
}
