use crate::app::AppError;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub telegram_token: String,
    pub db_path: String,
    pub http_bind: String,
    /// Public base URL for webhook registration; when unset the webhook is
    /// assumed to be configured out of band.
    pub public_url: Option<String>,
    pub session_timeout_secs: u64,
    pub sweep_interval_secs: u64,
    pub cache_ttl_secs: u64,
    pub time_offset_hours: i64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let telegram_token = lookup("TELEGRAM_TOKEN")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| AppError::config("TELEGRAM_TOKEN is required"))?;

        Ok(Self {
            telegram_token,
            db_path: lookup("DB_PATH")
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| "/var/lib/shiftlog/shiftlog.db".to_string()),
            http_bind: lookup("HTTP_BIND")
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            public_url: lookup("PUBLIC_URL")
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
            session_timeout_secs: parse_or_default(&lookup, "SESSION_TIMEOUT_SECS", 600_u64)?,
            sweep_interval_secs: parse_or_default(&lookup, "SWEEP_INTERVAL_SECS", 30_u64)?,
            cache_ttl_secs: parse_or_default(&lookup, "CACHE_TTL_SECS", 300_u64)?,
            time_offset_hours: parse_or_default(&lookup, "TIME_OFFSET_HOURS", 3_i64)?,
        })
    }
}

fn parse_or_default<T, F>(lookup: &F, key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr + Copy,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| AppError::config(format!("{key} must be a valid number"))),
        None => Ok(default),
    }
}
