mod config;
mod error;
mod logging;
mod runtime;

pub use error::AppError;

pub fn run() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    logging::init()?;

    let config = config::AppConfig::from_env()?;

    tracing::info!(
        db_path = %config.db_path,
        http_bind = %config.http_bind,
        session_timeout_secs = config.session_timeout_secs,
        sweep_interval_secs = config.sweep_interval_secs,
        cache_ttl_secs = config.cache_ttl_secs,
        time_offset_hours = config.time_offset_hours,
        "application bootstrap initialized"
    );

    runtime::run(config)
}
