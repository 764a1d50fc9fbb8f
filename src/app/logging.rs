use tracing_subscriber::{EnvFilter, fmt};

use crate::app::AppError;

/// Used when RUST_LOG is unset: everything at info, our own dialog and store
/// spans at debug so a stuck conversation can be traced in place.
const DEFAULT_FILTER: &str = "info,shiftlog_bot=debug";

pub fn init() -> Result<(), AppError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(AppError::logging_init)
}
