//! Tracing subscriber setup for hosts that do not install their own.

use tracing::level_filters::LevelFilter;
use tracing::info;

/// Maps `off|error|warn|info|debug|trace` (case-insensitive) to a filter.
pub fn parse_log_level(level: &str) -> Result<LevelFilter, String> {
    match level.to_ascii_lowercase().as_str() {
        "off" => Ok(LevelFilter::OFF),
        "error" => Ok(LevelFilter::ERROR),
        "warn" => Ok(LevelFilter::WARN),
        "info" => Ok(LevelFilter::INFO),
        "debug" => Ok(LevelFilter::DEBUG),
        "trace" => Ok(LevelFilter::TRACE),
        other => Err(format!(
            "Invalid log level '{}', expected one of off, error, warn, info, debug, trace",
            other
        )),
    }
}

/// Installs a global fmt subscriber at `level`.
///
/// Fails if the level is unknown or a global subscriber is already set.
pub fn init_logging(level: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = parse_log_level(level)?;

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Logging initialized with level: {}", filter);
    Ok(())
}
