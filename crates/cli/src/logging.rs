//! Logging setup for the daemon

use sluice_core::{LOG_FILE_NAME, LogConfig, LogRotation};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, filter::LevelFilter};

/// Parse log level from config string
fn parse_log_level(level: &str) -> LevelFilter {
  match level.to_lowercase().as_str() {
    "off" => LevelFilter::OFF,
    "error" => LevelFilter::ERROR,
    "warn" => LevelFilter::WARN,
    "info" => LevelFilter::INFO,
    "debug" => LevelFilter::DEBUG,
    "trace" => LevelFilter::TRACE,
    _ => LevelFilter::INFO,
  }
}

/// Initialize logging from the `log_*` settings.
///
/// Without `log_dir`: logs to the console with colors.
/// With `log_dir`: logs to a rolling file only (no ANSI).
///
/// Returns the guard that must be kept alive for the duration of the program
pub fn init_logging(config: &LogConfig) -> Option<WorkerGuard> {
  // Build env filter (allows RUST_LOG override)
  let env_filter = EnvFilter::builder()
    .with_default_directive(parse_log_level(&config.level).into())
    .from_env_lossy();

  let Some(log_dir) = &config.dir else {
    init_console(env_filter);
    return None;
  };

  if let Err(e) = std::fs::create_dir_all(log_dir) {
    // Fall back to console-only logging
    init_console(env_filter);
    tracing::warn!(path = %log_dir.display(), error = %e, "Failed to create log directory, logging to console");
    return None;
  }

  let file_appender = match config.rotation {
    LogRotation::Hourly => tracing_appender::rolling::hourly(log_dir, LOG_FILE_NAME),
    LogRotation::Daily => tracing_appender::rolling::daily(log_dir, LOG_FILE_NAME),
    LogRotation::Never => tracing_appender::rolling::never(log_dir, LOG_FILE_NAME),
  };

  let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

  tracing_subscriber::fmt()
    .with_env_filter(env_filter)
    .with_target(true)
    .with_ansi(false)
    .with_writer(file_writer)
    .init();

  Some(guard)
}

fn init_console(env_filter: EnvFilter) {
  tracing_subscriber::fmt()
    .with_env_filter(env_filter)
    .with_target(true)
    .with_ansi(true)
    .init();
}
