//! Top-level configuration for the sluice daemon.
//!
//! The configuration file is a property file (see [`crate::properties`]) with
//! three required directory keys and a handful of optional tuning keys:
//!
//! ```text
//! ingest_dir = /data/ingest
//! work_dir = /data/work
//! processor_definitions_dir = /etc/sluice/processors
//! ingest_min_age = 300
//! ```

use std::{
  path::{Path, PathBuf},
  time::Duration,
};

use crate::properties::{Properties, PropertiesError};

// ============================================================================
// Defaults
// ============================================================================

/// Minimum age of a dropped pair before it is claimed (5 minutes)
pub const DEFAULT_INGEST_MIN_AGE_SECS: u64 = 300;

/// Age after which work-area entries are swept (2 days)
pub const DEFAULT_WORK_AGE_OFF_SECS: u64 = 172_800;

/// Interval between scans of the top-level ingest directory
pub const DEFAULT_INGEST_INTERVAL_SECS: u64 = 30;

/// Interval between processor registry rebuilds (5 minutes)
pub const DEFAULT_REGISTRY_REFRESH_INTERVAL_SECS: u64 = 300;

pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_LOG_ROTATION: &str = "daily";
pub const DEFAULT_LOG_RETENTION_DAYS: u64 = 7;

/// Base name of the rolling log file; rotated files carry a date suffix
pub const LOG_FILE_NAME: &str = "sluice.log";

// ============================================================================
// Errors
// ============================================================================

/// Errors raised while loading or validating the configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
  #[error(transparent)]
  Properties(#[from] PropertiesError),

  #[error("{0} missing from config file")]
  MissingKey(&'static str),

  #[error("{key} must be a non-negative integer number of seconds, got {value:?}")]
  InvalidSeconds { key: &'static str, value: String },

  #[error("{key} must be at least 1 second")]
  ZeroInterval { key: &'static str },

  #[error("{key} must be one of {allowed}, got {value:?}")]
  InvalidChoice {
    key: &'static str,
    allowed: &'static str,
    value: String,
  },

  #[error("{key} does not exist at {}", .path.display())]
  MissingDirectory { key: &'static str, path: PathBuf },

  #[error("{key} is not a directory: {}", .path.display())]
  NotADirectory { key: &'static str, path: PathBuf },
}

// ============================================================================
// Logging Configuration
// ============================================================================

/// How the rolling log file is split
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogRotation {
  Hourly,
  #[default]
  Daily,
  Never,
}

impl std::str::FromStr for LogRotation {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_lowercase().as_str() {
      "hourly" => Ok(LogRotation::Hourly),
      "daily" => Ok(LogRotation::Daily),
      "never" => Ok(LogRotation::Never),
      _ => Err(format!("Invalid log rotation: {}", s)),
    }
  }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
  /// Default level filter: "error", "warn", "info", "debug", "trace"
  /// Default: "info" (RUST_LOG overrides)
  pub level: String,

  /// Directory for the rolling log file; console logging when unset
  pub dir: Option<PathBuf>,

  /// Log file rotation
  /// Default: daily
  pub rotation: LogRotation,

  /// Maximum rotated log file age in days (0 = keep forever)
  /// Default: 7
  pub retention_days: u64,
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      level: DEFAULT_LOG_LEVEL.to_string(),
      dir: None,
      rotation: LogRotation::Daily,
      retention_days: DEFAULT_LOG_RETENTION_DAYS,
    }
  }
}

// ============================================================================
// Config
// ============================================================================

/// Fully parsed daemon configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
  /// Top-level drop directory, scanned periodically and never removed
  pub ingest_dir: PathBuf,

  /// Minimum age of both files of a pair before the top-level scan claims it
  pub ingest_min_age: Duration,

  /// Shared work area for claim, input and output directories
  pub work_dir: PathBuf,

  /// Work-area entries older than this are removed (zero disables the sweep)
  pub work_age_off: Duration,

  /// Root directory holding one subdirectory per processor definition
  pub processor_definitions_dir: PathBuf,

  /// Interval between top-level ingest scans
  pub ingest_interval: Duration,

  /// Interval between processor registry rebuilds
  pub registry_refresh_interval: Duration,

  pub log: LogConfig,
}

impl Config {
  /// Read, parse and validate a configuration file.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let properties = Properties::load(path)?;
    let config = Self::from_properties(&properties)?;
    config.validate()?;
    Ok(config)
  }

  /// Build a configuration from already-parsed properties.
  ///
  /// This does not touch the filesystem; see [`Config::validate`].
  pub fn from_properties(properties: &Properties) -> Result<Self, ConfigError> {
    let ingest_dir = required_path(properties, "ingest_dir")?;
    let work_dir = required_path(properties, "work_dir")?;
    let processor_definitions_dir = required_path(properties, "processor_definitions_dir")?;

    let ingest_min_age = seconds(properties, "ingest_min_age", DEFAULT_INGEST_MIN_AGE_SECS)?;
    let work_age_off = seconds(properties, "work_age_off", DEFAULT_WORK_AGE_OFF_SECS)?;
    let ingest_interval = non_zero_seconds(properties, "ingest_interval", DEFAULT_INGEST_INTERVAL_SECS)?;
    let registry_refresh_interval = non_zero_seconds(
      properties,
      "registry_refresh_interval",
      DEFAULT_REGISTRY_REFRESH_INTERVAL_SECS,
    )?;

    let log = LogConfig {
      level: parse_log_level(properties)?,
      dir: properties.get("log_dir").filter(|v| !v.is_empty()).map(PathBuf::from),
      rotation: match properties.get("log_rotation") {
        Some(value) => value.parse().map_err(|_| ConfigError::InvalidChoice {
          key: "log_rotation",
          allowed: "daily, hourly, never",
          value: value.to_string(),
        })?,
        None => LogRotation::default(),
      },
      retention_days: match properties.get("log_retention_days") {
        Some(value) => value.parse().map_err(|_| ConfigError::InvalidChoice {
          key: "log_retention_days",
          allowed: "a non-negative integer",
          value: value.to_string(),
        })?,
        None => DEFAULT_LOG_RETENTION_DAYS,
      },
    };

    Ok(Self {
      ingest_dir,
      ingest_min_age,
      work_dir,
      work_age_off,
      processor_definitions_dir,
      ingest_interval,
      registry_refresh_interval,
      log,
    })
  }

  /// Check that every configured directory exists and is a directory.
  pub fn validate(&self) -> Result<(), ConfigError> {
    check_dir("ingest_dir", &self.ingest_dir)?;
    check_dir("work_dir", &self.work_dir)?;
    check_dir("processor_definitions_dir", &self.processor_definitions_dir)?;
    Ok(())
  }
}

fn required_path(properties: &Properties, key: &'static str) -> Result<PathBuf, ConfigError> {
  match properties.get(key) {
    Some(value) if !value.is_empty() => Ok(PathBuf::from(value)),
    _ => Err(ConfigError::MissingKey(key)),
  }
}

fn seconds(properties: &Properties, key: &'static str, default: u64) -> Result<Duration, ConfigError> {
  let Some(value) = properties.get(key) else {
    return Ok(Duration::from_secs(default));
  };

  value
    .parse::<u64>()
    .map(Duration::from_secs)
    .map_err(|_| ConfigError::InvalidSeconds {
      key,
      value: value.to_string(),
    })
}

fn non_zero_seconds(properties: &Properties, key: &'static str, default: u64) -> Result<Duration, ConfigError> {
  let duration = seconds(properties, key, default)?;
  if duration.is_zero() {
    return Err(ConfigError::ZeroInterval { key });
  }
  Ok(duration)
}

fn parse_log_level(properties: &Properties) -> Result<String, ConfigError> {
  let Some(value) = properties.get("log_level") else {
    return Ok(DEFAULT_LOG_LEVEL.to_string());
  };

  let level = value.to_lowercase();
  match level.as_str() {
    "off" | "error" | "warn" | "info" | "debug" | "trace" => Ok(level),
    _ => Err(ConfigError::InvalidChoice {
      key: "log_level",
      allowed: "off, error, warn, info, debug, trace",
      value: value.to_string(),
    }),
  }
}

fn check_dir(key: &'static str, path: &Path) -> Result<(), ConfigError> {
  if !path.exists() {
    return Err(ConfigError::MissingDirectory {
      key,
      path: path.to_path_buf(),
    });
  }
  if !path.is_dir() {
    return Err(ConfigError::NotADirectory {
      key,
      path: path.to_path_buf(),
    });
  }
  Ok(())
}
