//! Shared building blocks for sluice: property files and configuration.

pub mod config;
pub mod properties;

pub use config::{Config, ConfigError, LOG_FILE_NAME, LogConfig, LogRotation};
pub use properties::{PROPERTIES_EXTENSION, Properties, PropertiesError};
