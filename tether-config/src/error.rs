//! Configuration error types

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Configuration result type
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while loading or validating a Tether configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid YAML or JSON for the configuration schema
    #[error("Failed to parse config file {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },

    /// A `TETHER_*` override could not be parsed
    #[error("Invalid value for {variable}: {message}")]
    EnvOverride { variable: String, message: String },

    /// A single field failed validation
    #[error("Domain configuration error in {domain}: {message}")]
    DomainError { domain: String, message: String },

    /// Liveness would only be checked after a task is already overdue
    #[error(
        "heartbeat_scan_interval ({interval:?}) must be shorter than the default heartbeat_timeout ({heartbeat_timeout:?})"
    )]
    ScanSlowerThanHeartbeat {
        interval: Duration,
        heartbeat_timeout: Duration,
    },
}
