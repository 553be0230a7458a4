//! Domain-driven configuration management for Tether
//!
//! Configuration is split by functional domain (orchestrator, outbound HTTP,
//! logging, server), each with its own defaults and validation. Values are
//! read from YAML and may be overridden by `TETHER_*` environment variables.

pub mod error;
pub mod loader;
pub mod validation;

pub mod domains;

pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;

pub use domains::{
    http::HttpConfig,
    logging::{LogFormat, LogLevel, LoggingConfig},
    orchestrator::{OrchestratorConfig, TaskDefaults},
    server::ServerConfig,
    TetherConfig,
};
