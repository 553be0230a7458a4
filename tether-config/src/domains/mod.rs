//! Domain-specific configuration modules

pub mod http;
pub mod logging;
pub mod orchestrator;
pub mod server;
pub mod utils;

use crate::error::ConfigResult;
use crate::validation::Validatable;
use serde::{Deserialize, Serialize};

/// Main Tether configuration combining all domains
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TetherConfig {
    /// Orchestrator behaviour and per-task defaults
    #[serde(default)]
    pub orchestrator: orchestrator::OrchestratorConfig,

    /// Outbound HTTP client configuration
    #[serde(default)]
    pub http: http::HttpConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: logging::LoggingConfig,

    /// Server configuration (optional, for the standalone service)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<server::ServerConfig>,
}

impl TetherConfig {
    /// Validate all domain configurations
    pub fn validate_all(&self) -> ConfigResult<()> {
        self.orchestrator.validate()?;
        self.http.validate()?;
        self.logging.validate()?;

        if let Some(ref server) = self.server {
            server.validate()?;
        }

        Ok(())
    }

    /// Server configuration, falling back to defaults when the section is absent
    pub fn server_or_default(&self) -> server::ServerConfig {
        self.server.clone().unwrap_or_default()
    }

    /// Generate a sample configuration file
    pub fn generate_sample() -> String {
        let config = TetherConfig {
            server: Some(server::ServerConfig::default()),
            ..TetherConfig::default()
        };
        serde_yaml::to_string(&config)
            .unwrap_or_else(|_| "# Failed to generate sample config".to_string())
    }
}
