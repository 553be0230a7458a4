//! Configuration loading and environment variable handling

use crate::domains::TetherConfig;
use crate::error::{ConfigError, ConfigResult};
use humantime_serde::re::humantime;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Configuration loader with environment variable support
pub struct ConfigLoader {
    /// Environment variable prefix
    prefix: String,
}

impl ConfigLoader {
    /// Create a new config loader with default prefix
    pub fn new() -> Self {
        Self {
            prefix: "TETHER".to_string(),
        }
    }

    /// Create a new config loader with custom prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Load configuration from a YAML or JSON file with environment overrides
    pub fn from_file(&self, path: impl AsRef<Path>) -> ConfigResult<TetherConfig> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let parsed: Result<TetherConfig, String> = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::from_str(&content).map_err(|e| e.to_string()),
            _ => serde_yaml::from_str(&content).map_err(|e| e.to_string()),
        };
        let mut config: TetherConfig = parsed.map_err(|message| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        })?;

        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env(&self) -> ConfigResult<TetherConfig> {
        let mut config = TetherConfig::default();
        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;
        Ok(config)
    }

    /// Load configuration with fallback chain
    pub fn load(&self, config_path: Option<impl AsRef<Path>>) -> ConfigResult<TetherConfig> {
        match config_path {
            Some(path) => self.from_file(path),
            None => self.from_env(),
        }
    }

    fn apply_env_overrides(&self, config: &mut TetherConfig) -> ConfigResult<()> {
        self.apply_orchestrator_overrides(&mut config.orchestrator)?;
        self.apply_http_overrides(&mut config.http)?;
        self.apply_logging_overrides(&mut config.logging)?;

        // Any server variable materialises the server section
        if config.server.is_none() && self.has_server_overrides() {
            config.server = Some(Default::default());
        }
        if let Some(ref mut server) = config.server {
            self.apply_server_overrides(server)?;
        }

        Ok(())
    }

    fn apply_orchestrator_overrides(
        &self,
        config: &mut crate::domains::orchestrator::OrchestratorConfig,
    ) -> ConfigResult<()> {
        if let Some(interval) = self.env_duration("HEARTBEAT_SCAN_INTERVAL")? {
            config.heartbeat_scan_interval = interval;
        }

        if let Ok(base) = self.get_env_var("CALLBACK_BASE_URL") {
            config.callback_base_url = base;
        }

        if let Some(max) = self.env_parse::<usize>("MAX_ACTIVE_TASKS")? {
            config.max_active_tasks = max;
        }

        let defaults = &mut config.task_defaults;
        if let Some(timeout) = self.env_duration("TASK_TIMEOUT")? {
            defaults.task_timeout = timeout;
        }
        if let Some(timeout) = self.env_duration("CANCEL_TIMEOUT")? {
            defaults.cancel_timeout = timeout;
        }
        if let Some(timeout) = self.env_duration("HEARTBEAT_TIMEOUT")? {
            defaults.heartbeat_timeout = timeout;
        }
        if let Some(delay) = self.env_duration("RETRY_DELAY")? {
            defaults.retry_delay = delay;
        }
        if let Some(retries) = self.env_parse::<u32>("MAX_RETRIES")? {
            defaults.max_retries = retries;
        }

        Ok(())
    }

    fn apply_http_overrides(
        &self,
        config: &mut crate::domains::http::HttpConfig,
    ) -> ConfigResult<()> {
        if let Some(timeout) = self.env_duration("HTTP_TIMEOUT")? {
            config.timeout = timeout;
        }

        if let Ok(user_agent) = self.get_env_var("HTTP_USER_AGENT") {
            config.user_agent = user_agent;
        }

        if let Some(verify_ssl) = self.env_parse::<bool>("HTTP_VERIFY_SSL")? {
            config.verify_ssl = verify_ssl;
        }

        Ok(())
    }

    fn apply_logging_overrides(
        &self,
        config: &mut crate::domains::logging::LoggingConfig,
    ) -> ConfigResult<()> {
        if let Ok(log_level) = self.get_env_var("LOG_LEVEL") {
            config.level = crate::domains::logging::LogLevel::from_str(&log_level)
                .map_err(|_| self.env_error("LOG_LEVEL", format!("unknown level '{}'", log_level)))?;
        }

        if let Ok(format) = self.get_env_var("LOG_FORMAT") {
            config.format = crate::domains::logging::LogFormat::from_str(&format)
                .map_err(|_| self.env_error("LOG_FORMAT", format!("unknown format '{}'", format)))?;
        }

        if let Ok(filter) = self.get_env_var("LOG_FILTER") {
            config.filter = Some(filter);
        }

        Ok(())
    }

    fn apply_server_overrides(
        &self,
        config: &mut crate::domains::server::ServerConfig,
    ) -> ConfigResult<()> {
        if let Ok(bind) = self.get_env_var("SERVER_BIND_ADDRESS") {
            config.bind_address = bind;
        }

        if let Some(port) = self.env_parse::<u16>("SERVER_PORT")? {
            config.port = port;
        }

        if let Ok(url) = self.get_env_var("ENGINE_WEBHOOK_URL") {
            config.engine_webhook_url = Some(url);
        }

        Ok(())
    }

    fn has_server_overrides(&self) -> bool {
        ["SERVER_BIND_ADDRESS", "SERVER_PORT", "ENGINE_WEBHOOK_URL"]
            .iter()
            .any(|name| self.get_env_var(name).is_ok())
    }

    /// Durations accept humantime strings (`30s`, `1m 30s`) or bare seconds
    fn env_duration(&self, name: &str) -> ConfigResult<Option<Duration>> {
        let Ok(raw) = self.get_env_var(name) else {
            return Ok(None);
        };

        if let Ok(seconds) = raw.trim().parse::<u64>() {
            return Ok(Some(Duration::from_secs(seconds)));
        }

        humantime::parse_duration(raw.trim())
            .map(Some)
            .map_err(|e| self.env_error(name, e))
    }

    fn env_parse<T>(&self, name: &str) -> ConfigResult<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get_env_var(name) {
            Ok(raw) => raw
                .trim()
                .parse()
                .map(Some)
                .map_err(|e| self.env_error(name, e)),
            Err(_) => Ok(None),
        }
    }

    fn env_error(&self, name: &str, message: impl std::fmt::Display) -> ConfigError {
        ConfigError::EnvOverride {
            variable: format!("{}_{}", self.prefix, name),
            message: message.to_string(),
        }
    }

    /// Get environment variable with prefix
    fn get_env_var(&self, name: &str) -> Result<String, std::env::VarError> {
        std::env::var(format!("{}_{}", self.prefix, name))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
