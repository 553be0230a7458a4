//! Orchestrator configuration

use crate::error::{ConfigError, ConfigResult};
use crate::validation::{validate_non_zero_duration, validate_positive, validate_url, Validatable};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Orchestrator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// How often the heartbeat monitor scans the registry
    #[serde(with = "humantime_serde", default = "default_heartbeat_scan_interval")]
    pub heartbeat_scan_interval: Duration,

    /// Public base URL the remote service uses to reach the callback and
    /// heartbeat endpoints
    #[serde(default = "default_callback_base_url")]
    pub callback_base_url: String,

    /// Upper bound on concurrently tracked tasks
    #[serde(default = "default_max_active_tasks")]
    pub max_active_tasks: usize,

    /// Defaults applied to tasks that do not carry their own options
    #[serde(default)]
    pub task_defaults: TaskDefaults,
}

/// Per-task option defaults. A zero `task_timeout` or `heartbeat_timeout`
/// disables the corresponding check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskDefaults {
    #[serde(with = "humantime_serde")]
    pub task_timeout: Duration,

    #[serde(with = "humantime_serde", default = "default_cancel_timeout")]
    pub cancel_timeout: Duration,

    #[serde(with = "humantime_serde")]
    pub heartbeat_timeout: Duration,

    #[serde(with = "humantime_serde", default = "default_retry_delay")]
    pub retry_delay: Duration,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// JSON pointer locating the cancel URL in the dispatch response
    #[serde(default = "default_cancel_url_pointer")]
    pub cancel_url_pointer: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            heartbeat_scan_interval: default_heartbeat_scan_interval(),
            callback_base_url: default_callback_base_url(),
            max_active_tasks: default_max_active_tasks(),
            task_defaults: TaskDefaults::default(),
        }
    }
}

impl Default for TaskDefaults {
    fn default() -> Self {
        Self {
            task_timeout: Duration::ZERO,
            cancel_timeout: default_cancel_timeout(),
            heartbeat_timeout: Duration::ZERO,
            retry_delay: default_retry_delay(),
            max_retries: default_max_retries(),
            cancel_url_pointer: default_cancel_url_pointer(),
        }
    }
}

impl Validatable for OrchestratorConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_non_zero_duration(
            self.heartbeat_scan_interval,
            "heartbeat_scan_interval",
            self.domain_name(),
        )?;
        validate_url(&self.callback_base_url, "callback_base_url", self.domain_name())?;
        validate_positive(self.max_active_tasks, "max_active_tasks", self.domain_name())?;

        self.task_defaults.validate()?;

        let heartbeat_timeout = self.task_defaults.heartbeat_timeout;
        if !heartbeat_timeout.is_zero() && self.heartbeat_scan_interval >= heartbeat_timeout {
            return Err(ConfigError::ScanSlowerThanHeartbeat {
                interval: self.heartbeat_scan_interval,
                heartbeat_timeout,
            });
        }

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "orchestrator"
    }
}

impl Validatable for TaskDefaults {
    fn validate(&self) -> ConfigResult<()> {
        validate_non_zero_duration(self.cancel_timeout, "cancel_timeout", self.domain_name())?;

        if !self.cancel_url_pointer.is_empty() && !self.cancel_url_pointer.starts_with('/') {
            return Err(self.validation_error(format!(
                "cancel_url_pointer must be empty or a JSON pointer starting with '/', got '{}'",
                self.cancel_url_pointer
            )));
        }

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "orchestrator.task_defaults"
    }
}

fn default_heartbeat_scan_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_callback_base_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_max_active_tasks() -> usize {
    10_000
}

fn default_cancel_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_retry_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_retries() -> u32 {
    3
}

fn default_cancel_url_pointer() -> String {
    "/cancelUrl".to_string()
}
