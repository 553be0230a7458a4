//! Task descriptor and per-task options

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tether_config::TaskDefaults;
use tether_http::HttpMethod;
use uuid::Uuid;

use crate::error::OrchestratorError;

/// Engine-assigned task identifier (newtype pattern for type safety)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Create a new random task ID
    pub fn generate() -> Self {
        TaskId(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for TaskId {
    fn from(id: String) -> Self {
        TaskId(id)
    }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self {
        TaskId(id.to_string())
    }
}

/// Outbound call description. Header values and the body template may
/// contain `${name}` placeholders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRequest {
    pub url: String,

    #[serde(default)]
    pub method: HttpMethod,

    #[serde(default)]
    pub headers: HashMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_template: Option<String>,
}

impl RemoteRequest {
    pub fn post(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: HttpMethod::Post,
            headers: HashMap::new(),
            body_template: None,
        }
    }

    pub fn with_body_template(mut self, template: impl Into<String>) -> Self {
        self.body_template = Some(template.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// Per-task timing and retry options. Zero `task_timeout` or
/// `heartbeat_timeout` disables that check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskOptions {
    #[serde(with = "humantime_serde")]
    pub task_timeout: Duration,

    #[serde(with = "humantime_serde")]
    pub cancel_timeout: Duration,

    #[serde(with = "humantime_serde")]
    pub heartbeat_timeout: Duration,

    #[serde(with = "humantime_serde")]
    pub retry_delay: Duration,

    pub max_retries: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub success_eval_expression: Option<String>,

    pub cancel_url_pointer: String,
}

impl Default for TaskOptions {
    fn default() -> Self {
        Self::from(&TaskDefaults::default())
    }
}

impl From<&TaskDefaults> for TaskOptions {
    fn from(defaults: &TaskDefaults) -> Self {
        Self {
            task_timeout: defaults.task_timeout,
            cancel_timeout: defaults.cancel_timeout,
            heartbeat_timeout: defaults.heartbeat_timeout,
            retry_delay: defaults.retry_delay,
            max_retries: defaults.max_retries,
            success_eval_expression: None,
            cancel_url_pointer: defaults.cancel_url_pointer.clone(),
        }
    }
}

impl TaskOptions {
    pub fn task_timeout_enabled(&self) -> bool {
        !self.task_timeout.is_zero()
    }

    pub fn heartbeat_enabled(&self) -> bool {
        !self.heartbeat_timeout.is_zero()
    }

    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = timeout;
        self
    }

    pub fn with_cancel_timeout(mut self, timeout: Duration) -> Self {
        self.cancel_timeout = timeout;
        self
    }

    pub fn with_heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.heartbeat_timeout = timeout;
        self
    }

    pub fn with_retries(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_delay = retry_delay;
        self
    }

    pub fn with_success_expression(mut self, expression: impl Into<String>) -> Self {
        self.success_eval_expression = Some(expression.into());
        self
    }
}

/// Everything the engine hands over when it starts a remote task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    /// Engine-supplied id; generated when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,

    pub process_instance_id: String,

    #[serde(default)]
    pub node_name: String,

    pub request: RemoteRequest,

    #[serde(default)]
    pub options: TaskOptions,

    /// Process-scoped variables available to the request renderer
    #[serde(default)]
    pub variables: HashMap<String, serde_json::Value>,
}

impl TaskDescriptor {
    pub fn new(process_instance_id: impl Into<String>, request: RemoteRequest) -> Self {
        Self {
            task_id: None,
            process_instance_id: process_instance_id.into(),
            node_name: String::new(),
            request,
            options: TaskOptions::default(),
            variables: HashMap::new(),
        }
    }

    pub fn with_task_id(mut self, task_id: impl Into<TaskId>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    pub fn with_node_name(mut self, node_name: impl Into<String>) -> Self {
        self.node_name = node_name.into();
        self
    }

    pub fn with_options(mut self, options: TaskOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.variables.insert(name.into(), value);
        self
    }

    /// Structural validation; the success expression is checked by the
    /// orchestrator when it compiles it.
    pub fn validate(&self) -> Result<(), OrchestratorError> {
        let invalid = |msg: String| Err(OrchestratorError::InvalidDescriptor(msg));

        if let Some(id) = &self.task_id {
            if id.as_str().trim().is_empty() {
                return invalid("task_id cannot be empty".to_string());
            }
        }
        if self.process_instance_id.trim().is_empty() {
            return invalid("process_instance_id cannot be empty".to_string());
        }

        match url::Url::parse(&self.request.url) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
            Ok(parsed) => {
                return invalid(format!(
                    "request url scheme '{}' not allowed (only http/https)",
                    parsed.scheme()
                ))
            }
            Err(e) => return invalid(format!("request url '{}' is invalid: {}", self.request.url, e)),
        }

        if self.options.cancel_timeout.is_zero() {
            return invalid("cancel_timeout must be greater than zero".to_string());
        }
        let pointer = &self.options.cancel_url_pointer;
        if !pointer.is_empty() && !pointer.starts_with('/') {
            return invalid(format!("cancel_url_pointer '{}' is not a JSON pointer", pointer));
        }

        Ok(())
    }
}
