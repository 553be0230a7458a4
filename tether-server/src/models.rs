//! Request and response bodies of the control API

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tether_config::TaskDefaults;
use tether_core::{RemoteRequest, TaskDescriptor, TaskId, TaskOptions};

/// Body of `POST /api/v1/tasks`
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTaskRequest {
    #[serde(default)]
    pub task_id: Option<String>,
    pub process_instance_id: String,
    #[serde(default)]
    pub node_name: String,
    pub request: RemoteRequest,
    #[serde(default)]
    pub options: TaskOptionsInput,
    #[serde(default)]
    pub variables: HashMap<String, Value>,
}

/// Per-task overrides; anything left out comes from the service defaults
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskOptionsInput {
    #[serde(default, with = "humantime_serde")]
    pub task_timeout: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    pub cancel_timeout: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    pub heartbeat_timeout: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    pub retry_delay: Option<Duration>,
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub success_eval_expression: Option<String>,
    #[serde(default)]
    pub cancel_url_pointer: Option<String>,
}

impl TaskOptionsInput {
    pub fn resolve(self, defaults: &TaskDefaults) -> TaskOptions {
        let base = TaskOptions::from(defaults);
        TaskOptions {
            task_timeout: self.task_timeout.unwrap_or(base.task_timeout),
            cancel_timeout: self.cancel_timeout.unwrap_or(base.cancel_timeout),
            heartbeat_timeout: self.heartbeat_timeout.unwrap_or(base.heartbeat_timeout),
            retry_delay: self.retry_delay.unwrap_or(base.retry_delay),
            max_retries: self.max_retries.unwrap_or(base.max_retries),
            success_eval_expression: self.success_eval_expression,
            cancel_url_pointer: self.cancel_url_pointer.unwrap_or(base.cancel_url_pointer),
        }
    }
}

impl CreateTaskRequest {
    pub fn into_descriptor(self, defaults: &TaskDefaults) -> TaskDescriptor {
        TaskDescriptor {
            task_id: self.task_id.map(TaskId::from),
            process_instance_id: self.process_instance_id,
            node_name: self.node_name,
            request: self.request,
            options: self.options.resolve(defaults),
            variables: self.variables,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskCreated {
    pub task_id: TaskId,
    pub callback_url: String,
    pub heartbeat_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalAccepted {
    pub task_id: TaskId,
    pub accepted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub active_tasks: usize,
}
