//! Terminal results, error taxonomy and read-only views of a task

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::state::{ReportedStatus, TaskState};
use crate::task::TaskId;

/// Typed failure carried in a task result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskError {
    /// The request never reached the remote (connect, DNS, connect timeout)
    #[error("transport failure: {message}")]
    TransportFailure { message: String },

    /// Dispatch gave up: retries exhausted or the remote rejected the call
    #[error("remote invocation failed after {attempts} attempt(s): {message}")]
    RemoteInvocation {
        attempts: u32,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        status_code: Option<u16>,
    },

    /// The callback payload did not satisfy the success expression
    #[error("application failure: {message}")]
    ApplicationFailure { message: String },

    #[error("task timed out after {after:?}")]
    Timeout {
        #[serde(with = "humantime_serde")]
        after: Duration,
    },

    #[error("remote stopped sending heartbeats for {silent_for:?}")]
    DeadRemote {
        #[serde(with = "humantime_serde")]
        silent_for: Duration,
    },

    #[error("remote acknowledged cancellation (status {status_code})")]
    CancelAcknowledged { status_code: u16 },

    #[error("remote did not acknowledge cancellation: {reason}")]
    CancelUnacknowledged { reason: String },
}

/// Why a task entered cancellation. Captured once, reported on resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelReason {
    pub status: ReportedStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<TaskError>,
}

impl CancelReason {
    /// Explicit cancel signal from the engine
    pub fn requested() -> Self {
        Self {
            status: ReportedStatus::Cancelled,
            cause: None,
        }
    }

    pub fn timed_out(after: Duration) -> Self {
        Self {
            status: ReportedStatus::TimedOut,
            cause: Some(TaskError::Timeout { after }),
        }
    }

    /// A sibling in the same process instance failed its callback
    pub fn sibling_failed(sibling: &TaskId, message: impl Into<String>) -> Self {
        Self {
            status: ReportedStatus::Cancelled,
            cause: Some(TaskError::ApplicationFailure {
                message: format!("sibling task {} failed: {}", sibling, message.into()),
            }),
        }
    }
}

/// Terminal payload, written exactly once
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskError>,

    #[serde(default)]
    pub cancelled: bool,

    #[serde(default)]
    pub remote_cancel_failed: bool,
}

impl TaskResult {
    pub fn completed(payload: serde_json::Value) -> Self {
        Self {
            payload: Some(payload),
            ..Self::default()
        }
    }

    pub fn failed(error: TaskError) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }

    /// Failure that still carries the payload which caused it
    pub fn failed_with_payload(error: TaskError, payload: serde_json::Value) -> Self {
        Self {
            payload: Some(payload),
            error: Some(error),
            ..Self::default()
        }
    }

    pub fn cancel_acknowledged(status_code: u16) -> Self {
        Self {
            error: Some(TaskError::CancelAcknowledged { status_code }),
            cancelled: true,
            ..Self::default()
        }
    }

    /// Local fallback completion after the remote cancel failed or was impossible
    pub fn cancel_unacknowledged(reason: impl Into<String>) -> Self {
        Self {
            error: Some(TaskError::CancelUnacknowledged {
                reason: reason.into(),
            }),
            remote_cancel_failed: true,
            ..Self::default()
        }
    }
}

/// What the engine receives when a task resolves
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskReport {
    pub task_id: TaskId,
    pub process_instance_id: String,
    pub node_name: String,
    pub state: TaskState,
    pub status: ReportedStatus,
    pub result: TaskResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<CancelReason>,
    pub retry_count: u32,
    pub resolved_at: DateTime<Utc>,
}

impl TaskReport {
    pub fn is_success(&self) -> bool {
        self.status == ReportedStatus::Completed
    }
}

/// Point-in-time view of a live task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub task_id: TaskId,
    pub process_instance_id: String,
    pub node_name: String,
    pub state: TaskState,
    pub retry_count: u32,
    pub max_retries: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancel_url: Option<String>,
    /// Time left before the task timeout fires
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub task_timeout_in: Option<Duration>,
    /// Time left before the task is declared dead
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub heartbeat_expires_in: Option<Duration>,
    /// Time left for the remote to acknowledge a cancel
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub cancel_expires_in: Option<Duration>,
    pub created_at: DateTime<Utc>,
}
