//! Task state machine

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a remote task.
///
/// States only move forward; see [`TaskState::can_transition_to`].
/// `Completed`, `Failed`, `Died`, `CancelSucceeded` and `CancelTimedOut`
/// are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Pending,
    Sending,
    RetryPending,
    AwaitingCallback,
    TimedOut,
    CancelRequested,
    Completed,
    Failed,
    Died,
    CancelSucceeded,
    CancelTimedOut,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Died | Self::CancelSucceeded | Self::CancelTimedOut
        )
    }

    pub fn can_transition_to(&self, next: Self) -> bool {
        if *self == next {
            return false;
        }

        match self {
            Self::Pending => matches!(next, Self::Sending | Self::CancelRequested),
            Self::Sending => matches!(
                next,
                Self::RetryPending
                    | Self::AwaitingCallback
                    | Self::Failed
                    | Self::Completed
                    | Self::CancelRequested
            ),
            Self::RetryPending => matches!(next, Self::Sending | Self::CancelRequested),
            Self::AwaitingCallback => matches!(
                next,
                Self::Completed
                    | Self::Failed
                    | Self::TimedOut
                    | Self::Died
                    | Self::CancelRequested
            ),
            Self::TimedOut => matches!(next, Self::CancelRequested),
            Self::CancelRequested => matches!(
                next,
                Self::CancelSucceeded | Self::CancelTimedOut | Self::Completed | Self::Failed
            ),
            Self::Completed
            | Self::Failed
            | Self::Died
            | Self::CancelSucceeded
            | Self::CancelTimedOut => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Sending => "SENDING",
            Self::RetryPending => "RETRY_PENDING",
            Self::AwaitingCallback => "AWAITING_CALLBACK",
            Self::TimedOut => "TIMED_OUT",
            Self::CancelRequested => "CANCEL_REQUESTED",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Died => "DIED",
            Self::CancelSucceeded => "CANCEL_SUCCEEDED",
            Self::CancelTimedOut => "CANCEL_TIMED_OUT",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status reported to the engine alongside the terminal result. For the
/// two cancel outcomes this is the reason captured when cancellation began.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportedStatus {
    Completed,
    Failed,
    Died,
    TimedOut,
    Cancelled,
}

impl fmt::Display for ReportedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Died => "DIED",
            Self::TimedOut => "TIMED_OUT",
            Self::Cancelled => "CANCELLED",
        };
        f.write_str(s)
    }
}
