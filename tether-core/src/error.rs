//! Facade-level errors returned to callers of the orchestrator

use thiserror::Error;

use crate::state::TaskState;
use crate::task::TaskId;

/// Result type alias for orchestrator operations
pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Errors returned by orchestrator entry points. None of these ever reach
/// the engine as a task outcome.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OrchestratorError {
    /// No live task with this id (never existed, or already resolved and removed)
    #[error("Task not found: {0}")]
    UnknownTask(TaskId),

    #[error("Task already exists: {0}")]
    DuplicateTask(TaskId),

    #[error("Invalid task descriptor: {0}")]
    InvalidDescriptor(String),

    #[error("Task {task_id} is not awaiting a callback (state {state})")]
    NotAwaitingCallback { task_id: TaskId, state: TaskState },

    /// The task reached a terminal state before this signal could apply
    #[error("Task already resolved: {task_id} ({state})")]
    AlreadyResolved { task_id: TaskId, state: TaskState },

    #[error("Failed to render request: {0}")]
    Render(String),

    #[error("Too many active tasks (limit {limit})")]
    CapacityExceeded { limit: usize },

    #[error("Orchestrator is shutting down")]
    ShuttingDown,
}

impl OrchestratorError {
    /// Whether the error reports a late or duplicate signal that was absorbed
    pub fn is_absorbed_signal(&self) -> bool {
        matches!(
            self,
            Self::UnknownTask(_) | Self::AlreadyResolved { .. } | Self::NotAwaitingCallback { .. }
        )
    }
}
