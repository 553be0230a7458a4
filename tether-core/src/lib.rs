//! Core domain model for Tether
//!
//! This crate defines the language shared by the orchestrator and its
//! hosts: task descriptors and options, the task state machine, terminal
//! results and their error taxonomy, and the seams to the surrounding
//! workflow engine ([`TaskObserver`]) and to request rendering
//! ([`RequestRenderer`]).

pub mod error;
pub mod observer;
pub mod render;
pub mod result;
pub mod state;
pub mod task;

// Re-export commonly used types at the crate root
pub use error::{OrchestratorError, Result};
pub use observer::{NoopObserver, ObserverSet, TaskObserver};
pub use render::{RenderContext, RenderError, RequestRenderer};
pub use result::{CancelReason, TaskError, TaskReport, TaskResult, TaskSnapshot};
pub use state::{ReportedStatus, TaskState};
pub use task::{RemoteRequest, TaskDescriptor, TaskId, TaskOptions};

pub use tether_http::HttpMethod;
