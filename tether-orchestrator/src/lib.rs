//! Tether orchestration engine
//!
//! Dispatches long-running calls to remote services, tracks their liveness
//! while the calling process waits, and resolves each one exactly once:
//! callback completion, caller cancellation, timeout-driven cancellation,
//! exhausted retries, or a missing heartbeat.
//!
//! [`Orchestrator`] is the facade. The components it wires together are
//! public so hosts can test or recompose them.

pub mod callback;
pub mod cancellation;
pub mod dispatcher;
pub mod heartbeat;
pub mod orchestrator;
pub mod predicate;
pub mod record;
pub mod registry;
pub mod render;
pub mod resolver;
pub mod timeout;

pub use callback::CallbackReceiver;
pub use cancellation::CancellationCoordinator;
pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use heartbeat::{HeartbeatAck, HeartbeatMonitor};
pub use orchestrator::{Orchestrator, OrchestratorBuilder};
pub use predicate::{PredicateError, SuccessPredicate};
pub use record::RemoteTaskRecord;
pub use registry::TaskRegistry;
pub use render::PlaceholderRenderer;
pub use resolver::Resolver;
pub use timeout::TimeoutEnforcer;
