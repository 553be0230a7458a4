//! Tether standalone service
//!
//! Hosts an [`Orchestrator`](tether_orchestrator::Orchestrator) behind an
//! axum router: the inbound callback and heartbeat endpoints used by remote
//! services, and a small control API used by the engine.

pub mod app;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod observer;
pub mod startup;

pub use app::{create_app, AppState};
pub use errors::{ServerError, ServerResult};
pub use observer::{LoggingObserver, WebhookObserver};
pub use startup::Server;
