//! Router setup

use axum::{
    routing::{get, post},
    Router,
};
use tether_orchestrator::Orchestrator;
use tower_http::trace::TraceLayer;

use crate::handlers;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Orchestrator,
}

impl AppState {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self { orchestrator }
    }
}

/// Build the complete application router
pub fn create_app(state: AppState, enable_tracing: bool) -> Router {
    let app = Router::new()
        .route("/health", get(handlers::health::health_check))
        // Remote-service facing endpoints
        .route("/callback/{task_id}", post(handlers::signals::receive_callback))
        .route("/heartbeat/{task_id}", post(handlers::signals::receive_heartbeat))
        // Engine facing control API
        .nest("/api/v1", create_api_router())
        .with_state(state);

    if enable_tracing {
        app.layer(TraceLayer::new_for_http())
    } else {
        app
    }
}

fn create_api_router() -> Router<AppState> {
    Router::new()
        .route("/tasks", post(handlers::tasks::create_task))
        .route("/tasks/{task_id}", get(handlers::tasks::get_task))
        .route("/tasks/{task_id}/cancel", post(handlers::tasks::cancel_task))
}
