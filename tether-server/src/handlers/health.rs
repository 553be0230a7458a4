use axum::{extract::State, Json};

use crate::{app::AppState, models::HealthResponse};

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let status = if state.orchestrator.is_shutting_down() {
        "shutting_down"
    } else {
        "ok"
    };
    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        active_tasks: state.orchestrator.active_tasks(),
    })
}
