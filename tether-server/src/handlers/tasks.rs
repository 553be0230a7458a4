//! Engine-facing task control

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use tether_core::{TaskId, TaskSnapshot};
use tracing::info;

use crate::{
    app::AppState,
    errors::ServerResult,
    models::{CreateTaskRequest, SignalAccepted, TaskCreated},
};

pub async fn create_task(
    State(state): State<AppState>,
    Json(request): Json<CreateTaskRequest>,
) -> ServerResult<(StatusCode, Json<TaskCreated>)> {
    let orchestrator = &state.orchestrator;
    let descriptor = request.into_descriptor(&orchestrator.config().task_defaults);
    let task_id = orchestrator.start(descriptor)?;

    Ok((
        StatusCode::CREATED,
        Json(TaskCreated {
            callback_url: orchestrator.callback_url(&task_id),
            heartbeat_url: orchestrator.heartbeat_url(&task_id),
            task_id,
        }),
    ))
}

pub async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> ServerResult<Json<TaskSnapshot>> {
    Ok(Json(state.orchestrator.snapshot(&TaskId::from(task_id))?))
}

pub async fn cancel_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> ServerResult<(StatusCode, Json<SignalAccepted>)> {
    let task_id = TaskId::from(task_id);
    info!("Cancel requested for task {}", task_id);
    state.orchestrator.cancel(&task_id)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(SignalAccepted {
            task_id,
            accepted: true,
        }),
    ))
}
