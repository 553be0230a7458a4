//! Inbound callbacks and heartbeats from remote services

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::Value;
use tether_core::TaskId;
use tether_orchestrator::HeartbeatAck;
use tracing::debug;

use crate::{
    app::AppState,
    errors::{ServerError, ServerResult},
    models::SignalAccepted,
};

/// An empty body is a callback without payload
fn parse_payload(body: &Bytes) -> ServerResult<Value> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(body)
        .map_err(|e| ServerError::bad_request(format!("callback body is not valid JSON: {}", e)))
}

pub async fn receive_callback(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    body: Bytes,
) -> ServerResult<(StatusCode, Json<SignalAccepted>)> {
    let task_id = TaskId::from(task_id);
    let payload = parse_payload(&body)?;
    debug!("Callback received for task {} ({} bytes)", task_id, body.len());

    state.orchestrator.on_callback(&task_id, payload)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(SignalAccepted {
            task_id,
            accepted: true,
        }),
    ))
}

pub async fn receive_heartbeat(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> ServerResult<(StatusCode, Json<SignalAccepted>)> {
    let task_id = TaskId::from(task_id);
    let (status, accepted) = match state.orchestrator.on_heartbeat(&task_id)? {
        HeartbeatAck::Refreshed => (StatusCode::ACCEPTED, true),
        HeartbeatAck::Ignored => (StatusCode::OK, false),
    };
    Ok((status, Json(SignalAccepted { task_id, accepted })))
}
