//! HTTP error mapping

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tether_core::OrchestratorError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),

    #[error("Bad request: {0}")]
    BadRequest(String),
}

pub type ServerResult<T> = Result<T, ServerError>;

impl ServerError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ServerError::BadRequest(message.into())
    }

    /// Status code and stable error code for the response body
    pub fn classify(&self) -> (StatusCode, &'static str) {
        match self {
            ServerError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ServerError::Orchestrator(err) => match err {
                OrchestratorError::UnknownTask(_) => (StatusCode::NOT_FOUND, "TASK_NOT_FOUND"),
                OrchestratorError::DuplicateTask(_) => (StatusCode::CONFLICT, "DUPLICATE_TASK"),
                OrchestratorError::NotAwaitingCallback { .. } => {
                    (StatusCode::CONFLICT, "NOT_AWAITING_CALLBACK")
                }
                OrchestratorError::AlreadyResolved { .. } => (StatusCode::CONFLICT, "ALREADY_RESOLVED"),
                OrchestratorError::InvalidDescriptor(_) => (StatusCode::BAD_REQUEST, "INVALID_DESCRIPTOR"),
                OrchestratorError::Render(_) => (StatusCode::BAD_REQUEST, "RENDER_FAILED"),
                OrchestratorError::CapacityExceeded { .. } => {
                    (StatusCode::SERVICE_UNAVAILABLE, "CAPACITY_EXCEEDED")
                }
                OrchestratorError::ShuttingDown => (StatusCode::SERVICE_UNAVAILABLE, "SHUTTING_DOWN"),
            },
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, code) = self.classify();
        let body = json!({
            "error": {
                "code": code,
                "message": self.to_string(),
                "status": status.as_u16()
            }
        });
        (status, Json(body)).into_response()
    }
}
