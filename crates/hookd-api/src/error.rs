//! API error handling.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use hookd_scheduler::QueueError;
use serde_json::json;

/// API error type.
#[derive(Debug)]
pub enum ApiError {
    /// The job queue is at capacity.
    QueueFull(String),
    /// The daemon is shutting down and takes no new work.
    ShuttingDown,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::QueueFull(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::ShuttingDown => (
                StatusCode::SERVICE_UNAVAILABLE,
                "shutting down".to_string(),
            ),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

impl From<QueueError> for ApiError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::Full { .. } => ApiError::QueueFull(err.to_string()),
            QueueError::Closed => ApiError::ShuttingDown,
        }
    }
}
