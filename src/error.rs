//! Error types shared by the engine, the storage layer and the HTTP routes.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Failure reported by a [`Storage`](crate::storage::Storage) implementation.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A database error from sqlx.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored value could not be mapped back into a model.
    #[error("Unreadable stored value: {0}")]
    Decode(String),

    /// The call did not finish inside the configured bound.
    #[error("Storage call `{op}` timed out after {timeout_ms} ms")]
    Timeout { op: &'static str, timeout_ms: u64 },
}

/// Domain-level error surfaced to callers of the service.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Missing or malformed input, rejected before evaluation.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Persistence failed; the current operation was aborted.
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
}

/// Convenience type alias for handler and orchestrator return values.
pub type CoreResult<T> = Result<T, CoreError>;

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            CoreError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
            }
            CoreError::NotFound { .. } => (StatusCode::NOT_FOUND, "NOT_FOUND", self.to_string()),
            CoreError::Storage(err) => {
                tracing::error!(error = %err, "Storage error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "STORAGE_ERROR",
                    err.to_string(),
                )
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}
