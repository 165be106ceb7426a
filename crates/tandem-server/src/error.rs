use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tandem_store::StoreError;
use thiserror::Error;

/// Every outcome the engine reports to a caller.
///
/// All variants except `Store` and `Internal` are expected, typed results
/// that clients act on.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Daily limit of {limit} swipes reached")]
    LimitReached { limit: u32 },

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conversation expired")]
    Expired,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Stable machine-readable code sent alongside the message.
    pub fn code(&self) -> &'static str {
        match self {
            ServerError::Unauthorized => "unauthorized",
            ServerError::InvalidOperation(_) => "invalid_operation",
            ServerError::Validation(_) => "validation_error",
            ServerError::Conflict(_) => "conflict",
            ServerError::LimitReached { .. } => "limit_reached",
            ServerError::Forbidden(_) => "forbidden",
            ServerError::Expired => "expired",
            ServerError::NotFound(_) => "not_found",
            ServerError::Store(_) => "storage_error",
            ServerError::Internal(_) => "internal_error",
        }
    }

    /// SQLite lock contention; safe to retry for idempotent operations.
    pub fn is_transient(&self) -> bool {
        matches!(self, ServerError::Store(e) if e.is_transient())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::Unauthorized => StatusCode::UNAUTHORIZED,
            ServerError::InvalidOperation(_) | ServerError::Validation(_) => {
                StatusCode::BAD_REQUEST
            }
            ServerError::Conflict(_) => StatusCode::CONFLICT,
            ServerError::LimitReached { .. } => StatusCode::TOO_MANY_REQUESTS,
            ServerError::Forbidden(_) => StatusCode::FORBIDDEN,
            ServerError::Expired => StatusCode::GONE,
            ServerError::NotFound(_) => StatusCode::NOT_FOUND,
            ServerError::Store(_) | ServerError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ServerError::Store(e) => {
                tracing::error!(error = %e, "storage failure");
                "Internal server error".to_string()
            }
            ServerError::Internal(e) => {
                tracing::error!(error = %e, "internal failure");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let mut body = serde_json::json!({
            "error": message,
            "code": self.code(),
        });
        if let ServerError::LimitReached { limit } = self {
            body["limit_reached"] = serde_json::Value::Bool(true);
            body["limit"] = serde_json::Value::from(limit);
        }

        (status, axum::Json(body)).into_response()
    }
}
