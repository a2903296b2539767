use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use hubsync_engine::SyncError;
use hubsync_store::StoreError;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("HUB_TOKEN is not set")]
    MissingToken,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// The hub is temporarily unreachable.
    #[error("Hub unavailable: {0}")]
    Unavailable(String),

    /// The hub answered with an error.
    #[error("Hub error: {0}")]
    Upstream(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::ChatNotFound(_) | SyncError::MessageNotFound(_) => Self::NotFound(err.to_string()),
            SyncError::Invalid(_) => Self::BadRequest(err.to_string()),
            SyncError::NotRetryable(_) | SyncError::LockLost(_) => Self::Conflict(err.to_string()),
            SyncError::Store(StoreError::NotFound) => Self::NotFound(err.to_string()),
            ref e if e.is_unavailable() => Self::Unavailable(err.to_string()),
            SyncError::Remote(_) => Self::Upstream(err.to_string()),
            SyncError::Store(_) | SyncError::Poisoned => Self::Internal(err.to_string()),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        SyncError::from(err).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, self.to_string()),
            ApiError::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, self.to_string()),
            ApiError::Upstream(_) => (StatusCode::BAD_GATEWAY, self.to_string()),
            ApiError::Internal(detail) => {
                tracing::error!(error = %detail, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use hubsync_remote::RemoteError;

    use super::*;

    #[test]
    fn engine_errors_map_to_statuses() {
        let status = |err: SyncError| ApiError::from(err).into_response().status();

        assert_eq!(status(SyncError::ChatNotFound("!a".into())), StatusCode::NOT_FOUND);
        assert_eq!(status(SyncError::Invalid("empty".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status(SyncError::NotRetryable("$1".into())), StatusCode::CONFLICT);
        assert_eq!(status(SyncError::LockLost("run-1".into())), StatusCode::CONFLICT);
        assert_eq!(
            status(SyncError::Remote(RemoteError::Unavailable("tunnel".into()))),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status(SyncError::Remote(RemoteError::Auth { status: 401 })),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(status(SyncError::Poisoned), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
