//! Mapping of failures to HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::{error, warn};

use crate::storage::StorageError;

/// An error returned by a REST handler. Rendered as a plain-text body
/// carrying the message.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Log a storage failure under `context` and classify it.
    pub fn from_storage(context: &str, e: StorageError) -> Self {
        if e.is_not_found() {
            warn!(error = %e, "{}", context);
            return ApiError::NotFound(e.to_string());
        }
        if e.is_invalid_input() {
            warn!(error = %e, "{}", context);
            return ApiError::BadRequest(e.to_string());
        }
        if let StorageError::AmbiguousSegment { .. } = e {
            warn!(error = %e, "{}", context);
            return ApiError::Conflict(format!("{}; pass createdAt to select one", e));
        }
        error!(error = %e, "{}", context);
        ApiError::Internal(e.to_string())
    }

    /// Log a rejected request and build the 400 response.
    pub fn bad_request(context: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        warn!(error = %message, "{}", context);
        ApiError::BadRequest(message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}
