use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// The main error type for billsync
#[derive(Debug, thiserror::Error)]
pub enum BillsyncError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, BillsyncError>;

impl BillsyncError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn service_unavailable(msg: impl Into<String>) -> Self {
        Self::ServiceUnavailable(msg.into())
    }

    /// The HTTP status code this error maps to.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) | Self::Anyhow(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Whether the caller should retry the request later.
    ///
    /// Webhook providers redeliver on 5xx responses, so server-side failures
    /// are retryable while validation failures are not.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Internal(_) | Self::ServiceUnavailable(_) | Self::Anyhow(_)
        )
    }
}

/// Standard error response format for API errors.
#[derive(Serialize)]
pub struct ErrorResponse {
    error: String,
}

impl IntoResponse for BillsyncError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Don't leak internal details in 5xx responses
        let message = if status.is_server_error() {
            tracing::error!(target: "billsync", error = %self, "request failed");
            status
                .canonical_reason()
                .unwrap_or("Internal server error")
                .to_string()
        } else {
            self.to_string()
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            BillsyncError::not_found("x").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            BillsyncError::bad_request("x").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            BillsyncError::internal("x").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            BillsyncError::service_unavailable("x").status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_retryable_classification() {
        assert!(!BillsyncError::bad_request("invalid signature").is_retryable());
        assert!(BillsyncError::service_unavailable("store down").is_retryable());
        assert!(BillsyncError::internal("oops").is_retryable());
    }

    #[test]
    fn test_display() {
        let err = BillsyncError::bad_request("missing header");
        assert_eq!(err.to_string(), "Bad request: missing header");
    }
}
