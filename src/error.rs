//! Categorized errors for the authenticated endpoints.
//!
//! [`ServiceError`] carries the callable-protocol status a client can
//! branch on. It renders as `{"error": {"status": ..., "message": ...}}`
//! with the matching HTTP status code.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Error envelope returned to callable clients.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Canonical status name, e.g. `INVALID_ARGUMENT`.
    pub status: &'static str,
    pub message: String,
}

/// Failure categories surfaced to callers.
///
/// | Variant              | status                | HTTP |
/// |----------------------|-----------------------|------|
/// | `Unauthenticated`    | `UNAUTHENTICATED`     | 401  |
/// | `InvalidArgument`    | `INVALID_ARGUMENT`    | 400  |
/// | `FailedPrecondition` | `FAILED_PRECONDITION` | 400  |
/// | `AlreadyExists`      | `ALREADY_EXISTS`      | 409  |
/// | `Internal`           | `INTERNAL`            | 500  |
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ServiceError {
    #[error("the caller must be authenticated")]
    Unauthenticated,

    #[error("{0}")]
    InvalidArgument(String),

    #[error("{0}")]
    FailedPrecondition(String),

    #[error("{0}")]
    AlreadyExists(String),

    #[error("{0}")]
    Internal(String),
}

impl ServiceError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Canonical status name.
    pub const fn status(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::InvalidArgument(_) => "INVALID_ARGUMENT",
            Self::FailedPrecondition(_) => "FAILED_PRECONDITION",
            Self::AlreadyExists(_) => "ALREADY_EXISTS",
            Self::Internal(_) => "INTERNAL",
        }
    }

    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::InvalidArgument(_) | Self::FailedPrecondition(_) => StatusCode::BAD_REQUEST,
            Self::AlreadyExists(_) => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: ErrorBody {
                status: self.status(),
                message: self.to_string(),
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}
