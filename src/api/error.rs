use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::fmt;

use super::ApiResponse;
use crate::services::AuthError;

/// Transport-facing error taxonomy. Domain errors convert into exactly one
/// of these at the handler boundary; sensitive identifiers never appear in
/// the messages.
#[derive(Debug)]
pub enum ApiError {
    InvalidArgument(String),

    Unauthenticated(String),

    PermissionDenied(String),

    NotFound(String),

    AlreadyExists(String),

    FailedPrecondition(String),

    ResourceExhausted(String),

    DeadlineExceeded(String),

    Internal(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument(msg) => write!(f, "Invalid argument: {msg}"),
            Self::Unauthenticated(msg) => write!(f, "Unauthenticated: {msg}"),
            Self::PermissionDenied(msg) => write!(f, "Permission denied: {msg}"),
            Self::NotFound(msg) => write!(f, "Not found: {msg}"),
            Self::AlreadyExists(msg) => write!(f, "Already exists: {msg}"),
            Self::FailedPrecondition(msg) => write!(f, "Failed precondition: {msg}"),
            Self::ResourceExhausted(msg) => write!(f, "Resource exhausted: {msg}"),
            Self::DeadlineExceeded(msg) => write!(f, "Deadline exceeded: {msg}"),
            Self::Internal(msg) => write!(f, "Internal error: {msg}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::InvalidArgument(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Unauthenticated(msg) => (StatusCode::UNAUTHORIZED, msg),
            Self::PermissionDenied(msg) => (StatusCode::FORBIDDEN, msg),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::AlreadyExists(msg) => (StatusCode::CONFLICT, msg),
            Self::FailedPrecondition(msg) => (StatusCode::PRECONDITION_FAILED, msg),
            Self::ResourceExhausted(msg) => (StatusCode::TOO_MANY_REQUESTS, msg),
            Self::DeadlineExceeded(msg) => (StatusCode::GONE, msg),
            Self::Internal(msg) => {
                tracing::error!("Internal error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = ApiResponse::<()>::error(message);
        (status, Json(body)).into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidArgument(msg) => Self::InvalidArgument(msg),
            AuthError::Unauthenticated(msg) => Self::Unauthenticated(msg),
            AuthError::PermissionDenied(msg) => Self::PermissionDenied(msg),
            AuthError::NotFound(msg) => Self::NotFound(msg),
            AuthError::AlreadyExists(msg) => Self::AlreadyExists(msg),
            AuthError::FailedPrecondition(msg) => Self::FailedPrecondition(msg),
            AuthError::ResourceExhausted(msg) => Self::ResourceExhausted(msg),
            AuthError::DeadlineExceeded(msg) => Self::DeadlineExceeded(msg),
            AuthError::Internal(msg) => Self::Internal(msg),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!(error = ?err, "Internal Server Error");
        Self::Internal("An unexpected internal error occurred".to_string())
    }
}

impl ApiError {
    #[must_use]
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    #[must_use]
    pub fn unauthenticated(msg: impl Into<String>) -> Self {
        Self::Unauthenticated(msg.into())
    }

    #[must_use]
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}
