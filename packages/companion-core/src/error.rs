//! Centralized error types for the companion core library.
//!
//! This module provides a unified error handling system that:
//! - Defines structured error types using `thiserror`
//! - Maps errors to appropriate HTTP status codes
//! - Implements `IntoResponse` for automatic JSON error responses
//!
//! Subsystem errors (`FetchError`, `NotifyError`, ...) live next to the code
//! that raises them and are re-exported here.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

pub use crate::api::ServerError;
pub use crate::notifier::NotifyError;
pub use crate::player::PlayerError;
pub use crate::playlist::{ContainerKeyError, DispatchError, FetchError};
pub use crate::registration::RegistrationError;

/// Trait for error types that provide machine-readable error codes.
pub trait ErrorCode {
    /// Returns a machine-readable error code for API responses and logs.
    fn code(&self) -> &'static str;
}

impl ErrorCode for FetchError {
    fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized => "fetch_unauthorized",
            Self::Unavailable(_) => "fetch_unavailable",
            Self::Http(_) => "http_request_failed",
            Self::HttpStatus(_) => "http_error_status",
            Self::Parse(_) => "play_queue_parse_error",
            Self::NotConfigured => "server_not_configured",
        }
    }
}

impl ErrorCode for NotifyError {
    fn code(&self) -> &'static str {
        match self {
            Self::Http(_) => "http_request_failed",
            Self::Rejected(_) => "timeline_rejected",
        }
    }
}

impl ErrorCode for PlayerError {
    fn code(&self) -> &'static str {
        match self {
            Self::Unavailable(_) => "player_unavailable",
            Self::InvalidStart(_) => "invalid_start_position",
        }
    }
}

/// Application-wide error type surfaced by the HTTP layer.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum CompanionError {
    /// Controller sent an invalid or malformed request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The task queue is at capacity; the controller should retry.
    #[error("Task queue is full")]
    QueueFull,

    /// The coordinator has stopped and no longer accepts tasks.
    #[error("Companion is shutting down")]
    ShuttingDown,

    /// The local player rejected a command.
    #[error("Player error: {0}")]
    Player(String),

    /// Configuration rejected at startup.
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CompanionError {
    /// Returns a machine-readable error code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::QueueFull => "queue_full",
            Self::ShuttingDown => "shutting_down",
            Self::Player(_) => "player_error",
            Self::Configuration(_) => "invalid_configuration",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Maps the error to an appropriate HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::QueueFull | Self::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Convenient Result alias for request-level operations.
pub type CompanionResult<T> = Result<T, CompanionError>;

/// JSON response body for error responses.
#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
    status: u16,
}

impl IntoResponse for CompanionError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: self.code(),
            message: self.to_string(),
            status: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<PlayerError> for CompanionError {
    fn from(err: PlayerError) -> Self {
        Self::Player(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_full_maps_to_service_unavailable() {
        let err = CompanionError::QueueFull;
        assert_eq!(err.code(), "queue_full");
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn invalid_request_maps_to_bad_request() {
        let err = CompanionError::InvalidRequest("missing offset".into());
        assert_eq!(err.code(), "invalid_request");
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn player_error_converts_with_message() {
        let err: CompanionError = PlayerError::Unavailable("no device".into()).into();
        assert_eq!(err.code(), "player_error");
        assert!(err.to_string().contains("no device"));
    }

    #[test]
    fn fetch_unauthorized_has_stable_code() {
        assert_eq!(FetchError::Unauthorized.code(), "fetch_unauthorized");
    }
}
