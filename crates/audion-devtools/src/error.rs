//! Error types for the devtools service.
//!
//! [`DevtoolsError`] is the stream-level error: it travels as the `Err` item
//! of event and graph streams, and one failure fans out to every open
//! partition, so it is `Clone` and carries rendered messages rather than
//! source errors. [`ApiError`] is the HTTP-facing error and implements
//! `axum::response::IntoResponse` to produce structured JSON responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Failures of the debugger connection and the pipeline built on it.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DevtoolsError {
    /// A command was sent while no debugger session is attached.
    #[error("debugger is not attached")]
    NotAttached,

    /// Connecting to, writing to, or reading from the debugger failed.
    #[error("debugger transport error: {0}")]
    Transport(String),

    /// The debugger answered a command with an error object.
    #[error("{method} failed ({code}): {message}")]
    Command {
        method: String,
        code: i64,
        message: String,
    },

    /// The debugger did not answer a command in time.
    #[error("{method} timed out")]
    Timeout { method: String },

    /// An event subscriber fell behind and events were dropped.
    #[error("event stream lagged, {0} events dropped")]
    Lagged(u64),

    /// A debugger event could not be folded into the graph model.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl DevtoolsError {
    /// Errors after which a stream keeps going: some events were lost or
    /// could not be read, but the session itself is fine.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, DevtoolsError::Lagged(_) | DevtoolsError::Protocol(_))
    }
}

impl From<audion_core::CoreError> for DevtoolsError {
    fn from(err: audion_core::CoreError) -> Self {
        DevtoolsError::Protocol(err.to_string())
    }
}

impl From<audion_transfer::TransferError> for DevtoolsError {
    fn from(err: audion_transfer::TransferError) -> Self {
        DevtoolsError::Protocol(err.to_string())
    }
}

/// Structured error detail in API responses.
#[derive(Debug, Clone, Serialize)]
pub struct ApiErrorDetail {
    /// Machine-readable error code (e.g., "NOT_FOUND", "CONFLICT").
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

/// API errors with HTTP status code mapping.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Entity not found (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// Invalid request (400).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Request conflicts with the debugger state (409).
    #[error("conflict: {0}")]
    Conflict(String),

    /// The debugger did not answer (504).
    #[error("gateway timeout: {0}")]
    GatewayTimeout(String),

    /// Internal server error (500).
    #[error("internal error: {0}")]
    InternalError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::GatewayTimeout(msg) => {
                (StatusCode::GATEWAY_TIMEOUT, "GATEWAY_TIMEOUT", msg)
            }
            ApiError::InternalError(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg)
            }
        };

        let body = serde_json::json!({
            "success": false,
            "error": ApiErrorDetail {
                code: code.to_string(),
                message,
            },
        });

        (status, axum::Json(body)).into_response()
    }
}

impl From<DevtoolsError> for ApiError {
    fn from(err: DevtoolsError) -> Self {
        match &err {
            DevtoolsError::NotAttached => ApiError::Conflict(err.to_string()),
            DevtoolsError::Timeout { .. } => ApiError::GatewayTimeout(err.to_string()),
            DevtoolsError::Command { .. } => ApiError::BadRequest(err.to_string()),
            DevtoolsError::Transport(_)
            | DevtoolsError::Lagged(_)
            | DevtoolsError::Protocol(_) => ApiError::InternalError(err.to_string()),
        }
    }
}
