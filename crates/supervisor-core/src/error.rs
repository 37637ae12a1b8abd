//! Centralized error types for the playback supervisor core library.
//!
//! This module provides a unified error handling system that:
//! - Defines structured error types using `thiserror`
//! - Maps errors to appropriate HTTP status codes
//! - Implements `IntoResponse` for automatic JSON error responses

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Trait for error types that provide machine-readable error codes.
///
/// Implement this trait to provide consistent error codes across different
/// error conversion paths.
pub trait ErrorCode {
    /// Returns a machine-readable error code for API responses.
    fn code(&self) -> &'static str;
}

/// Errors from the host RPC transport (reconnect, call, process launch).
#[derive(Debug, Error)]
pub enum HostRpcError {
    /// The underlying transport is not connected.
    #[error("host not connected")]
    NotConnected,

    /// The RPC call timed out.
    #[error("host RPC call timed out after {0}s")]
    Timeout(u64),

    /// The host returned an RPC-level error.
    #[error("host RPC error: {0}")]
    Rpc(String),

    /// The underlying HTTP/WebSocket transport failed.
    #[error("host transport error: {0}")]
    Transport(String),

    /// A response could not be decoded into the expected shape.
    #[error("malformed host response: {0}")]
    MalformedResponse(String),

    /// Launching the host process failed.
    #[error("failed to launch host process: {0}")]
    LaunchFailed(String),
}

impl ErrorCode for HostRpcError {
    fn code(&self) -> &'static str {
        match self {
            Self::NotConnected => "host_not_connected",
            Self::Timeout(_) => "host_rpc_timeout",
            Self::Rpc(_) => "host_rpc_error",
            Self::Transport(_) => "host_transport_error",
            Self::MalformedResponse(_) => "host_malformed_response",
            Self::LaunchFailed(_) => "host_launch_failed",
        }
    }
}

/// Errors from the player duplex-socket transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No player is currently connected.
    #[error("no player connected")]
    NotConnected,

    /// The outbound message could not be encoded.
    #[error("failed to encode message: {0}")]
    Encode(String),

    /// The socket write failed.
    #[error("failed to send to player: {0}")]
    SendFailed(String),
}

impl ErrorCode for TransportError {
    fn code(&self) -> &'static str {
        match self {
            Self::NotConnected => "player_not_connected",
            Self::Encode(_) => "message_encode_failed",
            Self::SendFailed(_) => "player_send_failed",
        }
    }
}

/// Errors from the persisted state store.
#[derive(Debug, Error)]
pub enum StateStoreError {
    /// The state file could not be read.
    #[error("failed to read state file: {0}")]
    Read(String),

    /// The state file could not be written.
    #[error("failed to write state file: {0}")]
    Write(String),

    /// The state file's contents could not be parsed.
    #[error("failed to parse state file: {0}")]
    Parse(String),
}

impl ErrorCode for StateStoreError {
    fn code(&self) -> &'static str {
        match self {
            Self::Read(_) => "state_read_failed",
            Self::Write(_) => "state_write_failed",
            Self::Parse(_) => "state_parse_failed",
        }
    }
}

/// Errors from the outbound notifier.
#[derive(Debug, Error)]
pub enum NotifierError {
    /// No webhook URL is configured.
    #[error("no webhook configured")]
    NotConfigured,

    /// The outbound HTTP request failed.
    #[error("webhook request failed: {0}")]
    RequestFailed(String),

    /// The webhook endpoint returned a non-2xx status.
    #[error("webhook returned status {0}")]
    BadStatus(u16),
}

impl ErrorCode for NotifierError {
    fn code(&self) -> &'static str {
        match self {
            Self::NotConfigured => "notifier_not_configured",
            Self::RequestFailed(_) => "notifier_request_failed",
            Self::BadStatus(_) => "notifier_bad_status",
        }
    }
}

/// Application-wide error type for the playback supervisor.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum SupervisorError {
    /// Host RPC client failed.
    #[error("host error: {0}")]
    Host(String),

    /// Player transport failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// Persisted state store failed.
    #[error("state store error: {0}")]
    StateStore(String),

    /// Outbound notifier failed.
    #[error("notifier error: {0}")]
    Notifier(String),

    /// Client sent an invalid or malformed request.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The requested resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Configuration is missing required settings or failed validation.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Internal invariant violation; should not normally be reachable.
    #[error("internal error: {0}")]
    Internal(String),
}

impl SupervisorError {
    /// Returns a machine-readable error code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Host(_) => "host_error",
            Self::Transport(_) => "transport_error",
            Self::StateStore(_) => "state_store_error",
            Self::Notifier(_) => "notifier_error",
            Self::InvalidRequest(_) => "invalid_request",
            Self::NotFound(_) => "not_found",
            Self::Configuration(_) => "configuration_error",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Maps the error to an appropriate HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Configuration(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Convenient Result alias for application-wide operations.
pub type SupervisorResult<T> = Result<T, SupervisorError>;

/// JSON response body for error responses.
#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
    status: u16,
}

impl IntoResponse for SupervisorError {
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

impl From<HostRpcError> for SupervisorError {
    fn from(err: HostRpcError) -> Self {
        Self::Host(err.to_string())
    }
}

impl From<TransportError> for SupervisorError {
    fn from(err: TransportError) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<StateStoreError> for SupervisorError {
    fn from(err: StateStoreError) -> Self {
        Self::StateStore(err.to_string())
    }
}

impl From<NotifierError> for SupervisorError {
    fn from(err: NotifierError) -> Self {
        Self::Notifier(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_request_returns_correct_code() {
        let err = SupervisorError::InvalidRequest("bad index".into());
        assert_eq!(err.code(), "invalid_request");
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn configuration_error_returns_service_unavailable() {
        let err = SupervisorError::Configuration("missing webhook url".into());
        assert_eq!(err.code(), "configuration_error");
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn host_rpc_error_converts_with_message() {
        let err: SupervisorError = HostRpcError::Timeout(10).into();
        assert!(matches!(err, SupervisorError::Host(_)));
        assert_eq!(err.code(), "host_error");
    }
}
