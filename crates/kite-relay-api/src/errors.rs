//! Error types for the HTTP service

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use kite_relay_core::{ErrorCategory, RelayError};
use tracing::{error, warn};

/// Body returned for a successfully relayed webhook
pub const SUCCESS_BODY: &str = "Hello Buildkite!";

/// Body returned when the token header does not match
pub const UNAUTHORIZED_BODY: &str = "ERROR: invalid token";

/// Body returned when the webhook carried no body
pub const EMPTY_BODY: &str = "ERROR: empty event body";

/// Body returned when the webhook body could not be decoded
pub const MALFORMED_BODY: &str = "ERROR: Malformed event data";

/// Body returned for every server-side failure
pub const INTERNAL_ERROR_BODY: &str = "ERROR: Something went wrong handling event";

/// Webhook handler errors with HTTP status code mapping
///
/// Every [`RelayError`] maps to exactly one status code and plain-text body:
///
/// - `401 Unauthorized`: token header missing or wrong
/// - `400 Bad Request`: empty or malformed body
/// - `500 Internal Server Error`: unrecognised event kind, backend connection
///   failure or publish failure
///
/// Server-side failures share a single generic body; the detail is logged.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct RelayHandlerError(#[from] pub RelayError);

impl RelayHandlerError {
    /// Status code and body this error is reported with
    pub fn status_and_body(&self) -> (StatusCode, &'static str) {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let body = match &self.0 {
            RelayError::Unauthorized => UNAUTHORIZED_BODY,
            RelayError::EmptyBody => EMPTY_BODY,
            RelayError::MalformedPayload { .. } => MALFORMED_BODY,
            RelayError::UnrecognizedEventKind { .. }
            | RelayError::PublishFailure(_)
            | RelayError::BackendConnectFailure { .. } => INTERNAL_ERROR_BODY,
        };

        (status, body)
    }
}

impl IntoResponse for RelayHandlerError {
    fn into_response(self) -> Response {
        let (status, body) = self.status_and_body();

        match self.0.error_category() {
            ErrorCategory::Security => {
                warn!(status = status.as_u16(), "Webhook rejected: {}", self.0);
            }
            ErrorCategory::Permanent if self.0.is_client_error() => {
                warn!(status = status.as_u16(), error = %self.0, "Webhook rejected");
            }
            ErrorCategory::Permanent | ErrorCategory::Transient => {
                error!(status = status.as_u16(), error = %self.0, "Error handling webhook");
            }
        }

        (
            status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            body,
        )
            .into_response()
    }
}

/// Service-level errors
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Failed to bind to address {address}: {message}")]
    BindFailed { address: String, message: String },

    #[error("Server failed: {message}")]
    ServerFailed { message: String },

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Metrics backend unavailable: {message}")]
    BackendConnectFailed { message: String },
}

impl ServiceError {
    /// Process exit code reported for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::BindFailed { .. } => 1,
            Self::ServerFailed { .. } => 2,
            Self::Configuration(_) => 3,
            Self::BackendConnectFailed { .. } => 4,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required configuration: {key}")]
    Missing { key: String },

    #[error("Configuration loading failed: {0}")]
    Source(#[from] ::config::ConfigError),
}

#[cfg(test)]
#[path = "errors_tests.rs"]
mod tests;
