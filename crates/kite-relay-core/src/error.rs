//! Error types for webhook relaying.
//!
//! [`RelayError`] is the taxonomy every invocation failure is reported in.
//! The HTTP layer maps each variant to exactly one status code and body.

use serde::{Deserialize, Serialize};

/// High-level error categorization for logging and alerting decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// Failures caused by the backend that may succeed on a later call
    Transient,
    /// Failures caused by the request itself
    Permanent,
    /// Authentication failures
    Security,
}

/// Top-level error for a single webhook invocation
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// The shared-secret token header did not match the configured token
    #[error("Invalid webhook token")]
    Unauthorized,

    /// The webhook was fired with no request body
    #[error("Webhook fired with no request body")]
    EmptyBody,

    /// The body could not be decoded, or a section the event family needs is absent
    #[error("Malformed payload: {message}")]
    MalformedPayload { message: String },

    /// The event-kind header named an event this relay does not handle
    #[error("Unrecognised event type: {event_kind}")]
    UnrecognizedEventKind { event_kind: String },

    /// The publisher returned an error for the outbound event
    #[error("Publishing event failed: {0}")]
    PublishFailure(#[from] PublishError),

    /// The metrics backend connection could not be established
    #[error("Unable to connect to metrics backend: {message}")]
    BackendConnectFailure { message: String },
}

impl RelayError {
    /// Get error category for monitoring
    pub fn error_category(&self) -> ErrorCategory {
        match self {
            Self::Unauthorized => ErrorCategory::Security,
            Self::EmptyBody => ErrorCategory::Permanent,
            Self::MalformedPayload { .. } => ErrorCategory::Permanent,
            Self::UnrecognizedEventKind { .. } => ErrorCategory::Permanent,
            Self::PublishFailure(_) => ErrorCategory::Transient,
            Self::BackendConnectFailure { .. } => ErrorCategory::Transient,
        }
    }

    /// HTTP status code the webhook caller receives for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Unauthorized => 401,
            Self::EmptyBody | Self::MalformedPayload { .. } => 400,
            Self::UnrecognizedEventKind { .. }
            | Self::PublishFailure(_)
            | Self::BackendConnectFailure { .. } => 500,
        }
    }

    /// Check whether the failure was caused by the caller's request
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Unauthorized | Self::EmptyBody | Self::MalformedPayload { .. }
        )
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(error: serde_json::Error) -> Self {
        Self::MalformedPayload {
            message: error.to_string(),
        }
    }
}

/// Errors reported by a [`Publisher`](crate::Publisher) or its connector
#[derive(Debug, Clone, thiserror::Error)]
pub enum PublishError {
    #[error("Invalid custom event: {message}")]
    InvalidEvent { message: String },

    #[error("Backend request failed: {message}")]
    Transport { message: String },

    #[error("Backend rejected request ({error_type}): {message}")]
    Rejected { error_type: String, message: String },

    #[error("Backend returned an unexpected response: {message}")]
    InvalidResponse { message: String },

    #[error("Publisher has already been closed")]
    Closed,
}

/// Error type for input validation failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Field '{field}' is required")]
    Required { field: String },
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
