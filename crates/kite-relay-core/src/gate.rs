//! # Request Gate
//!
//! Checks performed on a raw webhook call before anything is dispatched:
//!
//! 1. the `X-Buildkite-Token` header must equal the configured token
//! 2. the body must not be empty
//! 3. the body must decode into an [`Envelope`]

use crate::{Envelope, RelayError, Secret};
use bytes::Bytes;
use std::collections::HashMap;
use std::fmt;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

/// Header carrying the shared-secret webhook token
pub const TOKEN_HEADER: &str = "X-Buildkite-Token";

/// Header carrying the event-kind label
pub const EVENT_HEADER: &str = "X-Buildkite-Event";

// ============================================================================
// Request types
// ============================================================================

/// Buildkite-specific headers of a webhook call
#[derive(Clone, Default)]
pub struct WebhookHeaders {
    pub token: Option<String>,
    /// Event kind, empty when the header was absent
    pub event_kind: String,
}

impl WebhookHeaders {
    pub fn new(token: Option<String>, event_kind: impl Into<String>) -> Self {
        Self {
            token,
            event_kind: event_kind.into(),
        }
    }

    /// Parse headers from HTTP header map, matching names case-insensitively
    pub fn from_http_headers(headers: &HashMap<String, String>) -> Self {
        let lookup = |name: &str| {
            headers
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, value)| value.clone())
        };

        Self {
            token: lookup(TOKEN_HEADER),
            event_kind: lookup(EVENT_HEADER).unwrap_or_default(),
        }
    }
}

impl fmt::Debug for WebhookHeaders {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookHeaders")
            .field("token", &self.token.as_ref().map(|_| "<REDACTED>"))
            .field("event_kind", &self.event_kind)
            .finish()
    }
}

/// Raw webhook call as received by the transport
#[derive(Debug, Clone)]
pub struct WebhookRequest {
    pub headers: WebhookHeaders,
    pub body: Bytes,
}

impl WebhookRequest {
    pub fn new(headers: WebhookHeaders, body: impl Into<Bytes>) -> Self {
        Self {
            headers,
            body: body.into(),
        }
    }

    /// Get event kind from headers
    pub fn event_kind(&self) -> &str {
        &self.headers.event_kind
    }
}

/// Webhook call that passed the gate
#[derive(Debug, Clone)]
pub struct AdmittedEvent {
    pub event_kind: String,
    pub envelope: Envelope,
}

// ============================================================================
// Gate
// ============================================================================

/// Authenticates and decodes webhook calls
pub struct RequestGate {
    token: Secret,
}

impl RequestGate {
    pub fn new(token: Secret) -> Self {
        Self { token }
    }

    /// Run every gate check against `request`
    ///
    /// # Errors
    ///
    /// - [`RelayError::Unauthorized`] when the token header is missing or wrong
    /// - [`RelayError::EmptyBody`] when the body is empty
    /// - [`RelayError::MalformedPayload`] when the body is not a valid envelope
    pub fn admit(&self, request: &WebhookRequest) -> Result<AdmittedEvent, RelayError> {
        if !self.token_matches(request.headers.token.as_deref()) {
            warn!(event_kind = %request.event_kind(), "Rejected webhook with invalid token");
            return Err(RelayError::Unauthorized);
        }

        if request.body.is_empty() {
            warn!(event_kind = %request.event_kind(), "Rejected webhook with empty body");
            return Err(RelayError::EmptyBody);
        }

        let envelope = Envelope::from_slice(&request.body).inspect_err(|e| {
            warn!(event_kind = %request.event_kind(), error = %e, "Rejected malformed webhook body");
        })?;

        debug!(event_kind = %request.event_kind(), "Webhook admitted");

        Ok(AdmittedEvent {
            event_kind: request.headers.event_kind.clone(),
            envelope,
        })
    }

    fn token_matches(&self, presented: Option<&str>) -> bool {
        presented.is_some_and(|token| {
            token
                .as_bytes()
                .ct_eq(self.token.expose().as_bytes())
                .into()
        })
    }
}

impl fmt::Debug for RequestGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestGate")
            .field("token", &self.token)
            .finish()
    }
}

#[cfg(test)]
#[path = "gate_tests.rs"]
mod tests;
