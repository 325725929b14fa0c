//! Relay configuration shared read-only by every invocation.

use crate::ValidationError;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Application name reported to the metrics backend when none is configured
pub const DEFAULT_APP_NAME: &str = "Buildkite";

/// Secret string that is wiped from memory on drop and never printed
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Access the raw secret value
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(<REDACTED>)")
    }
}

/// Settings loaded once at startup
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Application name events are recorded under
    pub app_name: String,

    /// Metrics backend license key
    pub license_key: Secret,

    /// Shared secret expected in the `X-Buildkite-Token` header
    pub webhook_token: Secret,
}

impl RelayConfig {
    /// Create a validated configuration
    ///
    /// A missing or empty `app_name` falls back to [`DEFAULT_APP_NAME`].
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::Required`] when the license key or webhook
    /// token is empty.
    pub fn new(
        app_name: Option<String>,
        license_key: Secret,
        webhook_token: Secret,
    ) -> Result<Self, ValidationError> {
        if license_key.is_empty() {
            return Err(ValidationError::Required {
                field: "license_key".to_string(),
            });
        }

        if webhook_token.is_empty() {
            return Err(ValidationError::Required {
                field: "webhook_token".to_string(),
            });
        }

        let app_name = app_name
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| DEFAULT_APP_NAME.to_string());

        Ok(Self {
            app_name,
            license_key,
            webhook_token,
        })
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
