//! Configuration types for the HTTP service
//!
//! Sources, later ones overriding earlier ones:
//!
//! 1. `config/service.yaml`, when present
//! 2. the YAML file named by `KITE_RELAY_CONFIG_FILE`, when set
//! 3. environment variables prefixed `KITE_RELAY__` with `__` as the section
//!    separator, e.g. `KITE_RELAY__SERVER__PORT=9090`
//! 4. `NEWRELIC_APP_NAME`, `NEWRELIC_LICENSE_KEY` and
//!    `BUILDKITE_WEBHOOK_TOKEN`, when set and non-empty
//!
//! Every field carries a default, so an unconfigured environment still
//! produces a [`ServiceConfig`]; only [`ServiceConfig::relay_config`] insists
//! on the license key and webhook token.

use crate::errors::ConfigError;
use kite_relay_core::{RelayConfig, Secret};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use tracing::info;

/// Environment variable naming an explicit configuration file
pub const CONFIG_FILE_ENV: &str = "KITE_RELAY_CONFIG_FILE";

/// Prefix for structured environment overrides
pub const ENV_PREFIX: &str = "KITE_RELAY";

pub const APP_NAME_ENV: &str = "NEWRELIC_APP_NAME";
pub const LICENSE_KEY_ENV: &str = "NEWRELIC_LICENSE_KEY";
pub const WEBHOOK_TOKEN_ENV: &str = "BUILDKITE_WEBHOOK_TOKEN";

/// Service configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// HTTP server settings
    pub server: ServerConfig,

    /// Webhook endpoint settings
    pub webhooks: WebhookConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Metrics backend connection settings
    pub newrelic: NewRelicConfig,

    /// Credentials and application identity
    pub relay: RelaySettings,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,

    /// Maximum request size in bytes
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            shutdown_timeout_seconds: 30,
            max_body_size: 10 * 1024 * 1024, // 10MB
        }
    }
}

/// Webhook endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// Webhook endpoint path
    pub endpoint_path: String,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            endpoint_path: "/webhook".to_string(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Logging level
    pub level: String,

    /// Enable JSON structured logging
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

/// Metrics backend connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NewRelicConfig {
    /// Base URL of the collector used for the initial handshake
    pub collector_url: String,

    /// Seconds a connection may take to be confirmed
    pub connect_timeout_seconds: u64,
}

impl Default for NewRelicConfig {
    fn default() -> Self {
        Self {
            collector_url: "https://collector.newrelic.com".to_string(),
            connect_timeout_seconds: 30,
        }
    }
}

/// Relay identity and shared secrets
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelaySettings {
    pub app_name: Option<String>,
    pub license_key: Option<String>,
    pub webhook_token: Option<String>,
}

impl fmt::Debug for RelaySettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |value: &Option<String>| value.as_ref().map(|_| "<REDACTED>");
        f.debug_struct("RelaySettings")
            .field("app_name", &self.app_name)
            .field("license_key", &redact(&self.license_key))
            .field("webhook_token", &redact(&self.webhook_token))
            .finish()
    }
}

impl ServiceConfig {
    /// Load configuration from files and the environment
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Source`] when an explicit file is missing, a
    /// file is malformed, or a value cannot be coerced to its field type.
    pub fn load() -> Result<Self, ConfigError> {
        let mut builder = ::config::Config::builder().add_source(
            ::config::File::with_name("config/service")
                .required(false)
                .format(::config::FileFormat::Yaml),
        );

        if let Some(explicit_path) = non_empty_env(CONFIG_FILE_ENV) {
            info!(path = %explicit_path, "Loading configuration from explicit path");
            builder = builder.add_source(
                ::config::File::new(&explicit_path, ::config::FileFormat::Yaml).required(true),
            );
        }

        let config = builder
            .add_source(::config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .set_override_option("relay.app_name", non_empty_env(APP_NAME_ENV))?
            .set_override_option("relay.license_key", non_empty_env(LICENSE_KEY_ENV))?
            .set_override_option("relay.webhook_token", non_empty_env(WEBHOOK_TOKEN_ENV))?
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Check values that deserialized but cannot be served
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let path = &self.webhooks.endpoint_path;
        if !path.starts_with('/') {
            return Err(ConfigError::Invalid {
                message: format!("webhooks.endpoint_path must start with '/': {path}"),
            });
        }

        if path == crate::HEALTH_PATH {
            return Err(ConfigError::Invalid {
                message: format!("webhooks.endpoint_path collides with {}", crate::HEALTH_PATH),
            });
        }

        if self.server.max_body_size == 0 {
            return Err(ConfigError::Invalid {
                message: "server.max_body_size must be greater than zero".to_string(),
            });
        }

        if self.newrelic.connect_timeout_seconds == 0 {
            return Err(ConfigError::Invalid {
                message: "newrelic.connect_timeout_seconds must be greater than zero".to_string(),
            });
        }

        self.socket_addr().map(|_| ())
    }

    /// Address the HTTP listener binds to
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when `server.host` is not an IP address.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let host = self
            .server
            .host
            .parse::<std::net::IpAddr>()
            .map_err(|e| ConfigError::Invalid {
                message: format!("server.host '{}' is not an IP address: {e}", self.server.host),
            })?;

        Ok(SocketAddr::new(host, self.server.port))
    }

    /// Build the relay configuration, requiring the license key and token
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] naming the environment variable that
    /// supplies the absent value.
    pub fn relay_config(&self) -> Result<RelayConfig, ConfigError> {
        let license_key = required(&self.relay.license_key, LICENSE_KEY_ENV)?;
        let webhook_token = required(&self.relay.webhook_token, WEBHOOK_TOKEN_ENV)?;

        RelayConfig::new(
            self.relay.app_name.clone(),
            Secret::new(license_key),
            Secret::new(webhook_token),
        )
        .map_err(|e| ConfigError::Invalid {
            message: e.to_string(),
        })
    }
}

fn required(value: &Option<String>, key: &str) -> Result<String, ConfigError> {
    value
        .as_ref()
        .filter(|v| !v.is_empty())
        .cloned()
        .ok_or_else(|| ConfigError::Missing {
            key: key.to_string(),
        })
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

#[cfg(test)]
#[path = "settings_tests.rs"]
mod tests;
