//! # New Relic Publisher
//!
//! [`PublisherConnector`] speaking the New Relic agent collector protocol
//! (protocol version 17, JSON marshalling).
//!
//! A connection is a `preconnect` against the configured collector, which
//! names the host to use, followed by `connect` on that host, which returns
//! the agent run id. Events are then posted with `custom_event_data` and the
//! run is ended with `shutdown`.

use chrono::Utc;
use kite_relay_api::ConfigError;
use kite_relay_core::{
    AttributeValue, Attributes, PublishError, Publisher, PublisherConnector, RelayConfig, Secret,
};
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Collector protocol revision spoken by this client
pub const PROTOCOL_VERSION: u32 = 17;

/// Longest accepted custom event type, in bytes
pub const MAX_EVENT_TYPE_LENGTH: usize = 255;

/// Most attributes a single custom event may carry
pub const MAX_ATTRIBUTES: usize = 64;

/// Longest accepted attribute key, in bytes
pub const MAX_KEY_LENGTH: usize = 255;

/// String attribute values are truncated to this many bytes
pub const MAX_VALUE_LENGTH: usize = 4095;

const EVENT_TYPE_PATTERN: &str = r"^[a-zA-Z0-9:_ ]+$";
const RESERVOIR_SIZE: usize = 10_000;
const INVOKE_PATH: &str = "agent_listener/invoke_raw_method";

// ============================================================================
// Collector transport
// ============================================================================

#[derive(Debug, Deserialize)]
struct CollectorReply {
    #[serde(default)]
    return_value: Option<Value>,
    #[serde(default)]
    exception: Option<CollectorException>,
}

#[derive(Debug, Deserialize)]
struct CollectorException {
    #[serde(default)]
    message: String,
    #[serde(default)]
    error_type: String,
}

/// HTTP client for `invoke_raw_method` calls
#[derive(Clone)]
struct CollectorClient {
    http: reqwest::Client,
    license_key: Secret,
}

impl CollectorClient {
    async fn invoke(
        &self,
        host: &Url,
        method: &str,
        run_id: Option<&str>,
        body: &Value,
    ) -> Result<Option<Value>, PublishError> {
        let mut url = host.join(INVOKE_PATH).map_err(|e| PublishError::Transport {
            message: format!("Invalid collector URL: {e}"),
        })?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("method", method)
                .append_pair("license_key", self.license_key.expose())
                .append_pair("marshal_format", "json")
                .append_pair("protocol_version", &PROTOCOL_VERSION.to_string());
            if let Some(run_id) = run_id {
                query.append_pair("run_id", run_id);
            }
        }

        debug!(method = %method, host = %host, "Invoking collector method");

        let response = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| PublishError::Transport {
                message: format!("{method} request failed: {}", e.without_url()),
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| PublishError::Transport {
            message: format!("{method} response unreadable: {}", e.without_url()),
        })?;

        match (status.is_success(), serde_json::from_str::<CollectorReply>(&text)) {
            (
                _,
                Ok(CollectorReply {
                    exception: Some(exception),
                    ..
                }),
            ) => Err(PublishError::Rejected {
                error_type: exception.error_type,
                message: exception.message,
            }),
            (true, Ok(reply)) => Ok(reply.return_value),
            (true, Err(e)) => Err(PublishError::InvalidResponse {
                message: format!("{method} returned invalid JSON: {e}"),
            }),
            (false, _) => Err(PublishError::Rejected {
                error_type: format!("HTTP {}", status.as_u16()),
                message: text,
            }),
        }
    }
}

// ============================================================================
// Connector
// ============================================================================

/// Opens collector sessions for one application
pub struct NewRelicConnector {
    client: CollectorClient,
    collector_url: Url,
    app_name: String,
    event_type_pattern: Arc<Regex>,
}

impl NewRelicConnector {
    /// Create a connector for `config.app_name` against `collector_url`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the collector URL cannot be
    /// parsed or the HTTP client cannot be created.
    pub fn new(
        config: &RelayConfig,
        collector_url: &str,
        request_timeout: Duration,
    ) -> Result<Self, ConfigError> {
        let collector_url = Url::parse(collector_url).map_err(|e| ConfigError::Invalid {
            message: format!("newrelic.collector_url '{collector_url}' is not a URL: {e}"),
        })?;

        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!("kite-relay/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ConfigError::Invalid {
                message: format!("Failed to create HTTP client: {e}"),
            })?;

        let event_type_pattern =
            Regex::new(EVENT_TYPE_PATTERN).map_err(|e| ConfigError::Invalid {
                message: format!("Invalid event type pattern: {e}"),
            })?;

        Ok(Self {
            client: CollectorClient {
                http,
                license_key: config.license_key.clone(),
            },
            collector_url,
            app_name: config.app_name.clone(),
            event_type_pattern: Arc::new(event_type_pattern),
        })
    }

    async fn preconnect(&self) -> Result<Url, PublishError> {
        let reply = self
            .client
            .invoke(&self.collector_url, "preconnect", None, &json!([]))
            .await?;

        let redirect_host = reply
            .as_ref()
            .and_then(|value| value.get("redirect_host"))
            .and_then(Value::as_str)
            .ok_or_else(|| PublishError::InvalidResponse {
                message: "preconnect reply has no redirect_host".to_string(),
            })?;

        Url::parse(&format!("{}://{}/", self.collector_url.scheme(), redirect_host)).map_err(
            |e| PublishError::InvalidResponse {
                message: format!("redirect_host '{redirect_host}' is not a host: {e}"),
            },
        )
    }

    fn connect_payload(&self) -> Value {
        let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string());

        json!([{
            "pid": std::process::id(),
            "language": "rust",
            "agent_version": env!("CARGO_PKG_VERSION"),
            "host": host,
            "app_name": [self.app_name],
            "identifier": self.app_name,
            "labels": [],
            "environment": [],
            "settings": {}
        }])
    }
}

#[async_trait::async_trait]
impl PublisherConnector for NewRelicConnector {
    async fn connect(&self) -> Result<Box<dyn Publisher>, PublishError> {
        let host = self.preconnect().await?;

        let reply = self
            .client
            .invoke(&host, "connect", None, &self.connect_payload())
            .await?;

        let run_id = match reply.as_ref().and_then(|value| value.get("agent_run_id")) {
            Some(Value::String(id)) => id.clone(),
            Some(Value::Number(id)) => id.to_string(),
            _ => {
                return Err(PublishError::InvalidResponse {
                    message: "connect reply has no agent_run_id".to_string(),
                })
            }
        };

        info!(host = %host, app_name = %self.app_name, "Connected to New Relic collector");

        Ok(Box::new(NewRelicPublisher {
            client: self.client.clone(),
            host,
            run_id,
            event_type_pattern: Arc::clone(&self.event_type_pattern),
            closed: AtomicBool::new(false),
        }))
    }
}

// ============================================================================
// Publisher
// ============================================================================

/// One connected collector session
pub struct NewRelicPublisher {
    client: CollectorClient,
    host: Url,
    run_id: String,
    event_type_pattern: Arc<Regex>,
    closed: AtomicBool,
}

impl NewRelicPublisher {
    fn event_attributes(&self, attributes: &Attributes) -> Result<Map<String, Value>, PublishError> {
        if attributes.len() > MAX_ATTRIBUTES {
            return Err(PublishError::InvalidEvent {
                message: format!(
                    "{} attributes exceeds the limit of {MAX_ATTRIBUTES}",
                    attributes.len()
                ),
            });
        }

        let mut event = Map::with_capacity(attributes.len());
        for (key, value) in attributes {
            if key.is_empty() || key.len() > MAX_KEY_LENGTH {
                return Err(PublishError::InvalidEvent {
                    message: format!("attribute key '{key}' must be 1 to {MAX_KEY_LENGTH} bytes"),
                });
            }

            let value = match value {
                AttributeValue::String(s) => Value::from(truncate(s, MAX_VALUE_LENGTH)),
                AttributeValue::Int(i) => Value::from(*i),
                AttributeValue::Bool(b) => Value::from(*b),
            };
            event.insert(key.clone(), value);
        }

        Ok(event)
    }

    fn validate_event_type(&self, event_type: &str) -> Result<(), PublishError> {
        if event_type.len() > MAX_EVENT_TYPE_LENGTH || !self.event_type_pattern.is_match(event_type)
        {
            return Err(PublishError::InvalidEvent {
                message: format!("invalid event type '{event_type}'"),
            });
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Publisher for NewRelicPublisher {
    async fn publish(&self, event_name: &str, attributes: &Attributes) -> Result<(), PublishError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(PublishError::Closed);
        }

        self.validate_event_type(event_name)?;
        let user_attributes = self.event_attributes(attributes)?;

        let body = json!([
            self.run_id,
            { "reservoir_size": RESERVOIR_SIZE, "events_seen": 1 },
            [[
                { "type": event_name, "timestamp": Utc::now().timestamp_millis() },
                user_attributes,
                {}
            ]]
        ]);

        self.client
            .invoke(&self.host, "custom_event_data", Some(&self.run_id), &body)
            .await?;

        debug!(event_name = %event_name, run_id = %self.run_id, "Custom event recorded");
        Ok(())
    }

    async fn close(&self) -> Result<(), PublishError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        self.client
            .invoke(&self.host, "shutdown", Some(&self.run_id), &json!([]))
            .await?;

        debug!(run_id = %self.run_id, "Collector session closed");
        Ok(())
    }
}

/// Cut `value` to at most `max` bytes without splitting a character
fn truncate(value: &str, max: usize) -> &str {
    if value.len() <= max {
        return value;
    }

    let mut end = max;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}

#[cfg(test)]
#[path = "newrelic_tests.rs"]
mod tests;
