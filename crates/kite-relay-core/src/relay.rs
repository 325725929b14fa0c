//! # Event Relay
//!
//! Per-invocation pipeline: gate the request, open a backend connection,
//! dispatch the event and close the connection again. The connection is
//! closed on every path that opened it, including failed dispatches and
//! invocations dropped before they finish.

use crate::gate::RequestGate;
use crate::publisher::connect_with_timeout;
use crate::{
    dispatch_event, Dispatched, Publisher, PublisherConnector, RelayConfig, RelayError,
    WebhookRequest,
};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

/// Interface for processing incoming webhook calls
#[async_trait]
pub trait WebhookProcessor: Send + Sync {
    /// Process one webhook call end to end
    async fn process_webhook(&self, request: WebhookRequest) -> Result<Dispatched, RelayError>;
}

/// Default [`WebhookProcessor`] relaying events through a [`PublisherConnector`]
pub struct EventRelay {
    gate: RequestGate,
    connector: Arc<dyn PublisherConnector>,
    connect_timeout: Duration,
}

impl EventRelay {
    pub fn new(config: &RelayConfig, connector: Arc<dyn PublisherConnector>) -> Self {
        Self {
            gate: RequestGate::new(config.webhook_token.clone()),
            connector,
            connect_timeout: crate::CONNECT_TIMEOUT,
        }
    }

    /// Override how long a backend connection may take to be confirmed
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

#[async_trait]
impl WebhookProcessor for EventRelay {
    #[instrument(skip(self, request), fields(event_kind = %request.event_kind()))]
    async fn process_webhook(&self, request: WebhookRequest) -> Result<Dispatched, RelayError> {
        let admitted = self.gate.admit(&request)?;

        let publisher = connect_with_timeout(self.connector.as_ref(), self.connect_timeout)
            .await
            .inspect_err(|e| warn!(error = %e, "Failed to connect to metrics backend"))?;
        let connection = OpenConnection::new(publisher);

        let result =
            dispatch_event(&admitted.event_kind, &admitted.envelope, connection.publisher()).await;

        connection.close().await;

        if let Ok(dispatched) = &result {
            info!(
                event_name = %dispatched.event_name,
                "Webhook relayed"
            );
        }

        result
    }
}

impl fmt::Debug for EventRelay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventRelay")
            .field("gate", &self.gate)
            .field("connect_timeout", &self.connect_timeout)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Connection guard
// ============================================================================

/// Backend connection that is closed even if the invocation is dropped
///
/// [`OpenConnection::close`] closes inline. Dropping the guard without
/// calling it hands the close to a background task on the current runtime.
struct OpenConnection {
    publisher: Arc<dyn Publisher>,
    closed: bool,
}

impl OpenConnection {
    fn new(publisher: Box<dyn Publisher>) -> Self {
        Self {
            publisher: Arc::from(publisher),
            closed: false,
        }
    }

    fn publisher(&self) -> &dyn Publisher {
        self.publisher.as_ref()
    }

    async fn close(mut self) {
        self.closed = true;
        close_publisher(self.publisher.as_ref()).await;
    }
}

impl Drop for OpenConnection {
    fn drop(&mut self) {
        if self.closed {
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!("Invocation dropped before completion; closing metrics backend connection");
                let publisher = Arc::clone(&self.publisher);
                handle.spawn(async move { close_publisher(publisher.as_ref()).await });
            }
            Err(_) => {
                warn!("No runtime available; metrics backend connection left open");
            }
        }
    }
}

async fn close_publisher(publisher: &dyn Publisher) {
    if let Err(e) = publisher.close().await {
        warn!(error = %e, "Failed to close metrics backend connection");
    }
}

#[cfg(test)]
#[path = "relay_tests.rs"]
mod tests;
