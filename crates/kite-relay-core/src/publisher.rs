//! # Publisher Interfaces
//!
//! Abstractions over the metrics backend. A [`PublisherConnector`] opens one
//! [`Publisher`] per webhook invocation; the invocation closes it again on
//! every exit path.

use crate::{Attributes, PublishError, RelayError};
use async_trait::async_trait;
use std::time::Duration;

/// Upper bound for establishing a backend connection
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for sending custom events to the metrics backend
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Record one custom event named `event_name`
    async fn publish(&self, event_name: &str, attributes: &Attributes)
        -> Result<(), PublishError>;

    /// Flush and release the backend connection
    async fn close(&self) -> Result<(), PublishError>;
}

/// Factory establishing backend connections
#[async_trait]
pub trait PublisherConnector: Send + Sync {
    /// Connect to the backend, returning once the connection is confirmed
    async fn connect(&self) -> Result<Box<dyn Publisher>, PublishError>;
}

/// Connect through `connector`, failing if the backend has not confirmed the
/// connection within `timeout`
///
/// # Errors
///
/// Returns [`RelayError::BackendConnectFailure`] when the connector fails or
/// the timeout elapses.
pub async fn connect_with_timeout(
    connector: &dyn PublisherConnector,
    timeout: Duration,
) -> Result<Box<dyn Publisher>, RelayError> {
    match tokio::time::timeout(timeout, connector.connect()).await {
        Ok(Ok(publisher)) => Ok(publisher),
        Ok(Err(e)) => Err(RelayError::BackendConnectFailure {
            message: e.to_string(),
        }),
        Err(_) => Err(RelayError::BackendConnectFailure {
            message: format!(
                "connection not confirmed within {}s",
                timeout.as_secs_f64()
            ),
        }),
    }
}

#[cfg(test)]
#[path = "publisher_tests.rs"]
mod tests;
