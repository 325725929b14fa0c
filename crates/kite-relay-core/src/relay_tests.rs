//! Tests for the event relay.

use super::*;
use crate::{MemoryPublisher, PublishError, Publisher, Secret, WebhookHeaders};
use bytes::Bytes;
use std::sync::atomic::{AtomicUsize, Ordering};

fn relay(publisher: &MemoryPublisher) -> EventRelay {
    let config = RelayConfig::new(None, Secret::new("license"), Secret::new("test")).unwrap();
    EventRelay::new(&config, Arc::new(publisher.clone()))
}

fn request(token: &str, event_kind: &str, body: &'static str) -> WebhookRequest {
    WebhookRequest::new(
        WebhookHeaders::new(Some(token.to_string()), event_kind),
        Bytes::from_static(body.as_bytes()),
    )
}

/// Publisher whose close always fails
struct FailingClose;

#[async_trait]
impl Publisher for FailingClose {
    async fn publish(
        &self,
        _event_name: &str,
        _attributes: &crate::Attributes,
    ) -> Result<(), PublishError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), PublishError> {
        Err(PublishError::Closed)
    }
}

#[async_trait]
impl PublisherConnector for FailingClose {
    async fn connect(&self) -> Result<Box<dyn Publisher>, PublishError> {
        Ok(Box::new(FailingClose))
    }
}

/// Publisher whose publish never completes, counting closes
#[derive(Clone, Default)]
struct StalledPublish {
    closes: Arc<AtomicUsize>,
}

#[async_trait]
impl Publisher for StalledPublish {
    async fn publish(
        &self,
        _event_name: &str,
        _attributes: &crate::Attributes,
    ) -> Result<(), PublishError> {
        std::future::pending::<()>().await;
        Ok(())
    }

    async fn close(&self) -> Result<(), PublishError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl PublisherConnector for StalledPublish {
    async fn connect(&self) -> Result<Box<dyn Publisher>, PublishError> {
        Ok(Box::new(self.clone()))
    }
}

#[tokio::test]
async fn test_invalid_token_never_connects() {
    let publisher = MemoryPublisher::new();

    let result = relay(&publisher)
        .process_webhook(request("fake", "build.running", "{}"))
        .await;

    assert!(matches!(result, Err(RelayError::Unauthorized)));
    assert_eq!(publisher.connection_count(), 0);
}

#[tokio::test]
async fn test_empty_body_never_connects() {
    let publisher = MemoryPublisher::new();

    let result = relay(&publisher)
        .process_webhook(request("test", "build.running", ""))
        .await;

    assert!(matches!(result, Err(RelayError::EmptyBody)));
    assert_eq!(publisher.connection_count(), 0);
}

#[tokio::test]
async fn test_successful_relay_publishes_and_closes() {
    let publisher = MemoryPublisher::new();

    let dispatched = relay(&publisher)
        .process_webhook(request("test", "build.running", "{}"))
        .await
        .unwrap();

    assert_eq!(dispatched.event_name, "BuildEvent");
    assert_eq!(publisher.publish_count(), 1);
    assert_eq!(publisher.connection_count(), 1);
    assert_eq!(publisher.close_count(), 1);
}

#[tokio::test]
async fn test_unrecognized_kind_still_closes_connection() {
    let publisher = MemoryPublisher::new();

    let result = relay(&publisher)
        .process_webhook(request("test", "ping", "{}"))
        .await;

    assert!(matches!(
        result,
        Err(RelayError::UnrecognizedEventKind { .. })
    ));
    assert_eq!(publisher.publish_count(), 0);
    assert_eq!(publisher.close_count(), 1);
}

#[tokio::test]
async fn test_publish_failure_still_closes_connection() {
    let publisher = MemoryPublisher::new();
    publisher.fail_publish_with("fake error");

    let result = relay(&publisher)
        .process_webhook(request("test", "build.finished", "{}"))
        .await;

    assert!(matches!(result, Err(RelayError::PublishFailure(_))));
    assert_eq!(publisher.close_count(), 1);
}

#[tokio::test]
async fn test_connect_failure_is_reported() {
    let publisher = MemoryPublisher::new();
    publisher.fail_connect_with("collector unreachable");

    let result = relay(&publisher)
        .process_webhook(request("test", "build.running", "{}"))
        .await;

    assert!(matches!(
        result,
        Err(RelayError::BackendConnectFailure { .. })
    ));
    assert_eq!(publisher.publish_count(), 0);
}

#[tokio::test]
async fn test_close_failure_does_not_fail_request() {
    let config = RelayConfig::new(None, Secret::new("license"), Secret::new("test")).unwrap();
    let relay = EventRelay::new(&config, Arc::new(FailingClose))
        .with_connect_timeout(Duration::from_secs(5));

    let result = relay
        .process_webhook(request("test", "build.running", "{}"))
        .await;

    assert!(result.is_ok());
}

#[tokio::test]
async fn test_dropped_invocation_still_closes_connection() {
    let config = RelayConfig::new(None, Secret::new("license"), Secret::new("test")).unwrap();
    let stalled = StalledPublish::default();
    let relay = EventRelay::new(&config, Arc::new(stalled.clone()));

    let outcome = tokio::time::timeout(
        Duration::from_millis(50),
        relay.process_webhook(request("test", "build.running", "{}")),
    )
    .await;
    assert!(outcome.is_err(), "publish should still be pending");

    for _ in 0..100 {
        if stalled.closes.load(Ordering::SeqCst) > 0 {
            break;
        }
        tokio::task::yield_now().await;
    }

    assert_eq!(stalled.closes.load(Ordering::SeqCst), 1);
}

#[test]
fn test_debug_redacts_webhook_token() {
    let publisher = MemoryPublisher::new();

    let rendered = format!("{:?}", relay(&publisher));

    assert!(rendered.starts_with("EventRelay"));
    assert!(rendered.contains("<REDACTED>"));
    assert!(!rendered.contains("\"test\""));
}
