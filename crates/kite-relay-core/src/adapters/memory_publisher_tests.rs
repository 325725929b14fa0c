//! Tests for the in-memory publisher.

use super::*;
use crate::AttributeValue;

fn sample_attributes() -> Attributes {
    let mut attributes = Attributes::new();
    attributes.insert("BuildID".to_string(), AttributeValue::from("b-1"));
    attributes
}

#[tokio::test]
async fn test_publish_records_events_in_order() {
    let publisher = MemoryPublisher::new();

    publisher
        .publish("BuildEvent", &sample_attributes())
        .await
        .unwrap();
    publisher.publish("JobEvent", &Attributes::new()).await.unwrap();

    let events = publisher.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].event_name, "BuildEvent");
    assert_eq!(events[0].attributes, sample_attributes());
    assert_eq!(events[1].event_name, "JobEvent");
}

#[tokio::test]
async fn test_publish_failure_records_nothing() {
    let publisher = MemoryPublisher::new();
    publisher.fail_publish_with("fake error");

    let result = publisher.publish("BuildEvent", &sample_attributes()).await;

    match result {
        Err(PublishError::Transport { message }) => assert_eq!(message, "fake error"),
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(publisher.publish_count(), 0);
}

#[tokio::test]
async fn test_connections_share_recorded_state() {
    let recorder = MemoryPublisher::new();

    let connection = recorder.connect().await.unwrap();
    connection
        .publish("JobEvent", &sample_attributes())
        .await
        .unwrap();
    connection.close().await.unwrap();

    assert_eq!(recorder.connection_count(), 1);
    assert_eq!(recorder.publish_count(), 1);
    assert_eq!(recorder.close_count(), 1);
}

#[tokio::test]
async fn test_connect_failure() {
    let recorder = MemoryPublisher::new();
    recorder.fail_connect_with("collector unreachable");

    let result = recorder.connect().await;

    assert!(matches!(result, Err(PublishError::Transport { .. })));
    assert_eq!(recorder.connection_count(), 0);
}
