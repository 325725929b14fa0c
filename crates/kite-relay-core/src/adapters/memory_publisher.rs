//! # In-Memory Publisher
//!
//! Recording [`Publisher`] for testing and local development. Every
//! connection handed out by the connector shares the same recorded state, so
//! a test can hold one handle and inspect what a relay published through it.

use crate::{Attributes, PublishError, Publisher, PublisherConnector};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Event captured by [`MemoryPublisher`]
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedEvent {
    pub event_name: String,
    pub attributes: Attributes,
}

#[derive(Debug, Default)]
struct RecordedState {
    events: Vec<PublishedEvent>,
    publish_failure: Option<String>,
    connect_failure: Option<String>,
    connections: usize,
    closes: usize,
}

/// Thread-safe recording publisher and connector
#[derive(Debug, Clone, Default)]
pub struct MemoryPublisher {
    state: Arc<Mutex<RecordedState>>,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `publish` fail with `message`
    pub fn fail_publish_with(&self, message: impl Into<String>) {
        self.lock().publish_failure = Some(message.into());
    }

    /// Make every subsequent `connect` fail with `message`
    pub fn fail_connect_with(&self, message: impl Into<String>) {
        self.lock().connect_failure = Some(message.into());
    }

    /// Events published so far, oldest first
    pub fn events(&self) -> Vec<PublishedEvent> {
        self.lock().events.clone()
    }

    pub fn publish_count(&self) -> usize {
        self.lock().events.len()
    }

    pub fn connection_count(&self) -> usize {
        self.lock().connections
    }

    pub fn close_count(&self) -> usize {
        self.lock().closes
    }

    fn lock(&self) -> MutexGuard<'_, RecordedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Publisher for MemoryPublisher {
    async fn publish(
        &self,
        event_name: &str,
        attributes: &Attributes,
    ) -> Result<(), PublishError> {
        let mut state = self.lock();

        if let Some(message) = &state.publish_failure {
            return Err(PublishError::Transport {
                message: message.clone(),
            });
        }

        state.events.push(PublishedEvent {
            event_name: event_name.to_string(),
            attributes: attributes.clone(),
        });
        Ok(())
    }

    async fn close(&self) -> Result<(), PublishError> {
        self.lock().closes += 1;
        Ok(())
    }
}

#[async_trait]
impl PublisherConnector for MemoryPublisher {
    async fn connect(&self) -> Result<Box<dyn Publisher>, PublishError> {
        let mut state = self.lock();

        if let Some(message) = &state.connect_failure {
            return Err(PublishError::Transport {
                message: message.clone(),
            });
        }

        state.connections += 1;
        Ok(Box::new(self.clone()))
    }
}

#[cfg(test)]
#[path = "memory_publisher_tests.rs"]
mod tests;
