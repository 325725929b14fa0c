//! Common test utilities for kite-relay-api integration tests
//!
//! This module provides:
//! - a router wired to a real [`EventRelay`] and a recording publisher
//! - request builders and response readers

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use kite_relay_api::{create_router, AppState, ServiceConfig};
use kite_relay_core::{EventRelay, MemoryPublisher, RelayConfig, Secret};
use std::sync::Arc;
use tower::ServiceExt;

/// Token the test relay is configured with
pub const TEST_TOKEN: &str = "test";

/// Router plus the publisher it relays into
pub struct TestService {
    pub router: Router,
    pub publisher: MemoryPublisher,
}

impl TestService {
    pub fn new() -> Self {
        Self::with_config(ServiceConfig::default())
    }

    pub fn with_config(config: ServiceConfig) -> Self {
        let publisher = MemoryPublisher::new();
        let relay_config = RelayConfig::new(
            None,
            Secret::new("test-license-key"),
            Secret::new(TEST_TOKEN),
        )
        .expect("test relay config is valid");
        let relay = EventRelay::new(&relay_config, Arc::new(publisher.clone()));

        Self {
            router: create_router(AppState::new(config, Arc::new(relay))),
            publisher,
        }
    }

    /// Send one request through a fresh clone of the router
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, String) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("response body is readable");
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// POST to `/webhook` with the Buildkite headers
pub fn webhook_request(token: &str, event_kind: &str, body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/webhook")
        .header("X-Buildkite-Token", token)
        .header("X-Buildkite-Event", event_kind)
        .header("Content-Type", "application/json")
        .body(body.into())
        .expect("request is well formed")
}
