//! # Kite-Relay HTTP Service
//!
//! HTTP server receiving Buildkite webhooks and relaying them through a
//! [`WebhookProcessor`].
//!
//! This service provides:
//! - the webhook endpoint (`POST /webhook` by default)
//! - a liveness endpoint (`GET /health`)

pub mod errors;
pub mod settings;

pub use errors::{ConfigError, RelayHandlerError, ServiceError, SUCCESS_BODY};
pub use settings::{
    LoggingConfig, NewRelicConfig, RelaySettings, ServerConfig, ServiceConfig, WebhookConfig,
};

use axum::{
    extract::{DefaultBodyLimit, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use bytes::Bytes;
use kite_relay_core::{WebhookHeaders, WebhookProcessor, WebhookRequest};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, future::IntoFuture, sync::Arc, time::Duration};
use tower_http::trace::TraceLayer;
use tracing::{info, instrument};

/// Path of the liveness endpoint
pub const HEALTH_PATH: &str = "/health";

// ============================================================================
// Application State
// ============================================================================

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServiceConfig>,
    pub processor: Arc<dyn WebhookProcessor>,
}

impl AppState {
    pub fn new(config: ServiceConfig, processor: Arc<dyn WebhookProcessor>) -> Self {
        Self {
            config: Arc::new(config),
            processor,
        }
    }
}

/// Liveness response body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

// ============================================================================
// HTTP Server
// ============================================================================

/// Create HTTP router with all endpoints
pub fn create_router(state: AppState) -> Router {
    let max_body_size = state.config.server.max_body_size;

    Router::new()
        .route(&state.config.webhooks.endpoint_path, post(handle_webhook))
        .route(HEALTH_PATH, get(handle_health_check))
        .layer(DefaultBodyLimit::max(max_body_size))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start HTTP server
///
/// Runs until SIGINT or SIGTERM is received, then lets in-flight requests
/// finish for at most `server.shutdown_timeout_seconds`.
pub async fn start_server(
    config: ServiceConfig,
    processor: Arc<dyn WebhookProcessor>,
) -> Result<(), ServiceError> {
    let addr = config.socket_addr()?;
    let shutdown_timeout = Duration::from_secs(config.server.shutdown_timeout_seconds);

    let app = create_router(AppState::new(config, processor));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ServiceError::BindFailed {
            address: addr.to_string(),
            message: e.to_string(),
        })?;

    info!(address = %addr, "Starting HTTP server");

    let (signalled_tx, signalled_rx) = tokio::sync::oneshot::channel::<()>();
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        shutdown_signal().await;
        let _ = signalled_tx.send(());
    })
    .into_future();

    // Bound the drain: once a signal arrives, in-flight requests get
    // `shutdown_timeout` to finish.
    let drain_deadline = async move {
        if signalled_rx.await.is_ok() {
            tokio::time::sleep(shutdown_timeout).await;
        } else {
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        result = server => result.map_err(|e| ServiceError::ServerFailed {
            message: e.to_string(),
        })?,
        _ = drain_deadline => {
            tracing::warn!(
                timeout_seconds = shutdown_timeout.as_secs(),
                "Graceful shutdown timed out; dropping in-flight requests"
            );
        }
    }

    info!("HTTP server shutdown complete");
    Ok(())
}

/// Resolve once SIGINT or SIGTERM is received
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C signal handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT (Ctrl+C), initiating graceful shutdown"),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown"),
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Handle Buildkite webhook requests
///
/// Each call runs the full relay pipeline to completion before responding.
/// Success answers `200` with a fixed plain-text greeting; failures are
/// mapped by [`RelayHandlerError`].
#[instrument(skip(state, headers, body), fields(body_size = body.len()))]
pub async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, RelayHandlerError> {
    let header_map: HashMap<String, String> = headers
        .iter()
        .map(|(k, v)| {
            (
                k.as_str().to_lowercase(),
                v.to_str().unwrap_or("").to_string(),
            )
        })
        .collect();

    let request = WebhookRequest::new(WebhookHeaders::from_http_headers(&header_map), body);

    let dispatched = state.processor.process_webhook(request).await?;

    info!(
        event_kind = %dispatched.event_kind,
        event_name = %dispatched.event_name,
        "Successfully processed webhook"
    );

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        SUCCESS_BODY,
    ))
}

/// Basic health check endpoint
async fn handle_health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "kite-relay".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
