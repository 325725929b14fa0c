//! # Kite-Relay Service
//!
//! Binary entry point for the Kite-Relay HTTP service.
//!
//! This executable:
//! - Loads configuration from files and the environment
//! - Initializes structured logging
//! - Verifies the New Relic collector accepts the license key
//! - Starts the HTTP server from kite-relay-api
//!
//! Exit codes: `1` bind failure, `2` server failure, `3` configuration
//! error, `4` metrics backend unavailable at startup.

mod newrelic;

use anyhow::Context;
use kite_relay_api::{start_server, LoggingConfig, ServiceConfig, ServiceError};
use kite_relay_core::{publisher::connect_with_timeout, EventRelay, RelayConfig};
use newrelic::NewRelicConnector;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let service_config = match ServiceConfig::load().and_then(|config| {
        config.validate()?;
        Ok(config)
    }) {
        Ok(config) => config,
        Err(e) => {
            init_logging(&LoggingConfig::default());
            error!(error = %e, "Failed to load configuration; aborting");
            std::process::exit(3);
        }
    };

    init_logging(&service_config.logging);

    info!(version = env!("CARGO_PKG_VERSION"), "Starting Kite-Relay Service");

    if let Err(e) = run(service_config).await {
        error!(error = %e, "Kite-Relay Service stopped with an error");
        std::process::exit(e.exit_code());
    }

    Ok(())
}

/// Wire the relay and serve until shutdown
async fn run(service_config: ServiceConfig) -> Result<(), ServiceError> {
    let relay_config = service_config.relay_config()?;
    let connect_timeout = Duration::from_secs(service_config.newrelic.connect_timeout_seconds);

    let connector = Arc::new(NewRelicConnector::new(
        &relay_config,
        &service_config.newrelic.collector_url,
        connect_timeout,
    )?);

    verify_backend(&connector, connect_timeout)
        .await
        .map_err(|e| ServiceError::BackendConnectFailed {
            message: format!("{e:#}"),
        })?;

    let relay = EventRelay::new(&relay_config, connector).with_connect_timeout(connect_timeout);

    log_relay_identity(&relay_config);

    start_server(service_config, Arc::new(relay)).await
}

/// Open and close one collector session so bad credentials fail at startup
async fn verify_backend(connector: &NewRelicConnector, timeout: Duration) -> anyhow::Result<()> {
    let publisher = connect_with_timeout(connector, timeout)
        .await
        .context("Unable to connect to New Relic")?;

    if let Err(e) = publisher.close().await {
        warn!(error = %e, "Failed to close startup collector session");
    }

    info!("New Relic collector connection verified");
    Ok(())
}

fn log_relay_identity(relay_config: &RelayConfig) {
    info!(app_name = %relay_config.app_name, "Relaying Buildkite events");
}

fn init_logging(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = &logging.level;
        format!(
            "kite_relay_service={level},kite_relay_api={level},kite_relay_core={level},tower_http=debug"
        )
        .into()
    });

    let registry = tracing_subscriber::registry().with(filter);

    if logging.json_format {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
