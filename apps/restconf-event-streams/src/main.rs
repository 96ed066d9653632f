//! RESTCONF Event Streams Binary
//!
//! Starts the stream engine with its RESTCONF and health servers.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin restconf-event-streams
//! ```
//!
//! # Environment Variables
//!
//! - `RESTCONF_HTTP_PORT`: RESTCONF server port (default: 8181)
//! - `RESTCONF_HEALTH_PORT`: Health check HTTP port (default: 8182)
//! - `RESTCONF_SUBSCRIBER_BUFFER`: Events queued per subscriber (default: 1024)
//! - `RESTCONF_KEEPALIVE_SECS`: SSE keepalive interval (default: 15)
//! - `RESTCONF_MODEL_PATH`: JSON schema description to load (default: none)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: true)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4318>)
//! - `OTEL_SERVICE_NAME`: Service name (default: restconf-event-streams)
//! - `RUST_LOG`: Log filter (default: info)

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use restconf_event_streams::application::ports::{ChangeFeed, ModelProvider, NotificationFeed};
use restconf_event_streams::{
    EventHub, HealthServer, HealthServerState, ModelContext, RestconfServer, RestconfState,
    ServiceConfig, StaticModelProvider, StreamRegistry, StreamsService, init_metrics,
    init_telemetry, load_model_file,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    load_dotenv();

    // Initialize telemetry (OpenTelemetry + tracing)
    let _telemetry_guard = init_telemetry();

    tracing::info!("Starting RESTCONF event streams");

    if let Err(e) = init_metrics() {
        tracing::warn!(error = %e, "Prometheus recorder not installed");
    }

    let config = ServiceConfig::from_env()?;
    log_config(&config);

    let model = load_model(&config)?;
    tracing::info!(modules = model.modules().len(), "Schema loaded");
    let model: Arc<dyn ModelProvider> = Arc::new(StaticModelProvider::new(model));

    let shutdown_token = CancellationToken::new();

    let hub = Arc::new(EventHub::new(Arc::clone(&model)));
    let registry = Arc::new(StreamRegistry::new());
    let service = Arc::new(StreamsService::new(
        Arc::clone(&registry),
        Arc::clone(&model),
        Arc::clone(&hub) as Arc<dyn ChangeFeed>,
        Arc::clone(&hub) as Arc<dyn NotificationFeed>,
    ));

    // Spawn health server
    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        Arc::clone(&registry),
        Arc::clone(&hub),
        Arc::clone(&model),
    ));
    let health_server = HealthServer::new(
        config.server.health_port,
        health_state,
        shutdown_token.clone(),
    );
    tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    });

    // Spawn RESTCONF server
    let restconf_server = RestconfServer::new(
        config.server.http_port,
        RestconfState::new(service, &config.delivery),
        shutdown_token.clone(),
    );
    let restconf_handle = tokio::spawn(async move {
        if let Err(e) = restconf_server.run().await {
            tracing::error!(error = %e, "RESTCONF server error");
        }
    });

    tracing::info!("RESTCONF event streams ready");

    await_shutdown(shutdown_token).await;

    // Ending every stream lets open SSE responses finish so the server can
    // drain.
    registry.close_all();
    hub.shutdown();

    if tokio::time::timeout(SHUTDOWN_TIMEOUT, restconf_handle)
        .await
        .is_err()
    {
        tracing::warn!("RESTCONF server did not stop before the shutdown timeout");
    }

    tracing::info!("RESTCONF event streams stopped");
    Ok(())
}

/// Schema from the configured file, or an empty one.
fn load_model(config: &ServiceConfig) -> anyhow::Result<ModelContext> {
    match &config.model_path {
        Some(path) => load_model_file(path)
            .with_context(|| format!("loading schema from {}", path.display())),
        None => {
            tracing::warn!("RESTCONF_MODEL_PATH not set, starting with an empty schema");
            Ok(ModelContext::default())
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &ServiceConfig) {
    tracing::info!(
        http_port = config.server.http_port,
        health_port = config.server.health_port,
        subscriber_buffer = config.delivery.subscriber_buffer,
        keepalive_secs = config.delivery.keepalive_interval.as_secs(),
        "Configuration loaded"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
