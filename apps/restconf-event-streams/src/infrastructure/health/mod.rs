//! Health Check and Metrics Endpoint
//!
//! HTTP endpoint for health checks, stream engine status reporting, and
//! Prometheus metrics. Used by container orchestrators, load balancers, and
//! monitoring systems.
//!
//! # Endpoints
//!
//! - `GET /health` - Returns JSON health status
//! - `GET /healthz` - Kubernetes liveness probe (simple OK)
//! - `GET /readyz` - Kubernetes readiness probe (schema loaded, feeds accepting)
//! - `GET /metrics` - Prometheus metrics in text format

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::application::ports::ModelProvider;
use crate::application::streams::StreamRegistry;
use crate::infrastructure::hub::EventHub;
use crate::infrastructure::metrics::get_metrics_handle;

// =============================================================================
// Health Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status: "healthy", "degraded", or "unhealthy".
    pub status: HealthStatus,
    /// Service version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Event feed status.
    pub feeds: FeedStatus,
    /// Stream registry status.
    pub streams: StreamStatus,
    /// Schema status.
    pub model: ModelStatus,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// All systems operational.
    Healthy,
    /// Serving, but no schema is loaded so nothing can be subscribed.
    Degraded,
    /// Feeds are not accepting listeners.
    Unhealthy,
}

/// Event feed status.
#[derive(Debug, Clone, Serialize)]
pub struct FeedStatus {
    /// Whether new listeners are accepted.
    pub available: bool,
    /// Registered change listeners.
    pub change_listeners: usize,
    /// Registered notification listeners.
    pub notification_listeners: usize,
}

/// Stream registry status.
#[derive(Debug, Clone, Serialize)]
pub struct StreamStatus {
    /// Streams in the registry.
    pub registered: usize,
    /// Streams with an attached subscriber.
    pub subscribers: usize,
}

/// Schema status.
#[derive(Debug, Clone, Serialize)]
pub struct ModelStatus {
    /// Loaded modules.
    pub modules: usize,
}

// =============================================================================
// Health Server State
// =============================================================================

/// Shared state for the health server.
pub struct HealthServerState {
    version: String,
    started_at: Instant,
    registry: Arc<StreamRegistry>,
    hub: Arc<EventHub>,
    model: Arc<dyn ModelProvider>,
}

impl HealthServerState {
    /// Create new health server state.
    #[must_use]
    pub fn new(
        version: String,
        registry: Arc<StreamRegistry>,
        hub: Arc<EventHub>,
        model: Arc<dyn ModelProvider>,
    ) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            registry,
            hub,
            model,
        }
    }
}

// =============================================================================
// Health Server
// =============================================================================

/// Health check HTTP server.
pub struct HealthServer {
    port: u16,
    state: Arc<HealthServerState>,
    cancel: CancellationToken,
}

impl HealthServer {
    /// Create a new health server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<HealthServerState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Run the health server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HealthServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), HealthServerError> {
        let app = router(self.state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HealthServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "Health server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HealthServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Health server stopped");
        Ok(())
    }
}

/// Routes served by the health server.
pub fn router(state: Arc<HealthServerState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/healthz", get(liveness_handler))
        .route("/readyz", get(readiness_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn health_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let response = build_health_response(&state);
    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let response = build_health_response(&state);

    if response.status == HealthStatus::Healthy {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            let body = handle.render();
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                body,
            )
        },
    )
}

fn build_health_response(state: &HealthServerState) -> HealthResponse {
    let hub_stats = state.hub.stats();
    let feeds = FeedStatus {
        available: state.hub.is_available(),
        change_listeners: hub_stats.change_listeners,
        notification_listeners: hub_stats.notification_listeners,
    };
    let model = ModelStatus {
        modules: state.model.current_model_context().modules().len(),
    };

    HealthResponse {
        status: determine_health_status(&feeds, &model),
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        feeds,
        streams: StreamStatus {
            registered: state.registry.len(),
            subscribers: state.registry.active_count(),
        },
        model,
    }
}

fn determine_health_status(feeds: &FeedStatus, model: &ModelStatus) -> HealthStatus {
    match (feeds.available, model.modules) {
        (false, _) => HealthStatus::Unhealthy,
        (true, 0) => HealthStatus::Degraded,
        (true, _) => HealthStatus::Healthy,
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Health server errors.
#[derive(Debug, thiserror::Error)]
pub enum HealthServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::domain::model::ModelContext;
    use crate::infrastructure::model::StaticModelProvider;
    use crate::test_support::toaster_context;

    fn make_test_state(context: ModelContext) -> (Arc<HealthServerState>, Arc<EventHub>) {
        let model: Arc<dyn ModelProvider> = Arc::new(StaticModelProvider::new(context));
        let hub = Arc::new(EventHub::new(Arc::clone(&model)));
        let state = HealthServerState::new(
            "0.1.0".to_string(),
            Arc::new(StreamRegistry::new()),
            Arc::clone(&hub),
            model,
        );
        (Arc::new(state), hub)
    }

    fn feeds(available: bool) -> FeedStatus {
        FeedStatus {
            available,
            change_listeners: 0,
            notification_listeners: 0,
        }
    }

    #[test]
    fn health_status_serialization() {
        assert_eq!(
            serde_json::to_string(&HealthStatus::Healthy).unwrap(),
            "\"healthy\""
        );
        assert_eq!(
            serde_json::to_string(&HealthStatus::Degraded).unwrap(),
            "\"degraded\""
        );
        assert_eq!(
            serde_json::to_string(&HealthStatus::Unhealthy).unwrap(),
            "\"unhealthy\""
        );
    }

    #[test]
    fn determine_status() {
        let loaded = ModelStatus { modules: 1 };
        let empty = ModelStatus { modules: 0 };
        assert_eq!(determine_health_status(&feeds(true), &loaded), HealthStatus::Healthy);
        assert_eq!(determine_health_status(&feeds(true), &empty), HealthStatus::Degraded);
        assert_eq!(determine_health_status(&feeds(false), &loaded), HealthStatus::Unhealthy);
    }

    #[tokio::test]
    async fn readiness_requires_schema() {
        let (ready, _) = make_test_state(toaster_context());
        let response = router(ready)
            .oneshot(Request::get("/readyz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let (not_ready, _) = make_test_state(ModelContext::default());
        let response = router(not_ready)
            .oneshot(Request::get("/readyz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn health_reports_unavailable_feeds() {
        let (state, hub) = make_test_state(toaster_context());
        hub.set_available(false);

        let response = router(state)
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "unhealthy");
        assert_eq!(json["model"]["modules"], 1);
        assert_eq!(json["streams"]["registered"], 0);
    }

    #[tokio::test]
    async fn liveness_is_always_ok() {
        let (state, _) = make_test_state(ModelContext::default());
        let response = router(state)
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
