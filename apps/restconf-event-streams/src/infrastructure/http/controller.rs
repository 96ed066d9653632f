//! HTTP Controller (Driver Adapter)
//!
//! Axum router for the RESTCONF stream surface. Handlers decode requests,
//! delegate to `StreamsService`, and render `RestconfError`s in the
//! negotiated encoding.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::Bytes,
    extract::{Path, Query, State, rejection::QueryRejection},
    http::{HeaderMap, StatusCode},
    response::{
        IntoResponse, Response,
        sse::{KeepAlive, Sse},
    },
    routing::{delete, get, post},
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::application::ports::TransportWriter;
use crate::application::services::{
    DataChangeSubscriptionInput, NotificationStreamInput, RpcResponse, StreamsService,
};
use crate::domain::error::{ErrorTag, ErrorType, RestconfError};
use crate::domain::stream::{EncodingName, StreamName};
use crate::infrastructure::config::DeliverySettings;

use super::request::{SubscribeOptions, parse_rpc_input};
use super::response::{ErrorResponse, StreamsResponse, negotiate, yang_json};
use super::sse::{SseWriter, SubscriptionStream};

const DATA_CHANGE_RPC: &str = "/rests/operations/sal-remote:create-data-change-event-subscription";
const NOTIFICATION_RPC: &str = "/rests/operations/sal-remote:create-notification-stream";
const STREAMS_LISTING: &str = "/rests/data/ietf-restconf-monitoring:restconf-state/streams";

// =============================================================================
// State and Router
// =============================================================================

/// Application state shared across handlers.
#[derive(Clone)]
pub struct RestconfState {
    /// Stream operations.
    pub service: Arc<StreamsService>,
    /// Interval between SSE keepalive comments.
    pub keepalive: Duration,
    /// Per-subscriber channel capacity.
    pub buffer: usize,
}

impl RestconfState {
    /// State over `service` with delivery tuning from `settings`.
    #[must_use]
    pub const fn new(service: Arc<StreamsService>, settings: &DeliverySettings) -> Self {
        Self {
            service,
            keepalive: settings.keepalive_interval,
            buffer: settings.subscriber_buffer,
        }
    }
}

/// Create the HTTP router with all endpoints.
pub fn create_router(state: RestconfState) -> Router {
    Router::new()
        .route(DATA_CHANGE_RPC, post(create_data_change_subscription))
        .route(NOTIFICATION_RPC, post(create_notification_stream))
        .route(STREAMS_LISTING, get(list_streams))
        .route(
            &format!("{STREAMS_LISTING}/stream/{{*name}}"),
            delete(remove_stream),
        )
        .route(
            &format!("{}/{{encoding}}/{{*name}}", super::STREAM_LOCATION),
            get(subscribe),
        )
        .with_state(state)
}

// =============================================================================
// Handlers
// =============================================================================

async fn create_data_change_subscription(
    State(state): State<RestconfState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let result = parse_rpc_input::<DataChangeSubscriptionInput>(&body)
        .and_then(|input| state.service.create_data_change_subscription(&input));
    match result {
        Ok(output) => yang_json(StatusCode::OK, &RpcResponse { output }),
        Err(e) => error_response(e, negotiate(&headers)),
    }
}

async fn create_notification_stream(
    State(state): State<RestconfState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let result = parse_rpc_input::<NotificationStreamInput>(&body)
        .and_then(|input| state.service.create_notification_stream(&input));
    match result {
        Ok(output) => yang_json(StatusCode::OK, &RpcResponse { output }),
        Err(e) => error_response(e, negotiate(&headers)),
    }
}

async fn list_streams(State(state): State<RestconfState>) -> Response {
    yang_json(
        StatusCode::OK,
        &StreamsResponse::from(state.service.list_streams()),
    )
}

async fn remove_stream(
    State(state): State<RestconfState>,
    Path(name): Path<String>,
) -> StatusCode {
    let name = StreamName::from_uri_path(&name);
    if state.service.remove_stream(&name) {
        tracing::info!(stream = %name, "Stream removed");
    }
    StatusCode::NO_CONTENT
}

async fn subscribe(
    State(state): State<RestconfState>,
    Path((encoding, name)): Path<(String, String)>,
    headers: HeaderMap,
    query: Result<Query<Vec<(String, String)>>, QueryRejection>,
) -> Response {
    let Some(encoding) = EncodingName::from_str_case_insensitive(&encoding) else {
        return error_response(
            RestconfError::invalid_value(format!("unknown encoding '{encoding}'")),
            negotiate(&headers),
        );
    };
    let name = StreamName::from_uri_path(&name);

    let options = match query {
        Ok(Query(pairs)) => SubscribeOptions::from_pairs(&pairs),
        Err(e) => Err(RestconfError::new(
            ErrorType::Protocol,
            ErrorTag::MalformedMessage,
            e.body_text(),
        )),
    };
    let options = match options {
        Ok(options) => options,
        Err(e) => return error_response(e, encoding),
    };

    let (writer, rx) = SseWriter::channel(state.buffer);
    let writer: Arc<dyn TransportWriter> = Arc::new(writer);
    let subscription = match state.service.subscribe(
        &name,
        encoding,
        options.params,
        options.filter.as_deref(),
        writer,
    ) {
        Ok(subscription) => subscription,
        Err(e) => {
            tracing::warn!(stream = %name, error = %e, "Subscribe rejected");
            return error_response(e, encoding);
        }
    };

    tracing::info!(
        stream = %name,
        encoding = %encoding,
        filtered = options.filter.is_some(),
        "Subscriber attached"
    );

    Sse::new(SubscriptionStream::new(rx, subscription))
        .keep_alive(KeepAlive::new().interval(state.keepalive))
        .into_response()
}

fn error_response(error: RestconfError, encoding: EncodingName) -> Response {
    ErrorResponse::new(error, encoding).into_response()
}

// =============================================================================
// Server
// =============================================================================

/// RESTCONF HTTP server.
pub struct RestconfServer {
    port: u16,
    state: RestconfState,
    cancel: CancellationToken,
}

impl RestconfServer {
    /// Create a new server.
    #[must_use]
    pub const fn new(port: u16, state: RestconfState, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Run the server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `ServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), ServerError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "RESTCONF server listening");

        axum::serve(listener, create_router(self.state))
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| ServerError::ServerFailed(e.to_string()))?;

        tracing::info!("RESTCONF server stopped");
        Ok(())
    }
}

/// RESTCONF server errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
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
