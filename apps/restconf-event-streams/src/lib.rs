#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! RESTCONF Event Streams - Subscription and Delivery Engine
//!
//! Registers named event streams over datastore changes and YANG
//! notifications, and delivers each event to a stream's subscriber as a
//! filtered JSON or XML document over Server-Sent Events.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Schema model, event records, stream identity, protocol errors
//!   - `model`: Qualified names, instance paths, schema and data trees
//!   - `event`: Change records, notifications, datastores and scopes
//!   - `params`: Text rendering switches
//!
//! - **Application**: Ports and the stream engine
//!   - `ports`: Feeds, model provider, transport writer
//!   - `streams`: Sources, sinks, the stream registry
//!   - `services`: Stream creation, subscribe, listing
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `formatter`: JSON and XML rendering
//!   - `filter`: XPath event filters
//!   - `hub`: In-memory change and notification feeds
//!   - `http`: RESTCONF surface and SSE delivery
//!   - `config`, `health`, `metrics`, `telemetry`
//!
//! # Data Flow
//!
//! ```text
//! publish ──► EventHub ──► Source ──► Sink ──► filter ──► formatter ──► SSE
//!                            ▲
//!              StreamRegistry┘ (one subscriber per stream)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Schema, events and protocol types with no I/O.
pub mod domain;

/// Application layer - Ports, stream engine and services.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

#[cfg(test)]
pub(crate) mod test_support;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::error::{ErrorTag, ErrorType, RestconfError};
pub use domain::model::ModelContext;
pub use domain::stream::{EncodingName, StreamName};

// Stream engine
pub use application::services::{StreamsService, Subscription};
pub use application::streams::{StreamInfo, StreamRegistry, StreamState};

// Feeds and schema
pub use infrastructure::hub::EventHub;
pub use infrastructure::model::{StaticModelProvider, load_model_file};

// Infrastructure config
pub use infrastructure::config::{ConfigError, DeliverySettings, ServerSettings, ServiceConfig};

// HTTP servers
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};
pub use infrastructure::http::{RestconfServer, RestconfState, ServerError, create_router};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
