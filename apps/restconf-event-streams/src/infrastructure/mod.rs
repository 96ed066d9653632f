//! Infrastructure Layer - Adapters and external integrations.
//!
//! Concrete implementations of the ports defined in the application layer,
//! plus the HTTP surfaces and ambient services.

/// JSON and XML event rendering.
pub mod formatter;

/// XPath event filters.
pub mod filter;

/// In-memory change and notification feeds.
pub mod hub;

/// Schema loading and the model provider.
pub mod model;

/// RESTCONF HTTP surface and SSE delivery.
pub mod http;

/// Configuration loading.
pub mod config;

/// Health check HTTP endpoint.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// OpenTelemetry tracing integration.
pub mod telemetry;
