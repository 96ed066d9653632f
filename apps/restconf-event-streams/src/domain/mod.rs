//! Domain Layer - Core stream and event types.
//!
//! Schema view, event payloads, rendering parameters, stream identity, and
//! the protocol error triple. Nothing here performs I/O.

/// Qualified names, instance paths, schema and data trees.
pub mod model;

/// Change batches and notifications.
pub mod event;

/// Per-subscription rendering parameters.
pub mod params;

/// Stream names and encodings.
pub mod stream;

/// RESTCONF error triple.
pub mod error;
