//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the stream pipeline, the services clients call, and
//! the port interfaces through which the engine reaches its collaborators.

/// Port interfaces for feeds, schema access, and transports.
pub mod ports;

/// Stream creation, subscription, and listing.
pub mod services;

/// Sources, sinks, and the stream registry.
pub mod streams;
