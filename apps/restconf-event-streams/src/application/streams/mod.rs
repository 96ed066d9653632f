//! Stream Pipeline
//!
//! The producer and subscriber halves of a stream and the registry that
//! names them.
//!
//! # Flow
//!
//! ```text
//! feed ──listener──> Sink::publish ──filter──> formatter ──> TransportWriter
//!   ^                                                            │
//!   └──── Registration (closed by EventStream::close) ───────────┘
//! ```
//!
//! A stream accepts exactly one subscriber. When that subscriber detaches
//! the stream is closed and removed from the registry.

mod registry;
mod sink;
mod source;

pub use registry::{RegistryError, StreamInfo, StreamRegistry};
pub use sink::{Sink, SinkStats};
pub use source::{EventStream, Source, SourceFeed, StreamError, StreamState};
