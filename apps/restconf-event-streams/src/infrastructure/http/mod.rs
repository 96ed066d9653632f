//! HTTP/REST API adapter.
//!
//! Inbound adapter serving the stream-creation operations, the stream
//! listing, and Server-Sent Events delivery.

mod controller;
mod request;
mod response;
mod sse;

pub use controller::{RestconfServer, RestconfState, ServerError, create_router};
pub use request::{SubscribeOptions, parse_rpc_input};
pub use response::{ErrorResponse, StreamAccess, StreamEntry, StreamList, StreamsResponse, negotiate};
pub use sse::{SseWriter, SubscriptionStream};

/// Path prefix under which streams are subscribed, followed by
/// `/<encoding>/<stream name>`.
pub const STREAM_LOCATION: &str = "/rests/streams";
