//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - `ChangeFeed`: datastore change notifications under a path
//! - `NotificationFeed`: YANG notifications by type
//! - `ModelProvider`: the schema currently in effect
//! - `TransportWriter`: one live subscriber connection
//!
//! Feeds hand events to a single `EventListener` closure and return a
//! `Registration`. Once `Registration::close` returns, the feed must not
//! invoke the listener again.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::domain::event::{Datastore, Event, Scope};
use crate::domain::model::{InstancePath, ModelContext, QName};

// =============================================================================
// Listener and Registration
// =============================================================================

/// Callback invoked by a feed for every event, with the schema in effect at
/// delivery time and the event timestamp.
pub type EventListener = Arc<dyn Fn(&ModelContext, &Event, DateTime<Utc>) + Send + Sync>;

type Closer = Box<dyn FnOnce() + Send>;

/// Handle for an active feed registration.
///
/// Closing is idempotent; dropping the handle closes it.
pub struct Registration {
    closer: Mutex<Option<Closer>>,
}

impl Registration {
    /// Registration that runs `closer` exactly once on close.
    #[must_use]
    pub fn new(closer: impl FnOnce() + Send + 'static) -> Self {
        Self {
            closer: Mutex::new(Some(Box::new(closer))),
        }
    }

    /// Registration with nothing to release.
    #[must_use]
    pub fn noop() -> Self {
        Self {
            closer: Mutex::new(None),
        }
    }

    /// Release the registration.
    pub fn close(&self) {
        let closer = self.closer.lock().take();
        if let Some(closer) = closer {
            closer();
        }
    }

    /// Whether `close` has already run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closer.lock().is_none()
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("closed", &self.is_closed())
            .finish()
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Feed registration failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeedError {
    /// The underlying service cannot accept listeners right now.
    #[error("event feed unavailable: {0}")]
    Unavailable(String),

    /// The feed has shut down.
    #[error("event feed closed")]
    Closed,
}

/// Transport write failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum WriteError {
    /// Subscriber is not keeping up; this frame was not queued.
    #[error("subscriber buffer full")]
    Full,

    /// Peer has gone away.
    #[error("subscriber connection closed")]
    Closed,
}

// =============================================================================
// Ports
// =============================================================================

/// Source of datastore change batches.
pub trait ChangeFeed: Send + Sync {
    /// Register `listener` for changes under `path` in `datastore`.
    ///
    /// # Errors
    ///
    /// Returns `FeedError` if the feed cannot accept the registration.
    fn register_change_listener(
        &self,
        datastore: Datastore,
        path: &InstancePath,
        scope: Scope,
        listener: EventListener,
    ) -> Result<Registration, FeedError>;
}

/// Source of YANG notifications.
pub trait NotificationFeed: Send + Sync {
    /// Register `listener` for notifications of any of `types`.
    ///
    /// # Errors
    ///
    /// Returns `FeedError` if the feed cannot accept the registration.
    fn register_notification_listener(
        &self,
        types: &BTreeSet<QName>,
        listener: EventListener,
    ) -> Result<Registration, FeedError>;
}

/// Access to the schema currently in effect.
pub trait ModelProvider: Send + Sync {
    /// Current schema snapshot.
    fn current_model_context(&self) -> Arc<ModelContext>;
}

/// One live subscriber connection.
#[cfg_attr(test, mockall::automock)]
pub trait TransportWriter: Send + Sync {
    /// Queue one rendered document without blocking.
    ///
    /// # Errors
    ///
    /// `WriteError::Full` when the subscriber is behind, `WriteError::Closed`
    /// when the peer has gone.
    fn write(&self, text: String) -> Result<(), WriteError>;

    /// Signal that no further documents will follow.
    fn end_of_stream(&self);
}

// =============================================================================
// Tests
// =============================================================================
