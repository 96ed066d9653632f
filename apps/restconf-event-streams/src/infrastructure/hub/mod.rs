//! In-Process Event Hub
//!
//! Implements the change and notification feed ports for events produced
//! inside this process.
//!
//! # Delivery
//!
//! - `publish_changes` and `publish_notification` dispatch synchronously on
//!   the calling thread while holding the listener table's read lock.
//! - Each listener has its own gate, so one listener never runs twice
//!   concurrently even when several producer threads publish at once.
//! - Closing a registration takes the write lock. Once `close` returns, no
//!   further callback for that listener will be observed. A registration
//!   must therefore not be closed from inside its own listener.
//!
//! # Scope
//!
//! A change listener on path `P` receives the records whose path is:
//! - `BASE`: exactly `P`
//! - `ONE`: `P` or a direct child of `P`
//! - `SUBTREE`: `P` or anything below it

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};

use crate::application::ports::{
    ChangeFeed, EventListener, FeedError, ModelProvider, NotificationFeed, Registration,
};
use crate::domain::event::{
    ChangeBatchEvent, ChangeRecord, Datastore, Event, NotificationEvent, Scope,
};
use crate::domain::model::{DataNode, InstancePath, QName};

// =============================================================================
// Listener Table
// =============================================================================

struct ChangeListener {
    datastore: Datastore,
    path: InstancePath,
    scope: Scope,
    listener: EventListener,
    gate: Mutex<()>,
}

struct NotificationListener {
    types: BTreeSet<QName>,
    listener: EventListener,
    gate: Mutex<()>,
}

#[derive(Default)]
struct HubState {
    changes: HashMap<u64, ChangeListener>,
    notifications: HashMap<u64, NotificationListener>,
    shut_down: bool,
}

// =============================================================================
// Event Hub
// =============================================================================

/// In-memory change and notification feed.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// use restconf_event_streams::application::ports::ChangeFeed;
/// use restconf_event_streams::domain::event::{ChangeRecord, Datastore, Scope};
/// use restconf_event_streams::domain::model::{DataNode, InstancePath, ModelContext, QName};
/// use restconf_event_streams::infrastructure::hub::EventHub;
/// use restconf_event_streams::infrastructure::model::StaticModelProvider;
///
/// let hub = EventHub::new(Arc::new(StaticModelProvider::new(ModelContext::default())));
/// let seen = Arc::new(AtomicUsize::new(0));
/// let counter = Arc::clone(&seen);
/// let path = InstancePath::parse("/toaster:toaster").unwrap();
///
/// let registration = hub
///     .register_change_listener(
///         Datastore::Operational,
///         &path,
///         Scope::One,
///         Arc::new(move |_, _, _| {
///             counter.fetch_add(1, Ordering::SeqCst);
///         }),
///     )
///     .unwrap();
///
/// let status = InstancePath::parse("/toaster:toaster/toasterStatus").unwrap();
/// let leaf = DataNode::leaf(QName::new("toaster", "toasterStatus"), "up");
/// hub.publish_changes(Datastore::Operational, vec![ChangeRecord::updated(status, None, leaf)]);
/// assert_eq!(seen.load(Ordering::SeqCst), 1);
///
/// registration.close();
/// assert_eq!(hub.stats().change_listeners, 0);
/// ```
pub struct EventHub {
    model: Arc<dyn ModelProvider>,
    state: Arc<RwLock<HubState>>,
    next_id: AtomicU64,
    available: AtomicBool,
}

impl EventHub {
    /// Create a hub that renders against `model`.
    #[must_use]
    pub fn new(model: Arc<dyn ModelProvider>) -> Self {
        Self {
            model,
            state: Arc::new(RwLock::new(HubState::default())),
            next_id: AtomicU64::new(1),
            available: AtomicBool::new(true),
        }
    }

    /// Deliver a set of datastore changes.
    ///
    /// Each listener receives one batch holding the records inside its
    /// scope. Returns the number of listeners that received a batch.
    pub fn publish_changes(&self, datastore: Datastore, records: Vec<ChangeRecord>) -> usize {
        if records.is_empty() {
            return 0;
        }
        let ctx = self.model.current_model_context();
        let now = Utc::now();
        let state = self.state.read();

        let mut delivered = 0;
        for entry in state.changes.values() {
            if entry.datastore != datastore {
                continue;
            }
            let matching: Vec<ChangeRecord> = records
                .iter()
                .filter(|record| entry.scope.includes(&entry.path, &record.path))
                .cloned()
                .collect();
            if matching.is_empty() {
                continue;
            }
            let event = Event::ChangeBatch(ChangeBatchEvent::new(matching));
            let _gate = entry.gate.lock();
            (entry.listener)(&ctx, &event, now);
            delivered += 1;
        }

        tracing::trace!(
            datastore = %datastore,
            records = records.len(),
            delivered,
            "Published change batch"
        );
        delivered
    }

    /// Deliver one notification, stamped `time` or now.
    ///
    /// Returns the number of listeners that received it.
    pub fn publish_notification(&self, body: DataNode, time: Option<DateTime<Utc>>) -> usize {
        let ctx = self.model.current_model_context();
        let now = time.unwrap_or_else(Utc::now);
        let notification = NotificationEvent::new(body);
        let qname = notification.qname().clone();
        let event = Event::Notification(notification);
        let state = self.state.read();

        let mut delivered = 0;
        for entry in state.notifications.values() {
            if !entry.types.contains(&qname) {
                continue;
            }
            let _gate = entry.gate.lock();
            (entry.listener)(&ctx, &event, now);
            delivered += 1;
        }

        tracing::trace!(notification = %qname, delivered, "Published notification");
        delivered
    }

    /// Mark the hub as able or unable to accept new listeners.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Whether new listeners are accepted.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst) && !self.state.read().shut_down
    }

    /// Drop every listener and refuse new ones.
    pub fn shutdown(&self) {
        let mut state = self.state.write();
        state.shut_down = true;
        state.changes.clear();
        state.notifications.clear();
    }

    /// Current listener counts.
    #[must_use]
    pub fn stats(&self) -> HubStats {
        let state = self.state.read();
        HubStats {
            change_listeners: state.changes.len(),
            notification_listeners: state.notifications.len(),
        }
    }

    fn check_accepting(&self) -> Result<(), FeedError> {
        if self.state.read().shut_down {
            return Err(FeedError::Closed);
        }
        if !self.available.load(Ordering::SeqCst) {
            return Err(FeedError::Unavailable("event hub is not accepting listeners".to_string()));
        }
        Ok(())
    }

    fn registration(&self, id: u64) -> Registration {
        let state: Weak<RwLock<HubState>> = Arc::downgrade(&self.state);
        Registration::new(move || {
            if let Some(state) = state.upgrade() {
                let mut state = state.write();
                state.changes.remove(&id);
                state.notifications.remove(&id);
            }
        })
    }
}

impl ChangeFeed for EventHub {
    fn register_change_listener(
        &self,
        datastore: Datastore,
        path: &InstancePath,
        scope: Scope,
        listener: EventListener,
    ) -> Result<Registration, FeedError> {
        self.check_accepting()?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.state.write().changes.insert(
            id,
            ChangeListener {
                datastore,
                path: path.clone(),
                scope,
                listener,
                gate: Mutex::new(()),
            },
        );
        tracing::debug!(id, datastore = %datastore, path = %path, scope = %scope, "Change listener registered");
        Ok(self.registration(id))
    }
}

impl NotificationFeed for EventHub {
    fn register_notification_listener(
        &self,
        types: &BTreeSet<QName>,
        listener: EventListener,
    ) -> Result<Registration, FeedError> {
        self.check_accepting()?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.state.write().notifications.insert(
            id,
            NotificationListener {
                types: types.clone(),
                listener,
                gate: Mutex::new(()),
            },
        );
        tracing::debug!(id, types = types.len(), "Notification listener registered");
        Ok(self.registration(id))
    }
}

impl std::fmt::Debug for EventHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHub")
            .field("stats", &self.stats())
            .field("available", &self.available.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Hub Statistics
// =============================================================================

/// Listener counts for monitoring.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HubStats {
    /// Registered change listeners.
    pub change_listeners: usize,
    /// Registered notification listeners.
    pub notification_listeners: usize,
}

impl HubStats {
    /// All listeners.
    #[must_use]
    pub const fn total_listeners(&self) -> usize {
        self.change_listeners + self.notification_listeners
    }
}

// =============================================================================
// Tests
// =============================================================================
