//! Process-wide table of named streams.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use super::source::{EventStream, Source, StreamState};
use crate::domain::stream::{EncodingName, StreamName};
use crate::infrastructure::metrics;

/// Registry errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// Another stream holds this name.
    #[error("stream {0} already exists")]
    Duplicate(StreamName),

    /// No stream has this name.
    #[error("stream {0} does not exist")]
    NotFound(StreamName),
}

/// Read-only view of one stream for listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    /// Stream name.
    pub name: StreamName,
    /// Source description.
    pub description: String,
    /// Encodings offered.
    pub encodings: Vec<EncodingName>,
    /// Lifecycle state.
    pub state: StreamState,
    /// Registration time.
    pub created_at: DateTime<Utc>,
}

/// Named streams, at most one per name.
///
/// Insert and remove take the write lock, so a name check and its insert
/// happen in one critical section. Streams are closed after the lock is
/// released.
///
/// # Example
///
/// ```rust
/// use std::collections::BTreeSet;
/// use std::sync::Arc;
///
/// use restconf_event_streams::application::streams::{RegistryError, Source, StreamRegistry};
/// use restconf_event_streams::domain::model::ModelContext;
/// use restconf_event_streams::domain::stream::StreamName;
/// use restconf_event_streams::infrastructure::hub::EventHub;
/// use restconf_event_streams::infrastructure::model::StaticModelProvider;
///
/// let hub = Arc::new(EventHub::new(Arc::new(StaticModelProvider::new(ModelContext::default()))));
/// let registry = StreamRegistry::new();
/// let name = StreamName::new("my-stream");
///
/// let source = Source::notification(hub.clone(), BTreeSet::new());
/// assert_eq!(registry.create(Some(name.clone()), source), Ok(name.clone()));
///
/// let again = Source::notification(hub, BTreeSet::new());
/// assert_eq!(
///     registry.create(Some(name.clone()), again),
///     Err(RegistryError::Duplicate(name.clone()))
/// );
///
/// registry.remove(&name);
/// registry.remove(&name);
/// assert!(registry.is_empty());
/// ```
#[derive(Debug, Default)]
pub struct StreamRegistry {
    streams: RwLock<HashMap<StreamName, Arc<EventStream>>>,
}

impl StreamRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `source` under `name`, or under a generated name when `None`.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::Duplicate` if the name is taken.
    pub fn create(
        &self,
        name: Option<StreamName>,
        source: Source,
    ) -> Result<StreamName, RegistryError> {
        let name = name.unwrap_or_else(|| StreamName::new(Uuid::new_v4().to_string()));
        let count = {
            let mut streams = self.streams.write();
            match streams.entry(name.clone()) {
                Entry::Occupied(_) => return Err(RegistryError::Duplicate(name)),
                Entry::Vacant(slot) => {
                    slot.insert(Arc::new(EventStream::new(name.clone(), source)));
                }
            }
            streams.len()
        };
        metrics::set_registered_streams(count);
        tracing::info!(stream = %name, "Stream registered");
        Ok(name)
    }

    /// Install `source` under `name` unless a stream already holds it, in
    /// which case the existing stream is kept and `source` is dropped.
    pub fn create_or_existing(&self, name: StreamName, source: Source) -> StreamName {
        match self.create(Some(name), source) {
            Ok(name) | Err(RegistryError::Duplicate(name) | RegistryError::NotFound(name)) => name,
        }
    }

    /// Stream registered under `name`.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::NotFound` if absent.
    pub fn lookup(&self, name: &StreamName) -> Result<Arc<EventStream>, RegistryError> {
        self.streams
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(name.clone()))
    }

    /// Remove and close the stream under `name`. Removing an absent name is
    /// a no-op. Returns whether a stream was removed.
    pub fn remove(&self, name: &StreamName) -> bool {
        let (removed, count) = {
            let mut streams = self.streams.write();
            let removed = streams.remove(name);
            (removed, streams.len())
        };
        let Some(stream) = removed else {
            return false;
        };
        stream.close();
        metrics::set_registered_streams(count);
        metrics::set_subscribers(self.active_count());
        tracing::info!(stream = %name, "Stream removed");
        true
    }

    /// Close `stream` and remove it if it is still the stream registered
    /// under its name. A newer stream that reused the name is left alone.
    pub fn release(&self, stream: &Arc<EventStream>) -> bool {
        let (removed, count) = {
            let mut streams = self.streams.write();
            let current = streams
                .get(stream.name())
                .is_some_and(|registered| Arc::ptr_eq(registered, stream));
            if current {
                streams.remove(stream.name());
            }
            (current, streams.len())
        };
        stream.close();
        if removed {
            metrics::set_registered_streams(count);
            tracing::info!(stream = %stream.name(), "Stream released");
        }
        metrics::set_subscribers(self.active_count());
        removed
    }

    /// Snapshot of every stream, ordered by name.
    #[must_use]
    pub fn list(&self) -> Vec<StreamInfo> {
        let streams: Vec<Arc<EventStream>> = self.streams.read().values().cloned().collect();
        let mut infos: Vec<StreamInfo> = streams
            .iter()
            .map(|stream| StreamInfo {
                name: stream.name().clone(),
                description: stream.source().description(),
                encodings: stream.source().encodings(),
                state: stream.state(),
                created_at: stream.created_at(),
            })
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    /// Number of registered streams.
    #[must_use]
    pub fn len(&self) -> usize {
        self.streams.read().len()
    }

    /// Whether no stream is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.streams.read().is_empty()
    }

    /// Number of streams with an attached subscriber.
    #[must_use]
    pub fn active_count(&self) -> usize {
        let streams: Vec<Arc<EventStream>> = self.streams.read().values().cloned().collect();
        streams
            .iter()
            .filter(|s| s.state() == StreamState::Active)
            .count()
    }

    /// Remove and close every stream.
    pub fn close_all(&self) {
        let drained: Vec<Arc<EventStream>> = self.streams.write().drain().map(|(_, s)| s).collect();
        let count = drained.len();
        for stream in drained {
            stream.close();
        }
        metrics::set_registered_streams(0);
        metrics::set_subscribers(0);
        tracing::info!(streams = count, "All streams closed");
    }
}
