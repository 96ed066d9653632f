//! Producer-side stream state.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::sink::{Sink, SinkStats};
use crate::application::ports::{
    ChangeFeed, EventListener, FeedError, NotificationFeed, Registration,
};
use crate::domain::event::{Datastore, Event, EventKind, Scope};
use crate::domain::model::{InstancePath, ModelContext, QName};
use crate::domain::stream::{EncodingName, StreamName};
use crate::infrastructure::formatter::FormatterFactory;

// =============================================================================
// Errors
// =============================================================================

/// Stream lifecycle errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    /// A source must declare at least one encoding.
    #[error("stream declares no encodings")]
    NoEncodings,

    /// A formatter factory renders a different event shape than the feed.
    #[error("{0} formatter does not match the stream's event kind")]
    EncodingMismatch(EncodingName),

    /// The stream already has its one subscriber.
    #[error("stream {0} already has a subscriber")]
    AlreadySubscribed(StreamName),

    /// The stream has been closed.
    #[error("stream {0} is closed")]
    Closed(StreamName),

    /// The stream does not offer this encoding.
    #[error("stream {stream} does not support {encoding} encoding")]
    UnsupportedEncoding {
        /// Stream name.
        stream: StreamName,
        /// Requested encoding.
        encoding: EncodingName,
    },

    /// The underlying feed refused the registration.
    #[error("failed to set up delivery: {0}")]
    DeliverySetup(#[from] FeedError),
}

// =============================================================================
// Source
// =============================================================================

/// The external feed a source listens to.
#[derive(Clone)]
pub enum SourceFeed {
    /// Changes under a path in one datastore.
    DataChange {
        /// Change feed.
        feed: Arc<dyn ChangeFeed>,
        /// Datastore watched.
        datastore: Datastore,
        /// Subscribed path.
        path: InstancePath,
        /// Depth of changes reported.
        scope: Scope,
    },
    /// Notifications of a set of types.
    Notification {
        /// Notification feed.
        feed: Arc<dyn NotificationFeed>,
        /// Notification types.
        types: BTreeSet<QName>,
    },
}

impl SourceFeed {
    const fn kind(&self) -> EventKind {
        match self {
            Self::DataChange { .. } => EventKind::DataChange,
            Self::Notification { .. } => EventKind::Notification,
        }
    }
}

/// Connects one stream to its feed and declares the encodings it offers.
pub struct Source {
    encodings: BTreeMap<EncodingName, Arc<FormatterFactory>>,
    feed: SourceFeed,
}

impl Source {
    /// Source over `feed` offering the given encodings.
    ///
    /// # Errors
    ///
    /// `StreamError::NoEncodings` for an empty map and
    /// `StreamError::EncodingMismatch` when a factory renders another shape.
    pub fn new(
        encodings: BTreeMap<EncodingName, Arc<FormatterFactory>>,
        feed: SourceFeed,
    ) -> Result<Self, StreamError> {
        if encodings.is_empty() {
            return Err(StreamError::NoEncodings);
        }
        if let Some((encoding, _)) = encodings.iter().find(|(_, f)| f.kind() != feed.kind()) {
            return Err(StreamError::EncodingMismatch(*encoding));
        }
        Ok(Self { encodings, feed })
    }

    /// Data-change source offering every encoding.
    #[must_use]
    pub fn data_change(
        feed: Arc<dyn ChangeFeed>,
        datastore: Datastore,
        path: InstancePath,
        scope: Scope,
    ) -> Self {
        Self {
            encodings: all_encodings(EventKind::DataChange),
            feed: SourceFeed::DataChange {
                feed,
                datastore,
                path,
                scope,
            },
        }
    }

    /// Notification source offering every encoding.
    #[must_use]
    pub fn notification(feed: Arc<dyn NotificationFeed>, types: BTreeSet<QName>) -> Self {
        Self {
            encodings: all_encodings(EventKind::Notification),
            feed: SourceFeed::Notification { feed, types },
        }
    }

    /// Event shape produced.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        self.feed.kind()
    }

    /// Encodings offered, in order.
    #[must_use]
    pub fn encodings(&self) -> Vec<EncodingName> {
        self.encodings.keys().copied().collect()
    }

    /// Formatter factory for `encoding`.
    #[must_use]
    pub fn factory(&self, encoding: EncodingName) -> Option<&Arc<FormatterFactory>> {
        self.encodings.get(&encoding)
    }

    /// Human-readable description for stream listings.
    #[must_use]
    pub fn description(&self) -> String {
        match &self.feed {
            SourceFeed::DataChange {
                datastore,
                path,
                scope,
                ..
            } => format!("Events occurring in {datastore} datastore under {path} (scope {scope})"),
            SourceFeed::Notification { types, .. } => {
                let names: Vec<String> = types.iter().map(ToString::to_string).collect();
                format!("YANG notifications matching any of [{}]", names.join(", "))
            }
        }
    }

    /// Register `sink` with the feed. Every event the feed delivers is
    /// handed to `Sink::publish` until the registration closes.
    ///
    /// # Errors
    ///
    /// Returns the feed's `FeedError` when registration fails.
    pub fn start(&self, sink: Arc<Sink>) -> Result<Registration, FeedError> {
        let listener: EventListener =
            Arc::new(move |ctx: &ModelContext, event: &Event, now: DateTime<Utc>| {
                sink.publish(ctx, event, now);
            });
        match &self.feed {
            SourceFeed::DataChange {
                feed,
                datastore,
                path,
                scope,
            } => feed.register_change_listener(*datastore, path, *scope, listener),
            SourceFeed::Notification { feed, types } => {
                feed.register_notification_listener(types, listener)
            }
        }
    }
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Source")
            .field("kind", &self.kind())
            .field("encodings", &self.encodings())
            .finish_non_exhaustive()
    }
}

fn all_encodings(kind: EventKind) -> BTreeMap<EncodingName, Arc<FormatterFactory>> {
    EncodingName::all()
        .iter()
        .map(|encoding| (*encoding, Arc::new(FormatterFactory::new(*encoding, kind))))
        .collect()
}

// =============================================================================
// Event Stream
// =============================================================================

/// Lifecycle state of a registered stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Registered, waiting for its subscriber.
    Registered,
    /// One subscriber attached and receiving events.
    Active,
    /// Terminal.
    Closed,
}

impl StreamState {
    /// Lowercase label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Registered => "registered",
            Self::Active => "active",
            Self::Closed => "closed",
        }
    }
}

enum Phase {
    Registered,
    Active {
        registration: Registration,
        sink: Arc<Sink>,
    },
    Closed,
}

/// A named stream: its source plus the single-subscriber state machine.
///
/// `Registered -> Active -> Closed`, or `Registered -> Closed` when the
/// stream is removed or feed registration fails. `start` succeeds at most
/// once.
pub struct EventStream {
    name: StreamName,
    source: Source,
    phase: Mutex<Phase>,
    created_at: DateTime<Utc>,
}

impl EventStream {
    /// Wrap `source` under `name`.
    #[must_use]
    pub fn new(name: StreamName, source: Source) -> Self {
        Self {
            name,
            source,
            phase: Mutex::new(Phase::Registered),
            created_at: Utc::now(),
        }
    }

    /// Stream name.
    #[must_use]
    pub const fn name(&self) -> &StreamName {
        &self.name
    }

    /// The producer side.
    #[must_use]
    pub const fn source(&self) -> &Source {
        &self.source
    }

    /// Registration time.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Attach the stream's one subscriber.
    ///
    /// # Errors
    ///
    /// `AlreadySubscribed` while active, `Closed` after close, and
    /// `DeliverySetup` when the feed refuses; the last also closes the
    /// stream.
    pub fn start(&self, sink: Arc<Sink>) -> Result<(), StreamError> {
        let mut phase = self.phase.lock();
        match *phase {
            Phase::Registered => {}
            Phase::Active { .. } => return Err(StreamError::AlreadySubscribed(self.name.clone())),
            Phase::Closed => return Err(StreamError::Closed(self.name.clone())),
        }

        match self.source.start(Arc::clone(&sink)) {
            Ok(registration) => {
                *phase = Phase::Active { registration, sink };
                tracing::info!(stream = %self.name, "Subscriber attached");
                Ok(())
            }
            Err(e) => {
                *phase = Phase::Closed;
                tracing::warn!(stream = %self.name, error = %e, "Feed registration failed, closing stream");
                Err(StreamError::DeliverySetup(e))
            }
        }
    }

    /// Close the stream: release the feed registration and end the
    /// subscriber's output. Returns whether this call did the closing.
    pub fn close(&self) -> bool {
        let previous = std::mem::replace(&mut *self.phase.lock(), Phase::Closed);
        match previous {
            Phase::Closed => false,
            Phase::Registered => true,
            Phase::Active { registration, sink } => {
                registration.close();
                sink.end_of_stream();
                tracing::info!(stream = %self.name, stats = ?sink.stats(), "Subscriber detached");
                true
            }
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> StreamState {
        match *self.phase.lock() {
            Phase::Registered => StreamState::Registered,
            Phase::Active { .. } => StreamState::Active,
            Phase::Closed => StreamState::Closed,
        }
    }

    /// Counters of the attached sink, if any.
    #[must_use]
    pub fn sink_stats(&self) -> Option<SinkStats> {
        match &*self.phase.lock() {
            Phase::Active { sink, .. } => Some(sink.stats()),
            Phase::Registered | Phase::Closed => None,
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("name", &self.name)
            .field("source", &self.source)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{MockTransportWriter, ModelProvider};
    use crate::domain::params::TextParameters;
    use crate::infrastructure::hub::EventHub;
    use crate::infrastructure::model::StaticModelProvider;
    use crate::test_support::{status_change, toaster_context, toaster_path, toaster_qname};

    fn make_test_hub() -> Arc<EventHub> {
        let model: Arc<dyn ModelProvider> = Arc::new(StaticModelProvider::new(toaster_context()));
        Arc::new(EventHub::new(model))
    }

    fn make_test_stream(hub: &Arc<EventHub>) -> EventStream {
        let feed: Arc<dyn ChangeFeed> = Arc::clone(hub) as Arc<dyn ChangeFeed>;
        EventStream::new(
            StreamName::new("toaster"),
            Source::data_change(feed, Datastore::Operational, toaster_path(), Scope::One),
        )
    }

    fn make_test_sink(stream: &EventStream, writer: MockTransportWriter) -> Arc<Sink> {
        let factory = stream.source().factory(EncodingName::Json).unwrap();
        Arc::new(Sink::new(
            stream.name().clone(),
            factory.new_formatter(TextParameters::EMPTY),
            None,
            Arc::new(writer),
        ))
    }

    #[test]
    fn source_requires_matching_encodings() {
        let hub = make_test_hub();
        let feed = SourceFeed::Notification {
            feed: hub as Arc<dyn NotificationFeed>,
            types: BTreeSet::from([toaster_qname("toasterRestocked")]),
        };
        assert_eq!(
            Source::new(BTreeMap::new(), feed.clone()).map(|_| ()),
            Err(StreamError::NoEncodings)
        );

        let wrong = BTreeMap::from([(
            EncodingName::Xml,
            Arc::new(FormatterFactory::new(EncodingName::Xml, EventKind::DataChange)),
        )]);
        assert_eq!(
            Source::new(wrong, feed).map(|_| ()),
            Err(StreamError::EncodingMismatch(EncodingName::Xml))
        );
    }

    #[test]
    fn built_in_sources_offer_all_encodings() {
        let hub = make_test_hub();
        let source = Source::notification(
            hub as Arc<dyn NotificationFeed>,
            BTreeSet::from([toaster_qname("toasterRestocked")]),
        );
        assert_eq!(source.encodings(), vec![EncodingName::Json, EncodingName::Xml]);
        assert_eq!(source.kind(), EventKind::Notification);
        assert!(source.description().contains("toaster:toasterRestocked"));
    }

    #[test]
    fn start_then_events_flow_to_sink() {
        let hub = make_test_hub();
        let stream = make_test_stream(&hub);
        let mut writer = MockTransportWriter::new();
        writer.expect_write().times(1).returning(|_| Ok(()));
        writer.expect_end_of_stream().times(1).return_const(());
        let sink = make_test_sink(&stream, writer);

        assert_eq!(stream.state(), StreamState::Registered);
        stream.start(Arc::clone(&sink)).unwrap();
        assert_eq!(stream.state(), StreamState::Active);

        hub.publish_changes(Datastore::Operational, vec![status_change("up")]);
        assert_eq!(stream.sink_stats().unwrap().sent, 1);

        assert!(stream.close());
        assert_eq!(stream.state(), StreamState::Closed);
        assert_eq!(hub.stats().change_listeners, 0);
        assert!(sink.is_closed());
    }

    #[test]
    fn second_start_is_rejected() {
        let hub = make_test_hub();
        let stream = make_test_stream(&hub);
        let first = make_test_sink(&stream, MockTransportWriter::new());
        let second = make_test_sink(&stream, MockTransportWriter::new());

        stream.start(first).unwrap();
        assert!(matches!(
            stream.start(second),
            Err(StreamError::AlreadySubscribed(_))
        ));
        assert_eq!(hub.stats().change_listeners, 1);
    }

    #[test]
    fn feed_failure_closes_stream() {
        let hub = make_test_hub();
        hub.set_available(false);
        let stream = make_test_stream(&hub);
        let sink = make_test_sink(&stream, MockTransportWriter::new());

        assert!(matches!(
            stream.start(sink),
            Err(StreamError::DeliverySetup(FeedError::Unavailable(_)))
        ));
        assert_eq!(stream.state(), StreamState::Closed);
    }

    #[test]
    fn close_is_idempotent() {
        let hub = make_test_hub();
        let stream = make_test_stream(&hub);
        assert!(stream.close());
        assert!(!stream.close());
        let sink = make_test_sink(&stream, MockTransportWriter::new());
        assert!(matches!(stream.start(sink), Err(StreamError::Closed(_))));
    }
}
