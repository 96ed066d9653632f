//! Subscriber-side delivery endpoint.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::application::ports::{TransportWriter, WriteError};
use crate::domain::event::{Event, Selection};
use crate::domain::model::ModelContext;
use crate::domain::stream::{EncodingName, StreamName};
use crate::infrastructure::filter::{EventFilter, FilterError};
use crate::infrastructure::formatter::EventFormatter;
use crate::infrastructure::metrics::{self, FailureReason};

/// Filters, renders, and writes events for one subscriber.
///
/// `publish` runs on the producer's thread and never panics or returns an
/// error: every failure is counted, logged, and confined to the event that
/// caused it. Once the sink is closed, `publish` does nothing.
pub struct Sink {
    stream: StreamName,
    encoding: EncodingName,
    formatter: Arc<EventFormatter>,
    filter: Option<EventFilter>,
    writer: Arc<dyn TransportWriter>,
    closed: AtomicBool,
    ended: AtomicBool,
    sent: AtomicU64,
    excluded: AtomicU64,
    failed: AtomicU64,
    last_activity: RwLock<Option<DateTime<Utc>>>,
}

impl Sink {
    /// Bind a formatter, optional filter, and writer for `stream`.
    #[must_use]
    pub fn new(
        stream: StreamName,
        formatter: Arc<EventFormatter>,
        filter: Option<EventFilter>,
        writer: Arc<dyn TransportWriter>,
    ) -> Self {
        Self {
            stream,
            encoding: formatter.encoding(),
            formatter,
            filter,
            writer,
            closed: AtomicBool::new(false),
            ended: AtomicBool::new(false),
            sent: AtomicU64::new(0),
            excluded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            last_activity: RwLock::new(None),
        }
    }

    /// Stream this sink is attached to.
    #[must_use]
    pub const fn stream(&self) -> &StreamName {
        &self.stream
    }

    /// Output encoding.
    #[must_use]
    pub const fn encoding(&self) -> EncodingName {
        self.encoding
    }

    /// Filter, render, and write one event.
    pub fn publish(&self, ctx: &ModelContext, event: &Event, now: DateTime<Utc>) {
        if self.is_closed() {
            return;
        }
        let kind = event.kind();
        let started = Instant::now();

        let selection = match self.filter.as_ref().map(|f| f.evaluate(ctx, event)) {
            None => Selection::All,
            Some(Ok(selection)) => selection,
            Some(Err(FilterError::Unresolved(reason))) => {
                tracing::warn!(
                    stream = %self.stream,
                    event_type = %event.type_id(),
                    reason = %reason,
                    "Event type no longer in schema, treating as non-matching"
                );
                self.exclude(event);
                return;
            }
            Some(Err(e)) => {
                tracing::error!(
                    stream = %self.stream,
                    event_type = %event.type_id(),
                    error = %e,
                    "Filter evaluation failed, dropping event"
                );
                self.fail(event, FailureReason::Filter);
                return;
            }
        };
        if !selection.any() {
            self.exclude(event);
            return;
        }

        let text = match self.formatter.create_text(ctx, event, now, &selection) {
            Ok(Some(text)) => text,
            Ok(None) => {
                self.exclude(event);
                return;
            }
            Err(e) => {
                tracing::error!(
                    stream = %self.stream,
                    event_type = %event.type_id(),
                    encoding = %self.encoding,
                    error = %e,
                    "Failed to render event, dropping it"
                );
                self.fail(event, FailureReason::Render);
                return;
            }
        };
        metrics::record_render_duration(kind, started.elapsed());

        match self.writer.write(text) {
            Ok(()) => {
                self.sent.fetch_add(1, Ordering::Relaxed);
                *self.last_activity.write() = Some(Utc::now());
                metrics::record_event_published(kind);
            }
            Err(WriteError::Full) => {
                tracing::warn!(
                    stream = %self.stream,
                    event_type = %event.type_id(),
                    "Subscriber buffer full, dropping event"
                );
                self.fail(event, FailureReason::BufferFull);
            }
            Err(WriteError::Closed) => {
                tracing::info!(stream = %self.stream, "Subscriber disconnected");
                self.fail(event, FailureReason::Disconnected);
                self.close();
            }
        }
    }

    /// Stop accepting events. Idempotent.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Whether the sink has stopped accepting events.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Close and tell the transport that nothing else follows. The transport
    /// is told only once.
    pub fn end_of_stream(&self) {
        self.close();
        if !self.ended.swap(true, Ordering::AcqRel) {
            self.writer.end_of_stream();
        }
    }

    /// Delivery counters.
    #[must_use]
    pub fn stats(&self) -> SinkStats {
        SinkStats {
            sent: self.sent.load(Ordering::Relaxed),
            excluded: self.excluded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            last_activity: *self.last_activity.read(),
            closed: self.is_closed(),
        }
    }

    fn exclude(&self, event: &Event) {
        self.excluded.fetch_add(1, Ordering::Relaxed);
        metrics::record_event_excluded(event.kind());
    }

    fn fail(&self, event: &Event, reason: FailureReason) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        metrics::record_delivery_failure(event.kind(), reason);
    }
}

impl fmt::Debug for Sink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sink")
            .field("stream", &self.stream)
            .field("encoding", &self.encoding)
            .field("filter", &self.filter)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

/// Snapshot of a sink's delivery counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkStats {
    /// Documents written.
    pub sent: u64,
    /// Events filtered out or trimmed to nothing.
    pub excluded: u64,
    /// Events lost to internal errors or write failures.
    pub failed: u64,
    /// Time of the last successful write.
    pub last_activity: Option<DateTime<Utc>>,
    /// Whether the sink has stopped.
    pub closed: bool,
}
