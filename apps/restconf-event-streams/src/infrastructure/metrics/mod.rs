//! Prometheus Metrics Module
//!
//! Exposes stream engine metrics in Prometheus format.
//!
//! # Metrics Categories
//!
//! - **Delivery**: events sent, excluded by filters, and failed, by event kind
//! - **Streams**: registered streams and attached subscribers
//! - **Latency**: time spent filtering and rendering one event
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::domain::event::EventKind;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder, or return the handle of the one already
/// installed.
///
/// # Errors
///
/// Returns `BuildError` if the recorder cannot be installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }
    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "restconf_streams_events_published_total",
        "Total event documents written to subscribers"
    );
    describe_counter!(
        "restconf_streams_events_excluded_total",
        "Total events suppressed by filters or trimming"
    );
    describe_counter!(
        "restconf_streams_delivery_failures_total",
        "Total events that could not be delivered, by reason"
    );

    describe_gauge!(
        "restconf_streams_registered",
        "Number of streams in the registry"
    );
    describe_gauge!(
        "restconf_streams_subscribers",
        "Number of streams with an attached subscriber"
    );

    describe_histogram!(
        "restconf_streams_render_seconds",
        "Time to filter and render one event for one subscriber"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Why an event did not reach a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// Filter evaluation failed.
    Filter,
    /// Rendering failed.
    Render,
    /// Subscriber buffer was full.
    BufferFull,
    /// Subscriber connection was gone.
    Disconnected,
}

impl FailureReason {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Filter => "filter",
            Self::Render => "render",
            Self::BufferFull => "buffer_full",
            Self::Disconnected => "disconnected",
        }
    }
}

/// Record one document written to a subscriber.
pub fn record_event_published(kind: EventKind) {
    counter!(
        "restconf_streams_events_published_total",
        "kind" => kind.as_str()
    )
    .increment(1);
}

/// Record one event suppressed for a subscriber.
pub fn record_event_excluded(kind: EventKind) {
    counter!(
        "restconf_streams_events_excluded_total",
        "kind" => kind.as_str()
    )
    .increment(1);
}

/// Record one failed delivery.
pub fn record_delivery_failure(kind: EventKind, reason: FailureReason) {
    counter!(
        "restconf_streams_delivery_failures_total",
        "kind" => kind.as_str(),
        "reason" => reason.as_str()
    )
    .increment(1);
}

/// Update the registered stream count.
#[allow(clippy::cast_precision_loss)]
pub fn set_registered_streams(count: usize) {
    gauge!("restconf_streams_registered").set(count as f64);
}

/// Update the attached subscriber count.
#[allow(clippy::cast_precision_loss)]
pub fn set_subscribers(count: usize) {
    gauge!("restconf_streams_subscribers").set(count as f64);
}

/// Record filter plus render time for one event.
pub fn record_render_duration(kind: EventKind, duration: Duration) {
    histogram!(
        "restconf_streams_render_seconds",
        "kind" => kind.as_str()
    )
    .record(duration.as_secs_f64());
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_reason_as_str() {
        assert_eq!(FailureReason::Filter.as_str(), "filter");
        assert_eq!(FailureReason::Render.as_str(), "render");
        assert_eq!(FailureReason::BufferFull.as_str(), "buffer_full");
        assert_eq!(FailureReason::Disconnected.as_str(), "disconnected");
    }

    #[test]
    fn recording_without_recorder_is_harmless() {
        record_event_published(EventKind::DataChange);
        record_event_excluded(EventKind::Notification);
        record_delivery_failure(EventKind::DataChange, FailureReason::BufferFull);
        set_registered_streams(3);
        set_subscribers(1);
        record_render_duration(EventKind::Notification, Duration::from_micros(40));
    }
}
