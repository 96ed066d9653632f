//! Server-Sent Events transport for one subscriber.
//!
//! The sink writes into a bounded channel from the producer's thread; the
//! response body drains it on the runtime. The response stream owns the
//! `Subscription`, so a client disconnect detaches the subscriber.

use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::response::sse::Event;
use futures::Stream;
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_stream::wrappers::ReceiverStream;

use crate::application::ports::{TransportWriter, WriteError};
use crate::application::services::Subscription;

// =============================================================================
// Writer
// =============================================================================

/// `TransportWriter` over a bounded channel. Never blocks.
#[derive(Debug)]
pub struct SseWriter {
    tx: Mutex<Option<mpsc::Sender<String>>>,
}

impl SseWriter {
    /// Writer and the receiving end of its channel.
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx: Mutex::new(Some(tx)),
            },
            rx,
        )
    }
}

impl TransportWriter for SseWriter {
    fn write(&self, text: String) -> Result<(), WriteError> {
        let guard = self.tx.lock();
        let tx = guard.as_ref().ok_or(WriteError::Closed)?;
        tx.try_send(text).map_err(|e| match e {
            TrySendError::Full(_) => WriteError::Full,
            TrySendError::Closed(_) => WriteError::Closed,
        })
    }

    fn end_of_stream(&self) {
        self.tx.lock().take();
    }
}

// =============================================================================
// Response Stream
// =============================================================================

/// SSE body for one subscription. Ends when the writer is closed; dropping
/// it releases the subscription.
pub struct SubscriptionStream {
    inner: ReceiverStream<String>,
    subscription: Subscription,
}

impl SubscriptionStream {
    /// Stream documents from `rx`, holding `subscription` until dropped.
    #[must_use]
    pub fn new(rx: mpsc::Receiver<String>, subscription: Subscription) -> Self {
        Self {
            inner: ReceiverStream::new(rx),
            subscription,
        }
    }

    /// The attached subscription.
    #[must_use]
    pub const fn subscription(&self) -> &Subscription {
        &self.subscription
    }
}

impl Stream for SubscriptionStream {
    type Item = Result<Event, Infallible>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().inner)
            .poll_next(cx)
            .map(|text| text.map(|text| Ok(to_event(&text))))
    }
}

/// One document as one SSE event. Carriage returns cannot be carried in an
/// event, so line endings are normalized to `\n`.
fn to_event(text: &str) -> Event {
    if text.contains('\r') {
        Event::default().data(text.replace("\r\n", "\n").replace('\r', "\n"))
    } else {
        Event::default().data(text)
    }
}
