//! Application Services
//!
//! The operations clients invoke on the stream engine:
//!
//! - `create_data_change_subscription`: register a stream of datastore changes
//! - `create_notification_stream`: register a stream of YANG notifications
//! - `subscribe`: attach the one subscriber a stream accepts
//! - `remove_stream` / `list_streams`: administration and monitoring
//!
//! Every failure is returned as a `RestconfError` ready for the wire.

mod rpc;

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

pub use rpc::{
    DataChangeSubscriptionInput, DataChangeSubscriptionOutput, NotificationStreamInput,
    NotificationStreamOutput, RpcRequest, RpcResponse,
};

use crate::application::ports::{ChangeFeed, ModelProvider, NotificationFeed, TransportWriter};
use crate::application::streams::{
    EventStream, RegistryError, Sink, SinkStats, Source, StreamError, StreamInfo, StreamRegistry,
    StreamState,
};
use crate::domain::error::{ErrorTag, ErrorType, RestconfError};
use crate::domain::event::{Datastore, Scope};
use crate::domain::model::{InstancePath, ModelError, QName};
use crate::domain::params::TextParameters;
use crate::domain::stream::{EncodingName, StreamName};
use crate::infrastructure::filter::{EventFilter, FilterError};
use crate::infrastructure::metrics;

/// Prefix of every notification stream name.
pub const NOTIFICATION_STREAM_PREFIX: &str = "notification-stream/";

// =============================================================================
// Error Conversions
// =============================================================================

impl From<RegistryError> for RestconfError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound(_) => Self::not_found(err),
            RegistryError::Duplicate(_) => {
                Self::new(ErrorType::Application, ErrorTag::DataExists, err.to_string())
            }
        }
    }
}

impl From<StreamError> for RestconfError {
    fn from(err: StreamError) -> Self {
        match err {
            StreamError::AlreadySubscribed(_) => {
                Self::new(ErrorType::Protocol, ErrorTag::InUse, err.to_string())
            }
            StreamError::Closed(_) => Self::not_found(err),
            StreamError::UnsupportedEncoding { .. } => Self::invalid_value(err),
            StreamError::NoEncodings
            | StreamError::EncodingMismatch(_)
            | StreamError::DeliverySetup(_) => {
                Self::new(ErrorType::Application, ErrorTag::OperationFailed, err.to_string())
            }
        }
    }
}

impl From<FilterError> for RestconfError {
    fn from(err: FilterError) -> Self {
        Self::invalid_value(err)
    }
}

// =============================================================================
// Subscription Guard
// =============================================================================

/// A live subscriber attachment.
///
/// Dropping the guard detaches the subscriber: the stream is closed and
/// removed from the registry. The transport holds the guard for as long as
/// the connection is open.
pub struct Subscription {
    registry: Arc<StreamRegistry>,
    stream: Arc<EventStream>,
}

impl Subscription {
    /// Stream this subscription is attached to.
    #[must_use]
    pub fn name(&self) -> &StreamName {
        self.stream.name()
    }

    /// Delivery counters so far.
    #[must_use]
    pub fn stats(&self) -> Option<SinkStats> {
        self.stream.sink_stats()
    }

    /// Whether the stream has ended from the producer side.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.stream.state() == StreamState::Closed
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.registry.release(&self.stream);
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("stream", self.stream.name())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Streams Service
// =============================================================================

/// Validates stream requests against the current schema and drives the
/// registry.
pub struct StreamsService {
    registry: Arc<StreamRegistry>,
    model: Arc<dyn ModelProvider>,
    changes: Arc<dyn ChangeFeed>,
    notifications: Arc<dyn NotificationFeed>,
}

impl StreamsService {
    /// Create a service over `registry`, validating against `model` and
    /// wiring sources to the given feeds.
    #[must_use]
    pub fn new(
        registry: Arc<StreamRegistry>,
        model: Arc<dyn ModelProvider>,
        changes: Arc<dyn ChangeFeed>,
        notifications: Arc<dyn NotificationFeed>,
    ) -> Self {
        Self {
            registry,
            model,
            changes,
            notifications,
        }
    }

    /// The registry this service manages.
    #[must_use]
    pub const fn registry(&self) -> &Arc<StreamRegistry> {
        &self.registry
    }

    /// Register a stream of changes under a path.
    ///
    /// The name is derived from the request, so asking twice for the same
    /// path, datastore, and scope returns the stream registered first.
    ///
    /// # Errors
    ///
    /// `missing-element` without a path, `bad-element` when the path does
    /// not parse or resolve, `invalid-value` for an unknown datastore or
    /// scope.
    pub fn create_data_change_subscription(
        &self,
        input: &DataChangeSubscriptionInput,
    ) -> Result<DataChangeSubscriptionOutput, RestconfError> {
        let text = input.path.as_deref().ok_or_else(|| {
            RestconfError::new(
                ErrorType::Application,
                ErrorTag::MissingElement,
                "path value is missing",
            )
        })?;
        let bad_path = |e: ModelError| {
            RestconfError::new(ErrorType::Application, ErrorTag::BadElement, e.to_string())
        };
        let path = InstancePath::parse(text).map_err(bad_path)?;
        self.model
            .current_model_context()
            .resolve_path(&path)
            .map_err(bad_path)?;

        let datastore = match input.datastore.as_deref() {
            None => Datastore::default(),
            Some(value) => Datastore::from_str_case_insensitive(value).ok_or_else(|| {
                RestconfError::invalid_value(format!("unknown datastore '{value}'"))
            })?,
        };
        let scope = match input.scope.as_deref() {
            None => Scope::default(),
            Some(value) => Scope::from_str_case_insensitive(value)
                .ok_or_else(|| RestconfError::invalid_value(format!("unknown scope '{value}'")))?,
        };

        let name = data_change_stream_name(&path, datastore, scope);
        let source = Source::data_change(Arc::clone(&self.changes), datastore, path, scope);
        let name = self.registry.create_or_existing(name, source);
        tracing::info!(stream = %name, "Data-change stream available");
        Ok(DataChangeSubscriptionOutput {
            stream_name: name.to_string(),
        })
    }

    /// Register a stream of notifications.
    ///
    /// Every identifier is checked before anything is registered.
    ///
    /// # Errors
    ///
    /// `missing-element` for an empty list, `invalid-value` for an
    /// identifier that is malformed or does not name a notification.
    pub fn create_notification_stream(
        &self,
        input: &NotificationStreamInput,
    ) -> Result<NotificationStreamOutput, RestconfError> {
        let identifiers = input
            .notifications
            .as_deref()
            .filter(|ids| !ids.is_empty())
            .ok_or_else(|| {
                RestconfError::new(
                    ErrorType::Application,
                    ErrorTag::MissingElement,
                    "at least one notification is required",
                )
            })?;

        let ctx = self.model.current_model_context();
        let mut types = BTreeSet::new();
        for id in identifiers {
            let qname = QName::parse(id).map_err(RestconfError::invalid_value)?;
            ctx.find_notification(&qname).map_err(|e| match e {
                ModelError::UnknownModule(_) => {
                    RestconfError::invalid_value(format!("{qname} refers to an unknown module"))
                }
                other => RestconfError::invalid_value(other),
            })?;
            types.insert(qname);
        }

        let name = notification_stream_name(&types);
        let source = Source::notification(Arc::clone(&self.notifications), types);
        let name = self.registry.create_or_existing(name, source);
        tracing::info!(stream = %name, "Notification stream available");
        Ok(NotificationStreamOutput {
            notification_stream_identifier: name.to_string(),
        })
    }

    /// Attach `writer` as the stream's one subscriber.
    ///
    /// # Errors
    ///
    /// `unknown-element` for a missing stream, `invalid-value` for an
    /// encoding the stream lacks or a filter that does not compile,
    /// `in-use` when a subscriber is already attached, and
    /// `operation-failed` when the feed refuses; the last also removes the
    /// stream.
    pub fn subscribe(
        &self,
        name: &StreamName,
        encoding: EncodingName,
        params: TextParameters,
        filter: Option<&str>,
        writer: Arc<dyn TransportWriter>,
    ) -> Result<Subscription, RestconfError> {
        let stream = self.registry.lookup(name)?;
        let factory = stream.source().factory(encoding).ok_or_else(|| {
            StreamError::UnsupportedEncoding {
                stream: name.clone(),
                encoding,
            }
        })?;
        let filter = filter.map(EventFilter::compile).transpose()?;

        let sink = Arc::new(Sink::new(
            name.clone(),
            factory.new_formatter(params),
            filter,
            writer,
        ));
        match stream.start(sink) {
            Ok(()) => {}
            Err(e @ StreamError::DeliverySetup(_)) => {
                self.registry.release(&stream);
                return Err(e.into());
            }
            Err(e) => return Err(e.into()),
        }
        metrics::set_subscribers(self.registry.active_count());

        Ok(Subscription {
            registry: Arc::clone(&self.registry),
            stream,
        })
    }

    /// Remove a stream, detaching its subscriber. Returns whether it
    /// existed.
    pub fn remove_stream(&self, name: &StreamName) -> bool {
        self.registry.remove(name)
    }

    /// Snapshot of every registered stream.
    #[must_use]
    pub fn list_streams(&self) -> Vec<StreamInfo> {
        self.registry.list()
    }
}

impl fmt::Debug for StreamsService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamsService")
            .field("streams", &self.registry.len())
            .finish_non_exhaustive()
    }
}

/// `<path without leading '/'>/datastore=<DS>/scope=<SCOPE>`.
#[must_use]
pub fn data_change_stream_name(path: &InstancePath, datastore: Datastore, scope: Scope) -> StreamName {
    let path = path.to_string();
    StreamName::new(format!(
        "{}/datastore={datastore}/scope={scope}",
        path.trim_start_matches('/')
    ))
}

/// `notification-stream/` followed by the identifiers, ordered by module
/// then name, joined with `,`.
#[must_use]
pub fn notification_stream_name(types: &BTreeSet<QName>) -> StreamName {
    let ids: Vec<String> = types.iter().map(ToString::to_string).collect();
    StreamName::new(format!("{NOTIFICATION_STREAM_PREFIX}{}", ids.join(",")))
}

// =============================================================================
// Tests
// =============================================================================
