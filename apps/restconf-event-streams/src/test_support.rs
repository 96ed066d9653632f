//! Shared fixtures for unit tests: the toaster model and its events.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::application::ports::{TransportWriter, WriteError};
use crate::domain::event::{ChangeBatchEvent, ChangeRecord, Event, NotificationEvent};
use crate::domain::model::{
    DataNode, InstancePath, ModelContext, Module, QName, SchemaNode, SchemaNodeKind,
};

pub const TOASTER_NS: &str = "http://netconfcentral.org/ns/toaster";

pub fn toaster_qname(name: &str) -> QName {
    QName::new("toaster", name)
}

pub fn toaster_context() -> ModelContext {
    ModelContext::new(vec![Module::new(
        "toaster",
        TOASTER_NS,
        vec![
            SchemaNode::new(
                "toaster",
                SchemaNodeKind::Container,
                vec![
                    SchemaNode::new("toasterManufacturer", SchemaNodeKind::Leaf, vec![]),
                    SchemaNode::new("toasterStatus", SchemaNodeKind::Leaf, vec![]),
                    SchemaNode::list(
                        "slot",
                        vec!["id".to_string()],
                        vec![
                            SchemaNode::new("id", SchemaNodeKind::Leaf, vec![]),
                            SchemaNode::new("bread", SchemaNodeKind::Leaf, vec![]),
                        ],
                    ),
                ],
            ),
            SchemaNode::new(
                "toasterRestocked",
                SchemaNodeKind::Notification,
                vec![SchemaNode::new("amountOfBread", SchemaNodeKind::Leaf, vec![])],
            ),
            SchemaNode::new("toasterOutOfBread", SchemaNodeKind::Notification, vec![]),
        ],
    )])
}

pub fn fixed_time() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-10-15T10:00:00.5Z")
        .unwrap()
        .with_timezone(&Utc)
}

pub fn toaster_path() -> InstancePath {
    InstancePath::parse("/toaster:toaster").unwrap()
}

pub fn status_path() -> InstancePath {
    InstancePath::parse("/toaster:toaster/toaster:toasterStatus").unwrap()
}

pub fn status_leaf(value: &str) -> DataNode {
    DataNode::leaf(toaster_qname("toasterStatus"), value)
}

pub fn status_change(value: &str) -> ChangeRecord {
    ChangeRecord::updated(status_path(), None, status_leaf(value))
}

pub fn toaster_container(status: &str, manufacturer: &str) -> DataNode {
    DataNode::container(
        toaster_qname("toaster"),
        vec![
            DataNode::leaf(toaster_qname("toasterManufacturer"), manufacturer),
            status_leaf(status),
        ],
    )
}

pub fn batch(records: Vec<ChangeRecord>) -> Event {
    Event::ChangeBatch(ChangeBatchEvent::new(records))
}

pub fn restocked_body(amount: i64) -> DataNode {
    DataNode::container(
        toaster_qname("toasterRestocked"),
        vec![DataNode::leaf(toaster_qname("amountOfBread"), amount)],
    )
}

pub fn restocked(amount: i64) -> Event {
    Event::Notification(NotificationEvent::new(restocked_body(amount)))
}

/// Transport writer that keeps every document in memory.
#[derive(Default)]
pub struct RecordingWriter {
    written: Mutex<Vec<String>>,
    ended: AtomicBool,
}

impl RecordingWriter {
    pub fn written(&self) -> Vec<String> {
        self.written.lock().clone()
    }

    pub fn ended(&self) -> bool {
        self.ended.load(Ordering::SeqCst)
    }
}

impl TransportWriter for RecordingWriter {
    fn write(&self, text: String) -> Result<(), WriteError> {
        if self.ended() {
            return Err(WriteError::Closed);
        }
        self.written.lock().push(text);
        Ok(())
    }

    fn end_of_stream(&self) {
        self.ended.store(true, Ordering::SeqCst);
    }
}
