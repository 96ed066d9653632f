//! Event Payloads
//!
//! The two event shapes that flow through a stream: batches of datastore
//! change records and single YANG notifications.

use std::fmt;

use super::model::{DataNode, InstancePath, QName};

// =============================================================================
// Datastore and Scope
// =============================================================================

/// Logical datastore a change listener is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Datastore {
    /// Intended configuration.
    #[default]
    Configuration,
    /// Operational state.
    Operational,
}

impl Datastore {
    /// Parse a datastore name, ignoring case.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "CONFIGURATION" => Some(Self::Configuration),
            "OPERATIONAL" => Some(Self::Operational),
            _ => None,
        }
    }

    /// Canonical upper-case name used in stream names.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Configuration => "CONFIGURATION",
            Self::Operational => "OPERATIONAL",
        }
    }
}

impl fmt::Display for Datastore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Depth of changes reported relative to the subscribed path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Scope {
    /// Changes to the subscribed node itself.
    Base,
    /// The node and its direct children.
    #[default]
    One,
    /// The node and everything below it.
    Subtree,
}

impl Scope {
    /// Parse a scope name, ignoring case.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "BASE" => Some(Self::Base),
            "ONE" => Some(Self::One),
            "SUBTREE" => Some(Self::Subtree),
            _ => None,
        }
    }

    /// Canonical upper-case name used in stream names.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Base => "BASE",
            Self::One => "ONE",
            Self::Subtree => "SUBTREE",
        }
    }

    /// Whether a change at `changed` is reported to a listener on `base`.
    #[must_use]
    pub fn includes(&self, base: &InstancePath, changed: &InstancePath) -> bool {
        if !base.contains(changed) {
            return false;
        }
        let depth = changed.len() - base.len();
        match self {
            Self::Base => depth == 0,
            Self::One => depth <= 1,
            Self::Subtree => true,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Change Records
// =============================================================================

/// What happened to the node at a change record's path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModificationType {
    /// Node did not exist before.
    Created,
    /// Node existed and its content changed.
    Updated,
    /// Node was removed.
    Deleted,
    /// Node was touched without any effective change.
    Unmodified,
}

impl ModificationType {
    /// Wire name of the operation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
            Self::Unmodified => "unmodified",
        }
    }
}

/// One unit of a datastore mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRecord {
    /// Path of the changed node.
    pub path: InstancePath,
    /// Kind of change.
    pub modification: ModificationType,
    /// Node content before the change.
    pub data_before: Option<DataNode>,
    /// Node content after the change.
    pub data_after: Option<DataNode>,
}

impl ChangeRecord {
    /// A node was created with `data`.
    #[must_use]
    pub const fn created(path: InstancePath, data: DataNode) -> Self {
        Self {
            path,
            modification: ModificationType::Created,
            data_before: None,
            data_after: Some(data),
        }
    }

    /// A node changed from `before` to `after`.
    #[must_use]
    pub const fn updated(path: InstancePath, before: Option<DataNode>, after: DataNode) -> Self {
        Self {
            path,
            modification: ModificationType::Updated,
            data_before: before,
            data_after: Some(after),
        }
    }

    /// A node holding `before` was deleted.
    #[must_use]
    pub const fn deleted(path: InstancePath, before: Option<DataNode>) -> Self {
        Self {
            path,
            modification: ModificationType::Deleted,
            data_before: before,
            data_after: None,
        }
    }

    /// The most recent content of the node, if any.
    #[must_use]
    pub const fn current_data(&self) -> Option<&DataNode> {
        match (&self.data_after, &self.data_before) {
            (Some(after), _) => Some(after),
            (None, before) => before.as_ref(),
        }
    }
}

// =============================================================================
// Events
// =============================================================================

/// Shape of an event, used to pair sources with formatters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Batch of datastore change records.
    DataChange,
    /// Single YANG notification.
    Notification,
}

impl EventKind {
    /// Label used in logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::DataChange => "data_change",
            Self::Notification => "notification",
        }
    }
}

/// A batch of change records delivered together by the change feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeBatchEvent {
    records: Vec<ChangeRecord>,
}

impl ChangeBatchEvent {
    /// Wrap records into a batch.
    #[must_use]
    pub const fn new(records: Vec<ChangeRecord>) -> Self {
        Self { records }
    }

    /// Records in delivery order.
    #[must_use]
    pub fn records(&self) -> &[ChangeRecord] {
        &self.records
    }
}

/// One notification; `body` is a container named after the notification type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationEvent {
    body: DataNode,
}

impl NotificationEvent {
    /// Wrap a notification body.
    #[must_use]
    pub const fn new(body: DataNode) -> Self {
        Self { body }
    }

    /// Notification type.
    #[must_use]
    pub const fn qname(&self) -> &QName {
        self.body.qname()
    }

    /// Notification content.
    #[must_use]
    pub const fn body(&self) -> &DataNode {
        &self.body
    }
}

/// Any event delivered to a sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Datastore change batch.
    ChangeBatch(ChangeBatchEvent),
    /// YANG notification.
    Notification(NotificationEvent),
}

impl Event {
    /// Shape of this event.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::ChangeBatch(_) => EventKind::DataChange,
            Self::Notification(_) => EventKind::Notification,
        }
    }

    /// Type identifier for logs: the notification type, or `data-change`.
    #[must_use]
    pub fn type_id(&self) -> String {
        match self {
            Self::ChangeBatch(_) => "data-change".to_string(),
            Self::Notification(n) => n.qname().to_string(),
        }
    }
}

// =============================================================================
// Record Selection
// =============================================================================

/// Which parts of an event survived filtering.
///
/// Notifications are either `All` or `Only(vec![false])`; change batches carry
/// one flag per record so rendering drops exactly the filtered records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Everything passes.
    All,
    /// Per-record verdicts, by index.
    Only(Vec<bool>),
}

impl Selection {
    /// Whether record `index` is selected.
    #[must_use]
    pub fn includes(&self, index: usize) -> bool {
        match self {
            Self::All => true,
            Self::Only(mask) => mask.get(index).copied().unwrap_or(false),
        }
    }

    /// Whether anything is selected.
    #[must_use]
    pub fn any(&self) -> bool {
        match self {
            Self::All => true,
            Self::Only(mask) => mask.iter().any(|m| *m),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    fn path(text: &str) -> InstancePath {
        InstancePath::parse(text).unwrap()
    }

    #[test_case("operational", Some(Datastore::Operational))]
    #[test_case("CONFIGURATION", Some(Datastore::Configuration))]
    #[test_case("Operational", Some(Datastore::Operational))]
    #[test_case("running", None)]
    fn datastore_parsing(input: &str, expected: Option<Datastore>) {
        assert_eq!(Datastore::from_str_case_insensitive(input), expected);
    }

    #[test_case("base", Some(Scope::Base))]
    #[test_case("ONE", Some(Scope::One))]
    #[test_case("Subtree", Some(Scope::Subtree))]
    #[test_case("deep", None)]
    fn scope_parsing(input: &str, expected: Option<Scope>) {
        assert_eq!(Scope::from_str_case_insensitive(input), expected);
    }

    #[test]
    fn defaults_match_rpc_defaults() {
        assert_eq!(Datastore::default(), Datastore::Configuration);
        assert_eq!(Scope::default(), Scope::One);
    }

    #[test]
    fn scope_depth_rules() {
        let base = path("/toaster:toaster");
        let same = path("/toaster:toaster");
        let child = path("/toaster:toaster/toasterStatus");
        let grandchild = path("/toaster:toaster/slot[id='1']/id");
        let outside = path("/oven:oven");

        assert!(Scope::Base.includes(&base, &same));
        assert!(!Scope::Base.includes(&base, &child));
        assert!(Scope::One.includes(&base, &child));
        assert!(!Scope::One.includes(&base, &grandchild));
        assert!(Scope::Subtree.includes(&base, &grandchild));
        assert!(!Scope::Subtree.includes(&base, &outside));
    }

    #[test]
    fn current_data_prefers_after_image() {
        let qname = QName::new("toaster", "toasterStatus");
        let record = ChangeRecord::updated(
            path("/toaster:toaster/toasterStatus"),
            Some(DataNode::leaf(qname.clone(), "down")),
            DataNode::leaf(qname.clone(), "up"),
        );
        assert_eq!(record.current_data(), Some(&DataNode::leaf(qname.clone(), "up")));

        let deleted = ChangeRecord::deleted(
            path("/toaster:toaster/toasterStatus"),
            Some(DataNode::leaf(qname.clone(), "down")),
        );
        assert_eq!(deleted.current_data(), Some(&DataNode::leaf(qname, "down")));
    }

    #[test]
    fn event_kind_and_type_id() {
        let batch = Event::ChangeBatch(ChangeBatchEvent::new(vec![]));
        assert_eq!(batch.kind(), EventKind::DataChange);
        assert_eq!(batch.type_id(), "data-change");

        let notification = Event::Notification(NotificationEvent::new(DataNode::container(
            QName::new("toaster", "toasterRestocked"),
            vec![],
        )));
        assert_eq!(notification.kind(), EventKind::Notification);
        assert_eq!(notification.type_id(), "toaster:toasterRestocked");
    }

    #[test]
    fn selection_semantics() {
        assert!(Selection::All.includes(7));
        assert!(Selection::All.any());

        let mask = Selection::Only(vec![false, true]);
        assert!(!mask.includes(0));
        assert!(mask.includes(1));
        assert!(!mask.includes(2));
        assert!(mask.any());
        assert!(!Selection::Only(vec![false, false]).any());
        assert!(!Selection::Only(vec![]).any());
    }
}
