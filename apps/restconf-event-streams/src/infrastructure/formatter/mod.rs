//! Event Formatters
//!
//! Renders events into JSON or XML documents. A formatter is a value pairing
//! `TextParameters` with a render function; a factory owns one formatter per
//! distinct parameter set so subscribers with identical settings share it.
//!
//! # Rendering Rules
//!
//! - Change batches render one `data-change-event` entry per selected record.
//!   `unmodified` records never render. When nothing survives, the formatter
//!   returns `None` and nothing is sent.
//! - `skip_data` omits node content; `leaf_nodes_only` expands each record
//!   into one entry per leaf below it.
//! - `changed_leaf_nodes_only` reports only the leaves whose value differs
//!   between the before and after images; `child_nodes_only` does the same
//!   for the direct children of the changed node.
//! - Notifications always render; only `pretty_print` applies to them.
//! - A created or updated record without data is a rendering error, not a
//!   filtering decision.

mod json;
mod xml;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::RwLock;

use crate::domain::event::{ChangeRecord, Event, EventKind, ModificationType, Selection};
use crate::domain::model::{DataNode, InstancePath, ModelContext, PathArg, QName};
use crate::domain::params::TextParameters;
use crate::domain::stream::EncodingName;

/// Rendering function shared by all formatters of one encoding and shape.
pub type RenderFn = fn(
    &TextParameters,
    &ModelContext,
    &Event,
    DateTime<Utc>,
    &Selection,
) -> Result<Option<String>, FormatError>;

// =============================================================================
// Errors
// =============================================================================

/// Internal rendering errors. These indicate a mismatch between an event and
/// the schema, never a filtering decision.
#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    /// Event shape does not match the formatter.
    #[error("formatter for {} events cannot render {} events", .expected.as_str(), .actual.as_str())]
    ShapeMismatch {
        /// Shape the formatter renders.
        expected: EventKind,
        /// Shape it was given.
        actual: EventKind,
    },

    /// A created or updated record has no after-image.
    #[error("change at {0} carries no data")]
    MissingData(String),

    /// A node's module is not in the current schema.
    #[error("module {0} has no known namespace")]
    UnknownNamespace(String),

    /// JSON serialization failed.
    #[error("JSON rendering failed: {0}")]
    Json(#[from] serde_json::Error),

    /// XML writing failed.
    #[error("XML rendering failed: {0}")]
    Xml(String),
}

// =============================================================================
// Formatter
// =============================================================================

/// Renderer bound to one parameter set, encoding, and event shape.
pub struct EventFormatter {
    params: TextParameters,
    encoding: EncodingName,
    kind: EventKind,
    render: RenderFn,
}

impl EventFormatter {
    /// Rendering parameters.
    #[must_use]
    pub const fn params(&self) -> &TextParameters {
        &self.params
    }

    /// Output encoding.
    #[must_use]
    pub const fn encoding(&self) -> EncodingName {
        self.encoding
    }

    /// Event shape rendered.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        self.kind
    }

    /// Render one document, or `None` when nothing is left to send.
    ///
    /// # Errors
    ///
    /// Returns `FormatError` when the event does not fit the formatter or the
    /// schema in `ctx`.
    pub fn create_text(
        &self,
        ctx: &ModelContext,
        event: &Event,
        now: DateTime<Utc>,
        selection: &Selection,
    ) -> Result<Option<String>, FormatError> {
        (self.render)(&self.params, ctx, event, now, selection)
    }
}

impl fmt::Debug for EventFormatter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventFormatter")
            .field("params", &self.params)
            .field("encoding", &self.encoding)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Factory
// =============================================================================

/// Creates and caches formatters for one encoding and event shape.
///
/// Equal parameters always yield the same `Arc`; `TextParameters::EMPTY`
/// yields the factory's shared default instance.
pub struct FormatterFactory {
    encoding: EncodingName,
    kind: EventKind,
    render: RenderFn,
    empty: Arc<EventFormatter>,
    cache: RwLock<HashMap<TextParameters, Arc<EventFormatter>>>,
}

impl FormatterFactory {
    /// Factory for `encoding` and `kind`.
    #[must_use]
    pub fn new(encoding: EncodingName, kind: EventKind) -> Self {
        let render = select_render(encoding, kind);
        Self {
            encoding,
            kind,
            render,
            empty: Arc::new(EventFormatter {
                params: TextParameters::EMPTY,
                encoding,
                kind,
                render,
            }),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Output encoding.
    #[must_use]
    pub const fn encoding(&self) -> EncodingName {
        self.encoding
    }

    /// Event shape.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        self.kind
    }

    /// Formatter for `params`, created on first request.
    #[must_use]
    pub fn new_formatter(&self, params: TextParameters) -> Arc<EventFormatter> {
        if params.is_empty() {
            return Arc::clone(&self.empty);
        }
        if let Some(existing) = self.cache.read().get(&params) {
            return Arc::clone(existing);
        }
        let mut cache = self.cache.write();
        let formatter = cache.entry(params).or_insert_with(|| {
            Arc::new(EventFormatter {
                params,
                encoding: self.encoding,
                kind: self.kind,
                render: self.render,
            })
        });
        Arc::clone(formatter)
    }

    /// Number of non-default formatters created so far.
    #[must_use]
    pub fn cached_len(&self) -> usize {
        self.cache.read().len()
    }
}

impl fmt::Debug for FormatterFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormatterFactory")
            .field("encoding", &self.encoding)
            .field("kind", &self.kind)
            .field("cached", &self.cached_len())
            .finish_non_exhaustive()
    }
}

fn select_render(encoding: EncodingName, kind: EventKind) -> RenderFn {
    match (encoding, kind) {
        (EncodingName::Json, EventKind::DataChange) => json::render_data_change,
        (EncodingName::Json, EventKind::Notification) => json::render_notification,
        (EncodingName::Xml, EventKind::DataChange) => xml::render_data_change,
        (EncodingName::Xml, EventKind::Notification) => xml::render_notification,
    }
}

// =============================================================================
// Shared Rendering Helpers
// =============================================================================

/// RFC 3339 timestamp with nanosecond precision.
#[must_use]
pub fn format_event_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Nanos, false)
}

/// One `data-change-event` entry.
struct ChangeEntry<'a> {
    path: InstancePath,
    operation: ModificationType,
    data: Option<&'a DataNode>,
}

/// Entries for all selected, effective records of a batch.
fn selected_entries<'a>(
    params: &TextParameters,
    ctx: &ModelContext,
    records: &'a [ChangeRecord],
    selection: &Selection,
) -> Result<Vec<ChangeEntry<'a>>, FormatError> {
    let mut entries = Vec::new();
    for (index, record) in records.iter().enumerate() {
        if !selection.includes(index) || record.modification == ModificationType::Unmodified {
            continue;
        }
        record_entries(params, ctx, record, &mut entries)?;
    }
    Ok(entries)
}

fn record_entries<'a>(
    params: &TextParameters,
    ctx: &ModelContext,
    record: &'a ChangeRecord,
    out: &mut Vec<ChangeEntry<'a>>,
) -> Result<(), FormatError> {
    let deleted = record.modification == ModificationType::Deleted;
    let data = if deleted {
        None
    } else {
        Some(
            record
                .data_after
                .as_ref()
                .ok_or_else(|| FormatError::MissingData(record.path.to_string()))?,
        )
    };

    if params.changed_leaf_nodes_only() || params.child_nodes_only() {
        let split = |tree: Option<&'a DataNode>| {
            let mut parts = Vec::new();
            if let Some(tree) = tree {
                if params.child_nodes_only() {
                    collect_children(ctx, tree, &record.path, &mut parts);
                } else {
                    collect_leaves(ctx, tree, record.path.clone(), &mut parts);
                }
            }
            parts
        };
        diff_entries(record, data, split(record.data_before.as_ref()), split(data), out);
        return Ok(());
    }

    if !params.leaf_nodes_only() {
        out.push(ChangeEntry {
            path: record.path.clone(),
            operation: record.modification,
            data,
        });
        return Ok(());
    }

    let Some(tree) = record.current_data() else {
        out.push(ChangeEntry {
            path: record.path.clone(),
            operation: record.modification,
            data: None,
        });
        return Ok(());
    };

    let mut leaves = Vec::new();
    collect_leaves(ctx, tree, record.path.clone(), &mut leaves);
    out.extend(leaves.into_iter().map(|(path, leaf)| ChangeEntry {
        path,
        operation: record.modification,
        data: (!deleted).then_some(leaf),
    }));
    Ok(())
}

/// Entries for the parts that differ between the before and after images.
/// Parts present only after are created, only before are deleted, and in both
/// with different content are updated. A record with no parts on either side
/// reports itself.
fn diff_entries<'a>(
    record: &'a ChangeRecord,
    data: Option<&'a DataNode>,
    before: Vec<(InstancePath, &'a DataNode)>,
    after: Vec<(InstancePath, &'a DataNode)>,
    out: &mut Vec<ChangeEntry<'a>>,
) {
    if before.is_empty() && after.is_empty() {
        out.push(ChangeEntry {
            path: record.path.clone(),
            operation: record.modification,
            data,
        });
        return;
    }

    for (path, node) in &after {
        let operation = match before.iter().find(|(old_path, _)| old_path == path) {
            Some((_, old)) if *old == *node => continue,
            Some(_) => ModificationType::Updated,
            None => ModificationType::Created,
        };
        out.push(ChangeEntry {
            path: path.clone(),
            operation,
            data: Some(*node),
        });
    }
    for (path, _) in before {
        if !after.iter().any(|(new_path, _)| *new_path == path) {
            out.push(ChangeEntry {
                path,
                operation: ModificationType::Deleted,
                data: None,
            });
        }
    }
}

/// Depth-first walk collecting `(path, node)` for every leaf and leaf-list.
fn collect_leaves<'a>(
    ctx: &ModelContext,
    node: &'a DataNode,
    path: InstancePath,
    out: &mut Vec<(InstancePath, &'a DataNode)>,
) {
    match node {
        DataNode::Leaf { .. } | DataNode::LeafList { .. } => out.push((path, node)),
        DataNode::Container { children, .. } => {
            for child in children {
                let child_path = path.child(PathArg::node(child.qname().clone()));
                collect_leaves(ctx, child, child_path, out);
            }
        }
        DataNode::List { qname, entries } => {
            for entry in entries {
                let entry_path = list_entry_path(ctx, &path, qname, entry);
                for child in entry {
                    let child_path = entry_path.child(PathArg::node(child.qname().clone()));
                    collect_leaves(ctx, child, child_path, out);
                }
            }
        }
    }
}

/// `(path, node)` for each direct child of `node`. List entries contribute
/// their children under the keyed entry path; leaves have no children.
fn collect_children<'a>(
    ctx: &ModelContext,
    node: &'a DataNode,
    path: &InstancePath,
    out: &mut Vec<(InstancePath, &'a DataNode)>,
) {
    match node {
        DataNode::Leaf { .. } | DataNode::LeafList { .. } => {}
        DataNode::Container { children, .. } => out.extend(
            children
                .iter()
                .map(|child| (path.child(PathArg::node(child.qname().clone())), child)),
        ),
        DataNode::List { qname, entries } => {
            for entry in entries {
                let entry_path = list_entry_path(ctx, path, qname, entry);
                out.extend(
                    entry
                        .iter()
                        .map(|child| (entry_path.child(PathArg::node(child.qname().clone())), child)),
                );
            }
        }
    }
}

/// Path of one list entry, keyed by the key leaves the schema declares.
fn list_entry_path(
    ctx: &ModelContext,
    list_path: &InstancePath,
    qname: &QName,
    entry: &[DataNode],
) -> InstancePath {
    let key_names = ctx
        .resolve_path(list_path)
        .map(|schema| schema.keys().to_vec())
        .unwrap_or_default();
    let keys = entry
        .iter()
        .filter_map(|child| match child {
            DataNode::Leaf { qname, value } if key_names.iter().any(|k| k == qname.name()) => {
                Some((qname.clone(), value.to_string()))
            }
            _ => None,
        })
        .collect();
    let mut args = list_path.args().to_vec();
    args.pop();
    args.push(PathArg::entry(qname.clone(), keys));
    InstancePath::new(args)
}

// =============================================================================
// Tests
// =============================================================================
