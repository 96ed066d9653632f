//! JSON rendering (RFC 7951 member naming).
//!
//! ```json
//! {
//!   "ietf-restconf:notification": {
//!     "sal-remote:data-changed-notification": {
//!       "data-change-event": [
//!         {"path": "/toaster:toaster/toaster:toasterStatus", "operation": "updated",
//!          "data": {"toaster:toasterStatus": "up"}}
//!       ]
//!     },
//!     "event-time": "2026-10-15T10:00:00.500000000+00:00"
//!   }
//! }
//! ```

use chrono::{DateTime, Utc};
use serde_json::{Map, Value, json};

use super::{ChangeEntry, FormatError, format_event_time, selected_entries};
use crate::domain::event::{Event, EventKind, Selection};
use crate::domain::model::{DataNode, LeafValue, ModelContext};
use crate::domain::params::TextParameters;

pub(super) fn render_data_change(
    params: &TextParameters,
    ctx: &ModelContext,
    event: &Event,
    now: DateTime<Utc>,
    selection: &Selection,
) -> Result<Option<String>, FormatError> {
    let Event::ChangeBatch(batch) = event else {
        return Err(FormatError::ShapeMismatch {
            expected: EventKind::DataChange,
            actual: event.kind(),
        });
    };

    let entries = selected_entries(params, ctx, batch.records(), selection)?;
    if entries.is_empty() {
        return Ok(None);
    }

    let events = entries
        .iter()
        .map(|entry| change_entry(ctx, entry, params.skip_data()))
        .collect::<Result<Vec<Value>, FormatError>>()?;

    let document = json!({
        "ietf-restconf:notification": {
            "sal-remote:data-changed-notification": {
                "data-change-event": events,
            },
            "event-time": format_event_time(now),
        }
    });
    to_text(&document, params.pretty_print()).map(Some)
}

pub(super) fn render_notification(
    params: &TextParameters,
    ctx: &ModelContext,
    event: &Event,
    now: DateTime<Utc>,
    selection: &Selection,
) -> Result<Option<String>, FormatError> {
    let Event::Notification(notification) = event else {
        return Err(FormatError::ShapeMismatch {
            expected: EventKind::Notification,
            actual: event.kind(),
        });
    };
    if !selection.any() {
        return Ok(None);
    }

    let mut body = Map::new();
    body.insert(
        "event-time".to_string(),
        Value::String(format_event_time(now)),
    );
    let (name, value) = member(ctx, notification.body(), None)?;
    body.insert(name, value);

    let document = json!({ "ietf-restconf:notification": body });
    to_text(&document, params.pretty_print()).map(Some)
}

fn change_entry(
    ctx: &ModelContext,
    entry: &ChangeEntry<'_>,
    skip_data: bool,
) -> Result<Value, FormatError> {
    let mut object = Map::new();
    object.insert("path".to_string(), Value::String(entry.path.to_string()));
    object.insert(
        "operation".to_string(),
        Value::String(entry.operation.as_str().to_string()),
    );
    if let Some(data) = entry.data.filter(|_| !skip_data) {
        let (name, value) = member(ctx, data, None)?;
        let mut wrapper = Map::new();
        wrapper.insert(name, value);
        object.insert("data".to_string(), Value::Object(wrapper));
    }
    Ok(Value::Object(object))
}

/// Member name and value; the module prefix is dropped when it matches the
/// enclosing node's module. Every module must be known to `ctx`, as in XML.
fn member(
    ctx: &ModelContext,
    node: &DataNode,
    parent_module: Option<&str>,
) -> Result<(String, Value), FormatError> {
    let qname = node.qname();
    if ctx.namespace_of(qname.module()).is_none() {
        return Err(FormatError::UnknownNamespace(qname.module().to_string()));
    }
    let name = if parent_module == Some(qname.module()) {
        qname.name().to_string()
    } else {
        qname.to_string()
    };
    Ok((name, node_value(ctx, node)?))
}

fn node_value(ctx: &ModelContext, node: &DataNode) -> Result<Value, FormatError> {
    match node {
        DataNode::Leaf { value, .. } => Ok(value.to_json()),
        DataNode::LeafList { values, .. } => {
            Ok(Value::Array(values.iter().map(LeafValue::to_json).collect()))
        }
        DataNode::Container { qname, children } => object(ctx, children, qname.module()),
        DataNode::List { qname, entries } => entries
            .iter()
            .map(|entry| object(ctx, entry, qname.module()))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
    }
}

fn object(ctx: &ModelContext, children: &[DataNode], module: &str) -> Result<Value, FormatError> {
    let mut map = Map::new();
    for child in children {
        let (name, value) = member(ctx, child, Some(module))?;
        map.insert(name, value);
    }
    Ok(Value::Object(map))
}

fn to_text(document: &Value, pretty: bool) -> Result<String, FormatError> {
    let text = if pretty {
        serde_json::to_string_pretty(document)?
    } else {
        serde_json::to_string(document)?
    };
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::event::ChangeRecord;
    use crate::domain::model::{InstancePath, Module, QName};
    use crate::test_support::{
        batch, fixed_time, restocked, status_change, status_leaf, status_path,
        toaster_container, toaster_context, toaster_path, toaster_qname,
    };

    fn render(params: TextParameters, event: &Event, selection: &Selection) -> Option<Value> {
        render_data_change(&params, &toaster_context(), event, fixed_time(), selection)
            .unwrap()
            .map(|text| serde_json::from_str(&text).unwrap())
    }

    fn change_events(document: &Value) -> &Vec<Value> {
        document["ietf-restconf:notification"]["sal-remote:data-changed-notification"]
            ["data-change-event"]
            .as_array()
            .unwrap()
    }

    #[test]
    fn renders_toaster_status_change() {
        let event = batch(vec![status_change("up")]);
        let document = render(TextParameters::EMPTY, &event, &Selection::All).unwrap();

        assert_eq!(
            document["ietf-restconf:notification"]["event-time"],
            "2026-10-15T10:00:00.500000000+00:00"
        );
        let events = change_events(&document);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["path"], "/toaster:toaster/toaster:toasterStatus");
        assert_eq!(events[0]["operation"], "updated");
        assert_eq!(events[0]["data"]["toaster:toasterStatus"], "up");
    }

    #[test]
    fn skip_data_omits_content() {
        let event = batch(vec![status_change("up")]);
        let params = TextParameters::new(false, true, false);
        let document = render(params, &event, &Selection::All).unwrap();
        let entry = &change_events(&document)[0];
        assert!(entry.get("data").is_none());
        assert_eq!(entry["operation"], "updated");
    }

    #[test]
    fn nested_members_drop_repeated_prefix() {
        let event = batch(vec![ChangeRecord::created(
            toaster_path(),
            toaster_container("up", "Acme"),
        )]);
        let document = render(TextParameters::EMPTY, &event, &Selection::All).unwrap();
        let data = &change_events(&document)[0]["data"]["toaster:toaster"];
        assert_eq!(data["toasterStatus"], "up");
        assert_eq!(data["toasterManufacturer"], "Acme");
    }

    #[test]
    fn leaf_nodes_only_expands_per_leaf() {
        let event = batch(vec![ChangeRecord::created(
            toaster_path(),
            toaster_container("up", "Acme"),
        )]);
        let params = TextParameters::new(false, false, true);
        let document = render(params, &event, &Selection::All).unwrap();
        let events = change_events(&document);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0]["path"], "/toaster:toaster/toaster:toasterManufacturer");
        assert_eq!(events[0]["data"]["toaster:toasterManufacturer"], "Acme");
        assert_eq!(events[1]["path"], "/toaster:toaster/toaster:toasterStatus");
        assert_eq!(events[1]["operation"], "created");
    }

    #[test]
    fn leaf_nodes_only_keys_list_entries() {
        let slot = DataNode::List {
            qname: toaster_qname("slot"),
            entries: vec![vec![
                DataNode::leaf(toaster_qname("id"), "s1"),
                DataNode::leaf(toaster_qname("bread"), "rye"),
            ]],
        };
        let path = InstancePath::parse("/toaster:toaster/slot").unwrap();
        let event = batch(vec![ChangeRecord::created(path, slot)]);
        let params = TextParameters::new(false, false, true);
        let document = render(params, &event, &Selection::All).unwrap();
        let events = change_events(&document);
        assert_eq!(
            events[1]["path"],
            "/toaster:toaster/toaster:slot[toaster:id='s1']/toaster:bread"
        );
    }

    #[test]
    fn changed_leaf_nodes_only_reports_differing_leaves() {
        let record = ChangeRecord::updated(
            toaster_path(),
            Some(toaster_container("down", "Acme")),
            toaster_container("up", "Acme"),
        );
        let params = TextParameters::EMPTY.with_changed_leaf_nodes_only(true);
        let document = render(params, &batch(vec![record]), &Selection::All).unwrap();
        let events = change_events(&document);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["path"], "/toaster:toaster/toaster:toasterStatus");
        assert_eq!(events[0]["operation"], "updated");
        assert_eq!(events[0]["data"]["toaster:toasterStatus"], "up");
    }

    #[test]
    fn changed_leaf_nodes_only_reports_removed_leaf_as_deleted() {
        let record = ChangeRecord::updated(
            toaster_path(),
            Some(toaster_container("up", "Acme")),
            DataNode::container(toaster_qname("toaster"), vec![status_leaf("up")]),
        );
        let params = TextParameters::EMPTY.with_changed_leaf_nodes_only(true);
        let document = render(params, &batch(vec![record]), &Selection::All).unwrap();
        let events = change_events(&document);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["path"], "/toaster:toaster/toaster:toasterManufacturer");
        assert_eq!(events[0]["operation"], "deleted");
        assert!(events[0].get("data").is_none());
    }

    #[test]
    fn changed_leaf_nodes_only_drops_identical_update() {
        let record = ChangeRecord::updated(
            toaster_path(),
            Some(toaster_container("up", "Acme")),
            toaster_container("up", "Acme"),
        );
        let params = TextParameters::EMPTY.with_changed_leaf_nodes_only(true);
        assert!(render(params, &batch(vec![record]), &Selection::All).is_none());
    }

    #[test]
    fn child_nodes_only_reports_direct_children() {
        let toaster = DataNode::container(
            toaster_qname("toaster"),
            vec![
                DataNode::leaf(toaster_qname("toasterManufacturer"), "Acme"),
                DataNode::List {
                    qname: toaster_qname("slot"),
                    entries: vec![vec![
                        DataNode::leaf(toaster_qname("id"), "s1"),
                        DataNode::leaf(toaster_qname("bread"), "rye"),
                    ]],
                },
            ],
        );
        let event = batch(vec![ChangeRecord::created(toaster_path(), toaster)]);
        let params = TextParameters::EMPTY.with_child_nodes_only(true);
        let document = render(params, &event, &Selection::All).unwrap();
        let events = change_events(&document);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0]["path"], "/toaster:toaster/toaster:toasterManufacturer");
        assert_eq!(events[0]["operation"], "created");
        assert_eq!(events[1]["path"], "/toaster:toaster/toaster:slot");
        assert_eq!(events[1]["data"]["toaster:slot"][0]["bread"], "rye");
    }

    #[test]
    fn child_nodes_only_skips_unchanged_children() {
        let record = ChangeRecord::updated(
            toaster_path(),
            Some(toaster_container("down", "Acme")),
            toaster_container("up", "Acme"),
        );
        let params = TextParameters::EMPTY.with_child_nodes_only(true);
        let document = render(params, &batch(vec![record]), &Selection::All).unwrap();
        let events = change_events(&document);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["path"], "/toaster:toaster/toaster:toasterStatus");
        assert_eq!(events[0]["operation"], "updated");
    }

    #[test]
    fn child_nodes_only_on_a_leaf_reports_the_leaf() {
        let params = TextParameters::EMPTY.with_child_nodes_only(true);
        let document = render(params, &batch(vec![status_change("up")]), &Selection::All).unwrap();
        let events = change_events(&document);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["path"], "/toaster:toaster/toaster:toasterStatus");
        assert_eq!(events[0]["data"]["toaster:toasterStatus"], "up");
    }

    #[test]
    fn deleted_records_carry_no_data() {
        let event = batch(vec![ChangeRecord::deleted(
            status_path(),
            Some(DataNode::leaf(toaster_qname("toasterStatus"), "up")),
        )]);
        let document = render(TextParameters::EMPTY, &event, &Selection::All).unwrap();
        let entry = &change_events(&document)[0];
        assert_eq!(entry["operation"], "deleted");
        assert!(entry.get("data").is_none());
    }

    #[test]
    fn unmodified_only_batch_renders_nothing() {
        let mut record = status_change("up");
        record.modification = crate::domain::event::ModificationType::Unmodified;
        let event = batch(vec![record]);
        assert!(render(TextParameters::EMPTY, &event, &Selection::All).is_none());
    }

    #[test]
    fn selection_controls_rendered_records() {
        let event = batch(vec![
            status_change("up"),
            status_change("down"),
            status_change("broken"),
        ]);
        let selection = Selection::Only(vec![true, false, true]);
        let document = render(TextParameters::EMPTY, &event, &selection).unwrap();
        let values: Vec<_> = change_events(&document)
            .iter()
            .map(|e| e["data"]["toaster:toasterStatus"].clone())
            .collect();
        assert_eq!(values, vec![json!("up"), json!("broken")]);

        let none = Selection::Only(vec![false, false, false]);
        assert!(render(TextParameters::EMPTY, &event, &none).is_none());
    }

    #[test]
    fn created_record_without_data_is_an_error() {
        let record = ChangeRecord {
            path: status_path(),
            modification: crate::domain::event::ModificationType::Created,
            data_before: None,
            data_after: None,
        };
        let result = render_data_change(
            &TextParameters::EMPTY,
            &toaster_context(),
            &batch(vec![record]),
            fixed_time(),
            &Selection::All,
        );
        assert!(matches!(result, Err(FormatError::MissingData(_))));
    }

    #[test]
    fn pretty_print_indents() {
        let event = batch(vec![status_change("up")]);
        let text = render_data_change(
            &TextParameters::new(true, false, false),
            &toaster_context(),
            &event,
            fixed_time(),
            &Selection::All,
        )
        .unwrap()
        .unwrap();
        assert!(text.contains("\n  "));
    }

    #[test]
    fn renders_notification() {
        let text = render_notification(
            &TextParameters::EMPTY,
            &toaster_context(),
            &restocked(12),
            fixed_time(),
            &Selection::All,
        )
        .unwrap()
        .unwrap();
        let document: Value = serde_json::from_str(&text).unwrap();
        let body = &document["ietf-restconf:notification"];
        assert_eq!(body["event-time"], "2026-10-15T10:00:00.500000000+00:00");
        assert_eq!(body["toaster:toasterRestocked"]["amountOfBread"], 12);
    }

    #[test]
    fn notification_rejected_by_selection_renders_nothing() {
        let result = render_notification(
            &TextParameters::EMPTY,
            &toaster_context(),
            &restocked(1),
            fixed_time(),
            &Selection::Only(vec![false]),
        )
        .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn foreign_module_children_keep_prefix() {
        let mut modules = toaster_context().modules().to_vec();
        modules.push(Module::new("toaster-ext", "urn:example:toaster-ext", vec![]));
        let ctx = ModelContext::new(modules);
        let node = DataNode::container(
            toaster_qname("toaster"),
            vec![DataNode::leaf(QName::new("toaster-ext", "color"), "red")],
        );
        let (name, value) = member(&ctx, &node, None).unwrap();
        assert_eq!(name, "toaster:toaster");
        assert_eq!(value["toaster-ext:color"], "red");
    }

    #[test]
    fn unknown_module_is_an_error() {
        let event = batch(vec![ChangeRecord::updated(
            toaster_path(),
            None,
            DataNode::container(
                toaster_qname("toaster"),
                vec![DataNode::leaf(QName::new("toaster-ext", "color"), "red")],
            ),
        )]);
        let result = render_data_change(
            &TextParameters::EMPTY,
            &toaster_context(),
            &event,
            fixed_time(),
            &Selection::All,
        );
        assert!(matches!(result, Err(FormatError::UnknownNamespace(m)) if m == "toaster-ext"));
    }
}
