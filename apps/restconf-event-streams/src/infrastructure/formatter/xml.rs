//! XML rendering.
//!
//! Data nodes become elements named by their local name; a default
//! namespace declaration is emitted whenever a node's module differs from
//! its parent's. Paths declare every module they reference as a prefix.

use std::fmt;

use chrono::{DateTime, Utc};
use quick_xml::Writer;
use quick_xml::escape::partial_escape;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event as XmlEvent};

use super::{ChangeEntry, FormatError, format_event_time, selected_entries};
use crate::domain::event::{Event, EventKind, Selection};
use crate::domain::model::{DataNode, LeafValue, ModelContext};
use crate::domain::params::TextParameters;

/// Namespace of the NETCONF notification envelope.
const NOTIFICATION_NS: &str = "urn:ietf:params:xml:ns:netconf:notification:1.0";

/// Namespace of the data-changed-notification payload.
const SAL_REMOTE_NS: &str = "urn:opendaylight:params:xml:ns:yang:controller:md:sal:remote";

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

    let mut doc = XmlDoc::new(params.pretty_print());
    doc.start("notification", &[("xmlns", NOTIFICATION_NS)])?;
    doc.text_element("event-time", &[], &format_event_time(now))?;
    doc.start("data-changed-notification", &[("xmlns", SAL_REMOTE_NS)])?;
    for entry in &entries {
        write_change_entry(&mut doc, ctx, entry, params.skip_data())?;
    }
    doc.end("data-changed-notification")?;
    doc.end("notification")?;
    doc.finish().map(Some)
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

    let mut doc = XmlDoc::new(params.pretty_print());
    doc.start("notification", &[("xmlns", NOTIFICATION_NS)])?;
    doc.text_element("event-time", &[], &format_event_time(now))?;
    write_node(&mut doc, ctx, notification.body(), None)?;
    doc.end("notification")?;
    doc.finish().map(Some)
}

fn write_change_entry(
    doc: &mut XmlDoc,
    ctx: &ModelContext,
    entry: &ChangeEntry<'_>,
    skip_data: bool,
) -> Result<(), FormatError> {
    doc.start("data-change-event", &[])?;

    let declarations = entry
        .path
        .modules()
        .into_iter()
        .map(|module| {
            let namespace = namespace(ctx, module)?;
            Ok((format!("xmlns:{module}"), namespace))
        })
        .collect::<Result<Vec<_>, FormatError>>()?;
    let attributes: Vec<(&str, &str)> = declarations
        .iter()
        .map(|(name, ns)| (name.as_str(), *ns))
        .collect();
    doc.text_element("path", &attributes, &entry.path.to_string())?;
    doc.text_element("operation", &[], entry.operation.as_str())?;

    if let Some(data) = entry.data.filter(|_| !skip_data) {
        doc.start("data", &[])?;
        write_node(doc, ctx, data, Some(SAL_REMOTE_NS))?;
        doc.end("data")?;
    }

    doc.end("data-change-event")
}

fn write_node(
    doc: &mut XmlDoc,
    ctx: &ModelContext,
    node: &DataNode,
    parent_ns: Option<&str>,
) -> Result<(), FormatError> {
    let qname = node.qname();
    let ns = namespace(ctx, qname.module())?;
    let name = qname.name();
    let declaration = [("xmlns", ns)];
    let declare: &[(&str, &str)] = if parent_ns == Some(ns) {
        &[]
    } else {
        &declaration
    };

    match node {
        DataNode::Leaf { value, .. } => write_leaf(doc, name, declare, value),
        DataNode::LeafList { values, .. } => {
            for value in values {
                write_leaf(doc, name, declare, value)?;
            }
            Ok(())
        }
        DataNode::Container { children, .. } => {
            doc.start(name, declare)?;
            for child in children {
                write_node(doc, ctx, child, Some(ns))?;
            }
            doc.end(name)
        }
        DataNode::List { entries, .. } => {
            for entry in entries {
                doc.start(name, declare)?;
                for child in entry {
                    write_node(doc, ctx, child, Some(ns))?;
                }
                doc.end(name)?;
            }
            Ok(())
        }
    }
}

fn write_leaf(
    doc: &mut XmlDoc,
    name: &str,
    attributes: &[(&str, &str)],
    value: &LeafValue,
) -> Result<(), FormatError> {
    match value {
        LeafValue::Empty => doc.empty(name, attributes),
        other => doc.text_element(name, attributes, &other.to_string()),
    }
}

fn namespace<'a>(ctx: &'a ModelContext, module: &str) -> Result<&'a str, FormatError> {
    ctx.namespace_of(module)
        .ok_or_else(|| FormatError::UnknownNamespace(module.to_string()))
}

// =============================================================================
// Writer
// =============================================================================

struct XmlDoc {
    writer: Writer<Vec<u8>>,
}

impl XmlDoc {
    fn new(pretty: bool) -> Self {
        let writer = if pretty {
            Writer::new_with_indent(Vec::new(), b' ', 2)
        } else {
            Writer::new(Vec::new())
        };
        Self { writer }
    }

    fn start(&mut self, name: &str, attributes: &[(&str, &str)]) -> Result<(), FormatError> {
        let element = BytesStart::new(name).with_attributes(attributes.iter().copied());
        self.writer
            .write_event(XmlEvent::Start(element))
            .map_err(xml_error)
    }

    fn end(&mut self, name: &str) -> Result<(), FormatError> {
        self.writer
            .write_event(XmlEvent::End(BytesEnd::new(name)))
            .map_err(xml_error)
    }

    fn empty(&mut self, name: &str, attributes: &[(&str, &str)]) -> Result<(), FormatError> {
        let element = BytesStart::new(name).with_attributes(attributes.iter().copied());
        self.writer
            .write_event(XmlEvent::Empty(element))
            .map_err(xml_error)
    }

    fn text_element(
        &mut self,
        name: &str,
        attributes: &[(&str, &str)],
        text: &str,
    ) -> Result<(), FormatError> {
        self.start(name, attributes)?;
        self.writer
            .write_event(XmlEvent::Text(BytesText::from_escaped(partial_escape(text))))
            .map_err(xml_error)?;
        self.end(name)
    }

    fn finish(self) -> Result<String, FormatError> {
        String::from_utf8(self.writer.into_inner()).map_err(xml_error)
    }
}

fn xml_error(err: impl fmt::Display) -> FormatError {
    FormatError::Xml(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::event::ChangeRecord;
    use crate::domain::model::QName;
    use crate::test_support::{
        TOASTER_NS, batch, fixed_time, restocked, status_change, status_leaf, status_path,
        toaster_container, toaster_context, toaster_path, toaster_qname,
    };

    fn render(params: TextParameters, event: &Event) -> Option<String> {
        render_data_change(
            &params,
            &toaster_context(),
            event,
            fixed_time(),
            &Selection::All,
        )
        .unwrap()
    }

    #[test]
    fn renders_toaster_status_change() {
        let text = render(TextParameters::EMPTY, &batch(vec![status_change("up")])).unwrap();
        let expected = format!(
            "<notification xmlns=\"{NOTIFICATION_NS}\">\
             <event-time>2026-10-15T10:00:00.500000000+00:00</event-time>\
             <data-changed-notification xmlns=\"{SAL_REMOTE_NS}\">\
             <data-change-event>\
             <path xmlns:toaster=\"{TOASTER_NS}\">/toaster:toaster/toaster:toasterStatus</path>\
             <operation>updated</operation>\
             <data><toasterStatus xmlns=\"{TOASTER_NS}\">up</toasterStatus></data>\
             </data-change-event>\
             </data-changed-notification>\
             </notification>"
        );
        assert_eq!(text, expected);
    }

    #[test]
    fn output_is_well_formed() {
        let event = batch(vec![
            ChangeRecord::created(toaster_path(), toaster_container("up", "A & B <Co>")),
            ChangeRecord::deleted(status_path(), None),
        ]);
        for pretty in [false, true] {
            let text = render(TextParameters::new(pretty, false, false), &event).unwrap();
            assert!(sxd_document::parser::parse(&text).is_ok(), "{text}");
        }
    }

    #[test]
    fn nested_children_inherit_namespace() {
        let event = batch(vec![ChangeRecord::created(
            toaster_path(),
            toaster_container("up", "Acme"),
        )]);
        let text = render(TextParameters::EMPTY, &event).unwrap();
        assert!(text.contains(&format!(
            "<toaster xmlns=\"{TOASTER_NS}\"><toasterManufacturer>Acme</toasterManufacturer>\
             <toasterStatus>up</toasterStatus></toaster>"
        )));
    }

    #[test]
    fn skip_data_omits_data_element() {
        let params = TextParameters::new(false, true, false);
        let text = render(params, &batch(vec![status_change("up")])).unwrap();
        assert!(!text.contains("<data>"));
        assert!(text.contains("<operation>updated</operation>"));
    }

    #[test]
    fn changed_leaf_nodes_only_writes_one_entry_per_changed_leaf() {
        let record = ChangeRecord::updated(
            toaster_path(),
            Some(toaster_container("down", "Acme")),
            toaster_container("up", "Acme"),
        );
        let params = TextParameters::EMPTY.with_changed_leaf_nodes_only(true);
        let text = render(params, &batch(vec![record])).unwrap();
        assert!(text.contains(&format!(
            "<data-change-event>\
             <path xmlns:toaster=\"{TOASTER_NS}\">/toaster:toaster/toaster:toasterStatus</path>\
             <operation>updated</operation>\
             <data><toasterStatus xmlns=\"{TOASTER_NS}\">up</toasterStatus></data>\
             </data-change-event>"
        )));
        assert!(!text.contains("toasterManufacturer"));
        assert_eq!(text.matches("<data-change-event>").count(), 1);
    }

    #[test]
    fn child_nodes_only_writes_removed_child_as_deleted() {
        let record = ChangeRecord::updated(
            toaster_path(),
            Some(toaster_container("up", "Acme")),
            DataNode::container(toaster_qname("toaster"), vec![status_leaf("up")]),
        );
        let params = TextParameters::EMPTY.with_child_nodes_only(true);
        let text = render(params, &batch(vec![record])).unwrap();
        assert!(text.contains(&format!(
            "<data-change-event>\
             <path xmlns:toaster=\"{TOASTER_NS}\">/toaster:toaster/toaster:toasterManufacturer</path>\
             <operation>deleted</operation>\
             </data-change-event>"
        )));
        assert_eq!(text.matches("<data-change-event>").count(), 1);
    }

    #[test]
    fn child_nodes_only_writes_created_children() {
        let event = batch(vec![ChangeRecord::created(
            toaster_path(),
            toaster_container("up", "Acme"),
        )]);
        let params = TextParameters::EMPTY.with_child_nodes_only(true);
        let text = render(params, &event).unwrap();
        assert_eq!(text.matches("<operation>created</operation>").count(), 2);
        assert!(text.contains(&format!(
            "<data><toasterManufacturer xmlns=\"{TOASTER_NS}\">Acme</toasterManufacturer></data>"
        )));
        assert!(sxd_document::parser::parse(&text).is_ok(), "{text}");
    }

    #[test]
    fn key_values_keep_quotes_in_path() {
        let path = crate::domain::model::InstancePath::parse("/toaster:toaster/slot[id='s1']/bread")
            .unwrap();
        let event = batch(vec![ChangeRecord::created(
            path,
            DataNode::leaf(toaster_qname("bread"), "rye"),
        )]);
        let text = render(TextParameters::EMPTY, &event).unwrap();
        assert!(text.contains(
            "/toaster:toaster/toaster:slot[toaster:id='s1']/toaster:bread</path>"
        ));
    }

    #[test]
    fn unknown_module_is_an_error() {
        let path = crate::domain::model::InstancePath::parse("/oven:oven").unwrap();
        let event = batch(vec![ChangeRecord::created(
            path,
            DataNode::leaf(QName::new("oven", "oven"), "hot"),
        )]);
        let result = render_data_change(
            &TextParameters::EMPTY,
            &toaster_context(),
            &event,
            fixed_time(),
            &Selection::All,
        );
        assert!(matches!(result, Err(FormatError::UnknownNamespace(m)) if m == "oven"));
    }

    #[test]
    fn empty_leaf_renders_as_empty_element() {
        let node = DataNode::leaf(toaster_qname("toasterStatus"), LeafValue::Empty);
        let mut doc = XmlDoc::new(false);
        write_node(&mut doc, &toaster_context(), &node, None).unwrap();
        assert_eq!(
            doc.finish().unwrap(),
            format!("<toasterStatus xmlns=\"{TOASTER_NS}\"/>")
        );
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
        assert_eq!(
            text,
            format!(
                "<notification xmlns=\"{NOTIFICATION_NS}\">\
                 <event-time>2026-10-15T10:00:00.500000000+00:00</event-time>\
                 <toasterRestocked xmlns=\"{TOASTER_NS}\">\
                 <amountOfBread>12</amountOfBread>\
                 </toasterRestocked>\
                 </notification>"
            )
        );
    }

    #[test]
    fn filtered_out_batch_renders_nothing() {
        let result = render_data_change(
            &TextParameters::EMPTY,
            &toaster_context(),
            &batch(vec![status_change("up")]),
            fixed_time(),
            &Selection::Only(vec![false]),
        )
        .unwrap();
        assert!(result.is_none());
    }
}
