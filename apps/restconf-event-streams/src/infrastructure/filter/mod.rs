//! XPath Event Filter
//!
//! A subscriber may attach one boolean XPath expression. It is compiled when
//! the subscription is set up and evaluated against a document synthesized
//! from each event:
//!
//! ```xml
//! <notification>
//!   <toasterStatus xmlns="http://netconfcentral.org/ns/toaster">up</toasterStatus>
//! </notification>
//! ```
//!
//! Every module of the schema in effect at delivery time is bound as an
//! XPath prefix under its own name, so `/notification/toaster:toasterStatus`
//! addresses the element above. Change batches are evaluated per record and
//! the verdicts returned as a `Selection`, so the formatter renders exactly
//! the records that matched.
//!
//! Compiled expressions are not `Send`; each thread keeps its own compiled
//! copy, keyed by expression text.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use sxd_document::dom::{Document, Element};
use sxd_document::{Package, QName as XmlName};
use sxd_xpath::{Context, Factory, XPath};

use crate::domain::event::{ChangeRecord, Event, Selection};
use crate::domain::model::{DataNode, LeafValue, ModelContext};

/// Compiled expressions kept per thread before the cache is reset.
const MAX_CACHED_EXPRESSIONS: usize = 256;

thread_local! {
    static COMPILED: RefCell<HashMap<String, Rc<XPath>>> = RefCell::new(HashMap::new());
}

// =============================================================================
// Errors
// =============================================================================

/// Filter compilation and evaluation errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FilterError {
    /// Expression is blank.
    #[error("filter expression is empty")]
    Empty,

    /// Expression does not parse.
    #[error("invalid filter expression '{expression}': {reason}")]
    Invalid {
        /// Expression text.
        expression: String,
        /// Parser message.
        reason: String,
    },

    /// The event's type is not in the current schema.
    #[error("event no longer resolves against the schema: {0}")]
    Unresolved(String),

    /// Evaluation failed at run time.
    #[error("filter evaluation failed: {0}")]
    Evaluation(String),
}

// =============================================================================
// Filter
// =============================================================================

/// A compiled boolean XPath expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFilter {
    expression: String,
}

impl EventFilter {
    /// Compile `expression`.
    ///
    /// # Errors
    ///
    /// Returns `FilterError::Empty` for blank input and
    /// `FilterError::Invalid` when the expression does not parse.
    pub fn compile(expression: &str) -> Result<Self, FilterError> {
        compiled(expression)?;
        Ok(Self {
            expression: expression.to_string(),
        })
    }

    /// Expression text.
    #[must_use]
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Evaluate against `event`, returning which parts matched.
    ///
    /// # Errors
    ///
    /// `FilterError::Unresolved` when a notification's type is not in `ctx`;
    /// `FilterError::Evaluation` when the expression fails at run time. A
    /// change record that does not resolve is excluded on its own and never
    /// fails the batch.
    pub fn evaluate(&self, ctx: &ModelContext, event: &Event) -> Result<Selection, FilterError> {
        let xpath = compiled(&self.expression)?;
        match event {
            Event::Notification(notification) => {
                ctx.find_notification(notification.qname())
                    .map_err(|e| FilterError::Unresolved(e.to_string()))?;
                let matched = evaluate_node(&xpath, ctx, notification.body())?;
                Ok(if matched {
                    Selection::All
                } else {
                    Selection::Only(vec![false])
                })
            }
            Event::ChangeBatch(batch) => {
                let mask = batch
                    .records()
                    .iter()
                    .map(|record| self.evaluate_record(&xpath, ctx, record))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Selection::Only(mask))
            }
        }
    }

    /// Whether any part of `event` matches.
    ///
    /// # Errors
    ///
    /// See [`EventFilter::evaluate`].
    pub fn matches(&self, ctx: &ModelContext, event: &Event) -> Result<bool, FilterError> {
        self.evaluate(ctx, event).map(|selection| selection.any())
    }

    fn evaluate_record(
        &self,
        xpath: &XPath,
        ctx: &ModelContext,
        record: &ChangeRecord,
    ) -> Result<bool, FilterError> {
        if let Err(e) = ctx.resolve_path(&record.path) {
            tracing::warn!(
                filter = %self.expression,
                path = %record.path,
                error = %e,
                "Change no longer resolves against the schema, excluding it"
            );
            return Ok(false);
        }

        let result = match record.current_data() {
            Some(data) => evaluate_node(xpath, ctx, data),
            None => {
                let Some(last) = record.path.last() else {
                    return Ok(false);
                };
                let placeholder = DataNode::container(last.qname().clone(), Vec::new());
                evaluate_node(xpath, ctx, &placeholder)
            }
        };

        match result {
            Err(FilterError::Unresolved(reason)) => {
                tracing::warn!(
                    filter = %self.expression,
                    path = %record.path,
                    error = %reason,
                    "Change data no longer resolves against the schema, excluding it"
                );
                Ok(false)
            }
            other => other,
        }
    }
}

fn compiled(expression: &str) -> Result<Rc<XPath>, FilterError> {
    if expression.trim().is_empty() {
        return Err(FilterError::Empty);
    }
    COMPILED.with(|cache| {
        if let Some(xpath) = cache.borrow().get(expression) {
            return Ok(Rc::clone(xpath));
        }
        let xpath = Rc::new(
            Factory::new()
                .build(expression)
                .map_err(|e| FilterError::Invalid {
                    expression: expression.to_string(),
                    reason: e.to_string(),
                })?
                .ok_or(FilterError::Empty)?,
        );
        let mut cache = cache.borrow_mut();
        if cache.len() >= MAX_CACHED_EXPRESSIONS {
            cache.clear();
        }
        cache.insert(expression.to_string(), Rc::clone(&xpath));
        Ok(xpath)
    })
}

// =============================================================================
// Document View
// =============================================================================

fn evaluate_node(xpath: &XPath, ctx: &ModelContext, node: &DataNode) -> Result<bool, FilterError> {
    let package = Package::new();
    let doc = package.as_document();
    let root = doc.create_element("notification");
    doc.root().append_child(root);
    append_node(&doc, root, ctx, node)?;

    let mut context = Context::new();
    for module in ctx.modules() {
        context.set_namespace(module.name(), module.namespace());
    }
    let value = xpath
        .evaluate(&context, doc.root())
        .map_err(|e| FilterError::Evaluation(e.to_string()))?;
    Ok(value.boolean())
}

fn append_node<'d>(
    doc: &Document<'d>,
    parent: Element<'d>,
    ctx: &ModelContext,
    node: &DataNode,
) -> Result<(), FilterError> {
    let qname = node.qname();
    let namespace = ctx
        .namespace_of(qname.module())
        .ok_or_else(|| FilterError::Unresolved(format!("unknown module '{}'", qname.module())))?;
    let name = XmlName::with_namespace_uri(Some(namespace), qname.name());

    match node {
        DataNode::Leaf { value, .. } => {
            parent.append_child(leaf_element(doc, name, value));
        }
        DataNode::LeafList { values, .. } => {
            for value in values {
                parent.append_child(leaf_element(doc, name, value));
            }
        }
        DataNode::Container { children, .. } => {
            let element = doc.create_element(name);
            parent.append_child(element);
            for child in children {
                append_node(doc, element, ctx, child)?;
            }
        }
        DataNode::List { entries, .. } => {
            for entry in entries {
                let element = doc.create_element(name);
                parent.append_child(element);
                for child in entry {
                    append_node(doc, element, ctx, child)?;
                }
            }
        }
    }
    Ok(())
}

fn leaf_element<'d>(doc: &Document<'d>, name: XmlName<'_>, value: &LeafValue) -> Element<'d> {
    let element = doc.create_element(name);
    if !matches!(value, LeafValue::Empty) {
        element.append_child(doc.create_text(&value.to_string()));
    }
    element
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::domain::event::ChangeRecord;
    use crate::domain::model::{InstancePath, QName};
    use crate::test_support::{
        batch, restocked, status_change, status_path, toaster_container, toaster_context,
        toaster_path,
    };

    #[test]
    fn compile_rejects_blank_and_malformed_expressions() {
        assert_eq!(EventFilter::compile("   "), Err(FilterError::Empty));
        assert!(matches!(
            EventFilter::compile("/notification["),
            Err(FilterError::Invalid { .. })
        ));
    }

    #[test]
    fn notification_predicate_matches_body() {
        let filter =
            EventFilter::compile("/notification/toaster:toasterRestocked[toaster:amountOfBread > 5]")
                .unwrap();
        let ctx = toaster_context();
        assert_eq!(filter.evaluate(&ctx, &restocked(12)), Ok(Selection::All));
        assert_eq!(
            filter.evaluate(&ctx, &restocked(3)),
            Ok(Selection::Only(vec![false]))
        );
        assert!(filter.matches(&ctx, &restocked(6)).unwrap());
    }

    #[test]
    fn batch_is_evaluated_per_record() {
        let filter = EventFilter::compile("/notification/toaster:toasterStatus = 'up'").unwrap();
        let event = batch(vec![
            status_change("up"),
            status_change("down"),
            status_change("up"),
        ]);
        assert_eq!(
            filter.evaluate(&toaster_context(), &event),
            Ok(Selection::Only(vec![true, false, true]))
        );
    }

    #[test]
    fn nested_data_is_searchable() {
        let filter = EventFilter::compile("//toaster:toasterManufacturer = 'Acme'").unwrap();
        let event = batch(vec![ChangeRecord::created(
            toaster_path(),
            toaster_container("up", "Acme"),
        )]);
        assert!(filter.matches(&toaster_context(), &event).unwrap());
    }

    #[test]
    fn deleted_record_without_data_exposes_its_node_name() {
        let filter = EventFilter::compile("boolean(/notification/toaster:toasterStatus)").unwrap();
        let event = batch(vec![ChangeRecord::deleted(status_path(), None)]);
        assert!(filter.matches(&toaster_context(), &event).unwrap());
    }

    #[test]
    fn unresolvable_record_is_excluded() {
        let filter = EventFilter::compile("true()").unwrap();
        let stale = ChangeRecord::updated(
            InstancePath::parse("/toaster:toaster/toasterColor").unwrap(),
            None,
            DataNode::leaf(crate::test_support::toaster_qname("toasterColor"), "red"),
        );
        let event = batch(vec![stale, status_change("up")]);
        assert_eq!(
            filter.evaluate(&toaster_context(), &event),
            Ok(Selection::Only(vec![false, true]))
        );
    }

    #[test]
    fn foreign_module_data_excludes_only_its_record() {
        let filter = EventFilter::compile("true()").unwrap();
        let foreign = ChangeRecord::updated(
            toaster_path(),
            None,
            DataNode::container(
                crate::test_support::toaster_qname("toaster"),
                vec![DataNode::leaf(QName::new("toaster-ext", "color"), "red")],
            ),
        );
        let event = batch(vec![foreign, status_change("up")]);
        assert_eq!(
            filter.evaluate(&toaster_context(), &event),
            Ok(Selection::Only(vec![false, true]))
        );
    }

    #[test]
    fn unknown_notification_fails_closed() {
        let filter = EventFilter::compile("true()").unwrap();
        let result = filter.evaluate(&ModelContext::default(), &restocked(1));
        assert!(matches!(result, Err(FilterError::Unresolved(_))));
    }

    #[test]
    fn never_matching_filter_selects_nothing() {
        let filter = EventFilter::compile("false()").unwrap();
        let event = batch(vec![status_change("up")]);
        assert!(!filter.matches(&toaster_context(), &event).unwrap());
    }

    #[test]
    fn evaluation_is_usable_from_many_threads() {
        let filter = Arc::new(EventFilter::compile("/notification/toaster:toasterStatus = 'up'").unwrap());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let filter = Arc::clone(&filter);
                std::thread::spawn(move || {
                    let value = if i % 2 == 0 { "up" } else { "down" };
                    filter
                        .matches(&toaster_context(), &batch(vec![status_change(value)]))
                        .unwrap()
                })
            })
            .collect();
        let results: Vec<bool> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(results, vec![true, false, true, false]);
    }
}
