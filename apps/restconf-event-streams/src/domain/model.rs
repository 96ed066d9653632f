//! Schema and Data Model
//!
//! Qualified names, instance paths, the schema view used to validate
//! subscription requests, and the data trees carried by events.
//!
//! # Path Display Form
//!
//! Every segment carries its module prefix and list keys are rendered as
//! predicates:
//!
//! ```text
//! /toaster:toaster/toaster:toasterStatus
//! /network-topology:network-topology/network-topology:topology[network-topology:topology-id='t1']
//! ```

use std::fmt;

use serde::Deserialize;

// =============================================================================
// Errors
// =============================================================================

/// Schema lookup and identifier parsing errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    /// Identifier is not of the form `module:name`.
    #[error("'{0}' is not a valid qualified identifier")]
    InvalidIdentifier(String),

    /// Path string could not be parsed.
    #[error("invalid path '{path}': {reason}")]
    InvalidPath {
        /// Offending path text.
        path: String,
        /// What went wrong.
        reason: String,
    },

    /// No module with this name is known.
    #[error("unknown module '{0}'")]
    UnknownModule(String),

    /// Path does not resolve to a schema node.
    #[error("path '{0}' does not resolve to a schema node")]
    UnknownNode(String),

    /// Module exists but defines no such top-level node.
    #[error("{0} refers to an unknown notification")]
    UnknownNotification(QName),

    /// Identifier resolves to something other than a notification.
    #[error("{0} refers to a non-notification")]
    NotANotification(QName),
}

// =============================================================================
// Qualified Names
// =============================================================================

/// A module-qualified node name, `module:name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QName {
    module: String,
    name: String,
}

impl QName {
    /// Create a qualified name.
    #[must_use]
    pub fn new(module: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            name: name.into(),
        }
    }

    /// Parse `module:name`.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::InvalidIdentifier` if either part is missing or
    /// contains characters outside the YANG identifier set.
    pub fn parse(text: &str) -> Result<Self, ModelError> {
        let (module, name) = text
            .split_once(':')
            .ok_or_else(|| ModelError::InvalidIdentifier(text.to_string()))?;
        if !is_identifier(module) || !is_identifier(name) {
            return Err(ModelError::InvalidIdentifier(text.to_string()));
        }
        Ok(Self::new(module, name))
    }

    /// Module part.
    #[must_use]
    pub fn module(&self) -> &str {
        &self.module
    }

    /// Local name part.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.module, self.name)
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

// =============================================================================
// Instance Paths
// =============================================================================

/// One step of an instance path, with list keys when addressing an entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathArg {
    qname: QName,
    keys: Vec<(QName, String)>,
}

impl PathArg {
    /// Step addressing a container, leaf, or a whole list.
    #[must_use]
    pub const fn node(qname: QName) -> Self {
        Self {
            qname,
            keys: Vec::new(),
        }
    }

    /// Step addressing one list entry.
    #[must_use]
    pub const fn entry(qname: QName, keys: Vec<(QName, String)>) -> Self {
        Self { qname, keys }
    }

    /// Node name of this step.
    #[must_use]
    pub const fn qname(&self) -> &QName {
        &self.qname
    }

    /// Key predicates of this step.
    #[must_use]
    pub fn keys(&self) -> &[(QName, String)] {
        &self.keys
    }

    /// Whether `other` is addressed by this step. A step without keys matches
    /// every entry of the list it names.
    #[must_use]
    pub fn covers(&self, other: &Self) -> bool {
        self.qname == other.qname && (self.keys.is_empty() || self.keys == other.keys)
    }
}

/// Absolute path to a node in the data tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct InstancePath {
    args: Vec<PathArg>,
}

impl InstancePath {
    /// Build a path from its steps.
    #[must_use]
    pub const fn new(args: Vec<PathArg>) -> Self {
        Self { args }
    }

    /// Parse the display form. The leading `/` is optional and a step without
    /// a module prefix inherits the module of the step before it.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::InvalidPath` for empty paths, unbalanced
    /// predicates, or a first step without a module prefix.
    pub fn parse(text: &str) -> Result<Self, ModelError> {
        let invalid = |reason: &str| ModelError::InvalidPath {
            path: text.to_string(),
            reason: reason.to_string(),
        };

        let body = text.trim().strip_prefix('/').unwrap_or_else(|| text.trim());
        if body.is_empty() {
            return Err(invalid("path is empty"));
        }

        let mut args = Vec::new();
        let mut module: Option<String> = None;
        for segment in split_segments(body).map_err(|r| invalid(r))? {
            let (name_part, predicates) = match segment.find('[') {
                Some(idx) => segment.split_at(idx),
                None => (segment, ""),
            };
            let qname = qualify(name_part, module.as_deref())
                .ok_or_else(|| invalid("step has no module prefix"))?;
            module = Some(qname.module.clone());

            let mut keys = Vec::new();
            for predicate in split_predicates(predicates).map_err(|r| invalid(r))? {
                let (key, value) = predicate
                    .split_once('=')
                    .ok_or_else(|| invalid("key predicate without '='"))?;
                let key = qualify(key.trim(), Some(&qname.module))
                    .ok_or_else(|| invalid("malformed key name"))?;
                let value = unquote(value.trim()).ok_or_else(|| invalid("unquoted key value"))?;
                keys.push((key, value));
            }
            args.push(PathArg { qname, keys });
        }
        Ok(Self { args })
    }

    /// Steps of this path.
    #[must_use]
    pub fn args(&self) -> &[PathArg] {
        &self.args
    }

    /// Number of steps.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.args.len()
    }

    /// Whether the path has no steps.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Last step, if any.
    #[must_use]
    pub fn last(&self) -> Option<&PathArg> {
        self.args.last()
    }

    /// Path extended by one step.
    #[must_use]
    pub fn child(&self, arg: PathArg) -> Self {
        let mut args = self.args.clone();
        args.push(arg);
        Self { args }
    }

    /// Whether `other` lies at or below this path.
    #[must_use]
    pub fn contains(&self, other: &Self) -> bool {
        self.args.len() <= other.args.len()
            && self.args.iter().zip(&other.args).all(|(a, b)| a.covers(b))
    }

    /// Modules referenced by any step or key, in first-seen order.
    #[must_use]
    pub fn modules(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for arg in &self.args {
            for module in std::iter::once(arg.qname.module())
                .chain(arg.keys.iter().map(|(k, _)| k.module()))
            {
                if !seen.contains(&module) {
                    seen.push(module);
                }
            }
        }
        seen
    }
}

impl fmt::Display for InstancePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for arg in &self.args {
            write!(f, "/{}", arg.qname)?;
            for (key, value) in &arg.keys {
                if value.contains('\'') {
                    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
                    write!(f, "[{key}=\"{escaped}\"]")?;
                } else {
                    write!(f, "[{key}='{value}']")?;
                }
            }
        }
        Ok(())
    }
}

fn qualify(text: &str, inherited: Option<&str>) -> Option<QName> {
    match text.split_once(':') {
        Some(_) => QName::parse(text).ok(),
        None if is_identifier(text) => inherited.map(|m| QName::new(m, text)),
        None => None,
    }
}

/// Key value without its quotes. Double-quoted values unescape `\"` and
/// `\\`; single-quoted values are literal.
fn unquote(value: &str) -> Option<String> {
    if let Some(inner) = value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')) {
        return Some(inner.to_string());
    }
    let inner = value.strip_prefix('"')?.strip_suffix('"')?;
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        match (c, chars.clone().next()) {
            ('\\', Some(next @ ('"' | '\\'))) => {
                out.push(next);
                chars.next();
            }
            ('"', _) => return None,
            _ => out.push(c),
        }
    }
    Some(out)
}

/// Split on `/` outside of predicates and quotes.
fn split_segments(body: &str) -> Result<impl Iterator<Item = &str>, &'static str> {
    let mut segments = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut start = 0;
    for (idx, c) in body.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match (quote, c) {
            (Some('"'), '\\') => escaped = true,
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '[') => depth += 1,
            (None, ']') => depth = depth.checked_sub(1).ok_or("unbalanced ']'")?,
            (None, '/') if depth == 0 => {
                segments.push(&body[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    if depth != 0 || quote.is_some() {
        return Err("unterminated predicate");
    }
    segments.push(&body[start..]);
    if segments.iter().any(|s| s.is_empty()) {
        return Err("empty step");
    }
    Ok(segments.into_iter())
}

/// Split `[a='1'][b='2']` into `a='1'`, `b='2'`.
fn split_predicates(text: &str) -> Result<Vec<&str>, &'static str> {
    let mut out = Vec::new();
    let mut rest = text;
    while !rest.is_empty() {
        let inner = rest.strip_prefix('[').ok_or("text after step name")?;
        let mut quote: Option<char> = None;
        let mut escaped = false;
        let mut end = None;
        for (idx, c) in inner.char_indices() {
            if escaped {
                escaped = false;
                continue;
            }
            match (quote, c) {
                (Some('"'), '\\') => escaped = true,
                (Some(q), c) if c == q => quote = None,
                (Some(_), _) => {}
                (None, '\'' | '"') => quote = Some(c),
                (None, ']') => {
                    end = Some(idx);
                    break;
                }
                _ => {}
            }
        }
        let end = end.ok_or("unterminated predicate")?;
        out.push(&inner[..end]);
        rest = &inner[end + 1..];
    }
    Ok(out)
}

// =============================================================================
// Schema
// =============================================================================

/// Kind of a schema node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SchemaNodeKind {
    /// Container node.
    Container,
    /// List node, see `SchemaNode::keys`.
    List,
    /// Leaf node.
    Leaf,
    /// Leaf-list node.
    LeafList,
    /// Notification definition.
    Notification,
}

/// One node of a module's schema tree.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SchemaNode {
    name: String,
    kind: SchemaNodeKind,
    #[serde(default)]
    keys: Vec<String>,
    #[serde(default)]
    children: Vec<SchemaNode>,
}

impl SchemaNode {
    /// Create a schema node.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: SchemaNodeKind, children: Vec<Self>) -> Self {
        Self {
            name: name.into(),
            kind,
            keys: Vec::new(),
            children,
        }
    }

    /// Create a list node with key leaves.
    #[must_use]
    pub fn list(name: impl Into<String>, keys: Vec<String>, children: Vec<Self>) -> Self {
        Self {
            name: name.into(),
            kind: SchemaNodeKind::List,
            keys,
            children,
        }
    }

    /// Node name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Node kind.
    #[must_use]
    pub const fn kind(&self) -> SchemaNodeKind {
        self.kind
    }

    /// Key leaf names for list nodes.
    #[must_use]
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Child with the given local name.
    #[must_use]
    pub fn child(&self, name: &str) -> Option<&Self> {
        self.children.iter().find(|c| c.name == name)
    }
}

/// A YANG module as seen by the stream engine.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Module {
    name: String,
    namespace: String,
    #[serde(default)]
    revision: Option<String>,
    #[serde(default)]
    children: Vec<SchemaNode>,
}

impl Module {
    /// Create a module.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        children: Vec<SchemaNode>,
    ) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            revision: None,
            children,
        }
    }

    /// Module name, also used as the JSON and XML prefix.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// XML namespace URI.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Revision date, if declared.
    #[must_use]
    pub fn revision(&self) -> Option<&str> {
        self.revision.as_deref()
    }

    /// Top-level node with the given name.
    #[must_use]
    pub fn child(&self, name: &str) -> Option<&SchemaNode> {
        self.children.iter().find(|c| c.name == name)
    }
}

/// The set of modules in effect at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ModelContext {
    #[serde(default)]
    modules: Vec<Module>,
}

impl ModelContext {
    /// Create a context from modules.
    #[must_use]
    pub const fn new(modules: Vec<Module>) -> Self {
        Self { modules }
    }

    /// Parse a context from its JSON description.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error for malformed input.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// All modules.
    #[must_use]
    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    /// Whether no module is loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Module by name.
    #[must_use]
    pub fn module(&self, name: &str) -> Option<&Module> {
        self.modules.iter().find(|m| m.name == name)
    }

    /// Namespace of a module.
    #[must_use]
    pub fn namespace_of(&self, module: &str) -> Option<&str> {
        self.module(module).map(Module::namespace)
    }

    /// Resolve a data path to its schema node.
    ///
    /// # Errors
    ///
    /// Returns `UnknownModule` if any step names an unloaded module and
    /// `UnknownNode` if a step or key does not exist in the schema.
    pub fn resolve_path(&self, path: &InstancePath) -> Result<&SchemaNode, ModelError> {
        let unknown = || ModelError::UnknownNode(path.to_string());
        let mut args = path.args().iter();
        let first = args.next().ok_or_else(unknown)?;

        let module = self
            .module(first.qname.module())
            .ok_or_else(|| ModelError::UnknownModule(first.qname.module().to_string()))?;
        let mut node = module.child(first.qname.name()).ok_or_else(unknown)?;
        check_keys(node, first).then_some(()).ok_or_else(unknown)?;

        for arg in args {
            if self.module(arg.qname.module()).is_none() {
                return Err(ModelError::UnknownModule(arg.qname.module().to_string()));
            }
            node = node.child(arg.qname.name()).ok_or_else(unknown)?;
            check_keys(node, arg).then_some(()).ok_or_else(unknown)?;
        }

        if node.kind == SchemaNodeKind::Notification {
            return Err(unknown());
        }
        Ok(node)
    }

    /// Find the notification definition named by `qname`.
    ///
    /// # Errors
    ///
    /// Each failure is distinct: `UnknownModule`, `UnknownNotification` when
    /// the module has no such node, and `NotANotification` when the node is
    /// data rather than a notification.
    pub fn find_notification(&self, qname: &QName) -> Result<&SchemaNode, ModelError> {
        let module = self
            .module(qname.module())
            .ok_or_else(|| ModelError::UnknownModule(qname.module().to_string()))?;
        let node = module
            .child(qname.name())
            .ok_or_else(|| ModelError::UnknownNotification(qname.clone()))?;
        if node.kind == SchemaNodeKind::Notification {
            Ok(node)
        } else {
            Err(ModelError::NotANotification(qname.clone()))
        }
    }
}

fn check_keys(node: &SchemaNode, arg: &PathArg) -> bool {
    arg.keys.is_empty()
        || (node.kind == SchemaNodeKind::List
            && arg
                .keys
                .iter()
                .all(|(k, _)| node.keys.iter().any(|nk| nk == k.name())))
}

// =============================================================================
// Data Trees
// =============================================================================

/// A scalar leaf value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeafValue {
    /// String, enumeration, identity or any textual type.
    String(String),
    /// Integer types.
    Int(i64),
    /// Boolean.
    Bool(bool),
    /// The `empty` type.
    Empty,
}

impl LeafValue {
    /// JSON representation per RFC 7951.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::String(s) => serde_json::Value::String(s.clone()),
            Self::Int(i) => serde_json::Value::from(*i),
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Empty => serde_json::json!([null]),
        }
    }
}

impl fmt::Display for LeafValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => f.write_str(s),
            Self::Int(i) => write!(f, "{i}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Empty => Ok(()),
        }
    }
}

impl From<&str> for LeafValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<i64> for LeafValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for LeafValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// A node of an instance data tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataNode {
    /// Leaf with a single value.
    Leaf {
        /// Node name.
        qname: QName,
        /// Value.
        value: LeafValue,
    },
    /// Leaf-list with ordered values.
    LeafList {
        /// Node name.
        qname: QName,
        /// Values.
        values: Vec<LeafValue>,
    },
    /// Container, also used for notification bodies.
    Container {
        /// Node name.
        qname: QName,
        /// Child nodes.
        children: Vec<DataNode>,
    },
    /// List with its entries; each entry is the entry's child nodes.
    List {
        /// Node name.
        qname: QName,
        /// Entries.
        entries: Vec<Vec<DataNode>>,
    },
}

impl DataNode {
    /// Leaf node.
    #[must_use]
    pub fn leaf(qname: QName, value: impl Into<LeafValue>) -> Self {
        Self::Leaf {
            qname,
            value: value.into(),
        }
    }

    /// Container node.
    #[must_use]
    pub const fn container(qname: QName, children: Vec<Self>) -> Self {
        Self::Container { qname, children }
    }

    /// Name of this node.
    #[must_use]
    pub const fn qname(&self) -> &QName {
        match self {
            Self::Leaf { qname, .. }
            | Self::LeafList { qname, .. }
            | Self::Container { qname, .. }
            | Self::List { qname, .. } => qname,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
