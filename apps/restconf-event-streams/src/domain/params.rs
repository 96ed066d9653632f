//! Text Rendering Parameters
//!
//! Per-subscription rendering switches. Values are small, `Copy`, and hashable
//! so formatter factories can cache one formatter per distinct combination.

/// Rendering configuration attached to one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TextParameters {
    pretty_print: bool,
    skip_data: bool,
    leaf_nodes_only: bool,
    changed_leaf_nodes_only: bool,
    child_nodes_only: bool,
}

impl TextParameters {
    /// All switches off.
    pub const EMPTY: Self = Self::new(false, false, false);

    /// Create parameters.
    #[must_use]
    pub const fn new(pretty_print: bool, skip_data: bool, leaf_nodes_only: bool) -> Self {
        Self {
            pretty_print,
            skip_data,
            leaf_nodes_only,
            changed_leaf_nodes_only: false,
            child_nodes_only: false,
        }
    }

    /// Same parameters with `changed_leaf_nodes_only` set to `value`.
    #[must_use]
    pub const fn with_changed_leaf_nodes_only(mut self, value: bool) -> Self {
        self.changed_leaf_nodes_only = value;
        self
    }

    /// Same parameters with `child_nodes_only` set to `value`.
    #[must_use]
    pub const fn with_child_nodes_only(mut self, value: bool) -> Self {
        self.child_nodes_only = value;
        self
    }

    /// Indent rendered documents.
    #[must_use]
    pub const fn pretty_print(&self) -> bool {
        self.pretty_print
    }

    /// Omit node content from change entries.
    #[must_use]
    pub const fn skip_data(&self) -> bool {
        self.skip_data
    }

    /// Report one change entry per changed leaf.
    #[must_use]
    pub const fn leaf_nodes_only(&self) -> bool {
        self.leaf_nodes_only
    }

    /// Report only leaves whose value differs between the before and after
    /// images.
    #[must_use]
    pub const fn changed_leaf_nodes_only(&self) -> bool {
        self.changed_leaf_nodes_only
    }

    /// Report one change entry per modified direct child of the changed node.
    #[must_use]
    pub const fn child_nodes_only(&self) -> bool {
        self.child_nodes_only
    }

    /// Whether nothing is customized.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        !self.pretty_print
            && !self.skip_data
            && !self.leaf_nodes_only
            && !self.changed_leaf_nodes_only
            && !self.child_nodes_only
    }
}
