#![forbid(unsafe_code)]

use crate::error::TreeError;
use crate::ids::{Identifier, NodeId};

/// The `(lft, rgt)` pair of a placed node. `lft < rgt` always holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Bounds {
    lft: i64,
    rgt: i64,
}

impl Bounds {
    pub fn new(lft: i64, rgt: i64) -> Result<Self, TreeError> {
        if lft >= rgt {
            return Err(TreeError::Corruption(format!(
                "lft must be smaller than rgt (lft={lft}, rgt={rgt})"
            )));
        }
        Ok(Self { lft, rgt })
    }

    /// Reads a stored pair where NULL or `0/0` marks a row that was never placed.
    pub fn from_columns(lft: Option<i64>, rgt: Option<i64>) -> Result<Option<Self>, TreeError> {
        match (lft.unwrap_or(0), rgt.unwrap_or(0)) {
            (0, 0) => Ok(None),
            (lft, rgt) => Self::new(lft, rgt).map(Some),
        }
    }

    pub fn lft(&self) -> i64 {
        self.lft
    }

    pub fn rgt(&self) -> i64 {
        self.rgt
    }

    /// Number of boundary slots the subtree occupies (`2 * nodes`).
    pub fn width(&self) -> i64 {
        self.rgt - self.lft + 1
    }

    pub fn is_leaf(&self) -> bool {
        self.rgt == self.lft + 1
    }

    /// Strict containment: a node is never its own ancestor.
    pub fn is_ancestor_of(&self, other: &Bounds) -> bool {
        self.lft < other.lft && other.rgt < self.rgt
    }

    pub fn is_descendant_of(&self, other: &Bounds) -> bool {
        other.is_ancestor_of(self)
    }

    /// Whether `position` falls inside the closed range `[lft, rgt]`.
    pub fn covers(&self, position: i64) -> bool {
        self.lft <= position && position <= self.rgt
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Node {
    pub id: NodeId,
    pub parent: Option<NodeId>,
    pub old_parent: Option<NodeId>,
    pub is_group: bool,
    pub bounds: Option<Bounds>,
}

impl Node {
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn is_placed(&self) -> bool {
        self.bounds.is_some()
    }

    pub fn placed_bounds(&self) -> Result<Bounds, TreeError> {
        self.bounds.ok_or_else(|| TreeError::Unplaced(self.id.clone()))
    }
}

/// What the document layer hands over when a member is created.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewNode {
    pub id: NodeId,
    pub parent: Option<NodeId>,
    pub is_group: bool,
}

impl NewNode {
    pub fn leaf(id: NodeId, parent: Option<NodeId>) -> Self {
        Self {
            id,
            parent,
            is_group: false,
        }
    }

    pub fn group(id: NodeId, parent: Option<NodeId>) -> Self {
        Self {
            id,
            parent,
            is_group: true,
        }
    }
}

/// Per tree type configuration. One engine serves any number of unrelated
/// hierarchies, each naming its own parent column.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TreeSpec {
    tree_type: Identifier,
    parent_field: Identifier,
    single_root: bool,
    allow_root_deletion: bool,
}

impl TreeSpec {
    /// Parent column defaults to `parent_<tree_type>`.
    pub fn new(tree_type: Identifier) -> Self {
        let parent_field = tree_type.prefixed("parent_");
        Self {
            tree_type,
            parent_field,
            single_root: false,
            allow_root_deletion: false,
        }
    }

    pub fn with_parent_field(mut self, parent_field: Identifier) -> Self {
        self.parent_field = parent_field;
        self
    }

    pub fn with_single_root(mut self, single_root: bool) -> Self {
        self.single_root = single_root;
        self
    }

    pub fn with_root_deletion(mut self, allow: bool) -> Self {
        self.allow_root_deletion = allow;
        self
    }

    pub fn tree_type(&self) -> &Identifier {
        &self.tree_type
    }

    pub fn parent_field(&self) -> &Identifier {
        &self.parent_field
    }

    pub fn single_root(&self) -> bool {
        self.single_root
    }

    pub fn allow_root_deletion(&self) -> bool {
        self.allow_root_deletion
    }
}
