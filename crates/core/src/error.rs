#![forbid(unsafe_code)]

use crate::ids::NodeId;
use thiserror::Error;

/// Failures raised by the nested-set engine. Every variant aborts the
/// transaction it was raised in.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("item {node} cannot be added to its own descendants (parent={parent})")]
    Recursion { node: NodeId, parent: NodeId },
    #[error("multiple root nodes not allowed in {tree_type} (roots={roots})")]
    MultipleRoots { tree_type: String, roots: usize },
    #[error("{node} has child nodes and cannot be deleted")]
    ChildExists { node: NodeId },
    #[error("merging is only possible between group-to-group or leaf-to-leaf nodes ({from} -> {into})")]
    InvalidMerge { from: NodeId, into: NodeId },
    #[error("root {node} cannot be deleted")]
    RootDeletion { node: NodeId },
    #[error("nested set boundary collision at {boundary}; rebuild required")]
    BoundaryCollision { boundary: i64 },
    #[error("nested set corruption: {0}")]
    Corruption(String),
    #[error("unknown node {0}")]
    UnknownNode(NodeId),
    #[error("node {0} has no lft/rgt assigned")]
    Unplaced(NodeId),
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    #[error("storage: {0}")]
    Storage(String),
}

impl TreeError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Recursion { .. } => "NestedSetRecursionError",
            Self::MultipleRoots { .. } => "NestedSetMultipleRootsError",
            Self::ChildExists { .. } => "NestedSetChildExistsError",
            Self::InvalidMerge { .. } => "NestedSetInvalidMergeError",
            Self::RootDeletion { .. } => "NestedSetRootDeletionError",
            Self::BoundaryCollision { .. } => "NestedSetBoundaryCollision",
            Self::Corruption(_) => "NestedSetCorruption",
            Self::UnknownNode(_) => "UNKNOWN_NODE",
            Self::Unplaced(_) => "UNPLACED_NODE",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::Storage(_) => "STORAGE",
        }
    }

    /// Errors after which the stored ranges can no longer be trusted.
    pub fn requires_rebuild(&self) -> bool {
        matches!(self, Self::BoundaryCollision { .. } | Self::Corruption(_))
    }
}
