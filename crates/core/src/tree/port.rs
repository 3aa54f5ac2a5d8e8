#![forbid(unsafe_code)]

//! The storage port: the only way the engine touches rows.

use crate::error::TreeError;
use crate::ids::NodeId;
use crate::model::{Bounds, Node, TreeSpec};
use crate::tree::plan::ShiftPlan;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxMode {
    Read,
    /// Writers on one tree type are serialized for the whole transaction.
    Write,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lock {
    None,
    ForUpdate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Order {
    LftAsc,
    LftDesc,
    IdAsc,
}

/// Set-based row filters. Range predicates never match unplaced rows.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RangePredicate {
    All,
    Placed,
    Node(NodeId),
    /// `lft >= b.lft AND rgt <= b.rgt`: the node and everything below it.
    Subtree(Bounds),
    /// `lft > b.lft AND rgt < b.rgt`
    Descendants(Bounds),
    /// `lft < b.lft AND rgt > b.rgt`
    Ancestors(Bounds),
    /// `lft <= b.lft AND rgt >= b.rgt`
    AncestorsOrSelf(Bounds),
    ChildrenOf(NodeId),
    Roots,
    /// `lft = v OR rgt = v`
    Occupies(i64),
}

impl RangePredicate {
    pub fn matches(&self, node: &Node) -> bool {
        match self {
            Self::All => true,
            Self::Placed => node.bounds.is_some(),
            Self::Node(id) => &node.id == id,
            Self::ChildrenOf(id) => node.parent.as_ref() == Some(id),
            Self::Roots => node.parent.is_none(),
            Self::Subtree(b) => node
                .bounds
                .is_some_and(|n| n.lft() >= b.lft() && n.rgt() <= b.rgt()),
            Self::Descendants(b) => node
                .bounds
                .is_some_and(|n| n.lft() > b.lft() && n.rgt() < b.rgt()),
            Self::Ancestors(b) => node
                .bounds
                .is_some_and(|n| n.lft() < b.lft() && n.rgt() > b.rgt()),
            Self::AncestorsOrSelf(b) => node
                .bounds
                .is_some_and(|n| n.lft() <= b.lft() && n.rgt() >= b.rgt()),
            Self::Occupies(value) => node
                .bounds
                .is_some_and(|n| n.lft() == *value || n.rgt() == *value),
        }
    }
}

/// One open transaction against one tree type. Dropping it without
/// [`TreeTx::commit`] discards every write.
pub trait TreeTx {
    type Error: From<TreeError>;

    fn read(&mut self, id: &NodeId, lock: Lock) -> Result<Option<Node>, Self::Error>;

    fn select(
        &mut self,
        predicate: &RangePredicate,
        order: Order,
        limit: Option<usize>,
    ) -> Result<Vec<Node>, Self::Error>;

    fn count(&mut self, predicate: &RangePredicate) -> Result<usize, Self::Error>;

    /// Largest `rgt` over placed rows.
    fn max_rgt(&mut self) -> Result<Option<i64>, Self::Error>;

    /// Inserts the row, or overwrites parent/bounds of an existing one.
    fn upsert(&mut self, node: &Node) -> Result<(), Self::Error>;

    /// Applies `plan` to `lft` and `rgt` of every row it touches.
    fn shift(&mut self, plan: &ShiftPlan) -> Result<usize, Self::Error>;

    fn set_bounds(&mut self, id: &NodeId, bounds: Option<Bounds>) -> Result<usize, Self::Error>;

    /// Writes both `parent` and `old_parent`.
    fn set_parent(&mut self, id: &NodeId, parent: Option<&NodeId>) -> Result<usize, Self::Error>;

    fn set_group(&mut self, id: &NodeId, is_group: bool) -> Result<usize, Self::Error>;

    /// Changes a row id and re-points `parent`/`old_parent` references.
    fn rename(&mut self, from: &NodeId, to: &NodeId) -> Result<usize, Self::Error>;

    /// Re-points the children of `from` (and their `old_parent`) at `to`.
    fn reparent_children(&mut self, from: &NodeId, to: &NodeId) -> Result<usize, Self::Error>;

    /// `old_parent = parent` for every row.
    fn sync_old_parent(&mut self) -> Result<usize, Self::Error>;

    fn delete_where(&mut self, predicate: &RangePredicate) -> Result<usize, Self::Error>;

    fn commit(self) -> Result<(), Self::Error>;

    fn rollback(self) -> Result<(), Self::Error>;
}

pub trait TreeStorage {
    type Error: From<TreeError> + std::fmt::Display;
    type Tx<'a>: TreeTx<Error = Self::Error>
    where
        Self: 'a;

    fn begin(&mut self, spec: &TreeSpec, mode: TxMode) -> Result<Self::Tx<'_>, Self::Error>;
}
