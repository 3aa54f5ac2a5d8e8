#![forbid(unsafe_code)]

//! All writes to `lft`/`rgt` go through this module.

use crate::error::TreeError;
use crate::ids::NodeId;
use crate::model::{Bounds, NewNode, Node, TreeSpec};
use crate::tree::guard;
use crate::tree::plan::ShiftPlan;
use crate::tree::port::{Lock, Order, RangePredicate, TreeTx};
use crate::tree::rebuild;
use tracing::debug;

/// Outcome of reconciling a row after the document layer edited it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Placement {
    Inserted(Bounds),
    Moved(Bounds),
    Unchanged(Bounds),
}

impl Placement {
    pub fn bounds(&self) -> Bounds {
        match self {
            Self::Inserted(bounds) | Self::Moved(bounds) | Self::Unchanged(bounds) => *bounds,
        }
    }
}

fn require<T: TreeTx>(tx: &mut T, id: &NodeId) -> Result<Node, T::Error> {
    tx.read(id, Lock::ForUpdate)?
        .ok_or_else(|| TreeError::UnknownNode(id.clone()).into())
}

fn root_anchor<T: TreeTx>(tx: &mut T) -> Result<i64, T::Error> {
    Ok(tx.max_rgt()?.map_or(1, |max| max + 1))
}

/// Places `new` as the rightmost child of its parent, or after the last root.
pub fn insert<T: TreeTx>(tx: &mut T, spec: &TreeSpec, new: &NewNode) -> Result<Bounds, T::Error> {
    if tx
        .read(&new.id, Lock::ForUpdate)?
        .as_ref()
        .is_some_and(Node::is_placed)
    {
        return Err(TreeError::InvalidInput("node is already placed in the tree").into());
    }

    let (anchor, owners) = match new.parent.as_ref() {
        Some(parent_id) => {
            if parent_id == &new.id {
                return Err(TreeError::Recursion {
                    node: new.id.clone(),
                    parent: parent_id.clone(),
                }
                .into());
            }
            let parent = require(tx, parent_id)?;
            (parent.placed_bounds()?.rgt(), 1)
        }
        None => {
            guard::ensure_root_slot(tx, spec, &new.id)?;
            (root_anchor(tx)?, 0)
        }
    };

    // Only the parent may hold the anchor.
    if tx.count(&RangePredicate::Occupies(anchor))? != owners {
        return Err(TreeError::BoundaryCollision { boundary: anchor }.into());
    }

    tx.shift(&ShiftPlan::open_gap(anchor, 2))?;
    let bounds = Bounds::new(anchor, anchor + 1)?;

    tx.upsert(&Node {
        id: new.id.clone(),
        parent: new.parent.clone(),
        old_parent: new.parent.clone(),
        is_group: new.is_group,
        bounds: Some(bounds),
    })?;

    debug!(
        tree = %spec.tree_type(),
        node = %new.id,
        lft = bounds.lft(),
        rgt = bounds.rgt(),
        "node inserted"
    );
    Ok(bounds)
}

/// Re-parents `id` (with its whole subtree) as the rightmost child of
/// `new_parent`, or as the last root.
pub fn move_node<T: TreeTx>(
    tx: &mut T,
    spec: &TreeSpec,
    id: &NodeId,
    new_parent: Option<&NodeId>,
) -> Result<Bounds, T::Error> {
    let node = require(tx, id)?;
    let Some(bounds) = node.bounds else {
        return insert(
            tx,
            spec,
            &NewNode {
                id: node.id,
                parent: new_parent.cloned(),
                is_group: node.is_group,
            },
        );
    };

    let anchor = match new_parent {
        Some(parent_id) => {
            let parent = require(tx, parent_id)?;
            guard::validate_loop(&node, &parent)?;
            parent.placed_bounds()?.rgt()
        }
        None => {
            guard::ensure_root_slot(tx, spec, id)?;
            root_anchor(tx)?
        }
    };

    let plan = ShiftPlan::relocate(bounds, anchor)?;
    let moved = plan.apply_bounds(bounds)?;
    if !plan.is_noop() {
        tx.shift(&plan)?;
    }
    tx.set_parent(id, new_parent)?;

    debug!(
        tree = %spec.tree_type(),
        node = %id,
        parent = new_parent.map(NodeId::as_str).unwrap_or(""),
        lft = moved.lft(),
        rgt = moved.rgt(),
        "node moved"
    );
    Ok(moved)
}

/// Places or moves a row according to the `parent` the document layer wrote.
pub fn reconcile<T: TreeTx>(tx: &mut T, spec: &TreeSpec, id: &NodeId) -> Result<Placement, T::Error> {
    let node = require(tx, id)?;
    match node.bounds {
        None => insert(
            tx,
            spec,
            &NewNode {
                id: node.id,
                parent: node.parent,
                is_group: node.is_group,
            },
        )
        .map(Placement::Inserted),
        Some(_) if node.parent != node.old_parent => {
            move_node(tx, spec, id, node.parent.as_ref()).map(Placement::Moved)
        }
        Some(bounds) => Ok(Placement::Unchanged(bounds)),
    }
}

/// Deletes a single leaf and closes its gap. Groups must be emptied first.
pub fn delete<T: TreeTx>(tx: &mut T, spec: &TreeSpec, id: &NodeId) -> Result<(), T::Error> {
    let node = require(tx, id)?;

    let mut children = tx.count(&RangePredicate::ChildrenOf(id.clone()))?;
    if let Some(bounds) = node.bounds.filter(|bounds| !bounds.is_leaf()) {
        children = children.max(tx.count(&RangePredicate::Descendants(bounds))?);
    }
    if children > 0 {
        return Err(TreeError::ChildExists { node: id.clone() }.into());
    }
    if node.is_root() && !spec.allow_root_deletion() {
        return Err(TreeError::RootDeletion { node: id.clone() }.into());
    }

    tx.delete_where(&RangePredicate::Node(id.clone()))?;
    if let Some(bounds) = node.bounds {
        tx.shift(&ShiftPlan::close_gap(bounds.rgt(), bounds.width()))?;
    }

    debug!(tree = %spec.tree_type(), node = %id, "node deleted");
    Ok(())
}

/// Bulk-deletes the node and everything below it without per-row checks.
/// Unplaced rows whose parent chain leads into the subtree go with it.
/// Returns the number of rows removed.
pub fn remove_subtree<T: TreeTx>(tx: &mut T, spec: &TreeSpec, id: &NodeId) -> Result<usize, T::Error> {
    let node = require(tx, id)?;
    let bounds = node.placed_bounds()?;

    let mut pending: Vec<NodeId> = tx
        .select(&RangePredicate::Subtree(bounds), Order::IdAsc, None)?
        .into_iter()
        .map(|row| row.id)
        .collect();
    let mut removed = tx.delete_where(&RangePredicate::Subtree(bounds))?;
    tx.shift(&ShiftPlan::close_gap(bounds.rgt(), bounds.width()))?;

    while let Some(parent) = pending.pop() {
        for child in tx.select(&RangePredicate::ChildrenOf(parent), Order::IdAsc, None)? {
            if child.is_placed() {
                continue;
            }
            removed += tx.delete_where(&RangePredicate::Node(child.id.clone()))?;
            pending.push(child.id);
        }
    }

    debug!(tree = %spec.tree_type(), node = %id, removed, "subtree removed");
    Ok(removed)
}

pub fn set_group<T: TreeTx>(tx: &mut T, id: &NodeId, is_group: bool) -> Result<(), T::Error> {
    let node = require(tx, id)?;
    if node.is_group == is_group {
        return Ok(());
    }
    if !is_group && tx.count(&RangePredicate::ChildrenOf(id.clone()))? > 0 {
        return Err(TreeError::ChildExists { node: id.clone() }.into());
    }
    tx.set_group(id, is_group)?;
    Ok(())
}

/// Renames `from` to `to`. With `merge`, `to` must already exist and be of
/// the same kind; `from`'s children move under it and the tree is rebuilt.
pub fn rename<T: TreeTx>(
    tx: &mut T,
    spec: &TreeSpec,
    from: &NodeId,
    to: &NodeId,
    merge: bool,
) -> Result<(), T::Error> {
    if from == to {
        return Err(TreeError::InvalidInput("rename source and target are the same").into());
    }
    let source = require(tx, from)?;
    let target = tx.read(to, Lock::ForUpdate)?;

    match (merge, target) {
        (false, Some(_)) => {
            return Err(TreeError::InvalidInput("rename target already exists").into());
        }
        (false, None) => {
            tx.rename(from, to)?;
        }
        (true, None) => return Err(TreeError::UnknownNode(to.clone()).into()),
        (true, Some(target)) => {
            if source.is_group != target.is_group {
                return Err(TreeError::InvalidMerge {
                    from: from.clone(),
                    into: to.clone(),
                }
                .into());
            }
            if let (Some(own), Some(other)) = (source.bounds, target.bounds) {
                if own.is_ancestor_of(&other) {
                    return Err(TreeError::Recursion {
                        node: from.clone(),
                        parent: to.clone(),
                    }
                    .into());
                }
            }
            tx.reparent_children(from, to)?;
            tx.delete_where(&RangePredicate::Node(from.clone()))?;
            rebuild::relayout(tx)?;
        }
    }

    debug!(tree = %spec.tree_type(), from = %from, to = %to, merge, "node renamed");
    Ok(())
}
