#![forbid(unsafe_code)]

use crate::error::TreeError;
use crate::ids::NodeId;
use crate::model::{Node, TreeSpec};
use crate::tree::port::{Order, RangePredicate, TreeTx};

/// Rejects placing `node` under itself or under one of its own descendants.
pub fn validate_loop(node: &Node, candidate_parent: &Node) -> Result<(), TreeError> {
    let recursion = || TreeError::Recursion {
        node: node.id.clone(),
        parent: candidate_parent.id.clone(),
    };

    if node.id == candidate_parent.id {
        return Err(recursion());
    }
    if let (Some(own), Some(target)) = (node.bounds, candidate_parent.bounds) {
        if own.covers(target.lft()) {
            return Err(recursion());
        }
    }
    Ok(())
}

pub fn validate_single_root<T: TreeTx>(tx: &mut T, spec: &TreeSpec) -> Result<(), T::Error> {
    if !spec.single_root() {
        return Ok(());
    }
    let roots = tx.count(&RangePredicate::Roots)?;
    if roots > 1 {
        return Err(TreeError::MultipleRoots {
            tree_type: spec.tree_type().to_string(),
            roots,
        }
        .into());
    }
    Ok(())
}

/// Checked before a mutation that would leave `node` parentless.
pub fn ensure_root_slot<T: TreeTx>(
    tx: &mut T,
    spec: &TreeSpec,
    node: &NodeId,
) -> Result<(), T::Error> {
    if !spec.single_root() {
        return Ok(());
    }
    let other_roots = tx
        .select(&RangePredicate::Roots, Order::IdAsc, None)?
        .into_iter()
        .filter(|root| &root.id != node)
        .count();
    if other_roots > 0 {
        return Err(TreeError::MultipleRoots {
            tree_type: spec.tree_type().to_string(),
            roots: other_roots + 1,
        }
        .into());
    }
    Ok(())
}
