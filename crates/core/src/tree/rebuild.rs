#![forbid(unsafe_code)]

//! Regenerates `lft`/`rgt` from the parent pointers, which are trusted as
//! ground truth.

use crate::error::TreeError;
use crate::ids::NodeId;
use crate::model::{Bounds, TreeSpec};
use crate::tree::port::{Order, RangePredicate, TreeStorage, TreeTx, TxMode};
use tracing::info;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RebuildOptions {
    /// Commit after this many row writes and continue in a fresh
    /// transaction. `None` rebuilds atomically.
    pub commit_every: Option<usize>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RebuildReport {
    pub roots: usize,
    pub nodes: usize,
    pub commits: usize,
}

#[derive(Debug)]
pub(crate) struct Layout {
    pub(crate) roots: usize,
    pub(crate) assignments: Vec<(NodeId, Bounds)>,
}

enum Frame {
    Enter(NodeId),
    Exit(NodeId, i64),
}

/// Pre-order walk over every root (by id), children discovered by querying
/// `parent == id` and visited by id. Nothing is written.
pub(crate) fn plan_layout<T: TreeTx>(tx: &mut T) -> Result<Layout, T::Error> {
    let roots = tx.select(&RangePredicate::Roots, Order::IdAsc, None)?;
    let mut assignments = Vec::new();
    let mut stack = Vec::new();
    let mut counter = 1i64;

    for root in &roots {
        stack.push(Frame::Enter(root.id.clone()));
        while let Some(frame) = stack.pop() {
            match frame {
                Frame::Enter(id) => {
                    let lft = counter;
                    counter += 1;
                    let children =
                        tx.select(&RangePredicate::ChildrenOf(id.clone()), Order::IdAsc, None)?;
                    stack.push(Frame::Exit(id, lft));
                    stack.extend(children.into_iter().rev().map(|child| Frame::Enter(child.id)));
                }
                Frame::Exit(id, lft) => {
                    let rgt = counter;
                    counter += 1;
                    assignments.push((id, Bounds::new(lft, rgt)?));
                }
            }
        }
    }

    let total = tx.count(&RangePredicate::All)?;
    if total != assignments.len() {
        return Err(TreeError::Corruption(format!(
            "{} of {total} nodes are unreachable from any root (orphaned or cyclic parent pointers)",
            total.saturating_sub(assignments.len())
        ))
        .into());
    }

    Ok(Layout {
        roots: roots.len(),
        assignments,
    })
}

/// Plans and writes a fresh layout inside the caller's transaction.
pub(crate) fn relayout<T: TreeTx>(tx: &mut T) -> Result<Layout, T::Error> {
    let layout = plan_layout(tx)?;
    for (id, bounds) in &layout.assignments {
        tx.set_bounds(id, Some(*bounds))?;
    }
    tx.sync_old_parent()?;
    Ok(layout)
}

pub fn rebuild<S: TreeStorage>(
    storage: &mut S,
    spec: &TreeSpec,
    options: RebuildOptions,
) -> Result<RebuildReport, S::Error> {
    let batch = options.commit_every.map(|every| every.max(1));
    let mut tx = storage.begin(spec, TxMode::Write)?;
    let layout = plan_layout(&mut tx)?;

    let mut commits = 0usize;
    let mut pending = 0usize;
    for (id, bounds) in &layout.assignments {
        tx.set_bounds(id, Some(*bounds))?;
        pending += 1;
        if batch.is_some_and(|every| pending >= every) {
            tx.commit()?;
            commits += 1;
            pending = 0;
            tx = storage.begin(spec, TxMode::Write)?;
        }
    }
    tx.sync_old_parent()?;
    tx.commit()?;
    commits += 1;

    let report = RebuildReport {
        roots: layout.roots,
        nodes: layout.assignments.len(),
        commits,
    };
    info!(
        tree = %spec.tree_type(),
        roots = report.roots,
        nodes = report.nodes,
        commits = report.commits,
        "nested set rebuilt"
    );
    Ok(report)
}
