#![forbid(unsafe_code)]

//! Nested-set (MPTT) maintenance: every node carries `lft`/`rgt` from a
//! pre-order walk, so subtree questions become range comparisons.
//!
//! [`NestedSet`] is the entry point for the calling document layer. Each
//! method runs in exactly one storage transaction, committed on success and
//! rolled back on any error.

mod guard;
mod memory;
mod mutator;
mod plan;
mod port;
mod query;
mod rebuild;

pub use guard::validate_loop;
pub use memory::{MemoryStore, MemoryTx};
pub use mutator::Placement;
pub use plan::{Segment, ShiftPlan};
pub use port::{Lock, Order, RangePredicate, TreeStorage, TreeTx, TxMode};
pub use query::{IntegrityReport, Violation};
pub use rebuild::{RebuildOptions, RebuildReport};

use crate::ids::NodeId;
use crate::model::{Bounds, NewNode, Node, TreeSpec};
use std::fmt::Display;
use tracing::warn;

#[cfg(test)]
mod tests;

fn finish<X, V>(tx: X, result: Result<V, X::Error>) -> Result<V, X::Error>
where
    X: TreeTx,
    X::Error: Display,
{
    match result {
        Ok(value) => {
            tx.commit()?;
            Ok(value)
        }
        Err(err) => {
            warn!(error = %err, "nested set transaction rolled back");
            if let Err(rollback) = tx.rollback() {
                warn!(error = %rollback, "rollback failed; keeping the original error");
            }
            Err(err)
        }
    }
}

pub struct NestedSet<'a, S: TreeStorage> {
    storage: &'a mut S,
    spec: TreeSpec,
}

impl<'a, S: TreeStorage> NestedSet<'a, S> {
    pub fn new(storage: &'a mut S, spec: TreeSpec) -> Self {
        Self { storage, spec }
    }

    pub fn spec(&self) -> &TreeSpec {
        &self.spec
    }

    pub fn on_create(&mut self, node: &NewNode) -> Result<Bounds, S::Error> {
        let mut tx = self.storage.begin(&self.spec, TxMode::Write)?;
        let result = mutator::insert(&mut tx, &self.spec, node);
        finish(tx, result)
    }

    /// Picks up a `parent` change the document layer already wrote.
    pub fn on_update(&mut self, id: &NodeId) -> Result<Placement, S::Error> {
        let mut tx = self.storage.begin(&self.spec, TxMode::Write)?;
        let result = mutator::reconcile(&mut tx, &self.spec, id);
        finish(tx, result)
    }

    pub fn on_reparent(
        &mut self,
        id: &NodeId,
        new_parent: Option<&NodeId>,
    ) -> Result<Bounds, S::Error> {
        let mut tx = self.storage.begin(&self.spec, TxMode::Write)?;
        let result = mutator::move_node(&mut tx, &self.spec, id, new_parent);
        finish(tx, result)
    }

    pub fn on_delete(&mut self, id: &NodeId) -> Result<(), S::Error> {
        let mut tx = self.storage.begin(&self.spec, TxMode::Write)?;
        let result = mutator::delete(&mut tx, &self.spec, id);
        finish(tx, result)
    }

    /// Low-level: removes the whole subtree without per-node checks.
    pub fn force_remove_subtree(&mut self, id: &NodeId) -> Result<usize, S::Error> {
        let mut tx = self.storage.begin(&self.spec, TxMode::Write)?;
        let result = mutator::remove_subtree(&mut tx, &self.spec, id);
        finish(tx, result)
    }

    pub fn set_group(&mut self, id: &NodeId, is_group: bool) -> Result<(), S::Error> {
        let mut tx = self.storage.begin(&self.spec, TxMode::Write)?;
        let result = mutator::set_group(&mut tx, id, is_group);
        finish(tx, result)
    }

    pub fn rename(&mut self, from: &NodeId, to: &NodeId, merge: bool) -> Result<(), S::Error> {
        let mut tx = self.storage.begin(&self.spec, TxMode::Write)?;
        let result = mutator::rename(&mut tx, &self.spec, from, to, merge);
        finish(tx, result)
    }

    pub fn rebuild(&mut self, options: RebuildOptions) -> Result<RebuildReport, S::Error> {
        rebuild::rebuild(self.storage, &self.spec, options)
    }

    pub fn get_node(&mut self, id: &NodeId) -> Result<Option<Node>, S::Error> {
        let mut tx = self.storage.begin(&self.spec, TxMode::Read)?;
        let result = query::node(&mut tx, id);
        finish(tx, result)
    }

    pub fn get_ancestors(
        &mut self,
        id: &NodeId,
        limit: Option<usize>,
    ) -> Result<Vec<Node>, S::Error> {
        let mut tx = self.storage.begin(&self.spec, TxMode::Read)?;
        let result = query::ancestors(&mut tx, id, limit);
        finish(tx, result)
    }

    pub fn get_descendants(
        &mut self,
        id: &NodeId,
        limit: Option<usize>,
    ) -> Result<Vec<Node>, S::Error> {
        let mut tx = self.storage.begin(&self.spec, TxMode::Read)?;
        let result = query::descendants(&mut tx, id, limit);
        finish(tx, result)
    }

    pub fn get_children(&mut self, id: &NodeId) -> Result<Vec<Node>, S::Error> {
        let mut tx = self.storage.begin(&self.spec, TxMode::Read)?;
        let result = query::children(&mut tx, id);
        finish(tx, result)
    }

    pub fn get_root(&mut self) -> Result<Option<Node>, S::Error> {
        let mut tx = self.storage.begin(&self.spec, TxMode::Read)?;
        let result = query::root(&mut tx);
        finish(tx, result)
    }

    pub fn validate_single_root(&mut self) -> Result<(), S::Error> {
        let mut tx = self.storage.begin(&self.spec, TxMode::Read)?;
        let result = guard::validate_single_root(&mut tx, &self.spec);
        finish(tx, result)
    }

    pub fn check_integrity(&mut self) -> Result<IntegrityReport, S::Error> {
        let mut tx = self.storage.begin(&self.spec, TxMode::Read)?;
        let result = query::check_integrity(&mut tx);
        finish(tx, result)
    }
}
