#![forbid(unsafe_code)]

//! In-process storage port. A transaction works on a private copy of one
//! tree and swaps it back on commit.

use crate::error::TreeError;
use crate::ids::NodeId;
use crate::model::{Bounds, Node, TreeSpec};
use crate::tree::plan::ShiftPlan;
use crate::tree::port::{Lock, Order, RangePredicate, TreeStorage, TreeTx, TxMode};
use std::cmp::Reverse;
use std::collections::BTreeMap;

type Rows = BTreeMap<NodeId, Node>;

#[derive(Debug, Default)]
pub struct MemoryStore {
    trees: BTreeMap<String, Rows>,
    fail_after_writes: Option<usize>,
    fail_rollback: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows of one tree type, ordered by id.
    pub fn nodes(&self, tree_type: &str) -> Vec<Node> {
        self.trees
            .get(tree_type)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn node(&self, tree_type: &str, id: &NodeId) -> Option<&Node> {
        self.trees.get(tree_type)?.get(id)
    }

    /// Writes bounds behind the engine's back, as a foreign writer would.
    pub fn overwrite_bounds(&mut self, tree_type: &str, id: &NodeId, bounds: Option<Bounds>) -> bool {
        self.row_mut(tree_type, id)
            .map(|node| node.bounds = bounds)
            .is_some()
    }

    /// Edits only the parent pointer, leaving ranges stale until a rebuild.
    pub fn overwrite_parent(&mut self, tree_type: &str, id: &NodeId, parent: Option<NodeId>) -> bool {
        self.row_mut(tree_type, id)
            .map(|node| node.parent = parent)
            .is_some()
    }

    /// Every write after the first `writes` in a transaction fails.
    pub fn fail_after_writes(&mut self, writes: Option<usize>) {
        self.fail_after_writes = writes;
    }

    /// Makes every rollback report an error after discarding its writes.
    pub fn fail_rollback(&mut self, fail: bool) {
        self.fail_rollback = fail;
    }

    fn row_mut(&mut self, tree_type: &str, id: &NodeId) -> Option<&mut Node> {
        self.trees.get_mut(tree_type)?.get_mut(id)
    }
}

impl TreeStorage for MemoryStore {
    type Error = TreeError;
    type Tx<'a> = MemoryTx<'a>;

    fn begin(&mut self, spec: &TreeSpec, mode: TxMode) -> Result<MemoryTx<'_>, TreeError> {
        let tree_type = spec.tree_type().to_string();
        let staged = self.trees.get(&tree_type).cloned().unwrap_or_default();
        Ok(MemoryTx {
            store: self,
            tree_type,
            staged,
            mode,
            writes: 0,
        })
    }
}

#[derive(Debug)]
pub struct MemoryTx<'a> {
    store: &'a mut MemoryStore,
    tree_type: String,
    staged: Rows,
    mode: TxMode,
    writes: usize,
}

impl MemoryTx<'_> {
    fn write_guard(&mut self) -> Result<(), TreeError> {
        if self.mode == TxMode::Read {
            return Err(TreeError::InvalidInput(
                "write attempted in a read-only transaction",
            ));
        }
        if self
            .store
            .fail_after_writes
            .is_some_and(|limit| self.writes >= limit)
        {
            return Err(TreeError::Storage("injected write failure".to_string()));
        }
        self.writes += 1;
        Ok(())
    }

    fn update_each(&mut self, mut apply: impl FnMut(&mut Node) -> bool) -> usize {
        self.staged
            .values_mut()
            .map(|node| apply(node))
            .filter(|changed| *changed)
            .count()
    }
}

fn sort_nodes(nodes: &mut [Node], order: Order) {
    match order {
        Order::IdAsc => nodes.sort_by(|a, b| a.id.cmp(&b.id)),
        Order::LftAsc => nodes.sort_by_key(|node| (node.bounds.map(|b| b.lft()), node.id.clone())),
        Order::LftDesc => {
            nodes.sort_by_key(|node| Reverse((node.bounds.map(|b| b.lft()), node.id.clone())))
        }
    }
}

impl TreeTx for MemoryTx<'_> {
    type Error = TreeError;

    fn read(&mut self, id: &NodeId, _lock: Lock) -> Result<Option<Node>, TreeError> {
        Ok(self.staged.get(id).cloned())
    }

    fn select(
        &mut self,
        predicate: &RangePredicate,
        order: Order,
        limit: Option<usize>,
    ) -> Result<Vec<Node>, TreeError> {
        let mut nodes: Vec<Node> = self
            .staged
            .values()
            .filter(|node| predicate.matches(node))
            .cloned()
            .collect();
        sort_nodes(&mut nodes, order);
        if let Some(limit) = limit {
            nodes.truncate(limit);
        }
        Ok(nodes)
    }

    fn count(&mut self, predicate: &RangePredicate) -> Result<usize, TreeError> {
        Ok(self
            .staged
            .values()
            .filter(|node| predicate.matches(node))
            .count())
    }

    fn max_rgt(&mut self) -> Result<Option<i64>, TreeError> {
        Ok(self
            .staged
            .values()
            .filter_map(|node| node.bounds.map(|b| b.rgt()))
            .max())
    }

    fn upsert(&mut self, node: &Node) -> Result<(), TreeError> {
        self.write_guard()?;
        self.staged.insert(node.id.clone(), node.clone());
        Ok(())
    }

    fn shift(&mut self, plan: &ShiftPlan) -> Result<usize, TreeError> {
        self.write_guard()?;
        let mut affected = 0;
        for node in self.staged.values_mut() {
            let Some(bounds) = node.bounds.filter(|b| plan.touches(b)) else {
                continue;
            };
            node.bounds = Some(plan.apply_bounds(bounds)?);
            affected += 1;
        }
        Ok(affected)
    }

    fn set_bounds(&mut self, id: &NodeId, bounds: Option<Bounds>) -> Result<usize, TreeError> {
        self.write_guard()?;
        Ok(self
            .staged
            .get_mut(id)
            .map(|node| node.bounds = bounds)
            .map_or(0, |_| 1))
    }

    fn set_parent(&mut self, id: &NodeId, parent: Option<&NodeId>) -> Result<usize, TreeError> {
        self.write_guard()?;
        Ok(self
            .staged
            .get_mut(id)
            .map(|node| {
                node.parent = parent.cloned();
                node.old_parent = parent.cloned();
            })
            .map_or(0, |_| 1))
    }

    fn set_group(&mut self, id: &NodeId, is_group: bool) -> Result<usize, TreeError> {
        self.write_guard()?;
        Ok(self
            .staged
            .get_mut(id)
            .map(|node| node.is_group = is_group)
            .map_or(0, |_| 1))
    }

    fn rename(&mut self, from: &NodeId, to: &NodeId) -> Result<usize, TreeError> {
        self.write_guard()?;
        let Some(mut node) = self.staged.remove(from) else {
            return Ok(0);
        };
        node.id = to.clone();
        self.staged.insert(to.clone(), node);
        self.update_each(|node| {
            let mut changed = false;
            if node.parent.as_ref() == Some(from) {
                node.parent = Some(to.clone());
                changed = true;
            }
            if node.old_parent.as_ref() == Some(from) {
                node.old_parent = Some(to.clone());
                changed = true;
            }
            changed
        });
        Ok(1)
    }

    fn reparent_children(&mut self, from: &NodeId, to: &NodeId) -> Result<usize, TreeError> {
        self.write_guard()?;
        Ok(self.update_each(|node| {
            if node.parent.as_ref() != Some(from) {
                return false;
            }
            node.parent = Some(to.clone());
            node.old_parent = Some(to.clone());
            true
        }))
    }

    fn sync_old_parent(&mut self) -> Result<usize, TreeError> {
        self.write_guard()?;
        Ok(self.update_each(|node| {
            node.old_parent = node.parent.clone();
            true
        }))
    }

    fn delete_where(&mut self, predicate: &RangePredicate) -> Result<usize, TreeError> {
        self.write_guard()?;
        let before = self.staged.len();
        self.staged.retain(|_, node| !predicate.matches(node));
        Ok(before - self.staged.len())
    }

    fn commit(self) -> Result<(), TreeError> {
        if self.mode == TxMode::Write {
            self.store.trees.insert(self.tree_type, self.staged);
        }
        Ok(())
    }

    fn rollback(self) -> Result<(), TreeError> {
        if self.store.fail_rollback {
            return Err(TreeError::Storage("injected rollback failure".to_string()));
        }
        Ok(())
    }
}
