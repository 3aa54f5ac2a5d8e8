#![forbid(unsafe_code)]

//! Read-only range queries. Each one is a single predicate over `(lft, rgt)`.

use crate::error::TreeError;
use crate::ids::NodeId;
use crate::model::{Bounds, Node};
use crate::tree::port::{Lock, Order, RangePredicate, TreeTx};
use std::collections::BTreeMap;
use std::fmt;

fn require<T: TreeTx>(tx: &mut T, id: &NodeId) -> Result<Node, T::Error> {
    tx.read(id, Lock::None)?
        .ok_or_else(|| TreeError::UnknownNode(id.clone()).into())
}

pub fn node<T: TreeTx>(tx: &mut T, id: &NodeId) -> Result<Option<Node>, T::Error> {
    tx.read(id, Lock::None)
}

/// Nearest ancestor first.
pub fn ancestors<T: TreeTx>(
    tx: &mut T,
    id: &NodeId,
    limit: Option<usize>,
) -> Result<Vec<Node>, T::Error> {
    let bounds = require(tx, id)?.placed_bounds()?;
    tx.select(&RangePredicate::Ancestors(bounds), Order::LftDesc, limit)
}

/// Pre-order (by `lft`).
pub fn descendants<T: TreeTx>(
    tx: &mut T,
    id: &NodeId,
    limit: Option<usize>,
) -> Result<Vec<Node>, T::Error> {
    let bounds = require(tx, id)?.placed_bounds()?;
    tx.select(&RangePredicate::Descendants(bounds), Order::LftAsc, limit)
}

pub fn children<T: TreeTx>(tx: &mut T, id: &NodeId) -> Result<Vec<Node>, T::Error> {
    require(tx, id)?;
    tx.select(&RangePredicate::ChildrenOf(id.clone()), Order::LftAsc, None)
}

/// The placed node with the smallest `lft`; nothing can strictly contain it.
pub fn root<T: TreeTx>(tx: &mut T) -> Result<Option<Node>, T::Error> {
    Ok(tx
        .select(&RangePredicate::Placed, Order::LftAsc, Some(1))?
        .into_iter()
        .next())
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Violation {
    Unplaced {
        node: NodeId,
    },
    DuplicateBoundary {
        value: i64,
        first: NodeId,
        second: NodeId,
    },
    Overlap {
        left: NodeId,
        right: NodeId,
    },
    ParentMismatch {
        node: NodeId,
        recorded: Option<NodeId>,
        by_range: Option<NodeId>,
    },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn or_root(id: &Option<NodeId>) -> &str {
            id.as_ref().map_or("<root>", NodeId::as_str)
        }
        match self {
            Self::Unplaced { node } => write!(f, "{node}: no lft/rgt assigned"),
            Self::DuplicateBoundary {
                value,
                first,
                second,
            } => write!(f, "boundary {value} claimed by both {first} and {second}"),
            Self::Overlap { left, right } => write!(f, "ranges of {left} and {right} overlap"),
            Self::ParentMismatch {
                node,
                recorded,
                by_range,
            } => write!(
                f,
                "{node}: parent is {} but ranges place it under {}",
                or_root(recorded),
                or_root(by_range)
            ),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IntegrityReport {
    pub nodes: usize,
    pub violations: Vec<Violation>,
}

impl IntegrityReport {
    pub fn is_ok(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Full scan in `lft` order with a stack of open ranges. Checks that
/// boundaries are unique, ranges nest without overlapping and every node's
/// nearest container is its recorded parent.
pub fn check_integrity<T: TreeTx>(tx: &mut T) -> Result<IntegrityReport, T::Error> {
    let nodes = tx.select(&RangePredicate::All, Order::LftAsc, None)?;
    let mut report = IntegrityReport {
        nodes: nodes.len(),
        violations: Vec::new(),
    };
    let mut owners: BTreeMap<i64, NodeId> = BTreeMap::new();
    let mut open: Vec<(NodeId, Bounds)> = Vec::new();

    for node in &nodes {
        let Some(bounds) = node.bounds else {
            report.violations.push(Violation::Unplaced {
                node: node.id.clone(),
            });
            continue;
        };

        for value in [bounds.lft(), bounds.rgt()] {
            if let Some(first) = owners.insert(value, node.id.clone()) {
                report.violations.push(Violation::DuplicateBoundary {
                    value,
                    first,
                    second: node.id.clone(),
                });
            }
        }

        while open
            .last()
            .is_some_and(|(_, outer)| outer.rgt() < bounds.lft())
        {
            open.pop();
        }

        match open.last() {
            Some((outer_id, outer)) if !outer.is_ancestor_of(&bounds) => {
                report.violations.push(Violation::Overlap {
                    left: outer_id.clone(),
                    right: node.id.clone(),
                });
            }
            container => {
                let by_range = container.map(|(outer_id, _)| outer_id.clone());
                if by_range != node.parent {
                    report.violations.push(Violation::ParentMismatch {
                        node: node.id.clone(),
                        recorded: node.parent.clone(),
                        by_range,
                    });
                }
            }
        }

        open.push((node.id.clone(), bounds));
    }

    Ok(report)
}
