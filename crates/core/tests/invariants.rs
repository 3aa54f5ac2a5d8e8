use mptt_core::{
    Identifier, MemoryStore, NestedSet, NewNode, Node, NodeId, RebuildOptions, TreeError, TreeSpec,
};
use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

const TREE: &str = "category";

#[derive(Debug, Clone)]
enum Operation {
    Create { parent: Option<usize> },
    Move { node: usize, parent: Option<usize> },
    Delete { node: usize },
}

fn arb_operation() -> impl Strategy<Value = Operation> {
    prop_oneof![
        3 => prop::option::weighted(0.8, 0usize..64)
            .prop_map(|parent| Operation::Create { parent }),
        2 => (0usize..64, prop::option::weighted(0.8, 0usize..64))
            .prop_map(|(node, parent)| Operation::Move { node, parent }),
        1 => (0usize..64).prop_map(|node| Operation::Delete { node }),
    ]
}

fn spec() -> TreeSpec {
    TreeSpec::new(Identifier::try_new(TREE).unwrap()).with_root_deletion(true)
}

/// Parent pointers only; the engine's ranges must always agree with it.
#[derive(Default)]
struct Model {
    parents: BTreeMap<NodeId, Option<NodeId>>,
}

impl Model {
    fn pick(&self, index: usize) -> Option<NodeId> {
        if self.parents.is_empty() {
            return None;
        }
        self.parents.keys().nth(index % self.parents.len()).cloned()
    }

    fn has_children(&self, id: &NodeId) -> bool {
        self.parents.values().any(|parent| parent.as_ref() == Some(id))
    }

    fn is_within(&self, candidate: &NodeId, subtree_root: &NodeId) -> bool {
        let mut cursor = Some(candidate.clone());
        while let Some(current) = cursor {
            if &current == subtree_root {
                return true;
            }
            cursor = self.parents.get(&current).cloned().flatten();
        }
        false
    }

    fn descendants(&self, id: &NodeId) -> BTreeSet<NodeId> {
        self.parents
            .keys()
            .filter(|candidate| *candidate != id && self.is_within(candidate, id))
            .cloned()
            .collect()
    }
}

fn ids(nodes: Vec<Node>) -> BTreeSet<NodeId> {
    nodes.into_iter().map(|node| node.id).collect()
}

fn assert_matches_model(store: &mut MemoryStore, model: &Model) -> Result<(), TestCaseError> {
    let rows = store.nodes(TREE);
    prop_assert_eq!(rows.len(), model.parents.len());
    for row in &rows {
        prop_assert_eq!(Some(&row.parent), model.parents.get(&row.id));
    }

    let mut tree = NestedSet::new(store, spec());
    let report = tree.check_integrity().unwrap();
    prop_assert!(report.is_ok(), "violations: {:?}", report.violations);
    for id in model.parents.keys() {
        let descendants = ids(tree.get_descendants(id, None).unwrap());
        prop_assert_eq!(descendants, model.descendants(id));
    }
    Ok(())
}

proptest! {
    #[test]
    fn prop_ranges_track_parent_pointers(ops in prop::collection::vec(arb_operation(), 1..60)) {
        let mut store = MemoryStore::new();
        let mut model = Model::default();
        let mut next = 0usize;

        for op in ops {
            let before = store.nodes(TREE);
            match op {
                Operation::Create { parent } => {
                    let id = NodeId::try_new(format!("n{next:03}")).unwrap();
                    next += 1;
                    let parent = parent.and_then(|index| model.pick(index));
                    NestedSet::new(&mut store, spec())
                        .on_create(&NewNode::group(id.clone(), parent.clone()))
                        .unwrap();
                    model.parents.insert(id, parent);
                }
                Operation::Move { node, parent } => {
                    let Some(node) = model.pick(node) else { continue };
                    let parent = parent.and_then(|index| model.pick(index));
                    let loops = parent
                        .as_ref()
                        .is_some_and(|parent| model.is_within(parent, &node));
                    let result = NestedSet::new(&mut store, spec())
                        .on_reparent(&node, parent.as_ref());
                    if loops {
                        let rejected = matches!(result, Err(TreeError::Recursion { .. }));
                        prop_assert!(rejected, "expected recursion, got {:?}", result);
                        prop_assert_eq!(store.nodes(TREE), before);
                    } else {
                        prop_assert!(result.is_ok(), "move failed: {:?}", result);
                        model.parents.insert(node, parent);
                    }
                }
                Operation::Delete { node } => {
                    let Some(node) = model.pick(node) else { continue };
                    let result = NestedSet::new(&mut store, spec()).on_delete(&node);
                    if model.has_children(&node) {
                        let rejected = matches!(result, Err(TreeError::ChildExists { .. }));
                        prop_assert!(rejected, "expected child exists, got {:?}", result);
                        prop_assert_eq!(store.nodes(TREE), before);
                    } else {
                        prop_assert!(result.is_ok(), "delete failed: {:?}", result);
                        model.parents.remove(&node);
                    }
                }
            }
            assert_matches_model(&mut store, &model)?;
        }

        let report = NestedSet::new(&mut store, spec())
            .rebuild(RebuildOptions::default())
            .unwrap();
        prop_assert_eq!(report.nodes, model.parents.len());
        assert_matches_model(&mut store, &model)?;

        let settled = store.nodes(TREE);
        NestedSet::new(&mut store, spec())
            .rebuild(RebuildOptions { commit_every: Some(3) })
            .unwrap();
        prop_assert_eq!(store.nodes(TREE), settled);
    }
}
