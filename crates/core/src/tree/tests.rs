use super::*;
use crate::error::TreeError;
use crate::ids::Identifier;

const TREE: &str = "account";

fn id(value: &str) -> NodeId {
    NodeId::try_new(value).unwrap()
}

fn b(lft: i64, rgt: i64) -> Bounds {
    Bounds::new(lft, rgt).unwrap()
}

fn spec() -> TreeSpec {
    TreeSpec::new(Identifier::try_new(TREE).unwrap())
}

fn tree(store: &mut MemoryStore) -> NestedSet<'_, MemoryStore> {
    NestedSet::new(store, spec())
}

fn bounds_of(store: &MemoryStore, name: &str) -> Option<Bounds> {
    store.node(TREE, &id(name)).and_then(|node| node.bounds)
}

fn create(store: &mut MemoryStore, name: &str, parent: Option<&str>, group: bool) -> Bounds {
    let node = NewNode {
        id: id(name),
        parent: parent.map(id),
        is_group: group,
    };
    tree(store).on_create(&node).expect("create node")
}

/// R with children C1 (leaf) and C2 (group).
fn seeded() -> MemoryStore {
    let mut store = MemoryStore::new();
    create(&mut store, "R", None, true);
    create(&mut store, "C1", Some("R"), false);
    create(&mut store, "C2", Some("R"), true);
    store
}

fn ids(nodes: &[Node]) -> Vec<&str> {
    nodes.iter().map(|node| node.id.as_str()).collect()
}

#[test]
fn insert_under_root_widens_the_root() {
    let mut store = MemoryStore::new();
    assert_eq!(create(&mut store, "R", None, true), b(1, 2));
    assert_eq!(create(&mut store, "C1", Some("R"), false), b(2, 3));
    assert_eq!(bounds_of(&store, "R"), Some(b(1, 4)));
}

#[test]
fn second_child_lands_right_of_the_first() {
    let store = seeded();
    assert_eq!(bounds_of(&store, "R"), Some(b(1, 6)));
    assert_eq!(bounds_of(&store, "C1"), Some(b(2, 3)));
    assert_eq!(bounds_of(&store, "C2"), Some(b(4, 5)));
}

#[test]
fn move_leaf_under_sibling() {
    let mut store = seeded();
    let moved = tree(&mut store)
        .on_reparent(&id("C1"), Some(&id("C2")))
        .expect("move");
    assert_eq!(moved, b(3, 4));

    let c1 = bounds_of(&store, "C1").unwrap();
    let c2 = bounds_of(&store, "C2").unwrap();
    let r = bounds_of(&store, "R").unwrap();
    assert!(c2.lft() < c1.lft() && c1.lft() < c1.rgt() && c1.rgt() < c2.rgt());
    assert!(r.is_ancestor_of(&c1) && r.is_ancestor_of(&c2));

    let c1_row = store.node(TREE, &id("C1")).unwrap();
    assert_eq!(c1_row.parent, Some(id("C2")));
    assert_eq!(c1_row.old_parent, Some(id("C2")));
    assert!(tree(&mut store).check_integrity().unwrap().is_ok());
}

#[test]
fn move_under_own_descendant_is_rejected_without_changes() {
    let mut store = seeded();
    let before = store.nodes(TREE);

    let err = tree(&mut store)
        .on_reparent(&id("R"), Some(&id("C1")))
        .expect_err("recursion");
    match err {
        TreeError::Recursion { node, parent } => {
            assert_eq!(node, id("R"));
            assert_eq!(parent, id("C1"));
        }
        other => panic!("expected Recursion, got {other:?}"),
    }
    assert_eq!(store.nodes(TREE), before);

    let err = tree(&mut store)
        .on_reparent(&id("C2"), Some(&id("C2")))
        .expect_err("self parent");
    assert_eq!(err.code(), "NestedSetRecursionError");
    assert_eq!(store.nodes(TREE), before);
}

#[test]
fn insert_refuses_a_foreign_row_on_the_anchor() {
    let mut store = MemoryStore::new();
    create(&mut store, "R", None, true);
    create(&mut store, "C1", Some("R"), true);
    create(&mut store, "S", None, true);
    assert_eq!(bounds_of(&store, "S"), Some(b(5, 6)));
    store.overwrite_bounds(TREE, &id("S"), Some(b(4, 5)));
    let before = store.nodes(TREE);

    let err = tree(&mut store)
        .on_create(&NewNode::leaf(id("X"), Some(id("R"))))
        .expect_err("collision");
    match err {
        TreeError::BoundaryCollision { boundary } => assert_eq!(boundary, 4),
        other => panic!("expected BoundaryCollision, got {other:?}"),
    }
    assert_eq!(store.nodes(TREE), before);

    // R.rgt is anchor + 1 here.
    assert_eq!(create(&mut store, "X", Some("C1"), false), b(3, 4));
}

#[test]
fn delete_leaf_closes_the_gap() {
    let mut store = seeded();
    tree(&mut store)
        .on_reparent(&id("C1"), Some(&id("C2")))
        .expect("move");
    tree(&mut store).on_delete(&id("C1")).expect("delete");

    assert_eq!(store.node(TREE, &id("C1")), None);
    assert_eq!(bounds_of(&store, "C2"), Some(b(2, 3)));
    assert_eq!(bounds_of(&store, "R"), Some(b(1, 4)));
}

#[test]
fn rebuild_repairs_corrupted_ranges() {
    let mut store = seeded();
    store.overwrite_bounds(TREE, &id("R"), Some(b(1, 2)));
    store.overwrite_bounds(TREE, &id("C1"), Some(b(1, 2)));
    store.overwrite_bounds(TREE, &id("C2"), None);
    assert!(!tree(&mut store).check_integrity().unwrap().is_ok());

    let report = tree(&mut store)
        .rebuild(RebuildOptions::default())
        .expect("rebuild");
    assert_eq!(
        report,
        RebuildReport {
            roots: 1,
            nodes: 3,
            commits: 1
        }
    );
    assert_eq!(bounds_of(&store, "R"), Some(b(1, 6)));
    assert_eq!(bounds_of(&store, "C1"), Some(b(2, 3)));
    assert_eq!(bounds_of(&store, "C2"), Some(b(4, 5)));
    assert!(tree(&mut store).check_integrity().unwrap().is_ok());
}

#[test]
fn rebuild_follows_parent_pointers_and_is_idempotent() {
    let mut store = seeded();
    create(&mut store, "G", Some("C2"), false);
    store.overwrite_parent(TREE, &id("C1"), Some(id("C2")));

    tree(&mut store)
        .rebuild(RebuildOptions::default())
        .expect("rebuild");
    let first = store.nodes(TREE);
    assert_eq!(bounds_of(&store, "C2"), Some(b(2, 7)));
    assert_eq!(bounds_of(&store, "C1"), Some(b(3, 4)));
    assert_eq!(bounds_of(&store, "G"), Some(b(5, 6)));
    assert_eq!(
        store.node(TREE, &id("C1")).unwrap().old_parent,
        Some(id("C2"))
    );

    tree(&mut store)
        .rebuild(RebuildOptions::default())
        .expect("rebuild again");
    assert_eq!(store.nodes(TREE), first);
}

#[test]
fn rebuild_commits_in_batches() {
    let mut store = seeded();
    let report = tree(&mut store)
        .rebuild(RebuildOptions {
            commit_every: Some(2),
        })
        .expect("rebuild");
    assert_eq!(report.nodes, 3);
    assert_eq!(report.commits, 2);
    assert!(tree(&mut store).check_integrity().unwrap().is_ok());
}

#[test]
fn rebuild_refuses_unreachable_nodes() {
    let mut store = seeded();
    store.overwrite_parent(TREE, &id("C1"), Some(id("C2")));
    store.overwrite_parent(TREE, &id("C2"), Some(id("C1")));
    let before = store.nodes(TREE);

    let err = tree(&mut store)
        .rebuild(RebuildOptions::default())
        .expect_err("cycle");
    match err {
        TreeError::Corruption(message) => assert!(message.starts_with("2 of 3 nodes")),
        other => panic!("expected Corruption, got {other:?}"),
    }
    assert_eq!(store.nodes(TREE), before);
}

#[test]
fn failed_write_rolls_back_the_whole_operation() {
    let mut store = seeded();
    let before = store.nodes(TREE);
    store.fail_after_writes(Some(1));

    let err = tree(&mut store)
        .on_create(&NewNode::leaf(id("C3"), Some(id("R"))))
        .expect_err("injected failure");
    assert_eq!(err.code(), "STORAGE");
    assert_eq!(store.nodes(TREE), before);

    store.fail_after_writes(None);
    assert_eq!(create(&mut store, "C3", Some("R"), false), b(6, 7));
}

#[test]
fn delete_refuses_nodes_with_children_and_roots() {
    let mut store = seeded();
    create(&mut store, "G", Some("C2"), false);

    match tree(&mut store).on_delete(&id("C2")).expect_err("has child") {
        TreeError::ChildExists { node } => assert_eq!(node, id("C2")),
        other => panic!("expected ChildExists, got {other:?}"),
    }

    let mut lone = MemoryStore::new();
    create(&mut lone, "R", None, true);
    match tree(&mut lone).on_delete(&id("R")).expect_err("root") {
        TreeError::RootDeletion { node } => assert_eq!(node, id("R")),
        other => panic!("expected RootDeletion, got {other:?}"),
    }

    NestedSet::new(&mut lone, spec().with_root_deletion(true))
        .on_delete(&id("R"))
        .expect("root deletion allowed");
    assert!(lone.nodes(TREE).is_empty());
}

#[test]
fn force_remove_subtree_drops_all_descendants() {
    let mut store = seeded();
    create(&mut store, "G", Some("C2"), false);
    create(&mut store, "C3", Some("R"), false);

    let removed = tree(&mut store)
        .force_remove_subtree(&id("C2"))
        .expect("remove");
    assert_eq!(removed, 2);
    assert_eq!(bounds_of(&store, "R"), Some(b(1, 6)));
    assert_eq!(bounds_of(&store, "C3"), Some(b(4, 5)));
    assert!(tree(&mut store).check_integrity().unwrap().is_ok());
}

#[test]
fn force_remove_subtree_takes_unplaced_pointer_children_along() {
    let mut store = seeded();
    create(&mut store, "U", Some("C2"), true);
    create(&mut store, "V", Some("U"), false);
    store.overwrite_bounds(TREE, &id("U"), None);
    store.overwrite_bounds(TREE, &id("V"), None);

    let removed = tree(&mut store)
        .force_remove_subtree(&id("C2"))
        .expect("remove");
    assert_eq!(removed, 3);
    assert_eq!(ids(&store.nodes(TREE)), vec!["C1", "R"]);
    assert_eq!(bounds_of(&store, "R"), Some(b(1, 4)));

    let report = tree(&mut store)
        .rebuild(RebuildOptions::default())
        .expect("no orphans left behind");
    assert_eq!(report.nodes, 2);
}

#[test]
fn rollback_failure_keeps_the_domain_error() {
    let mut store = seeded();
    create(&mut store, "G", Some("C2"), false);
    store.fail_rollback(true);

    let err = tree(&mut store)
        .on_delete(&id("C2"))
        .expect_err("has child");
    assert_eq!(err.code(), "NestedSetChildExistsError");
    assert!(bounds_of(&store, "G").is_some());
}

#[test]
fn single_root_trees_reject_a_second_root() {
    let mut store = MemoryStore::new();
    let spec = spec().with_single_root(true);
    NestedSet::new(&mut store, spec.clone())
        .on_create(&NewNode::group(id("R"), None))
        .expect("first root");
    NestedSet::new(&mut store, spec.clone())
        .on_create(&NewNode::leaf(id("C"), Some(id("R"))))
        .expect("child");

    let err = NestedSet::new(&mut store, spec.clone())
        .on_create(&NewNode::group(id("S"), None))
        .expect_err("second root");
    assert_eq!(err.code(), "NestedSetMultipleRootsError");

    let err = NestedSet::new(&mut store, spec.clone())
        .on_reparent(&id("C"), None)
        .expect_err("promote to root");
    assert!(matches!(err, TreeError::MultipleRoots { roots: 2, .. }));

    NestedSet::new(&mut store, spec.clone())
        .validate_single_root()
        .expect("one root");
    store.overwrite_parent(TREE, &id("C"), None);
    assert!(NestedSet::new(&mut store, spec)
        .validate_single_root()
        .is_err());
}

#[test]
fn forests_append_new_roots_after_the_last() {
    let mut store = MemoryStore::new();
    create(&mut store, "R", None, true);
    assert_eq!(create(&mut store, "S", None, true), b(3, 4));
    create(&mut store, "C", Some("R"), false);
    assert_eq!(bounds_of(&store, "S"), Some(b(5, 6)));
    assert_eq!(
        tree(&mut store).get_root().unwrap().map(|node| node.id),
        Some(id("R"))
    );
}

#[test]
fn subtree_can_be_promoted_to_root() {
    let mut store = seeded();
    create(&mut store, "G", Some("C2"), false);

    let moved = tree(&mut store).on_reparent(&id("C2"), None).expect("promote");
    assert_eq!(moved, b(5, 8));
    assert_eq!(bounds_of(&store, "R"), Some(b(1, 4)));
    assert_eq!(bounds_of(&store, "G"), Some(b(6, 7)));
    assert_eq!(store.node(TREE, &id("C2")).unwrap().parent, None);
    assert!(tree(&mut store).check_integrity().unwrap().is_ok());
}

#[test]
fn range_queries_return_in_tree_order() {
    let mut store = seeded();
    create(&mut store, "G", Some("C2"), false);
    let mut tree = tree(&mut store);

    let ancestors = tree.get_ancestors(&id("G"), None).unwrap();
    assert_eq!(ids(&ancestors), vec!["C2", "R"]);
    let nearest = tree.get_ancestors(&id("G"), Some(1)).unwrap();
    assert_eq!(ids(&nearest), vec!["C2"]);

    let descendants = tree.get_descendants(&id("R"), None).unwrap();
    assert_eq!(ids(&descendants), vec!["C1", "C2", "G"]);
    assert!(tree.get_descendants(&id("G"), None).unwrap().is_empty());

    let children = tree.get_children(&id("R")).unwrap();
    assert_eq!(ids(&children), vec!["C1", "C2"]);

    assert_eq!(tree.get_node(&id("missing")).unwrap(), None);
    assert!(matches!(
        tree.get_ancestors(&id("missing"), None),
        Err(TreeError::UnknownNode(_))
    ));
}

#[test]
fn update_reconciles_an_edited_parent() {
    let mut store = seeded();
    store.overwrite_parent(TREE, &id("C1"), Some(id("C2")));

    let placement = tree(&mut store).on_update(&id("C1")).expect("update");
    assert_eq!(placement, Placement::Moved(b(3, 4)));
    let placement = tree(&mut store).on_update(&id("C1")).expect("update again");
    assert_eq!(placement, Placement::Unchanged(b(3, 4)));
}

#[test]
fn rename_keeps_ranges_and_repoints_children() {
    let mut store = seeded();
    create(&mut store, "G", Some("C2"), false);

    tree(&mut store)
        .rename(&id("C2"), &id("Cx"), false)
        .expect("rename");
    assert_eq!(store.node(TREE, &id("C2")), None);
    assert_eq!(bounds_of(&store, "Cx"), Some(b(4, 7)));
    assert_eq!(store.node(TREE, &id("G")).unwrap().parent, Some(id("Cx")));

    let err = tree(&mut store)
        .rename(&id("Cx"), &id("C1"), false)
        .expect_err("target exists");
    assert_eq!(err.code(), "INVALID_INPUT");
}

#[test]
fn merge_moves_children_into_the_target() {
    let mut store = seeded();
    create(&mut store, "G", Some("C2"), false);
    create(&mut store, "C3", Some("R"), true);

    match tree(&mut store)
        .rename(&id("C1"), &id("C2"), true)
        .expect_err("leaf into group")
    {
        TreeError::InvalidMerge { from, into } => {
            assert_eq!(from, id("C1"));
            assert_eq!(into, id("C2"));
        }
        other => panic!("expected InvalidMerge, got {other:?}"),
    }

    tree(&mut store)
        .rename(&id("C2"), &id("C3"), true)
        .expect("merge");
    assert_eq!(store.node(TREE, &id("C2")), None);
    assert_eq!(store.node(TREE, &id("G")).unwrap().parent, Some(id("C3")));
    assert_eq!(bounds_of(&store, "C3"), Some(b(4, 7)));
    assert_eq!(bounds_of(&store, "G"), Some(b(5, 6)));
    assert!(tree(&mut store).check_integrity().unwrap().is_ok());
}

#[test]
fn merge_into_own_descendant_is_recursion() {
    let mut store = seeded();
    create(&mut store, "D", Some("C2"), true);
    let err = tree(&mut store)
        .rename(&id("C2"), &id("D"), true)
        .expect_err("descendant");
    assert_eq!(err.code(), "NestedSetRecursionError");
}

#[test]
fn group_flag_cannot_drop_while_children_exist() {
    let mut store = seeded();
    create(&mut store, "G", Some("C2"), false);

    let err = tree(&mut store)
        .set_group(&id("C2"), false)
        .expect_err("has children");
    assert_eq!(err.code(), "NestedSetChildExistsError");

    tree(&mut store).set_group(&id("C1"), true).expect("promote");
    assert!(store.node(TREE, &id("C1")).unwrap().is_group);
}

#[test]
fn integrity_check_reports_overlaps_and_duplicates() {
    let mut store = seeded();
    store.overwrite_bounds(TREE, &id("C2"), Some(b(3, 7)));

    let report = tree(&mut store).check_integrity().unwrap();
    assert_eq!(report.nodes, 3);
    assert!(report.violations.contains(&Violation::DuplicateBoundary {
        value: 3,
        first: id("C1"),
        second: id("C2"),
    }));
    assert!(report.violations.contains(&Violation::Overlap {
        left: id("C1"),
        right: id("C2"),
    }));
}

#[test]
fn read_transactions_reject_writes() {
    let mut store = seeded();
    let mut tx = store.begin(&spec(), TxMode::Read).unwrap();
    let err = tx.set_group(&id("C1"), true).expect_err("read only");
    assert_eq!(err.code(), "INVALID_INPUT");
}
