use citetree_core::db::open_db_in_memory;
use citetree_core::{
    CitationTree, MutationError, MutationService, SqliteTreeStore, TreeStore,
};
use rusqlite::Connection;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

fn setup() -> Connection {
    open_db_in_memory().unwrap()
}

fn mutation_service(conn: &Connection) -> MutationService<SqliteTreeStore<'_>> {
    let store = Arc::new(Mutex::new(SqliteTreeStore::try_new(conn).unwrap()));
    MutationService::new(store)
}

fn load_tree(conn: &Connection) -> CitationTree {
    SqliteTreeStore::try_new(conn).unwrap().load_tree().unwrap()
}

/// Every child index must equal the set of parent back-references.
fn assert_children_consistent(tree: &CitationTree) {
    for node in &tree.nodes {
        let expected: HashSet<u64> = tree
            .nodes
            .iter()
            .filter(|child| child.parent_id == Some(node.id))
            .map(|child| child.id)
            .collect();
        let actual: HashSet<u64> = node.children.iter().copied().collect();
        assert_eq!(
            actual.len(),
            node.children.len(),
            "duplicate child entries on node {}",
            node.id
        );
        assert_eq!(actual, expected, "child index drift on node {}", node.id);
    }
}

#[test]
fn capture_assigns_monotonic_ids_and_wires_children() {
    let conn = setup();
    let service = mutation_service(&conn);

    let root = service.capture("root capture", None, None).unwrap();
    let child = service.capture("child capture", None, Some(root)).unwrap();
    assert_eq!(root, 1);
    assert_eq!(child, 2);

    let tree = load_tree(&conn);
    assert_eq!(tree.node(root).unwrap().parent_id, None);
    assert_eq!(tree.node(child).unwrap().parent_id, Some(root));
    assert_eq!(tree.node(root).unwrap().children, vec![child]);
    assert!(tree.node(child).unwrap().timestamp_ms > 0);
    assert_children_consistent(&tree);
}

#[test]
fn capture_ids_are_not_reused_after_deletion() {
    let conn = setup();
    let service = mutation_service(&conn);

    let first = service.capture("first", None, None).unwrap();
    let second = service.capture("second", None, None).unwrap();
    service.delete_node(second).unwrap();

    let third = service.capture("third", None, None).unwrap();
    assert_eq!(first, 1);
    assert_eq!(second, 2);
    assert_eq!(third, 3);
}

#[test]
fn capture_normalizes_text_and_mirrors_bare_url() {
    let conn = setup();
    let service = mutation_service(&conn);

    let prose = service
        .capture("  quoted \n  passage  ", None, None)
        .unwrap();
    let link = service
        .capture("https://example.org/paper", None, None)
        .unwrap();

    let tree = load_tree(&conn);
    assert_eq!(tree.node(prose).unwrap().text, "quoted passage");
    assert_eq!(tree.node(prose).unwrap().url, None);
    assert_eq!(
        tree.node(link).unwrap().url.as_deref(),
        Some("https://example.org/paper")
    );
}

#[test]
fn capture_rejects_blank_text_and_bad_parents() {
    let conn = setup();
    let service = mutation_service(&conn);

    let blank = service.capture("  \n ", None, None);
    assert!(matches!(blank, Err(MutationError::EmptyCaptureText)));

    let unknown = service.capture("text", None, Some(42));
    assert!(matches!(unknown, Err(MutationError::NodeNotFound(42))));

    let parent = service.capture("parent", None, None).unwrap();
    service.delete_node(parent).unwrap();
    let tombstoned = service.capture("text", None, Some(parent));
    assert!(matches!(tombstoned, Err(MutationError::NodeDeleted(id)) if id == parent));
}

#[test]
fn move_node_reattaches_between_parents() {
    let conn = setup();
    let service = mutation_service(&conn);

    let left = service.capture("left", None, None).unwrap();
    let right = service.capture("right", None, None).unwrap();
    let moved = service.capture("moved", None, Some(left)).unwrap();

    service.move_node(moved, right).unwrap();

    let tree = load_tree(&conn);
    assert_eq!(tree.node(moved).unwrap().parent_id, Some(right));
    assert!(tree.node(left).unwrap().children.is_empty());
    assert_eq!(tree.node(right).unwrap().children, vec![moved]);
    assert_children_consistent(&tree);
}

#[test]
fn move_node_insert_is_idempotent() {
    let conn = setup();
    let service = mutation_service(&conn);

    let parent = service.capture("parent", None, None).unwrap();
    let child = service.capture("child", None, Some(parent)).unwrap();

    // Re-moving under the same parent must not duplicate the child entry.
    service.move_node(child, parent).unwrap();

    let tree = load_tree(&conn);
    assert_eq!(tree.node(parent).unwrap().children, vec![child]);
    assert_children_consistent(&tree);
}

#[test]
fn move_node_rejects_descendant_target_and_leaves_tree_unchanged() {
    let conn = setup();
    let service = mutation_service(&conn);

    let ancestor = service.capture("ancestor", None, None).unwrap();
    let middle = service.capture("middle", None, Some(ancestor)).unwrap();
    let leaf = service.capture("leaf", None, Some(middle)).unwrap();
    let before = load_tree(&conn);

    let err = service.move_node(ancestor, leaf).unwrap_err();
    assert!(matches!(
        err,
        MutationError::CycleDetected {
            dragged_id,
            target_id,
        } if dragged_id == ancestor && target_id == leaf
    ));
    assert_eq!(load_tree(&conn), before);
}

#[test]
fn move_node_rejects_self_as_immediate_cycle() {
    let conn = setup();
    let service = mutation_service(&conn);

    let node = service.capture("node", None, None).unwrap();
    let err = service.move_node(node, node).unwrap_err();
    assert!(matches!(err, MutationError::CycleDetected { .. }));
}

#[test]
fn move_node_rejects_missing_ids() {
    let conn = setup();
    let service = mutation_service(&conn);

    let node = service.capture("node", None, None).unwrap();
    assert!(matches!(
        service.move_node(77, node),
        Err(MutationError::NodeNotFound(77))
    ));
    assert!(matches!(
        service.move_node(node, 77),
        Err(MutationError::NodeNotFound(77))
    ));
}

#[test]
fn move_node_to_root_detaches_from_parent() {
    let conn = setup();
    let service = mutation_service(&conn);

    let parent = service.capture("parent", None, None).unwrap();
    let child = service.capture("child", None, Some(parent)).unwrap();

    service.move_node_to_root(child).unwrap();

    let tree = load_tree(&conn);
    assert_eq!(tree.node(child).unwrap().parent_id, None);
    assert!(tree.node(parent).unwrap().children.is_empty());
    assert_children_consistent(&tree);
}

#[test]
fn shift_node_to_parent_promotes_one_level_per_call() {
    let conn = setup();
    let service = mutation_service(&conn);

    let grandparent = service.capture("grandparent", None, None).unwrap();
    let parent = service.capture("parent", None, Some(grandparent)).unwrap();
    let node = service.capture("node", None, Some(parent)).unwrap();

    service.shift_node_to_parent(node).unwrap();
    let tree = load_tree(&conn);
    assert_eq!(tree.node(node).unwrap().parent_id, Some(grandparent));
    assert!(tree.node(parent).unwrap().children.is_empty());
    assert_children_consistent(&tree);

    // Parent is now root, so the next shift lands the node at root level.
    service.shift_node_to_parent(node).unwrap();
    let tree = load_tree(&conn);
    assert_eq!(tree.node(node).unwrap().parent_id, None);
    assert_children_consistent(&tree);

    let err = service.shift_node_to_parent(node).unwrap_err();
    assert!(matches!(err, MutationError::NodeHasNoParent(id) if id == node));
}

#[test]
fn delete_node_cascades_over_descendants_and_clears_cursor() {
    let conn = setup();
    let service = mutation_service(&conn);

    let root = service.capture("a", None, None).unwrap();
    let child = service.capture("b", None, Some(root)).unwrap();
    let bystander = service.capture("bystander", None, None).unwrap();
    service.set_current_node(child).unwrap();

    service.delete_node(root).unwrap();

    let tree = load_tree(&conn);
    assert!(tree.node(root).unwrap().deleted);
    assert!(tree.node(child).unwrap().deleted);
    assert!(tree.node(root).unwrap().deleted_at_ms.is_some());
    assert!(tree.node(child).unwrap().deleted_at_ms.is_some());
    assert!(!tree.node(bystander).unwrap().deleted);
    assert_eq!(tree.current_node_id, None);

    // Tombstones stay wired into the structure for audit and repair.
    assert_eq!(tree.node(root).unwrap().children, vec![child]);
    assert_eq!(tree.node(child).unwrap().parent_id, Some(root));
    assert_children_consistent(&tree);
}

#[test]
fn delete_node_keeps_cursor_outside_the_subtree() {
    let conn = setup();
    let service = mutation_service(&conn);

    let doomed = service.capture("doomed", None, None).unwrap();
    let kept = service.capture("kept", None, None).unwrap();
    service.set_current_node(kept).unwrap();

    service.delete_node(doomed).unwrap();
    assert_eq!(load_tree(&conn).current_node_id, Some(kept));
}

#[test]
fn set_current_node_requires_existing_active_node() {
    let conn = setup();
    let service = mutation_service(&conn);

    let node = service.capture("node", None, None).unwrap();
    service.set_current_node(node).unwrap();
    assert_eq!(load_tree(&conn).current_node_id, Some(node));

    assert!(matches!(
        service.set_current_node(99),
        Err(MutationError::NodeNotFound(99))
    ));

    service.delete_node(node).unwrap();
    assert!(matches!(
        service.set_current_node(node),
        Err(MutationError::NodeDeleted(id)) if id == node
    ));
}

#[test]
fn annotations_attach_and_detach_without_touching_structure() {
    let conn = setup();
    let service = mutation_service(&conn);

    let node = service.capture("node", None, None).unwrap();
    let annotation_id = service.add_annotation(node, "margin note").unwrap();

    let tree = load_tree(&conn);
    assert_eq!(tree.node(node).unwrap().annotations.len(), 1);
    assert_eq!(tree.node(node).unwrap().annotations[0].text, "margin note");

    service.remove_annotation(node, annotation_id).unwrap();
    assert!(load_tree(&conn).node(node).unwrap().annotations.is_empty());

    let err = service.remove_annotation(node, annotation_id).unwrap_err();
    assert!(matches!(err, MutationError::AnnotationNotFound(..)));
}

#[test]
fn shared_pathway_serializes_back_to_back_mutations() {
    // Two engine handles over the same store pathway: with last-write-wins
    // at the storage layer, serialization of the read-mutate-write spans is
    // what keeps both edits visible.
    let conn = setup();
    let store = Arc::new(Mutex::new(SqliteTreeStore::try_new(&conn).unwrap()));
    let first = MutationService::new(Arc::clone(&store));
    let second = MutationService::new(store);

    let root = first.capture("root", None, None).unwrap();
    let left = second.capture("left", None, Some(root)).unwrap();
    let right = first.capture("right", None, Some(root)).unwrap();

    let tree = load_tree(&conn);
    assert_eq!(tree.node(root).unwrap().children, vec![left, right]);
    assert_children_consistent(&tree);
}

#[test]
fn operation_sequences_never_create_cycles() {
    let conn = setup();
    let service = mutation_service(&conn);

    let a = service.capture("a", None, None).unwrap();
    let b = service.capture("b", None, Some(a)).unwrap();
    let c = service.capture("c", None, Some(b)).unwrap();
    let d = service.capture("d", None, None).unwrap();

    service.move_node(d, c).unwrap();
    assert!(service.move_node(a, d).is_err());
    assert!(service.move_node(b, d).is_err());
    service.move_node_to_root(c).unwrap();
    // c is no longer below b, so b may move under d.
    service.move_node(b, d).unwrap();

    let tree = load_tree(&conn);
    for node in &tree.nodes {
        assert!(
            node.parent_id.is_none() || !tree.is_self_or_ancestor(node.id, node.parent_id.unwrap()),
            "node {} became its own ancestor",
            node.id
        );
    }
    assert_children_consistent(&tree);
}
