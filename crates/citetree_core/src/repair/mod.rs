//! Tree validation and repair pass.
//!
//! # Responsibility
//! - Detect structural violations in a tree snapshot and heal them in place.
//! - Record every repair in an ordered ledger for observability.
//!
//! # Invariants
//! - The pass never loses a node; orphans are promoted, not dropped.
//! - Running the pass twice in succession reports no repairs the second
//!   time, for any input.
//! - A snapshot whose node set is unusable degenerates to the empty tree
//!   instead of failing.
//!
//! Snapshots can arrive from an external sync overwrite, so none of the
//! tree invariants may be assumed here.

use crate::model::node::NodeId;
use crate::model::tree::CitationTree;
use log::warn;
use std::collections::{HashMap, HashSet};
use std::fmt::{Display, Formatter};

/// One entry of the ordered repair ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepairAction {
    /// An orphan chain head lost its parent and was promoted to root.
    PromotedToRoot {
        node_id: NodeId,
        original_parent_id: NodeId,
        /// Number of nodes in the internally consistent chain hanging off
        /// the promoted head, head included.
        chain_length: usize,
    },
    /// Child ids with no matching `parent_id` back-reference were dropped
    /// from a node's child index.
    RemovedInvalidChildren { node_id: NodeId, removed: Vec<NodeId> },
    /// Child ids whose `parent_id` points at the node were missing from its
    /// child index and were appended.
    AddedMissingChildren { node_id: NodeId, added: Vec<NodeId> },
    /// The current-node cursor referenced a node absent from the set.
    ClearedInvalidCurrentNode { node_id: NodeId },
    /// The current-node cursor referenced a tombstoned node.
    ClearedDeletedCurrentNode { node_id: NodeId },
}

impl Display for RepairAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PromotedToRoot {
                node_id,
                original_parent_id,
                chain_length,
            } => write!(
                f,
                "promoted_to_root node={node_id} original_parent={original_parent_id} chain_length={chain_length}"
            ),
            Self::RemovedInvalidChildren { node_id, removed } => write!(
                f,
                "removed_invalid_children node={node_id} removed={removed:?}"
            ),
            Self::AddedMissingChildren { node_id, added } => {
                write!(f, "added_missing_children node={node_id} added={added:?}")
            }
            Self::ClearedInvalidCurrentNode { node_id } => {
                write!(f, "cleared_invalid_current_node node={node_id}")
            }
            Self::ClearedDeletedCurrentNode { node_id } => {
                write!(f, "cleared_deleted_current_node node={node_id}")
            }
        }
    }
}

/// Result of one validation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairOutcome {
    /// The structurally valid tree, possibly healed in place.
    pub tree: CitationTree,
    /// Whether any step changed the snapshot.
    pub repaired: bool,
    /// Ordered ledger of repairs performed.
    pub repairs: Vec<RepairAction>,
}

/// Validates a tree snapshot and heals structural corruption.
///
/// Steps, in order: shape check, orphan chain promotion, children-index
/// reconciliation, current-node validation. Pure over the given snapshot;
/// persistence of a repaired result is the caller's concern.
pub fn validate_and_repair(mut tree: CitationTree) -> RepairOutcome {
    // Shape check. Duplicate ids make every id-based step ambiguous, so the
    // deliberate recovery is a fresh empty tree, not a partial heal.
    if tree.has_duplicate_ids() {
        warn!(
            "event=tree_repair module=repair status=error error_code=duplicate_node_ids nodes={}",
            tree.nodes.len()
        );
        return RepairOutcome {
            tree: CitationTree::empty(),
            repaired: true,
            repairs: Vec::new(),
        };
    }

    let mut repairs = Vec::new();
    promote_orphan_chains(&mut tree, &mut repairs);
    reconcile_children(&mut tree, &mut repairs);
    validate_current_node(&mut tree, &mut repairs);

    let repaired = !repairs.is_empty();
    RepairOutcome {
        tree,
        repaired,
        repairs,
    }
}

/// Promotes each orphan to root as the head of its chain.
///
/// An orphan is a node whose `parent_id` references an id absent from the
/// set. From each unprocessed orphan the walk follows the single-child
/// `parent_id` back-reference run downward; that chain is internally
/// consistent relative to its head, so only the head needs repair.
fn promote_orphan_chains(tree: &mut CitationTree, repairs: &mut Vec<RepairAction>) {
    let ids: HashSet<NodeId> = tree.nodes.iter().map(|node| node.id).collect();
    let orphan_heads: Vec<NodeId> = tree
        .nodes
        .iter()
        .filter(|node| {
            node.parent_id
                .is_some_and(|parent_id| !ids.contains(&parent_id))
        })
        .map(|node| node.id)
        .collect();

    let mut processed: HashSet<NodeId> = HashSet::new();
    for head_id in orphan_heads {
        if processed.contains(&head_id) {
            continue;
        }

        let chain = collect_linear_chain(tree, head_id, &processed);
        processed.extend(chain.iter().copied());

        let Some(head) = tree.node_mut(head_id) else {
            continue;
        };
        let Some(original_parent_id) = head.parent_id else {
            continue;
        };
        head.parent_id = None;
        repairs.push(RepairAction::PromotedToRoot {
            node_id: head_id,
            original_parent_id,
            chain_length: chain.len(),
        });
    }
}

/// Collects the strictly linear run descending from `head_id`.
///
/// The walk extends only while exactly one node points back at the current
/// chain tail; branching ends the chain, and sibling orphans under the same
/// missing parent each head their own chain.
fn collect_linear_chain(
    tree: &CitationTree,
    head_id: NodeId,
    processed: &HashSet<NodeId>,
) -> Vec<NodeId> {
    let mut chain = vec![head_id];
    let mut seen: HashSet<NodeId> = chain.iter().copied().collect();
    let mut cursor = head_id;
    loop {
        let mut back_references = tree
            .nodes
            .iter()
            .filter(|node| node.parent_id == Some(cursor))
            .map(|node| node.id);
        let Some(next) = back_references.next() else {
            break;
        };
        if back_references.next().is_some() {
            break;
        }
        if processed.contains(&next) || !seen.insert(next) {
            break;
        }
        chain.push(next);
        cursor = next;
    }
    chain
}

/// Recomputes every node's child index from `parent_id` back-references.
///
/// Idempotent and order-independent per node: surviving entries keep their
/// relative order, missing entries are appended in node-set order.
fn reconcile_children(tree: &mut CitationTree, repairs: &mut Vec<RepairAction>) {
    let mut expected: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
    for node in &tree.nodes {
        if let Some(parent_id) = node.parent_id {
            expected.entry(parent_id).or_default().push(node.id);
        }
    }

    for index in 0..tree.nodes.len() {
        let node_id = tree.nodes[index].id;
        let expected_children = expected.remove(&node_id).unwrap_or_default();
        let expected_set: HashSet<NodeId> = expected_children.iter().copied().collect();

        let mut removed = Vec::new();
        let mut kept = Vec::new();
        let mut kept_set = HashSet::new();
        for &child_id in &tree.nodes[index].children {
            // Duplicate entries count as invalid: the index must be a set.
            if expected_set.contains(&child_id) && kept_set.insert(child_id) {
                kept.push(child_id);
            } else {
                removed.push(child_id);
            }
        }

        let added: Vec<NodeId> = expected_children
            .iter()
            .copied()
            .filter(|child_id| !kept_set.contains(child_id))
            .collect();
        kept.extend(added.iter().copied());

        if !removed.is_empty() {
            repairs.push(RepairAction::RemovedInvalidChildren { node_id, removed });
        }
        if !added.is_empty() {
            repairs.push(RepairAction::AddedMissingChildren { node_id, added });
        }
        tree.nodes[index].children = kept;
    }
}

/// Clears the current-node cursor when it dangles or points at a tombstone.
fn validate_current_node(tree: &mut CitationTree, repairs: &mut Vec<RepairAction>) {
    let Some(current_id) = tree.current_node_id else {
        return;
    };
    let action = match tree.node(current_id) {
        None => Some(RepairAction::ClearedInvalidCurrentNode { node_id: current_id }),
        Some(node) if node.deleted => {
            Some(RepairAction::ClearedDeletedCurrentNode { node_id: current_id })
        }
        Some(_) => None,
    };
    if let Some(action) = action {
        tree.current_node_id = None;
        repairs.push(action);
    }
}
