//! Citation tree aggregate.
//!
//! # Responsibility
//! - Hold the whole-document node set plus the current-node cursor.
//! - Provide index-based traversal helpers shared by mutation and repair.
//!
//! # Invariants
//! - Node ids are unique; traversal never follows pointers, only ids looked
//!   up in the flat node set.
//! - Ancestor and subtree walks are visited-set guarded so they terminate
//!   even on corrupt snapshots that contain cycles.

use crate::model::node::{CitationNode, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Whole-tree aggregate, rewritten as a unit on every mutating operation.
///
/// Serializes in camelCase: this is the exact shape handed to the store and
/// to the external sync collaborator, with no separate encoding step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CitationTree {
    /// Flat node set, including tombstoned nodes.
    #[serde(default)]
    pub nodes: Vec<CitationNode>,
    /// Cursor over the most recently focused non-deleted node.
    #[serde(default)]
    pub current_node_id: Option<NodeId>,
}

impl CitationTree {
    /// Creates an empty tree.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns whether a node with the given id exists, tombstoned or not.
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.iter().any(|node| node.id == id)
    }

    /// Looks up one node by id.
    pub fn node(&self, id: NodeId) -> Option<&CitationNode> {
        self.nodes.iter().find(|node| node.id == id)
    }

    /// Looks up one node by id for mutation.
    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut CitationNode> {
        self.nodes.iter_mut().find(|node| node.id == id)
    }

    /// Returns the next id from the monotonic counter.
    ///
    /// Tombstones keep their ids occupied, so deleted nodes still advance
    /// the counter and ids are never reused.
    pub fn next_node_id(&self) -> NodeId {
        self.nodes.iter().map(|node| node.id).max().map_or(1, |id| id + 1)
    }

    /// Builds an id -> node-index map for repeated lookups.
    pub fn id_index(&self) -> HashMap<NodeId, usize> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(index, node)| (node.id, index))
            .collect()
    }

    /// Returns whether any id appears more than once in the node set.
    pub fn has_duplicate_ids(&self) -> bool {
        let mut seen = HashSet::new();
        self.nodes.iter().any(|node| !seen.insert(node.id))
    }

    /// Returns whether `candidate` appears on the ancestor chain of `id`,
    /// including `id` itself.
    ///
    /// The walk follows `parent_id` links upward and stops on missing
    /// parents or revisited ids, so it terminates on corrupt input.
    pub fn is_self_or_ancestor(&self, candidate: NodeId, id: NodeId) -> bool {
        let index = self.id_index();
        let mut visited = HashSet::new();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            if current == candidate {
                return true;
            }
            if !visited.insert(current) {
                return false;
            }
            cursor = index
                .get(&current)
                .and_then(|&node_index| self.nodes[node_index].parent_id);
        }
        false
    }

    /// Collects `root_id` plus every transitive descendant reachable over
    /// `children` links. Order is unspecified.
    pub fn subtree_ids(&self, root_id: NodeId) -> Vec<NodeId> {
        let index = self.id_index();
        let mut collected = Vec::new();
        let mut visited = HashSet::new();
        let mut queue = vec![root_id];
        while let Some(current) = queue.pop() {
            if !visited.insert(current) {
                continue;
            }
            let Some(&node_index) = index.get(&current) else {
                continue;
            };
            collected.push(current);
            queue.extend(self.nodes[node_index].children.iter().copied());
        }
        collected
    }

    /// Returns the active (non-tombstoned) nodes in set order.
    pub fn visible_nodes(&self) -> Vec<&CitationNode> {
        self.nodes.iter().filter(|node| node.is_active()).collect()
    }
}
