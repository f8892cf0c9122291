//! Tree mutation engine.
//!
//! # Responsibility
//! - Perform structural edits that preserve the tree invariants.
//! - Persist the whole tree atomically after every successful edit.
//!
//! # Invariants
//! - Operations are all-or-nothing: preconditions are checked before any
//!   mutation, and nothing is persisted on failure.
//! - Move operations must not create parent-child cycles.
//! - Deletion cascades tombstones over the full descendant subtree and
//!   keeps the structure wired for audit and repair.
//! - Each operation holds the shared store lock across its whole
//!   read-mutate-write span, so concurrent callers cannot lose updates.

use crate::model::node::{Annotation, AnnotationId, CitationNode, NodeId};
use crate::model::now_epoch_ms;
use crate::model::tree::CitationTree;
use crate::store::tree_store::{SaveKind, StoreError, TreeStore};
use log::warn;
use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex, MutexGuard};

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid ws regex"));
static URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^https?://\S+$").expect("valid url regex"));

/// Errors from tree mutation operations.
///
/// Every variant is a signaled failure: the tree in storage is unchanged
/// and the caller may treat the operation as having had no effect.
#[derive(Debug)]
pub enum MutationError {
    /// Referenced node does not exist in the tree.
    NodeNotFound(NodeId),
    /// Move would make a node its own ancestor.
    CycleDetected {
        dragged_id: NodeId,
        target_id: NodeId,
    },
    /// Shift requires a parent, but the node is root-level.
    NodeHasNoParent(NodeId),
    /// Target node exists but is tombstoned.
    NodeDeleted(NodeId),
    /// Referenced annotation does not exist on the node.
    AnnotationNotFound(NodeId, AnnotationId),
    /// Captured text is blank after normalization.
    EmptyCaptureText,
    /// Persistence-layer failure; the in-memory mutation was discarded.
    Store(StoreError),
}

impl Display for MutationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NodeNotFound(id) => write!(f, "citation node not found: {id}"),
            Self::CycleDetected {
                dragged_id,
                target_id,
            } => write!(
                f,
                "move would create cycle: node {dragged_id} under target {target_id}"
            ),
            Self::NodeHasNoParent(id) => write!(f, "citation node has no parent: {id}"),
            Self::NodeDeleted(id) => write!(f, "citation node is deleted: {id}"),
            Self::AnnotationNotFound(node_id, annotation_id) => write!(
                f,
                "annotation {annotation_id} not found on node {node_id}"
            ),
            Self::EmptyCaptureText => write!(f, "captured text must not be blank"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for MutationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoreError> for MutationError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

/// Tree mutation engine facade.
///
/// Shares one serialized store pathway with the repair engine; construct
/// both from the same `Arc<Mutex<_>>` so every read-mutate-write span is
/// exclusive.
pub struct MutationService<S: TreeStore> {
    store: Arc<Mutex<S>>,
}

impl<S: TreeStore> MutationService<S> {
    /// Creates the engine over a shared store pathway.
    pub fn new(store: Arc<Mutex<S>>) -> Self {
        Self { store }
    }

    /// Captures a new citation node under an optional existing parent.
    ///
    /// Text is whitespace-normalized; a capture that is itself a bare URL
    /// doubles as the node's provenance URL when none was given. Returns
    /// the assigned id from the tree's monotonic counter.
    pub fn capture(
        &self,
        text: impl Into<String>,
        url: Option<String>,
        parent_id: Option<NodeId>,
    ) -> Result<NodeId, MutationError> {
        let normalized = normalize_capture_text(text.into()).ok_or_else(|| {
            warn!("event=tree_mutate module=service op=capture status=rejected reason=blank_text");
            MutationError::EmptyCaptureText
        })?;

        let store = self.lock_store();
        let mut tree = store.load_tree()?;

        if let Some(parent_id) = parent_id {
            let parent = tree
                .node(parent_id)
                .ok_or(MutationError::NodeNotFound(parent_id))?;
            if parent.deleted {
                return Err(MutationError::NodeDeleted(parent_id));
            }
        }

        let id = tree.next_node_id();
        let url = url.or_else(|| {
            URL_RE
                .is_match(&normalized)
                .then(|| normalized.clone())
        });
        tree.nodes
            .push(CitationNode::new(id, normalized, url, parent_id, now_epoch_ms()));
        if let Some(parent_id) = parent_id {
            if let Some(parent) = tree.node_mut(parent_id) {
                parent.children.push(id);
            }
        }

        store.save_tree(&tree, SaveKind::Content)?;
        Ok(id)
    }

    /// Attaches `dragged_id` as a child of `target_id`.
    ///
    /// Rejected when either id is missing, or when `dragged_id` appears on
    /// the ancestor chain of `target_id`. Equal ids count as an immediate
    /// cycle. Nothing is persisted on rejection.
    pub fn move_node(&self, dragged_id: NodeId, target_id: NodeId) -> Result<(), MutationError> {
        let store = self.lock_store();
        let mut tree = store.load_tree()?;

        if !tree.contains(dragged_id) {
            return Err(MutationError::NodeNotFound(dragged_id));
        }
        if !tree.contains(target_id) {
            return Err(MutationError::NodeNotFound(target_id));
        }
        if tree.is_self_or_ancestor(dragged_id, target_id) {
            warn!(
                "event=tree_mutate module=service op=move_node status=rejected reason=cycle dragged={dragged_id} target={target_id}"
            );
            return Err(MutationError::CycleDetected {
                dragged_id,
                target_id,
            });
        }

        detach_from_parent(&mut tree, dragged_id);
        if let Some(target) = tree.node_mut(target_id) {
            // Idempotent insert: a stale child entry must not duplicate.
            if !target.children.contains(&dragged_id) {
                target.children.push(dragged_id);
            }
        }
        if let Some(dragged) = tree.node_mut(dragged_id) {
            dragged.parent_id = Some(target_id);
        }

        store.save_tree(&tree, SaveKind::Content)?;
        Ok(())
    }

    /// Detaches a node from its parent and makes it a root.
    pub fn move_node_to_root(&self, node_id: NodeId) -> Result<(), MutationError> {
        let store = self.lock_store();
        let mut tree = store.load_tree()?;

        if !tree.contains(node_id) {
            return Err(MutationError::NodeNotFound(node_id));
        }

        detach_from_parent(&mut tree, node_id);
        if let Some(node) = tree.node_mut(node_id) {
            node.parent_id = None;
        }

        store.save_tree(&tree, SaveKind::Content)?;
        Ok(())
    }

    /// Promotes a node to its grandparent's level.
    ///
    /// The node leaves its parent's child list and joins the grandparent's;
    /// with no grandparent it becomes a root. Fails when the node has no
    /// parent to shift out of.
    pub fn shift_node_to_parent(&self, node_id: NodeId) -> Result<(), MutationError> {
        let store = self.lock_store();
        let mut tree = store.load_tree()?;

        let node = tree
            .node(node_id)
            .ok_or(MutationError::NodeNotFound(node_id))?;
        let Some(parent_id) = node.parent_id else {
            warn!(
                "event=tree_mutate module=service op=shift_node_to_parent status=rejected reason=no_parent node={node_id}"
            );
            return Err(MutationError::NodeHasNoParent(node_id));
        };
        let grandparent_id = tree.node(parent_id).and_then(|parent| parent.parent_id);

        detach_from_parent(&mut tree, node_id);
        if let Some(grandparent_id) = grandparent_id {
            if let Some(grandparent) = tree.node_mut(grandparent_id) {
                if !grandparent.children.contains(&node_id) {
                    grandparent.children.push(node_id);
                }
            }
        }
        if let Some(node) = tree.node_mut(node_id) {
            node.parent_id = grandparent_id;
        }

        store.save_tree(&tree, SaveKind::Content)?;
        Ok(())
    }

    /// Soft-deletes a node and its entire descendant subtree.
    ///
    /// Tombstones stay wired into `children` arrays and keep their
    /// `parent_id` pointers, so audit and repair remain possible. Clears
    /// the current-node cursor when it falls inside the deleted subtree.
    pub fn delete_node(&self, node_id: NodeId) -> Result<(), MutationError> {
        let store = self.lock_store();
        let mut tree = store.load_tree()?;

        if !tree.contains(node_id) {
            return Err(MutationError::NodeNotFound(node_id));
        }

        let deleted_at = now_epoch_ms();
        let subtree = tree.subtree_ids(node_id);
        for &id in &subtree {
            if let Some(node) = tree.node_mut(id) {
                node.soft_delete(deleted_at);
            }
        }
        if tree
            .current_node_id
            .is_some_and(|current| subtree.contains(&current))
        {
            tree.current_node_id = None;
        }

        store.save_tree(&tree, SaveKind::Content)?;
        Ok(())
    }

    /// Moves the current-node cursor.
    ///
    /// A cursor move is UI-only: it persists, but must not mark local data
    /// dirty for the sync collaborator.
    pub fn set_current_node(&self, node_id: NodeId) -> Result<(), MutationError> {
        let store = self.lock_store();
        let mut tree = store.load_tree()?;

        let node = tree
            .node(node_id)
            .ok_or(MutationError::NodeNotFound(node_id))?;
        if node.deleted {
            return Err(MutationError::NodeDeleted(node_id));
        }

        tree.current_node_id = Some(node_id);
        store.save_tree(&tree, SaveKind::UiOnly)?;
        Ok(())
    }

    /// Appends an annotation to an active node.
    pub fn add_annotation(
        &self,
        node_id: NodeId,
        text: impl Into<String>,
    ) -> Result<AnnotationId, MutationError> {
        let store = self.lock_store();
        let mut tree = store.load_tree()?;

        let node = tree
            .node_mut(node_id)
            .ok_or(MutationError::NodeNotFound(node_id))?;
        if node.deleted {
            return Err(MutationError::NodeDeleted(node_id));
        }

        let annotation = Annotation::new(text, now_epoch_ms());
        let annotation_id = annotation.id;
        node.annotations.push(annotation);

        store.save_tree(&tree, SaveKind::Content)?;
        Ok(annotation_id)
    }

    /// Removes one annotation from a node.
    pub fn remove_annotation(
        &self,
        node_id: NodeId,
        annotation_id: AnnotationId,
    ) -> Result<(), MutationError> {
        let store = self.lock_store();
        let mut tree = store.load_tree()?;

        let node = tree
            .node_mut(node_id)
            .ok_or(MutationError::NodeNotFound(node_id))?;
        let before = node.annotations.len();
        node.annotations
            .retain(|annotation| annotation.id != annotation_id);
        if node.annotations.len() == before {
            return Err(MutationError::AnnotationNotFound(node_id, annotation_id));
        }

        store.save_tree(&tree, SaveKind::Content)?;
        Ok(())
    }

    fn lock_store(&self) -> MutexGuard<'_, S> {
        // A poisoned guard still wraps a usable store: tree state lives in
        // storage, never partially in the guard.
        match self.store.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Removes a node from its parent's child index, if it has a parent.
fn detach_from_parent(tree: &mut CitationTree, node_id: NodeId) {
    let Some(parent_id) = tree.node(node_id).and_then(|node| node.parent_id) else {
        return;
    };
    if let Some(parent) = tree.node_mut(parent_id) {
        parent.children.retain(|&child_id| child_id != node_id);
    }
}

/// Collapses runs of whitespace and trims; returns `None` for blank input.
fn normalize_capture_text(raw: String) -> Option<String> {
    let collapsed = WHITESPACE_RE.replace_all(raw.trim(), " ").into_owned();
    if collapsed.is_empty() {
        return None;
    }
    Some(collapsed)
}

#[cfg(test)]
mod tests {
    use super::normalize_capture_text;

    #[test]
    fn capture_text_is_whitespace_collapsed() {
        assert_eq!(
            normalize_capture_text("  a\n  b\t c  ".to_string()),
            Some("a b c".to_string())
        );
    }

    #[test]
    fn blank_capture_text_is_rejected() {
        assert_eq!(normalize_capture_text(" \n\t ".to_string()), None);
    }
}
