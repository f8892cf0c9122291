//! Citation node domain model.
//!
//! # Responsibility
//! - Define the captured citation record and its annotation sub-records.
//! - Provide lifecycle helpers for soft-delete semantics.
//!
//! # Invariants
//! - `id` is unique within a tree and never reused after deletion.
//! - `parent_id` is the single source of truth for hierarchy; `children` is a
//!   derived index kept in sync by the mutation and repair engines.
//! - `deleted` is the source of truth for tombstone state.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier for a citation node within one tree.
///
/// Assigned from the tree's monotonic counter; tombstoned nodes keep their
/// id occupied, so ids are never recycled.
pub type NodeId = u64;

/// Stable identifier for one annotation on a node.
pub type AnnotationId = Uuid;

/// Free-form annotation attached to a citation node.
///
/// Annotations are independently mutable and take no part in tree-shape
/// invariants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Annotation {
    /// Stable annotation id.
    pub id: AnnotationId,
    /// Annotation body.
    pub text: String,
    /// Creation time in epoch milliseconds.
    #[serde(rename = "timestamp")]
    pub timestamp_ms: i64,
}

impl Annotation {
    /// Creates an annotation with a generated stable id.
    pub fn new(text: impl Into<String>, timestamp_ms: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            timestamp_ms,
        }
    }
}

/// Captured citation record, the unit of the tree.
///
/// The field names serialize in camelCase because this in-memory shape is
/// also the persistence and sync wire shape, handed to the store verbatim.
/// Snapshots arriving from the sync collaborator may omit fields, so every
/// structural field decodes from a missing value via `serde(default)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CitationNode {
    /// Unique id within the owning tree.
    pub id: NodeId,
    /// Captured text content. Immutable after creation.
    pub text: String,
    /// Source URL provenance. Opaque to structural logic.
    #[serde(default)]
    pub url: Option<String>,
    /// Capture time in epoch milliseconds. Opaque to structural logic.
    #[serde(rename = "timestamp", default)]
    pub timestamp_ms: i64,
    /// Parent node id. `None` means root-level node.
    #[serde(default)]
    pub parent_id: Option<NodeId>,
    /// Derived child index. Must always equal the set of ids whose
    /// `parent_id` points back at this node.
    #[serde(default)]
    pub children: Vec<NodeId>,
    /// Soft-delete tombstone flag.
    #[serde(default)]
    pub deleted: bool,
    /// Tombstoning time in epoch milliseconds.
    #[serde(rename = "deletedAt", default)]
    pub deleted_at_ms: Option<i64>,
    /// Ordered annotation list.
    #[serde(default)]
    pub annotations: Vec<Annotation>,
}

impl CitationNode {
    /// Creates a new node with empty children and no tombstone.
    pub fn new(
        id: NodeId,
        text: impl Into<String>,
        url: Option<String>,
        parent_id: Option<NodeId>,
        timestamp_ms: i64,
    ) -> Self {
        Self {
            id,
            text: text.into(),
            url,
            timestamp_ms,
            parent_id,
            children: Vec::new(),
            deleted: false,
            deleted_at_ms: None,
            annotations: Vec::new(),
        }
    }

    /// Marks this node as softly deleted (tombstoned) at the given time.
    pub fn soft_delete(&mut self, deleted_at_ms: i64) {
        self.deleted = true;
        self.deleted_at_ms = Some(deleted_at_ms);
    }

    /// Returns whether this node should appear in visible tree views.
    pub fn is_active(&self) -> bool {
        !self.deleted
    }
}
