//! Tree integrity repair entry point.
//!
//! # Responsibility
//! - Run the validation pass on every load that may originate outside the
//!   mutation engine's own writes (external sync overwrites in particular).
//! - Persist healed snapshots so corruption does not reappear on next load.
//!
//! # Invariants
//! - A repaired snapshot is written back with a content save, which marks
//!   local data dirty for the sync collaborator; an already-valid snapshot
//!   triggers no write at all.
//! - Every ledger entry is logged before the healed tree is persisted.

use crate::model::tree::CitationTree;
use crate::repair::{validate_and_repair, RepairOutcome};
use crate::store::tree_store::{SaveKind, StoreResult, TreeStore};
use log::{info, warn};
use std::sync::{Arc, Mutex, MutexGuard};

/// Tree validation and repair engine facade.
///
/// Shares the mutation engine's serialized store pathway, so a repair pass
/// cannot interleave with a structural edit.
pub struct RepairService<S: TreeStore> {
    store: Arc<Mutex<S>>,
}

impl<S: TreeStore> RepairService<S> {
    /// Creates the engine over a shared store pathway.
    pub fn new(store: Arc<Mutex<S>>) -> Self {
        Self { store }
    }

    /// Loads the persisted tree, heals structural corruption, and writes
    /// the healed snapshot back when anything changed.
    pub fn repair_tree_integrity(&self) -> StoreResult<RepairOutcome> {
        let store = self.lock_store();
        let tree = store.load_tree()?;
        let outcome = validate_and_repair(tree);

        if outcome.repaired {
            for action in &outcome.repairs {
                warn!("event=tree_repair module=service status=ok action={action}");
            }
            store.save_tree(&outcome.tree, SaveKind::Content)?;
        }
        info!(
            "event=tree_repair module=service status=ok repaired={} actions={}",
            outcome.repaired,
            outcome.repairs.len()
        );
        Ok(outcome)
    }

    /// Returns a structurally valid snapshot for consumers.
    ///
    /// This is the mandatory load path for anything downstream of the
    /// store (UI views, the search engine): the snapshot may have been
    /// overwritten wholesale by the sync collaborator since the last load.
    pub fn load_validated(&self) -> StoreResult<CitationTree> {
        self.repair_tree_integrity().map(|outcome| outcome.tree)
    }

    fn lock_store(&self) -> MutexGuard<'_, S> {
        match self.store.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
