//! Core domain logic for CiteTree.
//! This crate is the single source of truth for tree-structure invariants.
//!
//! The tree of captured citations is persisted as one whole document; every
//! mutation rewrites it atomically, and every load that may follow an
//! external sync overwrite is funneled through the validation/repair pass
//! before consumers see it.

pub mod db;
pub mod logging;
pub mod model;
pub mod repair;
pub mod search;
pub mod service;
pub mod store;

pub use logging::{default_log_level, init_logging, logging_status};
pub use model::node::{Annotation, AnnotationId, CitationNode, NodeId};
pub use model::tree::CitationTree;
pub use repair::{validate_and_repair, RepairAction, RepairOutcome};
pub use search::engine::{MatchOrigin, SearchEngine, SearchEntry, SearchMatch, SearchOptions};
pub use service::mutation_service::{MutationError, MutationService};
pub use service::repair_service::RepairService;
pub use store::tree_store::{SaveKind, SqliteTreeStore, StoreError, StoreResult, TreeStore};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
