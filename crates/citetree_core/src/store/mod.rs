//! Persistence accessor layer for the citation tree.
//!
//! # Responsibility
//! - Define the whole-tree load/save contract used by the engines.
//! - Isolate SQLite key-value details from service orchestration.
//!
//! # Invariants
//! - The tree is read and written as one atomic document, never per-field.
//! - A missing or undecodable snapshot degrades to the empty tree; it is
//!   never surfaced as a hard failure.

pub mod tree_store;
