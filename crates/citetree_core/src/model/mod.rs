//! Domain model for the citation tree.
//!
//! # Responsibility
//! - Define canonical data structures used by core business logic.
//! - Keep one flat, id-indexed node set as the single ownership shape.
//!
//! # Invariants
//! - Every domain object is identified by a stable `NodeId`.
//! - Deletion is represented by soft-delete tombstones, not hard delete.

pub mod node;
pub mod tree;

use std::time::{SystemTime, UNIX_EPOCH};

/// Returns the current wall-clock time in epoch milliseconds.
///
/// Clamps to zero on clocks set before the epoch rather than failing; the
/// timestamp is provenance metadata, not load-bearing for structure.
pub fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_millis() as i64)
}
