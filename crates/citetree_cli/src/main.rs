//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `citetree_core` linkage.
//! - Keep output deterministic for quick local sanity checks.

use citetree_core::db::open_db_in_memory;
use citetree_core::{RepairService, SqliteTreeStore};
use std::error::Error;
use std::sync::{Arc, Mutex};

fn main() -> Result<(), Box<dyn Error>> {
    println!("citetree_core version={}", citetree_core::core_version());

    // Tiny end-to-end probe: bootstrap storage, run the validated load
    // path once, report the (empty) snapshot.
    let conn = open_db_in_memory()?;
    let store = Arc::new(Mutex::new(SqliteTreeStore::try_new(&conn)?));
    let repair = RepairService::new(store);
    let tree = repair.load_validated()?;
    println!(
        "citetree_core snapshot nodes={} current={:?}",
        tree.nodes.len(),
        tree.current_node_id
    );
    Ok(())
}
