//! Tree store contracts and SQLite key-value implementation.
//!
//! # Responsibility
//! - Persist the whole citation tree atomically as one JSON document.
//! - Track the sync-dirty marker consumed by the sync collaborator.
//!
//! # Invariants
//! - `SaveKind::Content` saves raise the sync-dirty marker; UI-only saves
//!   (cursor moves) leave it untouched.
//! - Loading an absent or malformed snapshot yields the empty tree and a
//!   logged error, never a propagated failure.

use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::tree::CitationTree;
use log::{error, info};
use rusqlite::{params, Connection, OptionalExtension};
use std::error::Error;
use std::fmt::{Display, Formatter};

const TREE_KEY: &str = "citation_tree";
const SYNC_DIRTY_KEY: &str = "sync_dirty";

/// Result type used by tree store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors from tree store operations.
#[derive(Debug)]
pub enum StoreError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Tree snapshot could not be serialized for persistence.
    Serialize(serde_json::Error),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Serialize(err) => write!(f, "failed to serialize tree snapshot: {err}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "tree store requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "tree store requires table `{table}`")
            }
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Serialize(err) => Some(err),
            Self::UninitializedConnection { .. } => None,
            Self::MissingRequiredTable(_) => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialize(value)
    }
}

/// Classifies a save for the sync collaborator's dirty-tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveKind {
    /// Genuine content change; marks local data dirty for the next sync.
    Content,
    /// Cursor-only change; must not trigger a sync upload.
    UiOnly,
}

/// Store interface for whole-tree persistence.
pub trait TreeStore {
    /// Loads the current tree snapshot, defaulting to the empty tree when
    /// nothing was persisted yet.
    fn load_tree(&self) -> StoreResult<CitationTree>;
    /// Persists the whole tree atomically.
    fn save_tree(&self, tree: &CitationTree, kind: SaveKind) -> StoreResult<()>;
}

/// SQLite-backed tree store over the `tree_store` key-value table.
#[derive(Debug)]
pub struct SqliteTreeStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteTreeStore<'conn> {
    /// Creates a store from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> StoreResult<Self> {
        ensure_store_connection_ready(conn)?;
        Ok(Self { conn })
    }

    /// Returns whether a content save happened since the last sync cycle.
    pub fn sync_dirty(&self) -> StoreResult<bool> {
        let value: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM tree_store WHERE key = ?1;",
                [SYNC_DIRTY_KEY],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value.as_deref() == Some("1"))
    }

    /// Clears the sync-dirty marker after a completed sync cycle.
    pub fn clear_sync_dirty(&self) -> StoreResult<()> {
        self.set_value(SYNC_DIRTY_KEY, "0")
    }

    fn set_value(&self, key: &str, value: &str) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO tree_store (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET
                 value = excluded.value,
                 updated_at = (strftime('%s', 'now') * 1000);",
            params![key, value],
        )?;
        Ok(())
    }
}

impl TreeStore for SqliteTreeStore<'_> {
    fn load_tree(&self) -> StoreResult<CitationTree> {
        let payload: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM tree_store WHERE key = ?1;",
                [TREE_KEY],
                |row| row.get(0),
            )
            .optional()?;

        let Some(payload) = payload else {
            info!("event=tree_load module=store status=ok source=empty");
            return Ok(CitationTree::empty());
        };

        match serde_json::from_str::<CitationTree>(&payload) {
            Ok(tree) => {
                info!(
                    "event=tree_load module=store status=ok nodes={}",
                    tree.nodes.len()
                );
                Ok(tree)
            }
            Err(err) => {
                // An external sync overwrite can leave an undecodable
                // payload behind; recovery is the empty tree, not a failure.
                error!(
                    "event=tree_load module=store status=error error_code=malformed_snapshot error={err}"
                );
                Ok(CitationTree::empty())
            }
        }
    }

    fn save_tree(&self, tree: &CitationTree, kind: SaveKind) -> StoreResult<()> {
        let payload = serde_json::to_string(tree)?;
        self.set_value(TREE_KEY, &payload)?;
        if kind == SaveKind::Content {
            self.set_value(SYNC_DIRTY_KEY, "1")?;
        }
        info!(
            "event=tree_save module=store status=ok kind={} nodes={}",
            match kind {
                SaveKind::Content => "content",
                SaveKind::UiOnly => "ui_only",
            },
            tree.nodes.len()
        );
        Ok(())
    }
}

fn ensure_store_connection_ready(conn: &Connection) -> StoreResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(StoreError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = 'tree_store'
        );",
        [],
        |row| row.get(0),
    )?;
    if exists != 1 {
        return Err(StoreError::MissingRequiredTable("tree_store"));
    }

    Ok(())
}
