#![forbid(unsafe_code)]

mod error;
mod schema;
mod tx;

pub use error::StoreError;
pub use tx::SqliteTreeTx;

use mptt_core::{NestedSet, TreeSpec, TreeStorage, TxMode};
use rusqlite::{Connection, TransactionBehavior};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

pub const DB_FILE: &str = "mptt.db";

/// One SQLite database holding any number of tree tables, one per tree type.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
    storage_dir: Option<PathBuf>,
    trees: BTreeMap<String, TreeSpec>,
}

impl SqliteStore {
    pub fn open(storage_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let storage_dir = storage_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&storage_dir)?;

        let db_path = storage_dir.join(DB_FILE);
        let conn = Connection::open(&db_path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")?;

        info!(path = %db_path.display(), "tree store opened");
        Ok(Self {
            conn,
            storage_dir: Some(storage_dir),
            trees: BTreeMap::new(),
        })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self {
            conn,
            storage_dir: None,
            trees: BTreeMap::new(),
        })
    }

    pub fn storage_dir(&self) -> Option<&Path> {
        self.storage_dir.as_deref()
    }

    /// Creates the table for `spec` if missing, then registers it.
    pub fn install_tree(&mut self, spec: TreeSpec) -> Result<(), StoreError> {
        schema::install_tree(&self.conn, &spec)?;
        info!(tree = %spec.tree_type(), parent = %spec.parent_field(), "tree table installed");
        self.register_tree(spec)
    }

    /// Registers a table owned by someone else. Fails closed when a column
    /// the engine needs is missing.
    pub fn register_tree(&mut self, spec: TreeSpec) -> Result<(), StoreError> {
        schema::preflight_tree(&self.conn, &spec)?;
        self.trees.insert(spec.tree_type().to_string(), spec);
        Ok(())
    }

    pub fn tree_spec(&self, tree_type: &str) -> Result<&TreeSpec, StoreError> {
        self.trees
            .get(tree_type)
            .ok_or_else(|| StoreError::UnknownTree(tree_type.to_string()))
    }

    pub fn tree(&mut self, tree_type: &str) -> Result<NestedSet<'_, Self>, StoreError> {
        let spec = self.tree_spec(tree_type)?.clone();
        Ok(NestedSet::new(self, spec))
    }

    pub fn trees(&self) -> impl Iterator<Item = &TreeSpec> {
        self.trees.values()
    }
}

impl TreeStorage for SqliteStore {
    type Error = StoreError;
    type Tx<'a> = SqliteTreeTx<'a>;

    fn begin(&mut self, spec: &TreeSpec, mode: TxMode) -> Result<SqliteTreeTx<'_>, StoreError> {
        let behavior = match mode {
            TxMode::Write => TransactionBehavior::Immediate,
            TxMode::Read => TransactionBehavior::Deferred,
        };
        let tx = self.conn.transaction_with_behavior(behavior)?;
        Ok(SqliteTreeTx::new(tx, spec, mode))
    }
}
