#![forbid(unsafe_code)]

use super::StoreError;
use mptt_core::{Identifier, TreeSpec};
use rusqlite::Connection;
use std::collections::BTreeSet;

pub(crate) const NODE_COLUMNS: [&str; 5] = ["id", "old_parent", "is_group", "lft", "rgt"];

/// Identifiers are validated on construction; quoting keeps keywords usable.
pub(crate) fn quote(ident: &Identifier) -> String {
    format!("\"{}\"", ident.as_str())
}

pub(crate) fn install_tree(conn: &Connection, spec: &TreeSpec) -> Result<(), StoreError> {
    let table = quote(spec.tree_type());
    let parent = quote(spec.parent_field());
    let lft_index = format!("\"{}_lft_rgt\"", spec.tree_type());
    let parent_index = format!("\"{}_{}\"", spec.tree_type(), spec.parent_field());

    conn.execute_batch(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS {table} (
          id TEXT PRIMARY KEY,
          {parent} TEXT,
          old_parent TEXT,
          is_group INTEGER NOT NULL DEFAULT 0,
          lft INTEGER,
          rgt INTEGER,
          CHECK(lft IS NULL OR rgt IS NULL OR lft < rgt OR (lft = 0 AND rgt = 0))
        );

        CREATE INDEX IF NOT EXISTS {lft_index} ON {table}(lft, rgt);
        CREATE INDEX IF NOT EXISTS {parent_index} ON {table}({parent});
        "#
    ))?;
    Ok(())
}

/// Refuses a table that lacks any column the engine reads or writes.
pub(crate) fn preflight_tree(conn: &Connection, spec: &TreeSpec) -> Result<(), StoreError> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote(spec.tree_type())))?;
    let mut rows = stmt.query([])?;
    let mut columns = BTreeSet::new();
    while let Some(row) = rows.next()? {
        columns.insert(row.get::<_, String>(1)?);
    }

    if columns.is_empty() {
        return Err(StoreError::MissingTable(spec.tree_type().to_string()));
    }

    let required = NODE_COLUMNS
        .into_iter()
        .chain(std::iter::once(spec.parent_field().as_str()));
    for column in required {
        if !columns.contains(column) {
            return Err(StoreError::MissingColumn {
                table: spec.tree_type().to_string(),
                column: column.to_string(),
            });
        }
    }
    Ok(())
}
