#![forbid(unsafe_code)]

use super::StoreError;
use super::schema::quote;
use mptt_core::tree::{Lock, Order, RangePredicate, ShiftPlan};
use mptt_core::{Bounds, Node, NodeId, TreeSpec, TreeTx, TxMode};
use rusqlite::types::Value;
use rusqlite::{Row, Transaction, params, params_from_iter};
use tracing::debug;

/// A rusqlite transaction bound to one tree table. Write transactions are
/// opened `IMMEDIATE`, so the database write lock is held from the first
/// read until commit or rollback.
pub struct SqliteTreeTx<'a> {
    tx: Transaction<'a>,
    mode: TxMode,
    table: String,
    parent: String,
}

impl<'a> SqliteTreeTx<'a> {
    pub(crate) fn new(tx: Transaction<'a>, spec: &TreeSpec, mode: TxMode) -> Self {
        Self {
            tx,
            mode,
            table: quote(spec.tree_type()),
            parent: quote(spec.parent_field()),
        }
    }

    fn select_columns(&self) -> String {
        format!(
            "SELECT id, {parent}, old_parent, is_group, lft, rgt FROM {table}",
            parent = self.parent,
            table = self.table
        )
    }

    fn write_guard(&self) -> Result<(), StoreError> {
        if self.mode == TxMode::Read {
            return Err(StoreError::InvalidInput(
                "write attempted in a read-only transaction",
            ));
        }
        Ok(())
    }

    fn render(&self, predicate: &RangePredicate) -> (String, Vec<Value>) {
        let range = |sql: &str, bounds: &Bounds| {
            (
                sql.to_string(),
                vec![Value::Integer(bounds.lft()), Value::Integer(bounds.rgt())],
            )
        };
        match predicate {
            RangePredicate::All => ("1 = 1".to_string(), Vec::new()),
            RangePredicate::Placed => (
                "NOT (COALESCE(lft, 0) = 0 AND COALESCE(rgt, 0) = 0)".to_string(),
                Vec::new(),
            ),
            RangePredicate::Node(id) => ("id = ?".to_string(), vec![text(id)]),
            RangePredicate::Subtree(b) => range("lft >= ? AND rgt <= ?", b),
            RangePredicate::Descendants(b) => range("lft > ? AND rgt < ?", b),
            RangePredicate::Ancestors(b) => range("lft < ? AND rgt > ?", b),
            RangePredicate::AncestorsOrSelf(b) => range("lft <= ? AND rgt >= ?", b),
            RangePredicate::ChildrenOf(id) => (format!("{} = ?", self.parent), vec![text(id)]),
            RangePredicate::Roots => (
                format!("({p} IS NULL OR {p} = '')", p = self.parent),
                Vec::new(),
            ),
            RangePredicate::Occupies(value) => (
                "(lft = ?1 OR rgt = ?1)".to_string(),
                vec![Value::Integer(*value)],
            ),
        }
    }
}

fn text(id: &NodeId) -> Value {
    Value::Text(id.as_str().to_string())
}

fn optional_text(id: Option<&NodeId>) -> Value {
    id.map_or(Value::Null, text)
}

fn order_clause(order: Order) -> &'static str {
    match order {
        Order::LftAsc => "ORDER BY lft ASC, id ASC",
        Order::LftDesc => "ORDER BY lft DESC, id DESC",
        Order::IdAsc => "ORDER BY id ASC",
    }
}

fn to_sqlite_i64(value: usize) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|_| StoreError::InvalidInput("value exceeds sqlite integer range"))
}

fn to_count(value: i64) -> Result<usize, StoreError> {
    usize::try_from(value).map_err(|_| StoreError::InvalidInput("negative row count"))
}

fn parse_parent(value: Option<String>) -> Result<Option<NodeId>, StoreError> {
    match value {
        None => Ok(None),
        Some(value) if value.trim().is_empty() => Ok(None),
        Some(value) => NodeId::try_new(value)
            .map(Some)
            .map_err(|_| StoreError::InvalidInput("invalid parent row")),
    }
}

fn node_from_row(row: &Row<'_>) -> Result<Node, StoreError> {
    let id = NodeId::try_new(row.get::<_, String>(0)?)
        .map_err(|_| StoreError::InvalidInput("invalid node id row"))?;
    Ok(Node {
        id,
        parent: parse_parent(row.get(1)?)?,
        old_parent: parse_parent(row.get(2)?)?,
        is_group: row.get::<_, i64>(3)? != 0,
        bounds: Bounds::from_columns(row.get(4)?, row.get(5)?)?,
    })
}

impl TreeTx for SqliteTreeTx<'_> {
    type Error = StoreError;

    // Lock::ForUpdate is already satisfied by BEGIN IMMEDIATE.
    fn read(&mut self, id: &NodeId, _lock: Lock) -> Result<Option<Node>, StoreError> {
        let sql = format!("{} WHERE id = ?1", self.select_columns());
        let mut stmt = self.tx.prepare(&sql)?;
        let mut rows = stmt.query(params![id.as_str()])?;
        match rows.next()? {
            Some(row) => node_from_row(row).map(Some),
            None => Ok(None),
        }
    }

    fn select(
        &mut self,
        predicate: &RangePredicate,
        order: Order,
        limit: Option<usize>,
    ) -> Result<Vec<Node>, StoreError> {
        let (filter, mut values) = self.render(predicate);
        let mut sql = format!(
            "{} WHERE {filter} {}",
            self.select_columns(),
            order_clause(order)
        );
        if let Some(limit) = limit {
            sql.push_str(" LIMIT ?");
            values.push(Value::Integer(to_sqlite_i64(limit)?));
        }

        let mut stmt = self.tx.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(values.iter()))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(node_from_row(row)?);
        }
        Ok(out)
    }

    fn count(&mut self, predicate: &RangePredicate) -> Result<usize, StoreError> {
        let (filter, values) = self.render(predicate);
        let sql = format!("SELECT COUNT(*) FROM {} WHERE {filter}", self.table);
        let count: i64 = self
            .tx
            .query_row(&sql, params_from_iter(values.iter()), |row| row.get(0))?;
        to_count(count)
    }

    fn max_rgt(&mut self) -> Result<Option<i64>, StoreError> {
        let sql = format!(
            "SELECT MAX(rgt) FROM {} WHERE COALESCE(rgt, 0) <> 0",
            self.table
        );
        Ok(self.tx.query_row(&sql, [], |row| row.get(0))?)
    }

    fn upsert(&mut self, node: &Node) -> Result<(), StoreError> {
        self.write_guard()?;
        let sql = format!(
            "INSERT INTO {table}(id, {parent}, old_parent, is_group, lft, rgt) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
             ON CONFLICT(id) DO UPDATE SET \
             {parent}=excluded.{parent}, old_parent=excluded.old_parent, \
             is_group=excluded.is_group, lft=excluded.lft, rgt=excluded.rgt",
            table = self.table,
            parent = self.parent
        );
        self.tx.execute(
            &sql,
            params![
                node.id.as_str(),
                node.parent.as_ref().map(NodeId::as_str),
                node.old_parent.as_ref().map(NodeId::as_str),
                node.is_group,
                node.bounds.map(|b| b.lft()),
                node.bounds.map(|b| b.rgt()),
            ],
        )?;
        Ok(())
    }

    /// One UPDATE for the whole plan: both columns go through the same
    /// CASE ladder, restricted to the plan's span.
    fn shift(&mut self, plan: &ShiftPlan) -> Result<usize, StoreError> {
        self.write_guard()?;
        let Some((from, to)) = plan.span() else {
            return Ok(0);
        };

        let mut values = Vec::new();
        let ladder = |column: &str, values: &mut Vec<Value>| {
            let mut sql = String::from("CASE");
            for segment in plan.segments() {
                sql.push_str(&format!(" WHEN {column} BETWEEN ? AND ? THEN {column} + ?"));
                values.push(Value::Integer(segment.from));
                values.push(Value::Integer(segment.to));
                values.push(Value::Integer(segment.delta));
            }
            sql.push_str(&format!(" ELSE {column} END"));
            sql
        };
        let lft = ladder("lft", &mut values);
        let rgt = ladder("rgt", &mut values);
        let sql = format!(
            "UPDATE {} SET lft = {lft}, rgt = {rgt} \
             WHERE lft BETWEEN ? AND ? OR rgt BETWEEN ? AND ?",
            self.table
        );
        values.extend([from, to, from, to].map(Value::Integer));

        let affected = self.tx.execute(&sql, params_from_iter(values.iter()))?;
        debug!(table = %self.table, segments = plan.segments().len(), affected, "ranges shifted");
        Ok(affected)
    }

    fn set_bounds(&mut self, id: &NodeId, bounds: Option<Bounds>) -> Result<usize, StoreError> {
        self.write_guard()?;
        let sql = format!("UPDATE {} SET lft = ?1, rgt = ?2 WHERE id = ?3", self.table);
        Ok(self.tx.execute(
            &sql,
            params![
                bounds.map(|b| b.lft()),
                bounds.map(|b| b.rgt()),
                id.as_str()
            ],
        )?)
    }

    fn set_parent(&mut self, id: &NodeId, parent: Option<&NodeId>) -> Result<usize, StoreError> {
        self.write_guard()?;
        let sql = format!(
            "UPDATE {table} SET {parent} = ?1, old_parent = ?1 WHERE id = ?2",
            table = self.table,
            parent = self.parent
        );
        Ok(self
            .tx
            .execute(&sql, params![optional_text(parent), id.as_str()])?)
    }

    fn set_group(&mut self, id: &NodeId, is_group: bool) -> Result<usize, StoreError> {
        self.write_guard()?;
        let sql = format!("UPDATE {} SET is_group = ?1 WHERE id = ?2", self.table);
        Ok(self.tx.execute(&sql, params![is_group, id.as_str()])?)
    }

    fn rename(&mut self, from: &NodeId, to: &NodeId) -> Result<usize, StoreError> {
        self.write_guard()?;
        let renamed = self.tx.execute(
            &format!("UPDATE {} SET id = ?1 WHERE id = ?2", self.table),
            params![to.as_str(), from.as_str()],
        )?;
        if renamed == 0 {
            return Ok(0);
        }
        self.tx.execute(
            &format!(
                "UPDATE {table} SET {parent} = ?1 WHERE {parent} = ?2",
                table = self.table,
                parent = self.parent
            ),
            params![to.as_str(), from.as_str()],
        )?;
        self.tx.execute(
            &format!(
                "UPDATE {} SET old_parent = ?1 WHERE old_parent = ?2",
                self.table
            ),
            params![to.as_str(), from.as_str()],
        )?;
        Ok(renamed)
    }

    fn reparent_children(&mut self, from: &NodeId, to: &NodeId) -> Result<usize, StoreError> {
        self.write_guard()?;
        let sql = format!(
            "UPDATE {table} SET {parent} = ?1, old_parent = ?1 WHERE {parent} = ?2",
            table = self.table,
            parent = self.parent
        );
        Ok(self.tx.execute(&sql, params![to.as_str(), from.as_str()])?)
    }

    fn sync_old_parent(&mut self) -> Result<usize, StoreError> {
        self.write_guard()?;
        let sql = format!(
            "UPDATE {table} SET old_parent = {parent}",
            table = self.table,
            parent = self.parent
        );
        Ok(self.tx.execute(&sql, [])?)
    }

    fn delete_where(&mut self, predicate: &RangePredicate) -> Result<usize, StoreError> {
        self.write_guard()?;
        let (filter, values) = self.render(predicate);
        let sql = format!("DELETE FROM {} WHERE {filter}", self.table);
        Ok(self.tx.execute(&sql, params_from_iter(values.iter()))?)
    }

    fn commit(self) -> Result<(), StoreError> {
        self.tx.commit()?;
        Ok(())
    }

    fn rollback(self) -> Result<(), StoreError> {
        self.tx.rollback()?;
        Ok(())
    }
}
