//! SqliteStore - NodeStore Implementation for the libsql Backend
//!
//! This module implements the `NodeStore` trait on top of an embedded
//! SQLite-compatible database opened through `DatabaseService`.
//!
//! # Transactions
//!
//! `begin_transaction` first takes the in-process lock for the partition,
//! then opens a dedicated connection and issues `BEGIN IMMEDIATE`, which
//! acquires SQLite's write lock up front. The engine computes shift amounts
//! from rows it reads inside the transaction, so no other writer may run
//! between that read and the range updates. Other processes sharing the file
//! are held off by the same write lock (bounded by `busy_timeout_ms`).
//!
//! # Examples
//!
//! ```rust,no_run
//! use nestree_core::config::StoreConfig;
//! use nestree_core::db::{DatabaseService, NodeFilter, NodeStore, SqliteStore};
//! use std::path::PathBuf;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = DatabaseService::new(PathBuf::from("./data/tree.db"), StoreConfig::default()).await?;
//!     let store: Arc<dyn NodeStore> = Arc::new(SqliteStore::new(Arc::new(db)));
//!
//!     let nodes = store.read("blog", NodeFilter::All).await?;
//!     println!("{} nodes", nodes.len());
//!     Ok(())
//! }
//! ```

use crate::db::node_store::{FieldDeltas, NodeFilter, NodeStore, RangePredicate, StoreTransaction};
use crate::db::partition_lock::{PartitionGuard, PartitionLocks};
use crate::db::{DatabaseService, StoreError};
use crate::models::{Node, NodeId, NodePayload};
use async_trait::async_trait;
use libsql::params::Params;
use libsql::{Connection, Row, Value};
use std::sync::Arc;

/// SQL text prepared once from the configured table layout
#[derive(Debug)]
struct SqlText {
    select: String,
    update_bounds: String,
    insert: String,
    update_row: String,
    delete_range: String,
}

impl SqlText {
    fn new(db: &DatabaseService) -> Self {
        let table = &db.config.table_name;
        let partition = &db.config.partition_column;
        let label = &db.config.label_column;

        Self {
            select: format!(
                "SELECT id, {partition}, parent_id, lft, rgt, depth, {label} FROM {table} WHERE {partition} = ?"
            ),
            update_bounds: format!(
                "UPDATE {table} SET lft = lft + ?, rgt = rgt + ?, depth = depth + ? WHERE {partition} = ?"
            ),
            insert: format!(
                "INSERT INTO {table} ({partition}, parent_id, lft, rgt, depth, {label}) VALUES (?, ?, ?, ?, ?, ?)"
            ),
            update_row: format!(
                "UPDATE {table} SET parent_id = ?, lft = ?, rgt = ?, depth = ?, {label} = ? WHERE id = ? AND {partition} = ?"
            ),
            delete_range: format!(
                "DELETE FROM {table} WHERE {partition} = ? AND lft >= ? AND rgt <= ?"
            ),
        }
    }
}

/// SqliteStore implements NodeStore for the libsql backend
#[derive(Debug)]
pub struct SqliteStore {
    db: Arc<DatabaseService>,
    locks: Arc<PartitionLocks>,
    sql: Arc<SqlText>,
}

impl SqliteStore {
    /// Wrap an initialized database
    pub fn new(db: Arc<DatabaseService>) -> Self {
        let sql = Arc::new(SqlText::new(&db));
        Self {
            db,
            locks: Arc::new(PartitionLocks::new()),
            sql,
        }
    }

    /// Underlying database service
    pub fn database(&self) -> &Arc<DatabaseService> {
        &self.db
    }

    /// Convert a libsql row to a Node
    ///
    /// Column order matches `SqlText::select`.
    fn row_to_node(row: &Row) -> Result<Node, StoreError> {
        Ok(Node {
            id: row.get(0)?,
            partition_key: row.get(1)?,
            parent_id: row.get(2)?,
            left: row.get(3)?,
            right: row.get(4)?,
            depth: row.get(5)?,
            label: row.get(6)?,
        })
    }

    async fn query_nodes(
        conn: &Connection,
        sql: &SqlText,
        partition_key: &str,
        filter: NodeFilter,
    ) -> Result<Vec<Node>, StoreError> {
        let mut params = vec![Value::Text(partition_key.to_string())];
        let condition = match filter {
            NodeFilter::All => "",
            NodeFilter::Id(id) => {
                params.push(Value::Integer(id));
                " AND id = ?"
            }
            NodeFilter::Enclosing {
                left,
                right,
                inclusive,
            } => {
                params.push(Value::Integer(left));
                params.push(Value::Integer(right));
                if inclusive {
                    " AND lft <= ? AND rgt >= ?"
                } else {
                    " AND lft < ? AND rgt > ?"
                }
            }
            NodeFilter::Within {
                left,
                right,
                inclusive,
            } => {
                params.push(Value::Integer(left));
                params.push(Value::Integer(right));
                if inclusive {
                    " AND lft >= ? AND rgt <= ?"
                } else {
                    " AND lft > ? AND rgt < ?"
                }
            }
            NodeFilter::ChildrenOf(parent_id) => {
                params.push(Value::Integer(parent_id));
                " AND parent_id = ?"
            }
            NodeFilter::SiblingsAfter {
                parent_id: Some(parent_id),
                after,
            } => {
                params.push(Value::Integer(parent_id));
                params.push(Value::Integer(after));
                " AND parent_id = ? AND lft > ?"
            }
            NodeFilter::SiblingsAfter {
                parent_id: None,
                after,
            } => {
                params.push(Value::Integer(after));
                " AND parent_id IS NULL AND lft > ?"
            }
        };

        let query = format!("{}{} ORDER BY lft ASC", sql.select, condition);
        let mut rows = conn
            .query(&query, Params::Positional(params))
            .await
            .map_err(|e| StoreError::sql_execution(format!("Failed to read nodes: {}", e)))?;

        let mut nodes = Vec::new();
        while let Some(row) = rows.next().await? {
            nodes.push(Self::row_to_node(&row)?);
        }
        Ok(nodes)
    }
}

#[async_trait]
impl NodeStore for SqliteStore {
    async fn read(&self, partition_key: &str, filter: NodeFilter) -> Result<Vec<Node>, StoreError> {
        let conn = self.db.connect_with_timeout().await?;
        Self::query_nodes(&conn, &self.sql, partition_key, filter).await
    }

    async fn begin_transaction(
        &self,
        partition_key: &str,
    ) -> Result<Box<dyn StoreTransaction>, StoreError> {
        let guard = self.locks.acquire(partition_key).await;
        let conn = self.db.connect_with_timeout().await?;

        conn.execute("BEGIN IMMEDIATE", ()).await.map_err(|e| {
            StoreError::sql_execution(format!("Failed to begin transaction: {}", e))
        })?;

        tracing::trace!("Began transaction on partition '{}'", partition_key);

        Ok(Box::new(SqliteTransaction {
            conn,
            partition_key: partition_key.to_string(),
            sql: self.sql.clone(),
            _guard: guard,
        }))
    }
}

/// An open `BEGIN IMMEDIATE` transaction on a dedicated connection
///
/// Dropping it closes the connection, which makes SQLite roll back anything
/// uncommitted. Field order matters: the connection must be closed before
/// the partition guard is released.
struct SqliteTransaction {
    conn: Connection,
    partition_key: String,
    sql: Arc<SqlText>,
    _guard: PartitionGuard,
}

impl SqliteTransaction {
    fn partition_value(&self) -> Value {
        Value::Text(self.partition_key.clone())
    }
}

#[async_trait]
impl StoreTransaction for SqliteTransaction {
    fn partition_key(&self) -> &str {
        &self.partition_key
    }

    async fn read(&mut self, filter: NodeFilter) -> Result<Vec<Node>, StoreError> {
        SqliteStore::query_nodes(&self.conn, &self.sql, &self.partition_key, filter).await
    }

    async fn write_many(
        &mut self,
        range: RangePredicate,
        deltas: FieldDeltas,
    ) -> Result<u64, StoreError> {
        if deltas.is_noop() {
            return Ok(0);
        }

        let mut params = vec![
            Value::Integer(deltas.left),
            Value::Integer(deltas.right),
            Value::Integer(deltas.depth),
            self.partition_value(),
        ];
        let condition = match range {
            RangePredicate::LeftFrom(n) => {
                params.push(Value::Integer(n));
                " AND lft >= ?"
            }
            RangePredicate::RightFrom(n) => {
                params.push(Value::Integer(n));
                " AND rgt >= ?"
            }
            RangePredicate::Within { left, right } => {
                params.push(Value::Integer(left));
                params.push(Value::Integer(right));
                " AND lft >= ? AND rgt <= ?"
            }
        };

        let statement = format!("{}{}", self.sql.update_bounds, condition);
        let affected = self
            .conn
            .execute(&statement, Params::Positional(params))
            .await
            .map_err(|e| StoreError::sql_execution(format!("Failed to shift intervals: {}", e)))?;

        tracing::trace!(
            "Shifted {} row(s) in '{}' by {:?} where {:?}",
            affected,
            self.partition_key,
            deltas,
            range
        );
        Ok(affected)
    }

    async fn insert(&mut self, payload: NodePayload) -> Result<Node, StoreError> {
        let params = vec![
            Value::Text(payload.partition_key.clone()),
            optional_id(payload.parent_id),
            Value::Integer(payload.left),
            Value::Integer(payload.right),
            Value::Integer(payload.depth),
            Value::Text(payload.label.clone()),
        ];

        self.conn
            .execute(&self.sql.insert, Params::Positional(params))
            .await
            .map_err(|e| StoreError::sql_execution(format!("Failed to insert node: {}", e)))?;

        let id = self.conn.last_insert_rowid();
        Ok(payload.into_node(id))
    }

    async fn update(&mut self, node: &Node) -> Result<(), StoreError> {
        let params = vec![
            optional_id(node.parent_id),
            Value::Integer(node.left),
            Value::Integer(node.right),
            Value::Integer(node.depth),
            Value::Text(node.label.clone()),
            Value::Integer(node.id),
            self.partition_value(),
        ];

        let affected = self
            .conn
            .execute(&self.sql.update_row, Params::Positional(params))
            .await
            .map_err(|e| {
                StoreError::sql_execution(format!("Failed to update node {}: {}", node.id, e))
            })?;

        if affected == 0 {
            return Err(StoreError::row_missing(node.id, self.partition_key.as_str()));
        }
        Ok(())
    }

    async fn delete_many(&mut self, left: i64, right: i64) -> Result<u64, StoreError> {
        let params = vec![self.partition_value(), Value::Integer(left), Value::Integer(right)];

        self.conn
            .execute(&self.sql.delete_range, Params::Positional(params))
            .await
            .map_err(|e| StoreError::sql_execution(format!("Failed to delete nodes: {}", e)))
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.conn.execute("COMMIT", ()).await.map_err(|e| {
            StoreError::sql_execution(format!("Failed to commit transaction: {}", e))
        })?;
        tracing::trace!("Committed transaction on partition '{}'", self.partition_key);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.conn.execute("ROLLBACK", ()).await.map_err(|e| {
            StoreError::sql_execution(format!("Failed to roll back transaction: {}", e))
        })?;
        tracing::trace!("Rolled back transaction on partition '{}'", self.partition_key);
        Ok(())
    }
}

fn optional_id(id: Option<NodeId>) -> Value {
    match id {
        Some(id) => Value::Integer(id),
        None => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use tempfile::TempDir;

    async fn create_test_store() -> (SqliteStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let db = DatabaseService::new(db_path, StoreConfig::default())
            .await
            .unwrap();
        (SqliteStore::new(Arc::new(db)), temp_dir)
    }

    fn payload(left: i64, right: i64, depth: i64, label: &str) -> NodePayload {
        NodePayload {
            partition_key: "p".to_string(),
            parent_id: None,
            left,
            right,
            depth,
            label: label.to_string(),
        }
    }

    #[tokio::test]
    async fn test_insert_and_read_in_left_order() {
        let (store, _temp) = create_test_store().await;

        let mut tx = store.begin_transaction("p").await.unwrap();
        let root = tx.insert(payload(0, 5, -1, "root")).await.unwrap();
        let mut b = payload(3, 4, 0, "B");
        b.parent_id = Some(root.id);
        let mut a = payload(1, 2, 0, "A");
        a.parent_id = Some(root.id);
        tx.insert(b).await.unwrap();
        tx.insert(a).await.unwrap();
        tx.commit().await.unwrap();

        let nodes = store.read("p", NodeFilter::All).await.unwrap();
        let labels: Vec<&str> = nodes.iter().map(|n| n.label.as_str()).collect();
        assert_eq!(labels, vec!["root", "A", "B"]);
        assert_eq!(nodes[1].parent_id, Some(root.id));

        let children = store.read("p", NodeFilter::ChildrenOf(root.id)).await.unwrap();
        assert_eq!(children.len(), 2);
        assert!(store.read("other", NodeFilter::All).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_write_many_applies_deltas_within_partition_only() {
        let (store, _temp) = create_test_store().await;

        for partition in ["p", "q"] {
            let mut tx = store.begin_transaction(partition).await.unwrap();
            let mut row = payload(0, 1, -1, "root");
            row.partition_key = partition.to_string();
            tx.insert(row).await.unwrap();
            tx.commit().await.unwrap();
        }

        let mut tx = store.begin_transaction("p").await.unwrap();
        let affected = tx
            .write_many(RangePredicate::RightFrom(1), FieldDeltas::right(2))
            .await
            .unwrap();
        assert_eq!(affected, 1);
        tx.commit().await.unwrap();

        assert_eq!(store.read("p", NodeFilter::All).await.unwrap()[0].right, 3);
        assert_eq!(store.read("q", NodeFilter::All).await.unwrap()[0].right, 1);
    }

    #[tokio::test]
    async fn test_rollback_and_drop_discard_changes() {
        let (store, _temp) = create_test_store().await;

        let mut tx = store.begin_transaction("p").await.unwrap();
        tx.insert(payload(0, 1, -1, "root")).await.unwrap();
        tx.rollback().await.unwrap();
        assert!(store.read("p", NodeFilter::All).await.unwrap().is_empty());

        {
            let mut tx = store.begin_transaction("p").await.unwrap();
            tx.insert(payload(0, 1, -1, "root")).await.unwrap();
        }
        assert!(store.read("p", NodeFilter::All).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let (store, _temp) = create_test_store().await;

        let mut tx = store.begin_transaction("p").await.unwrap();
        let root = tx.insert(payload(0, 3, -1, "root")).await.unwrap();
        let mut child = tx.insert(payload(1, 2, 0, "child")).await.unwrap();
        child.parent_id = Some(root.id);
        child.label = "renamed".to_string();
        tx.update(&child).await.unwrap();
        tx.commit().await.unwrap();

        let stored = store.read("p", NodeFilter::Id(child.id)).await.unwrap();
        assert_eq!(stored, vec![child.clone()]);

        let mut tx = store.begin_transaction("p").await.unwrap();
        assert_eq!(tx.delete_many(1, 2).await.unwrap(), 1);
        let mut ghost = child.clone();
        ghost.id = 9999;
        let err = tx.update(&ghost).await.unwrap_err();
        assert!(matches!(err, StoreError::RowMissing { id: 9999, .. }));
        tx.commit().await.unwrap();

        assert_eq!(store.read("p", NodeFilter::All).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_interval_filters() {
        let (store, _temp) = create_test_store().await;

        let mut tx = store.begin_transaction("p").await.unwrap();
        let root = tx.insert(payload(0, 7, -1, "root")).await.unwrap();
        let mut a = payload(1, 4, 0, "A");
        a.parent_id = Some(root.id);
        let a = tx.insert(a).await.unwrap();
        let mut a1 = payload(2, 3, 1, "A1");
        a1.parent_id = Some(a.id);
        tx.insert(a1).await.unwrap();
        let mut b = payload(5, 6, 0, "B");
        b.parent_id = Some(root.id);
        tx.insert(b).await.unwrap();

        let ancestors = tx
            .read(NodeFilter::Enclosing {
                left: 2,
                right: 3,
                inclusive: false,
            })
            .await
            .unwrap();
        assert_eq!(ancestors.len(), 2);

        let subtree = tx
            .read(NodeFilter::Within {
                left: 1,
                right: 4,
                inclusive: true,
            })
            .await
            .unwrap();
        assert_eq!(subtree.len(), 2);

        let next = tx
            .read(NodeFilter::SiblingsAfter {
                parent_id: Some(root.id),
                after: 4,
            })
            .await
            .unwrap();
        assert_eq!(next.len(), 1);
        assert_eq!(next[0].label, "B");

        let roots = tx
            .read(NodeFilter::SiblingsAfter {
                parent_id: None,
                after: -1,
            })
            .await
            .unwrap();
        assert_eq!(roots.len(), 1);
        tx.commit().await.unwrap();
    }
}
