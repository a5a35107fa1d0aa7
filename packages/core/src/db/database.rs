//! Database Connection Management
//!
//! This module provides the libsql connection handling and schema setup used
//! by `SqliteStore`.
//!
//! # Architecture
//!
//! - **Path-agnostic**: Accepts any valid PathBuf; parent directories are created
//! - **Configurable layout**: table and column names come from `StoreConfig`
//! - **WAL mode**: Write-Ahead Logging so readers never block on a writer
//! - **Busy timeout**: every connection waits instead of failing on a locked file
//!
//! # Database Connection Patterns
//!
//! **ALWAYS use `connect_with_timeout()` in async functions.** A connection
//! without the busy timeout fails immediately with `SQLITE_BUSY` when another
//! transaction holds the write lock, which turns ordinary partition contention
//! into storage errors.
//!
//! ```no_run
//! # use nestree_core::db::DatabaseService;
//! # use nestree_core::config::StoreConfig;
//! # use std::path::PathBuf;
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let db = DatabaseService::new(PathBuf::from("./data/tree.db"), StoreConfig::default()).await?;
//! let conn = db.connect_with_timeout().await?;
//! # Ok(())
//! # }
//! ```

use crate::config::StoreConfig;
use crate::db::error::StoreError;
use libsql::{Builder, Database};
use std::path::PathBuf;
use std::sync::Arc;

/// Database service for managing the libsql connection and schema
#[derive(Clone)]
pub struct DatabaseService {
    /// libsql database handle (wrapped in Arc for sharing)
    pub db: Arc<Database>,

    /// Path to the database file
    pub db_path: PathBuf,

    /// Table layout
    pub config: StoreConfig,
}

impl std::fmt::Debug for DatabaseService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseService")
            .field("db_path", &self.db_path)
            .field("config", &self.config)
            .finish()
    }
}

impl DatabaseService {
    /// Open (or create) the database at `db_path` and initialize the schema
    ///
    /// This will:
    /// 1. Validate the table layout
    /// 2. Ensure the parent directory exists (create if needed)
    /// 3. Open/create the database file
    /// 4. Create the node table and its indexes (idempotent)
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if:
    /// - A configured table or column name is not a plain identifier
    /// - Parent directory cannot be created
    /// - Database connection fails
    /// - Schema initialization fails
    pub async fn new(db_path: PathBuf, config: StoreConfig) -> Result<Self, StoreError> {
        config.validate()?;

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let db = Builder::new_local(&db_path)
            .build()
            .await
            .map_err(|e| StoreError::connection_failed(db_path.clone(), e))?;

        let service = Self {
            db: Arc::new(db),
            db_path,
            config,
        };

        service.initialize_schema().await?;

        tracing::debug!(
            "Opened tree database at {:?} (table '{}')",
            service.db_path,
            service.config.table_name
        );

        Ok(service)
    }

    /// Open a raw connection without the busy timeout
    ///
    /// Prefer `connect_with_timeout()` in async code.
    pub fn connect(&self) -> Result<libsql::Connection, StoreError> {
        self.db.connect().map_err(|e| {
            StoreError::sql_execution(format!("Failed to open connection: {}", e))
        })
    }

    /// Open a connection with the configured busy timeout applied
    pub async fn connect_with_timeout(&self) -> Result<libsql::Connection, StoreError> {
        let conn = self.connect()?;

        self.execute_pragma(
            &conn,
            &format!("PRAGMA busy_timeout = {}", self.config.busy_timeout_ms),
        )
        .await?;

        Ok(conn)
    }

    /// Execute a PRAGMA statement
    ///
    /// PRAGMA statements return rows, so they go through query() rather than
    /// execute().
    async fn execute_pragma(
        &self,
        conn: &libsql::Connection,
        pragma: &str,
    ) -> Result<(), StoreError> {
        let mut stmt = conn.prepare(pragma).await.map_err(|e| {
            StoreError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
        })?;
        let _ = stmt.query(()).await.map_err(|e| {
            StoreError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
        })?;
        Ok(())
    }

    /// Create the node table and indexes
    ///
    /// # Schema
    ///
    /// - `id`: store-assigned identity
    /// - partition column: grouping key, every query filters on it
    /// - `parent_id`: immediate parent, NULL for a root sentinel
    /// - `lft`, `rgt`, `depth`: nested-set encoding
    /// - label column: display value
    ///
    /// No UNIQUE constraint on `lft`/`rgt`: range updates move bounds through
    /// values other rows still hold.
    async fn initialize_schema(&self) -> Result<(), StoreError> {
        let conn = self.connect_with_timeout().await?;

        self.execute_pragma(&conn, "PRAGMA journal_mode = WAL")
            .await?;

        let StoreConfig {
            table_name: table,
            partition_column: partition,
            label_column: label,
            ..
        } = &self.config;

        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    {partition} TEXT NOT NULL,
                    parent_id INTEGER,
                    lft INTEGER NOT NULL,
                    rgt INTEGER NOT NULL,
                    depth INTEGER NOT NULL,
                    {label} TEXT NOT NULL
                )"
            ),
            (),
        )
        .await
        .map_err(|e| {
            StoreError::initialization_failed(format!("Failed to create table '{}': {}", table, e))
        })?;

        let indexes = [
            (format!("idx_{table}_lft"), format!("{partition}, lft")),
            (format!("idx_{table}_rgt"), format!("{partition}, rgt")),
            (format!("idx_{table}_parent"), "parent_id".to_string()),
        ];

        for (name, columns) in indexes {
            conn.execute(
                &format!("CREATE INDEX IF NOT EXISTS {name} ON {table}({columns})"),
                (),
            )
            .await
            .map_err(|e| {
                StoreError::initialization_failed(format!(
                    "Failed to create index '{}': {}",
                    name, e
                ))
            })?;
        }

        Ok(())
    }
}
