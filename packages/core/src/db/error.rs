//! Store Error Types
//!
//! This module defines error types for store adapter operations, covering
//! connection setup, schema initialization, query execution and transaction
//! scoping failures.

use crate::models::NodeId;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Store adapter errors
///
/// Every failure a `NodeStore` or `StoreTransaction` can report. The engine
/// never retries these; it aborts the transaction and hands them to the
/// caller wrapped in `TreeError::Storage`.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Failed to establish database connection
    #[error("Failed to connect to database at {path}: {source}")]
    ConnectionFailed {
        path: PathBuf,
        source: libsql::Error,
    },

    /// Failed to initialize database schema
    #[error("Failed to initialize database schema: {0}")]
    InitializationFailed(String),

    /// Failed to create parent directory
    #[error("Failed to create parent directory for database: {0}")]
    DirectoryCreationFailed(#[from] std::io::Error),

    /// Table or column name is not a plain SQL identifier
    #[error("Invalid SQL identifier: '{0}'")]
    InvalidIdentifier(String),

    /// libsql operation error
    #[error("Database operation failed: {0}")]
    Libsql(#[from] libsql::Error),

    /// SQL execution error with context
    #[error("SQL execution failed: {context}")]
    SqlExecution { context: String },

    /// A row expected to exist was not found by an update
    #[error("Row {id} not found in partition '{partition_key}'")]
    RowMissing {
        id: NodeId,
        partition_key: String,
    },

    /// The transaction body did not finish in time and was rolled back
    #[error("Transaction on partition '{partition_key}' timed out after {elapsed:?}")]
    Timeout {
        partition_key: String,
        elapsed: Duration,
    },

    /// Adapter-specific failure
    #[error("Storage backend failure: {0}")]
    Backend(String),
}

impl StoreError {
    /// Create a connection failed error
    pub fn connection_failed(path: PathBuf, source: libsql::Error) -> Self {
        Self::ConnectionFailed { path, source }
    }

    /// Create an initialization failed error
    pub fn initialization_failed(msg: impl Into<String>) -> Self {
        Self::InitializationFailed(msg.into())
    }

    /// Create a SQL execution error with context
    pub fn sql_execution(context: impl Into<String>) -> Self {
        Self::SqlExecution {
            context: context.into(),
        }
    }

    /// Create a row missing error
    pub fn row_missing(id: NodeId, partition_key: impl Into<String>) -> Self {
        Self::RowMissing {
            id,
            partition_key: partition_key.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(partition_key: impl Into<String>, elapsed: Duration) -> Self {
        Self::Timeout {
            partition_key: partition_key.into(),
            elapsed,
        }
    }

    /// Create a backend failure
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }
}
