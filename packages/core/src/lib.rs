//! Nestree Core - Nested-Set Tree Engine
//!
//! This crate maintains hierarchical records as nested sets: every node owns
//! an interval `[left, right]` and a `depth`, ancestors strictly enclose their
//! descendants, and nodes are grouped into independent partitions.
//!
//! # Architecture
//!
//! - **Stateless engine**: `TreeService` computes interval shifts from rows
//!   read inside the current transaction and never caches bounds across calls
//! - **Partitioned store**: `NodeStore` / `StoreTransaction` abstract the
//!   persistence backend; `SqliteStore` (libsql) and `MemoryStore` ship here
//! - **All-or-nothing mutations**: each insert, move or removal is one
//!   transaction on one partition, verified before commit
//!
//! # Modules
//!
//! - [`models`] - `Node`, detached payloads and insertion subjects
//! - [`operations`] - interval arithmetic, validation, invariant checks, errors
//! - [`services`] - `TreeService` and transaction scoping
//! - [`db`] - store contract and backends
//! - [`config`] - engine and store settings

pub mod config;
pub mod db;
pub mod models;
pub mod operations;
pub mod services;

// Re-export commonly used types
pub use config::{StoreConfig, TreeConfig};
pub use db::{MemoryStore, NodeStore, SqliteStore, StoreError, StoreTransaction};
pub use models::*;
pub use operations::{TreeError, ValidationError};
pub use services::*;
