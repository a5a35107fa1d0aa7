//! Storage Layer
//!
//! This module defines the partitioned store contract the tree engine runs
//! against, plus two implementations:
//!
//! - [`SqliteStore`] - libsql-backed store on an embedded SQLite file
//! - [`MemoryStore`] - in-process store with fault injection for tests
//!
//! # Architecture
//!
//! The engine only ever talks to [`NodeStore`] and [`StoreTransaction`].
//! Every mutation runs inside one transaction scoped to a single partition;
//! transactions on the same partition are serialized by [`PartitionLocks`],
//! transactions on different partitions do not wait for each other.

mod database;
mod error;
mod memory_store;
pub mod node_store;
mod partition_lock;
mod sqlite_store;

pub use database::DatabaseService;
pub use error::StoreError;
pub use memory_store::MemoryStore;
pub use node_store::{FieldDeltas, NodeFilter, NodeStore, RangePredicate, StoreTransaction};
pub use partition_lock::{PartitionGuard, PartitionLocks};
pub use sqlite_store::SqliteStore;
