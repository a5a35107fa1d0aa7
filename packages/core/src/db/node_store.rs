//! NodeStore Trait - Store Adapter Contract
//!
//! This module defines the contract the tree engine requires from a store:
//! ordered range reads, additive range updates, single-row insert/update,
//! interval deletes, and partition-scoped transactions.
//!
//! # Architecture
//!
//! - **Abstraction Point**: Between `TreeService` (interval algorithm) and the
//!   persistence backend
//! - **Backends**: `SqliteStore` (libsql) and `MemoryStore` (in-process)
//! - **Partition Scoping**: every transaction is bound to one partition key;
//!   reads and writes through it never see other partitions
//!
//! # Design Decisions
//!
//! 1. **Async-First**: All methods are async so embedded and networked
//!    backends share one contract
//! 2. **Explicit Transactions**: `begin_transaction` returns an owned handle;
//!    `commit`/`rollback` consume it and dropping it uncommitted rolls back
//! 3. **Serialization**: a backend must serialize transactions that share a
//!    partition key, for the whole lifetime of the handle
//! 4. **Typed Errors**: `StoreError` instead of opaque errors so the engine can
//!    classify failures
//!
//! # Examples
//!
//! ```rust,no_run
//! use nestree_core::db::{FieldDeltas, MemoryStore, NodeFilter, NodeStore, RangePredicate};
//!
//! # async fn example() -> Result<(), nestree_core::db::StoreError> {
//! let store = MemoryStore::new();
//! let mut tx = store.begin_transaction("blog").await?;
//! tx.write_many(RangePredicate::LeftFrom(4), FieldDeltas::left(2)).await?;
//! tx.write_many(RangePredicate::RightFrom(4), FieldDeltas::right(2)).await?;
//! tx.commit().await?;
//!
//! let nodes = store.read("blog", NodeFilter::All).await?;
//! # Ok(())
//! # }
//! ```

use crate::db::StoreError;
use crate::models::{Node, NodeId, NodePayload};
use async_trait::async_trait;

/// Row selection for reads. Results are always ordered by `left` ascending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeFilter {
    /// Every node of the partition
    All,

    /// The node with the given id
    Id(NodeId),

    /// Nodes whose interval encloses `[left, right]`
    ///
    /// `inclusive` also matches the node owning exactly that interval.
    Enclosing { left: i64, right: i64, inclusive: bool },

    /// Nodes whose interval lies inside `[left, right]`
    ///
    /// `inclusive` also matches the node owning exactly that interval.
    Within { left: i64, right: i64, inclusive: bool },

    /// Nodes linked to the given parent
    ChildrenOf(NodeId),

    /// Nodes linked to `parent_id` that start after `after`
    SiblingsAfter {
        parent_id: Option<NodeId>,
        after: i64,
    },
}

impl NodeFilter {
    /// Evaluate the filter against a node of the same partition
    pub fn matches(&self, node: &Node) -> bool {
        match *self {
            Self::All => true,
            Self::Id(id) => node.id == id,
            Self::Enclosing {
                left,
                right,
                inclusive: true,
            } => node.left <= left && node.right >= right,
            Self::Enclosing {
                left,
                right,
                inclusive: false,
            } => node.left < left && node.right > right,
            Self::Within {
                left,
                right,
                inclusive: true,
            } => node.left >= left && node.right <= right,
            Self::Within {
                left,
                right,
                inclusive: false,
            } => node.left > left && node.right < right,
            Self::ChildrenOf(parent_id) => node.parent_id == Some(parent_id),
            Self::SiblingsAfter { parent_id, after } => {
                node.parent_id == parent_id && node.left > after
            }
        }
    }
}

/// Row selection for additive range updates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangePredicate {
    /// Nodes with `left >= n`
    LeftFrom(i64),

    /// Nodes with `right >= n`
    RightFrom(i64),

    /// Nodes with `left >= left && right <= right` (a whole subtree)
    Within { left: i64, right: i64 },
}

impl RangePredicate {
    /// Evaluate the predicate against a node of the same partition
    pub fn matches(&self, node: &Node) -> bool {
        match *self {
            Self::LeftFrom(n) => node.left >= n,
            Self::RightFrom(n) => node.right >= n,
            Self::Within { left, right } => node.left >= left && node.right <= right,
        }
    }
}

/// Additive deltas applied by [`StoreTransaction::write_many`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FieldDeltas {
    pub left: i64,
    pub right: i64,
    pub depth: i64,
}

impl FieldDeltas {
    /// Shift left bounds only
    pub fn left(delta: i64) -> Self {
        Self {
            left: delta,
            ..Self::default()
        }
    }

    /// Shift right bounds only
    pub fn right(delta: i64) -> Self {
        Self {
            right: delta,
            ..Self::default()
        }
    }

    /// Shift both bounds by the same amount
    pub fn shift(delta: i64) -> Self {
        Self {
            left: delta,
            right: delta,
            depth: 0,
        }
    }

    /// Also adjust depth
    pub fn with_depth(mut self, delta: i64) -> Self {
        self.depth = delta;
        self
    }

    /// Whether applying these deltas changes nothing
    pub fn is_noop(&self) -> bool {
        self.left == 0 && self.right == 0 && self.depth == 0
    }

    /// Apply the deltas to a node in place
    pub fn apply(&self, node: &mut Node) {
        node.left += self.left;
        node.right += self.right;
        node.depth += self.depth;
    }
}

/// Partition-scoped store with transactional mutation
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` so a single store can be shared by
/// concurrent callers through `Arc<dyn NodeStore>`.
#[async_trait]
pub trait NodeStore: Send + Sync {
    /// Read nodes of a partition outside any transaction
    ///
    /// Must never observe a partially applied transaction (read-committed or
    /// stronger).
    async fn read(&self, partition_key: &str, filter: NodeFilter) -> Result<Vec<Node>, StoreError>;

    /// Open a transaction on one partition
    ///
    /// Waits until no other transaction holds the same partition. The
    /// returned handle keeps the partition serialized until it is committed,
    /// rolled back or dropped.
    async fn begin_transaction(
        &self,
        partition_key: &str,
    ) -> Result<Box<dyn StoreTransaction>, StoreError>;
}

/// An open transaction bound to one partition
///
/// Dropping the handle without calling [`commit`](Self::commit) discards
/// every change made through it.
#[async_trait]
pub trait StoreTransaction: Send {
    /// Partition this transaction is bound to
    fn partition_key(&self) -> &str;

    /// Read nodes ordered by `left` ascending, including uncommitted changes
    async fn read(&mut self, filter: NodeFilter) -> Result<Vec<Node>, StoreError>;

    /// Add `deltas` to every node matching `range`; returns affected rows
    async fn write_many(
        &mut self,
        range: RangePredicate,
        deltas: FieldDeltas,
    ) -> Result<u64, StoreError>;

    /// Persist a new node and assign its id
    async fn insert(&mut self, payload: NodePayload) -> Result<Node, StoreError>;

    /// Persist every field of an existing node
    async fn update(&mut self, node: &Node) -> Result<(), StoreError>;

    /// Delete nodes with `left >= left && right <= right`; returns affected rows
    async fn delete_many(&mut self, left: i64, right: i64) -> Result<u64, StoreError>;

    /// Make every change visible atomically
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    /// Discard every change
    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(left: i64, right: i64) -> Node {
        Node {
            id: left,
            partition_key: "p".to_string(),
            parent_id: Some(100),
            left,
            right,
            depth: 0,
            label: "n".to_string(),
        }
    }

    #[test]
    fn test_enclosing_filter() {
        let outer = node(1, 10);
        let inclusive = NodeFilter::Enclosing {
            left: 1,
            right: 10,
            inclusive: true,
        };
        let strict = NodeFilter::Enclosing {
            left: 1,
            right: 10,
            inclusive: false,
        };
        assert!(inclusive.matches(&outer));
        assert!(!strict.matches(&outer));
        assert!(strict.matches(&node(0, 11)));
    }

    #[test]
    fn test_within_filter() {
        let subtree = NodeFilter::Within {
            left: 2,
            right: 9,
            inclusive: true,
        };
        assert!(subtree.matches(&node(2, 9)));
        assert!(subtree.matches(&node(3, 4)));
        assert!(!subtree.matches(&node(1, 4)));

        let below = NodeFilter::Within {
            left: 2,
            right: 9,
            inclusive: false,
        };
        assert!(!below.matches(&node(2, 9)));
        assert!(below.matches(&node(3, 4)));
    }

    #[test]
    fn test_sibling_filter_uses_parent_link() {
        let filter = NodeFilter::SiblingsAfter {
            parent_id: Some(100),
            after: 4,
        };
        assert!(filter.matches(&node(5, 6)));
        assert!(!filter.matches(&node(3, 4)));

        let mut orphan = node(7, 8);
        orphan.parent_id = None;
        assert!(!filter.matches(&orphan));
    }

    #[test]
    fn test_range_predicates_and_deltas() {
        let mut n = node(4, 7);
        assert!(RangePredicate::LeftFrom(4).matches(&n));
        assert!(!RangePredicate::LeftFrom(5).matches(&n));
        assert!(RangePredicate::RightFrom(7).matches(&n));
        assert!(RangePredicate::Within { left: 4, right: 7 }.matches(&n));

        FieldDeltas::shift(3).with_depth(-1).apply(&mut n);
        assert_eq!((n.left, n.right, n.depth), (7, 10, -1));

        FieldDeltas::right(2).apply(&mut n);
        assert_eq!((n.left, n.right), (7, 12));
        assert!(FieldDeltas::default().is_noop());
    }
}
