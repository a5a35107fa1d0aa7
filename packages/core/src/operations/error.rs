//! Error types for tree operations
//!
//! This module defines the three failure kinds a tree operation can report:
//! rejected input (`ValidationError`), a failing store (`StoreError`), and a
//! corrupted interval encoding detected after a write.

use crate::db::StoreError;
use crate::models::NodeId;
use thiserror::Error;

/// Input rejected before any row was changed
///
/// # Examples
///
/// ```rust
/// use nestree_core::operations::ValidationError;
///
/// let err = ValidationError::MoveIntoOwnSubtree {
///     node_id: 2,
///     target_id: 3,
/// };
/// assert!(err.to_string().contains("own subtree"));
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Detached payloads must carry a non-blank label
    #[error("Label must not be blank")]
    BlankLabel,

    /// The destination lies inside the subtree being moved (or is the node itself)
    #[error("Cannot move node {node_id} into its own subtree (target {target_id})")]
    MoveIntoOwnSubtree { node_id: NodeId, target_id: NodeId },

    /// Nodes of different partitions are never comparable or movable
    #[error("Node {node_id} belongs to partition '{node_partition}', target belongs to '{target_partition}'")]
    PartitionMismatch {
        node_id: NodeId,
        node_partition: String,
        target_partition: String,
    },

    /// A root sentinel has no parent, so nothing can be placed beside it
    #[error("Node {target_id} is a root and cannot have siblings")]
    SiblingOfRoot { target_id: NodeId },

    /// Referenced node does not exist in its partition
    #[error("Node {id} not found in partition '{partition_key}'")]
    NodeNotFound { id: NodeId, partition_key: String },

    /// A root can only be created in an empty partition
    #[error("Partition '{partition_key}' already contains {count} node(s)")]
    PartitionNotEmpty { partition_key: String, count: usize },

    /// Engine settings rejected at construction
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ValidationError {
    /// Create a NodeNotFound error
    pub fn node_not_found(id: NodeId, partition_key: impl Into<String>) -> Self {
        Self::NodeNotFound {
            id,
            partition_key: partition_key.into(),
        }
    }

    /// Create a PartitionMismatch error
    pub fn partition_mismatch(
        node_id: NodeId,
        node_partition: impl Into<String>,
        target_partition: impl Into<String>,
    ) -> Self {
        Self::PartitionMismatch {
            node_id,
            node_partition: node_partition.into(),
            target_partition: target_partition.into(),
        }
    }
}

/// Errors returned by `TreeService` operations
///
/// Every variant means the operation had no effect: the transaction was
/// either never opened or rolled back.
#[derive(Error, Debug)]
pub enum TreeError {
    /// Input rejected before any mutation
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// The store failed a read, write or transaction step
    #[error("Storage failure: {0}")]
    Storage(#[from] StoreError),

    /// Read-back after a write found a broken interval encoding
    ///
    /// Indicates a bug or a concurrency-control failure; not recoverable by
    /// retrying the same call.
    #[error("Structural invariant violated in partition '{partition_key}': {detail}")]
    InvariantViolation {
        partition_key: String,
        detail: String,
    },
}

impl TreeError {
    /// Create an InvariantViolation error
    pub fn invariant_violation(partition_key: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::InvariantViolation {
            partition_key: partition_key.into(),
            detail: detail.into(),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }

    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, Self::InvariantViolation { .. })
    }

    /// The validation failure, if this is one
    pub fn as_validation(&self) -> Option<&ValidationError> {
        match self {
            Self::Validation(err) => Some(err),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let err: TreeError = ValidationError::BlankLabel.into();
        assert!(err.is_validation());
        assert_eq!(err.as_validation(), Some(&ValidationError::BlankLabel));

        let err: TreeError = StoreError::backend("disk on fire").into();
        assert!(err.is_storage());
        assert!(err.as_validation().is_none());

        let err = TreeError::invariant_violation("p", "overlap");
        assert!(err.is_invariant_violation());
    }

    #[test]
    fn test_error_messages() {
        let err = ValidationError::partition_mismatch(5, "1", "2");
        assert_eq!(
            err.to_string(),
            "Node 5 belongs to partition '1', target belongs to '2'"
        );

        let err = TreeError::from(ValidationError::node_not_found(9, "blog"));
        assert_eq!(
            err.to_string(),
            "Validation failed: Node 9 not found in partition 'blog'"
        );

        let err = TreeError::from(StoreError::sql_execution("boom"));
        assert_eq!(err.to_string(), "Storage failure: SQL execution failed: boom");
    }
}
