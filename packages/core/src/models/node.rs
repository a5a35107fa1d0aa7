//! Node Data Structures
//!
//! This module defines the `Node` row and the payload types used to attach
//! new nodes to a nested-set tree.
//!
//! # Encoding
//!
//! - **Interval**: every node owns `[left, right]`; ancestors strictly enclose
//!   their descendants and siblings are disjoint
//! - **Depth**: distance from the partition root; the root sentinel sits at `-1`
//! - **Partition**: nodes sharing a `partition_key` form one independent tree
//!
//! # Examples
//!
//! ```rust
//! use nestree_core::models::{InsertionSubject, NewNode, Node};
//!
//! let root = Node {
//!     id: 1,
//!     partition_key: "blog".to_string(),
//!     parent_id: None,
//!     left: 0,
//!     right: 3,
//!     depth: -1,
//!     label: "Categories".to_string(),
//! };
//! assert!(root.is_root());
//! assert_eq!(root.span(), 4);
//!
//! let subject = InsertionSubject::Detached(NewNode::new("Rust"));
//! assert_eq!(subject.span(), 2);
//! ```

use serde::{Deserialize, Serialize};

/// Store-assigned node identifier
pub type NodeId = i64;

/// Depth of the root sentinel of every partition
pub const ROOT_DEPTH: i64 = -1;

/// A node attached to a nested-set tree
///
/// All interval fields are owned by the store. A `Node` value is a snapshot:
/// the engine re-reads rows by id inside each transaction and never trusts
/// the bounds a caller hands back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Unique identifier assigned by the store
    pub id: NodeId,

    /// Grouping key; interval arithmetic never crosses partitions
    pub partition_key: String,

    /// Immediate parent (None for a root sentinel)
    pub parent_id: Option<NodeId>,

    /// Left bound of the interval
    pub left: i64,

    /// Right bound of the interval
    pub right: i64,

    /// Distance from the partition root (root sentinel = -1)
    pub depth: i64,

    /// Display value
    pub label: String,
}

impl Node {
    /// Whether this node is the sentinel root of its partition
    pub fn is_root(&self) -> bool {
        self.depth == ROOT_DEPTH
    }

    /// Whether this node has no descendants
    pub fn is_leaf(&self) -> bool {
        self.right == self.left + 1
    }

    /// Width of the interval, including both boundary units
    pub fn span(&self) -> i64 {
        self.right - self.left + 1
    }

    /// Number of descendants encoded by the interval
    pub fn descendant_count(&self) -> i64 {
        (self.right - self.left - 1) / 2
    }

    /// Strict containment: `other` is a proper descendant of `self`
    pub fn contains(&self, other: &Node) -> bool {
        self.partition_key == other.partition_key
            && self.left < other.left
            && self.right > other.right
    }

    /// Inclusive containment: `other` is `self` or one of its descendants
    pub fn encloses(&self, other: &Node) -> bool {
        self.partition_key == other.partition_key
            && self.left <= other.left
            && self.right >= other.right
    }
}

/// A detached node payload, not yet assigned an interval, depth or parent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewNode {
    /// Display value; must be non-blank
    pub label: String,
}

impl NewNode {
    /// Create a detached payload with the given label
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }

    /// Whether the label is empty or whitespace only
    pub fn is_blank(&self) -> bool {
        self.label.trim().is_empty()
    }
}

/// What an insert operation attaches or relocates
///
/// Engine operations branch on this tag instead of asking the store whether a
/// record is new.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "node", rename_all = "camelCase")]
pub enum InsertionSubject {
    /// A new node, attached as a leaf
    Detached(NewNode),

    /// An attached node, relocated together with its subtree
    Existing(Node),
}

impl InsertionSubject {
    /// Width the subject needs at its destination
    pub fn span(&self) -> i64 {
        match self {
            Self::Detached(_) => 2,
            Self::Existing(node) => node.span(),
        }
    }

    /// Label of the subject, for logging
    pub fn label(&self) -> &str {
        match self {
            Self::Detached(payload) => &payload.label,
            Self::Existing(node) => &node.label,
        }
    }
}

impl From<NewNode> for InsertionSubject {
    fn from(payload: NewNode) -> Self {
        Self::Detached(payload)
    }
}

impl From<Node> for InsertionSubject {
    fn from(node: Node) -> Self {
        Self::Existing(node)
    }
}

/// Fully-positioned row handed to [`StoreTransaction::insert`]
///
/// [`StoreTransaction::insert`]: crate::db::StoreTransaction::insert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodePayload {
    pub partition_key: String,
    pub parent_id: Option<NodeId>,
    pub left: i64,
    pub right: i64,
    pub depth: i64,
    pub label: String,
}

impl NodePayload {
    /// Attach the store-assigned id, producing the stored row
    pub fn into_node(self, id: NodeId) -> Node {
        Node {
            id,
            partition_key: self.partition_key,
            parent_id: self.parent_id,
            left: self.left,
            right: self.right,
            depth: self.depth,
            label: self.label,
        }
    }
}
