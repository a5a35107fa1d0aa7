//! Tree Service - nested-set operations over a partitioned store
//!
//! `TreeService` owns the interval algorithm: it turns "append", "insert
//! before/after", "remove" and "move" requests into gap openings, subtree
//! carries and gap closings, applied through one `StoreTransaction`.
//!
//! # Consistency
//!
//! - Every mutation runs in exactly one transaction on the node's partition.
//!   Either every range update of the operation commits or none does.
//! - Nodes passed in by the caller are snapshots. Mutations re-read them by
//!   id inside the transaction and re-validate before the first write.
//! - With `verify_after_write` enabled, the whole partition is checked for
//!   interval invariants before commit; a violation rolls back.
//!
//! Read operations (`parent_node`, `full_path`, `ancestors`, ...) take the
//! bounds of the node they are given at face value and open no transaction,
//! so callers pass a node read after the last mutation.

use crate::config::TreeConfig;
use crate::db::{NodeFilter, NodeStore, StoreTransaction};
use crate::models::{InsertionSubject, NewNode, Node, NodeId, NodePayload, ROOT_DEPTH};
use crate::operations::intervals::{close_gap, open_gap, InsertionPoint, MovePlan, LEAF_SPAN};
use crate::operations::{validation, verify_nodes, TreeError, ValidationError};
use crate::services::transaction::with_transaction;
use serde_json::json;
use std::sync::Arc;
use tracing::instrument;

/// Nested-set tree engine
///
/// Cheap to share: wrap it in an `Arc` or clone the store handle into
/// several services. All coordination happens in the store.
///
/// # Examples
///
/// ```rust,no_run
/// use nestree_core::db::MemoryStore;
/// use nestree_core::models::NewNode;
/// use nestree_core::services::TreeService;
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let service = TreeService::new(Arc::new(MemoryStore::new()));
///
/// let root = service.create_root("blog", "Categories").await?;
/// let rust = service.append_child(&root, NewNode::new("Rust")).await?;
/// let async_rust = service.append_child(&rust, NewNode::new("Async")).await?;
///
/// assert_eq!(service.full_path(&async_rust, " > ").await?, "Rust > Async");
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct TreeService {
    store: Arc<dyn NodeStore>,
    config: TreeConfig,
}

impl std::fmt::Debug for TreeService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeService")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl TreeService {
    /// Create a service with the default configuration
    pub fn new(store: Arc<dyn NodeStore>) -> Self {
        Self {
            store,
            config: TreeConfig::default(),
        }
    }

    /// Create a service with explicit settings
    ///
    /// # Errors
    ///
    /// `ValidationError::InvalidConfig` when `config.validate()` fails.
    pub fn with_config(store: Arc<dyn NodeStore>, config: TreeConfig) -> Result<Self, TreeError> {
        config.validate().map_err(ValidationError::InvalidConfig)?;
        Ok(Self { store, config })
    }

    pub fn store(&self) -> &Arc<dyn NodeStore> {
        &self.store
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    // ---------------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------------

    /// All nodes of a partition in pre-order (ascending `left`)
    ///
    /// Every ancestor precedes its descendants and siblings appear in their
    /// left-to-right order. An unknown partition yields an empty list.
    pub async fn list_children(&self, partition_key: &str) -> Result<Vec<Node>, TreeError> {
        Ok(self.store.read(partition_key, NodeFilter::All).await?)
    }

    /// Current row of a node, or `None` if it does not exist in the partition
    pub async fn get_node(&self, partition_key: &str, id: NodeId) -> Result<Option<Node>, TreeError> {
        let rows = self.store.read(partition_key, NodeFilter::Id(id)).await?;
        Ok(rows.into_iter().next())
    }

    /// Current row of a node
    ///
    /// # Errors
    ///
    /// `ValidationError::NodeNotFound` when the node does not exist.
    pub async fn require_node(&self, partition_key: &str, id: NodeId) -> Result<Node, TreeError> {
        self.get_node(partition_key, id)
            .await?
            .ok_or_else(|| ValidationError::node_not_found(id, partition_key).into())
    }

    /// The node one level up whose interval strictly encloses `node`
    ///
    /// `None` for a root sentinel.
    pub async fn parent_node(&self, node: &Node) -> Result<Option<Node>, TreeError> {
        if node.is_root() {
            return Ok(None);
        }

        let enclosing = self.store.read(&node.partition_key, strictly_enclosing(node)).await?;
        Ok(pick_parent(enclosing, node))
    }

    /// Labels from the top-level ancestor down to `node`, joined by `separator`
    ///
    /// The root sentinel is left out; a root's own path is its label.
    ///
    /// # Errors
    ///
    /// `ValidationError::NodeNotFound` when `node` is no longer at the bounds
    /// it carries.
    pub async fn full_path(&self, node: &Node, separator: &str) -> Result<String, TreeError> {
        if node.is_root() {
            return Ok(node.label.clone());
        }

        let chain = self
            .store
            .read(
                &node.partition_key,
                NodeFilter::Enclosing {
                    left: node.left,
                    right: node.right,
                    inclusive: true,
                },
            )
            .await?;

        if !chain.iter().any(|n| n.id == node.id) {
            return Err(ValidationError::node_not_found(node.id, node.partition_key.as_str()).into());
        }

        let labels: Vec<&str> = chain
            .iter()
            .filter(|n| n.depth != ROOT_DEPTH)
            .map(|n| n.label.as_str())
            .collect();
        Ok(labels.join(separator))
    }

    /// `full_path` with the configured default separator
    pub async fn full_path_default(&self, node: &Node) -> Result<String, TreeError> {
        self.full_path(node, &self.config.default_separator).await
    }

    /// Direct children of `node`, left to right
    pub async fn children(&self, node: &Node) -> Result<Vec<Node>, TreeError> {
        Ok(self
            .store
            .read(&node.partition_key, NodeFilter::ChildrenOf(node.id))
            .await?)
    }

    /// Every node strictly enclosing `node`, outermost first (root included)
    pub async fn ancestors(&self, node: &Node) -> Result<Vec<Node>, TreeError> {
        Ok(self
            .store
            .read(&node.partition_key, strictly_enclosing(node))
            .await?)
    }

    /// Every node strictly inside `node`'s interval, in pre-order
    pub async fn descendants(&self, node: &Node) -> Result<Vec<Node>, TreeError> {
        Ok(self
            .store
            .read(
                &node.partition_key,
                NodeFilter::Within {
                    left: node.left,
                    right: node.right,
                    inclusive: false,
                },
            )
            .await?)
    }

    /// Check every interval invariant of a partition
    ///
    /// # Errors
    ///
    /// `TreeError::InvariantViolation` naming the first broken invariant.
    pub async fn verify_partition(&self, partition_key: &str) -> Result<(), TreeError> {
        let rows = self.store.read(partition_key, NodeFilter::All).await?;
        verify_nodes(partition_key, &rows)
    }

    // ---------------------------------------------------------------------
    // Mutations
    // ---------------------------------------------------------------------

    /// Create the root sentinel `[0, 1]` at depth -1 of an empty partition
    ///
    /// # Errors
    ///
    /// - `ValidationError::BlankLabel`
    /// - `ValidationError::PartitionNotEmpty` if the partition has any node
    #[instrument(skip(self))]
    pub async fn create_root(&self, partition_key: &str, label: &str) -> Result<Node, TreeError> {
        let payload = NewNode::new(label);
        let context = json!({ "partitionKey": partition_key, "subject": payload });

        let result = async {
            validation::check_label(&payload)?;
            let root = self
                .mutate(partition_key, |mut tx| async move {
                    let outcome = self.create_root_in(&mut *tx, payload).await;
                    (tx, outcome)
                })
                .await?;

            tracing::info!(
                "Created root {} '{}' in partition '{}'",
                root.id,
                root.label,
                partition_key
            );
            Ok::<_, TreeError>(root)
        }
        .await;

        report("create_root", &context, result)
    }

    /// Attach `subject` as the last child of `parent`
    ///
    /// A detached subject becomes a leaf; an existing node is moved together
    /// with its subtree. Returns the subject's row after the operation.
    ///
    /// # Errors
    ///
    /// - `ValidationError` for a blank label, a partition crossing, a move into
    ///   the subject's own subtree, or a node missing from the store
    /// - `StoreError` from any read, write or transaction step
    /// - `TreeError::InvariantViolation` from post-write verification
    #[instrument(skip(self, parent, subject), fields(partition = %parent.partition_key, parent_id = parent.id))]
    pub async fn append_child(
        &self,
        parent: &Node,
        subject: impl Into<InsertionSubject>,
    ) -> Result<Node, TreeError> {
        let subject = subject.into();
        let context = json!({ "target": parent, "subject": subject });

        let result = async {
            validation::check_subject(&subject, parent)?;
            let parent_id = parent.id;
            let placed = self
                .mutate(&parent.partition_key, |mut tx| async move {
                    let outcome = self.append_child_in(&mut *tx, parent_id, subject).await;
                    (tx, outcome)
                })
                .await?;

            tracing::info!(
                "Placed node {} as last child of {} in partition '{}'",
                placed.id,
                parent_id,
                placed.partition_key
            );
            Ok::<_, TreeError>(placed)
        }
        .await;

        report("append_child", &context, result)
    }

    /// Place `subject` immediately before `reference`, as its sibling
    ///
    /// # Errors
    ///
    /// As `append_child`, plus `ValidationError::SiblingOfRoot` when
    /// `reference` is a root sentinel.
    #[instrument(skip(self, reference, subject), fields(partition = %reference.partition_key, reference_id = reference.id))]
    pub async fn insert_before(
        &self,
        reference: &Node,
        subject: impl Into<InsertionSubject>,
    ) -> Result<Node, TreeError> {
        let subject = subject.into();
        let context = json!({ "target": reference, "subject": subject });

        let result = async {
            validation::check_sibling_target(reference)?;
            validation::check_subject(&subject, reference)?;
            let reference_id = reference.id;
            let placed = self
                .mutate(&reference.partition_key, |mut tx| async move {
                    let outcome = self.insert_before_in(&mut *tx, reference_id, subject).await;
                    (tx, outcome)
                })
                .await?;

            tracing::info!(
                "Placed node {} before {} in partition '{}'",
                placed.id,
                reference_id,
                placed.partition_key
            );
            Ok::<_, TreeError>(placed)
        }
        .await;

        report("insert_before", &context, result)
    }

    /// Place `subject` immediately after `reference`, as its sibling
    ///
    /// Lands before the next sibling of `reference`, or as the last child of
    /// the parent when `reference` is the last child. Both lookups happen in
    /// the same transaction as the write.
    ///
    /// # Errors
    ///
    /// As `insert_before`.
    #[instrument(skip(self, reference, subject), fields(partition = %reference.partition_key, reference_id = reference.id))]
    pub async fn insert_after(
        &self,
        reference: &Node,
        subject: impl Into<InsertionSubject>,
    ) -> Result<Node, TreeError> {
        let subject = subject.into();
        let context = json!({ "target": reference, "subject": subject });

        let result = async {
            validation::check_sibling_target(reference)?;
            validation::check_subject(&subject, reference)?;
            let reference_id = reference.id;
            let placed = self
                .mutate(&reference.partition_key, |mut tx| async move {
                    let outcome = self.insert_after_in(&mut *tx, reference_id, subject).await;
                    (tx, outcome)
                })
                .await?;

            tracing::info!(
                "Placed node {} after {} in partition '{}'",
                placed.id,
                reference_id,
                placed.partition_key
            );
            Ok::<_, TreeError>(placed)
        }
        .await;

        report("insert_after", &context, result)
    }

    /// Delete `node` and its whole subtree, closing the gap it leaves
    ///
    /// Returns the number of deleted rows.
    ///
    /// # Errors
    ///
    /// - `ValidationError::NodeNotFound` when the node no longer exists
    /// - `StoreError` / `InvariantViolation` as for the other mutations
    #[instrument(skip(self, node), fields(partition = %node.partition_key, node_id = node.id))]
    pub async fn remove_node(&self, node: &Node) -> Result<u64, TreeError> {
        let context = json!({ "target": node });
        let node_id = node.id;

        let result = async {
            let removed = self
                .mutate(&node.partition_key, |mut tx| async move {
                    let outcome = self.remove_node_in(&mut *tx, node_id).await;
                    (tx, outcome)
                })
                .await?;

            tracing::info!(
                "Removed node {} and {} descendant(s) from partition '{}'",
                node_id,
                removed.saturating_sub(1),
                node.partition_key
            );
            Ok::<_, TreeError>(removed)
        }
        .await;

        report("remove_node", &context, result)
    }

    // ---------------------------------------------------------------------
    // Transaction bodies
    // ---------------------------------------------------------------------

    async fn mutate<T, F, Fut>(&self, partition_key: &str, body: F) -> Result<T, TreeError>
    where
        F: FnOnce(Box<dyn StoreTransaction>) -> Fut,
        Fut: std::future::Future<Output = (Box<dyn StoreTransaction>, Result<T, TreeError>)>,
    {
        with_transaction(
            self.store.as_ref(),
            partition_key,
            self.config.transaction_timeout(),
            body,
        )
        .await
    }

    async fn create_root_in(
        &self,
        tx: &mut dyn StoreTransaction,
        payload: NewNode,
    ) -> Result<Node, TreeError> {
        let existing = tx.read(NodeFilter::All).await?;
        if !existing.is_empty() {
            return Err(ValidationError::PartitionNotEmpty {
                partition_key: tx.partition_key().to_string(),
                count: existing.len(),
            }
            .into());
        }

        let partition_key = tx.partition_key().to_string();
        let root = tx
            .insert(NodePayload {
                partition_key,
                parent_id: None,
                left: 0,
                right: 1,
                depth: ROOT_DEPTH,
                label: payload.label,
            })
            .await?;

        self.verify_in(tx).await?;
        Ok(root)
    }

    async fn append_child_in(
        &self,
        tx: &mut dyn StoreTransaction,
        parent_id: NodeId,
        subject: InsertionSubject,
    ) -> Result<Node, TreeError> {
        let parent = reload(tx, parent_id).await?;
        let point = InsertionPoint::last_child_of(&parent);
        self.place(tx, &parent, point, subject).await
    }

    async fn insert_before_in(
        &self,
        tx: &mut dyn StoreTransaction,
        reference_id: NodeId,
        subject: InsertionSubject,
    ) -> Result<Node, TreeError> {
        let reference = reload(tx, reference_id).await?;
        validation::check_sibling_target(&reference)?;
        let point = InsertionPoint::before(&reference);
        self.place(tx, &reference, point, subject).await
    }

    async fn insert_after_in(
        &self,
        tx: &mut dyn StoreTransaction,
        reference_id: NodeId,
        subject: InsertionSubject,
    ) -> Result<Node, TreeError> {
        let reference = reload(tx, reference_id).await?;
        validation::check_sibling_target(&reference)?;

        let subject_id = match &subject {
            InsertionSubject::Existing(node) => {
                let fresh = reload(tx, node.id).await?;
                validation::check_movable(&fresh, &reference)?;
                Some(fresh.id)
            }
            InsertionSubject::Detached(_) => None,
        };

        // The subject itself never serves as its own anchor
        let next_sibling = tx
            .read(NodeFilter::SiblingsAfter {
                parent_id: reference.parent_id,
                after: reference.right,
            })
            .await?
            .into_iter()
            .find(|n| Some(n.id) != subject_id);

        match next_sibling {
            Some(next) => {
                let point = InsertionPoint::before(&next);
                self.place(tx, &next, point, subject).await
            }
            None => {
                let enclosing = tx.read(strictly_enclosing(&reference)).await?;
                let parent = pick_parent(enclosing, &reference).ok_or_else(|| {
                    TreeError::invariant_violation(
                        tx.partition_key(),
                        format!("node {} has no enclosing parent", reference.id),
                    )
                })?;
                let point = InsertionPoint::last_child_of(&parent);
                self.place(tx, &parent, point, subject).await
            }
        }
    }

    async fn remove_node_in(
        &self,
        tx: &mut dyn StoreTransaction,
        node_id: NodeId,
    ) -> Result<u64, TreeError> {
        let node = reload(tx, node_id).await?;
        tracing::debug!(
            "Removing node {} with {} descendant(s) at [{}, {}]",
            node.id,
            node.descendant_count(),
            node.left,
            node.right
        );

        let removed = tx.delete_many(node.left, node.right).await?;
        for (range, deltas) in close_gap(node.right, node.span()) {
            tx.write_many(range, deltas).await?;
        }

        self.verify_in(tx).await?;
        Ok(removed)
    }

    /// Put `subject` at `point`, `target` being the node `point` was derived from
    async fn place(
        &self,
        tx: &mut dyn StoreTransaction,
        target: &Node,
        point: InsertionPoint,
        subject: InsertionSubject,
    ) -> Result<Node, TreeError> {
        let placed = match subject {
            InsertionSubject::Detached(payload) => {
                validation::check_label(&payload)?;
                self.attach_leaf(tx, point, payload).await?
            }
            InsertionSubject::Existing(snapshot) => {
                let node = reload(tx, snapshot.id).await?;
                validation::check_movable(&node, target)?;
                self.relocate(tx, node, point).await?
            }
        };

        self.verify_in(tx).await?;
        Ok(placed)
    }

    async fn attach_leaf(
        &self,
        tx: &mut dyn StoreTransaction,
        point: InsertionPoint,
        payload: NewNode,
    ) -> Result<Node, TreeError> {
        for (range, deltas) in open_gap(point.position, LEAF_SPAN) {
            tx.write_many(range, deltas).await?;
        }

        let partition_key = tx.partition_key().to_string();
        let node = tx
            .insert(NodePayload {
                partition_key,
                parent_id: point.parent_id,
                left: point.position,
                right: point.position + LEAF_SPAN - 1,
                depth: point.depth,
                label: payload.label,
            })
            .await?;
        Ok(node)
    }

    async fn relocate(
        &self,
        tx: &mut dyn StoreTransaction,
        node: Node,
        point: InsertionPoint,
    ) -> Result<Node, TreeError> {
        let plan = MovePlan::new(&node, &point);
        if plan.is_noop(&node) && node.parent_id == point.parent_id {
            tracing::debug!("Node {} already at left {}; nothing to move", node.id, node.left);
            return Ok(node);
        }

        tracing::debug!(
            "Moving node {} [{}, {}] to left {} (carry {}, depth {:+})",
            node.id,
            node.left,
            node.right,
            plan.final_left(),
            plan.carry,
            plan.depth_delta
        );

        for (range, deltas) in open_gap(plan.position, plan.span) {
            tx.write_many(range, deltas).await?;
        }
        let (range, deltas) = plan.carry_update();
        tx.write_many(range, deltas).await?;
        for (range, deltas) in close_gap(plan.moved_right, plan.span) {
            tx.write_many(range, deltas).await?;
        }

        let mut moved = reload(tx, node.id).await?;
        if moved.parent_id != point.parent_id {
            moved.parent_id = point.parent_id;
            tx.update(&moved).await?;
        }
        Ok(moved)
    }

    async fn verify_in(&self, tx: &mut dyn StoreTransaction) -> Result<(), TreeError> {
        if !self.config.verify_after_write {
            return Ok(());
        }
        let rows = tx.read(NodeFilter::All).await?;
        verify_nodes(tx.partition_key(), &rows)
    }
}

/// Re-read a node inside the transaction
async fn reload(tx: &mut dyn StoreTransaction, id: NodeId) -> Result<Node, TreeError> {
    let rows = tx.read(NodeFilter::Id(id)).await?;
    rows.into_iter()
        .next()
        .ok_or_else(|| ValidationError::node_not_found(id, tx.partition_key()).into())
}

fn strictly_enclosing(node: &Node) -> NodeFilter {
    NodeFilter::Enclosing {
        left: node.left,
        right: node.right,
        inclusive: false,
    }
}

/// The enclosing node exactly one level above `node`
fn pick_parent(enclosing: Vec<Node>, node: &Node) -> Option<Node> {
    enclosing
        .into_iter()
        .find(|n| n.depth == node.depth - 1 && n.contains(node))
}

/// Log a failed operation with the rows involved, then pass the result through
fn report<T>(operation: &str, context: &serde_json::Value, result: Result<T, TreeError>) -> Result<T, TreeError> {
    if let Err(err) = &result {
        match err {
            TreeError::Validation(_) => {
                tracing::warn!("{} rejected: {} [VALUES: {}]", operation, err, context)
            }
            TreeError::Storage(_) | TreeError::InvariantViolation { .. } => {
                tracing::error!("{} failed: {} [VALUES: {}]", operation, err, context)
            }
        }
    }
    result
}

// Comprehensive tests in separate module
#[cfg(test)]
#[path = "tree_service_test.rs"]
mod tree_service_test;
