//! MemoryStore - in-process NodeStore
//!
//! Keeps each partition as a vector of rows behind its own async mutex. A
//! transaction holds that mutex for its whole lifetime and works on a copy of
//! the rows; `commit` swaps the copy in, `rollback` or drop throws it away.
//! Partitions never share a lock, so transactions on different partitions run
//! fully concurrently.
//!
//! Fault injection (`fail_after_writes`, `fail_next_commit`) lets tests
//! exercise the engine's rollback paths against a store that breaks halfway
//! through an operation.

use crate::db::node_store::{FieldDeltas, NodeFilter, NodeStore, RangePredicate, StoreTransaction};
use crate::db::StoreError;
use crate::models::{Node, NodePayload};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;

type PartitionRows = Arc<tokio::sync::Mutex<Vec<Node>>>;

/// Pending injected failures
#[derive(Debug, Default)]
struct FaultPlan {
    /// Number of mutating calls that still succeed before one fails
    writes_before_failure: Option<usize>,
    fail_next_commit: bool,
}

/// In-process store for tests and embedding
#[derive(Debug, Default)]
pub struct MemoryStore {
    partitions: Mutex<HashMap<String, PartitionRows>>,
    next_id: Arc<AtomicI64>,
    faults: Arc<Mutex<FaultPlan>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Let `count` more mutating calls succeed, then fail the next one
    pub fn fail_after_writes(&self, count: usize) {
        lock(&self.faults).writes_before_failure = Some(count);
    }

    /// Fail the next commit on any partition
    pub fn fail_next_commit(&self) {
        lock(&self.faults).fail_next_commit = true;
    }

    /// Drop any pending injected failure
    pub fn clear_faults(&self) {
        *lock(&self.faults) = FaultPlan::default();
    }

    /// Rows of an existing partition, without registering unknown keys
    fn existing_partition(&self, partition_key: &str) -> Option<PartitionRows> {
        lock(&self.partitions).get(partition_key).cloned()
    }

    /// Rows of a partition, created empty on first write
    fn partition(&self, partition_key: &str) -> PartitionRows {
        lock(&self.partitions)
            .entry(partition_key.to_string())
            .or_default()
            .clone()
    }
}

/// Lock a std mutex, recovering the guard if a holder panicked
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn select(rows: &[Node], filter: NodeFilter) -> Vec<Node> {
    rows.iter().filter(|n| filter.matches(n)).cloned().collect()
}

#[async_trait]
impl NodeStore for MemoryStore {
    async fn read(&self, partition_key: &str, filter: NodeFilter) -> Result<Vec<Node>, StoreError> {
        let Some(rows) = self.existing_partition(partition_key) else {
            return Ok(Vec::new());
        };
        let rows = rows.lock().await;
        Ok(select(&rows, filter))
    }

    async fn begin_transaction(
        &self,
        partition_key: &str,
    ) -> Result<Box<dyn StoreTransaction>, StoreError> {
        let committed = self.partition(partition_key).lock_owned().await;
        let working = committed.clone();

        Ok(Box::new(MemoryTransaction {
            partition_key: partition_key.to_string(),
            committed,
            working,
            next_id: self.next_id.clone(),
            faults: self.faults.clone(),
        }))
    }
}

struct MemoryTransaction {
    partition_key: String,
    committed: OwnedMutexGuard<Vec<Node>>,
    working: Vec<Node>,
    next_id: Arc<AtomicI64>,
    faults: Arc<Mutex<FaultPlan>>,
}

impl MemoryTransaction {
    fn check_write_fault(&self) -> Result<(), StoreError> {
        let mut faults = lock(&self.faults);
        match faults.writes_before_failure {
            Some(0) => {
                faults.writes_before_failure = None;
                Err(StoreError::backend("injected write failure"))
            }
            Some(remaining) => {
                faults.writes_before_failure = Some(remaining - 1);
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn sort(&mut self) {
        self.working.sort_by_key(|n| n.left);
    }
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    fn partition_key(&self) -> &str {
        &self.partition_key
    }

    async fn read(&mut self, filter: NodeFilter) -> Result<Vec<Node>, StoreError> {
        Ok(select(&self.working, filter))
    }

    async fn write_many(
        &mut self,
        range: RangePredicate,
        deltas: FieldDeltas,
    ) -> Result<u64, StoreError> {
        self.check_write_fault()?;

        let mut affected = 0;
        for node in self.working.iter_mut().filter(|n| range.matches(n)) {
            deltas.apply(node);
            affected += 1;
        }
        self.sort();
        Ok(affected)
    }

    async fn insert(&mut self, payload: NodePayload) -> Result<Node, StoreError> {
        self.check_write_fault()?;

        if payload.partition_key != self.partition_key {
            return Err(StoreError::backend(format!(
                "cannot insert into partition '{}' from a transaction on '{}'",
                payload.partition_key, self.partition_key
            )));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let node = payload.into_node(id);
        self.working.push(node.clone());
        self.sort();
        Ok(node)
    }

    async fn update(&mut self, node: &Node) -> Result<(), StoreError> {
        self.check_write_fault()?;

        let row = self
            .working
            .iter_mut()
            .find(|n| n.id == node.id)
            .ok_or_else(|| StoreError::row_missing(node.id, self.partition_key.as_str()))?;
        *row = node.clone();
        row.partition_key = self.partition_key.clone();
        self.sort();
        Ok(())
    }

    async fn delete_many(&mut self, left: i64, right: i64) -> Result<u64, StoreError> {
        self.check_write_fault()?;

        let before = self.working.len();
        self.working.retain(|n| !(n.left >= left && n.right <= right));
        Ok((before - self.working.len()) as u64)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTransaction {
            mut committed,
            working,
            faults,
            ..
        } = *self;

        {
            let mut faults = lock(&faults);
            if faults.fail_next_commit {
                faults.fail_next_commit = false;
                return Err(StoreError::backend("injected commit failure"));
            }
        }

        *committed = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}
