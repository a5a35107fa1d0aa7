//! Per-partition transaction serialization
//!
//! Mutations on the same partition must run one at a time for the interval
//! encoding to stay consistent, while different partitions never wait on
//! each other. `PartitionLocks` hands out one async mutex per partition key;
//! the guard is owned so it can live inside a transaction handle, and the
//! key's entry is dropped again once no transaction holds or awaits it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::OwnedMutexGuard;

type LockMap = HashMap<String, Arc<tokio::sync::Mutex<()>>>;

/// Registry of per-partition async mutexes
#[derive(Debug, Default)]
pub struct PartitionLocks {
    locks: Arc<Mutex<LockMap>>,
}

/// Guard held for the lifetime of a partition transaction
#[derive(Debug)]
pub struct PartitionGuard {
    guard: Option<OwnedMutexGuard<()>>,
    partition_key: String,
    locks: Arc<Mutex<LockMap>>,
}

impl PartitionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to a partition
    pub async fn acquire(&self, partition_key: &str) -> PartitionGuard {
        let lock = self.lock_for(partition_key);
        let guard = lock.lock_owned().await;

        PartitionGuard {
            guard: Some(guard),
            partition_key: partition_key.to_string(),
            locks: self.locks.clone(),
        }
    }

    fn lock_for(&self, partition_key: &str) -> Arc<tokio::sync::Mutex<()>> {
        lock_map(&self.locks)
            .entry(partition_key.to_string())
            .or_default()
            .clone()
    }
}

impl Drop for PartitionGuard {
    fn drop(&mut self) {
        // Release first so the map holds the only other reference.
        drop(self.guard.take());

        let mut locks = lock_map(&self.locks);
        let idle = locks
            .get(&self.partition_key)
            .is_some_and(|lock| Arc::strong_count(lock) == 1);
        if idle {
            locks.remove(&self.partition_key);
        }
    }
}

fn lock_map(locks: &Mutex<LockMap>) -> MutexGuard<'_, LockMap> {
    // Poisoning cannot leave the map half-updated.
    match locks.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
