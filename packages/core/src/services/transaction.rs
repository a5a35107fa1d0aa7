//! Transaction scoping for tree mutations
//!
//! `with_transaction` is the one place a partition transaction is opened and
//! closed: the body runs against an owned transaction handle and hands it
//! back together with its outcome, then the handle is committed on `Ok` and
//! rolled back on `Err`. If the body overruns the timeout its future is
//! dropped, which drops the handle and discards its changes.

use crate::db::{NodeStore, StoreError, StoreTransaction};
use crate::operations::TreeError;
use std::future::Future;
use std::time::Duration;

/// Run `body` inside one transaction on `partition_key`
///
/// # Errors
///
/// - Whatever the body returns (after rollback)
/// - `StoreError` from begin, commit or rollback
/// - `StoreError::Timeout` if waiting for the partition plus running the
///   body takes longer than `timeout`
pub async fn with_transaction<T, F, Fut>(
    store: &dyn NodeStore,
    partition_key: &str,
    timeout: Duration,
    body: F,
) -> Result<T, TreeError>
where
    F: FnOnce(Box<dyn StoreTransaction>) -> Fut,
    Fut: Future<Output = (Box<dyn StoreTransaction>, Result<T, TreeError>)>,
{
    let scoped = async {
        let tx = store.begin_transaction(partition_key).await?;
        Ok::<_, StoreError>(body(tx).await)
    };

    let (tx, outcome) = match tokio::time::timeout(timeout, scoped).await {
        Ok(Ok(finished)) => finished,
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => {
            tracing::warn!(
                "Transaction on partition '{}' exceeded {:?}; changes discarded",
                partition_key,
                timeout
            );
            return Err(StoreError::timeout(partition_key, timeout).into());
        }
    };

    match outcome {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::error!(
                    "Rollback on partition '{}' failed after '{}': {}",
                    partition_key,
                    err,
                    rollback_err
                );
            }
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemoryStore, NodeFilter};
    use crate::models::NodePayload;
    use crate::operations::ValidationError;

    fn root_payload() -> NodePayload {
        NodePayload {
            partition_key: "p".to_string(),
            parent_id: None,
            left: 0,
            right: 1,
            depth: -1,
            label: "root".to_string(),
        }
    }

    #[tokio::test]
    async fn test_commits_on_success() {
        let store = MemoryStore::new();

        let id = with_transaction(&store, "p", Duration::from_secs(1), |mut tx| async move {
            let outcome = tx
                .insert(root_payload())
                .await
                .map(|n| n.id)
                .map_err(TreeError::from);
            (tx, outcome)
        })
        .await
        .unwrap();

        let rows = store.read("p", NodeFilter::All).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, id);
    }

    #[tokio::test]
    async fn test_rolls_back_on_error() {
        let store = MemoryStore::new();

        let result: Result<(), TreeError> =
            with_transaction(&store, "p", Duration::from_secs(1), |mut tx| async move {
                let outcome = match tx.insert(root_payload()).await {
                    Ok(_) => Err(ValidationError::BlankLabel.into()),
                    Err(e) => Err(e.into()),
                };
                (tx, outcome)
            })
            .await;

        assert!(result.unwrap_err().is_validation());
        assert!(store.read("p", NodeFilter::All).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_timeout_discards_changes() {
        let store = MemoryStore::new();

        let result: Result<(), TreeError> =
            with_transaction(&store, "p", Duration::from_millis(20), |mut tx| async move {
                let inserted = tx.insert(root_payload()).await;
                tokio::time::sleep(Duration::from_secs(5)).await;
                (tx, inserted.map(|_| ()).map_err(TreeError::from))
            })
            .await;

        match result {
            Err(TreeError::Storage(StoreError::Timeout { partition_key, .. })) => {
                assert_eq!(partition_key, "p")
            }
            other => panic!("expected timeout, got {:?}", other),
        }
        assert!(store.read("p", NodeFilter::All).await.unwrap().is_empty());
    }
}
