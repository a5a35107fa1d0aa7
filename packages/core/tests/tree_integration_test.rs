//! Integration tests for TreeService on the SQLite store
//!
//! Tests cover:
//! - A scripted sequence of inserts, moves and removals with invariant
//!   checks after every step
//! - Data surviving a reopen of the database file
//! - Custom table and column names
//! - Partition isolation through the public API

use anyhow::Result;
use nestree_core::{
    db::DatabaseService, NewNode, Node, SqliteStore, StoreConfig, TreeService,
};
use std::sync::Arc;
use tempfile::TempDir;

/// Test helper: Create a service on a fresh database file
async fn create_test_env(config: StoreConfig) -> Result<(TreeService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let service = open_service(&temp_dir, config).await?;
    Ok((service, temp_dir))
}

async fn open_service(temp_dir: &TempDir, config: StoreConfig) -> Result<TreeService> {
    let db_path = temp_dir.path().join("tree.db");
    let db = DatabaseService::new(db_path, config).await?;
    Ok(TreeService::new(Arc::new(SqliteStore::new(Arc::new(db)))))
}

async fn fresh(service: &TreeService, node: &Node) -> Result<Node> {
    Ok(service.require_node(&node.partition_key, node.id).await?)
}

fn labels(nodes: &[Node]) -> Vec<String> {
    nodes.iter().map(|n| n.label.clone()).collect()
}

// =========================================================================
// Scripted Mutation Sequence
// =========================================================================

#[tokio::test]
async fn test_mutation_sequence_keeps_invariants() -> Result<()> {
    let (service, _temp_dir) = create_test_env(StoreConfig::default()).await?;

    let root = service.create_root("catalog", "Catalog").await?;
    let books = service.append_child(&root, NewNode::new("Books")).await?;
    let music = service.append_child(&root, NewNode::new("Music")).await?;
    let fiction = service.append_child(&books, NewNode::new("Fiction")).await?;
    let poetry = service.insert_after(&fiction, NewNode::new("Poetry")).await?;
    let essays = service.insert_before(&fiction, NewNode::new("Essays")).await?;
    let jazz = service.append_child(&music, NewNode::new("Jazz")).await?;
    service.verify_partition("catalog").await?;

    assert_eq!(
        labels(&service.list_children("catalog").await?),
        vec!["Catalog", "Books", "Essays", "Fiction", "Poetry", "Music", "Jazz"]
    );

    // Poetry moves under Music, after Jazz
    let poetry = service.insert_after(&jazz, poetry).await?;
    assert_eq!(poetry.depth, 1);
    service.verify_partition("catalog").await?;

    // The Books subtree moves below Jazz, two levels deeper
    let books = service.append_child(&jazz, fresh(&service, &books).await?).await?;
    assert_eq!(books.depth, 2);
    service.verify_partition("catalog").await?;

    let fiction = fresh(&service, &fiction).await?;
    assert_eq!(fiction.depth, 3);
    assert_eq!(
        service.full_path(&fiction, " > ").await?,
        "Music > Jazz > Books > Fiction"
    );

    // Essays comes back to the top level, first among the root's children
    let music = fresh(&service, &music).await?;
    service.insert_before(&music, essays).await?;
    service.verify_partition("catalog").await?;

    assert_eq!(
        labels(&service.list_children("catalog").await?),
        vec!["Catalog", "Essays", "Music", "Jazz", "Books", "Fiction", "Poetry"]
    );

    let jazz = fresh(&service, &jazz).await?;
    assert_eq!(service.remove_node(&jazz).await?, 3);
    service.verify_partition("catalog").await?;

    let nodes = service.list_children("catalog").await?;
    assert_eq!(labels(&nodes), vec!["Catalog", "Essays", "Music", "Poetry"]);
    let root = fresh(&service, &root).await?;
    assert_eq!((root.left, root.right), (0, 7));

    Ok(())
}

// =========================================================================
// Persistence Tests
// =========================================================================

#[tokio::test]
async fn test_tree_survives_reopen() -> Result<()> {
    let temp_dir = TempDir::new()?;

    let (root_id, leaf_id) = {
        let service = open_service(&temp_dir, StoreConfig::default()).await?;
        let root = service.create_root("p", "root").await?;
        let a = service.append_child(&root, NewNode::new("A")).await?;
        let leaf = service.append_child(&a, NewNode::new("leaf")).await?;
        (root.id, leaf.id)
    };

    let service = open_service(&temp_dir, StoreConfig::default()).await?;
    service.verify_partition("p").await?;

    let leaf = service.require_node("p", leaf_id).await?;
    assert_eq!(service.full_path(&leaf, "/").await?, "A/leaf");
    let root = service.require_node("p", root_id).await?;
    assert_eq!(root.right, 5);

    Ok(())
}

// =========================================================================
// Configuration Tests
// =========================================================================

#[tokio::test]
async fn test_custom_table_layout() -> Result<()> {
    let config = StoreConfig::from_json_str(
        r#"{"table_name": "categories", "partition_column": "site_id", "label_column": "title"}"#,
    )?;
    let (service, _temp_dir) = create_test_env(config).await?;

    let root = service.create_root("site-1", "Home").await?;
    let about = service.append_child(&root, NewNode::new("About")).await?;
    assert_eq!(service.full_path_default(&about).await?, "About");
    assert_eq!(service.list_children("site-1").await?.len(), 2);

    Ok(())
}

#[tokio::test]
async fn test_invalid_table_name_rejected() {
    let result = StoreConfig::from_json_str(r#"{"table_name": "nodes; DROP TABLE x"}"#);
    assert!(result.is_err());
}

// =========================================================================
// Partition Isolation Tests
// =========================================================================

#[tokio::test]
async fn test_partitions_do_not_share_intervals() -> Result<()> {
    let (service, _temp_dir) = create_test_env(StoreConfig::default()).await?;

    let one = service.create_root("1", "one").await?;
    let two = service.create_root("2", "two").await?;
    let x = service.append_child(&one, NewNode::new("X")).await?;
    service.append_child(&two, NewNode::new("Y")).await?;
    service.append_child(&two, NewNode::new("Z")).await?;

    // Both partitions use their own coordinate space
    assert_eq!(fresh(&service, &one).await?.right, 3);
    assert_eq!(fresh(&service, &two).await?.right, 5);

    let err = service.append_child(&two, x).await.unwrap_err();
    assert!(err.is_validation());

    service.verify_partition("1").await?;
    service.verify_partition("2").await?;
    Ok(())
}
