//! Tree Demo Binary
//!
//! Seeds a small category tree into a SQLite file, moves a subtree around
//! and prints every node with its full path.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin tree-demo
//!
//! # Custom database file and partition, verbose logging
//! NESTREE_DB_PATH=/tmp/tree.db NESTREE_PARTITION=shop RUST_LOG=debug cargo run --bin tree-demo
//! ```
//!
//! # Environment Variables
//!
//! - `NESTREE_DB_PATH`: Database file (default: ./nestree-demo.db)
//! - `NESTREE_PARTITION`: Partition to seed (default: "demo")
//! - `NESTREE_STORE_CONFIG`: Optional JSON file with a `StoreConfig`
//! - `NESTREE_DUMP_JSON`: When set, also print the rows as JSON
//! - `RUST_LOG`: Logging level (e.g., "info", "debug", "trace")

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use nestree_core::db::DatabaseService;
use nestree_core::{NewNode, SqliteStore, StoreConfig, TreeService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let db_path: PathBuf = env::var("NESTREE_DB_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("nestree-demo.db"));
    let partition = env::var("NESTREE_PARTITION").unwrap_or_else(|_| "demo".to_string());

    let store_config = match env::var("NESTREE_STORE_CONFIG") {
        Ok(path) => {
            let json = tokio::fs::read_to_string(&path).await?;
            StoreConfig::from_json_str(&json)?
        }
        Err(_) => StoreConfig::default(),
    };

    tracing::info!("Database: {}", db_path.display());
    tracing::info!("Partition: {}", partition);

    let db = DatabaseService::new(db_path, store_config).await?;
    let service = TreeService::new(Arc::new(SqliteStore::new(Arc::new(db))));

    if service.list_children(&partition).await?.is_empty() {
        seed(&service, &partition).await?;
    } else {
        tracing::info!("Partition '{}' already seeded; printing it as is", partition);
    }

    service.verify_partition(&partition).await?;

    for node in service.list_children(&partition).await? {
        let indent = "  ".repeat((node.depth + 1).max(0) as usize);
        let marker = if node.is_leaf() { "-" } else { "+" };
        println!(
            "{}{} {} [{}, {}]  {}",
            indent,
            marker,
            node.label,
            node.left,
            node.right,
            service.full_path(&node, " > ").await?
        );
    }

    if env::var("NESTREE_DUMP_JSON").is_ok() {
        let nodes = service.list_children(&partition).await?;
        println!("{}", serde_json::to_string_pretty(&nodes)?);
    }

    Ok(())
}

async fn seed(service: &TreeService, partition: &str) -> anyhow::Result<()> {
    let root = service.create_root(partition, "Catalog").await?;
    let books = service.append_child(&root, NewNode::new("Books")).await?;
    let music = service.append_child(&root, NewNode::new("Music")).await?;

    let fiction = service.append_child(&books, NewNode::new("Fiction")).await?;
    service.insert_after(&fiction, NewNode::new("Poetry")).await?;
    service.append_child(&music, NewNode::new("Jazz")).await?;
    let vinyl = service.append_child(&root, NewNode::new("Vinyl")).await?;

    // Vinyl belongs under Music, right before Jazz
    let jazz = service
        .children(&service.require_node(partition, music.id).await?)
        .await?
        .into_iter()
        .find(|n| n.label == "Jazz")
        .ok_or_else(|| anyhow::anyhow!("Jazz missing after seeding"))?;
    service.insert_before(&jazz, vinyl).await?;

    tracing::info!("Seeded partition '{}'", partition);
    Ok(())
}
