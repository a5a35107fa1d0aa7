//! Configuration for the tree engine and the SQLite store
//!
//! Both structs are plain serde values with working defaults, so callers can
//! build them in code or load them from a JSON document.

use crate::db::StoreError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::Duration;

/// Pattern accepted for table and column names interpolated into SQL
const IDENTIFIER_PATTERN: &str = r"^[A-Za-z_][A-Za-z0-9_]{0,62}$";

/// Upper bound for the transaction timeout (one hour)
const MAX_TRANSACTION_TIMEOUT_MS: u64 = 60 * 60 * 1000;

/// Engine behaviour settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    /// Separator used by `full_path_default`
    pub default_separator: String,

    /// Re-read the partition before commit and check every interval invariant
    pub verify_after_write: bool,

    /// Upper bound for the body of a mutating operation, in milliseconds
    pub transaction_timeout_ms: u64,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            default_separator: " ".to_string(),
            verify_after_write: true,
            transaction_timeout_ms: 30_000,
        }
    }
}

impl TreeConfig {
    pub fn transaction_timeout(&self) -> Duration {
        Duration::from_millis(self.transaction_timeout_ms)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.transaction_timeout_ms == 0 {
            return Err("transaction_timeout_ms must be greater than 0".to_string());
        }

        if self.transaction_timeout_ms > MAX_TRANSACTION_TIMEOUT_MS {
            return Err(format!(
                "transaction_timeout_ms cannot exceed {}",
                MAX_TRANSACTION_TIMEOUT_MS
            ));
        }

        Ok(())
    }
}

/// Table layout and connection settings for `SqliteStore`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Table holding the node rows
    pub table_name: String,

    /// Column holding the partition key
    pub partition_column: String,

    /// Column holding the display label
    pub label_column: String,

    /// How long SQLite waits on a locked database before failing
    pub busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            table_name: "tree_nodes".to_string(),
            partition_column: "partition_key".to_string(),
            label_column: "name".to_string(),
            busy_timeout_ms: 5000,
        }
    }
}

impl StoreConfig {
    /// Parse a JSON document; missing fields fall back to defaults
    pub fn from_json_str(json: &str) -> Result<Self, StoreError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| StoreError::initialization_failed(format!("Invalid store config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    ///
    /// Names end up inside SQL text, so each must be a plain identifier and
    /// the columns must not collide with the fixed ones.
    pub fn validate(&self) -> Result<(), StoreError> {
        for name in [&self.table_name, &self.partition_column, &self.label_column] {
            if !is_identifier(name) {
                return Err(StoreError::InvalidIdentifier(name.clone()));
            }
        }

        const FIXED: [&str; 5] = ["id", "parent_id", "lft", "rgt", "depth"];
        for name in [&self.partition_column, &self.label_column] {
            if FIXED.iter().any(|fixed| fixed.eq_ignore_ascii_case(name)) {
                return Err(StoreError::initialization_failed(format!(
                    "Column '{}' collides with a built-in column",
                    name
                )));
            }
        }

        if self.partition_column.eq_ignore_ascii_case(&self.label_column) {
            return Err(StoreError::initialization_failed(
                "partition_column and label_column must differ",
            ));
        }

        Ok(())
    }
}

/// Whether `name` can be interpolated into SQL as a bare identifier
pub fn is_identifier(name: &str) -> bool {
    static IDENTIFIER_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = IDENTIFIER_REGEX.get_or_init(|| Regex::new(IDENTIFIER_PATTERN).unwrap());
    regex.is_match(name)
}
