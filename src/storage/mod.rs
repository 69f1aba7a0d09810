//! Interaction store.
//!
//! The relational store holding posts, likes and comments is an external
//! collaborator. The pipeline talks to it through four row operations and
//! never assumes more than column-equality filtering.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::{error, info};

use crate::config::StorageConfig;

pub mod mock;
#[cfg(feature = "sqlite")]
pub mod schema;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use mock::MockStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[cfg(feature = "sqlite")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid row: {0}")]
    InvalidRow(String),
}

/// A row as column name to JSON value.
pub type Row = serde_json::Map<String, Value>;

/// Tables the interaction pipeline touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Posts,
    Likes,
    Comments,
}

impl Table {
    pub fn name(&self) -> &'static str {
        match self {
            Table::Posts => "post",
            Table::Likes => "likes",
            Table::Comments => "comments",
        }
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Conjunction of column equality conditions. `Value::Null` matches NULL.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<(String, Value)>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `column = value`.
    pub fn where_eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push((column.into(), value.into()));
        self
    }

    pub fn conditions(&self) -> &[(String, Value)] {
        &self.conditions
    }

    /// Whether `row` satisfies every condition. A missing column counts as NULL.
    pub fn matches(&self, row: &Row) -> bool {
        self.conditions
            .iter()
            .all(|(column, expected)| row.get(column).unwrap_or(&Value::Null) == expected)
    }
}

/// Row-level access to the backing store.
///
/// Every operation returns the affected rows; an empty vec means nothing matched.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get(&self, table: Table, filter: &Filter) -> Result<Vec<Row>>;

    /// Insert one row. The store assigns `id` and `created_at`.
    async fn insert(&self, table: Table, row: Row) -> Result<Vec<Row>>;

    async fn update(&self, table: Table, filter: &Filter, patch: Row) -> Result<Vec<Row>>;

    async fn delete(&self, table: Table, filter: &Filter) -> Result<Vec<Row>>;
}

/// Serialize a record into a row.
pub fn to_row<T: Serialize>(record: &T) -> Result<Row> {
    match serde_json::to_value(record)? {
        Value::Object(row) => Ok(row),
        other => Err(StorageError::InvalidRow(format!(
            "expected an object, got {}",
            other
        ))),
    }
}

/// Deserialize rows into records.
pub fn from_rows<T: DeserializeOwned>(rows: Vec<Row>) -> Result<Vec<T>> {
    rows.into_iter()
        .map(|row| serde_json::from_value(Value::Object(row)).map_err(StorageError::from))
        .collect()
}

/// Initialize storage based on configuration.
pub async fn init_storage(
    config: &StorageConfig,
) -> std::result::Result<Arc<dyn Store>, Box<dyn std::error::Error>> {
    info!("Storage: {} at {}", config.storage_type, config.path);

    match config.storage_type.as_str() {
        #[cfg(feature = "sqlite")]
        "sqlite" => {
            if let Some(parent) = std::path::Path::new(&config.path).parent() {
                std::fs::create_dir_all(parent)?;
            }

            let pool =
                sqlx::SqlitePool::connect(&format!("sqlite:{}?mode=rwc", config.path)).await?;

            let store = SqliteStore::new(pool);
            store.init().await?;

            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "sqlite"))]
        "sqlite" => {
            error!("SQLite storage requested but 'sqlite' feature is not enabled");
            Err("SQLite feature not enabled".into())
        }
        "memory" => Ok(Arc::new(MockStore::new())),
        other => {
            error!("Unknown storage type: {}", other);
            Err(format!("Unknown storage type: {}", other).into())
        }
    }
}
