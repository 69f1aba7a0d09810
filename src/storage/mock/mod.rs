//! Mock storage implementation for testing.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use tokio::sync::RwLock;

use super::{Filter, Result, Row, StorageError, Store, Table};

#[derive(Default)]
struct MockTable {
    rows: Vec<Row>,
    next_id: i64,
}

/// Mock store that keeps rows in memory.
///
/// Assigns `id` and `created_at` like the SQLite schema does and enforces
/// one like per (post, user).
#[derive(Default)]
pub struct MockStore {
    tables: RwLock<HashMap<Table, MockTable>>,
    fail_on_get: RwLock<bool>,
    fail_on_write: RwLock<bool>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fail_on_get(&self, fail: bool) {
        *self.fail_on_get.write().await = fail;
    }

    pub async fn set_fail_on_write(&self, fail: bool) {
        *self.fail_on_write.write().await = fail;
    }

    /// Number of rows currently in `table`.
    pub async fn row_count(&self, table: Table) -> usize {
        self.tables
            .read()
            .await
            .get(&table)
            .map_or(0, |t| t.rows.len())
    }

    async fn check_write(&self) -> Result<()> {
        if *self.fail_on_write.read().await {
            return Err(StorageError::InvalidRow("Mock write failure".to_string()));
        }
        Ok(())
    }
}

fn is_duplicate_like(existing: &[Row], row: &Row) -> bool {
    let key = |r: &Row| (r.get("post_id").cloned(), r.get("liked_by_user_id").cloned());
    existing.iter().any(|r| key(r) == key(row))
}

#[async_trait]
impl Store for MockStore {
    async fn get(&self, table: Table, filter: &Filter) -> Result<Vec<Row>> {
        if *self.fail_on_get.read().await {
            return Err(StorageError::InvalidRow("Mock get failure".to_string()));
        }
        let tables = self.tables.read().await;
        Ok(tables
            .get(&table)
            .map(|t| t.rows.iter().filter(|r| filter.matches(r)).cloned().collect())
            .unwrap_or_default())
    }

    async fn insert(&self, table: Table, mut row: Row) -> Result<Vec<Row>> {
        self.check_write().await?;

        let mut tables = self.tables.write().await;
        let entry = tables.entry(table).or_default();

        if table == Table::Likes && is_duplicate_like(&entry.rows, &row) {
            return Err(StorageError::InvalidRow(
                "UNIQUE constraint failed: likes.post_id, likes.liked_by_user_id".to_string(),
            ));
        }

        entry.next_id += 1;
        row.entry("id").or_insert(Value::from(entry.next_id));
        row.entry("created_at").or_insert_with(|| {
            Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true))
        });

        entry.rows.push(row.clone());
        Ok(vec![row])
    }

    async fn update(&self, table: Table, filter: &Filter, patch: Row) -> Result<Vec<Row>> {
        self.check_write().await?;

        let mut tables = self.tables.write().await;
        let Some(entry) = tables.get_mut(&table) else {
            return Ok(Vec::new());
        };

        let mut updated = Vec::new();
        for row in entry.rows.iter_mut().filter(|r| filter.matches(r)) {
            for (column, value) in &patch {
                row.insert(column.clone(), value.clone());
            }
            updated.push(row.clone());
        }
        Ok(updated)
    }

    async fn delete(&self, table: Table, filter: &Filter) -> Result<Vec<Row>> {
        self.check_write().await?;

        let mut tables = self.tables.write().await;
        let Some(entry) = tables.get_mut(&table) else {
            return Ok(Vec::new());
        };

        let (deleted, kept): (Vec<Row>, Vec<Row>) = std::mem::take(&mut entry.rows)
            .into_iter()
            .partition(|r| filter.matches(r));
        entry.rows = kept;
        Ok(deleted)
    }
}
