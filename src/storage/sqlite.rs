//! SQLite implementation of the interaction store.

use async_trait::async_trait;
use sea_query::{
    Alias, Asterisk, ConditionalStatement, Expr, Order, Query, SimpleExpr, SqliteQueryBuilder,
};
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row as _, SqlitePool, TypeInfo, ValueRef};
use tracing::debug;

use super::schema::{CREATE_COMMENTS_TABLE, CREATE_LIKES_TABLE, CREATE_POST_TABLE};
use super::{Filter, Result, Row, StorageError, Store, Table};

/// SQLite implementation of Store.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Create a new SQLite store.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Initialize the database schema.
    pub async fn init(&self) -> Result<()> {
        sqlx::query(CREATE_POST_TABLE).execute(&self.pool).await?;
        sqlx::query(CREATE_LIKES_TABLE).execute(&self.pool).await?;
        sqlx::query(CREATE_COMMENTS_TABLE).execute(&self.pool).await?;
        Ok(())
    }

    async fn fetch(&self, sql: &str) -> Result<Vec<Row>> {
        debug!(sql = %sql, "Executing query");
        let rows = sqlx::query(sql).fetch_all(&self.pool).await?;
        rows.iter().map(decode_row).collect()
    }
}

/// Convert a JSON value to a bindable SQL value.
fn to_sql_value(value: &Value) -> Result<sea_query::Value> {
    Ok(match value {
        Value::Null => sea_query::Value::String(None),
        Value::Bool(b) => (*b).into(),
        Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => i.into(),
            (None, Some(f)) => f.into(),
            (None, None) => {
                return Err(StorageError::InvalidRow(format!("unsupported number {}", n)))
            }
        },
        Value::String(s) => s.as_str().into(),
        // Nested structures are stored as JSON text.
        other => other.to_string().into(),
    })
}

fn apply_filter<S: ConditionalStatement>(statement: &mut S, filter: &Filter) -> Result<()> {
    for (column, value) in filter.conditions() {
        let column = Expr::col(Alias::new(column.as_str()));
        let condition = match value {
            Value::Null => column.is_null(),
            other => column.eq(to_sql_value(other)?),
        };
        statement.and_where(condition);
    }
    Ok(())
}

fn column_values(row: &Row) -> Result<Vec<(Alias, SimpleExpr)>> {
    row.iter()
        .map(|(column, value)| {
            Ok((
                Alias::new(column.as_str()),
                SimpleExpr::from(to_sql_value(value)?),
            ))
        })
        .collect()
}

/// Decode a result row by the storage class of each value.
fn decode_row(row: &SqliteRow) -> Result<Row> {
    let mut decoded = Row::new();
    for column in row.columns() {
        let idx = column.ordinal();
        let raw = row.try_get_raw(idx)?;
        let value = if raw.is_null() {
            Value::Null
        } else {
            let storage_class = raw.type_info().name().to_string();
            match storage_class.as_str() {
                "INTEGER" => Value::from(row.try_get::<i64, _>(idx)?),
                "REAL" => Value::from(row.try_get::<f64, _>(idx)?),
                "BOOLEAN" => Value::from(row.try_get::<bool, _>(idx)?),
                "BLOB" => {
                    let bytes: Vec<u8> = row.try_get(idx)?;
                    Value::String(String::from_utf8_lossy(&bytes).into_owned())
                }
                _ => Value::String(row.try_get::<String, _>(idx)?),
            }
        };
        decoded.insert(column.name().to_string(), value);
    }
    Ok(decoded)
}

#[async_trait]
impl Store for SqliteStore {
    async fn get(&self, table: Table, filter: &Filter) -> Result<Vec<Row>> {
        let sql = {
            let mut query = Query::select();
            query
                .column(Asterisk)
                .from(Alias::new(table.name()))
                .order_by(Alias::new("id"), Order::Asc);
            apply_filter(&mut query, filter)?;
            query.to_string(SqliteQueryBuilder)
        };

        self.fetch(&sql).await
    }

    async fn insert(&self, table: Table, row: Row) -> Result<Vec<Row>> {
        if row.is_empty() {
            return Err(StorageError::InvalidRow(format!(
                "empty insert into {}",
                table
            )));
        }

        let sql = {
            let (columns, values): (Vec<Alias>, Vec<SimpleExpr>) =
                column_values(&row)?.into_iter().unzip();
            Query::insert()
                .into_table(Alias::new(table.name()))
                .columns(columns)
                .values(values)
                .map_err(|e| StorageError::InvalidRow(e.to_string()))?
                .returning_all()
                .to_string(SqliteQueryBuilder)
        };

        self.fetch(&sql).await
    }

    async fn update(&self, table: Table, filter: &Filter, patch: Row) -> Result<Vec<Row>> {
        if patch.is_empty() {
            return Err(StorageError::InvalidRow(format!(
                "empty update of {}",
                table
            )));
        }

        let sql = {
            let mut query = Query::update();
            query
                .table(Alias::new(table.name()))
                .values(column_values(&patch)?);
            apply_filter(&mut query, filter)?;
            query.returning_all().to_string(SqliteQueryBuilder)
        };

        self.fetch(&sql).await
    }

    async fn delete(&self, table: Table, filter: &Filter) -> Result<Vec<Row>> {
        let sql = {
            let mut query = Query::delete();
            query.from_table(Alias::new(table.name()));
            apply_filter(&mut query, filter)?;
            query.returning_all().to_string(SqliteQueryBuilder)
        };

        self.fetch(&sql).await
    }
}
