//! # Local Store
//!
//! The generic contract the rest of the system can rely on regardless of
//! which repository it goes through: parameterized queries, statements,
//! atomic batches and a full wipe.
//!
//! ## Contract
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         LocalStore                                      │
//! │                                                                         │
//! │  query(sql, params)            → Vec<JsonRow> (rows as JSON objects)   │
//! │  execute(sql, params)          → u64        (rows affected)            │
//! │  run_in_transaction(&[Stmt])   → u64        (all or nothing)           │
//! │  clear_all()                   → ()         (rows gone, schema kept)   │
//! │                                                                         │
//! │  Params are positional (`?`) and always bound, never interpolated.     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde_json::{Map, Number, Value};
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Column, Row, Sqlite, SqlitePool, TypeInfo, ValueRef};
use tracing::{debug, info, warn};

use crate::error::DbResult;
use crate::migrations;

/// A row returned by [`LocalStore::query`], keyed by column name.
pub type JsonRow = Map<String, Value>;

/// Every table holding replica or device data, child tables first.
pub const REPLICA_TABLES: &[&str] = &[
    "order_items",
    "orders",
    "sync_queue",
    "cart_items",
    "promotions",
    "pricing",
    "product_variants",
    "products",
    "customers",
    "sync_checkpoints",
];

// =============================================================================
// Parameters and Statements
// =============================================================================

/// A positional SQL parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Bool(bool),
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Integer(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Real(v)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(SqlValue::Null, Into::into)
    }
}

/// One statement of an atomic batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl Statement {
    pub fn new(sql: impl Into<String>, params: Vec<SqlValue>) -> Self {
        Statement {
            sql: sql.into(),
            params,
        }
    }
}

type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

fn bind_params<'q>(mut query: SqliteQuery<'q>, params: &[SqlValue]) -> SqliteQuery<'q> {
    for param in params {
        query = match param {
            SqlValue::Null => query.bind(None::<String>),
            SqlValue::Integer(v) => query.bind(*v),
            SqlValue::Real(v) => query.bind(*v),
            SqlValue::Text(v) => query.bind(v.clone()),
            SqlValue::Bool(v) => query.bind(*v),
        };
    }
    query
}

/// Converts a SQLite row to a JSON object using each value's storage class.
fn row_to_json(row: &SqliteRow) -> JsonRow {
    let mut out = Map::new();
    for (i, column) in row.columns().iter().enumerate() {
        let value = match row.try_get_raw(i) {
            Ok(raw) if raw.is_null() => Value::Null,
            Ok(raw) => {
                let type_name = raw.type_info().name().to_string();
                match type_name.as_str() {
                    "INTEGER" | "BOOLEAN" => row
                        .try_get::<i64, _>(i)
                        .map(Value::from)
                        .unwrap_or(Value::Null),
                    "REAL" => row
                        .try_get::<f64, _>(i)
                        .ok()
                        .and_then(Number::from_f64)
                        .map(Value::Number)
                        .unwrap_or(Value::Null),
                    "BLOB" => row
                        .try_get::<Vec<u8>, _>(i)
                        .map(Value::from)
                        .unwrap_or(Value::Null),
                    _ => row
                        .try_get::<String, _>(i)
                        .map(Value::String)
                        .unwrap_or(Value::Null),
                }
            }
            Err(e) => {
                warn!(column = %column.name(), error = %e, "Unreadable column");
                Value::Null
            }
        };
        out.insert(column.name().to_string(), value);
    }
    out
}

// =============================================================================
// LocalStore
// =============================================================================

/// Generic access to the device database.
#[derive(Debug, Clone)]
pub struct LocalStore {
    pool: SqlitePool,
}

impl LocalStore {
    /// Creates a new LocalStore.
    pub fn new(pool: SqlitePool) -> Self {
        LocalStore { pool }
    }

    /// Runs a read query and returns every row as a JSON object.
    ///
    /// ## Example
    /// ```rust,ignore
    /// let rows = db.store()
    ///     .query("SELECT id, name FROM customers WHERE city = ?", &["Rosario".into()])
    ///     .await?;
    /// ```
    pub async fn query(&self, sql: &str, params: &[SqlValue]) -> DbResult<Vec<JsonRow>> {
        let rows = bind_params(sqlx::query(sql), params)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_json).collect())
    }

    /// Runs a write statement and returns the number of affected rows.
    pub async fn execute(&self, sql: &str, params: &[SqlValue]) -> DbResult<u64> {
        let result = bind_params(sqlx::query(sql), params)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Runs all statements in one transaction.
    ///
    /// If any statement fails nothing is applied.
    pub async fn run_in_transaction(&self, statements: &[Statement]) -> DbResult<u64> {
        let mut tx = self.pool.begin().await?;
        let mut affected = 0;

        for statement in statements {
            let result = bind_params(sqlx::query(&statement.sql), &statement.params)
                .execute(&mut *tx)
                .await?;
            affected += result.rows_affected();
        }

        tx.commit().await?;
        debug!(statements = statements.len(), affected, "Transaction committed");
        Ok(affected)
    }

    /// Deletes every row of every replica table. The schema stays.
    pub async fn clear_all(&self) -> DbResult<()> {
        info!("Clearing local store");

        let mut tx = self.pool.begin().await?;
        for table in REPLICA_TABLES {
            sqlx::query(&format!("DELETE FROM {table}"))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        Ok(())
    }

    /// `(total, applied)` migration counts.
    pub async fn migration_status(&self) -> DbResult<(usize, usize)> {
        migrations::migration_status(&self.pool).await
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
