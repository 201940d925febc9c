//! Statement execution against PostgreSQL. Every call takes its own connection from the pool.

use crate::error::AppError;
use crate::sql::QueryBuf;
use crate::timefmt;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::{Column, PgPool, Row, TypeInfo, ValueRef};

/// Executes built statements and materializes rows as JSON objects.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Run a read and return every row.
    async fn fetch_all(&self, q: &QueryBuf) -> Result<Vec<Value>, AppError>;

    /// Run one write in its own transaction and return the row it produced, if any.
    async fn write_one(&self, q: &QueryBuf) -> Result<Option<Value>, AppError>;

    /// Run several writes in one transaction; all rows returned, or nothing committed.
    async fn write_all(&self, qs: &[QueryBuf]) -> Result<Vec<Value>, AppError>;
}

pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self {
        PgRecordStore { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn bind_all<'q>(
    q: &'q QueryBuf,
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
    let mut query = sqlx::query(&q.sql);
    for p in &q.params {
        query = query.bind(p.clone());
    }
    query
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn fetch_all(&self, q: &QueryBuf) -> Result<Vec<Value>, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut conn = self.pool.acquire().await?;
        let rows = bind_all(q).fetch_all(&mut *conn).await?;
        rows.iter().map(row_to_json).collect()
    }

    async fn write_one(&self, q: &QueryBuf) -> Result<Option<Value>, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query (tx)");
        let mut tx = self.pool.begin().await?;
        let row = match bind_all(q).fetch_optional(&mut *tx).await {
            Ok(row) => row,
            Err(e) => {
                tracing::warn!(error = %e, "write failed, rolling back");
                tx.rollback().await?;
                return Err(e.into());
            }
        };
        let out = row.as_ref().map(row_to_json).transpose()?;
        tx.commit().await?;
        Ok(out)
    }

    async fn write_all(&self, qs: &[QueryBuf]) -> Result<Vec<Value>, AppError> {
        let mut tx = self.pool.begin().await?;
        let mut out = Vec::new();
        for q in qs {
            tracing::debug!(sql = %q.sql, params = q.params.len(), "query (tx)");
            match bind_all(q).fetch_all(&mut *tx).await {
                Ok(rows) => {
                    for r in &rows {
                        out.push(row_to_json(r)?);
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, statements = qs.len(), "batch write failed, rolling back");
                    tx.rollback().await?;
                    return Err(e.into());
                }
            }
        }
        tx.commit().await?;
        Ok(out)
    }
}

fn row_to_json(row: &PgRow) -> Result<Value, AppError> {
    let mut map = serde_json::Map::new();
    for col in row.columns() {
        let name = col.name();
        let v = cell_to_value(row, name)?;
        map.insert(name.to_string(), v);
    }
    Ok(Value::Object(map))
}

fn float_value(f: f64) -> Value {
    serde_json::Number::from_f64(f)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

fn cell_to_value(row: &PgRow, name: &str) -> Result<Value, AppError> {
    if row.try_get_raw(name)?.is_null() {
        return Ok(Value::Null);
    }
    if let Ok(n) = row.try_get::<i16, _>(name) {
        return Ok(Value::Number(n.into()));
    }
    if let Ok(n) = row.try_get::<i32, _>(name) {
        return Ok(Value::Number(n.into()));
    }
    if let Ok(n) = row.try_get::<i64, _>(name) {
        return Ok(Value::Number(n.into()));
    }
    if let Ok(n) = row.try_get::<f32, _>(name) {
        return Ok(float_value(n as f64));
    }
    if let Ok(n) = row.try_get::<f64, _>(name) {
        return Ok(float_value(n));
    }
    if let Ok(b) = row.try_get::<bool, _>(name) {
        return Ok(Value::Bool(b));
    }
    if let Ok(d) = row.try_get::<chrono::NaiveDateTime, _>(name) {
        return Ok(Value::String(timefmt::format_time(&d)));
    }
    if let Ok(d) = row.try_get::<chrono::DateTime<chrono::Utc>, _>(name) {
        return Ok(Value::String(timefmt::format_time(&d.naive_utc())));
    }
    if let Ok(d) = row.try_get::<chrono::NaiveDate, _>(name) {
        return Ok(Value::String(d.format("%Y-%m-%d").to_string()));
    }
    if let Ok(s) = row.try_get::<String, _>(name) {
        return Ok(Value::String(s));
    }
    if let Ok(v) = row.try_get::<Vec<Option<f64>>, _>(name) {
        return Ok(Value::Array(
            v.into_iter()
                .map(|f| f.map(float_value).unwrap_or(Value::Null))
                .collect(),
        ));
    }
    if let Ok(v) = row.try_get::<Vec<Option<String>>, _>(name) {
        return Ok(Value::Array(
            v.into_iter()
                .map(|s| s.map(Value::String).unwrap_or(Value::Null))
                .collect(),
        ));
    }
    if let Ok(j) = row.try_get::<Value, _>(name) {
        return Ok(j);
    }
    let type_name = row
        .columns()
        .iter()
        .find(|c| c.name() == name)
        .map(|c| c.type_info().name().to_string())
        .unwrap_or_default();
    Err(AppError::Cast(format!(
        "column '{}' has unsupported type {}",
        name, type_name
    )))
}
