//! In-memory `RecordStore` for unit tests: canned rows per table, recorded statements.

use crate::error::AppError;
use crate::schema::EntitySchema;
use crate::service::RecordStore;
use crate::sql::{PgBindValue, QueryBuf};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

#[derive(Default)]
pub struct ScriptedStore {
    rows: HashMap<String, Vec<Value>>,
    writes: Mutex<VecDeque<Value>>,
    next_id: Mutex<i64>,
    log: Mutex<Vec<(String, Vec<PgBindValue>)>>,
}

/// Every output column of `entity` set to null, overlaid with `partial`.
pub fn row_for(entity: &EntitySchema, partial: Value) -> Value {
    let mut row = Map::new();
    for p in entity.output_columns() {
        row.insert(p.output.to_string(), Value::Null);
    }
    if let Value::Object(m) = partial {
        row.extend(m);
    }
    Value::Object(row)
}

/// `"schema"."table"` right after FROM / INTO, unquoted.
fn target_table(sql: &str) -> Option<&str> {
    let rest = sql
        .split_once(" FROM ")
        .or_else(|| sql.split_once("INSERT INTO "))
        .map(|(_, r)| r)?;
    let qualified = rest.split_whitespace().next()?;
    qualified.rsplit('.').next().map(|t| t.trim_matches('"'))
}

impl ScriptedStore {
    pub fn new() -> Self {
        ScriptedStore {
            next_id: Mutex::new(100),
            ..Default::default()
        }
    }

    /// Rows returned by every SELECT whose main table is `table`.
    pub fn with_rows(mut self, table: &str, rows: Vec<Value>) -> Self {
        self.rows.entry(table.to_string()).or_default().extend(rows);
        self
    }

    /// Row returned by the next single-row write.
    pub fn with_write(self, row: Value) -> Self {
        self.writes.lock().unwrap().push_back(row);
        self
    }

    pub fn statements(&self) -> Vec<(String, Vec<PgBindValue>)> {
        self.log.lock().unwrap().clone()
    }

    fn record(&self, q: &QueryBuf) {
        self.log.lock().unwrap().push((q.sql.clone(), q.params.clone()));
    }
}

#[async_trait]
impl RecordStore for ScriptedStore {
    async fn fetch_all(&self, q: &QueryBuf) -> Result<Vec<Value>, AppError> {
        self.record(q);
        let table = target_table(&q.sql).unwrap_or_default();
        Ok(self.rows.get(table).cloned().unwrap_or_default())
    }

    async fn write_one(&self, q: &QueryBuf) -> Result<Option<Value>, AppError> {
        self.record(q);
        Ok(self.writes.lock().unwrap().pop_front())
    }

    async fn write_all(&self, qs: &[QueryBuf]) -> Result<Vec<Value>, AppError> {
        let mut out = Vec::new();
        for q in qs {
            self.record(q);
            // One tuple per row, each closed by its created_at placeholder.
            let tuples = q.sql.matches("::timestamp)").count();
            let mut next = self.next_id.lock().unwrap();
            for _ in 0..tuples {
                *next += 1;
                out.push(serde_json::json!({ "id": *next }));
            }
        }
        Ok(out)
    }
}
