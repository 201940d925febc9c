//! Query executor and write executors over a `RecordStore`.

use crate::error::{AppError, ConfigError};
use crate::filter::build_predicates;
use crate::request::RequestParams;
use crate::response::Action;
use crate::schema::{ColumnInfo, ColumnType, EntitySchema, Projection, TableSchema, ID, UPDATED_AT};
use crate::service::dedup::retain_latest;
use crate::service::RecordStore;
use crate::sql::{insert_many, select, upsert, PgBindValue};
use serde_json::{Map, Value};

pub struct CrudService;

impl CrudService {
    /// Filter, order, limit and project rows of `entity`. Facts with an identity key are deduplicated
    /// before the limit is applied, so superseded rows never take a slot.
    pub async fn query(
        store: &dyn RecordStore,
        schema: &str,
        entity: &EntitySchema,
        params: &RequestParams,
    ) -> Result<Vec<Value>, AppError> {
        let predicates = build_predicates(&params.filters, entity.filters)?;
        params.validate_ordering(entity)?;
        let key = entity.dedup_key();
        let sql_limit = if key.is_some() { None } else { params.record_limit };
        let q = select(schema, entity, &predicates, &params.ordering, sql_limit);
        let rows = store.fetch_all(&q).await?;
        let rows = project_rows(entity, rows)?;
        Ok(match key {
            Some(key) => {
                let before = rows.len();
                let mut rows = retain_latest(rows, key);
                if rows.len() < before {
                    tracing::debug!(entity = entity.request_name, dropped = before - rows.len(), "dedup");
                }
                if let Some(limit) = params.record_limit {
                    rows.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
                }
                rows
            }
            None => rows,
        })
    }

    /// Insert-or-update one row against the table's uniqueness constraint.
    /// A row that comes back with `updated_at` still NULL was freshly inserted.
    pub async fn upsert(
        store: &dyn RecordStore,
        schema: &str,
        table: &TableSchema,
        values: &[(&ColumnInfo, PgBindValue)],
    ) -> Result<(Action, Value), AppError> {
        let unique = table.unique.ok_or(ConfigError::MissingReference {
            kind: "unique constraint",
            id: table.name.to_string(),
        })?;
        let now = chrono::Utc::now().naive_utc();
        let q = upsert(schema, table, &unique, values, now);
        let row = store
            .write_one(&q)
            .await?
            .ok_or_else(|| AppError::Cast(format!("upsert into {} returned no row", table.name)))?;
        let action = match row.get(UPDATED_AT) {
            None | Some(Value::Null) => Action::Insert,
            Some(_) => Action::Update,
        };
        Ok((action, row))
    }

    /// Append rows in one transaction; ids come back in input order.
    pub async fn insert_facts(
        store: &dyn RecordStore,
        schema: &str,
        table: &TableSchema,
        columns: &[&ColumnInfo],
        rows: &[Vec<PgBindValue>],
    ) -> Result<Vec<i64>, AppError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let now = chrono::Utc::now().naive_utc();
        let qs = insert_many(schema, table, columns, rows, now);
        let returned = store.write_all(&qs).await?;
        returned.iter().map(row_id).collect()
    }
}

pub(crate) fn row_id(row: &Value) -> Result<i64, AppError> {
    row.get(ID)
        .and_then(Value::as_i64)
        .ok_or_else(|| AppError::Cast(format!("row has no integer id: {}", row)))
}

fn fits(ty: ColumnType, v: &Value) -> bool {
    match (ty, v) {
        (_, Value::Null) => true,
        (ColumnType::Serial | ColumnType::Int | ColumnType::BigInt, Value::Number(n)) => n.is_i64(),
        (ColumnType::Float, Value::Number(_)) => true,
        (ColumnType::Text | ColumnType::Timestamp, Value::String(_)) => true,
        (ColumnType::Bool, Value::Bool(_)) => true,
        (ColumnType::FloatArray | ColumnType::TextArray, Value::Array(_)) => true,
        (ColumnType::Json, _) => true,
        _ => false,
    }
}

/// Rebuild each row from the declared outputs; a missing or mistyped output is a cast error.
fn project_rows(entity: &EntitySchema, rows: Vec<Value>) -> Result<Vec<Value>, AppError> {
    let outputs: Vec<Projection> = entity.output_columns();
    rows.into_iter()
        .map(|row| {
            let mut out = Map::new();
            for p in &outputs {
                let v = row.get(p.output).ok_or_else(|| {
                    AppError::Cast(format!("{} row lacks column '{}'", entity.label, p.output))
                })?;
                if !fits(p.ty, v) {
                    return Err(AppError::Cast(format!(
                        "{} column '{}' expected {}, got {}",
                        entity.label,
                        p.output,
                        p.ty.pg_type(),
                        v
                    )));
                }
                out.insert(p.output.to_string(), v.clone());
            }
            Ok(Value::Object(out))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::entities::{EXPT_METRIC, REGION};
    use crate::schema::tables::REGIONS;
    use crate::service::testing::ScriptedStore;
    use serde_json::json;

    fn metric_row(id: i64, value: f64, created_at: &str) -> Value {
        json!({
            "id": id, "name": "rmse_t", "elevation": 850.0, "elevation_unit": "hPa", "value": value,
            "time_valid": "2024-01-01 00:00:00", "forecast_hour": 0.0, "ensemble_member": null,
            "expt_id": 1, "expt_name": "exp", "wallclock_start": "2023-01-01 00:00:00",
            "metric_id": 2, "metric_long_name": null, "metric_type": "rmse", "metric_unit": "K",
            "metric_stat_type": null, "region_id": 3, "region": "global", "created_at": created_at,
        })
    }

    #[tokio::test]
    async fn query_dedups_reingested_metrics() {
        let store = ScriptedStore::new().with_rows(
            "expt_metrics",
            vec![
                metric_row(1, 1.0, "2024-02-01 00:00:00"),
                metric_row(2, 1.5, "2024-02-02 00:00:00"),
            ],
        );
        let rows = CrudService::query(&store, "public", &EXPT_METRIC, &RequestParams::default())
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["value"], 1.5);
    }

    #[tokio::test]
    async fn limit_applies_after_dedup() {
        let mut later_cycle = metric_row(3, 7.0, "2024-02-03 00:00:00");
        later_cycle["time_valid"] = json!("2024-01-01 06:00:00");
        let store = ScriptedStore::new().with_rows(
            "expt_metrics",
            vec![
                metric_row(1, 1.0, "2024-02-01 00:00:00"),
                metric_row(2, 2.5, "2024-02-02 00:00:00"),
                later_cycle,
            ],
        );
        let params = RequestParams::parse(Some(&json!({
            "ordering": [{"name": "created_at", "order_by": "asc"}],
            "record_limit": 1,
        })))
        .unwrap();
        let rows = CrudService::query(&store, "public", &EXPT_METRIC, &params).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["value"], 2.5);
        assert!(!store.statements()[0].0.contains("LIMIT"));
    }

    #[tokio::test]
    async fn taxonomy_limit_stays_in_sql() {
        let store = ScriptedStore::new();
        let params = RequestParams::parse(Some(&json!({"record_limit": 5}))).unwrap();
        CrudService::query(&store, "public", &REGION, &params).await.unwrap();
        assert!(store.statements()[0].0.ends_with("LIMIT 5"));
    }

    #[tokio::test]
    async fn mistyped_cell_is_a_cast_error() {
        let store = ScriptedStore::new().with_rows(
            "regions",
            vec![json!({
                "id": "seven", "name": "global", "min_lat": -90.0, "max_lat": 90.0,
                "east_lon": 0.0, "west_lon": 360.0, "created_at": null, "updated_at": null,
            })],
        );
        let err = CrudService::query(&store, "public", &REGION, &RequestParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Cast(_)), "{err}");
    }

    #[tokio::test]
    async fn upsert_classifies_by_updated_at() {
        let name = REGIONS.column("name").unwrap();
        let values = vec![(name, PgBindValue::String("global".into()))];

        let store = ScriptedStore::new().with_write(json!({"id": 4, "name": "global", "updated_at": null}));
        let (action, row) = CrudService::upsert(&store, "public", &REGIONS, &values).await.unwrap();
        assert_eq!(action, Action::Insert);
        assert_eq!(row["id"], 4);

        let store = ScriptedStore::new()
            .with_write(json!({"id": 4, "name": "global", "updated_at": "2024-01-01 00:00:00"}));
        let (action, _) = CrudService::upsert(&store, "public", &REGIONS, &values).await.unwrap();
        assert_eq!(action, Action::Update);
    }

    #[tokio::test]
    async fn empty_fact_batch_touches_nothing() {
        let store = ScriptedStore::new();
        let ids = CrudService::insert_facts(&store, "public", &REGIONS, &[], &[]).await.unwrap();
        assert!(ids.is_empty());
        assert!(store.statements().is_empty());
    }
}
