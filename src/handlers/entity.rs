//! Descriptor-driven handler: GET for every entity, upsert PUT for taxonomy, append PUT for facts.

use crate::error::{AppError, ConfigError};
use crate::handlers::RequestHandler;
use crate::request::{DbRequest, Method};
use crate::response::DbActionResponse;
use crate::schema::{ColumnInfo, EntityKind, EntitySchema, RefScope};
use crate::service::crud::row_id;
use crate::service::resolver::{resolve_one, resolve_rows};
use crate::service::{CrudService, RequestValidator};
use crate::sql::PgBindValue;
use crate::state::DbContext;
use async_trait::async_trait;
use serde_json::{Map, Value};

pub struct EntityHandler {
    entity: &'static EntitySchema,
}

fn datestr_format(body: &Map<String, Value>) -> Option<&str> {
    body.get("datestr_format").and_then(Value::as_str)
}

fn bind_id(id: Option<i64>) -> PgBindValue {
    id.map(PgBindValue::I64).unwrap_or(PgBindValue::Null)
}

impl EntityHandler {
    pub fn new(entity: &'static EntitySchema) -> Self {
        EntityHandler { entity }
    }

    fn column(&self, name: &'static str) -> Result<&'static ColumnInfo, AppError> {
        self.entity.table.column(name).ok_or_else(|| {
            ConfigError::MissingReference {
                kind: "column",
                id: format!("{}.{}", self.entity.table.name, name),
            }
            .into()
        })
    }

    async fn run(&self, ctx: &DbContext, raw: &Value) -> Result<DbActionResponse, AppError> {
        let req = DbRequest::parse(raw)?;
        match (req.method, self.entity.kind) {
            (Method::Get, _) => {
                let rows = CrudService::query(ctx.store(), ctx.schema(), self.entity, &req.params).await?;
                Ok(DbActionResponse::records(raw, self.entity.label, rows))
            }
            (Method::Put, EntityKind::Taxonomy) => self.put_one(ctx, raw, &req).await,
            (Method::Put, EntityKind::Fact { rows_key, .. }) => self.put_many(ctx, raw, &req, rows_key).await,
        }
    }

    async fn put_one(&self, ctx: &DbContext, raw: &Value, req: &DbRequest) -> Result<DbActionResponse, AppError> {
        let entity = self.entity;
        let body = req.body_map()?;
        let fmt = datestr_format(body);
        RequestValidator::validate(body, entity.rules)?;
        RequestValidator::validate_ordered(body, entity.ordered_pairs, fmt)?;

        let mut values: Vec<(&ColumnInfo, PgBindValue)> = Vec::new();
        for col in entity.table.writable_columns() {
            if entity.references.iter().any(|r| r.column == col.name) {
                continue;
            }
            let v = body.get(col.name).unwrap_or(&Value::Null);
            values.push((col, PgBindValue::for_column(col.name, col.ty, v, fmt)?));
        }
        for r in entity.references {
            let col = self.column(r.column)?;
            let bound = match resolve_one(ctx, r, body, fmt).await? {
                Some(id) => PgBindValue::I64(id),
                // An id given directly is kept when no natural key was supplied.
                None => PgBindValue::for_column(col.name, col.ty, body.get(col.name).unwrap_or(&Value::Null), fmt)?,
            };
            values.push((col, bound));
        }

        let (action, row) = CrudService::upsert(ctx.store(), ctx.schema(), entity.table, &values).await?;
        let id = row_id(&row)?;
        Ok(DbActionResponse::upserted(raw, entity.label, action, id, row))
    }

    fn fact_rows(&self, body: &Map<String, Value>, rows_key: Option<&str>) -> Result<Vec<Map<String, Value>>, AppError> {
        let Some(key) = rows_key else {
            return Ok(vec![body.clone()]);
        };
        match body.get(key) {
            Some(Value::Array(items)) => items
                .iter()
                .map(|i| {
                    i.as_object().cloned().ok_or_else(|| {
                        AppError::Validation(format!("every entry of '{}' must be a mapping, got {}", key, i))
                    })
                })
                .collect(),
            Some(other) => Err(AppError::Validation(format!("'{}' must be a list, got {}", key, other))),
            None => Err(AppError::Validation(format!("body lacks the '{}' list", key))),
        }
    }

    async fn put_many(
        &self,
        ctx: &DbContext,
        raw: &Value,
        req: &DbRequest,
        rows_key: Option<&str>,
    ) -> Result<DbActionResponse, AppError> {
        let entity = self.entity;
        let body = req.body_map()?;
        let fmt = datestr_format(body);
        let rows = self.fact_rows(body, rows_key)?;
        if rows.is_empty() {
            return Err(AppError::Validation(format!(
                "No {} records were discovered to be inserted",
                entity.label
            )));
        }
        for row in &rows {
            RequestValidator::validate(row, entity.rules)?;
            RequestValidator::validate_ordered(row, entity.ordered_pairs, fmt)?;
        }

        let columns: Vec<&ColumnInfo> = entity.table.writable_columns().collect();
        let is_ref = |name: &str| entity.references.iter().any(|r| r.column == name);
        let mut bound = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut values = Vec::with_capacity(columns.len());
            for col in &columns {
                values.push(if is_ref(col.name) {
                    PgBindValue::Null
                } else {
                    PgBindValue::for_column(col.name, col.ty, row.get(col.name).unwrap_or(&Value::Null), fmt)?
                });
            }
            bound.push(values);
        }

        for r in entity.references {
            let pos = columns.iter().position(|c| c.name == r.column);
            let ids = match r.scope {
                RefScope::Body => vec![resolve_one(ctx, r, body, fmt).await?; rows.len()],
                RefScope::Row => resolve_rows(ctx, r, &rows, fmt).await?,
            };
            if let Some(pos) = pos {
                for (values, id) in bound.iter_mut().zip(ids) {
                    values[pos] = bind_id(id);
                }
            }
        }

        let ids = CrudService::insert_facts(ctx.store(), ctx.schema(), entity.table, &columns, &bound).await?;
        Ok(DbActionResponse::inserted(raw, entity.label, ids))
    }
}

#[async_trait]
impl RequestHandler for EntityHandler {
    fn name(&self) -> &'static str {
        self.entity.request_name
    }

    async fn handle(&self, ctx: &DbContext, request: &Value) -> DbActionResponse {
        match self.run(ctx, request).await {
            Ok(resp) => resp,
            Err(e) => {
                tracing::warn!(request = self.entity.request_name, code = e.code(), error = %e, "request failed");
                DbActionResponse::failed(request, self.entity.label, &e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::response::Action;
    use crate::schema::entities::{ARRAY_METRIC_TYPE, EXPERIMENT, INSTRUMENT_META, METRIC_TYPE, REGION};
    use crate::service::testing::{row_for, ScriptedStore};
    use crate::sql::PgBindValue;
    use crate::state::DbContext;
    use serde_json::{json, Value};
    use std::sync::Arc;

    fn ctx(store: ScriptedStore) -> (DbContext, Arc<ScriptedStore>) {
        let store = Arc::new(store);
        (DbContext::with_store(store.clone(), "public"), store)
    }

    fn metrics_store() -> ScriptedStore {
        ScriptedStore::new()
            .with_rows("experiments", vec![row_for(&EXPERIMENT, json!({"id": 11, "name": "exp"}))])
            .with_rows(
                "metric_types",
                vec![
                    row_for(&METRIC_TYPE, json!({"id": 21, "name": "rmse_t"})),
                    row_for(&METRIC_TYPE, json!({"id": 22, "name": "bias_t"})),
                ],
            )
            .with_rows("regions", vec![row_for(&REGION, json!({"id": 31, "name": "global"}))])
    }

    fn metrics_put(metrics: Value) -> Value {
        json!({
            "db_request_name": "expt_metrics",
            "method": "PUT",
            "body": {
                "expt_name": "exp",
                "expt_wallclock_start": "2023-01-22 09:22:05",
                "metrics": metrics,
            }
        })
    }

    #[tokio::test]
    async fn metrics_put_resolves_and_inserts_in_one_batch() {
        let (ctx, store) = ctx(metrics_store());
        let req = metrics_put(json!([
            {"name": "rmse_t", "region_name": "global", "elevation": 850, "elevation_unit": "hPa",
             "value": 1.25, "time_valid": "2024-01-01 00:00:00", "forecast_hour": 6},
            {"name": "bias_t", "region_name": "global", "value": "NaN", "time_valid": "2024-01-01 00:00:00"},
        ]));
        let resp = ctx.submit(&req).await.unwrap();
        assert!(resp.success, "{:?}", resp.errors);
        assert_eq!(resp.action(), Some(Action::Insert));
        assert_eq!(resp.record_count(), Some(2));

        let stmts = store.statements();
        // experiment, metric types, regions, then the insert
        assert_eq!(stmts.len(), 4);
        let (sql, params) = &stmts[3];
        assert!(sql.starts_with("INSERT INTO \"public\".\"expt_metrics\""));
        assert!(params.contains(&PgBindValue::I64(11)));
        assert!(params.contains(&PgBindValue::I64(21)));
        assert!(params.contains(&PgBindValue::I64(22)));
        assert!(params.contains(&PgBindValue::F64(1.25)));
    }

    #[tokio::test]
    async fn unknown_region_aborts_the_whole_batch() {
        let (ctx, store) = ctx(metrics_store());
        let req = metrics_put(json!([
            {"name": "rmse_t", "region_name": "global", "value": 1.0, "time_valid": "2024-01-01 00:00:00"},
            {"name": "rmse_t", "region_name": "atlantis", "value": 2.0, "time_valid": "2024-01-01 00:00:00"},
        ]));
        let resp = ctx.submit(&req).await.unwrap();
        assert!(!resp.success);
        assert!(resp.errors.as_deref().unwrap_or_default().contains("atlantis"));
        assert!(store.statements().iter().all(|(sql, _)| !sql.starts_with("INSERT")));
    }

    #[tokio::test]
    async fn malformed_row_value_fails_before_any_lookup() {
        let (ctx, store) = ctx(metrics_store());
        let req = metrics_put(json!([
            {"name": "rmse_t", "region_name": "global", "value": 1.0, "time_valid": "2024-01-01 00:00:00"},
            {"name": "rmse_t", "region_name": "global", "value": "abc", "time_valid": "2024-01-01 00:00:00"},
        ]));
        let resp = ctx.submit(&req).await.unwrap();
        assert!(!resp.success);
        assert!(resp.errors.as_deref().unwrap_or_default().contains("value expects float8"));
        assert!(store.statements().is_empty());
    }

    #[tokio::test]
    async fn empty_metrics_list_fails() {
        let (ctx, store) = ctx(metrics_store());
        let resp = ctx.submit(&metrics_put(json!([]))).await.unwrap();
        assert!(!resp.success);
        assert_eq!(resp.message, "Failed expt metric request.");
        assert!(resp.errors.unwrap().contains("No expt metric records"));
        assert!(store.statements().is_empty());
    }

    #[tokio::test]
    async fn taxonomy_put_reports_upsert_action() {
        let (ctx, store) = ctx(ScriptedStore::new().with_write(json!({
            "id": 3, "name": "tropics", "min_lat": -20.0, "max_lat": 20.0,
            "east_lon": 0.0, "west_lon": 360.0,
            "created_at": "2024-01-01 00:00:00", "updated_at": "2024-02-01 00:00:00",
        })));
        let req = json!({
            "db_request_name": "regions",
            "method": "PUT",
            "body": {"name": "tropics", "min_lat": -20, "max_lat": 20, "east_lon": 0, "west_lon": 360},
        });
        let resp = ctx.submit(&req).await.unwrap();
        assert!(resp.success, "{:?}", resp.errors);
        assert_eq!(resp.action(), Some(Action::Update));
        assert_eq!(resp.message, "Attempt to UPDATE region record SUCCEEDED");
        assert!(store.statements()[0].0.contains("ON CONFLICT ON CONSTRAINT \"unique_region\""));
    }

    #[tokio::test]
    async fn optional_instrument_reference_is_resolved() {
        let (ctx, store) = ctx(
            ScriptedStore::new()
                .with_rows("instrument_meta", vec![row_for(&INSTRUMENT_META, json!({"id": 4, "name": "amsua"}))])
                .with_write(row_for(&ARRAY_METRIC_TYPE, json!({"id": 8, "name": "amsua_bias", "updated_at": null}))),
        );
        let req = json!({
            "db_request_name": "array_metric_types",
            "method": "PUT",
            "body": {"name": "amsua_bias", "measurement_type": "bias", "instrument_meta_name": "amsua"},
        });
        let resp = ctx.submit(&req).await.unwrap();
        assert!(resp.success, "{:?}", resp.errors);
        assert_eq!(resp.action(), Some(Action::Insert));
        let (_, params) = &store.statements()[1];
        assert!(params.contains(&PgBindValue::I64(4)));
    }

    #[tokio::test]
    async fn validation_failure_is_an_envelope_not_an_error() {
        let (ctx, store) = ctx(ScriptedStore::new());
        let req = json!({"db_request_name": "experiment", "method": "PUT", "body": {"name": "exp"}});
        let resp = ctx.submit(&req).await.unwrap();
        assert!(!resp.success);
        assert_eq!(resp.request, req);
        assert!(store.statements().is_empty());
    }

    #[tokio::test]
    async fn get_returns_records_envelope() {
        let (ctx, _) = ctx(ScriptedStore::new().with_rows(
            "regions",
            vec![row_for(&REGION, json!({"id": 1, "name": "global"}))],
        ));
        let req = json!({"db_request_name": "region", "method": "GET", "params": {"filters": {"name": {"exact": "global"}}}});
        let resp = ctx.submit(&req).await.unwrap();
        assert!(resp.success);
        assert_eq!(resp.record_count(), Some(1));
        assert_eq!(resp.rows()[0]["name"], "global");
    }
}
