//! Natural-key resolution: turns human identifiers into surrogate ids through internal GET requests.

use crate::error::AppError;
use crate::response::DbActionResponse;
use crate::schema::{entity_by_name, FilterKind, KeyBinding, Reference};
use crate::service::crud::row_id;
use crate::state::DbContext;
use crate::timefmt;
use serde_json::{json, Map, Value};
use std::collections::{BTreeSet, HashMap};

fn ordering(reference: &Reference) -> Value {
    Value::Array(
        reference
            .tie_break
            .iter()
            .map(|(name, desc)| json!({"name": name, "order_by": if *desc { "desc" } else { "asc" }}))
            .collect(),
    )
}

fn lookup_request(reference: &Reference, filters: Map<String, Value>, limit: Option<u64>) -> Value {
    let mut params = json!({"filters": filters, "ordering": ordering(reference)});
    if let Some(n) = limit {
        params["record_limit"] = json!(n);
    }
    json!({"db_request_name": reference.target, "method": "GET", "params": params})
}

/// Filter value for one key; `None` when the source does not carry it.
fn filter_value(binding: &KeyBinding, source: &Map<String, Value>, datestr_format: Option<&str>) -> Result<Option<Value>, AppError> {
    let raw = match source.get(binding.input) {
        None | Some(Value::Null) => return Ok(None),
        Some(v) => v,
    };
    Ok(Some(match binding.kind {
        FilterKind::Text => {
            let s = match raw {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            json!({ "exact": s })
        }
        FilterKind::Time => {
            let s = raw.as_str().ok_or_else(|| {
                AppError::Validation(format!("{} must be a time string, got {}", binding.input, raw))
            })?;
            let t = timefmt::parse_time(s, datestr_format)?;
            json!({ "exact": timefmt::format_time(&t) })
        }
        FilterKind::Number | FilterKind::Bool => raw.clone(),
    }))
}

fn describe(source: &Map<String, Value>, keys: &[KeyBinding]) -> String {
    keys.iter()
        .filter_map(|k| source.get(k.input).filter(|v| !v.is_null()).map(|v| format!("{}={}", k.input, v)))
        .collect::<Vec<_>>()
        .join(", ")
}

async fn submit_lookup(ctx: &DbContext, reference: &Reference, request: &Value) -> Result<DbActionResponse, AppError> {
    let resp = ctx.submit(request).await.map_err(|e| AppError::InternalRequest {
        request: reference.target.to_string(),
        message: e.to_string(),
    })?;
    if !resp.success {
        return Err(AppError::InternalRequest {
            request: reference.target.to_string(),
            message: resp.errors.clone().unwrap_or_else(|| resp.message.clone()),
        });
    }
    Ok(resp)
}

/// Resolve one reference from `source`. Returns `None` only for an optional reference whose keys are all absent.
pub async fn resolve_one(
    ctx: &DbContext,
    reference: &Reference,
    source: &Map<String, Value>,
    datestr_format: Option<&str>,
) -> Result<Option<i64>, AppError> {
    let mut filters = Map::new();
    for binding in reference.keys {
        if let Some(v) = filter_value(binding, source, datestr_format)? {
            filters.insert(binding.filter.to_string(), v);
        }
    }
    if filters.is_empty() {
        if reference.optional {
            return Ok(None);
        }
        let inputs: Vec<&str> = reference.keys.iter().map(|k| k.input).collect();
        return Err(AppError::Validation(format!(
            "{} requires one of {:?}",
            reference.column, inputs
        )));
    }
    let request = lookup_request(reference, filters, Some(1));
    let resp = submit_lookup(ctx, reference, &request).await?;
    match resp.rows().first() {
        Some(row) => row_id(row).map(Some),
        None => Err(AppError::ReferenceNotFound {
            entity: reference.target,
            key: describe(source, reference.keys),
        }),
    }
}

/// Output column of the target that carries the single text key.
fn key_output(reference: &Reference, binding: &KeyBinding) -> &'static str {
    entity_by_name(reference.target)
        .and_then(|e| {
            let column = e
                .filters
                .iter()
                .filter(|b| b.key.is_none())
                .flat_map(|b| b.fields.iter())
                .find(|f| f.keys.contains(&binding.filter))?
                .column;
            e.output_columns()
                .into_iter()
                .find(|p| p.alias == e.alias && p.column == column)
                .map(|p| p.output)
        })
        .unwrap_or(binding.filter)
}

/// Resolve a reference for every row of a batch. Distinct keys are looked up once; any key
/// without a match fails the whole batch.
pub async fn resolve_rows(
    ctx: &DbContext,
    reference: &Reference,
    rows: &[Map<String, Value>],
    datestr_format: Option<&str>,
) -> Result<Vec<Option<i64>>, AppError> {
    match reference.keys {
        [binding] if binding.kind == FilterKind::Text => {
            resolve_names(ctx, reference, binding, rows).await
        }
        _ => {
            let mut cache: HashMap<String, Option<i64>> = HashMap::new();
            let mut out = Vec::with_capacity(rows.len());
            for row in rows {
                let tuple: Vec<&Value> = reference
                    .keys
                    .iter()
                    .map(|k| row.get(k.input).unwrap_or(&Value::Null))
                    .collect();
                let cache_key = serde_json::to_string(&tuple).unwrap_or_default();
                let id = match cache.get(&cache_key) {
                    Some(id) => *id,
                    None => {
                        let id = resolve_one(ctx, reference, row, datestr_format).await?;
                        cache.insert(cache_key, id);
                        id
                    }
                };
                out.push(id);
            }
            Ok(out)
        }
    }
}

fn text_of(v: &Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

async fn resolve_names(
    ctx: &DbContext,
    reference: &Reference,
    binding: &KeyBinding,
    rows: &[Map<String, Value>],
) -> Result<Vec<Option<i64>>, AppError> {
    let names: Vec<Option<String>> = rows
        .iter()
        .map(|r| r.get(binding.input).and_then(text_of))
        .collect();
    if !reference.optional && names.iter().any(Option::is_none) {
        return Err(AppError::Validation(format!("{} is required on every row", binding.input)));
    }
    let wanted: BTreeSet<&str> = names.iter().flatten().map(String::as_str).collect();
    if wanted.is_empty() {
        return Ok(vec![None; rows.len()]);
    }

    let mut filters = Map::new();
    filters.insert(binding.filter.to_string(), json!({ "exact": wanted.iter().collect::<Vec<_>>() }));
    let request = lookup_request(reference, filters, None);
    let resp = submit_lookup(ctx, reference, &request).await?;

    let output = key_output(reference, binding);
    let mut ids: HashMap<String, i64> = HashMap::new();
    for row in resp.rows() {
        if let Some(name) = row.get(output).and_then(text_of) {
            if !ids.contains_key(&name) {
                ids.insert(name, row_id(row)?);
            }
        }
    }
    let missing: Vec<&str> = wanted.iter().copied().filter(|n| !ids.contains_key(*n)).collect();
    if !missing.is_empty() {
        return Err(AppError::ReferenceNotFound {
            entity: reference.target,
            key: format!("{} in {:?}", binding.input, missing),
        });
    }
    Ok(names
        .iter()
        .map(|n| n.as_ref().and_then(|n| ids.get(n).copied()))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::entities::{EXPT_ARRAY_METRIC, EXPT_METRIC, REGION, SAT_META};
    use crate::service::testing::{row_for, ScriptedStore};
    use std::sync::Arc;

    fn ctx(store: ScriptedStore) -> (DbContext, Arc<ScriptedStore>) {
        let store = Arc::new(store);
        (DbContext::with_store(store.clone(), "public"), store)
    }

    fn map(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    fn region_ref() -> &'static Reference {
        EXPT_METRIC.references.iter().find(|r| r.target == "region").unwrap()
    }

    fn sat_ref() -> &'static Reference {
        EXPT_ARRAY_METRIC.references.iter().find(|r| r.target == "sat_meta").unwrap()
    }

    #[tokio::test]
    async fn single_match_yields_its_id() {
        let (ctx, store) = ctx(ScriptedStore::new().with_rows(
            "regions",
            vec![row_for(&REGION, json!({"id": 7, "name": "tropics"}))],
        ));
        let id = resolve_one(&ctx, region_ref(), &map(json!({"region_name": "tropics"})), None)
            .await
            .unwrap();
        assert_eq!(id, Some(7));
        let (sql, params) = &store.statements()[0];
        assert!(sql.ends_with("LIMIT 1"), "{sql}");
        assert_eq!(params[0], crate::sql::PgBindValue::String("tropics".into()));
    }

    #[tokio::test]
    async fn zero_matches_is_reference_not_found() {
        let (ctx, _) = ctx(ScriptedStore::new());
        let err = resolve_one(&ctx, region_ref(), &map(json!({"region_name": "atlantis"})), None)
            .await
            .unwrap_err();
        match err {
            AppError::ReferenceNotFound { entity, key } => {
                assert_eq!(entity, "region");
                assert!(key.contains("atlantis"));
            }
            other => panic!("unexpected {other}"),
        }
    }

    #[tokio::test]
    async fn absent_optional_keys_resolve_to_none_without_a_query() {
        let (ctx, store) = ctx(ScriptedStore::new());
        let id = resolve_one(&ctx, sat_ref(), &map(json!({"name": "x"})), None).await.unwrap();
        assert_eq!(id, None);
        assert!(store.statements().is_empty());
    }

    #[tokio::test]
    async fn absent_required_keys_fail_validation() {
        let (ctx, _) = ctx(ScriptedStore::new());
        let err = resolve_one(&ctx, region_ref(), &map(json!({})), None).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn batch_resolves_distinct_names_once() {
        let (ctx, store) = ctx(ScriptedStore::new().with_rows(
            "regions",
            vec![
                row_for(&REGION, json!({"id": 1, "name": "global"})),
                row_for(&REGION, json!({"id": 2, "name": "tropics"})),
            ],
        ));
        let rows = vec![
            map(json!({"region_name": "global"})),
            map(json!({"region_name": "tropics"})),
            map(json!({"region_name": "global"})),
        ];
        let ids = resolve_rows(&ctx, region_ref(), &rows, None).await.unwrap();
        assert_eq!(ids, vec![Some(1), Some(2), Some(1)]);
        let stmts = store.statements();
        assert_eq!(stmts.len(), 1);
        assert!(stmts[0].0.contains("IN ($1, $2)"));
    }

    #[tokio::test]
    async fn batch_fails_when_any_name_is_missing() {
        let (ctx, _) = ctx(ScriptedStore::new().with_rows(
            "regions",
            vec![row_for(&REGION, json!({"id": 1, "name": "global"}))],
        ));
        let rows = vec![map(json!({"region_name": "global"})), map(json!({"region_name": "arctic"}))];
        let err = resolve_rows(&ctx, region_ref(), &rows, None).await.unwrap_err();
        assert!(err.to_string().contains("arctic"), "{err}");
    }

    #[tokio::test]
    async fn first_row_wins_when_names_collide() {
        let (ctx, _) = ctx(ScriptedStore::new().with_rows(
            "regions",
            vec![
                row_for(&REGION, json!({"id": 9, "name": "global"})),
                row_for(&REGION, json!({"id": 3, "name": "global"})),
            ],
        ));
        let ids = resolve_rows(&ctx, region_ref(), &[map(json!({"region_name": "global"}))], None)
            .await
            .unwrap();
        assert_eq!(ids, vec![Some(9)]);
    }

    #[tokio::test]
    async fn composite_keys_are_cached_per_tuple() {
        let (ctx, store) = ctx(ScriptedStore::new().with_rows(
            "sat_meta",
            vec![row_for(&SAT_META, json!({"id": 5, "sat_id": 224}))],
        ));
        let rows = vec![
            map(json!({"sat_id": 224})),
            map(json!({"sat_id": 224})),
            map(json!({})),
        ];
        let ids = resolve_rows(&ctx, sat_ref(), &rows, None).await.unwrap();
        assert_eq!(ids, vec![Some(5), Some(5), None]);
        assert_eq!(store.statements().len(), 1);
    }
}
