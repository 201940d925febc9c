//! Harvest translation: reshapes rows produced by external harvesters into metric rows and
//! submits them as an internal `expt_metrics` or `expt_array_metrics` PUT.

use crate::error::AppError;
use crate::handlers::RequestHandler;
use crate::request::{DbRequest, Method};
use crate::response::DbActionResponse;
use crate::state::DbContext;
use async_trait::async_trait;
use serde_json::{json, Map, Value};

pub trait HarvestTranslator: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    /// One harvested row in, one metric row out.
    fn translate(&self, row: &Map<String, Value>) -> Result<Value, AppError>;
}

fn get<'a>(row: &'a Map<String, Value>, key: &str, translator: &str) -> Result<&'a Value, AppError> {
    row.get(key)
        .ok_or_else(|| AppError::Validation(format!("{} row lacks '{}'", translator, key)))
}

fn text(row: &Map<String, Value>, key: &str, translator: &str) -> Result<String, AppError> {
    Ok(match get(row, key, translator)? {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}

/// `<statistic>_<variable>` over the global region; time taken from `time_key`.
fn scalar_metric(row: &Map<String, Value>, time_key: &str, translator: &str) -> Result<Value, AppError> {
    Ok(json!({
        "name": format!("{}_{}", text(row, "statistic", translator)?, text(row, "variable", translator)?),
        "region_name": "global",
        "elevation": null,
        "elevation_unit": "N/A",
        "value": get(row, "value", translator)?,
        "time_valid": get(row, time_key, translator)?,
        "forecast_hour": null,
        "ensemble_member": null,
    }))
}

pub struct IncLogs;

impl HarvestTranslator for IncLogs {
    fn name(&self) -> &'static str {
        "inc_logs"
    }

    fn description(&self) -> &'static str {
        "translate harvest values from inc_logs harvester"
    }

    fn translate(&self, row: &Map<String, Value>) -> Result<Value, AppError> {
        scalar_metric(row, "cycletime", self.name())
    }
}

pub struct DailyBfg;

impl HarvestTranslator for DailyBfg {
    fn name(&self) -> &'static str {
        "daily_bfg"
    }

    fn description(&self) -> &'static str {
        "translate harvest values from daily bfg harvester"
    }

    fn translate(&self, row: &Map<String, Value>) -> Result<Value, AppError> {
        scalar_metric(row, "mediantime", self.name())
    }
}

pub struct GsiRadianceChannel;

impl HarvestTranslator for GsiRadianceChannel {
    fn name(&self) -> &'static str {
        "gsi_radiance_channel"
    }

    fn description(&self) -> &'static str {
        "translate harvest values from gsi_satellite_radiance harvester"
    }

    fn translate(&self, row: &Map<String, Value>) -> Result<Value, AppError> {
        let t = self.name();
        Ok(json!({
            "name": format!(
                "{}_{}_GSIstage_{}",
                text(row, "observation_type", t)?,
                text(row, "statistic", t)?,
                text(row, "iteration", t)?
            ),
            "region_name": "global",
            "value": get(row, "values_by_channel", t)?,
            "assimilated": null,
            "time_valid": get(row, "datetime", t)?,
            "forecast_hour": null,
            "ensemble_member": row.get("ensemble_member").cloned().unwrap_or(Value::Null),
        }))
    }
}

pub const TRANSLATORS: &[&dyn HarvestTranslator] = &[&IncLogs, &DailyBfg, &GsiRadianceChannel];

pub fn translator_for(name: &str) -> Option<&'static dyn HarvestTranslator> {
    TRANSLATORS.iter().copied().find(|t| t.name() == name)
}

pub fn valid_translators() -> Vec<&'static str> {
    TRANSLATORS.iter().map(|t| t.name()).collect()
}

/// Rows without a translator go through as-is; a scalar row's `cycletime` stands in for `time_valid`.
fn pass_through(row: &Map<String, Value>, is_array: bool) -> Value {
    let mut out = row.clone();
    if !is_array && !out.contains_key("time_valid") {
        if let Some(t) = out.remove("cycletime") {
            out.insert("time_valid".into(), t);
        }
    }
    Value::Object(out)
}

/// `harvest_metrics`: PUT only.
pub struct HarvestHandler;

const LABEL: &str = "harvest metric";

fn setting<'a>(raw: &'a Value, body: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    body.get(key)
        .or_else(|| raw.get(key))
        .filter(|v| !v.is_null())
}

impl HarvestHandler {
    fn translate_rows(raw: &Value, body: &Map<String, Value>, is_array: bool) -> Result<Vec<Value>, AppError> {
        let rows = match setting(raw, body, "harvested_data") {
            Some(Value::Array(items)) => items,
            Some(other) => {
                return Err(AppError::Validation(format!("harvested_data must be a list, got {}", other)))
            }
            None => return Err(AppError::Validation("harvested_data is required".into())),
        };
        let translator = match setting(raw, body, "hv_translator").and_then(Value::as_str) {
            None | Some("") => None,
            Some(name) => Some(translator_for(name).ok_or_else(|| {
                AppError::Validation(format!(
                    "unknown harvest translator '{}'; valid translators: {:?}",
                    name,
                    valid_translators()
                ))
            })?),
        };
        rows.iter()
            .map(|r| {
                let row = r.as_object().ok_or_else(|| {
                    AppError::Validation(format!("harvested rows must be mappings, got {}", r))
                })?;
                match translator {
                    Some(t) => t.translate(row).map_err(|e| {
                        AppError::Validation(format!(
                            "translating with '{}' failed ({}); valid translators: {:?}",
                            t.name(),
                            e,
                            valid_translators()
                        ))
                    }),
                    None => Ok(pass_through(row, is_array)),
                }
            })
            .collect()
    }

    async fn run(&self, ctx: &DbContext, raw: &Value) -> Result<DbActionResponse, AppError> {
        let req = DbRequest::parse(raw)?;
        if req.method != Method::Put {
            return Err(AppError::Validation("harvest_metrics only supports PUT".into()));
        }
        let body = req.body_map()?;
        let is_array = setting(raw, body, "is_array").and_then(Value::as_bool).unwrap_or(false);
        let rows = Self::translate_rows(raw, body, is_array)?;

        let (target, rows_key) = if is_array {
            ("expt_array_metrics", "array_metrics")
        } else {
            ("expt_metrics", "metrics")
        };
        let mut inner = Map::new();
        for key in ["expt_name", "expt_wallclock_start"] {
            if let Some(v) = body.get(key) {
                inner.insert(key.to_string(), v.clone());
            }
        }
        if let Some(fmt) = setting(raw, body, "datetime_str").or_else(|| setting(raw, body, "datestr_format")) {
            inner.insert("datestr_format".into(), fmt.clone());
        }
        inner.insert(rows_key.to_string(), Value::Array(rows));
        let request = json!({"db_request_name": target, "method": "PUT", "body": inner});

        tracing::debug!(target_request = target, "submitting harvested rows");
        ctx.submit(&request).await.map_err(|e| AppError::InternalRequest {
            request: target.to_string(),
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl RequestHandler for HarvestHandler {
    fn name(&self) -> &'static str {
        "harvest_metrics"
    }

    async fn handle(&self, ctx: &DbContext, request: &Value) -> DbActionResponse {
        match self.run(ctx, request).await {
            Ok(resp) => resp,
            Err(e) => {
                tracing::warn!(request = "harvest_metrics", code = e.code(), error = %e, "request failed");
                DbActionResponse::failed(request, LABEL, &e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::entities::{ARRAY_METRIC_TYPE, EXPERIMENT, METRIC_TYPE, REGION};
    use crate::service::testing::{row_for, ScriptedStore};
    use std::sync::Arc;

    fn map(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn inc_logs_names_by_statistic_and_variable() {
        let row = map(json!({
            "logfile": "calc_increment.log", "cycletime": "2016-01-01 06:00:00",
            "statistic": "mean", "variable": "pt_inc", "value": -0.0021, "units": "K",
        }));
        let out = IncLogs.translate(&row).unwrap();
        assert_eq!(out["name"], "mean_pt_inc");
        assert_eq!(out["region_name"], "global");
        assert_eq!(out["elevation_unit"], "N/A");
        assert_eq!(out["time_valid"], "2016-01-01 06:00:00");
    }

    #[test]
    fn daily_bfg_uses_median_time() {
        let row = map(json!({
            "statistic": "mean", "variable": "tmp2m", "value": 287.1, "mediantime": "2016-01-01 12:00:00",
        }));
        assert_eq!(DailyBfg.translate(&row).unwrap()["time_valid"], "2016-01-01 12:00:00");
    }

    #[test]
    fn gsi_radiance_builds_array_metric() {
        let row = map(json!({
            "datetime": "2016-01-01 00:00:00", "iteration": 1, "observation_type": "amsua_n15",
            "statistic": "bias_post_corr", "values_by_channel": [0.1, null, 0.3], "ensemble_member": 0,
        }));
        let out = GsiRadianceChannel.translate(&row).unwrap();
        assert_eq!(out["name"], "amsua_n15_bias_post_corr_GSIstage_1");
        assert_eq!(out["value"], json!([0.1, null, 0.3]));
        assert_eq!(out["ensemble_member"], 0);
    }

    #[test]
    fn missing_field_fails_translation() {
        let err = IncLogs.translate(&map(json!({"statistic": "mean"}))).unwrap_err();
        assert!(err.to_string().contains("variable"));
    }

    #[test]
    fn registry_of_translators() {
        assert_eq!(valid_translators(), vec!["inc_logs", "daily_bfg", "gsi_radiance_channel"]);
        assert!(translator_for("nope").is_none());
    }

    fn ctx(store: ScriptedStore) -> (DbContext, Arc<ScriptedStore>) {
        let store = Arc::new(store);
        (DbContext::with_store(store.clone(), "public"), store)
    }

    #[tokio::test]
    async fn unknown_translator_lists_valid_names() {
        let (ctx, store) = ctx(ScriptedStore::new());
        let req = json!({
            "db_request_name": "harvest_metrics",
            "method": "PUT",
            "body": {"expt_name": "exp", "expt_wallclock_start": "2023-01-01 00:00:00",
                     "hv_translator": "grib", "harvested_data": [{}]},
        });
        let resp = ctx.submit(&req).await.unwrap();
        assert!(!resp.success);
        assert_eq!(resp.message, "Failed harvest metric request.");
        assert!(resp.errors.unwrap().contains("inc_logs"));
        assert!(store.statements().is_empty());
    }

    #[tokio::test]
    async fn translated_rows_land_in_expt_metrics() {
        let (ctx, store) = ctx(
            ScriptedStore::new()
                .with_rows("experiments", vec![row_for(&EXPERIMENT, json!({"id": 1, "name": "exp"}))])
                .with_rows("metric_types", vec![row_for(&METRIC_TYPE, json!({"id": 2, "name": "mean_pt_inc"}))])
                .with_rows("regions", vec![row_for(&REGION, json!({"id": 3, "name": "global"}))]),
        );
        let req = json!({
            "db_request_name": "harvest_metrics",
            "method": "PUT",
            "hv_translator": "inc_logs",
            "body": {
                "expt_name": "exp",
                "expt_wallclock_start": "2023-01-01 00:00:00",
                "datetime_str": "%Y-%m-%d %H:%M:%S",
                "harvested_data": [
                    {"cycletime": "2016-01-01 06:00:00", "statistic": "mean", "variable": "pt_inc", "value": 0.5},
                ],
            },
        });
        let resp = ctx.submit(&req).await.unwrap();
        assert!(resp.success, "{:?}", resp.errors);
        assert_eq!(resp.request["db_request_name"], "expt_metrics");
        assert_eq!(resp.record_count(), Some(1));
        assert!(store.statements().last().unwrap().0.contains("\"expt_metrics\""));
    }

    #[tokio::test]
    async fn array_rows_pass_through_untranslated() {
        let (ctx, store) = ctx(
            ScriptedStore::new()
                .with_rows("experiments", vec![row_for(&EXPERIMENT, json!({"id": 1, "name": "exp"}))])
                .with_rows("array_metric_types", vec![row_for(&ARRAY_METRIC_TYPE, json!({"id": 5, "name": "omf"}))])
                .with_rows("regions", vec![row_for(&REGION, json!({"id": 3, "name": "global"}))]),
        );
        let req = json!({
            "db_request_name": "harvest_metrics",
            "method": "PUT",
            "body": {
                "expt_name": "exp",
                "expt_wallclock_start": "2023-01-01 00:00:00",
                "is_array": true,
                "harvested_data": [
                    {"name": "omf", "region_name": "global", "value": [1.0, 2.0], "time_valid": "2016-01-01 00:00:00"},
                ],
            },
        });
        let resp = ctx.submit(&req).await.unwrap();
        assert!(resp.success, "{:?}", resp.errors);
        assert!(store.statements().last().unwrap().0.contains("\"expt_array_metrics\""));
    }
}
