//! Filter predicate builder: turns a nested `filters` mapping into typed predicates.
//!
//! Each field accepts one shape per kind:
//! - text: `{like: pattern}` or `{exact: string | [string, ...]}`; `like` wins when both are given
//! - time: `{exact: time}` or `{from: time, to: time}`; `exact` wins
//! - number / bool: a bare scalar
//!
//! Shapes that do not fit a field's kind are skipped rather than rejected, so one filter
//! mapping can carry sub-blocks for several related entities.

use crate::error::AppError;
use crate::schema::{FilterBlock, FilterField, FilterKind};
use crate::sql::PgBindValue;
use crate::timefmt;
use chrono::NaiveDateTime;
use serde_json::{Map, Value};

/// Scalar operand of an equality predicate.
#[derive(Clone, Debug, PartialEq)]
pub enum ScalarValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Timestamp(NaiveDateTime),
}

impl ScalarValue {
    pub fn to_bind(&self) -> PgBindValue {
        match self {
            ScalarValue::Int(i) => PgBindValue::I64(*i),
            ScalarValue::Float(f) => PgBindValue::F64(*f),
            ScalarValue::Bool(b) => PgBindValue::Bool(*b),
            ScalarValue::Timestamp(t) => PgBindValue::Timestamp(*t),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum FieldFilter {
    /// Set membership; a single value is plain equality.
    Exact(Vec<String>),
    Like(String),
    /// Inclusive on both ends; at least one bound is set.
    Range {
        from: Option<NaiveDateTime>,
        to: Option<NaiveDateTime>,
    },
    Eq(ScalarValue),
}

/// One condition against `alias.column`. Predicates are AND-combined.
#[derive(Clone, Debug, PartialEq)]
pub struct Predicate {
    pub alias: &'static str,
    pub column: &'static str,
    pub filter: FieldFilter,
}

/// Build predicates for every block. `Null` filters yield no predicates; any other non-object is rejected.
pub fn build_predicates(filters: &Value, blocks: &[FilterBlock]) -> Result<Vec<Predicate>, AppError> {
    let root = match filters {
        Value::Null => return Ok(Vec::new()),
        Value::Object(m) => m,
        other => {
            return Err(AppError::Validation(format!(
                "filters must be a mapping, got {}",
                other
            )))
        }
    };
    let mut out = Vec::new();
    for block in blocks {
        let source = match block.key {
            None => root,
            Some(key) => match root.get(key) {
                Some(Value::Object(m)) => m,
                _ => continue,
            },
        };
        for field in block.fields {
            if let Some(filter) = field_filter(field, source)? {
                out.push(Predicate {
                    alias: field.alias,
                    column: field.column,
                    filter,
                });
            }
        }
    }
    Ok(out)
}

fn field_filter(field: &FilterField, source: &Map<String, Value>) -> Result<Option<FieldFilter>, AppError> {
    let Some((key, value)) = field
        .keys
        .iter()
        .find_map(|k| source.get(*k).map(|v| (*k, v)))
    else {
        return Ok(None);
    };
    match field.kind {
        FilterKind::Text => text_filter(key, value),
        FilterKind::Time => time_filter(key, value),
        FilterKind::Number => Ok(number_filter(value)),
        FilterKind::Bool => Ok(value.as_bool().map(|b| FieldFilter::Eq(ScalarValue::Bool(b)))),
    }
}

fn text_filter(key: &str, value: &Value) -> Result<Option<FieldFilter>, AppError> {
    let Value::Object(shape) = value else {
        return Ok(None);
    };
    match shape.get("like") {
        Some(Value::String(p)) => return Ok(Some(FieldFilter::Like(p.clone()))),
        Some(Value::Null) | None => {}
        Some(other) => {
            return Err(AppError::Validation(format!(
                "{}: 'like' must be a string, got {}",
                key, other
            )))
        }
    }
    match shape.get("exact") {
        Some(Value::String(s)) => Ok(Some(FieldFilter::Exact(vec![s.clone()]))),
        Some(Value::Array(items)) => {
            let values = items
                .iter()
                .map(|i| {
                    i.as_str().map(str::to_string).ok_or_else(|| {
                        AppError::Validation(format!(
                            "{}: 'exact' list must contain only strings, found {}",
                            key, i
                        ))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Some(FieldFilter::Exact(values)))
        }
        Some(Value::Null) | None => Ok(None),
        Some(other) => Err(AppError::Validation(format!(
            "{}: 'exact' must be a string or list of strings, got {}",
            key, other
        ))),
    }
}

fn time_value(key: &str, bound: &str, v: &Value) -> Result<Option<NaiveDateTime>, AppError> {
    match v {
        Value::Null => Ok(None),
        Value::String(s) => timefmt::parse_time(s, None).map(Some),
        other => Err(AppError::Validation(format!(
            "{}: '{}' must be a time string, got {}",
            key, bound, other
        ))),
    }
}

fn time_filter(key: &str, value: &Value) -> Result<Option<FieldFilter>, AppError> {
    let Value::Object(shape) = value else {
        return Ok(None);
    };
    if let Some(v) = shape.get("exact") {
        if let Some(t) = time_value(key, "exact", v)? {
            return Ok(Some(FieldFilter::Eq(ScalarValue::Timestamp(t))));
        }
    }
    let from = match shape.get("from") {
        Some(v) => time_value(key, "from", v)?,
        None => None,
    };
    let to = match shape.get("to") {
        Some(v) => time_value(key, "to", v)?,
        None => None,
    };
    if let (Some(f), Some(t)) = (from, to) {
        if t < f {
            return Err(AppError::Validation(format!(
                "{}: 'from' ({}) must not be later than 'to' ({})",
                key,
                timefmt::format_time(&f),
                timefmt::format_time(&t)
            )));
        }
    }
    if from.is_none() && to.is_none() {
        return Ok(None);
    }
    Ok(Some(FieldFilter::Range { from, to }))
}

fn number_filter(value: &Value) -> Option<FieldFilter> {
    let Value::Number(n) = value else {
        return None;
    };
    let scalar = match n.as_i64() {
        Some(i) => ScalarValue::Int(i),
        None => ScalarValue::Float(n.as_f64()?),
    };
    Some(FieldFilter::Eq(scalar))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::entities::{EXPERIMENT, EXPT_METRIC};
    use serde_json::json;

    fn t(s: &str) -> NaiveDateTime {
        timefmt::parse_time(s, None).unwrap()
    }

    #[test]
    fn like_takes_precedence_over_exact() {
        let filters = json!({"name": {"like": "exp%", "exact": "exp1"}});
        let preds = build_predicates(&filters, EXPERIMENT.filters).unwrap();
        assert_eq!(
            preds,
            vec![Predicate {
                alias: "e",
                column: "name",
                filter: FieldFilter::Like("exp%".into()),
            }]
        );
    }

    #[test]
    fn exact_list_is_set_membership() {
        let filters = json!({"name": {"exact": ["a", "b"]}});
        let preds = build_predicates(&filters, EXPERIMENT.filters).unwrap();
        assert_eq!(preds[0].filter, FieldFilter::Exact(vec!["a".into(), "b".into()]));
    }

    #[test]
    fn inverted_range_is_rejected() {
        let filters = json!({"wallclock_start": {"from": "2021-01-02 00:00:00", "to": "2021-01-01 00:00:00"}});
        let err = build_predicates(&filters, EXPERIMENT.filters).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn equal_bounds_form_a_closed_range() {
        let filters = json!({"cycle_start": {"from": "2021-01-01 00:00:00", "to": "2021-01-01 00:00:00"}});
        let preds = build_predicates(&filters, EXPERIMENT.filters).unwrap();
        assert_eq!(
            preds[0].filter,
            FieldFilter::Range {
                from: Some(t("2021-01-01 00:00:00")),
                to: Some(t("2021-01-01 00:00:00")),
            }
        );
    }

    #[test]
    fn exact_time_beats_range() {
        let filters = json!({"cycle_stop": {
            "exact": "2021-05-01 12:00:00",
            "from": "2022-01-01 00:00:00",
            "to": "2020-01-01 00:00:00"
        }});
        let preds = build_predicates(&filters, EXPERIMENT.filters).unwrap();
        assert_eq!(
            preds[0].filter,
            FieldFilter::Eq(ScalarValue::Timestamp(t("2021-05-01 12:00:00")))
        );
    }

    #[test]
    fn unsupported_shapes_are_skipped() {
        let filters = json!({
            "name": "bare-string",
            "wallclock_start": 42,
            "owner_id": {"between": ["a", "b"]},
        });
        assert!(build_predicates(&filters, EXPERIMENT.filters).unwrap().is_empty());
    }

    #[test]
    fn wrong_value_types_are_rejected() {
        let bad = [
            json!({"name": {"exact": 5}}),
            json!({"name": {"exact": ["a", 1]}}),
            json!({"name": {"like": ["a"]}}),
            json!({"cycle_start": {"from": 17}}),
            json!({"cycle_start": {"exact": "not a time"}}),
        ];
        for filters in bad {
            assert!(
                build_predicates(&filters, EXPERIMENT.filters).is_err(),
                "{filters}"
            );
        }
    }

    #[test]
    fn nested_blocks_are_namespaced() {
        let filters = json!({
            "experiment": {"experiment_name": {"exact": "exp1"}},
            "regions": {"name": {"exact": ["global", "tropics"]}},
            "metric_types": "ignored",
            "forecast_hour": 6,
            "time_valid": {"from": "2023-01-01 00:00:00"},
        });
        let preds = build_predicates(&filters, EXPT_METRIC.filters).unwrap();
        let targets: Vec<(&str, &str)> = preds.iter().map(|p| (p.alias, p.column)).collect();
        assert_eq!(
            targets,
            vec![("e", "name"), ("rg", "name"), ("em", "time_valid"), ("em", "forecast_hour")]
        );
        assert_eq!(preds[3].filter, FieldFilter::Eq(ScalarValue::Int(6)));
    }

    #[test]
    fn non_mapping_filters_are_rejected() {
        assert!(build_predicates(&json!(["name"]), EXPERIMENT.filters).is_err());
        assert!(build_predicates(&Value::Null, EXPERIMENT.filters).unwrap().is_empty());
    }
}
