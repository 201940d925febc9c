//! Typed bind values for PostgreSQL and their coercion from request JSON.

use crate::error::AppError;
use crate::schema::ColumnType;
use crate::timefmt;
use chrono::NaiveDateTime;
use serde_json::Value;
use sqlx::encode::{Encode, IsNull};
use sqlx::postgres::{PgTypeInfo, Postgres};
use sqlx::{Database, Type};

/// A value that can be bound to a PostgreSQL query.
#[derive(Clone, Debug, PartialEq)]
pub enum PgBindValue {
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    String(String),
    Timestamp(NaiveDateTime),
    Json(Value),
    FloatArray(Vec<f64>),
    TextArray(Vec<String>),
}

impl PgBindValue {
    /// Coerce a request value into the column's type. `datestr_format` applies to timestamp strings.
    pub fn for_column(
        column: &str,
        ty: ColumnType,
        v: &Value,
        datestr_format: Option<&str>,
    ) -> Result<Self, AppError> {
        if v.is_null() {
            return Ok(PgBindValue::Null);
        }
        let mismatch = || {
            AppError::Validation(format!(
                "{} expects {}, got {}",
                column,
                ty.pg_type(),
                v
            ))
        };
        Ok(match ty {
            ColumnType::Text => match v {
                Value::String(s) => PgBindValue::String(s.clone()),
                Value::Number(n) => PgBindValue::String(n.to_string()),
                _ => return Err(mismatch()),
            },
            ColumnType::Serial | ColumnType::Int | ColumnType::BigInt => match v {
                Value::Number(n) => match n.as_i64() {
                    Some(i) => PgBindValue::I64(i),
                    None => match n.as_f64() {
                        Some(f) if f.fract() == 0.0 && (i64::MIN as f64..i64::MAX as f64).contains(&f) => {
                            PgBindValue::I64(f as i64)
                        }
                        _ => return Err(mismatch()),
                    },
                },
                Value::String(s) => PgBindValue::I64(s.trim().parse().map_err(|_| mismatch())?),
                _ => return Err(mismatch()),
            },
            ColumnType::Float => match v {
                Value::Number(n) => PgBindValue::F64(n.as_f64().ok_or_else(mismatch)?),
                Value::String(s) if s.eq_ignore_ascii_case("nan") => PgBindValue::Null,
                Value::String(s) => PgBindValue::F64(s.trim().parse().map_err(|_| mismatch())?),
                _ => return Err(mismatch()),
            },
            ColumnType::Bool => match v {
                Value::Bool(b) => PgBindValue::Bool(*b),
                _ => return Err(mismatch()),
            },
            ColumnType::Timestamp => match v {
                Value::String(s) => PgBindValue::Timestamp(timefmt::parse_time(s, datestr_format)?),
                _ => return Err(mismatch()),
            },
            ColumnType::Json => match v {
                // Descriptions often arrive JSON-encoded inside a string.
                Value::String(s) => PgBindValue::Json(
                    serde_json::from_str(s).unwrap_or_else(|_| Value::String(s.clone())),
                ),
                other => PgBindValue::Json(other.clone()),
            },
            ColumnType::FloatArray => match v {
                Value::Array(items) => PgBindValue::FloatArray(
                    items
                        .iter()
                        .map(|i| match i {
                            Value::Number(n) => n.as_f64().ok_or_else(mismatch),
                            Value::Null => Ok(f64::NAN),
                            _ => Err(mismatch()),
                        })
                        .collect::<Result<_, _>>()?,
                ),
                _ => return Err(mismatch()),
            },
            ColumnType::TextArray => match v {
                Value::Array(items) => PgBindValue::TextArray(
                    items
                        .iter()
                        .map(|i| match i {
                            Value::String(s) => Ok(s.clone()),
                            Value::Number(n) => Ok(n.to_string()),
                            _ => Err(mismatch()),
                        })
                        .collect::<Result<_, _>>()?,
                ),
                _ => return Err(mismatch()),
            },
        })
    }
}

impl<'q> Encode<'q, Postgres> for PgBindValue {
    fn encode_by_ref(
        &self,
        buf: &mut <Postgres as Database>::ArgumentBuffer<'q>,
    ) -> Result<IsNull, Box<dyn std::error::Error + Send + Sync>> {
        Ok(match self {
            PgBindValue::Null => <Option<String> as Encode<Postgres>>::encode_by_ref(&None, buf)?,
            PgBindValue::Bool(b) => <bool as Encode<Postgres>>::encode_by_ref(b, buf)?,
            PgBindValue::I64(n) => <i64 as Encode<Postgres>>::encode_by_ref(n, buf)?,
            PgBindValue::F64(n) => <f64 as Encode<Postgres>>::encode_by_ref(n, buf)?,
            PgBindValue::String(s) => <String as Encode<Postgres>>::encode_by_ref(s, buf)?,
            PgBindValue::Timestamp(t) => <NaiveDateTime as Encode<Postgres>>::encode_by_ref(t, buf)?,
            PgBindValue::Json(v) => <Value as Encode<Postgres>>::encode_by_ref(v, buf)?,
            PgBindValue::FloatArray(v) => <Vec<f64> as Encode<Postgres>>::encode_by_ref(v, buf)?,
            PgBindValue::TextArray(v) => <Vec<String> as Encode<Postgres>>::encode_by_ref(v, buf)?,
        })
    }

    /// Each variant declares its own wire type; the SQL side casts to the column type.
    fn produces(&self) -> Option<PgTypeInfo> {
        Some(match self {
            PgBindValue::Null | PgBindValue::String(_) => <String as Type<Postgres>>::type_info(),
            PgBindValue::Bool(_) => <bool as Type<Postgres>>::type_info(),
            PgBindValue::I64(_) => <i64 as Type<Postgres>>::type_info(),
            PgBindValue::F64(_) => <f64 as Type<Postgres>>::type_info(),
            PgBindValue::Timestamp(_) => <NaiveDateTime as Type<Postgres>>::type_info(),
            PgBindValue::Json(_) => <Value as Type<Postgres>>::type_info(),
            PgBindValue::FloatArray(_) => <Vec<f64> as Type<Postgres>>::type_info(),
            PgBindValue::TextArray(_) => <Vec<String> as Type<Postgres>>::type_info(),
        })
    }
}

impl Type<Postgres> for PgBindValue {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_name("TEXT")
    }

    fn compatible(_ty: &PgTypeInfo) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nan_string_becomes_null_for_floats() {
        let v = PgBindValue::for_column("value", ColumnType::Float, &json!("NaN"), None).unwrap();
        assert_eq!(v, PgBindValue::Null);
    }

    #[test]
    fn description_string_is_decoded_as_json() {
        let v = PgBindValue::for_column("description", ColumnType::Json, &json!("{\"a\": 1}"), None).unwrap();
        assert_eq!(v, PgBindValue::Json(json!({"a": 1})));
    }

    #[test]
    fn timestamp_uses_body_format() {
        let v = PgBindValue::for_column(
            "time_valid",
            ColumnType::Timestamp,
            &json!("20230101T000000Z"),
            Some("%Y%m%dT%H%M%SZ"),
        )
        .unwrap();
        assert!(matches!(v, PgBindValue::Timestamp(_)));
    }

    #[test]
    fn wrong_shape_is_a_validation_error() {
        let err = PgBindValue::for_column("sat_id", ColumnType::Int, &json!([1]), None).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        let err = PgBindValue::for_column("value", ColumnType::FloatArray, &json!(["x"]), None).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn whole_float_is_accepted_for_integer_columns() {
        let v = PgBindValue::for_column("ensemble_member", ColumnType::Int, &json!(3.0), None).unwrap();
        assert_eq!(v, PgBindValue::I64(3));
    }

    #[test]
    fn whole_float_beyond_i64_is_rejected() {
        let err = PgBindValue::for_column("file_size_bytes", ColumnType::BigInt, &json!(1e20), None).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)), "{err}");
        let err = PgBindValue::for_column("file_size_bytes", ColumnType::BigInt, &json!(-1e20), None).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)), "{err}");
    }
}
