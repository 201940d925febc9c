//! PUT body validation from descriptor rules.

use crate::error::AppError;
use crate::schema::ValidationRule;
use crate::timefmt;
use serde_json::{Map, Value};

pub struct RequestValidator;

impl RequestValidator {
    /// Validate body against per-column rules. All required fields must be present and non-null.
    pub fn validate(body: &Map<String, Value>, rules: &[ValidationRule]) -> Result<(), AppError> {
        for rule in rules {
            let val = body.get(rule.column);
            if rule.required && val.map(Value::is_null).unwrap_or(true) {
                return Err(AppError::Validation(format!("{} is required", rule.column)));
            }
            if let Some(v) = val {
                validate_field(rule.column, v, rule)?;
            }
        }
        Ok(())
    }

    /// For each `(low, high)` pair present in the body, `low` must not exceed `high`.
    /// Numbers compare numerically; strings are parsed as times with `datestr_format`.
    pub fn validate_ordered(
        body: &Map<String, Value>,
        pairs: &[(&str, &str)],
        datestr_format: Option<&str>,
    ) -> Result<(), AppError> {
        for (low, high) in pairs {
            let (Some(a), Some(b)) = (body.get(*low), body.get(*high)) else {
                continue;
            };
            let inverted = match (a, b) {
                (Value::Number(x), Value::Number(y)) => x.as_f64() > y.as_f64(),
                (Value::String(x), Value::String(y)) => {
                    timefmt::parse_time(x, datestr_format)? > timefmt::parse_time(y, datestr_format)?
                }
                _ => false,
            };
            if inverted {
                return Err(AppError::Validation(format!(
                    "{} ({}) must not be greater than {} ({})",
                    low, a, high, b
                )));
            }
        }
        Ok(())
    }
}

fn as_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok().filter(|n: &f64| n.is_finite()),
        _ => None,
    }
}

fn validate_field(col: &str, v: &Value, rule: &ValidationRule) -> Result<(), AppError> {
    if v.is_null() {
        return Ok(());
    }
    if let Some(allowed) = rule.allowed {
        let ok = v.as_str().map(|s| allowed.contains(&s)).unwrap_or(false);
        if !ok {
            return Err(AppError::Validation(format!(
                "{} must be one of: {:?}, got {}",
                col, allowed, v
            )));
        }
    }
    if rule.minimum.is_some() || rule.maximum.is_some() || rule.nonzero {
        let n = as_number(v)
            .ok_or_else(|| AppError::Validation(format!("{} must be a number, got {}", col, v)))?;
        if let Some(min) = rule.minimum {
            if n < min {
                return Err(AppError::Validation(format!("{} must be at least {}", col, min)));
            }
        }
        if let Some(max) = rule.maximum {
            if n > max {
                return Err(AppError::Validation(format!("{} must be at most {}", col, max)));
            }
        }
        if rule.nonzero && n == 0.0 {
            return Err(AppError::Validation(format!("no files found: {} is 0", col)));
        }
    }
    Ok(())
}
