//! Request shape: `{db_request_name, method, params, body}`.

use crate::error::AppError;
use crate::schema::EntitySchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Put,
}

impl FromStr for Method {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GET" => Ok(Method::Get),
            "PUT" => Ok(Method::Put),
            other => Err(AppError::Validation(format!(
                "method must be GET or PUT, got '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Method::Get => "GET",
            Method::Put => "PUT",
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDirective {
    pub name: String,
    #[serde(rename = "order_by")]
    pub direction: Direction,
}

/// GET parameters. `record_limit` is `None` unless the request carried a positive integer.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RequestParams {
    pub filters: Value,
    pub ordering: Vec<OrderDirective>,
    pub record_limit: Option<u64>,
}

impl RequestParams {
    pub fn parse(params: Option<&Value>) -> Result<Self, AppError> {
        let params = match params {
            None | Some(Value::Null) => return Ok(RequestParams::default()),
            Some(Value::Object(m)) => m,
            Some(other) => {
                return Err(AppError::Validation(format!(
                    "params must be a mapping, got {}",
                    other
                )))
            }
        };
        let filters = params.get("filters").cloned().unwrap_or(Value::Null);
        let ordering = match params.get("ordering") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items.iter().map(parse_directive).collect::<Result<_, _>>()?,
            Some(other) => {
                return Err(AppError::Validation(format!(
                    "ordering must be a list, got {}",
                    other
                )))
            }
        };
        // Anything other than a positive integer means no limit.
        let record_limit = params
            .get("record_limit")
            .and_then(Value::as_u64)
            .filter(|n| *n > 0);
        Ok(RequestParams {
            filters,
            ordering,
            record_limit,
        })
    }

    /// Every directive must name an output column of `entity`.
    pub fn validate_ordering(&self, entity: &EntitySchema) -> Result<(), AppError> {
        for o in &self.ordering {
            if !entity.has_output(&o.name) {
                return Err(AppError::Validation(format!(
                    "cannot order {} records by unknown column '{}'",
                    entity.label, o.name
                )));
            }
        }
        Ok(())
    }
}

fn parse_directive(v: &Value) -> Result<OrderDirective, AppError> {
    let obj = v.as_object().ok_or_else(|| {
        AppError::Validation(format!("ordering entries must be mappings, got {}", v))
    })?;
    let name = obj
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| AppError::Validation(format!("ordering entry lacks a column name: {}", v)))?;
    let direction = match obj.get("order_by").and_then(Value::as_str) {
        Some("asc") => Direction::Asc,
        Some("desc") => Direction::Desc,
        _ => {
            return Err(AppError::Validation(format!(
                "order_by for '{}' must be 'asc' or 'desc'",
                name
            )))
        }
    };
    Ok(OrderDirective {
        name: name.to_string(),
        direction,
    })
}

/// A parsed request. The raw value is kept for the response envelope.
#[derive(Clone, Debug)]
pub struct DbRequest {
    pub name: String,
    pub method: Method,
    pub params: RequestParams,
    pub body: Value,
}

impl DbRequest {
    /// Name under which a request is dispatched; `name` is accepted as an older spelling.
    pub fn name_of(raw: &Value) -> Option<&str> {
        raw.get("db_request_name")
            .or_else(|| raw.get("name"))
            .and_then(Value::as_str)
    }

    pub fn parse(raw: &Value) -> Result<Self, AppError> {
        let obj = raw
            .as_object()
            .ok_or_else(|| AppError::Validation("request must be a mapping".into()))?;
        let name = Self::name_of(raw).unwrap_or_default().to_string();
        let method = match obj.get("method") {
            Some(Value::String(s)) => s.parse()?,
            _ => return Err(AppError::Validation("request lacks a method".into())),
        };
        let params = RequestParams::parse(obj.get("params"))?;
        let body = obj.get("body").cloned().unwrap_or(Value::Null);
        Ok(DbRequest {
            name,
            method,
            params,
            body,
        })
    }

    /// PUT body as a mapping.
    pub fn body_map(&self) -> Result<&Map<String, Value>, AppError> {
        self.body.as_object().ok_or_else(|| {
            AppError::Validation(format!("the 'body' key must be a mapping, was {}", self.body))
        })
    }
}
