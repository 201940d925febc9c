//! Uniform response envelope returned by every request.

use crate::error::AppError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Insert,
    Update,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Insert => "INSERT",
            Action::Update => "UPDATE",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Details {
    /// GET result. `records` is omitted when nothing matched.
    Records {
        record_count: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        records: Option<Vec<Value>>,
    },
    /// Taxonomy PUT.
    Upserted { action: Action, id: i64, record: Value },
    /// Fact PUT.
    Inserted {
        action: Action,
        record_count: usize,
        ids: Vec<i64>,
    },
}

#[derive(Clone, Debug, Serialize)]
pub struct DbActionResponse {
    pub request: Value,
    pub success: bool,
    pub message: String,
    pub details: Option<Details>,
    pub errors: Option<String>,
}

impl DbActionResponse {
    pub fn records(request: &Value, label: &str, records: Vec<Value>) -> Self {
        let record_count = records.len();
        DbActionResponse {
            request: request.clone(),
            success: true,
            message: format!("Request for {} records SUCCEEDED", label),
            details: Some(Details::Records {
                record_count,
                records: (record_count > 0).then_some(records),
            }),
            errors: None,
        }
    }

    pub fn upserted(request: &Value, label: &str, action: Action, id: i64, record: Value) -> Self {
        DbActionResponse {
            request: request.clone(),
            success: true,
            message: format!("Attempt to {} {} record SUCCEEDED", action.as_str(), label),
            details: Some(Details::Upserted { action, id, record }),
            errors: None,
        }
    }

    pub fn inserted(request: &Value, label: &str, ids: Vec<i64>) -> Self {
        DbActionResponse {
            request: request.clone(),
            success: true,
            message: format!("Attempt to INSERT {} records SUCCEEDED", label),
            details: Some(Details::Inserted {
                action: Action::Insert,
                record_count: ids.len(),
                ids,
            }),
            errors: None,
        }
    }

    pub fn failed(request: &Value, label: &str, error: &AppError) -> Self {
        DbActionResponse {
            request: request.clone(),
            success: false,
            message: format!("Failed {} request.", label),
            details: None,
            errors: Some(error.to_string()),
        }
    }

    /// Rows of a successful GET; empty for anything else.
    pub fn rows(&self) -> &[Value] {
        match &self.details {
            Some(Details::Records {
                records: Some(rows), ..
            }) => rows.as_slice(),
            _ => &[],
        }
    }

    pub fn record_count(&self) -> Option<usize> {
        match &self.details {
            Some(Details::Records { record_count, .. }) => Some(*record_count),
            Some(Details::Inserted { record_count, .. }) => Some(*record_count),
            _ => None,
        }
    }

    pub fn action(&self) -> Option<Action> {
        match &self.details {
            Some(Details::Upserted { action, .. }) | Some(Details::Inserted { action, .. }) => Some(*action),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_get_is_still_a_success() {
        let req = json!({"db_request_name": "region", "method": "GET"});
        let resp = DbActionResponse::records(&req, "region", vec![]);
        assert!(resp.success);
        let out = serde_json::to_value(&resp).unwrap();
        assert_eq!(out["details"], json!({"record_count": 0}));
        assert_eq!(out["errors"], Value::Null);
        assert_eq!(out["request"], req);
    }

    #[test]
    fn failure_carries_no_details() {
        let err = AppError::Validation("bad".into());
        let resp = DbActionResponse::failed(&json!({}), "experiment", &err);
        assert!(!resp.success);
        assert!(resp.details.is_none());
        assert_eq!(resp.errors.as_deref(), Some("validation: bad"));
        assert_eq!(resp.message, "Failed experiment request.");
    }

    #[test]
    fn upsert_serializes_action_in_caps() {
        let resp = DbActionResponse::upserted(&json!({}), "region", Action::Update, 7, json!({"id": 7}));
        let out = serde_json::to_value(&resp).unwrap();
        assert_eq!(out["details"]["action"], "UPDATE");
        assert_eq!(resp.message, "Attempt to UPDATE region record SUCCEEDED");
    }
}
