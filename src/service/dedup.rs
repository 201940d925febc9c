//! Collapses fact rows that share an identity key down to the most recently created one.

use crate::schema::CREATED_AT;
use crate::timefmt;
use chrono::NaiveDateTime;
use serde_json::Value;
use std::collections::HashMap;

fn identity(row: &Value, key: &[&str]) -> String {
    let parts: Vec<&Value> = key.iter().map(|k| row.get(*k).unwrap_or(&Value::Null)).collect();
    serde_json::to_string(&parts).unwrap_or_default()
}

fn created_at(row: &Value) -> Option<NaiveDateTime> {
    row.get(CREATED_AT)
        .and_then(Value::as_str)
        .and_then(timefmt::parse_rendered)
}

/// Keep one row per identity key: the greatest `created_at`, a missing one counting as oldest.
/// Equal timestamps keep the row that came later. Survivors stay in their original order.
pub fn retain_latest(rows: Vec<Value>, key: &[&str]) -> Vec<Value> {
    let mut winners: HashMap<String, (usize, Option<NaiveDateTime>)> = HashMap::new();
    for (idx, row) in rows.iter().enumerate() {
        let ts = created_at(row);
        winners
            .entry(identity(row, key))
            .and_modify(|w| {
                if ts >= w.1 {
                    *w = (idx, ts);
                }
            })
            .or_insert((idx, ts));
    }
    let mut keep = vec![false; rows.len()];
    for (idx, _) in winners.into_values() {
        keep[idx] = true;
    }
    rows.into_iter()
        .zip(keep)
        .filter_map(|(row, k)| k.then_some(row))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const KEY: &[&str] = &["name", "region_id"];

    #[test]
    fn newest_row_wins_and_order_is_kept() {
        let rows = vec![
            json!({"id": 1, "name": "rmse", "region_id": 1, "value": 1.0, "created_at": "2024-01-01 00:00:00"}),
            json!({"id": 2, "name": "bias", "region_id": 1, "value": 9.0, "created_at": "2024-01-01 00:00:00"}),
            json!({"id": 3, "name": "rmse", "region_id": 1, "value": 2.0, "created_at": "2024-01-02 00:00:00"}),
            json!({"id": 4, "name": "rmse", "region_id": 2, "value": 3.0, "created_at": "2023-12-31 00:00:00"}),
        ];
        let ids: Vec<i64> = retain_latest(rows, KEY).iter().map(|r| r["id"].as_i64().unwrap()).collect();
        assert_eq!(ids, vec![2, 3, 4]);
    }

    #[test]
    fn older_duplicate_later_in_the_list_loses() {
        let rows = vec![
            json!({"id": 10, "name": "rmse", "region_id": 1, "created_at": "2024-05-01 00:00:00.5"}),
            json!({"id": 11, "name": "rmse", "region_id": 1, "created_at": "2024-05-01 00:00:00"}),
        ];
        let out = retain_latest(rows, KEY);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0]["id"], 10);
    }

    #[test]
    fn ties_go_to_the_later_row() {
        let rows = vec![
            json!({"id": 1, "name": "rmse", "region_id": 1, "created_at": "2024-05-01 00:00:00"}),
            json!({"id": 2, "name": "rmse", "region_id": 1, "created_at": "2024-05-01 00:00:00"}),
        ];
        assert_eq!(retain_latest(rows, KEY)[0]["id"], 2);
    }

    #[test]
    fn missing_created_at_counts_as_oldest() {
        let rows = vec![
            json!({"id": 1, "name": "rmse", "region_id": 1, "created_at": "2020-01-01 00:00:00"}),
            json!({"id": 2, "name": "rmse", "region_id": 1, "created_at": null}),
        ];
        assert_eq!(retain_latest(rows, KEY)[0]["id"], 1);
    }

    #[test]
    fn null_key_parts_still_group() {
        let rows = vec![
            json!({"id": 1, "name": "rmse", "created_at": "2020-01-01 00:00:00"}),
            json!({"id": 2, "name": "rmse", "region_id": null, "created_at": "2020-01-02 00:00:00"}),
        ];
        let out = retain_latest(rows, KEY);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0]["id"], 2);
    }
}
