//! Timestamp parsing and formatting shared by filters, request bodies and row materialization.

use crate::error::AppError;
use chrono::{NaiveDate, NaiveDateTime};

/// Format used for filter values and body timestamps unless a body supplies `datestr_format`.
pub const DEFAULT_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Accepts the default format with or without fractional seconds.
const DEFAULT_PARSE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Format used when rendering timestamp cells.
pub const OUTPUT_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

fn example_time() -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(2022, 1, 14).and_then(|d| d.and_hms_opt(6, 23, 41))
}

/// Parse `value` with `format` (default when `None`). Errors carry an example of the expected shape.
pub fn parse_time(value: &str, format: Option<&str>) -> Result<NaiveDateTime, AppError> {
    let fmt = format.unwrap_or(DEFAULT_PARSE_FORMAT);
    NaiveDateTime::parse_from_str(value.trim(), fmt).map_err(|e| {
        let shown = format.unwrap_or(DEFAULT_DATETIME_FORMAT);
        let example = example_time()
            .map(|t| t.format(shown).to_string())
            .unwrap_or_default();
        AppError::Validation(format!(
            "invalid time '{}' for format '{}' (example: '{}'): {}",
            value, shown, example, e
        ))
    })
}

pub fn format_time(t: &NaiveDateTime) -> String {
    t.format(OUTPUT_DATETIME_FORMAT).to_string()
}

/// Parse a rendered timestamp cell back; used when ordering rows by `created_at`.
pub fn parse_rendered(value: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, OUTPUT_DATETIME_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
}
