use std::collections::BTreeMap;
use std::fmt::Write;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeDelta, Utc};
use serde_json::{Map, Value, json};

use cyberloop_common::tools::{Parameters, Property, Tool};

use crate::args::{object, optional_str, required_str};
use crate::{ToolError, ToolImplementation};

const OPERATIONS: [&str; 5] = ["now", "format", "add_days", "diff", "parse"];
const DEFAULT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn iso(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS` and `YYYY-MM-DD` (midnight UTC).
fn parse_date(raw: &str) -> Result<DateTime<Utc>, ToolError> {
    let raw = raw.trim();
    if let Ok(date) = DateTime::parse_from_rfc3339(raw) {
        return Ok(date.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Ok(naive.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| ToolError::InvalidParameter(format!("Unrecognized date '{raw}'")))
}

fn date_or_now(args: &Map<String, Value>) -> Result<DateTime<Utc>, ToolError> {
    optional_str(args, "date").map_or_else(|| Ok(Utc::now()), parse_date)
}

/// Day count from `value`, which may be a number or a numeric string.
fn day_count(args: &Map<String, Value>) -> Result<i64, ToolError> {
    match args.get("value") {
        None | Some(Value::Null) => Ok(0),
        Some(Value::Number(n)) => n.as_i64().ok_or_else(|| ToolError::parameter("value")),
        Some(Value::String(s)) => s.trim().parse().map_err(|_| ToolError::parameter("value")),
        Some(_) => Err(ToolError::parameter("value")),
    }
}

fn format_date(date: &DateTime<Utc>, pattern: &str) -> Result<String, ToolError> {
    let mut formatted = String::new();
    write!(formatted, "{}", date.format(pattern))
        .map_err(|_| ToolError::InvalidParameter(format!("Invalid format string '{pattern}'")))?;
    Ok(formatted)
}

/// Current time, formatting and simple date arithmetic in UTC.
#[derive(Debug, Clone, Copy, Default)]
pub struct DateTool;

#[async_trait]
impl ToolImplementation for DateTool {
    fn get_definition(&self) -> Tool {
        let properties = BTreeMap::from([
            (
                "operation".to_string(),
                Property::string(
                    "The date operation to perform (e.g., \"now\", \"add_days\", \"format\", \
                     \"diff\", \"parse\")",
                ),
            ),
            (
                "date".to_string(),
                Property::string("The date to operate on (ISO format)"),
            ),
            (
                "value".to_string(),
                Property::string(
                    "Additional value for the operation (e.g., number of days, format string, \
                     second date for diff)",
                ),
            ),
        ]);

        Tool::function(
            "date",
            "Perform date and time calculations, conversions, or formatting operations.",
            Parameters::new(properties, ["operation"]),
        )
    }

    async fn execute(&self, args: &Value) -> Result<Value, ToolError> {
        let args = object(args)?;
        let operation = required_str(args, "operation")?;

        match operation {
            "now" => {
                let now = Utc::now();
                Ok(json!({ "date": iso(&now), "timestamp": now.timestamp_millis() }))
            }
            "format" => {
                let date = date_or_now(args)?;
                let pattern = optional_str(args, "value").unwrap_or(DEFAULT_FORMAT);
                Ok(json!({ "formatted": format_date(&date, pattern)? }))
            }
            "add_days" => {
                let date = date_or_now(args)?;
                let days = day_count(args)?;
                let result = TimeDelta::try_days(days)
                    .and_then(|delta| date.checked_add_signed(delta))
                    .ok_or_else(|| ToolError::Failed("Resulting date is out of range".into()))?;
                Ok(json!({ "result": iso(&result) }))
            }
            "diff" => {
                let start = parse_date(required_str(args, "date")?)?;
                let end = optional_str(args, "value").map_or_else(|| Ok(Utc::now()), parse_date)?;
                Ok(json!({ "days": (end - start).num_days() }))
            }
            "parse" => {
                let date = parse_date(required_str(args, "date")?)?;
                Ok(json!({ "date": iso(&date), "timestamp": date.timestamp_millis() }))
            }
            other => Err(ToolError::Unsupported {
                message: format!("Unknown operation: {other}"),
                supported: OPERATIONS.iter().map(ToString::to_string).collect(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    async fn run(args: Value) -> Result<Value, ToolError> {
        DateTool.execute(&args).await
    }

    #[tokio::test]
    async fn test_now_reports_iso_and_millis() {
        let result = run(json!({"operation": "now"})).await.unwrap();
        let date = DateTime::parse_from_rfc3339(result["date"].as_str().unwrap()).unwrap();
        assert_eq!(date.timestamp_millis(), result["timestamp"].as_i64().unwrap());
    }

    #[tokio::test]
    async fn test_add_days_accepts_numeric_strings() {
        let result = run(json!({"operation": "add_days", "date": "2024-02-27", "value": "3"}))
            .await
            .unwrap();
        assert_eq!(result["result"], "2024-03-01T00:00:00.000Z");

        let result = run(json!({"operation": "add_days", "date": "2024-03-01", "value": -1}))
            .await
            .unwrap();
        assert_eq!(result["result"], "2024-02-29T00:00:00.000Z");
    }

    #[tokio::test]
    async fn test_format_with_pattern() {
        let result = run(json!({
            "operation": "format",
            "date": "2024-07-04T12:30:00Z",
            "value": "%d/%m/%Y"
        }))
        .await
        .unwrap();
        assert_eq!(result["formatted"], "04/07/2024");

        let result = run(json!({"operation": "format", "date": "2024-07-04T12:30:00Z"}))
            .await
            .unwrap();
        assert_eq!(result["formatted"], "2024-07-04 12:30:00");
    }

    #[tokio::test]
    async fn test_invalid_format_string_is_an_error() {
        let err = run(json!({"operation": "format", "value": "%Q"})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidParameter(_)));
    }

    #[tokio::test]
    async fn test_diff_in_days() {
        let result = run(json!({
            "operation": "diff",
            "date": "2024-01-01",
            "value": "2024-03-01 12:00:00"
        }))
        .await
        .unwrap();
        assert_eq!(result["days"], 60);
    }

    #[tokio::test]
    async fn test_parse_offset_date() {
        let result = run(json!({"operation": "parse", "date": "2024-01-01T02:00:00+02:00"}))
            .await
            .unwrap();
        assert_eq!(result["date"], "2024-01-01T00:00:00.000Z");
        assert_eq!(result["timestamp"], 1_704_067_200_000_i64);
    }

    #[tokio::test]
    async fn test_unknown_operation_lists_supported() {
        let err = run(json!({"operation": "teleport"})).await.unwrap_err();
        assert_eq!(
            err.to_payload(),
            json!({
                "error": "Unknown operation: teleport",
                "supported": ["now", "format", "add_days", "diff", "parse"]
            })
        );
    }

    #[tokio::test]
    async fn test_unparseable_date() {
        let err = run(json!({"operation": "parse", "date": "next tuesday"}))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Unrecognized date 'next tuesday'");
    }
}
