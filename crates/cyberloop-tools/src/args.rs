//! Argument extraction shared by the built-in tools.

use serde_json::{Map, Value};

use crate::ToolError;

pub fn object(args: &Value) -> Result<&Map<String, Value>, ToolError> {
    args.as_object()
        .ok_or_else(|| ToolError::InvalidParameter("Expected object arguments".to_string()))
}

pub fn required_str<'a>(args: &'a Map<String, Value>, key: &str) -> Result<&'a str, ToolError> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::parameter(key))
}

pub fn optional_str<'a>(args: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

/// First `max` characters of `text`, never splitting a character.
pub fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
