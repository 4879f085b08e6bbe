use std::collections::BTreeMap;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Value, json};

use cyberloop_common::tools::{Parameters, Property, Tool};

use crate::args::{object, required_str};
use crate::{ToolError, ToolImplementation};

/// Standard-alphabet Base64 encoding of UTF-8 text.
#[derive(Debug, Clone, Copy, Default)]
pub struct Base64Tool;

#[async_trait]
impl ToolImplementation for Base64Tool {
    fn get_definition(&self) -> Tool {
        let properties = BTreeMap::from([
            (
                "operation".to_string(),
                Property::string_enum("Either \"encode\" or \"decode\"", &["encode", "decode"]),
            ),
            (
                "data".to_string(),
                Property::string("The data to encode or decode"),
            ),
        ]);

        Tool::function(
            "base64",
            "Encode or decode data using Base64 encoding.",
            Parameters::new(properties, ["operation", "data"]),
        )
    }

    async fn execute(&self, args: &Value) -> Result<Value, ToolError> {
        let args = object(args)?;
        let operation = required_str(args, "operation")?;
        let data = required_str(args, "data")?;

        match operation {
            "encode" => {
                let encoded = STANDARD.encode(data.as_bytes());
                Ok(json!({ "length": encoded.len(), "encoded": encoded }))
            }
            "decode" => {
                let bytes = STANDARD
                    .decode(data.trim())
                    .map_err(|e| ToolError::InvalidParameter(format!("Invalid base64 data: {e}")))?;
                let decoded = String::from_utf8(bytes)
                    .map_err(|_| ToolError::Failed("Decoded data is not valid UTF-8".into()))?;
                Ok(json!({ "length": decoded.chars().count(), "decoded": decoded }))
            }
            other => Err(ToolError::Unsupported {
                message: format!("Unknown operation: {other}"),
                supported: vec!["encode".to_string(), "decode".to_string()],
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[tokio::test]
    async fn test_encode_and_decode() {
        let encoded = Base64Tool
            .execute(&json!({"operation": "encode", "data": "abc"}))
            .await
            .unwrap();
        assert_eq!(encoded, json!({"encoded": "YWJj", "length": 4}));

        let decoded = Base64Tool
            .execute(&json!({"operation": "decode", "data": "YWJj"}))
            .await
            .unwrap();
        assert_eq!(decoded, json!({"decoded": "abc", "length": 3}));
    }

    #[tokio::test]
    async fn test_invalid_input() {
        let err = Base64Tool
            .execute(&json!({"operation": "decode", "data": "!!!"}))
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("Invalid base64 data"));

        let err = Base64Tool
            .execute(&json!({"operation": "decode", "data": "/w=="}))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Decoded data is not valid UTF-8");
    }

    #[tokio::test]
    async fn test_unknown_operation() {
        let err = Base64Tool
            .execute(&json!({"operation": "rot13", "data": "abc"}))
            .await
            .unwrap_err();
        assert_eq!(err.to_payload()["supported"], json!(["encode", "decode"]));
    }
}
