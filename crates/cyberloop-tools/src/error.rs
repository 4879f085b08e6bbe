//! Tool failures and their serialized form.

use std::time::Duration;

use serde_json::{Value, json};
use thiserror::Error;

/// Errors produced while resolving or running a tool.
///
/// None of these abort a conversation. The executor turns each one into a JSON payload with an
/// `error` field via [`ToolError::to_payload`] and hands it back to the model.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ToolError {
    /// No tool with this name is registered.
    #[error("Unknown tool: {name}")]
    UnknownTool {
        /// Requested name.
        name: String,
        /// Names that are registered.
        available: Vec<String>,
    },

    /// The model sent argument text that is not valid JSON.
    #[error("Invalid JSON arguments for tool '{name}': {source}")]
    InvalidArguments {
        /// Tool the arguments were meant for.
        name: String,
        /// Parser error.
        source: serde_json::Error,
    },

    /// The tool did not finish within its time limit.
    #[error("Tool '{name}' timed out after {}s", .limit.as_secs())]
    Timeout {
        /// Tool name.
        name: String,
        /// The limit that elapsed.
        limit: Duration,
    },

    /// A parameter is missing or has the wrong shape.
    #[error("{0}")]
    InvalidParameter(String),

    /// The requested operation or unit is not handled by the tool.
    #[error("{message}")]
    Unsupported {
        /// Human-readable reason.
        message: String,
        /// Values the tool does handle.
        supported: Vec<String>,
    },

    /// The tool needs a collaborator that was not configured.
    #[error("{0}")]
    NotConfigured(String),

    /// A remote service answered with a non-success status.
    #[error("HTTP {status}: {reason}")]
    Http {
        /// Status code.
        status: u16,
        /// Canonical reason phrase.
        reason: String,
    },

    /// Transport failure talking to a remote service.
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Any other tool-specific failure.
    #[error("{0}")]
    Failed(String),
}

impl ToolError {
    /// Shorthand for the common "missing or invalid parameter" failure.
    #[must_use]
    pub fn parameter(name: &str) -> Self {
        Self::InvalidParameter(format!("Missing or invalid '{name}' parameter"))
    }

    /// Builds an [`ToolError::Http`] from a response status.
    #[must_use]
    pub fn http(status: reqwest::StatusCode) -> Self {
        Self::Http {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
        }
    }

    /// Serializes this error as the JSON object returned to the model.
    ///
    /// Always carries an `error` message. Unknown tools add `available_tools` and unsupported
    /// operations add `supported`.
    #[must_use]
    pub fn to_payload(&self) -> Value {
        let mut payload = json!({ "error": self.to_string() });
        match self {
            Self::UnknownTool { available, .. } => {
                payload["available_tools"] = json!(available);
            }
            Self::Unsupported { supported, .. } => {
                payload["supported"] = json!(supported);
            }
            _ => {}
        }
        payload
    }
}
