//! # cyberloop-common
//!
//! Common types shared by the cyberloop client, tools and driver crates.
//!
//! - Conversation and message management
//! - Tool declarations, tool calls and streamed tool call fragments
//! - Request, response and streaming chunk types for OpenAI-compatible endpoints
//!
//! ## Example
//!
//! ```
//! use std::collections::BTreeMap;
//!
//! use cyberloop_common::{Conversation, Parameters, Property, Tool, ToolCallAccumulator, ToolCallDelta};
//!
//! let conv = Conversation::new();
//! let msg = conv.user_message("Encode 'hi' as base64");
//!
//! let tool = Tool::function(
//!     "base64",
//!     "Encode or decode base64 text",
//!     Parameters::new(
//!         BTreeMap::from([
//!             ("operation".to_string(), Property::string_enum("Direction", &["encode", "decode"])),
//!             ("text".to_string(), Property::string("Input text")),
//!         ]),
//!         ["operation", "text"],
//!     ),
//! );
//! assert_eq!(tool.name(), "base64");
//!
//! // Fragments of one call arrive across several stream events.
//! let mut acc = ToolCallAccumulator::new();
//! acc.push(&ToolCallDelta {
//!     index: 0,
//!     id: Some("call_1".into()),
//!     name: Some("base64".into()),
//!     arguments: Some("{\"operation\":".into()),
//! });
//! acc.push(&ToolCallDelta {
//!     index: 0,
//!     arguments: Some("\"encode\",\"text\":\"hi\"}".into()),
//!     ..ToolCallDelta::default()
//! });
//!
//! let calls = acc.finish();
//! assert_eq!(calls[0].function.arguments, r#"{"operation":"encode","text":"hi"}"#);
//! # let _ = msg;
//! ```

/// Chat conversation and message types.
///
/// Provides types for managing conversations, messages, and message roles.
pub mod chat;
/// Client configuration and request/response types.
///
/// Contains types for configuring LLM clients and making chat completion requests.
pub mod client;
/// Tool declarations, tool calls and their results.
pub mod tools;

pub use chat::{Conversation, Message, MessageRole};
pub use client::{
    ChatChunk, ChatRequest, ChatResponse, Config, FinishReason, RetryConfig, ToolChoice, Usage,
};
pub use tools::{
    Function, FunctionCall, Parameters, Property, Tool, ToolCall, ToolCallAccumulator,
    ToolCallDelta, ToolResult, ToolResultError, ToolStatus,
};
