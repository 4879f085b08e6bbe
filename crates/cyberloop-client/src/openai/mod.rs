//! OpenAI chat completions wire types and client.
//!
//! These types mirror the JSON the completions endpoint accepts and returns. Any
//! OpenAI-compatible provider (Moonshot, OpenAI, local gateways) speaks this format.

use std::borrow::Cow;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use typed_builder::TypedBuilder;

use cyberloop_common::chat::{Message, MessageRole};
use cyberloop_common::client::{ChatRequest, Config, Usage};
use cyberloop_common::tools::{FunctionCall, Tool, ToolCall, ToolCallDelta};

pub mod client;
pub use client::{OpenAIClient, convert_chunk_to_chat_chunk};

/// A single choice from a chat completion response.
#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    /// The index of this choice in the response array.
    #[serde(default)]
    pub index: u32,
    /// The generated message for this choice.
    pub message: OpenAIMessage,
    /// Why generation stopped for this choice.
    ///
    /// Common values: "stop", "length", "tool_calls", "content_filter"
    pub finish_reason: Option<String>,
}

/// OpenAI-compatible message format.
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
pub struct OpenAIMessage {
    /// The role of the message author (user, assistant, system, or tool).
    pub role: MessageRole,
    /// The text content of the message (optional for tool calls).
    #[builder(default)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Reasoning text from thinking models (responses only).
    #[builder(default)]
    #[serde(default, skip_serializing)]
    pub reasoning_content: Option<String>,
    /// Optional name of the message author.
    #[builder(default)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Tool calls requested by the assistant (optional).
    #[builder(default)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<SmallVec<[OpenAIToolCall; 2]>>,
    /// ID of the tool call this message is responding to (for tool messages).
    #[builder(default)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl From<&Message> for OpenAIMessage {
    fn from(message: &Message) -> Self {
        let tool_calls = (!message.tool_calls.is_empty()).then(|| {
            message
                .tool_calls
                .iter()
                .map(OpenAIToolCall::from)
                .collect()
        });

        // Only include content if it's non-empty
        let content = (!message.content.is_empty()).then(|| message.content.clone());

        Self::builder()
            .role(message.role)
            .content(content)
            .name(message.name.clone())
            .tool_calls(tool_calls)
            .tool_call_id(message.tool_call_id.clone())
            .build()
    }
}

/// OpenAI-compatible tool call format.
///
/// Uses `Cow<'static, str>` to avoid allocations for static strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIToolCall {
    /// Unique identifier for this tool call.
    pub id: Cow<'static, str>,
    /// Type of the tool call, typically "function".
    #[serde(rename = "type", default = "default_tool_call_type")]
    pub r#type: Cow<'static, str>,
    /// The function to call with its arguments.
    pub function: OpenAIFunction,
}

impl From<&ToolCall> for OpenAIToolCall {
    fn from(tool_call: &ToolCall) -> Self {
        Self {
            id: Cow::Owned(tool_call.id.clone()),
            r#type: Cow::Owned(tool_call.call_type.clone()),
            function: OpenAIFunction::from(&tool_call.function),
        }
    }
}

impl From<&OpenAIToolCall> for ToolCall {
    fn from(call: &OpenAIToolCall) -> Self {
        let mut tool_call = Self::with_id(
            call.id.to_string(),
            call.function.name.to_string(),
            call.function.arguments.to_string(),
        );
        tool_call.call_type = call.r#type.to_string();
        tool_call
    }
}

const fn default_tool_call_type() -> Cow<'static, str> {
    Cow::Borrowed("function")
}

/// OpenAI-compatible function call format.
///
/// Contains the function name and JSON-serialized arguments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIFunction {
    /// The name of the function to call.
    pub name: Cow<'static, str>,
    /// The arguments as a JSON-serialized string.
    #[serde(default)]
    pub arguments: Cow<'static, str>,
}

impl From<&FunctionCall> for OpenAIFunction {
    fn from(function_call: &FunctionCall) -> Self {
        Self {
            name: Cow::Owned(function_call.name.clone()),
            arguments: Cow::Owned(function_call.arguments.clone()),
        }
    }
}

/// Options for streamed responses.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct StreamOptions {
    /// Ask for a final usage-only chunk before `[DONE]`.
    pub include_usage: bool,
}

/// Request body for `POST /chat/completions`.
///
/// # Examples
///
/// ```
/// use cyberloop_client::openai::ChatCompletionRequest;
///
/// let request = ChatCompletionRequest::builder()
///     .model("kimi-k2-turbo-preview".to_string())
///     .messages(vec![])
///     .temperature(Some(0.3))
///     .build();
/// ```
#[derive(Debug, Clone, Serialize, TypedBuilder)]
pub struct ChatCompletionRequest {
    /// The model identifier to use.
    pub model: String,
    /// The conversation messages in OpenAI format.
    pub messages: Vec<OpenAIMessage>,
    /// Maximum tokens to generate (optional).
    #[builder(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Sampling temperature 0.0 to 2.0 (optional).
    #[builder(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Whether to stream the response.
    #[builder(default)]
    pub stream: bool,
    /// Tools available for function calling (optional).
    #[builder(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Arc<[Tool]>>,
    /// Tool selection strategy (optional).
    #[builder(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<serde_json::Value>,
    /// Stream options, set for streamed requests.
    #[builder(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_options: Option<StreamOptions>,
}

/// Maps a generic request onto the wire format.
///
/// The request's model and temperature win; the client configuration fills in what is unset.
impl From<(&ChatRequest, &Config)> for ChatCompletionRequest {
    fn from((request, config): (&ChatRequest, &Config)) -> Self {
        let messages: Vec<OpenAIMessage> =
            request.messages.iter().map(OpenAIMessage::from).collect();

        Self::builder()
            .model(
                request
                    .model
                    .clone()
                    .unwrap_or_else(|| config.model.clone()),
            )
            .messages(messages)
            .max_tokens(request.max_tokens.or(config.max_tokens))
            .temperature(request.temperature.or(config.temperature))
            .stream(request.stream)
            .tools(request.tools.clone().filter(|tools| !tools.is_empty()))
            .tool_choice(request.tool_choice.as_ref().map(|tc| tc.clone().into()))
            .build()
    }
}

/// Response from a non-streamed chat completion.
#[derive(Debug, Deserialize)]
pub struct ChatCompletionResponse {
    /// Unique identifier for this completion.
    #[serde(default)]
    pub id: String,
    /// Unix timestamp of when the completion was created.
    #[serde(default)]
    pub created: u64,
    /// The model that generated this completion.
    #[serde(default)]
    pub model: String,
    /// Array of generated completions.
    pub choices: Vec<ChatChoice>,
    /// Token usage statistics (if available).
    #[serde(default)]
    pub usage: Option<Usage>,
}

/// A single choice from a streaming chat completion chunk.
#[derive(Debug, Deserialize)]
pub struct ChatStreamChoice {
    /// The index of this choice in the response array.
    #[serde(default)]
    pub index: u32,
    /// Incremental message delta for this chunk.
    #[serde(default)]
    pub delta: OpenAIMessageDelta,
    /// Why generation stopped (only present in final chunk).
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Delta representing incremental changes to a message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpenAIMessageDelta {
    /// The role (only present in first chunk).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<MessageRole>,
    /// Incremental content added in this chunk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Incremental reasoning text from thinking models.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_content: Option<String>,
    /// Incremental tool calls (for function calling).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<SmallVec<[OpenAIToolCallDelta; 2]>>,
}

/// Delta representing incremental changes to a tool call.
///
/// Tool calls may be built across multiple streaming chunks that share an `index`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIToolCallDelta {
    /// Index of this tool call in the array.
    #[serde(default)]
    pub index: u32,
    /// Unique identifier (only present in first chunk for this tool call).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Type of tool call (only present in first chunk).
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub r#type: Option<String>,
    /// Incremental function call data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<OpenAIFunctionDelta>,
}

impl From<&OpenAIToolCallDelta> for ToolCallDelta {
    fn from(delta: &OpenAIToolCallDelta) -> Self {
        Self {
            index: delta.index,
            id: delta.id.clone(),
            name: delta.function.as_ref().and_then(|f| f.name.clone()),
            arguments: delta.function.as_ref().and_then(|f| f.arguments.clone()),
        }
    }
}

/// Delta representing incremental changes to a function call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIFunctionDelta {
    /// Function name (only present in first chunk).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Incremental arguments added in this chunk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

/// One streamed chat completion event.
///
/// The usage-only event that ends a stream with `include_usage` has an empty or missing
/// `choices` array.
#[derive(Debug, Deserialize)]
pub struct ChatCompletionChunk {
    /// Unique identifier for this completion stream.
    #[serde(default)]
    pub id: String,
    /// Unix timestamp of when this chunk was created.
    #[serde(default)]
    pub created: u64,
    /// The model generating this stream.
    #[serde(default)]
    pub model: String,
    /// Array of delta choices; some providers leave it out of the usage event.
    #[serde(default)]
    pub choices: Vec<ChatStreamChoice>,
    /// Token usage, usually only on the final event.
    #[serde(default)]
    pub usage: Option<Usage>,
}
