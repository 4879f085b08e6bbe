//! Conversation and message types.
//!
//! A [`Conversation`] is the ordered, append-only history the driver sends to the model on each
//! iteration. Each [`Message`] carries a [`MessageRole`]:
//!
//! - **System**: instructions for the model
//! - **User**: the end user's query
//! - **Assistant**: model output, optionally carrying tool calls
//! - **Tool**: the serialized result of exactly one tool call
//!
//! # Tool Calling
//!
//! 1. Assistant messages carry tool calls via [`Message::with_tool_calls`]
//! 2. Each call is answered by a tool message created with [`Message::tool`]
//! 3. [`Conversation::add_message`] rejects tool messages that answer a call the conversation
//!    never contained
//!
//! # Example
//!
//! ```
//! use cyberloop_common::chat::Conversation;
//! use cyberloop_common::tools::ToolCall;
//!
//! let mut conversation = Conversation::new();
//! conversation.add_message(conversation.user_message("What is 100C in F?")).unwrap();
//!
//! let call = ToolCall::with_id(
//!     "call_1",
//!     "convert",
//!     r#"{"value":100,"from_unit":"celsius","to_unit":"fahrenheit"}"#,
//! );
//! let assistant = conversation
//!     .assistant_message("")
//!     .with_tool_calls(vec![call])
//!     .unwrap();
//! conversation.add_message(assistant).unwrap();
//!
//! let result = conversation
//!     .tool_message(r#"{"value":212.0}"#, "call_1".to_string(), "convert".to_string())
//!     .unwrap();
//! conversation.add_message(result).unwrap();
//!
//! assert!(conversation.unanswered_tool_calls().is_empty());
//! ```

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use typed_builder::TypedBuilder;
use uuid::Uuid;

use crate::tools::ToolCall;

/// The role of a message author.
///
/// Serializes to the lowercase names the chat completions API expects.
///
/// ```
/// use cyberloop_common::chat::MessageRole;
///
/// let json = serde_json::to_string(&MessageRole::Tool).unwrap();
/// assert_eq!(json, "\"tool\"");
/// ```
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum MessageRole {
    /// System-level instructions or context.
    #[serde(rename = "system")]
    System,
    /// Messages from the end user.
    #[serde(rename = "user")]
    User,
    /// Messages from the model, possibly requesting tool calls.
    #[serde(rename = "assistant")]
    Assistant,
    /// Results of executing a tool call.
    ///
    /// Must carry `tool_call_id` and `name` referencing the originating call.
    #[serde(rename = "tool")]
    Tool,
}

/// A single message in a conversation.
///
/// # Validation
///
/// - Tool calls only on assistant messages
/// - Tool messages must have non-empty `tool_call_id` and `name`
/// - Messages added to a conversation must share its `conversation_id`
#[derive(Debug, Serialize, Deserialize, Clone, TypedBuilder)]
pub struct Message {
    /// Unique identifier for this message.
    #[builder(default = Uuid::new_v4())]
    pub id: Uuid,

    /// ID of the conversation this message belongs to.
    pub conversation_id: Uuid,

    /// The role of the message sender.
    pub role: MessageRole,

    /// The text content of the message.
    ///
    /// For tool messages this is the serialized tool result. May be empty for assistant
    /// messages that only carry tool calls.
    pub content: String,

    /// Application-specific metadata.
    #[builder(default)]
    pub metadata: HashMap<String, serde_json::Value>,

    /// When this message was created.
    #[builder(default = Utc::now())]
    pub timestamp: DateTime<Utc>,

    /// Tool calls requested by this message (assistant messages only).
    ///
    /// `SmallVec` avoids a heap allocation for the common one- or two-call turn.
    #[builder(default)]
    pub tool_calls: SmallVec<[ToolCall; 2]>,

    /// The tool call this message answers (tool messages only).
    #[builder(default)]
    pub tool_call_id: Option<String>,

    /// Function name for tool messages.
    #[builder(default)]
    pub name: Option<String>,

    /// Reasoning text emitted by thinking models alongside the answer.
    #[builder(default)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

impl Message {
    /// Creates a new message with the specified role and content.
    pub fn new(conversation_id: Uuid, role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            conversation_id,
            role,
            content: content.into(),
            metadata: HashMap::new(),
            timestamp: Utc::now(),
            tool_calls: SmallVec::new(),
            tool_call_id: None,
            name: None,
            reasoning: None,
        }
    }

    /// Creates a new system message.
    pub fn system(conversation_id: Uuid, content: impl Into<String>) -> Self {
        Self::new(conversation_id, MessageRole::System, content)
    }

    /// Creates a new user message.
    pub fn user(conversation_id: Uuid, content: impl Into<String>) -> Self {
        Self::new(conversation_id, MessageRole::User, content)
    }

    /// Creates a new assistant message.
    pub fn assistant(conversation_id: Uuid, content: impl Into<String>) -> Self {
        Self::new(conversation_id, MessageRole::Assistant, content)
    }

    /// Creates a tool result message answering `tool_call_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if `tool_call_id` or `function_name` is empty.
    pub fn tool(
        conversation_id: Uuid,
        content: impl Into<String>,
        tool_call_id: String,
        function_name: String,
    ) -> anyhow::Result<Self> {
        if tool_call_id.is_empty() {
            anyhow::bail!("Tool call ID cannot be empty");
        }
        if function_name.is_empty() {
            anyhow::bail!("Function name cannot be empty for tool messages");
        }
        let mut msg = Self::new(conversation_id, MessageRole::Tool, content);
        msg.tool_call_id = Some(tool_call_id);
        msg.name = Some(function_name);
        Ok(msg)
    }

    /// Adds a metadata key-value pair to this message.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Attaches reasoning text.
    #[must_use]
    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        let reasoning = reasoning.into();
        self.reasoning = (!reasoning.is_empty()).then_some(reasoning);
        self
    }

    /// Sets the tool calls for this message.
    ///
    /// # Errors
    ///
    /// Returns an error if this message is not an assistant message.
    pub fn with_tool_calls(
        mut self,
        tool_calls: impl Into<SmallVec<[ToolCall; 2]>>,
    ) -> anyhow::Result<Self> {
        if self.role != MessageRole::Assistant {
            anyhow::bail!(
                "Tool calls can only be added to assistant messages, found {:?}",
                self.role
            );
        }
        self.tool_calls = tool_calls.into();
        Ok(self)
    }
}

/// An ordered, append-only message history.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Conversation {
    /// Conversation identifier shared by all its messages.
    pub id: Uuid,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Time of the last appended message.
    pub updated_at: DateTime<Utc>,
    /// The messages in order.
    pub messages: Vec<Message>,
}

impl Conversation {
    /// Creates an empty conversation.
    #[must_use]
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            messages: Vec::new(),
        }
    }

    /// Creates a conversation seeded with prior turns.
    ///
    /// Messages are re-homed to this conversation's id.
    #[must_use]
    pub fn with_history(history: impl IntoIterator<Item = Message>) -> Self {
        let mut conversation = Self::new();
        conversation.messages = history
            .into_iter()
            .map(|mut m| {
                m.conversation_id = conversation.id;
                m
            })
            .collect();
        conversation
    }

    /// Appends a message.
    ///
    /// # Errors
    ///
    /// Returns an error if the message belongs to another conversation, or if it is a tool
    /// message answering a call id that no earlier assistant message contains.
    pub fn add_message(&mut self, message: Message) -> anyhow::Result<()> {
        if message.conversation_id != self.id {
            anyhow::bail!(
                "Message conversation_id {} does not match conversation id {}",
                message.conversation_id,
                self.id
            );
        }
        if message.role == MessageRole::Tool {
            let id = message.tool_call_id.as_deref().unwrap_or_default();
            let requested = self
                .messages
                .iter()
                .flat_map(|m| m.tool_calls.iter())
                .any(|call| call.id == id);
            if !requested {
                anyhow::bail!("Tool message answers unknown tool call id '{id}'");
            }
        }
        self.messages.push(message);
        self.updated_at = Utc::now();
        Ok(())
    }

    /// The messages in order.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Number of messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the conversation has no messages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Ids of tool calls that have no tool message yet, in request order.
    #[must_use]
    pub fn unanswered_tool_calls(&self) -> Vec<&str> {
        let answered: HashSet<&str> = self
            .messages
            .iter()
            .filter_map(|m| m.tool_call_id.as_deref())
            .collect();
        self.messages
            .iter()
            .flat_map(|m| m.tool_calls.iter())
            .map(|call| call.id.as_str())
            .filter(|id| !answered.contains(id))
            .collect()
    }

    /// Builds a user message for this conversation.
    pub fn user_message(&self, content: impl Into<String>) -> Message {
        Message::user(self.id, content)
    }

    /// Builds an assistant message for this conversation.
    pub fn assistant_message(&self, content: impl Into<String>) -> Message {
        Message::assistant(self.id, content)
    }

    /// Builds a system message for this conversation.
    pub fn system_message(&self, content: impl Into<String>) -> Message {
        Message::system(self.id, content)
    }

    /// Builds a tool message for this conversation.
    ///
    /// # Errors
    ///
    /// Returns an error if `tool_call_id` or `function_name` is empty.
    pub fn tool_message(
        &self,
        content: impl Into<String>,
        tool_call_id: String,
        function_name: String,
    ) -> anyhow::Result<Message> {
        Message::tool(self.id, content, tool_call_id, function_name)
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;

    #[test]
    fn test_message_creation() {
        let conv_id = Uuid::new_v4();
        let msg = Message::user(conv_id, "Hello, world!");

        assert_eq!(msg.conversation_id, conv_id);
        assert_eq!(msg.role, MessageRole::User);
        assert_eq!(msg.content, "Hello, world!");
        assert!(msg.tool_calls.is_empty());
    }

    #[test]
    fn test_message_tool_call_validation() {
        let conv_id = Uuid::new_v4();
        let tool_call = ToolCall::new("web_search", r#"{"query": "rust"}"#);

        let user_msg = Message::user(conv_id, "Search please");
        assert!(user_msg.with_tool_calls(vec![tool_call.clone()]).is_err());

        let assistant_msg = Message::assistant(conv_id, "");
        let msg = assistant_msg.with_tool_calls(vec![tool_call]).unwrap();
        assert_eq!(msg.tool_calls.len(), 1);
    }

    #[test]
    fn test_tool_message_validation() {
        let conv_id = Uuid::new_v4();

        assert!(Message::tool(conv_id, "Result", String::new(), "date".to_string()).is_err());
        assert!(Message::tool(conv_id, "Result", "call_1".to_string(), String::new()).is_err());

        let msg = Message::tool(conv_id, "Result", "call_1".to_string(), "date".to_string()).unwrap();
        assert_eq!(msg.role, MessageRole::Tool);
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(msg.name.as_deref(), Some("date"));
    }

    #[test]
    fn test_with_reasoning_ignores_empty_text() {
        let conv_id = Uuid::new_v4();
        assert!(Message::assistant(conv_id, "x").with_reasoning("").reasoning.is_none());
        assert_eq!(
            Message::assistant(conv_id, "x").with_reasoning("hmm").reasoning.as_deref(),
            Some("hmm")
        );
    }

    #[test]
    fn test_conversation_add_message_wrong_id() {
        let mut conv = Conversation::new();
        let msg = Message::user(Uuid::new_v4(), "Hello");

        assert!(conv.add_message(msg).is_err());
        assert!(conv.is_empty());
    }

    #[test]
    fn test_conversation_rejects_orphan_tool_message() {
        let mut conv = Conversation::new();
        let orphan = conv
            .tool_message("{}", "call_missing".to_string(), "date".to_string())
            .unwrap();

        let err = conv.add_message(orphan).unwrap_err();
        assert!(err.to_string().contains("call_missing"));
    }

    #[test]
    fn test_unanswered_tool_calls() {
        let mut conv = Conversation::new();
        let calls = vec![
            ToolCall::with_id("call_a", "date", "{}"),
            ToolCall::with_id("call_b", "base64", "{}"),
        ];
        let assistant = conv.assistant_message("").with_tool_calls(calls).unwrap();
        conv.add_message(assistant).unwrap();
        assert_eq!(conv.unanswered_tool_calls(), vec!["call_a", "call_b"]);

        let answer = conv
            .tool_message("{}", "call_a".to_string(), "date".to_string())
            .unwrap();
        conv.add_message(answer).unwrap();
        assert_eq!(conv.unanswered_tool_calls(), vec!["call_b"]);
    }

    #[test]
    fn test_with_history_rehomes_messages() {
        let other = Uuid::new_v4();
        let conv = Conversation::with_history(vec![
            Message::user(other, "earlier question"),
            Message::assistant(other, "earlier answer"),
        ]);

        assert_eq!(conv.len(), 2);
        assert!(conv.messages().iter().all(|m| m.conversation_id == conv.id));
    }

    #[test]
    fn test_message_role_serialization() {
        let role: MessageRole = serde_json::from_str("\"assistant\"").unwrap();
        assert_eq!(role, MessageRole::Assistant);
    }
}
