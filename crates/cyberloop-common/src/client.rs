use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::chat::Message;
use crate::tools::{Tool, ToolCallDelta};

/// Default OpenAI-compatible endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.moonshot.ai/v1";

/// Default model identifier.
pub const DEFAULT_MODEL: &str = "kimi-k2-turbo-preview";

/// Default sampling temperature.
pub const DEFAULT_TEMPERATURE: f32 = 0.3;

/// The `tool_choice` sent alongside the tool declarations.
///
/// ```
/// use cyberloop_common::ToolChoice;
///
/// let wire = serde_json::Value::from(ToolChoice::Function { name: "date".to_string() });
/// assert_eq!(wire["function"]["name"], "date");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum ToolChoice {
    /// The model decides.
    Auto,
    /// No tool calls this turn.
    None,
    /// At least one tool call.
    Required,
    /// Exactly the named function.
    Function {
        /// Function name as declared.
        name: String,
    },
}

impl From<ToolChoice> for serde_json::Value {
    fn from(tool_choice: ToolChoice) -> Self {
        match tool_choice {
            ToolChoice::Auto => Self::from("auto"),
            ToolChoice::None => Self::from("none"),
            ToolChoice::Required => Self::from("required"),
            ToolChoice::Function { name } => serde_json::json!({
                "type": "function",
                "function": { "name": name }
            }),
        }
    }
}

/// Why a turn ended, as reported in `finish_reason`.
///
/// Only [`FinishReason::ToolCalls`] makes the driver run the calls carried by the turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum FinishReason {
    /// Natural end of the answer.
    Stop,
    /// Cut off at `max_tokens`.
    Length,
    /// The model is waiting for tool results.
    ToolCalls,
    /// Blocked by the provider's content filter.
    ContentFilter,
    /// The provider reported a model failure.
    ModelError,
}

impl FromStr for FinishReason {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stop" => Ok(Self::Stop),
            "length" => Ok(Self::Length),
            "tool_calls" => Ok(Self::ToolCalls),
            "content_filter" => Ok(Self::ContentFilter),
            "model_error" => Ok(Self::ModelError),
            _ => anyhow::bail!("Unknown finish reason: {s}"),
        }
    }
}

/// Backoff policy for non-streamed requests.
///
/// `max_retries` is zero by default so a failing turn reaches the driver at once and model
/// fallback can take over. Streamed requests are never retried.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Attempts after the first one.
    pub max_retries: usize,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Growth factor between delays.
    pub backoff_multiplier: f64,
    /// Randomize delays.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Token counts for one request.
///
/// Accepts both the `prompt_tokens`/`completion_tokens` spelling and the
/// `input_tokens`/`output_tokens` one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Tokens in the prompt.
    #[serde(alias = "input_tokens")]
    pub prompt_tokens: u32,
    /// Tokens in the completion.
    #[serde(alias = "output_tokens")]
    pub completion_tokens: u32,
    /// Prompt plus completion, as reported.
    #[serde(default)]
    pub total_tokens: u32,
    /// Completion breakdown, present for thinking models.
    #[serde(
        default,
        alias = "completion_tokens_details",
        skip_serializing_if = "Option::is_none"
    )]
    pub output_tokens_details: Option<OutputTokensDetails>,
}

impl Usage {
    /// Reasoning tokens reported for this request, zero when the provider omits them.
    #[must_use]
    pub fn reasoning_tokens(&self) -> u32 {
        self.output_tokens_details
            .as_ref()
            .map_or(0, |details| details.reasoning_tokens)
    }
}

/// Breakdown of completion tokens.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputTokensDetails {
    /// Tokens spent on reasoning that is not part of the answer.
    #[serde(default)]
    pub reasoning_tokens: u32,
}

/// One chat completion request.
///
/// Built per turn by the driver from the client [`Config`], then overridden where the turn
/// needs it (fallback model, tools, streaming).
///
/// ```
/// use cyberloop_common::{ChatRequest, Message};
/// use uuid::Uuid;
///
/// let request = ChatRequest::new(vec![Message::user(Uuid::new_v4(), "Hello!")])
///     .with_model("kimi-k2-turbo-preview")
///     .with_streaming(true);
/// assert!(request.is_streaming());
/// assert!(!request.has_tools());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Conversation so far.
    pub messages: Arc<[Message]>,
    /// Model override; the client's configured model is used when unset.
    pub model: Option<String>,
    /// Sampling temperature, 0.0 to 2.0.
    pub temperature: Option<f32>,
    /// Completion token limit.
    pub max_tokens: Option<u32>,
    /// Tool declarations, shared with the registry that produced them.
    pub tools: Option<Arc<[Tool]>>,
    /// Tool selection strategy.
    pub tool_choice: Option<ToolChoice>,
    /// Stream the reply as server-sent events.
    pub stream: bool,
}

impl ChatRequest {
    /// A request carrying only `messages`.
    pub fn new(messages: impl Into<Arc<[Message]>>) -> Self {
        Self {
            messages: messages.into(),
            model: None,
            temperature: None,
            max_tokens: None,
            tools: None,
            tool_choice: None,
            stream: false,
        }
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    #[must_use]
    pub const fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    #[must_use]
    pub fn with_tools(mut self, tools: impl Into<Arc<[Tool]>>) -> Self {
        self.tools = Some(tools.into());
        self
    }

    #[must_use]
    pub fn with_tool_choice(mut self, tool_choice: ToolChoice) -> Self {
        self.tool_choice = Some(tool_choice);
        self
    }

    #[must_use]
    pub const fn with_streaming(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    /// Checks that there is something to send and the temperature is in range.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty message list or a temperature outside 0.0 to 2.0.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.messages.is_empty() {
            anyhow::bail!("Chat request must have at least one message");
        }
        if let Some(temperature) = self.temperature
            && !(0.0..=2.0).contains(&temperature)
        {
            anyhow::bail!("Temperature must be between 0.0 and 2.0, got {temperature}");
        }
        Ok(())
    }

    /// True when at least one tool is declared.
    #[must_use]
    pub fn has_tools(&self) -> bool {
        self.tools.as_ref().is_some_and(|tools| !tools.is_empty())
    }

    #[must_use]
    pub const fn is_streaming(&self) -> bool {
        self.stream
    }
}

/// Seeds a request with the configured model and sampling defaults.
impl From<(&Config, Arc<[Message]>)> for ChatRequest {
    fn from((config, messages): (&Config, Arc<[Message]>)) -> Self {
        Self {
            model: Some(config.model.clone()),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            ..Self::new(messages)
        }
    }
}

/// A complete, non-streamed reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    /// The assistant message, tool calls included.
    pub message: Message,
    /// Model that answered.
    pub model: String,
    pub usage: Option<Usage>,
    pub finish_reason: Option<FinishReason>,
    pub created_at: DateTime<Utc>,
    /// Provider's completion id.
    pub response_id: Option<String>,
}

/// One decoded streaming event.
///
/// Content and reasoning deltas are appended in arrival order; tool call fragments are folded
/// with a [`ToolCallAccumulator`](crate::tools::ToolCallAccumulator).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatChunk {
    pub model: String,
    /// Answer text added by this event.
    pub delta_content: Option<String>,
    /// Reasoning text added by this event.
    pub delta_reasoning_content: Option<String>,
    /// Tool call fragments, keyed by index.
    pub delta_tool_calls: Vec<ToolCallDelta>,
    /// Set on the event that ends the turn.
    pub finish_reason: Option<FinishReason>,
    /// Set on the usage event, usually the last one.
    pub usage: Option<Usage>,
    pub response_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ChatChunk {
    /// Creates an empty chunk for `model`.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            delta_content: None,
            delta_reasoning_content: None,
            delta_tool_calls: Vec::new(),
            finish_reason: None,
            usage: None,
            response_id: None,
            created_at: Utc::now(),
        }
    }
}

/// Connection settings and sampling defaults for one client.
///
/// The API key is a [`SecretString`] and is never serialized.
///
/// ```
/// use cyberloop_common::Config;
///
/// let config = Config::new("moonshot", "kimi-k2-turbo-preview")
///     .with_base_url("https://api.moonshot.ai/v1")
///     .with_api_key("sk-...")
///     .with_max_tokens(2048);
/// assert_eq!(config.temperature, Some(0.3));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Provider label, used in logs.
    pub provider: String,
    /// Model used unless a request overrides it.
    pub model: String,
    /// Endpoint root; [`DEFAULT_BASE_URL`] when unset.
    pub base_url: Option<String>,
    #[serde(skip_serializing, default)]
    pub api_key: Option<SecretString>,
    /// Whole-request timeout for non-streamed calls.
    pub timeout_seconds: Option<u64>,
    #[serde(skip)]
    pub retry_config: RetryConfig,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: "moonshot".to_string(),
            model: DEFAULT_MODEL.to_string(),
            base_url: Some(DEFAULT_BASE_URL.to_string()),
            api_key: None,
            timeout_seconds: None,
            retry_config: RetryConfig::default(),
            temperature: Some(DEFAULT_TEMPERATURE),
            max_tokens: None,
        }
    }
}

impl Config {
    /// Defaults for everything except `provider` and `model`.
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(SecretString::new(api_key.into().into()));
        self
    }

    #[must_use]
    pub const fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    #[must_use]
    pub const fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}
