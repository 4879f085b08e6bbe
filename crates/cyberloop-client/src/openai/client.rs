//! OpenAI-compatible client implementation.
//!
//! # Features
//!
//! - **Chat Completions**: blocking and streamed `POST /chat/completions`
//! - **Tool/Function Calling**: tool declarations out, tool calls and tool call fragments back
//! - **Automatic Retries**: optional exponential backoff for the non-streamed path
//! - **Secure API Keys**: Uses the `secrecy` crate to prevent accidental exposure
//!
//! # Examples
//!
//! ```no_run
//! use cyberloop_client::{LLMClient, OpenAIClient};
//! use cyberloop_common::chat::Conversation;
//! use cyberloop_common::client::{ChatRequest, Config};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = Config::default().with_api_key("sk-...");
//! let client = OpenAIClient::new(config)?;
//!
//! let mut conversation = Conversation::new();
//! conversation.add_message(conversation.user_message("Hello!"))?;
//!
//! let request = ChatRequest::new(conversation.messages().to_vec());
//! let response = client.chat(&request).await?;
//! println!("Response: {}", response.message.content);
//! # Ok(())
//! # }
//! ```
//!
//! # Error Handling
//!
//! Non-success statuses are classified by [`ClientError::from_status`]:
//!
//! - **Authentication errors (401/403)**: Invalid or missing API keys
//! - **Rate limiting (429)**: carries the `Retry-After` hint when present
//! - **Overload (529 or an `overloaded` error type)**: candidates for model fallback
//! - **Server errors (5xx)**: service unavailable

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use log::{debug, error, warn};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, RETRY_AFTER};
use reqwest_middleware::ClientWithMiddleware;
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};
use reqwest_retry_after::RetryAfterMiddleware;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;

use cyberloop_common::chat::Message;
use cyberloop_common::client::{ChatChunk, ChatRequest, ChatResponse, Config};
use cyberloop_common::tools::{ToolCall, ToolCallDelta};

use crate::error::ClientError;
use crate::openai::{
    ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse, OpenAIMessage,
    StreamOptions,
};
use crate::sse::decode_stream;
use crate::{ChatStream, LLMClient};

const COMPLETIONS_ENDPOINT: &str = "chat/completions";

/// Client for `OpenAI`-compatible APIs.
///
/// # Security
///
/// The API key is stored using the `secrecy` crate to prevent accidental
/// exposure through debug logs or memory dumps.
#[derive(Clone)]
pub struct OpenAIClient {
    client: ClientWithMiddleware,
    streaming_client: reqwest::Client,
    api_key: Arc<SecretString>,
    base_url: String,
    config: Arc<Config>,
}

// Custom Debug implementation to avoid exposing API key
impl std::fmt::Debug for OpenAIClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAIClient")
            .field("api_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Convert an `OpenAI` streaming chunk to the common `ChatChunk` format.
///
/// Only the first choice is read. Tool call fragments are passed through untouched for the
/// caller's accumulator.
pub fn convert_chunk_to_chat_chunk(chunk: &ChatCompletionChunk) -> ChatChunk {
    let choice = chunk.choices.first();

    let mut chat_chunk = ChatChunk::new(chunk.model.clone());
    chat_chunk.delta_content = choice.and_then(|c| c.delta.content.clone());
    chat_chunk.delta_reasoning_content = choice.and_then(|c| c.delta.reasoning_content.clone());
    chat_chunk.finish_reason = choice
        .and_then(|c| c.finish_reason.as_ref())
        .and_then(|reason| reason.parse().ok());
    chat_chunk.delta_tool_calls = choice
        .and_then(|c| c.delta.tool_calls.as_ref())
        .map(|deltas| deltas.iter().map(ToolCallDelta::from).collect())
        .unwrap_or_default();
    chat_chunk.usage.clone_from(&chunk.usage);
    chat_chunk.response_id = (!chunk.id.is_empty()).then(|| chunk.id.clone());
    chat_chunk.created_at = timestamp(chunk.created);
    chat_chunk
}

fn timestamp(created: u64) -> DateTime<Utc> {
    i64::try_from(created)
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .unwrap_or_else(Utc::now)
}

fn retry_after(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

impl OpenAIClient {
    /// Create a new `OpenAI` client from a configuration.
    ///
    /// Falls back to the default base URL when the configuration has none.
    ///
    /// # Errors
    ///
    /// Returns an error if the API key is missing, the base URL is invalid, the model or
    /// temperature fail [`LLMClient::validate_config`], or HTTP client creation fails.
    pub fn new(config: Config) -> Result<Self, ClientError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| ClientError::ConfigurationError("API key is required".to_string()))?;

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| cyberloop_common::client::DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        url::Url::parse(&base_url).map_err(|e| {
            ClientError::ConfigurationError(format!("Invalid base URL '{base_url}': {e}"))
        })?;

        let retry_policy = ExponentialBackoff::builder()
            .retry_bounds(
                config.retry_config.initial_delay,
                config.retry_config.max_delay,
            )
            .build_with_max_retries(
                u32::try_from(config.retry_config.max_retries).unwrap_or(u32::MAX),
            );

        // None means no timeout (useful for slow hardware/long-running requests)
        let reqwest_client = match config.timeout_seconds {
            Some(timeout) => reqwest::Client::builder()
                .timeout(Duration::from_secs(timeout))
                .build()?,
            None => reqwest::Client::builder().build()?,
        };

        // RetryAfterMiddleware goes first so Retry-After headers are honored before backoff
        let client = reqwest_middleware::ClientBuilder::new(reqwest_client.clone())
            .with(RetryAfterMiddleware::new())
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        let client = Self {
            client,
            streaming_client: reqwest_client,
            api_key: Arc::new(api_key),
            base_url,
            config: Arc::new(config),
        };
        client.validate_config(&client.config)?;
        Ok(client)
    }

    /// Set a custom base URL for the API endpoint.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Arc::make_mut(&mut self.config).base_url = Some(base_url.clone());
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Set the default model for chat completions.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config).model = model.into();
        self
    }

    fn endpoint(&self, endpoint: &str) -> String {
        format!("{}/{endpoint}", self.base_url)
    }

    async fn error_from_response(response: reqwest::Response) -> ClientError {
        let status = response.status().as_u16();
        let hint = retry_after(&response);
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                warn!("Failed to read error response body: {e}");
                return ClientError::NetworkError(e);
            }
        };

        let err = ClientError::from_status(status, &body, hint);
        error!("API request failed with status {status}: {err}");
        err
    }

    async fn make_request<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        let url = self.endpoint(endpoint);

        let response = self
            .client
            .post(&url)
            .header(
                AUTHORIZATION,
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .header(CONTENT_TYPE, "application/json")
            .body(serde_json::to_string(body)?)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let response_text = response.text().await?;
        debug!("Raw API response: {response_text}");
        Ok(serde_json::from_str(&response_text)?)
    }

    /// Convert an `OpenAI` message to the common message format.
    ///
    /// Tool call arguments are passed through as-is; they are parsed when the call is executed.
    fn convert_openai_message_to_message(
        openai_msg: &OpenAIMessage,
        conversation_id: uuid::Uuid,
    ) -> Message {
        let mut message = Message::new(
            conversation_id,
            openai_msg.role,
            openai_msg.content.clone().unwrap_or_default(),
        );
        message.tool_calls = openai_msg
            .tool_calls
            .iter()
            .flatten()
            .map(ToolCall::from)
            .collect();
        message.tool_call_id.clone_from(&openai_msg.tool_call_id);
        message.name.clone_from(&openai_msg.name);
        message.with_reasoning(openai_msg.reasoning_content.clone().unwrap_or_default())
    }
}

#[async_trait]
impl LLMClient for OpenAIClient {
    fn config(&self) -> &Config {
        &self.config
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, ClientError> {
        self.validate_request(request)?;

        let mut openai_request = ChatCompletionRequest::from((request, self.config.as_ref()));
        openai_request.stream = false;
        debug!(
            "Sending chat request to {} with model {}",
            self.base_url, openai_request.model
        );

        let response: ChatCompletionResponse = self
            .make_request(COMPLETIONS_ENDPOINT, &openai_request)
            .await?;

        let choice = response.choices.first().ok_or_else(|| {
            warn!(
                "Received empty choices array from API. Response ID: {}, Model: {}",
                response.id, response.model
            );
            ClientError::InvalidResponse("API returned no choices in response".to_string())
        })?;

        let conversation_id = request
            .messages
            .first()
            .map(|m| m.conversation_id)
            .ok_or_else(|| {
                ClientError::InvalidRequest("Request must contain at least one message".to_string())
            })?;

        let message = Self::convert_openai_message_to_message(&choice.message, conversation_id);
        let finish_reason = choice
            .finish_reason
            .as_ref()
            .and_then(|reason| reason.parse().ok());

        Ok(ChatResponse {
            message,
            model: response.model,
            usage: response.usage,
            finish_reason,
            created_at: timestamp(response.created),
            response_id: (!response.id.is_empty()).then_some(response.id),
        })
    }

    async fn chat_stream(&self, request: &ChatRequest) -> Result<ChatStream, ClientError> {
        self.validate_request(request)?;

        let mut openai_request = ChatCompletionRequest::from((request, self.config.as_ref()));
        openai_request.stream = true;
        openai_request.stream_options = Some(StreamOptions {
            include_usage: true,
        });
        debug!(
            "Opening chat stream to {} with model {}",
            self.base_url, openai_request.model
        );

        // The streaming client bypasses the retry middleware; a half-read stream cannot be replayed
        let response = self
            .streaming_client
            .post(self.endpoint(COMPLETIONS_ENDPOINT))
            .header(
                AUTHORIZATION,
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .header(CONTENT_TYPE, "application/json")
            .json(&openai_request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let stream = decode_stream(response.bytes_stream()).filter_map(|item| async move {
            match item {
                Ok(value) => match serde_json::from_value::<ChatCompletionChunk>(value) {
                    Ok(chunk) => Some(Ok(convert_chunk_to_chat_chunk(&chunk))),
                    Err(e) => {
                        warn!("Skipping stream event that is not a completion chunk: {e}");
                        None
                    }
                },
                Err(e) => {
                    error!("Stream error: {e}");
                    Some(Err(e))
                }
            }
        });

        Ok(Box::pin(stream))
    }
}
