//! # cyberloop-client
//!
//! Client library for OpenAI-compatible chat completion endpoints.
//!
//! This crate provides the [`LLMClient`] trait the conversation driver talks to, an
//! implementation for OpenAI-compatible APIs, and the server-sent event decoder used for
//! streamed responses. Failures are reported as [`ClientError`] and can be classified with
//! [`ClientError::kind`].
//!
//! ## Example
//!
//! ```no_run
//! use cyberloop_client::{LLMClient, OpenAIClient};
//! use cyberloop_common::{ChatRequest, Config, Message};
//! use futures::StreamExt;
//! use uuid::Uuid;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = Config::default().with_api_key("your-api-key");
//! let client = OpenAIClient::new(config)?;
//!
//! let message = Message::user(Uuid::new_v4(), "Hello, world!");
//! let request = ChatRequest::new(vec![message]).with_model(&client.config().model);
//!
//! let mut stream = client.chat_stream(&request).await?;
//! while let Some(chunk) = stream.next().await {
//!     if let Some(text) = chunk?.delta_content {
//!         print!("{text}");
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use cyberloop_common::{ChatChunk, ChatRequest, ChatResponse, Config};

pub mod error;
pub mod openai;
pub mod sse;

pub use error::{ClientError, ErrorKind};
pub use openai::OpenAIClient;
pub use sse::{SseDecoder, SseFrame, decode_stream};

/// A stream of chat completion chunks.
pub type ChatStream = Pin<Box<dyn Stream<Item = Result<ChatChunk, ClientError>> + Send>>;

/// Trait for LLM client implementations.
///
/// Implementations must support async operations and be thread-safe (Send + Sync).
#[must_use = "LLMClient must be used to make requests"]
#[async_trait]
pub trait LLMClient: Send + Sync {
    /// Get the client's configuration.
    fn config(&self) -> &Config;

    /// Send a chat completion request and wait for the whole response.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The request fails validation
    /// - Network communication fails
    /// - The API returns an error (authentication, rate limit, overload, etc.)
    /// - The response cannot be parsed
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, ClientError>;

    /// Send a chat completion request and stream the response.
    ///
    /// The returned stream is finite and ends after the provider's terminal event. Dropping it
    /// releases the connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails validation or the endpoint answers with a
    /// non-success status. Failures while reading the body are yielded by the stream.
    async fn chat_stream(&self, request: &ChatRequest) -> Result<ChatStream, ClientError>;

    /// Check if the client supports tool/function calling.
    fn supports_tools(&self) -> bool {
        true
    }

    /// Check if the client supports streaming responses.
    fn supports_streaming(&self) -> bool {
        true
    }

    /// Validate the configuration this client was built from.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::ConfigurationError`] for a blank model and
    /// [`ClientError::InvalidTemperature`] for a temperature outside 0.0 to 2.0.
    fn validate_config(&self, config: &Config) -> Result<(), ClientError> {
        if config.model.trim().is_empty() {
            return Err(ClientError::ConfigurationError(
                "Model must not be empty".to_string(),
            ));
        }

        if config
            .temperature
            .is_some_and(|t| !(0.0..=2.0).contains(&t))
        {
            return Err(ClientError::InvalidTemperature);
        }

        Ok(())
    }

    /// Validate a chat request before sending.
    ///
    /// Checks that:
    /// - At least one message is provided and sampling parameters are in range
    /// - Tools are not used if the client doesn't support them
    /// - Streaming is not requested if the client doesn't support it
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails.
    fn validate_request(&self, request: &ChatRequest) -> Result<(), ClientError> {
        request
            .validate()
            .map_err(|e| ClientError::InvalidRequest(e.to_string()))?;

        if !self.supports_tools() && request.has_tools() {
            return Err(ClientError::ToolsNotSupported);
        }

        if !self.supports_streaming() && request.is_streaming() {
            return Err(ClientError::StreamingNotSupported);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::collections::BTreeMap;

    use cyberloop_common::chat::Message;
    use cyberloop_common::tools::{Parameters, Property, Tool};
    use uuid::Uuid;

    use super::*;

    // Mock implementation for testing
    struct MockLLMClient {
        config: Config,
        supports_tools: bool,
        supports_streaming: bool,
    }

    impl MockLLMClient {
        fn new() -> Self {
            Self {
                config: Config::new("mock", "mock-model"),
                supports_tools: true,
                supports_streaming: true,
            }
        }

        fn without_tools() -> Self {
            Self {
                supports_tools: false,
                ..Self::new()
            }
        }

        fn without_streaming() -> Self {
            Self {
                supports_streaming: false,
                ..Self::new()
            }
        }
    }

    #[async_trait]
    impl LLMClient for MockLLMClient {
        fn config(&self) -> &Config {
            &self.config
        }

        async fn chat(&self, _request: &ChatRequest) -> Result<ChatResponse, ClientError> {
            Ok(ChatResponse {
                message: create_test_message(),
                model: "mock-model".to_string(),
                usage: None,
                finish_reason: None,
                created_at: chrono::Utc::now(),
                response_id: Some("test-response".to_string()),
            })
        }

        async fn chat_stream(&self, _request: &ChatRequest) -> Result<ChatStream, ClientError> {
            Ok(Box::pin(futures::stream::empty()))
        }

        fn supports_tools(&self) -> bool {
            self.supports_tools
        }

        fn supports_streaming(&self) -> bool {
            self.supports_streaming
        }
    }

    fn create_test_message() -> Message {
        Message::user(Uuid::new_v4(), "Test message")
    }

    fn create_test_tool() -> Tool {
        Tool::function(
            "test_function",
            "A test function",
            Parameters::new(
                BTreeMap::from([("arg".to_string(), Property::string("A test argument"))]),
                ["arg"],
            ),
        )
    }

    #[test]
    fn test_validate_request_empty_messages() {
        let client = MockLLMClient::new();
        let request = ChatRequest::new(Vec::<Message>::new());

        let err = client.validate_request(&request).unwrap_err();
        assert!(matches!(err, ClientError::InvalidRequest(_)));
    }

    #[test]
    fn test_validate_request_valid() {
        let client = MockLLMClient::new();
        let request = ChatRequest::new(vec![create_test_message()]);
        assert!(client.validate_request(&request).is_ok());
    }

    #[test]
    fn test_validate_request_tools_not_supported() {
        let client = MockLLMClient::without_tools();
        let request =
            ChatRequest::new(vec![create_test_message()]).with_tools(vec![create_test_tool()]);

        let err = client.validate_request(&request).unwrap_err();
        assert!(matches!(err, ClientError::ToolsNotSupported));
    }

    #[test]
    fn test_validate_request_streaming_not_supported() {
        let client = MockLLMClient::without_streaming();
        let request = ChatRequest::new(vec![create_test_message()]).with_streaming(true);

        let err = client.validate_request(&request).unwrap_err();
        assert!(matches!(err, ClientError::StreamingNotSupported));
    }

    #[test]
    fn test_validate_request_out_of_range_temperature() {
        let client = MockLLMClient::new();
        let request = ChatRequest::new(vec![create_test_message()]).with_temperature(3.0);
        assert!(client.validate_request(&request).is_err());
    }

    #[test]
    fn test_validate_config() {
        let client = MockLLMClient::new();
        assert!(client.validate_config(&Config::default()).is_ok());
        assert!(matches!(
            client.validate_config(&Config::default().with_temperature(2.5)),
            Err(ClientError::InvalidTemperature)
        ));
        assert!(matches!(
            client.validate_config(&Config::new("mock", " ")),
            Err(ClientError::ConfigurationError(_))
        ));
    }

    #[tokio::test]
    async fn test_chat_method() {
        let client = MockLLMClient::new();
        let request = ChatRequest::new(vec![create_test_message()]);

        let response = client.chat(&request).await.unwrap();
        assert_eq!(response.response_id, Some("test-response".to_string()));
        assert_eq!(response.model, "mock-model");
    }
}
