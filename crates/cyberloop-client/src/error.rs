//! Error types for the client library.

use std::fmt;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Error response from the API.
///
/// Wraps the detailed error information returned by LLM providers.
#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    /// The error detail object from the API.
    pub error: ErrorDetail,
}

/// Detailed error information from the API.
#[derive(Debug, Deserialize)]
pub struct ErrorDetail {
    /// The error message text describing what went wrong.
    pub message: String,
    /// Provider error type, e.g. `engine_overloaded_error`.
    #[serde(rename = "type", default)]
    pub r#type: Option<String>,
    /// Provider error code, when present.
    #[serde(default)]
    pub code: Option<serde_json::Value>,
}

impl ErrorDetail {
    /// Whether the provider reported an overloaded engine.
    #[must_use]
    pub fn is_overloaded(&self) -> bool {
        self.r#type
            .as_deref()
            .is_some_and(|t| t.to_ascii_lowercase().contains("overloaded"))
    }
}

/// Coarse classification of a [`ClientError`].
///
/// Callers branch on this instead of matching message text, e.g. to decide whether to switch to
/// a fallback model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Missing, invalid or revoked credentials.
    Authentication,
    /// Request rate exceeded.
    RateLimited,
    /// The provider's engine is overloaded.
    Overloaded,
    /// The provider returned a 5xx response.
    ServiceUnavailable,
    /// The request was rejected as malformed.
    InvalidRequest,
    /// Connection or transport failure.
    Network,
    /// The request timed out.
    Timeout,
    /// The response body could not be decoded.
    Decode,
    /// Client-side configuration is invalid.
    Configuration,
    /// Anything else.
    Other,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Authentication => "authentication",
            Self::RateLimited => "rate_limited",
            Self::Overloaded => "overloaded",
            Self::ServiceUnavailable => "service_unavailable",
            Self::InvalidRequest => "invalid_request",
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::Decode => "decode",
            Self::Configuration => "configuration",
            Self::Other => "other",
        };
        f.write_str(name)
    }
}

/// Errors that can occur when interacting with LLM APIs.
///
/// This enum covers all error conditions from network failures to API-specific
/// errors like rate limiting and engine overload.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ClientError {
    /// Network or HTTP request failure.
    ///
    /// Indicates issues like DNS resolution, connection failures, or socket errors.
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// Middleware layer error.
    ///
    /// Errors from request/response middleware such as retry logic.
    #[error("Middleware error: {0}")]
    MiddlewareError(#[from] reqwest_middleware::Error),

    /// JSON serialization or deserialization error.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// API authentication failure (HTTP 401).
    ///
    /// The API key is missing, invalid, or revoked. Check your credentials.
    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    /// Rate limit exceeded (HTTP 429).
    ///
    /// Too many requests sent in a given time period. Wait and retry.
    #[error("Rate limit exceeded: {retry_after:?}")]
    RateLimitError {
        /// Suggested wait time before retrying, if provided by the API.
        retry_after: Option<Duration>,
    },

    /// The provider's engine is overloaded (HTTP 529 or an `overloaded` error type).
    #[error("Engine overloaded: {0}")]
    Overloaded(String),

    /// Client configuration issue.
    ///
    /// Invalid base URL, missing API key, or incompatible settings.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Request timeout.
    #[error("Timeout error")]
    TimeoutError,

    /// Malformed request.
    ///
    /// The request structure is invalid or missing required parameters.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Unexpected or malformed API response.
    ///
    /// The API returned data that doesn't match the expected format.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Tools requested but not supported by this client.
    #[error("Tool execution not supported")]
    ToolsNotSupported,

    /// Streaming requested but not supported.
    #[error("Streaming not supported")]
    StreamingNotSupported,

    /// API service unavailable (5xx errors).
    ///
    /// The provider's servers are experiencing issues.
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Any other non-success status.
    #[error("API error (HTTP {status}): {message}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Provider message or raw body.
        message: String,
    },

    /// Temperature parameter out of valid range.
    #[error("Temperature must be between 0.0 & 2.0")]
    InvalidTemperature,
}

impl ClientError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NetworkError(e) => classify_reqwest(e),
            Self::MiddlewareError(reqwest_middleware::Error::Reqwest(e)) => classify_reqwest(e),
            Self::MiddlewareError(_) => ErrorKind::Network,
            Self::SerializationError(_) | Self::InvalidResponse(_) => ErrorKind::Decode,
            Self::AuthenticationError(_) => ErrorKind::Authentication,
            Self::RateLimitError { .. } => ErrorKind::RateLimited,
            Self::Overloaded(_) => ErrorKind::Overloaded,
            Self::ServiceUnavailable(_) => ErrorKind::ServiceUnavailable,
            Self::TimeoutError => ErrorKind::Timeout,
            Self::InvalidRequest(_)
            | Self::ToolsNotSupported
            | Self::StreamingNotSupported
            | Self::InvalidTemperature => ErrorKind::InvalidRequest,
            Self::ConfigurationError(_) => ErrorKind::Configuration,
            Self::ApiError { .. } => ErrorKind::Other,
        }
    }

    /// Check if this error is potentially retryable.
    ///
    /// Returns `true` for network errors, timeouts, rate limits, overload and service unavailable errors.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Network
                | ErrorKind::Timeout
                | ErrorKind::RateLimited
                | ErrorKind::Overloaded
                | ErrorKind::ServiceUnavailable
        )
    }

    /// Check if this is an authentication error.
    pub const fn is_authentication_error(&self) -> bool {
        matches!(self, Self::AuthenticationError(_))
    }

    /// Check if this is a rate limit error.
    pub const fn is_rate_limit_error(&self) -> bool {
        matches!(self, Self::RateLimitError { .. })
    }

    /// Get the retry-after duration if this is a rate limit error.
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimitError { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Build an error from a non-success HTTP status and its body.
    ///
    /// `retry_after` is the parsed `Retry-After` header, used for 429 responses.
    pub fn from_status(status: u16, body: &str, retry_after: Option<Duration>) -> Self {
        let detail = serde_json::from_str::<ErrorResponse>(body).ok().map(|r| r.error);
        let overloaded = detail.as_ref().is_some_and(ErrorDetail::is_overloaded);
        let message = detail.map_or_else(|| body.to_string(), |d| d.message);

        match status {
            529 => Self::Overloaded(message),
            _ if overloaded => Self::Overloaded(message),
            401 | 403 => Self::AuthenticationError(message),
            429 => Self::RateLimitError { retry_after },
            400 | 404 | 413 | 422 => Self::InvalidRequest(message),
            408 | 504 => Self::TimeoutError,
            500..=599 => Self::ServiceUnavailable(message),
            _ => Self::ApiError { status, message },
        }
    }
}

fn classify_reqwest(error: &reqwest::Error) -> ErrorKind {
    if error.is_timeout() {
        ErrorKind::Timeout
    } else if error.is_decode() {
        ErrorKind::Decode
    } else if error.is_builder() {
        ErrorKind::Configuration
    } else {
        ErrorKind::Network
    }
}
