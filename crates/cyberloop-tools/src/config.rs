//! Settings for the built-in tools.

use std::collections::HashMap;
use std::time::Duration;

use secrecy::SecretString;
use typed_builder::TypedBuilder;

/// Tavily search endpoint used when none is configured.
pub const DEFAULT_TAVILY_ENDPOINT: &str = "https://api.tavily.com/search";

/// Configuration consumed by [`crate::ToolRegistry::builtin`] and
/// [`crate::ToolExecutor::from_config`].
///
/// ```
/// use std::time::Duration;
/// use cyberloop_tools::ToolsConfig;
///
/// let config = ToolsConfig::builder()
///     .tavily_api_key("tvly-key".to_string())
///     .sandbox_url("http://localhost:8080")
///     .build()
///     .with_timeout("fetch", Duration::from_secs(5));
/// assert!(config.sandbox_url.is_some());
/// ```
#[derive(Debug, Clone, TypedBuilder)]
pub struct ToolsConfig {
    /// API key for the Tavily search service. `web_search` reports "not configured" without it.
    #[builder(default, setter(transform = |key: String| Some(SecretString::new(key.into()))))]
    pub tavily_api_key: Option<SecretString>,

    /// Tavily search endpoint.
    #[builder(default = DEFAULT_TAVILY_ENDPOINT.to_string(), setter(into))]
    pub tavily_endpoint: String,

    /// Base URL of the code sandbox service used by `code_runner` and `quickjs`.
    #[builder(default, setter(strip_option, into))]
    pub sandbox_url: Option<String>,

    /// Per-tool time limits replacing the tool's own default.
    #[builder(default)]
    pub timeouts: HashMap<String, Duration>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ToolsConfig {
    /// Overrides the time limit of one tool.
    #[must_use]
    pub fn with_timeout(mut self, tool: impl Into<String>, limit: Duration) -> Self {
        self.timeouts.insert(tool.into(), limit);
        self
    }
}

#[cfg(test)]
mod tests {
    use secrecy::ExposeSecret;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = ToolsConfig::default();
        assert_eq!(config.tavily_endpoint, DEFAULT_TAVILY_ENDPOINT);
        assert!(config.tavily_api_key.is_none());
        assert!(config.sandbox_url.is_none());
        assert!(config.timeouts.is_empty());
    }

    #[test]
    fn test_builder_wraps_key_in_secret() {
        let config = ToolsConfig::builder()
            .tavily_api_key("tvly-123".to_string())
            .build();
        assert_eq!(
            config.tavily_api_key.as_ref().map(ExposeSecret::expose_secret),
            Some("tvly-123")
        );
        assert!(!format!("{config:?}").contains("tvly-123"));
    }
}
