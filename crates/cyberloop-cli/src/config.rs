//! CLI configuration.
//!
//! Loaded from `~/.config/cyberloop/config.toml` or the file passed with `--config`. Every
//! section is optional; a missing default file means built-in defaults.
//!
//! ## Example Configuration
//!
//! ```toml
//! [provider]
//! name = "moonshot"
//! base_url = "https://api.moonshot.ai/v1"
//! model = "kimi-k2-turbo-preview"
//! api_key_env = "MOONSHOT_API_KEY"
//! temperature = 0.3
//! fallback_model = "kimi-k2-0905-preview"
//!
//! [agent]
//! max_iterations = 10
//! streaming = true
//! system_prompt = "You are a helpful assistant."
//!
//! [tools]
//! tavily_api_key_env = "TAVILY_API_KEY"
//! sandbox_url = "http://localhost:8080"
//!
//! [tools.timeouts]
//! fetch = 10
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::debug;
use serde::{Deserialize, Serialize};

use cyberloop::{Config, DEFAULT_TAVILY_ENDPOINT, ToolsConfig};
use secrecy::SecretString;

use crate::error::{CliError, Result};

/// Top-level CLI configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub provider: ProviderSettings,

    #[serde(default)]
    pub agent: AgentSettings,

    #[serde(default)]
    pub tools: ToolSettings,
}

/// Completion endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// Provider label used in logs (default: "moonshot")
    #[serde(default = "default_provider")]
    pub name: String,

    /// OpenAI-compatible base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default)]
    pub max_tokens: Option<u32>,

    /// Request timeout in seconds
    #[serde(default)]
    pub timeout_seconds: Option<u64>,

    /// Model to switch to once when the primary one is overloaded or unavailable
    #[serde(default)]
    pub fallback_model: Option<String>,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            name: default_provider(),
            base_url: default_base_url(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            temperature: default_temperature(),
            max_tokens: None,
            timeout_seconds: None,
            fallback_model: None,
        }
    }
}

/// Conversation driver settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Completion requests allowed per question (default: 10)
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Stream replies token by token (default: true)
    #[serde(default = "default_streaming")]
    pub streaming: bool,

    #[serde(default)]
    pub system_prompt: Option<String>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            streaming: default_streaming(),
            system_prompt: None,
        }
    }
}

/// Built-in tool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSettings {
    /// Environment variable holding the Tavily API key
    #[serde(default = "default_tavily_api_key_env")]
    pub tavily_api_key_env: String,

    #[serde(default = "default_tavily_endpoint")]
    pub tavily_endpoint: String,

    /// Code sandbox service used by `code_runner` and `quickjs`
    #[serde(default)]
    pub sandbox_url: Option<String>,

    /// Per-tool time limits in seconds
    #[serde(default)]
    pub timeouts: HashMap<String, u64>,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            tavily_api_key_env: default_tavily_api_key_env(),
            tavily_endpoint: default_tavily_endpoint(),
            sandbox_url: None,
            timeouts: HashMap::new(),
        }
    }
}

fn default_provider() -> String {
    "moonshot".to_string()
}

fn default_base_url() -> String {
    "https://api.moonshot.ai/v1".to_string()
}

fn default_model() -> String {
    "kimi-k2-turbo-preview".to_string()
}

fn default_api_key_env() -> String {
    "MOONSHOT_API_KEY".to_string()
}

const fn default_temperature() -> f32 {
    0.3
}

const fn default_max_iterations() -> u32 {
    10
}

const fn default_streaming() -> bool {
    true
}

fn default_tavily_api_key_env() -> String {
    "TAVILY_API_KEY".to_string()
}

fn default_tavily_endpoint() -> String {
    DEFAULT_TAVILY_ENDPOINT.to_string()
}

/// Reads a non-empty environment variable.
fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.trim().is_empty())
}

impl AppConfig {
    /// Loads configuration from `path`, or from the default location when `path` is `None`.
    ///
    /// An explicit path must exist. A missing default file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - An explicit config file doesn't exist or can't be read
    /// - Deserialization fails
    /// - Validation fails
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => {
                if !path.exists() {
                    return Err(CliError::Config(format!(
                        "Configuration file not found: {}",
                        path.display()
                    )));
                }
                path.to_path_buf()
            }
            None => match Self::config_path() {
                Some(path) if path.exists() => path,
                _ => {
                    debug!("No config file found, using defaults");
                    return Ok(Self::default());
                }
            },
        };

        debug!("Loading config from {}", path.display());
        let contents = fs::read_to_string(&path)?;
        Self::from_toml(&contents)
    }

    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization or validation fails.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Returns the default configuration file path.
    #[must_use]
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("cyberloop").join("config.toml"))
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The model or base URL is empty
    /// - The temperature is outside 0.0..=2.0
    /// - `max_iterations` is zero
    /// - The fallback model equals the primary model
    pub fn validate(&self) -> Result<()> {
        let provider = &self.provider;
        if provider.model.trim().is_empty() {
            return Err(CliError::Config("Model must not be empty".to_string()));
        }
        if provider.base_url.trim().is_empty() {
            return Err(CliError::Config("Base URL must not be empty".to_string()));
        }
        if !(0.0..=2.0).contains(&provider.temperature) {
            return Err(CliError::Config(format!(
                "Temperature must be between 0.0 and 2.0, got {}",
                provider.temperature
            )));
        }
        if self.agent.max_iterations == 0 {
            return Err(CliError::Config(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        if provider.fallback_model.as_deref() == Some(provider.model.as_str()) {
            return Err(CliError::Config(format!(
                "Fallback model '{}' is the same as the primary model",
                provider.model
            )));
        }
        Ok(())
    }

    /// Builds the completion client configuration, reading the API key from the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the API key variable is unset or empty.
    pub fn client_config(&self) -> Result<Config> {
        let provider = &self.provider;
        let api_key = env_value(&provider.api_key_env)
            .ok_or_else(|| CliError::MissingApiKey(provider.api_key_env.clone()))?;

        let mut config = Config::new(provider.name.as_str(), provider.model.as_str())
            .with_base_url(provider.base_url.as_str())
            .with_api_key(api_key)
            .with_temperature(provider.temperature);
        if let Some(max_tokens) = provider.max_tokens {
            config = config.with_max_tokens(max_tokens);
        }
        config.timeout_seconds = provider.timeout_seconds;
        Ok(config)
    }

    /// Builds the tool configuration. A missing Tavily key leaves `web_search` unconfigured.
    #[must_use]
    pub fn tools_config(&self) -> ToolsConfig {
        let tools = &self.tools;
        let mut config = ToolsConfig::builder()
            .tavily_endpoint(tools.tavily_endpoint.as_str())
            .build();
        config.tavily_api_key = env_value(&tools.tavily_api_key_env)
            .map(|key| SecretString::new(key.into()));
        config.sandbox_url.clone_from(&tools.sandbox_url);
        for (tool, secs) in &tools.timeouts {
            config = config.with_timeout(tool.as_str(), Duration::from_secs(*secs));
        }
        config
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_toml("").unwrap();

        assert_eq!(config.provider.base_url, "https://api.moonshot.ai/v1");
        assert_eq!(config.provider.model, "kimi-k2-turbo-preview");
        assert_eq!(config.provider.api_key_env, "MOONSHOT_API_KEY");
        assert!((config.provider.temperature - 0.3).abs() < f32::EPSILON);
        assert_eq!(config.agent.max_iterations, 10);
        assert!(config.agent.streaming);
        assert_eq!(config.tools.tavily_endpoint, DEFAULT_TAVILY_ENDPOINT);
        assert!(config.tools.sandbox_url.is_none());
    }

    #[test]
    fn test_parse_config() {
        let config = AppConfig::from_toml(
            r#"
[provider]
model = "kimi-k2-0905-preview"
fallback_model = "kimi-k2-turbo-preview"
max_tokens = 2048

[agent]
max_iterations = 4
streaming = false
system_prompt = "Be brief."

[tools]
sandbox_url = "http://localhost:8080"

[tools.timeouts]
fetch = 3
            "#,
        )
        .unwrap();

        assert_eq!(config.provider.model, "kimi-k2-0905-preview");
        assert_eq!(config.provider.name, "moonshot");
        assert_eq!(config.provider.max_tokens, Some(2048));
        assert_eq!(config.agent.max_iterations, 4);
        assert!(!config.agent.streaming);
        assert_eq!(config.agent.system_prompt.as_deref(), Some("Be brief."));

        let tools = config.tools_config();
        assert_eq!(tools.sandbox_url.as_deref(), Some("http://localhost:8080"));
        assert_eq!(tools.timeouts.get("fetch"), Some(&Duration::from_secs(3)));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let err = AppConfig::from_toml("[provider]\ntemperature = 3.5").unwrap_err();
        assert!(err.to_string().contains("Temperature"));

        let err = AppConfig::from_toml("[agent]\nmax_iterations = 0").unwrap_err();
        assert!(err.to_string().contains("max_iterations"));

        let err = AppConfig::from_toml("[provider]\nmodel = \"m\"\nfallback_model = \"m\"")
            .unwrap_err();
        assert!(err.to_string().contains("same as the primary"));
    }

    #[test]
    fn test_unknown_field_type_is_toml_error() {
        let err = AppConfig::from_toml("[agent]\nmax_iterations = \"ten\"").unwrap_err();
        assert!(matches!(err, CliError::Toml(_)));
    }

    #[test]
    fn test_missing_api_key() {
        let mut config = AppConfig::default();
        config.provider.api_key_env = "CYBERLOOP_TEST_UNSET_KEY_VAR".to_string();

        let err = config.client_config().unwrap_err();
        assert!(matches!(err, CliError::MissingApiKey(_)));
        assert!(err.to_string().contains("CYBERLOOP_TEST_UNSET_KEY_VAR"));
    }

    #[test]
    fn test_explicit_missing_file() {
        let err = AppConfig::load(Some(Path::new("/nonexistent/cyberloop.toml"))).unwrap_err();
        assert!(err.to_string().contains("Configuration file not found"));
    }
}
