//! # cyberloop-tools
//!
//! Tools the model can call during a cyberloop conversation.
//!
//! ## Core Components
//!
//! - [`ToolImplementation`]: trait for a tool's declaration, execution logic and time limit
//! - [`ToolRegistry`]: fixed, ordered set of tools whose declarations are sent to the model
//! - [`ToolExecutor`]: runs a tool call under a timeout and serializes the outcome
//!
//! ## Built-in Tools
//!
//! Registered by [`ToolRegistry::builtin`] in this order:
//!
//! - [`WebSearchTool`]: Tavily web search
//! - [`CodeRunnerTool`] / [`QuickJsTool`]: Python and JavaScript through a [`SandboxClient`]
//! - [`FetchTool`]: GET an http(s) URL
//! - [`ConvertTool`]: temperature, distance and weight conversion
//! - [`DateTool`]: current time, formatting and date arithmetic
//! - [`Base64Tool`]: encode and decode text
//! - [`MemoryTool`]: key/value notes backed by a shared [`MemoryStore`]
//! - [`RandomChoiceTool`]: pick items from a list
//!
//! ## Example: a custom tool
//!
//! ```rust
//! use std::collections::BTreeMap;
//!
//! use async_trait::async_trait;
//! use cyberloop_common::tools::{Parameters, Property, Tool};
//! use cyberloop_tools::{ToolError, ToolExecutor, ToolImplementation, ToolRegistry};
//! use serde_json::{Value, json};
//!
//! struct GreetingTool;
//!
//! #[async_trait]
//! impl ToolImplementation for GreetingTool {
//!     fn get_definition(&self) -> Tool {
//!         Tool::function(
//!             "greet",
//!             "Greet a person by name",
//!             Parameters::new(
//!                 BTreeMap::from([("name".to_string(), Property::string("The person's name"))]),
//!                 ["name"],
//!             ),
//!         )
//!     }
//!
//!     async fn execute(&self, args: &Value) -> Result<Value, ToolError> {
//!         let name = args["name"].as_str().unwrap_or("stranger");
//!         Ok(json!({ "greeting": format!("Hello, {name}!") }))
//!     }
//! }
//!
//! # async fn example() {
//! let registry = ToolRegistry::builder().register(GreetingTool).build();
//! let executor = ToolExecutor::new(registry);
//!
//! let output = executor.execute("greet", &json!({"name": "Case"})).await;
//! assert_eq!(output.content, r#"{"greeting":"Hello, Case!"}"#);
//! # }
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use serde_json::Value;

use cyberloop_common::tools::{FunctionCall, Tool, ToolCall, ToolStatus};

mod args;
mod base64_tool;
pub mod config;
mod convert;
mod date;
pub mod error;
mod fetch;
mod memory;
mod random_choice;
pub mod sandbox;
mod web_search;

pub use base64_tool::Base64Tool;
pub use config::{DEFAULT_TAVILY_ENDPOINT, ToolsConfig};
pub use convert::ConvertTool;
pub use date::DateTool;
pub use error::ToolError;
pub use fetch::FetchTool;
pub use memory::{MemoryStore, MemoryTool};
pub use random_choice::RandomChoiceTool;
pub use sandbox::{CodeRunnerTool, QuickJsTool, SandboxClient, SandboxOutput};
pub use web_search::WebSearchTool;

/// Time limit for tools that call a remote HTTP service.
pub const NETWORK_TIMEOUT: Duration = Duration::from_secs(15);
/// Time limit for tools that run code in the sandbox.
pub const SANDBOX_TIMEOUT: Duration = Duration::from_secs(30);
/// Time limit for tools that only do local work.
pub const LOCAL_TIMEOUT: Duration = Duration::from_secs(5);

#[async_trait]
pub trait ToolImplementation: Send + Sync {
    /// Declaration sent to the model. Must be the same on every call.
    fn get_definition(&self) -> Tool;

    /// Runs the tool with already-parsed arguments.
    async fn execute(&self, args: &Value) -> Result<Value, ToolError>;

    /// Upper bound on one execution.
    fn timeout(&self) -> Duration {
        LOCAL_TIMEOUT
    }
}

/// Fixed, ordered set of tools.
///
/// Built once and shared; cloning is cheap. [`ToolRegistry::definitions`] returns the same
/// allocation on every call so each completion request in a conversation carries identical
/// declarations.
#[derive(Clone)]
pub struct ToolRegistry {
    tools: Arc<[Arc<dyn ToolImplementation>]>,
    definitions: Arc<[Tool]>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tool_names())
            .finish()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Collects tools for a [`ToolRegistry`].
#[derive(Default)]
pub struct ToolRegistryBuilder {
    tools: Vec<Arc<dyn ToolImplementation>>,
}

impl ToolRegistryBuilder {
    /// Adds a tool. A tool with the same name as an earlier one replaces it in place.
    #[must_use]
    pub fn register<T: ToolImplementation + 'static>(self, tool: T) -> Self {
        self.register_arc(Arc::new(tool))
    }

    /// Adds a shared tool.
    #[must_use]
    pub fn register_arc(mut self, tool: Arc<dyn ToolImplementation>) -> Self {
        let name = tool.get_definition().function.name;
        if let Some(slot) = self
            .tools
            .iter_mut()
            .find(|t| t.get_definition().function.name == name)
        {
            warn!("Tool '{name}' registered twice, keeping the later one");
            *slot = tool;
        } else {
            self.tools.push(tool);
        }
        self
    }

    #[must_use]
    pub fn build(self) -> ToolRegistry {
        let definitions: Arc<[Tool]> = self.tools.iter().map(|t| t.get_definition()).collect();
        ToolRegistry {
            tools: self.tools.into(),
            definitions,
        }
    }
}

impl ToolRegistry {
    #[must_use]
    pub fn builder() -> ToolRegistryBuilder {
        ToolRegistryBuilder::default()
    }

    /// Registry holding the nine built-in tools.
    ///
    /// # Errors
    ///
    /// Returns an error if the shared HTTP client cannot be constructed.
    pub fn builtin(config: &ToolsConfig) -> Result<Self, ToolError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("cyberloop/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let sandbox = config
            .sandbox_url
            .as_deref()
            .map(|url| SandboxClient::new(http.clone(), url));

        Ok(Self::builder()
            .register(WebSearchTool::new(
                http.clone(),
                config.tavily_api_key.clone(),
                config.tavily_endpoint.clone(),
            ))
            .register(CodeRunnerTool::new(sandbox.clone()))
            .register(QuickJsTool::new(sandbox))
            .register(FetchTool::new(http))
            .register(ConvertTool)
            .register(DateTool)
            .register(Base64Tool)
            .register(MemoryTool::new(Arc::new(MemoryStore::new())))
            .register(RandomChoiceTool)
            .build())
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolImplementation>> {
        self.definitions
            .iter()
            .position(|d| d.function.name == name)
            .map(|i| Arc::clone(&self.tools[i]))
    }

    /// Declarations in registration order.
    #[must_use]
    pub fn definitions(&self) -> Arc<[Tool]> {
        Arc::clone(&self.definitions)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.definitions.iter().any(|d| d.function.name == name)
    }

    #[must_use]
    pub fn tool_names(&self) -> Vec<String> {
        self.definitions
            .iter()
            .map(|d| d.function.name.clone())
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Outcome of one tool execution, ready to be placed in a tool message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    /// [`ToolStatus::Success`] or [`ToolStatus::Error`].
    pub status: ToolStatus,
    /// Serialized JSON result or error object.
    pub content: String,
}

impl ToolOutput {
    fn success(value: &Value) -> Self {
        Self {
            status: ToolStatus::Success,
            content: value.to_string(),
        }
    }

    fn failure(error: &ToolError) -> Self {
        Self {
            status: ToolStatus::Error,
            content: error.to_payload().to_string(),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == ToolStatus::Success
    }
}

/// Runs tools from a [`ToolRegistry`].
///
/// Every failure mode a tool can hit is reported as an error [`ToolOutput`], never as a Rust
/// error, so the conversation can carry on and let the model react.
#[derive(Debug, Clone, Default)]
pub struct ToolExecutor {
    registry: ToolRegistry,
    timeouts: HashMap<String, Duration>,
}

impl ToolExecutor {
    #[must_use]
    pub fn new(registry: ToolRegistry) -> Self {
        Self {
            registry,
            timeouts: HashMap::new(),
        }
    }

    /// Executor over the built-in tools with the configured time limits.
    ///
    /// # Errors
    ///
    /// Returns an error if the built-in registry cannot be constructed.
    pub fn from_config(config: &ToolsConfig) -> Result<Self, ToolError> {
        Ok(Self {
            registry: ToolRegistry::builtin(config)?,
            timeouts: config.timeouts.clone(),
        })
    }

    /// Overrides the time limit of one tool.
    #[must_use]
    pub fn with_timeout(mut self, tool: impl Into<String>, limit: Duration) -> Self {
        self.timeouts.insert(tool.into(), limit);
        self
    }

    #[must_use]
    pub const fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Declarations to send with every completion request.
    #[must_use]
    pub fn definitions(&self) -> Arc<[Tool]> {
        self.registry.definitions()
    }

    /// Effective time limit for `name`, if such a tool exists.
    #[must_use]
    pub fn timeout_for(&self, name: &str) -> Option<Duration> {
        let tool = self.registry.get(name)?;
        Some(self.timeouts.get(name).copied().unwrap_or_else(|| tool.timeout()))
    }

    /// Runs `name` with parsed arguments.
    pub async fn execute(&self, name: &str, args: &Value) -> ToolOutput {
        let Some(tool) = self.registry.get(name) else {
            let err = ToolError::UnknownTool {
                name: name.to_string(),
                available: self.registry.tool_names(),
            };
            warn!("{err}");
            return ToolOutput::failure(&err);
        };
        let limit = self
            .timeouts
            .get(name)
            .copied()
            .unwrap_or_else(|| tool.timeout());

        debug!("Executing tool '{name}' with arguments {args}");
        match tokio::time::timeout(limit, tool.execute(args)).await {
            Ok(Ok(value)) => {
                debug!("Tool '{name}' returned {value}");
                ToolOutput::success(&value)
            }
            Ok(Err(err)) => {
                warn!("Tool '{name}' failed: {err}");
                ToolOutput::failure(&err)
            }
            Err(_) => {
                let err = ToolError::Timeout {
                    name: name.to_string(),
                    limit,
                };
                warn!("{err}");
                ToolOutput::failure(&err)
            }
        }
    }

    /// Parses the call's argument text and runs it.
    pub async fn execute_tool_call(&self, tool_call: &ToolCall) -> ToolOutput {
        match Self::parse_arguments(&tool_call.function) {
            Ok(args) => self.execute(&tool_call.function.name, &args).await,
            Err(err) => {
                warn!("{err}");
                ToolOutput::failure(&err)
            }
        }
    }

    /// Parses a call's argument text. Empty text is an empty object.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::InvalidArguments`] if the text is not valid JSON.
    pub fn parse_arguments(function: &FunctionCall) -> Result<Value, ToolError> {
        serde_json::from_str(function.arguments_json()).map_err(|source| {
            ToolError::InvalidArguments {
                name: function.name.clone(),
                source,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use std::collections::BTreeMap;

    use cyberloop_common::tools::{Parameters, Property};
    use serde_json::json;

    use super::*;

    struct EchoTool;

    #[async_trait]
    impl ToolImplementation for EchoTool {
        fn get_definition(&self) -> Tool {
            Tool::function(
                "echo",
                "Echo the input",
                Parameters::new(
                    BTreeMap::from([("text".to_string(), Property::string("Text to echo"))]),
                    ["text"],
                ),
            )
        }

        async fn execute(&self, args: &Value) -> Result<Value, ToolError> {
            let text = args
                .get("text")
                .and_then(Value::as_str)
                .ok_or_else(|| ToolError::parameter("text"))?;
            Ok(json!({ "echo": text }))
        }
    }

    struct SlowTool;

    #[async_trait]
    impl ToolImplementation for SlowTool {
        fn get_definition(&self) -> Tool {
            Tool::function(
                "slow",
                "Never finishes in time",
                Parameters::new(BTreeMap::new(), Vec::<String>::new()),
            )
        }

        async fn execute(&self, _args: &Value) -> Result<Value, ToolError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(json!({}))
        }

        fn timeout(&self) -> Duration {
            Duration::from_millis(20)
        }
    }

    fn executor() -> ToolExecutor {
        ToolExecutor::new(ToolRegistry::builder().register(EchoTool).register(SlowTool).build())
    }

    fn call(name: &str, arguments: &str) -> ToolCall {
        ToolCall::with_id("call_1", name, arguments)
    }

    #[test]
    fn test_builtin_registry_order() {
        let registry = ToolRegistry::builtin(&ToolsConfig::default()).unwrap();
        assert_eq!(
            registry.tool_names(),
            vec![
                "web_search",
                "code_runner",
                "quickjs",
                "fetch",
                "convert",
                "date",
                "base64",
                "memory",
                "random_choice"
            ]
        );
        assert_eq!(registry.len(), 9);
        assert!(registry.contains("convert"));
        assert!(registry.get("teleport").is_none());
    }

    #[test]
    fn test_definitions_share_one_allocation() {
        let registry = ToolRegistry::builtin(&ToolsConfig::default()).unwrap();
        assert!(Arc::ptr_eq(&registry.definitions(), &registry.definitions()));
    }

    #[test]
    fn test_duplicate_registration_replaces_in_place() {
        let registry = ToolRegistry::builder()
            .register(EchoTool)
            .register(SlowTool)
            .register(EchoTool)
            .build();
        assert_eq!(registry.tool_names(), vec!["echo", "slow"]);
    }

    #[test]
    fn test_timeout_overrides() {
        let registry = ToolRegistry::builtin(&ToolsConfig::default()).unwrap();
        let executor = ToolExecutor::new(registry).with_timeout("fetch", Duration::from_secs(2));

        assert_eq!(executor.timeout_for("fetch"), Some(Duration::from_secs(2)));
        assert_eq!(executor.timeout_for("web_search"), Some(NETWORK_TIMEOUT));
        assert_eq!(executor.timeout_for("code_runner"), Some(SANDBOX_TIMEOUT));
        assert_eq!(executor.timeout_for("date"), Some(LOCAL_TIMEOUT));
        assert_eq!(executor.timeout_for("teleport"), None);
    }

    #[test]
    fn test_parse_arguments() {
        let ok = FunctionCall {
            name: "echo".to_string(),
            arguments: r#"{"text": "hi"}"#.to_string(),
        };
        assert_eq!(ToolExecutor::parse_arguments(&ok).unwrap(), json!({"text": "hi"}));

        let empty = FunctionCall {
            name: "echo".to_string(),
            arguments: String::new(),
        };
        assert_eq!(ToolExecutor::parse_arguments(&empty).unwrap(), json!({}));

        let bad = FunctionCall {
            name: "echo".to_string(),
            arguments: "{bad json".to_string(),
        };
        assert!(matches!(
            ToolExecutor::parse_arguments(&bad),
            Err(ToolError::InvalidArguments { .. })
        ));
    }

    #[tokio::test]
    async fn test_execute_success() {
        let output = executor().execute_tool_call(&call("echo", r#"{"text":"hi"}"#)).await;
        assert!(output.is_success());
        assert_eq!(output.content, r#"{"echo":"hi"}"#);
    }

    #[tokio::test]
    async fn test_unknown_tool_is_structured_error() {
        let output = executor().execute("teleport", &json!({})).await;
        assert_eq!(output.status, ToolStatus::Error);

        let payload: Value = serde_json::from_str(&output.content).unwrap();
        assert_eq!(payload["error"], "Unknown tool: teleport");
        assert_eq!(payload["available_tools"], json!(["echo", "slow"]));
    }

    #[tokio::test]
    async fn test_bad_json_arguments_are_structured_error() {
        let output = executor().execute_tool_call(&call("echo", "{bad json")).await;
        assert_eq!(output.status, ToolStatus::Error);

        let payload: Value = serde_json::from_str(&output.content).unwrap();
        let message = payload["error"].as_str().unwrap();
        assert!(message.starts_with("Invalid JSON arguments for tool 'echo':"));
    }

    #[tokio::test]
    async fn test_tool_failure_is_structured_error() {
        let output = executor().execute("echo", &json!({})).await;
        assert_eq!(output.status, ToolStatus::Error);
        assert_eq!(
            output.content,
            r#"{"error":"Missing or invalid 'text' parameter"}"#
        );
    }

    #[tokio::test]
    async fn test_timeout_is_structured_error() {
        let output = executor().execute("slow", &json!({})).await;
        assert_eq!(output.status, ToolStatus::Error);

        let payload: Value = serde_json::from_str(&output.content).unwrap();
        assert_eq!(payload["error"], "Tool 'slow' timed out after 0s");
    }
}
