//! Code execution through an isolated sandbox service.
//!
//! `code_runner` and `quickjs` never evaluate code in this process. They POST the code to
//! `{sandbox_url}/execute` and relay what the service reports. Without a configured sandbox both
//! tools answer with a "not configured" error.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use cyberloop_common::tools::{Parameters, Property, Tool};

use crate::args::{object, required_str};
use crate::{SANDBOX_TIMEOUT, ToolError, ToolImplementation};

/// Time budget handed to the sandbox, leaving headroom under [`SANDBOX_TIMEOUT`] for transport.
const EXECUTION_BUDGET_MS: u64 = 25_000;

#[derive(Serialize)]
struct ExecuteRequest<'a> {
    language: &'a str,
    code: &'a str,
    timeout_ms: u64,
}

/// What the sandbox reports for one execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SandboxOutput {
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    /// Process exit status; zero means success.
    #[serde(default)]
    pub exit_code: i32,
}

/// HTTP client for the sandbox execution service.
#[derive(Debug, Clone)]
pub struct SandboxClient {
    client: reqwest::Client,
    base_url: String,
}

impl SandboxClient {
    #[must_use]
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Runs `code` in `language`.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a non-success status.
    pub async fn execute(&self, language: &str, code: &str) -> Result<SandboxOutput, ToolError> {
        debug!("Submitting {} bytes of {language} to the sandbox", code.len());
        let response = self
            .client
            .post(format!("{}/execute", self.base_url))
            .json(&ExecuteRequest {
                language,
                code,
                timeout_ms: EXECUTION_BUDGET_MS,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ToolError::http(response.status()));
        }
        Ok(response.json().await?)
    }
}

async fn run(
    sandbox: Option<&SandboxClient>,
    language: &str,
    args: &Value,
) -> Result<Value, ToolError> {
    let code = required_str(object(args)?, "code")?;
    let sandbox = sandbox.ok_or_else(|| {
        ToolError::NotConfigured("Code execution is not configured: no sandbox URL set".into())
    })?;

    let output = sandbox.execute(language, code).await?;
    Ok(json!({
        "stdout": output.stdout,
        "stderr": output.stderr,
        "exit_code": output.exit_code,
        "success": output.exit_code == 0,
    }))
}

fn code_parameters(description: &str) -> Parameters {
    Parameters::new(
        BTreeMap::from([("code".to_string(), Property::string(description))]),
        ["code"],
    )
}

/// Runs Python in the sandbox.
#[derive(Debug, Clone)]
pub struct CodeRunnerTool {
    sandbox: Option<SandboxClient>,
}

impl CodeRunnerTool {
    #[must_use]
    pub const fn new(sandbox: Option<SandboxClient>) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl ToolImplementation for CodeRunnerTool {
    fn get_definition(&self) -> Tool {
        Tool::function(
            "code_runner",
            "Execute Python code in a sandboxed environment. Use for calculations, data \
             analysis, algorithms, or any computational task. Returns the output or any errors.",
            code_parameters(
                "The Python code to execute. Can include imports, functions, and print \
                 statements. Output will be captured.",
            ),
        )
    }

    async fn execute(&self, args: &Value) -> Result<Value, ToolError> {
        run(self.sandbox.as_ref(), "python", args).await
    }

    fn timeout(&self) -> Duration {
        SANDBOX_TIMEOUT
    }
}

/// Runs JavaScript in the sandbox.
#[derive(Debug, Clone)]
pub struct QuickJsTool {
    sandbox: Option<SandboxClient>,
}

impl QuickJsTool {
    #[must_use]
    pub const fn new(sandbox: Option<SandboxClient>) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl ToolImplementation for QuickJsTool {
    fn get_definition(&self) -> Tool {
        Tool::function(
            "quickjs",
            "Execute JavaScript code for simple calculations, string manipulations, or JSON \
             processing. Lightweight and fast for basic operations.",
            code_parameters(
                "The JavaScript code to execute. Returns the result of the last expression or \
                 console.log output.",
            ),
        )
    }

    async fn execute(&self, args: &Value) -> Result<Value, ToolError> {
        run(self.sandbox.as_ref(), "javascript", args).await
    }

    fn timeout(&self) -> Duration {
        SANDBOX_TIMEOUT
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    async fn sandbox_expecting(language: &str, code: &str, reply: Value) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/execute"))
            .and(body_json(json!({
                "language": language,
                "code": code,
                "timeout_ms": EXECUTION_BUDGET_MS
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(reply))
            .expect(1)
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_code_runner_sends_python() {
        let server = sandbox_expecting(
            "python",
            "print(6 * 7)",
            json!({"stdout": "42\n", "stderr": "", "exit_code": 0}),
        )
        .await;
        let sandbox = SandboxClient::new(reqwest::Client::new(), &server.uri());
        let tool = CodeRunnerTool::new(Some(sandbox));

        let result = tool.execute(&json!({"code": "print(6 * 7)"})).await.unwrap();
        assert_eq!(
            result,
            json!({"stdout": "42\n", "stderr": "", "exit_code": 0, "success": true})
        );
    }

    #[tokio::test]
    async fn test_quickjs_reports_failure_exit_code() {
        let server = sandbox_expecting(
            "javascript",
            "throw new Error('x')",
            json!({"stdout": "", "stderr": "Error: x", "exit_code": 1}),
        )
        .await;
        let url = format!("{}/", server.uri());
        let tool = QuickJsTool::new(Some(SandboxClient::new(reqwest::Client::new(), &url)));

        let result = tool
            .execute(&json!({"code": "throw new Error('x')"}))
            .await
            .unwrap();
        assert_eq!(result["success"], false);
        assert_eq!(result["stderr"], "Error: x");
    }

    #[tokio::test]
    async fn test_without_sandbox_is_not_configured() {
        let err = CodeRunnerTool::new(None)
            .execute(&json!({"code": "1 + 1"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NotConfigured(_)));
    }

    #[tokio::test]
    async fn test_sandbox_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        let sandbox = SandboxClient::new(reqwest::Client::new(), &server.uri());
        let tool = QuickJsTool::new(Some(sandbox));

        let err = tool.execute(&json!({"code": "1"})).await.unwrap_err();
        assert_eq!(err.to_string(), "HTTP 503: Service Unavailable");
    }
}
