use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use cyberloop_common::tools::{Parameters, Property, Tool};

use crate::args::{object, required_str, truncate_chars};
use crate::{NETWORK_TIMEOUT, ToolError, ToolImplementation};

const MAX_RESULTS: u32 = 5;
const RESULTS_RETURNED: usize = 3;
const SNIPPET_CHARS: usize = 200;

#[derive(Serialize)]
struct SearchRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    search_depth: &'a str,
    include_answer: bool,
    max_results: u32,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Deserialize)]
struct SearchResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
}

/// Web search through the Tavily API.
#[derive(Debug, Clone)]
pub struct WebSearchTool {
    client: reqwest::Client,
    api_key: Option<SecretString>,
    endpoint: String,
}

impl WebSearchTool {
    #[must_use]
    pub fn new(
        client: reqwest::Client,
        api_key: Option<SecretString>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_key,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl ToolImplementation for WebSearchTool {
    fn get_definition(&self) -> Tool {
        Tool::function(
            "web_search",
            "Search the internet for current information, news, facts, or real-time data. Use \
             this when you need up-to-date information that may not be in your training data.",
            Parameters::new(
                BTreeMap::from([(
                    "query".to_string(),
                    Property::string(
                        "The search query to look up on the internet. Be specific and include \
                         relevant keywords.",
                    ),
                )]),
                ["query"],
            ),
        )
    }

    async fn execute(&self, args: &Value) -> Result<Value, ToolError> {
        let query = required_str(object(args)?, "query")?;
        let api_key = self.api_key.as_ref().ok_or_else(|| {
            ToolError::NotConfigured("Web search is not configured: missing Tavily API key".into())
        })?;

        debug!("Searching the web for {query:?}");
        let response = self
            .client
            .post(&self.endpoint)
            .json(&SearchRequest {
                api_key: api_key.expose_secret(),
                query,
                search_depth: "basic",
                include_answer: true,
                max_results: MAX_RESULTS,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ToolError::http(response.status()));
        }

        let body: SearchResponse = response.json().await?;
        let results: Vec<Value> = body
            .results
            .iter()
            .take(RESULTS_RETURNED)
            .map(|r| {
                json!({
                    "title": r.title,
                    "url": r.url,
                    "content": truncate_chars(&r.content, SNIPPET_CHARS),
                })
            })
            .collect();

        Ok(json!({
            "answer": body.answer.unwrap_or_default(),
            "results": results,
        }))
    }

    fn timeout(&self) -> Duration {
        NETWORK_TIMEOUT
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn tool(server: &MockServer, key: Option<&str>) -> WebSearchTool {
        WebSearchTool::new(
            reqwest::Client::new(),
            key.map(|k| SecretString::new(k.into())),
            format!("{}/search", server.uri()),
        )
    }

    #[tokio::test]
    async fn test_search_returns_answer_and_top_three_results() {
        let server = MockServer::start().await;
        let long = "x".repeat(500);
        Mock::given(method("POST"))
            .and(path("/search"))
            .and(body_partial_json(json!({
                "api_key": "tvly-test",
                "query": "rust release",
                "search_depth": "basic",
                "include_answer": true,
                "max_results": 5
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "answer": "Rust 1.90 is out.",
                "results": [
                    {"title": "a", "url": "https://a.example", "content": long},
                    {"title": "b", "url": "https://b.example", "content": "b"},
                    {"title": "c", "url": "https://c.example", "content": "c"},
                    {"title": "d", "url": "https://d.example", "content": "d"}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let result = tool(&server, Some("tvly-test"))
            .execute(&json!({"query": "rust release"}))
            .await
            .unwrap();

        assert_eq!(result["answer"], "Rust 1.90 is out.");
        let results = result["results"].as_array().unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0]["content"].as_str().unwrap().len(), 200);
        assert_eq!(results[2]["url"], "https://c.example");
    }

    #[tokio::test]
    async fn test_search_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = tool(&server, Some("bad"))
            .execute(&json!({"query": "q"}))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "HTTP 401: Unauthorized");
    }

    #[tokio::test]
    async fn test_search_without_key_is_not_configured() {
        let server = MockServer::start().await;
        let err = tool(&server, None)
            .execute(&json!({"query": "q"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NotConfigured(_)));
    }

    #[tokio::test]
    async fn test_search_requires_query() {
        let server = MockServer::start().await;
        let err = tool(&server, Some("k")).execute(&json!({})).await.unwrap_err();
        assert_eq!(err.to_string(), "Missing or invalid 'query' parameter");
    }
}
