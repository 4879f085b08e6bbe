use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use serde_json::{Value, json};
use url::Url;

use cyberloop_common::tools::{Parameters, Property, Tool};

use crate::args::{object, required_str, truncate_chars};
use crate::{NETWORK_TIMEOUT, ToolError, ToolImplementation};

const CONTENT_CHARS: usize = 1000;

/// Fetches a web page over http or https.
#[derive(Debug, Clone)]
pub struct FetchTool {
    client: reqwest::Client,
}

impl FetchTool {
    #[must_use]
    pub const fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn parse_url(raw: &str) -> Result<Url, ToolError> {
    let url = Url::parse(raw)
        .map_err(|e| ToolError::InvalidParameter(format!("Invalid URL '{raw}': {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ToolError::InvalidParameter(format!(
            "Unsupported URL scheme '{other}', expected http or https"
        ))),
    }
}

#[async_trait]
impl ToolImplementation for FetchTool {
    fn get_definition(&self) -> Tool {
        Tool::function(
            "fetch",
            "Fetch and retrieve content from a specific URL. Returns the HTML, text, or \
             structured content from the webpage.",
            Parameters::new(
                BTreeMap::from([(
                    "url".to_string(),
                    Property::string(
                        "The full URL to fetch content from (must include http:// or https://)",
                    ),
                )]),
                ["url"],
            ),
        )
    }

    async fn execute(&self, args: &Value) -> Result<Value, ToolError> {
        let raw = required_str(object(args)?, "url")?;
        let url = parse_url(raw)?;

        debug!("Fetching {url}");
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::http(status));
        }

        let text = response.text().await?;
        Ok(json!({
            "url": raw,
            "status": status.as_u16(),
            "content": truncate_chars(&text, CONTENT_CHARS),
            "content_length": text.chars().count(),
        }))
    }

    fn timeout(&self) -> Duration {
        NETWORK_TIMEOUT
    }
}
