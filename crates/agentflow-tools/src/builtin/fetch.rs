use futures::future::BoxFuture;
use serde::Deserialize;
use tracing::debug;

use agentflow_core::error::{AgentFlowError, Result};
use agentflow_core::traits::Tool;

use super::{invalid_params, param_or_input};

const DEFAULT_MAX_CHARS: usize = 5000;

pub struct FetchUrlTool;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FetchInput {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    input: Option<String>,
    #[serde(default)]
    max_chars: Option<usize>,
}

impl Tool for FetchUrlTool {
    fn name(&self) -> &str {
        "fetch_url"
    }

    fn description(&self) -> &str {
        "Fetch a URL and return its status and (truncated) body."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "url": { "type": "string", "description": "Target URL" },
                "maxChars": {
                    "type": "integer",
                    "description": "Maximum characters of body to return (default: 5000)"
                }
            }
        })
    }

    fn execute(&self, input: serde_json::Value) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            let p: FetchInput =
                serde_json::from_value(input).map_err(|e| invalid_params("fetch_url", e))?;
            let url = param_or_input(&p.url, &p.input)
                .map(str::trim)
                .ok_or_else(|| fetch_error("url is required"))?;
            let max_chars = p.max_chars.filter(|n| *n > 0).unwrap_or(DEFAULT_MAX_CHARS);

            debug!(url = %url, "Fetching URL");

            let client = reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .user_agent(concat!("agentflow/", env!("CARGO_PKG_VERSION")))
                .build()
                .map_err(|e| fetch_error(format!("Failed to create HTTP client: {}", e)))?;

            let resp = client
                .get(url)
                .send()
                .await
                .map_err(|e| fetch_error(format!("Request failed: {}", e)))?;
            let status = resp.status().as_u16();
            let body = resp
                .text()
                .await
                .map_err(|e| fetch_error(format!("Failed to read body: {}", e)))?;

            Ok(serde_json::json!({
                "url": url,
                "status": status,
                "content": truncate_chars(&body, max_chars),
            })
            .to_string())
        })
    }
}

fn fetch_error(message: impl Into<String>) -> AgentFlowError {
    AgentFlowError::ToolExecution {
        tool: "fetch_url".to_string(),
        message: message.into(),
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
