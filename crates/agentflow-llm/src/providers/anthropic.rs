use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use agentflow_core::config::ModelConfig;
use agentflow_core::error::{AgentFlowError, Result};
use agentflow_core::traits::ProviderClient;
use agentflow_core::types::*;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicClient {
    http: Client,
}

impl AnthropicClient {
    pub fn new() -> Self {
        Self {
            http: Client::new(),
        }
    }
}

impl Default for AnthropicClient {
    fn default() -> Self {
        Self::new()
    }
}

// Anthropic API request types
#[derive(Serialize, Debug)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    messages: Vec<ApiMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
}

#[derive(Serialize, Debug)]
struct ApiMessage<'a> {
    role: &'static str,
    content: &'a str,
}

// Anthropic API response types
#[derive(Deserialize, Debug)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlockInfo>,
    #[serde(default)]
    usage: Option<UsageInfo>,
}

#[derive(Deserialize, Debug)]
#[serde(tag = "type")]
enum ContentBlockInfo {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Deserialize, Debug)]
struct UsageInfo {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

/// System messages are hoisted into the top-level `system` field.
fn build_body(request: &ChatRequest) -> MessagesRequest<'_> {
    let system: Vec<&str> = request
        .messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect();

    MessagesRequest {
        model: &request.model,
        max_tokens: request.max_tokens,
        temperature: request.temperature,
        top_p: request.top_p,
        messages: request
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| ApiMessage {
                role: m.role.as_str(),
                content: &m.content,
            })
            .collect(),
        system: if system.is_empty() {
            None
        } else {
            Some(system.join("\n\n"))
        },
    }
}

fn parse_response(model: &str, body: &str) -> Result<ChatResponse> {
    let parsed: MessagesResponse = serde_json::from_str(body).map_err(|e| AgentFlowError::Provider {
        model: model.to_string(),
        message: format!("invalid response: {}", e),
    })?;

    let text: String = parsed
        .content
        .into_iter()
        .filter_map(|b| match b {
            ContentBlockInfo::Text { text } => Some(text),
            ContentBlockInfo::Other => None,
        })
        .collect();

    if text.is_empty() {
        return Err(AgentFlowError::Provider {
            model: model.to_string(),
            message: "empty response".into(),
        });
    }

    Ok(ChatResponse {
        content: text,
        usage: parsed.usage.map(|u| Usage {
            input_tokens: u.input_tokens,
            output_tokens: u.output_tokens,
        }),
    })
}

impl ProviderClient for AnthropicClient {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn chat(&self, config: &ModelConfig, request: ChatRequest) -> BoxFuture<'_, Result<ChatResponse>> {
        let config = config.clone();

        Box::pin(async move {
            let url = config.base_url.as_deref().unwrap_or(ANTHROPIC_API_URL);
            let body = build_body(&request);

            debug!(model = %request.model, "Sending Anthropic messages request");

            let provider_err = |message: String| AgentFlowError::Provider {
                model: request.model.clone(),
                message,
            };

            let response = self
                .http
                .post(url)
                .header("x-api-key", &config.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .header("content-type", "application/json")
                .json(&body)
                .send()
                .await
                .map_err(|e| provider_err(e.to_string()))?;

            let status = response.status();
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown".to_string());
            if !status.is_success() {
                return Err(provider_err(format!("HTTP {}: {}", status, text)));
            }

            parse_response(&request.model, &text)
        })
    }
}
