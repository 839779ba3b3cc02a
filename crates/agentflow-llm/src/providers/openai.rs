use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use agentflow_core::config::ModelConfig;
use agentflow_core::error::{AgentFlowError, Result};
use agentflow_core::traits::ProviderClient;
use agentflow_core::types::*;

use super::presets::chat_endpoint;

/// OpenAI-compatible client. Works with OpenAI, GLM, MiniMax, Kimi, Qwen, DeepSeek, Ollama, etc.
pub struct OpenAiClient {
    http: Client,
}

impl OpenAiClient {
    pub fn new() -> Self {
        Self {
            http: Client::new(),
        }
    }
}

impl Default for OpenAiClient {
    fn default() -> Self {
        Self::new()
    }
}

// Request types
#[derive(Serialize, Debug)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<OaiMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    stream: bool,
}

#[derive(Serialize, Debug)]
struct OaiMessage<'a> {
    role: &'static str,
    content: &'a str,
}

// Response types
#[derive(Deserialize, Debug)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<OaiUsage>,
}

#[derive(Deserialize, Debug)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize, Debug)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct OaiUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

fn build_body(request: &ChatRequest) -> CompletionRequest<'_> {
    CompletionRequest {
        model: &request.model,
        messages: request
            .messages
            .iter()
            .map(|m| OaiMessage {
                role: m.role.as_str(),
                content: &m.content,
            })
            .collect(),
        max_tokens: request.max_tokens,
        temperature: request.temperature,
        top_p: request.top_p,
        stream: false,
    }
}

fn parse_response(model: &str, body: &str) -> Result<ChatResponse> {
    let parsed: CompletionResponse = serde_json::from_str(body).map_err(|e| AgentFlowError::Provider {
        model: model.to_string(),
        message: format!("invalid response: {}", e),
    })?;

    let content = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| AgentFlowError::Provider {
            model: model.to_string(),
            message: "empty response".into(),
        })?;

    Ok(ChatResponse {
        content,
        usage: parsed.usage.map(|u| Usage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
        }),
    })
}

impl ProviderClient for OpenAiClient {
    fn name(&self) -> &str {
        "openai"
    }

    fn chat(&self, config: &ModelConfig, request: ChatRequest) -> BoxFuture<'_, Result<ChatResponse>> {
        let config = config.clone();

        Box::pin(async move {
            let endpoint = chat_endpoint(&config.provider, config.base_url.as_deref());
            let body = build_body(&request);

            debug!(model = %request.model, endpoint = %endpoint, "Sending chat completion");

            let mut req = self.http.post(&endpoint).json(&body);
            if !config.api_key.is_empty() {
                req = req.header("Authorization", format!("Bearer {}", config.api_key));
            }

            let provider_err = |message: String| AgentFlowError::Provider {
                model: request.model.clone(),
                message,
            };

            let response = req.send().await.map_err(|e| provider_err(e.to_string()))?;

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

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ChatRequest {
        ChatRequest {
            model: "glm-4".into(),
            messages: vec![ChatMessage::system("be brief"), ChatMessage::user("hi")],
            max_tokens: 4096,
            temperature: 0.3,
            top_p: None,
        }
    }

    #[test]
    fn test_request_body_shape() {
        let req = request();
        let body = serde_json::to_value(build_body(&req)).unwrap();
        assert_eq!(body["model"], "glm-4");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hi");
        assert_eq!(body["stream"], false);
        assert!(body.get("top_p").is_none());
        assert!((body["temperature"].as_f64().unwrap() - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_parse_response_content_and_usage() {
        let body = r#"{
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "Hello!"}}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3}
        }"#;
        let resp = parse_response("gpt-4", body).unwrap();
        assert_eq!(resp.content, "Hello!");
        assert_eq!(resp.usage.unwrap().output_tokens, 3);
    }

    #[test]
    fn test_parse_response_without_choices() {
        let err = parse_response("gpt-4", r#"{"choices": []}"#).unwrap_err();
        match err {
            AgentFlowError::Provider { model, message } => {
                assert_eq!(model, "gpt-4");
                assert_eq!(message, "empty response");
            }
            other => panic!("Expected Provider error, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_response_garbage() {
        assert!(parse_response("gpt-4", "<html>").is_err());
    }
}
