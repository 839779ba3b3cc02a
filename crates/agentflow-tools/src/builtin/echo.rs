use futures::future::BoxFuture;
use serde::Deserialize;

use agentflow_core::error::Result;
use agentflow_core::traits::Tool;

use super::invalid_params;

pub struct EchoTool;

#[derive(Deserialize)]
struct EchoInput {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    input: Option<String>,
}

impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Return the given text unchanged. Falls back to the upstream input."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "text": { "type": "string", "description": "Text to echo" },
                "input": { "type": "string", "description": "Upstream node output" }
            }
        })
    }

    fn timeout_secs(&self) -> u64 {
        5
    }

    fn execute(&self, input: serde_json::Value) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            let p: EchoInput = serde_json::from_value(input).map_err(|e| invalid_params("echo", e))?;
            Ok(p.text.or(p.input).unwrap_or_default())
        })
    }
}
