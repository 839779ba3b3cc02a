pub mod calculate;
pub mod echo;
pub mod fetch;
pub mod time;

use agentflow_core::error::AgentFlowError;

pub(crate) fn invalid_params(tool: &str, e: serde_json::Error) -> AgentFlowError {
    AgentFlowError::ToolExecution {
        tool: tool.to_string(),
        message: format!("invalid parameters: {}", e),
    }
}

/// Read a string parameter, falling back to the upstream `input`.
pub(crate) fn param_or_input<'a>(primary: &'a Option<String>, input: &'a Option<String>) -> Option<&'a str> {
    primary
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .or_else(|| input.as_deref().filter(|s| !s.trim().is_empty()))
}
