use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentFlowError {
    // Flow errors
    #[error("Flow not found: {0}")]
    FlowNotFound(String),

    #[error("Flow is disabled: {0}")]
    FlowDisabled(String),

    #[error("Flow has no trigger node: {0}")]
    NoTriggerNode(String),

    #[error("Invalid flow {flow}: {message}")]
    InvalidFlow { flow: String, message: String },

    #[error("Flow produced no output: {0}")]
    NoOutput(String),

    // Model errors
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("No model with credentials is available")]
    NoAvailableModel,

    #[error("No client registered for provider {provider} (model {model})")]
    ProviderUnavailable { model: String, provider: String },

    #[error("Provider error: {model}: {message}")]
    Provider { model: String, message: String },

    #[error("Request to {model} timed out after {timeout_secs}s")]
    Timeout { model: String, timeout_secs: u64 },

    // Vote errors
    #[error("No models specified for vote")]
    NoModelsSpecified,

    #[error("None of the requested models are available")]
    NoAvailableModels,

    #[error("All models failed: {0}")]
    AllModelsFailed(String),

    // Collaborator errors
    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Tool execution failed: {tool}: {message}")]
    ToolExecution { tool: String, message: String },

    #[error("Tool timeout after {timeout_secs}s: {tool}")]
    ToolTimeout { tool: String, timeout_secs: u64 },

    #[error("Channel error: {channel}: {message}")]
    Channel { channel: String, message: String },

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    #[error("Execution cancelled")]
    Cancelled,

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AgentFlowError {
    /// Configuration-class failures are surfaced immediately and never retried.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::FlowNotFound(_)
                | Self::FlowDisabled(_)
                | Self::NoTriggerNode(_)
                | Self::InvalidFlow { .. }
                | Self::ModelNotFound(_)
                | Self::NoAvailableModel
                | Self::ProviderUnavailable { .. }
                | Self::Config(_)
                | Self::ConfigNotFound(_)
        )
    }

    /// Transient provider failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Provider { message, .. } => {
                message.contains("429")
                    || message.contains("500")
                    || message.contains("502")
                    || message.contains("503")
                    || message.contains("timeout")
                    || message.contains("connection")
            }
            Self::Timeout { .. } => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, AgentFlowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_class() {
        assert!(AgentFlowError::FlowNotFound("f".into()).is_configuration());
        assert!(AgentFlowError::NoAvailableModel.is_configuration());
        assert!(!AgentFlowError::Cancelled.is_configuration());
        assert!(!AgentFlowError::AllModelsFailed("x".into()).is_configuration());
    }

    #[test]
    fn test_retryable_provider_errors() {
        let e = AgentFlowError::Provider {
            model: "gpt-4".into(),
            message: "HTTP 503 Service Unavailable: busy".into(),
        };
        assert!(e.is_retryable());

        let e = AgentFlowError::Provider {
            model: "gpt-4".into(),
            message: "HTTP 401 Unauthorized: bad key".into(),
        };
        assert!(!e.is_retryable());
        assert!(!AgentFlowError::ModelNotFound("x".into()).is_retryable());
    }
}
