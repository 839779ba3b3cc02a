pub mod providers;
pub mod registry;
pub mod retry;

use std::sync::Arc;

use agentflow_core::traits::ProviderClient;

pub use providers::anthropic::AnthropicClient;
pub use providers::openai::OpenAiClient;
pub use registry::{InvokeOptions, ModelRegistry};

/// Create a provider client based on the provider tag.
pub fn create_client(provider: &str) -> Arc<dyn ProviderClient> {
    match provider {
        "anthropic" | "claude" => Arc::new(AnthropicClient::new()),
        // Everything else uses the OpenAI-compatible client
        _ => Arc::new(OpenAiClient::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_client_dispatch() {
        assert_eq!(create_client("anthropic").name(), "anthropic");
        assert_eq!(create_client("claude").name(), "anthropic");
        assert_eq!(create_client("glm").name(), "openai");
        assert_eq!(create_client("something-new").name(), "openai");
    }
}
