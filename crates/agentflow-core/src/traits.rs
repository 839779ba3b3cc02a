use futures::future::BoxFuture;

use crate::config::ModelConfig;
use crate::error::Result;
use crate::flow::Flow;
use crate::types::*;

/// Provider client: one implementation per backend family.
pub trait ProviderClient: Send + Sync + 'static {
    /// Provider family name (e.g., "openai", "anthropic").
    fn name(&self) -> &str;

    /// Send a chat request and wait for the full response.
    fn chat(&self, config: &ModelConfig, request: ChatRequest) -> BoxFuture<'_, Result<ChatResponse>>;
}

/// Flow store: where flow definitions live.
pub trait FlowStore: Send + Sync + 'static {
    /// Load a flow by id. `Ok(None)` when it does not exist.
    fn get_flow(&self, id: &str) -> BoxFuture<'_, Result<Option<Flow>>>;
}

/// Agent resolver: identity plus retrieved knowledge for agent nodes.
pub trait AgentResolver: Send + Sync + 'static {
    /// Resolve an agent. `agent_id` is `None` for nodes without an explicit agent.
    /// `query` is the node input, used for knowledge retrieval.
    fn resolve(&self, agent_id: Option<&str>, query: &str) -> BoxFuture<'_, Result<AgentProfile>>;
}

/// Tool: a single named capability a flow can invoke.
pub trait Tool: Send + Sync + 'static {
    /// Tool name (used by tool nodes).
    fn name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str;

    /// JSON Schema for tool input.
    fn input_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given parameters.
    fn execute(&self, input: serde_json::Value) -> BoxFuture<'_, Result<String>>;

    /// Timeout in seconds for this tool.
    fn timeout_secs(&self) -> u64 {
        30
    }
}

/// Tool executor: named tool invocation.
pub trait ToolExecutor: Send + Sync + 'static {
    fn execute(&self, name: &str, params: serde_json::Value) -> BoxFuture<'_, Result<String>>;
}

/// Message channel: reply path back to a chat platform.
pub trait MessageChannel: Send + Sync + 'static {
    /// Channel name (e.g., "telegram").
    fn name(&self) -> &str;

    fn send(&self, user_id: &str, text: &str) -> BoxFuture<'_, Result<()>>;
}
