use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use futures::future::BoxFuture;
use serde::Serialize;
use tracing::{debug, warn};

use agentflow_core::error::{AgentFlowError, Result};
use agentflow_core::traits::{Tool, ToolExecutor};

/// Name, description and input schema of a registered tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// Registry of available tools.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. A tool with the same name is replaced.
    pub fn register(&mut self, tool: impl Tool) {
        let name = tool.name().to_string();
        self.tools.insert(name, Arc::new(tool));
    }

    pub fn unregister(&mut self, name: &str) -> bool {
        self.tools.remove(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Registered tool names, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Tool definitions, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .tools
            .values()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                input_schema: t.input_schema(),
            })
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Execute a tool by name, bounded by the tool's own timeout.
    pub async fn execute(&self, name: &str, input: serde_json::Value) -> Result<String> {
        let tool = self
            .get(name)
            .ok_or_else(|| AgentFlowError::ToolNotFound(name.to_string()))?;

        let timeout_secs = tool.timeout_secs();
        let start = Instant::now();
        let result = match tokio::time::timeout(
            std::time::Duration::from_secs(timeout_secs),
            tool.execute(input),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(AgentFlowError::ToolTimeout {
                tool: name.to_string(),
                timeout_secs,
            }),
        };

        let elapsed_ms = start.elapsed().as_millis() as u64;
        match &result {
            Ok(_) => debug!(tool = %name, elapsed_ms, "Tool executed"),
            Err(e) => warn!(tool = %name, elapsed_ms, error = %e, "Tool failed"),
        }
        result
    }

    /// Create a registry with all built-in tools registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(crate::builtin::time::GetTimeTool);
        registry.register(crate::builtin::calculate::CalculateTool);
        registry.register(crate::builtin::echo::EchoTool);
        registry.register(crate::builtin::fetch::FetchUrlTool);
        registry
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolExecutor for ToolRegistry {
    fn execute(&self, name: &str, params: serde_json::Value) -> BoxFuture<'_, Result<String>> {
        let name = name.to_string();
        Box::pin(async move { ToolRegistry::execute(self, &name, params).await })
    }
}
