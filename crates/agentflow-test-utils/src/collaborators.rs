use std::collections::HashMap;
use std::sync::Mutex;

use futures::future::BoxFuture;

use agentflow_core::error::{AgentFlowError, Result};
use agentflow_core::traits::{AgentResolver, MessageChannel, ToolExecutor};
use agentflow_core::types::AgentProfile;

/// Resolves agents from a fixed table; unknown ids fail, `None` yields the default profile.
#[derive(Default)]
pub struct StaticAgentResolver {
    agents: HashMap<String, AgentProfile>,
    default: AgentProfile,
}

impl StaticAgentResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_agent(mut self, profile: AgentProfile) -> Self {
        self.agents.insert(profile.id.clone(), profile);
        self
    }

    pub fn with_default(mut self, profile: AgentProfile) -> Self {
        self.default = profile;
        self
    }
}

impl AgentResolver for StaticAgentResolver {
    fn resolve(&self, agent_id: Option<&str>, _query: &str) -> BoxFuture<'_, Result<AgentProfile>> {
        let result = match agent_id {
            None | Some("") => Ok(self.default.clone()),
            Some(id) => self
                .agents
                .get(id)
                .cloned()
                .ok_or_else(|| AgentFlowError::AgentNotFound(id.to_string())),
        };
        Box::pin(async move { result })
    }
}

/// Tool executor returning canned results and recording every call.
#[derive(Default)]
pub struct MockToolExecutor {
    results: HashMap<String, std::result::Result<String, String>>,
    calls: Mutex<Vec<(String, serde_json::Value)>>,
}

impl MockToolExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_result(mut self, tool: &str, output: impl Into<String>) -> Self {
        self.results.insert(tool.to_string(), Ok(output.into()));
        self
    }

    pub fn with_error(mut self, tool: &str, message: impl Into<String>) -> Self {
        self.results.insert(tool.to_string(), Err(message.into()));
        self
    }

    pub fn calls(&self) -> Vec<(String, serde_json::Value)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl ToolExecutor for MockToolExecutor {
    fn execute(&self, name: &str, params: serde_json::Value) -> BoxFuture<'_, Result<String>> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((name.to_string(), params));
        }
        let result = match self.results.get(name) {
            Some(Ok(output)) => Ok(output.clone()),
            Some(Err(message)) => Err(AgentFlowError::ToolExecution {
                tool: name.to_string(),
                message: message.clone(),
            }),
            None => Err(AgentFlowError::ToolNotFound(name.to_string())),
        };
        Box::pin(async move { result })
    }
}

/// Channel that records sent messages instead of delivering them.
#[derive(Default)]
pub struct RecordingChannel {
    sent: Mutex<Vec<(String, String)>>,
    fail: bool,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// A channel whose every send fails.
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(vec![]),
            fail: true,
        }
    }

    /// `(user_id, text)` pairs in send order.
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl MessageChannel for RecordingChannel {
    fn name(&self) -> &str {
        "recording"
    }

    fn send(&self, user_id: &str, text: &str) -> BoxFuture<'_, Result<()>> {
        let result = if self.fail {
            Err(AgentFlowError::Channel {
                channel: "recording".into(),
                message: "send failed".into(),
            })
        } else {
            if let Ok(mut sent) = self.sent.lock() {
                sent.push((user_id.to_string(), text.to_string()));
            }
            Ok(())
        };
        Box::pin(async move { result })
    }
}
