use std::collections::HashMap;

use futures::future::BoxFuture;
use tracing::debug;

use agentflow_core::error::{AgentFlowError, Result};
use agentflow_core::traits::AgentResolver;
use agentflow_core::types::AgentProfile;

/// Id of the profile used for agent nodes that name no agent.
pub const DEFAULT_AGENT_ID: &str = "default";

/// Resolves agents from the static `[[agents]]` profiles in the config.
///
/// Nodes without an agent id get the profile named `default` when one is
/// configured, otherwise an empty profile that defers to the executor
/// defaults. Knowledge is whatever `context` the profile carries.
pub struct ProfileAgentResolver {
    profiles: HashMap<String, AgentProfile>,
}

impl ProfileAgentResolver {
    pub fn new(profiles: impl IntoIterator<Item = AgentProfile>) -> Self {
        Self {
            profiles: profiles
                .into_iter()
                .map(|p| (p.id.clone(), p))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    fn lookup(&self, agent_id: Option<&str>) -> Result<AgentProfile> {
        match agent_id.filter(|id| !id.is_empty()) {
            Some(id) => self
                .profiles
                .get(id)
                .cloned()
                .ok_or_else(|| AgentFlowError::AgentNotFound(id.to_string())),
            None => Ok(self
                .profiles
                .get(DEFAULT_AGENT_ID)
                .cloned()
                .unwrap_or_else(|| AgentProfile {
                    id: DEFAULT_AGENT_ID.to_string(),
                    ..Default::default()
                })),
        }
    }
}

impl AgentResolver for ProfileAgentResolver {
    fn resolve(&self, agent_id: Option<&str>, query: &str) -> BoxFuture<'_, Result<AgentProfile>> {
        let result = self.lookup(agent_id);
        debug!(
            agent_id = agent_id.unwrap_or(DEFAULT_AGENT_ID),
            query_chars = query.chars().count(),
            found = result.is_ok(),
            "Resolved agent profile"
        );
        Box::pin(async move { result })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(id: &str, model: &str) -> AgentProfile {
        AgentProfile {
            id: id.into(),
            model: Some(model.into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_resolve_named_profile() {
        let resolver = ProfileAgentResolver::new(vec![profile("support", "m2")]);
        let agent = resolver.resolve(Some("support"), "hi").await.unwrap();
        assert_eq!(agent.model.as_deref(), Some("m2"));

        let err = resolver.resolve(Some("sales"), "hi").await.unwrap_err();
        assert!(matches!(err, AgentFlowError::AgentNotFound(id) if id == "sales"));
    }

    #[tokio::test]
    async fn test_default_profile() {
        let empty = ProfileAgentResolver::new(Vec::new());
        let agent = empty.resolve(None, "hi").await.unwrap();
        assert_eq!(agent.id, DEFAULT_AGENT_ID);
        assert!(agent.model.is_none());

        let configured = ProfileAgentResolver::new(vec![profile("default", "m1")]);
        let agent = configured.resolve(Some(""), "hi").await.unwrap();
        assert_eq!(agent.model.as_deref(), Some("m1"));
    }
}
