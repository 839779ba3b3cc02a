use serde::Deserialize;

use agentflow_core::error::{AgentFlowError, Result};
use agentflow_core::flow::{NodeDefinition, NodeType};

/// A validated node of a flow graph.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowNode {
    pub id: String,
    pub kind: NodeKind,
}

impl FlowNode {
    /// Parse the untyped `data` payload of a node definition.
    pub fn from_definition(flow_id: &str, def: &NodeDefinition) -> Result<Self> {
        let kind = match def.node_type {
            NodeType::Trigger => NodeKind::Trigger(parse_data(flow_id, def)?),
            NodeType::Agent => NodeKind::Agent(parse_data(flow_id, def)?),
            NodeType::Llm => NodeKind::Llm(parse_data(flow_id, def)?),
            NodeType::Tool => {
                let config: ToolNodeConfig = parse_data(flow_id, def)?;
                if config.tool_name.trim().is_empty() {
                    return Err(AgentFlowError::InvalidFlow {
                        flow: flow_id.to_string(),
                        message: format!("tool node '{}' has no toolName", def.id),
                    });
                }
                NodeKind::Tool(config)
            }
            NodeType::Condition => NodeKind::Condition(parse_data(flow_id, def)?),
        };
        Ok(Self {
            id: def.id.clone(),
            kind,
        })
    }

    pub fn node_type(&self) -> NodeType {
        self.kind.node_type()
    }
}

/// Node behavior with its typed configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Trigger(TriggerConfig),
    Agent(AgentNodeConfig),
    Llm(LlmNodeConfig),
    Tool(ToolNodeConfig),
    Condition(ConditionConfig),
}

impl NodeKind {
    pub fn node_type(&self) -> NodeType {
        match self {
            NodeKind::Trigger(_) => NodeType::Trigger,
            NodeKind::Agent(_) => NodeType::Agent,
            NodeKind::Llm(_) => NodeType::Llm,
            NodeKind::Tool(_) => NodeType::Tool,
            NodeKind::Condition(_) => NodeType::Condition,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TriggerType {
    #[default]
    Message,
    Schedule,
    Webhook,
}

impl TriggerType {
    /// Unknown trigger types behave like message triggers.
    pub fn parse(s: &str) -> Self {
        match s.trim() {
            "schedule" | "定时" => TriggerType::Schedule,
            "webhook" => TriggerType::Webhook,
            _ => TriggerType::Message,
        }
    }
}

impl<'de> Deserialize<'de> for TriggerType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::parse(&s))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerConfig {
    #[serde(default)]
    pub trigger_type: TriggerType,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentNodeConfig {
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    /// Two or more entries make the node vote.
    #[serde(default)]
    pub models: Vec<String>,
    #[serde(default)]
    pub voting_method: Option<String>,
    #[serde(default)]
    pub task_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmNodeConfig {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub system_prompt: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolNodeConfig {
    #[serde(default)]
    pub tool_name: String,
    #[serde(default)]
    pub tool_type: Option<String>,
    #[serde(default)]
    pub params: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionConfig {
    /// Empty means always true.
    #[serde(default)]
    pub condition: String,
}

fn parse_data<T: for<'de> Deserialize<'de> + Default>(flow_id: &str, def: &NodeDefinition) -> Result<T> {
    if def.data.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(def.data.clone()).map_err(|e| AgentFlowError::InvalidFlow {
        flow: flow_id.to_string(),
        message: format!("node '{}' ({}): {}", def.id, def.node_type, e),
    })
}
