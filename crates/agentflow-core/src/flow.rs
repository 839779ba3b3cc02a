//! Stored flow definitions.
//!
//! A flow is the JSON document an editor saves: a list of nodes with
//! type-specific `data` and a list of edges between them. These types are
//! the wire shape only; the executor parses them into a typed graph.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Type tag of a node in a stored flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Trigger,
    Agent,
    Tool,
    Condition,
    Llm,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Trigger => "trigger",
            NodeType::Agent => "agent",
            NodeType::Tool => "tool",
            NodeType::Condition => "condition",
            NodeType::Llm => "llm",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Editor canvas position. Not used by execution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDefinition {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(default = "empty_object")]
    pub data: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

impl NodeDefinition {
    pub fn new(id: impl Into<String>, node_type: NodeType, data: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            node_type,
            data,
            position: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeDefinition {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<String>,
    /// Absent means the edge is always followed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

impl EdgeDefinition {
    pub fn new(id: impl Into<String>, source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            source_handle: None,
            target_handle: None,
            condition: None,
        }
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flow {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub nodes: Vec<NodeDefinition>,
    #[serde(default)]
    pub edges: Vec<EdgeDefinition>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl Flow {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            nodes: vec![],
            edges: vec![],
            enabled: true,
        }
    }

    pub fn with_node(mut self, node: NodeDefinition) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn with_edge(mut self, edge: EdgeDefinition) -> Self {
        self.edges.push(edge);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn from_json(json: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json_pretty(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SAMPLE: &str = r#"{
        "id": "support",
        "name": "Support bot",
        "enabled": true,
        "nodes": [
            {"id": "t1", "type": "trigger", "data": {"triggerType": "message"}, "position": {"x": 0, "y": 0}},
            {"id": "c1", "type": "condition", "data": {"condition": "input contains refund"}},
            {"id": "l1", "type": "llm", "data": {"model": "gpt-4", "prompt": "Answer politely"}}
        ],
        "edges": [
            {"id": "e1", "source": "t1", "target": "c1"},
            {"id": "e2", "source": "c1", "target": "l1", "sourceHandle": "yes", "condition": "true"}
        ]
    }"#;

    #[test]
    fn test_parse_flow_json() {
        let flow = Flow::from_json(SAMPLE).unwrap();
        assert_eq!(flow.nodes.len(), 3);
        assert_eq!(flow.nodes[1].node_type, NodeType::Condition);
        assert_eq!(flow.nodes[2].data["prompt"], "Answer politely");
        assert_eq!(flow.edges[1].source_handle.as_deref(), Some("yes"));
        assert_eq!(flow.edges[1].condition.as_deref(), Some("true"));
        assert!(flow.edges[0].condition.is_none());
    }

    #[test]
    fn test_flow_roundtrip_preserves_structure() {
        let flow = Flow::from_json(SAMPLE).unwrap();
        let json = flow.to_json_pretty().unwrap();
        let parsed = Flow::from_json(&json).unwrap();
        assert_eq!(parsed, flow);

        let ids: Vec<_> = parsed.nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["t1", "c1", "l1"]);
        let keys: Vec<_> = parsed.nodes[2].data.as_object().unwrap().keys().cloned().collect();
        assert!(keys.contains(&"model".to_string()));
        assert!(keys.contains(&"prompt".to_string()));
    }

    #[test]
    fn test_missing_fields_default() {
        let flow: Flow = serde_json::from_value(json!({
            "id": "f",
            "nodes": [{"id": "t", "type": "trigger"}]
        }))
        .unwrap();
        assert!(flow.enabled);
        assert!(flow.edges.is_empty());
        assert!(flow.nodes[0].data.as_object().unwrap().is_empty());
    }

    #[test]
    fn test_unknown_node_type_rejected() {
        let result: std::result::Result<NodeDefinition, _> =
            serde_json::from_value(json!({"id": "x", "type": "browser"}));
        assert!(result.is_err());
    }
}
