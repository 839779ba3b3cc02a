//! Flow graph execution.
//!
//! A flow is a directed graph of typed nodes (trigger, agent, LLM, tool,
//! condition) connected by optionally conditional edges. `FlowGraph`
//! validates a stored `Flow` and builds its adjacency list; `GraphExecutor`
//! walks it depth-first from every trigger, threading one
//! `ExecutionContext` through the run.

pub mod context;
pub mod edge;
pub mod executor;
pub mod node;

use std::collections::HashMap;

use agentflow_core::error::{AgentFlowError, Result};
use agentflow_core::flow::Flow;

pub use context::{ContextSnapshot, ExecutionContext};
pub use edge::{evaluate_condition, ConditionScope, Link};
pub use executor::{ExecuteRequest, ExecuteResponse, GraphExecutor, NodeExecution};
pub use node::{FlowNode, NodeKind, TriggerType};

/// A validated flow: typed nodes, adjacency list and trigger roots.
#[derive(Debug, Clone)]
pub struct FlowGraph {
    flow_id: String,
    nodes: HashMap<String, FlowNode>,
    adjacency: HashMap<String, Vec<Link>>,
    triggers: Vec<String>,
}

impl FlowGraph {
    /// Validate a flow and index it.
    ///
    /// Fails with `InvalidFlow` on duplicate node ids, edges whose endpoints
    /// are not nodes of the flow, or malformed node payloads. Outgoing edges
    /// keep their declaration order; triggers keep node order.
    pub fn build(flow: &Flow) -> Result<Self> {
        let invalid = |message: String| AgentFlowError::InvalidFlow {
            flow: flow.id.clone(),
            message,
        };

        let mut nodes = HashMap::with_capacity(flow.nodes.len());
        let mut triggers = Vec::new();
        for def in &flow.nodes {
            let node = FlowNode::from_definition(&flow.id, def)?;
            if matches!(node.kind, NodeKind::Trigger(_)) {
                triggers.push(node.id.clone());
            }
            if nodes.insert(def.id.clone(), node).is_some() {
                return Err(invalid(format!("duplicate node id '{}'", def.id)));
            }
        }

        let mut adjacency: HashMap<String, Vec<Link>> = HashMap::new();
        for edge in &flow.edges {
            for endpoint in [&edge.source, &edge.target] {
                if !nodes.contains_key(endpoint) {
                    return Err(invalid(format!(
                        "edge '{}' references unknown node '{}'",
                        edge.id, endpoint
                    )));
                }
            }
            adjacency
                .entry(edge.source.clone())
                .or_default()
                .push(Link {
                    edge_id: edge.id.clone(),
                    target: edge.target.clone(),
                    condition: edge.condition.clone().filter(|c| !c.trim().is_empty()),
                });
        }

        Ok(Self {
            flow_id: flow.id.clone(),
            nodes,
            adjacency,
            triggers,
        })
    }

    pub fn flow_id(&self) -> &str {
        &self.flow_id
    }

    pub fn node(&self, id: &str) -> Option<&FlowNode> {
        self.nodes.get(id)
    }

    pub fn outgoing(&self, id: &str) -> &[Link] {
        self.adjacency.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Trigger node ids in declaration order.
    pub fn triggers(&self) -> &[String] {
        &self.triggers
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentflow_core::flow::{EdgeDefinition, NodeDefinition, NodeType};
    use serde_json::json;

    fn base() -> Flow {
        Flow::new("f1", "test")
            .with_node(NodeDefinition::new("t", NodeType::Trigger, json!({})))
            .with_node(NodeDefinition::new("a", NodeType::Tool, json!({"toolName": "echo"})))
            .with_node(NodeDefinition::new("b", NodeType::Tool, json!({"toolName": "echo"})))
    }

    #[test]
    fn test_adjacency_keeps_declaration_order() {
        let flow = base()
            .with_edge(EdgeDefinition::new("e1", "t", "b"))
            .with_edge(EdgeDefinition::new("e2", "t", "a").with_condition("never"))
            .with_edge(EdgeDefinition::new("e3", "a", "b").with_condition("  "));
        let graph = FlowGraph::build(&flow).unwrap();

        let targets: Vec<_> = graph.outgoing("t").iter().map(|l| l.target.as_str()).collect();
        assert_eq!(targets, vec!["b", "a"]);
        assert_eq!(graph.outgoing("t")[1].condition.as_deref(), Some("never"));
        assert_eq!(graph.outgoing("a")[0].condition, None);
        assert!(graph.outgoing("b").is_empty());
        assert_eq!(graph.triggers(), &["t".to_string()]);
        assert_eq!(graph.len(), 3);
        assert_eq!(graph.flow_id(), "f1");
    }

    #[test]
    fn test_dangling_edge_rejected() {
        let flow = base().with_edge(EdgeDefinition::new("e1", "t", "ghost"));
        let err = FlowGraph::build(&flow).unwrap_err();
        match err {
            AgentFlowError::InvalidFlow { flow, message } => {
                assert_eq!(flow, "f1");
                assert!(message.contains("ghost"));
            }
            other => panic!("Expected InvalidFlow, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_node_rejected() {
        let flow = base().with_node(NodeDefinition::new("a", NodeType::Llm, json!({})));
        assert!(matches!(
            FlowGraph::build(&flow),
            Err(AgentFlowError::InvalidFlow { .. })
        ));
    }

    #[test]
    fn test_flow_without_trigger_builds() {
        let flow = Flow::new("f2", "no trigger")
            .with_node(NodeDefinition::new("a", NodeType::Llm, json!({"prompt": "hi"})));
        let graph = FlowGraph::build(&flow).unwrap();
        assert!(graph.triggers().is_empty());
        assert!(!graph.is_empty());
    }
}
