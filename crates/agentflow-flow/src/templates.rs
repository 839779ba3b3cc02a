//! Built-in flow templates, ready to run or to copy into a flows directory.

use agentflow_core::error::{AgentFlowError, Result};
use agentflow_core::flow::Flow;

use crate::graph::FlowGraph;

/// A named flow definition shipped with the binary.
#[derive(Debug, Clone, Copy)]
pub struct Template {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    content: &'static str,
}

impl Template {
    /// Raw flow JSON.
    pub fn content(&self) -> &'static str {
        self.content
    }

    /// Parse the template and check that it builds into a graph.
    pub fn flow(&self) -> Result<Flow> {
        let flow = Flow::from_json(self.content).map_err(|e| AgentFlowError::InvalidFlow {
            flow: self.id.to_string(),
            message: e.to_string(),
        })?;
        FlowGraph::build(&flow)?;
        Ok(flow)
    }
}

const TEMPLATES: &[Template] = &[
    Template {
        id: "simple-chat",
        name: "Simple Chat",
        description: "Basic AI chat",
        content: include_str!("../templates/simple-chat.json"),
    },
    Template {
        id: "customer-service",
        name: "Customer Service",
        description: "Refund questions to the support agent, the rest to a handoff reply",
        content: include_str!("../templates/customer-service.json"),
    },
    Template {
        id: "research-assistant",
        name: "Research Assistant",
        description: "Fetch a page, analyze and summarize",
        content: include_str!("../templates/research-assistant.json"),
    },
    Template {
        id: "code-review",
        name: "Code Review",
        description: "Fetched code reviewed by three models with cross evaluation",
        content: include_str!("../templates/code-review.json"),
    },
    Template {
        id: "content-creator",
        name: "Content Creator",
        description: "Social media content picked by vote",
        content: include_str!("../templates/content-creator.json"),
    },
    Template {
        id: "data-analyzer",
        name: "Data Analyzer",
        description: "Calculate, then explain the result",
        content: include_str!("../templates/data-analyzer.json"),
    },
];

/// Every built-in template, in catalog order.
pub fn templates() -> &'static [Template] {
    TEMPLATES
}

pub fn template(id: &str) -> Option<&'static Template> {
    TEMPLATES.iter().find(|t| t.id == id)
}
