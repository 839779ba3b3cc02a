use std::io::Write;

use serde_json::json;

use agentflow_core::flow::{EdgeDefinition, Flow, NodeDefinition, NodeType};

/// Trigger followed by `tools.len()` tool nodes in a chain.
///
/// Node ids are `trigger`, then each tool name.
pub fn linear_flow(id: &str, tools: &[&str]) -> Flow {
    let mut flow = Flow::new(id, format!("{} (linear)", id)).with_node(NodeDefinition::new(
        "trigger",
        NodeType::Trigger,
        json!({"triggerType": "message"}),
    ));
    let mut prev = "trigger".to_string();
    for (i, tool) in tools.iter().enumerate() {
        flow = flow
            .with_node(NodeDefinition::new(
                *tool,
                NodeType::Tool,
                json!({"toolName": tool}),
            ))
            .with_edge(EdgeDefinition::new(format!("e{}", i), prev.as_str(), *tool));
        prev = tool.to_string();
    }
    flow
}

/// `trigger -> left, trigger -> right, left -> join, right -> join`,
/// all tool nodes named after their id.
pub fn diamond_flow(id: &str) -> Flow {
    let tool = |name: &str| NodeDefinition::new(name, NodeType::Tool, json!({"toolName": name}));
    Flow::new(id, "diamond")
        .with_node(NodeDefinition::new(
            "trigger",
            NodeType::Trigger,
            json!({"triggerType": "message"}),
        ))
        .with_node(tool("left"))
        .with_node(tool("right"))
        .with_node(tool("join"))
        .with_edge(EdgeDefinition::new("e1", "trigger", "left"))
        .with_edge(EdgeDefinition::new("e2", "trigger", "right"))
        .with_edge(EdgeDefinition::new("e3", "left", "join"))
        .with_edge(EdgeDefinition::new("e4", "right", "join"))
}

/// Write a TOML config to a temp file that lives as long as the handle.
pub fn temp_config(content: &str) -> tempfile::NamedTempFile {
    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(content.as_bytes()).expect("write config");
    tmp
}
