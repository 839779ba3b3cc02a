pub mod agents;
pub mod dispatch;
pub mod graph;
pub mod store;
pub mod templates;

pub use agents::ProfileAgentResolver;
pub use dispatch::MessageDispatcher;
pub use graph::{
    ExecuteRequest, ExecuteResponse, ExecutionContext, FlowGraph, GraphExecutor, NodeExecution,
    NodeKind,
};
pub use store::{JsonDirFlowStore, MemoryFlowStore};
pub use templates::{template, templates, Template};
