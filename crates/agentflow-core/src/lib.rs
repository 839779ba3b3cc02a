pub mod config;
pub mod error;
pub mod flow;
pub mod traits;
pub mod types;

pub use config::AppConfig;
pub use error::{AgentFlowError, Result};
pub use flow::{EdgeDefinition, Flow, NodeDefinition, NodeType};
pub use types::*;
