//! Shared mocks and fixtures for AgentFlow tests.

pub mod collaborators;
pub mod fixtures;
pub mod provider;

pub use collaborators::{MockToolExecutor, RecordingChannel, StaticAgentResolver};
pub use fixtures::{diamond_flow, linear_flow, temp_config};
pub use provider::MockProvider;
