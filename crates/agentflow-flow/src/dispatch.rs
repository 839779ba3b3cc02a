use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use agentflow_core::error::{AgentFlowError, Result};
use agentflow_core::traits::MessageChannel;
use agentflow_core::types::InboundMessage;

use crate::graph::{ExecuteRequest, GraphExecutor};

/// Routes inbound channel messages through one flow and sends the reply back.
pub struct MessageDispatcher {
    executor: Arc<GraphExecutor>,
    channel: Arc<dyn MessageChannel>,
    flow_id: String,
}

impl MessageDispatcher {
    pub fn new(
        executor: Arc<GraphExecutor>,
        channel: Arc<dyn MessageChannel>,
        flow_id: impl Into<String>,
    ) -> Self {
        Self {
            executor,
            channel,
            flow_id: flow_id.into(),
        }
    }

    /// Execute the flow for `msg` and send the result to the sender.
    ///
    /// Execution errors, and runs where every node past the trigger failed,
    /// are sent back as a short error reply; only a failed send or
    /// cancellation is returned as an error. Returns the text sent.
    pub async fn dispatch(&self, cancel: &CancellationToken, msg: InboundMessage) -> Result<String> {
        let req = ExecuteRequest::new(&self.flow_id, msg.content)
            .with_user(msg.user_id.clone(), msg.channel_id.clone());

        let reply = match self.executor.execute(cancel, req).await {
            Ok(resp) if resp.answered() => resp.output,
            Ok(resp) => match { let first = resp.failures().next(); first } {
                Some(failed) => {
                    warn!(
                        flow_id = %self.flow_id,
                        user_id = %msg.user_id,
                        node_id = %failed.node_id,
                        error = failed.error.as_deref().unwrap_or_default(),
                        "Flow finished without an answer"
                    );
                    format!(
                        "Sorry, something went wrong: node {} failed: {}",
                        failed.node_id,
                        failed.error.as_deref().unwrap_or_default()
                    )
                }
                None => resp.output,
            },
            Err(AgentFlowError::Cancelled) => return Err(AgentFlowError::Cancelled),
            Err(e) => {
                warn!(
                    flow_id = %self.flow_id,
                    user_id = %msg.user_id,
                    error = %e,
                    "Flow execution failed"
                );
                format!("Sorry, something went wrong: {}", e)
            }
        };

        self.channel.send(&msg.user_id, &reply).await?;
        info!(
            channel = %self.channel.name(),
            user_id = %msg.user_id,
            chars = reply.chars().count(),
            "Reply sent"
        );
        Ok(reply)
    }
}
