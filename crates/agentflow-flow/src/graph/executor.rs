use std::sync::Arc;
use std::time::Instant;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use agentflow_consensus::{ConsensusEngine, TaskType, VoteRequest, VotingMethod};
use agentflow_core::config::ExecutorConfig;
use agentflow_core::error::{AgentFlowError, Result};
use agentflow_core::flow::NodeType;
use agentflow_core::traits::{AgentResolver, FlowStore, ToolExecutor};
use agentflow_core::types::ChatMessage;
use agentflow_llm::{InvokeOptions, ModelRegistry};

use super::context::ExecutionContext;
use super::node::{AgentNodeConfig, FlowNode, LlmNodeConfig, NodeKind, ToolNodeConfig, TriggerType};
use super::FlowGraph;

const LLM_INPUT_SEPARATOR: &str = "\n\n输入: ";
const AGENT_CONTEXT_HEADER: &str = "\n\n相关背景信息:\n";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub flow_id: String,
    #[serde(default)]
    pub input: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub channel_id: String,
    #[serde(default)]
    pub context: serde_json::Map<String, serde_json::Value>,
}

impl ExecuteRequest {
    pub fn new(flow_id: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            flow_id: flow_id.into(),
            input: input.into(),
            ..Self::default()
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>, channel_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self.channel_id = channel_id.into();
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteResponse {
    pub flow_id: String,
    pub output: String,
    pub nodes_exec: Vec<NodeExecution>,
    pub context: serde_json::Map<String, serde_json::Value>,
}

impl ExecuteResponse {
    /// Records of nodes that failed.
    pub fn failures(&self) -> impl Iterator<Item = &NodeExecution> {
        self.nodes_exec.iter().filter(|e| e.error.is_some())
    }

    /// Whether some node past the triggers succeeded.
    pub fn answered(&self) -> bool {
        self.nodes_exec
            .iter()
            .any(|e| e.error.is_none() && e.node_type != NodeType::Trigger)
    }
}

/// Record of one node run, in traversal order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeExecution {
    pub node_id: String,
    pub node_type: NodeType,
    pub input: String,
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

/// Executes stored flows.
///
/// Traversal is depth-first and sequential within a run: from each trigger,
/// a node runs, its output is recorded, and every outgoing edge whose
/// condition holds is followed with that output as the next input. A node
/// runs at most once per run; later arrivals are skipped. A failed node
/// prunes its subtree while the rest of the run continues.
///
/// The flow output is the output of the last non-trigger node to succeed,
/// or the trigger output when none did. Failed nodes stay in the response
/// with their error; only a run with no successful node fails with
/// `NoOutput`.
pub struct GraphExecutor {
    store: Arc<dyn FlowStore>,
    registry: Arc<ModelRegistry>,
    consensus: Arc<ConsensusEngine>,
    agents: Arc<dyn AgentResolver>,
    tools: Arc<dyn ToolExecutor>,
    config: ExecutorConfig,
}

impl GraphExecutor {
    pub fn new(
        store: Arc<dyn FlowStore>,
        consensus: Arc<ConsensusEngine>,
        agents: Arc<dyn AgentResolver>,
        tools: Arc<dyn ToolExecutor>,
    ) -> Self {
        Self {
            store,
            registry: consensus.registry().clone(),
            consensus,
            agents,
            tools,
            config: ExecutorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    pub async fn execute(
        &self,
        cancel: &CancellationToken,
        req: ExecuteRequest,
    ) -> Result<ExecuteResponse> {
        let start = Instant::now();

        let flow = self
            .store
            .get_flow(&req.flow_id)
            .await?
            .ok_or_else(|| AgentFlowError::FlowNotFound(req.flow_id.clone()))?;
        if !flow.enabled {
            return Err(AgentFlowError::FlowDisabled(flow.id));
        }

        let graph = FlowGraph::build(&flow)?;
        if graph.triggers().is_empty() {
            return Err(AgentFlowError::NoTriggerNode(flow.id));
        }

        let ctx = ExecutionContext::new(&req);
        info!(
            flow_id = %ctx.flow_id(),
            user_id = %ctx.user_id(),
            channel_id = %ctx.channel_id(),
            nodes = graph.len(),
            triggers = graph.triggers().len(),
            "Executing flow"
        );

        for trigger in graph.triggers() {
            self.visit(cancel, &graph, &ctx, trigger, ctx.input().to_string())
                .await?;
        }

        let snapshot = ctx.into_snapshot();
        let elapsed_ms = start.elapsed().as_millis() as u64;
        let failed = snapshot.executions.iter().filter(|e| e.error.is_some()).count();

        // Fall back to the last trigger output when no other node succeeded.
        let Some(output) = snapshot.output.or_else(|| {
            snapshot
                .executions
                .iter()
                .rev()
                .find(|e| e.error.is_none())
                .map(|e| e.output.clone())
        }) else {
            warn!(flow_id = %req.flow_id, failed, elapsed_ms, "Flow produced no output");
            return Err(AgentFlowError::NoOutput(req.flow_id));
        };

        if failed > 0 {
            warn!(
                flow_id = %req.flow_id,
                executed = snapshot.executions.len(),
                failed,
                elapsed_ms,
                "Flow completed with failed nodes"
            );
        } else {
            info!(
                flow_id = %req.flow_id,
                executed = snapshot.executions.len(),
                elapsed_ms,
                "Flow complete"
            );
        }

        Ok(ExecuteResponse {
            flow_id: req.flow_id,
            output,
            nodes_exec: snapshot.executions,
            context: snapshot.context,
        })
    }

    /// Run one node and recurse into eligible children.
    /// Only cancellation is returned as an error; node failures are recorded.
    fn visit<'a>(
        &'a self,
        cancel: &'a CancellationToken,
        graph: &'a FlowGraph,
        ctx: &'a ExecutionContext,
        node_id: &'a str,
        input: String,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if cancel.is_cancelled() {
                return Err(AgentFlowError::Cancelled);
            }
            let Some(node) = graph.node(node_id) else {
                return Ok(());
            };
            if !ctx.mark_visited(node_id).await {
                debug!(node_id = %node_id, "Node already executed in this run, skipping");
                return Ok(());
            }

            debug!(node_id = %node_id, node_type = %node.node_type(), "Executing node");
            let start = Instant::now();
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(AgentFlowError::Cancelled),
                r = self.run_node(cancel, ctx, node, &input) => r,
            };
            let duration_ms = start.elapsed().as_millis() as u64;

            let output = match result {
                Ok(output) => output,
                Err(AgentFlowError::Cancelled) => return Err(AgentFlowError::Cancelled),
                Err(e) => {
                    error!(node_id = %node_id, error = %e, duration_ms, "Node failed");
                    ctx.record_failure(NodeExecution {
                        node_id: node.id.clone(),
                        node_type: node.node_type(),
                        input,
                        output: String::new(),
                        error: Some(e.to_string()),
                        duration_ms,
                    })
                    .await;
                    return Ok(());
                }
            };

            debug!(node_id = %node_id, duration_ms, "Node complete");
            // Triggers only seed the run; they never become the flow output.
            let sets_output = !matches!(node.kind, NodeKind::Trigger(_));
            ctx.record_success(
                NodeExecution {
                    node_id: node.id.clone(),
                    node_type: node.node_type(),
                    input,
                    output: output.clone(),
                    error: None,
                    duration_ms,
                },
                sets_output,
            )
            .await;

            for link in graph.outgoing(node_id) {
                let follow = match &link.condition {
                    None => true,
                    Some(expr) => ctx.evaluate(expr, &output).await,
                };
                if follow {
                    self.visit(cancel, graph, ctx, &link.target, output.clone())
                        .await?;
                } else {
                    debug!(edge_id = %link.edge_id, target = %link.target, "Edge condition false");
                }
            }
            Ok(())
        })
    }

    async fn run_node(
        &self,
        cancel: &CancellationToken,
        ctx: &ExecutionContext,
        node: &FlowNode,
        input: &str,
    ) -> Result<String> {
        match &node.kind {
            NodeKind::Trigger(cfg) => Ok(match cfg.trigger_type {
                TriggerType::Message => input.to_string(),
                TriggerType::Schedule => "triggered".to_string(),
                TriggerType::Webhook => "webhook triggered".to_string(),
            }),
            NodeKind::Llm(cfg) => self.run_llm(cancel, cfg, input).await,
            NodeKind::Agent(cfg) => self.run_agent(cancel, cfg, input).await,
            NodeKind::Tool(cfg) => self.run_tool(cfg, input).await,
            NodeKind::Condition(cfg) => {
                let passed = ctx.evaluate(&cfg.condition, input).await;
                ctx.set_variable(node.id.clone(), serde_json::Value::Bool(passed))
                    .await;
                Ok(passed.to_string())
            }
        }
    }

    async fn run_llm(
        &self,
        cancel: &CancellationToken,
        cfg: &LlmNodeConfig,
        input: &str,
    ) -> Result<String> {
        let preferred = non_empty(cfg.model.as_deref())
            .or(non_empty(self.config.default_model.as_deref()))
            .unwrap_or("");
        let model = self.registry.resolve_for_use(preferred).await?;

        let system = non_empty(cfg.system_prompt.as_deref())
            .unwrap_or(self.config.llm_system_prompt.as_str())
            .to_string();
        let prompt = format!("{}{}{}", cfg.prompt, LLM_INPUT_SEPARATOR, input);

        let resp = self
            .registry
            .invoke(
                cancel,
                &model,
                vec![ChatMessage::system(system), ChatMessage::user(prompt)],
                InvokeOptions::default(),
            )
            .await?;
        Ok(resp.content)
    }

    async fn run_agent(
        &self,
        cancel: &CancellationToken,
        cfg: &AgentNodeConfig,
        input: &str,
    ) -> Result<String> {
        let profile = self
            .agents
            .resolve(non_empty(cfg.agent_id.as_deref()), input)
            .await?;

        let mut system = non_empty(profile.system_prompt.as_deref())
            .unwrap_or(self.config.agent_system_prompt.as_str())
            .to_string();
        if let Some(context) = profile.context.as_deref().filter(|c| !c.trim().is_empty()) {
            system.push_str(AGENT_CONTEXT_HEADER);
            system.push_str(context);
        }

        let vote_models = if cfg.models.len() >= 2 {
            &cfg.models
        } else {
            &profile.vote_models
        };
        if vote_models.len() >= 2 {
            let method = non_empty(cfg.voting_method.as_deref())
                .or(non_empty(profile.voting_method.as_deref()))
                .map(VotingMethod::parse)
                .unwrap_or_default();
            let task_type = cfg
                .task_type
                .as_deref()
                .map(TaskType::parse)
                .unwrap_or_default();
            debug!(agent = %profile.id, models = ?vote_models, method = %method, "Agent voting");

            let req = VoteRequest::new(vote_models.clone(), vec![ChatMessage::user(input)])
                .with_system_prompt(system)
                .with_method(method)
                .with_task_type(task_type);
            let resp = self.consensus.vote(cancel, req).await?;
            return Ok(resp.winner_content);
        }

        let preferred = non_empty(cfg.model.as_deref())
            .or(cfg.models.first().map(String::as_str))
            .or(non_empty(profile.model.as_deref()))
            .or(non_empty(self.config.default_model.as_deref()))
            .unwrap_or("");
        let model = self.registry.resolve_for_use(preferred).await?;
        debug!(agent = %profile.id, model = %model, "Agent invoking model");

        let resp = self
            .registry
            .invoke(
                cancel,
                &model,
                vec![ChatMessage::system(system), ChatMessage::user(input)],
                InvokeOptions::default(),
            )
            .await?;
        Ok(resp.content)
    }

    async fn run_tool(&self, cfg: &ToolNodeConfig, input: &str) -> Result<String> {
        let mut params = cfg.params.clone();
        params.insert("input".into(), serde_json::Value::String(input.to_string()));
        debug!(tool = %cfg.tool_name, tool_type = ?cfg.tool_type, "Calling tool");
        self.tools
            .execute(&cfg.tool_name, serde_json::Value::Object(params))
            .await
    }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.filter(|s| !s.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_json_field_names() {
        let resp = ExecuteResponse {
            flow_id: "f1".into(),
            output: "done".into(),
            nodes_exec: vec![NodeExecution {
                node_id: "t".into(),
                node_type: NodeType::Trigger,
                input: "hi".into(),
                output: "hi".into(),
                error: None,
                duration_ms: 3,
            }],
            context: serde_json::Map::new(),
        };
        let v = serde_json::to_value(&resp).unwrap();
        assert_eq!(v["flow_id"], "f1");
        assert_eq!(v["nodes_exec"][0]["node_type"], "trigger");
        assert_eq!(v["nodes_exec"][0]["duration_ms"], 3);
        assert!(v["nodes_exec"][0].get("error").is_none());
    }

    #[test]
    fn test_request_defaults() {
        let req: ExecuteRequest = serde_json::from_str(r#"{"flow_id": "f1"}"#).unwrap();
        assert_eq!(req, ExecuteRequest::new("f1", ""));
        let req = ExecuteRequest::new("f1", "hi")
            .with_user("u1", "telegram")
            .with_context("lang", serde_json::json!("zh"));
        assert_eq!(req.channel_id, "telegram");
        assert_eq!(req.context["lang"], "zh");
    }

    #[test]
    fn test_response_failures_and_answered() {
        let record = |id: &str, node_type: NodeType, error: Option<&str>| NodeExecution {
            node_id: id.into(),
            node_type,
            input: "x".into(),
            output: String::new(),
            error: error.map(String::from),
            duration_ms: 0,
        };
        let mut resp = ExecuteResponse {
            flow_id: "f1".into(),
            output: "x".into(),
            nodes_exec: vec![
                record("t", NodeType::Trigger, None),
                record("bad", NodeType::Tool, Some("boom")),
            ],
            context: serde_json::Map::new(),
        };
        assert!(!resp.answered());
        let failed: Vec<_> = resp.failures().map(|e| e.node_id.as_str()).collect();
        assert_eq!(failed, vec!["bad"]);

        resp.nodes_exec.push(record("good", NodeType::Llm, None));
        assert!(resp.answered());
    }
}
