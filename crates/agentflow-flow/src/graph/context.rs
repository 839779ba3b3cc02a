use std::collections::{HashMap, HashSet};

use serde_json::Value;
use tokio::sync::Mutex;

use super::edge::{evaluate_condition, ConditionScope};
use super::executor::{ExecuteRequest, NodeExecution};

/// Per-run state shared by every node of one flow execution.
///
/// All mutable state sits behind one lock. It is only held for local
/// bookkeeping, never across a model or tool call.
pub struct ExecutionContext {
    flow_id: String,
    user_id: String,
    channel_id: String,
    input: String,
    state: Mutex<ContextState>,
}

#[derive(Default)]
struct ContextState {
    output: Option<String>,
    context: serde_json::Map<String, Value>,
    variables: HashMap<String, Value>,
    results: HashMap<String, String>,
    visited: HashSet<String>,
    executions: Vec<NodeExecution>,
}

/// What is left of a context once the run is over.
#[derive(Debug)]
pub struct ContextSnapshot {
    pub output: Option<String>,
    pub executions: Vec<NodeExecution>,
    /// Request context with the run's variables merged over it.
    pub context: serde_json::Map<String, Value>,
}

impl ExecutionContext {
    pub fn new(req: &ExecuteRequest) -> Self {
        Self {
            flow_id: req.flow_id.clone(),
            user_id: req.user_id.clone(),
            channel_id: req.channel_id.clone(),
            input: req.input.clone(),
            state: Mutex::new(ContextState {
                context: req.context.clone(),
                ..ContextState::default()
            }),
        }
    }

    pub fn flow_id(&self) -> &str {
        &self.flow_id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    /// Check and mark a node as visited in one step.
    /// Returns `false` when the node was already visited in this run.
    pub async fn mark_visited(&self, node_id: &str) -> bool {
        self.state.lock().await.visited.insert(node_id.to_string())
    }

    /// Store a completed node: its result, its record and, when
    /// `sets_output`, the run output.
    pub async fn record_success(&self, execution: NodeExecution, sets_output: bool) {
        let mut state = self.state.lock().await;
        state
            .results
            .insert(execution.node_id.clone(), execution.output.clone());
        if sets_output {
            state.output = Some(execution.output.clone());
        }
        state.executions.push(execution);
    }

    /// Store a failed node's record. Results and output are untouched.
    pub async fn record_failure(&self, execution: NodeExecution) {
        self.state.lock().await.executions.push(execution);
    }

    pub async fn set_variable(&self, name: impl Into<String>, value: Value) {
        self.state.lock().await.variables.insert(name.into(), value);
    }

    pub async fn result(&self, node_id: &str) -> Option<String> {
        self.state.lock().await.results.get(node_id).cloned()
    }

    pub async fn output(&self) -> Option<String> {
        self.state.lock().await.output.clone()
    }

    /// Evaluate a condition with `output` as the scope output.
    pub async fn evaluate(&self, expr: &str, output: &str) -> bool {
        let state = self.state.lock().await;
        let scope = ConditionScope {
            input: &self.input,
            output,
            variables: &state.variables,
            context: &state.context,
            results: &state.results,
        };
        evaluate_condition(expr, &scope)
    }

    pub fn into_snapshot(self) -> ContextSnapshot {
        let state = self.state.into_inner();
        let mut context = state.context;
        for (k, v) in state.variables {
            context.insert(k, v);
        }
        ContextSnapshot {
            output: state.output,
            executions: state.executions,
            context,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentflow_core::flow::NodeType;
    use serde_json::json;

    fn request() -> ExecuteRequest {
        let mut context = serde_json::Map::new();
        context.insert("lang".into(), json!("en"));
        ExecuteRequest {
            flow_id: "f1".into(),
            input: "hi".into(),
            user_id: "u1".into(),
            channel_id: "c1".into(),
            context,
        }
    }

    fn exec(node_id: &str, output: &str) -> NodeExecution {
        NodeExecution {
            node_id: node_id.into(),
            node_type: NodeType::Tool,
            input: String::new(),
            output: output.into(),
            error: None,
            duration_ms: 0,
        }
    }

    #[tokio::test]
    async fn test_mark_visited_once() {
        let ctx = ExecutionContext::new(&request());
        assert!(ctx.mark_visited("a").await);
        assert!(!ctx.mark_visited("a").await);
        assert!(ctx.mark_visited("b").await);
    }

    #[tokio::test]
    async fn test_success_writes_result_and_output() {
        let ctx = ExecutionContext::new(&request());
        ctx.record_success(exec("a", "first"), true).await;
        ctx.record_success(exec("b", "second"), true).await;
        ctx.record_success(exec("t", "seed"), false).await;
        assert_eq!(ctx.result("t").await.as_deref(), Some("seed"));
        assert_eq!(ctx.result("a").await.as_deref(), Some("first"));
        assert_eq!(ctx.output().await.as_deref(), Some("second"));

        let mut failed = exec("c", "");
        failed.error = Some("boom".into());
        ctx.record_failure(failed).await;
        assert_eq!(ctx.output().await.as_deref(), Some("second"));
        assert!(ctx.result("c").await.is_none());
    }

    #[tokio::test]
    async fn test_evaluate_sees_state() {
        let ctx = ExecutionContext::new(&request());
        ctx.set_variable("cond", json!(true)).await;
        ctx.record_success(exec("a", "done"), true).await;
        assert!(ctx.evaluate(r#"cond == "true""#, "").await);
        assert!(ctx.evaluate("input contains hi", "").await);
        assert!(ctx.evaluate(r#"results.a == "done""#, "").await);
        assert!(ctx.evaluate(r#"lang == "en""#, "").await);
    }

    #[tokio::test]
    async fn test_snapshot_merges_variables() {
        let ctx = ExecutionContext::new(&request());
        assert_eq!(ctx.user_id(), "u1");
        ctx.set_variable("cond", json!(false)).await;
        ctx.record_success(exec("a", "out"), true).await;
        let snap = ctx.into_snapshot();
        assert_eq!(snap.output.as_deref(), Some("out"));
        assert_eq!(snap.executions.len(), 1);
        assert_eq!(snap.context["lang"], "en");
        assert_eq!(snap.context["cond"], false);
    }
}
