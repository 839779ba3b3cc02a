use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use futures::future::BoxFuture;

use agentflow_core::config::ModelConfig;
use agentflow_core::error::{AgentFlowError, Result};
use agentflow_core::traits::ProviderClient;
use agentflow_core::types::{ChatRequest, ChatResponse};

#[derive(Debug, Clone)]
enum Outcome {
    Reply(String),
    Fail(String),
}

#[derive(Default)]
struct Script {
    queue: VecDeque<Outcome>,
    /// Returned once the queue is drained.
    last: Option<Outcome>,
    delay: Option<Duration>,
}

/// Scripted provider keyed by the request's model name.
///
/// Each model has a queue of outcomes; the final outcome repeats forever.
/// Unscripted models fail with `HTTP 404`. Every request is recorded.
#[derive(Default)]
pub struct MockProvider {
    scripts: Mutex<HashMap<String, Script>>,
    calls: Mutex<Vec<ChatRequest>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(self, model: &str, outcome: Outcome) -> Self {
        if let Ok(mut scripts) = self.scripts.lock() {
            let script = scripts.entry(model.to_string()).or_default();
            script.queue.push_back(outcome.clone());
            script.last = Some(outcome);
        }
        self
    }

    pub fn with_reply(self, model: &str, content: impl Into<String>) -> Self {
        self.push(model, Outcome::Reply(content.into()))
    }

    pub fn with_failure(self, model: &str, message: impl Into<String>) -> Self {
        self.push(model, Outcome::Fail(message.into()))
    }

    pub fn with_failures_then_reply(
        mut self,
        model: &str,
        failures: usize,
        message: &str,
        content: &str,
    ) -> Self {
        for _ in 0..failures {
            self = self.push(model, Outcome::Fail(message.to_string()));
        }
        self.with_reply(model, content)
    }

    pub fn with_delay(self, model: &str, delay: Duration) -> Self {
        if let Ok(mut scripts) = self.scripts.lock() {
            scripts.entry(model.to_string()).or_default().delay = Some(delay);
        }
        self
    }

    /// Requests received so far, in arrival order.
    pub fn calls(&self) -> Vec<ChatRequest> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Requests received for one model.
    pub fn calls_for(&self, model: &str) -> Vec<ChatRequest> {
        self.calls()
            .into_iter()
            .filter(|c| c.model == model)
            .collect()
    }

    fn next_outcome(&self, model: &str) -> (Option<Outcome>, Option<Duration>) {
        let Ok(mut scripts) = self.scripts.lock() else {
            return (None, None);
        };
        match scripts.get_mut(model) {
            Some(script) => {
                let outcome = script.queue.pop_front().or_else(|| script.last.clone());
                (outcome, script.delay)
            }
            None => (None, None),
        }
    }
}

impl ProviderClient for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn chat(&self, _config: &ModelConfig, request: ChatRequest) -> BoxFuture<'_, Result<ChatResponse>> {
        Box::pin(async move {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(request.clone());
            }
            let (outcome, delay) = self.next_outcome(&request.model);
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            match outcome {
                Some(Outcome::Reply(content)) => Ok(ChatResponse::text(content)),
                Some(Outcome::Fail(message)) => Err(AgentFlowError::Provider {
                    model: request.model,
                    message,
                }),
                None => Err(AgentFlowError::Provider {
                    model: request.model,
                    message: "HTTP 404: model not scripted".into(),
                }),
            }
        })
    }
}
