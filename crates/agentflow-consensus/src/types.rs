use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use agentflow_core::types::ChatMessage;

/// Scoring strategy. Unknown names fall back to `Comprehensive`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum VotingMethod {
    Length,
    Cross,
    #[default]
    Comprehensive,
}

impl VotingMethod {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "length" => VotingMethod::Length,
            "cross" | "交叉评估" => VotingMethod::Cross,
            _ => VotingMethod::Comprehensive,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VotingMethod::Length => "length",
            VotingMethod::Cross => "cross",
            VotingMethod::Comprehensive => "comprehensive",
        }
    }
}

impl From<String> for VotingMethod {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<VotingMethod> for String {
    fn from(m: VotingMethod) -> Self {
        m.as_str().to_string()
    }
}

impl fmt::Display for VotingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task category used to weight rating axes.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TaskType {
    /// Boosts accuracy and completeness.
    Decision,
    /// Boosts creativity.
    Creation,
    /// Boosts completeness and clarity.
    Analysis,
    #[default]
    General,
    Other(String),
}

impl TaskType {
    pub fn parse(s: &str) -> Self {
        match s.trim() {
            "decision" => TaskType::Decision,
            "creation" => TaskType::Creation,
            "analysis" => TaskType::Analysis,
            "" | "general" => TaskType::General,
            other => TaskType::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            TaskType::Decision => "decision",
            TaskType::Creation => "creation",
            TaskType::Analysis => "analysis",
            TaskType::General => "general",
            TaskType::Other(s) => s,
        }
    }
}

impl From<String> for TaskType {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<TaskType> for String {
    fn from(t: TaskType) -> Self {
        t.as_str().to_string()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VoteRequest {
    pub models: Vec<String>,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub task_type: TaskType,
    #[serde(default)]
    pub voting_method: VotingMethod,
}

impl VoteRequest {
    pub fn new(models: Vec<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            models,
            messages,
            ..Default::default()
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_method(mut self, method: VotingMethod) -> Self {
        self.voting_method = method;
        self
    }

    pub fn with_task_type(mut self, task_type: TaskType) -> Self {
        self.task_type = task_type;
        self
    }
}

/// Four-axis rating on a 0-100 scale.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    pub overall_score: f64,
    pub accuracy: f64,
    pub completeness: f64,
    pub clarity: f64,
    pub creativity: f64,
}

impl Rating {
    pub fn uniform(score: f64) -> Self {
        Self {
            overall_score: score,
            accuracy: score,
            completeness: score,
            clarity: score,
            creativity: score,
        }
    }

    /// Weighted overall: 0.3 accuracy, 0.3 completeness, 0.2 clarity, 0.2 creativity.
    pub fn weighted_overall(&self) -> f64 {
        self.accuracy * 0.3 + self.completeness * 0.3 + self.clarity * 0.2 + self.creativity * 0.2
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProsCons {
    pub pros: Vec<String>,
    pub cons: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub task_type: TaskType,
    pub voting_method: VotingMethod,
    pub winner_reason: String,
    pub model_ratings: BTreeMap<String, Rating>,
    pub pros_cons: BTreeMap<String, ProsCons>,
}

/// One successful response entering scoring.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// Response key: the model name, or `<model>_<style>` for single-model samples.
    pub label: String,
    /// Model that produced the response.
    pub model: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub label: String,
    pub model: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteResponse {
    /// Every response slot: content, or an `[Error: ...]` marker.
    pub responses: BTreeMap<String, String>,
    pub winner: String,
    /// Model behind the winning label.
    pub winner_model: String,
    pub winner_content: String,
    /// Scores of successful candidates only.
    pub scores: BTreeMap<String, f64>,
    /// Candidates by score descending, ties in request order.
    pub ranking: Vec<ScoredCandidate>,
    pub evaluation: Evaluation,
}

/// Marker stored in a response slot for a failed call.
pub fn error_marker(reason: impl fmt::Display) -> String {
    format!("[Error: {}]", reason)
}

pub fn is_error_marker(content: &str) -> bool {
    content.starts_with("[Error:")
}
