use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use agentflow_core::config::ConsensusConfig;
use agentflow_core::error::{AgentFlowError, Result};
use agentflow_core::types::ChatMessage;
use agentflow_llm::{InvokeOptions, ModelRegistry};

use crate::judge::{judge_messages, merge_judgements, parse_judgement};
use crate::scoring;
use crate::types::*;

const SAMPLE_STYLES: &[&str] = &["conservative", "balanced", "creative"];

/// Fans a prompt out to several models and selects the best answer.
///
/// Each vote issues one concurrent call per candidate model, each bounded
/// by the shared per-call timeout and the caller's cancellation token.
/// Failed calls become `[Error: ...]` slots and never abort the vote
/// unless no candidate succeeds.
pub struct ConsensusEngine {
    registry: Arc<ModelRegistry>,
    config: ConsensusConfig,
}

impl ConsensusEngine {
    pub fn new(registry: Arc<ModelRegistry>, config: ConsensusConfig) -> Self {
        Self { registry, config }
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    pub async fn vote(&self, cancel: &CancellationToken, req: VoteRequest) -> Result<VoteResponse> {
        if req.models.is_empty() {
            return Err(AgentFlowError::NoModelsSpecified);
        }

        let mut requested: Vec<String> = Vec::with_capacity(req.models.len());
        for model in &req.models {
            if !requested.contains(model) {
                requested.push(model.clone());
            }
        }

        let mut available = Vec::with_capacity(requested.len());
        for model in requested {
            if self.registry.is_available(&model).await {
                available.push(model);
            } else {
                debug!(model = %model, "Skipping model without credentials");
            }
        }
        if available.is_empty() {
            return Err(AgentFlowError::NoAvailableModels);
        }

        let start = Instant::now();
        let messages = build_messages(&req);
        let mut responses: BTreeMap<String, String> = BTreeMap::new();

        let candidates = if available.len() == 1 {
            self.single_model_consensus(cancel, &available[0], &messages, &mut responses)
                .await?
        } else {
            let results = join_all(
                available
                    .iter()
                    .map(|m| self.call_model(cancel, m, messages.clone(), InvokeOptions::default())),
            )
            .await;
            check_cancelled(cancel)?;

            let mut succeeded = Vec::new();
            let mut failures = Vec::new();
            for (model, result) in available.iter().zip(results) {
                match result {
                    Ok(content) => {
                        responses.insert(model.clone(), content.clone());
                        succeeded.push(Candidate {
                            label: model.clone(),
                            model: model.clone(),
                            content,
                        });
                    }
                    Err(e) => {
                        warn!(model = %model, error = %e, "Vote candidate failed");
                        failures.push(format!("{}: {}", model, e));
                        responses.insert(model.clone(), error_marker(&e));
                    }
                }
            }

            match succeeded.len() {
                0 => return Err(AgentFlowError::AllModelsFailed(failures.join("; "))),
                1 => {
                    // Replace the lone answer with temperature-diverse samples.
                    let model = succeeded[0].model.clone();
                    responses.remove(&model);
                    self.single_model_consensus(cancel, &model, &messages, &mut responses)
                        .await?
                }
                _ => succeeded,
            }
        };

        let (scores, evaluation) = self.score(cancel, &candidates, &req).await?;

        let mut ranking: Vec<ScoredCandidate> = candidates
            .iter()
            .zip(&scores)
            .map(|(c, score)| ScoredCandidate {
                label: c.label.clone(),
                model: c.model.clone(),
                score: *score,
            })
            .collect();
        // Stable sort: equal scores keep candidate (request) order.
        ranking.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

        let best = ranking
            .first()
            .cloned()
            .ok_or_else(|| AgentFlowError::AllModelsFailed("no candidates to score".into()))?;
        let winner_content = responses.get(&best.label).cloned().unwrap_or_default();

        info!(
            winner = %best.label,
            score = best.score,
            method = %req.voting_method,
            candidates = ranking.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Vote complete"
        );

        Ok(VoteResponse {
            responses,
            winner: best.label.clone(),
            winner_model: best.model.clone(),
            winner_content,
            scores: ranking.iter().map(|s| (s.label.clone(), s.score)).collect(),
            ranking,
            evaluation,
        })
    }

    async fn call_model(
        &self,
        cancel: &CancellationToken,
        model: &str,
        messages: Vec<ChatMessage>,
        options: InvokeOptions,
    ) -> Result<String> {
        let timeout_secs = self.config.timeout_secs;
        let call = self.registry.invoke(cancel, model, messages, options);
        match tokio::time::timeout(Duration::from_secs(timeout_secs), call).await {
            Ok(result) => result.map(|r| r.content),
            Err(_) => Err(AgentFlowError::Timeout {
                model: model.to_string(),
                timeout_secs,
            }),
        }
    }

    /// Sample one model at several temperatures, labelled `<model>_<style>`.
    async fn single_model_consensus(
        &self,
        cancel: &CancellationToken,
        model: &str,
        messages: &[ChatMessage],
        responses: &mut BTreeMap<String, String>,
    ) -> Result<Vec<Candidate>> {
        let samples: Vec<(String, f32)> = self
            .config
            .single_model_temperatures
            .iter()
            .enumerate()
            .map(|(i, t)| {
                let style = SAMPLE_STYLES
                    .get(i)
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| format!("sample{}", i + 1));
                (format!("{}_{}", model, style), *t)
            })
            .collect();

        debug!(model = %model, samples = samples.len(), "Running single-model consensus");

        let results = join_all(samples.iter().map(|(_, t)| {
            self.call_model(cancel, model, messages.to_vec(), InvokeOptions::with_temperature(*t))
        }))
        .await;
        check_cancelled(cancel)?;

        let mut candidates = Vec::new();
        let mut failures = Vec::new();
        for ((label, _), result) in samples.into_iter().zip(results) {
            match result {
                Ok(content) => {
                    responses.insert(label.clone(), content.clone());
                    candidates.push(Candidate {
                        label,
                        model: model.to_string(),
                        content,
                    });
                }
                Err(e) => {
                    warn!(label = %label, error = %e, "Single-model sample failed");
                    failures.push(format!("{}: {}", label, e));
                    responses.insert(label, error_marker(&e));
                }
            }
        }

        if candidates.is_empty() {
            return Err(AgentFlowError::AllModelsFailed(failures.join("; ")));
        }
        Ok(candidates)
    }

    /// Scores aligned with `candidates`, plus the evaluation breakdown.
    async fn score(
        &self,
        cancel: &CancellationToken,
        candidates: &[Candidate],
        req: &VoteRequest,
    ) -> Result<(Vec<f64>, Evaluation)> {
        let mut ratings = BTreeMap::new();
        let mut pros_cons = BTreeMap::new();

        let scores = match req.voting_method {
            VotingMethod::Length => {
                for c in candidates {
                    ratings.insert(c.label.clone(), scoring::basic_rating(&c.content));
                    pros_cons.insert(c.label.clone(), scoring::pros_cons(&c.content));
                }
                scoring::length_scores(candidates)
            }
            VotingMethod::Comprehensive => candidates
                .iter()
                .map(|c| {
                    let r = scoring::comprehensive_rating(&c.content, &req.task_type);
                    ratings.insert(c.label.clone(), r);
                    pros_cons.insert(c.label.clone(), scoring::pros_cons(&c.content));
                    r.overall_score
                })
                .collect(),
            VotingMethod::Cross => {
                let merged = self.cross_evaluate(cancel, candidates, &req.task_type).await?;
                candidates
                    .iter()
                    .map(|c| {
                        let r = merged.ratings.get(&c.label).copied().unwrap_or_else(|| {
                            debug!(label = %c.label, "No judge rated candidate, using heuristic");
                            scoring::comprehensive_rating(&c.content, &req.task_type)
                        });
                        let pc = merged
                            .pros_cons
                            .get(&c.label)
                            .cloned()
                            .unwrap_or_else(|| scoring::pros_cons(&c.content));
                        ratings.insert(c.label.clone(), r);
                        pros_cons.insert(c.label.clone(), pc);
                        r.overall_score
                    })
                    .collect()
            }
        };

        let winner_reason = winner_reason(candidates, &scores, &pros_cons);
        Ok((
            scores,
            Evaluation {
                task_type: req.task_type.clone(),
                voting_method: req.voting_method,
                winner_reason,
                model_ratings: ratings,
                pros_cons,
            },
        ))
    }

    /// Every distinct source model judges all candidates concurrently.
    /// Judges that fail or return unusable output are skipped.
    async fn cross_evaluate(
        &self,
        cancel: &CancellationToken,
        candidates: &[Candidate],
        task_type: &TaskType,
    ) -> Result<crate::judge::Judgement> {
        let mut judges: Vec<&str> = Vec::new();
        for c in candidates {
            if !judges.contains(&c.model.as_str()) {
                judges.push(&c.model);
            }
        }
        let labels: Vec<&str> = candidates.iter().map(|c| c.label.as_str()).collect();
        let messages = judge_messages(candidates, task_type);

        let replies = join_all(judges.iter().map(|judge| {
            self.call_model(cancel, judge, messages.clone(), InvokeOptions::default())
        }))
        .await;
        check_cancelled(cancel)?;

        let mut judgements = Vec::new();
        for (judge, reply) in judges.iter().zip(replies) {
            match reply {
                Ok(text) => match parse_judgement(&text, &labels) {
                    Some(j) => judgements.push(j),
                    None => warn!(judge = %judge, "Judge reply had no usable ratings"),
                },
                Err(e) => warn!(judge = %judge, error = %e, "Judge call failed"),
            }
        }
        Ok(merge_judgements(&judgements))
    }
}

fn build_messages(req: &VoteRequest) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(req.messages.len() + 1);
    if let Some(prompt) = req.system_prompt.as_deref().filter(|p| !p.is_empty()) {
        messages.push(ChatMessage::system(prompt));
    }
    messages.extend(req.messages.iter().cloned());
    messages
}

fn check_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(AgentFlowError::Cancelled)
    } else {
        Ok(())
    }
}

fn winner_reason(
    candidates: &[Candidate],
    scores: &[f64],
    pros_cons: &BTreeMap<String, ProsCons>,
) -> String {
    let mut best: Option<(&Candidate, f64)> = None;
    for (c, s) in candidates.iter().zip(scores) {
        if best.map_or(true, |(_, b)| *s > b) {
            best = Some((c, *s));
        }
    }
    let Some((c, score)) = best else {
        return String::new();
    };
    let mut reason = format!("{} scored {:.1}", c.label, score);
    if let Some(pro) = pros_cons.get(&c.label).and_then(|pc| pc.pros.first()) {
        reason.push_str(&format!(", strength: {}", pro));
    }
    reason
}
