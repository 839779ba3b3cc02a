use std::collections::BTreeMap;

use serde::Deserialize;
use tracing::warn;

use agentflow_core::types::ChatMessage;

use crate::types::{Candidate, ProsCons, Rating, TaskType};

const JUDGE_SYSTEM_PROMPT: &str = "你是一个专业的AI评估专家。请严格评估并给出评分。";

/// Parsed verdict of one judge, ratings rescaled to 0-100.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Judgement {
    pub ratings: BTreeMap<String, Rating>,
    pub pros_cons: BTreeMap<String, ProsCons>,
}

/// Build the judge conversation: every candidate under its label, plus the rubric.
pub fn judge_messages(candidates: &[Candidate], task_type: &TaskType) -> Vec<ChatMessage> {
    let listing: String = candidates
        .iter()
        .map(|c| format!("\n【{}】:\n{}\n", c.label, c.content))
        .collect();

    let prompt = format!(
        r#"你是一个专业的AI评估专家。请评估以下AI模型对某个问题的回答质量。

任务类型: {}

请评估以下每个答案，并给出1-10分的评分（10分最高）：
- 准确性：答案是否正确
- 完整性：是否涵盖所有重要方面
- 清晰度：表达是否清晰易懂
- 创造性：是否有独到见解

需要评估的模型回复：
{}

请只返回JSON，格式如下：
{{"ratings": {{"模型名": {{"accuracy": X, "completeness": X, "clarity": X, "creativity": X, "overall": X}}}}, "pros": {{"模型名": ["优点"]}}, "cons": {{"模型名": ["缺点"]}}}}"#,
        task_type.as_str(),
        listing,
    );

    vec![ChatMessage::system(JUDGE_SYSTEM_PROMPT), ChatMessage::user(prompt)]
}

#[derive(Deserialize)]
struct JudgeResponse {
    #[serde(default)]
    ratings: BTreeMap<String, BTreeMap<String, serde_json::Value>>,
    #[serde(default)]
    pros: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    cons: BTreeMap<String, Vec<String>>,
}

/// Read a 1-10 axis value (number or numeric string) as 0-100.
fn axis(fields: &BTreeMap<String, serde_json::Value>, key: &str) -> Option<f64> {
    let v = fields.get(key)?;
    let n = v.as_f64().or_else(|| v.as_str()?.trim().parse().ok())?;
    Some(n.clamp(0.0, 10.0) * 10.0)
}

/// Parse a judge reply. Entries for unknown labels are ignored.
/// Returns `None` when the reply holds no usable rating.
pub fn parse_judgement(response: &str, known_labels: &[&str]) -> Option<Judgement> {
    let json_str = extract_json(response);
    let parsed: JudgeResponse = match serde_json::from_str(json_str) {
        Ok(p) => p,
        Err(e) => {
            warn!(error = %e, "Failed to parse judge response");
            return None;
        }
    };

    let mut judgement = Judgement::default();
    for (label, fields) in &parsed.ratings {
        if !known_labels.contains(&label.as_str()) {
            continue;
        }
        let mut r = Rating {
            overall_score: 0.0,
            accuracy: axis(fields, "accuracy").unwrap_or(0.0),
            completeness: axis(fields, "completeness").unwrap_or(0.0),
            clarity: axis(fields, "clarity").unwrap_or(0.0),
            creativity: axis(fields, "creativity").unwrap_or(0.0),
        };
        r.overall_score = match axis(fields, "overall") {
            Some(overall) => overall,
            None => r.weighted_overall(),
        };
        judgement.ratings.insert(label.clone(), r);
    }

    for label in known_labels {
        let pros = parsed.pros.get(*label).cloned().unwrap_or_default();
        let cons = parsed.cons.get(*label).cloned().unwrap_or_default();
        if !pros.is_empty() || !cons.is_empty() {
            judgement
                .pros_cons
                .insert(label.to_string(), ProsCons { pros, cons });
        }
    }

    if judgement.ratings.is_empty() {
        None
    } else {
        Some(judgement)
    }
}

/// Average ratings across judges and union their pros/cons (first-seen order).
pub fn merge_judgements(judgements: &[Judgement]) -> Judgement {
    let mut sums: BTreeMap<String, (Rating, usize)> = BTreeMap::new();
    let mut merged = Judgement::default();

    for j in judgements {
        for (label, r) in &j.ratings {
            let (sum, n) = sums.entry(label.clone()).or_default();
            sum.overall_score += r.overall_score;
            sum.accuracy += r.accuracy;
            sum.completeness += r.completeness;
            sum.clarity += r.clarity;
            sum.creativity += r.creativity;
            *n += 1;
        }
        for (label, pc) in &j.pros_cons {
            let entry = merged.pros_cons.entry(label.clone()).or_default();
            for p in &pc.pros {
                if !entry.pros.contains(p) {
                    entry.pros.push(p.clone());
                }
            }
            for c in &pc.cons {
                if !entry.cons.contains(c) {
                    entry.cons.push(c.clone());
                }
            }
        }
    }

    for (label, (sum, n)) in sums {
        let n = n as f64;
        merged.ratings.insert(
            label,
            Rating {
                overall_score: sum.overall_score / n,
                accuracy: sum.accuracy / n,
                completeness: sum.completeness / n,
                clarity: sum.clarity / n,
                creativity: sum.creativity / n,
            },
        );
    }
    merged
}

/// Extract JSON from a response that may contain markdown code fences.
fn extract_json(text: &str) -> &str {
    let trimmed = text.trim();
    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        if let Some(end) = after.find("```") {
            return after[..end].trim();
        }
    }
    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        if let Some(end) = after.find("```") {
            return after[..end].trim();
        }
    }
    if let Some(start) = trimmed.find('{') {
        if let Some(end) = trimmed.rfind('}') {
            return &trimmed[start..=end];
        }
    }
    trimmed
}
