//! Deterministic text heuristics used by the `length` and `comprehensive`
//! strategies, and as the fallback for candidates no judge rated.
//!
//! Lengths are counted in characters so CJK and Latin text compare fairly.

use crate::types::{Candidate, ProsCons, Rating, TaskType};

const BASE_AXIS: f64 = 70.0;

const HEDGES: &[&str] = &["错误", "不确定", "not sure", "uncertain"];
const ENUMERATION_ZH: &[&str] = &["第一", "第二", "第三"];
const ENUMERATION_EN: &[&str] = &["first", "second", "third"];
const SEQUENCING: &[&str] = &["首先", "其次", "firstly", "secondly"];
const CONTRAST: &[&str] = &["但是", "然而", "however", "on the other hand"];
const NOVELTY: &[&str] = &["创新", "独特", "innovative", "unique"];
const ACTIONS: &[&str] = &["首先", "第一步", "建议", "应该", "first step", "recommend", "should"];
const RECOMMENDS: &[&str] = &["建议", "应该", "recommend", "should"];
const STRUCTURE: &[&str] = &["1.", "①", "•"];
const TENTATIVE: &[&str] = &["可能", "也许", "maybe", "perhaps"];

fn contains_any(text: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| text.contains(n))
}

fn contains_all(text: &str, needles: &[&str]) -> bool {
    needles.iter().all(|n| text.contains(n))
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// `100 * len / max_len` per candidate; 50 for everyone when all are empty.
pub fn length_scores(candidates: &[Candidate]) -> Vec<f64> {
    let lengths: Vec<usize> = candidates.iter().map(|c| char_len(&c.content)).collect();
    let max = lengths.iter().copied().max().unwrap_or(0);
    lengths
        .into_iter()
        .map(|len| {
            if max == 0 {
                50.0
            } else {
                100.0 * len as f64 / max as f64
            }
        })
        .collect()
}

/// Coarse single-number rating used alongside length scoring.
pub fn basic_rating(text: &str) -> Rating {
    let lower = text.to_lowercase();
    let mut score: f64 = 50.0;

    if contains_any(&lower, ACTIONS) {
        score += 10.0;
    }
    if contains_any(&lower, STRUCTURE) {
        score += 10.0;
    }

    let len = char_len(text);
    if len < 50 {
        score -= 10.0;
    } else if len > 5000 {
        score -= 5.0;
    }

    Rating::uniform(score)
}

/// Four-axis heuristic rating with task weighting. Axes are clamped to
/// [0, 100] and the overall is their weighted average.
pub fn comprehensive_rating(text: &str, task_type: &TaskType) -> Rating {
    let lower = text.to_lowercase();
    let mut r = Rating::uniform(BASE_AXIS);

    if contains_any(&lower, HEDGES) {
        r.accuracy -= 10.0;
    }

    if contains_all(&lower, ENUMERATION_ZH) || contains_all(&lower, ENUMERATION_EN) {
        r.completeness += 15.0;
    }
    if char_len(text) > 200 {
        r.completeness += 10.0;
    }

    if contains_any(&lower, SEQUENCING) {
        r.clarity += 15.0;
    }
    if (text.contains('。') && text.contains('，')) || (text.contains(". ") && text.contains(", ")) {
        r.clarity += 10.0;
    }

    if contains_any(&lower, CONTRAST) {
        r.creativity += 10.0;
    }
    if contains_any(&lower, NOVELTY) {
        r.creativity += 15.0;
    }

    match task_type {
        TaskType::Decision => {
            r.accuracy *= 1.2;
            r.completeness *= 1.2;
        }
        TaskType::Creation => {
            r.creativity *= 1.3;
        }
        TaskType::Analysis => {
            r.completeness *= 1.2;
            r.clarity *= 1.2;
        }
        TaskType::General | TaskType::Other(_) => {}
    }

    r.accuracy = r.accuracy.clamp(0.0, 100.0);
    r.completeness = r.completeness.clamp(0.0, 100.0);
    r.clarity = r.clarity.clamp(0.0, 100.0);
    r.creativity = r.creativity.clamp(0.0, 100.0);
    r.overall_score = r.weighted_overall();
    r
}

pub fn pros_cons(text: &str) -> ProsCons {
    let lower = text.to_lowercase();
    let len = char_len(text);
    let mut pc = ProsCons::default();

    if len > 100 {
        pc.pros.push("detailed".to_string());
    }
    if contains_any(&lower, RECOMMENDS) {
        pc.pros.push("concrete recommendations".to_string());
    }
    if text.contains("1.") || text.contains('①') {
        pc.pros.push("clear structure".to_string());
    }

    if len < 50 {
        pc.cons.push("too short".to_string());
    }
    if contains_any(&lower, TENTATIVE) {
        pc.cons.push("tentative tone".to_string());
    }

    pc
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(label: &str, content: &str) -> Candidate {
        Candidate {
            label: label.into(),
            model: label.into(),
            content: content.into(),
        }
    }

    #[test]
    fn test_length_scores_relative_to_longest() {
        let scores = length_scores(&[cand("a", "12345"), cand("b", "1234567890")]);
        assert_eq!(scores, vec![50.0, 100.0]);
    }

    #[test]
    fn test_length_scores_all_empty() {
        let scores = length_scores(&[cand("a", ""), cand("b", "")]);
        assert_eq!(scores, vec![50.0, 50.0]);
    }

    #[test]
    fn test_length_counts_characters() {
        // Four CJK characters vs four ASCII letters.
        let scores = length_scores(&[cand("a", "你好世界"), cand("b", "abcd")]);
        assert_eq!(scores, vec![100.0, 100.0]);
    }

    #[test]
    fn test_basic_rating_markers() {
        assert_eq!(basic_rating("ok").overall_score, 40.0);
        let structured = format!("建议如下：1. 先备份 2. 再升级。{}", "细节".repeat(30));
        assert_eq!(basic_rating(&structured).overall_score, 70.0);
        assert_eq!(basic_rating(&"x".repeat(6000)).overall_score, 45.0);
    }

    #[test]
    fn test_comprehensive_baseline() {
        let r = comprehensive_rating("plain", &TaskType::General);
        assert_eq!(r.accuracy, 70.0);
        assert_eq!(r.creativity, 70.0);
        assert!((r.overall_score - 70.0).abs() < 1e-9);
    }

    #[test]
    fn test_comprehensive_markers() {
        let text = "首先，第一要稳定，第二要便宜，第三要创新。但是也要考虑成本。";
        let r = comprehensive_rating(text, &TaskType::General);
        assert_eq!(r.completeness, 85.0);
        assert_eq!(r.clarity, 95.0);
        assert_eq!(r.creativity, 95.0);
        assert_eq!(r.accuracy, 70.0);
    }

    #[test]
    fn test_hedging_lowers_accuracy() {
        let r = comprehensive_rating("I am not sure about this", &TaskType::General);
        assert_eq!(r.accuracy, 60.0);
    }

    #[test]
    fn test_task_weighting_and_clamp() {
        let text = format!("First, second, third. {}", "detail ".repeat(40));
        let r = comprehensive_rating(&text, &TaskType::Decision);
        // 70 + 15 + 10 = 95, * 1.2 clamps to 100.
        assert_eq!(r.completeness, 100.0);
        assert!((r.accuracy - 84.0).abs() < 1e-9);

        let r = comprehensive_rating("a unique idea", &TaskType::Creation);
        assert_eq!(r.creativity, 100.0);
    }

    #[test]
    fn test_creation_rewards_creative_answer() {
        let creative = "A unique, innovative approach. However it costs more.";
        let general = comprehensive_rating(creative, &TaskType::General);
        let creation = comprehensive_rating(creative, &TaskType::Creation);
        assert!((general.overall_score - 77.0).abs() < 1e-9);
        assert!(creation.overall_score > general.overall_score);
    }

    #[test]
    fn test_pros_cons() {
        let pc = pros_cons("也许可以");
        assert_eq!(pc.cons, vec!["too short", "tentative tone"]);
        assert!(pc.pros.is_empty());

        let long = format!("We recommend: 1. backup. {}", "x".repeat(120));
        let pc = pros_cons(&long);
        assert_eq!(pc.pros, vec!["detailed", "concrete recommendations", "clear structure"]);
        assert!(pc.cons.is_empty());
    }
}
