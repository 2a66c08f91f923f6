//! Rubric judging of generated plans.
//!
//! One prompt carries the scenario, the full rubric, and the serialized
//! plan; the judge model returns per-assertion verdicts. The model's own
//! numeric score is never trusted: the aggregate is recomputed from the
//! verdict cardinalities. Parse failures degrade to a minimum-score
//! judgment (failure-closed) so unjudgeable plans are filtered downstream
//! rather than crashing a batch.

pub mod rubric;

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::extract::extract_value;
use crate::llm::{LlmGateway, ModelSpec};
use crate::plan::Plan;
use crate::prompts;

/// Per-assertion verdicts plus the recomputed aggregate score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Judgment {
    pub passed: Vec<String>,
    pub partial: Vec<String>,
    pub failed: Vec<String>,
    #[serde(default)]
    pub feedback: BTreeMap<String, String>,
    pub score: f64,
}

impl Judgment {
    /// The minimum-score judgment used when nothing usable came back.
    pub fn failure_closed(reason: impl Into<String>) -> Self {
        let mut feedback = BTreeMap::new();
        feedback.insert("error".to_string(), reason.into());
        Self {
            passed: Vec::new(),
            partial: Vec::new(),
            failed: rubric::all_ids().map(str::to_string).collect(),
            feedback,
            score: 0.0,
        }
    }

    /// `(|passed| + 0.5·|partial|) / 50`.
    pub fn recomputed_score(&self) -> f64 {
        (self.passed.len() as f64 + 0.5 * self.partial.len() as f64) / rubric::RUBRIC_SIZE as f64
    }

    /// Drop unknown ids, resolve duplicates with passed > partial > failed
    /// precedence, and assign unmentioned assertions to `failed` so the
    /// three sets always partition the rubric. Recomputes the score.
    fn normalize(&mut self) {
        fn keep(list: &mut Vec<String>, seen: &mut HashSet<&'static str>) {
            let mut kept = Vec::with_capacity(list.len());
            for id in list.drain(..) {
                if let Some(known) = rubric::all_ids().find(|k| *k == id.as_str()) {
                    if seen.insert(known) {
                        kept.push(id);
                    }
                }
            }
            *list = kept;
        }

        let mut seen: HashSet<&'static str> = HashSet::new();
        keep(&mut self.passed, &mut seen);
        keep(&mut self.partial, &mut seen);
        keep(&mut self.failed, &mut seen);
        for id in rubric::all_ids() {
            if !seen.contains(id) {
                self.failed.push(id.to_string());
            }
        }
        self.score = self.recomputed_score();
    }
}

pub struct RubricJudge<'g> {
    gateway: &'g LlmGateway,
    model: ModelSpec,
}

impl<'g> RubricJudge<'g> {
    pub fn new(gateway: &'g LlmGateway, model: ModelSpec) -> Self {
        Self { gateway, model }
    }

    /// Judge one plan against the rubric.
    ///
    /// Returns `Err` only when the judge model itself is unreachable
    /// (`JudgeUnavailable`); malformed judge output degrades to a
    /// failure-closed judgment instead.
    pub async fn judge(&self, plan: &Plan, scenario: &str) -> Result<Judgment> {
        let plan_json = serde_json::to_string_pretty(plan)?;
        let rubric_text = rubric::rubric_block();
        let prompt = prompts::render_pairs(
            prompts::JUDGE_TEMPLATE,
            &[
                ("scenario", scenario),
                ("plan", plan_json.as_str()),
                ("rubric", rubric_text.as_str()),
            ],
        );

        let response = self
            .gateway
            .query(self.model.provider, &self.model.request(prompt))
            .await
            .map_err(|e| PipelineError::JudgeUnavailable(e.to_string()))?;

        Ok(Self::parse_judgment(&response))
    }

    /// Best-effort parse of the judge's response into a normalized judgment.
    fn parse_judgment(response: &str) -> Judgment {
        let value = match extract_value(response) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "judge output unparseable, failing closed");
                return Judgment::failure_closed(format!("unparseable judge output: {}", e));
            }
        };

        let ids = |key: &str| -> Vec<String> {
            value
                .get(key)
                .and_then(|v| v.as_array())
                .map(|arr| {
                    arr.iter()
                        .filter_map(|v| v.as_str())
                        .map(|s| s.trim().to_string())
                        .collect()
                })
                .unwrap_or_default()
        };

        let mut judgment = Judgment {
            passed: ids("passed"),
            partial: ids("partial"),
            failed: ids("failed"),
            feedback: value
                .get("feedback")
                .and_then(|v| v.as_object())
                .map(|obj| {
                    obj.iter()
                        .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                        .collect()
                })
                .unwrap_or_default(),
            score: 0.0,
        };

        if judgment.passed.is_empty() && judgment.partial.is_empty() && judgment.failed.is_empty() {
            return Judgment::failure_closed("judge output carried no verdicts");
        }

        judgment.normalize();
        judgment
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn score_law_holds_after_normalization() {
        let raw = r#"{"passed": ["A1", "A2", "C1"], "partial": ["R1"], "failed": [], "score": 0.99}"#;
        let judgment = RubricJudge::parse_judgment(raw);
        // The model's flattering 0.99 is discarded.
        assert_eq!(judgment.score, (3.0 + 0.5) / 50.0);
        assert_eq!(judgment.passed.len(), 3);
        assert_eq!(judgment.partial.len(), 1);
        // Everything unmentioned fails.
        assert_eq!(judgment.failed.len(), 46);
    }

    #[test]
    fn verdict_sets_partition_the_rubric() {
        let raw = r#"{"passed": ["A1"], "partial": ["A1", "B7", "C2"], "failed": ["C2"]}"#;
        let judgment = RubricJudge::parse_judgment(raw);
        // A1 keeps its strongest verdict; B7 is not a rubric id; C2 lands in
        // partial by precedence.
        assert!(judgment.passed.contains(&"A1".to_string()));
        assert!(!judgment.partial.contains(&"A1".to_string()));
        assert!(judgment.partial.contains(&"C2".to_string()));
        assert!(!judgment.failed.contains(&"C2".to_string()));
        let total = judgment.passed.len() + judgment.partial.len() + judgment.failed.len();
        assert_eq!(total, rubric::RUBRIC_SIZE);
    }

    #[test]
    fn prose_fails_closed_with_zero_score() {
        let judgment = RubricJudge::parse_judgment("I think this plan is quite good overall.");
        assert_eq!(judgment.score, 0.0);
        assert_eq!(judgment.failed.len(), rubric::RUBRIC_SIZE);
        assert!(judgment.feedback.contains_key("error"));
    }

    #[test]
    fn missing_verdicts_fail_closed() {
        let judgment = RubricJudge::parse_judgment(r#"{"score": 0.8}"#);
        assert_eq!(judgment.score, 0.0);
        assert_eq!(judgment.failed.len(), rubric::RUBRIC_SIZE);
    }

    #[test]
    fn arithmetic_scores_are_tolerated_then_ignored() {
        let raw = r#"{"passed": ["A1"], "partial": [], "failed": ["A2"], "score": 9 - (10 - 7)}"#;
        let judgment = RubricJudge::parse_judgment(raw);
        assert_eq!(judgment.score, 1.0 / 50.0);
    }
}
