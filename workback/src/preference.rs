//! Preference-pair construction for post-training.
//!
//! Samples candidate plans for one scenario across a temperature ladder,
//! judges each against the rubric, and emits a `{better, worse}` record only
//! when the recomputed score gap clears the acceptance threshold. Candidate
//! and judge failures drop that candidate; the builder is stateless across
//! scenarios.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::judge::{rubric, Judgment, RubricJudge};
use crate::llm::{LlmGateway, ModelSpec};
use crate::plan::{Plan, PlanGenerator};

/// Default temperature ladder for candidate sampling.
pub const DEFAULT_TEMPERATURES: [f64; 5] = [0.8, 1.0, 1.2, 1.5, 1.8];

/// Default minimum score gap between the chosen pair.
pub const DEFAULT_TAU: f64 = 0.15;

/// One judged candidate inside a preference pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub plan: Plan,
    pub analysis: String,
    pub temperature: f64,
    pub score: f64,
    pub passed: Vec<String>,
    pub partial: Vec<String>,
    pub failed: Vec<String>,
    #[serde(default)]
    pub feedback: BTreeMap<String, String>,
}

impl ScoredCandidate {
    fn new(plan: Plan, analysis: String, temperature: f64, judgment: Judgment) -> Self {
        Self {
            plan,
            analysis,
            temperature,
            score: judgment.score,
            passed: judgment.passed,
            partial: judgment.partial,
            failed: judgment.failed,
            feedback: judgment.feedback,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreferencePair {
    pub scenario: String,
    pub better: ScoredCandidate,
    pub worse: ScoredCandidate,
    pub score_gap: f64,
    pub key_differences: Vec<String>,
}

pub struct PreferencePairBuilder<'g> {
    gateway: &'g LlmGateway,
    analysis_model: ModelSpec,
    structure_model: ModelSpec,
    judge_model: ModelSpec,
    temperatures: Vec<f64>,
    tau: f64,
}

impl<'g> PreferencePairBuilder<'g> {
    pub fn new(
        gateway: &'g LlmGateway,
        analysis_model: ModelSpec,
        structure_model: ModelSpec,
        judge_model: ModelSpec,
    ) -> Self {
        Self {
            gateway,
            analysis_model,
            structure_model,
            judge_model,
            temperatures: DEFAULT_TEMPERATURES.to_vec(),
            tau: DEFAULT_TAU,
        }
    }

    pub fn with_temperatures(mut self, temperatures: Vec<f64>) -> Self {
        self.temperatures = temperatures;
        self
    }

    pub fn with_tau(mut self, tau: f64) -> Self {
        self.tau = tau;
        self
    }

    /// Build one preference pair for a scenario, or fail with
    /// [`PipelineError::GatingRejected`] when the gates do not pass.
    pub async fn build_pair(&self, scenario: &str) -> Result<PreferencePair> {
        // Candidates are generated in temperature order; selection depends
        // only on scores.
        let mut candidates: Vec<(f64, String, Plan)> = Vec::new();
        for &temperature in &self.temperatures {
            let generator = PlanGenerator::new(
                self.gateway,
                self.analysis_model.clone(),
                self.structure_model.clone(),
            )
            .with_temperature(temperature);
            match generator.generate_plan(scenario, true).await {
                Ok(generation) => {
                    if let Some(plan) = generation.structured {
                        candidates.push((temperature, generation.analysis, plan));
                    } else {
                        tracing::warn!(temperature, "candidate produced no structured plan");
                    }
                }
                Err(e) => {
                    tracing::warn!(temperature, error = %e, "candidate generation failed");
                }
            }
        }
        if candidates.len() < 2 {
            return Err(PipelineError::GatingRejected(format!(
                "only {} candidate plan(s) survived generation",
                candidates.len()
            )));
        }

        let judge = RubricJudge::new(self.gateway, self.judge_model.clone());
        let mut scored: Vec<ScoredCandidate> = Vec::new();
        for (temperature, analysis, plan) in candidates {
            match judge.judge(&plan, scenario).await {
                Ok(judgment) => {
                    scored.push(ScoredCandidate::new(plan, analysis, temperature, judgment));
                }
                Err(e) => {
                    tracing::warn!(temperature, error = %e, "judging failed, dropping candidate");
                }
            }
        }
        if scored.len() < 2 {
            return Err(PipelineError::GatingRejected(format!(
                "only {} candidate(s) survived judging",
                scored.len()
            )));
        }

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        let better = scored.first().cloned().ok_or_else(|| {
            PipelineError::GatingRejected("no candidates after sorting".to_string())
        })?;
        let worse = scored.last().cloned().ok_or_else(|| {
            PipelineError::GatingRejected("no candidates after sorting".to_string())
        })?;

        let score_gap = better.score - worse.score;
        if score_gap < self.tau {
            return Err(PipelineError::GatingRejected(format!(
                "score gap {:.3} below threshold {:.3}",
                score_gap, self.tau
            )));
        }

        let key_differences = key_differences(&better, &worse);
        Ok(PreferencePair {
            scenario: scenario.to_string(),
            better,
            worse,
            score_gap,
            key_differences,
        })
    }
}

/// Assertions the better plan passed and the worse plan failed, rendered as
/// human strings. Falls back to a numeric comparison when the intersection
/// is empty.
fn key_differences(better: &ScoredCandidate, worse: &ScoredCandidate) -> Vec<String> {
    let mut out: Vec<String> = better
        .passed
        .iter()
        .filter(|id| worse.failed.contains(id))
        .filter_map(|id| rubric::assertion_text(id).map(|text| format!("{}: {}", id, text)))
        .collect();
    if out.is_empty() {
        out.push(format!(
            "Better plan scored {:.2} against {:.2} with no single decisive assertion",
            better.score, worse.score
        ));
    }
    out
}
