//! Preference-pair gating behaviour with scripted generation and judging.

mod common;

use workback::preference::PreferencePairBuilder;
use workback::PipelineError;

const ANALYSIS: &str = "workback analysis";

fn plan_json(goal: &str) -> String {
    format!(
        r#"{{
  "participants": [
    {{"id": "p1", "name": "Avery Chen", "email": "avery@contoso.com", "role": "organizer"}}
  ],
  "milestones": [
    {{"id": "m1", "title": "Prep done", "due_date": "2025-12-01", "owner_id": "p1", "depends_on": []}}
  ],
  "tasks": [
    {{"id": "t1", "title": "Prepare", "owner_id": "p1", "milestone_id": "m1"}}
  ],
  "meta": {{"goal": "{goal}", "target_date": "2025-12-15", "vertical": "sales"}}
}}"#
    )
}

/// A judgment passing the first `passed` rubric assertions.
fn judgment_json(passed: usize) -> String {
    let ids: Vec<String> = workback::judge::rubric::RUBRIC
        .iter()
        .take(passed)
        .map(|a| format!("\"{}\"", a.id))
        .collect();
    format!(
        r#"{{"passed": [{}], "partial": [], "failed": [], "score": 0.0}}"#,
        ids.join(", ")
    )
}

fn scripted_two_candidates(strong_passed: usize, weak_passed: usize) -> Vec<String> {
    vec![
        // Candidate at t=0.8: analysis then structure.
        ANALYSIS.to_string(),
        plan_json("strong plan"),
        // Candidate at t=1.5.
        ANALYSIS.to_string(),
        plan_json("weak plan"),
        // Judgments in generation order.
        judgment_json(strong_passed),
        judgment_json(weak_passed),
    ]
}

fn builder(gateway: &workback::llm::LlmGateway) -> PreferencePairBuilder<'_> {
    PreferencePairBuilder::new(
        gateway,
        common::stub_model(),
        common::stub_model(),
        common::stub_model(),
    )
    .with_temperatures(vec![0.8, 1.5])
}

#[tokio::test]
async fn emits_pair_when_gap_clears_tau() {
    // 25 passed vs 5 passed: scores 0.5 vs 0.1, gap 0.4.
    let gateway = common::scripted_gateway(scripted_two_candidates(25, 5));
    let pair = builder(&gateway)
        .with_tau(0.15)
        .build_pair("same scenario")
        .await
        .unwrap();

    assert!(pair.better.score >= pair.worse.score + 0.15);
    assert!((pair.score_gap - 0.4).abs() < 1e-9);
    assert_eq!(pair.scenario, "same scenario");
    // Distinct generation calls.
    assert_ne!(pair.better.temperature, pair.worse.temperature);
    // Verdict sets partition the rubric on both sides.
    for candidate in [&pair.better, &pair.worse] {
        let total = candidate.passed.len() + candidate.partial.len() + candidate.failed.len();
        assert_eq!(total, 50);
    }
    // The better plan passed assertions the worse one failed.
    assert!(!pair.key_differences.is_empty());
}

#[tokio::test]
async fn rejects_pair_below_tau() {
    // 25 vs 22 passed: gap 0.06 < 0.15.
    let gateway = common::scripted_gateway(scripted_two_candidates(25, 22));
    let err = builder(&gateway)
        .with_tau(0.15)
        .build_pair("scenario")
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::GatingRejected(_)));
}

#[tokio::test]
async fn raising_tau_never_admits_more_pairs() {
    // Gap is exactly 0.2: admitted at tau 0.15, rejected at tau 0.25.
    let low = common::scripted_gateway(scripted_two_candidates(25, 15));
    assert!(builder(&low).with_tau(0.15).build_pair("s").await.is_ok());

    let high = common::scripted_gateway(scripted_two_candidates(25, 15));
    assert!(matches!(
        builder(&high).with_tau(0.25).build_pair("s").await,
        Err(PipelineError::GatingRejected(_))
    ));
}

#[tokio::test]
async fn too_few_candidates_rejects() {
    // Second candidate's structuring output is hopeless prose, so only one
    // plan survives generation.
    let gateway = common::scripted_gateway(vec![
        ANALYSIS.to_string(),
        plan_json("only survivor"),
        ANALYSIS.to_string(),
        "I cannot produce JSON today.".to_string(),
    ]);
    let err = builder(&gateway).build_pair("s").await.unwrap_err();
    assert!(matches!(err, PipelineError::GatingRejected(_)));
}

#[tokio::test]
async fn better_is_never_below_worse() {
    // Weak first, strong second: ordering must come from scores, not
    // generation order.
    let gateway = common::scripted_gateway(scripted_two_candidates(5, 25));
    let pair = builder(&gateway).build_pair("s").await.unwrap();
    assert!(pair.better.score > pair.worse.score);
    // The strong candidate was generated second, at the higher temperature.
    assert!((pair.better.temperature - 1.5).abs() < 1e-9);
}
