//! Rubric judging through the gateway: recomputed scores, coverage, and
//! the failure-closed path.

mod common;

use workback::judge::{rubric, RubricJudge};
use workback::plan::Plan;
use workback::PipelineError;

fn minimal_plan() -> Plan {
    serde_json::from_str(
        r#"{
        "participants": [{"id": "p1", "name": "A", "email": "a@contoso.com", "role": "lead"}],
        "milestones": [{"id": "m1", "title": "Done", "due_date": "2025-12-01", "owner_id": "p1", "depends_on": []}],
        "tasks": [{"id": "t1", "title": "Do", "owner_id": "p1", "milestone_id": "m1"}],
        "meta": {"goal": "g", "target_date": "2025-12-15", "vertical": "sales"}
    }"#,
    )
    .unwrap()
}

#[tokio::test]
async fn score_is_recomputed_from_verdicts() {
    // The canned judgment claims score 0.5 but passes 7 and partials 2:
    // the authoritative score is (7 + 1) / 50.
    let gateway = common::canned_gateway();
    let judge = RubricJudge::new(&gateway, common::stub_model());
    let judgment = judge.judge(&minimal_plan(), "scenario").await.unwrap();

    assert!((judgment.score - 8.0 / 50.0).abs() < 1e-9);
    let total = judgment.passed.len() + judgment.partial.len() + judgment.failed.len();
    assert_eq!(total, rubric::RUBRIC_SIZE);
}

#[tokio::test]
async fn prose_judge_output_fails_closed() {
    let gateway = common::scripted_gateway(vec![
        "This plan seems fine to me, nice work everyone.".to_string(),
    ]);
    let judge = RubricJudge::new(&gateway, common::stub_model());
    let judgment = judge.judge(&minimal_plan(), "scenario").await.unwrap();

    assert_eq!(judgment.score, 0.0);
    assert_eq!(judgment.failed.len(), rubric::RUBRIC_SIZE);
    assert!(judgment.feedback.contains_key("error"));
}

#[tokio::test]
async fn unreachable_judge_is_reported_as_unavailable() {
    let gateway = common::canned_gateway();
    let judge = RubricJudge::new(
        &gateway,
        workback::llm::ModelSpec::new(workback::llm::LlmProviderType::OpenAI, "unregistered"),
    );
    let err = judge.judge(&minimal_plan(), "scenario").await.unwrap_err();
    assert!(matches!(err, PipelineError::JudgeUnavailable(_)));
}
