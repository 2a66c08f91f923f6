//! Deterministic stub provider for tests.
//!
//! Two modes, combinable: a scripted queue of verbatim responses consumed in
//! order, and pattern-matched canned responses keyed on recognizable prompt
//! fragments when the queue is empty. `with_failures` front-loads synthetic
//! 429s so gateway retry behaviour is testable without a network.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{PipelineError, Result};
use crate::llm::{
    sha256_hex, LlmCompletion, LlmProvider, LlmProviderConfig, LlmProviderInfo, LlmRequest,
};

pub struct StubLlmProvider {
    config: LlmProviderConfig,
    scripted: Mutex<VecDeque<String>>,
    failures_remaining: AtomicU32,
}

impl StubLlmProvider {
    pub fn new(config: LlmProviderConfig) -> Self {
        Self {
            config,
            scripted: Mutex::new(VecDeque::new()),
            failures_remaining: AtomicU32::new(0),
        }
    }

    /// A stub that replays `responses` in order, then falls back to canned
    /// pattern-matched output.
    pub fn with_responses(config: LlmProviderConfig, responses: Vec<String>) -> Self {
        let stub = Self::new(config);
        {
            let mut q = stub.scripted.lock().unwrap_or_else(|e| e.into_inner());
            q.extend(responses);
        }
        stub
    }

    /// A stub whose first `n` calls fail with a synthetic 429.
    pub fn with_failures(config: LlmProviderConfig, n: u32) -> Self {
        let stub = Self::new(config);
        stub.failures_remaining.store(n, Ordering::Relaxed);
        stub
    }

    pub fn push_response(&mut self, response: String) {
        self.scripted
            .get_mut()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(response);
    }

    fn canned_response(prompt: &str) -> String {
        if prompt.contains("JSON object matching this schema") {
            CANNED_PLAN.to_string()
        } else if prompt.contains("judging a workback plan") {
            CANNED_JUDGMENT.to_string()
        } else if prompt.contains("JSON array of Microsoft Graph-shaped events") {
            CANNED_CALENDAR.to_string()
        } else {
            CANNED_ANALYSIS.to_string()
        }
    }
}

#[async_trait]
impl LlmProvider for StubLlmProvider {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmCompletion> {
        let failures = self.failures_remaining.load(Ordering::Relaxed);
        if failures > 0 {
            self.failures_remaining.store(failures - 1, Ordering::Relaxed);
            return Err(PipelineError::Server {
                status: 429,
                retry_after: None,
            });
        }

        let scripted = {
            let mut q = self.scripted.lock().unwrap_or_else(|e| e.into_inner());
            q.pop_front()
        };
        let content = scripted.unwrap_or_else(|| Self::canned_response(&request.prompt));

        Ok(LlmCompletion {
            prompt_hash: sha256_hex(request.prompt.as_bytes()),
            response_hash: sha256_hex(content.as_bytes()),
            content,
            prompt_tokens: None,
            completion_tokens: None,
            total_tokens: None,
            latency_ms: 0,
        })
    }

    fn get_info(&self) -> LlmProviderInfo {
        LlmProviderInfo {
            name: "stub".to_string(),
            model: self.config.model.clone(),
            capabilities: vec!["chat".to_string()],
        }
    }
}

const CANNED_ANALYSIS: &str = r#"## Workback analysis

Goal: ship the quarterly business review on time.

1. Lock the agenda two weeks out (owner: organizer).
2. Collect metrics one week out (owner: analyst).
3. Dry run three days before the target date.

Risks: metrics pipeline lag; mitigate by starting collection early."#;

const CANNED_PLAN: &str = r#"{
  "participants": [
    {"id": "p1", "name": "Avery Chen", "email": "avery@contoso.com", "role": "organizer"},
    {"id": "p2", "name": "Sam Patel", "email": "sam@contoso.com", "role": "analyst"}
  ],
  "milestones": [
    {"id": "m1", "title": "Agenda locked", "due_date": "2025-12-01", "owner_id": "p1", "depends_on": []},
    {"id": "m2", "title": "Metrics collected", "due_date": "2025-12-08", "owner_id": "p2", "depends_on": ["m1"]},
    {"id": "m3", "title": "Dry run complete", "due_date": "2025-12-12", "owner_id": "p1", "depends_on": ["m2"]}
  ],
  "tasks": [
    {"id": "t1", "title": "Draft agenda", "owner_id": "p1", "milestone_id": "m1", "start_date": "2025-11-24", "end_date": "2025-11-28"},
    {"id": "t2", "title": "Pull revenue metrics", "owner_id": "p2", "milestone_id": "m2", "start_date": "2025-12-02", "end_date": "2025-12-05"},
    {"id": "t3", "title": "Schedule dry run", "owner_id": "p1", "milestone_id": "m3"}
  ],
  "artifacts": [
    {"id": "a1", "title": "QBR deck", "produced_by_task_id": "t3"}
  ],
  "meta": {"goal": "Ship the quarterly business review", "target_date": "2025-12-15", "vertical": "sales"}
}"#;

const CANNED_JUDGMENT: &str = r#"{
  "passed": ["A1", "A2", "A3", "C1", "C2", "R1", "U1"],
  "partial": ["C3", "R2"],
  "failed": ["E1"],
  "feedback": {"E1": "No exceptional insight beyond the brief."},
  "score": 0.5
}"#;

const CANNED_CALENDAR: &str = r#"[
  {
    "id": "evt-001",
    "subject": "Team Sync",
    "bodyPreview": "Weekly team sync covering sprint status.",
    "start": {"dateTime": "2025-06-02T09:00:00", "timeZone": "Pacific Standard Time"},
    "end": {"dateTime": "2025-06-02T09:30:00", "timeZone": "Pacific Standard Time"},
    "type": "occurrence",
    "organizer": {"emailAddress": {"name": "Avery Chen", "address": "avery@contoso.com"}},
    "attendees": [
      {"type": "required", "emailAddress": {"name": "Sam Patel", "address": "sam@contoso.com"}}
    ],
    "showAs": "busy",
    "responseStatus": {"response": "accepted"}
  },
  {
    "id": "evt-002",
    "subject": "Customer Escalation Review",
    "bodyPreview": "Review open escalations with the support lead.",
    "start": {"dateTime": "2025-06-03T14:00:00", "timeZone": "Pacific Standard Time"},
    "end": {"dateTime": "2025-06-03T15:00:00", "timeZone": "Pacific Standard Time"},
    "type": "singleInstance",
    "organizer": {"emailAddress": {"name": "Avery Chen", "address": "avery@contoso.com"}},
    "attendees": [
      {"type": "required", "emailAddress": {"name": "Jo Ruiz", "address": "jo@fabrikam.com"}}
    ],
    "showAs": "busy",
    "responseStatus": {"response": "accepted"}
  }
]"#;
