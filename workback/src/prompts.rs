//! Prompt templates for every LLM-facing stage, plus the `{var}` renderer.
//!
//! Each stage has exactly one template, so templates live here as constants
//! rather than behind a file store. Substitution is plain `{name}`
//! replacement; unknown placeholders are left in place so a missing variable
//! shows up verbatim in the outgoing prompt during debugging.

use std::collections::HashMap;

/// Substitute `{var}` placeholders in a template.
pub fn render(template: &str, vars: &HashMap<String, String>) -> String {
    let mut rendered = template.to_string();
    for (k, v) in vars {
        let needle = format!("{{{}}}", k);
        rendered = rendered.replace(&needle, v);
    }
    rendered
}

/// Convenience for call sites with a handful of pairs.
pub fn render_pairs(template: &str, pairs: &[(&str, &str)]) -> String {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    render(template, &vars)
}

/// Stage 1 of plan generation: free-form decomposition by the reasoning model.
pub const ANALYSIS_TEMPLATE: &str = r#"You are an experienced program manager preparing a workback plan.

Today's date is {today}.

MEETING BRIEF:
{brief}

Work backwards from the goal and target date. Think through:
1. What is the concrete goal and when must it be done?
2. Who are the participants and what can each of them own?
3. What milestones must land, in what order, and with what dependencies?
4. Which tasks roll up to each milestone, and which artifacts do they produce?
5. Where is the schedule risk?

Write your full analysis as markdown. Be specific about owners and dates.
Do not emit JSON yet; a later step will structure your analysis."#;

/// Stage 2 of plan generation: schema emission by the structured model.
pub const STRUCTURE_TEMPLATE: &str = r#"Convert the workback analysis below into a single JSON object.

ANALYSIS:
{analysis}

Respond ONLY with a JSON object matching this schema exactly:
{schema}

Rules:
- Every owner_id must be the id of a participant.
- Every task's milestone_id must be the id of a milestone.
- depends_on lists milestone ids that must complete first.
- Dates are ISO calendar dates (YYYY-MM-DD).
- No markdown, no commentary, no trailing commas."#;

/// The documented Plan schema, substituted into [`STRUCTURE_TEMPLATE`].
pub const PLAN_SCHEMA: &str = r#"{
  "participants": [{"id": "p1", "name": "...", "email": "...", "role": "..."}],
  "milestones": [{"id": "m1", "title": "...", "due_date": "YYYY-MM-DD", "owner_id": "p1", "depends_on": ["m0"]}],
  "tasks": [{"id": "t1", "title": "...", "owner_id": "p1", "milestone_id": "m1", "start_date": "YYYY-MM-DD", "end_date": "YYYY-MM-DD"}],
  "artifacts": [{"id": "a1", "title": "...", "produced_by_task_id": "t1"}],
  "meta": {"goal": "...", "target_date": "YYYY-MM-DD", "vertical": "..."}
}"#;

/// Rubric judgment over a serialized plan.
pub const JUDGE_TEMPLATE: &str = r#"You are judging a workback plan against a fixed checklist.

SCENARIO:
{scenario}

PLAN (JSON):
{plan}

CHECKLIST (50 assertions):
{rubric}

For each assertion decide: passed, partial, or failed. Respond ONLY with a
JSON object in this format:
{
  "passed": ["A1", "C2"],
  "partial": ["R3"],
  "failed": ["E1"],
  "feedback": {"E1": "one-line explanation"},
  "score": 0.0
}
Every assertion id must appear in exactly one of the three lists."#;

/// One batch of synthetic calendar generation.
pub const CALENDAR_TEMPLATE: &str = r#"Generate a realistic work calendar batch for the persona below.

PERSONA:
{persona}

Produce exactly {count} meetings between {window_start} and {window_end}
(inclusive), as a JSON array of Microsoft Graph-shaped events:
[
  {
    "id": "evt-001",
    "subject": "...",
    "bodyPreview": "...",
    "start": {"dateTime": "YYYY-MM-DDTHH:MM:SS", "timeZone": "Pacific Standard Time"},
    "end": {"dateTime": "YYYY-MM-DDTHH:MM:SS", "timeZone": "Pacific Standard Time"},
    "type": "singleInstance",
    "organizer": {"emailAddress": {"name": "...", "address": "..."}},
    "attendees": [{"type": "required", "emailAddress": {"name": "...", "address": "..."}}],
    "showAs": "busy",
    "responseStatus": {"response": "accepted"}
  }
]

Requirements:
- 30-40% of events have "type": "occurrence" (weekly recurring: 1:1s, team
  syncs, staff meetings). Recurring events repeat on the same weekday and
  time each week, with the same subject.
- The rest are "singleInstance".
- All events start at or after 08:00 and end by 18:00 local time, unless the
  subject names an explicit emergency or escalation.
- Meetings must not overlap for this persona.
- Durations of 30 or 60 minutes; start times on the half hour.
- Respond ONLY with the JSON array."#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_substitutes_all_occurrences() {
        let out = render_pairs("{a} and {a} and {b}", &[("a", "x"), ("b", "y")]);
        assert_eq!(out, "x and x and y");
    }

    #[test]
    fn unknown_placeholders_survive() {
        let out = render_pairs("{present} {missing}", &[("present", "v")]);
        assert_eq!(out, "v {missing}");
    }
}
