//! Synthetic calendar generation, one persona at a time.
//!
//! Sizing comes from the persona's weekly meeting hours; generation runs in
//! batches small enough that the model does not truncate its JSON array.
//! The generator asks the model for temporal coherence (working hours,
//! stable recurring slots) but does not enforce it; downstream consumers
//! treat those properties as testable, not guaranteed.

use std::time::Duration;

use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::calendar::{LabeledMeeting, MeetingRecord};
use crate::error::Result;
use crate::llm::{LlmGateway, ModelSpec};
use crate::persona::{rules, LabelingConfig, Persona};
use crate::prompts;

/// Upper bound on meetings requested per LLM call.
const MAX_BATCH_MEETINGS: usize = 20;
/// Upper bound on the calendar span covered by one call.
const MAX_BATCH_WEEKS: u32 = 2;
/// Pause between batch calls, on top of gateway rate limiting.
const BATCH_DELAY: Duration = Duration::from_millis(500);

const DEFAULT_WEEKLY_HOURS: f64 = 20.0;

static HOURS_RANGE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+(?:\.\d+)?)\s*[-–]\s*(\d+(?:\.\d+)?)").unwrap());
static HOURS_SINGLE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+(?:\.\d+)?)").unwrap());

pub struct CalendarGenerator<'g> {
    gateway: &'g LlmGateway,
    model: ModelSpec,
    labeling: LabelingConfig,
    batch_delay: Duration,
}

impl<'g> CalendarGenerator<'g> {
    pub fn new(gateway: &'g LlmGateway, model: ModelSpec, labeling: LabelingConfig) -> Self {
        Self {
            gateway,
            model,
            labeling,
            batch_delay: BATCH_DELAY,
        }
    }

    /// Override the inter-batch pause (tests use a near-zero delay).
    pub fn with_batch_delay(mut self, delay: Duration) -> Self {
        self.batch_delay = delay;
        self
    }

    /// Generate and label a multi-week calendar for one persona.
    ///
    /// Failing batches are dropped and generation continues; a short
    /// calendar is acceptable output.
    pub async fn generate_calendar(
        &self,
        persona: &Persona,
        weeks: u32,
        start_date: Option<NaiveDate>,
    ) -> Result<Vec<LabeledMeeting>> {
        let hours = parse_weekly_hours(&persona.meeting_context.weekly_meeting_hours);
        let meetings_per_week = hours.floor().max(1.0) as usize;
        let start = start_date.unwrap_or_else(next_monday);
        tracing::info!(
            persona = %persona.id,
            weeks,
            meetings_per_week,
            "generating synthetic calendar"
        );

        let persona_summary = persona_summary(persona);
        let mut labeled: Vec<LabeledMeeting> = Vec::with_capacity(meetings_per_week * weeks as usize);
        let mut first_batch = true;
        let mut last_batch_err: Option<crate::error::PipelineError> = None;

        let mut week = 0u32;
        while week < weeks {
            let window_weeks = MAX_BATCH_WEEKS.min(weeks - week);
            let window_start = start + chrono::Days::new(u64::from(week) * 7);
            let window_end = window_start + chrono::Days::new(u64::from(window_weeks) * 7 - 1);
            let mut remaining = meetings_per_week * window_weeks as usize;

            while remaining > 0 {
                let count = remaining.min(MAX_BATCH_MEETINGS);
                remaining -= count;

                if !first_batch {
                    tokio::time::sleep(self.batch_delay).await;
                }
                first_batch = false;

                match self
                    .generate_batch(&persona_summary, count, window_start, window_end)
                    .await
                {
                    Ok(batch) => {
                        for meeting in batch {
                            labeled.push(rules::label(&meeting, persona, &self.labeling));
                        }
                    }
                    Err(e) => {
                        tracing::warn!(
                            persona = %persona.id,
                            window_start = %window_start,
                            error = %e,
                            "dropping failed calendar batch"
                        );
                        last_batch_err = Some(e);
                    }
                }
            }
            week += window_weeks;
        }

        // A short calendar is acceptable; a calendar where every batch
        // failed is a unit failure.
        if labeled.is_empty() {
            if let Some(e) = last_batch_err {
                return Err(e);
            }
        }

        labeled.sort_by(|a, b| a.meeting.start.date_time.cmp(&b.meeting.start.date_time));
        Ok(labeled)
    }

    async fn generate_batch(
        &self,
        persona_summary: &str,
        count: usize,
        window_start: NaiveDate,
        window_end: NaiveDate,
    ) -> Result<Vec<MeetingRecord>> {
        let count_str = count.to_string();
        let start_str = window_start.to_string();
        let end_str = window_end.to_string();
        let prompt = prompts::render_pairs(
            prompts::CALENDAR_TEMPLATE,
            &[
                ("persona", persona_summary),
                ("count", count_str.as_str()),
                ("window_start", start_str.as_str()),
                ("window_end", end_str.as_str()),
            ],
        );

        let response = self
            .gateway
            .query(self.model.provider, &self.model.request(prompt))
            .await?;
        let value = crate::extract::extract_value(&response)?;
        let items = value.as_array().ok_or_else(|| {
            crate::error::PipelineError::SchemaError(
                "calendar batch did not produce a JSON array".to_string(),
            )
        })?;

        let mut meetings = Vec::with_capacity(items.len());
        for item in items {
            match serde_json::from_value::<MeetingRecord>(item.clone()) {
                Ok(meeting) => meetings.push(meeting),
                Err(e) => {
                    tracing::warn!(error = %e, "skipping malformed event in calendar batch");
                }
            }
        }
        Ok(meetings)
    }
}

/// Parse a persona's weekly-hours field: `"20-25"`, `"28-32 hours"`, or a
/// bare number. Ranges resolve to their midpoint; anything unparseable
/// falls back to 20 (logged).
pub fn parse_weekly_hours(raw: &str) -> f64 {
    if let Some(caps) = HOURS_RANGE_RE.captures(raw) {
        let low: Option<f64> = caps.get(1).and_then(|m| m.as_str().parse().ok());
        let high: Option<f64> = caps.get(2).and_then(|m| m.as_str().parse().ok());
        if let (Some(low), Some(high)) = (low, high) {
            return (low + high) / 2.0;
        }
    }
    if let Some(caps) = HOURS_SINGLE_RE.captures(raw) {
        if let Some(hours) = caps.get(1).and_then(|m| m.as_str().parse().ok()) {
            return hours;
        }
    }
    tracing::warn!(raw, "weekly meeting hours unparseable, defaulting to 20");
    DEFAULT_WEEKLY_HOURS
}

fn next_monday() -> NaiveDate {
    let today = chrono::Local::now().date_naive();
    let ahead = (7 - today.weekday().num_days_from_monday()) % 7;
    today + chrono::Days::new(u64::from(if ahead == 0 { 7 } else { ahead }))
}

fn persona_summary(persona: &Persona) -> String {
    let mut out = format!(
        "id: {}\nrole: {}\nindustry: {}\nweekly meeting hours: {}",
        persona.id,
        persona.demographics.role,
        persona.demographics.industry,
        persona.meeting_context.weekly_meeting_hours,
    );
    if !persona.meeting_context.typical_breakdown.is_empty() {
        out.push_str("\ntypical breakdown:");
        for (category, share) in &persona.meeting_context.typical_breakdown {
            out.push_str(&format!(" {} {:.0}%;", category, share * 100.0));
        }
    }
    if !persona.work_style.is_empty() {
        out.push_str(&format!("\nwork style: {}", persona.work_style));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn weekly_hours_parsing_handles_common_forms() {
        assert_eq!(parse_weekly_hours("20-25"), 22.5);
        assert_eq!(parse_weekly_hours("28-32 hours"), 30.0);
        assert_eq!(parse_weekly_hours("about 15"), 15.0);
        assert_eq!(parse_weekly_hours("12.5"), 12.5);
        assert_eq!(parse_weekly_hours(""), 20.0);
        assert_eq!(parse_weekly_hours("a lot"), 20.0);
    }

    #[test]
    fn next_monday_is_a_monday_in_the_future() {
        let monday = next_monday();
        assert_eq!(monday.weekday(), chrono::Weekday::Mon);
        assert!(monday > chrono::Local::now().date_naive());
    }
}
