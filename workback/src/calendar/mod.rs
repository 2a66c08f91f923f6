//! Graph-shaped meeting records and their labeled form.
//!
//! Field names follow the Microsoft Graph event wire shape (camelCase,
//! `type` discriminators) so fetched and synthetic calendars share one
//! schema. Labels are appended by the persona rule engine.

pub mod generator;

pub use generator::CalendarGenerator;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateTimeTz {
    #[serde(rename = "dateTime")]
    pub date_time: String,
    #[serde(rename = "timeZone", default)]
    pub time_zone: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailAddress {
    #[serde(default)]
    pub name: String,
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organizer {
    #[serde(rename = "emailAddress")]
    pub email_address: EmailAddress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AttendeeType {
    #[default]
    Required,
    Optional,
    Resource,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attendee {
    #[serde(rename = "type", default)]
    pub attendee_type: AttendeeType,
    #[serde(rename = "emailAddress")]
    pub email_address: EmailAddress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum EventType {
    #[default]
    SingleInstance,
    Occurrence,
    Exception,
    SeriesMaster,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ResponseStatus {
    #[serde(default)]
    pub response: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeetingRecord {
    pub id: String,
    pub subject: String,
    #[serde(rename = "bodyPreview", default)]
    pub body_preview: String,
    pub start: DateTimeTz,
    pub end: DateTimeTz,
    #[serde(rename = "type", default)]
    pub event_type: EventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organizer: Option<Organizer>,
    #[serde(default)]
    pub attendees: Vec<Attendee>,
    #[serde(rename = "showAs", default)]
    pub show_as: String,
    #[serde(rename = "responseStatus", default, skip_serializing_if = "Option::is_none")]
    pub response_status: Option<ResponseStatus>,
}

impl MeetingRecord {
    pub fn start_time(&self) -> Option<NaiveDateTime> {
        parse_graph_datetime(&self.start.date_time)
    }

    pub fn end_time(&self) -> Option<NaiveDateTime> {
        parse_graph_datetime(&self.end.date_time)
    }
}

/// Parse the Graph `dateTime` form, with or without fractional seconds.
pub fn parse_graph_datetime(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
}

/// Importance assigned by the persona rule engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportanceLabel {
    Critical,
    High,
    Medium,
    Low,
}

impl ImportanceLabel {
    /// One-level promotion used by priority frameworks. Only medium and low
    /// promote; high and critical are unchanged.
    pub fn promoted(self) -> Self {
        match self {
            ImportanceLabel::Medium => ImportanceLabel::High,
            ImportanceLabel::Low => ImportanceLabel::Medium,
            other => other,
        }
    }
}

/// A meeting record after rule application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledMeeting {
    #[serde(flatten)]
    pub meeting: MeetingRecord,
    pub importance_label: ImportanceLabel,
    pub prep_needed: bool,
    pub prep_time_minutes: u32,
    pub reasoning: String,
    pub persona_id: String,
    /// RFC 3339 label-generation timestamp.
    pub generated_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn meeting_round_trips_through_graph_shape() {
        let raw = r#"{
            "id": "evt-1",
            "subject": "Sync",
            "bodyPreview": "weekly",
            "start": {"dateTime": "2025-06-02T09:00:00", "timeZone": "UTC"},
            "end": {"dateTime": "2025-06-02T09:30:00", "timeZone": "UTC"},
            "type": "occurrence",
            "attendees": [
                {"type": "optional", "emailAddress": {"name": "Jo", "address": "jo@fabrikam.com"}}
            ],
            "showAs": "busy"
        }"#;
        let meeting: MeetingRecord = serde_json::from_str(raw).unwrap();
        assert_eq!(meeting.event_type, EventType::Occurrence);
        assert_eq!(meeting.attendees[0].attendee_type, AttendeeType::Optional);
        let back = serde_json::to_value(&meeting).unwrap();
        assert_eq!(back["bodyPreview"], "weekly");
        assert_eq!(back["type"], "occurrence");
    }

    #[test]
    fn datetime_parsing_accepts_fractional_seconds() {
        assert!(parse_graph_datetime("2025-06-02T09:00:00").is_some());
        assert!(parse_graph_datetime("2025-06-02T09:00:00.0000000").is_some());
        assert!(parse_graph_datetime("junk").is_none());
    }

    #[test]
    fn promotion_stops_at_high() {
        assert_eq!(ImportanceLabel::Low.promoted(), ImportanceLabel::Medium);
        assert_eq!(ImportanceLabel::Medium.promoted(), ImportanceLabel::High);
        assert_eq!(ImportanceLabel::High.promoted(), ImportanceLabel::High);
        assert_eq!(ImportanceLabel::Critical.promoted(), ImportanceLabel::Critical);
    }
}
