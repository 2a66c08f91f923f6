//! The persona rule engine: the labeling oracle.
//!
//! Deliberately rule-based rather than model-based so labels are
//! reproducible and auditable. Matching runs over the lower-cased subject
//! plus body preview; each category short-circuits at its first matching
//! pattern but reasons accumulate across categories.

use crate::calendar::{AttendeeType, ImportanceLabel, LabeledMeeting, MeetingRecord};
use crate::persona::Persona;

/// Caller-supplied environment for the rule engine.
#[derive(Debug, Clone)]
pub struct LabelingConfig {
    /// Email domains considered internal. An attendee is external iff its
    /// type is not `resource` and its domain matches none of these.
    pub internal_domains: Vec<String>,
}

impl Default for LabelingConfig {
    fn default() -> Self {
        Self {
            internal_domains: vec!["contoso.com".to_string()],
        }
    }
}

/// Apply a persona's rule base to one meeting.
pub fn label(meeting: &MeetingRecord, persona: &Persona, config: &LabelingConfig) -> LabeledMeeting {
    let text = format!("{} {}", meeting.subject, meeting.body_preview).to_lowercase();
    let mut reasons: Vec<String> = Vec::new();
    let criteria = &persona.importance_criteria;

    let mut importance: Option<ImportanceLabel> = None;
    if let Some(pattern) = first_match(&text, &criteria.always_important) {
        importance = Some(ImportanceLabel::Critical);
        reasons.push(format!("matches always-important pattern '{}'", pattern));
    }
    if let Some(pattern) = first_match(&text, &criteria.usually_important) {
        if importance.is_none() {
            importance = Some(ImportanceLabel::High);
        }
        reasons.push(format!("matches usually-important pattern '{}'", pattern));
    }
    if let Some(pattern) = first_match(&text, &criteria.sometimes_important) {
        if importance.is_none() {
            importance = Some(ImportanceLabel::Medium);
        }
        reasons.push(format!("matches sometimes-important pattern '{}'", pattern));
    }
    if let Some(pattern) = first_match(&text, &criteria.rarely_important) {
        if importance.is_none() {
            importance = Some(ImportanceLabel::Low);
        }
        reasons.push(format!("matches rarely-important pattern '{}'", pattern));
    }
    let mut importance = importance.unwrap_or(ImportanceLabel::Medium);

    for framework in &persona.priority_framework {
        if let Some(keyword) = first_match(&text, &framework.keywords) {
            let promoted = importance.promoted();
            if promoted != importance {
                importance = promoted;
                reasons.push(format!(
                    "promoted by priority framework '{}' (keyword '{}')",
                    framework.name, keyword
                ));
            } else {
                reasons.push(format!(
                    "priority framework '{}' matched keyword '{}'",
                    framework.name, keyword
                ));
            }
        }
    }

    let mut prep_needed = false;
    let mut prep_time_minutes: u32 = 0;
    if let Some(pattern) = first_match(&text, &persona.prep_time_needs.requires_prep) {
        prep_needed = true;
        prep_time_minutes = match importance {
            ImportanceLabel::Critical => 60,
            ImportanceLabel::High => 45,
            _ => 30,
        };
        reasons.push(format!("requires preparation (pattern '{}')", pattern));
    }

    if has_external_attendee(meeting, config)
        && matches!(importance, ImportanceLabel::Critical | ImportanceLabel::High)
    {
        prep_needed = true;
        prep_time_minutes = prep_time_minutes.max(30);
        reasons.push("external attendees on an important meeting".to_string());
    }

    LabeledMeeting {
        meeting: meeting.clone(),
        importance_label: importance,
        prep_needed,
        prep_time_minutes,
        reasoning: reasons.join("; "),
        persona_id: persona.id.clone(),
        generated_at: chrono::Utc::now().to_rfc3339(),
    }
}

/// First pattern in `patterns` found in `text`. Patterns are compared
/// lower-cased; empty patterns never match.
fn first_match<'p>(text: &str, patterns: &'p [String]) -> Option<&'p str> {
    patterns
        .iter()
        .map(|p| p.as_str())
        .find(|p| !p.trim().is_empty() && text.contains(p.to_lowercase().as_str()))
}

fn has_external_attendee(meeting: &MeetingRecord, config: &LabelingConfig) -> bool {
    meeting.attendees.iter().any(|a| {
        if a.attendee_type == AttendeeType::Resource {
            return false;
        }
        let domain = match a.email_address.address.rsplit('@').next() {
            Some(d) if !d.is_empty() => d.to_lowercase(),
            _ => return false,
        };
        !config
            .internal_domains
            .iter()
            .any(|internal| internal.eq_ignore_ascii_case(&domain))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::{Attendee, DateTimeTz, EmailAddress, EventType};
    use crate::persona::{ImportanceCriteria, PrepTimeNeeds, PriorityCategory};
    use pretty_assertions::assert_eq;

    fn sales_manager() -> Persona {
        Persona {
            id: "sales-manager-01".to_string(),
            tier: 1,
            importance_criteria: ImportanceCriteria {
                always_important: vec!["pipeline".to_string(), "forecast".to_string()],
                usually_important: vec!["customer".to_string()],
                sometimes_important: vec!["training".to_string()],
                rarely_important: vec!["social".to_string()],
            },
            priority_framework: vec![PriorityCategory {
                name: "Revenue".to_string(),
                keywords: vec!["quota".to_string(), "deal".to_string()],
            }],
            prep_time_needs: PrepTimeNeeds {
                requires_prep: vec!["pipeline".to_string(), "review".to_string()],
                optional_prep: vec!["sync".to_string()],
            },
            ..stub_persona()
        }
    }

    fn stub_persona() -> Persona {
        serde_json::from_str(r#"{"id": "p", "tier": 1}"#).unwrap()
    }

    fn meeting(subject: &str, body: &str, attendees: Vec<Attendee>) -> MeetingRecord {
        MeetingRecord {
            id: "evt-1".to_string(),
            subject: subject.to_string(),
            body_preview: body.to_string(),
            start: DateTimeTz {
                date_time: "2025-06-02T09:00:00".to_string(),
                time_zone: "UTC".to_string(),
            },
            end: DateTimeTz {
                date_time: "2025-06-02T10:00:00".to_string(),
                time_zone: "UTC".to_string(),
            },
            event_type: EventType::SingleInstance,
            organizer: None,
            attendees,
            show_as: "busy".to_string(),
            response_status: None,
        }
    }

    fn internal(address: &str) -> Attendee {
        Attendee {
            attendee_type: AttendeeType::Required,
            email_address: EmailAddress {
                name: String::new(),
                address: address.to_string(),
            },
        }
    }

    #[test]
    fn pipeline_review_is_critical_with_full_prep() {
        let persona = sales_manager();
        let m = meeting(
            "Weekly Pipeline Review - APAC Team",
            "Review of pipeline coverage and slipped deals.",
            vec![internal("sam@contoso.com")],
        );
        let labeled = label(&m, &persona, &LabelingConfig::default());
        assert_eq!(labeled.importance_label, ImportanceLabel::Critical);
        assert!(labeled.prep_needed);
        assert_eq!(labeled.prep_time_minutes, 60);
        assert!(labeled.reasoning.contains("pipeline"));
        assert_eq!(labeled.persona_id, "sales-manager-01");
    }

    #[test]
    fn unmatched_internal_meeting_defaults_to_medium_no_prep() {
        let persona = sales_manager();
        let m = meeting("Coffee chat", "", vec![internal("sam@contoso.com")]);
        let labeled = label(&m, &persona, &LabelingConfig::default());
        assert_eq!(labeled.importance_label, ImportanceLabel::Medium);
        assert!(!labeled.prep_needed);
        assert_eq!(labeled.prep_time_minutes, 0);
        assert_eq!(labeled.reasoning, "");
    }

    #[test]
    fn external_attendee_forces_prep_floor_on_important_meetings() {
        let persona = sales_manager();
        let m = meeting(
            "Customer roadmap briefing",
            "",
            vec![internal("jo@fabrikam.com")],
        );
        let labeled = label(&m, &persona, &LabelingConfig::default());
        assert_eq!(labeled.importance_label, ImportanceLabel::High);
        assert!(labeled.prep_needed);
        assert!(labeled.prep_time_minutes >= 30);
        assert!(!labeled.reasoning.is_empty());
    }

    #[test]
    fn external_attendee_alone_does_not_force_prep_on_medium() {
        let persona = sales_manager();
        let m = meeting("Coffee chat", "", vec![internal("jo@fabrikam.com")]);
        let labeled = label(&m, &persona, &LabelingConfig::default());
        assert_eq!(labeled.importance_label, ImportanceLabel::Medium);
        assert!(!labeled.prep_needed);
    }

    #[test]
    fn resource_attendees_are_never_external() {
        let persona = sales_manager();
        let mut room = internal("room-4@rooms.fabrikam.com");
        room.attendee_type = AttendeeType::Resource;
        let m = meeting("Forecast deep dive", "", vec![room]);
        let labeled = label(&m, &persona, &LabelingConfig::default());
        assert_eq!(labeled.importance_label, ImportanceLabel::Critical);
        // requires_prep did not match, and no external attendee: prep only if
        // patterns say so.
        assert!(!labeled.prep_needed);
    }

    #[test]
    fn priority_framework_promotes_one_level() {
        let persona = sales_manager();
        let m = meeting("Quota planning jam", "", vec![internal("sam@contoso.com")]);
        let labeled = label(&m, &persona, &LabelingConfig::default());
        // No importance category matched; default medium promoted to high.
        assert_eq!(labeled.importance_label, ImportanceLabel::High);
        assert!(labeled.reasoning.contains("Revenue"));
    }

    #[test]
    fn rarely_important_maps_to_low() {
        let persona = sales_manager();
        let m = meeting("Team social hour", "", vec![internal("sam@contoso.com")]);
        let labeled = label(&m, &persona, &LabelingConfig::default());
        assert_eq!(labeled.importance_label, ImportanceLabel::Low);
        assert!(labeled.reasoning.contains("rarely-important"));
    }
}
