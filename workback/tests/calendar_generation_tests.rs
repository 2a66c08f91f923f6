//! Synthetic calendar generation with scripted batches: sizing, ordering,
//! recurring-slot coherence, and labeling.

mod common;

use std::collections::HashMap;
use std::time::Duration;

use chrono::{Datelike, NaiveDate};
use workback::calendar::{CalendarGenerator, EventType};
use workback::persona::{LabelingConfig, Persona};

fn persona() -> Persona {
    serde_json::from_str(
        r#"{
        "id": "sales-manager-01",
        "tier": 1,
        "demographics": {"role": "sales manager", "industry": "software"},
        "meeting_context": {"weekly_meeting_hours": "20-25"},
        "importance_criteria": {"always_important": ["pipeline"]},
        "prep_time_needs": {"requires_prep": ["pipeline"]}
    }"#,
    )
    .unwrap()
}

/// Build one scripted batch: `count` one-hour meetings on consecutive
/// weekdays starting at `start`, every fifth a recurring team sync pinned to
/// Monday 09:00.
fn batch_json(start: NaiveDate, count: usize) -> String {
    let mut events = Vec::with_capacity(count);
    for i in 0..count {
        let recurring = i % 5 == 0;
        let day_offset = if recurring {
            // Same weekday each week: the window's Monday.
            (i / 5) as u64 * 7
        } else {
            (i % 12) as u64
        };
        let date = start + chrono::Days::new(day_offset);
        let hour = if recurring { 9 } else { 10 + (i % 7) };
        events.push(serde_json::json!({
            "id": format!("evt-{}-{}", start, i),
            "subject": if recurring { "Weekly Team Sync".to_string() } else { format!("Pipeline working session {}", i) },
            "bodyPreview": "pipeline discussion",
            "start": {"dateTime": format!("{}T{:02}:00:00", date, hour), "timeZone": "UTC"},
            "end": {"dateTime": format!("{}T{:02}:00:00", date, hour + 1), "timeZone": "UTC"},
            "type": if recurring { "occurrence" } else { "singleInstance" },
            "organizer": {"emailAddress": {"name": "Avery", "address": "avery@contoso.com"}},
            "attendees": [
                {"type": "required", "emailAddress": {"name": "Sam", "address": "sam@contoso.com"}}
            ],
            "showAs": "busy",
            "responseStatus": {"response": "accepted"}
        }));
    }
    serde_json::to_string(&events).unwrap()
}

#[tokio::test]
async fn four_week_calendar_has_expected_volume_and_order() {
    // "20-25" hours -> 22 meetings/week -> 44 per two-week window, batched
    // as 20 + 20 + 4, over two windows.
    let start = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap(); // a Monday
    let second_window = start + chrono::Days::new(14);
    let responses = vec![
        batch_json(start, 20),
        batch_json(start, 20),
        batch_json(start, 4),
        batch_json(second_window, 20),
        batch_json(second_window, 20),
        batch_json(second_window, 4),
    ];
    let gateway = common::scripted_gateway(responses);
    let generator =
        CalendarGenerator::new(&gateway, common::stub_model(), LabelingConfig::default())
            .with_batch_delay(Duration::from_millis(1));

    let calendar = generator
        .generate_calendar(&persona(), 4, Some(start))
        .await
        .unwrap();

    // Within +/-30% of 22.5 * 4 = 90.
    assert!(calendar.len() >= 63 && calendar.len() <= 117, "{}", calendar.len());

    // Sorted ascending by start, and every meeting starts before it ends.
    for pair in calendar.windows(2) {
        assert!(pair[0].meeting.start.date_time <= pair[1].meeting.start.date_time);
    }
    for labeled in &calendar {
        let start = labeled.meeting.start_time().unwrap();
        let end = labeled.meeting.end_time().unwrap();
        assert!(start < end);
    }

    // Recurring events sharing a subject+time anchor stay on one weekday.
    let mut anchors: HashMap<(String, String), chrono::Weekday> = HashMap::new();
    for labeled in &calendar {
        if labeled.meeting.event_type != EventType::Occurrence {
            continue;
        }
        let time_of_day = labeled
            .meeting
            .start_time()
            .unwrap()
            .format("%H:%M")
            .to_string();
        let key = (labeled.meeting.subject.clone(), time_of_day);
        let weekday = labeled.meeting.start_time().unwrap().weekday();
        let entry = anchors.entry(key).or_insert(weekday);
        assert_eq!(*entry, weekday, "recurring series drifted across weekdays");
    }

    // Every meeting is labeled for the persona.
    for labeled in &calendar {
        assert_eq!(labeled.persona_id, "sales-manager-01");
        assert!(!labeled.generated_at.is_empty());
    }
}

#[tokio::test]
async fn failing_batches_are_dropped_not_fatal() {
    let start = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
    // One good batch, one hopeless batch; 10-hour persona -> one window,
    // 20 meetings requested in one batch... use a 1-week persona instead.
    let persona: Persona = serde_json::from_str(
        r#"{
        "id": "p-small",
        "tier": 2,
        "meeting_context": {"weekly_meeting_hours": "40"}
    }"#,
    )
    .unwrap();
    // 40/week over 1 week -> batches of 20 + 20.
    let responses = vec![batch_json(start, 20), "not a json array at all".to_string()];
    let gateway = common::scripted_gateway(responses);
    let generator =
        CalendarGenerator::new(&gateway, common::stub_model(), LabelingConfig::default())
            .with_batch_delay(Duration::from_millis(1));

    let calendar = generator
        .generate_calendar(&persona, 1, Some(start))
        .await
        .unwrap();
    assert_eq!(calendar.len(), 20);
}

#[tokio::test]
async fn labels_flow_from_the_persona_rule_base() {
    let start = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
    let persona: Persona = serde_json::from_str(
        r#"{
        "id": "p-label",
        "tier": 1,
        "meeting_context": {"weekly_meeting_hours": "1"},
        "importance_criteria": {"always_important": ["pipeline"]},
        "prep_time_needs": {"requires_prep": ["pipeline"]}
    }"#,
    )
    .unwrap();
    let gateway = common::scripted_gateway(vec![batch_json(start, 1)]);
    let generator =
        CalendarGenerator::new(&gateway, common::stub_model(), LabelingConfig::default())
            .with_batch_delay(Duration::from_millis(1));

    let calendar = generator
        .generate_calendar(&persona, 1, Some(start))
        .await
        .unwrap();
    assert_eq!(calendar.len(), 1);
    // Subject/body mention "pipeline": always-important with required prep.
    assert!(calendar[0].prep_needed);
    assert_eq!(calendar[0].prep_time_minutes, 60);
    assert!(calendar[0].reasoning.contains("pipeline"));
}
