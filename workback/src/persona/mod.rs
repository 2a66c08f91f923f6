//! Persona profiles: declarative rule bases for labeling meetings.
//!
//! One JSON file per persona. Rule fields are lists of case-insensitive
//! substrings; the engine in [`rules`] applies them. Loading validates just
//! enough to catch files that would silently label nothing.

pub mod rules;

pub use rules::{label, LabelingConfig};

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Demographics {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub industry: String,
    #[serde(default)]
    pub company_size: String,
    #[serde(default)]
    pub location: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MeetingContext {
    /// Free-form range such as "20-25" or "28-32 hours".
    #[serde(default)]
    pub weekly_meeting_hours: String,
    /// Share of the week per meeting category, e.g. {"1:1s": 0.3}.
    #[serde(default)]
    pub typical_breakdown: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ImportanceCriteria {
    #[serde(default)]
    pub always_important: Vec<String>,
    #[serde(default)]
    pub usually_important: Vec<String>,
    #[serde(default)]
    pub sometimes_important: Vec<String>,
    #[serde(default)]
    pub rarely_important: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorityCategory {
    pub name: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RsvpRules {
    #[serde(default)]
    pub always_accept: Vec<String>,
    #[serde(default)]
    pub usually_accept: Vec<String>,
    #[serde(default)]
    pub decline: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PrepTimeNeeds {
    #[serde(default)]
    pub requires_prep: Vec<String>,
    #[serde(default)]
    pub optional_prep: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Persona {
    pub id: String,
    pub tier: u8,
    #[serde(default)]
    pub demographics: Demographics,
    #[serde(default)]
    pub meeting_context: MeetingContext,
    #[serde(default)]
    pub importance_criteria: ImportanceCriteria,
    #[serde(default)]
    pub priority_framework: Vec<PriorityCategory>,
    #[serde(default)]
    pub rsvp_rules: RsvpRules,
    #[serde(default)]
    pub prep_time_needs: PrepTimeNeeds,
    #[serde(default)]
    pub work_style: String,
    #[serde(default)]
    pub career_stage: String,
    #[serde(default)]
    pub stress_level: String,
}

impl Persona {
    /// Load and validate one persona file.
    pub fn from_file(path: &Path) -> Result<Persona> {
        let invalid = |reason: String| PipelineError::PersonaInvalid {
            path: path.display().to_string(),
            reason,
        };
        let raw = std::fs::read_to_string(path)
            .map_err(|e| invalid(format!("unreadable: {}", e)))?;
        let persona: Persona =
            serde_json::from_str(&raw).map_err(|e| invalid(format!("malformed JSON: {}", e)))?;
        if persona.id.trim().is_empty() {
            return Err(invalid("persona id is empty".to_string()));
        }
        if !(1..=3).contains(&persona.tier) {
            return Err(invalid(format!("tier {} outside 1..=3", persona.tier)));
        }
        Ok(persona)
    }
}

/// Load every persona JSON file under a directory, optionally filtered by
/// tier. Invalid files fail the load; a missing directory is a config error.
pub fn load_personas(dir: &Path, tier: Option<u8>) -> Result<Vec<Persona>> {
    let mut personas = Vec::new();
    let entries = std::fs::read_dir(dir).map_err(|e| {
        PipelineError::Config(format!("cannot read persona directory {}: {}", dir.display(), e))
    })?;
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let persona = Persona::from_file(&path)?;
        if tier.map_or(true, |t| persona.tier == t) {
            personas.push(persona);
        }
    }
    personas.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(personas)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_persona(dir: &Path, name: &str, body: &str) {
        std::fs::write(dir.join(name), body).unwrap();
    }

    #[test]
    fn loads_and_filters_by_tier() {
        let dir = tempfile::tempdir().unwrap();
        write_persona(dir.path(), "a.json", r#"{"id": "a", "tier": 1}"#);
        write_persona(dir.path(), "b.json", r#"{"id": "b", "tier": 2}"#);
        write_persona(dir.path(), "notes.txt", "not a persona");

        let all = load_personas(dir.path(), None).unwrap();
        assert_eq!(all.len(), 2);
        let tier2 = load_personas(dir.path(), Some(2)).unwrap();
        assert_eq!(tier2.len(), 1);
        assert_eq!(tier2[0].id, "b");
    }

    #[test]
    fn rejects_out_of_range_tier() {
        let dir = tempfile::tempdir().unwrap();
        write_persona(dir.path(), "bad.json", r#"{"id": "x", "tier": 7}"#);
        let err = load_personas(dir.path(), None).unwrap_err();
        assert!(matches!(err, PipelineError::PersonaInvalid { .. }));
    }

    #[test]
    fn rejects_empty_id() {
        let dir = tempfile::tempdir().unwrap();
        write_persona(dir.path(), "bad.json", r#"{"id": "  ", "tier": 1}"#);
        assert!(load_personas(dir.path(), None).is_err());
    }
}
