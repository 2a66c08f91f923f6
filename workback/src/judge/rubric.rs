//! The fixed plan-quality rubric: 50 assertions in five groups.
//!
//! Rubric size and grouping are part of the judging contract; the aggregate
//! score is always `(|passed| + 0.5·|partial|) / 50`.

use std::collections::HashMap;

use once_cell::sync::Lazy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assertion {
    pub id: &'static str,
    pub text: &'static str,
}

pub const RUBRIC_SIZE: usize = 50;

/// Accuracy (A), Completeness (C), Relevance (R), Usefulness (U),
/// Exceptional (E).
pub const RUBRIC: [Assertion; RUBRIC_SIZE] = [
    Assertion { id: "A1", text: "The plan's goal restates the brief's goal without distortion." },
    Assertion { id: "A2", text: "The target date matches the date given or implied by the brief." },
    Assertion { id: "A3", text: "Every named participant from the brief appears in the plan." },
    Assertion { id: "A4", text: "No participant is invented who is absent from the brief." },
    Assertion { id: "A5", text: "Every milestone owner is a listed participant." },
    Assertion { id: "A6", text: "Every task owner is a listed participant." },
    Assertion { id: "A7", text: "Every task belongs to a milestone that exists in the plan." },
    Assertion { id: "A8", text: "Milestone dependencies form no cycles." },
    Assertion { id: "A9", text: "Due dates never precede the due date of a dependency." },
    Assertion { id: "A10", text: "All dates fall between today and the target date, inclusive." },
    Assertion { id: "C1", text: "The plan contains at least three milestones." },
    Assertion { id: "C2", text: "Every milestone has at least one contributing task." },
    Assertion { id: "C3", text: "The final milestone lands on or before the target date." },
    Assertion { id: "C4", text: "Preparation work (agenda, materials) is explicitly planned." },
    Assertion { id: "C5", text: "Review or dry-run time is scheduled before the target date." },
    Assertion { id: "C6", text: "Data or metric collection is planned where the brief needs it." },
    Assertion { id: "C7", text: "Stakeholder sign-off is represented as a milestone or task." },
    Assertion { id: "C8", text: "Artifacts are listed for deliverable-producing tasks." },
    Assertion { id: "C9", text: "Each participant owns at least one milestone or task." },
    Assertion { id: "C10", text: "Dependencies between workstreams are made explicit." },
    Assertion { id: "C11", text: "Tasks carry start and end dates where sequencing matters." },
    Assertion { id: "C12", text: "The plan covers communication or announcement work when relevant." },
    Assertion { id: "C13", text: "Contingency or buffer time exists before the target date." },
    Assertion { id: "C14", text: "No milestone is an orphan with neither tasks nor dependents." },
    Assertion { id: "C15", text: "The plan addresses every constraint stated in the brief." },
    Assertion { id: "R1", text: "Milestones correspond to real phases of the stated goal." },
    Assertion { id: "R2", text: "No milestone or task is generic filler unrelated to the brief." },
    Assertion { id: "R3", text: "Task titles are concrete actions, not vague themes." },
    Assertion { id: "R4", text: "Owners match their stated roles in the brief." },
    Assertion { id: "R5", text: "The vertical or domain of the brief is reflected in the work items." },
    Assertion { id: "R6", text: "Sequencing reflects genuine prerequisites, not arbitrary order." },
    Assertion { id: "R7", text: "Scope stays within the brief; no unrelated initiatives appear." },
    Assertion { id: "R8", text: "Meeting-specific logistics appear only if the brief needs them." },
    Assertion { id: "R9", text: "Granularity is appropriate: neither one giant task nor micro-steps." },
    Assertion { id: "R10", text: "Artifacts named are the kind this goal actually produces." },
    Assertion { id: "U1", text: "A reader could start executing tomorrow without clarification." },
    Assertion { id: "U2", text: "Dates are spread realistically rather than bunched at the deadline." },
    Assertion { id: "U3", text: "Each owner's load is plausible for the time window." },
    Assertion { id: "U4", text: "Dependencies give early warning when slippage threatens the date." },
    Assertion { id: "U5", text: "Milestone titles make progress externally legible." },
    Assertion { id: "U6", text: "The plan identifies the critical path implicitly or explicitly." },
    Assertion { id: "U7", text: "Work starts promptly rather than idling before the first milestone." },
    Assertion { id: "U8", text: "The plan would survive one participant being unavailable a week." },
    Assertion { id: "U9", text: "Status checkpoints exist at reasonable intervals." },
    Assertion { id: "U10", text: "The structure would transfer to a tracking tool without rework." },
    Assertion { id: "E1", text: "The plan surfaces a risk the brief did not state." },
    Assertion { id: "E2", text: "The decomposition shows insight beyond restating the brief." },
    Assertion { id: "E3", text: "Buffering and sequencing show judgment about likely slippage." },
    Assertion { id: "E4", text: "Ownership assignments exploit participants' specific strengths." },
    Assertion { id: "E5", text: "The plan anticipates follow-through after the target date." },
];

static BY_ID: Lazy<HashMap<&'static str, &'static str>> =
    Lazy::new(|| RUBRIC.iter().map(|a| (a.id, a.text)).collect());

/// Human text for an assertion id, if the id is part of the rubric.
pub fn assertion_text(id: &str) -> Option<&'static str> {
    BY_ID.get(id).copied()
}

pub fn is_known(id: &str) -> bool {
    BY_ID.contains_key(id)
}

/// All assertion ids in rubric order.
pub fn all_ids() -> impl Iterator<Item = &'static str> {
    RUBRIC.iter().map(|a| a.id)
}

/// The rubric rendered for inclusion in the judge prompt.
pub fn rubric_block() -> String {
    let mut out = String::new();
    for a in &RUBRIC {
        out.push_str(a.id);
        out.push_str(": ");
        out.push_str(a.text);
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rubric_has_exactly_fifty_unique_assertions() {
        assert_eq!(RUBRIC.len(), 50);
        let ids: std::collections::HashSet<_> = all_ids().collect();
        assert_eq!(ids.len(), 50);
    }

    #[test]
    fn groups_have_contractual_sizes() {
        let count = |prefix: char| all_ids().filter(|id| id.starts_with(prefix)).count();
        assert_eq!(count('A'), 10);
        assert_eq!(count('C'), 15);
        assert_eq!(count('R'), 10);
        assert_eq!(count('U'), 10);
        assert_eq!(count('E'), 5);
    }

    #[test]
    fn lookup_round_trips() {
        assert!(assertion_text("C15").unwrap().contains("constraint"));
        assert!(assertion_text("Z9").is_none());
    }
}
