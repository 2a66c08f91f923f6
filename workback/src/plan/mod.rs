//! The workback plan data model and its invariant checks.
//!
//! Plans are immutable value objects once emitted. The generator is allowed
//! to emit plans that violate referential or ordering invariants (the judge
//! must see the flaws for the preference signal to be informative), so the
//! checks live here as a lint, not as constructors that reject.

pub mod generator;

pub use generator::{PlanGenerator, PlanGeneration};

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Milestone {
    pub id: String,
    pub title: String,
    pub due_date: NaiveDate,
    pub owner_id: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub owner_id: String,
    pub milestone_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: String,
    pub title: String,
    pub produced_by_task_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanMeta {
    pub goal: String,
    pub target_date: NaiveDate,
    pub vertical: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub participants: Vec<Participant>,
    pub milestones: Vec<Milestone>,
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
    pub meta: PlanMeta,
    /// Generation provenance (model, hashes, latency). Not part of the plan
    /// semantics.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl Plan {
    /// Report every invariant violation in this plan. Empty means the plan
    /// is well-formed.
    pub fn violations(&self) -> Vec<String> {
        let mut out = Vec::new();
        let participants: HashSet<&str> =
            self.participants.iter().map(|p| p.id.as_str()).collect();
        let milestone_ids: HashSet<&str> =
            self.milestones.iter().map(|m| m.id.as_str()).collect();

        for m in &self.milestones {
            if !participants.contains(m.owner_id.as_str()) {
                out.push(format!(
                    "milestone {} owner '{}' is not a participant",
                    m.id, m.owner_id
                ));
            }
            for dep in &m.depends_on {
                if !milestone_ids.contains(dep.as_str()) {
                    out.push(format!(
                        "milestone {} depends on unknown milestone '{}'",
                        m.id, dep
                    ));
                }
            }
        }

        for t in &self.tasks {
            if !participants.contains(t.owner_id.as_str()) {
                out.push(format!("task {} owner '{}' is not a participant", t.id, t.owner_id));
            }
            if !milestone_ids.contains(t.milestone_id.as_str()) {
                out.push(format!(
                    "task {} references unknown milestone '{}'",
                    t.id, t.milestone_id
                ));
            }
            if let (Some(start), Some(end)) = (t.start_date, t.end_date) {
                if start > end {
                    out.push(format!("task {} starts after it ends ({} > {})", t.id, start, end));
                }
            }
        }

        if self.milestone_cycle() {
            out.push("milestone dependency graph contains a cycle".to_string());
        } else {
            // Monotonicity only makes sense on an acyclic graph.
            let due: HashMap<&str, NaiveDate> = self
                .milestones
                .iter()
                .map(|m| (m.id.as_str(), m.due_date))
                .collect();
            for m in &self.milestones {
                for dep in &m.depends_on {
                    if let Some(dep_due) = due.get(dep.as_str()) {
                        if *dep_due > m.due_date {
                            out.push(format!(
                                "milestone {} (due {}) precedes its dependency {} (due {})",
                                m.id, m.due_date, dep, dep_due
                            ));
                        }
                    }
                }
            }
        }

        out
    }

    /// Kahn's algorithm over the `depends_on` relation. Unknown dependency
    /// ids are ignored here; they are reported separately.
    fn milestone_cycle(&self) -> bool {
        let ids: HashSet<&str> = self.milestones.iter().map(|m| m.id.as_str()).collect();
        let mut indegree: HashMap<&str, usize> =
            self.milestones.iter().map(|m| (m.id.as_str(), 0)).collect();
        let mut edges: HashMap<&str, Vec<&str>> = HashMap::new();
        for m in &self.milestones {
            for dep in &m.depends_on {
                if ids.contains(dep.as_str()) {
                    edges.entry(dep.as_str()).or_default().push(m.id.as_str());
                    *indegree.entry(m.id.as_str()).or_default() += 1;
                }
            }
        }
        let mut queue: VecDeque<&str> = indegree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut visited = 0;
        while let Some(id) = queue.pop_front() {
            visited += 1;
            if let Some(next) = edges.get(id) {
                for &n in next {
                    if let Some(d) = indegree.get_mut(n) {
                        *d -= 1;
                        if *d == 0 {
                            queue.push_back(n);
                        }
                    }
                }
            }
        }
        visited != self.milestones.len()
    }

    /// Milestone ids in a topological order of the dependency relation.
    /// Returns `None` when the graph has a cycle.
    pub fn topological_milestones(&self) -> Option<Vec<String>> {
        if self.milestone_cycle() {
            return None;
        }
        let mut order: Vec<String> = Vec::with_capacity(self.milestones.len());
        let mut placed: HashSet<&str> = HashSet::new();
        // Stable insertion-order walk; small graphs, quadratic is fine.
        while order.len() < self.milestones.len() {
            let before = order.len();
            for m in &self.milestones {
                if placed.contains(m.id.as_str()) {
                    continue;
                }
                let ready = m
                    .depends_on
                    .iter()
                    .all(|d| placed.contains(d.as_str()) || !self.has_milestone(d));
                if ready {
                    placed.insert(m.id.as_str());
                    order.push(m.id.clone());
                }
            }
            if order.len() == before {
                return None;
            }
        }
        Some(order)
    }

    fn has_milestone(&self, id: &str) -> bool {
        self.milestones.iter().any(|m| m.id == id)
    }
}
