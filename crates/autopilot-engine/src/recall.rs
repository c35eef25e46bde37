//! Memory retrieval for Think
//!
//! Pulls recent evaluated entries, prefers ones whose context hash
//! matches the current cycle's context, dedupes by (decision type,
//! lesson) and flattens extracted rules. Purely a ranking concern; a
//! collision in the hash only costs retrieval precision.

use autopilot_core::ports::MemoryStore;
use autopilot_core::{Department, MemoryEntry};
use std::collections::HashSet;
use tracing::warn;
use uuid::Uuid;

const RECALL_LIMIT: usize = 10;
const SCAN_LIMIT: usize = 50;

/// Lessons and rules handed to the prompt builder.
#[derive(Debug, Clone, Default)]
pub struct RecalledMemory {
    pub lessons: Vec<String>,
    pub rules: Vec<String>,
}

impl RecalledMemory {
    pub fn is_empty(&self) -> bool {
        self.lessons.is_empty() && self.rules.is_empty()
    }
}

/// Retrieve up to 10 lessons for the given context hash. Store failures
/// degrade to an empty recall.
pub fn recall<S: MemoryStore>(
    store: &S,
    company_id: Uuid,
    department: Department,
    context_hash: &str,
) -> RecalledMemory {
    let entries = match store.evaluated_entries(company_id, department, SCAN_LIMIT) {
        Ok(entries) => entries,
        Err(error) => {
            warn!(%error, "memory recall failed, continuing without lessons");
            return RecalledMemory::default();
        }
    };

    // Context-hash matches first, then the rest, both newest-first.
    let (matching, rest): (Vec<_>, Vec<_>) = entries
        .into_iter()
        .partition(|entry| entry.context_hash == context_hash);

    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut lessons = Vec::new();
    let mut rules = Vec::new();
    let mut rule_set = HashSet::new();

    for entry in matching.into_iter().chain(rest) {
        if lessons.len() >= RECALL_LIMIT {
            break;
        }
        let Some(lesson) = entry.lesson.clone() else {
            continue;
        };
        if !seen.insert((entry.decision_type.clone(), lesson.clone())) {
            continue;
        }
        lessons.push(render_lesson(&entry, &lesson));
        for rule in &entry.extracted_rules {
            if rule_set.insert(rule.clone()) {
                rules.push(rule.clone());
            }
        }
    }

    RecalledMemory { lessons, rules }
}

fn render_lesson(entry: &MemoryEntry, lesson: &str) -> String {
    format!(
        "past {} decision ({}): {}",
        entry.decision_type,
        entry.outcome.as_str(),
        lesson
    )
}
