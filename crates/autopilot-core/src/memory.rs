//! Decision memory: append-only entries with retroactive outcomes
//!
//! Entries are created as `pending` at Learn time and transitioned to an
//! evaluated outcome exactly once, days later. The context hash is a
//! coarse bucketing key for retrieval ranking only — lossy by design,
//! never used for identity.

use crate::types::{Department, Timestamp};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Evaluated outcome of a past decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Pending,
    Positive,
    Negative,
    Neutral,
}

impl Outcome {
    pub fn is_evaluated(self) -> bool {
        self != Outcome::Pending
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Pending => "pending",
            Outcome::Positive => "positive",
            Outcome::Negative => "negative",
            Outcome::Neutral => "neutral",
        }
    }
}

/// One remembered decision and, once evaluated, its lesson.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: Uuid,
    pub company_id: Uuid,
    pub department: Department,
    pub cycle_id: Uuid,
    pub decision_type: String,

    /// Free-text summary of the decision context at the time.
    pub context: String,
    pub context_hash: String,

    pub outcome: Outcome,
    pub outcome_score: Option<f64>,
    pub lesson: Option<String>,
    /// Forward-applicable rules extracted from groups of positive
    /// entries; attached to the most recent entry of the group.
    pub extracted_rules: Vec<String>,

    pub created_at: Timestamp,
    pub evaluated_at: Option<Timestamp>,
}

impl MemoryEntry {
    pub fn pending(
        company_id: Uuid,
        department: Department,
        cycle_id: Uuid,
        decision_type: impl Into<String>,
        context: impl Into<String>,
        created_at: Timestamp,
    ) -> Self {
        let decision_type = decision_type.into();
        let context = context.into();
        let context_hash = context_hash(department, &decision_type, &context);
        Self {
            id: Uuid::new_v4(),
            company_id,
            department,
            cycle_id,
            decision_type,
            context,
            context_hash,
            outcome: Outcome::Pending,
            outcome_score: None,
            lesson: None,
            extracted_rules: Vec::new(),
            created_at,
            evaluated_at: None,
        }
    }
}

/// Coarse similarity key over (department, decision type, context).
/// Truncated blake3 — collisions only cost retrieval precision.
pub fn context_hash(department: Department, decision_type: &str, context: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(department.as_str().as_bytes());
    hasher.update(b"\x1f");
    hasher.update(decision_type.as_bytes());
    hasher.update(b"\x1f");
    hasher.update(context.as_bytes());
    hasher.finalize().to_hex()[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::now;

    #[test]
    fn hash_is_stable_and_department_scoped() {
        let a = context_hash(Department::Marketing, "publish", "3 channels, flat engagement");
        let b = context_hash(Department::Marketing, "publish", "3 channels, flat engagement");
        let c = context_hash(Department::Sales, "publish", "3 channels, flat engagement");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn new_entries_start_pending() {
        let entry = MemoryEntry::pending(
            Uuid::new_v4(),
            Department::Hr,
            Uuid::new_v4(),
            "schedule_checkin",
            "2 new members this month",
            now(),
        );
        assert_eq!(entry.outcome, Outcome::Pending);
        assert!(!entry.outcome.is_evaluated());
        assert!(entry.evaluated_at.is_none());
    }
}
