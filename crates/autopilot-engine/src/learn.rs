//! Learn phase: persistence, retroactive outcomes, pattern extraction
//!
//! Three passes per cycle:
//! 1. persist every decision verbatim, seeding a pending memory entry
//!    for each executed one;
//! 2. evaluate entries that have been pending for at least the cooldown,
//!    transitioning each exactly once (the store enforces one-shot);
//! 3. compress groups of three or more positive same-type entries into
//!    standing rules through the oracle, attached to the newest entry of
//!    the group.

use crate::oracle::{extract_json_array, Oracle, OracleRequest};
use autopilot_core::decision::Decision;
use autopilot_core::memory::{MemoryEntry, Outcome};
use autopilot_core::ports::{DecisionStore, MemoryStore, OperationalData, UsageLedger};
use autopilot_core::snapshot::SenseSnapshot;
use autopilot_core::{Department, Timestamp};
use chrono::Duration;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Days an entry stays pending before it can be evaluated.
pub const EVALUATION_COOLDOWN_DAYS: i64 = 7;

/// Minimum group size for rule extraction.
const PATTERN_MIN_POSITIVES: usize = 3;

const PATTERN_SYSTEM_PROMPT: &str = "You distill operational lessons into standing rules. \
    Given several positive outcomes of the same decision type, answer with a JSON array of 1 to \
    3 short imperative rule strings. No other text.";

/// Outcome score thresholds for the positive/negative split.
const POSITIVE_THRESHOLD: f64 = 0.2;
const NEGATIVE_THRESHOLD: f64 = -0.2;

/// Persist the cycle's decisions and seed pending memory for the
/// executed ones.
pub fn persist_and_seed<S>(
    store: &S,
    decisions: &[Decision],
    snapshot: &SenseSnapshot,
    cycle_id: Uuid,
    now: Timestamp,
) -> autopilot_core::Result<u32>
where
    S: DecisionStore + MemoryStore,
{
    let mut seeded = 0;
    for decision in decisions {
        store.insert_decision(decision)?;
        if !decision.action_taken {
            continue;
        }
        let context = format!(
            "{} | snapshot: {}",
            decision.description,
            serde_json::to_string(&snapshot.metrics).unwrap_or_default()
        );
        let entry = MemoryEntry::pending(
            decision.company_id,
            decision.department,
            cycle_id,
            decision.decision_type.clone(),
            context,
            now,
        );
        store.insert_entry(&entry)?;
        seeded += 1;
    }
    Ok(seeded)
}

/// Evaluate entries pending for longer than the cooldown against current
/// department metrics. Returns how many transitioned this call.
pub fn evaluate_pending<S>(
    store: &S,
    company_id: Uuid,
    department: Department,
    now: Timestamp,
) -> autopilot_core::Result<u32>
where
    S: MemoryStore + OperationalData + UsageLedger,
{
    let cutoff = now - Duration::days(EVALUATION_COOLDOWN_DAYS);
    let pending = store.pending_entries_before(company_id, department, cutoff)?;
    let mut evaluated = 0;
    for entry in pending {
        let score = outcome_score(store, &entry, now);
        let outcome = if score > POSITIVE_THRESHOLD {
            Outcome::Positive
        } else if score < NEGATIVE_THRESHOLD {
            Outcome::Negative
        } else {
            Outcome::Neutral
        };
        let lesson = render_lesson(&entry, outcome, score);
        // One-shot: a concurrent evaluation loses quietly.
        match store.mark_evaluated(entry.id, outcome, score, &lesson, now) {
            Ok(true) => evaluated += 1,
            Ok(false) => debug!(entry_id = %entry.id, "entry already evaluated, skipping"),
            Err(error) => warn!(%error, entry_id = %entry.id, "outcome write failed"),
        }
    }
    if evaluated > 0 {
        info!(%department, evaluated, "memory entries evaluated");
    }
    Ok(evaluated)
}

/// Department-metric delta since the entry was created, normalized to
/// roughly [-1, 1].
fn outcome_score<S>(store: &S, entry: &MemoryEntry, now: Timestamp) -> f64
where
    S: OperationalData + UsageLedger,
{
    let since = entry.created_at;
    let clamp = |v: f64| v.clamp(-1.0, 1.0);
    match entry.department {
        Department::Marketing => {
            let posts = store.posts_since(entry.company_id, since).unwrap_or_default();
            if posts.is_empty() {
                return 0.0;
            }
            let avg = posts.iter().map(|p| p.engagement).sum::<f64>() / posts.len() as f64;
            // 10 engagement per post is a solid outcome for a small company.
            clamp(avg / 10.0 - 0.5)
        }
        Department::Sales => {
            let deals = store.deals(entry.company_id).unwrap_or_default();
            let touched = deals.iter().filter(|d| d.updated_at >= since).count();
            clamp(touched as f64 / 3.0 - 0.3)
        }
        Department::Finance => {
            let window = now - since;
            let before = store
                .credits_spent_since(entry.company_id, since - window)
                .unwrap_or(0.0);
            let after = store.credits_spent_since(entry.company_id, since).unwrap_or(0.0);
            let before_only = before - after;
            if before_only <= 0.0 {
                return 0.0;
            }
            // Falling burn after the decision reads as positive.
            clamp((before_only - after) / before_only)
        }
        Department::Legal => {
            let updates = store
                .activity_count_since(entry.company_id, "legal", since)
                .unwrap_or(0);
            clamp(updates as f64 / 3.0 - 0.3)
        }
        Department::Hr => {
            let members = store.members(entry.company_id).unwrap_or_default();
            let joined = members.iter().filter(|m| m.joined_at >= since).count();
            let updates = store
                .activity_count_since(entry.company_id, "hr", since)
                .unwrap_or(0);
            clamp((joined as f64 + updates as f64) / 4.0 - 0.25)
        }
        Department::Operations => {
            let tasks = store.tasks_since(entry.company_id, since).unwrap_or_default();
            if tasks.is_empty() {
                return 0.0;
            }
            let completed = tasks.iter().filter(|t| t.completed).count() as f64;
            let failed = tasks.iter().filter(|t| t.agent_failed).count() as f64;
            clamp(completed / tasks.len() as f64 - failed / tasks.len() as f64 - 0.3)
        }
    }
}

fn render_lesson(entry: &MemoryEntry, outcome: Outcome, score: f64) -> String {
    match outcome {
        Outcome::Positive => format!(
            "'{}' moved the {} metrics forward (score {score:.2})",
            entry.decision_type, entry.department
        ),
        Outcome::Negative => format!(
            "'{}' did not pay off for {} (score {score:.2})",
            entry.decision_type, entry.department
        ),
        _ => format!(
            "'{}' left the {} metrics unchanged",
            entry.decision_type, entry.department
        ),
    }
}

/// Compress repeated positives into standing rules. Oracle failures skip
/// the group; the entries stay eligible next cycle.
pub async fn extract_patterns<S, O>(
    store: &S,
    oracle: &O,
    company_id: Uuid,
    department: Department,
) -> autopilot_core::Result<u32>
where
    S: MemoryStore,
    O: Oracle,
{
    let entries = store.evaluated_entries(company_id, department, 100)?;
    let mut groups: HashMap<&str, Vec<&MemoryEntry>> = HashMap::new();
    for entry in &entries {
        if entry.outcome == Outcome::Positive {
            groups.entry(entry.decision_type.as_str()).or_default().push(entry);
        }
    }

    let mut extracted = 0;
    for (decision_type, group) in groups {
        if group.len() < PATTERN_MIN_POSITIVES {
            continue;
        }
        // Entries are newest-first; rules already attached means the
        // group was compressed before.
        if group.iter().any(|entry| !entry.extracted_rules.is_empty()) {
            continue;
        }
        let lessons: Vec<&str> = group
            .iter()
            .filter_map(|entry| entry.lesson.as_deref())
            .collect();
        let request = OracleRequest::new(
            PATTERN_SYSTEM_PROMPT,
            format!(
                "Decision type: {decision_type}. Positive lessons:\n{}",
                lessons.join("\n")
            ),
        );
        let rules = match fetch_rules(oracle, &request).await {
            Ok(rules) if !rules.is_empty() => rules,
            Ok(_) => continue,
            Err(error) => {
                warn!(%error, decision_type, "pattern extraction failed, skipping group");
                continue;
            }
        };
        let newest = group[0];
        store.attach_rules(newest.id, &rules)?;
        extracted += 1;
        info!(decision_type, rules = rules.len(), "standing rules extracted");
    }
    Ok(extracted)
}

async fn fetch_rules<O: Oracle>(
    oracle: &O,
    request: &OracleRequest,
) -> Result<Vec<String>, autopilot_core::OracleError> {
    let content = oracle.complete(request).await?;
    let items = extract_json_array(&content)?;
    Ok(items
        .into_iter()
        .filter_map(|item| match item {
            Value::String(rule) => Some(rule),
            _ => None,
        })
        .take(3)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use autopilot_core::now;
    use autopilot_core::ports::MemoryStore as _;
    use autopilot_core::OracleError;
    use autopilot_store::SqliteStore;

    struct FixedOracle(String);

    #[async_trait::async_trait]
    impl Oracle for FixedOracle {
        async fn complete(&self, _request: &OracleRequest) -> Result<String, OracleError> {
            Ok(self.0.clone())
        }
    }

    fn backdated_entry(
        store: &SqliteStore,
        company_id: Uuid,
        decision_type: &str,
        days_ago: i64,
    ) -> MemoryEntry {
        let entry = MemoryEntry::pending(
            company_id,
            Department::Marketing,
            Uuid::new_v4(),
            decision_type,
            "ctx",
            now() - Duration::days(days_ago),
        );
        store.insert_entry(&entry).unwrap();
        entry
    }

    #[test]
    fn young_entries_stay_pending() {
        let store = SqliteStore::in_memory().unwrap();
        let company_id = Uuid::new_v4();
        backdated_entry(&store, company_id, "publish", 2);

        let evaluated =
            evaluate_pending(&store, company_id, Department::Marketing, now()).unwrap();
        assert_eq!(evaluated, 0);
    }

    #[test]
    fn evaluation_is_idempotent_across_cycles() {
        let store = SqliteStore::in_memory().unwrap();
        let company_id = Uuid::new_v4();
        let ts = now();
        backdated_entry(&store, company_id, "publish", 10);
        // Strong engagement after the decision: positive outcome.
        store.add_post(company_id, "blog", 20.0, ts - Duration::days(3)).unwrap();

        let first = evaluate_pending(&store, company_id, Department::Marketing, ts).unwrap();
        assert_eq!(first, 1);
        let second = evaluate_pending(&store, company_id, Department::Marketing, ts).unwrap();
        assert_eq!(second, 0, "second cycle must not re-evaluate");

        let entries = store
            .evaluated_entries(company_id, Department::Marketing, 10)
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].outcome, Outcome::Positive);
        assert!(entries[0].lesson.is_some());
    }

    #[tokio::test]
    async fn three_positives_extract_rules_once() {
        let store = SqliteStore::in_memory().unwrap();
        let company_id = Uuid::new_v4();
        let ts = now();
        for _ in 0..3 {
            let entry = backdated_entry(&store, company_id, "publish", 10);
            store
                .mark_evaluated(entry.id, Outcome::Positive, 0.8, "worked", ts)
                .unwrap();
        }
        let oracle = FixedOracle(r#"["publish before noon", "lead with numbers"]"#.into());

        let extracted =
            extract_patterns(&store, &oracle, company_id, Department::Marketing)
                .await
                .unwrap();
        assert_eq!(extracted, 1);

        // The group now carries rules, so a second pass is a no-op.
        let extracted =
            extract_patterns(&store, &oracle, company_id, Department::Marketing)
                .await
                .unwrap();
        assert_eq!(extracted, 0);

        let entries = store
            .evaluated_entries(company_id, Department::Marketing, 10)
            .unwrap();
        let with_rules: Vec<_> = entries
            .iter()
            .filter(|e| !e.extracted_rules.is_empty())
            .collect();
        assert_eq!(with_rules.len(), 1);
        assert_eq!(with_rules[0].extracted_rules.len(), 2);
    }

    #[tokio::test]
    async fn two_positives_are_not_a_pattern() {
        let store = SqliteStore::in_memory().unwrap();
        let company_id = Uuid::new_v4();
        let ts = now();
        for _ in 0..2 {
            let entry = backdated_entry(&store, company_id, "publish", 10);
            store
                .mark_evaluated(entry.id, Outcome::Positive, 0.8, "worked", ts)
                .unwrap();
        }
        let oracle = FixedOracle(r#"["rule"]"#.into());
        let extracted =
            extract_patterns(&store, &oracle, company_id, Department::Marketing)
                .await
                .unwrap();
        assert_eq!(extracted, 0);
    }
}
