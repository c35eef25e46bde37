//! Capability lifecycle resolution
//!
//! Trials resolve at expiry against outcome evidence from decision
//! memory; active capabilities stay reversible through a cooldown-gated
//! deprecation edge. Every state change goes through [`transition`],
//! which enforces the legal graph and writes an audit row.

use autopilot_core::capability::REVERSAL_COOLDOWN_DAYS;
use autopilot_core::memory::Outcome;
use autopilot_core::ports::{AuditLog, CapabilityStore, MemoryStore};
use autopilot_core::{
    Capability, CapabilityStatus, Department, EngineError, ExecutionLogEntry, Phase, PhaseStatus,
    Timestamp,
};
use chrono::Duration;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

/// Transition counts for one lifecycle pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LifecycleReport {
    pub activated: u32,
    pub deprecated: u32,
}

/// Move a capability to `next`, persist it and audit the change. Illegal
/// edges fail with `InvalidTransition` before anything is written.
pub fn transition<S>(
    store: &S,
    capability: &mut Capability,
    next: CapabilityStatus,
    reason: &str,
    cycle_id: Uuid,
    now: Timestamp,
) -> autopilot_core::Result<()>
where
    S: CapabilityStore + AuditLog,
{
    let from = capability.status;
    if !from.can_transition_to(next) {
        return Err(EngineError::InvalidTransition {
            from: from.as_str().to_string(),
            to: next.as_str().to_string(),
        });
    }

    capability.status = next;
    capability.last_evaluated_at = Some(now);
    match next {
        CapabilityStatus::Active => capability.activation_reason = Some(reason.to_string()),
        CapabilityStatus::Deprecated => capability.deactivation_reason = Some(reason.to_string()),
        _ => {}
    }
    store.upsert_capability(capability)?;

    let entry = ExecutionLogEntry::new(
        cycle_id,
        capability.company_id,
        capability.department,
        Phase::Lifecycle,
        PhaseStatus::Intervention,
    )
    .with_detail(json!({
        "capability_id": capability.id,
        "name": capability.name,
        "from": from.as_str(),
        "to": next.as_str(),
        "reason": reason,
    }));
    store.append(&entry)?;

    info!(
        capability = %capability.name,
        from = %from,
        to = %next,
        "capability transitioned"
    );
    Ok(())
}

/// Resolve expired trials and check the reversal edge for every active
/// capability of one department.
pub fn run<S>(
    store: &S,
    company_id: Uuid,
    department: Department,
    cycle_id: Uuid,
    now: Timestamp,
) -> autopilot_core::Result<LifecycleReport>
where
    S: CapabilityStore + MemoryStore + AuditLog,
{
    let mut report = LifecycleReport::default();

    for mut capability in store.capabilities(company_id, department)? {
        if capability.trial_expired(now) {
            let (positives, negatives) =
                outcome_tally(store, &capability, capability.created_at)?;
            if capability.execution_count > 0 && positives > negatives {
                let reason = format!(
                    "trial passed: {} executions, {positives} positive vs {negatives} negative outcomes",
                    capability.execution_count
                );
                transition(
                    store,
                    &mut capability,
                    CapabilityStatus::Active,
                    &reason,
                    cycle_id,
                    now,
                )?;
                report.activated += 1;
            } else {
                let reason = format!(
                    "trial failed: {} executions, {positives} positive vs {negatives} negative outcomes",
                    capability.execution_count
                );
                transition(
                    store,
                    &mut capability,
                    CapabilityStatus::Deprecated,
                    &reason,
                    cycle_id,
                    now,
                )?;
                report.deprecated += 1;
            }
            continue;
        }

        if capability.reversal_window_open(now) {
            let since = now - Duration::days(REVERSAL_COOLDOWN_DAYS);
            let (positives, negatives) = outcome_tally(store, &capability, since)?;
            if negatives > positives.saturating_mul(2) {
                let reason = format!(
                    "reversed: {negatives} negative vs {positives} positive outcomes since last review"
                );
                transition(
                    store,
                    &mut capability,
                    CapabilityStatus::Deprecated,
                    &reason,
                    cycle_id,
                    now,
                )?;
                report.deprecated += 1;
            } else {
                // Restart the cooldown so the next review covers a fresh window.
                capability.last_evaluated_at = Some(now);
                store.upsert_capability(&capability)?;
            }
        }
    }

    Ok(report)
}

/// Positive/negative counts over evaluated memory touching the
/// capability's decision types.
fn outcome_tally<S: MemoryStore>(
    store: &S,
    capability: &Capability,
    since: Timestamp,
) -> autopilot_core::Result<(u32, u32)> {
    if capability.decision_types.is_empty() {
        return Ok((0, 0));
    }
    let entries = store.entries_for_types_since(
        capability.company_id,
        capability.department,
        &capability.decision_types,
        since,
    )?;
    let mut positives = 0;
    let mut negatives = 0;
    for entry in entries {
        match entry.outcome {
            Outcome::Positive => positives += 1,
            Outcome::Negative => negatives += 1,
            _ => {}
        }
    }
    Ok((positives, negatives))
}
