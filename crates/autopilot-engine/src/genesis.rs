//! Capability genesis: gap detection, proposal, governance
//!
//! A gap is a recurring situation the current capability roster does not
//! cover. Two or more detected gaps send the evidence to the oracle,
//! which proposes at most three capabilities; each proposal is routed by
//! the pure governance function — straight to trial, or into the human
//! approval queue. The approval bridge then promotes any proposal a
//! human has since approved.

use crate::lifecycle::transition;
use crate::oracle::{extract_json_array, Oracle, OracleRequest};
use autopilot_core::capability::govern;
use autopilot_core::memory::Outcome;
use autopilot_core::ports::{
    ApprovalStore, AuditLog, CapabilityStore, DecisionStore, MemoryStore,
};
use autopilot_core::{
    ApprovalRecord, ApprovalSubject, Capability, CapabilityStatus, Department, GovernanceAction,
    IntelBundle, RiskLevel, Timestamp,
};
use chrono::Duration;
use serde::Deserialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tracing::{info, warn};
use uuid::Uuid;

const GAP_LOOKBACK_DAYS: i64 = 30;
const MIN_GAPS_FOR_PROPOSAL: usize = 2;
const MAX_PROPOSALS: usize = 3;

const GENESIS_SYSTEM_PROMPT: &str = "You design small autonomous capabilities for one company \
    department. Given observed gaps, answer with a JSON array of 1 to 3 objects shaped \
    {\"name\": kebab-case string, \"description\": string, \"decision_types\": [string], \
    \"risk\": \"low\"|\"medium\"|\"high\"|\"critical\", \"auto_activatable\": boolean, \
    \"trigger_condition\": object, \"required_data\": [string], \"success_metric\": string}. \
    No other text.";

/// One detected coverage gap, as evidence for the proposal prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Gap {
    /// Approved decisions of a type repeatedly ran without an executor.
    UnmappedApproved { decision_type: String, count: u32 },
    /// The same guard reason blocked three or more decisions.
    RepeatedBlock { reason: String, count: u32 },
    /// A high-impact external signal has no responding capability.
    UnresolvedThreat { title: String },
    /// Three or more positive outcomes of a type with no capability.
    RepeatedSuccess { decision_type: String, count: u32 },
    /// Three or more negative outcomes of a type call for a guardrail.
    RepeatedFailure { decision_type: String, count: u32 },
}

impl Gap {
    fn render(&self) -> String {
        match self {
            Gap::UnmappedApproved { decision_type, count } => format!(
                "{count} approved '{decision_type}' decisions had no executor to run them"
            ),
            Gap::RepeatedBlock { reason, count } => {
                format!("{count} decisions blocked for the same reason: {reason}")
            }
            Gap::UnresolvedThreat { title } => {
                format!("high-impact market signal with no response: {title}")
            }
            Gap::RepeatedSuccess { decision_type, count } => format!(
                "'{decision_type}' succeeded {count} times and could run as a standing capability"
            ),
            Gap::RepeatedFailure { decision_type, count } => format!(
                "'{decision_type}' failed {count} times and needs a protective capability"
            ),
        }
    }
}

/// Scan the trailing window for coverage gaps.
pub fn scan_gaps<S>(
    store: &S,
    company_id: Uuid,
    department: Department,
    capabilities: &[Capability],
    intel: Option<&IntelBundle>,
    now: Timestamp,
) -> autopilot_core::Result<Vec<Gap>>
where
    S: DecisionStore + MemoryStore,
{
    let since = now - Duration::days(GAP_LOOKBACK_DAYS);
    let decisions = store.decisions_since(company_id, department, since)?;
    let covered: HashSet<&str> = capabilities
        .iter()
        .filter(|cap| !cap.status.is_terminal())
        .flat_map(|cap| cap.decision_types.iter().map(String::as_str))
        .collect();

    let mut gaps = Vec::new();

    let mut unmapped: HashMap<&str, u32> = HashMap::new();
    let mut blocks: HashMap<&str, u32> = HashMap::new();
    for decision in &decisions {
        if decision.action_taken && decision.executor.is_none() {
            *unmapped.entry(decision.decision_type.as_str()).or_default() += 1;
        }
        if let Some(reason) = decision.block_reason.as_deref() {
            *blocks.entry(reason).or_default() += 1;
        }
    }
    for (decision_type, count) in unmapped {
        if count >= 2 && !covered.contains(decision_type) {
            gaps.push(Gap::UnmappedApproved {
                decision_type: decision_type.to_string(),
                count,
            });
        }
    }
    for (reason, count) in blocks {
        if count >= 3 {
            gaps.push(Gap::RepeatedBlock {
                reason: reason.to_string(),
                count,
            });
        }
    }

    if let Some(bundle) = intel {
        for signal in bundle.high_impact() {
            let addressed = capabilities.iter().any(|cap| {
                !cap.status.is_terminal() && cap.description.contains(signal.title.as_str())
            });
            if !addressed {
                gaps.push(Gap::UnresolvedThreat {
                    title: signal.title.clone(),
                });
            }
        }
    }

    let entries = store.entries_for_types_since(
        company_id,
        department,
        &department
            .decision_types()
            .iter()
            .map(|t| t.to_string())
            .collect::<Vec<_>>(),
        since,
    )?;
    let mut positives: HashMap<&str, u32> = HashMap::new();
    let mut negatives: HashMap<&str, u32> = HashMap::new();
    for entry in &entries {
        match entry.outcome {
            Outcome::Positive => {
                *positives.entry(entry.decision_type.as_str()).or_default() += 1
            }
            Outcome::Negative => {
                *negatives.entry(entry.decision_type.as_str()).or_default() += 1
            }
            _ => {}
        }
    }
    for (decision_type, count) in positives {
        if count >= 3 && !covered.contains(decision_type) {
            gaps.push(Gap::RepeatedSuccess {
                decision_type: decision_type.to_string(),
                count,
            });
        }
    }
    for (decision_type, count) in negatives {
        if count >= 3 {
            gaps.push(Gap::RepeatedFailure {
                decision_type: decision_type.to_string(),
                count,
            });
        }
    }

    Ok(gaps)
}

#[derive(Debug, Deserialize)]
struct RawProposal {
    name: String,
    description: String,
    #[serde(default)]
    decision_types: Vec<String>,
    risk: RiskLevel,
    #[serde(default)]
    auto_activatable: bool,
    #[serde(default)]
    trigger_condition: Value,
    #[serde(default)]
    required_data: Vec<String>,
    #[serde(default)]
    success_metric: Option<String>,
}

/// Run genesis for one department: scan, propose, govern, bridge.
/// Returns the number of capabilities created this cycle.
pub async fn run<S, O>(
    store: &S,
    oracle: &O,
    company_id: Uuid,
    department: Department,
    intel: Option<&IntelBundle>,
    cycle_id: Uuid,
    now: Timestamp,
) -> autopilot_core::Result<u32>
where
    S: DecisionStore + MemoryStore + CapabilityStore + ApprovalStore + AuditLog,
    O: Oracle,
{
    let capabilities = store.capabilities(company_id, department)?;
    bridge_approvals(store, company_id, department, cycle_id, now)?;

    let gaps = scan_gaps(store, company_id, department, &capabilities, intel, now)?;
    if gaps.len() < MIN_GAPS_FOR_PROPOSAL {
        return Ok(0);
    }
    info!(%department, gaps = gaps.len(), "capability gaps detected");

    let evidence: Vec<String> = gaps.iter().map(Gap::render).collect();
    let request = OracleRequest::new(
        GENESIS_SYSTEM_PROMPT,
        format!("Department: {department}. Observed gaps:\n- {}", evidence.join("\n- ")),
    );
    let content = match oracle.complete(&request).await {
        Ok(content) => content,
        Err(error) => {
            warn!(%error, "genesis proposal query failed, retrying next cycle");
            return Ok(0);
        }
    };
    let items = match extract_json_array(&content) {
        Ok(items) => items,
        Err(error) => {
            warn!(%error, "unusable genesis completion, retrying next cycle");
            return Ok(0);
        }
    };

    let existing: HashSet<String> = capabilities.iter().map(|cap| cap.name.clone()).collect();
    let mut created = 0;
    for item in items.into_iter().take(MAX_PROPOSALS) {
        let raw: RawProposal = match serde_json::from_value(item) {
            Ok(raw) => raw,
            Err(error) => {
                warn!(%error, "dropping malformed capability proposal");
                continue;
            }
        };
        if existing.contains(&raw.name) {
            continue;
        }

        let mut capability =
            Capability::proposed(company_id, department, raw.name, raw.description, raw.risk);
        capability.decision_types = raw
            .decision_types
            .into_iter()
            .filter(|t| department.decision_types().contains(&t.as_str()))
            .collect();
        capability.trigger_condition = raw.trigger_condition;
        capability.required_data = raw.required_data;
        capability.success_metric = raw.success_metric;
        capability.auto_activatable = raw.auto_activatable;
        capability.created_at = now;

        match govern(capability.risk, capability.auto_activatable, now) {
            GovernanceAction::AutoTrial { expires_at } => {
                store.upsert_capability(&capability)?;
                transition(
                    store,
                    &mut capability,
                    CapabilityStatus::Trial,
                    "low risk, auto-activatable: trial started",
                    cycle_id,
                    now,
                )?;
                capability.trial_expires_at = Some(expires_at);
                store.upsert_capability(&capability)?;
            }
            GovernanceAction::PendingReview | GovernanceAction::RequiresApproval => {
                store.upsert_capability(&capability)?;
                let record = ApprovalRecord::pending(
                    company_id,
                    department,
                    ApprovalSubject::Capability(capability.id),
                    capability.risk,
                    format!("new capability: {}", capability.name),
                );
                let record = if capability.risk >= RiskLevel::High {
                    record.multi_stakeholder()
                } else {
                    record
                };
                store.insert_approval(&record)?;
            }
        }
        info!(
            capability = %capability.name,
            status = %capability.status,
            "capability proposed"
        );
        created += 1;
    }
    Ok(created)
}

/// Promote proposals whose approval a human has resolved since the last
/// cycle. One-shot per approval record.
pub fn bridge_approvals<S>(
    store: &S,
    company_id: Uuid,
    department: Department,
    cycle_id: Uuid,
    now: Timestamp,
) -> autopilot_core::Result<u32>
where
    S: CapabilityStore + ApprovalStore + AuditLog,
{
    let mut promoted = 0;
    for record in store.unapplied_capability_approvals(company_id)? {
        if record.department != department {
            continue;
        }
        let ApprovalSubject::Capability(capability_id) = record.subject else {
            continue;
        };
        let Some(mut capability) = store.capability(capability_id)? else {
            warn!(%capability_id, "approval references a missing capability");
            store.mark_applied(record.id)?;
            continue;
        };
        if capability.status == CapabilityStatus::Proposed {
            transition(
                store,
                &mut capability,
                CapabilityStatus::Trial,
                "human approved: trial started",
                cycle_id,
                now,
            )?;
            capability.trial_expires_at =
                Some(now + Duration::days(autopilot_core::capability::TRIAL_DAYS));
            store.upsert_capability(&capability)?;
            promoted += 1;
        }
        store.mark_applied(record.id)?;
    }
    Ok(promoted)
}
