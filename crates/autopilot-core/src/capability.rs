//! Evolved capabilities and their lifecycle state machine
//!
//! A capability is an autonomously discovered, department-scoped unit of
//! behavior. Its defining invariant is the transition graph:
//! `seeded/proposed → trial → {active, deprecated}`, plus the emergency
//! reversal `active → deprecated`. No transition skips the trial stage.

use crate::types::{Department, RiskLevel, Timestamp};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Trial period length.
pub const TRIAL_DAYS: i64 = 7;

/// Days since last evaluation before the reversal edge may fire.
pub const REVERSAL_COOLDOWN_DAYS: i64 = 14;

/// Lifecycle status. Every capability is in exactly one state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapabilityStatus {
    Seeded,
    Proposed,
    Trial,
    Active,
    Deprecated,
}

impl CapabilityStatus {
    /// Legal transition graph. Same-state is a no-op and allowed.
    pub fn can_transition_to(self, next: CapabilityStatus) -> bool {
        use CapabilityStatus::*;
        match (self, next) {
            (Seeded, Trial) | (Proposed, Trial) => true,
            (Trial, Active) | (Trial, Deprecated) => true,
            // Post-activation reversibility.
            (Active, Deprecated) => true,
            // Rejected proposals may be retired without a trial.
            (Proposed, Deprecated) => true,
            (s1, s2) if s1 == s2 => true,
            _ => false,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, CapabilityStatus::Deprecated)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CapabilityStatus::Seeded => "seeded",
            CapabilityStatus::Proposed => "proposed",
            CapabilityStatus::Trial => "trial",
            CapabilityStatus::Active => "active",
            CapabilityStatus::Deprecated => "deprecated",
        }
    }
}

impl fmt::Display for CapabilityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named, department-scoped unit of autonomous behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capability {
    pub id: Uuid,
    pub company_id: Uuid,
    pub department: Department,
    pub name: String,
    pub description: String,

    /// Data thresholds that make this capability relevant.
    pub trigger_condition: serde_json::Value,
    /// Decision types this capability can stand in for. Evidence for
    /// trial resolution is attributed per listed type; two trial
    /// capabilities with overlapping types double-count (kept as
    /// reference behavior).
    pub decision_types: Vec<String>,

    pub status: CapabilityStatus,
    pub risk: RiskLevel,
    pub required_data: Vec<String>,
    pub success_metric: Option<String>,
    pub auto_activatable: bool,

    pub trial_expires_at: Option<Timestamp>,
    pub execution_count: u64,
    pub activation_reason: Option<String>,
    pub deactivation_reason: Option<String>,

    pub created_at: Timestamp,
    pub last_evaluated_at: Option<Timestamp>,
}

impl Capability {
    /// A freshly proposed capability awaiting governance.
    pub fn proposed(
        company_id: Uuid,
        department: Department,
        name: impl Into<String>,
        description: impl Into<String>,
        risk: RiskLevel,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            company_id,
            department,
            name: name.into(),
            description: description.into(),
            trigger_condition: serde_json::Value::Null,
            decision_types: Vec::new(),
            status: CapabilityStatus::Proposed,
            risk,
            required_data: Vec::new(),
            success_metric: None,
            auto_activatable: false,
            trial_expires_at: None,
            execution_count: 0,
            activation_reason: None,
            deactivation_reason: None,
            created_at: crate::types::now(),
            last_evaluated_at: None,
        }
    }

    /// Whether a trial capability has reached its expiry.
    pub fn trial_expired(&self, now: Timestamp) -> bool {
        self.status == CapabilityStatus::Trial
            && self.trial_expires_at.map(|at| now >= at).unwrap_or(true)
    }

    /// Whether the reversal cooldown has elapsed for an active capability.
    pub fn reversal_window_open(&self, now: Timestamp) -> bool {
        self.status == CapabilityStatus::Active
            && match self.last_evaluated_at {
                Some(at) => now - at >= Duration::days(REVERSAL_COOLDOWN_DAYS),
                None => true,
            }
    }
}

/// Risk-based governance for a freshly proposed capability, as a single
/// state-transition function rather than parallel branches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum GovernanceAction {
    /// Low risk and auto-activatable: straight into trial.
    AutoTrial { expires_at: Timestamp },
    /// Human-reviewable approval record; capability stays proposed.
    PendingReview,
    /// Draft approval explicitly requiring human sign-off.
    RequiresApproval,
}

/// Decide governance for a proposed capability from its risk level.
pub fn govern(risk: RiskLevel, auto_activatable: bool, now: Timestamp) -> GovernanceAction {
    match risk {
        RiskLevel::Low if auto_activatable => GovernanceAction::AutoTrial {
            expires_at: now + Duration::days(TRIAL_DAYS),
        },
        RiskLevel::Low | RiskLevel::Medium => GovernanceAction::PendingReview,
        RiskLevel::High | RiskLevel::Critical => GovernanceAction::RequiresApproval,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::now;

    #[test]
    fn proposed_never_jumps_to_active() {
        assert!(!CapabilityStatus::Proposed.can_transition_to(CapabilityStatus::Active));
        assert!(!CapabilityStatus::Seeded.can_transition_to(CapabilityStatus::Active));
    }

    #[test]
    fn trial_resolves_both_ways() {
        assert!(CapabilityStatus::Trial.can_transition_to(CapabilityStatus::Active));
        assert!(CapabilityStatus::Trial.can_transition_to(CapabilityStatus::Deprecated));
    }

    #[test]
    fn reversal_edge_is_legal() {
        assert!(CapabilityStatus::Active.can_transition_to(CapabilityStatus::Deprecated));
        assert!(!CapabilityStatus::Deprecated.can_transition_to(CapabilityStatus::Active));
        assert!(!CapabilityStatus::Active.can_transition_to(CapabilityStatus::Trial));
    }

    #[test]
    fn governance_by_risk() {
        let ts = now();
        match govern(RiskLevel::Low, true, ts) {
            GovernanceAction::AutoTrial { expires_at } => {
                assert_eq!(expires_at, ts + Duration::days(TRIAL_DAYS));
            }
            other => panic!("expected AutoTrial, got {other:?}"),
        }
        assert_eq!(govern(RiskLevel::Low, false, ts), GovernanceAction::PendingReview);
        assert_eq!(govern(RiskLevel::Medium, true, ts), GovernanceAction::PendingReview);
        assert_eq!(govern(RiskLevel::High, true, ts), GovernanceAction::RequiresApproval);
        assert_eq!(govern(RiskLevel::Critical, false, ts), GovernanceAction::RequiresApproval);
    }
}
