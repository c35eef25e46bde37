//! Core types for the Autopilot engine
//!
//! This module defines the fundamental vocabulary used everywhere:
//! - Departments and their decision-type vocabularies
//! - Priority and risk levels
//! - Trend direction
//! - Company profile (sector, maturity tier)
//! - Timestamps

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Timestamp type alias
pub type Timestamp = DateTime<Utc>;

/// Create a timestamp for the current moment
pub fn now() -> Timestamp {
    Utc::now()
}

/// Operational department a cycle runs for. Closed set: each department
/// carries its own decision-type vocabulary and risk defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Department {
    Marketing,
    Sales,
    Finance,
    Legal,
    Hr,
    Operations,
}

impl Department {
    /// All departments, in cycle-scheduling order.
    pub fn all() -> [Department; 6] {
        use Department::*;
        [Marketing, Sales, Finance, Legal, Hr, Operations]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Department::Marketing => "marketing",
            Department::Sales => "sales",
            Department::Finance => "finance",
            Department::Legal => "legal",
            Department::Hr => "hr",
            Department::Operations => "operations",
        }
    }

    /// Parse from the lowercase wire form.
    pub fn parse(s: &str) -> Option<Department> {
        match s {
            "marketing" => Some(Department::Marketing),
            "sales" => Some(Department::Sales),
            "finance" => Some(Department::Finance),
            "legal" => Some(Department::Legal),
            "hr" => Some(Department::Hr),
            "operations" => Some(Department::Operations),
            _ => None,
        }
    }

    /// The fixed decision-type vocabulary for this department. Decisions
    /// outside this list are rejected at parse time.
    pub fn decision_types(self) -> &'static [&'static str] {
        match self {
            Department::Marketing => &[
                "create_content",
                "publish",
                "boost_post",
                "adjust_campaign",
                "pause_campaign",
                "engage_audience",
                "compliance_alert",
            ],
            Department::Sales => &[
                "follow_up",
                "send_proposal",
                "advance_deal",
                "reprioritize_pipeline",
                "schedule_outreach",
                "compliance_alert",
            ],
            Department::Finance => &[
                "reallocate_budget",
                "flag_overspend",
                "forecast_update",
                "compliance_alert",
            ],
            Department::Legal => &["review_contract", "update_policy", "compliance_alert"],
            Department::Hr => &[
                "post_job",
                "schedule_checkin",
                "recognize_member",
                "compliance_alert",
            ],
            Department::Operations => &[
                "create_task",
                "reassign_task",
                "escalate_incident",
                "compliance_alert",
            ],
        }
    }

    /// Static default risk for a decision type when the reasoner omits one.
    pub fn default_risk(self, decision_type: &str) -> RiskLevel {
        match decision_type {
            "create_content" | "engage_audience" | "pause_campaign" | "follow_up"
            | "schedule_outreach" | "schedule_checkin" | "recognize_member" | "create_task"
            | "reassign_task" => RiskLevel::Low,
            "publish" | "boost_post" | "adjust_campaign" | "advance_deal"
            | "reprioritize_pipeline" | "flag_overspend" | "forecast_update"
            | "review_contract" | "post_job" | "escalate_incident" => RiskLevel::Medium,
            "send_proposal" | "reallocate_budget" | "update_policy" | "compliance_alert" => {
                RiskLevel::High
            }
            _ => RiskLevel::Medium,
        }
    }
}

impl fmt::Display for Department {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decision types that represent outward-facing content and are therefore
/// subject to the active-hours window.
pub fn is_content_type(decision_type: &str) -> bool {
    matches!(decision_type, "publish" | "create_content" | "boost_post")
}

/// Decision types that commit money or external promises; the
/// require-human-approval flag escalates these from Low risk.
pub fn is_sensitive_type(decision_type: &str) -> bool {
    matches!(
        decision_type,
        "publish" | "send_proposal" | "advance_deal" | "reallocate_budget" | "update_policy"
            | "post_job"
    )
}

/// Decision types that spend budget; subject to cross-department freezes.
pub fn is_spend_type(decision_type: &str) -> bool {
    matches!(
        decision_type,
        "boost_post" | "adjust_campaign" | "publish" | "send_proposal" | "advance_deal"
    )
}

/// Stated priority of a decision, as produced by the reasoner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
}

impl Priority {
    /// Urgency term of the priority score, normalized to 0-100.
    pub fn urgency(self) -> f64 {
        match self {
            Priority::Critical => 100.0,
            Priority::High => 75.0,
            Priority::Medium => 50.0,
            Priority::Low => 25.0,
        }
    }
}

/// Four-tier risk classification. Ordering matters: guard adjustments may
/// only move a decision upward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Raise to at least `floor`; never lowers.
    pub fn at_least(self, floor: RiskLevel) -> RiskLevel {
        self.max(floor)
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// Trend direction of a sensed metric over the lookback window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Improving,
    Declining,
    #[default]
    Stable,
}

impl Trend {
    /// Compare a recent sub-window average against the prior one.
    /// More than +10% is improving, more than -10% declining.
    pub fn from_averages(recent: f64, prior: f64) -> Trend {
        if prior <= f64::EPSILON {
            return if recent > f64::EPSILON {
                Trend::Improving
            } else {
                Trend::Stable
            };
        }
        let change = (recent - prior) / prior;
        if change > 0.10 {
            Trend::Improving
        } else if change < -0.10 {
            Trend::Declining
        } else {
            Trend::Stable
        }
    }
}

/// Industry sector, used by sector-specific guard rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sector {
    Fintech,
    Healthcare,
    General,
}

impl Default for Sector {
    fn default() -> Self {
        Sector::General
    }
}

/// Company maturity tier, drives external-intelligence freshness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaturityTier {
    Seedling,
    Growing,
    Established,
    Autonomous,
}

impl MaturityTier {
    /// How long cached external intelligence stays fresh for this tier.
    /// The most mature tier refreshes every cycle.
    pub fn intel_freshness(self) -> Duration {
        match self {
            MaturityTier::Seedling => Duration::days(7),
            MaturityTier::Growing => Duration::days(3),
            MaturityTier::Established => Duration::days(1),
            MaturityTier::Autonomous => Duration::zero(),
        }
    }
}

/// Read-only company context consumed by guard rules, intel caching and
/// executor payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyProfile {
    pub id: Uuid,
    pub name: String,
    pub sector: Sector,
    pub maturity: MaturityTier,
    pub industry: Option<String>,
    pub country: Option<String>,
    /// Finance has flagged the company budget as exceeded; marketing and
    /// sales spend actions are frozen while set.
    pub budget_freeze: bool,
    /// Legal requires compliance review; sales proposal/advance actions are
    /// frozen while set.
    pub compliance_review_required: bool,
    /// Prior compliance clearance exists (fintech proposal gate).
    pub compliance_cleared: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn department_roundtrip() {
        for dept in Department::all() {
            assert_eq!(Department::parse(dept.as_str()), Some(dept));
        }
        assert_eq!(Department::parse("janitorial"), None);
    }

    #[test]
    fn vocabulary_always_includes_compliance_alert() {
        for dept in Department::all() {
            assert!(dept.decision_types().contains(&"compliance_alert"));
        }
    }

    #[test]
    fn risk_ordering_only_raises() {
        assert_eq!(RiskLevel::Low.at_least(RiskLevel::High), RiskLevel::High);
        assert_eq!(
            RiskLevel::Critical.at_least(RiskLevel::Medium),
            RiskLevel::Critical
        );
    }

    #[test]
    fn trend_thresholds() {
        assert_eq!(Trend::from_averages(12.0, 10.0), Trend::Improving);
        assert_eq!(Trend::from_averages(8.0, 10.0), Trend::Declining);
        assert_eq!(Trend::from_averages(10.5, 10.0), Trend::Stable);
        assert_eq!(Trend::from_averages(0.0, 0.0), Trend::Stable);
        assert_eq!(Trend::from_averages(3.0, 0.0), Trend::Improving);
    }

    #[test]
    fn autonomous_tier_refreshes_every_cycle() {
        assert_eq!(MaturityTier::Autonomous.intel_freshness(), Duration::zero());
        assert!(MaturityTier::Seedling.intel_freshness() > MaturityTier::Growing.intel_freshness());
    }
}
