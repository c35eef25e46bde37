//! Decisions and deterministic priority scoring
//!
//! The priority score is always recomputed from its inputs; a stored
//! score is never trusted without its breakdown. No oracle involvement.

use crate::types::{Department, Priority, RiskLevel, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Guard-phase verdict on a decision. Closed enumeration; every persisted
/// decision carries exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    AutoApproved,
    PostReview,
    RequiresApproval,
    Escalated,
    Blocked,
}

impl Disposition {
    /// Whether a decision with this disposition may execute in Act.
    pub fn executes(self) -> bool {
        matches!(self, Disposition::AutoApproved | Disposition::PostReview)
    }

    /// Derive the disposition from a (possibly escalated) risk level.
    pub fn from_risk(risk: RiskLevel) -> Disposition {
        match risk {
            RiskLevel::Low => Disposition::AutoApproved,
            RiskLevel::Medium => Disposition::PostReview,
            RiskLevel::High => Disposition::RequiresApproval,
            RiskLevel::Critical => Disposition::Escalated,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Disposition::AutoApproved => "auto_approved",
            Disposition::PostReview => "post_review",
            Disposition::RequiresApproval => "requires_approval",
            Disposition::Escalated => "escalated",
            Disposition::Blocked => "blocked",
        }
    }
}

/// The four weighted terms behind a priority score, each 0-100.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub urgency: f64,
    pub impact: f64,
    pub strategic: f64,
    pub evidence: f64,
}

impl ScoreBreakdown {
    /// Weighted total: 0.3·urgency + 0.3·impact + 0.2·strategic + 0.2·evidence.
    pub fn total(&self) -> f64 {
        0.3 * self.urgency + 0.3 * self.impact + 0.2 * self.strategic + 0.2 * self.evidence
    }
}

/// A candidate action proposed by Think, judged by Guard, carried out by
/// Act and persisted verbatim by Learn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub id: Uuid,
    pub company_id: Uuid,
    pub department: Department,
    pub cycle_id: Uuid,

    pub decision_type: String,
    pub priority: Priority,
    pub risk: RiskLevel,
    pub description: String,
    pub reasoning: String,

    /// Named executor reference; must name a real executor or an active
    /// capability, otherwise None.
    pub executor: Option<String>,
    pub parameters: Value,

    pub priority_score: f64,
    pub score_breakdown: ScoreBreakdown,

    /// Set by Guard; None only before the guard phase has run.
    pub disposition: Option<Disposition>,
    pub action_taken: bool,
    /// Soft-adjustment warnings accumulated in Guard.
    pub guard_notes: Vec<String>,
    pub block_reason: Option<String>,

    /// Whether an external-intelligence signal influenced this decision.
    pub signal_influenced: bool,
    pub created_at: Timestamp,
}

impl Decision {
    /// The `depends_on` parameter, if the reasoner declared one.
    pub fn depends_on(&self) -> Option<&str> {
        self.parameters.get("depends_on").and_then(Value::as_str)
    }

    /// Parameters carry a financial-impact flag.
    pub fn has_financial_impact(&self) -> bool {
        self.parameters
            .get("financial_impact")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

/// Compute the deterministic score breakdown for a candidate decision.
pub fn score_breakdown(
    priority: Priority,
    parameters: &Value,
    reasoning: &str,
    signal_influenced: bool,
) -> ScoreBreakdown {
    let urgency = priority.urgency();

    // |estimated change| × 5, capped at 100; default 30 when absent.
    let impact = parameters
        .get("estimated_change")
        .and_then(Value::as_f64)
        .map(|change| (change.abs() * 5.0).min(100.0))
        .unwrap_or(30.0);

    // Crude proxy for justification depth.
    let strategic = if reasoning.len() > 100 {
        70.0
    } else if reasoning.len() > 50 {
        50.0
    } else {
        30.0
    };

    let evidence = if signal_influenced {
        80.0
    } else if has_parameters(parameters) {
        60.0
    } else {
        30.0
    };

    ScoreBreakdown {
        urgency,
        impact,
        strategic,
        evidence,
    }
}

fn has_parameters(parameters: &Value) -> bool {
    match parameters {
        Value::Null => false,
        Value::Object(map) => !map.is_empty(),
        Value::Array(items) => !items.is_empty(),
        _ => true,
    }
}

/// Sort descending by priority score. This ordering is the only order
/// Guard and Act ever see.
pub fn sort_by_score(decisions: &mut [Decision]) {
    decisions.sort_by(|a, b| {
        b.priority_score
            .partial_cmp(&a.priority_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}
