//! Sense snapshots and the pure readiness checks
//!
//! A snapshot is a department-shaped bag of normalized metrics, created
//! fresh each cycle and never persisted as a named entity. Preflight and
//! data-sufficiency verdicts are pure functions of their inputs.

use crate::types::{Department, Timestamp, Trend};
use serde::{Deserialize, Serialize};

/// Per-channel engagement rollup for marketing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelMetric {
    pub channel: String,
    pub posts: u32,
    pub engagement_total: f64,
    pub trend: Trend,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketingMetrics {
    pub connected_channels: u32,
    pub posts_30d: u32,
    pub active_campaigns: u32,
    pub channels: Vec<ChannelMetric>,
    pub engagement_trend: Trend,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SalesMetrics {
    pub open_deals: u32,
    pub pipeline_value: f64,
    pub stalled_deals: u32,
    pub contacts: u32,
    pub pipeline_trend: Trend,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FinanceMetrics {
    pub credits_30d: f64,
    pub credits_7d: f64,
    pub burn_trend: Trend,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LegalMetrics {
    pub open_reviews: u32,
    pub updates_30d: u32,
    pub activity_trend: Trend,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HrMetrics {
    pub members: u32,
    pub new_members_30d: u32,
    pub updates_30d: u32,
    pub activity_trend: Trend,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OperationsMetrics {
    pub open_tasks: u32,
    pub completed_30d: u32,
    pub completion_rate: f64,
    pub agent_failures_7d: u32,
    pub activity_trend: Trend,
}

/// Department-shaped metric bag.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "department", rename_all = "lowercase")]
pub enum DepartmentMetrics {
    Marketing(MarketingMetrics),
    Sales(SalesMetrics),
    Finance(FinanceMetrics),
    Legal(LegalMetrics),
    Hr(HrMetrics),
    Operations(OperationsMetrics),
}

impl DepartmentMetrics {
    pub fn department(&self) -> Department {
        match self {
            DepartmentMetrics::Marketing(_) => Department::Marketing,
            DepartmentMetrics::Sales(_) => Department::Sales,
            DepartmentMetrics::Finance(_) => Department::Finance,
            DepartmentMetrics::Legal(_) => Department::Legal,
            DepartmentMetrics::Hr(_) => Department::Hr,
            DepartmentMetrics::Operations(_) => Department::Operations,
        }
    }
}

/// Prioritized competitor record, attached for marketing/sales.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Competitor {
    pub name: String,
    pub priority: u32,
    pub notes: Option<String>,
}

/// One cycle's normalized view of the department.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SenseSnapshot {
    pub metrics: DepartmentMetrics,
    /// Up to 10 prioritized competitors (marketing/sales only).
    pub competitors: Vec<Competitor>,
    pub sensed_at: Timestamp,
}

impl SenseSnapshot {
    pub fn department(&self) -> Department {
        self.metrics.department()
    }
}

/// Raw existence counts consumed by preflight. Cheap to read; the
/// verdict is a pure function of this struct.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PreflightCounts {
    pub connected_channels: u32,
    pub imported_posts: u32,
    pub deals: u32,
    pub contacts: u32,
    pub members: u32,
    pub activity_rows: u32,
}

/// Outcome of the preflight existence check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreflightVerdict {
    pub ready: bool,
    pub reason: Option<String>,
    pub missing: Vec<String>,
}

impl PreflightVerdict {
    fn ready() -> Self {
        Self {
            ready: true,
            reason: None,
            missing: Vec::new(),
        }
    }

    fn not_ready(reason: impl Into<String>, missing: Vec<&str>) -> Self {
        Self {
            ready: false,
            reason: Some(reason.into()),
            missing: missing.into_iter().map(String::from).collect(),
        }
    }
}

/// Minimum raw-data existence gate, evaluated before any other phase.
pub fn preflight(department: Department, counts: &PreflightCounts) -> PreflightVerdict {
    match department {
        Department::Marketing => {
            if counts.connected_channels >= 1 || counts.imported_posts >= 5 {
                PreflightVerdict::ready()
            } else {
                PreflightVerdict::not_ready(
                    "needs_action: no connected channel and fewer than 5 imported posts",
                    vec!["connected_channel", "imported_posts"],
                )
            }
        }
        Department::Sales => {
            if counts.deals >= 1 || counts.contacts >= 1 {
                PreflightVerdict::ready()
            } else {
                PreflightVerdict::not_ready("no deals or contacts", vec!["deal", "contact"])
            }
        }
        Department::Hr => {
            if counts.members >= 2 {
                PreflightVerdict::ready()
            } else {
                PreflightVerdict::not_ready("fewer than 2 members", vec!["members"])
            }
        }
        Department::Finance | Department::Legal | Department::Operations => {
            if counts.activity_rows >= 1 {
                PreflightVerdict::ready()
            } else {
                PreflightVerdict::not_ready("no recorded activity", vec!["activity"])
            }
        }
    }
}

/// Post-sense sufficiency check: an effectively empty snapshot cannot
/// drive decisions. Marketing gets one bootstrap attempt upstream; every
/// other department aborts with `insufficient_data`.
pub fn is_sufficient(snapshot: &SenseSnapshot) -> bool {
    match &snapshot.metrics {
        DepartmentMetrics::Marketing(m) => m.posts_30d > 0 || m.active_campaigns > 0,
        DepartmentMetrics::Sales(m) => m.open_deals > 0 || m.contacts > 0,
        DepartmentMetrics::Finance(m) => m.credits_30d > 0.0,
        DepartmentMetrics::Legal(m) => m.open_reviews > 0 || m.updates_30d > 0,
        DepartmentMetrics::Hr(m) => m.members > 0,
        DepartmentMetrics::Operations(m) => m.open_tasks > 0 || m.completed_30d > 0,
    }
}
