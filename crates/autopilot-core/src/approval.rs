//! Human approval records
//!
//! The engine writes these for human-reviewable decisions and
//! capabilities, and reads them back to detect approval or rejection.
//! The review UI itself is an external collaborator.

use crate::types::{Department, RiskLevel, Timestamp};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What an approval record refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum ApprovalSubject {
    Decision(Uuid),
    Capability(Uuid),
}

/// Review status of an approval record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    PendingReview,
    Approved,
    Rejected,
}

/// One reviewable record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRecord {
    pub id: Uuid,
    pub company_id: Uuid,
    pub department: Department,
    pub subject: ApprovalSubject,
    pub status: ApprovalStatus,
    pub risk: RiskLevel,
    pub summary: String,
    /// Escalated decisions require multi-stakeholder sign-off.
    pub multi_stakeholder: bool,
    /// Post-review records: already executed, human is informed post-hoc.
    pub post_hoc: bool,
    pub reviewer_note: Option<String>,
    pub created_at: Timestamp,
    pub resolved_at: Option<Timestamp>,
    /// Set once the engine has acted on an external approval (e.g.
    /// promoted the referenced capability), so bridging is one-shot.
    pub applied: bool,
}

impl ApprovalRecord {
    pub fn pending(
        company_id: Uuid,
        department: Department,
        subject: ApprovalSubject,
        risk: RiskLevel,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            company_id,
            department,
            subject,
            status: ApprovalStatus::PendingReview,
            risk,
            summary: summary.into(),
            multi_stakeholder: false,
            post_hoc: false,
            reviewer_note: None,
            created_at: crate::types::now(),
            resolved_at: None,
            applied: false,
        }
    }

    pub fn multi_stakeholder(mut self) -> Self {
        self.multi_stakeholder = true;
        self
    }

    /// Already-approved record flagged for post-hoc review: the human
    /// sees what executed but cannot block it.
    pub fn post_hoc_review(mut self) -> Self {
        self.status = ApprovalStatus::Approved;
        self.post_hoc = true;
        self.resolved_at = Some(crate::types::now());
        self
    }
}
