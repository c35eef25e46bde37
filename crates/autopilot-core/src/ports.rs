//! Data-access ports
//!
//! The engine never touches a shared data-store client directly; every
//! component receives these traits by injection so tests can substitute
//! fakes. All port methods are synchronous — persistence is local SQLite;
//! only oracle and executor round-trips are async, and those live in the
//! engine crate.

use crate::approval::{ApprovalRecord, ApprovalStatus};
use crate::audit::ExecutionLogEntry;
use crate::capability::Capability;
use crate::config::DepartmentConfig;
use crate::decision::Decision;
use crate::error::StoreError;
use crate::memory::{MemoryEntry, Outcome};
use crate::signal::IntelBundle;
use crate::snapshot::{Competitor, PreflightCounts};
use crate::types::{CompanyProfile, Department, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

// ---------------------------------------------------------------------------
// Operational row shapes (read-only inputs to Sense)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostRecord {
    pub channel: String,
    pub engagement: f64,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignRecord {
    pub name: String,
    pub active: bool,
    pub budget: f64,
    pub consumed: f64,
}

impl CampaignRecord {
    pub fn consumed_ratio(&self) -> f64 {
        if self.budget > 0.0 {
            self.consumed / self.budget
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DealRecord {
    pub value: f64,
    pub stage: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberRecord {
    pub joined_at: Timestamp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub completed: bool,
    pub agent_failed: bool,
    pub created_at: Timestamp,
    pub completed_at: Option<Timestamp>,
}

/// An independently deployed executor the engine may dispatch to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorSpec {
    pub name: String,
    pub department: Department,
    pub endpoint: String,
    pub implemented: bool,
    /// Contextual data keys fetched before invocation.
    pub required_context: Vec<String>,
}

// ---------------------------------------------------------------------------
// Ports
// ---------------------------------------------------------------------------

/// Per-company, per-department configuration (read-only plus run bump).
pub trait ConfigStore: Send + Sync {
    fn department_config(
        &self,
        company_id: Uuid,
        department: Department,
    ) -> StoreResult<Option<DepartmentConfig>>;

    /// All enabled configs across companies; the trigger filters by
    /// frequency window.
    fn enabled_configs(&self) -> StoreResult<Vec<DepartmentConfig>>;

    fn company_profile(&self, company_id: Uuid) -> StoreResult<CompanyProfile>;

    /// Bump `last_execution_at` and `cycles_completed` after a cycle.
    fn record_cycle_run(
        &self,
        company_id: Uuid,
        department: Department,
        at: Timestamp,
    ) -> StoreResult<()>;
}

/// Read-only operational data consumed by Preflight and Sense.
pub trait OperationalData: Send + Sync {
    fn preflight_counts(&self, company_id: Uuid) -> StoreResult<PreflightCounts>;
    fn connected_channels(&self, company_id: Uuid) -> StoreResult<Vec<String>>;
    fn posts_since(&self, company_id: Uuid, since: Timestamp) -> StoreResult<Vec<PostRecord>>;
    fn campaigns(&self, company_id: Uuid) -> StoreResult<Vec<CampaignRecord>>;
    fn deals(&self, company_id: Uuid) -> StoreResult<Vec<DealRecord>>;
    fn contact_count(&self, company_id: Uuid) -> StoreResult<u32>;
    fn members(&self, company_id: Uuid) -> StoreResult<Vec<MemberRecord>>;
    fn tasks_since(&self, company_id: Uuid, since: Timestamp) -> StoreResult<Vec<TaskRecord>>;
    /// Count of generic activity events of a kind ("legal", "hr", ...)
    /// since the given time.
    fn activity_count_since(
        &self,
        company_id: Uuid,
        kind: &str,
        since: Timestamp,
    ) -> StoreResult<u32>;
    fn competitors(&self, company_id: Uuid) -> StoreResult<Vec<Competitor>>;
}

/// Credit consumption ledger, written by Act and read by Guard.
pub trait UsageLedger: Send + Sync {
    fn record_spend(
        &self,
        company_id: Uuid,
        department: Department,
        cycle_id: Uuid,
        credits: f64,
        at: Timestamp,
    ) -> StoreResult<()>;

    fn credits_spent_since(&self, company_id: Uuid, since: Timestamp) -> StoreResult<f64>;
}

/// Persisted decisions (always inserts, immutable once written).
pub trait DecisionStore: Send + Sync {
    fn insert_decision(&self, decision: &Decision) -> StoreResult<()>;

    fn decisions_since(
        &self,
        company_id: Uuid,
        department: Department,
        since: Timestamp,
    ) -> StoreResult<Vec<Decision>>;

    /// Count of actioned decisions per type since the given time.
    fn actioned_type_counts_since(
        &self,
        company_id: Uuid,
        department: Department,
        since: Timestamp,
    ) -> StoreResult<HashMap<String, u32>>;
}

/// Append-only decision memory with one-shot outcome evaluation.
pub trait MemoryStore: Send + Sync {
    fn insert_entry(&self, entry: &MemoryEntry) -> StoreResult<()>;

    fn entry(&self, id: Uuid) -> StoreResult<Option<MemoryEntry>>;

    /// Most recent evaluated (non-pending) entries, newest first.
    fn evaluated_entries(
        &self,
        company_id: Uuid,
        department: Department,
        limit: usize,
    ) -> StoreResult<Vec<MemoryEntry>>;

    fn pending_entries_before(
        &self,
        company_id: Uuid,
        department: Department,
        cutoff: Timestamp,
    ) -> StoreResult<Vec<MemoryEntry>>;

    /// Evaluated entries touching any of the given decision types since
    /// the given time (lifecycle evidence).
    fn entries_for_types_since(
        &self,
        company_id: Uuid,
        department: Department,
        decision_types: &[String],
        since: Timestamp,
    ) -> StoreResult<Vec<MemoryEntry>>;

    /// Transition a pending entry to an evaluated outcome. Returns false
    /// if the entry was already evaluated — the evaluation is one-shot.
    fn mark_evaluated(
        &self,
        id: Uuid,
        outcome: Outcome,
        score: f64,
        lesson: &str,
        at: Timestamp,
    ) -> StoreResult<bool>;

    fn attach_rules(&self, id: Uuid, rules: &[String]) -> StoreResult<()>;
}

/// Capability persistence. Status is one of the few mutable fields in
/// the system.
pub trait CapabilityStore: Send + Sync {
    fn upsert_capability(&self, capability: &Capability) -> StoreResult<()>;
    fn capability(&self, id: Uuid) -> StoreResult<Option<Capability>>;
    fn capabilities(&self, company_id: Uuid, department: Department)
        -> StoreResult<Vec<Capability>>;
    fn increment_execution(&self, id: Uuid) -> StoreResult<()>;
}

/// Append-only audit log.
pub trait AuditLog: Send + Sync {
    fn append(&self, entry: &ExecutionLogEntry) -> StoreResult<()>;
    fn entries_for_cycle(&self, cycle_id: Uuid) -> StoreResult<Vec<ExecutionLogEntry>>;
}

/// Approval records: written by the engine, resolved by the review UI.
pub trait ApprovalStore: Send + Sync {
    fn insert_approval(&self, record: &ApprovalRecord) -> StoreResult<()>;

    fn approvals_for_company(&self, company_id: Uuid) -> StoreResult<Vec<ApprovalRecord>>;

    /// Externally approved capability approvals the engine has not yet
    /// acted on.
    fn unapplied_capability_approvals(&self, company_id: Uuid) -> StoreResult<Vec<ApprovalRecord>>;

    fn mark_applied(&self, id: Uuid) -> StoreResult<()>;

    /// Resolution normally comes from the review UI; exposed here so
    /// tests can stand in for it.
    fn resolve(&self, id: Uuid, status: ApprovalStatus, note: Option<&str>) -> StoreResult<()>;
}

/// Time-boxed external intelligence cache.
pub trait IntelCache: Send + Sync {
    fn cached_intel(&self, company_id: Uuid) -> StoreResult<Option<IntelBundle>>;
    fn store_intel(&self, company_id: Uuid, bundle: &IntelBundle) -> StoreResult<()>;
}

/// Registry of deployed executors.
pub trait ExecutorRegistry: Send + Sync {
    fn executors(&self, department: Department) -> StoreResult<Vec<ExecutorSpec>>;
}

/// Umbrella port: everything the engine needs from persistence.
pub trait DataStore:
    ConfigStore
    + OperationalData
    + UsageLedger
    + DecisionStore
    + MemoryStore
    + CapabilityStore
    + AuditLog
    + ApprovalStore
    + IntelCache
    + ExecutorRegistry
{
}

impl<T> DataStore for T where
    T: ConfigStore
        + OperationalData
        + UsageLedger
        + DecisionStore
        + MemoryStore
        + CapabilityStore
        + AuditLog
        + ApprovalStore
        + IntelCache
        + ExecutorRegistry
{
}
