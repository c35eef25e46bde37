//! Append-only execution audit log
//!
//! One entry per phase per cycle; the sole source of truth for "what
//! happened". Never mutated after insert.

use crate::types::{Department, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// The engine phases, in cycle order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Preflight,
    Sense,
    Intel,
    Memory,
    Think,
    Guard,
    Act,
    Learn,
    Genesis,
    Lifecycle,
    /// Whole-cycle entries (aborts, fatal failures, completion).
    Cycle,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Preflight => "preflight",
            Phase::Sense => "sense",
            Phase::Intel => "intel",
            Phase::Memory => "memory",
            Phase::Think => "think",
            Phase::Guard => "guard",
            Phase::Act => "act",
            Phase::Learn => "learn",
            Phase::Genesis => "genesis",
            Phase::Lifecycle => "lifecycle",
            Phase::Cycle => "cycle",
        }
    }
}

/// Outcome status of one logged phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    Completed,
    Aborted,
    Failed,
    Skipped,
    /// Guardrail intervention record (non-auto disposition) or a
    /// capability lifecycle transition.
    Intervention,
}

/// One audit row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionLogEntry {
    pub id: Uuid,
    pub cycle_id: Uuid,
    pub company_id: Uuid,
    pub department: Department,
    pub phase: Phase,
    pub status: PhaseStatus,
    /// Snapshot, decisions or transition details involved in the phase.
    pub detail: Value,
    pub credits_consumed: f64,
    pub duration_ms: u64,
    pub error: Option<String>,
    pub logged_at: Timestamp,
}

impl ExecutionLogEntry {
    pub fn new(
        cycle_id: Uuid,
        company_id: Uuid,
        department: Department,
        phase: Phase,
        status: PhaseStatus,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            cycle_id,
            company_id,
            department,
            phase,
            status,
            detail: Value::Null,
            credits_consumed: 0.0,
            duration_ms: 0,
            error: None,
            logged_at: crate::types::now(),
        }
    }

    pub fn with_detail(mut self, detail: Value) -> Self {
        self.detail = detail;
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn with_credits(mut self, credits: f64) -> Self {
        self.credits_consumed = credits;
        self
    }
}
