//! Autopilot Core - Domain types and algorithms for the decision engine
//!
//! This crate holds everything that is pure: the department vocabulary,
//! decision scoring, the guard policy pipeline, the capability lifecycle
//! state machine, readiness checks and the data-access ports. No I/O
//! happens here — persistence lives in `autopilot-store` and every
//! network round-trip lives in `autopilot-engine`.
//!
//! # Design principles
//!
//! 1. **Closed enumerations**: dispositions, outcomes and lifecycle
//!    states are exhaustive enums, never strings.
//! 2. **Determinism**: scores and verdicts are pure functions of their
//!    inputs; a stored score is never trusted without its breakdown.
//! 3. **Ports over singletons**: components receive store traits by
//!    injection so tests can substitute fakes.

#![deny(unsafe_code)]
#![warn(rust_2018_idioms, missing_debug_implementations)]

pub mod approval;
pub mod audit;
pub mod capability;
pub mod config;
pub mod decision;
pub mod error;
pub mod guard;
pub mod memory;
pub mod ports;
pub mod signal;
pub mod snapshot;
pub mod types;

// Re-export commonly used types for convenience
pub use approval::{ApprovalRecord, ApprovalStatus, ApprovalSubject};
pub use audit::{ExecutionLogEntry, Phase, PhaseStatus};
pub use capability::{govern, Capability, CapabilityStatus, GovernanceAction};
pub use config::{ActiveHours, DepartmentConfig};
pub use decision::{score_breakdown, sort_by_score, Decision, Disposition, ScoreBreakdown};
pub use error::{EngineError, ExecutorError, OracleError, Result, StoreError};
pub use guard::{evaluate as guard_evaluate, CampaignBudget, GuardContext, GuardVerdict};
pub use memory::{context_hash, MemoryEntry, Outcome};
pub use ports::{DataStore, ExecutorSpec};
pub use signal::{ImpactLevel, IntelBundle, IntelSignal, IntelTopic};
pub use snapshot::{is_sufficient, preflight, PreflightCounts, PreflightVerdict, SenseSnapshot};
pub use types::{
    now, CompanyProfile, Department, MaturityTier, Priority, RiskLevel, Sector, Timestamp, Trend,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
