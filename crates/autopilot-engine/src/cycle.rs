//! Cycle orchestration
//!
//! One `run_cycle` call takes a (company, department) pair through the
//! full phase sequence: preflight, sense, intel, memory, think, guard,
//! act, learn, genesis, lifecycle. Every phase appends an audit row.
//! Aborts (preflight failure, insufficient data) are clean stops, not
//! failures; nothing decision-shaped is persisted past an abort.

use crate::act::{act, ActReport, ExecutorInvoker, InvocationContext};
use crate::oracle::Oracle;
use crate::{genesis, learn, lifecycle};
use autopilot_core::guard::{CampaignBudget, GuardContext};
use autopilot_core::memory::context_hash;
use autopilot_core::ports::{DataStore, ExecutorSpec};
use autopilot_core::snapshot::{is_sufficient, preflight};
use autopilot_core::{
    guard_evaluate, now, ApprovalRecord, ApprovalSubject, Capability, CompanyProfile, Decision,
    Department, DepartmentConfig, Disposition, EngineError, ExecutionLogEntry, Phase, PhaseStatus,
    StoreError, Timestamp,
};
use chrono::{Datelike, Duration, NaiveTime};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Summary of one completed cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub company_id: Uuid,
    pub department: Department,
    pub total_decisions: u32,
    pub passed: u32,
    pub blocked: u32,
    pub pending_review: u32,
    pub credits_consumed: f64,
    pub execution_time_ms: u64,
}

/// Per-department result of a trigger pass. Aborted and failed
/// departments show up as descriptors next to the completed reports;
/// the trigger never drops a department it attempted.
#[derive(Debug, Clone)]
pub enum CycleOutcome {
    Completed(CycleReport),
    Aborted {
        company_id: Uuid,
        department: Department,
        reason: String,
        missing: Vec<String>,
    },
    Failed {
        company_id: Uuid,
        department: Department,
        error: String,
    },
}

impl CycleOutcome {
    fn from_run(
        company_id: Uuid,
        department: Department,
        result: autopilot_core::Result<CycleReport>,
    ) -> Self {
        match result {
            Ok(report) => CycleOutcome::Completed(report),
            Err(EngineError::Aborted { reason, missing }) => CycleOutcome::Aborted {
                company_id,
                department,
                reason,
                missing,
            },
            Err(err) => CycleOutcome::Failed {
                company_id,
                department,
                error: err.to_string(),
            },
        }
    }

    /// The completed report, when there is one.
    pub fn report(&self) -> Option<&CycleReport> {
        match self {
            CycleOutcome::Completed(report) => Some(report),
            _ => None,
        }
    }
}

/// The assembled engine: one store, one oracle, one executor invoker.
pub struct Engine<S, O, I> {
    store: Arc<S>,
    oracle: Arc<O>,
    invoker: Arc<I>,
}

impl<S, O, I> std::fmt::Debug for Engine<S, O, I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine").finish_non_exhaustive()
    }
}

impl<S, O, I> Engine<S, O, I>
where
    S: DataStore,
    O: Oracle,
    I: ExecutorInvoker,
{
    pub fn new(store: Arc<S>, oracle: Arc<O>, invoker: Arc<I>) -> Self {
        Self {
            store,
            oracle,
            invoker,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Run one cycle for a (company, department) pair.
    pub async fn run_cycle(
        &self,
        company_id: Uuid,
        department: Department,
    ) -> autopilot_core::Result<CycleReport> {
        let cycle_id = Uuid::new_v4();
        let started = Instant::now();
        let ts = now();
        info!(%company_id, %department, %cycle_id, "cycle started");

        let result = self
            .execute_phases(company_id, department, cycle_id, ts)
            .await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(mut report) => {
                report.execution_time_ms = elapsed_ms;
                self.log(
                    ExecutionLogEntry::new(
                        cycle_id,
                        company_id,
                        department,
                        Phase::Cycle,
                        PhaseStatus::Completed,
                    )
                    .with_detail(json!({
                        "total_decisions": report.total_decisions,
                        "passed": report.passed,
                        "blocked": report.blocked,
                        "pending_review": report.pending_review,
                    }))
                    .with_credits(report.credits_consumed)
                    .with_duration_ms(elapsed_ms),
                );
                // Decisions and audit rows are already committed; a failed
                // last-run bump must not turn the cycle into an error.
                if let Err(err) = self.store.record_cycle_run(company_id, department, ts) {
                    warn!(%cycle_id, %err, "failed to record cycle run");
                }
                info!(%cycle_id, decisions = report.total_decisions, "cycle completed");
                Ok(report)
            }
            Err(err) if err.is_abort() => {
                self.log(
                    ExecutionLogEntry::new(
                        cycle_id,
                        company_id,
                        department,
                        Phase::Cycle,
                        PhaseStatus::Aborted,
                    )
                    .with_error(err.to_string())
                    .with_duration_ms(elapsed_ms),
                );
                // An aborted department still consumed its frequency slot;
                // otherwise the trigger retries it every pass.
                if let Err(store_err) = self.store.record_cycle_run(company_id, department, ts) {
                    warn!(%cycle_id, %store_err, "failed to record cycle run");
                }
                info!(%cycle_id, %err, "cycle aborted");
                Err(err)
            }
            Err(err) => {
                self.log(
                    ExecutionLogEntry::new(
                        cycle_id,
                        company_id,
                        department,
                        Phase::Cycle,
                        PhaseStatus::Failed,
                    )
                    .with_error(err.to_string())
                    .with_duration_ms(elapsed_ms),
                );
                error!(%cycle_id, %err, "cycle failed");
                Err(err)
            }
        }
    }

    /// Run every (company, department) whose frequency window has elapsed.
    /// One outcome per due department; aborts and failures are isolated
    /// per pair and reported as descriptors, never raised.
    pub async fn run_due(&self) -> Vec<CycleOutcome> {
        let ts = now();
        let configs = match self.store.enabled_configs() {
            Ok(configs) => configs,
            Err(err) => {
                error!(%err, "could not enumerate enabled departments");
                return Vec::new();
            }
        };
        let mut outcomes = Vec::new();
        for config in configs {
            if !config.due(ts) {
                continue;
            }
            let result = self.run_cycle(config.company_id, config.department).await;
            outcomes.push(CycleOutcome::from_run(
                config.company_id,
                config.department,
                result,
            ));
        }
        outcomes
    }

    /// Run one company immediately, bypassing the frequency gate. With no
    /// department given, runs every enabled department of the company.
    pub async fn run_for(
        &self,
        company_id: Uuid,
        department: Option<Department>,
    ) -> Vec<CycleOutcome> {
        let departments: Vec<Department> = match department {
            Some(dept) => vec![dept],
            None => match self.store.enabled_configs() {
                Ok(configs) => configs
                    .into_iter()
                    .filter(|c| c.company_id == company_id)
                    .map(|c| c.department)
                    .collect(),
                Err(err) => {
                    error!(%company_id, %err, "could not enumerate enabled departments");
                    return Vec::new();
                }
            },
        };
        let mut outcomes = Vec::new();
        for dept in departments {
            let result = self.run_cycle(company_id, dept).await;
            outcomes.push(CycleOutcome::from_run(company_id, dept, result));
        }
        outcomes
    }

    async fn execute_phases(
        &self,
        company_id: Uuid,
        department: Department,
        cycle_id: Uuid,
        ts: Timestamp,
    ) -> autopilot_core::Result<CycleReport> {
        let store = self.store.as_ref();

        // Preflight.
        let phase_start = Instant::now();
        let config = store
            .department_config(company_id, department)?
            .ok_or_else(|| {
                StoreError::NotFound(format!("config for {company_id}/{department}"))
            })?;
        let profile = store.company_profile(company_id)?;
        let counts = store.preflight_counts(company_id)?;
        let verdict = preflight(department, &counts);
        if !verdict.ready {
            self.log_phase(
                cycle_id,
                company_id,
                department,
                Phase::Preflight,
                PhaseStatus::Aborted,
                json!({ "missing": verdict.missing }),
                phase_start,
            );
            return Err(EngineError::Aborted {
                reason: verdict.reason.unwrap_or_else(|| "not ready".to_string()),
                missing: verdict.missing,
            });
        }
        self.log_phase(
            cycle_id,
            company_id,
            department,
            Phase::Preflight,
            PhaseStatus::Completed,
            serde_json::to_value(&counts)?,
            phase_start,
        );

        // Sense, with the marketing one-shot bootstrap.
        let phase_start = Instant::now();
        let executors = store.executors(department)?;
        let mut snapshot = crate::sense::sense(store, company_id, department, ts);
        if !is_sufficient(&snapshot) {
            if department == Department::Marketing {
                self.bootstrap_marketing(company_id, &executors, cycle_id)
                    .await;
                snapshot = crate::sense::sense(store, company_id, department, ts);
            }
            if !is_sufficient(&snapshot) {
                self.log_phase(
                    cycle_id,
                    company_id,
                    department,
                    Phase::Sense,
                    PhaseStatus::Aborted,
                    serde_json::to_value(&snapshot)?,
                    phase_start,
                );
                return Err(EngineError::aborted("insufficient_data"));
            }
        }
        self.log_phase(
            cycle_id,
            company_id,
            department,
            Phase::Sense,
            PhaseStatus::Completed,
            serde_json::to_value(&snapshot)?,
            phase_start,
        );

        // Intel (best-effort, never fatal).
        let phase_start = Instant::now();
        let intel = crate::intel::gather(store, self.oracle.as_ref(), &profile, ts).await;
        let status = if intel.is_some() {
            PhaseStatus::Completed
        } else {
            PhaseStatus::Skipped
        };
        self.log_phase(
            cycle_id,
            company_id,
            department,
            Phase::Intel,
            status,
            json!({ "signals": intel.as_ref().map(|b| b.signals.len()).unwrap_or(0) }),
            phase_start,
        );

        // Memory recall.
        let phase_start = Instant::now();
        let snapshot_key = serde_json::to_string(&snapshot.metrics)?;
        let hash = context_hash(department, "cycle", &snapshot_key);
        let memory = crate::recall::recall(store, company_id, department, &hash);
        self.log_phase(
            cycle_id,
            company_id,
            department,
            Phase::Memory,
            PhaseStatus::Completed,
            json!({ "lessons": memory.lessons.len(), "rules": memory.rules.len() }),
            phase_start,
        );

        // Think.
        let phase_start = Instant::now();
        let capabilities = store.capabilities(company_id, department)?;
        let live_capabilities: Vec<Capability> = capabilities
            .iter()
            .filter(|c| !c.status.is_terminal())
            .cloned()
            .collect();
        let input = crate::think::ThinkInput {
            profile: &profile,
            config: &config,
            snapshot: &snapshot,
            memory: &memory,
            intel: intel.as_ref(),
            executors: &executors,
            active_capabilities: &live_capabilities,
        };
        let mut decisions = crate::think::think(self.oracle.as_ref(), &input, cycle_id, ts).await?;
        self.log_phase(
            cycle_id,
            company_id,
            department,
            Phase::Think,
            PhaseStatus::Completed,
            json!({ "candidates": decisions.len() }),
            phase_start,
        );

        // Guard.
        let phase_start = Instant::now();
        let ctx = self.guard_context(company_id, department, &config, &profile, ts)?;
        self.apply_guard(&mut decisions, &config, &ctx, cycle_id)?;
        self.log_phase(
            cycle_id,
            company_id,
            department,
            Phase::Guard,
            PhaseStatus::Completed,
            json!({
                "blocked": count_disposition(&decisions, Disposition::Blocked),
                "escalated": count_disposition(&decisions, Disposition::Escalated),
            }),
            phase_start,
        );

        // Act.
        let phase_start = Instant::now();
        let act_report: ActReport = act(
            store,
            self.invoker.as_ref(),
            &mut decisions,
            &executors,
            &capabilities,
            &profile,
            &snapshot,
            department,
            cycle_id,
            ts,
        )
        .await;
        self.log_phase(
            cycle_id,
            company_id,
            department,
            Phase::Act,
            PhaseStatus::Completed,
            json!({ "executed": act_report.executed, "failed": act_report.failed }),
            phase_start,
        );

        // Learn.
        let phase_start = Instant::now();
        let seeded = learn::persist_and_seed(store, &decisions, &snapshot, cycle_id, ts)?;
        let evaluated = learn::evaluate_pending(store, company_id, department, ts)?;
        let rules = learn::extract_patterns(store, self.oracle.as_ref(), company_id, department)
            .await?;
        self.log_phase(
            cycle_id,
            company_id,
            department,
            Phase::Learn,
            PhaseStatus::Completed,
            json!({ "seeded": seeded, "evaluated": evaluated, "rules": rules }),
            phase_start,
        );

        // Genesis.
        let phase_start = Instant::now();
        let created = genesis::run(
            store,
            self.oracle.as_ref(),
            company_id,
            department,
            intel.as_ref(),
            cycle_id,
            ts,
        )
        .await?;
        self.log_phase(
            cycle_id,
            company_id,
            department,
            Phase::Genesis,
            PhaseStatus::Completed,
            json!({ "proposed": created }),
            phase_start,
        );

        // Lifecycle.
        let phase_start = Instant::now();
        let lifecycle_report = lifecycle::run(store, company_id, department, cycle_id, ts)?;
        self.log_phase(
            cycle_id,
            company_id,
            department,
            Phase::Lifecycle,
            PhaseStatus::Completed,
            json!({
                "activated": lifecycle_report.activated,
                "deprecated": lifecycle_report.deprecated,
            }),
            phase_start,
        );

        Ok(CycleReport {
            cycle_id,
            company_id,
            department,
            total_decisions: decisions.len() as u32,
            passed: act_report.executed,
            blocked: count_disposition(&decisions, Disposition::Blocked),
            pending_review: count_disposition(&decisions, Disposition::RequiresApproval)
                + count_disposition(&decisions, Disposition::Escalated),
            credits_consumed: act_report.credits_consumed,
            execution_time_ms: 0,
        })
    }

    /// Aggregates and flags read once before guard runs. Concurrent
    /// cycles for the same company read these independently; the budget
    /// checks are best-effort, not linearizable.
    fn guard_context(
        &self,
        company_id: Uuid,
        department: Department,
        config: &DepartmentConfig,
        profile: &CompanyProfile,
        ts: Timestamp,
    ) -> autopilot_core::Result<GuardContext> {
        let store = self.store.as_ref();
        let credits_today = store.credits_spent_since(company_id, day_start(ts))?;
        let actioned_by_type_24h =
            store.actioned_type_counts_since(company_id, department, ts - Duration::hours(24))?;
        let monthly_credits_used = if config.monthly_credit_budget.is_some() {
            store.credits_spent_since(company_id, month_start(ts))?
        } else {
            0.0
        };
        let campaign_budgets = store
            .campaigns(company_id)?
            .into_iter()
            .filter(|c| c.active)
            .map(|c| CampaignBudget {
                consumed_ratio: c.consumed_ratio(),
                campaign: c.name,
            })
            .collect();

        Ok(GuardContext {
            credits_today,
            actioned_by_type_24h,
            monthly_credits_used,
            campaign_budgets,
            finance_budget_exceeded: profile.budget_freeze,
            legal_review_required: profile.compliance_review_required,
            compliance_cleared: profile.compliance_cleared,
            sector: profile.sector,
            current_hour: DepartmentConfig::hour_of(ts),
        })
    }

    /// Evaluate every decision in score order, record approval queue
    /// entries and intervention audit rows.
    fn apply_guard(
        &self,
        decisions: &mut [Decision],
        config: &DepartmentConfig,
        ctx: &GuardContext,
        cycle_id: Uuid,
    ) -> autopilot_core::Result<()> {
        for decision in decisions.iter_mut() {
            let verdict = guard_evaluate(decision, config, ctx);
            decision.risk = verdict.risk;
            decision.disposition = Some(verdict.disposition);
            decision.guard_notes = verdict.notes;
            decision.block_reason = verdict.block_reason;

            if matches!(
                verdict.disposition,
                Disposition::RequiresApproval | Disposition::Escalated
            ) {
                let record = ApprovalRecord::pending(
                    decision.company_id,
                    decision.department,
                    ApprovalSubject::Decision(decision.id),
                    decision.risk,
                    decision.description.clone(),
                );
                let record = if verdict.disposition == Disposition::Escalated {
                    record.multi_stakeholder()
                } else {
                    record
                };
                self.store.insert_approval(&record)?;
            }

            if let Some(counterfactual) = verdict.counterfactual {
                let entry = ExecutionLogEntry::new(
                    cycle_id,
                    decision.company_id,
                    decision.department,
                    Phase::Guard,
                    PhaseStatus::Intervention,
                )
                .with_detail(json!({
                    "decision_id": decision.id,
                    "decision_type": decision.decision_type,
                    "disposition": decision.disposition,
                    "block_reason": decision.block_reason,
                    "counterfactual": counterfactual,
                }));
                self.store.append(&entry)?;
            }
        }
        Ok(())
    }

    /// One-shot marketing bootstrap: call every implemented import
    /// executor once, then the caller re-senses. Failures only warn; the
    /// re-sense decides whether the cycle continues.
    async fn bootstrap_marketing(
        &self,
        company_id: Uuid,
        executors: &[ExecutorSpec],
        cycle_id: Uuid,
    ) {
        let ctx = InvocationContext::root(cycle_id);
        for spec in executors {
            if !spec.implemented || !spec.name.contains("import") {
                continue;
            }
            let payload = json!({ "company_id": company_id, "bootstrap": true });
            match self.invoker.invoke(spec, payload, &ctx).await {
                Ok(_) => info!(executor = %spec.name, "bootstrap import dispatched"),
                Err(err) => warn!(executor = %spec.name, %err, "bootstrap import failed"),
            }
        }
    }

    fn log_phase(
        &self,
        cycle_id: Uuid,
        company_id: Uuid,
        department: Department,
        phase: Phase,
        status: PhaseStatus,
        detail: serde_json::Value,
        started: Instant,
    ) {
        self.log(
            ExecutionLogEntry::new(cycle_id, company_id, department, phase, status)
                .with_detail(detail)
                .with_duration_ms(started.elapsed().as_millis() as u64),
        );
    }

    /// Audit writes never kill a cycle.
    fn log(&self, entry: ExecutionLogEntry) {
        if let Err(err) = self.store.append(&entry) {
            warn!(%err, phase = entry.phase.as_str(), "audit append failed");
        }
    }
}

fn count_disposition(decisions: &[Decision], disposition: Disposition) -> u32 {
    decisions
        .iter()
        .filter(|d| d.disposition == Some(disposition))
        .count() as u32
}

fn day_start(ts: Timestamp) -> Timestamp {
    ts.date_naive().and_time(NaiveTime::MIN).and_utc()
}

fn month_start(ts: Timestamp) -> Timestamp {
    let first = ts.date_naive().with_day(1).unwrap_or_else(|| ts.date_naive());
    first.and_time(NaiveTime::MIN).and_utc()
}
