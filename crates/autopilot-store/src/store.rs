//! Port implementations over SQLite
//!
//! One `SqliteStore` implements every data-access trait from
//! `autopilot_core::ports`. All reads and writes go through a single
//! mutex-guarded connection; aggregates used by guard are plain reads,
//! so budget checks stay best-effort under concurrent cycles (accepted
//! and documented in core::guard).

use crate::convert::*;
use crate::SqliteStore;
use autopilot_core::approval::{ApprovalRecord, ApprovalStatus, ApprovalSubject};
use autopilot_core::audit::ExecutionLogEntry;
use autopilot_core::capability::Capability;
use autopilot_core::config::{ActiveHours, DepartmentConfig};
use autopilot_core::decision::Decision;
use autopilot_core::memory::{MemoryEntry, Outcome};
use autopilot_core::ports::*;
use autopilot_core::signal::IntelBundle;
use autopilot_core::snapshot::{Competitor, PreflightCounts};
use autopilot_core::{CompanyProfile, Department, StoreError, Timestamp};
use rusqlite::{params, params_from_iter, OptionalExtension, Row};
use std::collections::HashMap;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Row readers
// ---------------------------------------------------------------------------

fn read_config(row: &Row<'_>) -> rusqlite::Result<RawConfig> {
    Ok(RawConfig {
        company_id: row.get(0)?,
        department: row.get(1)?,
        enabled: row.get(2)?,
        frequency_hours: row.get(3)?,
        max_credits_per_cycle: row.get(4)?,
        max_posts_per_day: row.get(5)?,
        max_actions_per_cycle: row.get(6)?,
        monthly_credit_budget: row.get(7)?,
        active_start: row.get(8)?,
        active_end: row.get(9)?,
        forbidden_words: row.get(10)?,
        restricted_topics: row.get(11)?,
        require_human_approval: row.get(12)?,
        brand_tone: row.get(13)?,
        allowed_actions: row.get(14)?,
        last_execution_at: row.get(15)?,
        cycles_completed: row.get(16)?,
    })
}

struct RawConfig {
    company_id: String,
    department: String,
    enabled: bool,
    frequency_hours: i64,
    max_credits_per_cycle: f64,
    max_posts_per_day: u32,
    max_actions_per_cycle: u32,
    monthly_credit_budget: Option<f64>,
    active_start: Option<u8>,
    active_end: Option<u8>,
    forbidden_words: String,
    restricted_topics: String,
    require_human_approval: bool,
    brand_tone: Option<String>,
    allowed_actions: String,
    last_execution_at: Option<String>,
    cycles_completed: u64,
}

impl RawConfig {
    fn into_config(self) -> Result<DepartmentConfig, StoreError> {
        let active_hours = match (self.active_start, self.active_end) {
            (Some(start), Some(end)) => Some(ActiveHours::new(start, end)),
            _ => None,
        };
        Ok(DepartmentConfig {
            company_id: uuid_from_sql(&self.company_id)?,
            department: dept_from_sql(&self.department)?,
            enabled: self.enabled,
            frequency_hours: self.frequency_hours,
            max_credits_per_cycle: self.max_credits_per_cycle,
            max_posts_per_day: self.max_posts_per_day,
            max_actions_per_cycle: self.max_actions_per_cycle,
            monthly_credit_budget: self.monthly_credit_budget,
            active_hours,
            forbidden_words: json_from_sql(&self.forbidden_words)?,
            restricted_topics: json_from_sql(&self.restricted_topics)?,
            require_human_approval: self.require_human_approval,
            brand_tone: self.brand_tone,
            allowed_actions: json_from_sql(&self.allowed_actions)?,
            last_execution_at: opt_ts_from_sql(self.last_execution_at)?,
            cycles_completed: self.cycles_completed,
        })
    }
}

const CONFIG_COLUMNS: &str = "company_id, department, enabled, frequency_hours, \
    max_credits_per_cycle, max_posts_per_day, max_actions_per_cycle, monthly_credit_budget, \
    active_start, active_end, forbidden_words, restricted_topics, require_human_approval, \
    brand_tone, allowed_actions, last_execution_at, cycles_completed";

struct RawDecision {
    id: String,
    company_id: String,
    department: String,
    cycle_id: String,
    decision_type: String,
    priority: String,
    risk: String,
    description: String,
    reasoning: String,
    executor: Option<String>,
    parameters: String,
    priority_score: f64,
    score_breakdown: String,
    disposition: String,
    action_taken: bool,
    guard_notes: String,
    block_reason: Option<String>,
    signal_influenced: bool,
    created_at: String,
}

fn read_decision(row: &Row<'_>) -> rusqlite::Result<RawDecision> {
    Ok(RawDecision {
        id: row.get(0)?,
        company_id: row.get(1)?,
        department: row.get(2)?,
        cycle_id: row.get(3)?,
        decision_type: row.get(4)?,
        priority: row.get(5)?,
        risk: row.get(6)?,
        description: row.get(7)?,
        reasoning: row.get(8)?,
        executor: row.get(9)?,
        parameters: row.get(10)?,
        priority_score: row.get(11)?,
        score_breakdown: row.get(12)?,
        disposition: row.get(13)?,
        action_taken: row.get(14)?,
        guard_notes: row.get(15)?,
        block_reason: row.get(16)?,
        signal_influenced: row.get(17)?,
        created_at: row.get(18)?,
    })
}

impl RawDecision {
    fn into_decision(self) -> Result<Decision, StoreError> {
        Ok(Decision {
            id: uuid_from_sql(&self.id)?,
            company_id: uuid_from_sql(&self.company_id)?,
            department: dept_from_sql(&self.department)?,
            cycle_id: uuid_from_sql(&self.cycle_id)?,
            decision_type: self.decision_type,
            priority: enum_from_sql(&self.priority)?,
            risk: enum_from_sql(&self.risk)?,
            description: self.description,
            reasoning: self.reasoning,
            executor: self.executor,
            parameters: json_from_sql(&self.parameters)?,
            priority_score: self.priority_score,
            score_breakdown: json_from_sql(&self.score_breakdown)?,
            disposition: Some(enum_from_sql(&self.disposition)?),
            action_taken: self.action_taken,
            guard_notes: json_from_sql(&self.guard_notes)?,
            block_reason: self.block_reason,
            signal_influenced: self.signal_influenced,
            created_at: ts_from_sql(&self.created_at)?,
        })
    }
}

const DECISION_COLUMNS: &str = "id, company_id, department, cycle_id, decision_type, priority, \
    risk, description, reasoning, executor, parameters, priority_score, score_breakdown, \
    disposition, action_taken, guard_notes, block_reason, signal_influenced, created_at";

struct RawMemory {
    id: String,
    company_id: String,
    department: String,
    cycle_id: String,
    decision_type: String,
    context: String,
    context_hash: String,
    outcome: String,
    outcome_score: Option<f64>,
    lesson: Option<String>,
    extracted_rules: String,
    created_at: String,
    evaluated_at: Option<String>,
}

fn read_memory(row: &Row<'_>) -> rusqlite::Result<RawMemory> {
    Ok(RawMemory {
        id: row.get(0)?,
        company_id: row.get(1)?,
        department: row.get(2)?,
        cycle_id: row.get(3)?,
        decision_type: row.get(4)?,
        context: row.get(5)?,
        context_hash: row.get(6)?,
        outcome: row.get(7)?,
        outcome_score: row.get(8)?,
        lesson: row.get(9)?,
        extracted_rules: row.get(10)?,
        created_at: row.get(11)?,
        evaluated_at: row.get(12)?,
    })
}

impl RawMemory {
    fn into_entry(self) -> Result<MemoryEntry, StoreError> {
        Ok(MemoryEntry {
            id: uuid_from_sql(&self.id)?,
            company_id: uuid_from_sql(&self.company_id)?,
            department: dept_from_sql(&self.department)?,
            cycle_id: uuid_from_sql(&self.cycle_id)?,
            decision_type: self.decision_type,
            context: self.context,
            context_hash: self.context_hash,
            outcome: enum_from_sql(&self.outcome)?,
            outcome_score: self.outcome_score,
            lesson: self.lesson,
            extracted_rules: json_from_sql(&self.extracted_rules)?,
            created_at: ts_from_sql(&self.created_at)?,
            evaluated_at: opt_ts_from_sql(self.evaluated_at)?,
        })
    }
}

const MEMORY_COLUMNS: &str = "id, company_id, department, cycle_id, decision_type, context, \
    context_hash, outcome, outcome_score, lesson, extracted_rules, created_at, evaluated_at";

struct RawCapability {
    id: String,
    company_id: String,
    department: String,
    name: String,
    description: String,
    trigger_condition: String,
    decision_types: String,
    status: String,
    risk: String,
    required_data: String,
    success_metric: Option<String>,
    auto_activatable: bool,
    trial_expires_at: Option<String>,
    execution_count: u64,
    activation_reason: Option<String>,
    deactivation_reason: Option<String>,
    created_at: String,
    last_evaluated_at: Option<String>,
}

fn read_capability(row: &Row<'_>) -> rusqlite::Result<RawCapability> {
    Ok(RawCapability {
        id: row.get(0)?,
        company_id: row.get(1)?,
        department: row.get(2)?,
        name: row.get(3)?,
        description: row.get(4)?,
        trigger_condition: row.get(5)?,
        decision_types: row.get(6)?,
        status: row.get(7)?,
        risk: row.get(8)?,
        required_data: row.get(9)?,
        success_metric: row.get(10)?,
        auto_activatable: row.get(11)?,
        trial_expires_at: row.get(12)?,
        execution_count: row.get(13)?,
        activation_reason: row.get(14)?,
        deactivation_reason: row.get(15)?,
        created_at: row.get(16)?,
        last_evaluated_at: row.get(17)?,
    })
}

impl RawCapability {
    fn into_capability(self) -> Result<Capability, StoreError> {
        Ok(Capability {
            id: uuid_from_sql(&self.id)?,
            company_id: uuid_from_sql(&self.company_id)?,
            department: dept_from_sql(&self.department)?,
            name: self.name,
            description: self.description,
            trigger_condition: json_from_sql(&self.trigger_condition)?,
            decision_types: json_from_sql(&self.decision_types)?,
            status: enum_from_sql(&self.status)?,
            risk: enum_from_sql(&self.risk)?,
            required_data: json_from_sql(&self.required_data)?,
            success_metric: self.success_metric,
            auto_activatable: self.auto_activatable,
            trial_expires_at: opt_ts_from_sql(self.trial_expires_at)?,
            execution_count: self.execution_count,
            activation_reason: self.activation_reason,
            deactivation_reason: self.deactivation_reason,
            created_at: ts_from_sql(&self.created_at)?,
            last_evaluated_at: opt_ts_from_sql(self.last_evaluated_at)?,
        })
    }
}

const CAPABILITY_COLUMNS: &str = "id, company_id, department, name, description, \
    trigger_condition, decision_types, status, risk, required_data, success_metric, \
    auto_activatable, trial_expires_at, execution_count, activation_reason, \
    deactivation_reason, created_at, last_evaluated_at";

struct RawApproval {
    id: String,
    company_id: String,
    department: String,
    subject_kind: String,
    subject_id: String,
    status: String,
    risk: String,
    summary: String,
    multi_stakeholder: bool,
    post_hoc: bool,
    reviewer_note: Option<String>,
    created_at: String,
    resolved_at: Option<String>,
    applied: bool,
}

fn read_approval(row: &Row<'_>) -> rusqlite::Result<RawApproval> {
    Ok(RawApproval {
        id: row.get(0)?,
        company_id: row.get(1)?,
        department: row.get(2)?,
        subject_kind: row.get(3)?,
        subject_id: row.get(4)?,
        status: row.get(5)?,
        risk: row.get(6)?,
        summary: row.get(7)?,
        multi_stakeholder: row.get(8)?,
        post_hoc: row.get(9)?,
        reviewer_note: row.get(10)?,
        created_at: row.get(11)?,
        resolved_at: row.get(12)?,
        applied: row.get(13)?,
    })
}

impl RawApproval {
    fn into_record(self) -> Result<ApprovalRecord, StoreError> {
        let subject_id = uuid_from_sql(&self.subject_id)?;
        let subject = match self.subject_kind.as_str() {
            "decision" => ApprovalSubject::Decision(subject_id),
            "capability" => ApprovalSubject::Capability(subject_id),
            other => {
                return Err(StoreError::Corrupt(format!(
                    "unknown approval subject kind '{other}'"
                )))
            }
        };
        Ok(ApprovalRecord {
            id: uuid_from_sql(&self.id)?,
            company_id: uuid_from_sql(&self.company_id)?,
            department: dept_from_sql(&self.department)?,
            subject,
            status: enum_from_sql(&self.status)?,
            risk: enum_from_sql(&self.risk)?,
            summary: self.summary,
            multi_stakeholder: self.multi_stakeholder,
            post_hoc: self.post_hoc,
            reviewer_note: self.reviewer_note,
            created_at: ts_from_sql(&self.created_at)?,
            resolved_at: opt_ts_from_sql(self.resolved_at)?,
            applied: self.applied,
        })
    }
}

const APPROVAL_COLUMNS: &str = "id, company_id, department, subject_kind, subject_id, status, \
    risk, summary, multi_stakeholder, post_hoc, reviewer_note, created_at, resolved_at, applied";

fn subject_parts(subject: &ApprovalSubject) -> (&'static str, Uuid) {
    match subject {
        ApprovalSubject::Decision(id) => ("decision", *id),
        ApprovalSubject::Capability(id) => ("capability", *id),
    }
}

// ---------------------------------------------------------------------------
// ConfigStore
// ---------------------------------------------------------------------------

impl ConfigStore for SqliteStore {
    fn department_config(
        &self,
        company_id: Uuid,
        department: Department,
    ) -> StoreResult<Option<DepartmentConfig>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {CONFIG_COLUMNS} FROM department_configs WHERE company_id = ?1 AND department = ?2"
        );
        let raw = conn
            .query_row(
                &sql,
                params![company_id.to_string(), department.as_str()],
                read_config,
            )
            .optional()
            .map_err(db_err)?;
        raw.map(RawConfig::into_config).transpose()
    }

    fn enabled_configs(&self) -> StoreResult<Vec<DepartmentConfig>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {CONFIG_COLUMNS} FROM department_configs WHERE enabled = 1");
        let mut stmt = conn.prepare(&sql).map_err(db_err)?;
        let rows = stmt.query_map([], read_config).map_err(db_err)?;
        let mut configs = Vec::new();
        for row in rows {
            configs.push(row.map_err(db_err)?.into_config()?);
        }
        Ok(configs)
    }

    fn company_profile(&self, company_id: Uuid) -> StoreResult<CompanyProfile> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, name, sector, maturity, industry, country, budget_freeze, \
             compliance_review_required, compliance_cleared FROM companies WHERE id = ?1",
            params![company_id.to_string()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, bool>(6)?,
                    row.get::<_, bool>(7)?,
                    row.get::<_, bool>(8)?,
                ))
            },
        )
        .optional()
        .map_err(db_err)?
        .ok_or_else(|| StoreError::NotFound(format!("company {company_id}")))
        .and_then(
            |(id, name, sector, maturity, industry, country, freeze, review, cleared)| {
                Ok(CompanyProfile {
                    id: uuid_from_sql(&id)?,
                    name,
                    sector: enum_from_sql(&sector)?,
                    maturity: enum_from_sql(&maturity)?,
                    industry,
                    country,
                    budget_freeze: freeze,
                    compliance_review_required: review,
                    compliance_cleared: cleared,
                })
            },
        )
    }

    fn record_cycle_run(
        &self,
        company_id: Uuid,
        department: Department,
        at: Timestamp,
    ) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE department_configs SET last_execution_at = ?1, \
             cycles_completed = cycles_completed + 1 \
             WHERE company_id = ?2 AND department = ?3",
            params![ts_to_sql(at), company_id.to_string(), department.as_str()],
        )
        .map_err(db_err)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// OperationalData
// ---------------------------------------------------------------------------

impl OperationalData for SqliteStore {
    fn preflight_counts(&self, company_id: Uuid) -> StoreResult<PreflightCounts> {
        let conn = self.conn()?;
        let id = company_id.to_string();
        conn.query_row(
            "SELECT \
             (SELECT COUNT(*) FROM channels WHERE company_id = ?1), \
             (SELECT COUNT(*) FROM posts WHERE company_id = ?1), \
             (SELECT COUNT(*) FROM deals WHERE company_id = ?1), \
             (SELECT COUNT(*) FROM contacts WHERE company_id = ?1), \
             (SELECT COUNT(*) FROM members WHERE company_id = ?1), \
             (SELECT COUNT(*) FROM activity_events WHERE company_id = ?1) \
               + (SELECT COUNT(*) FROM tasks WHERE company_id = ?1) \
               + (SELECT COUNT(*) FROM credit_usage WHERE company_id = ?1)",
            params![id],
            |row| {
                Ok(PreflightCounts {
                    connected_channels: row.get(0)?,
                    imported_posts: row.get(1)?,
                    deals: row.get(2)?,
                    contacts: row.get(3)?,
                    members: row.get(4)?,
                    activity_rows: row.get(5)?,
                })
            },
        )
        .map_err(db_err)
    }

    fn connected_channels(&self, company_id: Uuid) -> StoreResult<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT name FROM channels WHERE company_id = ?1 ORDER BY name")
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![company_id.to_string()], |row| row.get(0))
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<String>>>().map_err(db_err)
    }

    fn posts_since(&self, company_id: Uuid, since: Timestamp) -> StoreResult<Vec<PostRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT channel, engagement, created_at FROM posts \
                 WHERE company_id = ?1 AND created_at >= ?2",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![company_id.to_string(), ts_to_sql(since)], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, f64>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .map_err(db_err)?;
        let mut posts = Vec::new();
        for row in rows {
            let (channel, engagement, created_at) = row.map_err(db_err)?;
            posts.push(PostRecord {
                channel,
                engagement,
                created_at: ts_from_sql(&created_at)?,
            });
        }
        Ok(posts)
    }

    fn campaigns(&self, company_id: Uuid) -> StoreResult<Vec<CampaignRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT name, active, budget, consumed FROM campaigns WHERE company_id = ?1")
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![company_id.to_string()], |row| {
                Ok(CampaignRecord {
                    name: row.get(0)?,
                    active: row.get(1)?,
                    budget: row.get(2)?,
                    consumed: row.get(3)?,
                })
            })
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    fn deals(&self, company_id: Uuid) -> StoreResult<Vec<DealRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT value, stage, created_at, updated_at FROM deals WHERE company_id = ?1",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![company_id.to_string()], |row| {
                Ok((
                    row.get::<_, f64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })
            .map_err(db_err)?;
        let mut deals = Vec::new();
        for row in rows {
            let (value, stage, created_at, updated_at) = row.map_err(db_err)?;
            deals.push(DealRecord {
                value,
                stage,
                created_at: ts_from_sql(&created_at)?,
                updated_at: ts_from_sql(&updated_at)?,
            });
        }
        Ok(deals)
    }

    fn contact_count(&self, company_id: Uuid) -> StoreResult<u32> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT COUNT(*) FROM contacts WHERE company_id = ?1",
            params![company_id.to_string()],
            |row| row.get(0),
        )
        .map_err(db_err)
    }

    fn members(&self, company_id: Uuid) -> StoreResult<Vec<MemberRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT joined_at FROM members WHERE company_id = ?1")
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![company_id.to_string()], |row| {
                row.get::<_, String>(0)
            })
            .map_err(db_err)?;
        let mut members = Vec::new();
        for row in rows {
            members.push(MemberRecord {
                joined_at: ts_from_sql(&row.map_err(db_err)?)?,
            });
        }
        Ok(members)
    }

    fn tasks_since(&self, company_id: Uuid, since: Timestamp) -> StoreResult<Vec<TaskRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT completed, agent_failed, created_at, completed_at FROM tasks \
                 WHERE company_id = ?1 AND created_at >= ?2",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![company_id.to_string(), ts_to_sql(since)], |row| {
                Ok((
                    row.get::<_, bool>(0)?,
                    row.get::<_, bool>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            })
            .map_err(db_err)?;
        let mut tasks = Vec::new();
        for row in rows {
            let (completed, agent_failed, created_at, completed_at) = row.map_err(db_err)?;
            tasks.push(TaskRecord {
                completed,
                agent_failed,
                created_at: ts_from_sql(&created_at)?,
                completed_at: opt_ts_from_sql(completed_at)?,
            });
        }
        Ok(tasks)
    }

    fn activity_count_since(
        &self,
        company_id: Uuid,
        kind: &str,
        since: Timestamp,
    ) -> StoreResult<u32> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT COUNT(*) FROM activity_events \
             WHERE company_id = ?1 AND kind = ?2 AND created_at >= ?3",
            params![company_id.to_string(), kind, ts_to_sql(since)],
            |row| row.get(0),
        )
        .map_err(db_err)
    }

    fn competitors(&self, company_id: Uuid) -> StoreResult<Vec<Competitor>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT name, priority, notes FROM competitors \
                 WHERE company_id = ?1 ORDER BY priority DESC LIMIT 10",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![company_id.to_string()], |row| {
                Ok(Competitor {
                    name: row.get(0)?,
                    priority: row.get(1)?,
                    notes: row.get(2)?,
                })
            })
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }
}

// ---------------------------------------------------------------------------
// UsageLedger
// ---------------------------------------------------------------------------

impl UsageLedger for SqliteStore {
    fn record_spend(
        &self,
        company_id: Uuid,
        department: Department,
        cycle_id: Uuid,
        credits: f64,
        at: Timestamp,
    ) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO credit_usage (company_id, department, cycle_id, credits, spent_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                company_id.to_string(),
                department.as_str(),
                cycle_id.to_string(),
                credits,
                ts_to_sql(at)
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn credits_spent_since(&self, company_id: Uuid, since: Timestamp) -> StoreResult<f64> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT COALESCE(SUM(credits), 0) FROM credit_usage \
             WHERE company_id = ?1 AND spent_at >= ?2",
            params![company_id.to_string(), ts_to_sql(since)],
            |row| row.get(0),
        )
        .map_err(db_err)
    }
}

// ---------------------------------------------------------------------------
// DecisionStore
// ---------------------------------------------------------------------------

impl DecisionStore for SqliteStore {
    fn insert_decision(&self, decision: &Decision) -> StoreResult<()> {
        let disposition = decision
            .disposition
            .ok_or_else(|| StoreError::Corrupt("decision persisted without disposition".into()))?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO decisions (id, company_id, department, cycle_id, decision_type, \
             priority, risk, description, reasoning, executor, parameters, priority_score, \
             score_breakdown, disposition, action_taken, guard_notes, block_reason, \
             signal_influenced, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)",
            params![
                decision.id.to_string(),
                decision.company_id.to_string(),
                decision.department.as_str(),
                decision.cycle_id.to_string(),
                decision.decision_type,
                enum_to_sql(&decision.priority)?,
                enum_to_sql(&decision.risk)?,
                decision.description,
                decision.reasoning,
                decision.executor,
                json_to_sql(&decision.parameters)?,
                decision.priority_score,
                json_to_sql(&decision.score_breakdown)?,
                enum_to_sql(&disposition)?,
                decision.action_taken,
                json_to_sql(&decision.guard_notes)?,
                decision.block_reason,
                decision.signal_influenced,
                ts_to_sql(decision.created_at)
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn decisions_since(
        &self,
        company_id: Uuid,
        department: Department,
        since: Timestamp,
    ) -> StoreResult<Vec<Decision>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {DECISION_COLUMNS} FROM decisions \
             WHERE company_id = ?1 AND department = ?2 AND created_at >= ?3 \
             ORDER BY created_at DESC"
        );
        let mut stmt = conn.prepare(&sql).map_err(db_err)?;
        let rows = stmt
            .query_map(
                params![company_id.to_string(), department.as_str(), ts_to_sql(since)],
                read_decision,
            )
            .map_err(db_err)?;
        let mut decisions = Vec::new();
        for row in rows {
            decisions.push(row.map_err(db_err)?.into_decision()?);
        }
        Ok(decisions)
    }

    fn actioned_type_counts_since(
        &self,
        company_id: Uuid,
        department: Department,
        since: Timestamp,
    ) -> StoreResult<HashMap<String, u32>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT decision_type, COUNT(*) FROM decisions \
                 WHERE company_id = ?1 AND department = ?2 AND action_taken = 1 \
                 AND created_at >= ?3 GROUP BY decision_type",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(
                params![company_id.to_string(), department.as_str(), ts_to_sql(since)],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?)),
            )
            .map_err(db_err)?;
        let mut counts = HashMap::new();
        for row in rows {
            let (decision_type, count) = row.map_err(db_err)?;
            counts.insert(decision_type, count);
        }
        Ok(counts)
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

impl MemoryStore for SqliteStore {
    fn insert_entry(&self, entry: &MemoryEntry) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO memory_entries (id, company_id, department, cycle_id, decision_type, \
             context, context_hash, outcome, outcome_score, lesson, extracted_rules, \
             created_at, evaluated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                entry.id.to_string(),
                entry.company_id.to_string(),
                entry.department.as_str(),
                entry.cycle_id.to_string(),
                entry.decision_type,
                entry.context,
                entry.context_hash,
                enum_to_sql(&entry.outcome)?,
                entry.outcome_score,
                entry.lesson,
                json_to_sql(&entry.extracted_rules)?,
                ts_to_sql(entry.created_at),
                entry.evaluated_at.map(ts_to_sql)
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn entry(&self, id: Uuid) -> StoreResult<Option<MemoryEntry>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {MEMORY_COLUMNS} FROM memory_entries WHERE id = ?1");
        conn.query_row(&sql, params![id.to_string()], read_memory)
            .optional()
            .map_err(db_err)?
            .map(RawMemory::into_entry)
            .transpose()
    }

    fn evaluated_entries(
        &self,
        company_id: Uuid,
        department: Department,
        limit: usize,
    ) -> StoreResult<Vec<MemoryEntry>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {MEMORY_COLUMNS} FROM memory_entries \
             WHERE company_id = ?1 AND department = ?2 AND outcome != 'pending' \
             ORDER BY created_at DESC LIMIT ?3"
        );
        let mut stmt = conn.prepare(&sql).map_err(db_err)?;
        let rows = stmt
            .query_map(
                params![company_id.to_string(), department.as_str(), limit as i64],
                read_memory,
            )
            .map_err(db_err)?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row.map_err(db_err)?.into_entry()?);
        }
        Ok(entries)
    }

    fn pending_entries_before(
        &self,
        company_id: Uuid,
        department: Department,
        cutoff: Timestamp,
    ) -> StoreResult<Vec<MemoryEntry>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {MEMORY_COLUMNS} FROM memory_entries \
             WHERE company_id = ?1 AND department = ?2 AND outcome = 'pending' \
             AND created_at <= ?3"
        );
        let mut stmt = conn.prepare(&sql).map_err(db_err)?;
        let rows = stmt
            .query_map(
                params![company_id.to_string(), department.as_str(), ts_to_sql(cutoff)],
                read_memory,
            )
            .map_err(db_err)?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row.map_err(db_err)?.into_entry()?);
        }
        Ok(entries)
    }

    fn entries_for_types_since(
        &self,
        company_id: Uuid,
        department: Department,
        decision_types: &[String],
        since: Timestamp,
    ) -> StoreResult<Vec<MemoryEntry>> {
        if decision_types.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn()?;
        let placeholders = decision_types
            .iter()
            .enumerate()
            .map(|(i, _)| format!("?{}", i + 4))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT {MEMORY_COLUMNS} FROM memory_entries \
             WHERE company_id = ?1 AND department = ?2 AND outcome != 'pending' \
             AND created_at >= ?3 AND decision_type IN ({placeholders})"
        );
        let mut stmt = conn.prepare(&sql).map_err(db_err)?;
        let mut bound: Vec<String> = vec![
            company_id.to_string(),
            department.as_str().to_string(),
            ts_to_sql(since),
        ];
        bound.extend(decision_types.iter().cloned());
        let rows = stmt
            .query_map(params_from_iter(bound), read_memory)
            .map_err(db_err)?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row.map_err(db_err)?.into_entry()?);
        }
        Ok(entries)
    }

    fn mark_evaluated(
        &self,
        id: Uuid,
        outcome: Outcome,
        score: f64,
        lesson: &str,
        at: Timestamp,
    ) -> StoreResult<bool> {
        let conn = self.conn()?;
        // The `outcome = 'pending'` predicate makes evaluation one-shot.
        let changed = conn
            .execute(
                "UPDATE memory_entries SET outcome = ?1, outcome_score = ?2, lesson = ?3, \
                 evaluated_at = ?4 WHERE id = ?5 AND outcome = 'pending'",
                params![
                    enum_to_sql(&outcome)?,
                    score,
                    lesson,
                    ts_to_sql(at),
                    id.to_string()
                ],
            )
            .map_err(db_err)?;
        Ok(changed == 1)
    }

    fn attach_rules(&self, id: Uuid, rules: &[String]) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE memory_entries SET extracted_rules = ?1 WHERE id = ?2",
            params![json_to_sql(&rules)?, id.to_string()],
        )
        .map_err(db_err)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// CapabilityStore
// ---------------------------------------------------------------------------

impl CapabilityStore for SqliteStore {
    fn upsert_capability(&self, capability: &Capability) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO capabilities (id, company_id, department, name, description, \
             trigger_condition, decision_types, status, risk, required_data, success_metric, \
             auto_activatable, trial_expires_at, execution_count, activation_reason, \
             deactivation_reason, created_at, last_evaluated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18) \
             ON CONFLICT (id) DO UPDATE SET \
             status = excluded.status, risk = excluded.risk, \
             trial_expires_at = excluded.trial_expires_at, \
             execution_count = excluded.execution_count, \
             activation_reason = excluded.activation_reason, \
             deactivation_reason = excluded.deactivation_reason, \
             last_evaluated_at = excluded.last_evaluated_at",
            params![
                capability.id.to_string(),
                capability.company_id.to_string(),
                capability.department.as_str(),
                capability.name,
                capability.description,
                json_to_sql(&capability.trigger_condition)?,
                json_to_sql(&capability.decision_types)?,
                enum_to_sql(&capability.status)?,
                enum_to_sql(&capability.risk)?,
                json_to_sql(&capability.required_data)?,
                capability.success_metric,
                capability.auto_activatable,
                capability.trial_expires_at.map(ts_to_sql),
                capability.execution_count,
                capability.activation_reason,
                capability.deactivation_reason,
                ts_to_sql(capability.created_at),
                capability.last_evaluated_at.map(ts_to_sql)
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn capability(&self, id: Uuid) -> StoreResult<Option<Capability>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {CAPABILITY_COLUMNS} FROM capabilities WHERE id = ?1");
        conn.query_row(&sql, params![id.to_string()], read_capability)
            .optional()
            .map_err(db_err)?
            .map(RawCapability::into_capability)
            .transpose()
    }

    fn capabilities(
        &self,
        company_id: Uuid,
        department: Department,
    ) -> StoreResult<Vec<Capability>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {CAPABILITY_COLUMNS} FROM capabilities \
             WHERE company_id = ?1 AND department = ?2 ORDER BY created_at"
        );
        let mut stmt = conn.prepare(&sql).map_err(db_err)?;
        let rows = stmt
            .query_map(
                params![company_id.to_string(), department.as_str()],
                read_capability,
            )
            .map_err(db_err)?;
        let mut capabilities = Vec::new();
        for row in rows {
            capabilities.push(row.map_err(db_err)?.into_capability()?);
        }
        Ok(capabilities)
    }

    fn increment_execution(&self, id: Uuid) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE capabilities SET execution_count = execution_count + 1 WHERE id = ?1",
            params![id.to_string()],
        )
        .map_err(db_err)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// AuditLog
// ---------------------------------------------------------------------------

impl AuditLog for SqliteStore {
    fn append(&self, entry: &ExecutionLogEntry) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO execution_log (id, cycle_id, company_id, department, phase, status, \
             detail, credits_consumed, duration_ms, error, logged_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                entry.id.to_string(),
                entry.cycle_id.to_string(),
                entry.company_id.to_string(),
                entry.department.as_str(),
                entry.phase.as_str(),
                enum_to_sql(&entry.status)?,
                json_to_sql(&entry.detail)?,
                entry.credits_consumed,
                entry.duration_ms,
                entry.error,
                ts_to_sql(entry.logged_at)
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn entries_for_cycle(&self, cycle_id: Uuid) -> StoreResult<Vec<ExecutionLogEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, cycle_id, company_id, department, phase, status, detail, \
                 credits_consumed, duration_ms, error, logged_at FROM execution_log \
                 WHERE cycle_id = ?1 ORDER BY logged_at",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![cycle_id.to_string()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, f64>(7)?,
                    row.get::<_, u64>(8)?,
                    row.get::<_, Option<String>>(9)?,
                    row.get::<_, String>(10)?,
                ))
            })
            .map_err(db_err)?;
        let mut entries = Vec::new();
        for row in rows {
            let (id, cycle, company, dept, phase, status, detail, credits, duration, error, at) =
                row.map_err(db_err)?;
            entries.push(ExecutionLogEntry {
                id: uuid_from_sql(&id)?,
                cycle_id: uuid_from_sql(&cycle)?,
                company_id: uuid_from_sql(&company)?,
                department: dept_from_sql(&dept)?,
                phase: enum_from_sql(&phase)?,
                status: enum_from_sql(&status)?,
                detail: json_from_sql(&detail)?,
                credits_consumed: credits,
                duration_ms: duration,
                error,
                logged_at: ts_from_sql(&at)?,
            });
        }
        Ok(entries)
    }
}

// ---------------------------------------------------------------------------
// ApprovalStore
// ---------------------------------------------------------------------------

impl ApprovalStore for SqliteStore {
    fn insert_approval(&self, record: &ApprovalRecord) -> StoreResult<()> {
        let (kind, subject_id) = subject_parts(&record.subject);
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO approvals (id, company_id, department, subject_kind, subject_id, \
             status, risk, summary, multi_stakeholder, post_hoc, reviewer_note, created_at, \
             resolved_at, applied) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                record.id.to_string(),
                record.company_id.to_string(),
                record.department.as_str(),
                kind,
                subject_id.to_string(),
                enum_to_sql(&record.status)?,
                enum_to_sql(&record.risk)?,
                record.summary,
                record.multi_stakeholder,
                record.post_hoc,
                record.reviewer_note,
                ts_to_sql(record.created_at),
                record.resolved_at.map(ts_to_sql),
                record.applied
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn approvals_for_company(&self, company_id: Uuid) -> StoreResult<Vec<ApprovalRecord>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {APPROVAL_COLUMNS} FROM approvals WHERE company_id = ?1 ORDER BY created_at"
        );
        let mut stmt = conn.prepare(&sql).map_err(db_err)?;
        let rows = stmt
            .query_map(params![company_id.to_string()], read_approval)
            .map_err(db_err)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row.map_err(db_err)?.into_record()?);
        }
        Ok(records)
    }

    fn unapplied_capability_approvals(
        &self,
        company_id: Uuid,
    ) -> StoreResult<Vec<ApprovalRecord>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {APPROVAL_COLUMNS} FROM approvals \
             WHERE company_id = ?1 AND subject_kind = 'capability' \
             AND status = 'approved' AND applied = 0"
        );
        let mut stmt = conn.prepare(&sql).map_err(db_err)?;
        let rows = stmt
            .query_map(params![company_id.to_string()], read_approval)
            .map_err(db_err)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row.map_err(db_err)?.into_record()?);
        }
        Ok(records)
    }

    fn mark_applied(&self, id: Uuid) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE approvals SET applied = 1 WHERE id = ?1",
            params![id.to_string()],
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn resolve(&self, id: Uuid, status: ApprovalStatus, note: Option<&str>) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE approvals SET status = ?1, reviewer_note = ?2, resolved_at = ?3 WHERE id = ?4",
            params![
                enum_to_sql(&status)?,
                note,
                ts_to_sql(autopilot_core::now()),
                id.to_string()
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// IntelCache
// ---------------------------------------------------------------------------

impl IntelCache for SqliteStore {
    fn cached_intel(&self, company_id: Uuid) -> StoreResult<Option<IntelBundle>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT bundle FROM intel_cache WHERE company_id = ?1",
            params![company_id.to_string()],
            |row| row.get::<_, String>(0),
        )
        .optional()
        .map_err(db_err)?
        .map(|bundle| json_from_sql(&bundle))
        .transpose()
    }

    fn store_intel(&self, company_id: Uuid, bundle: &IntelBundle) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO intel_cache (company_id, bundle, fetched_at, expires_at) \
             VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT (company_id) DO UPDATE SET bundle = excluded.bundle, \
             fetched_at = excluded.fetched_at, expires_at = excluded.expires_at",
            params![
                company_id.to_string(),
                json_to_sql(bundle)?,
                ts_to_sql(bundle.fetched_at),
                ts_to_sql(bundle.expires_at)
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ExecutorRegistry
// ---------------------------------------------------------------------------

impl ExecutorRegistry for SqliteStore {
    fn executors(&self, department: Department) -> StoreResult<Vec<ExecutorSpec>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT name, endpoint, implemented, required_context FROM executors \
                 WHERE department = ?1 ORDER BY name",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![department.as_str()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, bool>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })
            .map_err(db_err)?;
        let mut specs = Vec::new();
        for row in rows {
            let (name, endpoint, implemented, required_context) = row.map_err(db_err)?;
            specs.push(ExecutorSpec {
                name,
                department,
                endpoint,
                implemented,
                required_context: json_from_sql(&required_context)?,
            });
        }
        Ok(specs)
    }
}
