//! Autopilot Store - SQLite persistence for the decision engine
//!
//! A single [`SqliteStore`] implements every data-access port from
//! `autopilot_core::ports` over one bundled-SQLite connection. The
//! schema is applied idempotently on open, so a fresh database file is
//! usable immediately.
//!
//! The write helpers on `SqliteStore` itself (companies, channels,
//! posts, ...) cover the operational rows that in production arrive
//! through integrations; cycles only read them.

#![deny(unsafe_code)]
#![warn(rust_2018_idioms)]

mod convert;
pub mod schema;
mod store;

use autopilot_core::ports::StoreResult;
use autopilot_core::{Department, StoreError, Timestamp};
use convert::{db_err, json_to_sql, ts_to_sql};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

/// SQLite-backed implementation of all engine ports.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open (or create) a database file and apply the schema.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path).map_err(db_err)?;
        Self::from_connection(conn)
    }

    /// In-memory database, used by tests.
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.pragma_update(None, "foreign_keys", "ON").map_err(db_err)?;
        conn.execute_batch(schema::SCHEMA).map_err(db_err)?;
        tracing::debug!("sqlite schema applied");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub(crate) fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("connection mutex poisoned".into()))
    }

    // -----------------------------------------------------------------------
    // Write helpers for operational rows
    // -----------------------------------------------------------------------

    pub fn upsert_company(&self, profile: &autopilot_core::CompanyProfile) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO companies (id, name, sector, maturity, industry, country, \
             budget_freeze, compliance_review_required, compliance_cleared) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9) \
             ON CONFLICT (id) DO UPDATE SET name = excluded.name, sector = excluded.sector, \
             maturity = excluded.maturity, industry = excluded.industry, \
             country = excluded.country, budget_freeze = excluded.budget_freeze, \
             compliance_review_required = excluded.compliance_review_required, \
             compliance_cleared = excluded.compliance_cleared",
            params![
                profile.id.to_string(),
                profile.name,
                convert::enum_to_sql(&profile.sector)?,
                convert::enum_to_sql(&profile.maturity)?,
                profile.industry,
                profile.country,
                profile.budget_freeze,
                profile.compliance_review_required,
                profile.compliance_cleared
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    pub fn upsert_config(&self, config: &autopilot_core::DepartmentConfig) -> StoreResult<()> {
        let (active_start, active_end) = match &config.active_hours {
            Some(hours) => (Some(hours.start_hour), Some(hours.end_hour)),
            None => (None, None),
        };
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO department_configs (company_id, department, enabled, frequency_hours, \
             max_credits_per_cycle, max_posts_per_day, max_actions_per_cycle, \
             monthly_credit_budget, active_start, active_end, forbidden_words, \
             restricted_topics, require_human_approval, brand_tone, allowed_actions, \
             last_execution_at, cycles_completed) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17) \
             ON CONFLICT (company_id, department) DO UPDATE SET \
             enabled = excluded.enabled, frequency_hours = excluded.frequency_hours, \
             max_credits_per_cycle = excluded.max_credits_per_cycle, \
             max_posts_per_day = excluded.max_posts_per_day, \
             max_actions_per_cycle = excluded.max_actions_per_cycle, \
             monthly_credit_budget = excluded.monthly_credit_budget, \
             active_start = excluded.active_start, active_end = excluded.active_end, \
             forbidden_words = excluded.forbidden_words, \
             restricted_topics = excluded.restricted_topics, \
             require_human_approval = excluded.require_human_approval, \
             brand_tone = excluded.brand_tone, allowed_actions = excluded.allowed_actions",
            params![
                config.company_id.to_string(),
                config.department.as_str(),
                config.enabled,
                config.frequency_hours,
                config.max_credits_per_cycle,
                config.max_posts_per_day,
                config.max_actions_per_cycle,
                config.monthly_credit_budget,
                active_start,
                active_end,
                json_to_sql(&config.forbidden_words)?,
                json_to_sql(&config.restricted_topics)?,
                config.require_human_approval,
                config.brand_tone,
                json_to_sql(&config.allowed_actions)?,
                config.last_execution_at.map(ts_to_sql),
                config.cycles_completed
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    pub fn add_channel(&self, company_id: Uuid, name: &str) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO channels (company_id, name) VALUES (?1, ?2)",
            params![company_id.to_string(), name],
        )
        .map_err(db_err)?;
        Ok(())
    }

    pub fn add_post(
        &self,
        company_id: Uuid,
        channel: &str,
        engagement: f64,
        created_at: Timestamp,
    ) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO posts (company_id, channel, engagement, created_at) \
             VALUES (?1, ?2, ?3, ?4)",
            params![company_id.to_string(), channel, engagement, ts_to_sql(created_at)],
        )
        .map_err(db_err)?;
        Ok(())
    }

    pub fn upsert_campaign(
        &self,
        company_id: Uuid,
        name: &str,
        active: bool,
        budget: f64,
        consumed: f64,
    ) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO campaigns (company_id, name, active, budget, consumed) \
             VALUES (?1, ?2, ?3, ?4, ?5) \
             ON CONFLICT (company_id, name) DO UPDATE SET active = excluded.active, \
             budget = excluded.budget, consumed = excluded.consumed",
            params![company_id.to_string(), name, active, budget, consumed],
        )
        .map_err(db_err)?;
        Ok(())
    }

    pub fn add_deal(
        &self,
        company_id: Uuid,
        value: f64,
        stage: &str,
        created_at: Timestamp,
    ) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO deals (company_id, value, stage, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![company_id.to_string(), value, stage, ts_to_sql(created_at)],
        )
        .map_err(db_err)?;
        Ok(())
    }

    pub fn add_contact(&self, company_id: Uuid, created_at: Timestamp) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO contacts (company_id, created_at) VALUES (?1, ?2)",
            params![company_id.to_string(), ts_to_sql(created_at)],
        )
        .map_err(db_err)?;
        Ok(())
    }

    pub fn add_member(&self, company_id: Uuid, joined_at: Timestamp) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO members (company_id, joined_at) VALUES (?1, ?2)",
            params![company_id.to_string(), ts_to_sql(joined_at)],
        )
        .map_err(db_err)?;
        Ok(())
    }

    pub fn add_task(
        &self,
        company_id: Uuid,
        completed: bool,
        agent_failed: bool,
        created_at: Timestamp,
        completed_at: Option<Timestamp>,
    ) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO tasks (company_id, completed, agent_failed, created_at, completed_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                company_id.to_string(),
                completed,
                agent_failed,
                ts_to_sql(created_at),
                completed_at.map(ts_to_sql)
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    pub fn add_activity(
        &self,
        company_id: Uuid,
        kind: &str,
        created_at: Timestamp,
    ) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO activity_events (company_id, kind, created_at) VALUES (?1, ?2, ?3)",
            params![company_id.to_string(), kind, ts_to_sql(created_at)],
        )
        .map_err(db_err)?;
        Ok(())
    }

    pub fn add_competitor(
        &self,
        company_id: Uuid,
        name: &str,
        priority: u32,
        notes: Option<&str>,
    ) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO competitors (company_id, name, priority, notes) \
             VALUES (?1, ?2, ?3, ?4)",
            params![company_id.to_string(), name, priority, notes],
        )
        .map_err(db_err)?;
        Ok(())
    }

    pub fn upsert_executor(&self, spec: &autopilot_core::ExecutorSpec) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO executors (name, department, endpoint, implemented, required_context) \
             VALUES (?1, ?2, ?3, ?4, ?5) \
             ON CONFLICT (name, department) DO UPDATE SET endpoint = excluded.endpoint, \
             implemented = excluded.implemented, required_context = excluded.required_context",
            params![
                spec.name,
                spec.department.as_str(),
                spec.endpoint,
                spec.implemented,
                json_to_sql(&spec.required_context)?
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    /// Seed a department with its whole executor roster marked deployed.
    pub fn seed_executors(
        &self,
        department: Department,
        base_url: &str,
        names: &[&str],
    ) -> StoreResult<()> {
        for name in names {
            self.upsert_executor(&autopilot_core::ExecutorSpec {
                name: (*name).to_string(),
                department,
                endpoint: format!("{}/{}", base_url.trim_end_matches('/'), name),
                implemented: true,
                required_context: Vec::new(),
            })?;
        }
        Ok(())
    }
}
