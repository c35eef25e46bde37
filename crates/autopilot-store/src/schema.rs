//! SQLite schema
//!
//! Applied idempotently at connect time. Decisions, memory entries,
//! usage rows and the execution log are insert-only; the few mutable
//! columns (capability status, memory outcome, config last-run,
//! approval status) each have a dedicated UPDATE path in the store.

/// Full schema, executed as one batch.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS companies (
    id                          TEXT PRIMARY KEY,
    name                        TEXT NOT NULL,
    sector                      TEXT NOT NULL DEFAULT 'general',
    maturity                    TEXT NOT NULL DEFAULT 'seedling',
    industry                    TEXT,
    country                     TEXT,
    budget_freeze               INTEGER NOT NULL DEFAULT 0,
    compliance_review_required  INTEGER NOT NULL DEFAULT 0,
    compliance_cleared          INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS department_configs (
    company_id              TEXT NOT NULL,
    department              TEXT NOT NULL,
    enabled                 INTEGER NOT NULL DEFAULT 1,
    frequency_hours         INTEGER NOT NULL DEFAULT 24,
    max_credits_per_cycle   REAL NOT NULL DEFAULT 50.0,
    max_posts_per_day       INTEGER NOT NULL DEFAULT 5,
    max_actions_per_cycle   INTEGER NOT NULL DEFAULT 3,
    monthly_credit_budget   REAL,
    active_start            INTEGER,
    active_end              INTEGER,
    forbidden_words         TEXT NOT NULL DEFAULT '[]',
    restricted_topics       TEXT NOT NULL DEFAULT '[]',
    require_human_approval  INTEGER NOT NULL DEFAULT 0,
    brand_tone              TEXT,
    allowed_actions         TEXT NOT NULL DEFAULT '[]',
    last_execution_at       TEXT,
    cycles_completed        INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (company_id, department)
);

CREATE TABLE IF NOT EXISTS channels (
    company_id  TEXT NOT NULL,
    name        TEXT NOT NULL,
    PRIMARY KEY (company_id, name)
);

CREATE TABLE IF NOT EXISTS posts (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    company_id  TEXT NOT NULL,
    channel     TEXT NOT NULL,
    engagement  REAL NOT NULL DEFAULT 0,
    created_at  TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_posts_company_time ON posts (company_id, created_at);

CREATE TABLE IF NOT EXISTS campaigns (
    company_id  TEXT NOT NULL,
    name        TEXT NOT NULL,
    active      INTEGER NOT NULL DEFAULT 1,
    budget      REAL NOT NULL DEFAULT 0,
    consumed    REAL NOT NULL DEFAULT 0,
    PRIMARY KEY (company_id, name)
);

CREATE TABLE IF NOT EXISTS deals (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    company_id  TEXT NOT NULL,
    value       REAL NOT NULL DEFAULT 0,
    stage       TEXT NOT NULL DEFAULT 'open',
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS contacts (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    company_id  TEXT NOT NULL,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS members (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    company_id  TEXT NOT NULL,
    joined_at   TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS tasks (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    company_id   TEXT NOT NULL,
    completed    INTEGER NOT NULL DEFAULT 0,
    agent_failed INTEGER NOT NULL DEFAULT 0,
    created_at   TEXT NOT NULL,
    completed_at TEXT
);

CREATE TABLE IF NOT EXISTS activity_events (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    company_id  TEXT NOT NULL,
    kind        TEXT NOT NULL,
    created_at  TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_activity_company_kind ON activity_events (company_id, kind, created_at);

CREATE TABLE IF NOT EXISTS competitors (
    company_id  TEXT NOT NULL,
    name        TEXT NOT NULL,
    priority    INTEGER NOT NULL DEFAULT 0,
    notes       TEXT,
    PRIMARY KEY (company_id, name)
);

CREATE TABLE IF NOT EXISTS credit_usage (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    company_id  TEXT NOT NULL,
    department  TEXT NOT NULL,
    cycle_id    TEXT NOT NULL,
    credits     REAL NOT NULL,
    spent_at    TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_usage_company_time ON credit_usage (company_id, spent_at);

CREATE TABLE IF NOT EXISTS decisions (
    id                TEXT PRIMARY KEY,
    company_id        TEXT NOT NULL,
    department        TEXT NOT NULL,
    cycle_id          TEXT NOT NULL,
    decision_type     TEXT NOT NULL,
    priority          TEXT NOT NULL,
    risk              TEXT NOT NULL,
    description       TEXT NOT NULL,
    reasoning         TEXT NOT NULL,
    executor          TEXT,
    parameters        TEXT NOT NULL,
    priority_score    REAL NOT NULL,
    score_breakdown   TEXT NOT NULL,
    disposition       TEXT NOT NULL,
    action_taken      INTEGER NOT NULL DEFAULT 0,
    guard_notes       TEXT NOT NULL DEFAULT '[]',
    block_reason      TEXT,
    signal_influenced INTEGER NOT NULL DEFAULT 0,
    created_at        TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_decisions_company_dept_time
    ON decisions (company_id, department, created_at);

CREATE TABLE IF NOT EXISTS memory_entries (
    id              TEXT PRIMARY KEY,
    company_id      TEXT NOT NULL,
    department      TEXT NOT NULL,
    cycle_id        TEXT NOT NULL,
    decision_type   TEXT NOT NULL,
    context         TEXT NOT NULL,
    context_hash    TEXT NOT NULL,
    outcome         TEXT NOT NULL DEFAULT 'pending',
    outcome_score   REAL,
    lesson          TEXT,
    extracted_rules TEXT NOT NULL DEFAULT '[]',
    created_at      TEXT NOT NULL,
    evaluated_at    TEXT
);
CREATE INDEX IF NOT EXISTS idx_memory_company_dept
    ON memory_entries (company_id, department, outcome, created_at);

CREATE TABLE IF NOT EXISTS capabilities (
    id                  TEXT PRIMARY KEY,
    company_id          TEXT NOT NULL,
    department          TEXT NOT NULL,
    name                TEXT NOT NULL,
    description         TEXT NOT NULL,
    trigger_condition   TEXT NOT NULL,
    decision_types      TEXT NOT NULL DEFAULT '[]',
    status              TEXT NOT NULL,
    risk                TEXT NOT NULL,
    required_data       TEXT NOT NULL DEFAULT '[]',
    success_metric      TEXT,
    auto_activatable    INTEGER NOT NULL DEFAULT 0,
    trial_expires_at    TEXT,
    execution_count     INTEGER NOT NULL DEFAULT 0,
    activation_reason   TEXT,
    deactivation_reason TEXT,
    created_at          TEXT NOT NULL,
    last_evaluated_at   TEXT
);

CREATE TABLE IF NOT EXISTS execution_log (
    id               TEXT PRIMARY KEY,
    cycle_id         TEXT NOT NULL,
    company_id       TEXT NOT NULL,
    department       TEXT NOT NULL,
    phase            TEXT NOT NULL,
    status           TEXT NOT NULL,
    detail           TEXT NOT NULL,
    credits_consumed REAL NOT NULL DEFAULT 0,
    duration_ms      INTEGER NOT NULL DEFAULT 0,
    error            TEXT,
    logged_at        TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_log_cycle ON execution_log (cycle_id);

CREATE TABLE IF NOT EXISTS approvals (
    id                TEXT PRIMARY KEY,
    company_id        TEXT NOT NULL,
    department        TEXT NOT NULL,
    subject_kind      TEXT NOT NULL,
    subject_id        TEXT NOT NULL,
    status            TEXT NOT NULL,
    risk              TEXT NOT NULL,
    summary           TEXT NOT NULL,
    multi_stakeholder INTEGER NOT NULL DEFAULT 0,
    post_hoc          INTEGER NOT NULL DEFAULT 0,
    reviewer_note     TEXT,
    created_at        TEXT NOT NULL,
    resolved_at       TEXT,
    applied           INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS intel_cache (
    company_id TEXT PRIMARY KEY,
    bundle     TEXT NOT NULL,
    fetched_at TEXT NOT NULL,
    expires_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS executors (
    name             TEXT NOT NULL,
    department       TEXT NOT NULL,
    endpoint         TEXT NOT NULL,
    implemented      INTEGER NOT NULL DEFAULT 1,
    required_context TEXT NOT NULL DEFAULT '[]',
    PRIMARY KEY (name, department)
);
"#;
