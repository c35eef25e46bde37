//! Full-cycle tests against an in-memory store, a scripted oracle and a
//! recording invoker. No network, no real model.

use autopilot_core::ports::{
    ApprovalStore as _, CapabilityStore as _, ConfigStore as _, DecisionStore as _,
    MemoryStore as _, UsageLedger as _,
};
use autopilot_core::{
    now, ApprovalStatus, Capability, CapabilityStatus, CompanyProfile, Department,
    DepartmentConfig, Disposition, EngineError, ExecutorSpec, MaturityTier, MemoryEntry,
    OracleError, RiskLevel, Sector,
};
use autopilot_engine::{
    CycleOutcome, Engine, ExecutorInvoker, InvocationContext, InvocationOutcome, Oracle,
};
use autopilot_store::SqliteStore;
use chrono::Duration;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Answers the think prompt with a fixed script and every other prompt
/// with an empty array.
struct ScriptedOracle {
    think_reply: String,
}

impl ScriptedOracle {
    fn new(think_reply: &str) -> Self {
        Self {
            think_reply: think_reply.to_string(),
        }
    }

    fn silent() -> Self {
        Self::new("[]")
    }
}

#[async_trait::async_trait]
impl Oracle for ScriptedOracle {
    async fn complete(
        &self,
        request: &autopilot_engine::OracleRequest,
    ) -> Result<String, OracleError> {
        if request.system.contains("operations reasoner") {
            Ok(self.think_reply.clone())
        } else {
            Ok("[]".to_string())
        }
    }
}

struct RecordingInvoker {
    calls: Mutex<Vec<String>>,
}

impl RecordingInvoker {
    fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ExecutorInvoker for RecordingInvoker {
    async fn invoke(
        &self,
        spec: &ExecutorSpec,
        _payload: Value,
        _ctx: &InvocationContext,
    ) -> Result<InvocationOutcome, autopilot_core::ExecutorError> {
        self.calls.lock().unwrap().push(spec.name.clone());
        Ok(InvocationOutcome {
            credits: 2.0,
            detail: Value::Null,
        })
    }
}

fn seed_company(store: &SqliteStore, config: DepartmentConfig) -> Uuid {
    let company_id = config.company_id;
    store
        .upsert_company(&CompanyProfile {
            id: company_id,
            name: "Acme Robotics".into(),
            sector: Sector::General,
            maturity: MaturityTier::Growing,
            industry: Some("robotics".into()),
            country: None,
            budget_freeze: false,
            compliance_review_required: false,
            compliance_cleared: false,
        })
        .unwrap();
    store.upsert_config(&config).unwrap();
    company_id
}

fn seed_marketing_data(store: &SqliteStore, company_id: Uuid) {
    store.add_channel(company_id, "blog").unwrap();
    for i in 0..3 {
        store
            .add_post(company_id, "blog", 4.0 + i as f64, now() - Duration::days(2))
            .unwrap();
    }
}

fn engine(
    store: Arc<SqliteStore>,
    oracle: ScriptedOracle,
    invoker: Arc<RecordingInvoker>,
) -> Engine<SqliteStore, ScriptedOracle, RecordingInvoker> {
    Engine::new(store, Arc::new(oracle), invoker)
}

#[tokio::test]
async fn empty_marketing_company_aborts_at_preflight() {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let config = DepartmentConfig::new(Uuid::new_v4(), Department::Marketing);
    let company_id = seed_company(&store, config);

    let invoker = Arc::new(RecordingInvoker::new());
    let engine = engine(store.clone(), ScriptedOracle::silent(), invoker.clone());

    let err = engine
        .run_cycle(company_id, Department::Marketing)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Aborted { .. }));
    assert!(err.to_string().contains("needs_action"));
    assert!(invoker.calls().is_empty());

    let persisted = store
        .decisions_since(company_id, Department::Marketing, now() - Duration::days(1))
        .unwrap();
    assert!(persisted.is_empty(), "aborted cycles persist no decisions");
}

#[tokio::test]
async fn marketing_bootstrap_runs_once_then_aborts() {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let config = DepartmentConfig::new(Uuid::new_v4(), Department::Marketing);
    let company_id = seed_company(&store, config);
    // A connected channel passes preflight, but with zero posts the
    // snapshot stays insufficient.
    store.add_channel(company_id, "blog").unwrap();
    store
        .seed_executors(Department::Marketing, "http://executors.internal", &["import-posts"])
        .unwrap();

    let invoker = Arc::new(RecordingInvoker::new());
    let engine = engine(store.clone(), ScriptedOracle::silent(), invoker.clone());

    let err = engine
        .run_cycle(company_id, Department::Marketing)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("insufficient_data"));
    // The import executor ran exactly once before the re-sense.
    assert_eq!(invoker.calls(), vec!["import-posts"]);

    let persisted = store
        .decisions_since(company_id, Department::Marketing, now() - Duration::days(1))
        .unwrap();
    assert!(persisted.is_empty());
}

#[tokio::test]
async fn human_approval_flag_queues_publish_for_review() {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let config =
        DepartmentConfig::new(Uuid::new_v4(), Department::Marketing).with_human_approval(true);
    let company_id = seed_company(&store, config);
    seed_marketing_data(&store, company_id);

    let oracle = ScriptedOracle::new(
        r#"[{"decision_type": "publish", "priority": "high", "risk": "low",
             "description": "publish the quarterly roadmap post",
             "reasoning": "engagement is steady and the draft is ready"}]"#,
    );
    let invoker = Arc::new(RecordingInvoker::new());
    let engine = engine(store.clone(), oracle, invoker.clone());

    let report = engine
        .run_cycle(company_id, Department::Marketing)
        .await
        .unwrap();
    assert_eq!(report.total_decisions, 1);
    assert_eq!(report.pending_review, 1);
    assert_eq!(report.passed, 0);
    assert!(invoker.calls().is_empty());

    let persisted = store
        .decisions_since(company_id, Department::Marketing, now() - Duration::days(1))
        .unwrap();
    assert_eq!(persisted.len(), 1);
    assert_eq!(persisted[0].disposition, Some(Disposition::RequiresApproval));
    assert!(!persisted[0].action_taken);

    let approvals = store.approvals_for_company(company_id).unwrap();
    assert_eq!(approvals.len(), 1);
    assert_eq!(approvals[0].status, ApprovalStatus::PendingReview);
    assert!(!approvals[0].multi_stakeholder);
}

#[tokio::test]
async fn dependent_decision_executes_after_its_prerequisite() {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let config = DepartmentConfig::new(Uuid::new_v4(), Department::Marketing);
    let company_id = seed_company(&store, config);
    seed_marketing_data(&store, company_id);
    store
        .seed_executors(
            Department::Marketing,
            "http://executors.internal",
            &["writer", "publisher"],
        )
        .unwrap();

    // The dependent decision outscores its prerequisite; execution order
    // must still respect depends_on.
    let oracle = ScriptedOracle::new(
        r#"[
          {"decision_type": "create_content", "priority": "low",
           "description": "draft the teardown", "reasoning": "", "executor": "writer"},
          {"decision_type": "engage_audience", "priority": "critical",
           "description": "reply with the teardown", "reasoning": "",
           "executor": "publisher", "parameters": {"depends_on": "create_content"}}
        ]"#,
    );
    let invoker = Arc::new(RecordingInvoker::new());
    let engine = engine(store.clone(), oracle, invoker.clone());

    let report = engine
        .run_cycle(company_id, Department::Marketing)
        .await
        .unwrap();
    assert_eq!(report.passed, 2);
    assert_eq!(invoker.calls(), vec!["writer", "publisher"]);
    assert!(report.credits_consumed > 0.0);
}

#[tokio::test]
async fn exhausted_daily_budget_blocks_everything() {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let config = DepartmentConfig::new(Uuid::new_v4(), Department::Marketing);
    let limit = config.max_credits_per_cycle;
    let company_id = seed_company(&store, config);
    seed_marketing_data(&store, company_id);
    store
        .record_spend(company_id, Department::Marketing, Uuid::new_v4(), limit, now())
        .unwrap();

    let oracle = ScriptedOracle::new(
        r#"[
          {"decision_type": "create_content", "priority": "medium",
           "description": "draft a post", "reasoning": ""},
          {"decision_type": "engage_audience", "priority": "medium",
           "description": "reply to comments", "reasoning": ""}
        ]"#,
    );
    let invoker = Arc::new(RecordingInvoker::new());
    let engine = engine(store.clone(), oracle, invoker.clone());

    let report = engine
        .run_cycle(company_id, Department::Marketing)
        .await
        .unwrap();
    assert_eq!(report.total_decisions, 2);
    assert_eq!(report.blocked, 2);
    assert_eq!(report.passed, 0);
    assert!(invoker.calls().is_empty());

    let persisted = store
        .decisions_since(company_id, Department::Marketing, now() - Duration::days(1))
        .unwrap();
    assert!(persisted
        .iter()
        .all(|d| d.disposition == Some(Disposition::Blocked)));
    assert!(persisted[0]
        .block_reason
        .as_deref()
        .unwrap()
        .contains("credit limit"));
}

#[tokio::test]
async fn cycle_promotes_a_winning_trial_capability() {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let config = DepartmentConfig::new(Uuid::new_v4(), Department::Marketing);
    let company_id = seed_company(&store, config);
    seed_marketing_data(&store, company_id);

    let mut capability = Capability::proposed(
        company_id,
        Department::Marketing,
        "auto-boost",
        "boosts posts above median engagement",
        RiskLevel::Low,
    );
    capability.decision_types = vec!["boost_post".into()];
    capability.status = CapabilityStatus::Trial;
    capability.trial_expires_at = Some(now() - Duration::hours(1));
    capability.created_at = now() - Duration::days(8);
    capability.execution_count = 3;
    store.upsert_capability(&capability).unwrap();

    for i in 0..5 {
        let entry = MemoryEntry::pending(
            company_id,
            Department::Marketing,
            Uuid::new_v4(),
            "boost_post",
            &format!("boost context {i}"),
            now() - Duration::days(3),
        );
        store.insert_entry(&entry).unwrap();
        let (outcome, score) = if i < 4 {
            (autopilot_core::Outcome::Positive, 0.6)
        } else {
            (autopilot_core::Outcome::Negative, -0.5)
        };
        store
            .mark_evaluated(entry.id, outcome, score, "boosting worked", now())
            .unwrap();
    }

    let invoker = Arc::new(RecordingInvoker::new());
    let engine = engine(store.clone(), ScriptedOracle::silent(), invoker);

    engine
        .run_cycle(company_id, Department::Marketing)
        .await
        .unwrap();

    let loaded = store.capability(capability.id).unwrap().unwrap();
    assert_eq!(loaded.status, CapabilityStatus::Active);
    assert!(loaded
        .activation_reason
        .as_deref()
        .unwrap()
        .contains("trial passed"));
}

#[tokio::test]
async fn memory_evaluation_happens_exactly_once_across_cycles() {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let config = DepartmentConfig::new(Uuid::new_v4(), Department::Marketing);
    let company_id = seed_company(&store, config);
    seed_marketing_data(&store, company_id);

    // A pending entry past the 7-day cooldown; the next cycle's Learn
    // phase must evaluate it, and only that cycle.
    let entry = MemoryEntry::pending(
        company_id,
        Department::Marketing,
        Uuid::new_v4(),
        "publish",
        "3 posts, steady engagement",
        now() - Duration::days(8),
    );
    store.insert_entry(&entry).unwrap();

    let invoker = Arc::new(RecordingInvoker::new());
    let engine = engine(store.clone(), ScriptedOracle::silent(), invoker);

    engine
        .run_cycle(company_id, Department::Marketing)
        .await
        .unwrap();
    let first = store.entry(entry.id).unwrap().unwrap();
    assert_ne!(first.outcome, autopilot_core::Outcome::Pending);
    let evaluated_at = first.evaluated_at;

    engine
        .run_cycle(company_id, Department::Marketing)
        .await
        .unwrap();
    let second = store.entry(entry.id).unwrap().unwrap();
    assert_eq!(second.outcome, first.outcome);
    assert_eq!(second.evaluated_at, evaluated_at);
}

#[tokio::test]
async fn run_due_respects_the_frequency_window() {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let mut config = DepartmentConfig::new(Uuid::new_v4(), Department::Marketing);
    config.last_execution_at = Some(now() - Duration::hours(2));
    let company_id = seed_company(&store, config);
    seed_marketing_data(&store, company_id);

    let invoker = Arc::new(RecordingInvoker::new());
    let engine = engine(store.clone(), ScriptedOracle::silent(), invoker);

    // Ran two hours ago with a 24h frequency: nothing is due.
    let outcomes = engine.run_due().await;
    assert!(outcomes.is_empty());

    // The explicit entry point bypasses the gate.
    let outcomes = engine
        .run_for(company_id, Some(Department::Marketing))
        .await;
    assert_eq!(outcomes.len(), 1);
    let report = outcomes[0].report().expect("completed cycle");
    assert_eq!(report.department, Department::Marketing);
}

#[tokio::test]
async fn trigger_reports_aborted_departments() {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    // No marketing data at all: the cycle aborts at preflight, and the
    // trigger must still say so instead of returning nothing.
    let config = DepartmentConfig::new(Uuid::new_v4(), Department::Marketing);
    let company_id = seed_company(&store, config);

    let invoker = Arc::new(RecordingInvoker::new());
    let engine = engine(store.clone(), ScriptedOracle::silent(), invoker);

    let outcomes = engine.run_due().await;
    assert_eq!(outcomes.len(), 1);
    match &outcomes[0] {
        CycleOutcome::Aborted {
            company_id: reported,
            department,
            missing,
            ..
        } => {
            assert_eq!(*reported, company_id);
            assert_eq!(*department, Department::Marketing);
            assert!(!missing.is_empty());
        }
        other => panic!("expected an abort descriptor, got {other:?}"),
    }
}

#[tokio::test]
async fn completed_cycle_survives_a_last_run_bump_failure() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("autopilot.db");
    let store = Arc::new(SqliteStore::open(&path).unwrap());
    let config = DepartmentConfig::new(Uuid::new_v4(), Department::Marketing);
    let company_id = seed_company(&store, config);
    seed_marketing_data(&store, company_id);

    // Freeze the config table underneath the engine, so only the
    // end-of-cycle bump can fail.
    let raw = rusqlite::Connection::open(&path).unwrap();
    raw.execute_batch(
        "CREATE TRIGGER freeze_configs BEFORE UPDATE ON department_configs \
         BEGIN SELECT RAISE(ABORT, 'config table frozen'); END;",
    )
    .unwrap();
    drop(raw);

    let invoker = Arc::new(RecordingInvoker::new());
    let engine = engine(store.clone(), ScriptedOracle::silent(), invoker);

    // The cycle's own work is committed by this point; the bump failure
    // must not demote it to an error.
    let report = engine
        .run_cycle(company_id, Department::Marketing)
        .await
        .expect("cycle completes despite the failed bump");
    assert_eq!(report.total_decisions, 0);

    let loaded = store
        .department_config(company_id, Department::Marketing)
        .unwrap()
        .unwrap();
    assert!(loaded.last_execution_at.is_none());
    assert_eq!(loaded.cycles_completed, 0);
}
