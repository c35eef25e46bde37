//! Act phase: executor dispatch
//!
//! Only auto-approved and post-review decisions execute. Independent
//! decisions run concurrently; decisions that declare `depends_on` run
//! serially, in score order, after the concurrent batch. Each dispatch
//! is isolated: one failing executor never aborts the rest of the batch,
//! let alone the cycle.
//!
//! Recursion between executors is bounded by a call-depth token carried
//! in the invocation context, so a capability that triggers further
//! dispatches cannot loop no matter how its chain is named.

use autopilot_core::decision::{Decision, Disposition};
use autopilot_core::ports::{ApprovalStore, CapabilityStore, ExecutorSpec, UsageLedger};
use autopilot_core::snapshot::SenseSnapshot;
use autopilot_core::{
    ApprovalRecord, ApprovalSubject, Capability, CapabilityStatus, CompanyProfile, Department,
    ExecutorError, Timestamp,
};
use futures::future::join_all;
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

/// Maximum executor-to-executor call depth.
pub const MAX_CALL_DEPTH: u32 = 3;

/// Per-dispatch context. `depth` starts at zero for engine-initiated
/// dispatches and grows only through [`InvocationContext::descend`].
#[derive(Debug, Clone)]
pub struct InvocationContext {
    pub cycle_id: Uuid,
    pub depth: u32,
    /// Executor names along the current chain, for diagnostics only.
    pub chain: Vec<String>,
}

impl InvocationContext {
    pub fn root(cycle_id: Uuid) -> Self {
        Self {
            cycle_id,
            depth: 0,
            chain: Vec::new(),
        }
    }

    /// One level deeper. The depth token is the recursion guard; name
    /// equality along the chain proves nothing and is not checked.
    pub fn descend(&self, executor: &str) -> Result<Self, ExecutorError> {
        if self.depth >= MAX_CALL_DEPTH {
            return Err(ExecutorError::DepthExceeded {
                depth: self.depth,
                limit: MAX_CALL_DEPTH,
            });
        }
        let mut chain = self.chain.clone();
        chain.push(executor.to_string());
        Ok(Self {
            cycle_id: self.cycle_id,
            depth: self.depth + 1,
            chain,
        })
    }
}

/// What one executor invocation reports back.
#[derive(Debug, Clone)]
pub struct InvocationOutcome {
    pub credits: f64,
    pub detail: Value,
}

/// Abstraction over the executor HTTP hop, so tests can record instead
/// of dispatching.
#[async_trait::async_trait]
pub trait ExecutorInvoker: Send + Sync {
    async fn invoke(
        &self,
        spec: &ExecutorSpec,
        payload: Value,
        ctx: &InvocationContext,
    ) -> Result<InvocationOutcome, ExecutorError>;
}

/// Production invoker: one JSON POST per dispatch. The payload is sent
/// as-is; executors answer `{ success, summary?, error? }`, and anything
/// short of `success: true` is a dispatch failure.
#[derive(Debug, Clone, Default)]
pub struct HttpInvoker {
    client: reqwest::Client,
}

impl HttpInvoker {
    pub fn new() -> Self {
        Self::default()
    }
}

#[derive(Debug, serde::Deserialize)]
struct ExecutorReply {
    success: bool,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    error: Option<String>,
    /// Executors that meter their own spend report it here.
    #[serde(default)]
    credits: f64,
}

#[async_trait::async_trait]
impl ExecutorInvoker for HttpInvoker {
    async fn invoke(
        &self,
        spec: &ExecutorSpec,
        payload: Value,
        _ctx: &InvocationContext,
    ) -> Result<InvocationOutcome, ExecutorError> {
        let response = self
            .client
            .post(&spec.endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ExecutorError::Failed {
                name: spec.name.clone(),
                message: e.to_string(),
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(ExecutorError::HttpStatus {
                name: spec.name.clone(),
                status: status.as_u16(),
            });
        }
        let reply: ExecutorReply =
            response.json().await.map_err(|e| ExecutorError::Failed {
                name: spec.name.clone(),
                message: format!("unreadable reply: {e}"),
            })?;
        if !reply.success {
            return Err(ExecutorError::Failed {
                name: spec.name.clone(),
                message: reply
                    .error
                    .unwrap_or_else(|| "executor reported failure".to_string()),
            });
        }
        Ok(InvocationOutcome {
            credits: reply.credits,
            detail: json!({ "summary": reply.summary }),
        })
    }
}

/// Cycle-level execution summary.
#[derive(Debug, Clone, Copy, Default)]
pub struct ActReport {
    pub executed: u32,
    pub failed: u32,
    pub credits_consumed: f64,
}

/// Execute the approved subset of decisions, mutating `action_taken` in
/// place and recording spend per successful dispatch.
pub async fn act<S, I>(
    store: &S,
    invoker: &I,
    decisions: &mut [Decision],
    executors: &[ExecutorSpec],
    capabilities: &[Capability],
    profile: &CompanyProfile,
    snapshot: &SenseSnapshot,
    department: Department,
    cycle_id: Uuid,
    now: Timestamp,
) -> ActReport
where
    S: UsageLedger + CapabilityStore + ApprovalStore,
    I: ExecutorInvoker,
{
    let ctx = InvocationContext::root(cycle_id);

    let mut independents = Vec::new();
    let mut dependents = Vec::new();
    for (index, decision) in decisions.iter().enumerate() {
        let executes = decision
            .disposition
            .map(Disposition::executes)
            .unwrap_or(false);
        if !executes {
            continue;
        }
        if decision.depends_on().is_some() {
            dependents.push(index);
        } else {
            independents.push(index);
        }
    }

    let mut results: Vec<(usize, Result<InvocationOutcome, ExecutorError>)> = Vec::new();

    // Independents fan out; failures stay per-decision.
    let batch = independents.iter().map(|&index| {
        let decision = &decisions[index];
        let ctx = &ctx;
        async move {
            (
                index,
                dispatch(
                    store,
                    invoker,
                    decision,
                    executors,
                    capabilities,
                    profile,
                    snapshot,
                    ctx,
                )
                .await,
            )
        }
    });
    results.extend(join_all(batch).await);

    // Dependents run strictly in score order after the batch.
    for index in dependents {
        let outcome = dispatch(
            store,
            invoker,
            &decisions[index],
            executors,
            capabilities,
            profile,
            snapshot,
            &ctx,
        )
        .await;
        results.push((index, outcome));
    }

    let mut report = ActReport::default();
    for (index, outcome) in results {
        let decision = &mut decisions[index];
        match outcome {
            Ok(outcome) => {
                decision.action_taken = true;
                report.executed += 1;
                report.credits_consumed += outcome.credits;
                if outcome.credits > 0.0 {
                    if let Err(error) = store.record_spend(
                        decision.company_id,
                        department,
                        cycle_id,
                        outcome.credits,
                        now,
                    ) {
                        warn!(%error, decision_id = %decision.id, "failed to record spend");
                    }
                }
                // Post-review executions surface to a human after the fact.
                if decision.disposition == Some(Disposition::PostReview) {
                    let record = ApprovalRecord::pending(
                        decision.company_id,
                        department,
                        ApprovalSubject::Decision(decision.id),
                        decision.risk,
                        decision.description.clone(),
                    )
                    .post_hoc_review();
                    if let Err(error) = store.insert_approval(&record) {
                        warn!(%error, decision_id = %decision.id, "failed to file post-hoc review");
                    }
                }
                info!(
                    decision_id = %decision.id,
                    decision_type = %decision.decision_type,
                    credits = outcome.credits,
                    "decision executed"
                );
            }
            Err(error) => {
                decision.action_taken = false;
                report.failed += 1;
                warn!(
                    %error,
                    decision_id = %decision.id,
                    decision_type = %decision.decision_type,
                    "decision execution failed"
                );
            }
        }
    }
    report
}

/// Resolve and run one decision's executor reference.
async fn dispatch<S, I>(
    store: &S,
    invoker: &I,
    decision: &Decision,
    executors: &[ExecutorSpec],
    capabilities: &[Capability],
    profile: &CompanyProfile,
    snapshot: &SenseSnapshot,
    ctx: &InvocationContext,
) -> Result<InvocationOutcome, ExecutorError>
where
    S: CapabilityStore,
    I: ExecutorInvoker,
{
    let Some(name) = decision.executor.as_deref() else {
        // Advisory decision: recorded and counted, nothing to call.
        return Ok(InvocationOutcome {
            credits: 0.0,
            detail: json!({ "dispatched": false }),
        });
    };

    // An active evolved capability satisfies the reference without HTTP.
    if let Some(capability) = capabilities
        .iter()
        .find(|cap| cap.name == name && cap.status != CapabilityStatus::Deprecated)
    {
        store
            .increment_execution(capability.id)
            .map_err(|e| ExecutorError::Failed {
                name: name.to_string(),
                message: e.to_string(),
            })?;
        return Ok(InvocationOutcome {
            credits: 0.0,
            detail: json!({ "capability": capability.id }),
        });
    }

    let spec = executors
        .iter()
        .find(|spec| spec.name == name)
        .ok_or_else(|| ExecutorError::Unknown(name.to_string()))?;
    if !spec.implemented {
        return Err(ExecutorError::NotImplemented(name.to_string()));
    }

    let ctx = ctx.descend(name)?;
    let payload = json!({
        "company_id": decision.company_id,
        "department": decision.department,
        "decision_type": decision.decision_type,
        "parameters": decision.parameters,
        "cycle_id": ctx.cycle_id,
        "autopilot": true,
        "company_context": assemble_context(spec, profile, snapshot),
    });
    invoker.invoke(spec, payload, &ctx).await
}

/// Resolve the contextual data keys an executor declares. Unknown keys
/// resolve to null with a warning; the call still goes out.
fn assemble_context(
    spec: &ExecutorSpec,
    profile: &CompanyProfile,
    snapshot: &SenseSnapshot,
) -> Value {
    let mut context = serde_json::Map::new();
    for key in &spec.required_context {
        let value = match key.as_str() {
            "company_profile" => serde_json::to_value(profile).unwrap_or(Value::Null),
            "metrics" => serde_json::to_value(&snapshot.metrics).unwrap_or(Value::Null),
            "competitors" => serde_json::to_value(&snapshot.competitors).unwrap_or(Value::Null),
            "sector" => serde_json::to_value(profile.sector).unwrap_or(Value::Null),
            "maturity" => serde_json::to_value(profile.maturity).unwrap_or(Value::Null),
            other => {
                warn!(executor = %spec.name, key = other, "unresolvable context key");
                Value::Null
            }
        };
        context.insert(key.clone(), value);
    }
    Value::Object(context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use autopilot_core::decision::ScoreBreakdown;
    use autopilot_core::snapshot::{Competitor, DepartmentMetrics, MarketingMetrics};
    use autopilot_core::{now, MaturityTier, Priority, RiskLevel, Sector, Trend};
    use autopilot_store::SqliteStore;
    use std::sync::Mutex;

    /// Records invocation order and payloads instead of calling anything.
    pub(crate) struct RecordingInvoker {
        pub calls: Mutex<Vec<String>>,
        pub payloads: Mutex<Vec<Value>>,
        pub fail: Vec<String>,
    }

    impl RecordingInvoker {
        pub fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                payloads: Mutex::new(Vec::new()),
                fail: Vec::new(),
            }
        }
    }

    #[async_trait::async_trait]
    impl ExecutorInvoker for RecordingInvoker {
        async fn invoke(
            &self,
            spec: &ExecutorSpec,
            payload: Value,
            _ctx: &InvocationContext,
        ) -> Result<InvocationOutcome, ExecutorError> {
            self.calls.lock().unwrap().push(spec.name.clone());
            self.payloads.lock().unwrap().push(payload);
            if self.fail.contains(&spec.name) {
                return Err(ExecutorError::Failed {
                    name: spec.name.clone(),
                    message: "scripted failure".into(),
                });
            }
            Ok(InvocationOutcome {
                credits: 1.0,
                detail: Value::Null,
            })
        }
    }

    fn spec(name: &str) -> ExecutorSpec {
        ExecutorSpec {
            name: name.into(),
            department: Department::Marketing,
            endpoint: format!("http://executors.internal/{name}"),
            implemented: true,
            required_context: Vec::new(),
        }
    }

    fn profile(company_id: Uuid) -> CompanyProfile {
        CompanyProfile {
            id: company_id,
            name: "Acme Robotics".into(),
            sector: Sector::General,
            maturity: MaturityTier::Growing,
            industry: Some("robotics".into()),
            country: None,
            budget_freeze: false,
            compliance_review_required: false,
            compliance_cleared: false,
        }
    }

    fn snapshot() -> SenseSnapshot {
        SenseSnapshot {
            metrics: DepartmentMetrics::Marketing(MarketingMetrics {
                connected_channels: 1,
                posts_30d: 6,
                active_campaigns: 0,
                channels: Vec::new(),
                engagement_trend: Trend::Stable,
            }),
            competitors: vec![Competitor {
                name: "Initech".into(),
                priority: 1,
                notes: None,
            }],
            sensed_at: now(),
        }
    }

    /// Accepts one request, hands its body back, replies with `reply`.
    fn one_shot_server(
        reply: &'static str,
    ) -> (String, std::sync::mpsc::Receiver<String>) {
        use std::io::{Read, Write};

        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let endpoint = format!("http://{}/", listener.local_addr().unwrap());
        let (tx, rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            let (mut socket, _) = listener.accept().unwrap();
            let mut raw = Vec::new();
            let mut chunk = [0u8; 4096];
            let (headers_end, body_len) = loop {
                let n = socket.read(&mut chunk).unwrap();
                raw.extend_from_slice(&chunk[..n]);
                if let Some(end) = raw.windows(4).position(|w| w == b"\r\n\r\n") {
                    let headers = String::from_utf8_lossy(&raw[..end]).to_lowercase();
                    let len = headers
                        .lines()
                        .find_map(|line| line.strip_prefix("content-length:"))
                        .and_then(|v| v.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                    break (end + 4, len);
                }
            };
            while raw.len() < headers_end + body_len {
                let n = socket.read(&mut chunk).unwrap();
                raw.extend_from_slice(&chunk[..n]);
            }
            let body =
                String::from_utf8_lossy(&raw[headers_end..headers_end + body_len]).to_string();
            let response = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                reply.len(),
                reply
            );
            socket.write_all(response.as_bytes()).unwrap();
            let _ = tx.send(body);
        });
        (endpoint, rx)
    }

    fn decision(
        company_id: Uuid,
        cycle_id: Uuid,
        executor: Option<&str>,
        disposition: Disposition,
        parameters: Value,
    ) -> Decision {
        Decision {
            id: Uuid::new_v4(),
            company_id,
            department: Department::Marketing,
            cycle_id,
            decision_type: "create_content".into(),
            priority: Priority::Medium,
            risk: RiskLevel::Low,
            description: "do the thing".into(),
            reasoning: String::new(),
            executor: executor.map(String::from),
            parameters,
            priority_score: 50.0,
            score_breakdown: ScoreBreakdown {
                urgency: 50.0,
                impact: 30.0,
                strategic: 30.0,
                evidence: 30.0,
            },
            disposition: Some(disposition),
            action_taken: false,
            guard_notes: Vec::new(),
            block_reason: None,
            signal_influenced: false,
            created_at: now(),
        }
    }

    #[test]
    fn depth_token_stops_runaway_chains() {
        let ctx = InvocationContext::root(Uuid::new_v4());
        let ctx = ctx.descend("a").unwrap();
        let ctx = ctx.descend("b").unwrap();
        let ctx = ctx.descend("a").unwrap();
        // Repeated names are fine; the fourth level is not.
        let err = ctx.descend("b").unwrap_err();
        assert!(matches!(err, ExecutorError::DepthExceeded { .. }));
    }

    #[tokio::test]
    async fn dependents_run_after_independents() {
        let store = SqliteStore::in_memory().unwrap();
        let company_id = Uuid::new_v4();
        let cycle_id = Uuid::new_v4();
        let invoker = RecordingInvoker::new();
        let executors = vec![spec("writer"), spec("publisher")];

        let mut decisions = vec![
            decision(
                company_id,
                cycle_id,
                Some("publisher"),
                Disposition::AutoApproved,
                json!({ "depends_on": "writer" }),
            ),
            decision(company_id, cycle_id, Some("writer"), Disposition::AutoApproved, Value::Null),
        ];

        let report = act(
            &store,
            &invoker,
            &mut decisions,
            &executors,
            &[],
            &profile(company_id),
            &snapshot(),
            Department::Marketing,
            cycle_id,
            now(),
        )
        .await;

        assert_eq!(report.executed, 2);
        let calls = invoker.calls.lock().unwrap().clone();
        assert_eq!(calls, vec!["writer", "publisher"]);
    }

    #[tokio::test]
    async fn blocked_and_escalated_never_dispatch() {
        let store = SqliteStore::in_memory().unwrap();
        let company_id = Uuid::new_v4();
        let cycle_id = Uuid::new_v4();
        let invoker = RecordingInvoker::new();
        let executors = vec![spec("writer")];

        let mut decisions = vec![
            decision(company_id, cycle_id, Some("writer"), Disposition::Blocked, Value::Null),
            decision(
                company_id,
                cycle_id,
                Some("writer"),
                Disposition::RequiresApproval,
                Value::Null,
            ),
            decision(company_id, cycle_id, Some("writer"), Disposition::Escalated, Value::Null),
        ];

        let report = act(
            &store,
            &invoker,
            &mut decisions,
            &executors,
            &[],
            &profile(company_id),
            &snapshot(),
            Department::Marketing,
            cycle_id,
            now(),
        )
        .await;

        assert_eq!(report.executed, 0);
        assert!(invoker.calls.lock().unwrap().is_empty());
        assert!(decisions.iter().all(|d| !d.action_taken));
    }

    #[tokio::test]
    async fn failures_are_isolated() {
        let store = SqliteStore::in_memory().unwrap();
        let company_id = Uuid::new_v4();
        let cycle_id = Uuid::new_v4();
        let mut invoker = RecordingInvoker::new();
        invoker.fail.push("writer".into());
        let executors = vec![spec("writer"), spec("publisher")];

        let mut decisions = vec![
            decision(company_id, cycle_id, Some("writer"), Disposition::AutoApproved, Value::Null),
            decision(
                company_id,
                cycle_id,
                Some("publisher"),
                Disposition::AutoApproved,
                Value::Null,
            ),
        ];

        let report = act(
            &store,
            &invoker,
            &mut decisions,
            &executors,
            &[],
            &profile(company_id),
            &snapshot(),
            Department::Marketing,
            cycle_id,
            now(),
        )
        .await;

        assert_eq!(report.executed, 1);
        assert_eq!(report.failed, 1);
        assert!(!decisions[0].action_taken);
        assert!(decisions[1].action_taken);
    }

    #[tokio::test]
    async fn capability_reference_counts_without_http() {
        let store = SqliteStore::in_memory().unwrap();
        let company_id = Uuid::new_v4();
        let cycle_id = Uuid::new_v4();
        let invoker = RecordingInvoker::new();

        let mut capability = Capability::proposed(
            company_id,
            Department::Marketing,
            "repost-top-content",
            "Reposts the best performer",
            RiskLevel::Low,
        );
        capability.status = CapabilityStatus::Active;
        store.upsert_capability(&capability).unwrap();
        let capabilities = vec![capability.clone()];

        let mut decisions = vec![decision(
            company_id,
            cycle_id,
            Some("repost-top-content"),
            Disposition::AutoApproved,
            Value::Null,
        )];

        let report = act(
            &store,
            &invoker,
            &mut decisions,
            &[],
            &capabilities,
            &profile(company_id),
            &snapshot(),
            Department::Marketing,
            cycle_id,
            now(),
        )
        .await;

        assert_eq!(report.executed, 1);
        assert!(invoker.calls.lock().unwrap().is_empty());
        let loaded = store.capability(capability.id).unwrap().unwrap();
        assert_eq!(loaded.execution_count, 1);
    }

    #[tokio::test]
    async fn post_review_success_files_post_hoc_record() {
        use autopilot_core::ports::ApprovalStore as _;
        let store = SqliteStore::in_memory().unwrap();
        let company_id = Uuid::new_v4();
        let cycle_id = Uuid::new_v4();
        let invoker = RecordingInvoker::new();
        let executors = vec![spec("writer")];

        let mut decisions = vec![decision(
            company_id,
            cycle_id,
            Some("writer"),
            Disposition::PostReview,
            Value::Null,
        )];

        act(
            &store,
            &invoker,
            &mut decisions,
            &executors,
            &[],
            &profile(company_id),
            &snapshot(),
            Department::Marketing,
            cycle_id,
            now(),
        )
        .await;

        let approvals = store.approvals_for_company(company_id).unwrap();
        assert_eq!(approvals.len(), 1);
        assert!(approvals[0].post_hoc);
        assert_eq!(
            approvals[0].status,
            autopilot_core::ApprovalStatus::Approved
        );
    }

    #[tokio::test]
    async fn failed_post_review_leaves_no_approval_trail() {
        use autopilot_core::ports::ApprovalStore as _;
        let store = SqliteStore::in_memory().unwrap();
        let company_id = Uuid::new_v4();
        let cycle_id = Uuid::new_v4();
        let mut invoker = RecordingInvoker::new();
        invoker.fail.push("writer".into());
        let executors = vec![spec("writer")];

        let mut decisions = vec![decision(
            company_id,
            cycle_id,
            Some("writer"),
            Disposition::PostReview,
            Value::Null,
        )];

        let report = act(
            &store,
            &invoker,
            &mut decisions,
            &executors,
            &[],
            &profile(company_id),
            &snapshot(),
            Department::Marketing,
            cycle_id,
            now(),
        )
        .await;

        assert_eq!(report.executed, 0);
        assert_eq!(report.failed, 1);
        assert!(!decisions[0].action_taken);
        // No post-hoc record for something that never happened.
        assert!(store.approvals_for_company(company_id).unwrap().is_empty());
    }

    #[tokio::test]
    async fn declared_context_keys_ride_along() {
        let store = SqliteStore::in_memory().unwrap();
        let company_id = Uuid::new_v4();
        let cycle_id = Uuid::new_v4();
        let invoker = RecordingInvoker::new();
        let mut writer = spec("writer");
        writer.required_context = vec!["company_profile".into(), "competitors".into()];
        let executors = vec![writer];

        let mut decisions = vec![decision(
            company_id,
            cycle_id,
            Some("writer"),
            Disposition::AutoApproved,
            Value::Null,
        )];

        act(
            &store,
            &invoker,
            &mut decisions,
            &executors,
            &[],
            &profile(company_id),
            &snapshot(),
            Department::Marketing,
            cycle_id,
            now(),
        )
        .await;

        let payloads = invoker.payloads.lock().unwrap().clone();
        assert_eq!(payloads.len(), 1);
        let body = &payloads[0];
        assert_eq!(body["company_id"], json!(company_id));
        assert_eq!(body["department"], json!("marketing"));
        assert_eq!(body["cycle_id"], json!(cycle_id));
        assert_eq!(body["autopilot"], json!(true));
        assert_eq!(
            body["company_context"]["company_profile"]["name"],
            json!("Acme Robotics")
        );
        assert_eq!(
            body["company_context"]["competitors"][0]["name"],
            json!("Initech")
        );
    }

    #[tokio::test]
    async fn http_invoker_treats_failure_replies_as_errors() {
        let (endpoint, rx) = one_shot_server(r#"{"success": false, "error": "rate limited"}"#);
        let mut writer = spec("writer");
        writer.endpoint = endpoint;
        writer.required_context = vec!["company_profile".into()];
        let executors = vec![writer];

        let store = SqliteStore::in_memory().unwrap();
        let company_id = Uuid::new_v4();
        let cycle_id = Uuid::new_v4();
        let target = decision(
            company_id,
            cycle_id,
            Some("writer"),
            Disposition::AutoApproved,
            Value::Null,
        );

        let err = dispatch(
            &store,
            &HttpInvoker::new(),
            &target,
            &executors,
            &[],
            &profile(company_id),
            &snapshot(),
            &InvocationContext::root(cycle_id),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ExecutorError::Failed { .. }));
        assert!(err.to_string().contains("rate limited"));

        let body: Value = serde_json::from_str(&rx.recv().unwrap()).unwrap();
        assert_eq!(body["company_id"], json!(company_id));
        assert_eq!(body["department"], json!("marketing"));
        assert_eq!(body["autopilot"], json!(true));
        assert!(body["company_context"]["company_profile"].is_object());
    }

    #[tokio::test]
    async fn http_invoker_reads_successful_replies() {
        let (endpoint, _rx) =
            one_shot_server(r#"{"success": true, "summary": "posted", "credits": 1.5}"#);
        let mut writer = spec("writer");
        writer.endpoint = endpoint;
        let executors = vec![writer];

        let store = SqliteStore::in_memory().unwrap();
        let company_id = Uuid::new_v4();
        let cycle_id = Uuid::new_v4();
        let target = decision(
            company_id,
            cycle_id,
            Some("writer"),
            Disposition::AutoApproved,
            Value::Null,
        );

        let outcome = dispatch(
            &store,
            &HttpInvoker::new(),
            &target,
            &executors,
            &[],
            &profile(company_id),
            &snapshot(),
            &InvocationContext::root(cycle_id),
        )
        .await
        .unwrap();
        assert!((outcome.credits - 1.5).abs() < f64::EPSILON);
        assert_eq!(outcome.detail["summary"], json!("posted"));
    }
}
