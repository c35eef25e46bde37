//! Think phase: oracle-backed decision generation
//!
//! The prompt enumerates the department vocabulary, configured limits,
//! deployed executors, active capabilities, recalled lessons and intel
//! signals; the completion comes back as a bounded JSON array. Items are
//! decoded one by one so a single malformed object never discards the
//! rest, and a completion with no usable JSON yields zero decisions, not
//! a failed cycle. Scoring is deterministic and happens here, never in
//! the model.

use crate::oracle::{extract_json_array, Oracle, OracleRequest};
use crate::recall::RecalledMemory;
use autopilot_core::decision::{score_breakdown, sort_by_score, Decision};
use autopilot_core::ports::ExecutorSpec;
use autopilot_core::snapshot::SenseSnapshot;
use autopilot_core::{
    Capability, CompanyProfile, DepartmentConfig, EngineError, IntelBundle, OracleError, Priority,
    RiskLevel, Timestamp,
};
use serde::Deserialize;
use serde_json::Value;
use std::fmt::Write as _;
use tracing::{info, warn};
use uuid::Uuid;

/// Upper bound on decisions per cycle, regardless of what the model says.
pub const MAX_DECISIONS: usize = 5;

const THINK_SYSTEM_PROMPT: &str = "You are the autonomous operations reasoner for one company \
    department. Propose concrete next actions strictly as a JSON array (1 to 5 items) of objects \
    shaped {\"decision_type\": string, \"priority\": \"critical\"|\"high\"|\"medium\"|\"low\", \
    \"risk\": \"low\"|\"medium\"|\"high\"|\"critical\" (optional), \"description\": string, \
    \"reasoning\": string, \"executor\": string or null, \"parameters\": object, \
    \"signal_influenced\": boolean (optional)}. No text outside the array.";

/// Everything the prompt builder needs for one cycle.
#[derive(Debug)]
pub struct ThinkInput<'a> {
    pub profile: &'a CompanyProfile,
    pub config: &'a DepartmentConfig,
    pub snapshot: &'a SenseSnapshot,
    pub memory: &'a RecalledMemory,
    pub intel: Option<&'a IntelBundle>,
    pub executors: &'a [ExecutorSpec],
    pub active_capabilities: &'a [Capability],
}

/// Decision item as the model emits it, before validation.
#[derive(Debug, Deserialize)]
struct RawDecision {
    decision_type: String,
    #[serde(default = "default_priority")]
    priority: Priority,
    risk: Option<RiskLevel>,
    description: String,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    executor: Option<String>,
    #[serde(default)]
    parameters: Value,
    #[serde(default)]
    signal_influenced: bool,
}

fn default_priority() -> Priority {
    Priority::Medium
}

/// Run Think: one oracle round-trip, typed decode, deterministic scoring.
/// HTTP failures propagate (the phase fails); parse failures yield an
/// empty decision list.
pub async fn think<O: Oracle>(
    oracle: &O,
    input: &ThinkInput<'_>,
    cycle_id: Uuid,
    now: Timestamp,
) -> autopilot_core::Result<Vec<Decision>> {
    let request = OracleRequest::new(THINK_SYSTEM_PROMPT, build_prompt(input));
    let content = oracle.complete(&request).await.map_err(EngineError::from)?;

    let items = match extract_json_array(&content) {
        Ok(items) => items,
        Err(OracleError::NoJsonFound) | Err(OracleError::SchemaInvalid(_)) => {
            warn!(
                department = %input.config.department,
                "unusable think completion, proceeding with zero decisions"
            );
            return Ok(Vec::new());
        }
        Err(error) => return Err(error.into()),
    };

    let mut decisions = Vec::new();
    for item in items.into_iter().take(MAX_DECISIONS) {
        match decode_item(item, input, cycle_id, now) {
            Ok(decision) => decisions.push(decision),
            Err(reason) => warn!(reason, "rejecting decision item"),
        }
    }

    sort_by_score(&mut decisions);
    info!(
        department = %input.config.department,
        count = decisions.len(),
        "think produced decisions"
    );
    Ok(decisions)
}

fn decode_item(
    item: Value,
    input: &ThinkInput<'_>,
    cycle_id: Uuid,
    now: Timestamp,
) -> Result<Decision, String> {
    let raw: RawDecision =
        serde_json::from_value(item).map_err(|e| format!("schema mismatch: {e}"))?;

    let department = input.config.department;
    if !department.decision_types().contains(&raw.decision_type.as_str()) {
        return Err(format!(
            "'{}' is not in the {department} vocabulary",
            raw.decision_type
        ));
    }
    if !input.config.allowed_actions.is_empty()
        && !input.config.allowed_actions.contains(&raw.decision_type)
    {
        return Err(format!("'{}' is not an allowed action", raw.decision_type));
    }

    // Executor must name a deployed executor or an active capability.
    let executor = raw.executor.filter(|name| {
        input.executors.iter().any(|spec| &spec.name == name)
            || input.active_capabilities.iter().any(|cap| &cap.name == name)
    });

    let mut risk = raw
        .risk
        .unwrap_or_else(|| department.default_risk(&raw.decision_type));
    let financial_impact = raw
        .parameters
        .get("financial_impact")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    if raw.decision_type == "compliance_alert" && financial_impact {
        risk = RiskLevel::Critical;
    }

    let breakdown = score_breakdown(
        raw.priority,
        &raw.parameters,
        &raw.reasoning,
        raw.signal_influenced,
    );

    Ok(Decision {
        id: Uuid::new_v4(),
        company_id: input.profile.id,
        department,
        cycle_id,
        decision_type: raw.decision_type,
        priority: raw.priority,
        risk,
        description: raw.description,
        reasoning: raw.reasoning,
        executor,
        parameters: raw.parameters,
        priority_score: breakdown.total(),
        score_breakdown: breakdown,
        disposition: None,
        action_taken: false,
        guard_notes: Vec::new(),
        block_reason: None,
        signal_influenced: raw.signal_influenced,
        created_at: now,
    })
}

fn build_prompt(input: &ThinkInput<'_>) -> String {
    let config = input.config;
    let department = config.department;
    let mut prompt = String::new();

    let _ = writeln!(
        prompt,
        "Company: {} ({:?} sector, {:?} maturity). Department: {department}.",
        input.profile.name, input.profile.sector, input.profile.maturity
    );
    let _ = writeln!(
        prompt,
        "Decision types you may use: {}.",
        department.decision_types().join(", ")
    );
    let _ = writeln!(
        prompt,
        "At most {} decisions this cycle.",
        MAX_DECISIONS.min(config.max_actions_per_cycle as usize).max(1)
    );
    if !config.allowed_actions.is_empty() {
        let _ = writeln!(prompt, "Allowed actions: {}.", config.allowed_actions.join(", "));
    }
    if let Some(tone) = &config.brand_tone {
        let _ = writeln!(prompt, "Brand tone: {tone}.");
    }

    if input.executors.is_empty() {
        prompt.push_str("No executors are deployed; set \"executor\" to null.\n");
    } else {
        let names: Vec<&str> = input.executors.iter().map(|s| s.name.as_str()).collect();
        let _ = writeln!(
            prompt,
            "Deployed executors (use exactly one of these names, or null): {}.",
            names.join(", ")
        );
    }
    if !input.active_capabilities.is_empty() {
        let names: Vec<&str> = input
            .active_capabilities
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        let _ = writeln!(
            prompt,
            "Active evolved capabilities (also valid executor names): {}.",
            names.join(", ")
        );
    }

    let _ = writeln!(
        prompt,
        "\nCurrent department snapshot:\n{}",
        serde_json::to_string_pretty(&input.snapshot.metrics).unwrap_or_default()
    );
    if !input.snapshot.competitors.is_empty() {
        let _ = writeln!(
            prompt,
            "Tracked competitors: {}.",
            input
                .snapshot
                .competitors
                .iter()
                .map(|c| c.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    if !input.memory.lessons.is_empty() {
        prompt.push_str("\nLessons from evaluated past decisions:\n");
        for lesson in &input.memory.lessons {
            let _ = writeln!(prompt, "- {lesson}");
        }
    }
    if !input.memory.rules.is_empty() {
        prompt.push_str("Standing rules extracted from repeated successes:\n");
        for rule in &input.memory.rules {
            let _ = writeln!(prompt, "- {rule}");
        }
    }

    if let Some(bundle) = input.intel {
        if !bundle.signals.is_empty() {
            prompt.push_str("\nExternal market signals (set signal_influenced when one drives a decision):\n");
            for signal in &bundle.signals {
                let _ = writeln!(
                    prompt,
                    "- [{:?}] {}: {}",
                    signal.impact, signal.title, signal.detail
                );
            }
        }
    }

    prompt
}
