//! Guard policy engine
//!
//! An ordered pipeline per decision: hard blocks short-circuit to
//! `Blocked`; surviving decisions pass through soft adjustments that can
//! only raise risk, and the final disposition is derived purely from the
//! resulting risk level.
//!
//! The pipeline is a pure function of `(decision, config, GuardContext)`.
//! The context aggregates are read once per cycle; under concurrent
//! cycles for the same company this is best-effort, not linearizable —
//! two cycles can both pass a budget check before either's consumption
//! lands. Accepted and documented, not a bug to fix here.

use crate::config::DepartmentConfig;
use crate::decision::{Decision, Disposition};
use crate::types::{is_content_type, is_sensitive_type, is_spend_type, Department, RiskLevel, Sector};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Consumption ratio for one named campaign.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignBudget {
    pub campaign: String,
    /// consumed / budget, 0.0 when no budget is set.
    pub consumed_ratio: f64,
}

/// Aggregates and flags assembled once per cycle before guard runs.
#[derive(Debug, Clone, Default)]
pub struct GuardContext {
    /// Credits consumed today across the company.
    pub credits_today: f64,
    /// Actioned decisions per type in the trailing 24h.
    pub actioned_by_type_24h: HashMap<String, u32>,
    /// Credits consumed this calendar month, when a monthly budget exists.
    pub monthly_credits_used: f64,
    pub campaign_budgets: Vec<CampaignBudget>,

    /// Cross-department flags.
    pub finance_budget_exceeded: bool,
    pub legal_review_required: bool,
    /// Prior compliance clearance (fintech proposal gate).
    pub compliance_cleared: bool,

    pub sector: Sector,
    /// Hour-of-day the cycle runs at, for the active-hours rule.
    pub current_hour: u8,
}

/// Per-decision outcome of the guard pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardVerdict {
    pub disposition: Disposition,
    pub risk: RiskLevel,
    pub notes: Vec<String>,
    pub block_reason: Option<String>,
    /// Counterfactual statement recorded for every non-auto disposition.
    pub counterfactual: Option<String>,
}

impl GuardVerdict {
    fn blocked(risk: RiskLevel, reason: String, description: &str) -> Self {
        let counterfactual = counterfactual(Disposition::Blocked, description);
        GuardVerdict {
            disposition: Disposition::Blocked,
            risk,
            notes: Vec::new(),
            block_reason: Some(reason),
            counterfactual,
        }
    }
}

fn counterfactual(disposition: Disposition, description: &str) -> Option<String> {
    match disposition {
        Disposition::AutoApproved => None,
        _ => Some(format!(
            "absent guardrail intervention this decision would have executed autonomously: {description}"
        )),
    }
}

/// Run the full pipeline for one decision. The first matching hard rule
/// short-circuits; the rest of the pipeline is skipped for that decision.
pub fn evaluate(decision: &Decision, config: &DepartmentConfig, ctx: &GuardContext) -> GuardVerdict {
    if let Some(reason) = hard_block(decision, config, ctx) {
        return GuardVerdict::blocked(decision.risk, reason, &decision.description);
    }

    let mut risk = decision.risk;
    let mut notes = Vec::new();

    // Per-campaign budget: >=90% consumed blocks outright, >=75% warns.
    if let Some(campaign) = decision.parameters.get("campaign").and_then(Value::as_str) {
        if let Some(budget) = ctx.campaign_budgets.iter().find(|b| b.campaign == campaign) {
            if budget.consumed_ratio >= 0.90 {
                return GuardVerdict::blocked(
                    risk,
                    format!(
                        "campaign '{campaign}' budget {:.0}% consumed",
                        budget.consumed_ratio * 100.0
                    ),
                    &decision.description,
                );
            }
            if budget.consumed_ratio >= 0.75 {
                notes.push(format!(
                    "campaign '{campaign}' budget {:.0}% consumed",
                    budget.consumed_ratio * 100.0
                ));
            }
        }
    }

    // Monthly department budget: exhausted blocks, >=80% forces High.
    if let Some(budget) = config.monthly_credit_budget {
        if budget > 0.0 {
            let ratio = ctx.monthly_credits_used / budget;
            if ratio >= 1.0 {
                return GuardVerdict::blocked(
                    risk,
                    "monthly credit budget exhausted".to_string(),
                    &decision.description,
                );
            }
            if ratio >= 0.80 {
                risk = risk.at_least(RiskLevel::High);
                notes.push(format!("monthly budget {:.0}% consumed", ratio * 100.0));
            }
        }
    }

    // Sector rules.
    match ctx.sector {
        Sector::Fintech => {
            if decision.decision_type == "send_proposal" && !ctx.compliance_cleared {
                return GuardVerdict::blocked(
                    risk,
                    "fintech: proposal requires prior compliance clearance".to_string(),
                    &decision.description,
                );
            }
        }
        Sector::Healthcare => {
            if is_content_type(&decision.decision_type) {
                risk = risk.at_least(RiskLevel::High);
                notes.push("healthcare: content escalated pending legal review".to_string());
            }
        }
        Sector::General => {}
    }

    // Explicit human-approval configuration forces Low up to High for
    // sensitive types.
    if config.require_human_approval
        && is_sensitive_type(&decision.decision_type)
        && risk == RiskLevel::Low
    {
        risk = RiskLevel::High;
        notes.push("human approval required by configuration".to_string());
    }

    let disposition = Disposition::from_risk(risk);
    GuardVerdict {
        disposition,
        risk,
        counterfactual: counterfactual(disposition, &decision.description),
        notes,
        block_reason: None,
    }
}

/// Ordered hard blocks. Returns the first matching reason.
fn hard_block(
    decision: &Decision,
    config: &DepartmentConfig,
    ctx: &GuardContext,
) -> Option<String> {
    // 1. Cross-department blocks.
    if ctx.finance_budget_exceeded
        && matches!(decision.department, Department::Marketing | Department::Sales)
        && is_spend_type(&decision.decision_type)
    {
        return Some("finance flagged budget exceeded: spend actions frozen".to_string());
    }
    if ctx.legal_review_required
        && decision.department == Department::Sales
        && matches!(decision.decision_type.as_str(), "send_proposal" | "advance_deal")
    {
        return Some("legal compliance review required: proposal actions frozen".to_string());
    }

    // 2. Daily aggregate credit budget.
    if ctx.credits_today >= config.max_credits_per_cycle {
        return Some(format!(
            "daily credit limit reached ({:.1}/{:.1})",
            ctx.credits_today, config.max_credits_per_cycle
        ));
    }

    // 3. Per-decision-type rate limit over the trailing 24h.
    let taken = ctx
        .actioned_by_type_24h
        .get(&decision.decision_type)
        .copied()
        .unwrap_or(0);
    if taken >= config.max_actions_per_cycle {
        return Some(format!(
            "rate limit: {} '{}' actions in 24h (max {})",
            taken, decision.decision_type, config.max_actions_per_cycle
        ));
    }

    // 4. Forbidden words / restricted topics in the description.
    let description = decision.description.to_lowercase();
    for word in config.forbidden_words.iter().chain(&config.restricted_topics) {
        if !word.is_empty() && description.contains(&word.to_lowercase()) {
            return Some(format!("description matches restricted term '{word}'"));
        }
    }

    // 5. Active-hours window for publish/create-content types.
    if is_content_type(&decision.decision_type) {
        if let Some(hours) = config.active_hours {
            if !hours.contains(ctx.current_hour) {
                return Some(format!(
                    "outside active hours {}-{} (now {})",
                    hours.start_hour, hours.end_hour, ctx.current_hour
                ));
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ActiveHours;
    use crate::decision::ScoreBreakdown;
    use crate::types::{now, Priority};
    use serde_json::json;
    use uuid::Uuid;

    fn decision(department: Department, decision_type: &str, risk: RiskLevel) -> Decision {
        Decision {
            id: Uuid::new_v4(),
            company_id: Uuid::new_v4(),
            department,
            cycle_id: Uuid::new_v4(),
            decision_type: decision_type.into(),
            priority: Priority::Medium,
            risk,
            description: "announce the new referral program".into(),
            reasoning: String::new(),
            executor: None,
            parameters: Value::Null,
            priority_score: 50.0,
            score_breakdown: ScoreBreakdown {
                urgency: 50.0,
                impact: 30.0,
                strategic: 30.0,
                evidence: 30.0,
            },
            disposition: None,
            action_taken: false,
            guard_notes: Vec::new(),
            block_reason: None,
            signal_influenced: false,
            created_at: now(),
        }
    }

    fn config(department: Department) -> DepartmentConfig {
        DepartmentConfig::new(Uuid::new_v4(), department)
    }

    #[test]
    fn daily_credit_limit_blocks_regardless_of_risk() {
        let config = config(Department::Marketing);
        let ctx = GuardContext {
            credits_today: config.max_credits_per_cycle,
            ..Default::default()
        };
        for risk in [RiskLevel::Low, RiskLevel::Medium, RiskLevel::High, RiskLevel::Critical] {
            let verdict = evaluate(&decision(Department::Marketing, "publish", risk), &config, &ctx);
            assert_eq!(verdict.disposition, Disposition::Blocked);
            assert!(verdict.block_reason.as_deref().unwrap().contains("credit limit"));
        }
    }

    #[test]
    fn finance_freeze_blocks_marketing_spend() {
        let ctx = GuardContext {
            finance_budget_exceeded: true,
            ..Default::default()
        };
        let verdict = evaluate(
            &decision(Department::Marketing, "boost_post", RiskLevel::Low),
            &config(Department::Marketing),
            &ctx,
        );
        assert_eq!(verdict.disposition, Disposition::Blocked);

        // Non-spend actions survive the freeze.
        let verdict = evaluate(
            &decision(Department::Marketing, "engage_audience", RiskLevel::Low),
            &config(Department::Marketing),
            &ctx,
        );
        assert_eq!(verdict.disposition, Disposition::AutoApproved);
    }

    #[test]
    fn rate_limit_blocks_repeated_type() {
        let config = config(Department::Sales);
        let mut actioned = HashMap::new();
        actioned.insert("follow_up".to_string(), config.max_actions_per_cycle);
        let ctx = GuardContext {
            actioned_by_type_24h: actioned,
            ..Default::default()
        };
        let verdict = evaluate(&decision(Department::Sales, "follow_up", RiskLevel::Low), &config, &ctx);
        assert_eq!(verdict.disposition, Disposition::Blocked);
        assert!(verdict.block_reason.as_deref().unwrap().contains("rate limit"));
    }

    #[test]
    fn forbidden_word_blocks() {
        let config =
            config(Department::Marketing).with_forbidden_words(vec!["referral".to_string()]);
        let verdict = evaluate(
            &decision(Department::Marketing, "publish", RiskLevel::Low),
            &config,
            &GuardContext::default(),
        );
        assert_eq!(verdict.disposition, Disposition::Blocked);
    }

    #[test]
    fn active_hours_gate_content_only() {
        let config = config(Department::Marketing).with_active_hours(ActiveHours::new(9, 17));
        let ctx = GuardContext {
            current_hour: 3,
            ..Default::default()
        };
        let verdict = evaluate(&decision(Department::Marketing, "publish", RiskLevel::Low), &config, &ctx);
        assert_eq!(verdict.disposition, Disposition::Blocked);

        let verdict = evaluate(
            &decision(Department::Marketing, "engage_audience", RiskLevel::Low),
            &config,
            &ctx,
        );
        assert_eq!(verdict.disposition, Disposition::AutoApproved);
    }

    #[test]
    fn campaign_budget_thresholds() {
        let mut d = decision(Department::Marketing, "adjust_campaign", RiskLevel::Low);
        d.parameters = json!({ "campaign": "spring" });
        let config = config(Department::Marketing);

        let ctx = GuardContext {
            campaign_budgets: vec![CampaignBudget {
                campaign: "spring".into(),
                consumed_ratio: 0.92,
            }],
            ..Default::default()
        };
        assert_eq!(evaluate(&d, &config, &ctx).disposition, Disposition::Blocked);

        let ctx = GuardContext {
            campaign_budgets: vec![CampaignBudget {
                campaign: "spring".into(),
                consumed_ratio: 0.78,
            }],
            ..Default::default()
        };
        let verdict = evaluate(&d, &config, &ctx);
        assert_eq!(verdict.disposition, Disposition::AutoApproved);
        assert_eq!(verdict.notes.len(), 1);
    }

    #[test]
    fn monthly_budget_escalates_then_blocks() {
        let mut config = config(Department::Marketing);
        config.monthly_credit_budget = Some(100.0);
        let d = decision(Department::Marketing, "engage_audience", RiskLevel::Low);

        let ctx = GuardContext {
            monthly_credits_used: 85.0,
            ..Default::default()
        };
        let verdict = evaluate(&d, &config, &ctx);
        assert_eq!(verdict.risk, RiskLevel::High);
        assert_eq!(verdict.disposition, Disposition::RequiresApproval);

        let ctx = GuardContext {
            monthly_credits_used: 100.0,
            ..Default::default()
        };
        assert_eq!(evaluate(&d, &config, &ctx).disposition, Disposition::Blocked);
    }

    #[test]
    fn fintech_proposal_needs_clearance() {
        let ctx = GuardContext {
            sector: Sector::Fintech,
            ..Default::default()
        };
        let verdict = evaluate(
            &decision(Department::Sales, "send_proposal", RiskLevel::Medium),
            &config(Department::Sales),
            &ctx,
        );
        assert_eq!(verdict.disposition, Disposition::Blocked);

        let ctx = GuardContext {
            sector: Sector::Fintech,
            compliance_cleared: true,
            ..Default::default()
        };
        let verdict = evaluate(
            &decision(Department::Sales, "send_proposal", RiskLevel::Medium),
            &config(Department::Sales),
            &ctx,
        );
        assert_eq!(verdict.disposition, Disposition::PostReview);
    }

    #[test]
    fn healthcare_escalates_content() {
        let ctx = GuardContext {
            sector: Sector::Healthcare,
            ..Default::default()
        };
        let verdict = evaluate(
            &decision(Department::Marketing, "publish", RiskLevel::Low),
            &config(Department::Marketing),
            &ctx,
        );
        assert_eq!(verdict.risk, RiskLevel::High);
        assert_eq!(verdict.disposition, Disposition::RequiresApproval);
    }

    #[test]
    fn human_approval_flag_forces_low_to_high() {
        let config = config(Department::Marketing).with_human_approval(true);
        let verdict = evaluate(
            &decision(Department::Marketing, "publish", RiskLevel::Low),
            &config,
            &GuardContext::default(),
        );
        assert_eq!(verdict.risk, RiskLevel::High);
        assert_eq!(verdict.disposition, Disposition::RequiresApproval);

        // Already-high risk stays high and still requires approval.
        let verdict = evaluate(
            &decision(Department::Marketing, "publish", RiskLevel::High),
            &config,
            &GuardContext::default(),
        );
        assert_eq!(verdict.disposition, Disposition::RequiresApproval);
    }

    #[test]
    fn adjustments_never_lower_risk() {
        let verdict = evaluate(
            &decision(Department::Marketing, "engage_audience", RiskLevel::Critical),
            &config(Department::Marketing),
            &GuardContext::default(),
        );
        assert_eq!(verdict.risk, RiskLevel::Critical);
        assert_eq!(verdict.disposition, Disposition::Escalated);
    }

    #[test]
    fn non_auto_verdicts_carry_counterfactuals() {
        let verdict = evaluate(
            &decision(Department::Marketing, "publish", RiskLevel::High),
            &config(Department::Marketing),
            &GuardContext::default(),
        );
        assert!(verdict.counterfactual.is_some());

        let verdict = evaluate(
            &decision(Department::Marketing, "engage_audience", RiskLevel::Low),
            &config(Department::Marketing),
            &GuardContext::default(),
        );
        assert!(verdict.counterfactual.is_none());
    }
}
