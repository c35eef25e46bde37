//! External intelligence: cached, tier-gated market signals
//!
//! A cache hit inside the maturity-derived freshness window short-circuits
//! the network entirely. On a miss the fixed topic set is queried through
//! the oracle with web search enabled; individual topic failures are
//! skipped so one bad query never starves the cycle of the rest.

use crate::oracle::{extract_json_array, Oracle, OracleRequest};
use autopilot_core::ports::IntelCache;
use autopilot_core::{CompanyProfile, ImpactLevel, IntelBundle, IntelSignal, IntelTopic, Timestamp};
use serde::Deserialize;
use tracing::{debug, warn};

const INTEL_SYSTEM_PROMPT: &str = "You are a market intelligence analyst. Answer with a JSON \
    array of at most 3 objects, each shaped {\"title\": string, \"detail\": string, \
    \"impact\": \"low\"|\"medium\"|\"high\"}. No other text.";

#[derive(Debug, Deserialize)]
struct RawSignal {
    title: String,
    detail: String,
    impact: ImpactLevel,
}

/// Return fresh intelligence for the company, from cache when possible.
/// Failures degrade to `None`; decisions then simply run unsignaled.
pub async fn gather<S, O>(
    store: &S,
    oracle: &O,
    profile: &CompanyProfile,
    now: Timestamp,
) -> Option<IntelBundle>
where
    S: IntelCache,
    O: Oracle,
{
    match store.cached_intel(profile.id) {
        Ok(Some(bundle)) if bundle.fresh(now) => {
            debug!(company_id = %profile.id, signals = bundle.signals.len(), "intel cache hit");
            return Some(bundle);
        }
        Ok(_) => {}
        Err(error) => warn!(%error, "intel cache read failed, refetching"),
    }

    let industry = profile.industry.as_deref().unwrap_or("general");
    let mut signals = Vec::new();
    for topic in IntelTopic::topics(profile.country.is_some()) {
        let request = OracleRequest::new(
            INTEL_SYSTEM_PROMPT,
            topic.query(industry, profile.country.as_deref()),
        )
        .with_web_search();
        match fetch_topic(oracle, topic, &request).await {
            Ok(mut topic_signals) => signals.append(&mut topic_signals),
            Err(error) => warn!(%error, ?topic, "intel topic query failed, skipping"),
        }
    }

    if signals.is_empty() {
        return None;
    }

    let bundle = IntelBundle {
        signals,
        fetched_at: now,
        expires_at: now + profile.maturity.intel_freshness(),
    };
    if let Err(error) = store.store_intel(profile.id, &bundle) {
        warn!(%error, "failed to cache intel bundle");
    }
    Some(bundle)
}

async fn fetch_topic<O: Oracle>(
    oracle: &O,
    topic: IntelTopic,
    request: &OracleRequest,
) -> Result<Vec<IntelSignal>, autopilot_core::OracleError> {
    let content = oracle.complete(request).await?;
    let items = extract_json_array(&content)?;
    let mut signals = Vec::new();
    for item in items {
        match serde_json::from_value::<RawSignal>(item) {
            Ok(raw) => signals.push(IntelSignal {
                topic,
                title: raw.title,
                detail: raw.detail,
                impact: raw.impact,
            }),
            Err(error) => warn!(%error, ?topic, "dropping malformed intel signal"),
        }
    }
    Ok(signals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use autopilot_core::{MaturityTier, OracleError, Sector};
    use autopilot_store::SqliteStore;
    use std::sync::atomic::{AtomicU32, Ordering};
    use uuid::Uuid;

    struct CountingOracle {
        calls: AtomicU32,
        reply: String,
    }

    #[async_trait::async_trait]
    impl Oracle for CountingOracle {
        async fn complete(&self, _request: &OracleRequest) -> Result<String, OracleError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.reply.clone())
        }
    }

    fn profile(maturity: MaturityTier, country: Option<&str>) -> CompanyProfile {
        CompanyProfile {
            id: Uuid::new_v4(),
            name: "Acme".into(),
            sector: Sector::General,
            maturity,
            industry: Some("saas".into()),
            country: country.map(String::from),
            budget_freeze: false,
            compliance_review_required: false,
            compliance_cleared: false,
        }
    }

    #[tokio::test]
    async fn fresh_cache_skips_the_oracle() {
        let store = SqliteStore::in_memory().unwrap();
        let oracle = CountingOracle {
            calls: AtomicU32::new(0),
            reply: r#"[{"title": "t", "detail": "d", "impact": "high"}]"#.into(),
        };
        let profile = profile(MaturityTier::Seedling, None);
        let ts = autopilot_core::now();

        // Three topics (no country), one oracle call each.
        let bundle = gather(&store, &oracle, &profile, ts).await.unwrap();
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 3);
        assert_eq!(bundle.signals.len(), 3);

        // Second gather inside the seedling window: no new calls.
        let bundle = gather(&store, &oracle, &profile, ts).await.unwrap();
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 3);
        assert!(bundle.fresh(ts));
    }

    #[tokio::test]
    async fn autonomous_tier_always_refetches() {
        let store = SqliteStore::in_memory().unwrap();
        let oracle = CountingOracle {
            calls: AtomicU32::new(0),
            reply: r#"[{"title": "t", "detail": "d", "impact": "low"}]"#.into(),
        };
        let profile = profile(MaturityTier::Autonomous, Some("DE"));
        let ts = autopilot_core::now();

        gather(&store, &oracle, &profile, ts).await.unwrap();
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 4);
        gather(&store, &oracle, &profile, ts).await.unwrap();
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 8);
    }

    #[tokio::test]
    async fn unusable_completions_degrade_to_none() {
        let store = SqliteStore::in_memory().unwrap();
        let oracle = CountingOracle {
            calls: AtomicU32::new(0),
            reply: "no structured output today".into(),
        };
        let profile = profile(MaturityTier::Growing, None);
        assert!(gather(&store, &oracle, &profile, autopilot_core::now())
            .await
            .is_none());
    }
}
