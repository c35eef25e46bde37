//! External intelligence signals
//!
//! Market/industry signals retrieved through the oracle's web-search
//! capability and cached per company with a maturity-derived expiry.

use crate::types::Timestamp;
use serde::{Deserialize, Serialize};

/// The fixed set of topics queried on a cache miss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntelTopic {
    IndustryTrends,
    MacroOutlook,
    TechnologyShifts,
    RegulatoryChanges,
}

impl IntelTopic {
    /// Topics to query; regulatory changes only when the country is known.
    pub fn topics(country_known: bool) -> Vec<IntelTopic> {
        let mut topics = vec![
            IntelTopic::IndustryTrends,
            IntelTopic::MacroOutlook,
            IntelTopic::TechnologyShifts,
        ];
        if country_known {
            topics.push(IntelTopic::RegulatoryChanges);
        }
        topics
    }

    /// Search query template for the topic.
    pub fn query(self, industry: &str, country: Option<&str>) -> String {
        match self {
            IntelTopic::IndustryTrends => format!("current trends in the {industry} industry"),
            IntelTopic::MacroOutlook => "macroeconomic outlook for small businesses".to_string(),
            IntelTopic::TechnologyShifts => {
                format!("technology shifts affecting {industry} companies")
            }
            IntelTopic::RegulatoryChanges => format!(
                "recent regulatory changes for {industry} businesses in {}",
                country.unwrap_or("their country")
            ),
        }
    }
}

/// How strongly a signal may affect the company.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImpactLevel {
    Low,
    Medium,
    High,
}

/// One structured market/industry signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntelSignal {
    pub topic: IntelTopic,
    pub title: String,
    pub detail: String,
    pub impact: ImpactLevel,
}

/// Cached intelligence for one company.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntelBundle {
    pub signals: Vec<IntelSignal>,
    pub fetched_at: Timestamp,
    pub expires_at: Timestamp,
}

impl IntelBundle {
    pub fn fresh(&self, now: Timestamp) -> bool {
        now < self.expires_at
    }

    /// High-impact signals, for threat-gap detection.
    pub fn high_impact(&self) -> impl Iterator<Item = &IntelSignal> {
        self.signals
            .iter()
            .filter(|s| s.impact == ImpactLevel::High)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::now;
    use chrono::Duration;

    #[test]
    fn regulatory_topic_requires_country() {
        assert_eq!(IntelTopic::topics(false).len(), 3);
        assert_eq!(IntelTopic::topics(true).len(), 4);
    }

    #[test]
    fn bundle_freshness() {
        let ts = now();
        let bundle = IntelBundle {
            signals: Vec::new(),
            fetched_at: ts,
            expires_at: ts + Duration::days(1),
        };
        assert!(bundle.fresh(ts));
        assert!(!bundle.fresh(ts + Duration::days(2)));
    }
}
