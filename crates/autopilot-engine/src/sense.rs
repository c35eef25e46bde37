//! Sense phase: normalized department snapshots
//!
//! Collectors read raw operational rows and fold them into the
//! department-shaped metric bag with 30-day totals and half-window trend
//! directions. A failed sub-read degrades to zero/empty with a warning;
//! Sense itself only fails when the store is wholly unreachable.

use autopilot_core::ports::{OperationalData, UsageLedger};
use autopilot_core::snapshot::{
    ChannelMetric, DepartmentMetrics, FinanceMetrics, HrMetrics, LegalMetrics, MarketingMetrics,
    OperationsMetrics, SalesMetrics, SenseSnapshot,
};
use autopilot_core::{Department, Timestamp, Trend};
use chrono::Duration;
use std::collections::BTreeMap;
use tracing::warn;
use uuid::Uuid;

const LOOKBACK_DAYS: i64 = 30;

/// Deal stages that no longer count toward the open pipeline.
const CLOSED_STAGES: &[&str] = &["won", "lost", "closed"];

/// Days without an update before an open deal counts as stalled.
const STALL_DAYS: i64 = 14;

fn read_or<T: Default>(what: &str, result: Result<T, autopilot_core::StoreError>) -> T {
    match result {
        Ok(value) => value,
        Err(error) => {
            warn!(%error, what, "sense sub-read failed, degrading to empty");
            T::default()
        }
    }
}

/// Split a lookback window in half and compare per-half averages.
fn half_window_trend<I: IntoIterator<Item = (Timestamp, f64)>>(
    items: I,
    now: Timestamp,
) -> Trend {
    let midpoint = now - Duration::days(LOOKBACK_DAYS / 2);
    let (mut recent_sum, mut recent_n) = (0.0, 0u32);
    let (mut prior_sum, mut prior_n) = (0.0, 0u32);
    for (at, value) in items {
        if at >= midpoint {
            recent_sum += value;
            recent_n += 1;
        } else {
            prior_sum += value;
            prior_n += 1;
        }
    }
    let recent = if recent_n > 0 { recent_sum / recent_n as f64 } else { 0.0 };
    let prior = if prior_n > 0 { prior_sum / prior_n as f64 } else { 0.0 };
    Trend::from_averages(recent, prior)
}

/// Build the snapshot for one department. Competitors attach only to the
/// outward-facing departments.
pub fn sense<S>(store: &S, company_id: Uuid, department: Department, now: Timestamp) -> SenseSnapshot
where
    S: OperationalData + UsageLedger,
{
    let metrics = match department {
        Department::Marketing => DepartmentMetrics::Marketing(marketing(store, company_id, now)),
        Department::Sales => DepartmentMetrics::Sales(sales(store, company_id, now)),
        Department::Finance => DepartmentMetrics::Finance(finance(store, company_id, now)),
        Department::Legal => DepartmentMetrics::Legal(legal(store, company_id, now)),
        Department::Hr => DepartmentMetrics::Hr(hr(store, company_id, now)),
        Department::Operations => {
            DepartmentMetrics::Operations(operations(store, company_id, now))
        }
    };

    let competitors = if matches!(department, Department::Marketing | Department::Sales) {
        read_or("competitors", store.competitors(company_id))
    } else {
        Vec::new()
    };

    SenseSnapshot {
        metrics,
        competitors,
        sensed_at: now,
    }
}

fn marketing<S: OperationalData>(store: &S, company_id: Uuid, now: Timestamp) -> MarketingMetrics {
    let since = now - Duration::days(LOOKBACK_DAYS);
    let posts = read_or("posts", store.posts_since(company_id, since));
    let channels = read_or("channels", store.connected_channels(company_id));
    let campaigns = read_or("campaigns", store.campaigns(company_id));

    let mut per_channel: BTreeMap<String, (u32, f64, Vec<(Timestamp, f64)>)> = BTreeMap::new();
    for post in &posts {
        let slot = per_channel.entry(post.channel.clone()).or_default();
        slot.0 += 1;
        slot.1 += post.engagement;
        slot.2.push((post.created_at, post.engagement));
    }

    let channel_metrics = per_channel
        .into_iter()
        .map(|(channel, (count, total, samples))| ChannelMetric {
            channel,
            posts: count,
            engagement_total: total,
            trend: half_window_trend(samples, now),
        })
        .collect();

    MarketingMetrics {
        connected_channels: channels.len() as u32,
        posts_30d: posts.len() as u32,
        active_campaigns: campaigns.iter().filter(|c| c.active).count() as u32,
        channels: channel_metrics,
        engagement_trend: half_window_trend(
            posts.iter().map(|p| (p.created_at, p.engagement)),
            now,
        ),
    }
}

fn sales<S: OperationalData>(store: &S, company_id: Uuid, now: Timestamp) -> SalesMetrics {
    let deals = read_or("deals", store.deals(company_id));
    let contacts = read_or("contacts", store.contact_count(company_id));

    let open: Vec<_> = deals
        .iter()
        .filter(|deal| !CLOSED_STAGES.contains(&deal.stage.as_str()))
        .collect();
    let stalled = open
        .iter()
        .filter(|deal| now - deal.updated_at >= Duration::days(STALL_DAYS))
        .count() as u32;

    SalesMetrics {
        open_deals: open.len() as u32,
        pipeline_value: open.iter().map(|deal| deal.value).sum(),
        stalled_deals: stalled,
        contacts,
        pipeline_trend: half_window_trend(
            deals
                .iter()
                .filter(|deal| deal.created_at >= now - Duration::days(LOOKBACK_DAYS))
                .map(|deal| (deal.created_at, 1.0)),
            now,
        ),
    }
}

fn finance<S: UsageLedger>(store: &S, company_id: Uuid, now: Timestamp) -> FinanceMetrics {
    let credits_30d = read_or(
        "credits_30d",
        store.credits_spent_since(company_id, now - Duration::days(LOOKBACK_DAYS)),
    );
    let credits_7d = read_or(
        "credits_7d",
        store.credits_spent_since(company_id, now - Duration::days(7)),
    );
    let credits_15d = read_or(
        "credits_15d",
        store.credits_spent_since(company_id, now - Duration::days(LOOKBACK_DAYS / 2)),
    );

    FinanceMetrics {
        credits_30d,
        credits_7d,
        // Per-half burn rate over the 30-day window.
        burn_trend: Trend::from_averages(credits_15d, credits_30d - credits_15d),
    }
}

fn legal<S: OperationalData>(store: &S, company_id: Uuid, now: Timestamp) -> LegalMetrics {
    let since_30 = now - Duration::days(LOOKBACK_DAYS);
    let since_15 = now - Duration::days(LOOKBACK_DAYS / 2);
    let open_reviews = read_or(
        "legal_reviews",
        store.activity_count_since(company_id, "legal_review", since_30),
    );
    let updates_30d = read_or(
        "legal_updates",
        store.activity_count_since(company_id, "legal", since_30),
    );
    let updates_recent = read_or(
        "legal_updates_recent",
        store.activity_count_since(company_id, "legal", since_15),
    );

    LegalMetrics {
        open_reviews,
        updates_30d,
        activity_trend: Trend::from_averages(
            updates_recent as f64,
            updates_30d.saturating_sub(updates_recent) as f64,
        ),
    }
}

fn hr<S: OperationalData>(store: &S, company_id: Uuid, now: Timestamp) -> HrMetrics {
    let since_30 = now - Duration::days(LOOKBACK_DAYS);
    let since_15 = now - Duration::days(LOOKBACK_DAYS / 2);
    let members = read_or("members", store.members(company_id));
    let updates_30d = read_or(
        "hr_updates",
        store.activity_count_since(company_id, "hr", since_30),
    );
    let updates_recent = read_or(
        "hr_updates_recent",
        store.activity_count_since(company_id, "hr", since_15),
    );

    HrMetrics {
        members: members.len() as u32,
        new_members_30d: members.iter().filter(|m| m.joined_at >= since_30).count() as u32,
        updates_30d,
        activity_trend: Trend::from_averages(
            updates_recent as f64,
            updates_30d.saturating_sub(updates_recent) as f64,
        ),
    }
}

fn operations<S: OperationalData>(
    store: &S,
    company_id: Uuid,
    now: Timestamp,
) -> OperationsMetrics {
    let tasks = read_or(
        "tasks",
        store.tasks_since(company_id, now - Duration::days(LOOKBACK_DAYS)),
    );
    let completed = tasks.iter().filter(|task| task.completed).count() as u32;
    let completion_rate = if tasks.is_empty() {
        0.0
    } else {
        completed as f64 / tasks.len() as f64
    };

    OperationsMetrics {
        open_tasks: tasks.len() as u32 - completed,
        completed_30d: completed,
        completion_rate,
        agent_failures_7d: tasks
            .iter()
            .filter(|task| task.agent_failed && task.created_at >= now - Duration::days(7))
            .count() as u32,
        activity_trend: half_window_trend(
            tasks
                .iter()
                .filter(|task| task.completed)
                .filter_map(|task| task.completed_at.map(|at| (at, 1.0))),
            now,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autopilot_core::now;
    use autopilot_store::SqliteStore;

    #[test]
    fn marketing_snapshot_rolls_up_channels() {
        let store = SqliteStore::in_memory().unwrap();
        let company_id = Uuid::new_v4();
        let ts = now();
        store.add_channel(company_id, "linkedin").unwrap();
        store.add_channel(company_id, "blog").unwrap();
        store.add_post(company_id, "linkedin", 20.0, ts - Duration::days(2)).unwrap();
        store.add_post(company_id, "linkedin", 10.0, ts - Duration::days(20)).unwrap();
        store.add_post(company_id, "blog", 5.0, ts - Duration::days(1)).unwrap();
        store.upsert_campaign(company_id, "spring", true, 100.0, 10.0).unwrap();
        store.upsert_campaign(company_id, "winter", false, 100.0, 90.0).unwrap();

        let snapshot = sense(&store, company_id, Department::Marketing, ts);
        match snapshot.metrics {
            DepartmentMetrics::Marketing(m) => {
                assert_eq!(m.connected_channels, 2);
                assert_eq!(m.posts_30d, 3);
                assert_eq!(m.active_campaigns, 1);
                assert_eq!(m.channels.len(), 2);
                // 20 avg recent vs 10 avg prior is improving.
                assert_eq!(m.engagement_trend, Trend::Improving);
            }
            other => panic!("wrong metrics shape: {other:?}"),
        }
    }

    #[test]
    fn sales_snapshot_counts_stalled_deals() {
        let store = SqliteStore::in_memory().unwrap();
        let company_id = Uuid::new_v4();
        let ts = now();
        store.add_deal(company_id, 1000.0, "open", ts - Duration::days(20)).unwrap();
        store.add_deal(company_id, 500.0, "won", ts - Duration::days(5)).unwrap();
        store.add_contact(company_id, ts).unwrap();

        let snapshot = sense(&store, company_id, Department::Sales, ts);
        match snapshot.metrics {
            DepartmentMetrics::Sales(m) => {
                assert_eq!(m.open_deals, 1);
                assert_eq!(m.stalled_deals, 1);
                assert_eq!(m.pipeline_value, 1000.0);
                assert_eq!(m.contacts, 1);
            }
            other => panic!("wrong metrics shape: {other:?}"),
        }
    }

    #[test]
    fn non_outward_departments_skip_competitors() {
        let store = SqliteStore::in_memory().unwrap();
        let company_id = Uuid::new_v4();
        store.add_competitor(company_id, "rival", 5, None).unwrap();
        store.add_activity(company_id, "legal", now()).unwrap();

        let snapshot = sense(&store, company_id, Department::Legal, now());
        assert!(snapshot.competitors.is_empty());

        store.add_channel(company_id, "blog").unwrap();
        let snapshot = sense(&store, company_id, Department::Marketing, now());
        assert_eq!(snapshot.competitors.len(), 1);
    }
}
