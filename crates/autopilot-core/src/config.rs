//! Per-company, per-department execution configuration
//!
//! Mutated only by the configuration UI; the engine reads it at cycle
//! start and bumps `last_execution_at` / `cycles_completed` at cycle end.

use crate::types::{Department, Timestamp};
use chrono::{Duration, Timelike};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Inclusive hour-of-day window. Wraps midnight when `start_hour` is
/// greater than `end_hour` (e.g. 20..6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveHours {
    pub start_hour: u8,
    pub end_hour: u8,
}

impl ActiveHours {
    pub fn new(start_hour: u8, end_hour: u8) -> Self {
        Self {
            start_hour: start_hour % 24,
            end_hour: end_hour % 24,
        }
    }

    /// Whether the given hour-of-day falls inside the window.
    pub fn contains(&self, hour: u8) -> bool {
        let hour = hour % 24;
        if self.start_hour <= self.end_hour {
            hour >= self.start_hour && hour <= self.end_hour
        } else {
            hour >= self.start_hour || hour <= self.end_hour
        }
    }
}

/// Execution configuration for one (company, department) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepartmentConfig {
    pub company_id: Uuid,
    pub department: Department,
    pub enabled: bool,

    /// Hours between autonomous cycles.
    pub frequency_hours: i64,

    /// Daily credit cap; once today's aggregate consumption reaches it,
    /// every further decision is blocked.
    pub max_credits_per_cycle: f64,
    pub max_posts_per_day: u32,
    /// Per-decision-type cap in any trailing 24h window.
    pub max_actions_per_cycle: u32,
    /// Monthly credit budget for soft guard adjustments, if configured.
    pub monthly_credit_budget: Option<f64>,

    pub active_hours: Option<ActiveHours>,
    pub forbidden_words: Vec<String>,
    pub restricted_topics: Vec<String>,
    pub require_human_approval: bool,
    pub brand_tone: Option<String>,
    pub allowed_actions: Vec<String>,

    pub last_execution_at: Option<Timestamp>,
    pub cycles_completed: u64,
}

impl DepartmentConfig {
    pub fn new(company_id: Uuid, department: Department) -> Self {
        Self {
            company_id,
            department,
            enabled: true,
            frequency_hours: 24,
            max_credits_per_cycle: 50.0,
            max_posts_per_day: 5,
            max_actions_per_cycle: 3,
            monthly_credit_budget: None,
            active_hours: None,
            forbidden_words: Vec::new(),
            restricted_topics: Vec::new(),
            require_human_approval: false,
            brand_tone: None,
            allowed_actions: Vec::new(),
            last_execution_at: None,
            cycles_completed: 0,
        }
    }

    pub fn with_frequency_hours(mut self, hours: i64) -> Self {
        self.frequency_hours = hours;
        self
    }

    pub fn with_active_hours(mut self, hours: ActiveHours) -> Self {
        self.active_hours = Some(hours);
        self
    }

    pub fn with_forbidden_words(mut self, words: Vec<String>) -> Self {
        self.forbidden_words = words;
        self
    }

    pub fn with_monthly_budget(mut self, credits: f64) -> Self {
        self.monthly_credit_budget = Some(credits);
        self
    }

    pub fn with_human_approval(mut self, required: bool) -> Self {
        self.require_human_approval = required;
        self
    }

    /// Whether the configured frequency window has elapsed. A department
    /// that has never run is always due.
    pub fn due(&self, now: Timestamp) -> bool {
        if !self.enabled {
            return false;
        }
        match self.last_execution_at {
            None => true,
            Some(last) => now - last >= Duration::hours(self.frequency_hours),
        }
    }

    /// Hour-of-day for active-hours checks, taken from a UTC timestamp.
    pub fn hour_of(ts: Timestamp) -> u8 {
        ts.hour() as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::now;

    #[test]
    fn active_hours_plain_window() {
        let hours = ActiveHours::new(9, 17);
        assert!(hours.contains(9));
        assert!(hours.contains(17));
        assert!(!hours.contains(8));
        assert!(!hours.contains(22));
    }

    #[test]
    fn active_hours_wraps_midnight() {
        let hours = ActiveHours::new(20, 6);
        assert!(hours.contains(23));
        assert!(hours.contains(0));
        assert!(hours.contains(6));
        assert!(!hours.contains(12));
    }

    #[test]
    fn never_run_department_is_due() {
        let config = DepartmentConfig::new(Uuid::new_v4(), Department::Marketing);
        assert!(config.due(now()));
    }

    #[test]
    fn frequency_window_gates_due() {
        let ts = now();
        let mut config =
            DepartmentConfig::new(Uuid::new_v4(), Department::Sales).with_frequency_hours(24);
        config.last_execution_at = Some(ts - Duration::hours(2));
        assert!(!config.due(ts));
        config.last_execution_at = Some(ts - Duration::hours(25));
        assert!(config.due(ts));
        config.enabled = false;
        assert!(!config.due(ts));
    }
}
