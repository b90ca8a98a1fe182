use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::core::models::cost::DailyUsage;

/// The published, read-only view of a cost report for one 7-day window.
///
/// A snapshot is never patched: every refresh (or week change) builds a new one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSnapshot {
    pub today_cost: f64,
    /// Exactly seven days, oldest first.
    pub week: Vec<DailyUsage>,
    pub month_total: f64,
    pub is_current_week: bool,
    pub week_start: NaiveDate,
    pub week_end: NaiveDate,
    pub earliest_date: Option<NaiveDate>,
    pub can_go_back: bool,
    pub last_refresh: Option<DateTime<Utc>>,
}

impl UsageSnapshot {
    pub fn week_total(&self) -> f64 {
        self.week.iter().map(|d| d.total_cost).sum()
    }

    pub fn week_tokens(&self) -> u64 {
        self.week
            .iter()
            .fold(0u64, |acc, d| acc.saturating_add(d.total_tokens))
    }
}
