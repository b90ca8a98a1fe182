use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Token and cost totals for one model on one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelBreakdown {
    pub model_name: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_creation_tokens: u64,
    pub cache_read_tokens: u64,
    pub cost: f64,
}

/// One local calendar day of usage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyUsage {
    pub date: NaiveDate,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_creation_tokens: u64,
    pub cache_read_tokens: u64,
    pub total_tokens: u64,
    pub total_cost: f64,
    pub models_used: Vec<String>,
    pub model_breakdowns: Vec<ModelBreakdown>,
}

impl DailyUsage {
    /// Zero-valued placeholder for a day with no recorded usage.
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            input_tokens: 0,
            output_tokens: 0,
            cache_creation_tokens: 0,
            cache_read_tokens: 0,
            total_tokens: 0,
            total_cost: 0.0,
            models_used: Vec::new(),
            model_breakdowns: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Totals {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_creation_tokens: u64,
    pub cache_read_tokens: u64,
    pub total_tokens: u64,
    pub total_cost: f64,
}

/// Full aggregation result: every day with usage, ascending by date, plus grand totals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostReport {
    pub daily: Vec<DailyUsage>,
    pub totals: Totals,
}

impl CostReport {
    pub fn is_empty(&self) -> bool {
        self.daily.is_empty()
    }

    pub fn day(&self, date: NaiveDate) -> Option<&DailyUsage> {
        self.daily.iter().find(|d| d.date == date)
    }

    pub fn earliest_date(&self) -> Option<NaiveDate> {
        self.daily.iter().map(|d| d.date).min()
    }
}
