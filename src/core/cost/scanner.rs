use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::Deserialize;
use walkdir::{DirEntry, WalkDir};

use crate::core::cost::pricing::{self, ModelPricing, PricingTable};
use crate::core::cost::report;
use crate::core::error::ScanError;
use crate::core::models::cost::CostReport;

const LOG_EXTENSION: &str = "jsonl";

/// Model value written for entries the client generated itself.
pub const SYNTHETIC_MODEL: &str = "<synthetic>";

// ── JSONL structs ─────────────────────────────────────────────────────

#[derive(Deserialize)]
struct LogUsage {
    input_tokens: Option<u64>,
    output_tokens: Option<u64>,
    cache_creation_input_tokens: Option<u64>,
    cache_read_input_tokens: Option<u64>,
}

#[derive(Deserialize)]
struct LogMessage {
    role: Option<String>,
    model: Option<String>,
    usage: Option<LogUsage>,
}

#[derive(Deserialize)]
struct LogLine {
    #[serde(rename = "type")]
    line_type: Option<String>,
    message: Option<LogMessage>,
    timestamp: Option<String>,
}

// ── Events and buckets ────────────────────────────────────────────────

/// One accepted assistant response with its token usage.
#[derive(Debug, Clone, PartialEq)]
pub struct UsageEvent {
    pub model: String,
    pub timestamp: DateTime<Utc>,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_creation_tokens: u64,
    pub cache_read_tokens: u64,
}

impl UsageEvent {
    /// Calendar day of the event in the process's local timezone.
    pub fn local_date(&self) -> NaiveDate {
        self.timestamp.with_timezone(&Local).date_naive()
    }
}

/// Token sums for one (day, model) pair during a single scan.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TokenBucket {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_creation_tokens: u64,
    pub cache_read_tokens: u64,
}

impl TokenBucket {
    pub fn add(&mut self, event: &UsageEvent) {
        self.merge(&TokenBucket {
            input_tokens: event.input_tokens,
            output_tokens: event.output_tokens,
            cache_creation_tokens: event.cache_creation_tokens,
            cache_read_tokens: event.cache_read_tokens,
        });
    }

    /// Counts saturate so a corrupt log value cannot abort a scan.
    pub fn merge(&mut self, other: &TokenBucket) {
        self.input_tokens = self.input_tokens.saturating_add(other.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(other.output_tokens);
        self.cache_creation_tokens = self
            .cache_creation_tokens
            .saturating_add(other.cache_creation_tokens);
        self.cache_read_tokens = self.cache_read_tokens.saturating_add(other.cache_read_tokens);
    }

    pub fn total_tokens(&self) -> u64 {
        self.input_tokens
            .saturating_add(self.output_tokens)
            .saturating_add(self.cache_creation_tokens)
            .saturating_add(self.cache_read_tokens)
    }

    pub fn cost(&self, pricing: &ModelPricing) -> f64 {
        pricing::calculate_cost(
            pricing,
            self.input_tokens,
            self.output_tokens,
            self.cache_creation_tokens,
            self.cache_read_tokens,
        )
    }
}

pub type Buckets = HashMap<(NaiveDate, String), TokenBucket>;

// ── File discovery ────────────────────────────────────────────────────

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}

/// Recursively collect `*.jsonl` files under `root`, skipping hidden entries.
/// A missing root yields no files. Order is unspecified.
pub fn find_log_files(root: &Path) -> Vec<PathBuf> {
    if !root.is_dir() {
        return Vec::new();
    }
    WalkDir::new(root)
        .into_iter()
        // The root itself may live under a dot-directory.
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.path().extension().and_then(|x| x.to_str()) == Some(LOG_EXTENSION))
        .map(DirEntry::into_path)
        .collect()
}

// ── Line parsing ──────────────────────────────────────────────────────

/// Cheap substring check before paying for a JSON parse.
fn is_candidate_line(line: &str) -> bool {
    line.contains("assistant") && line.contains("usage")
}

fn parse_timestamp(ts: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(ts)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

/// Turn one log line into a usage event, or None when the line doesn't qualify.
pub fn parse_event(line: &str) -> Option<UsageEvent> {
    if !is_candidate_line(line) {
        return None;
    }
    let parsed: LogLine = serde_json::from_str(line).ok()?;

    if parsed.line_type.as_deref() != Some("assistant") {
        return None;
    }
    let message = parsed.message?;
    if message.role.as_deref() != Some("assistant") {
        return None;
    }
    let usage = message.usage?;
    let model = message.model?;
    if model == SYNTHETIC_MODEL {
        return None;
    }
    let timestamp = parse_timestamp(parsed.timestamp.as_deref()?)?;

    Some(UsageEvent {
        model,
        timestamp,
        input_tokens: usage.input_tokens.unwrap_or(0),
        output_tokens: usage.output_tokens.unwrap_or(0),
        cache_creation_tokens: usage.cache_creation_input_tokens.unwrap_or(0),
        cache_read_tokens: usage.cache_read_input_tokens.unwrap_or(0),
    })
}

/// Add every qualifying line of `content` into `buckets`. Returns the number accepted.
pub fn accumulate(content: &str, buckets: &mut Buckets) -> usize {
    let mut accepted = 0;
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some(event) = parse_event(line) else {
            continue;
        };
        buckets
            .entry((event.local_date(), event.model.clone()))
            .or_default()
            .add(&event);
        accepted += 1;
    }
    accepted
}

fn process_file(path: &Path, buckets: &mut Buckets) -> Result<usize> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(accumulate(&content, buckets))
}

// ── Main scan entry point ─────────────────────────────────────────────

/// Scan every log file under `root` into per-(day, model) buckets.
///
/// Only an unlistable root is an error. Unreadable files and bad lines are skipped.
/// `cancel` is checked between files.
pub fn collect_usage(root: &Path, cancel: &AtomicBool) -> Result<Buckets, ScanError> {
    let mut buckets = Buckets::new();
    if !root.exists() {
        tracing::debug!("Log directory {} does not exist", root.display());
        return Ok(buckets);
    }
    std::fs::read_dir(root).map_err(|source| ScanError::RootUnreadable {
        path: root.to_path_buf(),
        source,
    })?;

    let files = find_log_files(root);
    tracing::debug!("Scanning {} log files under {}", files.len(), root.display());

    let mut accepted = 0usize;
    for file in &files {
        if cancel.load(Ordering::Relaxed) {
            return Err(ScanError::Cancelled);
        }
        match process_file(file, &mut buckets) {
            Ok(n) => accepted += n,
            Err(e) => tracing::debug!("Skipping file: {:#}", e),
        }
    }

    tracing::debug!("Accepted {} usage events into {} buckets", accepted, buckets.len());
    Ok(buckets)
}

/// Scan `root` and price the result into a report.
pub fn read_usage(
    root: &Path,
    pricing: &PricingTable,
    cancel: &AtomicBool,
) -> Result<CostReport, ScanError> {
    let buckets = collect_usage(root, cancel)?;
    Ok(report::build_report(&buckets, pricing))
}
