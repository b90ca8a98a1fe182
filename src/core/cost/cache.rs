use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::models::cost::CostReport;

const CACHE_VERSION: u64 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedReport {
    #[serde(default)]
    version: u64,
    report: CostReport,
}

/// Base directory for every file this tool caches, respecting XDG_CACHE_HOME.
pub fn cache_dir() -> PathBuf {
    cache_dir_from(std::env::var_os("XDG_CACHE_HOME"))
}

fn cache_dir_from(xdg_cache_home: Option<OsString>) -> PathBuf {
    let base = xdg_cache_home
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("~"))
                .join(".cache")
        });
    base.join("burn")
}

pub fn default_report_path() -> PathBuf {
    cache_dir().join("usage-cache.json")
}

/// Persist the last successful report.
pub fn save_report(path: &Path, report: &CostReport) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create cache directory: {}", parent.display()))?;
    }
    let cached = CachedReport {
        version: CACHE_VERSION,
        report: report.clone(),
    };
    let json = serde_json::to_string(&cached).context("Failed to serialize usage cache")?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write usage cache to {}", path.display()))?;
    Ok(())
}

/// Load a previously saved report together with the time it was written.
/// Missing, unreadable, or outdated caches are all treated as absent.
pub fn load_report(path: &Path) -> Option<(CostReport, DateTime<Utc>)> {
    let content = std::fs::read_to_string(path).ok()?;
    let cached: CachedReport = match serde_json::from_str(&content) {
        Ok(c) => c,
        Err(e) => {
            tracing::debug!("Ignoring unreadable usage cache {}: {}", path.display(), e);
            return None;
        }
    };
    if cached.version != CACHE_VERSION {
        return None;
    }
    let saved_at = std::fs::metadata(path)
        .and_then(|m| m.modified())
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now());
    Some((cached.report, saved_at))
}
