use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::core::cost::pricing::DEFAULT_PRICING_URL;

/// Refresh intervals a user may pick, in minutes.
pub const REFRESH_INTERVALS: &[u64] = &[1, 5, 10, 15, 30];
pub const DEFAULT_REFRESH_INTERVAL: u64 = 5;
pub const DEFAULT_REFRESH_TIMEOUT_SECS: u64 = 300;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),
    #[error("Invalid refresh interval: {0} minutes (must be one of 1, 5, 10, 15, 30)")]
    InvalidInterval(u64),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_format")]
    pub default_format: String,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default = "default_interval")]
    pub refresh_interval_minutes: u64,
    #[serde(default = "default_timeout")]
    pub refresh_timeout_secs: u64,
    /// Root of the session logs; defaults to `~/.claude/projects`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projects_dir: Option<PathBuf>,
    #[serde(default = "default_pricing_url")]
    pub pricing_url: String,
}

fn default_format() -> String {
    "text".to_string()
}
fn default_color() -> String {
    "auto".to_string()
}
fn default_interval() -> u64 {
    DEFAULT_REFRESH_INTERVAL
}
fn default_timeout() -> u64 {
    DEFAULT_REFRESH_TIMEOUT_SECS
}
fn default_pricing_url() -> String {
    DEFAULT_PRICING_URL.to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_format: default_format(),
            color: default_color(),
            refresh_interval_minutes: default_interval(),
            refresh_timeout_secs: default_timeout(),
            projects_dir: None,
            pricing_url: default_pricing_url(),
        }
    }
}

impl Settings {
    /// The stored interval, or the default when it isn't one of the allowed values.
    pub fn refresh_interval(&self) -> Duration {
        let minutes = if REFRESH_INTERVALS.contains(&self.refresh_interval_minutes) {
            self.refresh_interval_minutes
        } else {
            DEFAULT_REFRESH_INTERVAL
        };
        Duration::from_secs(minutes * 60)
    }

    /// Per-refresh deadline; `None` when disabled with 0.
    pub fn refresh_timeout(&self) -> Option<Duration> {
        match self.refresh_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Log root: explicit setting, then `$CLAUDE_CONFIG_DIR/projects`, then `~/.claude/projects`.
    pub fn projects_dir(&self) -> PathBuf {
        if let Some(dir) = &self.projects_dir {
            return expand_home(dir);
        }
        if let Ok(config_dir) = std::env::var("CLAUDE_CONFIG_DIR") {
            return PathBuf::from(config_dir).join("projects");
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("~"))
            .join(".claude")
            .join("projects")
    }
}

fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}

pub fn validate_interval(minutes: u64) -> Result<u64, ConfigError> {
    if REFRESH_INTERVALS.contains(&minutes) {
        Ok(minutes)
    } else {
        Err(ConfigError::InvalidInterval(minutes))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub settings: Settings,
}

impl AppConfig {
    /// Get the config file path, respecting XDG_CONFIG_HOME
    pub fn config_path() -> PathBuf {
        Self::config_path_from(std::env::var_os("XDG_CONFIG_HOME"))
    }

    fn config_path_from(xdg_config_home: Option<OsString>) -> PathBuf {
        let config_dir = xdg_config_home
            .filter(|dir| !dir.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("~"))
                    .join(".config")
            });
        config_dir.join("burn").join("config.toml")
    }

    /// Load config from the default path, falling back to defaults if not found
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)?;
        let config: AppConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Serialize and write this config to the config file path.
    pub fn save(&self) -> Result<PathBuf, ConfigError> {
        let path = Self::config_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&path, content)?;
        Ok(path)
    }

    /// Validate the config
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if !["text", "json"].contains(&self.settings.default_format.as_str()) {
            issues.push(format!(
                "Invalid default_format: '{}' (must be 'text' or 'json')",
                self.settings.default_format
            ));
        }
        if !["auto", "always", "never"].contains(&self.settings.color.as_str()) {
            issues.push(format!(
                "Invalid color: '{}' (must be 'auto', 'always', or 'never')",
                self.settings.color
            ));
        }
        if let Err(e) = validate_interval(self.settings.refresh_interval_minutes) {
            issues.push(e.to_string());
        }
        if !self.settings.pricing_url.starts_with("https://") {
            issues.push(format!(
                "Invalid pricing_url: '{}' (must use HTTPS)",
                self.settings.pricing_url
            ));
        }
        issues
    }
}
