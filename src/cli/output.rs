use std::io::IsTerminal;

use anyhow::Result;
use serde::Serialize;

use crate::core::config::Settings;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Clone)]
pub struct OutputOptions {
    pub format: OutputFormat,
    pub pretty: bool,
    pub use_color: bool,
    pub verbose: bool,
}

impl OutputOptions {
    /// Resolve flags against the configured defaults. Flags win.
    pub fn resolve(
        format_flag: Option<&str>,
        json: bool,
        pretty: bool,
        no_color: bool,
        verbose: bool,
        settings: &Settings,
    ) -> Self {
        let format = if json {
            OutputFormat::Json
        } else {
            match format_flag.unwrap_or(settings.default_format.as_str()) {
                "json" => OutputFormat::Json,
                _ => OutputFormat::Text,
            }
        };
        let use_color = match settings.color.as_str() {
            _ if no_color => false,
            "never" => false,
            "always" => true,
            _ => detect_color(),
        };
        Self {
            format,
            pretty,
            use_color,
            verbose,
        }
    }

    pub fn to_json<T: Serialize>(&self, value: &T) -> Result<String> {
        let json = if self.pretty {
            serde_json::to_string_pretty(value)?
        } else {
            serde_json::to_string(value)?
        };
        Ok(json)
    }
}

pub fn detect_color() -> bool {
    if std::env::var("NO_COLOR").is_ok() {
        return false;
    }
    std::io::stdout().is_terminal()
}
