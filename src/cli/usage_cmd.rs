use anyhow::Result;
use serde::Serialize;

use crate::cli::output::{OutputFormat, OutputOptions};
use crate::cli::renderer;
use crate::core::config::Settings;
use crate::core::models::snapshot::UsageSnapshot;
use crate::core::refresh::{RefreshOutcome, ServiceSettings, UsageService};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotPayload<'a> {
    #[serde(flatten)]
    pub snapshot: &'a UsageSnapshot,
    pub week_total: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'a str>,
}

impl<'a> SnapshotPayload<'a> {
    pub fn new(snapshot: &'a UsageSnapshot, error: Option<&'a str>) -> Self {
        Self {
            snapshot,
            week_total: snapshot.week_total(),
            error,
        }
    }
}

/// Print one snapshot in the selected format, with an optional refresh error.
pub fn print_snapshot(
    snapshot: &UsageSnapshot,
    error: Option<&str>,
    show_all: bool,
    opts: &OutputOptions,
) -> Result<()> {
    match opts.format {
        OutputFormat::Text => {
            let mut text = renderer::render_snapshot(snapshot, show_all, opts.use_color);
            if let Some(message) = error {
                text.push('\n');
                text.push_str(&renderer::render_error(message, opts.use_color));
            }
            println!("{}", text);
        }
        OutputFormat::Json => {
            println!("{}", opts.to_json(&SnapshotPayload::new(snapshot, error))?);
            if let (Some(message), true) = (error, opts.verbose) {
                eprintln!("Refresh failed: {}", message);
            }
        }
    }
    Ok(())
}

pub async fn run(
    week_offset: i32,
    show_all: bool,
    settings: &Settings,
    opts: &OutputOptions,
) -> Result<()> {
    let service = UsageService::new(ServiceSettings::from_settings(settings));
    let cold = service.snapshot().last_refresh.is_none();

    // Show spinner on stderr (text mode only)
    let spinner = if matches!(opts.format, OutputFormat::Text) {
        let msg: &'static str = if cold {
            "First scan, indexing session files..."
        } else {
            "Scanning session logs..."
        };
        Some(tokio::spawn(async move {
            let frames = ['⠋', '⠙', '⠹', '⠸', '⠼', '⠴', '⠦', '⠧', '⠇', '⠏'];
            let mut i = 0usize;
            loop {
                eprint!("\r {} {}", frames[i % frames.len()], msg);
                i = i.wrapping_add(1);
                tokio::time::sleep(std::time::Duration::from_millis(80)).await;
            }
        }))
    } else {
        None
    };

    let outcome = match service.refresh() {
        Some(handle) => handle.wait().await,
        None => RefreshOutcome::Cancelled,
    };

    // Stop spinner and clear the line
    if let Some(s) = spinner {
        s.abort();
        eprint!("\r\x1b[2K");
    }

    let error = match outcome {
        RefreshOutcome::Succeeded => None,
        RefreshOutcome::Failed(message) => {
            if service.snapshot().last_refresh.is_none() {
                anyhow::bail!("{}", message);
            }
            Some(message)
        }
        RefreshOutcome::Cancelled => Some("Refresh was cancelled".to_string()),
    };

    let snapshot = if week_offset == 0 {
        (*service.snapshot()).clone()
    } else {
        service.snapshot_for_week_offset(week_offset)
    };
    tracing::debug!(
        "Window {}..{} total ${:.2}",
        snapshot.week_start,
        snapshot.week_end,
        snapshot.week_total()
    );

    print_snapshot(&snapshot, error.as_deref(), show_all, opts)
}
