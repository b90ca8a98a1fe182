use anyhow::Result;

use crate::cli::output::{OutputFormat, OutputOptions};
use crate::cli::usage_cmd::print_snapshot;
use crate::core::config::Settings;
use crate::core::refresh::{ServiceSettings, UsageService};

/// Keep refreshing in the background and print every published snapshot until Ctrl-C.
pub async fn run(
    interval_minutes: Option<u64>,
    show_all: bool,
    settings: &Settings,
    opts: &OutputOptions,
) -> Result<()> {
    let service = UsageService::new(ServiceSettings::from_settings(settings));
    if let Some(minutes) = interval_minutes {
        service.set_refresh_interval(minutes)?;
    }

    let mut updates = service.subscribe();
    let mut status = service.subscribe_status();
    // Show whatever the cache had while the first scan runs.
    draw(&service, show_all, opts)?;

    service.start_auto_refresh();
    tracing::info!(
        "Watching usage, refreshing every {} min",
        service.refresh_interval().as_secs() / 60
    );

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                draw(&service, show_all, opts)?;
            }
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                draw(&service, show_all, opts)?;
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::debug!("Interrupted, stopping auto refresh");
                break;
            }
        }
    }

    if service.is_auto_refreshing() {
        service.stop_auto_refresh();
    }
    Ok(())
}

fn draw(service: &UsageService, show_all: bool, opts: &OutputOptions) -> Result<()> {
    if matches!(opts.format, OutputFormat::Text) {
        // Clear screen and home the cursor.
        print!("\x1b[2J\x1b[H");
    }
    let snapshot = service.snapshot();
    let loading = service.is_loading();
    tracing::debug!("Redraw, refresh in flight: {}", loading);
    let error = service.error_message();
    print_snapshot(&snapshot, error.as_deref(), show_all, opts)?;
    if loading && matches!(opts.format, OutputFormat::Text) {
        println!("  Refreshing...");
    }
    Ok(())
}
