use anyhow::Result;

use crate::cli::output::{OutputFormat, OutputOptions};
use crate::core::config::{validate_interval, AppConfig, REFRESH_INTERVALS};

pub fn init(_opts: &OutputOptions) -> Result<()> {
    let path = AppConfig::config_path();
    if path.exists() {
        eprintln!("Config file already exists at {}", path.display());
        eprintln!("Remove it first if you want to regenerate.");
        return Ok(());
    }

    match AppConfig::default().save() {
        Ok(path) => {
            let config = AppConfig::default();
            println!("Generated config at {}", path.display());
            println!(
                "  Logs read from {}",
                config.settings.projects_dir().display()
            );
            println!(
                "  Refresh every {} min",
                config.settings.refresh_interval_minutes
            );
        }
        Err(e) => {
            eprintln!("Failed to generate config: {}", e);
            std::process::exit(1);
        }
    }
    Ok(())
}

pub fn check(opts: &OutputOptions) -> Result<()> {
    let path = AppConfig::config_path();
    if !path.exists() {
        eprintln!("No config file found at {}", path.display());
        eprintln!("Run `burn config init` to create one.");
        return Ok(());
    }

    let config = match AppConfig::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    };

    let issues = config.validate();
    if matches!(opts.format, OutputFormat::Json) {
        let report = serde_json::json!({
            "path": path,
            "valid": issues.is_empty(),
            "issues": issues,
        });
        println!("{}", opts.to_json(&report)?);
        if !issues.is_empty() {
            std::process::exit(1);
        }
        return Ok(());
    }

    if issues.is_empty() {
        println!("Config is valid: {}", path.display());
        let projects_dir = config.settings.projects_dir();
        println!("  Log directory: {}", projects_dir.display());
        if !projects_dir.exists() {
            println!("  (directory does not exist yet; reports will be empty)");
        }
        println!(
            "  Refresh interval: {} min",
            config.settings.refresh_interval_minutes
        );
    } else {
        eprintln!("Config issues found in {}:", path.display());
        for issue in &issues {
            eprintln!("  - {}", issue);
        }
        std::process::exit(1);
    }
    Ok(())
}

pub fn set_interval(minutes: u64, _opts: &OutputOptions) -> Result<()> {
    if let Err(e) = validate_interval(minutes) {
        eprintln!("{}", e);
        let allowed: Vec<String> = REFRESH_INTERVALS.iter().map(|m| m.to_string()).collect();
        eprintln!("Allowed values: {}", allowed.join(", "));
        std::process::exit(1);
    }

    let mut config = AppConfig::load()?;
    if config.settings.refresh_interval_minutes == minutes {
        eprintln!("Refresh interval is already {} min", minutes);
        return Ok(());
    }
    config.settings.refresh_interval_minutes = minutes;
    let path = config.save()?;
    println!("Refresh interval set to {} min ({})", minutes, path.display());
    Ok(())
}
