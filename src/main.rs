mod cli;
mod core;

use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::core::config::AppConfig;

#[derive(Parser)]
#[command(name = "burn", about = "Claude Code spend tracker built from local session logs", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Output format (text|json)
    #[arg(short, long, global = true)]
    format: Option<String>,

    /// Shorthand for --format json
    #[arg(short = 'j', long = "json", global = true)]
    json: bool,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pretty: bool,

    /// Disable ANSI colors
    #[arg(long, global = true)]
    no_color: bool,

    /// Verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan session logs once and show the week's spend
    Usage {
        /// Shift the window by whole weeks (-1 is last week)
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        week_offset: i32,

        /// Show per-model breakdown for each day
        #[arg(short, long)]
        all: bool,
    },
    /// Keep refreshing and redraw on every update until Ctrl-C
    Watch {
        /// Refresh interval in minutes (1, 5, 10, 15 or 30)
        #[arg(short, long)]
        interval: Option<u64>,

        /// Show per-model breakdown for each day
        #[arg(short, long)]
        all: bool,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Generate default config file
    Init,
    /// Validate config file
    Check,
    /// Persist the auto refresh interval
    SetInterval {
        /// Minutes between refreshes (1, 5, 10, 15 or 30)
        minutes: u64,
    },
}

fn init_logging(verbose: bool) {
    let default_directive = if verbose { "burn=debug" } else { "burn=warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!("{}; using defaults", e);
            AppConfig::default()
        }
    };

    let output_opts = cli::output::OutputOptions::resolve(
        cli.format.as_deref(),
        cli.json,
        cli.pretty,
        cli.no_color,
        cli.verbose,
        &config.settings,
    );

    match cli.command {
        None => cli::usage_cmd::run(0, false, &config.settings, &output_opts).await?,
        Some(Commands::Usage { week_offset, all }) => {
            cli::usage_cmd::run(week_offset, all, &config.settings, &output_opts).await?
        }
        Some(Commands::Watch { interval, all }) => {
            cli::watch_cmd::run(interval, all, &config.settings, &output_opts).await?
        }
        Some(Commands::Config { action }) => match action {
            ConfigAction::Init => cli::config_cmd::init(&output_opts)?,
            ConfigAction::Check => cli::config_cmd::check(&output_opts)?,
            ConfigAction::SetInterval { minutes } => {
                cli::config_cmd::set_interval(minutes, &output_opts)?
            }
        },
    }

    Ok(())
}
