//! Flowcast CLI - live workflow execution relay
//!
//! Runs the broadcast hub, or attaches to one to watch and drive a workflow.

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod output;

use commands::{Cli, Commands};

/// Initialize tracing with optional file logging.
///
/// `watch` keeps the default level at `warn` so log lines do not interleave
/// with the live table.
fn init_tracing(log_file: Option<&std::path::Path>, quiet: bool) -> Result<()> {
    let default_filter = if quiet {
        "flowcast=warn,flowcast_hub=warn,flowcast_client=warn"
    } else {
        "flowcast=info,flowcast_hub=info,flowcast_client=info"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    if let Some(path) = log_file {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open log file {}", path.display()))?;

        // Log to both stdout and file when --log is used
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::sync::Mutex::new(file))
                    .with_ansi(false),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_file = match &cli.command {
        Commands::Serve(args) if args.log => Some(
            args.log_file
                .clone()
                .unwrap_or_else(|| std::path::PathBuf::from("flowcast-hub.log")),
        ),
        _ => None,
    };

    let quiet = matches!(&cli.command, Commands::Watch(_)) && !cli.verbose;
    init_tracing(log_file.as_deref(), quiet)?;

    cli.execute().await
}
