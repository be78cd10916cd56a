//! Hub server command.

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use flowcast_hub::HubConfig;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Args)]
pub struct ServeArgs {
    /// Port to listen on [env: FLOWCAST_PORT, default: 8080]
    #[arg(long)]
    pub port: Option<u16>,

    /// Host to bind to [env: FLOWCAST_HOST, default: 127.0.0.1]
    #[arg(long)]
    pub host: Option<String>,

    /// Seconds between heartbeat pings [env: FLOWCAST_HEARTBEAT_SECS, default: 30]
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub heartbeat_secs: Option<u64>,

    /// Seconds between stats reports [env: FLOWCAST_STATS_SECS, default: 60]
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub stats_secs: Option<u64>,

    /// Also write logs to a file
    #[arg(long)]
    pub log: bool,

    /// Log file path (defaults to ./flowcast-hub.log)
    #[arg(long, requires = "log")]
    pub log_file: Option<PathBuf>,
}

impl ServeArgs {
    /// Environment settings with command-line flags taking precedence.
    pub fn hub_config(&self) -> HubConfig {
        let mut config = HubConfig::from_env();
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(secs) = self.heartbeat_secs {
            config = config.with_heartbeat(Duration::from_secs(secs));
        }
        if let Some(secs) = self.stats_secs {
            config = config.with_stats_interval(Duration::from_secs(secs));
        }
        config
    }
}

pub async fn execute(args: ServeArgs) -> Result<()> {
    let config = args.hub_config();

    println!();
    println!("  {} {}", "Flowcast".cyan().bold(), "Broadcast Hub".bold());
    println!();
    println!(
        "  {}  ws://{}/workflow/{{workflowId}}/execution",
        "WebSocket".green(),
        config.bind_addr()
    );
    println!("  {}     http://{}/health", "Health".green(), config.bind_addr());
    println!("  {}      http://{}/stats", "Stats".green(), config.bind_addr());
    println!(
        "  {}  every {}s",
        "Heartbeat".green(),
        config.heartbeat_interval.as_secs()
    );
    println!();
    println!("  {}", "Ctrl+C to stop".dimmed());
    println!();

    flowcast_hub::run_server(config).await?;

    Ok(())
}
