//! CLI command definitions and handlers.

use anyhow::Result;
use clap::{Parser, Subcommand};

pub mod send;
pub mod serve;
pub mod watch;

/// Flowcast - live execution relay for visual workflow editors
#[derive(Parser)]
#[command(name = "flowcast")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the broadcast hub
    Serve(serve::ServeArgs),

    /// Watch a workflow's executions live
    Watch(watch::WatchArgs),

    /// Send a control command for a workflow
    #[command(subcommand)]
    Send(send::SendCommands),
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Serve(args) => serve::execute(args).await,
            Commands::Watch(args) => watch::execute(args).await,
            Commands::Send(cmd) => send::execute(cmd).await,
        }
    }
}
