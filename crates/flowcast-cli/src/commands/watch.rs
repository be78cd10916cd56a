//! Live execution view.

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use flowcast_client::{ConnectionState, Observer};

use super::send::HubArgs;
use crate::output;

#[derive(Args)]
pub struct WatchArgs {
    /// Workflow ID
    pub workflow_id: String,

    /// Number of recent log lines to show
    #[arg(long, default_value = "10")]
    pub logs: usize,

    /// Exit once the execution completes or fails
    #[arg(long)]
    pub exit_on_finish: bool,

    #[command(flatten)]
    pub hub: HubArgs,
}

pub async fn execute(args: WatchArgs) -> Result<()> {
    let config = args.hub.client_config();
    let observer = Observer::connect(&config, &args.workflow_id)?;
    let mut snapshots = observer.subscribe();
    let mut connection = observer.subscribe_connection();
    let mut unavailable = observer.subscribe_unavailable();

    println!(
        "{} {} {}",
        "Watching".cyan().bold(),
        args.workflow_id.bold(),
        format!("via {}", config.base_url).dimmed()
    );
    println!("{}", "Ctrl+C to stop".dimmed());
    println!();

    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                if let Some(state) = snapshot {
                    output::print_execution(&state, args.logs);
                    if args.exit_on_finish && state.is_terminal() {
                        break;
                    }
                }
            }
            changed = connection.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *connection.borrow_and_update();
                output::print_connection(state);
                if state == ConnectionState::Connected {
                    println!();
                }
            }
            changed = unavailable.changed() => {
                if changed.is_err() {
                    break;
                }
                if *unavailable.borrow_and_update() {
                    println!(
                        "{} {}",
                        "!".yellow().bold(),
                        "Live visualization unavailable. The workflow keeps running; showing the last known state.".yellow()
                    );
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        }
    }

    observer.dispose().await;
    println!("{}", "Stopped watching.".dimmed());
    Ok(())
}
