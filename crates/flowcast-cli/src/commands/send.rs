//! One-shot control commands.

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use flowcast_client::{ClientConfig, ClientEvent, ConnectionManager};
use flowcast_core::{Frame, FrameType};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const ECHO_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Args, Clone)]
pub struct HubArgs {
    /// Hub base URL [env: FLOWCAST_HUB_URL, default: ws://127.0.0.1:8080]
    #[arg(long)]
    pub hub: Option<String>,
}

impl HubArgs {
    pub fn client_config(&self) -> ClientConfig {
        let config = ClientConfig::from_env();
        match &self.hub {
            Some(url) => config.with_base_url(url),
            None => config,
        }
    }
}

#[derive(Args)]
pub struct StartArgs {
    /// Workflow ID
    pub workflow_id: String,

    /// Execution input as JSON
    #[arg(long)]
    pub input: Option<String>,

    #[command(flatten)]
    pub hub: HubArgs,
}

#[derive(Args)]
pub struct TargetArgs {
    /// Workflow ID
    pub workflow_id: String,

    /// Execution to target (defaults to the current one)
    #[arg(long)]
    pub execution_id: Option<String>,

    #[command(flatten)]
    pub hub: HubArgs,
}

#[derive(Args)]
pub struct PingArgs {
    /// Workflow ID
    pub workflow_id: String,

    #[command(flatten)]
    pub hub: HubArgs,
}

#[derive(Subcommand)]
pub enum SendCommands {
    /// Ask the interpreter to start an execution
    Start(StartArgs),

    /// Stop an execution
    Stop(TargetArgs),

    /// Pause an execution
    Pause(TargetArgs),

    /// Resume a paused execution
    Resume(TargetArgs),

    /// Check the hub answers on a workflow channel
    Ping(PingArgs),
}

pub async fn execute(cmd: SendCommands) -> Result<()> {
    match cmd {
        SendCommands::Start(args) => {
            let input = parse_input(args.input.as_deref())?;
            let (manager, events) = open(&args.hub, &args.workflow_id).await?;
            let sent = manager.start_execution(input);
            finish(manager, events, sent, FrameType::ExecutionStart).await
        }
        SendCommands::Stop(args) => {
            let (manager, events) = open(&args.hub, &args.workflow_id).await?;
            let sent = manager.stop_execution(args.execution_id.as_deref());
            finish(manager, events, sent, FrameType::ExecutionStop).await
        }
        SendCommands::Pause(args) => {
            let (manager, events) = open(&args.hub, &args.workflow_id).await?;
            let sent = manager.pause_execution(args.execution_id.as_deref());
            finish(manager, events, sent, FrameType::ExecutionPause).await
        }
        SendCommands::Resume(args) => {
            let (manager, events) = open(&args.hub, &args.workflow_id).await?;
            let sent = manager.resume_execution(args.execution_id.as_deref());
            finish(manager, events, sent, FrameType::ExecutionResume).await
        }
        SendCommands::Ping(args) => {
            let (manager, events) = open(&args.hub, &args.workflow_id).await?;
            let sent = manager.ping();
            finish(manager, events, sent, FrameType::Pong).await
        }
    }
}

fn parse_input(raw: Option<&str>) -> Result<Option<Value>> {
    raw.map(|raw| serde_json::from_str(raw).context("--input must be valid JSON"))
        .transpose()
}

async fn open(
    hub: &HubArgs,
    workflow_id: &str,
) -> Result<(ConnectionManager, UnboundedReceiver<ClientEvent>)> {
    let config = hub.client_config();
    let (manager, events) = ConnectionManager::connect(&config, workflow_id)?;
    if !manager.wait_connected(CONNECT_TIMEOUT).await {
        manager.dispose().await;
        bail!("Hub at {} is not reachable", config.base_url);
    }
    Ok((manager, events))
}

/// Wait for the hub to relay `expected` back, then close.
async fn finish(
    manager: ConnectionManager,
    mut events: UnboundedReceiver<ClientEvent>,
    sent: bool,
    expected: FrameType,
) -> Result<()> {
    if !sent {
        manager.dispose().await;
        bail!("Connection closed before the command was sent");
    }

    let echoed = tokio::time::timeout(ECHO_TIMEOUT, async {
        while let Some(event) = events.recv().await {
            if let ClientEvent::Frame(frame) = event {
                if frame.frame_type() == Some(expected) {
                    return Some(frame);
                }
            }
        }
        None
    })
    .await;

    let workflow_id = manager.workflow_id().to_string();
    manager.dispose().await;

    match echoed {
        Ok(Some(frame)) => {
            println!(
                "{} {} relayed on {}",
                "✓".green().bold(),
                expected.to_string().cyan(),
                workflow_id.bold()
            );
            if let Frame::Pong { timestamp: Some(ts) } = frame {
                println!("  {}", format!("hub time {}", ts).dimmed());
            }
            Ok(())
        }
        _ => bail!("Hub did not confirm {} within {:?}", expected, ECHO_TIMEOUT),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_input() {
        assert_eq!(parse_input(None).unwrap(), None);
        assert_eq!(
            parse_input(Some(r#"{"orderId": 7}"#)).unwrap(),
            Some(serde_json::json!({ "orderId": 7 }))
        );
        assert!(parse_input(Some("{broken")).is_err());
    }

    #[test]
    fn test_hub_flag_overrides_env() {
        let args = HubArgs {
            hub: Some("ws://hub.internal:9000/".to_string()),
        };
        assert_eq!(args.client_config().base_url, "ws://hub.internal:9000");
    }
}
