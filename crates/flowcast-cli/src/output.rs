//! Terminal output formatting.

use chrono::{DateTime, Utc};
use colored::{ColoredString, Colorize};
use flowcast_client::ConnectionState;
use flowcast_core::{ExecutionStatus, NodeExecutionState, NodeStatus, WorkflowExecutionState};
use unicode_width::UnicodeWidthStr;

/// Print the execution header, node table, active edges and recent logs.
pub fn print_execution(state: &WorkflowExecutionState, recent_logs: usize) {
    let width = term_width();
    let progress = state.progress();

    println!("{}", "─".repeat(width.min(80)).dimmed());
    println!(
        "{} {}  {}",
        "Execution".bold(),
        state.execution_id.cyan(),
        execution_status_colored(state.status)
    );
    println!(
        "{} running  {} done  {} failed  {} waiting",
        progress.running.to_string().yellow(),
        progress.success.to_string().green(),
        progress.error.to_string().red(),
        progress.waiting.to_string().blue()
    );
    if let Some(elapsed) = state.started_at.map(|start| elapsed_since(start, state.completed_at)) {
        println!("{}: {}", "Elapsed".bold(), elapsed);
    }
    println!();

    print_nodes_table(state, width);

    let active = state.active_edges();
    if !active.is_empty() {
        println!();
        println!("{}: {}", "Active edges".bold(), active.join(", ").magenta());
    }

    if recent_logs > 0 && !state.logs.is_empty() {
        println!();
        println!("{}", "Logs".bold());
        let skip = state.logs.len().saturating_sub(recent_logs);
        let message_width = width.saturating_sub(24).max(20);
        for entry in state.logs.iter().skip(skip) {
            let level = entry.level.as_deref().unwrap_or("info");
            println!(
                "  {} {} {}",
                pad_right(&truncate_visual(&entry.node_id, 12), 12).dimmed(),
                level_colored(level),
                truncate_visual(&entry.message_text(), message_width)
            );
        }
    }
    println!();
}

/// Print nodes ordered by start time.
fn print_nodes_table(state: &WorkflowExecutionState, width: usize) {
    if state.node_states.is_empty() {
        println!("{}", "No nodes have run yet.".dimmed());
        return;
    }

    let mut nodes: Vec<&NodeExecutionState> = state.node_states.values().collect();
    nodes.sort_by(|a, b| a.started_at.cmp(&b.started_at).then(a.node_id.cmp(&b.node_id)));

    let id_width = width.saturating_sub(36).clamp(12, 40);
    println!(
        "{} {:<10} {:<10}",
        pad_right("Node", id_width),
        "Status",
        "Duration"
    );
    println!("{}", "─".repeat(id_width + 22));

    for node in nodes {
        let marker = if state.current_node_id.as_deref() == Some(node.node_id.as_str()) {
            "▶".yellow().bold()
        } else {
            " ".normal()
        };
        let duration = match node.completed_at {
            Some(_) => elapsed_since(node.started_at, node.completed_at),
            None => "-".to_string(),
        };
        println!(
            "{} {} {}{}",
            pad_right(&truncate_visual(&node.node_id, id_width - 2), id_width - 2),
            marker,
            pad_right_colored(node_status_colored(node.status), node.status.as_str(), 11),
            duration.dimmed()
        );
    }
}

/// Print a connection state change.
pub fn print_connection(state: ConnectionState) {
    match state {
        ConnectionState::Connected => println!("{} {}", "●".green(), "Connected to hub".green()),
        ConnectionState::Connecting => println!("{} {}", "○".yellow(), "Connecting...".dimmed()),
        ConnectionState::Disconnected => println!("{} {}", "○".red(), "Disconnected".red()),
    }
}

fn execution_status_colored(status: ExecutionStatus) -> ColoredString {
    match status {
        ExecutionStatus::Idle => "idle".dimmed(),
        ExecutionStatus::Running => "running".yellow().bold(),
        ExecutionStatus::Completed => "completed".green().bold(),
        ExecutionStatus::Failed => "failed".red().bold(),
        ExecutionStatus::Paused => "paused".blue().bold(),
    }
}

fn node_status_colored(status: NodeStatus) -> ColoredString {
    match status {
        NodeStatus::Running => "running".yellow(),
        NodeStatus::Success => "success".green(),
        NodeStatus::Error => "error".red(),
        NodeStatus::Waiting => "waiting".blue(),
    }
}

fn level_colored(level: &str) -> ColoredString {
    let label = format!("{:<5}", level);
    match level {
        "error" => label.red(),
        "warn" | "warning" => label.yellow(),
        "debug" => label.dimmed(),
        _ => label.normal(),
    }
}

/// Human duration between `start` and `end` (or now).
fn elapsed_since(start: DateTime<Utc>, end: Option<DateTime<Utc>>) -> String {
    let end = end.unwrap_or_else(Utc::now);
    format_duration_ms((end - start).num_milliseconds().max(0))
}

fn format_duration_ms(ms: i64) -> String {
    if ms < 1000 {
        format!("{}ms", ms)
    } else if ms < 60_000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else {
        format!("{}m{:02}s", ms / 60_000, (ms % 60_000) / 1000)
    }
}

/// Get terminal width, defaulting to 80.
fn term_width() -> usize {
    terminal_size::terminal_size()
        .map(|(w, _)| w.0 as usize)
        .unwrap_or(80)
}

/// Pad a plain string to a given visual width (right-padded).
fn pad_right(s: &str, width: usize) -> String {
    let visual = UnicodeWidthStr::width(s);
    if visual >= width {
        s.to_string()
    } else {
        format!("{}{}", s, " ".repeat(width - visual))
    }
}

/// Pad a colored label using the width of its plain text.
fn pad_right_colored(label: ColoredString, plain: &str, width: usize) -> String {
    let visual = UnicodeWidthStr::width(plain);
    format!("{}{}", label, " ".repeat(width.saturating_sub(visual)))
}

/// Truncate a string respecting visual width.
fn truncate_visual(s: &str, max_width: usize) -> String {
    if UnicodeWidthStr::width(s) <= max_width {
        return s.to_string();
    }
    if max_width <= 3 {
        return ".".repeat(max_width);
    }
    let mut result = String::new();
    let mut current_width = 0;
    for ch in s.chars() {
        let ch_width = unicode_width::UnicodeWidthChar::width(ch).unwrap_or(0);
        if current_width + ch_width > max_width - 2 {
            break;
        }
        result.push(ch);
        current_width += ch_width;
    }
    result.push_str("..");
    result
}
