//! `baton status`: read-only view of the workflow state.

use std::path::Path;

use baton_core::gate::describe_request;
use baton_core::state::WorkflowState;
use baton_core::WorkflowStatus;
use chrono::{Duration, Utc};
use console::style;

use super::{print_json, store};

const RECENT_PROGRESS: usize = 10;

pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.num_seconds().max(0);
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{}h{:02}m", h, m)
    } else if m > 0 {
        format!("{}m{:02}s", m, s)
    } else {
        format!("{}s", s)
    }
}

fn styled_status(status: WorkflowStatus) -> String {
    match status {
        WorkflowStatus::Working => style(status).cyan().to_string(),
        WorkflowStatus::AgentDone => style(status).blue().to_string(),
        WorkflowStatus::WaitingForHuman => style(status).yellow().bold().to_string(),
        WorkflowStatus::Complete => style(status).green().bold().to_string(),
    }
}

/// Elapsed time per sequence entry: until the next entry starts, or until now.
pub fn sequence_durations(state: &WorkflowState) -> Vec<(String, Duration, bool)> {
    let now = Utc::now();
    state
        .agent_sequence
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let end = state
                .agent_sequence
                .get(i + 1)
                .map(|next| next.start_time)
                .unwrap_or(if entry.is_current { now } else { state.updated_at });
            (entry.agent.clone(), end - entry.start_time, entry.is_current)
        })
        .collect()
}

pub fn show(project_dir: &Path, json: bool) -> Result<(), String> {
    let state = store(project_dir).load_existing().map_err(|e| e.to_string())?;

    if json {
        let value = serde_json::to_value(&state).map_err(|e| e.to_string())?;
        print_json(&value);
        return Ok(());
    }

    let pending_checks = state.status == WorkflowStatus::Complete && !state.completion_confirmed;
    println!(
        "{}  {}{}",
        style("Status").bold(),
        styled_status(state.status),
        if pending_checks { " (completion checks pending)" } else { "" }
    );
    let agent = match (&state.current_agent, &state.current_model) {
        (Some(agent), Some(model)) => format!("{} ({})", agent, model),
        (Some(agent), None) => agent.clone(),
        (None, _) => "-".to_string(),
    };
    println!("{}   {}", style("Agent").bold(), agent);
    println!(
        "{}     {} (started {})",
        style("Run").bold(),
        state.run_id,
        state.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    );

    if state.status == WorkflowStatus::WaitingForHuman {
        println!();
        println!("{}", style("Pending question").yellow().bold());
        print!("{}", describe_request(&state));
        println!("Answer with: baton respond \"<text>\"");
    }

    if !state.model_statuses.is_empty() {
        println!();
        println!("{}", style("Model variants").bold());
        for (key, status) in &state.model_statuses {
            println!("  {:<40} {:?}", key, status);
        }
    }

    println!();
    println!("{}", style("Sequence").bold());
    for (agent, elapsed, current) in sequence_durations(&state) {
        let marker = if current { style("▶").green().to_string() } else { " ".to_string() };
        println!("  {} {:<20} {}", marker, agent, format_elapsed(elapsed));
    }

    let unread = state.unread_counts();
    if !unread.is_empty() {
        println!();
        println!("{}", style("Unread messages").bold());
        for (agent, count) in unread {
            println!("  {:<20} {}", agent, count);
        }
    }

    if !state.progress.is_empty() {
        println!();
        println!("{}", style("Recent progress").bold());
        let skip = state.progress.len().saturating_sub(RECENT_PROGRESS);
        for entry in state.progress.iter().skip(skip) {
            println!(
                "  {} {:<16} {}",
                style(entry.timestamp.format("%H:%M:%S")).dim(),
                entry.agent,
                entry.description
            );
        }
    }

    println!();
    println!(
        "{}    ${:.4} ({} tokens in, {} out)",
        style("Cost").bold(),
        state.cost.total_cost,
        state.cost.tokens.input,
        state.cost.tokens.output
    );
    Ok(())
}
