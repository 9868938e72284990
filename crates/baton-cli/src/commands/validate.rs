//! `baton validate`: check the goal document and flow before a run.

use std::path::{Path, PathBuf};

use baton_core::state::goal_checksum;
use baton_core::FlowGraph;
use console::style;

use super::goal_path;

pub fn validate(project_dir: &Path, goal: Option<PathBuf>) -> Result<(), String> {
    let path = goal_path(project_dir, goal);
    let text = std::fs::read_to_string(&path)
        .map_err(|e| format!("Failed to read '{}': {}", path.display(), e))?;
    let goal = baton_core::GoalDocument::parse(&text).map_err(|e| e.to_string())?;
    let graph = FlowGraph::parse(&goal.config.flow).map_err(|e| e.to_string())?;
    let checksum = goal_checksum(&text).map_err(|e| e.to_string())?;

    println!("{} {} is valid", style("✓").green(), path.display());
    println!("  Agents:      {}", graph.all_agents().join(", "));
    println!("  Entry nodes: {}", graph.entry_nodes().join(", "));
    println!("  Starts at:   {}", graph.start_node());
    println!("  Edges:       {}", graph.edges().len());

    for agent in graph.all_agents() {
        let models = goal.config.models_for(&agent);
        if !models.is_empty() {
            println!("  Models:      {} -> {}", agent, models.join(", "));
        }
    }
    for agent in goal.config.models.keys() {
        if !graph.contains(agent) {
            println!(
                "  {} models configured for '{}', which is not in the flow",
                style("warning:").yellow(),
                agent
            );
        }
    }

    println!(
        "  Gate:        {}",
        goal.config.completion_gate_script.as_deref().unwrap_or("(none)")
    );
    println!("  Interactive: {}", goal.config.interactive);
    println!("  Driver:      {} {}", goal.config.driver.command, goal.config.driver.args.join(" "));
    println!("  Checksum:    {}", &checksum[..12]);
    Ok(())
}
