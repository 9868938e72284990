//! `baton graph`: print the flow graph as Graphviz DOT.

use std::path::{Path, PathBuf};

use baton_core::FlowGraph;

use super::{goal_path, load_goal};

pub fn print_dot(project_dir: &Path, goal: Option<PathBuf>) -> Result<(), String> {
    let goal = load_goal(&goal_path(project_dir, goal))?;
    let graph = FlowGraph::parse(&goal.config.flow).map_err(|e| e.to_string())?;
    print!("{}", graph.to_dot());
    Ok(())
}
