//! CLI command implementations.
//!
//! Each submodule corresponds to a top-level CLI command and works on the
//! project's state file through `baton_core::StateStore`.

pub mod agent;
pub mod graph;
pub mod message;
pub mod progress;
pub mod respond;
pub mod run;
pub mod status;
pub mod todo;
pub mod validate;

use std::path::{Path, PathBuf};

use baton_core::state::variant_key;
use baton_core::{GoalDocument, StateStore, GOAL_FILE};

/// Identity of whoever invoked an agent-facing command.
#[derive(Debug, Clone, Default)]
pub struct Caller {
    pub agent: Option<String>,
    pub model: Option<String>,
}

impl Caller {
    pub fn new(agent: Option<String>, model: Option<String>) -> Self {
        let clean = |s: Option<String>| s.map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        Self {
            agent: clean(agent),
            model: clean(model),
        }
    }

    pub fn agent(agent: &str) -> Self {
        Self::new(Some(agent.to_string()), None)
    }

    /// Agent name, required for commands that only make sense inside a turn.
    pub fn require_agent(&self) -> Result<&str, String> {
        self.agent.as_deref().ok_or_else(|| {
            "No calling agent: set BATON_AGENT or pass --agent (the engine sets it for agent turns)"
                .to_string()
        })
    }

    /// `agent` or `agent:model`.
    pub fn address(&self) -> Option<String> {
        let agent = self.agent.as_deref()?;
        Some(match &self.model {
            Some(model) => variant_key(agent, model),
            None => agent.to_string(),
        })
    }

    /// Name used in progress entries: the address, or `human`.
    pub fn display_name(&self) -> String {
        self.address().unwrap_or_else(|| "human".to_string())
    }
}

pub fn store(project_dir: &Path) -> StateStore {
    StateStore::new(project_dir)
}

pub fn goal_path(project_dir: &Path, goal: Option<PathBuf>) -> PathBuf {
    goal.unwrap_or_else(|| project_dir.join(GOAL_FILE))
}

pub fn load_goal(path: &Path) -> Result<GoalDocument, String> {
    GoalDocument::from_file(path).map_err(|e| e.to_string())
}

/// Pretty-print a JSON value to stdout.
pub fn print_json(value: &serde_json::Value) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
    );
}
