//! Goal document schema: YAML frontmatter plus a Markdown body.
//!
//! A project's goal document carries the flow specification:
//!
//! ```markdown
//! ---
//! flow: |
//!   "coordinator" -> "architect" -> developer
//!   developer -> reviewer -> coordinator
//! models:
//!   coordinator: "anthropic/claude-sonnet-4"
//!   reviewer:
//!     - "anthropic/claude-sonnet-4"
//!     - "openai/gpt-5"
//! completionGateScript: "cargo test --workspace"
//! interactive: yes
//! captureSessions: [developer, reviewer]
//! ---
//!
//! # Goal
//! Build the thing.
//! ```
//!
//! The body past the closing `---` is what the checksum covers; the
//! frontmatter is live configuration and may be edited mid-run.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::BatonError;

/// Parsed goal document.
#[derive(Debug, Clone)]
pub struct GoalDocument {
    /// Frontmatter configuration (defaults when the document has none)
    pub config: GoalConfig,

    /// Markdown body after the frontmatter block
    pub body: String,
}

/// Frontmatter of the goal document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalConfig {
    /// Edge-list text describing the flow graph
    #[serde(default)]
    pub flow: String,

    /// Agent name -> one model spec or a list of model specs
    #[serde(default)]
    pub models: BTreeMap<String, ModelSpec>,

    /// Shell command that must exit 0 before the workflow may complete
    #[serde(default)]
    pub completion_gate_script: Option<String>,

    /// Default interaction mode for the human gate
    #[serde(default, deserialize_with = "deserialize_interactive")]
    pub interactive: InteractiveMode,

    /// External agent driver invocation
    #[serde(default)]
    pub driver: DriverConfig,

    /// Editor used for free-text human responses (falls back to $VISUAL / $EDITOR)
    #[serde(default)]
    pub editor: Option<String>,

    /// Shell command run when the workflow starts waiting for a human
    #[serde(default)]
    pub notify_command: Option<String>,

    /// Which agents get their turns exported into the run directory
    #[serde(default)]
    pub capture_sessions: CaptureSessions,
}

/// A single model spec or a list of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ModelSpec {
    One(String),
    Many(Vec<String>),
}

/// How the human gate collects answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum InteractiveMode {
    /// Prompt on the local terminal (and accept remote answers)
    #[default]
    Yes,
    /// Print the question and stop the run
    No,
    /// Answer automatically and keep going
    Auto,
}

impl FromStr for InteractiveMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "yes" | "true" | "y" | "on" => Ok(InteractiveMode::Yes),
            "no" | "false" | "n" | "off" => Ok(InteractiveMode::No),
            "auto" => Ok(InteractiveMode::Auto),
            other => Err(format!(
                "Invalid interactive mode '{}'. Use yes, no, or auto",
                other
            )),
        }
    }
}

impl fmt::Display for InteractiveMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InteractiveMode::Yes => write!(f, "yes"),
            InteractiveMode::No => write!(f, "no"),
            InteractiveMode::Auto => write!(f, "auto"),
        }
    }
}

/// YAML users write `interactive: true` as often as `interactive: yes`.
fn deserialize_interactive<'de, D>(deserializer: D) -> Result<InteractiveMode, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Bool(bool),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Bool(true) => Ok(InteractiveMode::Yes),
        Raw::Bool(false) => Ok(InteractiveMode::No),
        Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

/// External agent driver command line.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverConfig {
    /// Executable to run once per agent turn
    #[serde(default = "default_driver_command")]
    pub command: String,

    /// Fixed arguments placed before the per-turn flags
    #[serde(default = "default_driver_args")]
    pub args: Vec<String>,

    /// Flag used to pass the model spec (omitted when no model is configured)
    #[serde(default = "default_model_flag")]
    pub model_flag: Option<String>,

    /// Flag used to pass the agent name, if the driver understands one
    #[serde(default)]
    pub agent_flag: Option<String>,
}

fn default_driver_command() -> String {
    "opencode".to_string()
}

fn default_driver_args() -> Vec<String> {
    vec!["run".to_string(), "--format".to_string(), "json".to_string()]
}

fn default_model_flag() -> Option<String> {
    Some("--model".to_string())
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            command: default_driver_command(),
            args: default_driver_args(),
            model_flag: default_model_flag(),
            agent_flag: None,
        }
    }
}

/// Session capture selection: `true` for every agent or an explicit list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CaptureSessions {
    All(bool),
    Agents(Vec<String>),
}

impl Default for CaptureSessions {
    fn default() -> Self {
        CaptureSessions::All(false)
    }
}

impl CaptureSessions {
    pub fn enabled_for(&self, agent: &str) -> bool {
        match self {
            CaptureSessions::All(all) => *all,
            CaptureSessions::Agents(agents) => agents.iter().any(|a| a == agent),
        }
    }
}

impl GoalConfig {
    /// Configured model variants for an agent, in declaration order, deduplicated.
    pub fn models_for(&self, agent: &str) -> Vec<String> {
        let raw = match self.models.get(agent) {
            Some(ModelSpec::One(model)) => vec![model.clone()],
            Some(ModelSpec::Many(models)) => models.clone(),
            None => Vec::new(),
        };

        let mut models: Vec<String> = Vec::with_capacity(raw.len());
        for model in raw {
            let model = model.trim().to_string();
            if !model.is_empty() && !models.contains(&model) {
                models.push(model);
            }
        }
        models
    }

    /// Whether mail addressed to `agent:model` will ever be read. An agent
    /// with at most one model reads every variant address; a multi-model
    /// agent only its configured variants.
    pub fn reads_variant(&self, agent: &str, model: &str) -> bool {
        let models = self.models_for(agent);
        models.len() <= 1 || models.iter().any(|m| m == model)
    }
}

/// Split a document into `(frontmatter, body)`.
///
/// A frontmatter block exists only when the very first line is `---`; it ends
/// at the next line consisting solely of `---`. Returns an error for an
/// unterminated block.
pub fn split_frontmatter(content: &str) -> Result<(Option<&str>, &str), BatonError> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);

    let first_line_end = match content.find('\n') {
        Some(idx) => idx,
        None => content.len(),
    };
    if content[..first_line_end].trim_end() != "---" {
        return Ok((None, content));
    }

    let after_open = (first_line_end + 1).min(content.len());
    let mut offset = after_open;
    for line in content[after_open..].split_inclusive('\n') {
        if line.trim_end() == "---" {
            let frontmatter = &content[after_open..offset];
            let body = &content[offset + line.len()..];
            return Ok((Some(frontmatter), body));
        }
        offset += line.len();
    }

    Err(BatonError::Goal(
        "frontmatter block opened with '---' is never closed".to_string(),
    ))
}

impl GoalDocument {
    /// Parse a goal document from its full text.
    pub fn parse(content: &str) -> Result<Self, BatonError> {
        let (frontmatter, body) = split_frontmatter(content)?;

        let config = match frontmatter {
            Some(fm) if !fm.trim().is_empty() => serde_yaml::from_str::<GoalConfig>(fm)
                .map_err(|e| BatonError::Goal(format!("Failed to parse frontmatter: {}", e)))?,
            _ => GoalConfig::default(),
        };

        Ok(Self {
            config,
            body: body.to_string(),
        })
    }

    /// Load a goal document from a file path.
    pub fn from_file(path: &Path) -> Result<Self, BatonError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            BatonError::Goal(format!(
                "Failed to read goal document '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::parse(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_goal() {
        let doc = GoalDocument::parse("# Just a goal\n").unwrap();
        assert_eq!(doc.body, "# Just a goal\n");
        assert!(doc.config.flow.is_empty());
        assert_eq!(doc.config.interactive, InteractiveMode::Yes);
        assert_eq!(doc.config.driver.command, "opencode");
    }

    #[test]
    fn test_parse_full_goal() {
        let content = r#"---
flow: |
  "coordinator" -> "developer"
models:
  coordinator: "anthropic/claude-sonnet-4"
  developer:
    - "anthropic/claude-sonnet-4"
    - "openai/gpt-5"
    - "openai/gpt-5"
completionGateScript: "cargo test"
interactive: auto
driver:
  command: "claude"
  args: ["-p", "--output-format", "stream-json"]
  modelFlag: "--model"
captureSessions: [developer]
---
Build a todo app.
"#;
        let doc = GoalDocument::parse(content).unwrap();
        assert!(doc.config.flow.contains("\"coordinator\" -> \"developer\""));
        assert_eq!(doc.config.models_for("coordinator"), vec!["anthropic/claude-sonnet-4"]);
        assert_eq!(
            doc.config.models_for("developer"),
            vec!["anthropic/claude-sonnet-4", "openai/gpt-5"]
        );
        assert!(doc.config.models_for("reviewer").is_empty());
        assert_eq!(doc.config.completion_gate_script.as_deref(), Some("cargo test"));
        assert_eq!(doc.config.interactive, InteractiveMode::Auto);
        assert_eq!(doc.config.driver.command, "claude");
        assert!(doc.config.capture_sessions.enabled_for("developer"));
        assert!(!doc.config.capture_sessions.enabled_for("coordinator"));
        assert_eq!(doc.body, "Build a todo app.\n");
    }

    #[test]
    fn test_interactive_accepts_booleans() {
        let doc = GoalDocument::parse("---\ninteractive: false\n---\nbody").unwrap();
        assert_eq!(doc.config.interactive, InteractiveMode::No);

        let err = GoalDocument::parse("---\ninteractive: sometimes\n---\nbody");
        assert!(err.is_err());
    }

    #[test]
    fn test_split_frontmatter_edge_cases() {
        let (fm, body) = split_frontmatter("no frontmatter\n---\nstill body").unwrap();
        assert!(fm.is_none());
        assert_eq!(body, "no frontmatter\n---\nstill body");

        let (fm, body) = split_frontmatter("---\na: 1\n---\n").unwrap();
        assert_eq!(fm, Some("a: 1\n"));
        assert_eq!(body, "");

        assert!(split_frontmatter("---\na: 1\n").is_err());
    }
}
