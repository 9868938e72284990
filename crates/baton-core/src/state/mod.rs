//! Workflow state record: the single persisted source of truth per project.
//!
//! Every component reads and writes this value; only [`store::StateStore`]
//! touches the file. Field names serialize in camelCase so the dashboard and
//! the status CLI can read the JSON directly.

pub mod mailbox;
pub mod store;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use store::{can_resume, goal_checksum, StateStore};

/// Overall workflow status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum WorkflowStatus {
    #[default]
    Working,
    AgentDone,
    WaitingForHuman,
    Complete,
}

impl WorkflowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStatus::Working => "working",
            WorkflowStatus::AgentDone => "agent-done",
            WorkflowStatus::WaitingForHuman => "waiting-for-human",
            WorkflowStatus::Complete => "complete",
        }
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "working" => Ok(WorkflowStatus::Working),
            "agent-done" | "done" => Ok(WorkflowStatus::AgentDone),
            "waiting-for-human" => Ok(WorkflowStatus::WaitingForHuman),
            "complete" => Ok(WorkflowStatus::Complete),
            other => Err(format!("Invalid status: {}", other)),
        }
    }
}

/// Status of one model variant of a multi-model agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelStatus {
    ModelWorking,
    ModelDone,
    ModelError,
}

impl ModelStatus {
    pub fn is_settled(&self) -> bool {
        matches!(self, ModelStatus::ModelDone | ModelStatus::ModelError)
    }
}

/// An addressed inter-agent note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: u64,
    pub from_agent: String,
    /// `agent` or `agent:model` for a specific model variant
    pub to_agent: String,
    pub body: String,
    #[serde(default)]
    pub read: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_by: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl TodoStatus {
    /// Still counts as outstanding work.
    pub fn is_open(&self) -> bool {
        matches!(self, TodoStatus::Pending | TodoStatus::InProgress)
    }
}

impl FromStr for TodoStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "pending" => Ok(TodoStatus::Pending),
            "in_progress" => Ok(TodoStatus::InProgress),
            "completed" | "done" => Ok(TodoStatus::Completed),
            "cancelled" | "canceled" => Ok(TodoStatus::Cancelled),
            other => Err(format!(
                "Invalid todo status: {}. Use pending, in_progress, completed, or cancelled",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TodoPriority {
    High,
    #[default]
    Medium,
    Low,
}

impl FromStr for TodoPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "high" => Ok(TodoPriority::High),
            "medium" => Ok(TodoPriority::Medium),
            "low" => Ok(TodoPriority::Low),
            other => Err(format!("Invalid priority: {}. Use high, medium, or low", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Todo {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub status: TodoStatus,
    #[serde(default)]
    pub priority: TodoPriority,
}

/// One line of the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEntry {
    pub timestamp: DateTime<Utc>,
    pub agent: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequenceEntry {
    pub agent: String,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub is_current: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    #[serde(default)]
    pub input: u64,
    #[serde(default)]
    pub output: u64,
    #[serde(default)]
    pub reasoning: u64,
    #[serde(default)]
    pub cache_read: u64,
    #[serde(default)]
    pub cache_write: u64,
}

impl TokenUsage {
    pub fn add(&mut self, other: &TokenUsage) {
        self.input += other.input;
        self.output += other.output;
        self.reasoning += other.reasoning;
        self.cache_read += other.cache_read;
        self.cache_write += other.cache_write;
    }

    pub fn total(&self) -> u64 {
        self.input + self.output + self.reasoning + self.cache_read + self.cache_write
    }
}

/// Cost reported at a driver step boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepCost {
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub cost: f64,
    #[serde(default)]
    pub tokens: TokenUsage,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentCost {
    #[serde(default)]
    pub cost: f64,
    #[serde(default)]
    pub tokens: TokenUsage,
    #[serde(default)]
    pub steps: Vec<StepCost>,
}

/// Monotonically increasing cost ledger.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostLedger {
    #[serde(default)]
    pub total_cost: f64,
    #[serde(default)]
    pub tokens: TokenUsage,
    #[serde(default)]
    pub agents: BTreeMap<String, AgentCost>,
}

impl CostLedger {
    /// Fold one step into the ledger. Negative costs are clamped to zero.
    pub fn record(&mut self, agent: &str, step: StepCost) {
        let cost = step.cost.max(0.0);
        self.total_cost += cost;
        self.tokens.add(&step.tokens);

        let entry = self.agents.entry(agent.to_string()).or_default();
        entry.cost += cost;
        entry.tokens.add(&step.tokens);
        entry.steps.push(StepCost { cost, ..step });
    }
}

/// A multiple-choice option, written either as a bare label or with a description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChoiceOption {
    Label(String),
    Detailed {
        label: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
}

impl ChoiceOption {
    pub fn label(&self) -> &str {
        match self {
            ChoiceOption::Label(label) => label,
            ChoiceOption::Detailed { label, .. } => label,
        }
    }

    pub fn description(&self) -> Option<&str> {
        match self {
            ChoiceOption::Label(_) => None,
            ChoiceOption::Detailed { description, .. } => description.as_deref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChoiceQuestion {
    pub question: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<String>,
    pub options: Vec<ChoiceOption>,
    #[serde(default)]
    pub multi_select: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiChoiceQuestion {
    pub questions: Vec<ChoiceQuestion>,
}

/// The persisted workflow state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowState {
    #[serde(default)]
    pub status: WorkflowStatus,
    #[serde(default)]
    pub current_agent: Option<String>,
    #[serde(default)]
    pub current_model: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub model_statuses: BTreeMap<String, ModelStatus>,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default = "default_next_message_id")]
    pub next_message_id: u64,
    #[serde(default)]
    pub todos: BTreeMap<String, Vec<Todo>>,
    #[serde(default)]
    pub project_todos: Vec<Todo>,
    #[serde(default)]
    pub progress: Vec<ProgressEntry>,
    #[serde(default)]
    pub agent_sequence: Vec<SequenceEntry>,
    #[serde(default)]
    pub visit_counts: BTreeMap<String, u64>,
    #[serde(default)]
    pub goal_checksum: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multi_choice_question: Option<MultiChoiceQuestion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub human_message: Option<String>,
    #[serde(default)]
    pub work_gate_approved: bool,
    /// Set by the engine once a `complete` declaration passed its checks.
    /// An agent writing `complete` alone does not finish the run.
    #[serde(default)]
    pub completion_confirmed: bool,
    #[serde(default)]
    pub cost: CostLedger,
    #[serde(default)]
    pub run_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_next_message_id() -> u64 {
    1
}

/// Address of one model variant of an agent.
pub fn variant_key(agent: &str, model: &str) -> String {
    format!("{}:{}", agent, model)
}

/// Split an address into the agent name and the optional model variant.
///
/// Model specs may themselves contain ':' (`ollama:llama3`), so only the
/// first ':' separates the agent.
pub fn split_address(address: &str) -> (&str, Option<&str>) {
    match address.split_once(':') {
        Some((agent, model)) if !model.is_empty() => (agent, Some(model)),
        Some((agent, _)) => (agent, None),
        None => (address, None),
    }
}

impl WorkflowState {
    /// Fresh state: working, bound to the given goal checksum.
    pub fn new(goal_checksum: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            status: WorkflowStatus::Working,
            current_agent: None,
            current_model: None,
            model_statuses: BTreeMap::new(),
            messages: Vec::new(),
            next_message_id: default_next_message_id(),
            todos: BTreeMap::new(),
            project_todos: Vec::new(),
            progress: Vec::new(),
            agent_sequence: Vec::new(),
            visit_counts: BTreeMap::new(),
            goal_checksum: goal_checksum.into(),
            multi_choice_question: None,
            human_message: None,
            work_gate_approved: false,
            completion_confirmed: false,
            cost: CostLedger::default(),
            run_id: now.format("%Y%m%d-%H%M%S-%3f").to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Make sure every known agent has a visit count, so messages can target
    /// agents that have not run yet.
    pub fn seed_visit_counts<I, S>(&mut self, agents: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for agent in agents {
            self.visit_counts
                .entry(agent.as_ref().to_string())
                .or_insert(0);
        }
    }

    /// Completed and confirmed by the engine; nothing left to resume.
    pub fn is_finished(&self) -> bool {
        self.status == WorkflowStatus::Complete && self.completion_confirmed
    }

    pub fn is_known_agent(&self, agent: &str) -> bool {
        self.visit_counts.contains_key(agent)
    }

    /// Hand control to `agent`: bump its visit count and update the sequence.
    /// A consecutive visit to the same agent extends the current entry.
    pub fn enter_agent(&mut self, agent: &str) {
        *self.visit_counts.entry(agent.to_string()).or_insert(0) += 1;
        self.current_agent = Some(agent.to_string());

        let extends_current = self
            .agent_sequence
            .last()
            .map(|entry| entry.is_current && entry.agent == agent)
            .unwrap_or(false);
        if extends_current {
            return;
        }

        for entry in self.agent_sequence.iter_mut() {
            entry.is_current = false;
        }
        self.agent_sequence.push(SequenceEntry {
            agent: agent.to_string(),
            start_time: Utc::now(),
            is_current: true,
        });
    }

    pub fn record_progress(&mut self, agent: &str, description: impl Into<String>) {
        self.progress.push(ProgressEntry {
            timestamp: Utc::now(),
            agent: agent.to_string(),
            description: description.into(),
        });
    }

    /// Suspend for a human answer.
    pub fn request_human(&mut self, message: impl Into<String>, question: Option<MultiChoiceQuestion>) {
        self.status = WorkflowStatus::WaitingForHuman;
        self.human_message = Some(message.into());
        self.multi_choice_question = question;
    }

    pub fn clear_human_request(&mut self) {
        self.human_message = None;
        self.multi_choice_question = None;
    }

    /// Open todos for one agent.
    pub fn pending_todos(&self, agent: &str) -> usize {
        self.todos
            .get(agent)
            .map(|todos| todos.iter().filter(|t| t.status.is_open()).count())
            .unwrap_or(0)
    }

    pub fn pending_project_todos(&self) -> Vec<&Todo> {
        self.project_todos
            .iter()
            .filter(|t| t.status.is_open())
            .collect()
    }

    /// Add a todo to an agent's list, or to the project list when `agent` is `None`.
    pub fn add_todo(
        &mut self,
        agent: Option<&str>,
        content: impl Into<String>,
        priority: TodoPriority,
    ) -> String {
        let list = match agent {
            Some(agent) => self.todos.entry(agent.to_string()).or_default(),
            None => &mut self.project_todos,
        };
        let prefix = if agent.is_some() { "t" } else { "p" };
        let next = list
            .iter()
            .filter_map(|t| t.id.strip_prefix(prefix).and_then(|n| n.parse::<u64>().ok()))
            .max()
            .unwrap_or(0)
            + 1;
        let id = format!("{}{}", prefix, next);
        list.push(Todo {
            id: id.clone(),
            content: content.into(),
            status: TodoStatus::Pending,
            priority,
        });
        id
    }

    /// Update a todo's status. Returns false when no such todo exists.
    pub fn update_todo(&mut self, agent: Option<&str>, id: &str, status: TodoStatus) -> bool {
        let list = match agent {
            Some(agent) => match self.todos.get_mut(agent) {
                Some(list) => list,
                None => return false,
            },
            None => &mut self.project_todos,
        };
        match list.iter_mut().find(|t| t.id == id) {
            Some(todo) => {
                todo.status = status;
                true
            }
            None => false,
        }
    }

    /// Model statuses belonging to one agent, keyed by model spec.
    pub fn model_statuses_for(&self, agent: &str) -> BTreeMap<String, ModelStatus> {
        self.model_statuses
            .iter()
            .filter_map(|(key, status)| match split_address(key) {
                (a, Some(model)) if a == agent => Some((model.to_string(), *status)),
                _ => None,
            })
            .collect()
    }

    pub fn clear_model_statuses(&mut self, agent: &str) {
        self.model_statuses
            .retain(|key, _| split_address(key).0 != agent);
    }
}
