//! Orchestration engine: the resumable control loop for one project.
//!
//! # Architecture
//!
//! ```text
//! Engine::run
//!   ├── load goal + flow graph, load/resume state
//!   └── loop
//!         ├── run_agent (consensus.rs)
//!         │     └── iterate (single.rs) ── AgentDriver ── external process
//!         │                                      │
//!         │              agent's `baton` calls ──┴──► .baton/state.json
//!         └── select_next (workflow::transition)
//! ```
//!
//! The engine is the only long-lived writer of the state file. External
//! writers (the agent's CLI calls, `baton respond`) go through
//! [`StateStore::update`]; the engine re-reads the file after every turn.

mod consensus;
pub mod prompt;
mod single;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::capture::SessionCapture;
use crate::driver::{AgentDriver, ProcessDriver};
use crate::error::BatonError;
use crate::gate::{HumanGate, HumanPrompter, RemoteOnly};
use crate::state::{can_resume, goal_checksum, StateStore, WorkflowState, WorkflowStatus};
use crate::workflow::{select_next, FlowGraph, GoalDocument, InteractiveMode, Transition};

/// Default goal document name inside the project directory.
pub const GOAL_FILE: &str = "GOAL.md";

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The coordinator completed and the completion gate passed
    Completed,
    /// Cancelled; the state is left resumable
    Interrupted,
    /// A terminal node was reached with nowhere to hand back to
    TerminalReached,
}

/// What one agent turn sequence ended with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Disposition {
    /// Status `agent-done`
    Done,
    /// The external process failed
    Failed,
    /// Still working but sent mail; let the recipient run
    Yielded,
    Complete,
    Interrupted,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub project_dir: PathBuf,
    /// Defaults to `<project>/GOAL.md`
    pub goal_path: Option<PathBuf>,
    /// Discard any resumable state
    pub fresh: bool,
    /// Overrides the goal document's `interactive` setting
    pub interactive: Option<InteractiveMode>,
}

impl EngineConfig {
    pub fn new(project_dir: impl AsRef<Path>) -> Self {
        Self {
            project_dir: project_dir.as_ref().to_path_buf(),
            goal_path: None,
            fresh: false,
            interactive: None,
        }
    }

    pub fn goal_path(&self) -> PathBuf {
        self.goal_path
            .clone()
            .unwrap_or_else(|| self.project_dir.join(GOAL_FILE))
    }
}

pub struct Engine {
    config: EngineConfig,
    store: StateStore,
    goal: GoalDocument,
    goal_text: String,
    graph: FlowGraph,
    driver: Arc<dyn AgentDriver>,
    prompter: Arc<dyn HumanPrompter>,
    cancel: CancellationToken,
    /// Human response to use as the next turn's input (consumed once)
    pending_response: Option<String>,
    /// Set once the work gate is approved; forces `auto` for the rest of the run
    forced_auto: bool,
    capture: Option<SessionCapture>,
}

impl Engine {
    /// Load the goal document and parse the flow. Driver defaults to the
    /// subprocess driver described by the goal's `driver` section.
    pub fn new(config: EngineConfig, cancel: CancellationToken) -> Result<Self, BatonError> {
        let goal_path = config.goal_path();
        let goal_text = std::fs::read_to_string(&goal_path).map_err(|e| {
            BatonError::Goal(format!("Failed to read '{}': {}", goal_path.display(), e))
        })?;
        let goal = GoalDocument::parse(&goal_text)?;
        let graph = FlowGraph::parse(&goal.config.flow)?;
        let driver: Arc<dyn AgentDriver> =
            Arc::new(ProcessDriver::new(goal.config.driver.clone()));

        Ok(Self {
            store: StateStore::new(&config.project_dir),
            config,
            goal,
            goal_text,
            graph,
            driver,
            prompter: Arc::new(RemoteOnly),
            cancel,
            pending_response: None,
            forced_auto: false,
            capture: None,
        })
    }

    pub fn with_driver(mut self, driver: Arc<dyn AgentDriver>) -> Self {
        self.driver = driver;
        self
    }

    pub fn with_prompter(mut self, prompter: Arc<dyn HumanPrompter>) -> Self {
        self.prompter = prompter;
        self
    }

    pub fn graph(&self) -> &FlowGraph {
        &self.graph
    }

    pub fn goal(&self) -> &GoalDocument {
        &self.goal
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Effective interaction mode for the next human gate.
    fn interaction_mode(&self) -> InteractiveMode {
        if self.forced_auto {
            return InteractiveMode::Auto;
        }
        self.config.interactive.unwrap_or(self.goal.config.interactive)
    }

    fn human_gate(&self) -> HumanGate {
        HumanGate::new(
            self.store.clone(),
            self.prompter.clone(),
            self.goal.config.notify_command.clone(),
            self.goal.config.editor.clone(),
        )
    }

    /// Re-read the goal document so model changes apply mid-run. The flow
    /// graph stays as parsed at start; a broken document keeps the old config.
    fn reload_goal(&mut self) {
        let path = self.config.goal_path();
        match std::fs::read_to_string(&path)
            .map_err(|e| BatonError::Goal(e.to_string()))
            .and_then(|text| GoalDocument::parse(&text))
        {
            Ok(goal) => self.goal = goal,
            Err(e) => tracing::warn!("[Engine] Keeping previous goal config: {}", e),
        }
    }

    /// Consume a pending work-gate approval.
    fn absorb_approval(&mut self, state: &mut WorkflowState) {
        if state.work_gate_approved {
            state.work_gate_approved = false;
            if !self.forced_auto {
                tracing::info!("[Engine] Work gate approved; switching to auto mode");
            }
            self.forced_auto = true;
        }
    }

    fn save(&self, state: &mut WorkflowState) -> Result<(), BatonError> {
        self.store.save(state)
    }

    /// Load a resumable state or start a fresh one.
    async fn prepare_state(&mut self) -> Result<(WorkflowState, bool), BatonError> {
        let checksum = goal_checksum(&self.goal_text)?;
        let (existing, found) = self.store.load_with_retry_async().await?;

        let resumed = found && can_resume(&existing, self.config.fresh, &checksum);
        let mut state = if resumed {
            tracing::info!(
                "[Engine] Resuming run {} ({}, agent: {})",
                existing.run_id,
                existing.status,
                existing.current_agent.as_deref().unwrap_or("-")
            );
            // answered while no engine was running
            if existing.status != WorkflowStatus::WaitingForHuman {
                self.pending_response = self.store.take_response()?;
            }
            existing
        } else {
            if found {
                let reason = if self.config.fresh {
                    "fresh start requested"
                } else if existing.goal_checksum != checksum {
                    "goal changed"
                } else {
                    "previous run finished"
                };
                tracing::info!("[Engine] Starting new run ({})", reason);
                if self.config.fresh {
                    self.store.discard()?;
                }
            }
            // a stale artifact must not answer a question of the new run
            self.store.take_response()?;
            let mut state = WorkflowState::new(checksum);
            let previous = found.then_some(existing.run_id.as_str());
            state.run_id = self.store.unique_run_id(&state.run_id, previous);
            state
        };

        state.seed_visit_counts(self.graph.all_agents());
        self.save(&mut state)?;
        Ok((state, resumed))
    }

    /// Run until the workflow completes, a terminal node is reached, or the
    /// cancellation token fires.
    pub async fn run(&mut self) -> Result<RunOutcome, BatonError> {
        let (mut state, resumed) = self.prepare_state().await?;

        let capture = SessionCapture::new(self.store.run_dir(&state.run_id));
        if self
            .graph
            .all_agents()
            .iter()
            .any(|a| self.goal.config.capture_sessions.enabled_for(a))
        {
            capture.snapshot_goal_safe(&self.goal_text).await;
        }
        self.capture = Some(capture);

        let resume_agent = state
            .current_agent
            .clone()
            .filter(|agent| resumed && self.graph.contains(agent));

        let (mut current, mut entering) = match resume_agent {
            Some(agent) if state.status == WorkflowStatus::Complete => {
                tracing::info!("[Engine] Re-checking unconfirmed completion from {}", agent);
                match self.handle_complete(&mut state, &agent).await? {
                    Some(Disposition::Complete) => return Ok(RunOutcome::Completed),
                    Some(_) => match self.next_agent(&state, &agent)? {
                        Some(next) => (next, true),
                        None => return Ok(RunOutcome::TerminalReached),
                    },
                    None => (agent, false),
                }
            }
            Some(agent) if state.status == WorkflowStatus::AgentDone => {
                match self.next_agent(&state, &agent)? {
                    Some(next) => (next, true),
                    None => return Ok(RunOutcome::TerminalReached),
                }
            }
            Some(agent) => (agent, false),
            None => (self.graph.start_node(), true),
        };

        tracing::info!(
            "[Engine] Flow: {} agents, starting at {}",
            self.graph.all_agents().len(),
            current
        );

        loop {
            if self.cancel.is_cancelled() {
                self.save(&mut state)?;
                return Ok(RunOutcome::Interrupted);
            }

            if entering {
                state.enter_agent(&current);
                state.status = WorkflowStatus::Working;
                state.current_model = None;
                self.save(&mut state)?;
                tracing::info!(
                    "[Engine] -> {} (visit {})",
                    current,
                    state.visit_counts.get(&current).copied().unwrap_or(0)
                );
            }
            entering = true;

            match self.run_agent(&mut state, &current).await? {
                Disposition::Complete => {
                    tracing::info!(
                        "[Engine] Workflow complete (total cost ${:.4})",
                        state.cost.total_cost
                    );
                    return Ok(RunOutcome::Completed);
                }
                Disposition::Interrupted => {
                    self.save(&mut state)?;
                    return Ok(RunOutcome::Interrupted);
                }
                Disposition::Done | Disposition::Failed | Disposition::Yielded => {
                    match self.next_agent(&state, &current)? {
                        Some(next) => current = next,
                        None => {
                            self.save(&mut state)?;
                            tracing::info!("[Engine] Terminal node {} reached", current);
                            return Ok(RunOutcome::TerminalReached);
                        }
                    }
                }
            }
        }
    }

    fn next_agent(&self, state: &WorkflowState, current: &str) -> Result<Option<String>, BatonError> {
        let transition = select_next(&self.graph, &self.goal.config, state, current)?;
        match &transition {
            Transition::Redirect { agent, message_id } => tracing::info!(
                "[Engine] {} -> {} (pending message #{})",
                current,
                agent,
                message_id
            ),
            Transition::Advance(agent) => tracing::debug!("[Engine] {} -> {}", current, agent),
            Transition::HandBack(agent) => {
                tracing::info!("[Engine] {} is terminal; handing back to {}", current, agent)
            }
            Transition::Terminal => {}
        }
        Ok(transition.target().map(str::to_string))
    }
}
