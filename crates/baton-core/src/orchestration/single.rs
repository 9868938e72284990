//! Single-model iteration: drive one agent (or one model variant) until it
//! reaches a terminal disposition.

use super::prompt::{compose_prompt, PromptContext};
use super::{Disposition, Engine};
use crate::capture::SessionRecord;
use crate::driver::{TurnRequest, TurnResult};
use crate::error::BatonError;
use crate::gate::{apply_gate_result, run_completion_gate, GateOutcome};
use crate::state::mailbox::ENVIRONMENT;
use crate::state::{variant_key, Message, WorkflowState, WorkflowStatus};
use crate::workflow::flow::COORDINATOR;

impl Engine {
    /// Loop turns for `agent` (optionally pinned to `model`) until it is done,
    /// fails, yields, completes, or the run is cancelled. `seed` messages are
    /// delivered with the first composed prompt.
    pub(crate) async fn iterate(
        &mut self,
        state: &mut WorkflowState,
        agent: &str,
        model: Option<&str>,
        seed: &[Message],
    ) -> Result<Disposition, BatonError> {
        let reader = match model {
            Some(model) => variant_key(agent, model),
            None => agent.to_string(),
        };
        let mut seed = seed.to_vec();

        loop {
            if self.cancel.is_cancelled() {
                return Ok(Disposition::Interrupted);
            }

            if state.status == WorkflowStatus::WaitingForHuman {
                let mode = self.interaction_mode();
                let outcome = self.human_gate().resolve(state, mode, &self.cancel).await?;
                *state = self.store.load_with_retry_async().await?.0;
                self.absorb_approval(state);
                match outcome {
                    GateOutcome::Answered(text) => self.pending_response = Some(text),
                    GateOutcome::Resumed => {}
                    GateOutcome::Interrupted => return Ok(Disposition::Interrupted),
                }
            }

            state.status = WorkflowStatus::Working;
            state.current_agent = Some(agent.to_string());
            state.current_model = model.map(str::to_string);

            let prompt = match self.pending_response.take() {
                Some(response) => response,
                None => {
                    // in a consensus pass, bare-agent mail arrives through `seed`
                    let mut messages = std::mem::take(&mut seed);
                    if model.is_some() && self.multi_model_count(agent) > 1 {
                        messages.extend(state.take_unread(&[reader.clone()], &reader));
                    } else {
                        messages.extend(state.take_unread_for_agent(agent, &reader));
                    }
                    messages.sort_by_key(|m| m.id);

                    compose_prompt(&PromptContext {
                        agent,
                        model,
                        graph: &self.graph,
                        goal: &self.goal.body,
                        state,
                        messages: &messages,
                    })
                }
            };

            // checkpoint before the process runs
            self.save(state)?;

            if self.cancel.is_cancelled() {
                return Ok(Disposition::Interrupted);
            }

            let last_message_before = state.last_message_id();
            let request = TurnRequest {
                agent: agent.to_string(),
                model: model.map(str::to_string),
                prompt,
                project_dir: self.store.project_dir().to_path_buf(),
            };

            let turn = match self.driver.run_turn(&request, &self.cancel).await {
                Ok(turn) => turn,
                Err(e) => {
                    tracing::error!("[Engine:{}] {}", reader, e);
                    TurnResult {
                        output_tail: vec![e.to_string()],
                        ..Default::default()
                    }
                }
            };

            // the agent's tool calls wrote the file while it ran
            *state = self.store.load_with_retry_async().await?.0;
            for step in &turn.steps {
                state.cost.record(agent, step.clone());
            }
            self.absorb_approval(state);

            if turn.cancelled {
                self.save(state)?;
                return Ok(Disposition::Interrupted);
            }
            self.capture_turn(state, agent, model, &turn).await;

            if turn.failed() {
                tracing::error!(
                    "[Engine:{}] Driver failed (exit code {:?}). Last output:\n{}",
                    reader,
                    turn.exit_code,
                    turn.output_tail.join("\n")
                );
                state.status = WorkflowStatus::AgentDone;
                state.record_progress(
                    ENVIRONMENT,
                    format!("{} driver failed with exit code {:?}", reader, turn.exit_code),
                );
                self.save(state)?;
                return Ok(Disposition::Failed);
            }

            match state.status {
                WorkflowStatus::Complete => {
                    if let Some(disposition) = self.handle_complete(state, agent).await? {
                        return Ok(disposition);
                    }
                }
                WorkflowStatus::WaitingForHuman => {
                    self.save(state)?;
                }
                WorkflowStatus::AgentDone => {
                    tracing::info!("[Engine:{}] Done", reader);
                    self.save(state)?;
                    return Ok(Disposition::Done);
                }
                WorkflowStatus::Working => {
                    self.save(state)?;
                    let sent = state.unread_sent_since(agent, last_message_before);
                    if !sent.is_empty() {
                        tracing::info!(
                            "[Engine:{}] Yielding after sending {} message(s)",
                            reader,
                            sent.len()
                        );
                        return Ok(Disposition::Yielded);
                    }
                    tracing::debug!("[Engine:{}] Still working; running another turn", reader);
                }
            }
        }
    }

    /// Handle an agent declaring `complete`. `None` means keep iterating.
    pub(super) async fn handle_complete(
        &mut self,
        state: &mut WorkflowState,
        agent: &str,
    ) -> Result<Option<Disposition>, BatonError> {
        if agent != COORDINATOR {
            tracing::warn!("[Engine:{}] Rejected complete: only the coordinator may complete", agent);
            state.status = WorkflowStatus::AgentDone;
            state.record_progress(
                ENVIRONMENT,
                format!(
                    "Rejected workflow completion from {}: only the coordinator can complete the workflow",
                    agent
                ),
            );
            self.save(state)?;
            return Ok(Some(Disposition::Done));
        }

        let open: Vec<String> = state
            .pending_project_todos()
            .iter()
            .map(|t| format!("- [{}] {}", t.id, t.content))
            .collect();
        if !open.is_empty() {
            tracing::info!("[Engine] Completion blocked by {} open project todo(s)", open.len());
            state.status = WorkflowStatus::Working;
            state.post_message(
                ENVIRONMENT,
                COORDINATOR,
                format!(
                    "Completion blocked: {} project todo(s) are still open.\n{}\n\
                     Finish or cancel them before completing.",
                    open.len(),
                    open.join("\n")
                ),
            );
            self.save(state)?;
            return Ok(None);
        }

        if let Some(script) = self.goal.config.completion_gate_script.clone() {
            let result = run_completion_gate(&script, self.store.project_dir()).await;
            apply_gate_result(state, &script, &result);
            if state.status != WorkflowStatus::Complete {
                self.save(state)?;
                return Ok(None);
            }
        }

        state.current_model = None;
        state.completion_confirmed = true;
        self.save(state)?;
        Ok(Some(Disposition::Complete))
    }

    async fn capture_turn(
        &self,
        state: &WorkflowState,
        agent: &str,
        model: Option<&str>,
        turn: &TurnResult,
    ) {
        if !self.goal.config.capture_sessions.enabled_for(agent) {
            return;
        }
        if let Some(capture) = &self.capture {
            let visit = state.visit_counts.get(agent).copied().unwrap_or(0);
            capture
                .append_safe(&SessionRecord::from_turn(agent, model, visit, turn))
                .await;
        }
    }

    fn multi_model_count(&self, agent: &str) -> usize {
        self.goal.config.models_for(agent).len()
    }
}
