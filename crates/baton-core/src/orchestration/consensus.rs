//! Multi-model consensus: run every configured model variant of an agent until
//! all of them settle with no mail left for any of them.

use std::collections::BTreeMap;

use super::{Disposition, Engine};
use crate::error::BatonError;
use crate::state::{variant_key, ModelStatus, WorkflowState, WorkflowStatus};

impl Engine {
    /// Run `agent` to a disposition, through the consensus loop when it has
    /// more than one model configured.
    pub(crate) async fn run_agent(
        &mut self,
        state: &mut WorkflowState,
        agent: &str,
    ) -> Result<Disposition, BatonError> {
        self.reload_goal();
        let models = self.goal.config.models_for(agent);
        if models.len() <= 1 {
            state.clear_model_statuses(agent);
            let disposition = self
                .iterate(state, agent, models.first().map(String::as_str), &[])
                .await?;
            return Ok(match disposition {
                // single-model failure already left the status at agent-done
                Disposition::Failed => Disposition::Done,
                other => other,
            });
        }

        let mut pass = 0u32;
        loop {
            if self.cancel.is_cancelled() {
                return Ok(Disposition::Interrupted);
            }
            pass += 1;
            if pass > 1 {
                self.reload_goal();
            }

            let models = self.goal.config.models_for(agent);
            if models.len() <= 1 {
                tracing::info!("[Consensus:{}] Reconfigured to a single model", agent);
                state.clear_model_statuses(agent);
                return self
                    .iterate(state, agent, models.first().map(String::as_str), &[])
                    .await;
            }

            reconcile_statuses(state, agent, &models);

            // bare-agent mail goes to every variant of this pass
            let broadcast = state.take_unread(&[agent.to_string()], agent);
            state.status = WorkflowStatus::Working;
            self.save(state)?;

            let working: Vec<String> = models
                .iter()
                .filter(|m| {
                    state.model_statuses.get(&variant_key(agent, m)) == Some(&ModelStatus::ModelWorking)
                })
                .cloned()
                .collect();
            tracing::info!(
                "[Consensus:{}] Pass {}: {} of {} variants working",
                agent,
                pass,
                working.len(),
                models.len()
            );

            for model in &working {
                if self.cancel.is_cancelled() {
                    return Ok(Disposition::Interrupted);
                }
                let key = variant_key(agent, model);
                let disposition = self.iterate(state, agent, Some(model.as_str()), &broadcast).await?;
                match disposition {
                    Disposition::Done => {
                        state.model_statuses.insert(key, ModelStatus::ModelDone);
                    }
                    Disposition::Failed => {
                        tracing::warn!("[Consensus:{}] Variant {} errored", agent, model);
                        state.model_statuses.insert(key, ModelStatus::ModelError);
                    }
                    Disposition::Complete | Disposition::Interrupted | Disposition::Yielded => {
                        state.current_model = None;
                        self.save(state)?;
                        return Ok(disposition);
                    }
                }
                state.status = WorkflowStatus::Working;
                state.current_model = None;
                self.save(state)?;
            }

            if has_consensus(state, agent, &models) {
                tracing::info!("[Consensus:{}] Reached after {} pass(es)", agent, pass);
                state.clear_model_statuses(agent);
                state.current_model = None;
                state.status = WorkflowStatus::AgentDone;
                state.record_progress(
                    agent,
                    format!("Consensus reached across {} models", models.len()),
                );
                self.save(state)?;
                return Ok(Disposition::Done);
            }
        }
    }
}

/// Bring the status map in line with the configured models: new variants
/// start working, removed ones are pruned, and settled variants with unread
/// mail are reopened.
pub(crate) fn reconcile_statuses(state: &mut WorkflowState, agent: &str, models: &[String]) {
    let current: BTreeMap<String, ModelStatus> = state.model_statuses_for(agent);

    for model in current.keys() {
        if !models.contains(model) {
            tracing::info!("[Consensus:{}] Dropping removed variant {}", agent, model);
            state.model_statuses.remove(&variant_key(agent, model));
        }
    }

    for model in models {
        let key = variant_key(agent, model);
        let has_mail = !state.unread_for_variant(agent, Some(model.as_str())).is_empty();
        match current.get(model) {
            None => {
                state.model_statuses.insert(key, ModelStatus::ModelWorking);
            }
            Some(status) if status.is_settled() && has_mail => {
                tracing::info!("[Consensus:{}] Reopening {} for new mail", agent, model);
                state.model_statuses.insert(key, ModelStatus::ModelWorking);
            }
            Some(_) => {}
        }
    }
}

/// Every variant settled and no unread mail targets any of them.
pub(crate) fn has_consensus(state: &WorkflowState, agent: &str, models: &[String]) -> bool {
    models.iter().all(|model| {
        let settled = state
            .model_statuses
            .get(&variant_key(agent, model))
            .map(ModelStatus::is_settled)
            .unwrap_or(false);
        settled && state.unread_for_variant(agent, Some(model.as_str())).is_empty()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn models(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_reconcile_adds_prunes_and_reopens() {
        let mut state = WorkflowState::new("sum");
        state.seed_visit_counts(["reviewer"]);
        state.model_statuses.insert(variant_key("reviewer", "a"), ModelStatus::ModelDone);
        state.model_statuses.insert(variant_key("reviewer", "gone"), ModelStatus::ModelWorking);

        state.post_message("developer", "reviewer:a", "one more thing");
        reconcile_statuses(&mut state, "reviewer", &models(&["a", "b"]));

        let statuses = state.model_statuses_for("reviewer");
        assert_eq!(statuses.len(), 2);
        assert_eq!(statuses["a"], ModelStatus::ModelWorking);
        assert_eq!(statuses["b"], ModelStatus::ModelWorking);
    }

    #[test]
    fn test_no_consensus_while_working_or_mail_pending() {
        let mut state = WorkflowState::new("sum");
        let ms = models(&["a", "b"]);
        state.model_statuses.insert(variant_key("dev", "a"), ModelStatus::ModelDone);
        state.model_statuses.insert(variant_key("dev", "b"), ModelStatus::ModelWorking);
        assert!(!has_consensus(&state, "dev", &ms));

        state.model_statuses.insert(variant_key("dev", "b"), ModelStatus::ModelError);
        assert!(has_consensus(&state, "dev", &ms));

        let id = state.post_message("dev:a", "dev", "did you see this?");
        assert!(!has_consensus(&state, "dev", &ms));
        state.mark_read(id, "dev").unwrap();
        assert!(has_consensus(&state, "dev", &ms));
    }
}
