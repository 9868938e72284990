//! Human-interaction gate.
//!
//! An agent suspends the workflow by setting `waiting-for-human` together with
//! `humanMessage` and optionally a `multiChoiceQuestion`. Answers arrive
//! through one handshake regardless of where they come from:
//!
//! 1. the responder writes `.baton/response.txt` atomically,
//! 2. then flips the status back to `working` ([`submit_response`]),
//! 3. the engine, polling every 500 ms, sees the status change and consumes
//!    the artifact exactly once ([`wait_for_response`]).

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use super::prompter::{resolve_editor, HumanPrompter, HumanRequest};
use crate::error::BatonError;
use crate::state::{ChoiceQuestion, MultiChoiceQuestion, StateStore, WorkflowState, WorkflowStatus};
use crate::workflow::schema::InteractiveMode;

pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Phrase in a human response that approves the work gate for the rest of the run.
pub const APPROVAL_PHRASE: &str = "[approve-work-gate]";

/// Answer given in `auto` mode.
pub const AUTO_RESPONSE: &str = "No human is available right now. Proceed with your best judgement, \
record the assumptions you made in the progress log, and continue the work.";

/// One question's answer: chosen option labels and/or free text.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChoiceAnswer {
    pub selected: Vec<String>,
    pub other: Option<String>,
}

impl ChoiceAnswer {
    /// Build an answer from zero-based option indices plus optional "Other" text,
    /// rejecting anything the question does not allow.
    pub fn from_indices(
        question: &ChoiceQuestion,
        indices: &[usize],
        other: Option<&str>,
    ) -> Result<Self, String> {
        let other = other.map(str::trim).filter(|o| !o.is_empty()).map(str::to_string);

        let mut selected = Vec::new();
        for &index in indices {
            let option = question.options.get(index).ok_or_else(|| {
                format!(
                    "Option {} is out of range (1-{})",
                    index + 1,
                    question.options.len()
                )
            })?;
            let label = option.label().to_string();
            if !selected.contains(&label) {
                selected.push(label);
            }
        }

        let picks = selected.len() + usize::from(other.is_some());
        if picks == 0 {
            return Err("Select at least one option or provide your own answer".to_string());
        }
        if !question.multi_select && picks > 1 {
            return Err("This question accepts a single answer".to_string());
        }
        Ok(Self { selected, other })
    }

    fn render(&self) -> String {
        let mut lines = Vec::new();
        if !self.selected.is_empty() {
            lines.push(format!("Selected: {}", self.selected.join(", ")));
        }
        if let Some(other) = &self.other {
            lines.push(format!("Other: {}", other));
        }
        lines.join("\n")
    }
}

/// Format answers for the response artifact.
///
/// A single question yields bare `Selected:` / `Other:` lines; several
/// questions yield one block per question, headed by its text.
pub fn format_answers(question: &MultiChoiceQuestion, answers: &[ChoiceAnswer]) -> String {
    if question.questions.len() <= 1 {
        return answers.first().map(ChoiceAnswer::render).unwrap_or_default();
    }
    question
        .questions
        .iter()
        .zip(answers)
        .map(|(q, a)| format!("{}\n{}", q.question, a.render()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn contains_approval(text: &str) -> bool {
    text.to_lowercase().contains(APPROVAL_PHRASE)
}

/// Human-readable rendering of the pending question.
pub fn describe_request(state: &WorkflowState) -> String {
    let agent = state.current_agent.as_deref().unwrap_or("agent");
    let mut out = format!(
        "{} asks:\n{}\n",
        agent,
        state.human_message.as_deref().unwrap_or("(no message)")
    );
    if let Some(mcq) = &state.multi_choice_question {
        for question in &mcq.questions {
            out.push('\n');
            if let Some(header) = &question.header {
                out.push_str(&format!("[{}] ", header));
            }
            out.push_str(&question.question);
            if question.multi_select {
                out.push_str(" (select any)");
            }
            out.push('\n');
            for (i, option) in question.options.iter().enumerate() {
                match option.description() {
                    Some(desc) => out.push_str(&format!("  {}. {} - {}\n", i + 1, option.label(), desc)),
                    None => out.push_str(&format!("  {}. {}\n", i + 1, option.label())),
                }
            }
        }
    }
    out
}

/// Answer a pending question: write the artifact, then resume the workflow.
pub fn submit_response(store: &StateStore, responder: &str, text: &str) -> Result<(), BatonError> {
    let state = store.load_existing()?;
    if state.status != WorkflowStatus::WaitingForHuman {
        return Err(BatonError::Config(format!(
            "No question is pending (status is {})",
            state.status
        )));
    }

    store.write_response(text)?;
    store.update(|state| {
        state.status = WorkflowStatus::Working;
        state.clear_human_request();
        if contains_approval(text) {
            state.work_gate_approved = true;
        }
        state.record_progress(responder, "Responded to pending question");
        Ok(())
    })?;
    tracing::info!("[HumanGate] Response submitted by {}", responder);
    Ok(())
}

/// How a wait on the human gate ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    /// The response artifact, consumed
    Answered(String),
    /// Status left `waiting-for-human` without an artifact
    Resumed,
    Interrupted,
}

/// Poll the state until it leaves `waiting-for-human`, then take the artifact once.
pub async fn wait_for_response(
    store: &StateStore,
    cancel: &CancellationToken,
) -> Result<GateOutcome, BatonError> {
    loop {
        if cancel.is_cancelled() {
            return Ok(GateOutcome::Interrupted);
        }
        let (state, _) = store.load_with_retry_async().await?;
        if state.status != WorkflowStatus::WaitingForHuman {
            return Ok(match store.take_response()? {
                Some(text) => GateOutcome::Answered(text),
                None => GateOutcome::Resumed,
            });
        }
        tokio::select! {
            _ = tokio::time::sleep(POLL_INTERVAL) => {}
            _ = cancel.cancelled() => return Ok(GateOutcome::Interrupted),
        }
    }
}

/// Run the notify hook, or log when none is configured.
pub async fn notify(command: Option<&str>, project_dir: &Path, message: &str) {
    let Some(command) = command else {
        tracing::warn!("[HumanGate] Waiting for human input: {}", message);
        return;
    };

    let result = Command::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(project_dir)
        .env("BATON_MESSAGE", message)
        .output()
        .await;
    match result {
        Ok(output) if output.status.success() => {
            tracing::debug!("[HumanGate] Notification sent via '{}'", command);
        }
        Ok(output) => tracing::warn!(
            "[HumanGate] Notify command exited with {:?}: {}",
            output.status.code(),
            String::from_utf8_lossy(&output.stderr).trim()
        ),
        Err(e) => tracing::warn!("[HumanGate] Failed to run notify command: {}", e),
    }
}

/// Resolves a suspended workflow according to the interaction mode.
pub struct HumanGate {
    store: StateStore,
    prompter: Arc<dyn HumanPrompter>,
    notify_command: Option<String>,
    editor: Option<String>,
}

impl HumanGate {
    pub fn new(
        store: StateStore,
        prompter: Arc<dyn HumanPrompter>,
        notify_command: Option<String>,
        editor: Option<String>,
    ) -> Self {
        Self {
            store,
            prompter,
            notify_command,
            editor,
        }
    }

    pub async fn resolve(
        &self,
        state: &WorkflowState,
        mode: InteractiveMode,
        cancel: &CancellationToken,
    ) -> Result<GateOutcome, BatonError> {
        let message = state
            .human_message
            .clone()
            .unwrap_or_else(|| "(no message)".to_string());
        tracing::info!(
            "[HumanGate] {} is waiting for input (mode: {})",
            state.current_agent.as_deref().unwrap_or("agent"),
            mode
        );

        match mode {
            InteractiveMode::Auto => {
                submit_response(&self.store, "auto", AUTO_RESPONSE)?;
                wait_for_response(&self.store, cancel).await
            }
            InteractiveMode::No => {
                notify(self.notify_command.as_deref(), self.store.project_dir(), &message).await;
                Err(BatonError::HumanInputRequired(describe_request(state)))
            }
            InteractiveMode::Yes => {
                notify(self.notify_command.as_deref(), self.store.project_dir(), &message).await;
                let withdrawn = cancel.child_token();
                let _withdraw_on_exit = withdrawn.clone().drop_guard();
                let request = HumanRequest {
                    agent: state.current_agent.clone().unwrap_or_default(),
                    message,
                    question: state.multi_choice_question.clone(),
                    editor: resolve_editor(self.editor.as_deref()),
                    withdrawn: withdrawn.clone(),
                };

                tokio::select! {
                    local = self.prompter.prompt(&request) => {
                        match local {
                            Ok(Some(text)) => {
                                if let Err(e) = submit_response(&self.store, "human", &text) {
                                    tracing::warn!("[HumanGate] Local answer not submitted: {}", e);
                                }
                            }
                            Ok(None) => {}
                            Err(e) => tracing::warn!("[HumanGate] Local prompt failed: {}", e),
                        }
                        wait_for_response(&self.store, cancel).await
                    }
                    remote = wait_for_response(&self.store, cancel) => {
                        withdrawn.cancel();
                        if matches!(remote, Ok(GateOutcome::Answered(_))) {
                            tracing::info!(
                                "[HumanGate] Answered through the response file; the terminal prompt is withdrawn (press Enter to dismiss it)"
                            );
                        }
                        remote
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::prompter::RemoteOnly;
    use crate::state::ChoiceOption;

    fn question(multi: bool) -> ChoiceQuestion {
        ChoiceQuestion {
            question: "Which database?".to_string(),
            header: None,
            options: vec![
                ChoiceOption::Label("Postgres".to_string()),
                ChoiceOption::Detailed {
                    label: "SQLite".to_string(),
                    description: Some("embedded".to_string()),
                },
            ],
            multi_select: multi,
        }
    }

    fn waiting_store(dir: &Path) -> StateStore {
        let store = StateStore::new(dir);
        let mut state = WorkflowState::new("sum");
        state.current_agent = Some("architect".to_string());
        state.request_human("Which database?", None);
        store.save(&mut state).unwrap();
        store
    }

    #[test]
    fn test_answer_validation() {
        let single = question(false);
        assert!(ChoiceAnswer::from_indices(&single, &[], None).is_err());
        assert!(ChoiceAnswer::from_indices(&single, &[0, 1], None).is_err());
        assert!(ChoiceAnswer::from_indices(&single, &[0], Some("also redis")).is_err());
        assert!(ChoiceAnswer::from_indices(&single, &[5], None).is_err());
        assert!(ChoiceAnswer::from_indices(&single, &[], Some("  ")).is_err());

        let answer = ChoiceAnswer::from_indices(&single, &[], Some("MySQL")).unwrap();
        assert_eq!(answer.other.as_deref(), Some("MySQL"));

        let multi = question(true);
        let answer = ChoiceAnswer::from_indices(&multi, &[1, 0, 1], Some("redis")).unwrap();
        assert_eq!(answer.selected, vec!["SQLite", "Postgres"]);
    }

    #[test]
    fn test_format_single_question() {
        let mcq = MultiChoiceQuestion {
            questions: vec![question(true)],
        };
        let answer = ChoiceAnswer::from_indices(&mcq.questions[0], &[0, 1], Some("redis")).unwrap();
        assert_eq!(
            format_answers(&mcq, &[answer]),
            "Selected: Postgres, SQLite\nOther: redis"
        );
    }

    #[test]
    fn test_format_multiple_questions() {
        let mut second = question(false);
        second.question = "Deploy where?".to_string();
        let mcq = MultiChoiceQuestion {
            questions: vec![question(false), second],
        };
        let answers = vec![
            ChoiceAnswer::from_indices(&mcq.questions[0], &[1], None).unwrap(),
            ChoiceAnswer::from_indices(&mcq.questions[1], &[], Some("fly.io")).unwrap(),
        ];
        assert_eq!(
            format_answers(&mcq, &answers),
            "Which database?\nSelected: SQLite\n\nDeploy where?\nOther: fly.io"
        );
    }

    #[test]
    fn test_submit_requires_pending_question() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        store.save(&mut WorkflowState::new("sum")).unwrap();
        assert!(submit_response(&store, "human", "hello").is_err());
        assert!(!store.response_path().exists());
    }

    #[test]
    fn test_submit_sets_approval() {
        let dir = tempfile::tempdir().unwrap();
        let store = waiting_store(dir.path());
        submit_response(&store, "human", "Looks good [APPROVE-work-gate]").unwrap();

        let state = store.load_existing().unwrap();
        assert_eq!(state.status, WorkflowStatus::Working);
        assert!(state.work_gate_approved);
        assert!(state.human_message.is_none());
        assert_eq!(state.progress.last().unwrap().agent, "human");
    }

    #[tokio::test]
    async fn test_wait_consumes_artifact_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = waiting_store(dir.path());

        let responder = store.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            submit_response(&responder, "human", "Use Postgres").unwrap();
        });

        let outcome = wait_for_response(&store, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome, GateOutcome::Answered("Use Postgres".to_string()));
        assert!(!store.response_path().exists());
    }

    #[tokio::test]
    async fn test_wait_interrupted() {
        let dir = tempfile::tempdir().unwrap();
        let store = waiting_store(dir.path());
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(
            wait_for_response(&store, &cancel).await.unwrap(),
            GateOutcome::Interrupted
        );
    }

    /// Local prompt that never answers; keeps the request's withdrawal token.
    #[derive(Default)]
    struct StalledPrompter {
        withdrawn: std::sync::Mutex<Option<CancellationToken>>,
    }

    #[async_trait::async_trait]
    impl HumanPrompter for StalledPrompter {
        async fn prompt(&self, request: &HumanRequest) -> Result<Option<String>, BatonError> {
            *self.withdrawn.lock().unwrap() = Some(request.withdrawn.clone());
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_remote_answer_withdraws_local_prompt() {
        let dir = tempfile::tempdir().unwrap();
        let store = waiting_store(dir.path());
        let prompter = Arc::new(StalledPrompter::default());
        let gate = HumanGate::new(store.clone(), prompter.clone(), None, None);
        let state = store.load_existing().unwrap();

        let responder = store.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            submit_response(&responder, "human", "SQLite").unwrap();
        });

        let outcome = gate
            .resolve(&state, InteractiveMode::Yes, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome, GateOutcome::Answered("SQLite".to_string()));

        let withdrawn = prompter.withdrawn.lock().unwrap().clone().unwrap();
        assert!(withdrawn.is_cancelled());
    }

    #[tokio::test]
    async fn test_gate_modes() {
        let dir = tempfile::tempdir().unwrap();
        let store = waiting_store(dir.path());
        let gate = HumanGate::new(store.clone(), Arc::new(RemoteOnly), None, None);
        let state = store.load_existing().unwrap();

        let err = gate
            .resolve(&state, InteractiveMode::No, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, BatonError::HumanInputRequired(ref q) if q.contains("Which database?")));
        assert_eq!(store.load_existing().unwrap().status, WorkflowStatus::WaitingForHuman);

        let outcome = gate
            .resolve(&state, InteractiveMode::Auto, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome, GateOutcome::Answered(AUTO_RESPONSE.to_string()));
    }
}
