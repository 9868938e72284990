//! Integration tests for the baton-cli commands.
//!
//! These exercise the same code paths as the binary against a throwaway
//! project directory with a seeded state file.

use std::path::Path;

use baton_cli::commands::{self, Caller};
use baton_core::state::{TodoStatus, WorkflowState, WorkflowStatus};
use baton_core::StateStore;

const GOAL: &str = "---\nflow: coordinator -> developer -> reviewer\nmodels:\n  reviewer: [model-a, model-b]\n---\n\nShip it.\n";

/// Project directory with a goal document and a fresh working state.
fn test_project() -> tempfile::TempDir {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    std::fs::write(dir.path().join("GOAL.md"), GOAL).unwrap();
    let mut state = WorkflowState::new("checksum");
    state.seed_visit_counts(["coordinator", "developer", "reviewer"]);
    state.enter_agent("coordinator");
    StateStore::new(dir.path()).save(&mut state).unwrap();
    dir
}

fn load(dir: &Path) -> WorkflowState {
    StateStore::new(dir).load_existing().unwrap()
}

#[test]
fn test_message_send_and_read() {
    let dir = test_project();
    let coordinator = Caller::agent("coordinator");
    let developer = Caller::agent("developer");

    commands::message::send(dir.path(), &coordinator, "developer", "Add a parser").unwrap();
    let state = load(dir.path());
    assert_eq!(state.messages.len(), 1);
    assert_eq!(state.messages[0].from_agent, "coordinator");
    assert!(!state.messages[0].read);

    commands::message::list(dir.path(), &developer, true, false).unwrap();
    commands::message::read(dir.path(), &developer, state.messages[0].id).unwrap();

    let state = load(dir.path());
    assert!(state.messages[0].read);
    assert_eq!(state.messages[0].read_by.as_deref(), Some("developer"));
}

#[test]
fn test_message_to_unknown_agent_is_rejected() {
    let dir = test_project();
    let err = commands::message::send(dir.path(), &Caller::agent("coordinator"), "designer", "hi")
        .unwrap_err();
    assert!(err.contains("designer"));
    assert!(load(dir.path()).messages.is_empty());
}

#[test]
fn test_message_to_model_variant() {
    let dir = test_project();
    let caller = Caller::new(Some("reviewer".to_string()), Some("model-a".to_string()));
    commands::message::send(dir.path(), &caller, "reviewer:model-b", "Check the edge cases").unwrap();

    let state = load(dir.path());
    assert_eq!(state.messages[0].from_agent, "reviewer:model-a");
    assert_eq!(state.messages[0].to_agent, "reviewer:model-b");
}

#[test]
fn test_message_to_unconfigured_variant_is_rejected() {
    let dir = test_project();
    let coordinator = Caller::agent("coordinator");

    let err = commands::message::send(dir.path(), &coordinator, "developer:typo-model", "hi")
        .unwrap_err();
    assert!(err.contains("typo-model"));
    let err = commands::message::send(dir.path(), &coordinator, "reviewer:model-c", "hi")
        .unwrap_err();
    assert!(err.contains("model-a, model-b"));
    assert!(load(dir.path()).messages.is_empty());
}

#[test]
fn test_todo_lifecycle() {
    let dir = test_project();
    let developer = Caller::agent("developer");

    commands::todo::add(dir.path(), &developer, "Write tests", "high", false).unwrap();
    commands::todo::add(dir.path(), &developer, "Update docs", "low", true).unwrap();

    let state = load(dir.path());
    assert_eq!(state.pending_todos("developer"), 1);
    assert_eq!(state.pending_project_todos().len(), 1);
    let id = state.todos["developer"][0].id.clone();

    commands::todo::update(dir.path(), &developer, &id, "completed", false).unwrap();
    let state = load(dir.path());
    assert_eq!(state.todos["developer"][0].status, TodoStatus::Completed);
    assert_eq!(state.pending_todos("developer"), 0);

    assert!(commands::todo::update(dir.path(), &developer, "t99", "completed", false).is_err());
    assert!(commands::todo::add(dir.path(), &developer, "x", "urgent", false).is_err());
    commands::todo::list(dir.path(), &developer, true).unwrap();
}

#[test]
fn test_agent_commands_require_caller() {
    let dir = test_project();
    assert!(commands::agent::done(dir.path(), &Caller::default()).is_err());
    assert_eq!(load(dir.path()).status, WorkflowStatus::Working);

    commands::agent::done(dir.path(), &Caller::agent("coordinator")).unwrap();
    let state = load(dir.path());
    assert_eq!(state.status, WorkflowStatus::AgentDone);
    assert_eq!(state.progress.last().unwrap().agent, "coordinator");
}

#[test]
fn test_complete_is_coordinator_only() {
    let dir = test_project();
    let err = commands::agent::complete(dir.path(), &Caller::agent("developer")).unwrap_err();
    assert!(err.contains("agent done"));
    assert_eq!(load(dir.path()).status, WorkflowStatus::Working);

    commands::agent::complete(dir.path(), &Caller::agent("coordinator")).unwrap();
    let state = load(dir.path());
    assert_eq!(state.status, WorkflowStatus::Complete);
    // the engine has not confirmed it yet, so a crash here stays resumable
    assert!(!state.completion_confirmed);
    assert!(baton_core::state::can_resume(&state, false, &state.goal_checksum));
}

#[test]
fn test_ask_then_respond() {
    let dir = test_project();
    let architect = Caller::agent("developer");
    let choices = r#"{"question":"Which database?","options":["postgres","sqlite"]}"#;

    commands::agent::ask(dir.path(), &architect, "Need a storage decision", Some(choices)).unwrap();
    let state = load(dir.path());
    assert_eq!(state.status, WorkflowStatus::WaitingForHuman);
    assert_eq!(state.human_message.as_deref(), Some("Need a storage decision"));
    assert_eq!(state.multi_choice_question.as_ref().unwrap().questions.len(), 1);

    commands::status::show(dir.path(), false).unwrap();
    commands::respond::respond(dir.path(), Some("Selected: sqlite"), None).unwrap();

    let store = StateStore::new(dir.path());
    let state = store.load_existing().unwrap();
    assert_eq!(state.status, WorkflowStatus::Working);
    assert!(state.human_message.is_none());
    assert!(state.multi_choice_question.is_none());
    assert_eq!(
        store.take_response().unwrap().as_deref(),
        Some("Selected: sqlite")
    );
}

#[test]
fn test_respond_without_pending_question_fails() {
    let dir = test_project();
    assert!(commands::respond::respond(dir.path(), Some("hello"), None).is_err());
    assert!(commands::respond::respond(dir.path(), Some("   "), None).is_err());
    assert!(!StateStore::new(dir.path()).response_path().exists());
}

#[test]
fn test_respond_from_file() {
    let dir = test_project();
    commands::agent::ask(dir.path(), &Caller::agent("coordinator"), "Go?", None).unwrap();

    let answer = dir.path().join("answer.md");
    std::fs::write(&answer, "Yes, ship it [approve-work-gate]\n").unwrap();
    commands::respond::respond(dir.path(), None, Some(&answer)).unwrap();

    let state = load(dir.path());
    assert!(state.work_gate_approved);
}

#[test]
fn test_progress_records_caller() {
    let dir = test_project();
    commands::progress::record(dir.path(), &Caller::agent("developer"), "Parser done").unwrap();
    commands::progress::record(dir.path(), &Caller::default(), "Checked in").unwrap();
    assert!(commands::progress::record(dir.path(), &Caller::default(), "  ").is_err());

    let state = load(dir.path());
    let last_two: Vec<(&str, &str)> = state
        .progress
        .iter()
        .rev()
        .take(2)
        .map(|p| (p.agent.as_str(), p.description.as_str()))
        .collect();
    assert_eq!(last_two, vec![("human", "Checked in"), ("developer", "Parser done")]);
}

#[test]
fn test_validate_and_graph() {
    let dir = test_project();
    commands::validate::validate(dir.path(), None).unwrap();
    commands::graph::print_dot(dir.path(), None).unwrap();

    let broken = dir.path().join("BROKEN.md");
    std::fs::write(&broken, "---\nflow: coordinator -> -> developer\n---\n").unwrap();
    assert!(commands::validate::validate(dir.path(), Some(broken)).is_err());
}

#[test]
fn test_status_without_state_fails() {
    let dir = tempfile::tempdir().unwrap();
    assert!(commands::status::show(dir.path(), true).is_err());
}
