//! `baton agent`: disposition commands called by agent processes.

use std::path::Path;

use baton_core::state::{ChoiceQuestion, MultiChoiceQuestion, WorkflowStatus};
use baton_core::workflow::COORDINATOR;
use serde::Deserialize;

use super::{store, Caller};

fn set_status(
    project_dir: &Path,
    caller: &Caller,
    status: WorkflowStatus,
    note: &str,
) -> Result<(), String> {
    caller.require_agent()?;
    let who = caller.display_name();
    store(project_dir)
        .update(|state| {
            state.status = status;
            state.record_progress(&who, note);
            Ok(())
        })
        .map_err(|e| e.to_string())?;
    println!("Status set to {}", status);
    Ok(())
}

pub fn done(project_dir: &Path, caller: &Caller) -> Result<(), String> {
    set_status(project_dir, caller, WorkflowStatus::AgentDone, "Finished turn")
}

/// Only the coordinator may declare completion. The engine still runs the
/// completion checks before the run is finished.
pub fn complete(project_dir: &Path, caller: &Caller) -> Result<(), String> {
    let agent = caller.require_agent()?;
    if agent != COORDINATOR {
        return Err(format!(
            "Only the {} can complete the workflow; '{}' should run `baton agent done`",
            COORDINATOR, agent
        ));
    }
    set_status(project_dir, caller, WorkflowStatus::Complete, "Declared the workflow complete")
}

pub fn working(project_dir: &Path, caller: &Caller) -> Result<(), String> {
    set_status(project_dir, caller, WorkflowStatus::Working, "Still working")
}

/// Accepted shapes for `--choices-json`.
#[derive(Deserialize)]
#[serde(untagged)]
enum ChoicesInput {
    Wrapped(MultiChoiceQuestion),
    List(Vec<ChoiceQuestion>),
    Single(ChoiceQuestion),
}

pub fn parse_choices(json: &str) -> Result<MultiChoiceQuestion, String> {
    let input: ChoicesInput =
        serde_json::from_str(json).map_err(|e| format!("Invalid --choices-json: {}", e))?;
    let question = match input {
        ChoicesInput::Wrapped(q) => q,
        ChoicesInput::List(questions) => MultiChoiceQuestion { questions },
        ChoicesInput::Single(q) => MultiChoiceQuestion { questions: vec![q] },
    };

    if question.questions.is_empty() {
        return Err("--choices-json contains no questions".to_string());
    }
    for q in &question.questions {
        if q.question.trim().is_empty() {
            return Err("Every question needs non-empty text".to_string());
        }
        if q.options.is_empty() {
            return Err(format!("Question '{}' has no options", q.question));
        }
    }
    Ok(question)
}

pub fn ask(
    project_dir: &Path,
    caller: &Caller,
    message: &str,
    choices_json: Option<&str>,
) -> Result<(), String> {
    caller.require_agent()?;
    let question = choices_json.map(parse_choices).transpose()?;
    let who = caller.display_name();

    store(project_dir)
        .update(|state| {
            state.request_human(message, question);
            state.record_progress(&who, "Asked for human input");
            Ok(())
        })
        .map_err(|e| e.to_string())?;
    println!("Waiting for human input. End your turn now; the answer arrives as your next prompt.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_choices_shapes() {
        let single = r#"{"question":"DB?","options":["pg","sqlite"]}"#;
        assert_eq!(parse_choices(single).unwrap().questions.len(), 1);

        let list = r#"[{"question":"DB?","options":["pg"]},{"question":"Cloud?","options":[{"label":"aws","description":"big"}],"multiSelect":true}]"#;
        let parsed = parse_choices(list).unwrap();
        assert_eq!(parsed.questions.len(), 2);
        assert!(parsed.questions[1].multi_select);
        assert_eq!(parsed.questions[1].options[0].description(), Some("big"));

        let wrapped = r#"{"questions":[{"question":"DB?","options":["pg"]}]}"#;
        assert_eq!(parse_choices(wrapped).unwrap().questions.len(), 1);
    }

    #[test]
    fn test_parse_choices_rejects_empty() {
        assert!(parse_choices("[]").is_err());
        assert!(parse_choices(r#"{"question":"DB?","options":[]}"#).is_err());
        assert!(parse_choices("not json").is_err());
    }
}
