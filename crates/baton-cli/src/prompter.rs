//! Terminal prompter for the human gate, built on dialoguer.
//!
//! Multiple-choice questions get a select (or multi-select) list with an
//! extra "Other" entry; free-text questions open the configured editor, or
//! fall back to a single-line input. Escape at any prompt hands the question
//! back to the remote channel (`baton respond`).
//!
//! A blocking terminal read cannot be interrupted. When the question is
//! answered remotely the open prompt keeps the terminal until the user
//! dismisses it; its input is then discarded, and later questions wait for
//! `baton respond` until the terminal is free again.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use baton_core::gate::{format_answers, ChoiceAnswer, HumanPrompter, HumanRequest};
use baton_core::gate::prompter::{editor_template, extract_editor_response};
use baton_core::state::{ChoiceQuestion, MultiChoiceQuestion};
use baton_core::BatonError;
use console::style;
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Editor, Input, MultiSelect, Select};

const OTHER_LABEL: &str = "Other (type your own answer)";

#[derive(Default)]
pub struct TerminalPrompter {
    busy: Arc<AtomicBool>,
}

impl TerminalPrompter {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Exclusive use of the terminal by one blocking prompt.
struct TerminalClaim(Arc<AtomicBool>);

impl TerminalClaim {
    fn acquire(busy: &Arc<AtomicBool>) -> Option<Self> {
        (!busy.swap(true, Ordering::SeqCst)).then(|| Self(busy.clone()))
    }
}

impl Drop for TerminalClaim {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl HumanPrompter for TerminalPrompter {
    async fn prompt(&self, request: &HumanRequest) -> Result<Option<String>, BatonError> {
        if !console::user_attended() {
            return Ok(None);
        }
        let Some(claim) = TerminalClaim::acquire(&self.busy) else {
            tracing::info!("[Prompt] An earlier prompt still holds the terminal; waiting for `baton respond`");
            return Ok(None);
        };
        let request = request.clone();
        tokio::task::spawn_blocking(move || {
            let _claim = claim;
            let answer = prompt_blocking(&request);
            if request.withdrawn.is_cancelled() {
                eprintln!(
                    "{} Question was already answered elsewhere; input discarded",
                    style("!").yellow()
                );
                return Ok(None);
            }
            answer
        })
        .await
        .map_err(|e| BatonError::Io(format!("Prompt task failed: {}", e)))?
    }
}

fn prompt_err<E: std::fmt::Display>(e: E) -> BatonError {
    BatonError::Io(format!("Terminal prompt failed: {}", e))
}

fn prompt_blocking(request: &HumanRequest) -> Result<Option<String>, BatonError> {
    eprintln!();
    eprintln!(
        "{} {}",
        style("?").yellow().bold(),
        style(format!("{} needs your input", request.agent)).bold()
    );
    for line in request.message.lines() {
        eprintln!("  {}", line);
    }
    eprintln!();

    match &request.question {
        Some(question) => ask_choices(question),
        None => ask_free_text(request),
    }
}

fn ask_choices(mcq: &MultiChoiceQuestion) -> Result<Option<String>, BatonError> {
    let mut answers = Vec::with_capacity(mcq.questions.len());
    for question in &mcq.questions {
        match ask_one(question)? {
            Some(answer) => answers.push(answer),
            None => return Ok(None),
        }
    }
    Ok(Some(format_answers(mcq, &answers)))
}

/// Map picked list positions to an answer. The "Other" entry sits after
/// the question's own options.
pub fn answer_from_picks(
    question: &ChoiceQuestion,
    picks: &[usize],
    other_text: Option<&str>,
) -> Result<ChoiceAnswer, String> {
    let other_index = question.options.len();
    let indices: Vec<usize> = picks.iter().copied().filter(|&i| i != other_index).collect();
    let other = if picks.contains(&other_index) { other_text } else { None };
    if picks.contains(&other_index) && other.map(str::trim).unwrap_or_default().is_empty() {
        return Err("\"Other\" was selected but no answer was typed".to_string());
    }
    ChoiceAnswer::from_indices(question, &indices, other)
}

fn ask_one(question: &ChoiceQuestion) -> Result<Option<ChoiceAnswer>, BatonError> {
    let theme = ColorfulTheme::default();
    let mut items: Vec<String> = question
        .options
        .iter()
        .map(|option| match option.description() {
            Some(description) => format!("{}: {}", option.label(), description),
            None => option.label().to_string(),
        })
        .collect();
    items.push(OTHER_LABEL.to_string());
    let other_index = question.options.len();

    let prompt = match &question.header {
        Some(header) => format!("[{}] {}", header, question.question),
        None => question.question.clone(),
    };

    loop {
        let picks = if question.multi_select {
            match MultiSelect::with_theme(&theme)
                .with_prompt(&prompt)
                .items(&items)
                .interact_opt()
                .map_err(prompt_err)?
            {
                Some(picks) => picks,
                None => return Ok(None),
            }
        } else {
            match Select::with_theme(&theme)
                .with_prompt(&prompt)
                .items(&items)
                .default(0)
                .interact_opt()
                .map_err(prompt_err)?
            {
                Some(pick) => vec![pick],
                None => return Ok(None),
            }
        };

        let other_text = if picks.contains(&other_index) {
            let text: String = Input::with_theme(&theme)
                .with_prompt("Your answer")
                .allow_empty(true)
                .interact_text()
                .map_err(prompt_err)?;
            Some(text)
        } else {
            None
        };

        match answer_from_picks(question, &picks, other_text.as_deref()) {
            Ok(answer) => return Ok(Some(answer)),
            Err(message) => eprintln!("{} {}", style("✗").red(), message),
        }
    }
}

fn ask_free_text(request: &HumanRequest) -> Result<Option<String>, BatonError> {
    if let Some(editor) = &request.editor {
        loop {
            let edited = Editor::new()
                .executable(editor)
                .extension(".md")
                .edit(&editor_template(request))
                .map_err(prompt_err)?;
            // Closing the editor without saving hands the question back.
            let Some(buffer) = edited else {
                return Ok(None);
            };
            match extract_editor_response(&buffer) {
                Some(answer) => return Ok(Some(answer)),
                None => eprintln!("{} Response is empty, try again", style("✗").red()),
            }
        }
    }

    loop {
        let text: String = Input::with_theme(&ColorfulTheme::default())
            .with_prompt("Your answer")
            .allow_empty(true)
            .interact_text()
            .map_err(prompt_err)?;
        let text = text.trim();
        if !text.is_empty() {
            return Ok(Some(text.to_string()));
        }
        eprintln!("{} Response is empty, try again", style("✗").red());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use baton_core::state::ChoiceOption;

    fn question(multi_select: bool) -> ChoiceQuestion {
        ChoiceQuestion {
            question: "Which database?".to_string(),
            header: None,
            options: vec![
                ChoiceOption::Label("postgres".to_string()),
                ChoiceOption::Label("sqlite".to_string()),
            ],
            multi_select,
        }
    }

    #[test]
    fn test_single_pick() {
        let answer = answer_from_picks(&question(false), &[1], None).unwrap();
        assert_eq!(answer.selected, vec!["sqlite".to_string()]);
        assert_eq!(answer.other, None);
    }

    #[test]
    fn test_other_entry_uses_typed_text() {
        let answer = answer_from_picks(&question(false), &[2], Some("  duckdb ")).unwrap();
        assert!(answer.selected.is_empty());
        assert_eq!(answer.other.as_deref(), Some("duckdb"));
    }

    #[test]
    fn test_other_without_text_is_rejected() {
        assert!(answer_from_picks(&question(true), &[0, 2], Some("   ")).is_err());
    }

    #[test]
    fn test_multi_select_with_other() {
        let answer = answer_from_picks(&question(true), &[0, 1, 2], Some("duckdb")).unwrap();
        assert_eq!(answer.selected.len(), 2);
        assert_eq!(answer.other.as_deref(), Some("duckdb"));
    }

    #[test]
    fn test_empty_multi_select_is_rejected() {
        assert!(answer_from_picks(&question(true), &[], None).is_err());
    }

    #[test]
    fn test_terminal_claim_is_exclusive() {
        let busy = Arc::new(AtomicBool::new(false));
        let first = TerminalClaim::acquire(&busy).unwrap();
        assert!(TerminalClaim::acquire(&busy).is_none());
        drop(first);
        assert!(TerminalClaim::acquire(&busy).is_some());
    }
}
