//! `baton run`: drive the workflow until completion, interruption, or a
//! question nobody can answer here.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use baton_core::workflow::InteractiveMode;
use baton_core::{BatonError, Engine, EngineConfig, RunOutcome};
use console::style;
use tokio_util::sync::CancellationToken;

use crate::prompter::TerminalPrompter;
use crate::{EXIT_HUMAN_INPUT_REQUIRED, EXIT_INTERRUPTED};

pub async fn run(
    project_dir: &Path,
    goal: Option<PathBuf>,
    fresh: bool,
    interactive: Option<InteractiveMode>,
) -> Result<i32, String> {
    let config = EngineConfig {
        project_dir: project_dir.to_path_buf(),
        goal_path: goal,
        fresh,
        interactive,
    };

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("[Run] Interrupt received, stopping after the current step");
            signal_token.cancel();
        }
    });

    let mut engine = Engine::new(config, cancel)
        .map_err(|e| e.to_string())?
        .with_prompter(Arc::new(TerminalPrompter::new()));

    println!(
        "{} Running {} (agents: {})",
        style("▶").green(),
        project_dir.display(),
        engine.graph().all_agents().join(", ")
    );

    match engine.run().await {
        Ok(RunOutcome::Completed) => {
            print_summary(&engine, "Workflow complete");
            Ok(0)
        }
        Ok(RunOutcome::TerminalReached) => {
            print_summary(&engine, "Reached the end of the flow");
            Ok(0)
        }
        Ok(RunOutcome::Interrupted) => {
            println!();
            println!(
                "{} Interrupted. Run `baton run` again to resume.",
                style("■").yellow()
            );
            Ok(EXIT_INTERRUPTED)
        }
        Err(BatonError::HumanInputRequired(question)) => {
            println!();
            println!("{}", style("Human input required").yellow().bold());
            print!("{}", question);
            println!();
            println!("Answer with `baton respond \"<text>\"`, then run `baton run` to resume.");
            Ok(EXIT_HUMAN_INPUT_REQUIRED)
        }
        Err(e) => Err(e.to_string()),
    }
}

fn print_summary(engine: &Engine, headline: &str) {
    println!();
    println!("{} {}", style("✓").green().bold(), headline);
    if let Ok(state) = engine.store().load_existing() {
        let agents: Vec<&str> = state
            .agent_sequence
            .iter()
            .map(|entry| entry.agent.as_str())
            .collect();
        println!("  Sequence: {}", agents.join(" → "));
        println!(
            "  Cost:     ${:.4} ({} tokens)",
            state.cost.total_cost,
            state.cost.tokens.total()
        );
    }
}
