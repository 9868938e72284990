//! Completion gate: an external validation command that must pass before the
//! workflow may be marked complete.

use std::path::Path;

use tokio::process::Command;

use crate::state::mailbox::ENVIRONMENT;
use crate::state::{WorkflowState, WorkflowStatus};
use crate::workflow::flow::COORDINATOR;

/// Combined output kept in the failure message.
const MAX_OUTPUT_CHARS: usize = 8000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateResult {
    Passed,
    Failed {
        exit_code: Option<i32>,
        output: String,
    },
}

/// Run `script` via `sh -c` in the project directory and wait for it.
pub async fn run_completion_gate(script: &str, project_dir: &Path) -> GateResult {
    tracing::info!("[CompletionGate] Running: {}", script);

    let output = match Command::new("sh")
        .arg("-c")
        .arg(script)
        .current_dir(project_dir)
        .output()
        .await
    {
        Ok(output) => output,
        Err(e) => {
            return GateResult::Failed {
                exit_code: None,
                output: format!("failed to start gate command: {}", e),
            }
        }
    };

    if output.status.success() {
        tracing::info!("[CompletionGate] Passed");
        return GateResult::Passed;
    }

    let mut combined = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.trim().is_empty() {
        if !combined.is_empty() && !combined.ends_with('\n') {
            combined.push('\n');
        }
        combined.push_str(&stderr);
    }

    tracing::warn!(
        "[CompletionGate] Failed with exit code {:?}",
        output.status.code()
    );
    GateResult::Failed {
        exit_code: output.status.code(),
        output: tail_chars(&combined, MAX_OUTPUT_CHARS),
    }
}

fn tail_chars(text: &str, max: usize) -> String {
    let count = text.chars().count();
    if count <= max {
        return text.to_string();
    }
    let tail: String = text.chars().skip(count - max).collect();
    format!("[... {} earlier characters omitted ...]\n{}", count - max, tail)
}

pub fn failure_message(script: &str, exit_code: Option<i32>, output: &str) -> String {
    let code = exit_code
        .map(|c| c.to_string())
        .unwrap_or_else(|| "none".to_string());
    format!(
        "Completion gate failed; the workflow is not complete.\n\nCommand: {}\nExit code: {}\n\nOutput:\n{}",
        script,
        code,
        output.trim_end()
    )
}

/// Fold a gate result into the state: `complete` on success, otherwise back to
/// `working` with the failure posted to the coordinator.
pub fn apply_gate_result(state: &mut WorkflowState, script: &str, result: &GateResult) {
    match result {
        GateResult::Passed => {
            state.status = WorkflowStatus::Complete;
            state.record_progress(ENVIRONMENT, format!("Completion gate passed: {}", script));
        }
        GateResult::Failed { exit_code, output } => {
            state.status = WorkflowStatus::Working;
            state.post_message(
                ENVIRONMENT,
                COORDINATOR,
                failure_message(script, *exit_code, output),
            );
            state.record_progress(ENVIRONMENT, format!("Completion gate failed: {}", script));
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_passing_gate() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(run_completion_gate("true", dir.path()).await, GateResult::Passed);
    }

    #[tokio::test]
    async fn test_failing_gate_posts_environment_message() {
        let dir = tempfile::tempdir().unwrap();
        let script = "echo 3 tests failed; echo oops >&2; exit 1";
        let result = run_completion_gate(script, dir.path()).await;
        assert_eq!(
            result,
            GateResult::Failed {
                exit_code: Some(1),
                output: "3 tests failed\noops\n".to_string()
            }
        );

        let mut state = WorkflowState::new("sum");
        state.status = WorkflowStatus::Complete;
        apply_gate_result(&mut state, script, &result);

        assert_eq!(state.status, WorkflowStatus::Working);
        let message = state.messages.last().unwrap();
        assert_eq!(message.from_agent, "environment");
        assert_eq!(message.to_agent, "coordinator");
        assert!(message.body.contains(script));
        assert!(message.body.contains("Exit code: 1"));
        assert!(message.body.contains("3 tests failed"));
        assert!(message.body.contains("oops"));
    }

    #[tokio::test]
    async fn test_gate_runs_in_project_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker"), "x").unwrap();
        assert_eq!(
            run_completion_gate("test -f marker", dir.path()).await,
            GateResult::Passed
        );
    }

    #[test]
    fn test_output_tail_is_bounded() {
        let long = "x".repeat(10);
        let tail = tail_chars(&long, 4);
        assert!(tail.ends_with("\nxxxx"));
        assert!(tail.contains("6 earlier"));
    }
}
