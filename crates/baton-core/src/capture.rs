//! SessionCapture: per-run audit snapshot for retrospective analysis.
//!
//! Storage layout:
//!
//! ```text
//! <project>/.baton/runs/<runId>/
//! ├── GOAL.md                   # goal document as it was when the run started
//! └── sessions/<agent>.jsonl    # one line per captured turn
//! ```
//!
//! Capture never fails the workflow; write errors are logged and dropped.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::driver::{TranscriptEntry, TurnResult};
use crate::state::StepCost;

const GOAL_SNAPSHOT: &str = "GOAL.md";
const SESSIONS_DIR: &str = "sessions";

/// One captured agent turn.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub timestamp: DateTime<Utc>,
    pub agent: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub visit: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    pub success: bool,
    pub transcript: Vec<TranscriptEntry>,
    pub steps: Vec<StepCost>,
}

impl SessionRecord {
    pub fn from_turn(agent: &str, model: Option<&str>, visit: u64, turn: &TurnResult) -> Self {
        Self {
            timestamp: Utc::now(),
            agent: agent.to_string(),
            model: model.map(str::to_string),
            visit,
            exit_code: turn.exit_code,
            success: turn.success,
            transcript: turn.transcript.clone(),
            steps: turn.steps.clone(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

#[derive(Debug, Clone)]
pub struct SessionCapture {
    run_dir: PathBuf,
}

impl SessionCapture {
    pub fn new(run_dir: impl AsRef<Path>) -> Self {
        Self {
            run_dir: run_dir.as_ref().to_path_buf(),
        }
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    /// Copy the goal document into the run directory unless already present.
    pub async fn snapshot_goal(&self, document: &str) -> Result<(), CaptureError> {
        let path = self.run_dir.join(GOAL_SNAPSHOT);
        if fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(());
        }
        fs::create_dir_all(&self.run_dir)
            .await
            .map_err(|e| CaptureError::Io(format!("Failed to create run dir: {}", e)))?;
        fs::write(&path, document)
            .await
            .map_err(|e| CaptureError::Io(e.to_string()))
    }

    pub fn session_path(&self, agent: &str) -> PathBuf {
        self.run_dir
            .join(SESSIONS_DIR)
            .join(format!("{}.jsonl", sanitize(agent)))
    }

    /// Append one turn to the agent's JSONL file.
    pub async fn append(&self, record: &SessionRecord) -> Result<(), CaptureError> {
        let path = self.session_path(&record.agent);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| CaptureError::Io(format!("Failed to create sessions dir: {}", e)))?;
        }

        let mut line = serde_json::to_string(record)
            .map_err(|e| CaptureError::Serialization(e.to_string()))?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| CaptureError::Io(e.to_string()))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| CaptureError::Io(e.to_string()))?;
        file.flush()
            .await
            .map_err(|e| CaptureError::Io(e.to_string()))?;
        Ok(())
    }

    pub async fn append_safe(&self, record: &SessionRecord) {
        if let Err(e) = self.append(record).await {
            tracing::warn!("[SessionCapture] Failed to capture {}: {}", record.agent, e);
        }
    }

    pub async fn snapshot_goal_safe(&self, document: &str) {
        if let Err(e) = self.snapshot_goal(document).await {
            tracing::warn!("[SessionCapture] Failed to snapshot goal: {}", e);
        }
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' { c } else { '_' })
        .collect()
}
