//! StateStore: atomic JSON persistence of the workflow state.
//!
//! Storage layout under the project directory:
//!
//! ```text
//! <project>/.baton/
//! ├── state.json        # the workflow state record
//! ├── response.txt      # human response artifact (consumed once)
//! └── runs/<runId>/     # session capture per run
//! ```
//!
//! Writes go to a temp file in the same directory and are renamed into
//! place, so concurrent readers never see a partial document. There is no
//! lock: readers that hit a torn or missing file retry with backoff.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use sha2::{Digest, Sha256};

use super::WorkflowState;
use crate::error::BatonError;
use crate::workflow::schema::split_frontmatter;

/// Name of the per-project control directory.
pub const CONTROL_DIR: &str = ".baton";

const STATE_FILE: &str = "state.json";
const RESPONSE_FILE: &str = "response.txt";
const RUNS_DIR: &str = "runs";

const READ_RETRIES: u32 = 5;
const READ_BACKOFF_MS: u64 = 50;

/// SHA-256 (hex) of a goal document's body, frontmatter excluded.
pub fn goal_checksum(document: &str) -> Result<String, BatonError> {
    let (_, body) = split_frontmatter(document)?;
    let digest = Sha256::digest(body.as_bytes());
    Ok(hex::encode(digest))
}

/// Whether an existing state may be continued by a new run.
pub fn can_resume(state: &WorkflowState, fresh_requested: bool, current_checksum: &str) -> bool {
    if fresh_requested {
        return false;
    }
    if state.goal_checksum != current_checksum {
        return false;
    }
    // `complete` written by an agent but never confirmed: the engine died
    // before its checks finished, so the run continues
    !state.is_finished()
}

/// File-backed store for one project's workflow state.
#[derive(Debug, Clone)]
pub struct StateStore {
    /// Project root (the directory holding the goal document)
    project_dir: PathBuf,
    /// `<project>/.baton`
    control_dir: PathBuf,
}

impl StateStore {
    pub fn new(project_dir: impl AsRef<Path>) -> Self {
        let project_dir = project_dir.as_ref().to_path_buf();
        let control_dir = project_dir.join(CONTROL_DIR);
        Self {
            project_dir,
            control_dir,
        }
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    pub fn control_dir(&self) -> &Path {
        &self.control_dir
    }

    pub fn state_path(&self) -> PathBuf {
        self.control_dir.join(STATE_FILE)
    }

    pub fn response_path(&self) -> PathBuf {
        self.control_dir.join(RESPONSE_FILE)
    }

    pub fn run_dir(&self, run_id: &str) -> PathBuf {
        self.control_dir.join(RUNS_DIR).join(run_id)
    }

    /// Load the state. Returns a fresh default and `false` when none exists.
    pub fn load(&self) -> Result<(WorkflowState, bool), BatonError> {
        let path = self.state_path();
        if !path.exists() {
            return Ok((WorkflowState::new(String::new()), false));
        }

        let content = std::fs::read_to_string(&path).map_err(|e| {
            BatonError::Io(format!("Failed to read '{}': {}", path.display(), e))
        })?;
        let state = serde_json::from_str::<WorkflowState>(&content).map_err(|e| {
            BatonError::Serialization(format!("Invalid state file '{}': {}", path.display(), e))
        })?;
        Ok((state, true))
    }

    /// Load, retrying parse/read failures with linear backoff. Blocks the
    /// calling thread; async code uses [`load_with_retry_async`](Self::load_with_retry_async).
    pub fn load_with_retry(&self) -> Result<(WorkflowState, bool), BatonError> {
        let mut attempt = 0;
        loop {
            match self.load() {
                Ok(loaded) => return Ok(loaded),
                Err(e) if attempt + 1 < READ_RETRIES => {
                    attempt += 1;
                    tracing::debug!("[StateStore] Read attempt {} failed: {}", attempt, e);
                    std::thread::sleep(retry_delay(attempt));
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub async fn load_with_retry_async(&self) -> Result<(WorkflowState, bool), BatonError> {
        let mut attempt = 0;
        loop {
            match self.load() {
                Ok(loaded) => return Ok(loaded),
                Err(e) if attempt + 1 < READ_RETRIES => {
                    attempt += 1;
                    tracing::debug!("[StateStore] Read attempt {} failed: {}", attempt, e);
                    tokio::time::sleep(retry_delay(attempt)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// `base`, or `base-2`, `base-3`... when a run directory or `taken`
    /// already uses it.
    pub fn unique_run_id(&self, base: &str, taken: Option<&str>) -> String {
        let mut candidate = base.to_string();
        let mut n = 1;
        while taken == Some(candidate.as_str()) || self.run_dir(&candidate).exists() {
            n += 1;
            candidate = format!("{}-{}", base, n);
        }
        candidate
    }

    /// Load an existing state, failing when there is none.
    pub fn load_existing(&self) -> Result<WorkflowState, BatonError> {
        match self.load_with_retry()? {
            (state, true) => Ok(state),
            (_, false) => Err(BatonError::NoState(self.state_path().display().to_string())),
        }
    }

    /// Atomically write the state, stamping `updatedAt`.
    pub fn save(&self, state: &mut WorkflowState) -> Result<(), BatonError> {
        state.updated_at = Utc::now();
        let json = serde_json::to_string_pretty(state)
            .map_err(|e| BatonError::Persist(format!("serialize: {}", e)))?;
        write_atomic(&self.control_dir, &self.state_path(), json.as_bytes())
    }

    /// Load-modify-save for writers outside the engine loop.
    pub fn update<T, F>(&self, f: F) -> Result<T, BatonError>
    where
        F: FnOnce(&mut WorkflowState) -> Result<T, BatonError>,
    {
        let mut state = self.load_existing()?;
        let result = f(&mut state)?;
        self.save(&mut state)?;
        Ok(result)
    }

    /// Remove the state file (explicit fresh start).
    pub fn discard(&self) -> Result<(), BatonError> {
        let path = self.state_path();
        match std::fs::remove_file(&path) {
            Ok(()) => {
                tracing::info!("[StateStore] Discarded {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BatonError::Persist(format!(
                "Failed to remove '{}': {}",
                path.display(),
                e
            ))),
        }
    }

    /// Atomically write the human response artifact.
    pub fn write_response(&self, text: &str) -> Result<(), BatonError> {
        write_atomic(&self.control_dir, &self.response_path(), text.as_bytes())
    }

    /// Read and delete the response artifact. `None` when absent.
    pub fn take_response(&self) -> Result<Option<String>, BatonError> {
        let path = self.response_path();
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(BatonError::Io(format!(
                    "Failed to read '{}': {}",
                    path.display(),
                    e
                )))
            }
        };
        std::fs::remove_file(&path).map_err(|e| {
            BatonError::Io(format!("Failed to remove '{}': {}", path.display(), e))
        })?;
        Ok(Some(content))
    }
}

fn retry_delay(attempt: u32) -> Duration {
    Duration::from_millis(READ_BACKOFF_MS * attempt as u64)
}

fn write_atomic(dir: &Path, target: &Path, bytes: &[u8]) -> Result<(), BatonError> {
    std::fs::create_dir_all(dir).map_err(|e| {
        BatonError::Persist(format!("Failed to create '{}': {}", dir.display(), e))
    })?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| BatonError::Persist(format!("temp file: {}", e)))?;
    tmp.write_all(bytes)
        .and_then(|_| tmp.flush())
        .map_err(|e| BatonError::Persist(format!("write: {}", e)))?;
    tmp.persist(target).map_err(|e| {
        BatonError::Persist(format!("rename to '{}': {}", target.display(), e.error))
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::WorkflowStatus;

    #[test]
    fn test_checksum_ignores_frontmatter() {
        let a = "---\nflow: a -> b\n---\n# Goal\nBuild it.\n";
        let b = "---\nflow: a -> b\ninteractive:   no\n\n---\n# Goal\nBuild it.\n";
        let c = "---\nflow: a -> b\n---\n# Goal\nBuild it!\n";

        assert_eq!(goal_checksum(a).unwrap(), goal_checksum(a).unwrap());
        assert_eq!(goal_checksum(a).unwrap(), goal_checksum(b).unwrap());
        assert_ne!(goal_checksum(a).unwrap(), goal_checksum(c).unwrap());
        assert_eq!(goal_checksum(a).unwrap().len(), 64);
    }

    #[test]
    fn test_can_resume() {
        let mut state = WorkflowState::new("sum");
        assert!(can_resume(&state, false, "sum"));
        assert!(!can_resume(&state, true, "sum"));
        assert!(!can_resume(&state, false, "other"));

        state.status = WorkflowStatus::WaitingForHuman;
        assert!(can_resume(&state, false, "sum"));
        state.status = WorkflowStatus::AgentDone;
        assert!(can_resume(&state, false, "sum"));
        state.status = WorkflowStatus::Complete;
        assert!(can_resume(&state, false, "sum"));
        state.completion_confirmed = true;
        assert!(!can_resume(&state, false, "sum"));
    }

    #[test]
    fn test_unique_run_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        assert_eq!(store.unique_run_id("20260101-120000-000", None), "20260101-120000-000");
        assert_eq!(
            store.unique_run_id("20260101-120000-000", Some("20260101-120000-000")),
            "20260101-120000-000-2"
        );

        std::fs::create_dir_all(store.run_dir("20260101-120000-000-2")).unwrap();
        assert_eq!(
            store.unique_run_id("20260101-120000-000", Some("20260101-120000-000")),
            "20260101-120000-000-3"
        );
    }

    #[tokio::test]
    async fn test_async_load_retries_torn_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        std::fs::create_dir_all(store.control_dir()).unwrap();
        std::fs::write(store.state_path(), "{\"status\": ").unwrap();

        let writer = store.clone();
        let fixer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            writer.save(&mut WorkflowState::new("sum")).unwrap();
        });

        let (state, found) = store.load_with_retry_async().await.unwrap();
        fixer.await.unwrap();
        assert!(found);
        assert_eq!(state.goal_checksum, "sum");
    }

    #[test]
    fn test_load_save_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());

        let (_, found) = store.load().unwrap();
        assert!(!found);

        let mut state = WorkflowState::new("sum");
        state.seed_visit_counts(["coordinator", "developer"]);
        state.enter_agent("coordinator");
        state.post_message("coordinator", "developer", "go");
        state.record_progress("coordinator", "planned");
        store.save(&mut state).unwrap();

        let (loaded, found) = store.load().unwrap();
        assert!(found);
        assert_eq!(loaded, state);

        // save without mutation keeps every semantic field
        let mut again = loaded.clone();
        store.save(&mut again).unwrap();
        let (reloaded, _) = store.load().unwrap();
        assert_eq!(
            WorkflowState { updated_at: loaded.updated_at, ..reloaded },
            loaded
        );
    }

    #[test]
    fn test_update_requires_existing_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        assert!(matches!(
            store.update(|_| Ok(())),
            Err(BatonError::NoState(_))
        ));

        store.save(&mut WorkflowState::new("sum")).unwrap();
        let id = store
            .update(|s| Ok(s.post_message("a", "b", "c")))
            .unwrap();
        assert_eq!(store.load_existing().unwrap().messages[0].id, id);
    }

    #[test]
    fn test_response_consumed_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());

        assert_eq!(store.take_response().unwrap(), None);
        store.write_response("yes, go ahead").unwrap();
        assert_eq!(store.take_response().unwrap().as_deref(), Some("yes, go ahead"));
        assert_eq!(store.take_response().unwrap(), None);
    }

    #[test]
    fn test_discard() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        store.discard().unwrap();
        store.save(&mut WorkflowState::new("sum")).unwrap();
        store.discard().unwrap();
        assert!(!store.state_path().exists());
    }
}
