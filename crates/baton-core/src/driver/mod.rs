//! Agent driver: one external process invocation per agent turn.
//!
//! The engine never talks to a model itself. It hands a [`TurnRequest`] to an
//! [`AgentDriver`], which runs the external tool, streams its NDJSON events
//! and returns a [`TurnResult`]. The agent's decisions (status, messages,
//! todos) arrive separately: the process calls the `baton` CLI, which writes
//! the shared state file.

pub mod events;
pub mod process;

use std::path::PathBuf;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::BatonError;
use crate::state::StepCost;

pub use events::{
    clear_ansi, parse_event_line, DriverEvent, OutputRing, ToolCall, ToolStatus, TranscriptEntry,
    TurnRecorder,
};
pub use process::ProcessDriver;

/// Raw output lines kept per turn.
pub const OUTPUT_TAIL_LINES: usize = 200;

/// Everything needed to run one turn.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub agent: String,
    /// Model variant, `None` when the driver's default model is used
    pub model: Option<String>,
    pub prompt: String,
    pub project_dir: PathBuf,
}

/// What came back from one turn.
#[derive(Debug, Clone, Default)]
pub struct TurnResult {
    /// Exit code, `None` when killed by a signal or cancelled
    pub exit_code: Option<i32>,
    pub success: bool,
    /// The engine stopped waiting because the run was cancelled
    pub cancelled: bool,
    pub transcript: Vec<TranscriptEntry>,
    pub steps: Vec<StepCost>,
    /// Last raw stdout/stderr lines
    pub output_tail: Vec<String>,
}

impl TurnResult {
    pub fn cancelled() -> Self {
        Self {
            cancelled: true,
            ..Default::default()
        }
    }

    /// Failed without being cancelled.
    pub fn failed(&self) -> bool {
        !self.success && !self.cancelled
    }
}

#[async_trait]
pub trait AgentDriver: Send + Sync {
    /// Run one turn. `Err` means the process could not be started at all;
    /// a non-zero exit is reported through [`TurnResult::success`].
    async fn run_turn(
        &self,
        request: &TurnRequest,
        cancel: &CancellationToken,
    ) -> Result<TurnResult, BatonError>;
}
