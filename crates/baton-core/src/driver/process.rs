//! Subprocess driver: spawns the configured agent CLI, writes the prompt to
//! stdin and folds its NDJSON stdout into a [`TurnResult`].

use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::events::{parse_event_line, OutputRing, TurnRecorder};
use super::{AgentDriver, TurnRequest, TurnResult, OUTPUT_TAIL_LINES};
use crate::error::BatonError;
use crate::workflow::schema::DriverConfig;

pub struct ProcessDriver {
    config: DriverConfig,
}

impl ProcessDriver {
    pub fn new(config: DriverConfig) -> Self {
        Self { config }
    }

    fn build_command(&self, request: &TurnRequest) -> Command {
        let mut cmd = Command::new(&self.config.command);
        cmd.args(&self.config.args);

        if let (Some(flag), Some(model)) = (&self.config.model_flag, &request.model) {
            cmd.args([flag, model]);
        }
        if let Some(flag) = &self.config.agent_flag {
            cmd.args([flag, &request.agent]);
        }

        cmd.current_dir(&request.project_dir);
        cmd.env("BATON_PROJECT_DIR", &request.project_dir);
        cmd.env("BATON_AGENT", &request.agent);
        match &request.model {
            Some(model) => cmd.env("BATON_MODEL", model),
            None => cmd.env_remove("BATON_MODEL"),
        };

        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd
    }
}

/// Next output line with invalid UTF-8 replaced. `None` at EOF or when the
/// pipe fails.
async fn next_line_lossy<R>(reader: &mut R, buf: &mut Vec<u8>) -> Option<String>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    match reader.read_until(b'\n', buf).await {
        Ok(0) => None,
        Ok(_) => Some(
            String::from_utf8_lossy(buf)
                .trim_end_matches(|c: char| c == '\n' || c == '\r')
                .to_string(),
        ),
        Err(e) => {
            tracing::debug!("[Driver] Output read failed: {}", e);
            None
        }
    }
}

fn label(request: &TurnRequest) -> String {
    match &request.model {
        Some(model) => format!("{}:{}", request.agent, model),
        None => request.agent.clone(),
    }
}

#[async_trait]
impl AgentDriver for ProcessDriver {
    async fn run_turn(
        &self,
        request: &TurnRequest,
        cancel: &CancellationToken,
    ) -> Result<TurnResult, BatonError> {
        let name = label(request);
        tracing::info!(
            "[Driver:{}] Spawning: {} {} (cwd: {})",
            name,
            self.config.command,
            self.config.args.join(" "),
            request.project_dir.display()
        );

        let mut child = self.build_command(request).spawn().map_err(|e| {
            BatonError::Driver(format!(
                "Failed to spawn '{}' - is it installed? Error: {}",
                self.config.command, e
            ))
        })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| BatonError::Driver("Failed to get stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BatonError::Driver("Failed to get stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| BatonError::Driver("Failed to get stderr".to_string()))?;

        // Written from a task so a child that never reads stdin can't stall us.
        let prompt = request.prompt.clone();
        let stdin_name = name.clone();
        tokio::spawn(async move {
            if let Err(e) = stdin.write_all(prompt.as_bytes()).await {
                tracing::debug!("[Driver:{}] stdin write failed: {}", stdin_name, e);
            }
            let _ = stdin.shutdown().await;
        });

        let ring = Arc::new(Mutex::new(OutputRing::new(OUTPUT_TAIL_LINES)));

        let stdout_ring = ring.clone();
        let stdout_task = tokio::spawn(async move {
            let mut recorder = TurnRecorder::new();
            let mut reader = BufReader::new(stdout);
            let mut buf = Vec::new();
            while let Some(line) = next_line_lossy(&mut reader, &mut buf).await {
                if line.trim().is_empty() {
                    continue;
                }
                stdout_ring.lock().await.push(line.as_str());
                if let Some(event) = parse_event_line(&line) {
                    recorder.apply(event);
                }
            }
            recorder
        });

        let stderr_ring = ring.clone();
        let stderr_name = name.clone();
        let stderr_task = tokio::spawn(async move {
            let mut reader = BufReader::new(stderr);
            let mut buf = Vec::new();
            while let Some(line) = next_line_lossy(&mut reader, &mut buf).await {
                if line.trim().is_empty() {
                    continue;
                }
                tracing::debug!("[Driver:{} stderr] {}", stderr_name, line);
                stderr_ring.lock().await.push(line);
            }
        });

        let pid = child.id();
        let status = tokio::select! {
            status = child.wait() => status,
            _ = cancel.cancelled() => {
                tracing::warn!("[Driver:{}] Cancelled; leaving process {:?} running", name, pid);
                return Ok(TurnResult {
                    output_tail: ring.lock().await.lines(),
                    ..TurnResult::cancelled()
                });
            }
        };

        let status = status
            .map_err(|e| BatonError::Driver(format!("Failed to wait for driver: {}", e)))?;

        let recorder = stdout_task.await.unwrap_or_else(|e| {
            tracing::warn!("[Driver:{}] stdout reader failed: {}", name, e);
            TurnRecorder::new()
        });
        let _ = stderr_task.await;

        let output_tail = ring.lock().await.lines();
        tracing::info!(
            "[Driver:{}] Exited with {:?} ({} steps)",
            name,
            status.code(),
            recorder.steps.len()
        );

        Ok(TurnResult {
            exit_code: status.code(),
            success: status.success(),
            cancelled: false,
            transcript: recorder.transcript,
            steps: recorder.steps,
            output_tail,
        })
    }
}
