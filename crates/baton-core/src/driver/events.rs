//! Driver event stream: one JSON object per line on the driver's stdout.
//!
//! ```text
//! {"type":"text","text":"Looking at the failing test..."}
//! {"type":"tool","id":"t1","name":"bash","status":"running","input":{"command":"cargo test"}}
//! {"type":"tool","id":"t1","name":"bash","status":"completed","output":"ok"}
//! {"type":"step_finish","cost":0.0123,"model":"anthropic/claude-sonnet-4","tokens":{"input":1200,"output":300}}
//! {"type":"error","message":"rate limited"}
//! ```
//!
//! Lines that are not JSON objects, or that carry an unknown `type`, are ignored.

use std::collections::VecDeque;
use std::sync::OnceLock;

use chrono::Utc;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::state::{StepCost, TokenUsage};

/// Lifecycle of a tool call reported by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Pending,
    Running,
    Completed,
    Error,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DriverEvent {
    Text {
        text: String,
    },
    Tool {
        id: String,
        #[serde(default)]
        name: Option<String>,
        status: ToolStatus,
        #[serde(default)]
        input: Option<serde_json::Value>,
        #[serde(default)]
        output: Option<String>,
    },
    StepFinish {
        #[serde(default)]
        cost: f64,
        #[serde(default)]
        model: Option<String>,
        #[serde(default)]
        tokens: TokenUsage,
    },
    Error {
        message: String,
    },
    #[serde(other)]
    Unknown,
}

/// A tool call as it stands after the turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub status: ToolStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

/// Ordered record of what the driver said and did during one turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TranscriptEntry {
    Text { text: String },
    Tool(ToolCall),
    Error { message: String },
}

fn ansi_regex() -> &'static Regex {
    static ANSI: OnceLock<Regex> = OnceLock::new();
    ANSI.get_or_init(|| Regex::new(r"\x1b\[[0-9;]*m").expect("static regex"))
}

pub fn clear_ansi(text: &str) -> String {
    ansi_regex().replace_all(text, "").to_string()
}

/// Parse one stdout line. `None` for anything that isn't a known event.
pub fn parse_event_line(line: &str) -> Option<DriverEvent> {
    let line = clear_ansi(line.trim());
    if !line.starts_with('{') {
        return None;
    }
    match serde_json::from_str::<DriverEvent>(&line) {
        Ok(DriverEvent::Unknown) => None,
        Ok(event) => Some(event),
        Err(e) => {
            tracing::debug!(
                "[Driver] Ignoring unparseable line: {} - {}",
                e,
                preview(&line, LOG_PREVIEW_CHARS)
            );
            None
        }
    }
}

const LOG_PREVIEW_CHARS: usize = 100;

/// First `max` characters of `line`, cut on a character boundary.
pub(crate) fn preview(line: &str, max: usize) -> String {
    line.chars().take(max).collect()
}

/// Folds events into a transcript and cost steps.
#[derive(Debug, Default)]
pub struct TurnRecorder {
    pub transcript: Vec<TranscriptEntry>,
    pub steps: Vec<StepCost>,
}

impl TurnRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, event: DriverEvent) {
        match event {
            DriverEvent::Text { text } => {
                // consecutive deltas collapse into one narration entry
                if let Some(TranscriptEntry::Text { text: last }) = self.transcript.last_mut() {
                    last.push_str(&text);
                } else {
                    self.transcript.push(TranscriptEntry::Text { text });
                }
            }
            DriverEvent::Tool {
                id,
                name,
                status,
                input,
                output,
            } => {
                let existing = self.transcript.iter_mut().find_map(|entry| match entry {
                    TranscriptEntry::Tool(call) if call.id == id => Some(call),
                    _ => None,
                });
                match existing {
                    Some(call) => {
                        call.status = status;
                        if let Some(name) = name {
                            call.name = name;
                        }
                        if input.is_some() {
                            call.input = input;
                        }
                        if output.is_some() {
                            call.output = output;
                        }
                    }
                    None => self.transcript.push(TranscriptEntry::Tool(ToolCall {
                        id,
                        name: name.unwrap_or_else(|| "unknown".to_string()),
                        status,
                        input,
                        output,
                    })),
                }
            }
            DriverEvent::StepFinish {
                cost,
                model,
                tokens,
            } => self.steps.push(StepCost {
                timestamp: Utc::now(),
                model,
                cost,
                tokens,
            }),
            DriverEvent::Error { message } => {
                tracing::warn!("[Driver] Reported error: {}", message);
                self.transcript.push(TranscriptEntry::Error { message });
            }
            DriverEvent::Unknown => {}
        }
    }
}

/// Bounded buffer of the most recent raw output lines.
#[derive(Debug, Clone)]
pub struct OutputRing {
    capacity: usize,
    lines: VecDeque<String>,
}

impl OutputRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            lines: VecDeque::with_capacity(capacity.max(1)),
        }
    }

    pub fn push(&mut self, line: impl Into<String>) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line.into());
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}
