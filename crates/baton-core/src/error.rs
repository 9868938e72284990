//! Core error type for the Baton engine.
//!
//! `BatonError` covers the fatal tier (malformed flow, unreadable goal,
//! persistence failures) plus the few conditions the CLI needs to map to a
//! distinct exit code. Recoverable conditions (gate failures, driver crashes)
//! never surface here; they become workflow state.

#[derive(Debug, thiserror::Error)]
pub enum BatonError {
    #[error("Malformed flow specification (line {line}): {message}")]
    MalformedSpec { line: usize, message: String },

    #[error("Goal document error: {0}")]
    Goal(String),

    #[error("Failed to persist state: {0}")]
    Persist(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unknown agent: {0}")]
    UnknownAgent(String),

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("Human input required: {0}")]
    HumanInputRequired(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No workflow state found at {0}")]
    NoState(String),
}

impl From<std::io::Error> for BatonError {
    fn from(e: std::io::Error) -> Self {
        BatonError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for BatonError {
    fn from(e: serde_json::Error) -> Self {
        BatonError::Serialization(e.to_string())
    }
}

pub type Result<T, E = BatonError> = std::result::Result<T, E>;
