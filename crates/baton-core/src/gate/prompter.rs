//! Local answer channel for the human gate.
//!
//! The core only defines the seam; the CLI supplies a terminal implementation.
//! Whatever a prompter returns is submitted through the same artifact + status
//! handshake a remote responder uses.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::BatonError;
use crate::state::MultiChoiceQuestion;

/// A pending question, as shown to the person answering it.
#[derive(Debug, Clone)]
pub struct HumanRequest {
    pub agent: String,
    pub message: String,
    pub question: Option<MultiChoiceQuestion>,
    /// Editor for free-text answers, already resolved
    pub editor: Option<String>,
    /// Fires once a local answer is no longer wanted: the question was
    /// answered through `baton respond` or the run stopped. A prompter that
    /// cannot stop its input must discard whatever it reads afterwards.
    pub withdrawn: CancellationToken,
}

#[async_trait]
pub trait HumanPrompter: Send + Sync {
    /// Collect a formatted answer. `Ok(None)` means no local answer is
    /// possible and the gate should wait for a remote responder.
    async fn prompt(&self, request: &HumanRequest) -> Result<Option<String>, BatonError>;
}

/// Prompter that never answers; the gate waits for `baton respond`.
pub struct RemoteOnly;

#[async_trait]
impl HumanPrompter for RemoteOnly {
    async fn prompt(&self, _request: &HumanRequest) -> Result<Option<String>, BatonError> {
        Ok(None)
    }
}

/// Configured editor, then `$VISUAL`, then `$EDITOR`.
pub fn resolve_editor(configured: Option<&str>) -> Option<String> {
    configured
        .map(str::to_string)
        .or_else(|| std::env::var("VISUAL").ok())
        .or_else(|| std::env::var("EDITOR").ok())
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty())
}

const RESPONSE_MARKER: &str = "----- write your response below this line -----";

/// Scratch-file contents for a free-text answer.
pub fn editor_template(request: &HumanRequest) -> String {
    let mut out = format!("# Question from {}\n\n", request.agent);
    for line in request.message.lines() {
        out.push_str(line);
        out.push('\n');
    }
    out.push('\n');
    out.push_str(RESPONSE_MARKER);
    out.push_str("\n\n");
    out
}

/// Text the user wrote below the marker. If the marker was deleted the
/// whole buffer is the answer.
pub fn extract_editor_response(buffer: &str) -> Option<String> {
    let answer = match buffer.split_once(RESPONSE_MARKER) {
        Some((_, below)) => below,
        None => buffer,
    };
    let answer = answer.trim();
    (!answer.is_empty()).then(|| answer.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> HumanRequest {
        HumanRequest {
            agent: "architect".to_string(),
            message: "Postgres or SQLite?\nWe need multi-writer.".to_string(),
            question: None,
            editor: None,
            withdrawn: CancellationToken::new(),
        }
    }

    #[test]
    fn test_template_round_trip() {
        let template = editor_template(&request());
        assert!(template.contains("Postgres or SQLite?"));
        assert_eq!(extract_editor_response(&template), None);

        let edited = format!("{}Postgres, definitely.\n", template);
        assert_eq!(
            extract_editor_response(&edited).as_deref(),
            Some("Postgres, definitely.")
        );
    }

    #[test]
    fn test_marker_removed_uses_whole_buffer() {
        assert_eq!(
            extract_editor_response("  just do it \n").as_deref(),
            Some("just do it")
        );
        assert_eq!(extract_editor_response("   \n"), None);
    }

    #[test]
    fn test_configured_editor_wins() {
        assert_eq!(resolve_editor(Some("nano")).as_deref(), Some("nano"));
    }

    #[tokio::test]
    async fn test_remote_only_never_answers() {
        assert_eq!(RemoteOnly.prompt(&request()).await.unwrap(), None);
    }
}
