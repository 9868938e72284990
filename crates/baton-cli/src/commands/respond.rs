//! `baton respond`: answer a pending question from another terminal,
//! a script, or a web handler.

use std::path::Path;

use baton_core::gate::submit_response;

use super::store;

pub fn respond(project_dir: &Path, text: Option<&str>, file: Option<&Path>) -> Result<(), String> {
    let text = match (text, file) {
        (Some(text), _) => text.to_string(),
        (None, Some(path)) => std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read '{}': {}", path.display(), e))?,
        (None, None) => return Err("Provide the response text or --file".to_string()),
    };
    if text.trim().is_empty() {
        return Err("Response is empty".to_string());
    }

    submit_response(&store(project_dir), "human", text.trim()).map_err(|e| e.to_string())?;
    println!("Response submitted.");
    Ok(())
}
