//! `baton progress`: append to the audit trail.

use std::path::Path;

use super::{store, Caller};

pub fn record(project_dir: &Path, caller: &Caller, description: &str) -> Result<(), String> {
    let description = description.trim();
    if description.is_empty() {
        return Err("Progress description is empty".to_string());
    }
    let who = caller.display_name();
    store(project_dir)
        .update(|state| {
            state.record_progress(&who, description);
            Ok(())
        })
        .map_err(|e| e.to_string())?;
    Ok(())
}
