//! `baton todo`: agent-scoped and project-scoped todo lists.

use std::path::Path;

use baton_core::state::{Todo, TodoPriority, TodoStatus};

use super::{store, Caller};

/// `None` selects the project list.
fn owner<'a>(caller: &'a Caller, project: bool) -> Result<Option<&'a str>, String> {
    if project {
        Ok(None)
    } else {
        caller.require_agent().map(Some)
    }
}

pub fn add(
    project_dir: &Path,
    caller: &Caller,
    content: &str,
    priority: &str,
    project: bool,
) -> Result<(), String> {
    let priority: TodoPriority = priority.parse()?;
    let owner = owner(caller, project)?;
    let who = caller.display_name();

    let id = store(project_dir)
        .update(|state| {
            let id = state.add_todo(owner, content, priority);
            state.record_progress(&who, format!("Added todo {}: {}", id, content));
            Ok(id)
        })
        .map_err(|e| e.to_string())?;
    println!("Added todo {}", id);
    Ok(())
}

pub fn update(
    project_dir: &Path,
    caller: &Caller,
    id: &str,
    status: &str,
    project: bool,
) -> Result<(), String> {
    let status: TodoStatus = status.parse()?;
    let owner = owner(caller, project)?;

    let found = store(project_dir)
        .update(|state| Ok(state.update_todo(owner, id, status)))
        .map_err(|e| e.to_string())?;
    if !found {
        return Err(format!(
            "No todo '{}' in the {} list",
            id,
            owner.unwrap_or("project")
        ));
    }
    println!("Todo {} is now {:?}", id, status);
    Ok(())
}

fn print_todos(todos: &[Todo]) {
    if todos.is_empty() {
        println!("No todos.");
        return;
    }
    for todo in todos {
        let mark = match todo.status {
            TodoStatus::Completed => "[x]",
            TodoStatus::Cancelled => "[-]",
            TodoStatus::InProgress => "[~]",
            TodoStatus::Pending => "[ ]",
        };
        println!("{} {:<4} ({:?}) {}", mark, todo.id, todo.priority, todo.content);
    }
}

pub fn list(project_dir: &Path, caller: &Caller, project: bool) -> Result<(), String> {
    let owner = owner(caller, project)?;
    let state = store(project_dir).load_existing().map_err(|e| e.to_string())?;
    match owner {
        Some(agent) => print_todos(state.todos.get(agent).map(Vec::as_slice).unwrap_or(&[])),
        None => print_todos(&state.project_todos),
    }
    Ok(())
}
