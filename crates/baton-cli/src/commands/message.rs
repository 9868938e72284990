//! `baton message`: the inter-agent mailbox.

use std::path::Path;

use baton_core::state::mailbox::format_messages;
use baton_core::state::{split_address, Message};

use super::{goal_path, load_goal, store, Caller};

pub fn send(project_dir: &Path, caller: &Caller, to: &str, body: &str) -> Result<(), String> {
    let from = caller.display_name();
    // variant addresses are checked against the goal's model list
    let variants = match split_address(to) {
        (agent, Some(_)) => load_goal(&goal_path(project_dir, None))?
            .config
            .models_for(agent),
        (_, None) => Vec::new(),
    };
    let id = store(project_dir)
        .update(|state| state.send_message(&from, to, body, &variants))
        .map_err(|e| e.to_string())?;
    println!("Message #{} sent to {}", id, to);
    Ok(())
}

/// Messages visible to the caller: addressed to its agent or its variant.
fn visible<'a>(messages: &'a [Message], caller: &Caller, all: bool) -> Vec<&'a Message> {
    let agent = caller.agent.as_deref();
    let address = caller.address();
    messages
        .iter()
        .filter(|m| {
            all || agent.is_none()
                || Some(m.to_agent.as_str()) == agent
                || Some(&m.to_agent) == address.as_ref()
        })
        .collect()
}

pub fn list(project_dir: &Path, caller: &Caller, unread_only: bool, all: bool) -> Result<(), String> {
    let state = store(project_dir).load_existing().map_err(|e| e.to_string())?;
    let messages: Vec<Message> = visible(&state.messages, caller, all)
        .into_iter()
        .filter(|m| !unread_only || !m.read)
        .cloned()
        .collect();

    if messages.is_empty() {
        println!("No messages.");
        return Ok(());
    }
    for message in &messages {
        let marker = if message.read { " " } else { "*" };
        let first_line = message.body.lines().next().unwrap_or("");
        println!(
            "{} #{:<4} {} -> {}: {}",
            marker, message.id, message.from_agent, message.to_agent, first_line
        );
    }
    Ok(())
}

pub fn read(project_dir: &Path, caller: &Caller, id: u64) -> Result<(), String> {
    let reader = caller.display_name();
    let message = store(project_dir)
        .update(|state| {
            state.mark_read(id, &reader)?;
            Ok(state.messages.iter().find(|m| m.id == id).cloned())
        })
        .map_err(|e| e.to_string())?;

    match message {
        Some(message) => {
            print!("{}", format_messages(std::slice::from_ref(&message)));
            Ok(())
        }
        None => Err(format!("No message with id {}", id)),
    }
}
