//! Turn prompt composition.

use crate::state::mailbox::format_messages;
use crate::state::{Message, WorkflowState};
use crate::workflow::flow::{FlowGraph, COORDINATOR};

pub struct PromptContext<'a> {
    pub agent: &'a str,
    pub model: Option<&'a str>,
    pub graph: &'a FlowGraph,
    pub goal: &'a str,
    pub state: &'a WorkflowState,
    /// Messages delivered inline with this turn
    pub messages: &'a [Message],
}

fn list_or(items: &[&str], empty: &str) -> String {
    if items.is_empty() {
        empty.to_string()
    } else {
        items.join(", ")
    }
}

pub fn compose_prompt(ctx: &PromptContext<'_>) -> String {
    let mut out = String::new();

    out.push_str(&format!(
        "You are the `{}` agent in a multi-agent software development workflow",
        ctx.agent
    ));
    if let Some(model) = ctx.model {
        out.push_str(&format!(" (model variant `{}`)", model));
    }
    out.push_str(".\n\n");

    out.push_str("## Goal\n\n");
    out.push_str(ctx.goal.trim());
    out.push_str("\n\n");

    let visits = ctx.state.visit_counts.get(ctx.agent).copied().unwrap_or(0);
    let handoff_target = if ctx.agent == COORDINATOR {
        "none"
    } else {
        "none; when you finish, control returns to the coordinator"
    };
    out.push_str("## Flow position\n\n");
    out.push_str(&format!("- Visit: {}\n", visits));
    out.push_str(&format!(
        "- Receives work from: {}\n",
        list_or(&ctx.graph.predecessors(ctx.agent), "none (entry point)")
    ));
    out.push_str(&format!(
        "- Hands work to: {}\n\n",
        list_or(&ctx.graph.successors(ctx.agent), handoff_target)
    ));

    out.push_str("## Mailbox\n\n");
    if ctx.messages.is_empty() {
        out.push_str("No new messages.\n\n");
    } else {
        out.push_str(&format!("{} new message(s):\n\n", ctx.messages.len()));
        out.push_str(&format_messages(ctx.messages));
    }

    let pending = ctx.state.pending_todos(ctx.agent);
    out.push_str("## Todos\n\n");
    out.push_str(&format!(
        "You have {} pending todo(s). Run `baton todo list` to see them.\n",
        pending
    ));
    if ctx.agent == COORDINATOR {
        out.push_str(&format!(
            "The project has {} open todo(s); `baton todo list --project` shows them. \
             The workflow cannot complete while any remain open.\n",
            ctx.state.pending_project_todos().len()
        ));
    }
    out.push('\n');

    out.push_str("## Reporting back\n\n");
    out.push_str("Use the `baton` command to record what you do:\n");
    out.push_str("- `baton progress \"<what you did>\"`\n");
    out.push_str("- `baton message send --to <agent> \"<note>\"` to hand information to another agent\n");
    out.push_str("- `baton todo add \"<task>\"` / `baton todo update <id> <status>`\n");
    out.push_str("- `baton agent ask \"<question>\"` when you need a human decision\n");
    out.push_str("- `baton agent done` when your part of the work is finished\n");
    if ctx.agent == COORDINATOR {
        out.push_str("- `baton agent complete` when the whole goal is achieved\n");
    }
    out
}
