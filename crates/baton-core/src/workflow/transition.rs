//! Transition selector: decides which agent runs after the current one.
//!
//! Order of precedence:
//! 1. an agent with pending unread mail (oldest message first),
//! 2. the first declared successor in the flow graph,
//! 3. at a terminal node, a hand-back to the coordinator.

use crate::error::BatonError;
use crate::state::WorkflowState;
use crate::workflow::flow::{FlowGraph, COORDINATOR};
use crate::workflow::schema::GoalConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Unread mail is waiting for this agent
    Redirect { agent: String, message_id: u64 },
    /// Follow the graph edge
    Advance(String),
    /// Terminal node reached; control returns to the coordinator
    HandBack(String),
    /// Terminal node with nowhere to go
    Terminal,
}

impl Transition {
    pub fn target(&self) -> Option<&str> {
        match self {
            Transition::Redirect { agent, .. } => Some(agent),
            Transition::Advance(agent) | Transition::HandBack(agent) => Some(agent),
            Transition::Terminal => None,
        }
    }
}

/// Pick the next agent after `current` finished or yielded. Mail only
/// redirects when its recipient will actually read it.
pub fn select_next(
    graph: &FlowGraph,
    config: &GoalConfig,
    state: &WorkflowState,
    current: &str,
) -> Result<Transition, BatonError> {
    let deliverable = |agent: &str, model: Option<&str>| {
        graph.contains(agent) && model.map_or(true, |m| config.reads_variant(agent, m))
    };
    if let Some((agent, message_id)) = state.oldest_unread_recipient(deliverable) {
        return Ok(Transition::Redirect { agent, message_id });
    }

    if let Some(next) = graph.next(current) {
        return Ok(Transition::Advance(next.to_string()));
    }

    if !graph.is_terminal(current) {
        return Err(BatonError::Config(format!(
            "agent '{}' has outgoing edges but no successor could be selected",
            current
        )));
    }

    if current != COORDINATOR && graph.contains(COORDINATOR) {
        return Ok(Transition::HandBack(COORDINATOR.to_string()));
    }

    Ok(Transition::Terminal)
}
