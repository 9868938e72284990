//! Message mailbox: append-only, ID-stamped notes between agents.
//!
//! Addresses are either a bare agent name or `agent:model` for one model
//! variant. IDs come from `next_message_id`, so they stay strictly increasing
//! even if an external tool prunes the list.

use std::collections::BTreeMap;

use chrono::Utc;

use super::{split_address, variant_key, Message, WorkflowState};
use crate::error::BatonError;

/// Sender used for messages the engine itself produces.
pub const ENVIRONMENT: &str = "environment";

impl WorkflowState {
    /// Append a message without validating the recipient. Returns its ID.
    pub fn post_message(&mut self, from: &str, to: &str, body: impl Into<String>) -> u64 {
        let floor = self.messages.iter().map(|m| m.id).max().unwrap_or(0) + 1;
        let id = self.next_message_id.max(floor);
        self.next_message_id = id + 1;

        self.messages.push(Message {
            id,
            from_agent: from.to_string(),
            to_agent: to.to_string(),
            body: body.into(),
            read: false,
            created_at: Utc::now(),
            read_at: None,
            read_by: None,
        });
        id
    }

    /// Append a message after checking the recipient. A bare agent must be
    /// known; an `agent:model` address must name one of `variants`, the
    /// models configured for that agent.
    pub fn send_message(
        &mut self,
        from: &str,
        to: &str,
        body: impl Into<String>,
        variants: &[String],
    ) -> Result<u64, BatonError> {
        let (agent, model) = split_address(to);
        if !self.is_known_agent(agent) {
            return Err(BatonError::UnknownAgent(format!(
                "'{}' (known agents: {})",
                agent,
                self.visit_counts
                    .keys()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", ")
            )));
        }
        if let Some(model) = model {
            if !variants.iter().any(|v| v == model) {
                let configured = if variants.is_empty() {
                    "none".to_string()
                } else {
                    variants.join(", ")
                };
                return Err(BatonError::UnknownAgent(format!(
                    "'{}' has no model variant '{}' (configured: {})",
                    agent, model, configured
                )));
            }
        }
        Ok(self.post_message(from, to, body))
    }

    /// Mark a message read. Returns `Ok(true)` if this call flipped the flag,
    /// `Ok(false)` if it was already read.
    pub fn mark_read(&mut self, id: u64, reader: &str) -> Result<bool, BatonError> {
        let message = self
            .messages
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| BatonError::Config(format!("No message with id {}", id)))?;

        if message.read {
            return Ok(false);
        }
        message.read = true;
        message.read_at = Some(Utc::now());
        message.read_by = Some(reader.to_string());
        Ok(true)
    }

    /// Unread messages a model variant should see: those addressed to the
    /// bare agent and those addressed to the variant itself.
    pub fn unread_for_variant(&self, agent: &str, model: Option<&str>) -> Vec<&Message> {
        let key = model.map(|m| variant_key(agent, m));
        self.messages
            .iter()
            .filter(|m| !m.read)
            .filter(|m| m.to_agent == agent || Some(&m.to_agent) == key.as_ref())
            .collect()
    }

    /// Mark every unread message addressed exactly to one of `addresses` as
    /// read by `reader`, returning copies of them in ID order.
    pub fn take_unread(&mut self, addresses: &[String], reader: &str) -> Vec<Message> {
        self.take_unread_where(reader, |to| addresses.iter().any(|a| a == to))
    }

    /// Like [`take_unread`](Self::take_unread), for the bare agent and every
    /// `agent:*` address.
    pub fn take_unread_for_agent(&mut self, agent: &str, reader: &str) -> Vec<Message> {
        self.take_unread_where(reader, |to| split_address(to).0 == agent)
    }

    fn take_unread_where<F>(&mut self, reader: &str, matches: F) -> Vec<Message>
    where
        F: Fn(&str) -> bool,
    {
        let now = Utc::now();
        let mut taken = Vec::new();
        for message in self.messages.iter_mut() {
            if !message.read && matches(&message.to_agent) {
                message.read = true;
                message.read_at = Some(now);
                message.read_by = Some(reader.to_string());
                taken.push(message.clone());
            }
        }
        taken
    }

    /// Recipient agent (model suffix stripped) of the oldest unread message
    /// whose `(agent, model)` address is accepted by `deliverable`.
    pub fn oldest_unread_recipient<F>(&self, deliverable: F) -> Option<(String, u64)>
    where
        F: Fn(&str, Option<&str>) -> bool,
    {
        self.messages
            .iter()
            .filter(|m| !m.read)
            .filter_map(|m| {
                let (agent, model) = split_address(&m.to_agent);
                deliverable(agent, model).then(|| (agent.to_string(), m.id))
            })
            .min_by_key(|(_, id)| *id)
    }

    /// Highest message ID handed out so far (0 when none).
    pub fn last_message_id(&self) -> u64 {
        self.next_message_id.saturating_sub(1)
    }

    /// Unread messages sent by `sender` (bare agent or any of its variants)
    /// with an ID above `after`, excluding notes addressed back to the sender.
    pub fn unread_sent_since(&self, sender: &str, after: u64) -> Vec<&Message> {
        self.messages
            .iter()
            .filter(|m| m.id > after && !m.read)
            .filter(|m| split_address(&m.from_agent).0 == sender)
            .filter(|m| split_address(&m.to_agent).0 != sender)
            .collect()
    }

    /// Unread message counts per recipient agent.
    pub fn unread_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for message in self.messages.iter().filter(|m| !m.read) {
            let (agent, _) = split_address(&message.to_agent);
            *counts.entry(agent.to_string()).or_insert(0) += 1;
        }
        counts
    }
}

/// Render messages for inclusion in a prompt.
pub fn format_messages(messages: &[Message]) -> String {
    let mut out = String::new();
    for message in messages {
        out.push_str(&format!(
            "[#{}] From: {}, To: {} ({})\n{}\n\n",
            message.id,
            message.from_agent,
            message.to_agent,
            message.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
            message.body.trim_end()
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> WorkflowState {
        let mut state = WorkflowState::new("abc");
        state.seed_visit_counts(["coordinator", "developer", "reviewer"]);
        state
    }

    #[test]
    fn test_ids_strictly_increasing_and_unique() {
        let mut state = state();
        let mut ids = Vec::new();
        for i in 0..5 {
            ids.push(state.post_message("coordinator", "developer", format!("note {}", i)));
        }
        // an external tool dropping messages must not cause ID reuse
        state.messages.truncate(2);
        ids.push(state.post_message("developer", "coordinator", "back"));
        state.next_message_id = 1;
        ids.push(state.post_message("developer", "coordinator", "again"));

        assert!(ids.windows(2).all(|w| w[0] < w[1]), "{:?}", ids);
        assert_eq!(state.last_message_id(), *ids.last().unwrap());
    }

    #[test]
    fn test_mark_read_is_idempotent() {
        let mut state = state();
        let id = state.post_message("coordinator", "developer", "hello");

        assert!(state.mark_read(id, "developer").unwrap());
        let first = state.messages[0].clone();
        assert!(!state.mark_read(id, "reviewer").unwrap());
        assert_eq!(state.messages[0], first);
        assert_eq!(state.messages[0].read_by.as_deref(), Some("developer"));
        assert!(state.mark_read(999, "developer").is_err());
    }

    #[test]
    fn test_send_validates_recipient() {
        let mut state = state();
        let variants = vec!["gpt-5".to_string(), "sonnet".to_string()];
        assert!(state.send_message("coordinator", "developer", "x", &[]).is_ok());
        assert!(state.send_message("coordinator", "developer:gpt-5", "x", &variants).is_ok());
        let err = state.send_message("coordinator", "ghost", "x", &[]).unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn test_send_rejects_unconfigured_variant() {
        let mut state = state();
        let err = state
            .send_message("coordinator", "developer:typo-model", "x", &[])
            .unwrap_err();
        assert!(err.to_string().contains("typo-model"));
        assert!(err.to_string().contains("none"));

        let variants = vec!["gpt-5".to_string()];
        let err = state
            .send_message("coordinator", "developer:gpt-4", "x", &variants)
            .unwrap_err();
        assert!(err.to_string().contains("gpt-5"));
        assert!(state.messages.is_empty());
    }

    #[test]
    fn test_oldest_unread_recipient() {
        let mut state = state();
        let first = state.post_message("coordinator", "reviewer:model-a", "review");
        state.post_message("coordinator", "developer", "build");
        state.post_message("coordinator", "human", "ignored");

        let (agent, id) = state
            .oldest_unread_recipient(|a, _| state.is_known_agent(a))
            .unwrap();
        assert_eq!((agent.as_str(), id), ("reviewer", first));

        state.mark_read(first, "reviewer:model-a").unwrap();
        let (agent, _) = state
            .oldest_unread_recipient(|a, _| state.is_known_agent(a))
            .unwrap();
        assert_eq!(agent, "developer");
    }

    #[test]
    fn test_oldest_unread_recipient_skips_undeliverable() {
        let mut state = state();
        state.post_message("coordinator", "reviewer:retired", "stale");
        let live = state.post_message("coordinator", "developer", "build");

        let found = state.oldest_unread_recipient(|_, model| model != Some("retired"));
        assert_eq!(found, Some(("developer".to_string(), live)));
    }

    #[test]
    fn test_variant_delivery_and_take() {
        let mut state = state();
        state.post_message("coordinator", "reviewer", "to all");
        state.post_message("coordinator", "reviewer:a", "to a");
        state.post_message("coordinator", "reviewer:b", "to b");

        assert_eq!(state.unread_for_variant("reviewer", Some("a")).len(), 2);
        assert_eq!(state.unread_for_variant("reviewer", None).len(), 1);

        let taken = state.take_unread(&["reviewer:a".to_string()], "reviewer:a");
        assert_eq!(taken.len(), 1);
        assert_eq!(taken[0].body, "to a");
        assert_eq!(state.unread_counts()["reviewer"], 2);

        let rest = state.take_unread_for_agent("reviewer", "reviewer");
        assert_eq!(rest.len(), 2);
        assert_eq!(rest[1].to_agent, "reviewer:b");
        assert!(state.unread_counts().is_empty());
    }

    #[test]
    fn test_unread_sent_since() {
        let mut state = state();
        let before = state.last_message_id();
        state.post_message("developer:m", "reviewer", "please review");
        state.post_message("developer", "developer", "note to self");
        assert_eq!(state.unread_sent_since("developer", before).len(), 1);
        assert!(state.unread_sent_since("developer", state.last_message_id()).is_empty());
    }
}
