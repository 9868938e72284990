//! Baton Core: transport-agnostic domain logic for multi-agent workflows.
//!
//! This crate contains the flow graph, the persisted workflow state, the
//! mailbox, the human and completion gates, and the orchestration engine
//! that drives external agent processes. It has no terminal or CLI
//! dependency, making it suitable for use in:
//!
//! - the `baton` CLI
//! - a status dashboard reading `.baton/state.json`
//! - tests with an in-process [`driver::AgentDriver`]

pub mod capture;
pub mod driver;
pub mod error;
pub mod gate;
pub mod orchestration;
pub mod state;
pub mod workflow;

// Convenience re-exports
pub use error::BatonError;
pub use orchestration::{Engine, EngineConfig, RunOutcome, GOAL_FILE};
pub use state::{StateStore, WorkflowState, WorkflowStatus};
pub use workflow::{FlowGraph, GoalDocument};
