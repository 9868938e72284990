//! Flow specification: goal document, flow graph and transition rules.
//!
//! # Architecture
//!
//! ```text
//! GOAL.md ──► GoalDocument ──► GoalConfig.flow ──► FlowGraph
//!                                                     │
//!                         WorkflowState (mailbox) ──► select_next ──► next agent
//! ```

pub mod flow;
pub mod schema;
pub mod transition;

pub use flow::{FlowError, FlowGraph, COORDINATOR};
pub use schema::{
    CaptureSessions, DriverConfig, GoalConfig, GoalDocument, InteractiveMode, ModelSpec,
};
pub use transition::{select_next, Transition};
