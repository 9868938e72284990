//! Gates that hold the workflow: human input and the completion check.

pub mod completion;
pub mod human;
pub mod prompter;

pub use completion::{apply_gate_result, run_completion_gate, GateResult};
pub use human::{
    contains_approval, describe_request, format_answers, submit_response, wait_for_response,
    ChoiceAnswer, GateOutcome, HumanGate, APPROVAL_PHRASE, AUTO_RESPONSE,
};
pub use prompter::{HumanPrompter, HumanRequest, RemoteOnly};
