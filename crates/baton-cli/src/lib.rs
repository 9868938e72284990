//! Baton CLI library: command implementations shared by the `baton` binary
//! and the integration tests.

pub mod commands;
pub mod prompter;

/// Exit code when a run stops because a human answer is needed.
pub const EXIT_HUMAN_INPUT_REQUIRED: i32 = 3;

/// Exit code after Ctrl-C.
pub const EXIT_INTERRUPTED: i32 = 130;
