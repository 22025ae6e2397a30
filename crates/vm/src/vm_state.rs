//! Engine state machine.

use std::fmt;

/// The four states of an execution engine.
///
/// `HALT` and `FAULT` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VMState {
    /// Loaded but not yet started.
    Break,
    /// Running.
    None,
    /// Finished normally; the result stack is valid.
    Halt,
    /// Finished with an error; no results are visible.
    Fault,
}

impl VMState {
    /// Whether the engine can take another step.
    pub fn is_runnable(self) -> bool {
        matches!(self, VMState::Break | VMState::None)
    }
}

impl fmt::Display for VMState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VMState::Break => "BREAK",
            VMState::None => "NONE",
            VMState::Halt => "HALT",
            VMState::Fault => "FAULT",
        };
        write!(f, "{name}")
    }
}
