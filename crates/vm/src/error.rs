//! VM fault reasons.

use thiserror::Error;

/// Why an execution faulted.
///
/// Every variant is an expected failure: the engine catches it, enters
/// `FAULT` and returns normally. Only `Throw` is catchable by script-level
/// TRY handlers; the rest terminate the current invocation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VmError {
    /// An operation was applied to operands it is not defined for.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// A conversion between stack item types lost information.
    #[error("invalid cast: {0}")]
    InvalidCast(String),

    /// More items were requested than the stack holds.
    #[error("stack underflow: needed {needed}, have {available}")]
    StackUnderflow { needed: usize, available: usize },

    /// A size or count limit was breached.
    #[error("limit exceeded: {0}")]
    LimitExceeded(String),

    /// Integer division or modulo by zero.
    #[error("division by zero")]
    DivideByZero,

    /// An index or numeric argument was outside its valid range.
    #[error("out of range: {0}")]
    OutOfRange(String),

    /// The script bytes could not be decoded at the current position.
    #[error("bad script: {0}")]
    BadScript(String),

    /// An explicit THROW whose exception no handler caught.
    #[error("uncaught exception")]
    Throw,

    /// The syscall id is not serviced in this engine.
    #[error("unknown system call 0x{0:08x}")]
    UnknownSyscall(u32),

    /// The gas budget was exhausted.
    #[error("out of gas")]
    OutOfGas,

    /// The host asked the engine to stop between instructions.
    #[error("execution cancelled")]
    Cancelled,
}

impl VmError {
    pub(crate) fn invalid_operation(message: impl Into<String>) -> Self {
        VmError::InvalidOperation(message.into())
    }

    pub(crate) fn invalid_cast(message: impl Into<String>) -> Self {
        VmError::InvalidCast(message.into())
    }

    pub(crate) fn limit(message: impl Into<String>) -> Self {
        VmError::LimitExceeded(message.into())
    }

    pub(crate) fn out_of_range(message: impl Into<String>) -> Self {
        VmError::OutOfRange(message.into())
    }

    pub(crate) fn bad_script(message: impl Into<String>) -> Self {
        VmError::BadScript(message.into())
    }
}

/// Result alias for VM operations.
pub type VmResult<T> = std::result::Result<T, VmError>;
