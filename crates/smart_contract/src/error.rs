//! Error types for contract execution.

use thiserror::Error;

/// Errors raised by the application engine, interop layer and natives.
///
/// During script execution every variant is mapped to a VM fault at the
/// engine boundary; host-language unwinding never crosses it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ContractError {
    /// The current context lacks a required call flag.
    #[error("missing call flags: {0}")]
    PermissionDenied(String),

    /// No such interop method is registered.
    #[error("unknown system call 0x{0:08x}")]
    UnknownSyscall(u32),

    /// A contract or native method was called with bad arguments.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The called contract or method does not exist.
    #[error("contract or method not found: {0}")]
    NotFound(String),

    /// A contract-level rule was violated.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// Execution exceeded its gas budget.
    #[error("gas exhausted")]
    OutOfGas,

    /// Errors bubbled up from the VM.
    #[error(transparent)]
    Vm(#[from] neo3_vm::VmError),

    /// Errors bubbled up from storage bookkeeping.
    #[error(transparent)]
    Storage(#[from] neo3_persistence::StorageError),

    /// Errors bubbled up from the codec.
    #[error(transparent)]
    Io(#[from] neo3_io::IoError),

    /// Errors bubbled up from the data model.
    #[error(transparent)]
    Core(#[from] neo3_core::CoreError),

    /// Errors bubbled up from cryptography.
    #[error(transparent)]
    Crypto(#[from] neo3_cryptography::CryptoError),
}

impl ContractError {
    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        ContractError::InvalidArgument(message.into())
    }

    pub(crate) fn invalid_operation(message: impl Into<String>) -> Self {
        ContractError::InvalidOperation(message.into())
    }

    pub(crate) fn not_found(message: impl Into<String>) -> Self {
        ContractError::NotFound(message.into())
    }
}

/// Result alias for contract execution.
pub type ContractResult<T> = std::result::Result<T, ContractError>;
