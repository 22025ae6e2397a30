//! Error types for the ledger layer.

use crate::VerifyResult;
use thiserror::Error;

/// Errors surfaced by the block processor.
///
/// Validation failures reject the candidate and leave the store untouched;
/// fatal failures indicate corruption or a bug during apply and must halt
/// the node.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    /// The block or transaction failed a validation rule.
    #[error("validation failed: {0:?}")]
    Validation(VerifyResult),

    /// State application failed mid-way; the node must stop.
    #[error("fatal ledger failure: {0}")]
    Fatal(String),
}

impl LedgerError {
    pub(crate) fn fatal(message: impl std::fmt::Display) -> Self {
        LedgerError::Fatal(message.to_string())
    }
}

/// Result alias for ledger operations.
pub type LedgerResult<T> = std::result::Result<T, LedgerError>;
