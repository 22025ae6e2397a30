//! Typed verification outcomes.

/// Why a block or transaction was rejected (or accepted).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyResult {
    /// Accepted.
    Succeed,
    /// The hash is already known (chain or mempool).
    AlreadyExists,
    /// The candidate conflicts with a known transaction.
    HasConflicts,
    /// The mempool is full and the candidate ranks too low.
    OutOfMemory,
    /// Structural rules failed (format, counts, duplicate attributes).
    Invalid,
    /// A script or witness failed to verify.
    InvalidSignature,
    /// An attribute rule failed.
    InvalidAttribute,
    /// The candidate points at the wrong parent or height.
    ChainMismatch,
    /// The timestamp is out of the admissible window.
    InvalidTimestamp,
    /// valid_until_block has passed or is too far ahead.
    Expired,
    /// The sender cannot cover the fees.
    InsufficientFunds,
    /// A policy rule (blocked account, fee floor) failed.
    PolicyFail,
}
