//! Error types for the cryptography facade.

use thiserror::Error;

/// Errors raised by encoding and group operations.
///
/// Signature verification does not appear here: verifying returns `bool`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// Input bytes were not a valid encoding for the expected object.
    #[error("invalid {what} encoding: {reason}")]
    InvalidEncoding { what: &'static str, reason: String },

    /// A checksum did not match.
    #[error("checksum verification failed")]
    ChecksumMismatch,

    /// The operands of a group operation belong to different groups.
    #[error("mismatched curve groups: {0}")]
    CurveMismatch(&'static str),
}

impl CryptoError {
    pub(crate) fn invalid_encoding(what: &'static str, reason: impl Into<String>) -> Self {
        CryptoError::InvalidEncoding {
            what,
            reason: reason.into(),
        }
    }
}

/// Result alias for cryptographic operations.
pub type CryptoResult<T> = std::result::Result<T, CryptoError>;
