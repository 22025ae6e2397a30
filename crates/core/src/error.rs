//! Error types for the ledger data model.

use thiserror::Error;

/// Errors raised while constructing or validating ledger entities.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// A binary or textual form violated the expected layout.
    #[error("invalid format: {message}")]
    InvalidFormat { message: String },

    /// A structural rule was violated (sizes, counts, duplicate attributes).
    #[error("invalid data: {message}")]
    InvalidData { message: String },

    /// Errors bubbled up from the binary codec.
    #[error(transparent)]
    Io(#[from] neo3_io::IoError),

    /// Errors bubbled up from the cryptography facade.
    #[error(transparent)]
    Crypto(#[from] neo3_cryptography::CryptoError),
}

impl CoreError {
    pub(crate) fn invalid_format(message: impl Into<String>) -> Self {
        CoreError::InvalidFormat {
            message: message.into(),
        }
    }

    pub(crate) fn invalid_data(message: impl Into<String>) -> Self {
        CoreError::InvalidData {
            message: message.into(),
        }
    }
}

/// Result alias for data-model operations.
pub type CoreResult<T> = std::result::Result<T, CoreError>;
