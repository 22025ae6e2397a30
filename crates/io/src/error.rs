//! Error types for binary serialization.

use thiserror::Error;

/// Errors raised by the binary readers and writers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IoError {
    /// The reader ran past the end of its input.
    #[error("unexpected end of stream: {expected} more byte(s) needed while reading {context}")]
    EndOfStream { expected: usize, context: &'static str },

    /// The input violated the expected binary layout.
    #[error("invalid format while reading {context}: {reason}")]
    InvalidFormat { context: &'static str, reason: String },

    /// A length or value exceeded a caller-supplied bound.
    #[error("value out of range while reading {context}: {value} > {max}")]
    OutOfRange {
        context: &'static str,
        value: u64,
        max: u64,
    },

    /// Bytes were not valid for the requested text encoding.
    #[error("encoding error in {context}: {reason}")]
    Encoding { context: &'static str, reason: String },

    /// An operation was not valid for the reader or writer state.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

impl IoError {
    pub(crate) fn end_of_stream(expected: usize, context: &'static str) -> Self {
        IoError::EndOfStream { expected, context }
    }

    pub(crate) fn invalid_format(context: &'static str, reason: impl Into<String>) -> Self {
        IoError::InvalidFormat {
            context,
            reason: reason.into(),
        }
    }

    pub(crate) fn out_of_range(context: &'static str, value: u64, max: u64) -> Self {
        IoError::OutOfRange {
            context,
            value,
            max,
        }
    }
}

/// Result alias for I/O operations.
pub type IoResult<T> = std::result::Result<T, IoError>;
