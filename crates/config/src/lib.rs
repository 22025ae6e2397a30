//! Protocol settings and network constants for the Neo N3 core.
//!
//! Everything in this crate is immutable after startup: the block processor,
//! the application engine and the native contracts all read the same shared
//! [`ProtocolSettings`] value and never write it back.

mod protocol_settings;

pub use protocol_settings::{NativeUpdateHistory, ProtocolSettings};

use thiserror::Error;

/// Size of a hash (UInt256) in bytes.
pub const HASH_SIZE: usize = 32;

/// Size of an address / script hash (UInt160) in bytes.
pub const ADDRESS_SIZE: usize = 20;

/// Maximum size of a serialized transaction in bytes.
pub const MAX_TRANSACTION_SIZE: usize = 102_400;

/// Maximum size of a serialized block in bytes.
pub const MAX_BLOCK_SIZE: usize = 2_097_152;

/// Maximum number of transactions in a single block.
pub const MAX_TRANSACTIONS_PER_BLOCK: u32 = 512;

/// Maximum length of an executable script in bytes.
pub const MAX_SCRIPT_LENGTH: usize = 65_536;

/// Maximum number of signers (and therefore witnesses) per transaction.
pub const MAX_TRANSACTION_ATTRIBUTES: usize = 16;

/// Maximum size of a witness invocation script in bytes.
pub const MAX_INVOCATION_SCRIPT_SIZE: usize = 1024;

/// Maximum size of a witness verification script in bytes.
pub const MAX_VERIFICATION_SCRIPT_SIZE: usize = 1024;

/// Maximum size of a contract storage key in bytes.
pub const MAX_STORAGE_KEY_SIZE: usize = 64;

/// Maximum size of a contract storage value in bytes.
pub const MAX_STORAGE_VALUE_SIZE: usize = 65_535;

/// Maximum number of notifications a single execution may emit.
pub const MAX_NOTIFICATION_COUNT: usize = 512;

/// GAS indivisible-unit factor: 1 GAS = 10^8 datoshi.
pub const GAS_FACTOR: i64 = 100_000_000;

/// Total NEO supply; the token is indivisible.
pub const NEO_TOTAL_SUPPLY: i64 = 100_000_000;

/// Default expected milliseconds between blocks.
pub const MILLISECONDS_PER_BLOCK: u64 = 15_000;

/// Default number of blocks a transaction stays valid after creation.
pub const MAX_VALID_UNTIL_BLOCK_INCREMENT: u32 = 5760;

/// Default window of traceable history in blocks (about one year).
pub const MAX_TRACEABLE_BLOCKS: u32 = 2_102_400;

/// Errors raised while loading protocol settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The settings document could not be parsed.
    #[error("invalid settings document: {0}")]
    Parse(#[from] serde_json::Error),

    /// A field value failed a sanity check.
    #[error("invalid settings value: {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Result alias for settings loading.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
