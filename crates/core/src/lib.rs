//! Ledger data model for the Neo N3 core.
//!
//! The wire formats in this crate are consensus-critical: block and
//! transaction hashes are computed over the exact serialized bytes, so every
//! field order and width here must stay bit-exact with the network.

mod block;
mod error;
mod signer;
mod transaction;
mod transaction_attribute;
mod uint160;
mod uint256;
mod witness;
mod witness_rule;
mod witness_scope;

pub use block::{Block, Header};
pub use error::{CoreError, CoreResult};
pub use signer::{Signer, MAX_SUBITEMS};
pub use transaction::{Transaction, HEADER_SIZE as TRANSACTION_HEADER_SIZE, MAX_SIGNERS};
pub use transaction_attribute::{OracleResponseCode, TransactionAttribute, MAX_ORACLE_RESULT_SIZE};
pub use uint160::UInt160;
pub use uint256::UInt256;
pub use witness::Witness;
pub use witness_rule::{WitnessCondition, WitnessRule, WitnessRuleAction};
pub use witness_scope::WitnessScope;
