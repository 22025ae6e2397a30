//! Block processor, genesis bootstrap and mempool for the Neo N3 core.
//!
//! The [`Blockchain`] is the single writer to the head state: blocks are
//! validated, executed and committed serially, while readers observe
//! consistent state through snapshots over the shared store.

mod blockchain;
mod error;
mod genesis;
mod mempool;
mod verify_result;

pub use blockchain::{ApplicationExecuted, Blockchain, ChainState};
pub use error::{LedgerError, LedgerResult};
pub use genesis::create_genesis_block;
pub use mempool::MemoryPool;
pub use verify_result::VerifyResult;
