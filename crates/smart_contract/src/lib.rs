//! Application engine, interop services and native contracts.
//!
//! This crate turns the raw VM into a consensus participant: it meters gas,
//! dispatches system calls, evaluates witnesses, and hosts the native
//! contracts that implement governance, tokens, policy, roles and oracles.

pub mod account;
mod application_engine;
mod binary_serializer;
mod contract_state;
mod error;
pub mod interop;
mod json_serializer;
pub mod manifest;
pub mod native;
mod op_code_prices;
mod trigger;

pub use application_engine::{
    ApplicationEngine, ExecutionContextState, LogEventArgs, NotifyEventArgs, ScriptContainer,
};
pub use binary_serializer::{deserialize_stack_item, serialize_stack_item};
pub use contract_state::{get_contract_hash, ContractState, MethodToken, NefFile};
pub use error::{ContractError, ContractResult};
pub use json_serializer::{json_to_stack_item, stack_item_to_json};
pub use op_code_prices::opcode_price;
pub use trigger::TriggerType;
