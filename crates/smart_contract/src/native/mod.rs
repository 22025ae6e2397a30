//! Native contracts.
//!
//! Natives are contracts without bytecode: the application engine routes a
//! call targeting a native hash to an in-process method table. They hold no
//! in-memory state of their own; everything lives in contract storage under
//! their reserved negative ids, so snapshots and rollbacks treat them
//! exactly like deployed contracts.

pub mod contract_management;
pub mod crypto_lib;
pub mod gas_token;
pub mod ledger;
pub mod neo_token;
pub mod oracle;
pub mod policy;
pub mod role_management;
pub mod std_lib;

use crate::application_engine::ApplicationEngine;
use crate::contract_state::get_contract_hash;
use crate::ContractResult;
use neo3_core::UInt160;
use neo3_vm::{CallFlags, StackItem};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::Arc;

/// One entry of a native's method table.
pub struct NativeMethod {
    /// Method name as exposed to scripts.
    pub name: &'static str,
    /// Number of parameters.
    pub parameters: usize,
    /// Fixed price in datoshi, scaled by the execution fee factor.
    pub price: i64,
    /// Flags the caller must hold.
    pub required_flags: CallFlags,
}

impl NativeMethod {
    /// A read-only method.
    pub const fn safe(name: &'static str, parameters: usize, price: i64) -> Self {
        Self {
            name,
            parameters,
            price,
            required_flags: CallFlags::READ_STATES,
        }
    }

    /// A state-mutating method.
    pub const fn unsafe_method(name: &'static str, parameters: usize, price: i64) -> Self {
        Self {
            name,
            parameters,
            price,
            required_flags: CallFlags::STATES,
        }
    }

    /// A pure method touching no chain state.
    pub const fn pure(name: &'static str, parameters: usize, price: i64) -> Self {
        Self {
            name,
            parameters,
            price,
            required_flags: CallFlags::NONE,
        }
    }
}

/// A native contract: fixed id, derived hash, method table and hooks.
pub trait NativeContract: Send + Sync {
    /// Reserved storage id (negative).
    fn id(&self) -> i32;

    /// Contract name; the hash is derived from it.
    fn name(&self) -> &'static str;

    /// The contract hash.
    fn hash(&self) -> UInt160 {
        native_hash(self.name())
    }

    /// The method table.
    fn methods(&self) -> &[NativeMethod];

    /// Genesis installation hook.
    fn initialize(&self, _engine: &mut ApplicationEngine) -> ContractResult<()> {
        Ok(())
    }

    /// Runs before the transactions of every block.
    fn on_persist(&self, _engine: &mut ApplicationEngine) -> ContractResult<()> {
        Ok(())
    }

    /// Runs after the transactions of every block.
    fn post_persist(&self, _engine: &mut ApplicationEngine) -> ContractResult<()> {
        Ok(())
    }

    /// Dispatches one method call. Returns the value to push, if any.
    fn invoke(
        &self,
        engine: &mut ApplicationEngine,
        method: &str,
        args: Vec<StackItem>,
    ) -> ContractResult<Option<StackItem>>;
}

/// Derives a native contract hash from its name (deployer zero, checksum 0).
pub fn native_hash(name: &str) -> UInt160 {
    static CACHE: Lazy<std::sync::Mutex<HashMap<String, UInt160>>> =
        Lazy::new(|| std::sync::Mutex::new(HashMap::new()));
    let mut cache = CACHE.lock().expect("hash cache lock");
    *cache
        .entry(name.to_string())
        .or_insert_with(|| get_contract_hash(&UInt160::zero(), 0, name))
}

/// The installed native contracts.
pub struct NativeRegistry {
    contracts: Vec<Arc<dyn NativeContract>>,
    by_hash: HashMap<UInt160, usize>,
}

impl NativeRegistry {
    fn new() -> Self {
        let contracts: Vec<Arc<dyn NativeContract>> = vec![
            Arc::new(contract_management::ContractManagement),
            Arc::new(std_lib::StdLib),
            Arc::new(crypto_lib::CryptoLib),
            Arc::new(ledger::LedgerContract),
            Arc::new(neo_token::NeoToken),
            Arc::new(gas_token::GasToken),
            Arc::new(policy::PolicyContract),
            Arc::new(role_management::RoleManagement),
            Arc::new(oracle::OracleContract),
        ];
        let by_hash = contracts
            .iter()
            .enumerate()
            .map(|(index, contract)| (contract.hash(), index))
            .collect();
        Self { contracts, by_hash }
    }

    /// Looks a native up by hash.
    pub fn by_hash(&self, hash: &UInt160) -> Option<Arc<dyn NativeContract>> {
        self.by_hash
            .get(hash)
            .map(|&index| Arc::clone(&self.contracts[index]))
    }

    /// Looks a native up by name.
    pub fn by_name(&self, name: &str) -> Option<Arc<dyn NativeContract>> {
        self.contracts
            .iter()
            .find(|contract| contract.name() == name)
            .map(Arc::clone)
    }

    /// All natives in installation order.
    pub fn all(&self) -> Vec<Arc<dyn NativeContract>> {
        self.contracts.clone()
    }
}

/// The process-wide registry; natives are stateless, so sharing is safe.
pub fn registry() -> &'static NativeRegistry {
    static REGISTRY: Lazy<NativeRegistry> = Lazy::new(NativeRegistry::new);
    &REGISTRY
}

// ---- shared argument helpers ----

pub(crate) fn arg_bytes(args: &[StackItem], index: usize) -> ContractResult<Vec<u8>> {
    args.get(index)
        .ok_or_else(|| crate::ContractError::invalid_argument(format!("missing argument {index}")))?
        .get_bytes()
        .map_err(Into::into)
}

pub(crate) fn arg_int(
    engine: &ApplicationEngine,
    args: &[StackItem],
    index: usize,
) -> ContractResult<num_bigint::BigInt> {
    args.get(index)
        .ok_or_else(|| crate::ContractError::invalid_argument(format!("missing argument {index}")))?
        .get_integer(engine.vm().limits().max_integer_size)
        .map_err(Into::into)
}

pub(crate) fn arg_bool(
    engine: &ApplicationEngine,
    args: &[StackItem],
    index: usize,
) -> ContractResult<bool> {
    args.get(index)
        .ok_or_else(|| crate::ContractError::invalid_argument(format!("missing argument {index}")))?
        .get_boolean(engine.vm().limits().max_integer_size)
        .map_err(Into::into)
}

pub(crate) fn arg_hash(args: &[StackItem], index: usize) -> ContractResult<UInt160> {
    let bytes = arg_bytes(args, index)?;
    UInt160::from_bytes(&bytes).map_err(Into::into)
}

pub(crate) fn arg_string(args: &[StackItem], index: usize) -> ContractResult<String> {
    let bytes = arg_bytes(args, index)?;
    String::from_utf8(bytes)
        .map_err(|_| crate::ContractError::invalid_argument(format!("argument {index} not UTF-8")))
}

pub(crate) fn arg_item<'a>(args: &'a [StackItem], index: usize) -> ContractResult<&'a StackItem> {
    args.get(index)
        .ok_or_else(|| crate::ContractError::invalid_argument(format!("missing argument {index}")))
}

/// True when the container carries the committee's witness.
pub(crate) fn check_committee(engine: &ApplicationEngine) -> ContractResult<bool> {
    let committee_address = neo_token::committee_address(engine.snapshot())?;
    engine.check_witness(&committee_address)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_holds_all_nine_natives() {
        let registry = registry();
        assert_eq!(registry.all().len(), 9);
        for name in [
            "ContractManagement",
            "StdLib",
            "CryptoLib",
            "LedgerContract",
            "NeoToken",
            "GasToken",
            "PolicyContract",
            "RoleManagement",
            "OracleContract",
        ] {
            let native = registry.by_name(name).expect(name);
            assert!(registry.by_hash(&native.hash()).is_some());
            assert!(native.id() < 0);
        }
    }

    #[test]
    fn hashes_are_distinct_and_stable() {
        let a = native_hash("NeoToken");
        let b = native_hash("GasToken");
        assert_ne!(a, b);
        assert_eq!(a, native_hash("NeoToken"));
    }
}
