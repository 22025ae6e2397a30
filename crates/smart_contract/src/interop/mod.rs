//! The system-call registry.
//!
//! Interop methods are identified on the wire by the first four bytes of the
//! SHA-256 of their dotted name, read as a little-endian u32. The registry
//! resolves those handles once at startup; the hot path dispatches by handle
//! and keeps names only for diagnostics.

mod contract;
mod crypto;
mod iterator;
mod runtime;
mod storage;

pub use storage::{FindOptions, StorageContext, StorageIterator};

use crate::application_engine::ApplicationEngine;
use crate::ContractResult;
use neo3_cryptography::hash;
use neo3_vm::CallFlags;
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// One registered system call.
pub struct InteropDescriptor {
    /// Dotted interop name, kept for diagnostics.
    pub name: &'static str,
    /// Fixed price in datoshi, scaled by the execution fee factor.
    pub price: i64,
    /// Call flags the calling context must hold.
    pub required_flags: CallFlags,
    /// The handler; pops arguments and pushes results on the VM stack.
    pub handler: fn(&mut ApplicationEngine) -> ContractResult<()>,
}

/// The interop handle of a dotted name.
pub fn hash_of(name: &str) -> u32 {
    let digest = hash::sha256(name.as_bytes());
    u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]])
}

macro_rules! descriptor {
    ($name:literal, $price:expr, $flags:expr, $handler:path) => {
        InteropDescriptor {
            name: $name,
            price: $price,
            required_flags: $flags,
            handler: $handler,
        }
    };
}

static REGISTRY: Lazy<HashMap<u32, InteropDescriptor>> = Lazy::new(|| {
    let descriptors = vec![
        // Runtime
        descriptor!("System.Runtime.Platform", 1 << 3, CallFlags::NONE, runtime::platform),
        descriptor!("System.Runtime.GetNetwork", 1 << 3, CallFlags::NONE, runtime::get_network),
        descriptor!(
            "System.Runtime.GetAddressVersion",
            1 << 3,
            CallFlags::NONE,
            runtime::get_address_version
        ),
        descriptor!("System.Runtime.GetTrigger", 1 << 3, CallFlags::NONE, runtime::get_trigger),
        descriptor!("System.Runtime.GetTime", 1 << 3, CallFlags::NONE, runtime::get_time),
        descriptor!(
            "System.Runtime.GetScriptContainer",
            1 << 3,
            CallFlags::NONE,
            runtime::get_script_container
        ),
        descriptor!(
            "System.Runtime.GetExecutingScriptHash",
            1 << 4,
            CallFlags::NONE,
            runtime::get_executing_script_hash
        ),
        descriptor!(
            "System.Runtime.GetCallingScriptHash",
            1 << 4,
            CallFlags::NONE,
            runtime::get_calling_script_hash
        ),
        descriptor!(
            "System.Runtime.GetEntryScriptHash",
            1 << 4,
            CallFlags::NONE,
            runtime::get_entry_script_hash
        ),
        descriptor!(
            "System.Runtime.CheckWitness",
            1 << 10,
            CallFlags::NONE,
            runtime::check_witness
        ),
        descriptor!(
            "System.Runtime.GetInvocationCounter",
            1 << 4,
            CallFlags::NONE,
            runtime::get_invocation_counter
        ),
        descriptor!("System.Runtime.GetRandom", 1 << 4, CallFlags::NONE, runtime::get_random),
        descriptor!("System.Runtime.Log", 1 << 15, CallFlags::ALLOW_NOTIFY, runtime::log),
        descriptor!("System.Runtime.Notify", 1 << 15, CallFlags::ALLOW_NOTIFY, runtime::notify),
        descriptor!("System.Runtime.GasLeft", 1 << 4, CallFlags::NONE, runtime::gas_left),
        descriptor!("System.Runtime.BurnGas", 1 << 4, CallFlags::NONE, runtime::burn_gas),
        // Storage
        descriptor!(
            "System.Storage.GetContext",
            1 << 4,
            CallFlags::READ_STATES,
            storage::get_context
        ),
        descriptor!(
            "System.Storage.GetReadOnlyContext",
            1 << 4,
            CallFlags::READ_STATES,
            storage::get_read_only_context
        ),
        descriptor!("System.Storage.AsReadOnly", 1 << 4, CallFlags::READ_STATES, storage::as_read_only),
        descriptor!("System.Storage.Get", 1 << 15, CallFlags::READ_STATES, storage::get),
        descriptor!("System.Storage.Put", 1 << 15, CallFlags::WRITE_STATES, storage::put),
        descriptor!("System.Storage.Delete", 1 << 15, CallFlags::WRITE_STATES, storage::delete),
        descriptor!("System.Storage.Find", 1 << 15, CallFlags::READ_STATES, storage::find),
        // Iterator
        descriptor!("System.Iterator.Next", 1 << 15, CallFlags::NONE, iterator::next),
        descriptor!("System.Iterator.Value", 1 << 4, CallFlags::NONE, iterator::value),
        // Contract
        descriptor!(
            "System.Contract.Call",
            1 << 15,
            CallFlags::ALLOW_CALL,
            contract::call
        ),
        descriptor!(
            "System.Contract.GetCallFlags",
            1 << 10,
            CallFlags::NONE,
            contract::get_call_flags
        ),
        descriptor!(
            "System.Contract.NativeOnPersist",
            0,
            CallFlags::STATES,
            contract::native_on_persist
        ),
        descriptor!(
            "System.Contract.NativePostPersist",
            0,
            CallFlags::STATES,
            contract::native_post_persist
        ),
        descriptor!(
            "System.Contract.CreateStandardAccount",
            1 << 8,
            CallFlags::NONE,
            contract::create_standard_account
        ),
        descriptor!(
            "System.Contract.CreateMultisigAccount",
            1 << 8,
            CallFlags::NONE,
            contract::create_multisig_account
        ),
        // Crypto
        descriptor!("System.Crypto.CheckSig", 1 << 15, CallFlags::NONE, crypto::check_sig),
        descriptor!(
            "System.Crypto.CheckMultisig",
            0,
            CallFlags::NONE,
            crypto::check_multisig
        ),
    ];

    descriptors
        .into_iter()
        .map(|descriptor| (hash_of(descriptor.name), descriptor))
        .collect()
});

/// Resolves a syscall handle.
pub fn lookup(id: u32) -> Option<&'static InteropDescriptor> {
    REGISTRY.get(&id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_are_stable_and_distinct() {
        let put = hash_of("System.Storage.Put");
        let get = hash_of("System.Storage.Get");
        assert_ne!(put, get);
        assert!(lookup(put).is_some());
        assert_eq!(lookup(put).unwrap().name, "System.Storage.Put");
    }

    #[test]
    fn unknown_handle_is_none() {
        assert!(lookup(0xdead_beef).is_none());
    }

    #[test]
    fn storage_writes_require_write_flag() {
        let descriptor = lookup(hash_of("System.Storage.Put")).unwrap();
        assert!(descriptor.required_flags.contains(CallFlags::WRITE_STATES));
    }
}
