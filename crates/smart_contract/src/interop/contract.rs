//! System.Contract.* handlers.

use crate::account;
use crate::application_engine::ApplicationEngine;
use crate::{ContractError, ContractResult};
use neo3_core::UInt160;
use neo3_cryptography::ECPoint;
use neo3_vm::{CallFlags, StackItem, StackItemType};

pub fn call(engine: &mut ApplicationEngine) -> ContractResult<()> {
    let hash_bytes = engine.vm_mut().pop_bytes()?;
    let hash = UInt160::from_bytes(&hash_bytes)?;
    let method_bytes = engine.vm_mut().pop_bytes()?;
    let method = String::from_utf8(method_bytes)
        .map_err(|_| ContractError::invalid_argument("method name is not UTF-8"))?;
    let flags_byte: u8 = engine
        .vm_mut()
        .pop_integer()?
        .try_into()
        .map_err(|_| ContractError::invalid_argument("call flags out of range"))?;
    let flags = CallFlags::from_byte(flags_byte)
        .ok_or_else(|| ContractError::invalid_argument("undefined call flags"))?;
    let args_item = engine.vm_mut().pop()?;
    if args_item.item_type() != StackItemType::Array {
        return Err(ContractError::invalid_argument("arguments must be an array"));
    }
    let args = args_item.as_array()?.borrow().clone();

    engine.call_contract_internal(hash, &method, flags, args, true)
}

/// Runs every native's OnPersist hook; only valid under the OnPersist
/// trigger, which only the block processor initiates.
pub fn native_on_persist(engine: &mut ApplicationEngine) -> ContractResult<()> {
    if engine.trigger() != crate::TriggerType::OnPersist {
        return Err(ContractError::invalid_operation(
            "NativeOnPersist requires the OnPersist trigger",
        ));
    }
    engine.run_native_persist_hooks()
}

/// Runs every native's PostPersist hook; only valid under the PostPersist
/// trigger.
pub fn native_post_persist(engine: &mut ApplicationEngine) -> ContractResult<()> {
    if engine.trigger() != crate::TriggerType::PostPersist {
        return Err(ContractError::invalid_operation(
            "NativePostPersist requires the PostPersist trigger",
        ));
    }
    engine.run_native_persist_hooks()
}

pub fn get_call_flags(engine: &mut ApplicationEngine) -> ContractResult<()> {
    let flags = engine
        .vm()
        .current_context()
        .map(|context| context.call_flags.bits())
        .unwrap_or(0);
    engine.vm_mut().push(StackItem::from_int(flags as i64))?;
    Ok(())
}

pub fn create_standard_account(engine: &mut ApplicationEngine) -> ContractResult<()> {
    let key_bytes = engine.vm_mut().pop_bytes()?;
    let key = ECPoint::from_bytes(&key_bytes)?;
    let hash = account::create_signature_contract_hash(&key);
    engine.vm_mut().push(StackItem::from_bytes(hash.to_vec()))?;
    Ok(())
}

pub fn create_multisig_account(engine: &mut ApplicationEngine) -> ContractResult<()> {
    let m: usize = engine
        .vm_mut()
        .pop_integer()?
        .try_into()
        .map_err(|_| ContractError::invalid_argument("signature threshold"))?;
    let keys_item = engine.vm_mut().pop()?;
    let keys_array = keys_item.as_array()?.borrow().clone();
    let mut keys = Vec::with_capacity(keys_array.len());
    for key_item in &keys_array {
        keys.push(ECPoint::from_bytes(&key_item.get_bytes()?)?);
    }
    let hash = account::create_multisig_contract_hash(m, &keys)?;
    engine.vm_mut().push(StackItem::from_bytes(hash.to_vec()))?;
    Ok(())
}
