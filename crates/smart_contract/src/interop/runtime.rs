//! System.Runtime.* handlers.

use crate::application_engine::{ApplicationEngine, ScriptContainer};
use crate::{ContractError, ContractResult};
use neo3_core::UInt160;
use neo3_cryptography::ECPoint;
use neo3_vm::{StackItem, StackItemType};
use std::cell::RefCell;
use std::rc::Rc;

pub fn platform(engine: &mut ApplicationEngine) -> ContractResult<()> {
    engine.vm_mut().push(StackItem::from_bytes(b"NEO".to_vec()))?;
    Ok(())
}

pub fn get_network(engine: &mut ApplicationEngine) -> ContractResult<()> {
    let network = engine.settings().network;
    engine.vm_mut().push(StackItem::from_int(network as i64))?;
    Ok(())
}

pub fn get_address_version(engine: &mut ApplicationEngine) -> ContractResult<()> {
    let version = engine.settings().address_version;
    engine.vm_mut().push(StackItem::from_int(version as i64))?;
    Ok(())
}

pub fn get_trigger(engine: &mut ApplicationEngine) -> ContractResult<()> {
    let trigger = engine.trigger() as u8;
    engine.vm_mut().push(StackItem::from_int(trigger as i64))?;
    Ok(())
}

pub fn get_time(engine: &mut ApplicationEngine) -> ContractResult<()> {
    let timestamp = engine
        .persisting_block()
        .map(|block| block.header.timestamp)
        .ok_or_else(|| ContractError::invalid_operation("no persisting block"))?;
    engine.vm_mut().push(StackItem::from_int(timestamp as i64))?;
    Ok(())
}

pub fn get_script_container(engine: &mut ApplicationEngine) -> ContractResult<()> {
    let item = match engine.container() {
        Some(ScriptContainer::Transaction(tx)) => {
            let fields = vec![
                StackItem::from_bytes(tx.hash().to_vec()),
                StackItem::from_int(tx.version as i64),
                StackItem::from_int(tx.nonce as i64),
                StackItem::from_bytes(tx.sender().to_vec()),
                StackItem::from_int(tx.system_fee),
                StackItem::from_int(tx.network_fee),
                StackItem::from_int(tx.valid_until_block as i64),
                StackItem::from_bytes(tx.script.clone()),
            ];
            StackItem::Array(Rc::new(RefCell::new(fields)))
        }
        Some(ScriptContainer::Block(block)) => {
            let header = &block.header;
            let fields = vec![
                StackItem::from_bytes(header.hash().to_vec()),
                StackItem::from_int(header.version as i64),
                StackItem::from_bytes(header.prev_hash.to_vec()),
                StackItem::from_bytes(header.merkle_root.to_vec()),
                StackItem::from_int(header.timestamp as i64),
                StackItem::Integer(header.nonce.into()),
                StackItem::from_int(header.index as i64),
                StackItem::from_int(header.primary_index as i64),
                StackItem::from_bytes(header.next_consensus.to_vec()),
                StackItem::from_int(block.transactions.len() as i64),
            ];
            StackItem::Array(Rc::new(RefCell::new(fields)))
        }
        None => return Err(ContractError::invalid_operation("no script container")),
    };
    engine.vm_mut().push(item)?;
    Ok(())
}

fn push_hash(engine: &mut ApplicationEngine, hash: Option<UInt160>) -> ContractResult<()> {
    match hash {
        Some(hash) => engine.vm_mut().push(StackItem::from_bytes(hash.to_vec()))?,
        None => engine.vm_mut().push(StackItem::Null)?,
    }
    Ok(())
}

pub fn get_executing_script_hash(engine: &mut ApplicationEngine) -> ContractResult<()> {
    let hash = engine.current_script_hash();
    push_hash(engine, hash)
}

pub fn get_calling_script_hash(engine: &mut ApplicationEngine) -> ContractResult<()> {
    let hash = engine.calling_script_hash();
    push_hash(engine, hash)
}

pub fn get_entry_script_hash(engine: &mut ApplicationEngine) -> ContractResult<()> {
    let hash = engine.entry_script_hash();
    push_hash(engine, hash)
}

pub fn check_witness(engine: &mut ApplicationEngine) -> ContractResult<()> {
    let data = engine.vm_mut().pop_bytes()?;
    let hash = match data.len() {
        20 => UInt160::from_bytes(&data)?,
        33 => {
            let key = ECPoint::from_bytes(&data)?;
            crate::account::create_signature_contract_hash(&key)
        }
        other => {
            return Err(ContractError::invalid_argument(format!(
                "witness query of {other} bytes"
            )))
        }
    };
    let result = engine.check_witness(&hash)?;
    engine.vm_mut().push(StackItem::from_bool(result))?;
    Ok(())
}

pub fn get_invocation_counter(engine: &mut ApplicationEngine) -> ContractResult<()> {
    let counter = engine.invocation_counter();
    engine.vm_mut().push(StackItem::from_int(counter as i64))?;
    Ok(())
}

pub fn get_random(engine: &mut ApplicationEngine) -> ContractResult<()> {
    let value = engine.next_random();
    engine.vm_mut().push(StackItem::Integer(value))?;
    Ok(())
}

pub fn log(engine: &mut ApplicationEngine) -> ContractResult<()> {
    let bytes = engine.vm_mut().pop_bytes()?;
    let message = String::from_utf8(bytes)
        .map_err(|_| ContractError::invalid_argument("log message is not UTF-8"))?;
    engine.log(message)
}

pub fn notify(engine: &mut ApplicationEngine) -> ContractResult<()> {
    let event_name_bytes = engine.vm_mut().pop_bytes()?;
    let event_name = String::from_utf8(event_name_bytes)
        .map_err(|_| ContractError::invalid_argument("event name is not UTF-8"))?;
    let state = engine.vm_mut().pop()?;
    if state.item_type() != StackItemType::Array {
        return Err(ContractError::invalid_argument(
            "notification state must be an array",
        ));
    }
    // Must survive binary serialization so indexers can store it.
    crate::binary_serializer::serialize_stack_item(&state, 1024)?;
    engine.notify(event_name, state)
}

pub fn gas_left(engine: &mut ApplicationEngine) -> ContractResult<()> {
    let left = engine.gas_left();
    engine.vm_mut().push(StackItem::from_int(left))?;
    Ok(())
}

pub fn burn_gas(engine: &mut ApplicationEngine) -> ContractResult<()> {
    let amount: i64 = engine
        .vm_mut()
        .pop_integer()?
        .try_into()
        .map_err(|_| ContractError::invalid_argument("burn amount out of range"))?;
    if amount <= 0 {
        return Err(ContractError::invalid_argument("burn amount must be positive"));
    }
    engine.add_fee(amount)
}
