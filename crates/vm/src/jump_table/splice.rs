//! Byte splice handlers.

use crate::error::{VmError, VmResult};
use crate::execution_engine::ExecutionEngine;
use crate::instruction::Instruction;
use crate::stack_item::StackItem;

pub fn new_buffer(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let length = engine.pop_index(engine.limits().max_item_size)?;
    engine.push(StackItem::buffer(vec![0u8; length]))
}

pub fn memcpy(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let count = engine.pop_index(engine.limits().max_item_size)?;
    let source_index = engine.pop_index(engine.limits().max_item_size)?;
    let source = engine.pop_bytes()?;
    let destination_index = engine.pop_index(engine.limits().max_item_size)?;
    let destination = engine.pop()?;

    if source_index + count > source.len() {
        return Err(VmError::out_of_range("MEMCPY source range"));
    }
    let StackItem::Buffer(buffer) = destination else {
        return Err(VmError::invalid_cast("MEMCPY destination must be a buffer"));
    };
    let mut bytes = buffer.borrow_mut();
    if destination_index + count > bytes.len() {
        return Err(VmError::out_of_range("MEMCPY destination range"));
    }
    bytes[destination_index..destination_index + count]
        .copy_from_slice(&source[source_index..source_index + count]);
    Ok(())
}

pub fn cat(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let right = engine.pop_bytes()?;
    let left = engine.pop_bytes()?;
    if left.len() + right.len() > engine.limits().max_item_size {
        return Err(VmError::limit("CAT result exceeds item size limit"));
    }
    let mut result = left;
    result.extend_from_slice(&right);
    engine.push(StackItem::buffer(result))
}

pub fn substr(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let count = engine.pop_index(engine.limits().max_item_size)?;
    let index = engine.pop_index(engine.limits().max_item_size)?;
    let data = engine.pop_bytes()?;
    if index + count > data.len() {
        return Err(VmError::out_of_range("SUBSTR range"));
    }
    engine.push(StackItem::buffer(data[index..index + count].to_vec()))
}

pub fn left(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let count = engine.pop_index(engine.limits().max_item_size)?;
    let data = engine.pop_bytes()?;
    if count > data.len() {
        return Err(VmError::out_of_range("LEFT count"));
    }
    engine.push(StackItem::buffer(data[..count].to_vec()))
}

pub fn right(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let count = engine.pop_index(engine.limits().max_item_size)?;
    let data = engine.pop_bytes()?;
    if count > data.len() {
        return Err(VmError::out_of_range("RIGHT count"));
    }
    engine.push(StackItem::buffer(data[data.len() - count..].to_vec()))
}
