//! Constant and push-data handlers.

use crate::error::{VmError, VmResult};
use crate::execution_engine::ExecutionEngine;
use crate::instruction::Instruction;
use crate::op_code::OpCode;
use crate::stack_item::StackItem;
use num_bigint::BigInt;

pub fn push_int(engine: &mut ExecutionEngine, instruction: &Instruction) -> VmResult<()> {
    let value = BigInt::from_signed_bytes_le(&instruction.operand);
    engine.push(StackItem::Integer(value))
}

pub fn push_small_int(engine: &mut ExecutionEngine, instruction: &Instruction) -> VmResult<()> {
    let value = instruction.opcode.as_byte() as i64 - OpCode::PUSH0.as_byte() as i64;
    engine.push(StackItem::from_int(value))
}

pub fn push_true(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    engine.push(StackItem::from_bool(true))
}

pub fn push_false(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    engine.push(StackItem::from_bool(false))
}

pub fn push_null(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    engine.push(StackItem::Null)
}

pub fn push_a(engine: &mut ExecutionEngine, instruction: &Instruction) -> VmResult<()> {
    let target = engine.jump_target(i64::from(instruction.operand_i32()))?;
    engine.push(StackItem::Pointer(target))
}

pub fn push_data(engine: &mut ExecutionEngine, instruction: &Instruction) -> VmResult<()> {
    if instruction.operand.len() > engine.limits().max_item_size {
        return Err(VmError::limit("PUSHDATA operand exceeds item size limit"));
    }
    engine.push(StackItem::from_bytes(instruction.operand.clone()))
}
