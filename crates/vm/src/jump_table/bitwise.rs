//! Bitwise and equality handlers.

use crate::error::VmResult;
use crate::execution_engine::ExecutionEngine;
use crate::instruction::Instruction;
use crate::jump_table::numeric::check_integer;
use crate::stack_item::StackItem;

pub fn invert(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let max = engine.limits().max_integer_size;
    let value = engine.pop_integer()?;
    engine.push(StackItem::Integer(check_integer(!value, max)?))
}

pub fn and(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let max = engine.limits().max_integer_size;
    let right = engine.pop_integer()?;
    let left = engine.pop_integer()?;
    engine.push(StackItem::Integer(check_integer(left & right, max)?))
}

pub fn or(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let max = engine.limits().max_integer_size;
    let right = engine.pop_integer()?;
    let left = engine.pop_integer()?;
    engine.push(StackItem::Integer(check_integer(left | right, max)?))
}

pub fn xor(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let max = engine.limits().max_integer_size;
    let right = engine.pop_integer()?;
    let left = engine.pop_integer()?;
    engine.push(StackItem::Integer(check_integer(left ^ right, max)?))
}

pub fn equal(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let right = engine.pop()?;
    let left = engine.pop()?;
    let result = left.equals(&right, engine.limits().max_comparable_size)?;
    engine.push(StackItem::from_bool(result))
}

pub fn not_equal(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let right = engine.pop()?;
    let left = engine.pop()?;
    let result = left.equals(&right, engine.limits().max_comparable_size)?;
    engine.push(StackItem::from_bool(!result))
}
