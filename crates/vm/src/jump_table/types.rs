//! Type-inspection and conversion handlers.

use crate::error::{VmError, VmResult};
use crate::execution_engine::ExecutionEngine;
use crate::instruction::Instruction;
use crate::stack_item::{StackItem, StackItemType};

pub fn is_null(engine: &mut ExecutionEngine, _i: &Instruction) -> VmResult<()> {
    let item = engine.pop()?;
    engine.push(StackItem::from_bool(item.is_null()))
}

pub fn is_type(engine: &mut ExecutionEngine, instruction: &Instruction) -> VmResult<()> {
    let target = StackItemType::from_byte(instruction.operand_u8())
        .ok_or_else(|| VmError::bad_script("ISTYPE with undefined type"))?;
    if target == StackItemType::Any {
        return Err(VmError::bad_script("ISTYPE Any is meaningless"));
    }
    let item = engine.pop()?;
    engine.push(StackItem::from_bool(item.item_type() == target))
}

pub fn convert(engine: &mut ExecutionEngine, instruction: &Instruction) -> VmResult<()> {
    let target = StackItemType::from_byte(instruction.operand_u8())
        .ok_or_else(|| VmError::bad_script("CONVERT to undefined type"))?;
    if target == StackItemType::Any {
        return Err(VmError::invalid_cast("CONVERT to Any"));
    }
    let item = engine.pop()?;
    let converted = item.convert_to(target, engine.limits().max_integer_size)?;
    engine.push(converted)
}
