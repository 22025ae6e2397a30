//! Slot handlers: static fields, locals and arguments.

use crate::error::{VmError, VmResult};
use crate::execution_engine::ExecutionEngine;
use crate::instruction::Instruction;
use crate::op_code::OpCode;
use crate::slot::Slot;

/// Index encoded either in the opcode (LDLOC0..6) or in the operand.
fn slot_index(instruction: &Instruction, base: OpCode) -> usize {
    if instruction.operand.is_empty() {
        (instruction.opcode.as_byte() - base.as_byte()) as usize
    } else {
        instruction.operand_u8() as usize
    }
}

pub fn init_static_slot(engine: &mut ExecutionEngine, instruction: &Instruction) -> VmResult<()> {
    let count = instruction.operand_u8() as usize;
    if count == 0 {
        return Err(VmError::bad_script("INITSSLOT with zero fields"));
    }
    let counter = engine.reference_counter().clone();
    let context = engine
        .current_context_mut()
        .ok_or_else(|| VmError::invalid_operation("no execution context"))?;
    if context.static_fields.is_some() {
        return Err(VmError::invalid_operation("static slot already initialized"));
    }
    context.static_fields = Some(Slot::with_count(count, counter));
    Ok(())
}

pub fn init_slot(engine: &mut ExecutionEngine, instruction: &Instruction) -> VmResult<()> {
    let local_count = instruction.operand_u8() as usize;
    let argument_count = instruction.operand_u8_second() as usize;
    if local_count == 0 && argument_count == 0 {
        return Err(VmError::bad_script("INITSLOT with no locals or arguments"));
    }

    // Arguments are popped top-first: the first argument is the top item.
    let mut arguments = Vec::with_capacity(argument_count);
    for _ in 0..argument_count {
        arguments.push(engine.pop()?);
    }

    let counter = engine.reference_counter().clone();
    let context = engine
        .current_context_mut()
        .ok_or_else(|| VmError::invalid_operation("no execution context"))?;
    if context.local_variables.is_some() || context.arguments.is_some() {
        return Err(VmError::invalid_operation("slots already initialized"));
    }
    if local_count > 0 {
        context.local_variables = Some(Slot::with_count(local_count, counter.clone()));
    }
    if argument_count > 0 {
        context.arguments = Some(Slot::new(arguments, counter));
    }
    Ok(())
}

enum SlotKind {
    Static,
    Local,
    Argument,
}

fn load(engine: &mut ExecutionEngine, kind: SlotKind, index: usize) -> VmResult<()> {
    let context = engine
        .current_context()
        .ok_or_else(|| VmError::invalid_operation("no execution context"))?;
    let slot = match kind {
        SlotKind::Static => context.static_fields.as_ref(),
        SlotKind::Local => context.local_variables.as_ref(),
        SlotKind::Argument => context.arguments.as_ref(),
    }
    .ok_or_else(|| VmError::invalid_operation("slot not initialized"))?;
    let item = slot.get(index)?;
    engine.push(item)
}

fn store(engine: &mut ExecutionEngine, kind: SlotKind, index: usize) -> VmResult<()> {
    let item = engine.pop()?;
    let context = engine
        .current_context()
        .ok_or_else(|| VmError::invalid_operation("no execution context"))?;
    let slot = match kind {
        SlotKind::Static => context.static_fields.as_ref(),
        SlotKind::Local => context.local_variables.as_ref(),
        SlotKind::Argument => context.arguments.as_ref(),
    }
    .ok_or_else(|| VmError::invalid_operation("slot not initialized"))?;
    slot.set(index, item)
}

pub fn load_static_field(engine: &mut ExecutionEngine, instruction: &Instruction) -> VmResult<()> {
    let index = slot_index(instruction, OpCode::LDSFLD0);
    load(engine, SlotKind::Static, index)
}

pub fn store_static_field(engine: &mut ExecutionEngine, instruction: &Instruction) -> VmResult<()> {
    let index = slot_index(instruction, OpCode::STSFLD0);
    store(engine, SlotKind::Static, index)
}

pub fn load_local(engine: &mut ExecutionEngine, instruction: &Instruction) -> VmResult<()> {
    let index = slot_index(instruction, OpCode::LDLOC0);
    load(engine, SlotKind::Local, index)
}

pub fn store_local(engine: &mut ExecutionEngine, instruction: &Instruction) -> VmResult<()> {
    let index = slot_index(instruction, OpCode::STLOC0);
    store(engine, SlotKind::Local, index)
}

pub fn load_argument(engine: &mut ExecutionEngine, instruction: &Instruction) -> VmResult<()> {
    let index = slot_index(instruction, OpCode::LDARG0);
    load(engine, SlotKind::Argument, index)
}

pub fn store_argument(engine: &mut ExecutionEngine, instruction: &Instruction) -> VmResult<()> {
    let index = slot_index(instruction, OpCode::STARG0);
    store(engine, SlotKind::Argument, index)
}
