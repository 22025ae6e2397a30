//! Stack manipulation handlers.

use crate::error::VmResult;
use crate::execution_engine::ExecutionEngine;
use crate::instruction::Instruction;
use crate::stack_item::StackItem;

pub fn depth(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let depth = engine
        .current_context()
        .map(|context| context.evaluation_stack.len())
        .unwrap_or(0);
    engine.push(StackItem::from_int(depth as i64))
}

pub fn drop_op(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    engine.pop()?;
    Ok(())
}

pub fn nip(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let context = engine
        .current_context()
        .ok_or_else(|| crate::VmError::InvalidOperation("no execution context".into()))?;
    context.evaluation_stack.remove(1)?;
    Ok(())
}

pub fn xdrop(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let n = engine.pop_index(usize::MAX)?;
    let context = engine
        .current_context()
        .ok_or_else(|| crate::VmError::InvalidOperation("no execution context".into()))?;
    context.evaluation_stack.remove(n)?;
    Ok(())
}

pub fn clear(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    if let Some(context) = engine.current_context() {
        context.evaluation_stack.clear();
    }
    Ok(())
}

pub fn dup(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let top = engine.peek(0)?;
    engine.push(top)
}

pub fn over(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let item = engine.peek(1)?;
    engine.push(item)
}

pub fn pick(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let n = engine.pop_index(usize::MAX)?;
    let item = engine.peek(n)?;
    engine.push(item)
}

pub fn tuck(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let top = engine.peek(0)?;
    let context = engine
        .current_context()
        .ok_or_else(|| crate::VmError::InvalidOperation("no execution context".into()))?;
    context.evaluation_stack.insert(2, top)
}

pub fn swap(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let context = engine
        .current_context()
        .ok_or_else(|| crate::VmError::InvalidOperation("no execution context".into()))?;
    let top = context.evaluation_stack.remove(0)?;
    context.evaluation_stack.insert(1, top)
}

pub fn rot(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let context = engine
        .current_context()
        .ok_or_else(|| crate::VmError::InvalidOperation("no execution context".into()))?;
    let third = context.evaluation_stack.remove(2)?;
    context.evaluation_stack.push(third);
    Ok(())
}

pub fn roll(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let n = engine.pop_index(usize::MAX)?;
    if n == 0 {
        return Ok(());
    }
    let context = engine
        .current_context()
        .ok_or_else(|| crate::VmError::InvalidOperation("no execution context".into()))?;
    let item = context.evaluation_stack.remove(n)?;
    context.evaluation_stack.push(item);
    Ok(())
}

pub fn reverse3(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    reverse(engine, 3)
}

pub fn reverse4(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    reverse(engine, 4)
}

pub fn reverse_n(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let n = engine.pop_index(usize::MAX)?;
    reverse(engine, n)
}

fn reverse(engine: &mut ExecutionEngine, count: usize) -> VmResult<()> {
    let context = engine
        .current_context()
        .ok_or_else(|| crate::VmError::InvalidOperation("no execution context".into()))?;
    context.evaluation_stack.reverse(count)
}
