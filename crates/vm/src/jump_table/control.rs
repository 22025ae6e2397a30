//! Flow-control handlers.

use crate::error::{VmError, VmResult};
use crate::exception_handling::{ExceptionHandlingContext, ExceptionHandlingState};
use crate::execution_engine::ExecutionEngine;
use crate::instruction::Instruction;
use crate::op_code::OpCode;
use crate::stack_item::StackItem;
use std::cmp::Ordering;

pub fn nop(_engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    Ok(())
}

fn branch_offset(instruction: &Instruction) -> i64 {
    if instruction.operand.len() == 1 {
        i64::from(instruction.operand_i8())
    } else {
        i64::from(instruction.operand_i32())
    }
}

fn compare_tops(engine: &mut ExecutionEngine) -> VmResult<Ordering> {
    let right = engine.pop_integer()?;
    let left = engine.pop_integer()?;
    Ok(left.cmp(&right))
}

pub fn jump(engine: &mut ExecutionEngine, instruction: &Instruction) -> VmResult<()> {
    use OpCode::*;
    let take = match instruction.opcode {
        JMP | JMPL => true,
        JMPIF | JMPIFL => engine.pop_boolean()?,
        JMPIFNOT | JMPIFNOTL => !engine.pop_boolean()?,
        JMPEQ | JMPEQL => compare_tops(engine)? == Ordering::Equal,
        JMPNE | JMPNEL => compare_tops(engine)? != Ordering::Equal,
        JMPGT | JMPGTL => compare_tops(engine)? == Ordering::Greater,
        JMPGE | JMPGEL => compare_tops(engine)? != Ordering::Less,
        JMPLT | JMPLTL => compare_tops(engine)? == Ordering::Less,
        JMPLE | JMPLEL => compare_tops(engine)? != Ordering::Greater,
        other => return Err(VmError::bad_script(format!("{other:?} is not a jump"))),
    };
    if take {
        let target = engine.jump_target(branch_offset(instruction))?;
        engine.execute_jump(target)?;
    }
    Ok(())
}

pub fn call(engine: &mut ExecutionEngine, instruction: &Instruction) -> VmResult<()> {
    let target = engine.jump_target(branch_offset(instruction))?;
    engine.execute_call(target)
}

pub fn call_a(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    match engine.pop()? {
        StackItem::Pointer(position) => engine.execute_call(position),
        other => Err(VmError::invalid_cast(format!(
            "CALLA expects a pointer, got {:?}",
            other.item_type()
        ))),
    }
}

/// CALLT resolves a method token; only the application layer knows the token
/// table, so the raw VM rejects it.
pub fn call_token(_engine: &mut ExecutionEngine, instruction: &Instruction) -> VmResult<()> {
    Err(VmError::invalid_operation(format!(
        "CALLT token {} without a token table",
        instruction.operand_u16()
    )))
}

pub fn abort(_engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    Err(VmError::invalid_operation("ABORT"))
}

pub fn abort_msg(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let message = engine.pop_bytes()?;
    Err(VmError::invalid_operation(format!(
        "ABORT: {}",
        String::from_utf8_lossy(&message)
    )))
}

pub fn assert(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    if engine.pop_boolean()? {
        Ok(())
    } else {
        Err(VmError::invalid_operation("ASSERT failed"))
    }
}

pub fn assert_msg(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let message = engine.pop_bytes()?;
    if engine.pop_boolean()? {
        Ok(())
    } else {
        Err(VmError::invalid_operation(format!(
            "ASSERT failed: {}",
            String::from_utf8_lossy(&message)
        )))
    }
}

pub fn throw(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let exception = engine.pop()?;
    engine.execute_throw(exception)
}

pub fn try_op(engine: &mut ExecutionEngine, instruction: &Instruction) -> VmResult<()> {
    let (catch_offset, finally_offset) = if instruction.operand.len() == 2 {
        (
            i64::from(instruction.operand[0] as i8),
            i64::from(instruction.operand[1] as i8),
        )
    } else {
        (
            i64::from(instruction.operand_i32()),
            i64::from(instruction.operand_i32_second()),
        )
    };
    if catch_offset == 0 && finally_offset == 0 {
        return Err(VmError::bad_script("TRY with neither catch nor finally"));
    }

    let max_depth = engine.limits().max_try_nesting_depth;
    let catch_pointer = if catch_offset == 0 {
        -1
    } else {
        engine.jump_target(catch_offset)? as isize
    };
    let finally_pointer = if finally_offset == 0 {
        -1
    } else {
        engine.jump_target(finally_offset)? as isize
    };

    let context = engine
        .current_context_mut()
        .ok_or_else(|| VmError::invalid_operation("no execution context"))?;
    if context.try_stack.len() >= max_depth {
        return Err(VmError::limit("TRY nesting too deep"));
    }
    let stack_depth = context.evaluation_stack.len();
    context.try_stack.push(ExceptionHandlingContext::new(
        catch_pointer,
        finally_pointer,
        stack_depth,
    ));
    Ok(())
}

pub fn end_try(engine: &mut ExecutionEngine, instruction: &Instruction) -> VmResult<()> {
    let end_pointer = engine.jump_target(branch_offset(instruction))? as isize;
    let context = engine
        .current_context_mut()
        .ok_or_else(|| VmError::invalid_operation("no execution context"))?;
    let entry = context
        .try_stack
        .last_mut()
        .ok_or_else(|| VmError::invalid_operation("ENDTRY outside of TRY"))?;
    if entry.state == ExceptionHandlingState::Finally {
        return Err(VmError::invalid_operation("ENDTRY inside finally"));
    }

    if entry.has_finally() {
        entry.state = ExceptionHandlingState::Finally;
        entry.end_pointer = end_pointer;
        let finally_pointer = entry.finally_pointer as usize;
        engine.execute_jump(finally_pointer)?;
    } else {
        context.try_stack.pop();
        engine.execute_jump(end_pointer as usize)?;
    }
    Ok(())
}

pub fn end_finally(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let context = engine
        .current_context_mut()
        .ok_or_else(|| VmError::invalid_operation("no execution context"))?;
    let entry = context
        .try_stack
        .pop()
        .ok_or_else(|| VmError::invalid_operation("ENDFINALLY outside of TRY"))?;

    if engine.has_uncaught_exception() {
        // The finally ran while unwinding: keep looking for a handler.
        engine.handle_exception()
    } else {
        if entry.end_pointer < 0 {
            return Err(VmError::invalid_operation("ENDFINALLY without ENDTRY"));
        }
        engine.execute_jump(entry.end_pointer as usize)
    }
}

pub fn ret(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    engine.execute_ret()
}

/// The raw VM has no interop layer; the application engine intercepts
/// SYSCALL before dispatch ever reaches this handler.
pub fn syscall(_engine: &mut ExecutionEngine, instruction: &Instruction) -> VmResult<()> {
    Err(VmError::UnknownSyscall(instruction.operand_u32()))
}
