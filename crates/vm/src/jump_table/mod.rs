//! Opcode dispatch.
//!
//! A single 256-entry table maps opcode bytes to handlers. Handlers pop
//! their operands, validate types and push results; any error they return
//! becomes a FAULT in the engine.

mod bitwise;
mod compound;
mod control;
mod numeric;
mod push;
mod slot_ops;
mod splice;
mod stack_ops;
mod types;

use crate::error::{VmError, VmResult};
use crate::execution_engine::ExecutionEngine;
use crate::instruction::Instruction;
use crate::op_code::OpCode;
use std::sync::OnceLock;

/// An opcode handler.
pub type Handler = fn(&mut ExecutionEngine, &Instruction) -> VmResult<()>;

/// Dispatches one instruction through the table.
pub fn dispatch(engine: &mut ExecutionEngine, instruction: &Instruction) -> VmResult<()> {
    match table()[instruction.opcode.as_byte() as usize] {
        Some(handler) => handler(engine, instruction),
        None => Err(VmError::bad_script(format!(
            "no handler for {:?}",
            instruction.opcode
        ))),
    }
}

fn table() -> &'static [Option<Handler>; 256] {
    static TABLE: OnceLock<[Option<Handler>; 256]> = OnceLock::new();
    TABLE.get_or_init(build_table)
}

fn build_table() -> [Option<Handler>; 256] {
    use OpCode::*;
    let mut table: [Option<Handler>; 256] = [None; 256];
    let mut set = |op: OpCode, handler: Handler| {
        table[op.as_byte() as usize] = Some(handler);
    };

    // Constants
    for op in [PUSHINT8, PUSHINT16, PUSHINT32, PUSHINT64, PUSHINT128, PUSHINT256] {
        set(op, push::push_int);
    }
    set(PUSHT, push::push_true);
    set(PUSHF, push::push_false);
    set(PUSHA, push::push_a);
    set(PUSHNULL, push::push_null);
    for op in [PUSHDATA1, PUSHDATA2, PUSHDATA4] {
        set(op, push::push_data);
    }
    for op in [
        PUSHM1, PUSH0, PUSH1, PUSH2, PUSH3, PUSH4, PUSH5, PUSH6, PUSH7, PUSH8, PUSH9, PUSH10,
        PUSH11, PUSH12, PUSH13, PUSH14, PUSH15, PUSH16,
    ] {
        set(op, push::push_small_int);
    }

    // Flow control
    set(NOP, control::nop);
    for op in [
        JMP, JMPL, JMPIF, JMPIFL, JMPIFNOT, JMPIFNOTL, JMPEQ, JMPEQL, JMPNE, JMPNEL, JMPGT,
        JMPGTL, JMPGE, JMPGEL, JMPLT, JMPLTL, JMPLE, JMPLEL,
    ] {
        set(op, control::jump);
    }
    set(CALL, control::call);
    set(CALLL, control::call);
    set(CALLA, control::call_a);
    set(CALLT, control::call_token);
    set(ABORT, control::abort);
    set(ASSERT, control::assert);
    set(THROW, control::throw);
    set(TRY, control::try_op);
    set(TRYL, control::try_op);
    set(ENDTRY, control::end_try);
    set(ENDTRYL, control::end_try);
    set(ENDFINALLY, control::end_finally);
    set(RET, control::ret);
    set(SYSCALL, control::syscall);
    set(ABORTMSG, control::abort_msg);
    set(ASSERTMSG, control::assert_msg);

    // Stack manipulation
    set(DEPTH, stack_ops::depth);
    set(DROP, stack_ops::drop_op);
    set(NIP, stack_ops::nip);
    set(XDROP, stack_ops::xdrop);
    set(CLEAR, stack_ops::clear);
    set(DUP, stack_ops::dup);
    set(OVER, stack_ops::over);
    set(PICK, stack_ops::pick);
    set(TUCK, stack_ops::tuck);
    set(SWAP, stack_ops::swap);
    set(ROT, stack_ops::rot);
    set(ROLL, stack_ops::roll);
    set(REVERSE3, stack_ops::reverse3);
    set(REVERSE4, stack_ops::reverse4);
    set(REVERSEN, stack_ops::reverse_n);

    // Slots
    set(INITSSLOT, slot_ops::init_static_slot);
    set(INITSLOT, slot_ops::init_slot);
    for op in [LDSFLD0, LDSFLD1, LDSFLD2, LDSFLD3, LDSFLD4, LDSFLD5, LDSFLD6, LDSFLD] {
        set(op, slot_ops::load_static_field);
    }
    for op in [STSFLD0, STSFLD1, STSFLD2, STSFLD3, STSFLD4, STSFLD5, STSFLD6, STSFLD] {
        set(op, slot_ops::store_static_field);
    }
    for op in [LDLOC0, LDLOC1, LDLOC2, LDLOC3, LDLOC4, LDLOC5, LDLOC6, LDLOC] {
        set(op, slot_ops::load_local);
    }
    for op in [STLOC0, STLOC1, STLOC2, STLOC3, STLOC4, STLOC5, STLOC6, STLOC] {
        set(op, slot_ops::store_local);
    }
    for op in [LDARG0, LDARG1, LDARG2, LDARG3, LDARG4, LDARG5, LDARG6, LDARG] {
        set(op, slot_ops::load_argument);
    }
    for op in [STARG0, STARG1, STARG2, STARG3, STARG4, STARG5, STARG6, STARG] {
        set(op, slot_ops::store_argument);
    }

    // Splice
    set(NEWBUFFER, splice::new_buffer);
    set(MEMCPY, splice::memcpy);
    set(CAT, splice::cat);
    set(SUBSTR, splice::substr);
    set(LEFT, splice::left);
    set(RIGHT, splice::right);

    // Bitwise logic
    set(INVERT, bitwise::invert);
    set(AND, bitwise::and);
    set(OR, bitwise::or);
    set(XOR, bitwise::xor);
    set(EQUAL, bitwise::equal);
    set(NOTEQUAL, bitwise::not_equal);

    // Arithmetic
    set(SIGN, numeric::sign);
    set(ABS, numeric::abs);
    set(NEGATE, numeric::negate);
    set(INC, numeric::inc);
    set(DEC, numeric::dec);
    set(ADD, numeric::add);
    set(SUB, numeric::sub);
    set(MUL, numeric::mul);
    set(DIV, numeric::div);
    set(MOD, numeric::modulo);
    set(POW, numeric::pow);
    set(SQRT, numeric::sqrt);
    set(MODMUL, numeric::mod_mul);
    set(MODPOW, numeric::mod_pow);
    set(SHL, numeric::shl);
    set(SHR, numeric::shr);
    set(NOT, numeric::not);
    set(BOOLAND, numeric::bool_and);
    set(BOOLOR, numeric::bool_or);
    set(NZ, numeric::nz);
    set(NUMEQUAL, numeric::num_equal);
    set(NUMNOTEQUAL, numeric::num_not_equal);
    set(LT, numeric::lt);
    set(LE, numeric::le);
    set(GT, numeric::gt);
    set(GE, numeric::ge);
    set(MIN, numeric::min);
    set(MAX, numeric::max);
    set(WITHIN, numeric::within);

    // Compound types
    set(PACKMAP, compound::pack_map);
    set(PACKSTRUCT, compound::pack_struct);
    set(PACK, compound::pack);
    set(UNPACK, compound::unpack);
    set(NEWARRAY0, compound::new_array0);
    set(NEWARRAY, compound::new_array);
    set(NEWARRAYT, compound::new_array_t);
    set(NEWSTRUCT0, compound::new_struct0);
    set(NEWSTRUCT, compound::new_struct);
    set(NEWMAP, compound::new_map);
    set(SIZE, compound::size);
    set(HASKEY, compound::has_key);
    set(KEYS, compound::keys);
    set(VALUES, compound::values);
    set(PICKITEM, compound::pick_item);
    set(APPEND, compound::append);
    set(SETITEM, compound::set_item);
    set(REVERSEITEMS, compound::reverse_items);
    set(REMOVE, compound::remove);
    set(CLEARITEMS, compound::clear_items);
    set(POPITEM, compound::pop_item);

    // Types
    set(ISNULL, types::is_null);
    set(ISTYPE, types::is_type);
    set(CONVERT, types::convert);

    table
}
