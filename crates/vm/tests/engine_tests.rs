//! End-to-end engine tests over small scripts.

use neo3_vm::stack_item::MAX_INTEGER_SIZE;
use neo3_vm::{
    CallFlags, ExecutionEngine, OpCode, Script, ScriptBuilder, StackItem, VMState, VmError,
};
use std::rc::Rc;

fn run(script: Vec<u8>) -> ExecutionEngine {
    let mut engine = ExecutionEngine::new();
    engine
        .load_script(Rc::new(Script::new(script)), -1, 0, CallFlags::ALL)
        .unwrap();
    engine.execute();
    engine
}

#[test]
fn push_add_halts_with_sum() {
    // PUSH2 PUSH3 ADD
    let engine = run(vec![0x12, 0x13, 0x9e]);
    assert_eq!(engine.state(), VMState::Halt);
    let result = engine.result_stack().peek(0).unwrap();
    assert_eq!(result.get_integer(MAX_INTEGER_SIZE).unwrap(), 5.into());
}

#[test]
fn division_by_zero_faults() {
    // PUSH1 PUSH0 DIV
    let engine = run(vec![0x11, 0x10, 0xa1]);
    assert_eq!(engine.state(), VMState::Fault);
    assert!(matches!(
        engine.fault_reason(),
        Some(VmError::DivideByZero)
    ));
}

#[test]
fn undefined_opcode_faults() {
    let engine = run(vec![0x42]);
    assert_eq!(engine.state(), VMState::Fault);
    assert!(matches!(engine.fault_reason(), Some(VmError::BadScript(_))));
}

#[test]
fn integer_overflow_faults() {
    // Push the 32-byte maximum, then INC.
    let mut builder = ScriptBuilder::new();
    let max = (num_bigint::BigInt::from(1) << 255) - 1;
    builder.emit_push_int(max).unwrap();
    builder.emit(OpCode::INC);
    let engine = run(builder.to_array());
    assert_eq!(engine.state(), VMState::Fault);
}

#[test]
fn boundary_integer_succeeds() {
    let mut builder = ScriptBuilder::new();
    let max = (num_bigint::BigInt::from(1) << 255) - 1;
    builder.emit_push_int(max.clone()).unwrap();
    let engine = run(builder.to_array());
    assert_eq!(engine.state(), VMState::Halt);
    assert_eq!(
        engine.result_stack().peek(0).unwrap().get_integer(MAX_INTEGER_SIZE).unwrap(),
        max
    );
}

#[test]
fn jmp_backwards_loops_until_cancelled() {
    // An infinite loop: JMP -0? Use JMP 0 is invalid-ish; JMP with offset 0
    // jumps to itself forever. Cancellation must break it.
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    let token = Arc::new(AtomicBool::new(false));
    let mut engine = ExecutionEngine::new();
    engine
        .load_script(
            Rc::new(Script::new(vec![0x22, 0x00])), // JMP to itself
            -1,
            0,
            CallFlags::ALL,
        )
        .unwrap();
    engine.set_cancellation_token(token.clone());
    token.store(true, Ordering::Relaxed);
    engine.execute();
    assert_eq!(engine.state(), VMState::Fault);
    assert!(matches!(engine.fault_reason(), Some(VmError::Cancelled)));
}

#[test]
fn conditional_jump_takes_branch() {
    // PUSHT JMPIF +3 (skip PUSH1) PUSH1 PUSH2 => stack: [2]
    let script = vec![
        0x08, // PUSHT
        0x24, 0x03, // JMPIF +3 (from the JMPIF position)
        0x11, // PUSH1 (skipped)
        0x12, // PUSH2
    ];
    let engine = run(script);
    assert_eq!(engine.state(), VMState::Halt);
    assert_eq!(engine.result_stack().len(), 1);
    assert_eq!(
        engine.result_stack().peek(0).unwrap().get_integer(MAX_INTEGER_SIZE).unwrap(),
        2.into()
    );
}

#[test]
fn call_and_ret_share_the_stack() {
    // PUSH2 CALL+3 RET ; callee: PUSH3 ADD RET => 5
    let script = vec![
        0x12, // 0: PUSH2
        0x34, 0x03, // 1: CALL +3 -> 4
        0x40, // 3: RET
        0x13, // 4: PUSH3
        0x9e, // 5: ADD
        0x40, // 6: RET
    ];
    let engine = run(script);
    assert_eq!(engine.state(), VMState::Halt);
    assert_eq!(
        engine.result_stack().peek(0).unwrap().get_integer(MAX_INTEGER_SIZE).unwrap(),
        5.into()
    );
}

#[test]
fn throw_without_handler_faults_with_exception() {
    let mut builder = ScriptBuilder::new();
    builder.emit_push_bytes(b"boom").unwrap();
    builder.emit(OpCode::THROW);
    let engine = run(builder.to_array());
    assert_eq!(engine.state(), VMState::Fault);
    let exception = engine.uncaught_exception().unwrap();
    assert_eq!(exception.get_bytes().unwrap(), b"boom".to_vec());
}

#[test]
fn try_catch_catches_thrown_item() {
    // TRY(catch=+4) PUSH1 THROW ; catch: (exception on stack) RET
    // Layout: 0: TRY c=5 f=0 ; 3: PUSHDATA "e"? keep simple:
    // 0: TRY(0x3b) catch=+5 finally=0
    // 3: PUSH1
    // 4: THROW
    // 5: (catch) PUSH2 ADD? exception is on stack; convert: DROP PUSH7 RET
    let script = vec![
        0x3b, 0x05, 0x00, // TRY catch @ 0+5=5
        0x11, // PUSH1 (thrown away when the stack is trimmed)
        0x3a, // THROW pops the PUSH1 value as the exception
        0x45, // 5: (catch) DROP the exception
        0x17, // PUSH7
        0x40, // RET
    ];
    let engine = run(script);
    assert_eq!(engine.state(), VMState::Halt);
    assert_eq!(
        engine.result_stack().peek(0).unwrap().get_integer(MAX_INTEGER_SIZE).unwrap(),
        7.into()
    );
}

#[test]
fn struct_equality_is_deep() {
    // PACKSTRUCT two identical structs and compare with EQUAL.
    let mut builder = ScriptBuilder::new();
    for _ in 0..2 {
        builder.emit_push_int(1).unwrap();
        builder.emit_push_int(2).unwrap();
        builder.emit_push_int(2).unwrap(); // element count
        builder.emit(OpCode::PACKSTRUCT);
    }
    builder.emit(OpCode::EQUAL);
    let engine = run(builder.to_array());
    assert_eq!(engine.state(), VMState::Halt);
    assert!(engine.result_stack().peek(0).unwrap().get_boolean(MAX_INTEGER_SIZE).unwrap());
}

#[test]
fn array_setitem_is_visible_through_aliases() {
    // a = NEWARRAY(1); DUP; PUSH0; PUSH9; SETITEM; PUSH0 PICKITEM => 9
    let mut builder = ScriptBuilder::new();
    builder.emit_push_int(1).unwrap();
    builder.emit(OpCode::NEWARRAY);
    builder.emit(OpCode::DUP);
    builder.emit_push_int(0).unwrap();
    builder.emit_push_int(9).unwrap();
    builder.emit(OpCode::SETITEM);
    builder.emit_push_int(0).unwrap();
    builder.emit(OpCode::PICKITEM);
    let engine = run(builder.to_array());
    assert_eq!(engine.state(), VMState::Halt);
    assert_eq!(
        engine.result_stack().peek(0).unwrap().get_integer(MAX_INTEGER_SIZE).unwrap(),
        9.into()
    );
}

#[test]
fn reference_count_is_clean_after_halt() {
    let mut builder = ScriptBuilder::new();
    builder.emit_push_int(3).unwrap();
    builder.emit(OpCode::NEWARRAY);
    builder.emit(OpCode::DROP);
    let engine = run(builder.to_array());
    assert_eq!(engine.state(), VMState::Halt);
    // The dropped array was collected; nothing is on the result stack.
    assert_eq!(engine.result_stack().len(), 0);
    assert_eq!(engine.reference_counter().count(), 0);
}

#[test]
fn stack_limit_faults() {
    // DEPTH-based loop would be complex; PACK a huge array of nulls instead:
    // push max+1 items one by one would need a long script; use NEWARRAY n.
    let mut builder = ScriptBuilder::new();
    builder.emit_push_int(3000).unwrap(); // over the 2048 default limit
    builder.emit(OpCode::NEWARRAY);
    let engine = run(builder.to_array());
    assert_eq!(engine.state(), VMState::Fault);
}

#[test]
fn convert_integer_to_bytestring_and_back() {
    let mut builder = ScriptBuilder::new();
    builder.emit_push_int(258).unwrap();
    builder.emit_raw(OpCode::CONVERT, &[0x28]); // ByteString
    builder.emit_raw(OpCode::CONVERT, &[0x21]); // Integer
    let engine = run(builder.to_array());
    assert_eq!(engine.state(), VMState::Halt);
    assert_eq!(
        engine.result_stack().peek(0).unwrap().get_integer(MAX_INTEGER_SIZE).unwrap(),
        258.into()
    );
}

#[test]
fn implicit_ret_at_script_end() {
    let engine = run(vec![0x11]); // PUSH1, no RET
    assert_eq!(engine.state(), VMState::Halt);
    assert_eq!(engine.result_stack().len(), 1);
}

#[test]
fn pushdata_bytes_land_on_stack() {
    let engine = run(vec![0x0c, 0x02, 0xab, 0xcd]);
    assert_eq!(engine.state(), VMState::Halt);
    assert_eq!(
        engine.result_stack().peek(0).unwrap().get_bytes().unwrap(),
        vec![0xab, 0xcd]
    );
}

#[test]
fn assert_false_faults_uncatchably() {
    // TRY wrapping ASSERT(false): the fault must NOT be caught.
    let script = vec![
        0x3b, 0x04, 0x00, // TRY catch @4
        0x09, // PUSHF
        0x39, // ASSERT -> faults
        0x11, // (catch) PUSH1
        0x40,
    ];
    let engine = run(script);
    assert_eq!(engine.state(), VMState::Fault);
}

#[test]
fn xdrop_removes_deep_item() {
    // PUSH1 PUSH2 PUSH3 PUSH2 XDROP -> removes the item 2 deep (PUSH1)
    let engine = run(vec![0x11, 0x12, 0x13, 0x12, 0x48]);
    assert_eq!(engine.state(), VMState::Halt);
    assert_eq!(engine.result_stack().len(), 2);
    assert_eq!(
        engine.result_stack().peek(1).unwrap().get_integer(MAX_INTEGER_SIZE).unwrap(),
        2.into()
    );
}

#[test]
fn stack_item_none_remain_after_fault_teardown() {
    // Build a cyclic structure then fault; dropping the engine must not leak
    // (teardown clears tracked compounds; nothing to assert beyond no panic).
    let mut builder = ScriptBuilder::new();
    builder.emit_push_int(1).unwrap();
    builder.emit(OpCode::NEWARRAY); // [null]
    builder.emit(OpCode::DUP);
    builder.emit(OpCode::DUP);
    builder.emit_push_int(0).unwrap();
    builder.emit(OpCode::SWAP); // arrange array, 0, array
    builder.emit(OpCode::SETITEM); // array[0] = array (cycle)
    builder.emit(OpCode::ABORT);
    let engine = run(builder.to_array());
    assert_eq!(engine.state(), VMState::Fault);
    drop(engine);
}
