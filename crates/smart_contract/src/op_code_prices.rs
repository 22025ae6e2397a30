//! Base gas price of every opcode, in datoshi before the execution fee
//! factor is applied.

use neo3_vm::OpCode;

/// The base price of one opcode.
pub fn opcode_price(opcode: OpCode) -> i64 {
    use OpCode::*;
    match opcode {
        // Constants
        PUSHINT8 | PUSHINT16 | PUSHINT32 | PUSHINT64 | PUSHNULL | PUSHM1 | PUSH0 | PUSH1
        | PUSH2 | PUSH3 | PUSH4 | PUSH5 | PUSH6 | PUSH7 | PUSH8 | PUSH9 | PUSH10 | PUSH11
        | PUSH12 | PUSH13 | PUSH14 | PUSH15 | PUSH16 | PUSHT | PUSHF => 1 << 0,
        PUSHINT128 | PUSHINT256 | PUSHA => 1 << 2,
        PUSHDATA1 => 1 << 3,
        PUSHDATA2 => 1 << 9,
        PUSHDATA4 => 1 << 12,

        // Flow control
        NOP => 1 << 0,
        JMP | JMPL | JMPIF | JMPIFL | JMPIFNOT | JMPIFNOTL | JMPEQ | JMPEQL | JMPNE | JMPNEL
        | JMPGT | JMPGTL | JMPGE | JMPGEL | JMPLT | JMPLTL | JMPLE | JMPLEL => 1 << 1,
        CALL | CALLL | CALLA => 1 << 9,
        CALLT => 1 << 15,
        ABORT | ABORTMSG | RET | SYSCALL => 0,
        ASSERT | ASSERTMSG => 1 << 0,
        THROW => 1 << 9,
        TRY | TRYL | ENDTRY | ENDTRYL | ENDFINALLY => 1 << 2,

        // Stack
        DEPTH | DROP | NIP | DUP | OVER | PICK | TUCK | SWAP | ROT => 1 << 1,
        XDROP | CLEAR | ROLL | REVERSE3 | REVERSE4 | REVERSEN => 1 << 4,

        // Slots
        INITSSLOT => 1 << 4,
        INITSLOT => 1 << 6,
        LDSFLD0 | LDSFLD1 | LDSFLD2 | LDSFLD3 | LDSFLD4 | LDSFLD5 | LDSFLD6 | LDSFLD | STSFLD0
        | STSFLD1 | STSFLD2 | STSFLD3 | STSFLD4 | STSFLD5 | STSFLD6 | STSFLD | LDLOC0 | LDLOC1
        | LDLOC2 | LDLOC3 | LDLOC4 | LDLOC5 | LDLOC6 | LDLOC | STLOC0 | STLOC1 | STLOC2
        | STLOC3 | STLOC4 | STLOC5 | STLOC6 | STLOC | LDARG0 | LDARG1 | LDARG2 | LDARG3
        | LDARG4 | LDARG5 | LDARG6 | LDARG | STARG0 | STARG1 | STARG2 | STARG3 | STARG4
        | STARG5 | STARG6 | STARG => 1 << 1,

        // Splice
        NEWBUFFER => 1 << 8,
        MEMCPY | CAT | SUBSTR | LEFT | RIGHT => 1 << 11,

        // Bitwise logic
        INVERT | AND | OR | XOR => 1 << 3,
        EQUAL | NOTEQUAL => 1 << 5,

        // Arithmetic
        SIGN | ABS | NEGATE | INC | DEC | NOT | NZ => 1 << 2,
        ADD | SUB | MUL | DIV | MOD | SHL | SHR | BOOLAND | BOOLOR | NUMEQUAL | NUMNOTEQUAL
        | LT | LE | GT | GE | MIN | MAX | WITHIN => 1 << 3,
        POW | SQRT => 1 << 6,
        MODMUL => 1 << 5,
        MODPOW => 1 << 11,

        // Compound types
        PACKMAP | PACKSTRUCT | PACK | UNPACK => 1 << 11,
        NEWARRAY0 | NEWSTRUCT0 => 1 << 4,
        NEWARRAY | NEWARRAYT | NEWSTRUCT => 1 << 9,
        NEWMAP => 1 << 3,
        SIZE => 1 << 2,
        HASKEY | PICKITEM => 1 << 6,
        KEYS | REMOVE | CLEARITEMS | POPITEM => 1 << 4,
        VALUES | APPEND | SETITEM | REVERSEITEMS => 1 << 13,

        // Types
        ISNULL | ISTYPE => 1 << 1,
        CONVERT => 1 << 13,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn representative_prices() {
        assert_eq!(opcode_price(OpCode::PUSH1), 1);
        assert_eq!(opcode_price(OpCode::SYSCALL), 0);
        assert_eq!(opcode_price(OpCode::CONVERT), 8192);
        assert_eq!(opcode_price(OpCode::CALLT), 32768);
    }
}
