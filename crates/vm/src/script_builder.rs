//! Helper for emitting scripts.

use crate::error::{VmError, VmResult};
use crate::op_code::OpCode;
use crate::stack_item::encode_integer;
use num_bigint::BigInt;

/// Builds scripts opcode by opcode.
///
/// Pushes always use the shortest encoding, the same one compilers and the
/// reference node emit, so hashes over built scripts are stable.
#[derive(Default)]
pub struct ScriptBuilder {
    script: Vec<u8>,
}

impl ScriptBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes emitted so far.
    pub fn len(&self) -> usize {
        self.script.len()
    }

    /// Whether nothing has been emitted.
    pub fn is_empty(&self) -> bool {
        self.script.is_empty()
    }

    /// Finishes the script.
    pub fn to_array(&self) -> Vec<u8> {
        self.script.clone()
    }

    /// Emits a bare opcode.
    pub fn emit(&mut self, opcode: OpCode) -> &mut Self {
        self.script.push(opcode.as_byte());
        self
    }

    /// Emits an opcode with raw operand bytes.
    pub fn emit_raw(&mut self, opcode: OpCode, operand: &[u8]) -> &mut Self {
        self.script.push(opcode.as_byte());
        self.script.extend_from_slice(operand);
        self
    }

    /// Emits the shortest push of an integer.
    pub fn emit_push_int(&mut self, value: impl Into<BigInt>) -> VmResult<&mut Self> {
        let value = value.into();
        if let Ok(small) = i64::try_from(value.clone()) {
            if (-1..=16).contains(&small) {
                let opcode_byte = (OpCode::PUSH0.as_byte() as i64 + small) as u8;
                self.script.push(opcode_byte);
                return Ok(self);
            }
        }
        let bytes = encode_integer(&value);
        let (opcode, width) = match bytes.len() {
            0..=1 => (OpCode::PUSHINT8, 1),
            2 => (OpCode::PUSHINT16, 2),
            3..=4 => (OpCode::PUSHINT32, 4),
            5..=8 => (OpCode::PUSHINT64, 8),
            9..=16 => (OpCode::PUSHINT128, 16),
            17..=32 => (OpCode::PUSHINT256, 32),
            _ => return Err(VmError::out_of_range("integer too wide to push")),
        };
        self.script.push(opcode.as_byte());
        // Sign-extend to the fixed operand width.
        let fill = if value.sign() == num_bigint::Sign::Minus {
            0xff
        } else {
            0x00
        };
        let mut operand = bytes;
        operand.resize(width, fill);
        self.script.extend_from_slice(&operand);
        Ok(self)
    }

    /// Emits a boolean push.
    pub fn emit_push_bool(&mut self, value: bool) -> &mut Self {
        self.emit(if value { OpCode::PUSHT } else { OpCode::PUSHF })
    }

    /// Emits a data push with the narrowest PUSHDATA form.
    pub fn emit_push_bytes(&mut self, data: &[u8]) -> VmResult<&mut Self> {
        if data.len() <= u8::MAX as usize {
            self.script.push(OpCode::PUSHDATA1.as_byte());
            self.script.push(data.len() as u8);
        } else if data.len() <= u16::MAX as usize {
            self.script.push(OpCode::PUSHDATA2.as_byte());
            self.script
                .extend_from_slice(&(data.len() as u16).to_le_bytes());
        } else if data.len() <= u32::MAX as usize {
            self.script.push(OpCode::PUSHDATA4.as_byte());
            self.script
                .extend_from_slice(&(data.len() as u32).to_le_bytes());
        } else {
            return Err(VmError::out_of_range("data too long to push"));
        }
        self.script.extend_from_slice(data);
        Ok(self)
    }

    /// Emits PUSHNULL.
    pub fn emit_push_null(&mut self) -> &mut Self {
        self.emit(OpCode::PUSHNULL)
    }

    /// Emits a SYSCALL of the given interop id.
    pub fn emit_syscall(&mut self, id: u32) -> &mut Self {
        self.script.push(OpCode::SYSCALL.as_byte());
        self.script.extend_from_slice(&id.to_le_bytes());
        self
    }

    /// Emits a short jump with a 1-byte offset.
    pub fn emit_jump(&mut self, opcode: OpCode, offset: i8) -> &mut Self {
        self.script.push(opcode.as_byte());
        self.script.push(offset as u8);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_integers_use_single_byte_opcodes() {
        let mut builder = ScriptBuilder::new();
        builder.emit_push_int(0).unwrap();
        builder.emit_push_int(16).unwrap();
        builder.emit_push_int(-1).unwrap();
        assert_eq!(
            builder.to_array(),
            vec![
                OpCode::PUSH0.as_byte(),
                OpCode::PUSH16.as_byte(),
                OpCode::PUSHM1.as_byte()
            ]
        );
    }

    #[test]
    fn larger_integers_are_sign_extended() {
        let mut builder = ScriptBuilder::new();
        builder.emit_push_int(-200).unwrap();
        assert_eq!(
            builder.to_array(),
            vec![OpCode::PUSHINT16.as_byte(), 0x38, 0xff]
        );
    }

    #[test]
    fn pushdata_uses_narrowest_prefix() {
        let mut builder = ScriptBuilder::new();
        builder.emit_push_bytes(&[0xaa; 3]).unwrap();
        let script = builder.to_array();
        assert_eq!(script[0], OpCode::PUSHDATA1.as_byte());
        assert_eq!(script[1], 3);

        let mut builder = ScriptBuilder::new();
        builder.emit_push_bytes(&vec![0u8; 300]).unwrap();
        assert_eq!(builder.to_array()[0], OpCode::PUSHDATA2.as_byte());
    }
}
