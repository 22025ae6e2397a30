//! Decoded instructions.

use crate::error::{VmError, VmResult};
use crate::op_code::{OpCode, OperandSpec};

/// One decoded instruction: an opcode plus its operand bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    /// The opcode.
    pub opcode: OpCode,
    /// Operand bytes, excluding any length prefix.
    pub operand: Vec<u8>,
    /// Total encoded size, including opcode byte and any prefix.
    pub size: usize,
}

impl Instruction {
    /// Decodes the instruction at `position` in `script`.
    pub fn decode(script: &[u8], position: usize) -> VmResult<Instruction> {
        let Some(&opcode_byte) = script.get(position) else {
            return Err(VmError::bad_script(format!(
                "instruction pointer {position} beyond script end"
            )));
        };
        let opcode = OpCode::from_byte(opcode_byte)
            .ok_or_else(|| VmError::bad_script(format!("undefined opcode 0x{opcode_byte:02x}")))?;

        let operand_start = position + 1;
        match opcode.operand_spec() {
            OperandSpec::None => Ok(Instruction {
                opcode,
                operand: Vec::new(),
                size: 1,
            }),
            OperandSpec::Fixed(len) => {
                let operand = script
                    .get(operand_start..operand_start + len)
                    .ok_or_else(|| truncated(opcode))?;
                Ok(Instruction {
                    opcode,
                    operand: operand.to_vec(),
                    size: 1 + len,
                })
            }
            OperandSpec::Prefix(prefix_len) => {
                let prefix = script
                    .get(operand_start..operand_start + prefix_len)
                    .ok_or_else(|| truncated(opcode))?;
                let data_len = match prefix_len {
                    1 => prefix[0] as usize,
                    2 => u16::from_le_bytes([prefix[0], prefix[1]]) as usize,
                    4 => u32::from_le_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize,
                    _ => unreachable!("prefix widths are 1, 2 or 4"),
                };
                let data_start = operand_start + prefix_len;
                let operand = script
                    .get(data_start..data_start + data_len)
                    .ok_or_else(|| truncated(opcode))?;
                Ok(Instruction {
                    opcode,
                    operand: operand.to_vec(),
                    size: 1 + prefix_len + data_len,
                })
            }
        }
    }

    /// Operand interpreted as a signed 8-bit jump offset.
    pub fn operand_i8(&self) -> i8 {
        self.operand[0] as i8
    }

    /// Operand interpreted as a signed 32-bit jump offset.
    pub fn operand_i32(&self) -> i32 {
        i32::from_le_bytes([
            self.operand[0],
            self.operand[1],
            self.operand[2],
            self.operand[3],
        ])
    }

    /// Second half of an 8-byte operand as an i32 (TRY_L).
    pub fn operand_i32_second(&self) -> i32 {
        i32::from_le_bytes([
            self.operand[4],
            self.operand[5],
            self.operand[6],
            self.operand[7],
        ])
    }

    /// Operand as an unsigned byte (slot indexes, type bytes).
    pub fn operand_u8(&self) -> u8 {
        self.operand[0]
    }

    /// Second byte of a 2-byte operand (INITSLOT).
    pub fn operand_u8_second(&self) -> u8 {
        self.operand[1]
    }

    /// Operand as a little-endian u16 (CALLT token index).
    pub fn operand_u16(&self) -> u16 {
        u16::from_le_bytes([self.operand[0], self.operand[1]])
    }

    /// Operand as a little-endian u32 (SYSCALL id).
    pub fn operand_u32(&self) -> u32 {
        u32::from_le_bytes([
            self.operand[0],
            self.operand[1],
            self.operand[2],
            self.operand[3],
        ])
    }
}

fn truncated(opcode: OpCode) -> VmError {
    VmError::bad_script(format!("truncated operand for {opcode:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_no_operand() {
        let instruction = Instruction::decode(&[0x10], 0).unwrap();
        assert_eq!(instruction.opcode, OpCode::PUSH0);
        assert_eq!(instruction.size, 1);
    }

    #[test]
    fn decodes_fixed_operand() {
        let instruction = Instruction::decode(&[0x00, 0xfe], 0).unwrap();
        assert_eq!(instruction.opcode, OpCode::PUSHINT8);
        assert_eq!(instruction.operand_i8(), -2);
        assert_eq!(instruction.size, 2);
    }

    #[test]
    fn decodes_pushdata_with_prefix() {
        let instruction = Instruction::decode(&[0x0c, 0x03, 0xaa, 0xbb, 0xcc], 0).unwrap();
        assert_eq!(instruction.opcode, OpCode::PUSHDATA1);
        assert_eq!(instruction.operand, vec![0xaa, 0xbb, 0xcc]);
        assert_eq!(instruction.size, 5);
    }

    #[test]
    fn pushdata_must_not_exceed_script() {
        assert!(Instruction::decode(&[0x0c, 0x05, 0xaa], 0).is_err());
    }

    #[test]
    fn undefined_opcode_is_bad_script() {
        assert!(matches!(
            Instruction::decode(&[0x42], 0),
            Err(VmError::BadScript(_))
        ));
    }
}
