//! Immutable scripts with a decoded-instruction cache.

use crate::error::{VmError, VmResult};
use crate::instruction::Instruction;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// An immutable executable script.
///
/// Instructions are decoded lazily: the first fetch at an offset decodes and
/// caches, later fetches reuse the cached form. A decode failure surfaces
/// when the engine actually reaches the bad offset.
pub struct Script {
    bytes: Vec<u8>,
    cache: RefCell<HashMap<usize, Rc<Instruction>>>,
}

impl Script {
    /// Wraps script bytes.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            cache: RefCell::new(HashMap::new()),
        }
    }

    /// The raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Script length in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the script is empty.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Decodes (or fetches from cache) the instruction at `position`.
    pub fn instruction_at(&self, position: usize) -> VmResult<Rc<Instruction>> {
        if let Some(cached) = self.cache.borrow().get(&position) {
            return Ok(Rc::clone(cached));
        }
        let decoded = Rc::new(Instruction::decode(&self.bytes, position)?);
        self.cache
            .borrow_mut()
            .insert(position, Rc::clone(&decoded));
        Ok(decoded)
    }

    /// Checks that `target` is within the script. Jump targets must also land
    /// on instruction boundaries; the boundary itself is enforced when the
    /// jump executes and the target decodes.
    pub fn check_jump_target(&self, target: isize) -> VmResult<usize> {
        if target < 0 || target as usize > self.bytes.len() {
            return Err(VmError::bad_script(format!(
                "jump target {target} outside script of {} bytes",
                self.bytes.len()
            )));
        }
        Ok(target as usize)
    }
}

impl fmt::Debug for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Script({} bytes)", self.bytes.len())
    }
}

impl From<Vec<u8>> for Script {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op_code::OpCode;

    #[test]
    fn caches_decoded_instructions() {
        let script = Script::new(vec![0x12, 0x13, 0x9e]);
        let first = script.instruction_at(0).unwrap();
        let again = script.instruction_at(0).unwrap();
        assert!(Rc::ptr_eq(&first, &again));
        assert_eq!(first.opcode, OpCode::PUSH2);
    }

    #[test]
    fn decode_failure_is_lazy() {
        // 0x42 is undefined, but only reaching it fails.
        let script = Script::new(vec![0x10, 0x42]);
        assert!(script.instruction_at(0).is_ok());
        assert!(script.instruction_at(1).is_err());
    }

    #[test]
    fn jump_target_bounds() {
        let script = Script::new(vec![0x10, 0x10]);
        assert!(script.check_jump_target(-1).is_err());
        assert!(script.check_jump_target(3).is_err());
        assert_eq!(script.check_jump_target(2).unwrap(), 2);
    }
}
