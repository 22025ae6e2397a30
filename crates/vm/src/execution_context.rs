//! Execution contexts: one frame of the invocation stack.

use crate::call_flags::CallFlags;
use crate::evaluation_stack::EvaluationStack;
use crate::exception_handling::ExceptionHandlingContext;
use crate::script::Script;
use crate::slot::Slot;
use std::any::Any;
use std::rc::Rc;

/// One frame: a script, an instruction pointer, an evaluation stack, slots
/// and try-stack, plus the permissions the frame runs under.
pub struct ExecutionContext {
    /// The script being executed.
    pub script: Rc<Script>,

    /// Current instruction pointer.
    pub ip: usize,

    /// Number of items returned to the caller on unload; -1 means all.
    pub rvcount: i32,

    /// The evaluation stack; shared with CALL clones.
    pub evaluation_stack: EvaluationStack,

    /// Static fields, created by INITSSLOT and shared with CALL clones.
    pub static_fields: Option<Slot>,

    /// Local variables, created by INITSLOT.
    pub local_variables: Option<Slot>,

    /// Arguments, created by INITSLOT.
    pub arguments: Option<Slot>,

    /// Active TRY blocks, innermost last.
    pub try_stack: Vec<ExceptionHandlingContext>,

    /// Permissions of this frame.
    pub call_flags: CallFlags,

    /// Host-attached state (snapshot layer, script hashes); shared with CALL
    /// clones of the same frame.
    pub app_state: Option<Rc<dyn Any>>,
}

impl ExecutionContext {
    /// Creates a frame at position 0 of `script`.
    pub fn new(script: Rc<Script>, rvcount: i32, evaluation_stack: EvaluationStack) -> Self {
        Self {
            script,
            ip: 0,
            rvcount,
            evaluation_stack,
            static_fields: None,
            local_variables: None,
            arguments: None,
            try_stack: Vec::new(),
            call_flags: CallFlags::ALL,
            app_state: None,
        }
    }

    /// Clones the frame for CALL: shared script, evaluation stack, static
    /// fields and host state; fresh locals, arguments and try stack.
    pub fn clone_at(&self, position: usize) -> Self {
        Self {
            script: Rc::clone(&self.script),
            ip: position,
            rvcount: 0,
            evaluation_stack: self.evaluation_stack.clone(),
            static_fields: self.static_fields.clone(),
            local_variables: None,
            arguments: None,
            try_stack: Vec::new(),
            call_flags: self.call_flags,
            app_state: self.app_state.clone(),
        }
    }

    /// Releases the references held by this frame's private slots. Static
    /// fields may be shared with CALL clones; the engine clears them when the
    /// last sharing frame unloads.
    pub fn clear_slot_references(&self) {
        if let Some(slot) = &self.local_variables {
            slot.clear_references();
        }
        if let Some(slot) = &self.arguments {
            slot.clear_references();
        }
    }
}
