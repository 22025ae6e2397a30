//! The execution engine: drives contexts until HALT or FAULT.

use crate::call_flags::CallFlags;
use crate::error::{VmError, VmResult};
use crate::evaluation_stack::EvaluationStack;
use crate::exception_handling::ExceptionHandlingState;
use crate::execution_context::ExecutionContext;
use crate::instruction::Instruction;
use crate::jump_table;
use crate::limits::ExecutionEngineLimits;
use crate::op_code::OpCode;
use crate::reference_counter::ReferenceCounter;
use crate::script::Script;
use crate::stack_item::StackItem;
use crate::vm_state::VMState;
use num_bigint::BigInt;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Why a context left the invocation stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnloadReason {
    /// Normal return (RET or implicit end of script).
    Return,
    /// Removed while unwinding towards an exception handler.
    Exception,
}

/// A context that has been popped, queued for the host to observe.
///
/// The application layer drains these after each instruction to commit or
/// discard per-context snapshots.
pub struct UnloadedContext {
    /// The popped frame.
    pub context: ExecutionContext,
    /// Why it was popped.
    pub reason: UnloadReason,
}

/// The virtual machine engine.
///
/// A raw engine executes pure scripts; SYSCALL faults. The application layer
/// wraps the engine, intercepts SYSCALL and meters gas by driving
/// [`ExecutionEngine::fetch_instruction`] /
/// [`ExecutionEngine::execute_instruction`] /
/// [`ExecutionEngine::post_instruction`] itself.
pub struct ExecutionEngine {
    state: VMState,
    pub(crate) jumping: bool,
    limits: ExecutionEngineLimits,
    reference_counter: ReferenceCounter,
    invocation_stack: Vec<ExecutionContext>,
    result_stack: EvaluationStack,
    uncaught_exception: Option<StackItem>,
    fault_reason: Option<VmError>,
    unloaded_contexts: Vec<UnloadedContext>,
    cancellation: Option<Arc<AtomicBool>>,
}

impl Default for ExecutionEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionEngine {
    /// Creates an engine with default limits.
    pub fn new() -> Self {
        Self::with_limits(ExecutionEngineLimits::default())
    }

    /// Creates an engine with explicit limits.
    pub fn with_limits(limits: ExecutionEngineLimits) -> Self {
        let reference_counter = ReferenceCounter::new();
        Self {
            state: VMState::Break,
            jumping: false,
            limits,
            result_stack: EvaluationStack::new(reference_counter.clone()),
            reference_counter,
            invocation_stack: Vec::new(),
            uncaught_exception: None,
            fault_reason: None,
            unloaded_contexts: Vec::new(),
            cancellation: None,
        }
    }

    /// Current state.
    pub fn state(&self) -> VMState {
        self.state
    }

    /// Forces the state; used by the host for cancellation and gas faults.
    pub fn set_state(&mut self, state: VMState) {
        self.state = state;
    }

    /// The engine's limits.
    pub fn limits(&self) -> &ExecutionEngineLimits {
        &self.limits
    }

    /// The shared reference counter.
    pub fn reference_counter(&self) -> &ReferenceCounter {
        &self.reference_counter
    }

    /// The result stack; meaningful after HALT.
    pub fn result_stack(&self) -> &EvaluationStack {
        &self.result_stack
    }

    /// The exception that faulted the engine, if any.
    pub fn uncaught_exception(&self) -> Option<&StackItem> {
        self.uncaught_exception.as_ref()
    }

    /// The error behind a FAULT, if any.
    pub fn fault_reason(&self) -> Option<&VmError> {
        self.fault_reason.as_ref()
    }

    /// Installs a flag checked between instructions; setting it faults the
    /// execution with [`VmError::Cancelled`].
    pub fn set_cancellation_token(&mut self, token: Arc<AtomicBool>) {
        self.cancellation = Some(token);
    }

    /// Number of loaded contexts.
    pub fn invocation_stack_len(&self) -> usize {
        self.invocation_stack.len()
    }

    /// The executing context.
    pub fn current_context(&self) -> Option<&ExecutionContext> {
        self.invocation_stack.last()
    }

    /// The executing context, mutable.
    pub fn current_context_mut(&mut self) -> Option<&mut ExecutionContext> {
        self.invocation_stack.last_mut()
    }

    /// The entry context (bottom of the invocation stack).
    pub fn entry_context(&self) -> Option<&ExecutionContext> {
        self.invocation_stack.first()
    }

    /// All loaded contexts, bottom first.
    pub fn invocation_stack(&self) -> &[ExecutionContext] {
        &self.invocation_stack
    }

    /// Drains contexts unloaded since the last call, oldest first.
    pub fn drain_unloaded_contexts(&mut self) -> Vec<UnloadedContext> {
        std::mem::take(&mut self.unloaded_contexts)
    }

    /// Loads a script as a new context and returns a handle to it.
    pub fn load_script(
        &mut self,
        script: Rc<Script>,
        rvcount: i32,
        initial_position: usize,
        call_flags: CallFlags,
    ) -> VmResult<&mut ExecutionContext> {
        let stack = EvaluationStack::new(self.reference_counter.clone());
        let mut context = ExecutionContext::new(script, rvcount, stack);
        context.ip = initial_position;
        context.call_flags = call_flags;
        self.load_context(context)?;
        Ok(self.invocation_stack.last_mut().expect("just pushed"))
    }

    /// Pushes a prepared context.
    pub fn load_context(&mut self, context: ExecutionContext) -> VmResult<()> {
        if self.invocation_stack.len() >= self.limits.max_invocation_stack_size {
            return Err(VmError::limit("invocation stack overflow"));
        }
        self.invocation_stack.push(context);
        Ok(())
    }

    // ---- stack helpers over the current context ----

    fn stack(&self) -> VmResult<&EvaluationStack> {
        self.invocation_stack
            .last()
            .map(|context| &context.evaluation_stack)
            .ok_or_else(|| VmError::invalid_operation("no execution context"))
    }

    /// Pushes onto the current evaluation stack.
    pub fn push(&mut self, item: StackItem) -> VmResult<()> {
        self.stack()?.push(item);
        Ok(())
    }

    /// Pops from the current evaluation stack.
    pub fn pop(&mut self) -> VmResult<StackItem> {
        self.stack()?.pop()
    }

    /// Peeks into the current evaluation stack.
    pub fn peek(&self, depth: usize) -> VmResult<StackItem> {
        self.stack()?.peek(depth)
    }

    /// Pops an integer, bounded by the configured integer width.
    pub fn pop_integer(&mut self) -> VmResult<BigInt> {
        self.pop()?.get_integer(self.limits.max_integer_size)
    }

    /// Pops a boolean.
    pub fn pop_boolean(&mut self) -> VmResult<bool> {
        self.pop()?.get_boolean(self.limits.max_integer_size)
    }

    /// Pops a byte span.
    pub fn pop_bytes(&mut self) -> VmResult<Vec<u8>> {
        self.pop()?.get_bytes()
    }

    /// Pops a non-negative index bounded by `max`.
    pub fn pop_index(&mut self, max: usize) -> VmResult<usize> {
        let value = self.pop_integer()?;
        let index: usize = value
            .try_into()
            .map_err(|_| VmError::out_of_range("negative index"))?;
        if index > max {
            return Err(VmError::out_of_range(format!("index {index} > {max}")));
        }
        Ok(index)
    }

    // ---- execution ----

    /// Runs until the engine leaves the runnable states.
    pub fn execute(&mut self) -> VMState {
        if self.state == VMState::Break {
            self.state = VMState::None;
        }
        while self.state == VMState::None {
            self.execute_next();
        }
        self.state
    }

    /// Executes exactly one instruction, handling faults internally.
    pub fn execute_next(&mut self) {
        if let Some(token) = &self.cancellation {
            if token.load(Ordering::Relaxed) {
                self.fault(VmError::Cancelled);
                return;
            }
        }
        let instruction = match self.fetch_instruction() {
            Ok(instruction) => instruction,
            Err(error) => {
                self.fault(error);
                return;
            }
        };
        let executing_frame = self.invocation_stack.len().saturating_sub(1);
        if let Err(error) = self
            .execute_instruction(&instruction)
            .and_then(|_| self.post_instruction(&instruction, executing_frame))
        {
            self.fault(error);
        }
    }

    /// The instruction at the current instruction pointer. At or past the
    /// script end an implicit RET is synthesized.
    pub fn fetch_instruction(&self) -> VmResult<Instruction> {
        let context = self
            .current_context()
            .ok_or_else(|| VmError::invalid_operation("no execution context"))?;
        if context.ip >= context.script.len() {
            return Ok(Instruction {
                opcode: OpCode::RET,
                operand: Vec::new(),
                size: 0,
            });
        }
        context.script.instruction_at(context.ip).map(|i| (*i).clone())
    }

    /// Dispatches one instruction through the jump table without advancing
    /// the instruction pointer.
    pub fn execute_instruction(&mut self, instruction: &Instruction) -> VmResult<()> {
        jump_table::dispatch(self, instruction)
    }

    /// Advances the frame that executed `instruction` (unless it jumped or
    /// was unloaded), collects garbage and enforces the stack-size limit.
    ///
    /// `executing_frame` is the invocation-stack index of the current context
    /// at fetch time: after a CALL the caller advances past the instruction
    /// while the callee starts at its target; after a RET the frame is gone
    /// and nothing advances.
    pub fn post_instruction(
        &mut self,
        instruction: &Instruction,
        executing_frame: usize,
    ) -> VmResult<()> {
        if !self.jumping {
            if let Some(context) = self.invocation_stack.get_mut(executing_frame) {
                context.ip += instruction.size;
            }
        }
        self.jumping = false;
        if self.reference_counter.check_zero_referred() > self.limits.max_stack_size {
            return Err(VmError::limit("stack size limit reached"));
        }
        Ok(())
    }

    /// Records the error and moves to FAULT.
    pub fn fault(&mut self, error: VmError) {
        self.fault_reason = Some(error);
        self.state = VMState::Fault;
    }

    // ---- control flow used by the jump table ----

    /// Absolute jump within the current context.
    pub(crate) fn execute_jump(&mut self, position: usize) -> VmResult<()> {
        let context = self
            .invocation_stack
            .last_mut()
            .ok_or_else(|| VmError::invalid_operation("no execution context"))?;
        context.script.check_jump_target(position as isize)?;
        context.ip = position;
        self.jumping = true;
        Ok(())
    }

    /// Jump target relative to the current instruction.
    pub(crate) fn jump_target(&self, offset: i64) -> VmResult<usize> {
        let context = self
            .current_context()
            .ok_or_else(|| VmError::invalid_operation("no execution context"))?;
        let target = context.ip as i64 + offset;
        context.script.check_jump_target(target as isize)?;
        Ok(target as usize)
    }

    /// CALL: clone the current context at `position` and load it.
    pub fn execute_call(&mut self, position: usize) -> VmResult<()> {
        let context = self
            .current_context()
            .ok_or_else(|| VmError::invalid_operation("no execution context"))?;
        context.script.check_jump_target(position as isize)?;
        let clone = context.clone_at(position);
        // Not a jump: the caller still advances past the CALL instruction.
        self.load_context(clone)?;
        Ok(())
    }

    /// RET: unload the current context, migrating return values.
    pub(crate) fn execute_ret(&mut self) -> VmResult<()> {
        self.unload_current_context(UnloadReason::Return)?;
        self.jumping = true;
        Ok(())
    }

    fn unload_current_context(&mut self, reason: UnloadReason) -> VmResult<()> {
        let context = self
            .invocation_stack
            .pop()
            .ok_or_else(|| VmError::invalid_operation("no execution context"))?;

        let target = match self.invocation_stack.last() {
            Some(parent) => parent.evaluation_stack.clone(),
            None => self.result_stack.clone(),
        };
        if !context.evaluation_stack.shares_with(&target) {
            match reason {
                UnloadReason::Return => {
                    if context.rvcount >= 0
                        && context.evaluation_stack.len() != context.rvcount as usize
                    {
                        return Err(VmError::invalid_operation(format!(
                            "expected {} return values, stack holds {}",
                            context.rvcount,
                            context.evaluation_stack.len()
                        )));
                    }
                    context.evaluation_stack.move_to(&target, None)?;
                }
                UnloadReason::Exception => {
                    // An unwound frame returns nothing; release its items.
                    context.evaluation_stack.clear();
                }
            }
        }

        context.clear_slot_references();
        if let Some(statics) = &context.static_fields {
            let still_shared = self
                .invocation_stack
                .iter()
                .any(|other| other.static_fields.as_ref().is_some_and(|s| s.shares_with(statics)));
            if !still_shared {
                statics.clear_references();
            }
        }

        self.unloaded_contexts.push(UnloadedContext { context, reason });
        if self.invocation_stack.is_empty() {
            self.state = VMState::Halt;
        }
        Ok(())
    }

    /// THROW and rethrow: find a handler or fault.
    pub(crate) fn execute_throw(&mut self, exception: StackItem) -> VmResult<()> {
        self.uncaught_exception = Some(exception);
        self.handle_exception()
    }

    /// Walks the invocation stack towards the innermost viable handler.
    pub(crate) fn handle_exception(&mut self) -> VmResult<()> {
        enum Plan {
            Catch { pointer: usize, stack_depth: usize },
            Finally { pointer: usize },
        }

        let mut frames_to_pop = 0usize;
        let mut plan: Option<Plan> = None;

        for context in self.invocation_stack.iter_mut().rev() {
            // Discard entries that cannot handle anything anymore.
            while let Some(entry) = context.try_stack.last() {
                let skip = entry.state == ExceptionHandlingState::Finally
                    || (entry.state == ExceptionHandlingState::Catch && !entry.has_finally());
                if skip {
                    context.try_stack.pop();
                } else {
                    break;
                }
            }
            if let Some(entry) = context.try_stack.last_mut() {
                if entry.state == ExceptionHandlingState::Try && entry.has_catch() {
                    entry.state = ExceptionHandlingState::Catch;
                    plan = Some(Plan::Catch {
                        pointer: entry.catch_pointer as usize,
                        stack_depth: entry.stack_depth,
                    });
                } else {
                    entry.state = ExceptionHandlingState::Finally;
                    plan = Some(Plan::Finally {
                        pointer: entry.finally_pointer as usize,
                    });
                }
                break;
            }
            frames_to_pop += 1;
        }

        let Some(plan) = plan else {
            // Nothing catches: fault, keeping the exception for inspection.
            return Err(VmError::Throw);
        };

        for _ in 0..frames_to_pop {
            self.unload_current_context(UnloadReason::Exception)?;
        }

        match plan {
            Plan::Catch {
                pointer,
                stack_depth,
            } => {
                let exception = self
                    .uncaught_exception
                    .take()
                    .ok_or_else(|| VmError::invalid_operation("no exception in flight"))?;
                let stack = self.stack()?.clone();
                stack.truncate(stack_depth)?;
                stack.push(exception);
                self.execute_jump(pointer)?;
            }
            Plan::Finally { pointer } => {
                self.execute_jump(pointer)?;
            }
        }
        Ok(())
    }

    /// Takes the in-flight exception (ENDFINALLY rethrow path).
    pub(crate) fn has_uncaught_exception(&self) -> bool {
        self.uncaught_exception.is_some()
    }
}

impl Drop for ExecutionEngine {
    fn drop(&mut self) {
        // Break any remaining reference cycles; the arena dies with the engine.
        self.reference_counter.teardown();
    }
}
