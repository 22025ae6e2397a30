//! The application engine: the VM plus gas, state, interop and natives.

use crate::contract_state::ContractState;
use crate::interop;
use crate::native;
use crate::op_code_prices::opcode_price;
use crate::trigger::TriggerType;
use crate::{ContractError, ContractResult};
use neo3_config::ProtocolSettings;
use neo3_core::{
    Block, Signer, Transaction, UInt160, WitnessCondition, WitnessRuleAction, WitnessScope,
};
use neo3_cryptography::hash;
use neo3_persistence::DataCache;
use neo3_vm::{
    CallFlags, ExecutionContext, ExecutionEngine, Instruction, OpCode, Script, StackItem,
    UnloadReason, VMState, VmError,
};
use num_bigint::BigInt;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;
use tracing::debug;

/// Maximum byte length of an event name.
const MAX_EVENT_NAME_SIZE: usize = 32;

/// Maximum byte length of a log message.
const MAX_LOG_MESSAGE_SIZE: usize = 1024;

/// The verifiable object whose processing triggered this execution.
#[derive(Clone)]
pub enum ScriptContainer {
    /// A transaction (Application and Verification triggers).
    Transaction(Rc<Transaction>),
    /// A block (OnPersist and PostPersist triggers).
    Block(Rc<Block>),
}

/// A notification emitted during execution.
#[derive(Debug, Clone)]
pub struct NotifyEventArgs {
    /// The emitting contract.
    pub script_hash: UInt160,
    /// Event name.
    pub event_name: String,
    /// Event payload; frozen by deep copy at emission time.
    pub state: StackItem,
}

/// A log line emitted during execution.
#[derive(Debug, Clone)]
pub struct LogEventArgs {
    /// The emitting contract.
    pub script_hash: UInt160,
    /// Log text.
    pub message: String,
}

/// Host-side state attached to each VM frame.
#[derive(Debug, Clone)]
pub struct ExecutionContextState {
    /// Hash of the executing script.
    pub script_hash: UInt160,
    /// Hash of the frame that called this one; `None` for the entry frame.
    pub calling_script_hash: Option<UInt160>,
    /// Storage id of the executing contract; `None` for raw entry scripts.
    pub contract_id: Option<i32>,
    /// Whether this frame owns a snapshot layer that must be committed or
    /// discarded when it unloads.
    pub owns_snapshot_layer: bool,
    /// Number of buffered notifications when this frame was entered.
    pub notification_mark: usize,
}

type StateHandle = Rc<RefCell<ExecutionContextState>>;

fn state_of(context: &ExecutionContext) -> Option<StateHandle> {
    context
        .app_state
        .clone()
        .and_then(|any| any.downcast::<RefCell<ExecutionContextState>>().ok())
}

/// The execution host: drives the VM with gas metering, dispatches system
/// calls, layers snapshots per contract call and records notifications.
pub struct ApplicationEngine {
    vm: ExecutionEngine,
    trigger: TriggerType,
    container: Option<ScriptContainer>,
    settings: Arc<ProtocolSettings>,
    /// Snapshot layers; index 0 is the layer this engine commits into its
    /// caller's world, the rest belong to in-flight contract calls.
    snapshots: Vec<DataCache>,
    gas_limit: i64,
    gas_consumed: i64,
    exec_fee_factor: i64,
    storage_price: i64,
    notifications: Vec<NotifyEventArgs>,
    logs: Vec<LogEventArgs>,
    invocation_counters: HashMap<UInt160, u32>,
    /// While a native method runs, its (hash, id) sits here so notifications
    /// and storage attribute to the native, not its caller.
    native_frames: Vec<(UInt160, i32)>,
    random_state: [u8; 32],
    /// The block being persisted; set by the block processor so that
    /// `System.Runtime.GetTime` works during transaction execution too.
    persisting_block: Option<Rc<Block>>,
}

impl ApplicationEngine {
    /// Creates an engine over `snapshot`. `gas_limit` is in datoshi; pass a
    /// negative value for the unmetered system triggers.
    pub fn new(
        trigger: TriggerType,
        container: Option<ScriptContainer>,
        snapshot: DataCache,
        settings: Arc<ProtocolSettings>,
        gas_limit: i64,
    ) -> Self {
        let exec_fee_factor = native::policy::get_exec_fee_factor(&snapshot);
        let storage_price = native::policy::get_storage_price(&snapshot);
        let random_state = Self::initial_random_state(settings.network, &container);
        Self {
            vm: ExecutionEngine::new(),
            trigger,
            container,
            settings,
            snapshots: vec![snapshot],
            gas_limit,
            gas_consumed: 0,
            exec_fee_factor,
            storage_price,
            notifications: Vec::new(),
            logs: Vec::new(),
            invocation_counters: HashMap::new(),
            native_frames: Vec::new(),
            random_state,
            persisting_block: None,
        }
    }

    /// Sets the block being persisted (for time queries during Application
    /// trigger execution).
    pub fn set_persisting_block(&mut self, block: Rc<Block>) {
        self.persisting_block = Some(block);
    }

    /// The block being persisted, if the processor provided one.
    pub fn persisting_block(&self) -> Option<&Rc<Block>> {
        match &self.persisting_block {
            Some(block) => Some(block),
            None => match &self.container {
                Some(ScriptContainer::Block(block)) => Some(block),
                _ => None,
            },
        }
    }

    /// Deterministic seed: network magic, then the container identity — the
    /// block nonce for persist triggers, the transaction hash otherwise.
    fn initial_random_state(network: u32, container: &Option<ScriptContainer>) -> [u8; 32] {
        let mut seed = Vec::with_capacity(44);
        seed.extend_from_slice(&network.to_le_bytes());
        match container {
            Some(ScriptContainer::Block(block)) => {
                seed.extend_from_slice(&block.header.nonce.to_le_bytes());
            }
            Some(ScriptContainer::Transaction(tx)) => {
                seed.extend_from_slice(tx.hash().as_bytes());
            }
            None => {}
        }
        hash::sha256(&seed)
    }

    // ---- accessors ----

    /// The trigger this engine runs under.
    pub fn trigger(&self) -> TriggerType {
        self.trigger
    }

    /// The script container, if any.
    pub fn container(&self) -> Option<&ScriptContainer> {
        self.container.as_ref()
    }

    /// The protocol settings.
    pub fn settings(&self) -> &ProtocolSettings {
        &self.settings
    }

    /// Gas consumed so far, in datoshi.
    pub fn gas_consumed(&self) -> i64 {
        self.gas_consumed
    }

    /// Remaining gas, or -1 when unmetered.
    pub fn gas_left(&self) -> i64 {
        if self.gas_limit < 0 {
            -1
        } else {
            self.gas_limit - self.gas_consumed
        }
    }

    /// The storage price per byte currently in force.
    pub fn storage_price(&self) -> i64 {
        self.storage_price
    }

    /// The VM state.
    pub fn state(&self) -> VMState {
        self.vm.state()
    }

    /// The fault behind a FAULT state.
    pub fn fault_reason(&self) -> Option<&VmError> {
        self.vm.fault_reason()
    }

    /// The wrapped VM (read access for results and stacks).
    pub fn vm(&self) -> &ExecutionEngine {
        &self.vm
    }

    /// The wrapped VM, mutable; used by interop handlers.
    pub fn vm_mut(&mut self) -> &mut ExecutionEngine {
        &mut self.vm
    }

    /// Notifications buffered so far; meaningful to observers only on HALT.
    pub fn notifications(&self) -> &[NotifyEventArgs] {
        &self.notifications
    }

    /// Log lines emitted so far.
    pub fn logs(&self) -> &[LogEventArgs] {
        &self.logs
    }

    /// The current (innermost) snapshot layer.
    pub fn snapshot(&self) -> &DataCache {
        self.snapshots.last().expect("at least the root layer")
    }

    /// The current snapshot layer, mutable.
    pub fn snapshot_mut(&mut self) -> &mut DataCache {
        self.snapshots.last_mut().expect("at least the root layer")
    }

    /// Consumes the engine after HALT, returning the root layer for the
    /// caller to commit.
    pub fn into_snapshot(mut self) -> DataCache {
        debug_assert_eq!(self.snapshots.len(), 1, "unbalanced snapshot layers");
        self.snapshots.pop().expect("root layer")
    }

    // ---- script loading ----

    /// Loads the entry script (a transaction script or verification script).
    pub fn load_entry_script(&mut self, script: Vec<u8>, call_flags: CallFlags) -> ContractResult<()> {
        let script_hash = UInt160::from_array(hash::hash160(&script));
        self.load_script_with_state(
            script,
            -1,
            0,
            call_flags,
            ExecutionContextState {
                script_hash,
                calling_script_hash: None,
                contract_id: None,
                owns_snapshot_layer: false,
                notification_mark: 0,
            },
        )
    }

    fn load_script_with_state(
        &mut self,
        script: Vec<u8>,
        rvcount: i32,
        position: usize,
        call_flags: CallFlags,
        state: ExecutionContextState,
    ) -> ContractResult<()> {
        if script.len() > neo3_config::MAX_SCRIPT_LENGTH {
            return Err(ContractError::invalid_argument("script too long"));
        }
        let context = self
            .vm
            .load_script(Rc::new(Script::new(script)), rvcount, position, call_flags)?;
        context.app_state = Some(Rc::new(RefCell::new(state)));
        Ok(())
    }

    // ---- execution ----

    /// Runs to HALT or FAULT, returning the final state.
    pub fn execute(&mut self) -> VMState {
        if self.vm.state() == VMState::Break {
            self.vm.set_state(VMState::None);
        }
        while self.vm.state() == VMState::None {
            if let Err(error) = self.step() {
                let vm_error = Self::to_vm_error(error);
                self.vm.fault(vm_error);
            }
            self.process_unloaded_contexts();
        }
        if self.vm.state() == VMState::Fault {
            debug!(reason = ?self.vm.fault_reason(), "execution faulted");
        }
        self.vm.state()
    }

    fn to_vm_error(error: ContractError) -> VmError {
        match error {
            ContractError::Vm(inner) => inner,
            ContractError::OutOfGas => VmError::OutOfGas,
            other => VmError::InvalidOperation(other.to_string()),
        }
    }

    fn step(&mut self) -> ContractResult<()> {
        let instruction = self.vm.fetch_instruction()?;
        let executing_frame = self.vm.invocation_stack_len().saturating_sub(1);
        self.add_exec_fee(opcode_price(instruction.opcode))?;
        if instruction.opcode == OpCode::SYSCALL {
            self.on_syscall(instruction.operand_u32())?;
        } else if instruction.opcode == OpCode::CALLT {
            self.on_call_token(&instruction)?;
        } else {
            self.vm.execute_instruction(&instruction)?;
        }
        self.vm.post_instruction(&instruction, executing_frame)?;
        Ok(())
    }

    /// Commits or discards the snapshot layers of frames that left the
    /// invocation stack since the last instruction.
    fn process_unloaded_contexts(&mut self) {
        for unloaded in self.vm.drain_unloaded_contexts() {
            // A CALL clone shares its script with the frame it returns to;
            // only real contract-call frames manage snapshot layers.
            let same_script = self
                .vm
                .current_context()
                .is_some_and(|current| Rc::ptr_eq(&current.script, &unloaded.context.script));
            if same_script {
                continue;
            }
            let Some(state) = state_of(&unloaded.context) else {
                continue;
            };
            let state = state.borrow();
            if !state.owns_snapshot_layer {
                continue;
            }
            let child = self
                .snapshots
                .pop()
                .expect("frame owned a layer, so one must exist");
            let committed = unloaded.reason == UnloadReason::Return
                && self.vm.state() != VMState::Fault
                && !self.vm.uncaught_exception().is_some();
            if committed {
                if let Some(parent) = self.snapshots.last_mut() {
                    // The parent layer is never frozen while a child exists.
                    child.commit_into(parent).expect("parent is writable");
                }
            } else {
                // Reverted call: its writes and its notifications vanish.
                drop(child);
                self.notifications.truncate(state.notification_mark);
            }
        }
    }

    // ---- gas ----

    /// Charges a flat fee in datoshi.
    pub fn add_fee(&mut self, datoshi: i64) -> ContractResult<()> {
        self.gas_consumed = self
            .gas_consumed
            .checked_add(datoshi)
            .ok_or(ContractError::OutOfGas)?;
        if self.gas_limit >= 0 && self.gas_consumed > self.gas_limit {
            return Err(ContractError::OutOfGas);
        }
        Ok(())
    }

    /// Charges a base fee scaled by the execution fee factor.
    pub fn add_exec_fee(&mut self, base: i64) -> ContractResult<()> {
        self.add_fee(base.saturating_mul(self.exec_fee_factor))
    }

    // ---- syscalls ----

    fn on_syscall(&mut self, id: u32) -> ContractResult<()> {
        let descriptor =
            interop::lookup(id).ok_or(ContractError::UnknownSyscall(id))?;
        let flags = self
            .vm
            .current_context()
            .map(|context| context.call_flags)
            .unwrap_or(CallFlags::NONE);
        if !flags.contains(descriptor.required_flags) {
            return Err(ContractError::PermissionDenied(format!(
                "{} requires flags 0x{:02x}",
                descriptor.name,
                descriptor.required_flags.bits()
            )));
        }
        self.add_exec_fee(descriptor.price)?;
        (descriptor.handler)(self)
    }

    fn on_call_token(&mut self, instruction: &Instruction) -> ContractResult<()> {
        let token_index = instruction.operand_u16() as usize;
        let contract_id = self
            .current_state()
            .and_then(|state| state.borrow().contract_id)
            .ok_or_else(|| ContractError::invalid_operation("CALLT outside a contract"))?;
        let contract = native::contract_management::get_contract_by_id(self.snapshot(), contract_id)?
            .ok_or_else(|| ContractError::not_found("executing contract"))?;
        let token = contract
            .nef
            .tokens
            .get(token_index)
            .cloned()
            .ok_or_else(|| ContractError::invalid_argument("method token out of range"))?;
        let mut args = Vec::with_capacity(token.parameters_count as usize);
        for _ in 0..token.parameters_count {
            args.push(self.vm.pop()?);
        }
        let flags = CallFlags::from_byte(token.call_flags)
            .ok_or_else(|| ContractError::invalid_argument("token call flags"))?;
        self.call_contract_internal(
            token.hash,
            &token.method,
            flags,
            args,
            token.has_return_value,
        )
    }

    // ---- frame/script-hash queries ----

    fn current_state(&self) -> Option<StateHandle> {
        self.vm.current_context().and_then(state_of)
    }

    /// Hash of the code currently executing (a native while one runs).
    pub fn current_script_hash(&self) -> Option<UInt160> {
        if let Some((hash, _)) = self.native_frames.last() {
            return Some(*hash);
        }
        self.current_state().map(|state| state.borrow().script_hash)
    }

    /// Script hash of the current VM frame, ignoring any in-flight native
    /// dispatch. Natives use this to identify the contract that called them.
    pub fn current_vm_script_hash(&self) -> Option<UInt160> {
        self.current_state().map(|state| state.borrow().script_hash)
    }

    /// Hash of the caller of the current code.
    pub fn calling_script_hash(&self) -> Option<UInt160> {
        if !self.native_frames.is_empty() {
            // The native's caller is the VM frame that invoked it.
            return self.current_state().map(|state| state.borrow().script_hash);
        }
        self.current_state()
            .and_then(|state| state.borrow().calling_script_hash)
    }

    /// Hash of the entry script.
    pub fn entry_script_hash(&self) -> Option<UInt160> {
        self.vm
            .entry_context()
            .and_then(state_of)
            .map(|state| state.borrow().script_hash)
    }

    /// Storage id of the currently executing contract.
    pub fn current_contract_id(&self) -> Option<i32> {
        if let Some((_, id)) = self.native_frames.last() {
            return Some(*id);
        }
        self.current_state().and_then(|state| state.borrow().contract_id)
    }

    /// Enters a native frame explicitly; used when one native acts on
    /// behalf of another (GasToken minting during a NeoToken transfer).
    pub(crate) fn push_native_frame(&mut self, hash: UInt160, id: i32) {
        self.native_frames.push((hash, id));
    }

    /// Leaves the explicit native frame.
    pub(crate) fn pop_native_frame(&mut self) {
        self.native_frames.pop();
    }

    /// Invocation counter of the currently executing contract.
    pub fn invocation_counter(&mut self) -> u32 {
        let hash = self.current_script_hash().unwrap_or_else(UInt160::zero);
        *self.invocation_counters.entry(hash).or_insert(1)
    }

    /// The next deterministic random value.
    pub fn next_random(&mut self) -> BigInt {
        self.random_state = hash::sha256(&self.random_state);
        BigInt::from_bytes_le(num_bigint::Sign::Plus, &self.random_state[..16])
    }

    // ---- notifications and logs ----

    /// Emits a notification from the current contract.
    pub fn notify(&mut self, event_name: String, state: StackItem) -> ContractResult<()> {
        if event_name.len() > MAX_EVENT_NAME_SIZE {
            return Err(ContractError::invalid_argument("event name too long"));
        }
        if self.notifications.len() >= neo3_config::MAX_NOTIFICATION_COUNT {
            return Err(ContractError::invalid_operation("too many notifications"));
        }
        let script_hash = self
            .current_script_hash()
            .ok_or_else(|| ContractError::invalid_operation("no executing script"))?;
        // Freeze the payload: later mutations of shared compounds must not
        // alter what observers see.
        let state = state.deep_copy();
        self.notifications.push(NotifyEventArgs {
            script_hash,
            event_name,
            state,
        });
        Ok(())
    }

    /// Emits a log line from the current contract.
    pub fn log(&mut self, message: String) -> ContractResult<()> {
        if message.len() > MAX_LOG_MESSAGE_SIZE {
            return Err(ContractError::invalid_argument("log message too long"));
        }
        let script_hash = self
            .current_script_hash()
            .ok_or_else(|| ContractError::invalid_operation("no executing script"))?;
        debug!(contract = %script_hash, "{message}");
        self.logs.push(LogEventArgs {
            script_hash,
            message,
        });
        Ok(())
    }

    // ---- witness checking ----

    /// Whether the container authorizes `hash` in the current call context.
    pub fn check_witness(&self, hash: &UInt160) -> ContractResult<bool> {
        // A contract always witnesses itself towards its callees.
        if self.calling_script_hash() == Some(*hash) {
            return Ok(true);
        }
        match &self.container {
            Some(ScriptContainer::Transaction(tx)) => {
                let Some(signer) = tx.signers.iter().find(|signer| signer.account == *hash)
                else {
                    return Ok(false);
                };
                self.check_signer_scope(signer)
            }
            Some(ScriptContainer::Block(block)) => {
                // Persist triggers act under the committee witness.
                Ok(block.header.witness.script_hash() == *hash
                    || block.header.next_consensus == *hash)
            }
            None => Ok(false),
        }
    }

    fn check_signer_scope(&self, signer: &Signer) -> ContractResult<bool> {
        if signer.scopes.has_flag(WitnessScope::GLOBAL) {
            return Ok(true);
        }
        if signer.scopes.has_flag(WitnessScope::CALLED_BY_ENTRY) {
            let calling = self.calling_script_hash();
            if calling.is_none() || calling == self.entry_script_hash() {
                return Ok(true);
            }
        }
        if signer.scopes.has_flag(WitnessScope::CUSTOM_CONTRACTS) {
            if let Some(current) = self.current_script_hash() {
                if signer.allowed_contracts.contains(&current) {
                    return Ok(true);
                }
            }
        }
        if signer.scopes.has_flag(WitnessScope::CUSTOM_GROUPS) {
            if let Some(current) = self.current_script_hash() {
                if let Some(contract) =
                    native::contract_management::get_contract(self.snapshot(), &current)?
                {
                    let in_group = contract.manifest.groups.iter().any(|group| {
                        signer.allowed_groups.contains(&group.public_key)
                    });
                    if in_group {
                        return Ok(true);
                    }
                }
            }
        }
        if signer.scopes.has_flag(WitnessScope::WITNESS_RULES) {
            for rule in &signer.rules {
                if self.evaluate_condition(&rule.condition)? {
                    return Ok(rule.action == WitnessRuleAction::Allow);
                }
            }
        }
        Ok(false)
    }

    fn evaluate_condition(&self, condition: &WitnessCondition) -> ContractResult<bool> {
        Ok(match condition {
            WitnessCondition::Boolean(value) => *value,
            WitnessCondition::Not(inner) => !self.evaluate_condition(inner)?,
            WitnessCondition::And(items) => {
                for item in items {
                    if !self.evaluate_condition(item)? {
                        return Ok(false);
                    }
                }
                true
            }
            WitnessCondition::Or(items) => {
                for item in items {
                    if self.evaluate_condition(item)? {
                        return Ok(true);
                    }
                }
                false
            }
            WitnessCondition::ScriptHash(hash) => self.current_script_hash() == Some(*hash),
            WitnessCondition::Group(group) => {
                if let Some(current) = self.current_script_hash() {
                    match native::contract_management::get_contract(self.snapshot(), &current)? {
                        Some(contract) => contract
                            .manifest
                            .groups
                            .iter()
                            .any(|g| g.public_key == *group),
                        None => false,
                    }
                } else {
                    false
                }
            }
            WitnessCondition::CalledByEntry => {
                let calling = self.calling_script_hash();
                calling.is_none() || calling == self.entry_script_hash()
            }
            WitnessCondition::CalledByContract(hash) => {
                self.calling_script_hash() == Some(*hash)
            }
            WitnessCondition::CalledByGroup(group) => {
                if let Some(calling) = self.calling_script_hash() {
                    match native::contract_management::get_contract(self.snapshot(), &calling)? {
                        Some(contract) => contract
                            .manifest
                            .groups
                            .iter()
                            .any(|g| g.public_key == *group),
                        None => false,
                    }
                } else {
                    false
                }
            }
        })
    }

    // ---- contract calls ----

    /// `System.Contract.Call` and CALLT both land here.
    pub fn call_contract_internal(
        &mut self,
        hash: UInt160,
        method: &str,
        requested_flags: CallFlags,
        args: Vec<StackItem>,
        expects_return: bool,
    ) -> ContractResult<()> {
        if method.starts_with('_') {
            return Err(ContractError::invalid_argument(
                "internal methods cannot be called directly",
            ));
        }
        let current_flags = self
            .vm
            .current_context()
            .map(|context| context.call_flags)
            .unwrap_or(CallFlags::ALL);
        let callee_flags = current_flags.intersect(requested_flags);

        if let Some(native) = native::registry().by_hash(&hash) {
            return self.call_native(native, method, args, expects_return);
        }

        let contract = native::contract_management::get_contract(self.snapshot(), &hash)?
            .ok_or_else(|| ContractError::not_found(format!("contract {hash}")))?;
        let descriptor = contract
            .manifest
            .abi
            .get_method(method, args.len())
            .cloned()
            .ok_or_else(|| ContractError::not_found(format!("{hash}::{method}")))?;

        // Manifest permission: a deployed caller must declare the call.
        if let Some(caller_id) = self.current_contract_id() {
            if let Some(caller) =
                native::contract_management::get_contract_by_id(self.snapshot(), caller_id)?
            {
                if !caller
                    .manifest
                    .permits_call(&contract.hash, &contract.manifest, method)
                {
                    return Err(ContractError::PermissionDenied(format!(
                        "manifest of {} does not permit calling {}::{}",
                        caller.hash, hash, method
                    )));
                }
            }
        }

        let mut flags = callee_flags;
        if descriptor.safe {
            flags = flags.intersect(CallFlags::READ_ONLY);
        }

        let returns_value = descriptor.return_type != "Void";
        if expects_return && !returns_value {
            // The caller expects a value but the method is void: hand it a
            // Null that will sit under the callee's (empty) return.
            self.vm.push(StackItem::Null)?;
        }
        let rvcount = if returns_value { 1 } else { 0 };
        self.load_contract_context(&contract, descriptor.offset as usize, flags, args, rvcount)
    }

    fn load_contract_context(
        &mut self,
        contract: &ContractState,
        position: usize,
        call_flags: CallFlags,
        args: Vec<StackItem>,
        rvcount: i32,
    ) -> ContractResult<()> {
        let calling = self.current_script_hash();
        // Contract frames get their own snapshot layer: a faulting callee
        // rolls back only its own writes.
        let child = self.snapshot().clone_cache();
        self.snapshots.push(child);

        let state = ExecutionContextState {
            script_hash: contract.hash,
            calling_script_hash: calling,
            contract_id: Some(contract.id),
            owns_snapshot_layer: true,
            notification_mark: self.notifications.len(),
        };
        self.load_script_with_state(
            contract.nef.script.clone(),
            rvcount,
            position,
            call_flags,
            state,
        )?;
        *self
            .invocation_counters
            .entry(contract.hash)
            .or_insert(0) += 1;

        // Arguments are pushed in reverse so the first sits on top.
        for arg in args.into_iter().rev() {
            self.vm.push(arg)?;
        }

        // If the contract declares _initialize, it runs before the method.
        if let Some(init) = contract.manifest.abi.get_method("_initialize", 0) {
            self.vm.execute_call(init.offset as usize)?;
        }
        Ok(())
    }

    /// Dispatches a native contract method inline.
    fn call_native(
        &mut self,
        native: std::sync::Arc<dyn native::NativeContract>,
        method: &str,
        args: Vec<StackItem>,
        expects_return: bool,
    ) -> ContractResult<()> {
        let descriptor = native
            .methods()
            .iter()
            .find(|m| m.name == method && m.parameters == args.len())
            .ok_or_else(|| {
                ContractError::not_found(format!("{}::{}({})", native.name(), method, args.len()))
            })?;
        let flags = self
            .vm
            .current_context()
            .map(|context| context.call_flags)
            .unwrap_or(CallFlags::ALL);
        if !flags.contains(descriptor.required_flags) {
            return Err(ContractError::PermissionDenied(format!(
                "{}::{} requires flags 0x{:02x}",
                native.name(),
                method,
                descriptor.required_flags.bits()
            )));
        }
        self.add_exec_fee(descriptor.price)?;

        // Capture the caller's stack: a native may itself load VM frames
        // (_deploy, onNEP17Payment), and the return value belongs to the
        // caller, not to whatever frame is current afterwards.
        let caller_stack = self
            .vm
            .current_context()
            .map(|context| context.evaluation_stack.clone());

        self.native_frames.push((native.hash(), native.id()));
        let result = native.invoke(self, method, args);
        self.native_frames.pop();

        let produced = match result? {
            Some(item) => Some(item),
            // Void methods still owe the caller a value when one is awaited.
            None if expects_return => Some(StackItem::Null),
            None => None,
        };
        if let Some(item) = produced {
            match caller_stack {
                Some(stack) => stack.push(item),
                None => self.vm.push(item)?,
            }
        }
        Ok(())
    }

    /// Calls an underscore-prefixed hook (`_deploy`, `onNEP17Payment`) on a
    /// deployed contract; used by natives only.
    pub(crate) fn call_contract_hook(
        &mut self,
        contract: &ContractState,
        method: &str,
        args: Vec<StackItem>,
    ) -> ContractResult<()> {
        let Some(descriptor) = contract.manifest.abi.get_method(method, args.len()).cloned()
        else {
            return Err(ContractError::not_found(format!(
                "{}::{}",
                contract.hash, method
            )));
        };
        let flags = CallFlags::ALL;
        self.load_contract_context(contract, descriptor.offset as usize, flags, args, 0)
    }

    /// Runs the OnPersist or PostPersist hook of every active native.
    pub fn run_native_persist_hooks(&mut self) -> ContractResult<()> {
        let registry = native::registry();
        for native in registry.all() {
            self.native_frames.push((native.hash(), native.id()));
            let result = match self.trigger {
                TriggerType::OnPersist => native.on_persist(self),
                TriggerType::PostPersist => native.post_persist(self),
                _ => Err(ContractError::invalid_operation(
                    "persist hooks require a system trigger",
                )),
            };
            self.native_frames.pop();
            result?;
        }
        Ok(())
    }

    /// Installs every native's genesis state; called once for block zero.
    pub fn initialize_natives(&mut self) -> ContractResult<()> {
        let registry = native::registry();
        for native in registry.all() {
            self.native_frames.push((native.hash(), native.id()));
            let result = native.initialize(self);
            self.native_frames.pop();
            result?;
        }
        Ok(())
    }
}
