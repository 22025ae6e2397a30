//! The block processor: validate, execute and commit blocks.

use crate::genesis::create_genesis_block;
use crate::mempool::MemoryPool;
use crate::{LedgerError, LedgerResult, VerifyResult};
use neo3_config::ProtocolSettings;
use neo3_core::{Block, Transaction, TransactionAttribute, UInt160, UInt256, Witness};
use neo3_persistence::{DataCache, Store};
use neo3_smart_contract::native;
use neo3_smart_contract::native::role_management::Role;
use neo3_smart_contract::{
    account, ApplicationEngine, NotifyEventArgs, ScriptContainer, TriggerType,
};
use neo3_vm::{CallFlags, StackItem, VMState};
use parking_lot::RwLock;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, error, info, warn};

/// Gas budget of one witness-verification run, in datoshi (0.5 GAS).
const MAX_VERIFICATION_GAS: i64 = 50_000_000;

/// The per-height processing states within `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainState {
    /// Bootstrapping storage and genesis.
    Initializing,
    /// Waiting for the block at the next height.
    Receiving,
    /// Validating a candidate block.
    Validating,
    /// Applying a validated block; failure here is fatal.
    Applying,
}

/// The outcome of one engine run during block persistence.
#[derive(Debug, Clone)]
pub struct ApplicationExecuted {
    /// The transaction, if this was an Application run.
    pub transaction_hash: Option<UInt256>,
    /// The trigger that ran.
    pub trigger: TriggerType,
    /// Terminal VM state.
    pub vm_state: VMState,
    /// Gas consumed, in datoshi.
    pub gas_consumed: i64,
    /// Fault description, when the run faulted.
    pub exception: Option<String>,
    /// The result stack at HALT.
    pub stack: Vec<StackItem>,
    /// Notifications emitted (empty when faulted).
    pub notifications: Vec<NotifyEventArgs>,
}

struct HeadInfo {
    index: u32,
    hash: UInt256,
    timestamp: u64,
}

/// The chain: single writer over the store, many snapshot readers.
pub struct Blockchain {
    store: Arc<dyn Store>,
    settings: Arc<ProtocolSettings>,
    head: RwLock<HeadInfo>,
    mempool: MemoryPool,
    state: RwLock<ChainState>,
}

impl Blockchain {
    /// Opens the chain over a store, creating and persisting the genesis
    /// block when the store is empty.
    pub fn new(store: Arc<dyn Store>, settings: Arc<ProtocolSettings>) -> LedgerResult<Self> {
        let mempool = MemoryPool::new(settings.memory_pool_max_transactions);
        let chain = Self {
            store,
            settings,
            head: RwLock::new(HeadInfo {
                index: 0,
                hash: UInt256::zero(),
                timestamp: 0,
            }),
            mempool,
            state: RwLock::new(ChainState::Initializing),
        };

        let snapshot = chain.snapshot();
        match native::ledger::current_index(&snapshot) {
            Some(index) => {
                let hash = native::ledger::current_hash(&snapshot)
                    .ok_or_else(|| LedgerError::fatal("head hash missing"))?;
                let trimmed = native::ledger::get_trimmed_block(&snapshot, &hash)
                    .ok_or_else(|| LedgerError::fatal("head block missing"))?;
                *chain.head.write() = HeadInfo {
                    index,
                    hash,
                    timestamp: trimmed.header.timestamp,
                };
                info!(height = index, "chain resumed");
            }
            None => {
                let genesis = create_genesis_block(&chain.settings)?;
                chain.apply_block_internal(&genesis, true)?;
                info!(hash = %genesis.hash(), "genesis block persisted");
            }
        }
        *chain.state.write() = ChainState::Receiving;
        Ok(chain)
    }

    /// The protocol settings.
    pub fn settings(&self) -> &ProtocolSettings {
        &self.settings
    }

    /// Current height.
    pub fn height(&self) -> u32 {
        self.head.read().index
    }

    /// Current head hash.
    pub fn current_hash(&self) -> UInt256 {
        self.head.read().hash
    }

    /// Current processing state.
    pub fn state(&self) -> ChainState {
        *self.state.read()
    }

    /// The mempool.
    pub fn mempool(&self) -> &MemoryPool {
        &self.mempool
    }

    /// A fresh read snapshot over the store.
    pub fn snapshot(&self) -> DataCache {
        DataCache::new(Arc::clone(&self.store))
    }

    // ---- ingestion ----

    /// Validates and applies an externally-agreed block. Validation failures
    /// reject the candidate; apply failures are fatal.
    pub fn process_block(&self, block: &Block) -> LedgerResult<Vec<ApplicationExecuted>> {
        *self.state.write() = ChainState::Validating;
        if let Err(rejection) = self.verify_block(block) {
            *self.state.write() = ChainState::Receiving;
            warn!(index = block.index(), reason = ?rejection, "block rejected");
            return Err(LedgerError::Validation(rejection));
        }

        *self.state.write() = ChainState::Applying;
        let receipts = self.apply_block_internal(block, false).map_err(|fatal| {
            error!(index = block.index(), error = %fatal, "block apply failed");
            fatal
        })?;
        *self.state.write() = ChainState::Receiving;

        self.mempool.on_block_persisted(block, self.height());
        info!(
            index = block.index(),
            transactions = block.transactions.len(),
            "block applied"
        );
        Ok(receipts)
    }

    /// Validates a transaction against the current head and, on success,
    /// admits it to the mempool.
    pub fn add_transaction(&self, transaction: Transaction) -> VerifyResult {
        let snapshot = self.snapshot();
        let height = self.height();
        let result = self.verify_transaction(&transaction, &snapshot, height);
        if result != VerifyResult::Succeed {
            return result;
        }
        self.mempool.try_add(transaction)
    }

    // ---- validation ----

    /// Block validation per the ingestion rules; no state is changed.
    pub fn verify_block(&self, block: &Block) -> Result<(), VerifyResult> {
        let head = self.head.read();

        // Structure: size, counts, merkle root, duplicate transactions.
        if block.check_structure().is_err() {
            return Err(VerifyResult::Invalid);
        }
        if block.header.version != 0 {
            return Err(VerifyResult::Invalid);
        }
        if block.index() != head.index + 1 {
            return Err(VerifyResult::ChainMismatch);
        }
        if block.header.prev_hash != head.hash {
            return Err(VerifyResult::ChainMismatch);
        }
        if block.transactions.len() > self.settings.max_transactions_per_block as usize {
            return Err(VerifyResult::Invalid);
        }

        // Timestamps move strictly forward, bounded above by wall clock
        // drift.
        if block.header.timestamp <= head.timestamp {
            return Err(VerifyResult::InvalidTimestamp);
        }
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        if block.header.timestamp > now_ms + self.settings.max_timestamp_drift_ms() {
            return Err(VerifyResult::InvalidTimestamp);
        }

        let snapshot = self.snapshot();

        // The new block commits to the validators elected under the current
        // head state.
        let expected_consensus =
            native::neo_token::next_consensus_address(&snapshot, self.settings.validators_count)
                .map_err(|_| VerifyResult::Invalid)?;
        if block.header.next_consensus != expected_consensus {
            return Err(VerifyResult::ChainMismatch);
        }

        // The witness must belong to the signer set the previous block fixed.
        let signer_hash = native::ledger::get_trimmed_block(&snapshot, &head.hash)
            .map(|trimmed| trimmed.header.next_consensus)
            .unwrap_or(expected_consensus);
        if block.header.witness.script_hash() != signer_hash {
            return Err(VerifyResult::InvalidSignature);
        }
        if !self.verify_block_witness(block, &snapshot) {
            return Err(VerifyResult::InvalidSignature);
        }

        for transaction in &block.transactions {
            let result = self.verify_transaction(transaction, &snapshot, head.index);
            if result != VerifyResult::Succeed {
                return Err(result);
            }
        }
        Ok(())
    }

    fn verify_block_witness(&self, block: &Block, snapshot: &DataCache) -> bool {
        self.verify_witness(
            ScriptContainer::Block(Rc::new(block.clone())),
            &block.header.witness,
            block.header.witness.script_hash(),
            snapshot,
        )
        .is_some()
    }

    /// Runs one witness under the Verification trigger. Returns the gas it
    /// consumed when it verifies, `None` otherwise.
    fn verify_witness(
        &self,
        container: ScriptContainer,
        witness: &Witness,
        expected_hash: UInt160,
        snapshot: &DataCache,
    ) -> Option<i64> {
        if witness.verification_script.is_empty() {
            return None;
        }
        if witness.script_hash() != expected_hash {
            return None;
        }
        // Invocation scripts may only push data.
        if !script_is_push_only(&witness.invocation_script) {
            return None;
        }

        let mut engine = ApplicationEngine::new(
            TriggerType::Verification,
            Some(container),
            snapshot.clone_cache(),
            Arc::clone(&self.settings),
            MAX_VERIFICATION_GAS,
        );
        // Verification is read-only and silent: no writes, no calls out, no
        // notifications.
        if engine
            .load_entry_script(witness.verification_script.clone(), CallFlags::READ_STATES)
            .is_err()
        {
            return None;
        }
        if !witness.invocation_script.is_empty()
            && engine
                .load_entry_script(witness.invocation_script.clone(), CallFlags::READ_STATES)
                .is_err()
        {
            return None;
        }

        if engine.execute() != VMState::Halt {
            debug!(reason = ?engine.fault_reason(), "witness verification faulted");
            return None;
        }
        let max_integer_size = engine.vm().limits().max_integer_size;
        let truthy = engine
            .vm()
            .result_stack()
            .peek(0)
            .and_then(|item| item.get_boolean(max_integer_size))
            .unwrap_or(false);
        if engine.vm().result_stack().len() != 1 || !truthy {
            return None;
        }
        Some(engine.gas_consumed())
    }

    /// Transaction validation against a snapshot at height `height`.
    pub fn verify_transaction(
        &self,
        transaction: &Transaction,
        snapshot: &DataCache,
        height: u32,
    ) -> VerifyResult {
        if transaction.check_structure().is_err() {
            return VerifyResult::Invalid;
        }

        // Expiry window.
        let vub = transaction.valid_until_block;
        if vub <= height {
            return VerifyResult::Expired;
        }
        if vub > height + self.settings.max_valid_until_block_increment {
            return VerifyResult::Expired;
        }

        // Known or conflicting transactions.
        if native::ledger::contains_transaction(snapshot, &transaction.hash()) {
            return VerifyResult::AlreadyExists;
        }

        // Attribute rules.
        for attribute in &transaction.attributes {
            match attribute {
                TransactionAttribute::HighPriority => {
                    let Ok(committee) = native::neo_token::committee_address(snapshot) else {
                        return VerifyResult::InvalidAttribute;
                    };
                    if !transaction
                        .signers
                        .iter()
                        .any(|signer| signer.account == committee)
                    {
                        return VerifyResult::InvalidAttribute;
                    }
                }
                TransactionAttribute::OracleResponse { .. } => {
                    if !self.verify_oracle_response_signer(transaction, snapshot, height) {
                        return VerifyResult::InvalidAttribute;
                    }
                }
                TransactionAttribute::NotValidBefore { height: nvb } => {
                    if *nvb > height {
                        return VerifyResult::InvalidAttribute;
                    }
                }
                TransactionAttribute::Conflicts { hash } => {
                    if native::ledger::contains_transaction(snapshot, hash) {
                        return VerifyResult::HasConflicts;
                    }
                }
            }
        }

        // Policy: the fee payer must not be blocked.
        if native::policy::is_blocked(snapshot, &transaction.sender()) {
            return VerifyResult::PolicyFail;
        }

        // Fee floor: size fee plus attribute fees plus verification costs.
        let size_fee = native::policy::get_fee_per_byte(snapshot) * transaction.size() as i64;
        let attribute_fee: i64 = transaction
            .attributes
            .iter()
            .map(|attribute| {
                native::policy::get_attribute_fee(snapshot, attribute.attribute_type())
            })
            .sum();
        let mut remaining_fee = transaction.network_fee - size_fee - attribute_fee;
        if remaining_fee < 0 {
            return VerifyResult::InsufficientFunds;
        }

        // Witness verification, charged against the network fee budget.
        for (signer, witness) in transaction.signers.iter().zip(&transaction.witnesses) {
            let container = ScriptContainer::Transaction(Rc::new(transaction.clone()));
            let Some(gas_used) =
                self.verify_witness(container, witness, signer.account, snapshot)
            else {
                return VerifyResult::InvalidSignature;
            };
            remaining_fee -= gas_used;
            if remaining_fee < 0 {
                return VerifyResult::InsufficientFunds;
            }
        }

        // The sender must hold the full fee amount.
        let balance = native::gas_token::balance_of(snapshot, &transaction.sender());
        let required = num_bigint::BigInt::from(transaction.system_fee)
            + num_bigint::BigInt::from(transaction.network_fee);
        if balance < required {
            return VerifyResult::InsufficientFunds;
        }

        VerifyResult::Succeed
    }

    fn verify_oracle_response_signer(
        &self,
        transaction: &Transaction,
        snapshot: &DataCache,
        height: u32,
    ) -> bool {
        let Ok(oracles) =
            native::role_management::get_designated_by_role(snapshot, Role::Oracle, height)
        else {
            return false;
        };
        if oracles.is_empty() {
            return false;
        }
        let m = oracles.len() - (oracles.len() - 1) / 3;
        let Ok(oracle_account) = account::create_multisig_contract_hash(m, &oracles) else {
            return false;
        };
        transaction
            .signers
            .iter()
            .any(|signer| signer.account == oracle_account)
    }

    // ---- application ----

    /// Executes a validated block over a single root snapshot and commits it
    /// atomically. Any failure other than an individual transaction fault is
    /// returned as fatal.
    fn apply_block_internal(
        &self,
        block: &Block,
        genesis: bool,
    ) -> LedgerResult<Vec<ApplicationExecuted>> {
        let block_rc = Rc::new(block.clone());
        let mut root = DataCache::new(Arc::clone(&self.store));
        let mut receipts = Vec::with_capacity(block.transactions.len() + 2);

        // OnPersist: natives roll committee state and burn fees.
        {
            let mut engine = ApplicationEngine::new(
                TriggerType::OnPersist,
                Some(ScriptContainer::Block(Rc::clone(&block_rc))),
                root.clone_cache(),
                Arc::clone(&self.settings),
                -1,
            );
            if genesis {
                engine
                    .initialize_natives()
                    .map_err(LedgerError::fatal)?;
            }
            engine
                .run_native_persist_hooks()
                .map_err(LedgerError::fatal)?;
            receipts.push(Self::system_receipt(&engine, TriggerType::OnPersist));
            engine
                .into_snapshot()
                .commit_into(&mut root)
                .map_err(LedgerError::fatal)?;
        }

        // Transactions, in block order; a fault reverts the transaction's
        // writes but never the block.
        let mut transaction_states = Vec::with_capacity(block.transactions.len());
        for transaction in &block.transactions {
            let mut engine = ApplicationEngine::new(
                TriggerType::Application,
                Some(ScriptContainer::Transaction(Rc::new(transaction.clone()))),
                root.clone_cache(),
                Arc::clone(&self.settings),
                transaction.system_fee,
            );
            engine.set_persisting_block(Rc::clone(&block_rc));
            let vm_state = match engine.load_entry_script(transaction.script.clone(), CallFlags::ALL)
            {
                Ok(()) => engine.execute(),
                Err(_) => VMState::Fault,
            };

            let receipt = ApplicationExecuted {
                transaction_hash: Some(transaction.hash()),
                trigger: TriggerType::Application,
                vm_state,
                gas_consumed: engine.gas_consumed(),
                exception: engine.fault_reason().map(|reason| reason.to_string()),
                stack: engine.vm().result_stack().to_vec(),
                notifications: if vm_state == VMState::Halt {
                    engine.notifications().to_vec()
                } else {
                    Vec::new()
                },
            };
            if vm_state == VMState::Halt {
                engine
                    .into_snapshot()
                    .commit_into(&mut root)
                    .map_err(LedgerError::fatal)?;
            } else {
                debug!(tx = %transaction.hash(), reason = ?receipt.exception, "transaction faulted");
            }
            transaction_states.push((transaction.hash(), vm_state));
            receipts.push(receipt);
        }

        // PostPersist: block rewards become visible to the next block.
        {
            let mut engine = ApplicationEngine::new(
                TriggerType::PostPersist,
                Some(ScriptContainer::Block(Rc::clone(&block_rc))),
                root.clone_cache(),
                Arc::clone(&self.settings),
                -1,
            );
            engine
                .run_native_persist_hooks()
                .map_err(LedgerError::fatal)?;
            receipts.push(Self::system_receipt(&engine, TriggerType::PostPersist));
            engine
                .into_snapshot()
                .commit_into(&mut root)
                .map_err(LedgerError::fatal)?;
        }

        // Ledger records, head pointer, then the one atomic store write.
        native::ledger::put_block(&mut root, block, &transaction_states)
            .map_err(LedgerError::fatal)?;
        root.commit_to_store().map_err(LedgerError::fatal)?;

        *self.head.write() = HeadInfo {
            index: block.index(),
            hash: block.hash(),
            timestamp: block.header.timestamp,
        };
        Ok(receipts)
    }

    fn system_receipt(engine: &ApplicationEngine, trigger: TriggerType) -> ApplicationExecuted {
        ApplicationExecuted {
            transaction_hash: None,
            trigger,
            vm_state: VMState::Halt,
            gas_consumed: engine.gas_consumed(),
            exception: None,
            stack: Vec::new(),
            notifications: engine.notifications().to_vec(),
        }
    }
}

/// Whether a script consists only of push instructions.
fn script_is_push_only(script: &[u8]) -> bool {
    let mut position = 0;
    while position < script.len() {
        match neo3_vm::Instruction::decode(script, position) {
            Ok(instruction) => {
                if instruction.opcode.as_byte() > neo3_vm::OpCode::PUSH16.as_byte() {
                    return false;
                }
                position += instruction.size;
            }
            Err(_) => return false,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_only_scripts() {
        assert!(script_is_push_only(&[0x0c, 0x02, 0xaa, 0xbb])); // PUSHDATA1
        assert!(script_is_push_only(&[0x11, 0x12])); // PUSH1 PUSH2
        assert!(!script_is_push_only(&[0x41, 0, 0, 0, 0])); // SYSCALL
        assert!(!script_is_push_only(&[0x0c, 0x05])); // truncated
    }
}
