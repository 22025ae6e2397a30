//! The LedgerContract native: read access to blocks and transactions.
//!
//! The block processor writes these rows while persisting; scripts only ever
//! read them.

use super::{NativeContract, NativeMethod};
use crate::application_engine::ApplicationEngine;
use crate::{ContractError, ContractResult};
use neo3_core::{Block, Header, Transaction, UInt256};
use neo3_io::{helper, BinaryWriter, IoResult, MemoryReader, Serializable, SerializableExt};
use neo3_persistence::{DataCache, StorageItem, StorageKey};
use neo3_vm::{StackItem, VMState};
use std::cell::RefCell;
use std::rc::Rc;

/// Reserved storage id.
pub const ID: i32 = -4;

const PREFIX_BLOCK: u8 = 5;
const PREFIX_BLOCK_HASH: u8 = 9;
const PREFIX_TRANSACTION: u8 = 11;
const PREFIX_CURRENT_BLOCK: u8 = 12;

/// A block stored without full transactions: header plus transaction ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrimmedBlock {
    /// The block header.
    pub header: Header,
    /// Hashes of the block's transactions, in order.
    pub hashes: Vec<UInt256>,
}

impl Serializable for TrimmedBlock {
    fn size(&self) -> usize {
        self.header.size() + helper::get_array_size(&self.hashes)
    }

    fn serialize(&self, writer: &mut BinaryWriter) {
        self.header.serialize(writer);
        writer.write_serializable_list(&self.hashes);
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        let header = Header::deserialize(reader)?;
        let hashes = reader
            .read_serializable_list::<UInt256>(neo3_config::MAX_TRANSACTIONS_PER_BLOCK as usize)?;
        Ok(Self { header, hashes })
    }
}

/// A transaction together with its execution outcome.
#[derive(Debug, Clone)]
pub struct TransactionState {
    /// Height of the including block.
    pub block_index: u32,
    /// Terminal VM state of the Application execution.
    pub vm_state: VMState,
    /// The transaction.
    pub transaction: Transaction,
}

impl Serializable for TransactionState {
    fn size(&self) -> usize {
        4 + 1 + self.transaction.size()
    }

    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_u32(self.block_index);
        let state_byte = match self.vm_state {
            VMState::Halt => 1u8,
            VMState::Fault => 2,
            _ => 0,
        };
        writer.write_byte(state_byte);
        self.transaction.serialize(writer);
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        let block_index = reader.read_u32()?;
        let vm_state = match reader.read_byte()? {
            1 => VMState::Halt,
            2 => VMState::Fault,
            _ => VMState::Break,
        };
        let transaction = Transaction::deserialize(reader)?;
        Ok(Self {
            block_index,
            vm_state,
            transaction,
        })
    }
}

// ---- write-side helpers for the block processor ----

fn block_hash_key(index: u32) -> StorageKey {
    StorageKey::from_prefix(ID, PREFIX_BLOCK_HASH).with_u32_be(index)
}

fn block_key(hash: &UInt256) -> StorageKey {
    StorageKey::from_prefix(ID, PREFIX_BLOCK).with_bytes(hash.as_bytes())
}

fn transaction_key(hash: &UInt256) -> StorageKey {
    StorageKey::from_prefix(ID, PREFIX_TRANSACTION).with_bytes(hash.as_bytes())
}

/// Records a block and its transaction states; called during persist.
pub fn put_block(
    snapshot: &mut DataCache,
    block: &Block,
    transaction_states: &[(UInt256, VMState)],
) -> ContractResult<()> {
    let trimmed = TrimmedBlock {
        header: block.header.clone(),
        hashes: block.transactions.iter().map(|tx| tx.hash()).collect(),
    };
    snapshot.put(block_hash_key(block.index()), StorageItem::new(block.hash().to_vec()))?;
    snapshot.put(block_key(&block.hash()), StorageItem::new(trimmed.to_array()))?;

    for (tx, (hash, vm_state)) in block.transactions.iter().zip(transaction_states) {
        debug_assert_eq!(tx.hash(), *hash);
        let state = TransactionState {
            block_index: block.index(),
            vm_state: *vm_state,
            transaction: tx.clone(),
        };
        snapshot.put(transaction_key(hash), StorageItem::new(state.to_array()))?;
    }

    let mut current = BinaryWriter::new();
    current.write_serializable(&block.hash());
    current.write_u32(block.index());
    snapshot.put(
        StorageKey::from_prefix(ID, PREFIX_CURRENT_BLOCK),
        StorageItem::new(current.into_bytes()),
    )?;
    Ok(())
}

/// Height of the chain head recorded in storage.
pub fn current_index(snapshot: &DataCache) -> Option<u32> {
    let item = snapshot.try_get(&StorageKey::from_prefix(ID, PREFIX_CURRENT_BLOCK))?;
    let mut reader = MemoryReader::new(item.value());
    let _hash = UInt256::deserialize(&mut reader).ok()?;
    reader.read_u32().ok()
}

/// Hash of the chain head recorded in storage.
pub fn current_hash(snapshot: &DataCache) -> Option<UInt256> {
    let item = snapshot.try_get(&StorageKey::from_prefix(ID, PREFIX_CURRENT_BLOCK))?;
    let mut reader = MemoryReader::new(item.value());
    UInt256::deserialize(&mut reader).ok()
}

/// Hash of the block at a height.
pub fn get_block_hash(snapshot: &DataCache, index: u32) -> Option<UInt256> {
    snapshot
        .try_get(&block_hash_key(index))
        .and_then(|item| UInt256::from_bytes(item.value()).ok())
}

/// The trimmed block with the given hash.
pub fn get_trimmed_block(snapshot: &DataCache, hash: &UInt256) -> Option<TrimmedBlock> {
    snapshot
        .try_get(&block_key(hash))
        .and_then(|item| SerializableExt::from_array(item.value()).ok())
}

/// The stored state of a transaction.
pub fn get_transaction_state(snapshot: &DataCache, hash: &UInt256) -> Option<TransactionState> {
    snapshot
        .try_get(&transaction_key(hash))
        .and_then(|item| SerializableExt::from_array(item.value()).ok())
}

/// Whether a transaction is already on-chain.
pub fn contains_transaction(snapshot: &DataCache, hash: &UInt256) -> bool {
    snapshot.contains(&transaction_key(hash))
}

// ---- script-visible methods ----

/// The LedgerContract native.
pub struct LedgerContract;

static METHODS: &[NativeMethod] = &[
    NativeMethod::safe("currentHash", 0, 1 << 15),
    NativeMethod::safe("currentIndex", 0, 1 << 15),
    NativeMethod::safe("getBlock", 1, 1 << 16),
    NativeMethod::safe("getTransaction", 1, 1 << 15),
    NativeMethod::safe("getTransactionHeight", 1, 1 << 15),
    NativeMethod::safe("getTransactionFromBlock", 2, 1 << 16),
    NativeMethod::safe("getTransactionVMState", 1, 1 << 15),
];

fn resolve_block_hash(engine: &ApplicationEngine, arg: &StackItem) -> ContractResult<Option<UInt256>> {
    let bytes = arg.get_bytes()?;
    Ok(match bytes.len() {
        32 => Some(UInt256::from_bytes(&bytes)?),
        _ => {
            // Anything shorter is a height.
            let index: u32 = arg
                .get_integer(engine.vm().limits().max_integer_size)?
                .try_into()
                .map_err(|_| ContractError::invalid_argument("block index"))?;
            get_block_hash(engine.snapshot(), index)
        }
    })
}

fn header_to_stack_item(trimmed: &TrimmedBlock) -> StackItem {
    let header = &trimmed.header;
    StackItem::Array(Rc::new(RefCell::new(vec![
        StackItem::from_bytes(header.hash().to_vec()),
        StackItem::from_int(header.version as i64),
        StackItem::from_bytes(header.prev_hash.to_vec()),
        StackItem::from_bytes(header.merkle_root.to_vec()),
        StackItem::from_int(header.timestamp as i64),
        StackItem::Integer(header.nonce.into()),
        StackItem::from_int(header.index as i64),
        StackItem::from_int(header.primary_index as i64),
        StackItem::from_bytes(header.next_consensus.to_vec()),
        StackItem::from_int(trimmed.hashes.len() as i64),
    ])))
}

fn transaction_to_stack_item(tx: &Transaction) -> StackItem {
    StackItem::Array(Rc::new(RefCell::new(vec![
        StackItem::from_bytes(tx.hash().to_vec()),
        StackItem::from_int(tx.version as i64),
        StackItem::from_int(tx.nonce as i64),
        StackItem::from_bytes(tx.sender().to_vec()),
        StackItem::from_int(tx.system_fee),
        StackItem::from_int(tx.network_fee),
        StackItem::from_int(tx.valid_until_block as i64),
        StackItem::from_bytes(tx.script.clone()),
    ])))
}

impl NativeContract for LedgerContract {
    fn id(&self) -> i32 {
        ID
    }

    fn name(&self) -> &'static str {
        "LedgerContract"
    }

    fn methods(&self) -> &[NativeMethod] {
        METHODS
    }

    fn invoke(
        &self,
        engine: &mut ApplicationEngine,
        method: &str,
        args: Vec<StackItem>,
    ) -> ContractResult<Option<StackItem>> {
        match method {
            "currentHash" => Ok(Some(match current_hash(engine.snapshot()) {
                Some(hash) => StackItem::from_bytes(hash.to_vec()),
                None => StackItem::Null,
            })),
            "currentIndex" => Ok(Some(match current_index(engine.snapshot()) {
                Some(index) => StackItem::from_int(index as i64),
                None => StackItem::Null,
            })),
            "getBlock" => {
                let hash = resolve_block_hash(engine, super::arg_item(&args, 0)?)?;
                Ok(Some(
                    hash.and_then(|hash| get_trimmed_block(engine.snapshot(), &hash))
                        .map(|trimmed| header_to_stack_item(&trimmed))
                        .unwrap_or(StackItem::Null),
                ))
            }
            "getTransaction" => {
                let hash = UInt256::from_bytes(&super::arg_bytes(&args, 0)?)?;
                Ok(Some(
                    get_transaction_state(engine.snapshot(), &hash)
                        .map(|state| transaction_to_stack_item(&state.transaction))
                        .unwrap_or(StackItem::Null),
                ))
            }
            "getTransactionHeight" => {
                let hash = UInt256::from_bytes(&super::arg_bytes(&args, 0)?)?;
                let height = get_transaction_state(engine.snapshot(), &hash)
                    .map(|state| state.block_index as i64)
                    .unwrap_or(-1);
                Ok(Some(StackItem::from_int(height)))
            }
            "getTransactionFromBlock" => {
                let hash = resolve_block_hash(engine, super::arg_item(&args, 0)?)?;
                let tx_index: usize = super::arg_int(engine, &args, 1)?
                    .try_into()
                    .map_err(|_| ContractError::invalid_argument("transaction index"))?;
                let item = hash
                    .and_then(|hash| get_trimmed_block(engine.snapshot(), &hash))
                    .and_then(|trimmed| trimmed.hashes.get(tx_index).copied())
                    .and_then(|tx_hash| get_transaction_state(engine.snapshot(), &tx_hash))
                    .map(|state| transaction_to_stack_item(&state.transaction))
                    .unwrap_or(StackItem::Null);
                Ok(Some(item))
            }
            "getTransactionVMState" => {
                let hash = UInt256::from_bytes(&super::arg_bytes(&args, 0)?)?;
                let state = get_transaction_state(engine.snapshot(), &hash)
                    .map(|state| match state.vm_state {
                        VMState::Halt => 1i64,
                        VMState::Fault => 2,
                        _ => 0,
                    })
                    .unwrap_or(0);
                Ok(Some(StackItem::from_int(state)))
            }
            other => Err(ContractError::not_found(format!("LedgerContract::{other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use neo3_core::Witness;
    use neo3_persistence::MemoryStore;
    use std::sync::Arc;

    fn sample_block() -> Block {
        let mut header = Header::default();
        header.timestamp = 1;
        header.nonce = 2;
        header.witness = Witness::empty();
        Block {
            header,
            transactions: Vec::new(),
        }
    }

    #[test]
    fn put_block_round_trips_head_pointers() {
        let store = Arc::new(MemoryStore::new());
        let mut snapshot = DataCache::new(store as Arc<dyn neo3_persistence::Store>);
        let block = sample_block();
        put_block(&mut snapshot, &block, &[]).unwrap();

        assert_eq!(current_index(&snapshot), Some(0));
        assert_eq!(current_hash(&snapshot), Some(block.hash()));
        assert_eq!(get_block_hash(&snapshot, 0), Some(block.hash()));
        let trimmed = get_trimmed_block(&snapshot, &block.hash()).unwrap();
        assert_eq!(trimmed.header.hash(), block.hash());
        assert!(trimmed.hashes.is_empty());
    }
}
