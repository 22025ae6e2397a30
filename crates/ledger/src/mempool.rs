//! The memory pool: verified-but-unconfirmed transactions.

use crate::VerifyResult;
use neo3_core::{Block, Transaction, TransactionAttribute, UInt256};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// Ranking key: high-priority lane first, then fee density, then arrival
/// order. `BTreeMap` iteration yields the lowest-ranked entry first, which
/// is the eviction victim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct PoolKey {
    high_priority: bool,
    fee_per_byte: i64,
    /// Decreasing with arrival order so earlier transactions rank higher
    /// at equal fees.
    reverse_sequence: i64,
}

struct PoolInner {
    entries: BTreeMap<PoolKey, Arc<Transaction>>,
    by_hash: HashMap<UInt256, PoolKey>,
    sequence: i64,
}

/// A bounded, fee-ordered collection of pending transactions.
///
/// All operations take the single internal mutex briefly; verification
/// happens outside, in the blockchain, before insertion.
pub struct MemoryPool {
    inner: Mutex<PoolInner>,
    capacity: usize,
}

impl MemoryPool {
    /// Creates a pool bounded to `capacity` transactions.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(PoolInner {
                entries: BTreeMap::new(),
                by_hash: HashMap::new(),
                sequence: 0,
            }),
            capacity,
        }
    }

    /// Number of pooled transactions.
    pub fn len(&self) -> usize {
        self.inner.lock().by_hash.len()
    }

    /// Whether the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the pool knows this hash.
    pub fn contains(&self, hash: &UInt256) -> bool {
        self.inner.lock().by_hash.contains_key(hash)
    }

    /// Fetches a pooled transaction.
    pub fn get(&self, hash: &UInt256) -> Option<Arc<Transaction>> {
        let inner = self.inner.lock();
        let key = inner.by_hash.get(hash)?;
        inner.entries.get(key).cloned()
    }

    /// Admits an already-verified transaction, evicting the lowest-ranked
    /// entry when full.
    pub fn try_add(&self, transaction: Transaction) -> VerifyResult {
        let hash = transaction.hash();
        let mut inner = self.inner.lock();
        if inner.by_hash.contains_key(&hash) {
            return VerifyResult::AlreadyExists;
        }

        let high_priority = transaction
            .attributes
            .iter()
            .any(|a| matches!(a, TransactionAttribute::HighPriority));
        inner.sequence += 1;
        let key = PoolKey {
            high_priority,
            fee_per_byte: transaction.fee_per_byte(),
            reverse_sequence: -inner.sequence,
        };

        if inner.by_hash.len() >= self.capacity {
            // The victim is the lowest-ranked entry; refuse the newcomer if
            // it ranks below everything already pooled.
            let Some((&lowest_key, lowest)) = inner.entries.iter().next() else {
                return VerifyResult::OutOfMemory;
            };
            if key < lowest_key {
                return VerifyResult::OutOfMemory;
            }
            let lowest_hash = lowest.hash();
            inner.entries.remove(&lowest_key);
            inner.by_hash.remove(&lowest_hash);
            debug!(evicted = %lowest_hash, "mempool full, lowest-fee transaction evicted");
        }

        inner.by_hash.insert(hash, key);
        inner.entries.insert(key, Arc::new(transaction));
        VerifyResult::Succeed
    }

    /// Removes a transaction by hash.
    pub fn remove(&self, hash: &UInt256) -> Option<Arc<Transaction>> {
        let mut inner = self.inner.lock();
        let key = inner.by_hash.remove(hash)?;
        inner.entries.remove(&key)
    }

    /// The highest-ranked transactions, up to `count`, for block building.
    pub fn take_for_block(&self, count: usize) -> Vec<Arc<Transaction>> {
        let inner = self.inner.lock();
        inner
            .entries
            .values()
            .rev()
            .take(count)
            .cloned()
            .collect()
    }

    /// Evicts everything invalidated by a newly persisted block: included
    /// transactions, expired ones, and those conflicting with the block.
    pub fn on_block_persisted(&self, block: &Block, height: u32) {
        let included: HashSet<UInt256> = block.transactions.iter().map(|tx| tx.hash()).collect();
        let conflicts: HashSet<UInt256> = block
            .transactions
            .iter()
            .flat_map(|tx| tx.attributes.iter())
            .filter_map(|attribute| match attribute {
                TransactionAttribute::Conflicts { hash } => Some(*hash),
                _ => None,
            })
            .collect();

        let mut inner = self.inner.lock();
        let doomed: Vec<(PoolKey, UInt256)> = inner
            .entries
            .iter()
            .filter(|(_, tx)| {
                let hash = tx.hash();
                included.contains(&hash)
                    || conflicts.contains(&hash)
                    || tx.valid_until_block <= height
            })
            .map(|(key, tx)| (*key, tx.hash()))
            .collect();
        for (key, hash) in doomed {
            inner.entries.remove(&key);
            inner.by_hash.remove(&hash);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use neo3_core::{Signer, UInt160, Witness};

    fn transaction(nonce: u32, network_fee: i64) -> Transaction {
        let mut tx = Transaction::default();
        tx.nonce = nonce;
        tx.network_fee = network_fee;
        tx.valid_until_block = 100;
        tx.signers = vec![Signer::called_by_entry(UInt160::from_array([1u8; 20]))];
        tx.witnesses = vec![Witness::empty()];
        tx.script = vec![0x11];
        tx
    }

    #[test]
    fn ordering_prefers_fee_density() {
        let pool = MemoryPool::new(10);
        pool.try_add(transaction(1, 1_000));
        pool.try_add(transaction(2, 9_000));
        let picked = pool.take_for_block(1);
        assert_eq!(picked[0].nonce, 2);
    }

    #[test]
    fn duplicate_hash_rejected() {
        let pool = MemoryPool::new(10);
        assert_eq!(pool.try_add(transaction(1, 0)), VerifyResult::Succeed);
        assert_eq!(pool.try_add(transaction(1, 0)), VerifyResult::AlreadyExists);
    }

    #[test]
    fn capacity_evicts_lowest_ranked() {
        let pool = MemoryPool::new(2);
        pool.try_add(transaction(1, 1_000));
        pool.try_add(transaction(2, 2_000));
        assert_eq!(pool.try_add(transaction(3, 3_000)), VerifyResult::Succeed);
        assert_eq!(pool.len(), 2);
        // The cheapest transaction went away.
        assert!(!pool.take_for_block(2).iter().any(|tx| tx.nonce == 1));
    }

    #[test]
    fn low_fee_newcomer_rejected_when_full() {
        let pool = MemoryPool::new(2);
        pool.try_add(transaction(1, 5_000));
        pool.try_add(transaction(2, 6_000));
        assert_eq!(pool.try_add(transaction(3, 1)), VerifyResult::OutOfMemory);
    }

    #[test]
    fn high_priority_outranks_fees() {
        let pool = MemoryPool::new(10);
        pool.try_add(transaction(1, 1_000_000));
        let mut priority = transaction(2, 0);
        priority.attributes = vec![TransactionAttribute::HighPriority];
        pool.try_add(priority);
        assert_eq!(pool.take_for_block(1)[0].nonce, 2);
    }

    #[test]
    fn block_persistence_purges_included_and_expired() {
        let pool = MemoryPool::new(10);
        let included = transaction(1, 10);
        let expiring = {
            let mut tx = transaction(2, 10);
            tx.valid_until_block = 5;
            tx
        };
        let surviving = transaction(3, 10);
        pool.try_add(included.clone());
        pool.try_add(expiring);
        pool.try_add(surviving);

        let mut header = neo3_core::Header::default();
        header.index = 5;
        let block = Block {
            header,
            transactions: vec![included],
        };
        pool.on_block_persisted(&block, 5);

        assert_eq!(pool.len(), 1);
        assert_eq!(pool.take_for_block(1)[0].nonce, 3);
    }
}
