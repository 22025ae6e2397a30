//! The key-value store trait and the in-memory reference backend.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::ops::Bound;

/// Iteration direction over the raw keyspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekDirection {
    /// Ascending lexicographic order.
    Forward,
    /// Descending lexicographic order.
    Backward,
}

/// One entry of an atomic write batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreWriteOp {
    /// Insert or overwrite a key.
    Put(Vec<u8>, Vec<u8>),
    /// Remove a key if present.
    Delete(Vec<u8>),
}

/// The narrow interface the core sees of any storage engine.
///
/// Implementations use interior mutability so a single `Arc<dyn Store>` can
/// serve the one writer and many snapshot readers. `find` must be
/// deterministic: lexicographic over the raw key bytes.
pub trait Store: Send + Sync {
    /// Reads a value.
    fn try_get(&self, key: &[u8]) -> Option<Vec<u8>>;

    /// Whether a key exists.
    fn contains(&self, key: &[u8]) -> bool {
        self.try_get(key).is_some()
    }

    /// Inserts or overwrites a key.
    fn put(&self, key: Vec<u8>, value: Vec<u8>);

    /// Removes a key if present.
    fn delete(&self, key: &[u8]);

    /// All entries whose key starts with `prefix`, ordered by raw key bytes
    /// in the requested direction.
    fn find(&self, prefix: &[u8], direction: SeekDirection) -> Vec<(Vec<u8>, Vec<u8>)>;

    /// Applies a batch atomically: readers observe all of it or none of it.
    fn put_batch(&self, batch: Vec<StoreWriteOp>);
}

/// BTreeMap-backed store, the reference backend for tests and light use.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Store for MemoryStore {
    fn try_get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.entries.read().get(key).cloned()
    }

    fn contains(&self, key: &[u8]) -> bool {
        self.entries.read().contains_key(key)
    }

    fn put(&self, key: Vec<u8>, value: Vec<u8>) {
        self.entries.write().insert(key, value);
    }

    fn delete(&self, key: &[u8]) {
        self.entries.write().remove(key);
    }

    fn find(&self, prefix: &[u8], direction: SeekDirection) -> Vec<(Vec<u8>, Vec<u8>)> {
        let entries = self.entries.read();
        let range = entries.range::<[u8], _>((Bound::Included(prefix), Bound::Unbounded));
        let mut found: Vec<(Vec<u8>, Vec<u8>)> = range
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        if direction == SeekDirection::Backward {
            found.reverse();
        }
        found
    }

    fn put_batch(&self, batch: Vec<StoreWriteOp>) {
        let mut entries = self.entries.write();
        for op in batch {
            match op {
                StoreWriteOp::Put(key, value) => {
                    entries.insert(key, value);
                }
                StoreWriteOp::Delete(key) => {
                    entries.remove(&key);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_put_delete() {
        let store = MemoryStore::new();
        assert_eq!(store.try_get(b"k"), None);
        store.put(b"k".to_vec(), b"v".to_vec());
        assert_eq!(store.try_get(b"k"), Some(b"v".to_vec()));
        store.delete(b"k");
        assert!(!store.contains(b"k"));
    }

    #[test]
    fn find_is_prefix_scoped_and_ordered() {
        let store = MemoryStore::new();
        store.put(vec![1, 2], vec![0]);
        store.put(vec![1, 1], vec![1]);
        store.put(vec![2, 0], vec![2]);
        store.put(vec![1], vec![3]);

        let forward = store.find(&[1], SeekDirection::Forward);
        let keys: Vec<_> = forward.iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(keys, vec![vec![1], vec![1, 1], vec![1, 2]]);

        let backward = store.find(&[1], SeekDirection::Backward);
        let keys: Vec<_> = backward.iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(keys, vec![vec![1, 2], vec![1, 1], vec![1]]);
    }

    #[test]
    fn batch_is_applied_whole() {
        let store = MemoryStore::new();
        store.put(b"stale".to_vec(), b"x".to_vec());
        store.put_batch(vec![
            StoreWriteOp::Put(b"a".to_vec(), b"1".to_vec()),
            StoreWriteOp::Delete(b"stale".to_vec()),
        ]);
        assert_eq!(store.try_get(b"a"), Some(b"1".to_vec()));
        assert!(!store.contains(b"stale"));
    }
}
