//! Layered copy-on-write snapshot over a store.

use crate::{SeekDirection, StorageError, StorageItem, StorageKey, StorageResult, Store, StoreWriteOp};
use neo3_io::SerializableExt;
use std::collections::BTreeMap;
use std::sync::Arc;

/// How a snapshot entry differs from the underlying store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackState {
    /// The key does not exist underneath.
    Added,
    /// The key exists underneath with a different value.
    Changed,
    /// The key exists underneath and is hidden here.
    Deleted,
}

#[derive(Clone)]
struct Trackable {
    item: StorageItem,
    state: TrackState,
}

/// A consistent, mutable view over a store.
///
/// Reads consult the local overlay first and fall through to the store.
/// `clone_cache` layers a child snapshot that observes the parent's state at
/// the moment of creation; the child either folds back into the parent with
/// [`DataCache::commit_into`] or is simply dropped (rollback). The root
/// snapshot of a block writes through to the store once, atomically, with
/// [`DataCache::commit_to_store`] and is frozen afterwards.
pub struct DataCache {
    store: Arc<dyn Store>,
    items: BTreeMap<StorageKey, Trackable>,
    frozen: bool,
}

impl DataCache {
    /// Creates a root snapshot over the store.
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            items: BTreeMap::new(),
            frozen: false,
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Whether this snapshot has been committed to the store.
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Opens a child snapshot observing this snapshot's current state.
    pub fn clone_cache(&self) -> DataCache {
        DataCache {
            store: Arc::clone(&self.store),
            items: self.items.clone(),
            frozen: false,
        }
    }

    /// Reads a value; overlay first, then the store.
    pub fn try_get(&self, key: &StorageKey) -> Option<StorageItem> {
        match self.items.get(key) {
            Some(trackable) => match trackable.state {
                TrackState::Deleted => None,
                _ => Some(trackable.item.clone()),
            },
            None => self.store_get(key),
        }
    }

    /// Whether the key is visible in this snapshot.
    pub fn contains(&self, key: &StorageKey) -> bool {
        match self.items.get(key) {
            Some(trackable) => trackable.state != TrackState::Deleted,
            None => self.store.contains(&key.to_array()),
        }
    }

    /// Inserts a key that must not exist yet.
    pub fn add(&mut self, key: StorageKey, item: StorageItem) -> StorageResult<()> {
        self.check_writable()?;
        if self.contains(&key) {
            return Err(StorageError::KeyAlreadyExists);
        }
        let state = if self.store.contains(&key.to_array()) {
            TrackState::Changed
        } else {
            TrackState::Added
        };
        self.items.insert(key, Trackable { item, state });
        Ok(())
    }

    /// Inserts or overwrites a key.
    pub fn put(&mut self, key: StorageKey, item: StorageItem) -> StorageResult<()> {
        self.check_writable()?;
        let state = if self.store.contains(&key.to_array()) {
            TrackState::Changed
        } else {
            TrackState::Added
        };
        self.items.insert(key, Trackable { item, state });
        Ok(())
    }

    /// Returns a mutable handle to a visible entry, marking it changed.
    pub fn get_and_change(&mut self, key: &StorageKey) -> StorageResult<Option<&mut StorageItem>> {
        self.check_writable()?;
        if let Some(trackable) = self.items.get(key) {
            if trackable.state == TrackState::Deleted {
                return Ok(None);
            }
        } else {
            match self.store_get(key) {
                Some(item) => {
                    self.items.insert(
                        key.clone(),
                        Trackable {
                            item,
                            state: TrackState::Changed,
                        },
                    );
                }
                None => return Ok(None),
            }
        }
        Ok(self.items.get_mut(key).map(|t| &mut t.item))
    }

    /// Returns a mutable handle, inserting `default` when the key is absent.
    pub fn get_or_add(
        &mut self,
        key: &StorageKey,
        default: impl FnOnce() -> StorageItem,
    ) -> StorageResult<&mut StorageItem> {
        self.check_writable()?;
        let present = match self.items.get(key) {
            Some(trackable) => trackable.state != TrackState::Deleted,
            None => {
                if let Some(item) = self.store_get(key) {
                    self.items.insert(
                        key.clone(),
                        Trackable {
                            item,
                            state: TrackState::Changed,
                        },
                    );
                    true
                } else {
                    false
                }
            }
        };
        if !present {
            let state = if self.store.contains(&key.to_array()) {
                TrackState::Changed
            } else {
                TrackState::Added
            };
            self.items.insert(
                key.clone(),
                Trackable {
                    item: default(),
                    state,
                },
            );
        }
        Ok(self
            .items
            .get_mut(key)
            .map(|t| &mut t.item)
            .expect("entry just ensured"))
    }

    /// Hides a key from this snapshot.
    pub fn delete(&mut self, key: &StorageKey) -> StorageResult<()> {
        self.check_writable()?;
        match self.items.get_mut(key) {
            Some(trackable) => {
                if trackable.state == TrackState::Added {
                    self.items.remove(key);
                } else {
                    trackable.state = TrackState::Deleted;
                    trackable.item = StorageItem::default();
                }
            }
            None => {
                if self.store.contains(&key.to_array()) {
                    self.items.insert(
                        key.clone(),
                        Trackable {
                            item: StorageItem::default(),
                            state: TrackState::Deleted,
                        },
                    );
                }
            }
        }
        Ok(())
    }

    /// All visible entries whose raw key starts with `prefix`, as one sorted
    /// stream merging the overlay and the store; deletions are hidden and
    /// overlay values win.
    pub fn find(&self, prefix: &[u8], direction: SeekDirection) -> Vec<(StorageKey, StorageItem)> {
        let mut merged: BTreeMap<StorageKey, Option<StorageItem>> = BTreeMap::new();

        for (raw_key, raw_value) in self.store.find(prefix, SeekDirection::Forward) {
            if let Ok(key) = StorageKey::from_raw(&raw_key) {
                merged.insert(key, Some(StorageItem::new(raw_value)));
            }
        }
        for (key, trackable) in &self.items {
            if !key.to_array().starts_with(prefix) {
                continue;
            }
            match trackable.state {
                TrackState::Deleted => {
                    merged.insert(key.clone(), None);
                }
                _ => {
                    merged.insert(key.clone(), Some(trackable.item.clone()));
                }
            }
        }

        let mut entries: Vec<(StorageKey, StorageItem)> = merged
            .into_iter()
            .filter_map(|(key, item)| item.map(|item| (key, item)))
            .collect();
        if direction == SeekDirection::Backward {
            entries.reverse();
        }
        entries
    }

    /// Folds this child's overlay into the parent it was cloned from.
    pub fn commit_into(self, parent: &mut DataCache) -> StorageResult<()> {
        if parent.frozen {
            return Err(StorageError::SnapshotFrozen);
        }
        parent.items = self.items;
        Ok(())
    }

    /// Writes the overlay to the store as one atomic batch and freezes the
    /// snapshot. Only the root snapshot of a block should do this.
    pub fn commit_to_store(&mut self) -> StorageResult<()> {
        self.check_writable()?;
        let mut batch = Vec::with_capacity(self.items.len());
        for (key, trackable) in &self.items {
            match trackable.state {
                TrackState::Added | TrackState::Changed => {
                    batch.push(StoreWriteOp::Put(key.to_array(), trackable.item.to_array()));
                }
                TrackState::Deleted => {
                    batch.push(StoreWriteOp::Delete(key.to_array()));
                }
            }
        }
        self.store.put_batch(batch);
        self.items.clear();
        self.frozen = true;
        Ok(())
    }

    fn check_writable(&self) -> StorageResult<()> {
        if self.frozen {
            Err(StorageError::SnapshotFrozen)
        } else {
            Ok(())
        }
    }

    fn store_get(&self, key: &StorageKey) -> Option<StorageItem> {
        self.store
            .try_get(&key.to_array())
            .map(StorageItem::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;

    fn key(id: i32, byte: u8) -> StorageKey {
        StorageKey::from_prefix(id, byte)
    }

    fn setup() -> (Arc<MemoryStore>, DataCache) {
        let store = Arc::new(MemoryStore::new());
        let cache = DataCache::new(store.clone() as Arc<dyn Store>);
        (store, cache)
    }

    #[test]
    fn rollback_leaves_store_untouched() {
        let (store, mut cache) = setup();
        store.put(key(1, 1).to_array(), b"old".to_vec());

        cache.put(key(1, 1), StorageItem::new(b"new".to_vec())).unwrap();
        drop(cache); // rollback

        assert_eq!(store.try_get(&key(1, 1).to_array()), Some(b"old".to_vec()));
    }

    #[test]
    fn commit_publishes_to_future_snapshots() {
        let (store, mut cache) = setup();
        cache.put(key(1, 1), StorageItem::new(vec![7])).unwrap();
        cache.commit_to_store().unwrap();

        let later = DataCache::new(store as Arc<dyn Store>);
        assert_eq!(later.try_get(&key(1, 1)).unwrap().value(), &[7]);
    }

    #[test]
    fn frozen_snapshot_rejects_writes() {
        let (_store, mut cache) = setup();
        cache.commit_to_store().unwrap();
        assert_eq!(
            cache.put(key(1, 1), StorageItem::default()),
            Err(StorageError::SnapshotFrozen)
        );
    }

    #[test]
    fn child_isolation_matches_open_order() {
        let (_store, mut parent) = setup();
        parent.put(key(1, 1), StorageItem::new(vec![0])).unwrap();

        let mut a = parent.clone_cache();
        a.put(key(1, 1), StorageItem::new(vec![1])).unwrap();

        let b = parent.clone_cache(); // opened before A committed
        a.commit_into(&mut parent).unwrap();
        let c = parent.clone_cache(); // opened after

        assert_eq!(b.try_get(&key(1, 1)).unwrap().value(), &[0]);
        assert_eq!(c.try_get(&key(1, 1)).unwrap().value(), &[1]);
        assert_eq!(parent.try_get(&key(1, 1)).unwrap().value(), &[1]);
    }

    #[test]
    fn delete_hides_store_entries_and_add_detects_them() {
        let (store, mut cache) = setup();
        store.put(key(1, 2).to_array(), vec![9]);

        assert!(cache.contains(&key(1, 2)));
        cache.delete(&key(1, 2)).unwrap();
        assert!(!cache.contains(&key(1, 2)));
        assert!(cache.try_get(&key(1, 2)).is_none());

        // The key is hidden, so add succeeds again.
        cache.add(key(1, 2), StorageItem::new(vec![1])).unwrap();
        assert_eq!(cache.try_get(&key(1, 2)).unwrap().value(), &[1]);
    }

    #[test]
    fn add_rejects_existing_key() {
        let (_store, mut cache) = setup();
        cache.add(key(1, 3), StorageItem::default()).unwrap();
        assert_eq!(
            cache.add(key(1, 3), StorageItem::default()),
            Err(StorageError::KeyAlreadyExists)
        );
    }

    #[test]
    fn find_merges_overlay_and_store() {
        let (store, mut cache) = setup();
        store.put(key(1, 1).to_array(), vec![1]);
        store.put(key(1, 3).to_array(), vec![3]);
        store.put(key(2, 1).to_array(), vec![9]);

        cache.put(key(1, 2), StorageItem::new(vec![2])).unwrap(); // new
        cache.put(key(1, 3), StorageItem::new(vec![33])).unwrap(); // changed
        cache.delete(&key(1, 1)).unwrap(); // hidden

        let found = cache.find(&StorageKey::contract_prefix(1), SeekDirection::Forward);
        let view: Vec<(u8, Vec<u8>)> = found
            .iter()
            .map(|(k, v)| (k.key[0], v.value().to_vec()))
            .collect();
        assert_eq!(view, vec![(2, vec![2]), (3, vec![33])]);

        let backward = cache.find(&StorageKey::contract_prefix(1), SeekDirection::Backward);
        assert_eq!(backward[0].0.key[0], 3);
    }

    #[test]
    fn get_and_change_materializes_store_values() {
        let (store, mut cache) = setup();
        store.put(key(4, 0).to_array(), StorageItem::from_int(5).to_array());

        {
            let item = cache.get_and_change(&key(4, 0)).unwrap().unwrap();
            item.add_int(&num_bigint::BigInt::from(2));
        }
        assert_eq!(
            cache.try_get(&key(4, 0)).unwrap().as_int(),
            num_bigint::BigInt::from(7)
        );
        // The store still holds the old value until commit.
        assert_eq!(
            StorageItem::new(store.try_get(&key(4, 0).to_array()).unwrap()).as_int(),
            num_bigint::BigInt::from(5)
        );
    }
}
