//! System.Storage.* handlers.

use crate::application_engine::ApplicationEngine;
use crate::{ContractError, ContractResult};
use neo3_config::{MAX_STORAGE_KEY_SIZE, MAX_STORAGE_VALUE_SIZE};
use neo3_persistence::{SeekDirection, StorageItem, StorageKey};
use neo3_vm::StackItem;
use std::cell::RefCell;
use std::rc::Rc;

/// Handle to one contract's storage, passed to the storage interops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageContext {
    /// Storage id of the owning contract.
    pub id: i32,
    /// Whether writes through this context are rejected.
    pub is_read_only: bool,
}

/// Options of `System.Storage.Find`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FindOptions(pub u8);

impl FindOptions {
    /// Plain key-value iteration.
    pub const NONE: FindOptions = FindOptions(0);
    /// Yield keys only.
    pub const KEYS_ONLY: FindOptions = FindOptions(0x01);
    /// Strip the search prefix from yielded keys.
    pub const REMOVE_PREFIX: FindOptions = FindOptions(0x02);
    /// Yield values only.
    pub const VALUES_ONLY: FindOptions = FindOptions(0x04);
    /// Deserialize values as stack items.
    pub const DESERIALIZE_VALUES: FindOptions = FindOptions(0x08);
    /// After deserializing, yield field 0 of the value.
    pub const PICK_FIELD_0: FindOptions = FindOptions(0x10);
    /// After deserializing, yield field 1 of the value.
    pub const PICK_FIELD_1: FindOptions = FindOptions(0x20);
    /// Iterate in descending key order.
    pub const BACKWARDS: FindOptions = FindOptions(0x80);

    const ALL: u8 = 0x01 | 0x02 | 0x04 | 0x08 | 0x10 | 0x20 | 0x80;

    /// Parses an options byte, rejecting undefined bits and contradictory
    /// combinations.
    pub fn from_byte(value: u8) -> ContractResult<Self> {
        if value & !Self::ALL != 0 {
            return Err(ContractError::invalid_argument("undefined find options"));
        }
        let options = FindOptions(value);
        if options.contains(Self::KEYS_ONLY) && options.contains(Self::VALUES_ONLY) {
            return Err(ContractError::invalid_argument(
                "KeysOnly and ValuesOnly are mutually exclusive",
            ));
        }
        if (options.contains(Self::PICK_FIELD_0) || options.contains(Self::PICK_FIELD_1))
            && !options.contains(Self::DESERIALIZE_VALUES)
        {
            return Err(ContractError::invalid_argument(
                "PickField requires DeserializeValues",
            ));
        }
        Ok(options)
    }

    /// Whether all bits of `other` are set.
    pub fn contains(self, other: FindOptions) -> bool {
        self.0 & other.0 == other.0
    }
}

/// A snapshot-scoped cursor over one contract's storage.
///
/// The entries are captured when `Find` executes; invalidation on context
/// unload is therefore automatic — the cursor sees a stable snapshot and
/// dies with the engine.
#[derive(Debug)]
pub struct StorageIterator {
    entries: Vec<(StorageKey, StorageItem)>,
    position: Option<usize>,
    prefix_length: usize,
    options: FindOptions,
}

impl StorageIterator {
    /// Creates a cursor over pre-collected entries.
    pub fn new(
        entries: Vec<(StorageKey, StorageItem)>,
        prefix_length: usize,
        options: FindOptions,
    ) -> Self {
        Self {
            entries,
            position: None,
            prefix_length,
            options,
        }
    }

    /// Advances; returns whether an element is available.
    pub fn next(&mut self) -> bool {
        let next = match self.position {
            None => 0,
            Some(position) => position + 1,
        };
        if next < self.entries.len() {
            self.position = Some(next);
            true
        } else {
            self.position = Some(self.entries.len());
            false
        }
    }

    /// The element at the cursor, shaped by the find options.
    pub fn value(&self, max_item_size: usize) -> ContractResult<StackItem> {
        let position = self
            .position
            .filter(|&p| p < self.entries.len())
            .ok_or_else(|| ContractError::invalid_operation("iterator is not positioned"))?;
        let (key, item) = &self.entries[position];

        let mut key_bytes = key.key.clone();
        if self.options.contains(FindOptions::REMOVE_PREFIX) {
            key_bytes = key_bytes.split_off(self.prefix_length);
        }
        let key_item = StackItem::from_bytes(key_bytes);

        let value_item = if self.options.contains(FindOptions::DESERIALIZE_VALUES) {
            let deserialized =
                crate::binary_serializer::deserialize_stack_item(item.value(), max_item_size)?;
            if self.options.contains(FindOptions::PICK_FIELD_0)
                || self.options.contains(FindOptions::PICK_FIELD_1)
            {
                let index = usize::from(self.options.contains(FindOptions::PICK_FIELD_1));
                let array = deserialized.as_array()?;
                let array = array.borrow();
                array
                    .get(index)
                    .cloned()
                    .ok_or_else(|| ContractError::invalid_operation("picked field missing"))?
            } else {
                deserialized
            }
        } else {
            StackItem::from_bytes(item.value().to_vec())
        };

        Ok(if self.options.contains(FindOptions::KEYS_ONLY) {
            key_item
        } else if self.options.contains(FindOptions::VALUES_ONLY) {
            value_item
        } else {
            StackItem::Struct(Rc::new(RefCell::new(vec![key_item, value_item])))
        })
    }
}

fn pop_context(engine: &mut ApplicationEngine) -> ContractResult<StorageContext> {
    let item = engine.vm_mut().pop()?;
    let context = item.as_interop::<StorageContext>()?;
    Ok(*context)
}

fn current_context(engine: &ApplicationEngine, read_only: bool) -> ContractResult<StorageContext> {
    let id = engine
        .current_contract_id()
        .ok_or_else(|| ContractError::invalid_operation("script has no storage"))?;
    Ok(StorageContext {
        id,
        is_read_only: read_only,
    })
}

pub fn get_context(engine: &mut ApplicationEngine) -> ContractResult<()> {
    let context = current_context(engine, false)?;
    engine.vm_mut().push(StackItem::interop(Rc::new(context)))?;
    Ok(())
}

pub fn get_read_only_context(engine: &mut ApplicationEngine) -> ContractResult<()> {
    let context = current_context(engine, true)?;
    engine.vm_mut().push(StackItem::interop(Rc::new(context)))?;
    Ok(())
}

pub fn as_read_only(engine: &mut ApplicationEngine) -> ContractResult<()> {
    let mut context = pop_context(engine)?;
    context.is_read_only = true;
    engine.vm_mut().push(StackItem::interop(Rc::new(context)))?;
    Ok(())
}

pub fn get(engine: &mut ApplicationEngine) -> ContractResult<()> {
    let context = pop_context(engine)?;
    let key = engine.vm_mut().pop_bytes()?;
    let storage_key = StorageKey::new(context.id, key);
    let item = engine.snapshot().try_get(&storage_key);
    match item {
        Some(item) => engine
            .vm_mut()
            .push(StackItem::from_bytes(item.value().to_vec()))?,
        None => engine.vm_mut().push(StackItem::Null)?,
    }
    Ok(())
}

pub fn put(engine: &mut ApplicationEngine) -> ContractResult<()> {
    let context = pop_context(engine)?;
    if context.is_read_only {
        return Err(ContractError::invalid_operation("storage context is read-only"));
    }
    let key = engine.vm_mut().pop_bytes()?;
    let value = engine.vm_mut().pop_bytes()?;
    if key.len() > MAX_STORAGE_KEY_SIZE {
        return Err(ContractError::invalid_argument("storage key too long"));
    }
    if value.len() > MAX_STORAGE_VALUE_SIZE {
        return Err(ContractError::invalid_argument("storage value too long"));
    }

    let storage_key = StorageKey::new(context.id, key);
    // New rows pay for key and value; overwrites pay a quarter rate for the
    // reused span plus full rate for growth.
    let existing = engine.snapshot().try_get(&storage_key);
    let new_len = value.len() as i64;
    let charged_bytes: i64 = match &existing {
        None => storage_key.key.len() as i64 + new_len,
        Some(_) if value.is_empty() => 1,
        Some(old) => {
            let old_len = old.value().len() as i64;
            if new_len <= old_len {
                (new_len - 1) / 4 + 1
            } else {
                (old_len - 1).max(0) / 4 + 1 + new_len - old_len
            }
        }
    };
    engine.add_fee(charged_bytes * engine.storage_price())?;

    engine
        .snapshot_mut()
        .put(storage_key, StorageItem::new(value))?;
    Ok(())
}

pub fn delete(engine: &mut ApplicationEngine) -> ContractResult<()> {
    let context = pop_context(engine)?;
    if context.is_read_only {
        return Err(ContractError::invalid_operation("storage context is read-only"));
    }
    let key = engine.vm_mut().pop_bytes()?;
    let storage_key = StorageKey::new(context.id, key);
    engine.snapshot_mut().delete(&storage_key)?;
    Ok(())
}

pub fn find(engine: &mut ApplicationEngine) -> ContractResult<()> {
    let context = pop_context(engine)?;
    let prefix = engine.vm_mut().pop_bytes()?;
    let options_byte: u8 = engine
        .vm_mut()
        .pop_integer()?
        .try_into()
        .map_err(|_| ContractError::invalid_argument("find options out of range"))?;
    let options = FindOptions::from_byte(options_byte)?;

    let mut raw_prefix = StorageKey::contract_prefix(context.id);
    raw_prefix.extend_from_slice(&prefix);
    let direction = if options.contains(FindOptions::BACKWARDS) {
        SeekDirection::Backward
    } else {
        SeekDirection::Forward
    };
    let entries = engine.snapshot().find(&raw_prefix, direction);

    let iterator = StorageIterator::new(entries, prefix.len(), options);
    engine
        .vm_mut()
        .push(StackItem::interop(Rc::new(RefCell::new(iterator))))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_options_validation() {
        assert!(FindOptions::from_byte(0x05).is_err()); // keys+values
        assert!(FindOptions::from_byte(0x10).is_err()); // pick without deserialize
        assert!(FindOptions::from_byte(0x40).is_err()); // undefined bit
        assert!(FindOptions::from_byte(0x18).is_ok()); // deserialize + pick0
    }

    #[test]
    fn iterator_walks_entries() {
        let entries = vec![
            (StorageKey::new(1, vec![0x01, 0xaa]), StorageItem::new(vec![1])),
            (StorageKey::new(1, vec![0x01, 0xbb]), StorageItem::new(vec![2])),
        ];
        let mut iterator = StorageIterator::new(entries, 1, FindOptions::NONE);
        assert!(iterator.next());
        let first = iterator.value(1024).unwrap();
        let pair = first.as_array().unwrap().borrow().clone();
        assert_eq!(pair[0].get_bytes().unwrap(), vec![0x01, 0xaa]);
        assert!(iterator.next());
        assert!(!iterator.next());
        assert!(iterator.value(1024).is_err());
    }

    #[test]
    fn remove_prefix_strips_search_prefix() {
        let entries = vec![(
            StorageKey::new(1, vec![0x01, 0xaa]),
            StorageItem::new(vec![1]),
        )];
        let mut iterator = StorageIterator::new(
            entries,
            1,
            FindOptions::from_byte(FindOptions::KEYS_ONLY.0 | FindOptions::REMOVE_PREFIX.0)
                .unwrap(),
        );
        assert!(iterator.next());
        assert_eq!(iterator.value(1024).unwrap().get_bytes().unwrap(), vec![0xaa]);
    }
}
