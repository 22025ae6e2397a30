//! Slots for static fields, local variables and arguments.

use crate::error::{VmError, VmResult};
use crate::reference_counter::ReferenceCounter;
use crate::stack_item::StackItem;
use std::cell::RefCell;
use std::rc::Rc;

/// A fixed-length item slot.
///
/// Cloning shares the storage; static-field slots are shared between a
/// context and its CALL clones this way.
#[derive(Clone)]
pub struct Slot {
    items: Rc<RefCell<Vec<StackItem>>>,
    counter: ReferenceCounter,
}

impl Slot {
    /// Creates a slot pre-filled with the given items.
    pub fn new(items: Vec<StackItem>, counter: ReferenceCounter) -> Self {
        for item in &items {
            counter.add_stack_reference(item);
        }
        Self {
            items: Rc::new(RefCell::new(items)),
            counter,
        }
    }

    /// Creates a slot of `count` nulls.
    pub fn with_count(count: usize, counter: ReferenceCounter) -> Self {
        Self::new(vec![StackItem::Null; count], counter)
    }

    /// Whether two handles refer to the same slot storage.
    pub fn shares_with(&self, other: &Slot) -> bool {
        Rc::ptr_eq(&self.items, &other.items)
    }

    /// Slot length.
    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    /// Whether the slot has no entries.
    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }

    /// Clones the item at `index`.
    pub fn get(&self, index: usize) -> VmResult<StackItem> {
        self.items
            .borrow()
            .get(index)
            .cloned()
            .ok_or_else(|| VmError::out_of_range(format!("slot index {index}")))
    }

    /// Replaces the item at `index`.
    pub fn set(&self, index: usize, item: StackItem) -> VmResult<()> {
        let mut items = self.items.borrow_mut();
        let target = items
            .get_mut(index)
            .ok_or_else(|| VmError::out_of_range(format!("slot index {index}")))?;
        self.counter.add_stack_reference(&item);
        let old = std::mem::replace(target, item);
        drop(items);
        self.counter.remove_stack_reference(&old);
        Ok(())
    }

    /// Releases all slot references; called when the owning context unloads.
    pub fn clear_references(&self) {
        for item in self.items.borrow().iter() {
            self.counter.remove_stack_reference(item);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack_item::MAX_INTEGER_SIZE;

    #[test]
    fn get_set_round_trip() {
        let counter = ReferenceCounter::new();
        let slot = Slot::with_count(2, counter.clone());
        assert!(slot.get(0).unwrap().is_null());
        slot.set(1, StackItem::from_int(5)).unwrap();
        assert_eq!(slot.get(1).unwrap().get_integer(MAX_INTEGER_SIZE).unwrap(), 5.into());
        assert!(slot.get(2).is_err());
    }

    #[test]
    fn references_are_balanced() {
        let counter = ReferenceCounter::new();
        let slot = Slot::with_count(3, counter.clone());
        assert_eq!(counter.count(), 3);
        slot.set(0, StackItem::from_int(1)).unwrap();
        assert_eq!(counter.count(), 3);
        slot.clear_references();
        assert_eq!(counter.count(), 0);
    }
}
