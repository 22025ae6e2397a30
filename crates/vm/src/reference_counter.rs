//! Reference counting and cycle collection for stack items.
//!
//! Every edge to an item is counted: stack and slot entries, and the child
//! slots of compound items. The count drives the engine's total stack-size
//! limit. The invariant is that a *tracked* compound has all of its internal
//! edges counted: a compound is registered (recursively) the first time any
//! reference to it is recorded, and later content changes are reported
//! through [`ReferenceCounter::add_reference`] /
//! [`ReferenceCounter::remove_reference`].
//!
//! Compounds whose stack references drop to zero become sweep candidates; a
//! mark phase from the still-rooted compounds finds the ones that survive
//! only through cycles, and the sweep subtracts their edges and clears their
//! contents. Tearing the counter down clears every tracked compound, so
//! reference cycles cannot outlive the engine.

use crate::stack_item::{ArrayRef, MapRef, StackItem};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

#[derive(Clone)]
enum TrackedCompound {
    Array(ArrayRef),
    Map(MapRef),
}

impl TrackedCompound {
    fn ptr(&self) -> usize {
        match self {
            TrackedCompound::Array(items) => Rc::as_ptr(items) as *const u8 as usize,
            TrackedCompound::Map(map) => Rc::as_ptr(map) as *const u8 as usize,
        }
    }

    fn child_edge_count(&self) -> usize {
        match self {
            TrackedCompound::Array(items) => items.borrow().len(),
            TrackedCompound::Map(map) => map.borrow().len() * 2,
        }
    }

    fn child_compounds(&self) -> Vec<TrackedCompound> {
        let mut out = Vec::new();
        let mut collect = |item: &StackItem| {
            if let Some(compound) = as_tracked(item) {
                out.push(compound);
            }
        };
        match self {
            TrackedCompound::Array(items) => {
                for item in items.borrow().iter() {
                    collect(item);
                }
            }
            TrackedCompound::Map(map) => {
                for (key, value) in map.borrow().entries() {
                    collect(key);
                    collect(value);
                }
            }
        }
        out
    }

    fn clear(&self) {
        match self {
            TrackedCompound::Array(items) => items.borrow_mut().clear(),
            TrackedCompound::Map(map) => {
                map.borrow_mut().clear();
            }
        }
    }
}

fn compound_ptr(item: &StackItem) -> Option<usize> {
    match item {
        StackItem::Array(items) | StackItem::Struct(items) => {
            Some(Rc::as_ptr(items) as *const u8 as usize)
        }
        StackItem::Map(map) => Some(Rc::as_ptr(map) as *const u8 as usize),
        _ => None,
    }
}

fn as_tracked(item: &StackItem) -> Option<TrackedCompound> {
    match item {
        StackItem::Array(items) | StackItem::Struct(items) => {
            Some(TrackedCompound::Array(Rc::clone(items)))
        }
        StackItem::Map(map) => Some(TrackedCompound::Map(Rc::clone(map))),
        _ => None,
    }
}

#[derive(Default)]
struct Inner {
    /// Total counted edges (stack, slot and nested references).
    references: usize,
    /// Every live compound, keyed by pointer identity.
    tracked: HashMap<usize, TrackedCompound>,
    /// Stack/slot references per compound.
    stack_refs: HashMap<usize, usize>,
    /// Compounds whose stack references reached zero since the last sweep.
    zero_referred: HashSet<usize>,
}

impl Inner {
    /// Tracks a compound and, on first sight, counts its internal edges —
    /// recursively, so an untracked graph entering the engine is accounted
    /// in full.
    fn register(&mut self, compound: TrackedCompound) {
        let mut pending = vec![compound];
        while let Some(compound) = pending.pop() {
            let ptr = compound.ptr();
            if self.tracked.contains_key(&ptr) {
                continue;
            }
            self.references += compound.child_edge_count();
            pending.extend(compound.child_compounds());
            self.tracked.insert(ptr, compound);
        }
    }
}

/// Shared reference counter of one engine.
///
/// Engines are single-threaded, so the handle is an `Rc` clone shared by
/// every evaluation stack and slot of the engine.
#[derive(Clone, Default)]
pub struct ReferenceCounter {
    inner: Rc<RefCell<Inner>>,
}

impl ReferenceCounter {
    /// Creates a fresh counter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total counted references.
    pub fn count(&self) -> usize {
        self.inner.borrow().references
    }

    /// Registers a stack or slot reference to `item`.
    pub fn add_stack_reference(&self, item: &StackItem) {
        let mut inner = self.inner.borrow_mut();
        inner.references += 1;
        if let Some(compound) = as_tracked(item) {
            let ptr = compound.ptr();
            inner.register(compound);
            *inner.stack_refs.entry(ptr).or_insert(0) += 1;
            inner.zero_referred.remove(&ptr);
        }
    }

    /// Releases a stack or slot reference to `item`.
    pub fn remove_stack_reference(&self, item: &StackItem) {
        let mut inner = self.inner.borrow_mut();
        inner.references = inner.references.saturating_sub(1);
        if let Some(ptr) = compound_ptr(item) {
            if let Some(refs) = inner.stack_refs.get_mut(&ptr) {
                *refs = refs.saturating_sub(1);
                if *refs == 0 {
                    inner.zero_referred.insert(ptr);
                }
            }
        }
    }

    /// Registers a nested (compound child) reference to `item`. Call this
    /// when inserting into an already-tracked compound.
    pub fn add_reference(&self, item: &StackItem) {
        let mut inner = self.inner.borrow_mut();
        inner.references += 1;
        if let Some(compound) = as_tracked(item) {
            inner.register(compound);
        }
    }

    /// Releases a nested reference to `item`.
    pub fn remove_reference(&self, item: &StackItem) {
        let mut inner = self.inner.borrow_mut();
        inner.references = inner.references.saturating_sub(1);
        if let Some(ptr) = compound_ptr(item) {
            if inner.stack_refs.get(&ptr).copied().unwrap_or(0) == 0 {
                inner.zero_referred.insert(ptr);
            }
        }
    }

    /// Collects compounds that are no longer reachable from any stack or
    /// slot, including reference cycles. Returns the updated count.
    pub fn check_zero_referred(&self) -> usize {
        let needs_sweep = !self.inner.borrow().zero_referred.is_empty();
        if !needs_sweep {
            return self.count();
        }

        // Mark: walk the real object graphs from every rooted compound.
        let roots: Vec<TrackedCompound> = {
            let inner = self.inner.borrow();
            inner
                .tracked
                .iter()
                .filter(|(ptr, _)| inner.stack_refs.get(*ptr).copied().unwrap_or(0) > 0)
                .map(|(_, compound)| compound.clone())
                .collect()
        };
        let mut reachable: HashSet<usize> = HashSet::new();
        let mut frontier: Vec<TrackedCompound> = roots;
        while let Some(compound) = frontier.pop() {
            if !reachable.insert(compound.ptr()) {
                continue;
            }
            frontier.extend(compound.child_compounds());
        }

        // Sweep: drop edges of unreachable compounds and clear them.
        let garbage: Vec<TrackedCompound> = {
            let inner = self.inner.borrow();
            inner
                .tracked
                .iter()
                .filter(|(ptr, _)| !reachable.contains(*ptr))
                .map(|(_, compound)| compound.clone())
                .collect()
        };
        {
            let mut inner = self.inner.borrow_mut();
            for compound in &garbage {
                let edges = compound.child_edge_count();
                inner.references = inner.references.saturating_sub(edges);
                let ptr = compound.ptr();
                inner.tracked.remove(&ptr);
                inner.stack_refs.remove(&ptr);
            }
            inner.zero_referred.clear();
        }
        for compound in &garbage {
            compound.clear();
        }

        self.count()
    }

    /// Clears every tracked compound, breaking any remaining cycles. Called
    /// when the engine ends; afterwards the counter is empty.
    pub fn teardown(&self) {
        let tracked: Vec<TrackedCompound> = {
            let mut inner = self.inner.borrow_mut();
            inner.references = 0;
            inner.stack_refs.clear();
            inner.zero_referred.clear();
            inner.tracked.drain().map(|(_, compound)| compound).collect()
        };
        for compound in tracked {
            compound.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn array_of(items: Vec<StackItem>) -> StackItem {
        StackItem::Array(Rc::new(RefCell::new(items)))
    }

    #[test]
    fn stack_references_count() {
        let counter = ReferenceCounter::new();
        let item = StackItem::from_int(1);
        counter.add_stack_reference(&item);
        counter.add_stack_reference(&item);
        assert_eq!(counter.count(), 2);
        counter.remove_stack_reference(&item);
        assert_eq!(counter.count(), 1);
    }

    #[test]
    fn registration_counts_internal_edges() {
        let counter = ReferenceCounter::new();
        let nested = array_of(vec![StackItem::from_int(7)]);
        let outer = array_of(vec![nested, StackItem::from_int(8)]);
        counter.add_stack_reference(&outer);
        // 1 stack ref + 2 edges in outer + 1 edge in nested.
        assert_eq!(counter.count(), 4);
    }

    #[test]
    fn popped_compound_is_collected() {
        let counter = ReferenceCounter::new();
        let array = array_of(vec![StackItem::from_int(1), StackItem::from_int(2)]);
        counter.add_stack_reference(&array);
        assert_eq!(counter.count(), 3);

        counter.remove_stack_reference(&array);
        assert_eq!(counter.check_zero_referred(), 0);
    }

    #[test]
    fn cycle_is_collected_when_unrooted() {
        let counter = ReferenceCounter::new();
        let array = array_of(vec![]);
        let inner = Rc::clone(array.as_array().unwrap());
        inner.borrow_mut().push(array.clone()); // self-cycle
        counter.add_stack_reference(&array);
        assert_eq!(counter.count(), 2); // stack ref + self edge

        counter.remove_stack_reference(&array);
        assert_eq!(counter.check_zero_referred(), 0);
        assert!(array.as_array().unwrap().borrow().is_empty());
    }

    #[test]
    fn rooted_compounds_survive_sweep() {
        let counter = ReferenceCounter::new();
        let child = array_of(vec![StackItem::from_int(7)]);
        let parent = array_of(vec![child.clone()]);
        counter.add_stack_reference(&parent);
        counter.add_stack_reference(&child);
        assert_eq!(counter.count(), 4);

        // Popping the child leaves it reachable through the parent.
        counter.remove_stack_reference(&child);
        assert_eq!(counter.check_zero_referred(), 3);
        assert_eq!(child.as_array().unwrap().borrow().len(), 1);
    }

    #[test]
    fn teardown_breaks_cycles() {
        let counter = ReferenceCounter::new();
        let array = array_of(vec![]);
        let inner = Rc::clone(array.as_array().unwrap());
        inner.borrow_mut().push(array.clone());
        counter.add_stack_reference(&array);

        counter.teardown();
        assert_eq!(counter.count(), 0);
        assert!(inner.borrow().is_empty());
    }
}
