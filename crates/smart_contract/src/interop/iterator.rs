//! System.Iterator.* handlers.

use crate::application_engine::ApplicationEngine;
use crate::interop::StorageIterator;
use crate::ContractResult;
use neo3_vm::StackItem;
use std::cell::RefCell;

pub fn next(engine: &mut ApplicationEngine) -> ContractResult<()> {
    let item = engine.vm_mut().pop()?;
    let iterator = item.as_interop::<RefCell<StorageIterator>>()?;
    let has_next = iterator.borrow_mut().next();
    engine.vm_mut().push(StackItem::from_bool(has_next))?;
    Ok(())
}

pub fn value(engine: &mut ApplicationEngine) -> ContractResult<()> {
    let item = engine.vm_mut().pop()?;
    let iterator = item.as_interop::<RefCell<StorageIterator>>()?;
    let max_item_size = engine.vm().limits().max_item_size;
    let current = iterator.borrow().value(max_item_size)?;
    engine.vm_mut().push(current)?;
    Ok(())
}
