//! Compound-type handlers.

use crate::error::{VmError, VmResult};
use crate::execution_engine::ExecutionEngine;
use crate::instruction::Instruction;
use crate::stack_item::{OrderedMap, StackItem, StackItemType};
use std::cell::RefCell;
use std::rc::Rc;

/// Structs copy on assignment into another compound.
fn prepare_for_assignment(item: StackItem) -> StackItem {
    match item {
        StackItem::Struct(_) => item.deep_copy(),
        other => other,
    }
}

pub fn pack_map(engine: &mut ExecutionEngine, _i: &Instruction) -> VmResult<()> {
    let count = engine.pop_index(engine.limits().max_stack_size)?;
    let mut map = OrderedMap::new();
    for _ in 0..count {
        let key = engine.pop()?;
        let value = engine.pop()?;
        map.insert(key, value)?;
    }
    engine.push(StackItem::Map(Rc::new(RefCell::new(map))))
}

pub fn pack_struct(engine: &mut ExecutionEngine, _i: &Instruction) -> VmResult<()> {
    let count = engine.pop_index(engine.limits().max_stack_size)?;
    let mut items = Vec::with_capacity(count);
    for _ in 0..count {
        items.push(engine.pop()?);
    }
    engine.push(StackItem::Struct(Rc::new(RefCell::new(items))))
}

pub fn pack(engine: &mut ExecutionEngine, _i: &Instruction) -> VmResult<()> {
    let count = engine.pop_index(engine.limits().max_stack_size)?;
    let mut items = Vec::with_capacity(count);
    for _ in 0..count {
        items.push(engine.pop()?);
    }
    engine.push(StackItem::Array(Rc::new(RefCell::new(items))))
}

pub fn unpack(engine: &mut ExecutionEngine, _i: &Instruction) -> VmResult<()> {
    let compound = engine.pop()?;
    match &compound {
        StackItem::Array(items) | StackItem::Struct(items) => {
            let snapshot = items.borrow().clone();
            for item in snapshot.iter().rev() {
                engine.push(item.clone())?;
            }
            engine.push(StackItem::from_int(snapshot.len() as i64))
        }
        StackItem::Map(map) => {
            let entries: Vec<(StackItem, StackItem)> = map.borrow().entries().to_vec();
            for (key, value) in entries.iter().rev() {
                engine.push(value.clone())?;
                engine.push(key.clone())?;
            }
            engine.push(StackItem::from_int(entries.len() as i64))
        }
        other => Err(VmError::invalid_cast(format!(
            "UNPACK of {:?}",
            other.item_type()
        ))),
    }
}

pub fn new_array0(engine: &mut ExecutionEngine, _i: &Instruction) -> VmResult<()> {
    engine.push(StackItem::Array(Rc::new(RefCell::new(Vec::new()))))
}

pub fn new_array(engine: &mut ExecutionEngine, _i: &Instruction) -> VmResult<()> {
    let count = engine.pop_index(engine.limits().max_stack_size)?;
    engine.push(StackItem::Array(Rc::new(RefCell::new(vec![
        StackItem::Null;
        count
    ]))))
}

pub fn new_array_t(engine: &mut ExecutionEngine, instruction: &Instruction) -> VmResult<()> {
    let item_type = StackItemType::from_byte(instruction.operand_u8())
        .ok_or_else(|| VmError::bad_script("NEWARRAY_T with undefined type"))?;
    let count = engine.pop_index(engine.limits().max_stack_size)?;
    let default = match item_type {
        StackItemType::Boolean => StackItem::from_bool(false),
        StackItemType::Integer => StackItem::from_int(0),
        StackItemType::ByteString => StackItem::from_bytes(Vec::new()),
        _ => StackItem::Null,
    };
    engine.push(StackItem::Array(Rc::new(RefCell::new(vec![default; count]))))
}

pub fn new_struct0(engine: &mut ExecutionEngine, _i: &Instruction) -> VmResult<()> {
    engine.push(StackItem::Struct(Rc::new(RefCell::new(Vec::new()))))
}

pub fn new_struct(engine: &mut ExecutionEngine, _i: &Instruction) -> VmResult<()> {
    let count = engine.pop_index(engine.limits().max_stack_size)?;
    engine.push(StackItem::Struct(Rc::new(RefCell::new(vec![
        StackItem::Null;
        count
    ]))))
}

pub fn new_map(engine: &mut ExecutionEngine, _i: &Instruction) -> VmResult<()> {
    engine.push(StackItem::Map(Rc::new(RefCell::new(OrderedMap::new()))))
}

pub fn size(engine: &mut ExecutionEngine, _i: &Instruction) -> VmResult<()> {
    let item = engine.pop()?;
    let size = match &item {
        StackItem::Array(items) | StackItem::Struct(items) => items.borrow().len(),
        StackItem::Map(map) => map.borrow().len(),
        StackItem::ByteString(bytes) => bytes.len(),
        StackItem::Buffer(bytes) => bytes.borrow().len(),
        other => other.get_bytes()?.len(),
    };
    engine.push(StackItem::from_int(size as i64))
}

pub fn has_key(engine: &mut ExecutionEngine, _i: &Instruction) -> VmResult<()> {
    let max = engine.limits().max_integer_size;
    let key = engine.pop()?;
    let collection = engine.pop()?;
    let result = match &collection {
        StackItem::Array(items) | StackItem::Struct(items) => {
            let index: usize = key
                .get_integer(max)?
                .try_into()
                .map_err(|_| VmError::out_of_range("negative index"))?;
            index < items.borrow().len()
        }
        StackItem::Map(map) => map.borrow().contains_key(&key)?,
        StackItem::Buffer(bytes) => {
            let index: usize = key
                .get_integer(max)?
                .try_into()
                .map_err(|_| VmError::out_of_range("negative index"))?;
            index < bytes.borrow().len()
        }
        StackItem::ByteString(bytes) => {
            let index: usize = key
                .get_integer(max)?
                .try_into()
                .map_err(|_| VmError::out_of_range("negative index"))?;
            index < bytes.len()
        }
        other => {
            return Err(VmError::invalid_cast(format!(
                "HASKEY of {:?}",
                other.item_type()
            )))
        }
    };
    engine.push(StackItem::from_bool(result))
}

pub fn keys(engine: &mut ExecutionEngine, _i: &Instruction) -> VmResult<()> {
    let map = engine.pop()?;
    let keys = map.as_map()?.borrow().keys();
    engine.push(StackItem::Array(Rc::new(RefCell::new(keys))))
}

pub fn values(engine: &mut ExecutionEngine, _i: &Instruction) -> VmResult<()> {
    let collection = engine.pop()?;
    let values = match &collection {
        StackItem::Array(items) | StackItem::Struct(items) => items.borrow().clone(),
        StackItem::Map(map) => map.borrow().values(),
        other => {
            return Err(VmError::invalid_cast(format!(
                "VALUES of {:?}",
                other.item_type()
            )))
        }
    };
    // Struct values are copied, everything else is shared.
    let values = values.into_iter().map(prepare_for_assignment).collect();
    engine.push(StackItem::Array(Rc::new(RefCell::new(values))))
}

pub fn pick_item(engine: &mut ExecutionEngine, _i: &Instruction) -> VmResult<()> {
    let max = engine.limits().max_integer_size;
    let key = engine.pop()?;
    let collection = engine.pop()?;
    let picked = match &collection {
        StackItem::Array(items) | StackItem::Struct(items) => {
            let index: usize = key
                .get_integer(max)?
                .try_into()
                .map_err(|_| VmError::out_of_range("negative index"))?;
            let items = items.borrow();
            items
                .get(index)
                .cloned()
                .ok_or_else(|| VmError::out_of_range(format!("index {index}")))?
        }
        StackItem::Map(map) => map
            .borrow()
            .get(&key)?
            .ok_or_else(|| VmError::out_of_range("missing map key"))?,
        StackItem::ByteString(_) | StackItem::Buffer(_) => {
            let bytes = collection.get_bytes()?;
            let index: usize = key
                .get_integer(max)?
                .try_into()
                .map_err(|_| VmError::out_of_range("negative index"))?;
            let byte = *bytes
                .get(index)
                .ok_or_else(|| VmError::out_of_range(format!("index {index}")))?;
            StackItem::from_int(byte as i64)
        }
        other => {
            return Err(VmError::invalid_cast(format!(
                "PICKITEM of {:?}",
                other.item_type()
            )))
        }
    };
    engine.push(picked)
}

pub fn append(engine: &mut ExecutionEngine, _i: &Instruction) -> VmResult<()> {
    let item = prepare_for_assignment(engine.pop()?);
    let target = engine.pop()?;
    let items = target.as_array()?;
    engine.reference_counter().add_reference(&item);
    items.borrow_mut().push(item);
    Ok(())
}

pub fn set_item(engine: &mut ExecutionEngine, _i: &Instruction) -> VmResult<()> {
    let max = engine.limits().max_integer_size;
    let value = prepare_for_assignment(engine.pop()?);
    let key = engine.pop()?;
    let collection = engine.pop()?;
    match &collection {
        StackItem::Array(items) | StackItem::Struct(items) => {
            let index: usize = key
                .get_integer(max)?
                .try_into()
                .map_err(|_| VmError::out_of_range("negative index"))?;
            let mut items = items.borrow_mut();
            let slot = items
                .get_mut(index)
                .ok_or_else(|| VmError::out_of_range(format!("index {index}")))?;
            engine.reference_counter().add_reference(&value);
            let old = std::mem::replace(slot, value);
            drop(items);
            engine.reference_counter().remove_reference(&old);
            Ok(())
        }
        StackItem::Map(map) => {
            engine.reference_counter().add_reference(&value);
            let old = map.borrow_mut().insert(key.clone(), value)?;
            match old {
                // The key stayed; only the value reference was replaced.
                Some(old) => engine.reference_counter().remove_reference(&old),
                None => engine.reference_counter().add_reference(&key),
            }
            Ok(())
        }
        StackItem::Buffer(bytes) => {
            let index: usize = key
                .get_integer(max)?
                .try_into()
                .map_err(|_| VmError::out_of_range("negative index"))?;
            let byte_value = value.get_integer(max)?;
            let byte: u8 = byte_value
                .try_into()
                .map_err(|_| VmError::out_of_range("byte value"))?;
            let mut bytes = bytes.borrow_mut();
            let slot = bytes
                .get_mut(index)
                .ok_or_else(|| VmError::out_of_range(format!("index {index}")))?;
            *slot = byte;
            Ok(())
        }
        other => Err(VmError::invalid_cast(format!(
            "SETITEM of {:?}",
            other.item_type()
        ))),
    }
}

pub fn reverse_items(engine: &mut ExecutionEngine, _i: &Instruction) -> VmResult<()> {
    let collection = engine.pop()?;
    match &collection {
        StackItem::Array(items) | StackItem::Struct(items) => {
            items.borrow_mut().reverse();
            Ok(())
        }
        StackItem::Buffer(bytes) => {
            bytes.borrow_mut().reverse();
            Ok(())
        }
        other => Err(VmError::invalid_cast(format!(
            "REVERSEITEMS of {:?}",
            other.item_type()
        ))),
    }
}

pub fn remove(engine: &mut ExecutionEngine, _i: &Instruction) -> VmResult<()> {
    let max = engine.limits().max_integer_size;
    let key = engine.pop()?;
    let collection = engine.pop()?;
    match &collection {
        StackItem::Array(items) | StackItem::Struct(items) => {
            let index: usize = key
                .get_integer(max)?
                .try_into()
                .map_err(|_| VmError::out_of_range("negative index"))?;
            let mut items = items.borrow_mut();
            if index >= items.len() {
                return Err(VmError::out_of_range(format!("index {index}")));
            }
            let old = items.remove(index);
            drop(items);
            engine.reference_counter().remove_reference(&old);
            Ok(())
        }
        StackItem::Map(map) => {
            if let Some((old_key, old_value)) = map.borrow_mut().remove(&key)? {
                engine.reference_counter().remove_reference(&old_key);
                engine.reference_counter().remove_reference(&old_value);
            }
            Ok(())
        }
        other => Err(VmError::invalid_cast(format!(
            "REMOVE of {:?}",
            other.item_type()
        ))),
    }
}

pub fn clear_items(engine: &mut ExecutionEngine, _i: &Instruction) -> VmResult<()> {
    let collection = engine.pop()?;
    match &collection {
        StackItem::Array(items) | StackItem::Struct(items) => {
            let drained: Vec<StackItem> = items.borrow_mut().drain(..).collect();
            for item in &drained {
                engine.reference_counter().remove_reference(item);
            }
            Ok(())
        }
        StackItem::Map(map) => {
            let drained = map.borrow_mut().clear();
            for (key, value) in &drained {
                engine.reference_counter().remove_reference(key);
                engine.reference_counter().remove_reference(value);
            }
            Ok(())
        }
        other => Err(VmError::invalid_cast(format!(
            "CLEARITEMS of {:?}",
            other.item_type()
        ))),
    }
}

pub fn pop_item(engine: &mut ExecutionEngine, _i: &Instruction) -> VmResult<()> {
    let collection = engine.pop()?;
    let items = collection.as_array()?;
    let item = items
        .borrow_mut()
        .pop()
        .ok_or_else(|| VmError::out_of_range("POPITEM from empty array"))?;
    engine.reference_counter().remove_reference(&item);
    engine.push(item)
}
