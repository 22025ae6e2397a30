//! Compact binary serialization of stack items (StdLib serialize/deserialize
//! and storage of execution receipts).

use crate::{ContractError, ContractResult};
use neo3_io::{BinaryWriter, MemoryReader};
use neo3_vm::{OrderedMap, StackItem, StackItemType};
use num_bigint::BigInt;
use std::cell::RefCell;
use std::rc::Rc;

const MAX_NESTING_DEPTH: usize = 16;

/// Serializes a stack item. Interop interfaces and pointers are not
/// serializable; reference cycles exceed the nesting limit and fail.
pub fn serialize_stack_item(item: &StackItem, max_size: usize) -> ContractResult<Vec<u8>> {
    let mut writer = BinaryWriter::new();
    write_item(item, &mut writer, MAX_NESTING_DEPTH)?;
    let bytes = writer.into_bytes();
    if bytes.len() > max_size {
        return Err(ContractError::invalid_argument(
            "serialized item exceeds size limit",
        ));
    }
    Ok(bytes)
}

fn write_item(item: &StackItem, writer: &mut BinaryWriter, depth: usize) -> ContractResult<()> {
    if depth == 0 {
        return Err(ContractError::invalid_argument("serialization too deep"));
    }
    match item {
        StackItem::Null => writer.write_byte(StackItemType::Any as u8),
        StackItem::Boolean(value) => {
            writer.write_byte(StackItemType::Boolean as u8);
            writer.write_bool(*value);
        }
        StackItem::Integer(value) => {
            writer.write_byte(StackItemType::Integer as u8);
            writer.write_var_bytes(&neo3_vm::stack_item::encode_integer(value));
        }
        StackItem::ByteString(bytes) => {
            writer.write_byte(StackItemType::ByteString as u8);
            writer.write_var_bytes(bytes);
        }
        StackItem::Buffer(bytes) => {
            writer.write_byte(StackItemType::Buffer as u8);
            writer.write_var_bytes(&bytes.borrow());
        }
        StackItem::Array(items) | StackItem::Struct(items) => {
            writer.write_byte(item.item_type() as u8);
            let items = items.borrow();
            writer.write_var_int(items.len() as u64);
            for child in items.iter() {
                write_item(child, writer, depth - 1)?;
            }
        }
        StackItem::Map(map) => {
            writer.write_byte(StackItemType::Map as u8);
            let map = map.borrow();
            writer.write_var_int(map.len() as u64);
            for (key, value) in map.entries() {
                write_item(key, writer, depth - 1)?;
                write_item(value, writer, depth - 1)?;
            }
        }
        StackItem::Pointer(_) | StackItem::InteropInterface(_) => {
            return Err(ContractError::invalid_argument(format!(
                "{:?} is not serializable",
                item.item_type()
            )));
        }
    }
    Ok(())
}

/// Deserializes a stack item previously produced by
/// [`serialize_stack_item`].
pub fn deserialize_stack_item(data: &[u8], max_item_size: usize) -> ContractResult<StackItem> {
    let mut reader = MemoryReader::new(data);
    let item = read_item(&mut reader, MAX_NESTING_DEPTH, max_item_size)?;
    if !reader.is_eof() {
        return Err(ContractError::invalid_argument("trailing bytes"));
    }
    Ok(item)
}

fn read_item(
    reader: &mut MemoryReader<'_>,
    depth: usize,
    max_item_size: usize,
) -> ContractResult<StackItem> {
    if depth == 0 {
        return Err(ContractError::invalid_argument("deserialization too deep"));
    }
    let type_byte = reader.read_byte()?;
    let item_type = StackItemType::from_byte(type_byte)
        .ok_or_else(|| ContractError::invalid_argument("unknown item type"))?;
    Ok(match item_type {
        StackItemType::Any => StackItem::Null,
        StackItemType::Boolean => StackItem::from_bool(reader.read_bool()?),
        StackItemType::Integer => {
            let bytes = reader.read_var_bytes(neo3_vm::stack_item::MAX_INTEGER_SIZE)?;
            if bytes.is_empty() {
                StackItem::from_int(0)
            } else {
                StackItem::Integer(BigInt::from_signed_bytes_le(&bytes))
            }
        }
        StackItemType::ByteString => StackItem::from_bytes(reader.read_var_bytes(max_item_size)?),
        StackItemType::Buffer => StackItem::buffer(reader.read_var_bytes(max_item_size)?),
        StackItemType::Array | StackItemType::Struct => {
            let count = reader.read_var_int(max_item_size as u64)? as usize;
            let mut items = Vec::with_capacity(count.min(1024));
            for _ in 0..count {
                items.push(read_item(reader, depth - 1, max_item_size)?);
            }
            let inner = Rc::new(RefCell::new(items));
            if item_type == StackItemType::Struct {
                StackItem::Struct(inner)
            } else {
                StackItem::Array(inner)
            }
        }
        StackItemType::Map => {
            let count = reader.read_var_int(max_item_size as u64)? as usize;
            let mut map = OrderedMap::new();
            for _ in 0..count {
                let key = read_item(reader, depth - 1, max_item_size)?;
                let value = read_item(reader, depth - 1, max_item_size)?;
                map.insert(key, value)
                    .map_err(|e| ContractError::invalid_argument(e.to_string()))?;
            }
            StackItem::Map(Rc::new(RefCell::new(map)))
        }
        StackItemType::Pointer | StackItemType::InteropInterface => {
            return Err(ContractError::invalid_argument(
                "type is not deserializable",
            ));
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(item: StackItem) -> StackItem {
        let bytes = serialize_stack_item(&item, 1 << 20).unwrap();
        deserialize_stack_item(&bytes, 1 << 20).unwrap()
    }

    #[test]
    fn primitives_round_trip() {
        assert!(round_trip(StackItem::Null).is_null());
        assert!(round_trip(StackItem::from_bool(true))
            .get_boolean(neo3_vm::stack_item::MAX_INTEGER_SIZE)
            .unwrap());
        assert_eq!(
            round_trip(StackItem::from_int(-42))
                .get_integer(neo3_vm::stack_item::MAX_INTEGER_SIZE)
                .unwrap(),
            BigInt::from(-42)
        );
        assert_eq!(
            round_trip(StackItem::from_bytes(vec![1, 2, 3]))
                .get_bytes()
                .unwrap(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn nested_array_round_trips() {
        let inner = StackItem::Array(Rc::new(RefCell::new(vec![StackItem::from_int(7)])));
        let outer = StackItem::Array(Rc::new(RefCell::new(vec![inner, StackItem::Null])));
        let restored = round_trip(outer);
        let items = restored.as_array().unwrap().borrow().clone();
        assert_eq!(items.len(), 2);
        assert!(items[1].is_null());
    }

    #[test]
    fn map_round_trips_in_order() {
        let mut map = OrderedMap::new();
        map.insert(StackItem::from_int(2), StackItem::from_bytes(vec![2]))
            .unwrap();
        map.insert(StackItem::from_int(1), StackItem::from_bytes(vec![1]))
            .unwrap();
        let restored = round_trip(StackItem::Map(Rc::new(RefCell::new(map))));
        let restored_map = restored.as_map().unwrap().borrow().keys();
        assert_eq!(
            restored_map[0]
                .get_integer(neo3_vm::stack_item::MAX_INTEGER_SIZE)
                .unwrap(),
            BigInt::from(2)
        );
    }

    #[test]
    fn interop_interface_is_rejected() {
        let item = StackItem::interop(Rc::new(5u32));
        assert!(serialize_stack_item(&item, 1 << 20).is_err());
    }

    #[test]
    fn cyclic_structure_fails_at_depth_limit() {
        let inner = Rc::new(RefCell::new(Vec::new()));
        inner.borrow_mut().push(StackItem::Array(Rc::clone(&inner)));
        assert!(serialize_stack_item(&StackItem::Array(inner), 1 << 20).is_err());
    }
}
