//! JSON serialization of stack items (StdLib jsonSerialize/jsonDeserialize).
//!
//! The mapping mirrors the reference node and is intentionally asymmetric:
//! byte strings serialize as Base64 text, while deserializing a JSON string
//! yields its UTF-8 bytes.

use crate::{ContractError, ContractResult};
use base64::Engine;
use neo3_vm::{OrderedMap, StackItem};
use num_bigint::BigInt;
use serde_json::{Map, Number, Value};
use std::cell::RefCell;
use std::rc::Rc;

/// Largest integer exactly representable in a JSON number (2^53 - 1).
const MAX_SAFE_INTEGER: i64 = 9_007_199_254_740_991;

const MAX_NESTING_DEPTH: usize = 10;

/// Converts a stack item to a JSON value. Buffers, pointers and interop
/// interfaces are not representable.
pub fn stack_item_to_json(item: &StackItem) -> ContractResult<Value> {
    to_json(item, MAX_NESTING_DEPTH)
}

fn to_json(item: &StackItem, depth: usize) -> ContractResult<Value> {
    if depth == 0 {
        return Err(ContractError::invalid_argument("JSON nesting too deep"));
    }
    Ok(match item {
        StackItem::Null => Value::Null,
        StackItem::Boolean(value) => Value::Bool(*value),
        StackItem::Integer(value) => {
            let small: i64 = value
                .try_into()
                .map_err(|_| ContractError::invalid_argument("integer too large for JSON"))?;
            if !(-MAX_SAFE_INTEGER..=MAX_SAFE_INTEGER).contains(&small) {
                return Err(ContractError::invalid_argument(
                    "integer outside the JSON-safe range",
                ));
            }
            Value::Number(Number::from(small))
        }
        StackItem::ByteString(bytes) => {
            Value::String(base64::engine::general_purpose::STANDARD.encode(bytes.as_slice()))
        }
        StackItem::Array(items) | StackItem::Struct(items) => {
            let items = items.borrow();
            let mut array = Vec::with_capacity(items.len());
            for child in items.iter() {
                array.push(to_json(child, depth - 1)?);
            }
            Value::Array(array)
        }
        StackItem::Map(map) => {
            let map = map.borrow();
            let mut object = Map::new();
            for (key, value) in map.entries() {
                let key_bytes = key.get_bytes()?;
                let key_text = String::from_utf8(key_bytes).map_err(|_| {
                    ContractError::invalid_argument("map key is not valid UTF-8")
                })?;
                object.insert(key_text, to_json(value, depth - 1)?);
            }
            Value::Object(object)
        }
        StackItem::Buffer(_) | StackItem::Pointer(_) | StackItem::InteropInterface(_) => {
            return Err(ContractError::invalid_argument(format!(
                "{:?} is not representable in JSON",
                item.item_type()
            )));
        }
    })
}

/// Converts a JSON value to a stack item.
pub fn json_to_stack_item(value: &Value) -> ContractResult<StackItem> {
    from_json(value, MAX_NESTING_DEPTH)
}

fn from_json(value: &Value, depth: usize) -> ContractResult<StackItem> {
    if depth == 0 {
        return Err(ContractError::invalid_argument("JSON nesting too deep"));
    }
    Ok(match value {
        Value::Null => StackItem::Null,
        Value::Bool(b) => StackItem::from_bool(*b),
        Value::Number(number) => {
            let int = number
                .as_i64()
                .ok_or_else(|| ContractError::invalid_argument("non-integer JSON number"))?;
            StackItem::from_int(int)
        }
        Value::String(text) => StackItem::from_bytes(text.as_bytes().to_vec()),
        Value::Array(items) => {
            let mut converted = Vec::with_capacity(items.len());
            for item in items {
                converted.push(from_json(item, depth - 1)?);
            }
            StackItem::Array(Rc::new(RefCell::new(converted)))
        }
        Value::Object(object) => {
            let mut map = OrderedMap::new();
            for (key, value) in object {
                map.insert(
                    StackItem::from_bytes(key.as_bytes().to_vec()),
                    from_json(value, depth - 1)?,
                )
                .map_err(|e| ContractError::invalid_argument(e.to_string()))?;
            }
            StackItem::Map(Rc::new(RefCell::new(map)))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitives_serialize() {
        assert_eq!(stack_item_to_json(&StackItem::Null).unwrap(), Value::Null);
        assert_eq!(
            stack_item_to_json(&StackItem::from_bool(true)).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            stack_item_to_json(&StackItem::from_int(42)).unwrap(),
            serde_json::json!(42)
        );
    }

    #[test]
    fn byte_strings_become_base64() {
        let json = stack_item_to_json(&StackItem::from_bytes(vec![1, 2, 3])).unwrap();
        assert_eq!(json, Value::String("AQID".into()));
    }

    #[test]
    fn json_strings_become_utf8_bytes() {
        let item = json_to_stack_item(&serde_json::json!("abc")).unwrap();
        assert_eq!(item.get_bytes().unwrap(), b"abc".to_vec());
    }

    #[test]
    fn unsafe_integers_rejected() {
        let too_big = StackItem::Integer(BigInt::from(MAX_SAFE_INTEGER) + 1);
        assert!(stack_item_to_json(&too_big).is_err());
    }

    #[test]
    fn buffers_rejected() {
        assert!(stack_item_to_json(&StackItem::buffer(vec![1])).is_err());
    }

    #[test]
    fn objects_round_into_maps_preserving_order() {
        let json: Value = serde_json::from_str(r#"{"b":1,"a":2}"#).unwrap();
        let item = json_to_stack_item(&json).unwrap();
        let keys = item.as_map().unwrap().borrow().keys();
        assert_eq!(keys[0].get_bytes().unwrap(), b"b".to_vec());
    }
}
