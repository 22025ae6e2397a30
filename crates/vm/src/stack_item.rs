//! Stack items: the value universe of the VM.
//!
//! Compound items (Array, Struct, Map) and Buffers share by reference:
//! cloning a `StackItem` clones the handle, not the contents. Equality
//! follows the network rules — primitives compare by their byte spans,
//! Buffers, Arrays and Maps by identity, Structs deeply under a comparison
//! budget.

use crate::error::{VmError, VmResult};
use num_bigint::{BigInt, Sign};
use num_traits::Zero;
use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Default maximum byte width of an Integer item; the starting value of
/// `ExecutionEngineLimits::max_integer_size`. Engines consult their
/// configured limit, not this constant.
pub const MAX_INTEGER_SIZE: usize = 32;

/// Shared mutable element list of an Array or Struct.
pub type ArrayRef = Rc<RefCell<Vec<StackItem>>>;

/// Shared mutable byte contents of a Buffer.
pub type BufferRef = Rc<RefCell<Vec<u8>>>;

/// Shared mutable contents of a Map.
pub type MapRef = Rc<RefCell<OrderedMap>>;

/// Type tags, also used as the CONVERT operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StackItemType {
    /// The type of Null and the wildcard parameter type.
    Any = 0x00,
    /// An instruction pointer.
    Pointer = 0x10,
    /// A boolean.
    Boolean = 0x20,
    /// An arbitrary-precision integer.
    Integer = 0x21,
    /// Immutable bytes.
    ByteString = 0x28,
    /// Mutable bytes.
    Buffer = 0x30,
    /// A reference-shared item list.
    Array = 0x40,
    /// A value-compared item list.
    Struct = 0x41,
    /// An insertion-ordered key-value collection.
    Map = 0x48,
    /// An opaque host object.
    InteropInterface = 0x60,
}

impl StackItemType {
    /// Decodes a type byte.
    pub fn from_byte(value: u8) -> Option<Self> {
        Some(match value {
            0x00 => Self::Any,
            0x10 => Self::Pointer,
            0x20 => Self::Boolean,
            0x21 => Self::Integer,
            0x28 => Self::ByteString,
            0x30 => Self::Buffer,
            0x40 => Self::Array,
            0x41 => Self::Struct,
            0x48 => Self::Map,
            0x60 => Self::InteropInterface,
            _ => return None,
        })
    }

    /// Whether values of this type may key a Map.
    pub fn is_primitive(self) -> bool {
        matches!(self, Self::Boolean | Self::Integer | Self::ByteString)
    }
}

/// A value on the evaluation stack.
#[derive(Clone)]
pub enum StackItem {
    /// The null value.
    Null,
    /// A boolean.
    Boolean(bool),
    /// An arbitrary-precision integer; reads are bounded by the engine's
    /// configured integer width.
    Integer(BigInt),
    /// Immutable bytes; cheap to clone, may be interned.
    ByteString(Rc<Vec<u8>>),
    /// Mutable bytes shared by reference.
    Buffer(BufferRef),
    /// An array shared by reference.
    Array(ArrayRef),
    /// A struct: same storage as Array, value-compared and copied on assign.
    Struct(ArrayRef),
    /// An insertion-ordered map shared by reference.
    Map(MapRef),
    /// An instruction pointer within the current script.
    Pointer(usize),
    /// An opaque host object (iterators, BLS points).
    InteropInterface(Rc<dyn Any>),
}

impl StackItem {
    /// The null singleton.
    pub fn null() -> Self {
        StackItem::Null
    }

    /// A boolean item.
    pub fn from_bool(value: bool) -> Self {
        StackItem::Boolean(value)
    }

    /// An integer item.
    pub fn from_int(value: impl Into<BigInt>) -> Self {
        StackItem::Integer(value.into())
    }

    /// An immutable byte-string item.
    pub fn from_bytes(value: impl Into<Vec<u8>>) -> Self {
        StackItem::ByteString(Rc::new(value.into()))
    }

    /// A mutable buffer item.
    pub fn buffer(value: Vec<u8>) -> Self {
        StackItem::Buffer(Rc::new(RefCell::new(value)))
    }

    /// An interop wrapper around a host object.
    pub fn interop(value: Rc<dyn Any>) -> Self {
        StackItem::InteropInterface(value)
    }

    /// The type tag.
    pub fn item_type(&self) -> StackItemType {
        match self {
            StackItem::Null => StackItemType::Any,
            StackItem::Boolean(_) => StackItemType::Boolean,
            StackItem::Integer(_) => StackItemType::Integer,
            StackItem::ByteString(_) => StackItemType::ByteString,
            StackItem::Buffer(_) => StackItemType::Buffer,
            StackItem::Array(_) => StackItemType::Array,
            StackItem::Struct(_) => StackItemType::Struct,
            StackItem::Map(_) => StackItemType::Map,
            StackItem::Pointer(_) => StackItemType::Pointer,
            StackItem::InteropInterface(_) => StackItemType::InteropInterface,
        }
    }

    /// Whether this is the null value.
    pub fn is_null(&self) -> bool {
        matches!(self, StackItem::Null)
    }

    /// Truthiness. `max_integer_size` bounds the byte strings a boolean may
    /// be read from.
    pub fn get_boolean(&self, max_integer_size: usize) -> VmResult<bool> {
        match self {
            StackItem::Null => Ok(false),
            StackItem::Boolean(value) => Ok(*value),
            StackItem::Integer(value) => Ok(!value.is_zero()),
            StackItem::ByteString(bytes) => {
                if bytes.len() > max_integer_size {
                    return Err(VmError::invalid_cast("byte string too long for boolean"));
                }
                Ok(bytes.iter().any(|&b| b != 0))
            }
            StackItem::Buffer(_)
            | StackItem::Array(_)
            | StackItem::Struct(_)
            | StackItem::Map(_)
            | StackItem::Pointer(_)
            | StackItem::InteropInterface(_) => Ok(true),
        }
    }

    /// Numeric value; fails on non-numeric types and on encodings wider
    /// than `max_integer_size` bytes.
    pub fn get_integer(&self, max_integer_size: usize) -> VmResult<BigInt> {
        match self {
            StackItem::Boolean(value) => Ok(BigInt::from(i32::from(*value))),
            StackItem::Integer(value) => Ok(value.clone()),
            StackItem::ByteString(bytes) => decode_integer(bytes, max_integer_size),
            StackItem::Buffer(bytes) => decode_integer(&bytes.borrow(), max_integer_size),
            other => Err(VmError::invalid_cast(format!(
                "{:?} cannot be read as an integer",
                other.item_type()
            ))),
        }
    }

    /// Byte span; fails on non-byte-representable types.
    pub fn get_bytes(&self) -> VmResult<Vec<u8>> {
        match self {
            StackItem::Boolean(value) => Ok(vec![u8::from(*value)]),
            StackItem::Integer(value) => Ok(encode_integer(value)),
            StackItem::ByteString(bytes) => Ok(bytes.as_ref().clone()),
            StackItem::Buffer(bytes) => Ok(bytes.borrow().clone()),
            other => Err(VmError::invalid_cast(format!(
                "{:?} cannot be read as bytes",
                other.item_type()
            ))),
        }
    }

    /// The array handle of an Array or Struct.
    pub fn as_array(&self) -> VmResult<&ArrayRef> {
        match self {
            StackItem::Array(items) | StackItem::Struct(items) => Ok(items),
            other => Err(VmError::invalid_cast(format!(
                "{:?} is not an array",
                other.item_type()
            ))),
        }
    }

    /// The map handle of a Map.
    pub fn as_map(&self) -> VmResult<&MapRef> {
        match self {
            StackItem::Map(map) => Ok(map),
            other => Err(VmError::invalid_cast(format!(
                "{:?} is not a map",
                other.item_type()
            ))),
        }
    }

    /// Downcasts an interop wrapper.
    pub fn as_interop<T: 'static>(&self) -> VmResult<Rc<T>> {
        match self {
            StackItem::InteropInterface(value) => Rc::clone(value)
                .downcast::<T>()
                .map_err(|_| VmError::invalid_cast("interop interface of unexpected type")),
            other => Err(VmError::invalid_cast(format!(
                "{:?} is not an interop interface",
                other.item_type()
            ))),
        }
    }

    /// Number of child references this item contributes to a compound:
    /// map entries count both key and value.
    pub(crate) fn nested_reference_count(&self) -> usize {
        match self {
            StackItem::Array(items) | StackItem::Struct(items) => items.borrow().len(),
            StackItem::Map(map) => map.borrow().len() * 2,
            _ => 0,
        }
    }

    /// Network equality (the EQUAL opcode).
    pub fn equals(&self, other: &StackItem, max_comparable_size: usize) -> VmResult<bool> {
        let mut budget = max_comparable_size;
        self.equals_bounded(other, &mut budget)
    }

    fn equals_bounded(&self, other: &StackItem, budget: &mut usize) -> VmResult<bool> {
        if *budget == 0 {
            return Err(VmError::limit("comparison budget exhausted"));
        }
        *budget -= 1;

        match (self, other) {
            (StackItem::Null, StackItem::Null) => Ok(true),
            (StackItem::Null, _) | (_, StackItem::Null) => Ok(false),
            (StackItem::Pointer(a), StackItem::Pointer(b)) => Ok(a == b),
            (StackItem::Buffer(a), StackItem::Buffer(b)) => Ok(Rc::ptr_eq(a, b)),
            (StackItem::Array(a), StackItem::Array(b)) => Ok(Rc::ptr_eq(a, b)),
            (StackItem::Map(a), StackItem::Map(b)) => Ok(Rc::ptr_eq(a, b)),
            (StackItem::InteropInterface(a), StackItem::InteropInterface(b)) => {
                Ok(std::ptr::eq(
                    Rc::as_ptr(a) as *const u8,
                    Rc::as_ptr(b) as *const u8,
                ))
            }
            (StackItem::Struct(a), StackItem::Struct(b)) => {
                if Rc::ptr_eq(a, b) {
                    return Ok(true);
                }
                let left = a.borrow();
                let right = b.borrow();
                if left.len() != right.len() {
                    return Ok(false);
                }
                for (x, y) in left.iter().zip(right.iter()) {
                    if !x.equals_bounded(y, budget)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            _ => {
                // Primitives compare by byte span, across primitive types.
                if self.item_type().is_primitive() && other.item_type().is_primitive() {
                    let a = self.get_bytes()?;
                    let b = other.get_bytes()?;
                    if a.len() > *budget || b.len() > *budget {
                        return Err(VmError::limit("comparison budget exhausted"));
                    }
                    *budget -= a.len().min(b.len());
                    Ok(a == b)
                } else {
                    Ok(false)
                }
            }
        }
    }

    /// The CONVERT opcode: type conversion with information-loss rejection.
    /// `max_integer_size` bounds the numeric conversions.
    pub fn convert_to(&self, target: StackItemType, max_integer_size: usize) -> VmResult<StackItem> {
        if self.item_type() == target {
            return Ok(self.clone());
        }
        match target {
            StackItemType::Boolean => Ok(StackItem::Boolean(self.get_boolean(max_integer_size)?)),
            StackItemType::Integer => {
                let value = self.get_integer(max_integer_size)?;
                Ok(StackItem::Integer(value))
            }
            StackItemType::ByteString => Ok(StackItem::from_bytes(self.get_bytes()?)),
            StackItemType::Buffer => Ok(StackItem::buffer(self.get_bytes()?)),
            StackItemType::Array => match self {
                StackItem::Struct(items) => {
                    Ok(StackItem::Array(Rc::new(RefCell::new(items.borrow().clone()))))
                }
                _ => Err(self.cast_error(target)),
            },
            StackItemType::Struct => match self {
                StackItem::Array(items) => {
                    Ok(StackItem::Struct(Rc::new(RefCell::new(items.borrow().clone()))))
                }
                _ => Err(self.cast_error(target)),
            },
            _ => Err(self.cast_error(target)),
        }
    }

    fn cast_error(&self, target: StackItemType) -> VmError {
        VmError::invalid_cast(format!(
            "cannot convert {:?} to {:?}",
            self.item_type(),
            target
        ))
    }

    /// Recursive copy preserving aliasing within the copied graph.
    pub fn deep_copy(&self) -> StackItem {
        let mut seen: Vec<(*const u8, StackItem)> = Vec::new();
        self.deep_copy_inner(&mut seen)
    }

    fn deep_copy_inner(&self, seen: &mut Vec<(*const u8, StackItem)>) -> StackItem {
        match self {
            StackItem::Array(items) | StackItem::Struct(items) => {
                let key = Rc::as_ptr(items) as *const u8;
                if let Some((_, copy)) = seen.iter().find(|(p, _)| *p == key) {
                    return copy.clone();
                }
                let target: ArrayRef = Rc::new(RefCell::new(Vec::new()));
                let copy = match self {
                    StackItem::Struct(_) => StackItem::Struct(Rc::clone(&target)),
                    _ => StackItem::Array(Rc::clone(&target)),
                };
                seen.push((key, copy.clone()));
                let children: Vec<StackItem> = items
                    .borrow()
                    .iter()
                    .map(|child| child.deep_copy_inner(seen))
                    .collect();
                *target.borrow_mut() = children;
                copy
            }
            StackItem::Map(map) => {
                let key = Rc::as_ptr(map) as *const u8;
                if let Some((_, copy)) = seen.iter().find(|(p, _)| *p == key) {
                    return copy.clone();
                }
                let target: MapRef = Rc::new(RefCell::new(OrderedMap::new()));
                let copy = StackItem::Map(Rc::clone(&target));
                seen.push((key, copy.clone()));
                let copied: Vec<(StackItem, StackItem)> = map
                    .borrow()
                    .entries()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.deep_copy_inner(seen)))
                    .collect();
                let mut inner = target.borrow_mut();
                for (k, v) in copied {
                    let _ = inner.insert(k, v);
                }
                copy
            }
            StackItem::Buffer(bytes) => StackItem::buffer(bytes.borrow().clone()),
            other => other.clone(),
        }
    }
}

fn decode_integer(bytes: &[u8], max_integer_size: usize) -> VmResult<BigInt> {
    if bytes.len() > max_integer_size {
        return Err(VmError::invalid_cast(format!(
            "{}-byte value exceeds the {max_integer_size}-byte integer width",
            bytes.len()
        )));
    }
    if bytes.is_empty() {
        Ok(BigInt::zero())
    } else {
        Ok(BigInt::from_signed_bytes_le(bytes))
    }
}

/// Minimal two's-complement little-endian encoding; zero is empty.
pub fn encode_integer(value: &BigInt) -> Vec<u8> {
    if value.sign() == Sign::NoSign {
        Vec::new()
    } else {
        value.to_signed_bytes_le()
    }
}

impl fmt::Debug for StackItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StackItem::Null => write!(f, "Null"),
            StackItem::Boolean(v) => write!(f, "Boolean({v})"),
            StackItem::Integer(v) => write!(f, "Integer({v})"),
            StackItem::ByteString(v) => write!(f, "ByteString(0x{})", hex::encode(v.as_slice())),
            StackItem::Buffer(v) => write!(f, "Buffer(0x{})", hex::encode(v.borrow().as_slice())),
            StackItem::Array(v) => write!(f, "Array(len {})", v.borrow().len()),
            StackItem::Struct(v) => write!(f, "Struct(len {})", v.borrow().len()),
            StackItem::Map(v) => write!(f, "Map(len {})", v.borrow().len()),
            StackItem::Pointer(p) => write!(f, "Pointer({p})"),
            StackItem::InteropInterface(_) => write!(f, "InteropInterface"),
        }
    }
}

/// Insertion-ordered map with primitive keys.
#[derive(Default)]
pub struct OrderedMap {
    entries: Vec<(StackItem, StackItem)>,
}

impl OrderedMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The entries in insertion order.
    pub fn entries(&self) -> &[(StackItem, StackItem)] {
        &self.entries
    }

    fn position(&self, key: &StackItem) -> VmResult<Option<usize>> {
        let key_bytes = Self::key_bytes(key)?;
        for (index, (existing, _)) in self.entries.iter().enumerate() {
            if Self::key_bytes(existing)? == key_bytes {
                return Ok(Some(index));
            }
        }
        Ok(None)
    }

    fn key_bytes(key: &StackItem) -> VmResult<Vec<u8>> {
        if !key.item_type().is_primitive() {
            return Err(VmError::invalid_operation(
                "map keys must be Boolean, Integer or ByteString",
            ));
        }
        key.get_bytes()
    }

    /// Looks up a value.
    pub fn get(&self, key: &StackItem) -> VmResult<Option<StackItem>> {
        Ok(self.position(key)?.map(|i| self.entries[i].1.clone()))
    }

    /// Whether a key exists.
    pub fn contains_key(&self, key: &StackItem) -> VmResult<bool> {
        Ok(self.position(key)?.is_some())
    }

    /// Inserts or replaces; replacement keeps the original position.
    /// Returns the replaced value.
    pub fn insert(&mut self, key: StackItem, value: StackItem) -> VmResult<Option<StackItem>> {
        match self.position(&key)? {
            Some(index) => {
                let old = std::mem::replace(&mut self.entries[index].1, value);
                Ok(Some(old))
            }
            None => {
                Self::key_bytes(&key)?;
                self.entries.push((key, value));
                Ok(None)
            }
        }
    }

    /// Removes an entry, preserving the order of the rest.
    /// Returns the removed pair.
    pub fn remove(&mut self, key: &StackItem) -> VmResult<Option<(StackItem, StackItem)>> {
        match self.position(key)? {
            Some(index) => Ok(Some(self.entries.remove(index))),
            None => Ok(None),
        }
    }

    /// Drains all entries.
    pub fn clear(&mut self) -> Vec<(StackItem, StackItem)> {
        std::mem::take(&mut self.entries)
    }

    /// The keys in insertion order.
    pub fn keys(&self) -> Vec<StackItem> {
        self.entries.iter().map(|(k, _)| k.clone()).collect()
    }

    /// The values in insertion order.
    pub fn values(&self) -> Vec<StackItem> {
        self.entries.iter().map(|(_, v)| v.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_codec_is_minimal_twos_complement() {
        assert!(encode_integer(&BigInt::zero()).is_empty());
        assert_eq!(encode_integer(&BigInt::from(127)), vec![0x7f]);
        assert_eq!(encode_integer(&BigInt::from(128)), vec![0x80, 0x00]);
        assert_eq!(encode_integer(&BigInt::from(-1)), vec![0xff]);
    }

    #[test]
    fn primitives_compare_across_types() {
        let one_int = StackItem::from_int(1);
        let one_bool = StackItem::from_bool(true);
        let one_bytes = StackItem::from_bytes(vec![1]);
        assert!(one_int.equals(&one_bool, 1024).unwrap());
        assert!(one_int.equals(&one_bytes, 1024).unwrap());
        assert!(!one_int.equals(&StackItem::from_int(2), 1024).unwrap());
    }

    #[test]
    fn arrays_compare_by_reference_structs_by_value() {
        let a = StackItem::Array(Rc::new(RefCell::new(vec![StackItem::from_int(1)])));
        let b = StackItem::Array(Rc::new(RefCell::new(vec![StackItem::from_int(1)])));
        assert!(!a.equals(&b, 1024).unwrap());
        assert!(a.equals(&a.clone(), 1024).unwrap());

        let s1 = StackItem::Struct(Rc::new(RefCell::new(vec![StackItem::from_int(1)])));
        let s2 = StackItem::Struct(Rc::new(RefCell::new(vec![StackItem::from_int(1)])));
        assert!(s1.equals(&s2, 1024).unwrap());
    }

    #[test]
    fn convert_array_to_struct_shares_items() {
        let inner = Rc::new(RefCell::new(vec![StackItem::from_int(5)]));
        let array = StackItem::Array(Rc::clone(&inner));
        let converted = array.convert_to(StackItemType::Struct, MAX_INTEGER_SIZE).unwrap();
        match converted {
            StackItem::Struct(items) => {
                assert!(items.borrow()[0].equals(&StackItem::from_int(5), 64).unwrap());
            }
            other => panic!("expected struct, got {other:?}"),
        }
    }

    #[test]
    fn map_conversion_is_rejected() {
        let map = StackItem::Map(Rc::new(RefCell::new(OrderedMap::new())));
        assert!(map.convert_to(StackItemType::Array, MAX_INTEGER_SIZE).is_err());
        assert!(map.convert_to(StackItemType::ByteString, MAX_INTEGER_SIZE).is_err());
    }

    #[test]
    fn ordered_map_preserves_insertion_order() {
        let mut map = OrderedMap::new();
        map.insert(StackItem::from_int(2), StackItem::from_bytes(vec![2]))
            .unwrap();
        map.insert(StackItem::from_int(1), StackItem::from_bytes(vec![1]))
            .unwrap();
        // Replacement keeps position.
        map.insert(StackItem::from_int(2), StackItem::from_bytes(vec![9]))
            .unwrap();
        let keys: Vec<BigInt> = map.keys().iter().map(|k| k.get_integer(MAX_INTEGER_SIZE).unwrap()).collect();
        assert_eq!(keys, vec![BigInt::from(2), BigInt::from(1)]);
    }

    #[test]
    fn map_rejects_compound_keys() {
        let mut map = OrderedMap::new();
        let key = StackItem::Array(Rc::new(RefCell::new(vec![])));
        assert!(map.insert(key, StackItem::Null).is_err());
    }

    #[test]
    fn deep_copy_preserves_aliasing_and_cycles() {
        let shared = Rc::new(RefCell::new(vec![StackItem::from_int(1)]));
        let outer = Rc::new(RefCell::new(vec![
            StackItem::Array(Rc::clone(&shared)),
            StackItem::Array(Rc::clone(&shared)),
        ]));
        // Make it cyclic.
        outer
            .borrow_mut()
            .push(StackItem::Array(Rc::clone(&outer)));

        let copy = StackItem::Array(Rc::clone(&outer)).deep_copy();
        let copy_ref = copy.as_array().unwrap();
        let items = copy_ref.borrow();
        // The two copies of `shared` alias each other but not the original.
        let first = items[0].as_array().unwrap();
        let second = items[1].as_array().unwrap();
        assert!(Rc::ptr_eq(first, second));
        assert!(!Rc::ptr_eq(first, &shared));
        // The cycle points back to the copy, not the original.
        let cycle = items[2].as_array().unwrap();
        assert!(Rc::ptr_eq(cycle, copy_ref));
    }

    #[test]
    fn oversize_bytestring_to_integer_fails() {
        let item = StackItem::from_bytes(vec![1u8; MAX_INTEGER_SIZE + 1]);
        assert!(item.get_integer(MAX_INTEGER_SIZE).is_err());
    }
}
