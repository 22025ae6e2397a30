//! Storage items: the raw values of contract storage rows.

use neo3_io::{BinaryWriter, IoResult, MemoryReader, Serializable, SerializableExt};
use num_bigint::{BigInt, Sign};
use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

/// The value of one storage row.
///
/// Values are opaque bytes on disk (no framing). Native contracts keep a
/// decoded ("interoperable") form cached next to the bytes; the cache is
/// dropped whenever the raw value is replaced.
#[derive(Debug, Default)]
pub struct StorageItem {
    value: Vec<u8>,
    cache: RefCell<Option<Rc<dyn Any>>>,
}

impl StorageItem {
    /// Creates an item from raw bytes.
    pub fn new(value: Vec<u8>) -> Self {
        Self {
            value,
            cache: RefCell::new(None),
        }
    }

    /// Creates an item holding an integer in the VM's minimal encoding.
    pub fn from_int(value: impl Into<BigInt>) -> Self {
        Self::new(encode_int(&value.into()))
    }

    /// The raw bytes.
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// Replaces the raw bytes, invalidating any cached decoded form.
    pub fn set_value(&mut self, value: Vec<u8>) {
        self.value = value;
        self.cache.replace(None);
    }

    /// Decodes the value as an integer (minimal two's-complement LE).
    pub fn as_int(&self) -> BigInt {
        decode_int(&self.value)
    }

    /// Stores an integer in the minimal encoding.
    pub fn set_int(&mut self, value: impl Into<BigInt>) {
        self.set_value(encode_int(&value.into()));
    }

    /// Adds `delta` to the stored integer value.
    pub fn add_int(&mut self, delta: &BigInt) {
        let updated = self.as_int() + delta;
        self.set_int(updated);
    }

    /// Returns the decoded form, deserializing and caching it on first use.
    pub fn get_interoperable<T>(&self) -> IoResult<Rc<T>>
    where
        T: Serializable + 'static,
    {
        if let Some(cached) = self.cache.borrow().as_ref() {
            if let Ok(typed) = Rc::clone(cached).downcast::<T>() {
                return Ok(typed);
            }
        }
        let decoded = Rc::new(T::from_array(&self.value)?);
        self.cache.replace(Some(decoded.clone()));
        Ok(decoded)
    }

    /// Replaces both the decoded form and the raw bytes.
    pub fn set_interoperable<T>(&mut self, value: T)
    where
        T: Serializable + 'static,
    {
        self.value = value.to_array();
        self.cache.replace(Some(Rc::new(value)));
    }
}

impl Clone for StorageItem {
    fn clone(&self) -> Self {
        // The cached decoded form is shared; it describes the same bytes.
        Self {
            value: self.value.clone(),
            cache: RefCell::new(self.cache.borrow().clone()),
        }
    }
}

impl PartialEq for StorageItem {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl Eq for StorageItem {}

impl Serializable for StorageItem {
    fn size(&self) -> usize {
        self.value.len()
    }

    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_bytes(&self.value);
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        let value = reader.read_bytes(reader.remaining())?;
        Ok(Self::new(value))
    }
}

/// Encodes an integer as minimal two's-complement little-endian bytes, the
/// same codec the VM uses for `Integer` stack items.
pub(crate) fn encode_int(value: &BigInt) -> Vec<u8> {
    if value.sign() == Sign::NoSign {
        return Vec::new();
    }
    value.to_signed_bytes_le()
}

/// Decodes minimal two's-complement little-endian bytes; empty means zero.
pub(crate) fn decode_int(bytes: &[u8]) -> BigInt {
    if bytes.is_empty() {
        BigInt::from(0)
    } else {
        BigInt::from_signed_bytes_le(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_codec_is_minimal() {
        assert!(StorageItem::from_int(0).value().is_empty());
        assert_eq!(StorageItem::from_int(1).value(), &[0x01]);
        assert_eq!(StorageItem::from_int(-1).value(), &[0xff]);
        assert_eq!(StorageItem::from_int(255).value(), &[0xff, 0x00]);
    }

    #[test]
    fn int_round_trip() {
        for value in [0i64, 1, -1, 127, 128, -128, 255, 65535, -65536, i64::MAX] {
            let item = StorageItem::from_int(value);
            assert_eq!(item.as_int(), BigInt::from(value), "value {value}");
        }
    }

    #[test]
    fn add_int_accumulates() {
        let mut item = StorageItem::from_int(10);
        item.add_int(&BigInt::from(-3));
        assert_eq!(item.as_int(), BigInt::from(7));
    }

    #[test]
    fn set_value_drops_cache() {
        #[derive(Clone, Debug, PartialEq)]
        struct Marker(u32);
        impl Serializable for Marker {
            fn size(&self) -> usize {
                4
            }
            fn serialize(&self, writer: &mut BinaryWriter) {
                writer.write_u32(self.0);
            }
            fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
                Ok(Marker(reader.read_u32()?))
            }
        }

        let mut item = StorageItem::new(vec![]);
        item.set_interoperable(Marker(7));
        assert_eq!(item.get_interoperable::<Marker>().unwrap().0, 7);

        item.set_value(Marker(9).to_array());
        assert_eq!(item.get_interoperable::<Marker>().unwrap().0, 9);
    }
}
