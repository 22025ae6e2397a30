//! Serialization trait for Neo wire objects.

use crate::{BinaryWriter, IoResult, MemoryReader};

/// Objects with a canonical Neo binary form.
///
/// `serialize` is infallible: every well-formed value has a binary form and
/// the writer cannot run out of space. All validation lives in `deserialize`.
pub trait Serializable {
    /// Exact serialized size in bytes.
    fn size(&self) -> usize;

    /// Writes the canonical binary form.
    fn serialize(&self, writer: &mut BinaryWriter);

    /// Reads and validates one value.
    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self>
    where
        Self: Sized;
}

/// Convenience conversions between objects and byte arrays.
pub trait SerializableExt: Serializable {
    /// Serializes to a fresh byte vector.
    fn to_array(&self) -> Vec<u8> {
        let mut writer = BinaryWriter::with_capacity(self.size());
        self.serialize(&mut writer);
        writer.into_bytes()
    }

    /// Deserializes from a byte slice, requiring all input to be consumed.
    fn from_array(data: &[u8]) -> IoResult<Self>
    where
        Self: Sized,
    {
        let mut reader = MemoryReader::new(data);
        let value = Self::deserialize(&mut reader)?;
        if !reader.is_eof() {
            return Err(crate::IoError::InvalidFormat {
                context: "from_array",
                reason: format!("{} trailing byte(s)", reader.remaining()),
            });
        }
        Ok(value)
    }
}

impl<T: Serializable> SerializableExt for T {}

/// Free helpers shared by composite serializers.
pub mod helper {
    use super::Serializable;

    /// Size of the shortest var-int encoding of `value`.
    pub fn get_var_size(value: u64) -> usize {
        if value < 0xfd {
            1
        } else if value <= u16::MAX as u64 {
            3
        } else if value <= u32::MAX as u64 {
            5
        } else {
            9
        }
    }

    /// Serialized size of a var-bytes field.
    pub fn get_var_bytes_size(bytes: &[u8]) -> usize {
        get_var_size(bytes.len() as u64) + bytes.len()
    }

    /// Serialized size of a var-int-prefixed list.
    pub fn get_array_size<T: Serializable>(items: &[T]) -> usize {
        get_var_size(items.len() as u64) + items.iter().map(Serializable::size).sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BinaryWriter, IoResult, MemoryReader, SerializableExt};

    #[derive(Debug, PartialEq)]
    struct Probe {
        value: u32,
    }

    impl Serializable for Probe {
        fn size(&self) -> usize {
            4
        }

        fn serialize(&self, writer: &mut BinaryWriter) {
            writer.write_u32(self.value);
        }

        fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
            Ok(Probe {
                value: reader.read_u32()?,
            })
        }
    }

    #[test]
    fn round_trip() {
        let original = Probe { value: 0x12345678 };
        let restored = Probe::from_array(&original.to_array()).unwrap();
        assert_eq!(original, restored);
    }

    #[test]
    fn from_array_rejects_trailing_bytes() {
        let mut bytes = Probe { value: 1 }.to_array();
        bytes.push(0);
        assert!(Probe::from_array(&bytes).is_err());
    }

    #[test]
    fn var_size_boundaries() {
        assert_eq!(helper::get_var_size(0xfc), 1);
        assert_eq!(helper::get_var_size(0xfd), 3);
        assert_eq!(helper::get_var_size(0x10000), 5);
        assert_eq!(helper::get_var_size(0x1_0000_0000), 9);
    }
}
