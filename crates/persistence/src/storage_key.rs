//! Storage keys: (contract id, key bytes) pairs.

use neo3_io::{BinaryWriter, IoError, IoResult, MemoryReader, Serializable};
use std::cmp::Ordering;
use std::fmt;

/// Key of one contract storage row.
///
/// The raw form is the contract id as 4 big-endian bytes followed by the
/// contract-chosen key, so iterating the raw keyspace by prefix yields
/// exactly one contract's rows, contiguously. Ordering matches the raw-byte
/// lexicographic order (negative native ids therefore sort after user
/// contracts, the same way they do on disk).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct StorageKey {
    /// Contract id; negative for native contracts.
    pub id: i32,
    /// Contract-defined key bytes.
    pub key: Vec<u8>,
}

impl StorageKey {
    /// Creates a key from a contract id and raw key bytes.
    pub fn new(id: i32, key: Vec<u8>) -> Self {
        Self { id, key }
    }

    /// A key that is just a one-byte prefix under a contract.
    pub fn from_prefix(id: i32, prefix: u8) -> Self {
        Self::new(id, vec![prefix])
    }

    /// Appends raw bytes to the key.
    pub fn with_bytes(mut self, suffix: &[u8]) -> Self {
        self.key.extend_from_slice(suffix);
        self
    }

    /// Appends a big-endian u32, keeping numeric iteration order.
    pub fn with_u32_be(mut self, value: u32) -> Self {
        self.key.extend_from_slice(&value.to_be_bytes());
        self
    }

    /// The raw form: big-endian id followed by the key bytes.
    pub fn to_array(&self) -> Vec<u8> {
        let mut raw = Vec::with_capacity(4 + self.key.len());
        raw.extend_from_slice(&self.id.to_be_bytes());
        raw.extend_from_slice(&self.key);
        raw
    }

    /// Parses the raw form.
    pub fn from_raw(raw: &[u8]) -> IoResult<Self> {
        if raw.len() < 4 {
            return Err(IoError::InvalidFormat {
                context: "storage-key",
                reason: format!("raw key of {} bytes is too short", raw.len()),
            });
        }
        let mut id_bytes = [0u8; 4];
        id_bytes.copy_from_slice(&raw[..4]);
        Ok(Self {
            id: i32::from_be_bytes(id_bytes),
            key: raw[4..].to_vec(),
        })
    }

    /// The raw prefix that selects every row of a contract.
    pub fn contract_prefix(id: i32) -> Vec<u8> {
        id.to_be_bytes().to_vec()
    }
}

impl Ord for StorageKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id
            .to_be_bytes()
            .cmp(&other.id.to_be_bytes())
            .then_with(|| self.key.cmp(&other.key))
    }
}

impl PartialOrd for StorageKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Serializable for StorageKey {
    fn size(&self) -> usize {
        4 + self.key.len()
    }

    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_bytes(&self.id.to_be_bytes());
        writer.write_bytes(&self.key);
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        let mut id_bytes = [0u8; 4];
        id_bytes.copy_from_slice(&reader.read_bytes(4)?);
        let key = reader.read_bytes(reader.remaining())?;
        Ok(Self {
            id: i32::from_be_bytes(id_bytes),
            key,
        })
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.id, hex_lower(&self.key))
    }
}

fn hex_lower(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_form_round_trips() {
        let key = StorageKey::from_prefix(-5, 0x14).with_bytes(&[1, 2, 3]);
        let raw = key.to_array();
        assert_eq!(StorageKey::from_raw(&raw).unwrap(), key);
        assert_eq!(&raw[..4], &(-5i32).to_be_bytes());
    }

    #[test]
    fn ordering_matches_raw_bytes() {
        let user = StorageKey::from_prefix(1, 0x00);
        let native = StorageKey::from_prefix(-1, 0x00);
        // Raw big-endian bytes of -1 are 0xffffffff, which sort last.
        assert!(user < native);
        assert_eq!(
            user.cmp(&native),
            user.to_array().cmp(&native.to_array())
        );
    }

    #[test]
    fn numeric_suffixes_keep_iteration_order() {
        let a = StorageKey::from_prefix(3, 0x0c).with_u32_be(1);
        let b = StorageKey::from_prefix(3, 0x0c).with_u32_be(300);
        assert!(a < b);
    }
}
