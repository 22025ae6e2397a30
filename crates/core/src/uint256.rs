//! Implementation of UInt256, the block and transaction hash type.

use crate::{CoreError, CoreResult};
use neo3_config::HASH_SIZE;
use neo3_io::{BinaryWriter, IoResult, MemoryReader, Serializable};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// A 256-bit value stored as little-endian bytes.
///
/// Identifies blocks, transactions and assets. Same conventions as
/// [`crate::UInt160`]: little-endian storage and wire form, big-endian
/// `0x`-prefixed display, lexicographic ordering over the stored bytes.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UInt256([u8; HASH_SIZE]);

impl UInt256 {
    /// The all-zero value.
    pub fn zero() -> Self {
        Self::default()
    }

    /// Whether every byte is zero.
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }

    /// Wraps a little-endian byte array.
    pub fn from_array(bytes: [u8; HASH_SIZE]) -> Self {
        Self(bytes)
    }

    /// Copies a little-endian byte slice, which must be exactly 32 bytes.
    pub fn from_bytes(bytes: &[u8]) -> CoreResult<Self> {
        if bytes.len() != HASH_SIZE {
            return Err(CoreError::invalid_format(format!(
                "UInt256 requires {HASH_SIZE} bytes, got {}",
                bytes.len()
            )));
        }
        let mut value = [0u8; HASH_SIZE];
        value.copy_from_slice(bytes);
        Ok(Self(value))
    }

    /// The little-endian bytes.
    pub fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }

    /// The little-endian bytes as a vector.
    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }

    /// Parses the `0x`-prefixed big-endian hex form.
    pub fn from_hex(s: &str) -> CoreResult<Self> {
        let stripped = s.strip_prefix("0x").unwrap_or(s);
        let mut bytes = hex::decode(stripped)
            .map_err(|e| CoreError::invalid_format(format!("invalid hex: {e}")))?;
        if bytes.len() != HASH_SIZE {
            return Err(CoreError::invalid_format(format!(
                "UInt256 hex must encode {HASH_SIZE} bytes, got {}",
                bytes.len()
            )));
        }
        bytes.reverse();
        Self::from_bytes(&bytes)
    }

    /// The `0x`-prefixed big-endian hex form.
    pub fn to_hex(&self) -> String {
        let mut reversed = self.0;
        reversed.reverse();
        format!("0x{}", hex::encode(reversed))
    }
}

impl Ord for UInt256 {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl PartialOrd for UInt256 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Serializable for UInt256 {
    fn size(&self) -> usize {
        HASH_SIZE
    }

    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_bytes(&self.0);
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        Ok(Self(reader.read_fixed::<HASH_SIZE>()?))
    }
}

impl FromStr for UInt256 {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        Self::from_hex(s)
    }
}

impl fmt::Debug for UInt256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UInt256({})", self.to_hex())
    }
}

impl fmt::Display for UInt256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_default() {
        assert!(UInt256::zero().is_zero());
        assert_eq!(UInt256::zero(), UInt256::default());
    }

    #[test]
    fn hex_round_trip() {
        let hex = "0x2222222222222222222222222222222222222222222222222222222222222221";
        let value = UInt256::from_hex(hex).unwrap();
        assert_eq!(value.to_hex(), hex);
        assert_eq!(value.as_bytes()[0], 0x21);
    }

    #[test]
    fn from_bytes_rejects_wrong_length() {
        assert!(UInt256::from_bytes(&[0u8; 31]).is_err());
        assert!(UInt256::from_bytes(&[0u8; 33]).is_err());
    }
}
