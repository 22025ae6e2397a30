//! Implementation of UInt160, the script-hash / account identifier.

use crate::{CoreError, CoreResult};
use neo3_config::ADDRESS_SIZE;
use neo3_cryptography::base58;
use neo3_io::{BinaryWriter, IoResult, MemoryReader, Serializable};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// A 160-bit value stored as little-endian bytes.
///
/// Used as script hashes and account identifiers. Display and hex parsing use
/// the on-chain convention of a `0x`-prefixed big-endian string, while the
/// in-memory and wire layouts are little-endian. Ordering is lexicographic
/// over the little-endian bytes.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UInt160([u8; ADDRESS_SIZE]);

impl UInt160 {
    /// The all-zero value.
    pub fn zero() -> Self {
        Self::default()
    }

    /// Whether every byte is zero.
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }

    /// Wraps a little-endian byte array.
    pub fn from_array(bytes: [u8; ADDRESS_SIZE]) -> Self {
        Self(bytes)
    }

    /// Copies a little-endian byte slice, which must be exactly 20 bytes.
    pub fn from_bytes(bytes: &[u8]) -> CoreResult<Self> {
        if bytes.len() != ADDRESS_SIZE {
            return Err(CoreError::invalid_format(format!(
                "UInt160 requires {ADDRESS_SIZE} bytes, got {}",
                bytes.len()
            )));
        }
        let mut value = [0u8; ADDRESS_SIZE];
        value.copy_from_slice(bytes);
        Ok(Self(value))
    }

    /// The little-endian bytes.
    pub fn as_bytes(&self) -> &[u8; ADDRESS_SIZE] {
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
        if bytes.len() != ADDRESS_SIZE {
            return Err(CoreError::invalid_format(format!(
                "UInt160 hex must encode {ADDRESS_SIZE} bytes, got {}",
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

    /// Encodes the script hash as a Base58Check address.
    pub fn to_address(&self, address_version: u8) -> String {
        let mut data = Vec::with_capacity(1 + ADDRESS_SIZE);
        data.push(address_version);
        data.extend_from_slice(&self.0);
        base58::encode_check(&data)
    }

    /// Decodes a Base58Check address, checking the version byte.
    pub fn from_address(address: &str, address_version: u8) -> CoreResult<Self> {
        let data = base58::decode_check(address)?;
        if data.len() != 1 + ADDRESS_SIZE {
            return Err(CoreError::invalid_format(format!(
                "address payload must be {} bytes, got {}",
                1 + ADDRESS_SIZE,
                data.len()
            )));
        }
        if data[0] != address_version {
            return Err(CoreError::invalid_format(format!(
                "address version 0x{:02x} does not match expected 0x{address_version:02x}",
                data[0]
            )));
        }
        Self::from_bytes(&data[1..])
    }
}

impl Ord for UInt160 {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl PartialOrd for UInt160 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Serializable for UInt160 {
    fn size(&self) -> usize {
        ADDRESS_SIZE
    }

    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_bytes(&self.0);
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        Ok(Self(reader.read_fixed::<ADDRESS_SIZE>()?))
    }
}

impl FromStr for UInt160 {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        Self::from_hex(s)
    }
}

impl fmt::Debug for UInt160 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UInt160({})", self.to_hex())
    }
}

impl fmt::Display for UInt160 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use neo3_io::SerializableExt;

    #[test]
    fn hex_round_trip_reverses_bytes() {
        let value = UInt160::from_hex("0x0102030405060708090a0b0c0d0e0f1011121314").unwrap();
        // Display is big-endian, storage is little-endian.
        assert_eq!(value.as_bytes()[0], 0x14);
        assert_eq!(
            value.to_hex(),
            "0x0102030405060708090a0b0c0d0e0f1011121314"
        );
    }

    #[test]
    fn serialization_round_trip() {
        let value = UInt160::from_array([7u8; ADDRESS_SIZE]);
        let restored: UInt160 = SerializableExt::from_array(&value.to_array()).unwrap();
        assert_eq!(restored, value);
    }

    #[test]
    fn address_round_trip() {
        let value = UInt160::from_array([0xab; ADDRESS_SIZE]);
        let address = value.to_address(0x35);
        assert_eq!(UInt160::from_address(&address, 0x35).unwrap(), value);
        assert!(UInt160::from_address(&address, 0x36).is_err());
    }

    #[test]
    fn ordering_is_over_little_endian_bytes() {
        let mut low = [0u8; ADDRESS_SIZE];
        let mut high = [0u8; ADDRESS_SIZE];
        low[0] = 1;
        high[0] = 2;
        assert!(UInt160::from_array(low) < UInt160::from_array(high));
    }
}
