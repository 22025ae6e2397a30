//! Compressed secp256r1 public-key points.

use crate::error::{CryptoError, CryptoResult};
use std::cmp::Ordering;
use std::fmt;

/// Size of a compressed point encoding in bytes.
pub const EC_POINT_SIZE: usize = 33;

/// A validated, compressed secp256r1 public key.
///
/// Committee members, candidates and multi-signature participants are all
/// identified by values of this type. Ordering compares the X coordinate
/// first and the Y parity second, which is the order validator lists are
/// sorted in.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ECPoint {
    bytes: [u8; EC_POINT_SIZE],
}

impl ECPoint {
    /// Parses and validates a compressed point.
    pub fn from_bytes(data: &[u8]) -> CryptoResult<Self> {
        if data.len() != EC_POINT_SIZE {
            return Err(CryptoError::invalid_encoding(
                "ec-point",
                format!("expected {EC_POINT_SIZE} bytes, got {}", data.len()),
            ));
        }
        if data[0] != 0x02 && data[0] != 0x03 {
            return Err(CryptoError::invalid_encoding(
                "ec-point",
                format!("invalid compression prefix 0x{:02x}", data[0]),
            ));
        }
        // Validate the point is actually on the curve.
        p256::PublicKey::from_sec1_bytes(data)
            .map_err(|e| CryptoError::invalid_encoding("ec-point", e.to_string()))?;

        let mut bytes = [0u8; EC_POINT_SIZE];
        bytes.copy_from_slice(data);
        Ok(Self { bytes })
    }

    /// Parses a point from its hex form.
    pub fn from_hex(s: &str) -> CryptoResult<Self> {
        let data =
            hex::decode(s).map_err(|e| CryptoError::invalid_encoding("ec-point", e.to_string()))?;
        Self::from_bytes(&data)
    }

    /// The compressed encoding.
    pub fn as_bytes(&self) -> &[u8; EC_POINT_SIZE] {
        &self.bytes
    }

    /// The compressed encoding as a slice.
    pub fn to_vec(&self) -> Vec<u8> {
        self.bytes.to_vec()
    }

    /// Hex form of the compressed encoding.
    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    fn x_coordinate(&self) -> &[u8] {
        &self.bytes[1..]
    }

    fn y_parity(&self) -> u8 {
        self.bytes[0]
    }
}

impl Ord for ECPoint {
    fn cmp(&self, other: &Self) -> Ordering {
        self.x_coordinate()
            .cmp(other.x_coordinate())
            .then_with(|| self.y_parity().cmp(&other.y_parity()))
    }
}

impl PartialOrd for ECPoint {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl serde::Serialize for ECPoint {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> serde::Deserialize<'de> for ECPoint {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ECPoint::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

impl fmt::Debug for ECPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ECPoint({})", self.to_hex())
    }
}

impl fmt::Display for ECPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Generator point of secp256r1, compressed.
    const GENERATOR: &str = "036b17d1f2e12c4247f8bce6e563a440f277037d812deb33a0f4a13945d898c296";

    #[test]
    fn parses_valid_point() {
        let point = ECPoint::from_hex(GENERATOR).unwrap();
        assert_eq!(point.to_hex(), GENERATOR);
    }

    #[test]
    fn rejects_bad_prefix() {
        let mut bytes = hex::decode(GENERATOR).unwrap();
        bytes[0] = 0x05;
        assert!(ECPoint::from_bytes(&bytes).is_err());
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(ECPoint::from_bytes(&[0x02; 32]).is_err());
    }

    #[test]
    fn ordering_is_by_x_then_parity() {
        let even = {
            let mut b = hex::decode(GENERATOR).unwrap();
            b[0] = 0x02;
            b
        };
        let odd = {
            let mut b = hex::decode(GENERATOR).unwrap();
            b[0] = 0x03;
            b
        };
        // Same X: the even-parity encoding sorts first. Construct without
        // validation only if both are valid points; parity flip of a valid
        // point is always valid.
        let p_even = ECPoint::from_bytes(&even).unwrap();
        let p_odd = ECPoint::from_bytes(&odd).unwrap();
        assert!(p_even < p_odd);
    }
}
