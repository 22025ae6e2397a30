//! Base58 and Base58Check encoding.
//!
//! Uses the Bitcoin alphabet via the `bs58` crate; the Check variant appends
//! the first four bytes of a double SHA-256 checksum.

use crate::error::{CryptoError, CryptoResult};
use crate::hash;

/// Encodes bytes as plain Base58.
pub fn encode(data: &[u8]) -> String {
    bs58::encode(data).into_string()
}

/// Decodes plain Base58.
pub fn decode(s: &str) -> CryptoResult<Vec<u8>> {
    bs58::decode(s)
        .into_vec()
        .map_err(|e| CryptoError::invalid_encoding("base58", e.to_string()))
}

/// Encodes bytes with the 4-byte hash256 checksum appended.
pub fn encode_check(data: &[u8]) -> String {
    let checksum = hash::hash256(data);
    let mut buffer = Vec::with_capacity(data.len() + 4);
    buffer.extend_from_slice(data);
    buffer.extend_from_slice(&checksum[..4]);
    bs58::encode(buffer).into_string()
}

/// Decodes a Base58Check string, always verifying the checksum.
pub fn decode_check(s: &str) -> CryptoResult<Vec<u8>> {
    let decoded = decode(s)?;
    if decoded.len() < 4 {
        return Err(CryptoError::invalid_encoding(
            "base58check",
            "shorter than the checksum",
        ));
    }
    let (data, checksum) = decoded.split_at(decoded.len() - 4);
    let expected = hash::hash256(data);
    if checksum != &expected[..4] {
        return Err(CryptoError::ChecksumMismatch);
    }
    Ok(data.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_round_trip() {
        let data = [0x35, 0xde, 0xad, 0xbe, 0xef];
        let encoded = encode_check(&data);
        assert_eq!(decode_check(&encoded).unwrap(), data);
    }

    #[test]
    fn corrupted_checksum_rejected() {
        let mut encoded = encode_check(b"payload").into_bytes();
        let last = encoded.last_mut().unwrap();
        *last = if *last == b'1' { b'2' } else { b'1' };
        let corrupted = String::from_utf8(encoded).unwrap();
        assert_eq!(
            decode_check(&corrupted).unwrap_err(),
            CryptoError::ChecksumMismatch
        );
    }

    #[test]
    fn too_short_rejected() {
        assert!(decode_check("1").is_err());
    }
}
