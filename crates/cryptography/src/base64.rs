//! Base64 (standard alphabet, padded), as exposed to contracts.

use crate::error::{CryptoError, CryptoResult};
use ::base64::Engine;

/// Encodes bytes as standard Base64.
pub fn encode(data: &[u8]) -> String {
    ::base64::engine::general_purpose::STANDARD.encode(data)
}

/// Decodes standard Base64.
pub fn decode(s: &str) -> CryptoResult<Vec<u8>> {
    ::base64::engine::general_purpose::STANDARD
        .decode(s.as_bytes())
        .map_err(|e| CryptoError::invalid_encoding("base64", e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        assert_eq!(encode(&[1, 2, 3]), "AQID");
        assert_eq!(decode("AQID").unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn invalid_input_rejected() {
        assert!(decode("not base64!").is_err());
    }
}
