//! ECDSA signature verification over the curves Neo scripts may request.

use p256::ecdsa::signature::Verifier;

/// Elliptic curves accepted by the verification interop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Curve {
    /// secp256r1 (P-256), the curve behind Neo accounts.
    Secp256r1,
    /// secp256k1, accepted by CryptoLib for cross-chain verification.
    Secp256k1,
}

/// Verifies a 64-byte `r || s` signature over `message`.
///
/// The message is hashed with SHA-256 as part of verification. Any malformed
/// key, malformed signature or failed check returns `false`; this function
/// has no error channel.
pub fn verify_signature(message: &[u8], signature: &[u8], public_key: &[u8], curve: Curve) -> bool {
    match curve {
        Curve::Secp256r1 => verify_p256(message, signature, public_key),
        Curve::Secp256k1 => verify_k256(message, signature, public_key),
    }
}

fn verify_p256(message: &[u8], signature: &[u8], public_key: &[u8]) -> bool {
    let Ok(key) = p256::ecdsa::VerifyingKey::from_sec1_bytes(public_key) else {
        return false;
    };
    let Ok(sig) = p256::ecdsa::Signature::from_slice(signature) else {
        return false;
    };
    key.verify(message, &sig).is_ok()
}

fn verify_k256(message: &[u8], signature: &[u8], public_key: &[u8]) -> bool {
    let Ok(key) = k256::ecdsa::VerifyingKey::from_sec1_bytes(public_key) else {
        return false;
    };
    let Ok(sig) = k256::ecdsa::Signature::from_slice(signature) else {
        return false;
    };
    key.verify(message, &sig).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use p256::ecdsa::signature::Signer;

    #[test]
    fn p256_round_trip() {
        let signing = p256::ecdsa::SigningKey::from_slice(&[0x11; 32]).unwrap();
        let verifying = signing.verifying_key();
        let pubkey = verifying.to_sec1_bytes();
        let message = b"block data";
        let signature: p256::ecdsa::Signature = signing.sign(message);
        let sig_bytes = signature.to_bytes();

        assert!(verify_signature(
            message,
            sig_bytes.as_slice(),
            &pubkey,
            Curve::Secp256r1
        ));
        assert!(!verify_signature(
            b"other data",
            sig_bytes.as_slice(),
            &pubkey,
            Curve::Secp256r1
        ));
    }

    #[test]
    fn garbage_inputs_verify_false() {
        assert!(!verify_signature(b"m", &[0u8; 64], &[0u8; 33], Curve::Secp256r1));
        assert!(!verify_signature(b"m", &[], &[], Curve::Secp256k1));
    }
}
