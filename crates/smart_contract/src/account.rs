//! Standard account scripts: single-signature and multi-signature
//! verification contracts.

use crate::{ContractError, ContractResult};
use neo3_core::UInt160;
use neo3_cryptography::{hash, ECPoint};
use neo3_vm::{OpCode, ScriptBuilder};

/// Builds the verification script of a single-signature account.
pub fn create_signature_redeem_script(public_key: &ECPoint) -> Vec<u8> {
    let mut builder = ScriptBuilder::new();
    builder
        .emit_push_bytes(public_key.as_bytes())
        .expect("33-byte push");
    builder.emit_syscall(crate::interop::hash_of("System.Crypto.CheckSig"));
    builder.to_array()
}

/// Script hash of a single-signature account.
pub fn create_signature_contract_hash(public_key: &ECPoint) -> UInt160 {
    UInt160::from_array(hash::hash160(&create_signature_redeem_script(public_key)))
}

/// Builds the verification script of an m-of-n multi-signature account.
/// Keys are sorted into canonical order first.
pub fn create_multisig_redeem_script(
    m: usize,
    public_keys: &[ECPoint],
) -> ContractResult<Vec<u8>> {
    let n = public_keys.len();
    if m == 0 || m > n || n > 1024 {
        return Err(ContractError::invalid_argument(format!(
            "invalid multisig shape {m}-of-{n}"
        )));
    }
    let mut sorted = public_keys.to_vec();
    sorted.sort();

    let mut builder = ScriptBuilder::new();
    builder.emit_push_int(m as i64).expect("small int");
    for key in &sorted {
        builder.emit_push_bytes(key.as_bytes()).expect("33-byte push");
    }
    builder.emit_push_int(n as i64).expect("small int");
    builder.emit_syscall(crate::interop::hash_of("System.Crypto.CheckMultisig"));
    Ok(builder.to_array())
}

/// Script hash of an m-of-n multi-signature account.
pub fn create_multisig_contract_hash(
    m: usize,
    public_keys: &[ECPoint],
) -> ContractResult<UInt160> {
    Ok(UInt160::from_array(hash::hash160(
        &create_multisig_redeem_script(m, public_keys)?,
    )))
}

/// Whether a script has the exact shape of a single-signature contract.
pub fn is_signature_contract(script: &[u8]) -> bool {
    script.len() == 40
        && script[0] == OpCode::PUSHDATA1.as_byte()
        && script[1] == 33
        && script[35] == OpCode::SYSCALL.as_byte()
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "036b17d1f2e12c4247f8bce6e563a440f277037d812deb33a0f4a13945d898c296";

    #[test]
    fn signature_script_shape() {
        let key = ECPoint::from_hex(KEY).unwrap();
        let script = create_signature_redeem_script(&key);
        assert_eq!(script.len(), 40);
        assert!(is_signature_contract(&script));
    }

    #[test]
    fn multisig_rejects_bad_shapes() {
        let key = ECPoint::from_hex(KEY).unwrap();
        assert!(create_multisig_redeem_script(0, &[key]).is_err());
        assert!(create_multisig_redeem_script(2, &[key]).is_err());
    }

    #[test]
    fn multisig_hash_is_order_independent() {
        // A single key either way; sorting makes ordering canonical.
        let key = ECPoint::from_hex(KEY).unwrap();
        let a = create_multisig_contract_hash(1, &[key]).unwrap();
        let b = create_multisig_contract_hash(1, &[key]).unwrap();
        assert_eq!(a, b);
    }
}
