//! System.Crypto.* handlers.

use crate::application_engine::{ApplicationEngine, ScriptContainer};
use crate::{ContractError, ContractResult};
use neo3_cryptography::ecdsa::{verify_signature, Curve};
use neo3_vm::StackItem;

/// Price of one signature check, also the unit of CheckMultisig pricing.
pub const CHECK_SIG_PRICE: i64 = 1 << 15;

fn sign_data(engine: &ApplicationEngine) -> ContractResult<Vec<u8>> {
    let network = engine.settings().network;
    match engine.container() {
        Some(ScriptContainer::Transaction(tx)) => Ok(tx.sign_data(network)),
        Some(ScriptContainer::Block(block)) => Ok(block.header.sign_data(network)),
        None => Err(ContractError::invalid_operation("no signable container")),
    }
}

pub fn check_sig(engine: &mut ApplicationEngine) -> ContractResult<()> {
    let public_key = engine.vm_mut().pop_bytes()?;
    let signature = engine.vm_mut().pop_bytes()?;
    let message = sign_data(engine)?;
    let valid = verify_signature(&message, &signature, &public_key, Curve::Secp256r1);
    engine.vm_mut().push(StackItem::from_bool(valid))?;
    Ok(())
}

/// Consumes the classic multisig layout left by the redeem script and its
/// invocation script: `sig_1..sig_m, m, key_1..key_n, n` with `n` on top.
pub fn check_multisig(engine: &mut ApplicationEngine) -> ContractResult<()> {
    let n: usize = engine
        .vm_mut()
        .pop_integer()?
        .try_into()
        .map_err(|_| ContractError::invalid_argument("key count"))?;
    if n == 0 || n > 1024 {
        return Err(ContractError::invalid_argument("key count out of range"));
    }
    let mut keys = Vec::with_capacity(n);
    for _ in 0..n {
        keys.push(engine.vm_mut().pop_bytes()?);
    }
    keys.reverse();

    let m: usize = engine
        .vm_mut()
        .pop_integer()?
        .try_into()
        .map_err(|_| ContractError::invalid_argument("signature threshold"))?;
    if m == 0 || m > n {
        return Err(ContractError::invalid_argument(format!(
            "invalid multisig shape {m}-of-{n}"
        )));
    }
    let mut signatures = Vec::with_capacity(m);
    for _ in 0..m {
        signatures.push(engine.vm_mut().pop_bytes()?);
    }
    signatures.reverse();
    // Each provided signature is charged like a CheckSig.
    engine.add_exec_fee(CHECK_SIG_PRICE * keys.len() as i64)?;

    let message = sign_data(engine)?;
    // Signatures must match keys in order; a mismatch advances the key
    // cursor, running out of keys fails the check.
    let mut key_index = 0;
    let mut sig_index = 0;
    while sig_index < signatures.len() && key_index < keys.len() {
        if verify_signature(
            &message,
            &signatures[sig_index],
            &keys[key_index],
            Curve::Secp256r1,
        ) {
            sig_index += 1;
        }
        key_index += 1;
        if signatures.len() - sig_index > keys.len() - key_index {
            break;
        }
    }
    engine
        .vm_mut()
        .push(StackItem::from_bool(sig_index == signatures.len()))?;
    Ok(())
}
