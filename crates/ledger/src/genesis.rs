//! Genesis block construction.

use crate::{LedgerError, LedgerResult};
use neo3_config::ProtocolSettings;
use neo3_core::{Block, Header, Witness};
use neo3_cryptography::ECPoint;
use neo3_smart_contract::account::create_multisig_contract_hash;
use neo3_vm::OpCode;

/// Fixed genesis timestamp: 2016-07-15T15:08:21 UTC, in milliseconds.
const GENESIS_TIMESTAMP_MS: u64 = 1_468_595_301_000;

/// Fixed genesis nonce.
const GENESIS_NONCE: u64 = 2_083_236_893;

/// Builds the deterministic genesis block for the given settings.
pub fn create_genesis_block(settings: &ProtocolSettings) -> LedgerResult<Block> {
    let mut validators = Vec::with_capacity(settings.validators_count);
    for hex in settings.standby_validators() {
        validators.push(
            ECPoint::from_hex(hex)
                .map_err(|e| LedgerError::fatal(format!("standby committee: {e}")))?,
        );
    }
    if validators.is_empty() {
        return Err(LedgerError::fatal("no standby validators configured"));
    }
    let m = validators.len() - (validators.len() - 1) / 3;
    let next_consensus = create_multisig_contract_hash(m, &validators)
        .map_err(|e| LedgerError::fatal(format!("genesis consensus address: {e}")))?;

    let mut header = Header::default();
    header.timestamp = GENESIS_TIMESTAMP_MS;
    header.nonce = GENESIS_NONCE;
    header.next_consensus = next_consensus;
    // The genesis witness is the trivial always-true script.
    header.witness = Witness::new(Vec::new(), vec![OpCode::PUSH1.as_byte()]);

    Ok(Block {
        header,
        transactions: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings_with_committee() -> ProtocolSettings {
        let mut settings = ProtocolSettings::default();
        settings.validators_count = 1;
        settings.committee_members_count = 1;
        settings.standby_committee = vec![
            "036b17d1f2e12c4247f8bce6e563a440f277037d812deb33a0f4a13945d898c296".into(),
        ];
        settings
    }

    #[test]
    fn genesis_is_deterministic() {
        let settings = settings_with_committee();
        let a = create_genesis_block(&settings).unwrap();
        let b = create_genesis_block(&settings).unwrap();
        assert_eq!(a.hash(), b.hash());
        assert_eq!(a.index(), 0);
        assert!(a.header.prev_hash.is_zero());
        assert!(a.transactions.is_empty());
    }

    #[test]
    fn genesis_requires_validators() {
        let settings = ProtocolSettings::default();
        assert!(create_genesis_block(&settings).is_err());
    }
}
