//! Round-trip laws over composite wire objects.

use neo3_core::{
    Block, Header, OracleResponseCode, Signer, Transaction, TransactionAttribute, UInt160,
    UInt256, Witness, WitnessCondition, WitnessRule, WitnessRuleAction, WitnessScope,
};
use neo3_io::SerializableExt;

fn rich_signer() -> Signer {
    let mut signer = Signer::new(
        UInt160::from_array([0x44; 20]),
        WitnessScope::CALLED_BY_ENTRY
            .combine(WitnessScope::CUSTOM_CONTRACTS)
            .combine(WitnessScope::WITNESS_RULES),
    );
    signer.allowed_contracts = vec![UInt160::zero(), UInt160::from_array([1u8; 20])];
    signer.rules = vec![WitnessRule {
        action: WitnessRuleAction::Deny,
        condition: WitnessCondition::And(vec![
            WitnessCondition::CalledByEntry,
            WitnessCondition::Not(Box::new(WitnessCondition::ScriptHash(UInt160::zero()))),
        ]),
    }];
    signer
}

fn rich_transaction() -> Transaction {
    let mut tx = Transaction::default();
    tx.nonce = 0x01020304;
    tx.system_fee = 12_345_678;
    tx.network_fee = 987_654;
    tx.valid_until_block = 424_242;
    tx.signers = vec![rich_signer()];
    tx.attributes = vec![
        TransactionAttribute::HighPriority,
        TransactionAttribute::OracleResponse {
            id: 7,
            code: OracleResponseCode::Success,
            result: vec![0x7b, 0x7d],
        },
        TransactionAttribute::NotValidBefore { height: 11 },
        TransactionAttribute::Conflicts {
            hash: UInt256::from_array([0xcc; 32]),
        },
    ];
    tx.script = vec![0x12, 0x13, 0x9e, 0x40];
    tx.witnesses = vec![Witness::new(vec![0x0c, 0x01, 0xaa], vec![0x11])];
    tx
}

#[test]
fn transaction_round_trip_preserves_hash_and_size() {
    let tx = rich_transaction();
    let bytes = tx.to_array();
    assert_eq!(bytes.len(), tx.size());

    let restored: Transaction = SerializableExt::from_array(&bytes).unwrap();
    assert_eq!(restored.hash(), tx.hash());
    assert_eq!(restored.to_array(), bytes);
    assert_eq!(restored.signers[0].rules, tx.signers[0].rules);
}

#[test]
fn transaction_hash_is_stable_across_runs() {
    let a = rich_transaction();
    let b = rich_transaction();
    assert_eq!(a.hash(), b.hash());
    // And equals hash256 of the unsigned form.
    let expected = neo3_cryptography::hash::hash256(&a.unsigned_bytes());
    assert_eq!(a.hash().as_bytes(), &expected);
}

#[test]
fn block_round_trip_with_transactions() {
    let tx = rich_transaction();
    let mut header = Header::default();
    header.prev_hash = UInt256::from_array([5u8; 32]);
    header.timestamp = 1_700_000_000_000;
    header.nonce = 42;
    header.index = 3;
    header.primary_index = 1;
    header.next_consensus = UInt160::from_array([9u8; 20]);
    header.witness = Witness::new(vec![1, 2], vec![3]);
    header.merkle_root = Block::merkle_root_from(std::slice::from_ref(&tx));

    let block = Block {
        header,
        transactions: vec![tx],
    };
    assert!(block.check_structure().is_ok());

    let bytes = block.to_array();
    assert_eq!(bytes.len(), block.size());
    let restored: Block = SerializableExt::from_array(&bytes).unwrap();
    assert_eq!(restored.hash(), block.hash());
    assert_eq!(restored.transactions.len(), 1);
    assert_eq!(restored.compute_merkle_root(), block.header.merkle_root);
}

#[test]
fn single_transaction_merkle_root_is_its_hash() {
    let tx = rich_transaction();
    assert_eq!(
        Block::merkle_root_from(std::slice::from_ref(&tx)),
        tx.hash()
    );
    assert!(Block::merkle_root_from(&[]).is_zero());
}

#[test]
fn truncated_transaction_is_rejected() {
    let bytes = rich_transaction().to_array();
    for cut in [1, bytes.len() / 2, bytes.len() - 1] {
        assert!(
            <Transaction as SerializableExt>::from_array(&bytes[..cut]).is_err(),
            "cut at {cut}"
        );
    }
}

#[test]
fn address_round_trip_via_base58check() {
    let hash = UInt160::from_array([0x17; 20]);
    let address = hash.to_address(0x35);
    assert_eq!(UInt160::from_address(&address, 0x35).unwrap(), hash);

    // A flipped character breaks the checksum.
    let mut corrupted = address.into_bytes();
    corrupted[3] = if corrupted[3] == b'1' { b'2' } else { b'1' };
    let corrupted = String::from_utf8(corrupted).unwrap();
    assert!(UInt160::from_address(&corrupted, 0x35).is_err());
}
