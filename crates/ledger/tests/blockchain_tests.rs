//! End-to-end chain tests: genesis bootstrap, token transfer, gas
//! exhaustion, double application.

use neo3_config::{ProtocolSettings, GAS_FACTOR, NEO_TOTAL_SUPPLY};
use neo3_core::{Block, Header, Signer, Transaction, UInt160, Witness};
use neo3_cryptography::ECPoint;
use neo3_ledger::{Blockchain, LedgerError, VerifyResult};
use neo3_persistence::{MemoryStore, Store};
use neo3_smart_contract::account::create_multisig_redeem_script;
use neo3_smart_contract::native::{gas_token, native_hash, neo_token};
use neo3_smart_contract::{interop, TriggerType};
use neo3_vm::stack_item::MAX_INTEGER_SIZE;
use neo3_vm::{OpCode, ScriptBuilder, VMState};
use num_bigint::BigInt;
use p256::ecdsa::signature::Signer as _;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use std::sync::Arc;

/// Deterministic validator key used across these tests.
fn validator_key() -> p256::ecdsa::SigningKey {
    p256::ecdsa::SigningKey::from_slice(&[0x17u8; 32]).expect("valid key bytes")
}

fn validator_point() -> ECPoint {
    let binding = validator_key().verifying_key().to_encoded_point(true);
    ECPoint::from_bytes(binding.as_bytes()).expect("compressed point")
}

fn settings() -> Arc<ProtocolSettings> {
    let mut settings = ProtocolSettings::default();
    settings.validators_count = 1;
    settings.committee_members_count = 1;
    settings.standby_committee = vec![validator_point().to_hex()];
    Arc::new(settings)
}

fn new_chain() -> (Blockchain, Arc<ProtocolSettings>) {
    let settings = settings();
    let store = Arc::new(MemoryStore::new()) as Arc<dyn Store>;
    let chain = Blockchain::new(store, Arc::clone(&settings)).expect("genesis");
    (chain, settings)
}

fn committee_account(chain: &Blockchain) -> UInt160 {
    neo_token::committee_address(&chain.snapshot()).expect("committee")
}

fn sign_witness(sign_data: Vec<u8>) -> Witness {
    let signature: p256::ecdsa::Signature = validator_key().sign(&sign_data);
    let mut invocation = ScriptBuilder::new();
    invocation
        .emit_push_bytes(signature.to_bytes().as_slice())
        .expect("signature push");
    let verification =
        create_multisig_redeem_script(1, &[validator_point()]).expect("redeem script");
    Witness::new(invocation.to_array(), verification)
}

/// Builds, signs and wraps `script` into a transaction from the committee.
fn committee_transaction(
    chain: &Blockchain,
    settings: &ProtocolSettings,
    script: Vec<u8>,
    system_fee: i64,
) -> Transaction {
    let mut tx = Transaction::default();
    tx.nonce = rand_nonce(&script);
    tx.system_fee = system_fee;
    tx.network_fee = GAS_FACTOR / 10; // 0.1 GAS covers size + verification
    tx.valid_until_block = chain.height() + 100;
    tx.signers = vec![Signer::called_by_entry(committee_account(chain))];
    tx.script = script;
    tx.witnesses = vec![Witness::empty()];
    let witness = sign_witness(tx.sign_data(settings.network));
    tx.witnesses = vec![witness];
    tx
}

/// A deterministic per-script nonce so repeated helpers build distinct txs.
fn rand_nonce(script: &[u8]) -> u32 {
    let digest = neo3_cryptography::hash::sha256(script);
    u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]])
}

fn next_block(chain: &Blockchain, settings: &ProtocolSettings, transactions: Vec<Transaction>) -> Block {
    let mut header = Header::default();
    header.prev_hash = chain.current_hash();
    header.index = chain.height() + 1;
    header.timestamp = 1_468_595_301_000 + u64::from(header.index) * 15_000;
    header.nonce = 7;
    header.primary_index = 0;
    header.next_consensus =
        neo_token::next_consensus_address(&chain.snapshot(), settings.validators_count)
            .expect("consensus address");
    header.merkle_root = Block::merkle_root_from(&transactions);

    let mut block = Block {
        header,
        transactions,
    };
    let witness = sign_witness(block.header.sign_data(settings.network));
    block.header.witness = witness;
    // The witness is excluded from the hash, so re-signing is consistent.
    block
}

#[test]
fn genesis_seeds_token_balances() {
    let (chain, settings) = new_chain();
    assert_eq!(chain.height(), 0);

    let committee = committee_account(&chain);
    let snapshot = chain.snapshot();
    assert_eq!(
        neo_token::balance_of(&snapshot, &committee),
        BigInt::from(NEO_TOTAL_SUPPLY)
    );
    assert_eq!(
        gas_token::balance_of(&snapshot, &committee),
        BigInt::from(settings.initial_gas_distribution)
    );
}

#[test]
fn neo_transfer_moves_balance_and_notifies() {
    let (chain, settings) = new_chain();
    let committee = committee_account(&chain);
    let alice = UInt160::from_array([0xa1; 20]);

    // args packed in reverse so args[0] is `from`.
    let mut builder = ScriptBuilder::new();
    builder.emit_push_null(); // data
    builder.emit_push_int(1).unwrap(); // amount
    builder.emit_push_bytes(alice.as_bytes()).unwrap(); // to
    builder.emit_push_bytes(committee.as_bytes()).unwrap(); // from
    builder.emit_push_int(4).unwrap();
    builder.emit(OpCode::PACK);
    builder.emit_push_int(0x0f).unwrap(); // CallFlags::ALL
    builder.emit_push_bytes(b"transfer").unwrap();
    builder
        .emit_push_bytes(native_hash("NeoToken").as_bytes())
        .unwrap();
    builder.emit_syscall(interop::hash_of("System.Contract.Call"));
    let script = builder.to_array();

    let tx = committee_transaction(&chain, &settings, script, GAS_FACTOR);
    let tx_hash = tx.hash();
    let block = next_block(&chain, &settings, vec![tx]);

    let receipts = chain.process_block(&block).expect("block applies");
    assert_eq!(chain.height(), 1);

    let receipt = receipts
        .iter()
        .find(|r| r.transaction_hash == Some(tx_hash))
        .expect("transaction receipt");
    assert_eq!(receipt.vm_state, VMState::Halt, "{:?}", receipt.exception);
    assert!(receipt.gas_consumed > 0);
    // transfer returned true
    assert!(receipt.stack[0].get_boolean(MAX_INTEGER_SIZE).unwrap());

    let transfer_event = receipt
        .notifications
        .iter()
        .find(|n| n.event_name == "Transfer" && n.script_hash == native_hash("NeoToken"))
        .expect("Transfer notification");
    let state = transfer_event.state.as_array().unwrap().borrow().clone();
    assert_eq!(
        state[2].get_integer(MAX_INTEGER_SIZE).unwrap(),
        BigInt::from(1),
        "transferred amount"
    );

    let snapshot = chain.snapshot();
    assert_eq!(neo_token::balance_of(&snapshot, &alice), BigInt::from(1));
    assert_eq!(
        neo_token::balance_of(&snapshot, &committee),
        BigInt::from(NEO_TOTAL_SUPPLY - 1)
    );
}

#[test]
fn infinite_loop_faults_with_out_of_gas_but_fees_are_charged() {
    let (chain, settings) = new_chain();
    let committee = committee_account(&chain);
    let gas_before = gas_token::balance_of(&chain.snapshot(), &committee);

    // JMP to itself.
    let script = vec![OpCode::JMP.as_byte(), 0x00];
    let system_fee = 1_000_000;
    let tx = committee_transaction(&chain, &settings, script, system_fee);
    let network_fee = tx.network_fee;
    let block = next_block(&chain, &settings, vec![tx]);

    let receipts = chain.process_block(&block).expect("block applies");
    let receipt = receipts
        .iter()
        .find(|r| r.transaction_hash.is_some())
        .expect("transaction receipt");
    assert_eq!(receipt.vm_state, VMState::Fault);
    assert!(receipt
        .exception
        .as_deref()
        .unwrap_or_default()
        .contains("gas"));
    assert!(receipt.notifications.is_empty());

    // Fees are deducted even though the transaction faulted. Rewards go to
    // the validator's signature account, so the committee multisig balance
    // drops by exactly the fees.
    let gas_after = gas_token::balance_of(&chain.snapshot(), &committee);
    let fees = BigInt::from(system_fee + network_fee);
    assert_eq!(gas_after, gas_before - fees);
}

#[test]
fn wrong_prev_hash_is_rejected_without_state_change() {
    let (chain, settings) = new_chain();
    let mut block = next_block(&chain, &settings, Vec::new());
    block.header.prev_hash = neo3_core::UInt256::from_array([9u8; 32]);
    // Re-sign after mutation.
    let witness = sign_witness(block.header.sign_data(settings.network));
    block.header.witness = witness;

    match chain.process_block(&block) {
        Err(LedgerError::Validation(reason)) => {
            assert_eq!(reason, VerifyResult::ChainMismatch);
        }
        other => panic!("expected validation failure, got {other:?}"),
    }
    assert_eq!(chain.height(), 0);
}

#[test]
fn stale_timestamp_is_rejected() {
    let (chain, settings) = new_chain();
    let mut block = next_block(&chain, &settings, Vec::new());
    block.header.timestamp = 1; // before genesis
    let witness = sign_witness(block.header.sign_data(settings.network));
    block.header.witness = witness;

    assert!(matches!(
        chain.process_block(&block),
        Err(LedgerError::Validation(VerifyResult::InvalidTimestamp))
    ));
}

#[test]
fn empty_blocks_advance_the_chain_and_pay_rewards() {
    let (chain, settings) = new_chain();
    // Per-block committee rewards land on the member's signature account.
    let member =
        neo3_smart_contract::account::create_signature_contract_hash(&validator_point());
    let gas_before = gas_token::balance_of(&chain.snapshot(), &member);

    for _ in 0..3 {
        let block = next_block(&chain, &settings, Vec::new());
        let receipts = chain.process_block(&block).expect("empty block applies");
        assert!(receipts
            .iter()
            .any(|r| r.trigger == TriggerType::OnPersist));
        assert!(receipts
            .iter()
            .any(|r| r.trigger == TriggerType::PostPersist));
    }
    assert_eq!(chain.height(), 3);

    // Committee rewards accrued: 10% of 5 GAS per block.
    let gas_after = gas_token::balance_of(&chain.snapshot(), &member);
    assert_eq!(
        gas_after - gas_before,
        BigInt::from(3i64 * 5 * GAS_FACTOR / 10)
    );
}

#[test]
fn transaction_enters_mempool_after_verification() {
    let (chain, settings) = new_chain();
    let script = vec![OpCode::PUSH1.as_byte()];
    let tx = committee_transaction(&chain, &settings, script, 1_000_000);
    let hash = tx.hash();

    assert_eq!(chain.add_transaction(tx.clone()), VerifyResult::Succeed);
    assert!(chain.mempool().contains(&hash));
    assert_eq!(chain.add_transaction(tx), VerifyResult::AlreadyExists);

    // Once mined, the pool forgets it.
    let pooled = chain.mempool().take_for_block(10);
    assert_eq!(pooled.len(), 1);
    let block = next_block(&chain, &settings, vec![(*pooled[0]).clone()]);
    chain.process_block(&block).expect("block applies");
    assert!(chain.mempool().is_empty());
}

#[test]
fn unsigned_transaction_is_rejected() {
    let (chain, settings) = new_chain();
    let mut tx = Transaction::default();
    tx.system_fee = 1_000_000;
    tx.network_fee = GAS_FACTOR / 10;
    tx.valid_until_block = 100;
    tx.signers = vec![Signer::called_by_entry(committee_account(&chain))];
    tx.script = vec![OpCode::PUSH1.as_byte()];
    // A bogus witness: right script, wrong signature bytes.
    let mut invocation = ScriptBuilder::new();
    invocation.emit_push_bytes(&[0u8; 64]).unwrap();
    tx.witnesses = vec![Witness::new(
        invocation.to_array(),
        create_multisig_redeem_script(1, &[validator_point()]).unwrap(),
    )];
    let _ = settings;

    assert_eq!(
        chain.add_transaction(tx),
        VerifyResult::InvalidSignature
    );
}
