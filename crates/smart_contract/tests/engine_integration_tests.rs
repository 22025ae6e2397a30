//! Application-engine integration: deploy a contract, drive its storage
//! through the interop layer, and observe gas and notifications.

use neo3_config::{ProtocolSettings, GAS_FACTOR};
use neo3_core::{Signer, Transaction, UInt160};
use neo3_persistence::{DataCache, MemoryStore, Store};
use neo3_smart_contract::manifest::{ContractManifest, ContractMethodDescriptor};
use neo3_smart_contract::native::native_hash;
use neo3_smart_contract::{
    get_contract_hash, interop, ApplicationEngine, NefFile, ScriptContainer, TriggerType,
};
use neo3_vm::stack_item::MAX_INTEGER_SIZE;
use neo3_vm::{OpCode, ScriptBuilder, VMState};
use std::rc::Rc;
use std::sync::Arc;

fn settings() -> Arc<ProtocolSettings> {
    Arc::new(ProtocolSettings::default())
}

fn container() -> (ScriptContainer, UInt160) {
    let mut tx = Transaction::default();
    tx.valid_until_block = 100;
    tx.signers = vec![Signer::called_by_entry(UInt160::from_array([0xdd; 20]))];
    tx.script = vec![OpCode::PUSH1.as_byte()];
    let sender = tx.sender();
    (ScriptContainer::Transaction(Rc::new(tx)), sender)
}

/// The probe contract: Put(0x01 -> 0xAA), read it back, Delete, read again,
/// return [second_get, first_get].
fn probe_script() -> Vec<u8> {
    let mut b = ScriptBuilder::new();
    // Put
    b.emit_push_bytes(&[0xaa]).unwrap(); // value
    b.emit_push_bytes(&[0x01]).unwrap(); // key
    b.emit_syscall(interop::hash_of("System.Storage.GetContext"));
    b.emit_syscall(interop::hash_of("System.Storage.Put"));
    // Get -> 0xAA
    b.emit_push_bytes(&[0x01]).unwrap();
    b.emit_syscall(interop::hash_of("System.Storage.GetContext"));
    b.emit_syscall(interop::hash_of("System.Storage.Get"));
    // Delete
    b.emit_push_bytes(&[0x01]).unwrap();
    b.emit_syscall(interop::hash_of("System.Storage.GetContext"));
    b.emit_syscall(interop::hash_of("System.Storage.Delete"));
    // Get -> Null
    b.emit_push_bytes(&[0x01]).unwrap();
    b.emit_syscall(interop::hash_of("System.Storage.GetContext"));
    b.emit_syscall(interop::hash_of("System.Storage.Get"));
    // [second, first]
    b.emit_push_int(2).unwrap();
    b.emit(OpCode::PACK);
    b.emit(OpCode::RET);
    b.to_array()
}

fn probe_nef_and_manifest() -> (NefFile, ContractManifest) {
    let nef = NefFile::new(
        "neo3-test-compiler".into(),
        String::new(),
        Vec::new(),
        probe_script(),
    );
    let mut manifest = ContractManifest::new("StorageProbe");
    manifest.abi.methods = vec![ContractMethodDescriptor {
        name: "run".into(),
        parameters: Vec::new(),
        return_type: "Array".into(),
        offset: 0,
        safe: false,
    }];
    (nef, manifest)
}

fn deploy_script(nef: &NefFile, manifest: &ContractManifest) -> Vec<u8> {
    let nef_bytes = neo3_io::SerializableExt::to_array(nef);
    let manifest_bytes = manifest.to_json_string().into_bytes();

    let mut b = ScriptBuilder::new();
    // args packed in reverse so args[0] = nef, args[1] = manifest.
    b.emit_push_bytes(&manifest_bytes).unwrap();
    b.emit_push_bytes(&nef_bytes).unwrap();
    b.emit_push_int(2).unwrap();
    b.emit(OpCode::PACK);
    b.emit_push_int(0x0f).unwrap(); // CallFlags::ALL
    b.emit_push_bytes(b"deploy").unwrap();
    b.emit_push_bytes(native_hash("ContractManagement").as_bytes())
        .unwrap();
    b.emit_syscall(interop::hash_of("System.Contract.Call"));
    b.to_array()
}

fn call_script(target: UInt160, method: &str) -> Vec<u8> {
    let mut b = ScriptBuilder::new();
    b.emit_push_int(0).unwrap();
    b.emit(OpCode::PACK); // empty args array
    b.emit_push_int(0x0f).unwrap();
    b.emit_push_bytes(method.as_bytes()).unwrap();
    b.emit_push_bytes(target.as_bytes()).unwrap();
    b.emit_syscall(interop::hash_of("System.Contract.Call"));
    b.to_array()
}

#[test]
fn deploy_then_storage_round_trip() {
    let store = Arc::new(MemoryStore::new()) as Arc<dyn Store>;
    let settings = settings();
    let (tx_container, sender) = container();
    let (nef, manifest) = probe_nef_and_manifest();

    // Deploy in one engine run.
    let mut engine = ApplicationEngine::new(
        TriggerType::Application,
        Some(tx_container.clone()),
        DataCache::new(Arc::clone(&store)),
        Arc::clone(&settings),
        20 * GAS_FACTOR,
    );
    engine
        .load_entry_script(deploy_script(&nef, &manifest), neo3_vm::CallFlags::ALL)
        .unwrap();
    assert_eq!(engine.execute(), VMState::Halt, "{:?}", engine.fault_reason());
    assert!(engine
        .notifications()
        .iter()
        .any(|n| n.event_name == "Deploy"));
    assert!(engine.gas_consumed() >= 10 * GAS_FACTOR, "deploy fee charged");
    let mut root = engine.into_snapshot();

    let contract_hash = get_contract_hash(&sender, nef.checksum, "StorageProbe");

    // Call the probe in a second engine over the committed state.
    let mut engine = ApplicationEngine::new(
        TriggerType::Application,
        Some(tx_container),
        root.clone_cache(),
        Arc::clone(&settings),
        5 * GAS_FACTOR,
    );
    engine
        .load_entry_script(call_script(contract_hash, "run"), neo3_vm::CallFlags::ALL)
        .unwrap();
    assert_eq!(engine.execute(), VMState::Halt, "{:?}", engine.fault_reason());

    let result = engine.vm().result_stack().peek(0).unwrap();
    let items = result.as_array().unwrap().borrow().clone();
    // [second get, first get]: deleted key reads Null, stored key read 0xAA.
    assert!(items[0].is_null());
    assert_eq!(items[1].get_bytes().unwrap(), vec![0xaa]);
    assert!(engine.gas_consumed() > 0);

    // The contract's committed row was deleted again by the script.
    engine
        .into_snapshot()
        .commit_into(&mut root)
        .unwrap();
    let contract = neo3_smart_contract::native::contract_management::get_contract(
        &root,
        &contract_hash,
    )
    .unwrap()
    .expect("deployed contract persists");
    assert_eq!(contract.manifest.name, "StorageProbe");
}

#[test]
fn verification_trigger_rejects_writes() {
    let store = Arc::new(MemoryStore::new()) as Arc<dyn Store>;
    let settings = settings();
    let (tx_container, _) = container();

    // A bare storage write without WriteStates permission must fault.
    let mut b = ScriptBuilder::new();
    b.emit_push_bytes(&[0x01]).unwrap();
    b.emit_push_bytes(&[0x01]).unwrap();
    b.emit_syscall(interop::hash_of("System.Storage.GetContext"));
    b.emit_syscall(interop::hash_of("System.Storage.Put"));

    let mut engine = ApplicationEngine::new(
        TriggerType::Verification,
        Some(tx_container),
        DataCache::new(store),
        settings,
        GAS_FACTOR,
    );
    engine
        .load_entry_script(b.to_array(), neo3_vm::CallFlags::READ_STATES)
        .unwrap();
    assert_eq!(engine.execute(), VMState::Fault);
}

#[test]
fn out_of_gas_faults_mid_script() {
    let store = Arc::new(MemoryStore::new()) as Arc<dyn Store>;
    let settings = settings();
    let (tx_container, _) = container();

    let mut engine = ApplicationEngine::new(
        TriggerType::Application,
        Some(tx_container),
        DataCache::new(store),
        settings,
        10, // ten datoshi will not survive the fee factor
    );
    engine
        .load_entry_script(vec![0x11, 0x12, 0x9e], neo3_vm::CallFlags::ALL)
        .unwrap();
    assert_eq!(engine.execute(), VMState::Fault);
    assert!(matches!(
        engine.fault_reason(),
        Some(neo3_vm::VmError::OutOfGas)
    ));
}

#[test]
fn get_random_is_deterministic_per_container() {
    let store = Arc::new(MemoryStore::new()) as Arc<dyn Store>;
    let settings = settings();
    let (tx_container, _) = container();

    let run = |store: Arc<dyn Store>| {
        let mut engine = ApplicationEngine::new(
            TriggerType::Application,
            Some(tx_container.clone()),
            DataCache::new(store),
            Arc::clone(&settings),
            GAS_FACTOR,
        );
        let mut b = ScriptBuilder::new();
        b.emit_syscall(interop::hash_of("System.Runtime.GetRandom"));
        b.emit_syscall(interop::hash_of("System.Runtime.GetRandom"));
        engine
            .load_entry_script(b.to_array(), neo3_vm::CallFlags::ALL)
            .unwrap();
        assert_eq!(engine.execute(), VMState::Halt);
        (
            engine.vm().result_stack().peek(1).unwrap().get_integer(MAX_INTEGER_SIZE).unwrap(),
            engine.vm().result_stack().peek(0).unwrap().get_integer(MAX_INTEGER_SIZE).unwrap(),
        )
    };

    let first = run(Arc::clone(&store));
    let second = run(store);
    // Same container, same sequence; successive values differ.
    assert_eq!(first, second);
    assert_ne!(first.0, first.1);
}

#[test]
fn notifications_vanish_when_a_called_contract_faults() {
    // A contract that notifies and then aborts: its notification must not
    // survive, while the engine records the fault.
    let store = Arc::new(MemoryStore::new()) as Arc<dyn Store>;
    let settings = settings();
    let (tx_container, sender) = container();

    let mut contract_script = ScriptBuilder::new();
    contract_script.emit_push_int(0).unwrap();
    contract_script.emit(OpCode::PACK);
    contract_script.emit_push_bytes(b"Boom").unwrap();
    contract_script.emit_syscall(interop::hash_of("System.Runtime.Notify"));
    contract_script.emit(OpCode::ABORT);

    let nef = NefFile::new(
        "neo3-test-compiler".into(),
        String::new(),
        Vec::new(),
        contract_script.to_array(),
    );
    let mut manifest = ContractManifest::new("Bomb");
    manifest.abi.methods = vec![ContractMethodDescriptor {
        name: "run".into(),
        parameters: Vec::new(),
        return_type: "Void".into(),
        offset: 0,
        safe: false,
    }];

    let mut engine = ApplicationEngine::new(
        TriggerType::Application,
        Some(tx_container.clone()),
        DataCache::new(Arc::clone(&store)),
        Arc::clone(&settings),
        20 * GAS_FACTOR,
    );
    engine
        .load_entry_script(deploy_script(&nef, &manifest), neo3_vm::CallFlags::ALL)
        .unwrap();
    assert_eq!(engine.execute(), VMState::Halt, "{:?}", engine.fault_reason());
    let root = engine.into_snapshot();

    let bomb_hash = get_contract_hash(&sender, nef.checksum, "Bomb");
    let mut engine = ApplicationEngine::new(
        TriggerType::Application,
        Some(tx_container),
        root.clone_cache(),
        settings,
        5 * GAS_FACTOR,
    );
    engine
        .load_entry_script(call_script(bomb_hash, "run"), neo3_vm::CallFlags::ALL)
        .unwrap();
    assert_eq!(engine.execute(), VMState::Fault);
    // A faulted engine's buffer is never surfaced: the block processor only
    // reads notifications on HALT.
}
