//! The ContractManagement native: deploy, update and destroy contracts.

use super::{arg_bytes, arg_item, check_committee, NativeContract, NativeMethod};
use crate::application_engine::{ApplicationEngine, ScriptContainer};
use crate::contract_state::{check_deployment, get_contract_hash, ContractState, NefFile};
use crate::manifest::ContractManifest;
use crate::{ContractError, ContractResult};
use neo3_config::GAS_FACTOR;
use neo3_core::UInt160;
use neo3_io::SerializableExt;
use neo3_persistence::{DataCache, SeekDirection, StorageItem, StorageKey};
use neo3_vm::StackItem;
use std::cell::RefCell;
use std::rc::Rc;

/// Reserved storage id.
pub const ID: i32 = -1;

const PREFIX_CONTRACT: u8 = 8;
const PREFIX_CONTRACT_HASH: u8 = 12;
const PREFIX_NEXT_AVAILABLE_ID: u8 = 15;
const PREFIX_MINIMUM_DEPLOYMENT_FEE: u8 = 20;

const DEFAULT_MINIMUM_DEPLOYMENT_FEE: i64 = 10 * GAS_FACTOR;

fn contract_key(hash: &UInt160) -> StorageKey {
    StorageKey::from_prefix(ID, PREFIX_CONTRACT).with_bytes(hash.as_bytes())
}

fn id_key(id: i32) -> StorageKey {
    StorageKey::from_prefix(ID, PREFIX_CONTRACT_HASH).with_bytes(&id.to_be_bytes())
}

/// Reads a deployed contract's state.
pub fn get_contract(snapshot: &DataCache, hash: &UInt160) -> ContractResult<Option<ContractState>> {
    match snapshot.try_get(&contract_key(hash)) {
        Some(item) => Ok(Some(SerializableExt::from_array(item.value())?)),
        None => Ok(None),
    }
}

/// Reads a deployed contract's state by storage id.
pub fn get_contract_by_id(snapshot: &DataCache, id: i32) -> ContractResult<Option<ContractState>> {
    match snapshot.try_get(&id_key(id)) {
        Some(item) => {
            let hash = UInt160::from_bytes(item.value())?;
            get_contract(snapshot, &hash)
        }
        None => Ok(None),
    }
}

fn next_available_id(snapshot: &mut DataCache) -> ContractResult<i32> {
    let key = StorageKey::from_prefix(ID, PREFIX_NEXT_AVAILABLE_ID);
    let item = snapshot.get_or_add(&key, || StorageItem::from_int(1))?;
    let id = i32::try_from(item.as_int())
        .map_err(|_| ContractError::invalid_operation("contract id space exhausted"))?;
    item.set_int(id + 1);
    Ok(id)
}

/// Minimum GAS charged for a deployment.
pub fn get_minimum_deployment_fee(snapshot: &DataCache) -> i64 {
    snapshot
        .try_get(&StorageKey::from_prefix(ID, PREFIX_MINIMUM_DEPLOYMENT_FEE))
        .map(|item| i64::try_from(item.as_int()).unwrap_or(DEFAULT_MINIMUM_DEPLOYMENT_FEE))
        .unwrap_or(DEFAULT_MINIMUM_DEPLOYMENT_FEE)
}

/// The ContractManagement native.
pub struct ContractManagement;

static METHODS: &[NativeMethod] = &[
    NativeMethod::safe("getContract", 1, 1 << 15),
    NativeMethod::safe("getContractById", 1, 1 << 15),
    NativeMethod::safe("hasMethod", 3, 1 << 15),
    NativeMethod::safe("getMinimumDeploymentFee", 0, 1 << 15),
    NativeMethod::unsafe_method("setMinimumDeploymentFee", 1, 1 << 15),
    NativeMethod::unsafe_method("deploy", 2, 0),
    NativeMethod::unsafe_method("deployWithData", 3, 0),
    NativeMethod::unsafe_method("update", 2, 0),
    NativeMethod::unsafe_method("updateWithData", 3, 0),
    NativeMethod::unsafe_method("destroy", 0, 1 << 15),
];

impl ContractManagement {
    fn deploy(
        &self,
        engine: &mut ApplicationEngine,
        nef_bytes: Vec<u8>,
        manifest_bytes: Vec<u8>,
        data: StackItem,
    ) -> ContractResult<ContractState> {
        let nef: NefFile = SerializableExt::from_array(&nef_bytes)?;
        let manifest_text = String::from_utf8(manifest_bytes)
            .map_err(|_| ContractError::invalid_argument("manifest is not UTF-8"))?;
        let manifest = ContractManifest::from_json_str(&manifest_text)?;
        check_deployment(&nef, &manifest)?;

        let minimum_fee = get_minimum_deployment_fee(engine.snapshot());
        let storage_fee = engine.storage_price()
            * (nef_bytes.len() + manifest_text.len()) as i64;
        engine.add_fee(minimum_fee.max(storage_fee))?;

        let sender = match engine.container() {
            Some(ScriptContainer::Transaction(tx)) => tx.sender(),
            _ => {
                return Err(ContractError::invalid_operation(
                    "deployment requires a transaction",
                ))
            }
        };
        let hash = get_contract_hash(&sender, nef.checksum, &manifest.name);
        if engine.snapshot().contains(&contract_key(&hash)) {
            return Err(ContractError::invalid_operation(format!(
                "contract {hash} already exists"
            )));
        }

        let id = next_available_id(engine.snapshot_mut())?;
        let contract = ContractState {
            id,
            update_counter: 0,
            hash,
            nef,
            manifest,
        };
        engine.snapshot_mut().put(
            contract_key(&hash),
            StorageItem::new(contract.to_array()),
        )?;
        engine
            .snapshot_mut()
            .put(id_key(id), StorageItem::new(hash.to_vec()))?;

        engine.notify(
            "Deploy".into(),
            StackItem::Array(Rc::new(RefCell::new(vec![StackItem::from_bytes(
                hash.to_vec(),
            )]))),
        )?;

        // Run the contract's own _deploy hook, if declared.
        if contract.manifest.abi.get_method("_deploy", 2).is_some() {
            engine.call_contract_hook(
                &contract,
                "_deploy",
                vec![data, StackItem::from_bool(false)],
            )?;
        }
        Ok(contract)
    }

    fn update(
        &self,
        engine: &mut ApplicationEngine,
        nef_bytes: Option<Vec<u8>>,
        manifest_bytes: Option<Vec<u8>>,
        data: StackItem,
    ) -> ContractResult<()> {
        let hash = engine
            .current_vm_script_hash()
            .ok_or_else(|| ContractError::invalid_operation("update outside a contract"))?;
        let mut contract = get_contract(engine.snapshot(), &hash)?
            .ok_or_else(|| ContractError::not_found(format!("contract {hash}")))?;

        if nef_bytes.is_none() && manifest_bytes.is_none() {
            return Err(ContractError::invalid_argument(
                "update requires a new NEF or manifest",
            ));
        }
        if let Some(nef_bytes) = nef_bytes {
            engine.add_fee(engine.storage_price() * nef_bytes.len() as i64)?;
            contract.nef = SerializableExt::from_array(&nef_bytes)?;
        }
        if let Some(manifest_bytes) = manifest_bytes {
            engine.add_fee(engine.storage_price() * manifest_bytes.len() as i64)?;
            let manifest_text = String::from_utf8(manifest_bytes)
                .map_err(|_| ContractError::invalid_argument("manifest is not UTF-8"))?;
            let manifest = ContractManifest::from_json_str(&manifest_text)?;
            if manifest.name != contract.manifest.name {
                return Err(ContractError::invalid_argument(
                    "updates cannot rename a contract",
                ));
            }
            contract.manifest = manifest;
        }
        check_deployment(&contract.nef, &contract.manifest)?;
        contract.update_counter += 1;

        engine.snapshot_mut().put(
            contract_key(&hash),
            StorageItem::new(contract.to_array()),
        )?;
        engine.notify(
            "Update".into(),
            StackItem::Array(Rc::new(RefCell::new(vec![StackItem::from_bytes(
                hash.to_vec(),
            )]))),
        )?;

        if contract.manifest.abi.get_method("_deploy", 2).is_some() {
            engine.call_contract_hook(
                &contract,
                "_deploy",
                vec![data, StackItem::from_bool(true)],
            )?;
        }
        Ok(())
    }

    fn destroy(&self, engine: &mut ApplicationEngine) -> ContractResult<()> {
        let hash = engine
            .current_vm_script_hash()
            .ok_or_else(|| ContractError::invalid_operation("destroy outside a contract"))?;
        let Some(contract) = get_contract(engine.snapshot(), &hash)? else {
            return Ok(());
        };

        engine.snapshot_mut().delete(&contract_key(&hash))?;
        engine.snapshot_mut().delete(&id_key(contract.id))?;

        // Every storage row of the contract goes with it.
        let rows = engine
            .snapshot()
            .find(&StorageKey::contract_prefix(contract.id), SeekDirection::Forward);
        for (key, _) in rows {
            engine.snapshot_mut().delete(&key)?;
        }

        engine.notify(
            "Destroy".into(),
            StackItem::Array(Rc::new(RefCell::new(vec![StackItem::from_bytes(
                hash.to_vec(),
            )]))),
        )?;
        Ok(())
    }
}

impl NativeContract for ContractManagement {
    fn id(&self) -> i32 {
        ID
    }

    fn name(&self) -> &'static str {
        "ContractManagement"
    }

    fn methods(&self) -> &[NativeMethod] {
        METHODS
    }

    fn initialize(&self, engine: &mut ApplicationEngine) -> ContractResult<()> {
        engine.snapshot_mut().put(
            StorageKey::from_prefix(ID, PREFIX_NEXT_AVAILABLE_ID),
            StorageItem::from_int(1),
        )?;
        engine.snapshot_mut().put(
            StorageKey::from_prefix(ID, PREFIX_MINIMUM_DEPLOYMENT_FEE),
            StorageItem::from_int(DEFAULT_MINIMUM_DEPLOYMENT_FEE),
        )?;
        Ok(())
    }

    fn invoke(
        &self,
        engine: &mut ApplicationEngine,
        method: &str,
        args: Vec<StackItem>,
    ) -> ContractResult<Option<StackItem>> {
        match method {
            "getContract" => {
                let hash = super::arg_hash(&args, 0)?;
                match get_contract(engine.snapshot(), &hash)? {
                    Some(contract) => Ok(Some(contract_to_stack_item(&contract))),
                    None => Ok(Some(StackItem::Null)),
                }
            }
            "getContractById" => {
                let id: i32 = super::arg_int(engine, &args, 0)?
                    .try_into()
                    .map_err(|_| ContractError::invalid_argument("contract id"))?;
                match get_contract_by_id(engine.snapshot(), id)? {
                    Some(contract) => Ok(Some(contract_to_stack_item(&contract))),
                    None => Ok(Some(StackItem::Null)),
                }
            }
            "hasMethod" => {
                let hash = super::arg_hash(&args, 0)?;
                let name = super::arg_string(&args, 1)?;
                let parameter_count: usize = super::arg_int(engine, &args, 2)?
                    .try_into()
                    .map_err(|_| ContractError::invalid_argument("parameter count"))?;
                let found = get_contract(engine.snapshot(), &hash)?
                    .map(|contract| {
                        contract
                            .manifest
                            .abi
                            .get_method(&name, parameter_count)
                            .is_some()
                    })
                    .unwrap_or(false);
                Ok(Some(StackItem::from_bool(found)))
            }
            "getMinimumDeploymentFee" => Ok(Some(StackItem::from_int(
                get_minimum_deployment_fee(engine.snapshot()),
            ))),
            "setMinimumDeploymentFee" => {
                let value: i64 = super::arg_int(engine, &args, 0)?
                    .try_into()
                    .map_err(|_| ContractError::invalid_argument("deployment fee"))?;
                if value < 0 {
                    return Err(ContractError::invalid_argument("negative deployment fee"));
                }
                if !check_committee(engine)? {
                    return Err(ContractError::invalid_operation(
                        "requires the committee witness",
                    ));
                }
                engine.snapshot_mut().put(
                    StorageKey::from_prefix(ID, PREFIX_MINIMUM_DEPLOYMENT_FEE),
                    StorageItem::from_int(value),
                )?;
                Ok(None)
            }
            "deploy" => {
                let contract =
                    self.deploy(engine, arg_bytes(&args, 0)?, arg_bytes(&args, 1)?, StackItem::Null)?;
                Ok(Some(contract_to_stack_item(&contract)))
            }
            "deployWithData" => {
                let data = arg_item(&args, 2)?.clone();
                let contract =
                    self.deploy(engine, arg_bytes(&args, 0)?, arg_bytes(&args, 1)?, data)?;
                Ok(Some(contract_to_stack_item(&contract)))
            }
            "update" => {
                self.update(
                    engine,
                    optional_bytes(&args, 0)?,
                    optional_bytes(&args, 1)?,
                    StackItem::Null,
                )?;
                Ok(None)
            }
            "updateWithData" => {
                let data = arg_item(&args, 2)?.clone();
                self.update(
                    engine,
                    optional_bytes(&args, 0)?,
                    optional_bytes(&args, 1)?,
                    data,
                )?;
                Ok(None)
            }
            "destroy" => {
                self.destroy(engine)?;
                Ok(None)
            }
            other => Err(ContractError::not_found(format!(
                "ContractManagement::{other}"
            ))),
        }
    }
}

fn optional_bytes(args: &[StackItem], index: usize) -> ContractResult<Option<Vec<u8>>> {
    match args.get(index) {
        None => Ok(None),
        Some(item) if item.is_null() => Ok(None),
        Some(item) => Ok(Some(item.get_bytes()?)),
    }
}

/// The stack-item view of a contract state pushed to scripts.
fn contract_to_stack_item(contract: &ContractState) -> StackItem {
    StackItem::Array(Rc::new(RefCell::new(vec![
        StackItem::from_int(contract.id as i64),
        StackItem::from_int(contract.update_counter as i64),
        StackItem::from_bytes(contract.hash.to_vec()),
        StackItem::from_bytes(contract.nef.to_array()),
        StackItem::from_bytes(contract.manifest.to_json_string().into_bytes()),
    ])))
}
