//! The PolicyContract native: chain-wide fee and blocking policy.

use super::{arg_hash, arg_int, check_committee, NativeContract, NativeMethod};
use crate::application_engine::ApplicationEngine;
use crate::{ContractError, ContractResult};
use neo3_core::UInt160;
use neo3_persistence::{DataCache, StorageItem, StorageKey};
use neo3_vm::StackItem;

/// Reserved storage id.
pub const ID: i32 = -7;

const PREFIX_FEE_PER_BYTE: u8 = 10;
const PREFIX_BLOCKED_ACCOUNT: u8 = 15;
const PREFIX_EXEC_FEE_FACTOR: u8 = 18;
const PREFIX_STORAGE_PRICE: u8 = 19;
const PREFIX_ATTRIBUTE_FEE: u8 = 20;

/// Default network fee per transaction byte, in datoshi.
pub const DEFAULT_FEE_PER_BYTE: i64 = 1000;
/// Default multiplier applied to VM instruction prices.
pub const DEFAULT_EXEC_FEE_FACTOR: i64 = 30;
/// Default price per byte of contract storage, in datoshi.
pub const DEFAULT_STORAGE_PRICE: i64 = 100_000;

const MAX_EXEC_FEE_FACTOR: i64 = 100;
const MAX_STORAGE_PRICE: i64 = 10_000_000;
const MAX_FEE_PER_BYTE: i64 = 100_000_000;
const MAX_ATTRIBUTE_FEE: i64 = 10_0000_0000;

fn read_int(snapshot: &DataCache, prefix: u8, default: i64) -> i64 {
    snapshot
        .try_get(&StorageKey::from_prefix(ID, prefix))
        .map(|item| {
            i64::try_from(item.as_int()).unwrap_or(default)
        })
        .unwrap_or(default)
}

/// Network fee per byte currently in force.
pub fn get_fee_per_byte(snapshot: &DataCache) -> i64 {
    read_int(snapshot, PREFIX_FEE_PER_BYTE, DEFAULT_FEE_PER_BYTE)
}

/// Execution fee factor currently in force.
pub fn get_exec_fee_factor(snapshot: &DataCache) -> i64 {
    read_int(snapshot, PREFIX_EXEC_FEE_FACTOR, DEFAULT_EXEC_FEE_FACTOR)
}

/// Storage price currently in force.
pub fn get_storage_price(snapshot: &DataCache) -> i64 {
    read_int(snapshot, PREFIX_STORAGE_PRICE, DEFAULT_STORAGE_PRICE)
}

/// Extra fee charged for carrying the given attribute type.
pub fn get_attribute_fee(snapshot: &DataCache, attribute_type: u8) -> i64 {
    snapshot
        .try_get(&StorageKey::from_prefix(ID, PREFIX_ATTRIBUTE_FEE).with_bytes(&[attribute_type]))
        .map(|item| i64::try_from(item.as_int()).unwrap_or(0))
        .unwrap_or(0)
}

/// Whether the account is on the block list.
pub fn is_blocked(snapshot: &DataCache, account: &UInt160) -> bool {
    snapshot.contains(
        &StorageKey::from_prefix(ID, PREFIX_BLOCKED_ACCOUNT).with_bytes(account.as_bytes()),
    )
}

/// The PolicyContract native.
pub struct PolicyContract;

static METHODS: &[NativeMethod] = &[
    NativeMethod::safe("getFeePerByte", 0, 1 << 15),
    NativeMethod::safe("getExecFeeFactor", 0, 1 << 15),
    NativeMethod::safe("getStoragePrice", 0, 1 << 15),
    NativeMethod::safe("getAttributeFee", 1, 1 << 15),
    NativeMethod::safe("isBlocked", 1, 1 << 15),
    NativeMethod::unsafe_method("setFeePerByte", 1, 1 << 15),
    NativeMethod::unsafe_method("setExecFeeFactor", 1, 1 << 15),
    NativeMethod::unsafe_method("setStoragePrice", 1, 1 << 15),
    NativeMethod::unsafe_method("setAttributeFee", 2, 1 << 15),
    NativeMethod::unsafe_method("blockAccount", 1, 1 << 15),
    NativeMethod::unsafe_method("unblockAccount", 1, 1 << 15),
];

impl PolicyContract {
    fn require_committee(engine: &ApplicationEngine) -> ContractResult<()> {
        if check_committee(engine)? {
            Ok(())
        } else {
            Err(ContractError::invalid_operation(
                "policy changes require the committee witness",
            ))
        }
    }

    fn set_int(
        engine: &mut ApplicationEngine,
        prefix: u8,
        value: i64,
        max: i64,
    ) -> ContractResult<()> {
        if value <= 0 || value > max {
            return Err(ContractError::invalid_argument(format!(
                "value {value} outside (0, {max}]"
            )));
        }
        Self::require_committee(engine)?;
        engine
            .snapshot_mut()
            .put(StorageKey::from_prefix(ID, prefix), StorageItem::from_int(value))?;
        Ok(())
    }
}

impl NativeContract for PolicyContract {
    fn id(&self) -> i32 {
        ID
    }

    fn name(&self) -> &'static str {
        "PolicyContract"
    }

    fn methods(&self) -> &[NativeMethod] {
        METHODS
    }

    fn invoke(
        &self,
        engine: &mut ApplicationEngine,
        method: &str,
        args: Vec<StackItem>,
    ) -> ContractResult<Option<StackItem>> {
        match method {
            "getFeePerByte" => Ok(Some(StackItem::from_int(get_fee_per_byte(
                engine.snapshot(),
            )))),
            "getExecFeeFactor" => Ok(Some(StackItem::from_int(get_exec_fee_factor(
                engine.snapshot(),
            )))),
            "getStoragePrice" => Ok(Some(StackItem::from_int(get_storage_price(
                engine.snapshot(),
            )))),
            "getAttributeFee" => {
                let attribute_type: u8 = arg_int(engine, &args, 0)?
                    .try_into()
                    .map_err(|_| ContractError::invalid_argument("attribute type"))?;
                Ok(Some(StackItem::from_int(get_attribute_fee(
                    engine.snapshot(),
                    attribute_type,
                ))))
            }
            "isBlocked" => {
                let account = arg_hash(&args, 0)?;
                Ok(Some(StackItem::from_bool(is_blocked(
                    engine.snapshot(),
                    &account,
                ))))
            }
            "setFeePerByte" => {
                let value: i64 = arg_int(engine, &args, 0)?
                    .try_into()
                    .map_err(|_| ContractError::invalid_argument("fee per byte"))?;
                Self::set_int(engine, PREFIX_FEE_PER_BYTE, value, MAX_FEE_PER_BYTE)?;
                Ok(None)
            }
            "setExecFeeFactor" => {
                let value: i64 = arg_int(engine, &args, 0)?
                    .try_into()
                    .map_err(|_| ContractError::invalid_argument("exec fee factor"))?;
                Self::set_int(engine, PREFIX_EXEC_FEE_FACTOR, value, MAX_EXEC_FEE_FACTOR)?;
                Ok(None)
            }
            "setStoragePrice" => {
                let value: i64 = arg_int(engine, &args, 0)?
                    .try_into()
                    .map_err(|_| ContractError::invalid_argument("storage price"))?;
                Self::set_int(engine, PREFIX_STORAGE_PRICE, value, MAX_STORAGE_PRICE)?;
                Ok(None)
            }
            "setAttributeFee" => {
                let attribute_type: u8 = arg_int(engine, &args, 0)?
                    .try_into()
                    .map_err(|_| ContractError::invalid_argument("attribute type"))?;
                let value: i64 = arg_int(engine, &args, 1)?
                    .try_into()
                    .map_err(|_| ContractError::invalid_argument("attribute fee"))?;
                if value < 0 || value > MAX_ATTRIBUTE_FEE {
                    return Err(ContractError::invalid_argument("attribute fee out of range"));
                }
                Self::require_committee(engine)?;
                engine.snapshot_mut().put(
                    StorageKey::from_prefix(ID, PREFIX_ATTRIBUTE_FEE).with_bytes(&[attribute_type]),
                    StorageItem::from_int(value),
                )?;
                Ok(None)
            }
            "blockAccount" => {
                Self::require_committee(engine)?;
                let account = arg_hash(&args, 0)?;
                if super::registry().by_hash(&account).is_some() {
                    return Err(ContractError::invalid_argument(
                        "native contracts cannot be blocked",
                    ));
                }
                let key = StorageKey::from_prefix(ID, PREFIX_BLOCKED_ACCOUNT)
                    .with_bytes(account.as_bytes());
                let added = !engine.snapshot().contains(&key);
                if added {
                    engine.snapshot_mut().put(key, StorageItem::new(Vec::new()))?;
                }
                Ok(Some(StackItem::from_bool(added)))
            }
            "unblockAccount" => {
                Self::require_committee(engine)?;
                let account = arg_hash(&args, 0)?;
                let key = StorageKey::from_prefix(ID, PREFIX_BLOCKED_ACCOUNT)
                    .with_bytes(account.as_bytes());
                let existed = engine.snapshot().contains(&key);
                if existed {
                    engine.snapshot_mut().delete(&key)?;
                }
                Ok(Some(StackItem::from_bool(existed)))
            }
            other => Err(ContractError::not_found(format!("PolicyContract::{other}"))),
        }
    }
}
