//! The RoleManagement native: designated node lists per role.

use super::{check_committee, NativeContract, NativeMethod};
use crate::application_engine::ApplicationEngine;
use crate::{ContractError, ContractResult};
use neo3_cryptography::ECPoint;
use neo3_persistence::{DataCache, SeekDirection, StorageItem, StorageKey};
use neo3_vm::StackItem;
use std::cell::RefCell;
use std::rc::Rc;

/// Reserved storage id.
pub const ID: i32 = -8;

/// Roles nodes can be designated to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Role {
    /// State root signers.
    StateValidator = 4,
    /// Oracle nodes.
    Oracle = 8,
    /// NeoFS alphabet nodes.
    NeoFsAlphabet = 16,
    /// Notary nodes.
    P2pNotary = 32,
}

impl Role {
    /// Parses a role byte.
    pub fn from_byte(value: u8) -> Option<Self> {
        Some(match value {
            4 => Self::StateValidator,
            8 => Self::Oracle,
            16 => Self::NeoFsAlphabet,
            32 => Self::P2pNotary,
            _ => return None,
        })
    }
}

fn designation_key(role: Role, index: u32) -> StorageKey {
    StorageKey::from_prefix(ID, role as u8).with_u32_be(index)
}

/// The node list of `role` effective at block `index`: the most recent
/// designation made strictly before that height.
pub fn get_designated_by_role(
    snapshot: &DataCache,
    role: Role,
    index: u32,
) -> ContractResult<Vec<ECPoint>> {
    let prefix = StorageKey::from_prefix(ID, role as u8).to_array();
    let mut latest: Option<Vec<ECPoint>> = None;
    for (key, item) in snapshot.find(&prefix, SeekDirection::Forward) {
        if key.key.len() != 5 {
            continue;
        }
        let mut height_bytes = [0u8; 4];
        height_bytes.copy_from_slice(&key.key[1..]);
        let height = u32::from_be_bytes(height_bytes);
        if height > index {
            break;
        }
        latest = Some(decode_nodes(item.value())?);
    }
    Ok(latest.unwrap_or_default())
}

fn decode_nodes(bytes: &[u8]) -> ContractResult<Vec<ECPoint>> {
    if bytes.len() % neo3_cryptography::EC_POINT_SIZE != 0 {
        return Err(ContractError::invalid_operation("corrupt designation row"));
    }
    bytes
        .chunks(neo3_cryptography::EC_POINT_SIZE)
        .map(|chunk| ECPoint::from_bytes(chunk).map_err(Into::into))
        .collect()
}

fn encode_nodes(nodes: &[ECPoint]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(nodes.len() * neo3_cryptography::EC_POINT_SIZE);
    for node in nodes {
        bytes.extend_from_slice(node.as_bytes());
    }
    bytes
}

/// The RoleManagement native.
pub struct RoleManagement;

static METHODS: &[NativeMethod] = &[
    NativeMethod::safe("getDesignatedByRole", 2, 1 << 15),
    NativeMethod::unsafe_method("designateAsRole", 2, 1 << 15),
];

impl NativeContract for RoleManagement {
    fn id(&self) -> i32 {
        ID
    }

    fn name(&self) -> &'static str {
        "RoleManagement"
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
            "getDesignatedByRole" => {
                let role_byte: u8 = super::arg_int(engine, &args, 0)?
                    .try_into()
                    .map_err(|_| ContractError::invalid_argument("role"))?;
                let role = Role::from_byte(role_byte)
                    .ok_or_else(|| ContractError::invalid_argument("undefined role"))?;
                let index: u32 = super::arg_int(engine, &args, 1)?
                    .try_into()
                    .map_err(|_| ContractError::invalid_argument("block index"))?;
                if let Some(current) = super::ledger::current_index(engine.snapshot()) {
                    if index > current + 1 {
                        return Err(ContractError::invalid_argument(
                            "designation query beyond the next block",
                        ));
                    }
                }
                let nodes = get_designated_by_role(engine.snapshot(), role, index)?;
                let items: Vec<StackItem> = nodes
                    .into_iter()
                    .map(|node| StackItem::from_bytes(node.to_vec()))
                    .collect();
                Ok(Some(StackItem::Array(Rc::new(RefCell::new(items)))))
            }
            "designateAsRole" => {
                let role_byte: u8 = super::arg_int(engine, &args, 0)?
                    .try_into()
                    .map_err(|_| ContractError::invalid_argument("role"))?;
                let role = Role::from_byte(role_byte)
                    .ok_or_else(|| ContractError::invalid_argument("undefined role"))?;
                let nodes_item = super::arg_item(&args, 1)?;
                let raw_nodes = nodes_item.as_array()?.borrow().clone();
                if raw_nodes.is_empty() || raw_nodes.len() > 32 {
                    return Err(ContractError::invalid_argument(
                        "designation must contain 1..=32 nodes",
                    ));
                }
                if !check_committee(engine)? {
                    return Err(ContractError::invalid_operation(
                        "designation requires the committee witness",
                    ));
                }
                let mut nodes = Vec::with_capacity(raw_nodes.len());
                for item in &raw_nodes {
                    nodes.push(ECPoint::from_bytes(&item.get_bytes()?)?);
                }
                nodes.sort();
                nodes.dedup();

                // The designation takes effect from the next block.
                let index = engine
                    .persisting_block()
                    .map(|block| block.header.index + 1)
                    .unwrap_or(0);
                let key = designation_key(role, index);
                if engine.snapshot().contains(&key) {
                    return Err(ContractError::invalid_operation(
                        "role already designated at this height",
                    ));
                }
                engine
                    .snapshot_mut()
                    .put(key, StorageItem::new(encode_nodes(&nodes)))?;

                engine.notify(
                    "Designation".into(),
                    StackItem::Array(Rc::new(RefCell::new(vec![
                        StackItem::from_int(role as u8 as i64),
                        StackItem::from_int(index as i64),
                    ]))),
                )?;
                Ok(None)
            }
            other => Err(ContractError::not_found(format!("RoleManagement::{other}"))),
        }
    }
}
