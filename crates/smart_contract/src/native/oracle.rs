//! The OracleContract native: off-chain data requests and responses.

use super::{NativeContract, NativeMethod};
use crate::application_engine::{ApplicationEngine, ScriptContainer};
use crate::{ContractError, ContractResult};
use neo3_config::GAS_FACTOR;
use neo3_core::{OracleResponseCode, TransactionAttribute, UInt160, UInt256};
use neo3_cryptography::hash;
use neo3_io::{helper, BinaryWriter, IoResult, MemoryReader, Serializable, SerializableExt};
use neo3_persistence::{DataCache, StorageItem, StorageKey};
use neo3_vm::{CallFlags, StackItem};
use num_bigint::BigInt;
use std::cell::RefCell;
use std::rc::Rc;

/// Reserved storage id.
pub const ID: i32 = -9;

const PREFIX_PRICE: u8 = 5;
const PREFIX_ID_LIST: u8 = 6;
const PREFIX_REQUEST: u8 = 7;
const PREFIX_REQUEST_ID: u8 = 9;

const DEFAULT_PRICE: i64 = GAS_FACTOR / 2;
const MAX_URL_LENGTH: usize = 256;
const MAX_FILTER_LENGTH: usize = 128;
const MAX_CALLBACK_LENGTH: usize = 32;
const MAX_USER_DATA_LENGTH: usize = 512;
const MIN_RESPONSE_GAS: i64 = 10_000_000;

/// One pending oracle request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleRequest {
    /// Transaction that created the request.
    pub original_txid: UInt256,
    /// GAS reserved for delivering the response.
    pub gas_for_response: i64,
    /// Requested URL.
    pub url: String,
    /// Optional JSONPath filter.
    pub filter: Option<String>,
    /// Contract to call back.
    pub callback_contract: UInt160,
    /// Method to call back.
    pub callback_method: String,
    /// Serialized user data handed back to the callback.
    pub user_data: Vec<u8>,
}

impl Serializable for OracleRequest {
    fn size(&self) -> usize {
        32 + 8
            + helper::get_var_bytes_size(self.url.as_bytes())
            + 1
            + self
                .filter
                .as_ref()
                .map(|f| helper::get_var_bytes_size(f.as_bytes()))
                .unwrap_or(0)
            + 20
            + helper::get_var_bytes_size(self.callback_method.as_bytes())
            + helper::get_var_bytes_size(&self.user_data)
    }

    fn serialize(&self, writer: &mut BinaryWriter) {
        self.original_txid.serialize(writer);
        writer.write_i64(self.gas_for_response);
        writer.write_var_string(&self.url);
        match &self.filter {
            Some(filter) => {
                writer.write_bool(true);
                writer.write_var_string(filter);
            }
            None => writer.write_bool(false),
        }
        self.callback_contract.serialize(writer);
        writer.write_var_string(&self.callback_method);
        writer.write_var_bytes(&self.user_data);
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        let original_txid = UInt256::deserialize(reader)?;
        let gas_for_response = reader.read_i64()?;
        let url = reader.read_var_string(MAX_URL_LENGTH)?;
        let filter = if reader.read_bool()? {
            Some(reader.read_var_string(MAX_FILTER_LENGTH)?)
        } else {
            None
        };
        let callback_contract = UInt160::deserialize(reader)?;
        let callback_method = reader.read_var_string(MAX_CALLBACK_LENGTH)?;
        let user_data = reader.read_var_bytes(MAX_USER_DATA_LENGTH)?;
        Ok(Self {
            original_txid,
            gas_for_response,
            url,
            filter,
            callback_contract,
            callback_method,
            user_data,
        })
    }
}

fn request_key(id: u64) -> StorageKey {
    StorageKey::from_prefix(ID, PREFIX_REQUEST).with_bytes(&id.to_be_bytes())
}

fn id_list_key(url: &str) -> StorageKey {
    StorageKey::from_prefix(ID, PREFIX_ID_LIST).with_bytes(&hash::hash160(url.as_bytes()))
}

/// Price charged per oracle request.
pub fn get_price(snapshot: &DataCache) -> i64 {
    snapshot
        .try_get(&StorageKey::from_prefix(ID, PREFIX_PRICE))
        .map(|item| i64::try_from(item.as_int()).unwrap_or(DEFAULT_PRICE))
        .unwrap_or(DEFAULT_PRICE)
}

/// Reads a pending request by id.
pub fn get_request(snapshot: &DataCache, id: u64) -> ContractResult<Option<OracleRequest>> {
    match snapshot.try_get(&request_key(id)) {
        Some(item) => Ok(Some(SerializableExt::from_array(item.value())?)),
        None => Ok(None),
    }
}

fn read_id_list(snapshot: &DataCache, url: &str) -> Vec<u64> {
    snapshot
        .try_get(&id_list_key(url))
        .map(|item| {
            item.value()
                .chunks(8)
                .filter(|chunk| chunk.len() == 8)
                .map(|chunk| {
                    let mut bytes = [0u8; 8];
                    bytes.copy_from_slice(chunk);
                    u64::from_be_bytes(bytes)
                })
                .collect()
        })
        .unwrap_or_default()
}

fn write_id_list(snapshot: &mut DataCache, url: &str, ids: &[u64]) -> ContractResult<()> {
    let key = id_list_key(url);
    if ids.is_empty() {
        snapshot.delete(&key)?;
    } else {
        let mut bytes = Vec::with_capacity(ids.len() * 8);
        for id in ids {
            bytes.extend_from_slice(&id.to_be_bytes());
        }
        snapshot.put(key, StorageItem::new(bytes))?;
    }
    Ok(())
}

/// The OracleContract native.
pub struct OracleContract;

static METHODS: &[NativeMethod] = &[
    NativeMethod::safe("getPrice", 0, 1 << 15),
    NativeMethod::unsafe_method("setPrice", 1, 1 << 15),
    NativeMethod::unsafe_method("request", 5, 0),
    NativeMethod::unsafe_method("finish", 0, 0),
];

impl OracleContract {
    fn request(
        &self,
        engine: &mut ApplicationEngine,
        url: String,
        filter: Option<String>,
        callback_method: String,
        user_data: StackItem,
        gas_for_response: i64,
    ) -> ContractResult<()> {
        if url.len() > MAX_URL_LENGTH {
            return Err(ContractError::invalid_argument("url too long"));
        }
        if let Some(filter) = &filter {
            if filter.len() > MAX_FILTER_LENGTH {
                return Err(ContractError::invalid_argument("filter too long"));
            }
        }
        if callback_method.len() > MAX_CALLBACK_LENGTH || callback_method.starts_with('_') {
            return Err(ContractError::invalid_argument("invalid callback method"));
        }
        if gas_for_response < MIN_RESPONSE_GAS {
            return Err(ContractError::invalid_argument(format!(
                "response gas below the {MIN_RESPONSE_GAS} datoshi minimum"
            )));
        }

        let callback_contract = engine
            .current_vm_script_hash()
            .ok_or_else(|| ContractError::invalid_operation("request outside a contract"))?;
        let original_txid = match engine.container() {
            Some(ScriptContainer::Transaction(tx)) => tx.hash(),
            _ => UInt256::zero(),
        };

        // The requester pays the oracle fee plus the reserved response gas.
        engine.add_fee(get_price(engine.snapshot()))?;
        engine.add_fee(gas_for_response)?;

        let user_data = crate::binary_serializer::serialize_stack_item(
            &user_data,
            MAX_USER_DATA_LENGTH,
        )?;

        // Allocate the next request id.
        let id_key = StorageKey::from_prefix(ID, PREFIX_REQUEST_ID);
        let id_item = engine
            .snapshot_mut()
            .get_or_add(&id_key, || StorageItem::from_int(0))?;
        let id = u64::try_from(id_item.as_int())
            .map_err(|_| ContractError::invalid_operation("request id overflow"))?;
        id_item.set_int(BigInt::from(id) + 1);

        let request = OracleRequest {
            original_txid,
            gas_for_response,
            url: url.clone(),
            filter,
            callback_contract,
            callback_method,
            user_data,
        };
        engine
            .snapshot_mut()
            .put(request_key(id), StorageItem::new(request.to_array()))?;

        let mut ids = read_id_list(engine.snapshot(), &url);
        if ids.len() >= 256 {
            return Err(ContractError::invalid_operation(
                "too many pending requests for this url",
            ));
        }
        ids.push(id);
        write_id_list(engine.snapshot_mut(), &url, &ids)?;

        engine.notify(
            "OracleRequest".into(),
            StackItem::Array(Rc::new(RefCell::new(vec![
                StackItem::from_int(id as i64),
                StackItem::from_bytes(callback_contract.to_vec()),
                StackItem::from_bytes(url.into_bytes()),
                match &request.filter {
                    Some(filter) => StackItem::from_bytes(filter.clone().into_bytes()),
                    None => StackItem::Null,
                },
            ]))),
        )?;
        Ok(())
    }

    /// Delivers a response: called from the oracle response transaction's
    /// script, with the OracleResponse attribute carrying the payload.
    fn finish(&self, engine: &mut ApplicationEngine) -> ContractResult<()> {
        let Some(ScriptContainer::Transaction(tx)) = engine.container().cloned() else {
            return Err(ContractError::invalid_operation(
                "finish requires a transaction",
            ));
        };
        let Some(TransactionAttribute::OracleResponse { id, code, result }) = tx
            .attributes
            .iter()
            .find(|a| matches!(a, TransactionAttribute::OracleResponse { .. }))
            .cloned()
        else {
            return Err(ContractError::invalid_operation(
                "finish requires an OracleResponse attribute",
            ));
        };

        let request = get_request(engine.snapshot(), id)?
            .ok_or_else(|| ContractError::not_found(format!("oracle request {id}")))?;

        // The request is consumed before the callback runs.
        engine.snapshot_mut().delete(&request_key(id))?;
        let mut ids = read_id_list(engine.snapshot(), &request.url);
        ids.retain(|&pending| pending != id);
        write_id_list(engine.snapshot_mut(), &request.url, &ids)?;

        engine.notify(
            "OracleResponse".into(),
            StackItem::Array(Rc::new(RefCell::new(vec![
                StackItem::from_int(id as i64),
                StackItem::from_bytes(request.original_txid.to_vec()),
            ]))),
        )?;

        let user_data = crate::binary_serializer::deserialize_stack_item(
            &request.user_data,
            MAX_USER_DATA_LENGTH,
        )?;
        let args = vec![
            StackItem::from_bytes(request.url.into_bytes()),
            user_data,
            StackItem::from_int(code as u8 as i64),
            StackItem::from_bytes(result),
        ];
        engine.call_contract_internal(
            request.callback_contract,
            &request.callback_method,
            CallFlags::ALL,
            args,
            false,
        )
    }
}

impl NativeContract for OracleContract {
    fn id(&self) -> i32 {
        ID
    }

    fn name(&self) -> &'static str {
        "OracleContract"
    }

    fn methods(&self) -> &[NativeMethod] {
        METHODS
    }

    fn initialize(&self, engine: &mut ApplicationEngine) -> ContractResult<()> {
        engine.snapshot_mut().put(
            StorageKey::from_prefix(ID, PREFIX_REQUEST_ID),
            StorageItem::from_int(0),
        )?;
        engine.snapshot_mut().put(
            StorageKey::from_prefix(ID, PREFIX_PRICE),
            StorageItem::from_int(DEFAULT_PRICE),
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
            "getPrice" => Ok(Some(StackItem::from_int(get_price(engine.snapshot())))),
            "setPrice" => {
                let value: i64 = super::arg_int(engine, &args, 0)?
                    .try_into()
                    .map_err(|_| ContractError::invalid_argument("price"))?;
                if value <= 0 {
                    return Err(ContractError::invalid_argument("price must be positive"));
                }
                if !super::check_committee(engine)? {
                    return Err(ContractError::invalid_operation(
                        "requires the committee witness",
                    ));
                }
                engine.snapshot_mut().put(
                    StorageKey::from_prefix(ID, PREFIX_PRICE),
                    StorageItem::from_int(value),
                )?;
                Ok(None)
            }
            "request" => {
                let url = super::arg_string(&args, 0)?;
                let filter = match super::arg_item(&args, 1)? {
                    item if item.is_null() => None,
                    item => Some(
                        String::from_utf8(item.get_bytes()?)
                            .map_err(|_| ContractError::invalid_argument("filter not UTF-8"))?,
                    ),
                };
                let callback_method = super::arg_string(&args, 2)?;
                let user_data = super::arg_item(&args, 3)?.clone();
                let gas_for_response: i64 = super::arg_int(engine, &args, 4)?
                    .try_into()
                    .map_err(|_| ContractError::invalid_argument("response gas"))?;
                self.request(engine, url, filter, callback_method, user_data, gas_for_response)?;
                Ok(None)
            }
            "finish" => {
                self.finish(engine)?;
                Ok(None)
            }
            other => Err(ContractError::not_found(format!("OracleContract::{other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_round_trip() {
        let request = OracleRequest {
            original_txid: UInt256::from_array([9u8; 32]),
            gas_for_response: 10_000_000,
            url: "https://example.org/data".into(),
            filter: Some("$.price".into()),
            callback_contract: UInt160::from_array([1u8; 20]),
            callback_method: "callback".into(),
            user_data: vec![0x28, 0x00],
        };
        let restored: OracleRequest =
            SerializableExt::from_array(&request.to_array()).unwrap();
        assert_eq!(restored, request);
        assert_eq!(request.size(), request.to_array().len());
    }
}
