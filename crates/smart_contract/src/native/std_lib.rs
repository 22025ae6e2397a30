//! The StdLib native: pure serialization, encoding and string utilities.

use super::{arg_bytes, arg_int, arg_item, arg_string, NativeContract, NativeMethod};
use crate::application_engine::ApplicationEngine;
use crate::{ContractError, ContractResult};
use neo3_cryptography::{base58, murmur};
use neo3_vm::StackItem;
use num_bigint::BigInt;
use num_traits::{Num, Zero};
use std::cell::RefCell;
use std::rc::Rc;

/// Reserved storage id.
pub const ID: i32 = -2;

const MAX_INPUT_LENGTH: usize = 1024;

/// The StdLib native.
pub struct StdLib;

static METHODS: &[NativeMethod] = &[
    NativeMethod::pure("serialize", 1, 1 << 12),
    NativeMethod::pure("deserialize", 1, 1 << 14),
    NativeMethod::pure("jsonSerialize", 1, 1 << 12),
    NativeMethod::pure("jsonDeserialize", 1, 1 << 14),
    NativeMethod::pure("itoa", 2, 1 << 12),
    NativeMethod::pure("atoi", 2, 1 << 6),
    NativeMethod::pure("base58Encode", 1, 1 << 13),
    NativeMethod::pure("base58Decode", 1, 1 << 10),
    NativeMethod::pure("base58CheckEncode", 1, 1 << 16),
    NativeMethod::pure("base58CheckDecode", 1, 1 << 16),
    NativeMethod::pure("base64Encode", 1, 1 << 5),
    NativeMethod::pure("base64Decode", 1, 1 << 5),
    NativeMethod::pure("memoryCompare", 2, 1 << 5),
    NativeMethod::pure("memorySearch", 2, 1 << 6),
    NativeMethod::pure("stringSplit", 2, 1 << 8),
    NativeMethod::pure("strLen", 1, 1 << 8),
    NativeMethod::pure("murmur32", 2, 1 << 13),
];

fn itoa(value: &BigInt, base: u32) -> ContractResult<String> {
    match base {
        10 => Ok(value.to_string()),
        16 => {
            // Hex form of the two's-complement minimal encoding, big-endian,
            // so the string round-trips through atoi.
            let bytes = neo3_vm::stack_item::encode_integer(value);
            if bytes.is_empty() {
                return Ok("0".into());
            }
            let mut reversed = bytes;
            reversed.reverse();
            Ok(hex::encode(reversed))
        }
        other => Err(ContractError::invalid_argument(format!(
            "itoa base {other} is not supported"
        ))),
    }
}

fn atoi(text: &str, base: u32) -> ContractResult<BigInt> {
    match base {
        10 => BigInt::from_str_radix(text, 10)
            .map_err(|e| ContractError::invalid_argument(format!("atoi: {e}"))),
        16 => {
            let negative_guard = text.trim_start_matches('-');
            if negative_guard.is_empty() {
                return Err(ContractError::invalid_argument("atoi: empty input"));
            }
            // Hex parses as two's complement of the encoded width.
            let padded = if text.len() % 2 == 1 {
                format!("0{text}")
            } else {
                text.to_string()
            };
            let mut bytes = hex::decode(&padded)
                .map_err(|e| ContractError::invalid_argument(format!("atoi: {e}")))?;
            bytes.reverse();
            if bytes.is_empty() {
                Ok(BigInt::zero())
            } else {
                Ok(BigInt::from_signed_bytes_le(&bytes))
            }
        }
        other => Err(ContractError::invalid_argument(format!(
            "atoi base {other} is not supported"
        ))),
    }
}

fn memory_search(haystack: &[u8], needle: &[u8]) -> i64 {
    if needle.is_empty() {
        return 0;
    }
    if needle.len() > haystack.len() {
        return -1;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|index| index as i64)
        .unwrap_or(-1)
}

impl NativeContract for StdLib {
    fn id(&self) -> i32 {
        ID
    }

    fn name(&self) -> &'static str {
        "StdLib"
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
        let max_item_size = engine.vm().limits().max_item_size;
        match method {
            "serialize" => {
                let bytes =
                    crate::binary_serializer::serialize_stack_item(arg_item(&args, 0)?, max_item_size)?;
                Ok(Some(StackItem::from_bytes(bytes)))
            }
            "deserialize" => {
                let bytes = arg_bytes(&args, 0)?;
                let item = crate::binary_serializer::deserialize_stack_item(&bytes, max_item_size)?;
                Ok(Some(item))
            }
            "jsonSerialize" => {
                let json = crate::json_serializer::stack_item_to_json(arg_item(&args, 0)?)?;
                Ok(Some(StackItem::from_bytes(json.to_string().into_bytes())))
            }
            "jsonDeserialize" => {
                let bytes = arg_bytes(&args, 0)?;
                let text = std::str::from_utf8(&bytes)
                    .map_err(|_| ContractError::invalid_argument("JSON is not UTF-8"))?;
                let value: serde_json::Value = serde_json::from_str(text)
                    .map_err(|e| ContractError::invalid_argument(format!("JSON: {e}")))?;
                Ok(Some(crate::json_serializer::json_to_stack_item(&value)?))
            }
            "itoa" => {
                let value = arg_int(engine, &args, 0)?;
                let base: u32 = arg_int(engine, &args, 1)?
                    .try_into()
                    .map_err(|_| ContractError::invalid_argument("base"))?;
                Ok(Some(StackItem::from_bytes(itoa(&value, base)?.into_bytes())))
            }
            "atoi" => {
                let text = arg_string(&args, 0)?;
                let base: u32 = arg_int(engine, &args, 1)?
                    .try_into()
                    .map_err(|_| ContractError::invalid_argument("base"))?;
                Ok(Some(StackItem::Integer(atoi(&text, base)?)))
            }
            "base58Encode" => {
                let data = arg_bytes(&args, 0)?;
                Ok(Some(StackItem::from_bytes(
                    base58::encode(&data).into_bytes(),
                )))
            }
            "base58Decode" => {
                let text = arg_string(&args, 0)?;
                Ok(Some(StackItem::from_bytes(base58::decode(&text)?)))
            }
            "base58CheckEncode" => {
                let data = arg_bytes(&args, 0)?;
                Ok(Some(StackItem::from_bytes(
                    base58::encode_check(&data).into_bytes(),
                )))
            }
            "base58CheckDecode" => {
                let text = arg_string(&args, 0)?;
                Ok(Some(StackItem::from_bytes(base58::decode_check(&text)?)))
            }
            "base64Encode" => {
                let data = arg_bytes(&args, 0)?;
                Ok(Some(StackItem::from_bytes(
                    neo3_cryptography::base64::encode(&data).into_bytes(),
                )))
            }
            "base64Decode" => {
                let text = arg_string(&args, 0)?;
                Ok(Some(StackItem::from_bytes(
                    neo3_cryptography::base64::decode(&text)?,
                )))
            }
            "memoryCompare" => {
                let left = arg_bytes(&args, 0)?;
                let right = arg_bytes(&args, 1)?;
                let ordering = left.cmp(&right) as i64;
                Ok(Some(StackItem::from_int(ordering)))
            }
            "memorySearch" => {
                let haystack = arg_bytes(&args, 0)?;
                let needle = arg_bytes(&args, 1)?;
                if haystack.len() > MAX_INPUT_LENGTH {
                    return Err(ContractError::invalid_argument("input too long"));
                }
                Ok(Some(StackItem::from_int(memory_search(&haystack, &needle))))
            }
            "stringSplit" => {
                let text = arg_string(&args, 0)?;
                let separator = arg_string(&args, 1)?;
                if separator.is_empty() {
                    return Err(ContractError::invalid_argument("empty separator"));
                }
                let parts: Vec<StackItem> = text
                    .split(separator.as_str())
                    .map(|part| StackItem::from_bytes(part.as_bytes().to_vec()))
                    .collect();
                Ok(Some(StackItem::Array(Rc::new(RefCell::new(parts)))))
            }
            "strLen" => {
                let text = arg_string(&args, 0)?;
                Ok(Some(StackItem::from_int(text.chars().count() as i64)))
            }
            "murmur32" => {
                let data = arg_bytes(&args, 0)?;
                let seed: u32 = arg_int(engine, &args, 1)?
                    .try_into()
                    .map_err(|_| ContractError::invalid_argument("seed"))?;
                let digest = murmur::murmur32(&data, seed);
                Ok(Some(StackItem::from_bytes(digest.to_le_bytes().to_vec())))
            }
            other => Err(ContractError::not_found(format!("StdLib::{other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn itoa_and_atoi_base_10() {
        assert_eq!(itoa(&BigInt::from(-42), 10).unwrap(), "-42");
        assert_eq!(atoi("-42", 10).unwrap(), BigInt::from(-42));
    }

    #[test]
    fn hex_round_trip_through_twos_complement() {
        // 255 encodes as 00ff so the sign survives.
        let text = itoa(&BigInt::from(255), 16).unwrap();
        assert_eq!(atoi(&text, 16).unwrap(), BigInt::from(255));
        // ff alone reads back negative.
        assert_eq!(atoi("ff", 16).unwrap(), BigInt::from(-1));
    }

    #[test]
    fn memory_search_finds_and_misses() {
        assert_eq!(memory_search(b"hello world", b"world"), 6);
        assert_eq!(memory_search(b"hello", b"x"), -1);
        assert_eq!(memory_search(b"hello", b""), 0);
    }

    #[test]
    fn unsupported_base_rejected() {
        assert!(itoa(&BigInt::from(1), 2).is_err());
        assert!(atoi("1", 8).is_err());
    }
}
