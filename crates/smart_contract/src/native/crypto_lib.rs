//! The CryptoLib native: hashing, signature verification and BLS12-381.

use super::{arg_bool, arg_bytes, arg_int, arg_item, NativeContract, NativeMethod};
use crate::application_engine::ApplicationEngine;
use crate::{ContractError, ContractResult};
use neo3_cryptography::bls12_381::Bls12381Point;
use neo3_cryptography::ecdsa::{verify_signature, Curve};
use neo3_cryptography::{hash, murmur};
use neo3_vm::StackItem;
use std::rc::Rc;

/// Reserved storage id.
pub const ID: i32 = -3;

/// Curve selectors accepted by verifyWithECDsa.
const CURVE_SECP256K1_SHA256: i64 = 22;
const CURVE_SECP256R1_SHA256: i64 = 23;

/// The CryptoLib native.
pub struct CryptoLib;

static METHODS: &[NativeMethod] = &[
    NativeMethod::pure("sha256", 1, 1 << 15),
    NativeMethod::pure("ripemd160", 1, 1 << 15),
    NativeMethod::pure("keccak256", 1, 1 << 15),
    NativeMethod::pure("murmur32", 2, 1 << 13),
    NativeMethod::pure("verifyWithECDsa", 4, 1 << 15),
    NativeMethod::pure("bls12381Serialize", 1, 1 << 19),
    NativeMethod::pure("bls12381Deserialize", 1, 1 << 19),
    NativeMethod::pure("bls12381Equal", 2, 1 << 5),
    NativeMethod::pure("bls12381Add", 2, 1 << 19),
    NativeMethod::pure("bls12381Mul", 3, 1 << 21),
    NativeMethod::pure("bls12381Pairing", 2, 1 << 23),
];

fn pop_bls_point(args: &[StackItem], index: usize) -> ContractResult<Rc<Bls12381Point>> {
    arg_item(args, index)?
        .as_interop::<Bls12381Point>()
        .map_err(Into::into)
}

impl NativeContract for CryptoLib {
    fn id(&self) -> i32 {
        ID
    }

    fn name(&self) -> &'static str {
        "CryptoLib"
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
            "sha256" => {
                let data = arg_bytes(&args, 0)?;
                Ok(Some(StackItem::from_bytes(hash::sha256(&data).to_vec())))
            }
            "ripemd160" => {
                let data = arg_bytes(&args, 0)?;
                Ok(Some(StackItem::from_bytes(hash::ripemd160(&data).to_vec())))
            }
            "keccak256" => {
                let data = arg_bytes(&args, 0)?;
                Ok(Some(StackItem::from_bytes(hash::keccak256(&data).to_vec())))
            }
            "murmur32" => {
                let data = arg_bytes(&args, 0)?;
                let seed: u32 = arg_int(engine, &args, 1)?
                    .try_into()
                    .map_err(|_| ContractError::invalid_argument("seed"))?;
                let digest = murmur::murmur32(&data, seed);
                Ok(Some(StackItem::from_bytes(digest.to_le_bytes().to_vec())))
            }
            "verifyWithECDsa" => {
                let message = arg_bytes(&args, 0)?;
                let public_key = arg_bytes(&args, 1)?;
                let signature = arg_bytes(&args, 2)?;
                let curve = match i64::try_from(arg_int(engine, &args, 3)?) {
                    Ok(CURVE_SECP256K1_SHA256) => Curve::Secp256k1,
                    Ok(CURVE_SECP256R1_SHA256) => Curve::Secp256r1,
                    _ => {
                        return Err(ContractError::invalid_argument(
                            "unsupported curve selector",
                        ))
                    }
                };
                let valid = verify_signature(&message, &signature, &public_key, curve);
                Ok(Some(StackItem::from_bool(valid)))
            }
            "bls12381Serialize" => {
                let point = pop_bls_point(&args, 0)?;
                Ok(Some(StackItem::from_bytes(point.serialize()?)))
            }
            "bls12381Deserialize" => {
                let data = arg_bytes(&args, 0)?;
                let point = Bls12381Point::deserialize(&data)?;
                Ok(Some(StackItem::interop(Rc::new(point))))
            }
            "bls12381Equal" => {
                let left = pop_bls_point(&args, 0)?;
                let right = pop_bls_point(&args, 1)?;
                Ok(Some(StackItem::from_bool(*left == *right)))
            }
            "bls12381Add" => {
                let left = pop_bls_point(&args, 0)?;
                let right = pop_bls_point(&args, 1)?;
                Ok(Some(StackItem::interop(Rc::new(left.add(&right)?))))
            }
            "bls12381Mul" => {
                let point = pop_bls_point(&args, 0)?;
                let scalar = arg_bytes(&args, 1)?;
                let negate = arg_bool(engine, &args, 2)?;
                Ok(Some(StackItem::interop(Rc::new(
                    point.mul(&scalar, negate)?,
                ))))
            }
            "bls12381Pairing" => {
                let g1 = pop_bls_point(&args, 0)?;
                let g2 = pop_bls_point(&args, 1)?;
                Ok(Some(StackItem::interop(Rc::new(g1.pairing(&g2)?))))
            }
            other => Err(ContractError::not_found(format!("CryptoLib::{other}"))),
        }
    }
}
