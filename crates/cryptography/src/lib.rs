//! Cryptographic facade for the Neo N3 core.
//!
//! Delegates to vetted implementations (`sha2`, `ripemd`, `sha3`, `p256`,
//! `k256`, `bls12_381`) and keeps library-specific types out of the rest of
//! the core. Signature verification never errors on bad input: an invalid
//! signature, key or encoding verifies as `false`.

pub mod base58;
pub mod base64;
pub mod bls12_381;
pub mod ecdsa;
mod ecpoint;
mod error;
pub mod hash;
pub mod merkle_tree;
pub mod murmur;

pub use ecdsa::Curve;
pub use ecpoint::{ECPoint, EC_POINT_SIZE};
pub use error::{CryptoError, CryptoResult};
