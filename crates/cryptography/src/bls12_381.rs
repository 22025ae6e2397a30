//! BLS12-381 group operations backing the CryptoLib native.

use crate::error::{CryptoError, CryptoResult};
use ::bls12_381::{G1Affine, G1Projective, G2Affine, G2Projective, Gt, Scalar};
use group::Group;

/// Compressed G1 encoding size.
pub const G1_SIZE: usize = 48;
/// Compressed G2 encoding size.
pub const G2_SIZE: usize = 96;

/// A point in one of the BLS12-381 groups.
///
/// Pairing results (Gt) only exist in memory: they cannot be re-serialized,
/// matching the restriction that contracts treat them as opaque handles.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Bls12381Point {
    /// A point in G1.
    G1(G1Projective),
    /// A point in G2.
    G2(G2Projective),
    /// An element of the pairing target group.
    Gt(Gt),
}

impl Bls12381Point {
    /// Deserializes a compressed point; the group is inferred from length.
    pub fn deserialize(data: &[u8]) -> CryptoResult<Self> {
        match data.len() {
            G1_SIZE => {
                let mut bytes = [0u8; G1_SIZE];
                bytes.copy_from_slice(data);
                let point = Option::<G1Affine>::from(G1Affine::from_compressed(&bytes)).ok_or(
                    CryptoError::invalid_encoding("bls12-381 g1", "not a valid compressed point"),
                )?;
                Ok(Self::G1(point.into()))
            }
            G2_SIZE => {
                let mut bytes = [0u8; G2_SIZE];
                bytes.copy_from_slice(data);
                let point = Option::<G2Affine>::from(G2Affine::from_compressed(&bytes)).ok_or(
                    CryptoError::invalid_encoding("bls12-381 g2", "not a valid compressed point"),
                )?;
                Ok(Self::G2(point.into()))
            }
            other => Err(CryptoError::invalid_encoding(
                "bls12-381 point",
                format!("unsupported length {other}"),
            )),
        }
    }

    /// Serializes a G1 or G2 point in compressed form.
    pub fn serialize(&self) -> CryptoResult<Vec<u8>> {
        match self {
            Self::G1(p) => Ok(G1Affine::from(p).to_compressed().to_vec()),
            Self::G2(p) => Ok(G2Affine::from(p).to_compressed().to_vec()),
            Self::Gt(_) => Err(CryptoError::invalid_encoding(
                "bls12-381 gt",
                "target-group elements are not serializable",
            )),
        }
    }

    /// Adds two points of the same group.
    pub fn add(&self, other: &Self) -> CryptoResult<Self> {
        match (self, other) {
            (Self::G1(a), Self::G1(b)) => Ok(Self::G1(a + b)),
            (Self::G2(a), Self::G2(b)) => Ok(Self::G2(a + b)),
            (Self::Gt(a), Self::Gt(b)) => Ok(Self::Gt(a + b)),
            _ => Err(CryptoError::CurveMismatch("add requires matching groups")),
        }
    }

    /// Multiplies the point by a 32-byte little-endian scalar, optionally
    /// negating it first.
    pub fn mul(&self, scalar_le: &[u8], negate: bool) -> CryptoResult<Self> {
        if scalar_le.len() != 32 {
            return Err(CryptoError::invalid_encoding(
                "bls12-381 scalar",
                format!("expected 32 bytes, got {}", scalar_le.len()),
            ));
        }
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(scalar_le);
        let mut scalar = Option::<Scalar>::from(Scalar::from_bytes(&bytes)).ok_or(
            CryptoError::invalid_encoding("bls12-381 scalar", "not in the scalar field"),
        )?;
        if negate {
            scalar = -scalar;
        }
        Ok(match self {
            Self::G1(p) => Self::G1(p * scalar),
            Self::G2(p) => Self::G2(p * scalar),
            Self::Gt(p) => Self::Gt(p * scalar),
        })
    }

    /// Computes the pairing of a G1 and a G2 point.
    pub fn pairing(&self, other: &Self) -> CryptoResult<Self> {
        match (self, other) {
            (Self::G1(g1), Self::G2(g2)) => Ok(Self::Gt(::bls12_381::pairing(
                &G1Affine::from(g1),
                &G2Affine::from(g2),
            ))),
            _ => Err(CryptoError::CurveMismatch("pairing requires (g1, g2)")),
        }
    }

    /// The identity element of the same group as `self`.
    pub fn identity_like(&self) -> Self {
        match self {
            Self::G1(_) => Self::G1(G1Projective::identity()),
            Self::G2(_) => Self::G2(G2Projective::identity()),
            Self::Gt(_) => Self::Gt(Gt::identity()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn g1_generator_round_trips() {
        let bytes = G1Affine::generator().to_compressed();
        let point = Bls12381Point::deserialize(&bytes).unwrap();
        assert_eq!(point.serialize().unwrap(), bytes.to_vec());
    }

    #[test]
    fn pairing_is_bilinear_in_the_scalar() {
        let g1 = Bls12381Point::G1(G1Projective::generator());
        let g2 = Bls12381Point::G2(G2Projective::generator());

        let mut two = [0u8; 32];
        two[0] = 2;

        // e(2*G1, G2) == e(G1, G2) + e(G1, G2) in additive Gt notation.
        let lhs = g1.mul(&two, false).unwrap().pairing(&g2).unwrap();
        let single = g1.pairing(&g2).unwrap();
        let rhs = single.add(&single).unwrap();
        assert_eq!(lhs, rhs);
    }

    #[test]
    fn mismatched_groups_error() {
        let g1 = Bls12381Point::G1(G1Projective::generator());
        let g2 = Bls12381Point::G2(G2Projective::generator());
        assert!(g1.add(&g2).is_err());
        assert!(g2.pairing(&g1).is_err());
    }

    #[test]
    fn gt_does_not_serialize() {
        let g1 = Bls12381Point::G1(G1Projective::generator());
        let g2 = Bls12381Point::G2(G2Projective::generator());
        let gt = g1.pairing(&g2).unwrap();
        assert!(gt.serialize().is_err());
    }
}
