//! Transaction signers and their witness scopes.

use crate::{UInt160, WitnessRule, WitnessScope};
use neo3_cryptography::ECPoint;
use neo3_io::{helper, BinaryWriter, IoError, IoResult, MemoryReader, Serializable};
use serde::{Deserialize, Serialize};

/// Maximum number of allowed contracts, groups or rules per signer.
pub const MAX_SUBITEMS: usize = 16;

/// A party authorizing a transaction, with the reach of its witness.
///
/// The first signer of a transaction is the sender and pays the fees. The
/// optional lists are only present on the wire when the matching scope flag
/// is set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signer {
    /// The account whose witness must be provided.
    pub account: UInt160,

    /// How far the witness reaches.
    pub scopes: WitnessScope,

    /// Contracts the witness is valid in (CustomContracts).
    pub allowed_contracts: Vec<UInt160>,

    /// Contract groups the witness is valid in (CustomGroups).
    pub allowed_groups: Vec<ECPoint>,

    /// Fine-grained rules (WitnessRules).
    pub rules: Vec<WitnessRule>,
}

impl Signer {
    /// Creates a signer with the given scope and no custom lists.
    pub fn new(account: UInt160, scopes: WitnessScope) -> Self {
        Self {
            account,
            scopes,
            allowed_contracts: Vec::new(),
            allowed_groups: Vec::new(),
            rules: Vec::new(),
        }
    }

    /// A signer whose witness is valid everywhere.
    pub fn global(account: UInt160) -> Self {
        Self::new(account, WitnessScope::GLOBAL)
    }

    /// A signer restricted to the entry script.
    pub fn called_by_entry(account: UInt160) -> Self {
        Self::new(account, WitnessScope::CALLED_BY_ENTRY)
    }
}

impl Serializable for Signer {
    fn size(&self) -> usize {
        let mut size = self.account.size() + 1;
        if self.scopes.has_flag(WitnessScope::CUSTOM_CONTRACTS) {
            size += helper::get_array_size(&self.allowed_contracts);
        }
        if self.scopes.has_flag(WitnessScope::CUSTOM_GROUPS) {
            size += helper::get_var_size(self.allowed_groups.len() as u64)
                + self.allowed_groups.len() * neo3_cryptography::EC_POINT_SIZE;
        }
        if self.scopes.has_flag(WitnessScope::WITNESS_RULES) {
            size += helper::get_array_size(&self.rules);
        }
        size
    }

    fn serialize(&self, writer: &mut BinaryWriter) {
        Serializable::serialize(&self.account, writer);
        writer.write_byte(self.scopes.to_byte());
        if self.scopes.has_flag(WitnessScope::CUSTOM_CONTRACTS) {
            writer.write_serializable_list(&self.allowed_contracts);
        }
        if self.scopes.has_flag(WitnessScope::CUSTOM_GROUPS) {
            writer.write_var_int(self.allowed_groups.len() as u64);
            for group in &self.allowed_groups {
                writer.write_bytes(group.as_bytes());
            }
        }
        if self.scopes.has_flag(WitnessScope::WITNESS_RULES) {
            writer.write_serializable_list(&self.rules);
        }
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        let account = <UInt160 as Serializable>::deserialize(reader)?;
        let scopes = WitnessScope::from_byte(reader.read_byte()?).ok_or_else(|| {
            IoError::InvalidFormat {
                context: "signer",
                reason: "invalid witness scope".into(),
            }
        })?;

        let allowed_contracts = if scopes.has_flag(WitnessScope::CUSTOM_CONTRACTS) {
            reader.read_serializable_list::<UInt160>(MAX_SUBITEMS)?
        } else {
            Vec::new()
        };

        let allowed_groups = if scopes.has_flag(WitnessScope::CUSTOM_GROUPS) {
            let count = reader.read_var_int(MAX_SUBITEMS as u64)? as usize;
            let mut groups = Vec::with_capacity(count);
            for _ in 0..count {
                let bytes = reader.read_bytes(neo3_cryptography::EC_POINT_SIZE)?;
                groups.push(ECPoint::from_bytes(&bytes).map_err(|e| IoError::InvalidFormat {
                    context: "signer",
                    reason: e.to_string(),
                })?);
            }
            groups
        } else {
            Vec::new()
        };

        let rules = if scopes.has_flag(WitnessScope::WITNESS_RULES) {
            reader.read_serializable_list::<WitnessRule>(MAX_SUBITEMS)?
        } else {
            Vec::new()
        };

        Ok(Self {
            account,
            scopes,
            allowed_contracts,
            allowed_groups,
            rules,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use neo3_io::SerializableExt;

    #[test]
    fn round_trip_simple_scope() {
        let signer = Signer::called_by_entry(UInt160::from_array([3u8; 20]));
        let restored: Signer = SerializableExt::from_array(&signer.to_array()).unwrap();
        assert_eq!(restored, signer);
        assert_eq!(signer.size(), signer.to_array().len());
    }

    #[test]
    fn round_trip_custom_contracts() {
        let mut signer = Signer::new(
            UInt160::from_array([9u8; 20]),
            WitnessScope::CALLED_BY_ENTRY.combine(WitnessScope::CUSTOM_CONTRACTS),
        );
        signer.allowed_contracts = vec![UInt160::zero(), UInt160::from_array([1u8; 20])];
        let restored: Signer = SerializableExt::from_array(&signer.to_array()).unwrap();
        assert_eq!(restored, signer);
    }

    #[test]
    fn custom_lists_absent_when_flag_clear() {
        let mut signer = Signer::global(UInt160::zero());
        signer.allowed_contracts = vec![UInt160::zero()];
        // The list is not written because CustomContracts is not set.
        assert_eq!(signer.to_array().len(), 21);
    }

    #[test]
    fn rejects_invalid_scope_byte() {
        let mut bytes = Signer::global(UInt160::zero()).to_array();
        bytes[20] = 0x02;
        assert!(<Signer as SerializableExt>::from_array(&bytes).is_err());
    }
}
