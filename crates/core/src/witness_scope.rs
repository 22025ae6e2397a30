//! Witness scopes: how far a signer's signature reaches.

use serde::{Deserialize, Serialize};

/// Bit flags limiting where a signer's witness is usable.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WitnessScope(u8);

impl WitnessScope {
    /// Only the transaction's own fee payment is authorized.
    pub const NONE: WitnessScope = WitnessScope(0x00);

    /// Valid when the calling contract is the transaction entry script.
    pub const CALLED_BY_ENTRY: WitnessScope = WitnessScope(0x01);

    /// Valid only inside the contracts listed by the signer.
    pub const CUSTOM_CONTRACTS: WitnessScope = WitnessScope(0x10);

    /// Valid only inside contracts belonging to the listed groups.
    pub const CUSTOM_GROUPS: WitnessScope = WitnessScope(0x20);

    /// Valid where the signer's witness rules allow.
    pub const WITNESS_RULES: WitnessScope = WitnessScope(0x40);

    /// Valid everywhere. Mutually exclusive with every other flag.
    pub const GLOBAL: WitnessScope = WitnessScope(0x80);

    /// Parses a scope byte, rejecting undefined bits and an inconsistent
    /// Global combination.
    pub fn from_byte(value: u8) -> Option<Self> {
        const DEFINED: u8 = 0x01 | 0x10 | 0x20 | 0x40 | 0x80;
        if value & !DEFINED != 0 {
            return None;
        }
        let scope = WitnessScope(value);
        if scope.has_flag(Self::GLOBAL) && value != Self::GLOBAL.0 {
            return None;
        }
        Some(scope)
    }

    /// The raw scope byte.
    pub fn to_byte(self) -> u8 {
        self.0
    }

    /// Whether all bits of `flag` are set.
    pub fn has_flag(self, flag: WitnessScope) -> bool {
        self.0 & flag.0 == flag.0 && (flag.0 != 0 || self.0 == 0)
    }

    /// Union of two scopes.
    pub fn combine(self, other: WitnessScope) -> Self {
        WitnessScope(self.0 | other.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_is_exclusive() {
        assert!(WitnessScope::from_byte(0x80).is_some());
        assert!(WitnessScope::from_byte(0x81).is_none());
    }

    #[test]
    fn undefined_bits_rejected() {
        assert!(WitnessScope::from_byte(0x02).is_none());
        assert!(WitnessScope::from_byte(0x08).is_none());
    }

    #[test]
    fn none_matches_only_none() {
        assert!(WitnessScope::NONE.has_flag(WitnessScope::NONE));
        assert!(!WitnessScope::CALLED_BY_ENTRY.has_flag(WitnessScope::NONE));
    }

    #[test]
    fn combined_flags_query_individually() {
        let scope = WitnessScope::CALLED_BY_ENTRY.combine(WitnessScope::CUSTOM_CONTRACTS);
        assert!(scope.has_flag(WitnessScope::CALLED_BY_ENTRY));
        assert!(scope.has_flag(WitnessScope::CUSTOM_CONTRACTS));
        assert!(!scope.has_flag(WitnessScope::GLOBAL));
    }
}
