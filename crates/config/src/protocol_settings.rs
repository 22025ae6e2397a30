//! Per-network protocol settings.

use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Activation heights for each native contract, keyed by contract name.
///
/// An empty list means the native is active from genesis; otherwise the first
/// entry is the height at which the contract becomes available.
pub type NativeUpdateHistory = HashMap<String, Vec<u32>>;

/// Immutable per-network protocol settings.
///
/// Loaded once at startup and shared read-only with every component; the
/// values here change consensus behavior, so two nodes disagreeing on any of
/// them will fork.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProtocolSettings {
    /// Network magic, mixed into signature data and wire framing.
    pub network: u32,

    /// Version prefix for Base58Check addresses.
    pub address_version: u8,

    /// Initial committee public keys as hex-encoded compressed points.
    pub standby_committee: Vec<String>,

    /// Number of consensus validators drawn from the committee.
    pub validators_count: usize,

    /// Number of committee members.
    pub committee_members_count: usize,

    /// Expected interval between blocks.
    pub milliseconds_per_block: u64,

    /// Hard cap on transactions per block.
    pub max_transactions_per_block: u32,

    /// Memory pool capacity in transactions.
    pub memory_pool_max_transactions: usize,

    /// Window for historical queries and duplicate-transaction detection.
    pub max_traceable_blocks: u32,

    /// Maximum allowed distance between the current height and
    /// a transaction's `valid_until_block`.
    pub max_valid_until_block_increment: u32,

    /// GAS (in datoshi) minted to the standby committee at genesis.
    pub initial_gas_distribution: i64,

    /// Per-native activation heights.
    pub native_update_history: NativeUpdateHistory,
}

impl Default for ProtocolSettings {
    fn default() -> Self {
        Self {
            network: 0x334F454E, // "NEO3"
            address_version: 0x35,
            standby_committee: Vec::new(),
            validators_count: 7,
            committee_members_count: 21,
            milliseconds_per_block: crate::MILLISECONDS_PER_BLOCK,
            max_transactions_per_block: crate::MAX_TRANSACTIONS_PER_BLOCK,
            memory_pool_max_transactions: 50_000,
            max_traceable_blocks: crate::MAX_TRACEABLE_BLOCKS,
            max_valid_until_block_increment: crate::MAX_VALID_UNTIL_BLOCK_INCREMENT,
            initial_gas_distribution: 52_000_000 * crate::GAS_FACTOR,
            native_update_history: HashMap::new(),
        }
    }
}

impl ProtocolSettings {
    /// Loads settings from a JSON document, validating the governance sizes.
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Checks internal consistency of the loaded values.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.validators_count == 0 {
            return Err(ConfigError::InvalidValue {
                field: "validatorsCount",
                reason: "must be positive".into(),
            });
        }
        if self.committee_members_count < self.validators_count {
            return Err(ConfigError::InvalidValue {
                field: "committeeMembersCount",
                reason: format!(
                    "must be >= validatorsCount ({})",
                    self.validators_count
                ),
            });
        }
        if !self.standby_committee.is_empty()
            && self.standby_committee.len() < self.committee_members_count
        {
            return Err(ConfigError::InvalidValue {
                field: "standbyCommittee",
                reason: format!(
                    "{} keys provided, {} required",
                    self.standby_committee.len(),
                    self.committee_members_count
                ),
            });
        }
        if self.milliseconds_per_block == 0 {
            return Err(ConfigError::InvalidValue {
                field: "millisecondsPerBlock",
                reason: "must be positive".into(),
            });
        }
        Ok(())
    }

    /// The standby validators: the first `validators_count` standby committee keys.
    pub fn standby_validators(&self) -> &[String] {
        let n = self.validators_count.min(self.standby_committee.len());
        &self.standby_committee[..n]
    }

    /// Height at which the named native contract activates. `None` means the
    /// contract is active from genesis.
    pub fn native_activation_height(&self, name: &str) -> u32 {
        self.native_update_history
            .get(name)
            .and_then(|heights| heights.first().copied())
            .unwrap_or(0)
    }

    /// Allowed clock drift when validating an incoming block's timestamp.
    pub fn max_timestamp_drift_ms(&self) -> u64 {
        self.milliseconds_per_block
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_are_valid() {
        ProtocolSettings::default().validate().unwrap();
    }

    #[test]
    fn from_json_accepts_partial_documents() {
        let settings = ProtocolSettings::from_json(r#"{"network": 7}"#).unwrap();
        assert_eq!(settings.network, 7);
        assert_eq!(settings.address_version, 0x35);
    }

    #[test]
    fn rejects_committee_smaller_than_validators() {
        let err = ProtocolSettings::from_json(
            r#"{"validatorsCount": 7, "committeeMembersCount": 3}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn native_activation_defaults_to_genesis() {
        let mut settings = ProtocolSettings::default();
        assert_eq!(settings.native_activation_height("OracleContract"), 0);
        settings
            .native_update_history
            .insert("OracleContract".into(), vec![100]);
        assert_eq!(settings.native_activation_height("OracleContract"), 100);
    }
}
