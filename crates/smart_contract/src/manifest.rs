//! Contract manifests: ABI, permissions, groups and trusts.
//!
//! Manifests live on-chain as JSON. Deserialization tolerates unknown fields
//! for forward compatibility; `to_json_string` emits the canonical ordered
//! form used for hashing and storage.

use crate::{ContractError, ContractResult};
use neo3_core::UInt160;
use neo3_cryptography::ECPoint;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A method parameter declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractParameterDefinition {
    /// Parameter name.
    pub name: String,
    /// Parameter type name (`Integer`, `ByteArray`, `Hash160`, ...).
    #[serde(rename = "type")]
    pub parameter_type: String,
}

/// A method declaration in the ABI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractMethodDescriptor {
    /// Method name.
    pub name: String,
    /// Declared parameters, in call order.
    #[serde(default)]
    pub parameters: Vec<ContractParameterDefinition>,
    /// Return type name.
    #[serde(rename = "returntype", default)]
    pub return_type: String,
    /// Entry offset into the NEF script.
    #[serde(default)]
    pub offset: u32,
    /// Whether the method is read-only.
    #[serde(default)]
    pub safe: bool,
}

/// An event declaration in the ABI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractEventDescriptor {
    /// Event name.
    pub name: String,
    /// Declared event fields.
    #[serde(default)]
    pub parameters: Vec<ContractParameterDefinition>,
}

/// The contract ABI: methods and events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractAbi {
    /// Declared methods.
    #[serde(default)]
    pub methods: Vec<ContractMethodDescriptor>,
    /// Declared events.
    #[serde(default)]
    pub events: Vec<ContractEventDescriptor>,
}

impl ContractAbi {
    /// Finds a method by name and parameter count.
    pub fn get_method(&self, name: &str, parameter_count: usize) -> Option<&ContractMethodDescriptor> {
        self.methods
            .iter()
            .find(|m| m.name == name && m.parameters.len() == parameter_count)
            .or_else(|| self.methods.iter().find(|m| m.name == name))
    }
}

/// A group a contract belongs to: a public key plus the key's signature over
/// the contract hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractGroup {
    /// Group public key.
    #[serde(rename = "pubkey")]
    pub public_key: ECPoint,
    /// Base64 signature of the contract hash by that key.
    pub signature: String,
}

/// What a permission entry applies to: one contract, one group, or anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionContract {
    /// Any contract.
    Wildcard,
    /// A specific contract hash.
    Hash(UInt160),
    /// Any contract of a group.
    Group(ECPoint),
}

impl Serialize for PermissionContract {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            PermissionContract::Wildcard => serializer.serialize_str("*"),
            PermissionContract::Hash(hash) => serializer.serialize_str(&hash.to_hex()),
            PermissionContract::Group(point) => serializer.serialize_str(&point.to_hex()),
        }
    }
}

impl<'de> Deserialize<'de> for PermissionContract {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        if text == "*" {
            return Ok(PermissionContract::Wildcard);
        }
        if let Ok(point) = ECPoint::from_hex(&text) {
            return Ok(PermissionContract::Group(point));
        }
        UInt160::from_hex(&text)
            .map(PermissionContract::Hash)
            .map_err(serde::de::Error::custom)
    }
}

/// Methods a permission entry covers: everything or an explicit list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WildcardContainer {
    /// All methods.
    Wildcard,
    /// Only the listed methods.
    List(Vec<String>),
}

impl WildcardContainer {
    /// Whether `value` is covered.
    pub fn contains(&self, value: &str) -> bool {
        match self {
            WildcardContainer::Wildcard => true,
            WildcardContainer::List(items) => items.iter().any(|item| item == value),
        }
    }
}

impl Serialize for WildcardContainer {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            WildcardContainer::Wildcard => serializer.serialize_str("*"),
            WildcardContainer::List(items) => items.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for WildcardContainer {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        match value {
            Value::String(s) if s == "*" => Ok(WildcardContainer::Wildcard),
            Value::Array(items) => {
                let mut list = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Value::String(s) => list.push(s),
                        other => {
                            return Err(serde::de::Error::custom(format!(
                                "expected string, got {other}"
                            )))
                        }
                    }
                }
                Ok(WildcardContainer::List(list))
            }
            other => Err(serde::de::Error::custom(format!(
                "expected \"*\" or a list, got {other}"
            ))),
        }
    }
}

/// One permission: which contract(s) may be called, and which methods.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractPermission {
    /// Target contract, group or wildcard.
    pub contract: PermissionContract,
    /// Permitted methods.
    pub methods: WildcardContainer,
}

impl ContractPermission {
    /// The permissive default.
    pub fn default_permission() -> Self {
        Self {
            contract: PermissionContract::Wildcard,
            methods: WildcardContainer::Wildcard,
        }
    }

    /// Whether this entry allows calling `method` on the target contract.
    pub fn is_allowed(&self, target_hash: &UInt160, target_manifest: &ContractManifest, method: &str) -> bool {
        let contract_matches = match &self.contract {
            PermissionContract::Wildcard => true,
            PermissionContract::Hash(hash) => hash == target_hash,
            PermissionContract::Group(group) => target_manifest
                .groups
                .iter()
                .any(|g| g.public_key == *group),
        };
        contract_matches && self.methods.contains(method)
    }
}

/// The contract manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractManifest {
    /// Contract name.
    pub name: String,
    /// Groups the contract claims membership of.
    #[serde(default)]
    pub groups: Vec<ContractGroup>,
    /// Reserved feature object.
    #[serde(default)]
    pub features: serde_json::Map<String, Value>,
    /// Supported standards (e.g. "NEP-17").
    #[serde(rename = "supportedstandards", default)]
    pub supported_standards: Vec<String>,
    /// The ABI.
    #[serde(default)]
    pub abi: ContractAbi,
    /// Outgoing-call permissions.
    #[serde(default)]
    pub permissions: Vec<ContractPermission>,
    /// Contracts trusted to call back.
    #[serde(default = "trusts_default")]
    pub trusts: WildcardContainer,
    /// Free-form metadata.
    #[serde(default)]
    pub extra: Value,
}

fn trusts_default() -> WildcardContainer {
    WildcardContainer::List(Vec::new())
}

impl ContractManifest {
    /// Maximum serialized manifest length in bytes.
    pub const MAX_LENGTH: usize = u16::MAX as usize;

    /// A minimal manifest with full outgoing permissions.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            groups: Vec::new(),
            features: serde_json::Map::new(),
            supported_standards: Vec::new(),
            abi: ContractAbi::default(),
            permissions: vec![ContractPermission::default_permission()],
            trusts: WildcardContainer::Wildcard,
            extra: Value::Null,
        }
    }

    /// Parses a manifest document, tolerating unknown fields.
    pub fn from_json_str(json: &str) -> ContractResult<Self> {
        if json.len() > Self::MAX_LENGTH {
            return Err(ContractError::invalid_argument("manifest too long"));
        }
        let manifest: Self = serde_json::from_str(json)
            .map_err(|e| ContractError::invalid_argument(format!("manifest: {e}")))?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Canonical JSON form (field order fixed by the struct definition).
    pub fn to_json_string(&self) -> String {
        serde_json::to_string(self).expect("manifest serialization cannot fail")
    }

    /// Structural checks.
    pub fn validate(&self) -> ContractResult<()> {
        if self.name.is_empty() {
            return Err(ContractError::invalid_argument("manifest name is empty"));
        }
        for method in &self.abi.methods {
            if method.name.is_empty() {
                return Err(ContractError::invalid_argument("ABI method without name"));
            }
        }
        Ok(())
    }

    /// Whether this manifest permits calling `method` on the target.
    pub fn permits_call(
        &self,
        target_hash: &UInt160,
        target_manifest: &ContractManifest,
        method: &str,
    ) -> bool {
        self.permissions
            .iter()
            .any(|permission| permission.is_allowed(target_hash, target_manifest, method))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_minimal_manifest() {
        let manifest = ContractManifest::new("Token");
        let json = manifest.to_json_string();
        let restored = ContractManifest::from_json_str(&json).unwrap();
        assert_eq!(restored, manifest);
    }

    #[test]
    fn unknown_fields_are_tolerated() {
        let json = r#"{"name":"X","futureField":42,"permissions":[{"contract":"*","methods":"*"}]}"#;
        let manifest = ContractManifest::from_json_str(json).unwrap();
        assert_eq!(manifest.name, "X");
    }

    #[test]
    fn empty_name_rejected() {
        assert!(ContractManifest::from_json_str(r#"{"name":""}"#).is_err());
    }

    #[test]
    fn permission_lists_restrict_methods() {
        let mut caller = ContractManifest::new("caller");
        let target_hash = UInt160::from_array([7u8; 20]);
        caller.permissions = vec![ContractPermission {
            contract: PermissionContract::Hash(target_hash),
            methods: WildcardContainer::List(vec!["transfer".into()]),
        }];
        let target = ContractManifest::new("target");

        assert!(caller.permits_call(&target_hash, &target, "transfer"));
        assert!(!caller.permits_call(&target_hash, &target, "mint"));
        assert!(!caller.permits_call(&UInt160::zero(), &target, "transfer"));
    }
}
