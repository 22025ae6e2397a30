//! Witness rules: condition trees gating a signer's witness.

use crate::UInt160;
use neo3_cryptography::ECPoint;
use neo3_io::{helper, BinaryWriter, IoResult, MemoryReader, Serializable};
use serde::{Deserialize, Serialize};

/// Maximum nesting depth of a condition tree on the wire.
pub const MAX_NESTING_DEPTH: usize = 2;

/// Maximum number of sub-conditions of an And/Or node.
pub const MAX_SUBITEMS: usize = 16;

/// Whether a matching rule admits or rejects the witness.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum WitnessRuleAction {
    /// A matching condition rejects the witness.
    Deny = 0,
    /// A matching condition admits the witness.
    Allow = 1,
}

/// A single rule: an action plus the condition that triggers it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WitnessRule {
    /// What happens when the condition holds.
    pub action: WitnessRuleAction,
    /// The condition evaluated against the current call context.
    pub condition: WitnessCondition,
}

/// Condition tree over the execution context of a witness check.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WitnessCondition {
    /// A constant.
    Boolean(bool),
    /// Negation of the inner condition.
    Not(Box<WitnessCondition>),
    /// All sub-conditions must hold.
    And(Vec<WitnessCondition>),
    /// At least one sub-condition must hold.
    Or(Vec<WitnessCondition>),
    /// The executing contract's script hash equals the given hash.
    ScriptHash(UInt160),
    /// The executing contract belongs to the given group.
    Group(ECPoint),
    /// The calling contract is the transaction entry script.
    CalledByEntry,
    /// The calling contract's script hash equals the given hash.
    CalledByContract(UInt160),
    /// The calling contract belongs to the given group.
    CalledByGroup(ECPoint),
}

impl WitnessCondition {
    const TYPE_BOOLEAN: u8 = 0x00;
    const TYPE_NOT: u8 = 0x01;
    const TYPE_AND: u8 = 0x02;
    const TYPE_OR: u8 = 0x03;
    const TYPE_SCRIPT_HASH: u8 = 0x18;
    const TYPE_GROUP: u8 = 0x19;
    const TYPE_CALLED_BY_ENTRY: u8 = 0x20;
    const TYPE_CALLED_BY_CONTRACT: u8 = 0x28;
    const TYPE_CALLED_BY_GROUP: u8 = 0x29;

    /// The wire type byte.
    pub fn condition_type(&self) -> u8 {
        match self {
            Self::Boolean(_) => Self::TYPE_BOOLEAN,
            Self::Not(_) => Self::TYPE_NOT,
            Self::And(_) => Self::TYPE_AND,
            Self::Or(_) => Self::TYPE_OR,
            Self::ScriptHash(_) => Self::TYPE_SCRIPT_HASH,
            Self::Group(_) => Self::TYPE_GROUP,
            Self::CalledByEntry => Self::TYPE_CALLED_BY_ENTRY,
            Self::CalledByContract(_) => Self::TYPE_CALLED_BY_CONTRACT,
            Self::CalledByGroup(_) => Self::TYPE_CALLED_BY_GROUP,
        }
    }

    fn deserialize_at(reader: &mut MemoryReader<'_>, max_depth: usize) -> IoResult<Self> {
        let condition_type = reader.read_byte()?;
        match condition_type {
            Self::TYPE_BOOLEAN => Ok(Self::Boolean(reader.read_bool()?)),
            Self::TYPE_NOT => {
                if max_depth == 0 {
                    return Err(neo3_io::IoError::InvalidFormat {
                        context: "witness-condition",
                        reason: "nesting too deep".into(),
                    });
                }
                Ok(Self::Not(Box::new(Self::deserialize_at(
                    reader,
                    max_depth - 1,
                )?)))
            }
            Self::TYPE_AND | Self::TYPE_OR => {
                if max_depth == 0 {
                    return Err(neo3_io::IoError::InvalidFormat {
                        context: "witness-condition",
                        reason: "nesting too deep".into(),
                    });
                }
                let count = reader.read_var_int(MAX_SUBITEMS as u64)? as usize;
                if count == 0 {
                    return Err(neo3_io::IoError::InvalidFormat {
                        context: "witness-condition",
                        reason: "empty And/Or".into(),
                    });
                }
                let mut items = Vec::with_capacity(count);
                for _ in 0..count {
                    items.push(Self::deserialize_at(reader, max_depth - 1)?);
                }
                if condition_type == Self::TYPE_AND {
                    Ok(Self::And(items))
                } else {
                    Ok(Self::Or(items))
                }
            }
            Self::TYPE_SCRIPT_HASH => Ok(Self::ScriptHash(<UInt160 as Serializable>::deserialize(reader)?)),
            Self::TYPE_GROUP => Ok(Self::Group(read_point(reader)?)),
            Self::TYPE_CALLED_BY_ENTRY => Ok(Self::CalledByEntry),
            Self::TYPE_CALLED_BY_CONTRACT => {
                Ok(Self::CalledByContract(<UInt160 as Serializable>::deserialize(reader)?))
            }
            Self::TYPE_CALLED_BY_GROUP => Ok(Self::CalledByGroup(read_point(reader)?)),
            other => Err(neo3_io::IoError::InvalidFormat {
                context: "witness-condition",
                reason: format!("unknown condition type 0x{other:02x}"),
            }),
        }
    }
}

fn read_point(reader: &mut MemoryReader<'_>) -> IoResult<ECPoint> {
    let bytes = reader.read_bytes(neo3_cryptography::EC_POINT_SIZE)?;
    ECPoint::from_bytes(&bytes).map_err(|e| neo3_io::IoError::InvalidFormat {
        context: "witness-condition",
        reason: e.to_string(),
    })
}

impl Serializable for WitnessCondition {
    fn size(&self) -> usize {
        1 + match self {
            Self::Boolean(_) => 1,
            Self::Not(inner) => inner.size(),
            Self::And(items) | Self::Or(items) => helper::get_array_size(items),
            Self::ScriptHash(_) | Self::CalledByContract(_) => neo3_config::ADDRESS_SIZE,
            Self::Group(_) | Self::CalledByGroup(_) => neo3_cryptography::EC_POINT_SIZE,
            Self::CalledByEntry => 0,
        }
    }

    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_byte(self.condition_type());
        match self {
            Self::Boolean(value) => writer.write_bool(*value),
            Self::Not(inner) => Serializable::serialize(inner.as_ref(), writer),
            Self::And(items) | Self::Or(items) => writer.write_serializable_list(items),
            Self::ScriptHash(hash) | Self::CalledByContract(hash) => Serializable::serialize(hash, writer),
            Self::Group(point) | Self::CalledByGroup(point) => {
                writer.write_bytes(point.as_bytes())
            }
            Self::CalledByEntry => {}
        }
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        Self::deserialize_at(reader, MAX_NESTING_DEPTH)
    }
}

impl Serializable for WitnessRule {
    fn size(&self) -> usize {
        1 + self.condition.size()
    }

    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_byte(self.action as u8);
        Serializable::serialize(&self.condition, writer);
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        let action = match reader.read_byte()? {
            0 => WitnessRuleAction::Deny,
            1 => WitnessRuleAction::Allow,
            other => {
                return Err(neo3_io::IoError::InvalidFormat {
                    context: "witness-rule",
                    reason: format!("unknown action 0x{other:02x}"),
                })
            }
        };
        Ok(Self {
            action,
            condition: <WitnessCondition as Serializable>::deserialize(reader)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use neo3_io::SerializableExt;

    #[test]
    fn round_trip_nested_condition() {
        let rule = WitnessRule {
            action: WitnessRuleAction::Allow,
            condition: WitnessCondition::Or(vec![
                WitnessCondition::CalledByEntry,
                WitnessCondition::Not(Box::new(WitnessCondition::ScriptHash(UInt160::zero()))),
            ]),
        };
        let restored: WitnessRule = SerializableExt::from_array(&rule.to_array()).unwrap();
        assert_eq!(restored, rule);
        assert_eq!(rule.size(), rule.to_array().len());
    }

    #[test]
    fn rejects_too_deep_nesting() {
        // Not(Not(Not(Boolean))) exceeds the depth limit of 2.
        let condition = WitnessCondition::Not(Box::new(WitnessCondition::Not(Box::new(
            WitnessCondition::Not(Box::new(WitnessCondition::Boolean(true))),
        ))));
        let bytes = condition.to_array();
        assert!(<WitnessCondition as SerializableExt>::from_array(&bytes).is_err());
    }

    #[test]
    fn rejects_unknown_condition_type() {
        assert!(<WitnessCondition as SerializableExt>::from_array(&[0x77]).is_err());
    }

    #[test]
    fn rejects_empty_and() {
        let bytes = [WitnessCondition::TYPE_AND, 0x00];
        assert!(<WitnessCondition as SerializableExt>::from_array(&bytes).is_err());
    }
}
