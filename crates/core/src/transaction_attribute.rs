//! Transaction attributes.

use crate::{UInt256, CoreError, CoreResult};
use neo3_io::{helper, BinaryWriter, IoError, IoResult, MemoryReader, Serializable};
use serde::{Deserialize, Serialize};

/// Maximum size of an oracle response payload in bytes.
pub const MAX_ORACLE_RESULT_SIZE: usize = 0xffff;

/// Result codes an oracle node may attach to a response.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum OracleResponseCode {
    /// The request completed.
    Success = 0x00,
    /// The requested protocol is not supported.
    ProtocolNotSupported = 0x10,
    /// The oracle nodes could not reach consensus on the result.
    ConsensusUnreachable = 0x12,
    /// The requested resource does not exist.
    NotFound = 0x14,
    /// The request timed out.
    Timeout = 0x16,
    /// Access to the resource was denied.
    Forbidden = 0x18,
    /// The response body exceeded the size limit.
    ResponseTooLarge = 0x1a,
    /// The requester cannot cover the response fee.
    InsufficientFunds = 0x1c,
    /// The content type is not supported.
    ContentTypeNotSupported = 0x1f,
    /// Any other failure.
    Error = 0xff,
}

impl OracleResponseCode {
    /// Parses a code byte.
    pub fn from_byte(value: u8) -> Option<Self> {
        Some(match value {
            0x00 => Self::Success,
            0x10 => Self::ProtocolNotSupported,
            0x12 => Self::ConsensusUnreachable,
            0x14 => Self::NotFound,
            0x16 => Self::Timeout,
            0x18 => Self::Forbidden,
            0x1a => Self::ResponseTooLarge,
            0x1c => Self::InsufficientFunds,
            0x1f => Self::ContentTypeNotSupported,
            0xff => Self::Error,
            _ => return None,
        })
    }
}

/// An optional, typed annotation on a transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionAttribute {
    /// Grants the transaction the high-priority mempool lane. Only valid
    /// when witnessed by the committee.
    HighPriority,

    /// Carries an oracle response back on-chain.
    OracleResponse {
        /// The request being answered.
        id: u64,
        /// Outcome of the fetch.
        code: OracleResponseCode,
        /// Response payload; empty unless `code` is `Success`.
        result: Vec<u8>,
    },

    /// The transaction is invalid before the given height.
    NotValidBefore {
        /// First height at which the transaction may be included.
        height: u32,
    },

    /// The transaction conflicts with another candidate transaction.
    Conflicts {
        /// Hash of the conflicting transaction.
        hash: UInt256,
    },
}

impl TransactionAttribute {
    const TYPE_HIGH_PRIORITY: u8 = 0x01;
    const TYPE_ORACLE_RESPONSE: u8 = 0x11;
    const TYPE_NOT_VALID_BEFORE: u8 = 0x20;
    const TYPE_CONFLICTS: u8 = 0x21;

    /// The wire type byte.
    pub fn attribute_type(&self) -> u8 {
        match self {
            Self::HighPriority => Self::TYPE_HIGH_PRIORITY,
            Self::OracleResponse { .. } => Self::TYPE_ORACLE_RESPONSE,
            Self::NotValidBefore { .. } => Self::TYPE_NOT_VALID_BEFORE,
            Self::Conflicts { .. } => Self::TYPE_CONFLICTS,
        }
    }

    /// Whether a transaction may carry several attributes of this kind.
    /// Every kind is limited to a single occurrence.
    pub fn allow_multiple(&self) -> bool {
        false
    }

    /// Structural checks that do not need chain state.
    pub fn verify(&self) -> CoreResult<()> {
        match self {
            Self::OracleResponse { code, result, .. } => {
                if result.len() > MAX_ORACLE_RESULT_SIZE {
                    return Err(CoreError::invalid_data("oracle result too large"));
                }
                if *code != OracleResponseCode::Success && !result.is_empty() {
                    return Err(CoreError::invalid_data(
                        "oracle failure responses must carry no result",
                    ));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

impl Serializable for TransactionAttribute {
    fn size(&self) -> usize {
        1 + match self {
            Self::HighPriority => 0,
            Self::OracleResponse { result, .. } => 8 + 1 + helper::get_var_bytes_size(result),
            Self::NotValidBefore { .. } => 4,
            Self::Conflicts { .. } => neo3_config::HASH_SIZE,
        }
    }

    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_byte(self.attribute_type());
        match self {
            Self::HighPriority => {}
            Self::OracleResponse { id, code, result } => {
                writer.write_u64(*id);
                writer.write_byte(*code as u8);
                writer.write_var_bytes(result);
            }
            Self::NotValidBefore { height } => writer.write_u32(*height),
            Self::Conflicts { hash } => Serializable::serialize(hash, writer),
        }
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        let attribute_type = reader.read_byte()?;
        match attribute_type {
            Self::TYPE_HIGH_PRIORITY => Ok(Self::HighPriority),
            Self::TYPE_ORACLE_RESPONSE => {
                let id = reader.read_u64()?;
                let code =
                    OracleResponseCode::from_byte(reader.read_byte()?).ok_or_else(|| {
                        IoError::InvalidFormat {
                            context: "transaction-attribute",
                            reason: "unknown oracle response code".into(),
                        }
                    })?;
                let result = reader.read_var_bytes(MAX_ORACLE_RESULT_SIZE)?;
                if code != OracleResponseCode::Success && !result.is_empty() {
                    return Err(IoError::InvalidFormat {
                        context: "transaction-attribute",
                        reason: "non-success oracle response with payload".into(),
                    });
                }
                Ok(Self::OracleResponse { id, code, result })
            }
            Self::TYPE_NOT_VALID_BEFORE => Ok(Self::NotValidBefore {
                height: reader.read_u32()?,
            }),
            Self::TYPE_CONFLICTS => Ok(Self::Conflicts {
                hash: <UInt256 as Serializable>::deserialize(reader)?,
            }),
            other => Err(IoError::InvalidFormat {
                context: "transaction-attribute",
                reason: format!("unknown attribute type 0x{other:02x}"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use neo3_io::SerializableExt;

    #[test]
    fn round_trip_all_kinds() {
        let attributes = [
            TransactionAttribute::HighPriority,
            TransactionAttribute::OracleResponse {
                id: 42,
                code: OracleResponseCode::Success,
                result: vec![1, 2, 3],
            },
            TransactionAttribute::NotValidBefore { height: 1000 },
            TransactionAttribute::Conflicts {
                hash: UInt256::from_array([5u8; 32]),
            },
        ];
        for attribute in attributes {
            let restored: TransactionAttribute =
                SerializableExt::from_array(&attribute.to_array()).unwrap();
            assert_eq!(restored, attribute);
            assert_eq!(attribute.size(), attribute.to_array().len());
        }
    }

    #[test]
    fn failure_response_with_payload_rejected() {
        let attribute = TransactionAttribute::OracleResponse {
            id: 1,
            code: OracleResponseCode::Timeout,
            result: vec![0xaa],
        };
        assert!(attribute.verify().is_err());
        assert!(
            <TransactionAttribute as SerializableExt>::from_array(&attribute.to_array()).is_err()
        );
    }

    #[test]
    fn no_kind_allows_multiple() {
        assert!(!TransactionAttribute::Conflicts {
            hash: UInt256::zero()
        }
        .allow_multiple());
        assert!(!TransactionAttribute::HighPriority.allow_multiple());
    }
}
