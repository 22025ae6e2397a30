//! Witness: the (invocation, verification) script pair proving authority.

use crate::UInt160;
use neo3_config::{MAX_INVOCATION_SCRIPT_SIZE, MAX_VERIFICATION_SCRIPT_SIZE};
use neo3_io::{helper, BinaryWriter, IoResult, MemoryReader, Serializable};
use serde::{Deserialize, Serialize};

/// A witness authorizing a signer or a block.
///
/// The invocation script pushes arguments (typically signatures); the
/// verification script consumes them and leaves a truthy value on success.
/// The hash of the verification script doubles as the account it proves.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Witness {
    /// Script pushing the witness arguments.
    pub invocation_script: Vec<u8>,

    /// Script whose hash identifies the account being proven.
    pub verification_script: Vec<u8>,
}

impl Witness {
    /// Creates a witness from the two scripts.
    pub fn new(invocation_script: Vec<u8>, verification_script: Vec<u8>) -> Self {
        Self {
            invocation_script,
            verification_script,
        }
    }

    /// An empty witness, used while a transaction is still being signed.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Hash160 of the verification script: the account this witness proves.
    pub fn script_hash(&self) -> UInt160 {
        UInt160::from_array(neo3_cryptography::hash::hash160(&self.verification_script))
    }
}

impl Serializable for Witness {
    fn size(&self) -> usize {
        helper::get_var_bytes_size(&self.invocation_script)
            + helper::get_var_bytes_size(&self.verification_script)
    }

    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_var_bytes(&self.invocation_script);
        writer.write_var_bytes(&self.verification_script);
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        let invocation_script = reader.read_var_bytes(MAX_INVOCATION_SCRIPT_SIZE)?;
        let verification_script = reader.read_var_bytes(MAX_VERIFICATION_SCRIPT_SIZE)?;
        Ok(Self {
            invocation_script,
            verification_script,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use neo3_io::SerializableExt;

    #[test]
    fn round_trip() {
        let witness = Witness::new(vec![0x0c, 0x40, 0xaa], vec![0x41, 0x56, 0xe7, 0xb3, 0x27]);
        let restored: Witness = SerializableExt::from_array(&witness.to_array()).unwrap();
        assert_eq!(restored, witness);
        assert_eq!(witness.size(), witness.to_array().len());
    }

    #[test]
    fn script_hash_is_hash160_of_verification() {
        let witness = Witness::new(vec![], vec![1, 2, 3]);
        assert_eq!(
            witness.script_hash().as_bytes(),
            &neo3_cryptography::hash::hash160(&[1, 2, 3])
        );
    }

    #[test]
    fn oversize_invocation_rejected() {
        let witness = Witness::new(vec![0; MAX_INVOCATION_SCRIPT_SIZE + 1], vec![]);
        let bytes = witness.to_array();
        assert!(<Witness as SerializableExt>::from_array(&bytes).is_err());
    }
}
