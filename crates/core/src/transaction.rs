//! Transactions: the unit of user-submitted work.

use crate::{CoreError, CoreResult, Signer, TransactionAttribute, UInt160, UInt256, Witness};
use neo3_config::{MAX_TRANSACTION_ATTRIBUTES, MAX_TRANSACTION_SIZE};
use neo3_cryptography::hash;
use neo3_io::{helper, BinaryWriter, IoError, IoResult, MemoryReader, Serializable};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

/// Maximum number of signers (and witnesses) per transaction.
pub const MAX_SIGNERS: usize = 16;

/// Fixed-width portion of the unsigned transaction:
/// version + nonce + system fee + network fee + valid-until-block.
pub const HEADER_SIZE: usize = 1 + 4 + 8 + 8 + 4;

/// A signed script submitted for on-chain execution.
///
/// The transaction id is the double SHA-256 of the unsigned form and is
/// memoized after first computation; mutating a field after hashing is a
/// logic error, so construction should finish before the hash is requested.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Transaction {
    /// Format version; only 0 is defined.
    pub version: u8,

    /// Random value making otherwise-identical transactions distinct.
    pub nonce: u32,

    /// GAS (datoshi) paid for execution; the Application-trigger budget.
    pub system_fee: i64,

    /// GAS (datoshi) paid for size and witness verification.
    pub network_fee: i64,

    /// Last height at which this transaction may be included.
    pub valid_until_block: u32,

    /// Authorizing parties; the first signer pays the fees.
    pub signers: Vec<Signer>,

    /// Typed annotations.
    pub attributes: Vec<TransactionAttribute>,

    /// The script executed under the Application trigger.
    pub script: Vec<u8>,

    /// One witness per signer, same order.
    pub witnesses: Vec<Witness>,

    #[serde(skip)]
    hash: OnceCell<UInt256>,
}

impl PartialEq for Transaction {
    fn eq(&self, other: &Self) -> bool {
        self.hash() == other.hash()
    }
}

impl Eq for Transaction {}

impl Default for Transaction {
    fn default() -> Self {
        Self {
            version: 0,
            nonce: 0,
            system_fee: 0,
            network_fee: 0,
            valid_until_block: 0,
            signers: Vec::new(),
            attributes: Vec::new(),
            script: Vec::new(),
            witnesses: Vec::new(),
            hash: OnceCell::new(),
        }
    }
}

impl Transaction {
    /// The fee-paying account: the first signer.
    pub fn sender(&self) -> UInt160 {
        self.signers
            .first()
            .map(|signer| signer.account)
            .unwrap_or_else(UInt160::zero)
    }

    /// The transaction id: hash256 over the unsigned form.
    pub fn hash(&self) -> UInt256 {
        *self
            .hash
            .get_or_init(|| UInt256::from_array(hash::hash256(&self.unsigned_bytes())))
    }

    /// Serializes the fields covered by the signature (everything except
    /// witnesses).
    pub fn unsigned_bytes(&self) -> Vec<u8> {
        let mut writer = BinaryWriter::with_capacity(self.size());
        self.serialize_unsigned(&mut writer);
        writer.into_bytes()
    }

    /// The data signed by each witness: network magic followed by the id.
    pub fn sign_data(&self, network: u32) -> Vec<u8> {
        let mut data = Vec::with_capacity(4 + 32);
        data.extend_from_slice(&network.to_le_bytes());
        data.extend_from_slice(self.hash().as_bytes());
        data
    }

    /// Network fee available per byte of transaction size.
    pub fn fee_per_byte(&self) -> i64 {
        let size = self.size() as i64;
        if size == 0 {
            0
        } else {
            self.network_fee / size
        }
    }

    /// Looks up an attribute of the given kind.
    pub fn get_attribute(&self, attribute_type: u8) -> Option<&TransactionAttribute> {
        self.attributes
            .iter()
            .find(|a| a.attribute_type() == attribute_type)
    }

    /// Structural validation that needs no chain state: size, counts,
    /// attribute multiplicity, witness pairing.
    pub fn check_structure(&self) -> CoreResult<()> {
        if self.version != 0 {
            return Err(CoreError::invalid_data(format!(
                "unsupported transaction version {}",
                self.version
            )));
        }
        if self.signers.is_empty() {
            return Err(CoreError::invalid_data("transaction has no signers"));
        }
        if self.signers.len() > MAX_SIGNERS {
            return Err(CoreError::invalid_data("too many signers"));
        }
        if self.witnesses.len() != self.signers.len() {
            return Err(CoreError::invalid_data(format!(
                "{} witnesses for {} signers",
                self.witnesses.len(),
                self.signers.len()
            )));
        }
        for window in 0..self.signers.len() {
            for other in window + 1..self.signers.len() {
                if self.signers[window].account == self.signers[other].account {
                    return Err(CoreError::invalid_data("duplicate signer account"));
                }
            }
        }
        if self.script.is_empty() {
            return Err(CoreError::invalid_data("empty script"));
        }
        if self.system_fee < 0 || self.network_fee < 0 {
            return Err(CoreError::invalid_data("negative fee"));
        }
        let mut seen_types = Vec::with_capacity(self.attributes.len());
        for attribute in &self.attributes {
            attribute.verify()?;
            let type_byte = attribute.attribute_type();
            if seen_types.contains(&type_byte) && !attribute.allow_multiple() {
                return Err(CoreError::invalid_data(format!(
                    "duplicate attribute 0x{type_byte:02x}"
                )));
            }
            seen_types.push(type_byte);
        }
        if self.size() > MAX_TRANSACTION_SIZE {
            return Err(CoreError::invalid_data("transaction exceeds size limit"));
        }
        Ok(())
    }

    fn serialize_unsigned(&self, writer: &mut BinaryWriter) {
        writer.write_byte(self.version);
        writer.write_u32(self.nonce);
        writer.write_i64(self.system_fee);
        writer.write_i64(self.network_fee);
        writer.write_u32(self.valid_until_block);
        writer.write_serializable_list(&self.signers);
        writer.write_serializable_list(&self.attributes);
        writer.write_var_bytes(&self.script);
    }
}

impl Serializable for Transaction {
    fn size(&self) -> usize {
        HEADER_SIZE
            + helper::get_array_size(&self.signers)
            + helper::get_array_size(&self.attributes)
            + helper::get_var_bytes_size(&self.script)
            + helper::get_array_size(&self.witnesses)
    }

    fn serialize(&self, writer: &mut BinaryWriter) {
        self.serialize_unsigned(writer);
        writer.write_serializable_list(&self.witnesses);
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        let version = reader.read_byte()?;
        let nonce = reader.read_u32()?;
        let system_fee = reader.read_i64()?;
        let network_fee = reader.read_i64()?;
        let valid_until_block = reader.read_u32()?;
        let signers = reader.read_serializable_list::<Signer>(MAX_SIGNERS)?;
        let attributes =
            reader.read_serializable_list::<TransactionAttribute>(MAX_TRANSACTION_ATTRIBUTES)?;
        let script = reader.read_var_bytes(u16::MAX as usize)?;
        let witnesses = reader.read_serializable_list::<Witness>(MAX_SIGNERS)?;

        let transaction = Self {
            version,
            nonce,
            system_fee,
            network_fee,
            valid_until_block,
            signers,
            attributes,
            script,
            witnesses,
            hash: OnceCell::new(),
        };
        transaction
            .check_structure()
            .map_err(|e| IoError::InvalidFormat {
                context: "transaction",
                reason: e.to_string(),
            })?;
        Ok(transaction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WitnessScope;
    use neo3_io::SerializableExt;

    fn sample_transaction() -> Transaction {
        Transaction {
            version: 0,
            nonce: 0xdeadbeef,
            system_fee: 1_000_000,
            network_fee: 500_000,
            valid_until_block: 100,
            signers: vec![Signer::called_by_entry(UInt160::from_array([1u8; 20]))],
            attributes: vec![TransactionAttribute::HighPriority],
            script: vec![0x12, 0x13, 0x9e],
            witnesses: vec![Witness::new(vec![0x0c], vec![0x41])],
            hash: OnceCell::new(),
        }
    }

    #[test]
    fn round_trip() {
        let tx = sample_transaction();
        let restored: Transaction = SerializableExt::from_array(&tx.to_array()).unwrap();
        assert_eq!(restored.hash(), tx.hash());
        assert_eq!(restored.script, tx.script);
        assert_eq!(tx.size(), tx.to_array().len());
    }

    #[test]
    fn hash_covers_only_unsigned_fields() {
        let mut tx = sample_transaction();
        let original = tx.hash();

        let mut altered = sample_transaction();
        altered.witnesses = vec![Witness::new(vec![0xff], vec![0x41])];
        assert_eq!(altered.hash(), original);

        tx = sample_transaction();
        tx.nonce += 1;
        assert_ne!(tx.hash(), original);
    }

    #[test]
    fn sign_data_prepends_network_magic() {
        let tx = sample_transaction();
        let data = tx.sign_data(0x4e454f33);
        assert_eq!(&data[..4], &0x4e454f33u32.to_le_bytes());
        assert_eq!(&data[4..], tx.hash().as_bytes());
    }

    #[test]
    fn structure_rejects_witness_count_mismatch() {
        let mut tx = sample_transaction();
        tx.witnesses.push(Witness::empty());
        assert!(tx.check_structure().is_err());
    }

    #[test]
    fn structure_rejects_duplicate_attributes() {
        let mut tx = sample_transaction();
        tx.attributes = vec![
            TransactionAttribute::HighPriority,
            TransactionAttribute::HighPriority,
        ];
        assert!(tx.check_structure().is_err());
    }

    #[test]
    fn structure_rejects_duplicate_signers() {
        let mut tx = sample_transaction();
        tx.signers = vec![
            Signer::called_by_entry(UInt160::zero()),
            Signer::new(UInt160::zero(), WitnessScope::GLOBAL),
        ];
        tx.witnesses = vec![Witness::empty(), Witness::empty()];
        assert!(tx.check_structure().is_err());
    }
}
