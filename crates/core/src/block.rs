//! Blocks and headers.

use crate::{CoreError, CoreResult, Transaction, UInt160, UInt256, Witness};
use neo3_config::{MAX_BLOCK_SIZE, MAX_TRANSACTIONS_PER_BLOCK};
use neo3_cryptography::{hash, merkle_tree};
use neo3_io::{helper, BinaryWriter, IoError, IoResult, MemoryReader, Serializable};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

/// Block header: everything that pins a block to the chain.
///
/// The block hash is the double SHA-256 of the header fields up to and
/// including `next_consensus` — the witness is excluded.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Header {
    /// Header format version; only 0 is defined.
    pub version: u32,

    /// Hash of the previous block.
    pub prev_hash: UInt256,

    /// Merkle root of the block's transaction hashes.
    pub merkle_root: UInt256,

    /// Unix milliseconds; strictly increasing along the chain.
    pub timestamp: u64,

    /// Random value chosen by the primary; seeds `System.Runtime.GetRandom`.
    pub nonce: u64,

    /// Height of this block.
    pub index: u32,

    /// Index of the consensus primary that proposed the block.
    pub primary_index: u8,

    /// Script hash of the multi-signature contract of the next validators.
    pub next_consensus: UInt160,

    /// The committee witness over the header.
    pub witness: Witness,

    #[serde(skip)]
    hash: OnceCell<UInt256>,
}

impl PartialEq for Header {
    fn eq(&self, other: &Self) -> bool {
        self.hash() == other.hash()
    }
}

impl Eq for Header {}

impl Default for Header {
    fn default() -> Self {
        Self {
            version: 0,
            prev_hash: UInt256::zero(),
            merkle_root: UInt256::zero(),
            timestamp: 0,
            nonce: 0,
            index: 0,
            primary_index: 0,
            next_consensus: UInt160::zero(),
            witness: Witness::empty(),
            hash: OnceCell::new(),
        }
    }
}

impl Header {
    /// Block hash: hash256 over the unsigned header fields.
    pub fn hash(&self) -> UInt256 {
        *self
            .hash
            .get_or_init(|| UInt256::from_array(hash::hash256(&self.unsigned_bytes())))
    }

    /// Serializes the hashed portion of the header.
    pub fn unsigned_bytes(&self) -> Vec<u8> {
        let mut writer = BinaryWriter::with_capacity(self.size());
        self.serialize_unsigned(&mut writer);
        writer.into_bytes()
    }

    /// The data the committee signs: network magic followed by the hash.
    pub fn sign_data(&self, network: u32) -> Vec<u8> {
        let mut data = Vec::with_capacity(4 + 32);
        data.extend_from_slice(&network.to_le_bytes());
        data.extend_from_slice(self.hash().as_bytes());
        data
    }

    fn serialize_unsigned(&self, writer: &mut BinaryWriter) {
        writer.write_u32(self.version);
        Serializable::serialize(&self.prev_hash, writer);
        Serializable::serialize(&self.merkle_root, writer);
        writer.write_u64(self.timestamp);
        writer.write_u64(self.nonce);
        writer.write_u32(self.index);
        writer.write_byte(self.primary_index);
        Serializable::serialize(&self.next_consensus, writer);
    }

    const UNSIGNED_SIZE: usize = 4 + 32 + 32 + 8 + 8 + 4 + 1 + 20;
}

impl Serializable for Header {
    fn size(&self) -> usize {
        // The witness list always has exactly one element on the wire.
        Self::UNSIGNED_SIZE + 1 + self.witness.size()
    }

    fn serialize(&self, writer: &mut BinaryWriter) {
        self.serialize_unsigned(writer);
        writer.write_var_int(1);
        Serializable::serialize(&self.witness, writer);
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        let version = reader.read_u32()?;
        let prev_hash = <UInt256 as Serializable>::deserialize(reader)?;
        let merkle_root = <UInt256 as Serializable>::deserialize(reader)?;
        let timestamp = reader.read_u64()?;
        let nonce = reader.read_u64()?;
        let index = reader.read_u32()?;
        let primary_index = reader.read_byte()?;
        let next_consensus = <UInt160 as Serializable>::deserialize(reader)?;

        let witness_count = reader.read_var_int(1)?;
        if witness_count != 1 {
            return Err(IoError::InvalidFormat {
                context: "header",
                reason: format!("expected exactly one witness, got {witness_count}"),
            });
        }
        let witness = <Witness as Serializable>::deserialize(reader)?;

        Ok(Self {
            version,
            prev_hash,
            merkle_root,
            timestamp,
            nonce,
            index,
            primary_index,
            next_consensus,
            witness,
            hash: OnceCell::new(),
        })
    }
}

/// A full block: header plus ordered transactions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// The header.
    pub header: Header,

    /// Transactions in consensus order.
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// The block hash (the header hash).
    pub fn hash(&self) -> UInt256 {
        self.header.hash()
    }

    /// The block height.
    pub fn index(&self) -> u32 {
        self.header.index
    }

    /// Recomputes the Merkle root over the block's transaction hashes.
    pub fn compute_merkle_root(&self) -> UInt256 {
        Self::merkle_root_from(&self.transactions)
    }

    /// Merkle root of an ordered transaction list.
    pub fn merkle_root_from(transactions: &[Transaction]) -> UInt256 {
        let hashes: Vec<[u8; 32]> = transactions.iter().map(|tx| *tx.hash().as_bytes()).collect();
        UInt256::from_array(merkle_tree::compute_root(&hashes))
    }

    /// Structural validation that needs no chain state.
    pub fn check_structure(&self) -> CoreResult<()> {
        if self.transactions.len() > MAX_TRANSACTIONS_PER_BLOCK as usize {
            return Err(CoreError::invalid_data("too many transactions in block"));
        }
        if self.size() > MAX_BLOCK_SIZE {
            return Err(CoreError::invalid_data("block exceeds size limit"));
        }
        if self.compute_merkle_root() != self.header.merkle_root {
            return Err(CoreError::invalid_data("merkle root mismatch"));
        }
        for window in 0..self.transactions.len() {
            for other in window + 1..self.transactions.len() {
                if self.transactions[window].hash() == self.transactions[other].hash() {
                    return Err(CoreError::invalid_data("duplicate transaction in block"));
                }
            }
        }
        Ok(())
    }
}

impl Serializable for Block {
    fn size(&self) -> usize {
        self.header.size() + helper::get_array_size(&self.transactions)
    }

    fn serialize(&self, writer: &mut BinaryWriter) {
        Serializable::serialize(&self.header, writer);
        writer.write_serializable_list(&self.transactions);
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        let header = <Header as Serializable>::deserialize(reader)?;
        let transactions =
            reader.read_serializable_list::<Transaction>(MAX_TRANSACTIONS_PER_BLOCK as usize)?;
        Ok(Self {
            header,
            transactions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use neo3_io::SerializableExt;

    fn sample_header() -> Header {
        Header {
            version: 0,
            prev_hash: UInt256::from_array([1u8; 32]),
            merkle_root: UInt256::zero(),
            timestamp: 1_600_000_000_000,
            nonce: 0x1122334455667788,
            index: 7,
            primary_index: 2,
            next_consensus: UInt160::from_array([9u8; 20]),
            witness: Witness::new(vec![0x01], vec![0x02]),
            hash: OnceCell::new(),
        }
    }

    #[test]
    fn header_round_trip() {
        let header = sample_header();
        let restored: Header = SerializableExt::from_array(&header.to_array()).unwrap();
        assert_eq!(restored.hash(), header.hash());
        assert_eq!(header.size(), header.to_array().len());
    }

    #[test]
    fn hash_excludes_witness() {
        let header = sample_header();
        let mut other = sample_header();
        other.witness = Witness::new(vec![0xff, 0xfe], vec![0xfd]);
        assert_eq!(other.hash(), header.hash());

        let mut changed = sample_header();
        changed.nonce += 1;
        assert_ne!(changed.hash(), header.hash());
    }

    #[test]
    fn empty_block_merkle_root_is_zero() {
        let block = Block {
            header: sample_header(),
            transactions: Vec::new(),
        };
        assert!(block.compute_merkle_root().is_zero());
        assert!(block.check_structure().is_ok());
    }

    #[test]
    fn merkle_mismatch_is_rejected() {
        let mut header = sample_header();
        header.merkle_root = UInt256::from_array([0xaa; 32]);
        let block = Block {
            header,
            transactions: Vec::new(),
        };
        assert!(block.check_structure().is_err());
    }
}
