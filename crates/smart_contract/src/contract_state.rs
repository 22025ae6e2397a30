//! Contract state, NEF executables and contract-hash derivation.

use crate::manifest::ContractManifest;
use crate::{ContractError, ContractResult};
use neo3_core::UInt160;
use neo3_cryptography::hash;
use neo3_io::{helper, BinaryWriter, IoError, IoResult, MemoryReader, Serializable};
use neo3_vm::{OpCode, ScriptBuilder};

/// NEF magic: "NEF3" little-endian.
const NEF_MAGIC: u32 = 0x3346454E;

/// Length of the zero-padded compiler field.
const COMPILER_FIELD_SIZE: usize = 64;

/// Maximum length of the source URL field.
const MAX_SOURCE_LENGTH: usize = 256;

/// Maximum number of method tokens.
const MAX_METHOD_TOKENS: usize = 128;

/// A CALLT target: a fixed binding to another contract's method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodToken {
    /// Called contract.
    pub hash: UInt160,
    /// Called method name.
    pub method: String,
    /// Number of parameters popped for the call.
    pub parameters_count: u16,
    /// Whether a return value is expected.
    pub has_return_value: bool,
    /// Call flags the call is restricted to.
    pub call_flags: u8,
}

impl Serializable for MethodToken {
    fn size(&self) -> usize {
        20 + helper::get_var_bytes_size(self.method.as_bytes()) + 2 + 1 + 1
    }

    fn serialize(&self, writer: &mut BinaryWriter) {
        self.hash.serialize(writer);
        writer.write_var_string(&self.method);
        writer.write_u16(self.parameters_count);
        writer.write_bool(self.has_return_value);
        writer.write_byte(self.call_flags);
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        let hash = UInt160::deserialize(reader)?;
        let method = reader.read_var_string(32)?;
        if method.starts_with('_') {
            return Err(IoError::InvalidFormat {
                context: "method-token",
                reason: "method may not start with '_'".into(),
            });
        }
        let parameters_count = reader.read_u16()?;
        let has_return_value = reader.read_bool()?;
        let call_flags = reader.read_byte()?;
        if neo3_vm::CallFlags::from_byte(call_flags).is_none() {
            return Err(IoError::InvalidFormat {
                context: "method-token",
                reason: "undefined call flags".into(),
            });
        }
        Ok(Self {
            hash,
            method,
            parameters_count,
            has_return_value,
            call_flags,
        })
    }
}

/// The Neo Executable Format: the deployed form of a script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NefFile {
    /// Compiler name and version, at most 64 bytes.
    pub compiler: String,
    /// Optional source URL.
    pub source: String,
    /// CALLT bindings.
    pub tokens: Vec<MethodToken>,
    /// The executable script.
    pub script: Vec<u8>,
    /// First four bytes of hash256 over everything before the checksum.
    pub checksum: u32,
}

impl NefFile {
    /// Builds a NEF with a freshly computed checksum.
    pub fn new(compiler: String, source: String, tokens: Vec<MethodToken>, script: Vec<u8>) -> Self {
        let mut nef = Self {
            compiler,
            source,
            tokens,
            script,
            checksum: 0,
        };
        nef.checksum = nef.compute_checksum();
        nef
    }

    /// Recomputes the checksum over the serialized header and body.
    pub fn compute_checksum(&self) -> u32 {
        let mut writer = BinaryWriter::new();
        self.serialize_without_checksum(&mut writer);
        let digest = hash::hash256(writer.as_bytes());
        u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]])
    }

    fn serialize_without_checksum(&self, writer: &mut BinaryWriter) {
        writer.write_u32(NEF_MAGIC);
        let mut compiler = self.compiler.as_bytes().to_vec();
        compiler.resize(COMPILER_FIELD_SIZE, 0);
        writer.write_bytes(&compiler);
        writer.write_var_string(&self.source);
        writer.write_byte(0); // reserved
        writer.write_serializable_list(&self.tokens);
        writer.write_u16(0); // reserved
        writer.write_var_bytes(&self.script);
    }
}

impl Serializable for NefFile {
    fn size(&self) -> usize {
        4 + COMPILER_FIELD_SIZE
            + helper::get_var_bytes_size(self.source.as_bytes())
            + 1
            + helper::get_array_size(&self.tokens)
            + 2
            + helper::get_var_bytes_size(&self.script)
            + 4
    }

    fn serialize(&self, writer: &mut BinaryWriter) {
        self.serialize_without_checksum(writer);
        writer.write_u32(self.checksum);
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        let magic = reader.read_u32()?;
        if magic != NEF_MAGIC {
            return Err(IoError::InvalidFormat {
                context: "nef",
                reason: format!("wrong magic 0x{magic:08x}"),
            });
        }
        let compiler_bytes = reader.read_bytes(COMPILER_FIELD_SIZE)?;
        let compiler_end = compiler_bytes
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(COMPILER_FIELD_SIZE);
        let compiler = String::from_utf8(compiler_bytes[..compiler_end].to_vec()).map_err(|e| {
            IoError::InvalidFormat {
                context: "nef",
                reason: format!("compiler field: {e}"),
            }
        })?;
        let source = reader.read_var_string(MAX_SOURCE_LENGTH)?;
        if reader.read_byte()? != 0 {
            return Err(IoError::InvalidFormat {
                context: "nef",
                reason: "reserved byte must be zero".into(),
            });
        }
        let tokens = reader.read_serializable_list::<MethodToken>(MAX_METHOD_TOKENS)?;
        if reader.read_u16()? != 0 {
            return Err(IoError::InvalidFormat {
                context: "nef",
                reason: "reserved field must be zero".into(),
            });
        }
        let script = reader.read_var_bytes(neo3_config::MAX_SCRIPT_LENGTH)?;
        if script.is_empty() {
            return Err(IoError::InvalidFormat {
                context: "nef",
                reason: "empty script".into(),
            });
        }
        let checksum = reader.read_u32()?;

        let nef = Self {
            compiler,
            source,
            tokens,
            script,
            checksum,
        };
        if checksum != nef.compute_checksum() {
            return Err(IoError::InvalidFormat {
                context: "nef",
                reason: "checksum mismatch".into(),
            });
        }
        Ok(nef)
    }
}

/// The on-chain state of a deployed contract.
#[derive(Debug, Clone)]
pub struct ContractState {
    /// Storage id; negative for natives.
    pub id: i32,
    /// Incremented on every update.
    pub update_counter: u16,
    /// The contract hash.
    pub hash: UInt160,
    /// The executable.
    pub nef: NefFile,
    /// ABI, permissions, groups and trusts.
    pub manifest: ContractManifest,
}

impl ContractState {
    /// Whether the manifest permits `method` to be called by `caller`.
    pub fn can_be_called_by(&self, caller: Option<&ContractState>, method: &str) -> bool {
        match caller {
            None => true,
            Some(caller) => caller.manifest.permits_call(&self.hash, &self.manifest, method),
        }
    }
}

impl Serializable for ContractState {
    fn size(&self) -> usize {
        4 + 2
            + 20
            + helper::get_var_bytes_size(&neo3_io::SerializableExt::to_array(&self.nef))
            + helper::get_var_bytes_size(self.manifest.to_json_string().as_bytes())
    }

    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_i32(self.id);
        writer.write_u16(self.update_counter);
        self.hash.serialize(writer);
        writer.write_var_bytes(&neo3_io::SerializableExt::to_array(&self.nef));
        writer.write_var_bytes(self.manifest.to_json_string().as_bytes());
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        let id = reader.read_i32()?;
        let update_counter = reader.read_u16()?;
        let hash = UInt160::deserialize(reader)?;
        let nef_bytes = reader.read_var_bytes(1024 * 1024)?;
        let nef: NefFile = neo3_io::SerializableExt::from_array(&nef_bytes)?;
        let manifest_bytes = reader.read_var_bytes(ContractManifest::MAX_LENGTH)?;
        let manifest_json = std::str::from_utf8(&manifest_bytes).map_err(|e| {
            IoError::InvalidFormat {
                context: "contract-state",
                reason: format!("manifest: {e}"),
            }
        })?;
        let manifest =
            ContractManifest::from_json_str(manifest_json).map_err(|e| IoError::InvalidFormat {
                context: "contract-state",
                reason: e.to_string(),
            })?;
        Ok(Self {
            id,
            update_counter,
            hash,
            nef,
            manifest,
        })
    }
}

/// Derives the deployed contract hash from the deployer, the NEF checksum
/// and the contract name.
pub fn get_contract_hash(sender: &UInt160, nef_checksum: u32, name: &str) -> UInt160 {
    let mut builder = ScriptBuilder::new();
    builder.emit(OpCode::ABORT);
    builder
        .emit_push_bytes(sender.as_bytes())
        .expect("20-byte push");
    builder
        .emit_push_int(i64::from(nef_checksum))
        .expect("checksum push");
    builder
        .emit_push_bytes(name.as_bytes())
        .expect("name push");
    UInt160::from_array(hash::hash160(&builder.to_array()))
}

/// Validates a NEF/manifest pair before deployment.
pub fn check_deployment(nef: &NefFile, manifest: &ContractManifest) -> ContractResult<()> {
    if nef.script.len() > neo3_config::MAX_SCRIPT_LENGTH {
        return Err(ContractError::invalid_argument("script too long"));
    }
    manifest.validate()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use neo3_io::SerializableExt;

    fn sample_nef() -> NefFile {
        NefFile::new(
            "neo3-test-compiler".into(),
            String::new(),
            Vec::new(),
            vec![0x10, 0x40], // PUSH0 RET
        )
    }

    #[test]
    fn nef_round_trip() {
        let nef = sample_nef();
        let restored: NefFile = SerializableExt::from_array(&nef.to_array()).unwrap();
        assert_eq!(restored, nef);
        assert_eq!(nef.size(), nef.to_array().len());
    }

    #[test]
    fn corrupted_checksum_rejected() {
        let mut bytes = sample_nef().to_array();
        let len = bytes.len();
        bytes[len - 1] ^= 0xff;
        assert!(<NefFile as SerializableExt>::from_array(&bytes).is_err());
    }

    #[test]
    fn wrong_magic_rejected() {
        let mut bytes = sample_nef().to_array();
        bytes[0] = 0x00;
        assert!(<NefFile as SerializableExt>::from_array(&bytes).is_err());
    }

    #[test]
    fn contract_hash_depends_on_all_inputs() {
        let sender = UInt160::zero();
        let a = get_contract_hash(&sender, 1, "A");
        let b = get_contract_hash(&sender, 1, "B");
        let c = get_contract_hash(&sender, 2, "A");
        assert_ne!(a, b);
        assert_ne!(a, c);
    }
}
