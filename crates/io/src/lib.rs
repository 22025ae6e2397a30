//! Binary serialization primitives for the Neo N3 core.
//!
//! Every consensus-relevant byte flows through this crate: the readers reject
//! truncated, oversize and non-canonical input, and the writers emit the
//! exact little-endian layouts the network hashes and signs.

mod binary_writer;
mod error;
mod memory_reader;
mod serializable;

pub use binary_writer::BinaryWriter;
pub use error::{IoError, IoResult};
pub use memory_reader::MemoryReader;
pub use serializable::{helper, Serializable, SerializableExt};
