//! Positioned reader over an in-memory byte slice.

use crate::error::{IoError, IoResult};
use crate::serializable::Serializable;

/// A reader for deserializing Neo data structures from memory.
///
/// All multi-byte integers are read little-endian unless the method name says
/// otherwise. Reads never panic; running past the end of the input yields
/// [`IoError::EndOfStream`].
pub struct MemoryReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> MemoryReader<'a> {
    /// Creates a reader over the given bytes.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Current position in the input.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Total length of the input.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the input is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes left to read.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Whether the reader has consumed all input.
    pub fn is_eof(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Moves the cursor to an absolute position.
    pub fn seek(&mut self, position: usize) -> IoResult<()> {
        if position > self.data.len() {
            return Err(IoError::InvalidOperation(format!(
                "seek to {position} beyond end ({})",
                self.data.len()
            )));
        }
        self.pos = position;
        Ok(())
    }

    fn ensure(&self, count: usize, context: &'static str) -> IoResult<()> {
        if self.remaining() < count {
            return Err(IoError::end_of_stream(count - self.remaining(), context));
        }
        Ok(())
    }

    /// Returns the next byte without advancing.
    pub fn peek(&self) -> IoResult<u8> {
        self.ensure(1, "peek")?;
        Ok(self.data[self.pos])
    }

    /// Reads a single byte.
    pub fn read_byte(&mut self) -> IoResult<u8> {
        self.ensure(1, "u8")?;
        let b = self.data[self.pos];
        self.pos += 1;
        Ok(b)
    }

    /// Reads a strict boolean: 0 or 1 only.
    pub fn read_bool(&mut self) -> IoResult<bool> {
        match self.read_byte()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(IoError::invalid_format(
                "bool",
                format!("invalid boolean byte 0x{other:02x}"),
            )),
        }
    }

    /// Reads a signed byte.
    pub fn read_i8(&mut self) -> IoResult<i8> {
        Ok(self.read_byte()? as i8)
    }

    /// Reads a little-endian u16.
    pub fn read_u16(&mut self) -> IoResult<u16> {
        self.ensure(2, "u16")?;
        let mut buf = [0u8; 2];
        buf.copy_from_slice(&self.data[self.pos..self.pos + 2]);
        self.pos += 2;
        Ok(u16::from_le_bytes(buf))
    }

    /// Reads a little-endian i16.
    pub fn read_i16(&mut self) -> IoResult<i16> {
        Ok(self.read_u16()? as i16)
    }

    /// Reads a little-endian u32.
    pub fn read_u32(&mut self) -> IoResult<u32> {
        self.ensure(4, "u32")?;
        let mut buf = [0u8; 4];
        buf.copy_from_slice(&self.data[self.pos..self.pos + 4]);
        self.pos += 4;
        Ok(u32::from_le_bytes(buf))
    }

    /// Reads a little-endian i32.
    pub fn read_i32(&mut self) -> IoResult<i32> {
        Ok(self.read_u32()? as i32)
    }

    /// Reads a little-endian u64.
    pub fn read_u64(&mut self) -> IoResult<u64> {
        self.ensure(8, "u64")?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&self.data[self.pos..self.pos + 8]);
        self.pos += 8;
        Ok(u64::from_le_bytes(buf))
    }

    /// Reads a little-endian i64.
    pub fn read_i64(&mut self) -> IoResult<i64> {
        Ok(self.read_u64()? as i64)
    }

    /// Reads `count` bytes.
    pub fn read_bytes(&mut self, count: usize) -> IoResult<Vec<u8>> {
        self.ensure(count, "bytes")?;
        let out = self.data[self.pos..self.pos + count].to_vec();
        self.pos += count;
        Ok(out)
    }

    /// Reads `N` bytes into a fixed array.
    pub fn read_fixed<const N: usize>(&mut self) -> IoResult<[u8; N]> {
        self.ensure(N, "fixed bytes")?;
        let mut out = [0u8; N];
        out.copy_from_slice(&self.data[self.pos..self.pos + N]);
        self.pos += N;
        Ok(out)
    }

    /// Reads a variable-length integer, rejecting non-canonical encodings and
    /// values above `max`.
    ///
    /// Layout: `< 0xFD` one byte; `0xFD` + u16-LE; `0xFE` + u32-LE;
    /// `0xFF` + u64-LE. A value encoded with a longer prefix than necessary
    /// is invalid.
    pub fn read_var_int(&mut self, max: u64) -> IoResult<u64> {
        let first = self.read_byte()?;
        let value = match first {
            0xfd => {
                let v = self.read_u16()? as u64;
                if v < 0xfd {
                    return Err(IoError::invalid_format(
                        "var-int",
                        format!("non-canonical 3-byte encoding of {v}"),
                    ));
                }
                v
            }
            0xfe => {
                let v = self.read_u32()? as u64;
                if v <= u16::MAX as u64 {
                    return Err(IoError::invalid_format(
                        "var-int",
                        format!("non-canonical 5-byte encoding of {v}"),
                    ));
                }
                v
            }
            0xff => {
                let v = self.read_u64()?;
                if v <= u32::MAX as u64 {
                    return Err(IoError::invalid_format(
                        "var-int",
                        format!("non-canonical 9-byte encoding of {v}"),
                    ));
                }
                v
            }
            b => b as u64,
        };
        if value > max {
            return Err(IoError::out_of_range("var-int", value, max));
        }
        Ok(value)
    }

    /// Reads a var-int length prefix followed by that many bytes.
    pub fn read_var_bytes(&mut self, max: usize) -> IoResult<Vec<u8>> {
        let length = self.read_var_int(max as u64)? as usize;
        self.read_bytes(length)
    }

    /// Reads a var-length UTF-8 string.
    pub fn read_var_string(&mut self, max: usize) -> IoResult<String> {
        let bytes = self.read_var_bytes(max)?;
        String::from_utf8(bytes).map_err(|e| IoError::Encoding {
            context: "var-string",
            reason: e.to_string(),
        })
    }

    /// Deserializes one `T` from the current position.
    pub fn read_serializable<T: Serializable>(&mut self) -> IoResult<T> {
        T::deserialize(self)
    }

    /// Deserializes a var-int-prefixed list of `T`, at most `max` entries.
    pub fn read_serializable_list<T: Serializable>(&mut self, max: usize) -> IoResult<Vec<T>> {
        let count = self.read_var_int(max as u64)? as usize;
        let mut items = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            items.push(T::deserialize(self)?);
        }
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_little_endian_integers() {
        let data = [0x01, 0x02, 0x03, 0x04];
        let mut reader = MemoryReader::new(&data);
        assert_eq!(reader.read_u32().unwrap(), 0x04030201);
        assert!(reader.is_eof());
    }

    #[test]
    fn eof_is_an_error_not_a_panic() {
        let mut reader = MemoryReader::new(&[0x01]);
        assert!(matches!(
            reader.read_u16(),
            Err(IoError::EndOfStream { .. })
        ));
    }

    #[test]
    fn strict_bool_rejects_other_bytes() {
        let mut reader = MemoryReader::new(&[2]);
        assert!(reader.read_bool().is_err());
    }

    #[test]
    fn var_int_boundaries_round_trip() {
        for value in [0u64, 0xfc, 0xfd, 0xffff, 0x10000, 0xffff_ffff, 0x1_0000_0000] {
            let mut writer = crate::BinaryWriter::new();
            writer.write_var_int(value);
            let bytes = writer.into_bytes();
            let mut reader = MemoryReader::new(&bytes);
            assert_eq!(reader.read_var_int(u64::MAX).unwrap(), value);
            assert!(reader.is_eof());
        }
    }

    #[test]
    fn var_int_rejects_overlong_encodings() {
        // 0xfc fits in one byte; a 0xfd-prefixed form is non-canonical.
        let mut reader = MemoryReader::new(&[0xfd, 0xfc, 0x00]);
        assert!(reader.read_var_int(u64::MAX).is_err());

        let mut reader = MemoryReader::new(&[0xfe, 0xff, 0xff, 0x00, 0x00]);
        assert!(reader.read_var_int(u64::MAX).is_err());

        let mut reader = MemoryReader::new(&[0xff, 0xff, 0xff, 0xff, 0xff, 0, 0, 0, 0]);
        assert!(reader.read_var_int(u64::MAX).is_err());
    }

    #[test]
    fn var_int_enforces_caller_max() {
        let mut reader = MemoryReader::new(&[0x10]);
        assert!(matches!(
            reader.read_var_int(0x0f),
            Err(IoError::OutOfRange { .. })
        ));
    }
}
