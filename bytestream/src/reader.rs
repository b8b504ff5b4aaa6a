//! Byte reader with bounded operations.

use crate::error::{ByteError, ByteResult};
use crate::number::{
    Number, FLOAT32, FLOAT64, INT16, INT32, INT64, INT8, UINT16, UINT32, UINT64, UINT8,
};

/// A byte reader for decoding primitive values.
///
/// All read operations are bounds-checked and return errors on failure.
/// The reader never panics on malformed input.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    /// Creates a new `ByteReader` from a byte slice.
    #[must_use]
    pub const fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Returns the number of bytes remaining to read.
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    /// Returns `true` if there are no more bytes to read.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Returns the current byte position.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.pos
    }

    /// Moves the cursor, clamped to the end of the input.
    pub fn seek(&mut self, position: usize) {
        self.pos = position.min(self.data.len());
    }

    /// Returns the next byte without consuming it.
    #[must_use]
    pub fn peek_u8(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    /// Returns the byte at `position` without moving the cursor.
    #[must_use]
    pub fn byte_at(&self, position: usize) -> Option<u8> {
        self.data.get(position).copied()
    }

    /// Skips `count` bytes.
    pub fn skip(&mut self, count: usize) -> ByteResult<()> {
        self.take(count).map(|_| ())
    }

    pub fn read_u8(&mut self) -> ByteResult<u8> {
        let [byte] = self.read_array::<1>()?;
        Ok(byte)
    }

    /// Reads a boolean; any non-zero byte is `true`.
    pub fn read_bool(&mut self) -> ByteResult<bool> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_i8(&mut self) -> ByteResult<i8> {
        Ok(i8::from_le_bytes(self.read_array()?))
    }

    pub fn read_i16(&mut self) -> ByteResult<i16> {
        Ok(i16::from_le_bytes(self.read_array()?))
    }

    pub fn read_u16(&mut self) -> ByteResult<u16> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    pub fn read_i32(&mut self) -> ByteResult<i32> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    pub fn read_u32(&mut self) -> ByteResult<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_i64(&mut self) -> ByteResult<i64> {
        Ok(i64::from_le_bytes(self.read_array()?))
    }

    pub fn read_u64(&mut self) -> ByteResult<u64> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    pub fn read_f32(&mut self) -> ByteResult<f32> {
        Ok(f32::from_le_bytes(self.read_array()?))
    }

    pub fn read_f64(&mut self) -> ByteResult<f64> {
        Ok(f64::from_le_bytes(self.read_array()?))
    }

    /// Reads an unsigned LEB128 varint of at most 5 bytes.
    pub fn read_varu32(&mut self) -> ByteResult<u32> {
        let value = self.read_varu64()?;
        u32::try_from(value).map_err(|_| ByteError::InvalidVarint)
    }

    /// Reads an unsigned LEB128 varint of at most 10 bytes.
    pub fn read_varu64(&mut self) -> ByteResult<u64> {
        let mut result = 0u64;
        for shift in (0..70).step_by(7) {
            let byte = self.read_u8()?;
            let bits = u64::from(byte & 0x7F);
            if shift == 63 && bits > 1 {
                return Err(ByteError::InvalidVarint);
            }
            result |= bits << shift;
            if byte & 0x80 == 0 {
                return Ok(result);
            }
        }
        Err(ByteError::InvalidVarint)
    }

    /// Reads a zigzag-encoded signed varint.
    #[allow(clippy::cast_possible_wrap)]
    pub fn read_vars64(&mut self) -> ByteResult<i64> {
        let value = self.read_varu64()?;
        Ok(((value >> 1) as i64) ^ -((value & 1) as i64))
    }

    /// Reads a varint length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> ByteResult<String> {
        self.read_string_limited(usize::MAX)
    }

    /// Reads a varint length-prefixed UTF-8 string of at most `max_len` bytes.
    pub fn read_string_limited(&mut self, max_len: usize) -> ByteResult<String> {
        let length = self.read_varu64()?;
        let len = usize::try_from(length).map_err(|_| ByteError::LengthOverflow { length })?;
        if len > max_len {
            return Err(ByteError::LengthOverflow { length });
        }
        let position = self.pos;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| ByteError::InvalidUtf8 { position })
    }

    /// Reads a nul-terminated UTF-8 string.
    pub fn read_cstring(&mut self) -> ByteResult<String> {
        let position = self.pos;
        let rest = &self.data[self.pos..];
        let end = rest
            .iter()
            .position(|byte| *byte == 0)
            .ok_or(ByteError::UnterminatedString)?;
        let text = std::str::from_utf8(&rest[..end])
            .map_err(|_| ByteError::InvalidUtf8 { position })?
            .to_owned();
        self.pos += end + 1;
        Ok(text)
    }

    /// Reads a self-describing number.
    pub fn read_number(&mut self) -> ByteResult<Number> {
        let prefix = self.read_u8()?;
        let number = match prefix {
            0x00..=0x7f => Number::Int(i64::from(prefix)),
            0xe0..=0xff => Number::Int(i64::from(i8::from_le_bytes([prefix]))),
            FLOAT32 => Number::Float(f64::from(self.read_f32()?)),
            FLOAT64 => Number::Float(self.read_f64()?),
            UINT8 => Number::Int(i64::from(self.read_u8()?)),
            UINT16 => Number::Int(i64::from(self.read_u16()?)),
            UINT32 => Number::Int(i64::from(self.read_u32()?)),
            UINT64 => Number::from(self.read_u64()?),
            INT8 => Number::Int(i64::from(self.read_i8()?)),
            INT16 => Number::Int(i64::from(self.read_i16()?)),
            INT32 => Number::Int(i64::from(self.read_i32()?)),
            INT64 => Number::Int(self.read_i64()?),
            _ => return Err(ByteError::InvalidNumberPrefix { prefix }),
        };
        Ok(number)
    }

    fn take(&mut self, count: usize) -> ByteResult<&'a [u8]> {
        let available = self.remaining();
        if count > available {
            return Err(ByteError::UnexpectedEof {
                requested: count,
                available,
            });
        }
        let data: &'a [u8] = self.data;
        let bytes = &data[self.pos..self.pos + count];
        self.pos += count;
        Ok(bytes)
    }

    fn read_array<const N: usize>(&mut self) -> ByteResult<[u8; N]> {
        let bytes = self.take(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_reader() {
        let reader = ByteReader::new(&[]);
        assert!(reader.is_empty());
        assert_eq!(reader.remaining(), 0);
        assert_eq!(reader.position(), 0);
        assert_eq!(reader.peek_u8(), None);
    }

    #[test]
    fn read_from_empty_fails() {
        let mut reader = ByteReader::new(&[]);
        let result = reader.read_u8();
        assert!(matches!(
            result,
            Err(ByteError::UnexpectedEof {
                requested: 1,
                available: 0
            })
        ));
    }

    #[test]
    fn short_read_does_not_advance() {
        let mut reader = ByteReader::new(&[1, 2]);
        assert!(reader.read_u32().is_err());
        assert_eq!(reader.position(), 0);
        assert_eq!(reader.read_u16().unwrap(), 0x0201);
    }

    #[test]
    fn varint_decoding() {
        let mut reader = ByteReader::new(&[0xAC, 0x02]);
        assert_eq!(reader.read_varu32().unwrap(), 300);
    }

    #[test]
    fn varint_too_long() {
        let data = [0xFF; 11];
        let mut reader = ByteReader::new(&data);
        assert_eq!(reader.read_varu64(), Err(ByteError::InvalidVarint));
    }

    #[test]
    fn varu32_rejects_wide_values() {
        let data = [0xFF, 0xFF, 0xFF, 0xFF, 0x7F];
        let mut reader = ByteReader::new(&data);
        assert_eq!(reader.read_varu32(), Err(ByteError::InvalidVarint));
    }

    #[test]
    fn zigzag_decoding() {
        let mut reader = ByteReader::new(&[0x01, 0x02, 0x03]);
        assert_eq!(reader.read_vars64().unwrap(), -1);
        assert_eq!(reader.read_vars64().unwrap(), 1);
        assert_eq!(reader.read_vars64().unwrap(), -2);
    }

    #[test]
    fn string_invalid_utf8() {
        let mut reader = ByteReader::new(&[2, 0xC3, 0x28]);
        assert_eq!(
            reader.read_string(),
            Err(ByteError::InvalidUtf8 { position: 1 })
        );
    }

    #[test]
    fn string_limit() {
        let mut reader = ByteReader::new(&[3, b'a', b'b', b'c']);
        assert_eq!(
            reader.read_string_limited(2),
            Err(ByteError::LengthOverflow { length: 3 })
        );
    }

    #[test]
    fn cstring_unterminated() {
        let mut reader = ByteReader::new(b"abc");
        assert_eq!(reader.read_cstring(), Err(ByteError::UnterminatedString));
    }

    #[test]
    fn number_prefixes() {
        let data = [0x7f, 0xe0, UINT8, 0xff, INT16, 0x00, 0x80, FLOAT32, 0, 0, 0x80, 0x3f];
        let mut reader = ByteReader::new(&data);
        assert_eq!(reader.read_number().unwrap(), Number::Int(127));
        assert_eq!(reader.read_number().unwrap(), Number::Int(-32));
        assert_eq!(reader.read_number().unwrap(), Number::Int(255));
        assert_eq!(reader.read_number().unwrap(), Number::Int(-32768));
        assert_eq!(reader.read_number().unwrap(), Number::Float(1.0));
    }

    #[test]
    fn number_invalid_prefix() {
        let mut reader = ByteReader::new(&[0xc1]);
        assert_eq!(
            reader.read_number(),
            Err(ByteError::InvalidNumberPrefix { prefix: 0xc1 })
        );
    }

    #[test]
    fn seek_and_peek() {
        let mut reader = ByteReader::new(&[9, 8, 7]);
        reader.seek(2);
        assert_eq!(reader.peek_u8(), Some(7));
        assert_eq!(reader.byte_at(0), Some(9));
        reader.seek(10);
        assert!(reader.is_empty());
    }
}
