//! Byte writer over a fixed-capacity buffer.

use crate::number::{
    Number, FLOAT64, INT16, INT32, INT64, INT8, NEGATIVE_FIXINT_MIN, UINT16, UINT32, UINT64,
    UINT8,
};

/// A byte writer over a fixed-capacity, reusable buffer.
///
/// The write offset keeps advancing past the end of the buffer while bytes
/// that do not fit are dropped. Callers check [`overflowed`](Self::overflowed)
/// after a pass, [`grow`](Self::grow) the buffer to at least
/// [`offset`](Self::offset) bytes, rewind with [`set_offset`](Self::set_offset)
/// and run the pass again. Bytes before the rewind point are preserved.
#[derive(Debug, Default)]
pub struct ByteWriter {
    buf: Vec<u8>,
    offset: usize,
}

impl ByteWriter {
    /// Creates a writer with `capacity` zeroed bytes.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0; capacity],
            offset: 0,
        }
    }

    /// Returns the buffer capacity in bytes.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Returns the current write offset. May exceed the capacity.
    #[must_use]
    pub const fn offset(&self) -> usize {
        self.offset
    }

    /// Moves the write offset.
    pub fn set_offset(&mut self, offset: usize) {
        self.offset = offset;
    }

    /// Returns `true` if any write since the last rewind fell past the capacity.
    #[must_use]
    pub fn overflowed(&self) -> bool {
        self.offset > self.buf.len()
    }

    /// Grows the buffer to `capacity` bytes, keeping existing contents.
    ///
    /// Shrinking is ignored.
    pub fn grow(&mut self, capacity: usize) {
        if capacity > self.buf.len() {
            self.buf.resize(capacity, 0);
        }
    }

    /// Returns the written bytes, `[0, offset)` clamped to the capacity.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.offset.min(self.buf.len())]
    }

    /// Returns the written bytes in `[start, offset)`, clamped to the capacity.
    #[must_use]
    pub fn bytes_from(&self, start: usize) -> &[u8] {
        let end = self.offset.min(self.buf.len());
        &self.buf[start.min(end)..end]
    }

    /// Writes one byte.
    pub fn write_u8(&mut self, value: u8) {
        if let Some(slot) = self.buf.get_mut(self.offset) {
            *slot = value;
        }
        self.offset += 1;
    }

    /// Writes raw bytes.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        let start = self.offset;
        let end = start + bytes.len();
        if end <= self.buf.len() {
            self.buf[start..end].copy_from_slice(bytes);
        } else if start < self.buf.len() {
            let fit = self.buf.len() - start;
            self.buf[start..].copy_from_slice(&bytes[..fit]);
        }
        self.offset = end;
    }

    /// Writes a boolean as a single `0`/`1` byte.
    pub fn write_bool(&mut self, value: bool) {
        self.write_u8(u8::from(value));
    }

    pub fn write_i8(&mut self, value: i8) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_i16(&mut self, value: i16) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_u16(&mut self, value: u16) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_i32(&mut self, value: i32) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_i64(&mut self, value: i64) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_u64(&mut self, value: u64) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_f32(&mut self, value: f32) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_f64(&mut self, value: f64) {
        self.write_bytes(&value.to_le_bytes());
    }

    /// Writes an unsigned LEB128 varint.
    pub fn write_varu32(&mut self, value: u32) {
        self.write_varu64(u64::from(value));
    }

    /// Writes an unsigned LEB128 varint.
    pub fn write_varu64(&mut self, mut value: u64) {
        loop {
            // Truncation keeps the low seven bits.
            #[allow(clippy::cast_possible_truncation)]
            let byte = (value & 0x7F) as u8;
            value >>= 7;
            if value == 0 {
                self.write_u8(byte);
                return;
            }
            self.write_u8(byte | 0x80);
        }
    }

    /// Writes a zigzag-encoded signed varint.
    #[allow(clippy::cast_sign_loss)]
    pub fn write_vars64(&mut self, value: i64) {
        let zigzag = ((value << 1) ^ (value >> 63)) as u64;
        self.write_varu64(zigzag);
    }

    /// Writes a varint byte length followed by the UTF-8 bytes.
    pub fn write_string(&mut self, value: &str) {
        self.write_varu64(value.len() as u64);
        self.write_bytes(value.as_bytes());
    }

    /// Writes the UTF-8 bytes followed by a nul terminator.
    ///
    /// Callers must reject interior nul bytes beforehand.
    pub fn write_cstring(&mut self, value: &str) {
        self.write_bytes(value.as_bytes());
        self.write_u8(0);
    }

    /// Writes a self-describing number using the smallest integer encoding
    /// that fits, or an `f64` payload for floats.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn write_number(&mut self, value: Number) {
        match value {
            Number::Float(float) => {
                self.write_u8(FLOAT64);
                self.write_f64(float);
            }
            Number::UInt(unsigned) => {
                if let Ok(signed) = i64::try_from(unsigned) {
                    self.write_number(Number::Int(signed));
                } else {
                    self.write_u8(UINT64);
                    self.write_u64(unsigned);
                }
            }
            Number::Int(int) if int >= 0 => {
                if int < 0x80 {
                    self.write_u8(int as u8);
                } else if int <= i64::from(u8::MAX) {
                    self.write_u8(UINT8);
                    self.write_u8(int as u8);
                } else if int <= i64::from(u16::MAX) {
                    self.write_u8(UINT16);
                    self.write_u16(int as u16);
                } else if int <= i64::from(u32::MAX) {
                    self.write_u8(UINT32);
                    self.write_u32(int as u32);
                } else {
                    self.write_u8(UINT64);
                    self.write_u64(int as u64);
                }
            }
            Number::Int(int) => {
                if int >= NEGATIVE_FIXINT_MIN {
                    self.write_i8(int as i8);
                } else if int >= i64::from(i8::MIN) {
                    self.write_u8(INT8);
                    self.write_i8(int as i8);
                } else if int >= i64::from(i16::MIN) {
                    self.write_u8(INT16);
                    self.write_i16(int as i16);
                } else if int >= i64::from(i32::MIN) {
                    self.write_u8(INT32);
                    self.write_i32(int as i32);
                } else {
                    self.write_u8(INT64);
                    self.write_i64(int);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_writer() {
        let writer = ByteWriter::new(8);
        assert_eq!(writer.offset(), 0);
        assert!(writer.as_bytes().is_empty());
        assert!(!writer.overflowed());
    }

    #[test]
    fn varint_encoding() {
        let mut writer = ByteWriter::new(8);
        writer.write_varu32(1);
        writer.write_varu32(300);
        assert_eq!(writer.as_bytes(), &[0x01, 0xAC, 0x02]);
    }

    #[test]
    fn zigzag_encoding() {
        let mut writer = ByteWriter::new(8);
        writer.write_vars64(-1);
        writer.write_vars64(1);
        assert_eq!(writer.as_bytes(), &[0x01, 0x02]);
    }

    #[test]
    fn overflow_counts_dropped_bytes() {
        let mut writer = ByteWriter::new(2);
        writer.write_u32(0xAABB_CCDD);
        assert!(writer.overflowed());
        assert_eq!(writer.offset(), 4);
        assert_eq!(writer.as_bytes(), &[0xDD, 0xCC]);
    }

    #[test]
    fn grow_preserves_prefix_and_allows_rerun() {
        let mut writer = ByteWriter::new(2);
        writer.write_u8(7);
        let mark = writer.offset();
        writer.write_u32(1);
        assert!(writer.overflowed());

        writer.grow(8);
        writer.set_offset(mark);
        writer.write_u32(1);
        assert!(!writer.overflowed());
        assert_eq!(writer.as_bytes(), &[7, 1, 0, 0, 0]);
    }

    #[test]
    fn bytes_from_slices_suffix() {
        let mut writer = ByteWriter::new(4);
        writer.write_bytes(&[1, 2, 3]);
        assert_eq!(writer.bytes_from(1), &[2, 3]);
        assert!(writer.bytes_from(10).is_empty());
    }

    #[test]
    fn number_fixints() {
        let mut writer = ByteWriter::new(8);
        writer.write_number(Number::Int(5));
        writer.write_number(Number::Int(-1));
        assert_eq!(writer.as_bytes(), &[0x05, 0xFF]);
    }

    #[test]
    fn number_prefixed_widths() {
        let mut writer = ByteWriter::new(32);
        writer.write_number(Number::Int(200));
        writer.write_number(Number::Int(-100));
        writer.write_number(Number::Int(70_000));
        assert_eq!(&writer.as_bytes()[..2], &[UINT8, 200]);
        assert_eq!(writer.as_bytes()[2], INT8);
        assert_eq!(writer.as_bytes()[4], UINT32);
    }

    #[test]
    fn strings() {
        let mut writer = ByteWriter::new(16);
        writer.write_string("ab");
        writer.write_cstring("cd");
        assert_eq!(writer.as_bytes(), &[2, b'a', b'b', b'c', b'd', 0]);
    }
}
