//! Self-describing number encoding.
//!
//! Integers take the smallest of a positive fixint (one byte, `0x00..=0x7f`), a
//! negative fixint (`0xe0..=0xff`), or a prefix byte followed by a fixed-width
//! little-endian payload. Non-integral values are written as `f64`.

/// A decoded self-describing number.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    /// Any integer representable as `i64`.
    Int(i64),
    /// Integers above `i64::MAX`.
    UInt(u64),
    /// Floating point payloads.
    Float(f64),
}

pub(crate) const FLOAT32: u8 = 0xca;
pub(crate) const FLOAT64: u8 = 0xcb;
pub(crate) const UINT8: u8 = 0xcc;
pub(crate) const UINT16: u8 = 0xcd;
pub(crate) const UINT32: u8 = 0xce;
pub(crate) const UINT64: u8 = 0xcf;
pub(crate) const INT8: u8 = 0xd0;
pub(crate) const INT16: u8 = 0xd1;
pub(crate) const INT32: u8 = 0xd2;
pub(crate) const INT64: u8 = 0xd3;
pub(crate) const NEGATIVE_FIXINT_MIN: i64 = -32;

impl Number {
    /// Returns the value widened to `f64`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(self) -> f64 {
        match self {
            Self::Int(value) => value as f64,
            Self::UInt(value) => value as f64,
            Self::Float(value) => value,
        }
    }
}

impl From<i64> for Number {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u64> for Number {
    fn from(value: u64) -> Self {
        i64::try_from(value).map_or(Self::UInt(value), Self::Int)
    }
}

impl From<f64> for Number {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn large_unsigned_stays_unsigned() {
        assert_eq!(Number::from(u64::MAX), Number::UInt(u64::MAX));
        assert_eq!(Number::from(5u64), Number::Int(5));
    }

    #[test]
    fn widening() {
        assert!((Number::Int(-3).as_f64() + 3.0).abs() < f64::EPSILON);
        assert!((Number::Float(0.25).as_f64() - 0.25).abs() < f64::EPSILON);
    }
}
