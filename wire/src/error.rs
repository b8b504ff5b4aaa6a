//! Error types for operation framing.

use std::fmt;

use crate::Operation;

/// Result type for framing operations.
pub type WireResult<T> = Result<T, WireError>;

/// Errors raised while framing or parsing operation headers.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum WireError {
    /// Field index does not fit the 6-bit compressed index.
    IndexOutOfRange { index: usize, max: usize },

    /// Byte is not a known operation code.
    UnknownOperation { byte: u8 },

    /// Operation cannot be packed into a compressed field byte.
    NotFieldOperation { op: Operation },

    /// Underlying byte read failed.
    Byte(bytestream::ByteError),
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IndexOutOfRange { index, max } => {
                write!(f, "field index {index} out of range (max {max})")
            }
            Self::UnknownOperation { byte } => {
                write!(f, "unknown operation byte: 0x{byte:02X}")
            }
            Self::NotFieldOperation { op } => {
                write!(f, "operation {op} cannot be used for a schema field")
            }
            Self::Byte(err) => write!(f, "byte error: {err}"),
        }
    }
}

impl std::error::Error for WireError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Byte(err) => Some(err),
            _ => None,
        }
    }
}

impl From<bytestream::ByteError> for WireError {
    fn from(err: bytestream::ByteError) -> Self {
        Self::Byte(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_index_out_of_range() {
        let err = WireError::IndexOutOfRange { index: 64, max: 63 };
        let msg = err.to_string();
        assert!(msg.contains("64"));
        assert!(msg.contains("63"));
    }

    #[test]
    fn display_unknown_operation() {
        let err = WireError::UnknownOperation { byte: 0x07 };
        assert!(err.to_string().contains("0x07"));
    }

    #[test]
    fn display_not_field_operation() {
        let err = WireError::NotFieldOperation { op: Operation::Clear };
        assert!(err.to_string().contains("CLEAR"));
    }

    #[test]
    fn byte_error_is_source() {
        use std::error::Error;
        let err = WireError::from(bytestream::ByteError::InvalidVarint);
        assert!(err.source().is_some());
    }

    #[test]
    fn error_is_std_error() {
        fn assert_error<E: std::error::Error>() {}
        assert_error::<WireError>();
    }
}
