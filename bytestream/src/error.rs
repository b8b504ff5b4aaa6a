//! Error types for byte-level operations.

use std::fmt;

/// Result type for byte-level operations.
pub type ByteResult<T> = Result<T, ByteError>;

/// Errors that can occur while decoding bytes.
///
/// Writers never fail: writes past capacity are recorded through
/// [`ByteWriter::overflowed`](crate::ByteWriter::overflowed) instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ByteError {
    /// Attempted to read past the end of the buffer.
    UnexpectedEof {
        /// Number of bytes requested.
        requested: usize,
        /// Number of bytes available.
        available: usize,
    },

    /// A varint ran past its maximum encoded width.
    InvalidVarint,

    /// String bytes were not valid UTF-8.
    InvalidUtf8 {
        /// Byte offset where the string started.
        position: usize,
    },

    /// A nul-terminated string had no terminator before the end of input.
    UnterminatedString,

    /// A length prefix does not fit in `usize` or exceeds a caller limit.
    LengthOverflow {
        /// The declared length.
        length: u64,
    },

    /// Unknown prefix byte for a self-describing number.
    InvalidNumberPrefix {
        /// The prefix byte read.
        prefix: u8,
    },
}

impl fmt::Display for ByteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedEof {
                requested,
                available,
            } => {
                write!(
                    f,
                    "attempted to read {requested} bytes but only {available} bytes available"
                )
            }
            Self::InvalidVarint => write!(f, "varint exceeds maximum encoded width"),
            Self::InvalidUtf8 { position } => {
                write!(f, "invalid UTF-8 in string starting at byte {position}")
            }
            Self::UnterminatedString => write!(f, "nul-terminated string has no terminator"),
            Self::LengthOverflow { length } => {
                write!(f, "declared length {length} is too large")
            }
            Self::InvalidNumberPrefix { prefix } => {
                write!(f, "invalid number prefix 0x{prefix:02x}")
            }
        }
    }
}

impl std::error::Error for ByteError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_unexpected_eof() {
        let err = ByteError::UnexpectedEof {
            requested: 8,
            available: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains("8 bytes"), "should mention requested bytes");
        assert!(msg.contains("3 bytes"), "should mention available bytes");
    }

    #[test]
    fn error_display_number_prefix() {
        let err = ByteError::InvalidNumberPrefix { prefix: 0xc1 };
        assert!(err.to_string().contains("0xc1"));
    }

    #[test]
    fn error_display_utf8() {
        let err = ByteError::InvalidUtf8 { position: 12 };
        assert!(err.to_string().contains("12"));
    }

    #[test]
    fn error_equality() {
        let err1 = ByteError::LengthOverflow { length: 9 };
        let err2 = ByteError::LengthOverflow { length: 9 };
        let err3 = ByteError::LengthOverflow { length: 10 };
        assert_eq!(err1, err2);
        assert_ne!(err1, err3);
    }

    #[test]
    fn error_is_std_error() {
        fn assert_error<E: std::error::Error>() {}
        assert_error::<ByteError>();
    }
}
