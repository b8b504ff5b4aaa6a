//! Wire operation codes.

use std::fmt;

const ADD_BIT: u8 = 0b1000_0000;
const DELETE_BIT: u8 = 0b0100_0000;

/// A wire operation.
///
/// `ADD` and `DELETE` are independent bits, so `DELETE_AND_ADD` is their union
/// and `REPLACE` is the empty set. The remaining codes live outside that bit
/// space and are only valid in uncompressed (collection item) framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Operation {
    Replace = 0,
    Clear = 10,
    Reverse = 15,
    Move = 32,
    DeleteByRefId = 33,
    Delete = 64,
    DeleteAndMove = 96,
    Add = 128,
    AddByRefId = 129,
    MoveAndAdd = 160,
    DeleteAndAdd = 192,
}

impl Operation {
    /// Returns the wire byte.
    #[must_use]
    pub const fn raw(self) -> u8 {
        self as u8
    }

    /// Parses a wire byte.
    #[must_use]
    pub const fn from_raw(byte: u8) -> Option<Self> {
        Some(match byte {
            0 => Self::Replace,
            10 => Self::Clear,
            15 => Self::Reverse,
            32 => Self::Move,
            33 => Self::DeleteByRefId,
            64 => Self::Delete,
            96 => Self::DeleteAndMove,
            128 => Self::Add,
            129 => Self::AddByRefId,
            160 => Self::MoveAndAdd,
            192 => Self::DeleteAndAdd,
            _ => return None,
        })
    }

    /// Returns `true` if the ADD bit is set.
    #[must_use]
    pub const fn has_add(self) -> bool {
        self.raw() & ADD_BIT != 0
    }

    /// Returns `true` if the DELETE bit is set.
    #[must_use]
    pub const fn has_delete(self) -> bool {
        self.raw() & DELETE_BIT != 0
    }

    /// Returns `true` for operations that carry no index (CLEAR, REVERSE).
    #[must_use]
    pub const fn is_pure(self) -> bool {
        matches!(self, Self::Clear | Self::Reverse)
    }

    /// Returns `true` if the operation fits the two compressed op bits.
    #[must_use]
    pub const fn is_field_operation(self) -> bool {
        matches!(
            self,
            Self::Replace | Self::Delete | Self::Add | Self::DeleteAndAdd
        )
    }

    /// Returns the protocol name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Replace => "REPLACE",
            Self::Clear => "CLEAR",
            Self::Reverse => "REVERSE",
            Self::Move => "MOVE",
            Self::DeleteByRefId => "DELETE_BY_REFID",
            Self::Delete => "DELETE",
            Self::DeleteAndMove => "DELETE_AND_MOVE",
            Self::Add => "ADD",
            Self::AddByRefId => "ADD_BY_REFID",
            Self::MoveAndAdd => "MOVE_AND_ADD",
            Self::DeleteAndAdd => "DELETE_AND_ADD",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Operation; 11] = [
        Operation::Replace,
        Operation::Clear,
        Operation::Reverse,
        Operation::Move,
        Operation::DeleteByRefId,
        Operation::Delete,
        Operation::DeleteAndMove,
        Operation::Add,
        Operation::AddByRefId,
        Operation::MoveAndAdd,
        Operation::DeleteAndAdd,
    ];

    #[test]
    fn raw_roundtrip() {
        for op in ALL {
            assert_eq!(Operation::from_raw(op.raw()), Some(op));
        }
        assert_eq!(Operation::from_raw(1), None);
        assert_eq!(Operation::from_raw(255), None);
    }

    #[test]
    fn delete_and_add_is_union() {
        assert_eq!(
            Operation::DeleteAndAdd.raw(),
            Operation::Delete.raw() | Operation::Add.raw()
        );
        assert!(Operation::DeleteAndAdd.has_add());
        assert!(Operation::DeleteAndAdd.has_delete());
        assert!(!Operation::Replace.has_add());
        assert!(!Operation::Replace.has_delete());
    }

    #[test]
    fn refid_ops_flags() {
        assert!(Operation::AddByRefId.has_add());
        assert!(!Operation::DeleteByRefId.has_delete());
        assert!(Operation::DeleteAndMove.has_delete());
        assert!(Operation::MoveAndAdd.has_add());
    }

    #[test]
    fn pure_ops() {
        assert!(Operation::Clear.is_pure());
        assert!(Operation::Reverse.is_pure());
        assert!(!Operation::Delete.is_pure());
    }

    #[test]
    fn field_ops_fit_two_bits() {
        for op in ALL.into_iter().filter(|op| op.is_field_operation()) {
            assert_eq!(op.raw() & 0x3F, 0, "{op} leaks into the index bits");
        }
    }
}
