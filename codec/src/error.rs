//! Error types for codec operations.

use std::fmt;

use schema::PrimitiveType;
use wire::Operation;

use crate::types::{NodeId, NodeKind, RefId};

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while mutating, encoding or decoding state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Schema declaration error.
    Schema(schema::SchemaError),

    /// Byte-level read error.
    Byte(bytestream::ByteError),

    /// Operation framing error.
    Wire(wire::WireError),

    /// Type name is not registered.
    UnknownType { name: String },

    /// Field name does not exist on the type.
    UnknownField { type_name: String, field: String },

    /// Node handle does not resolve.
    UnknownNode { node: NodeId },

    /// Node has a different shape than the operation requires.
    NodeKindMismatch {
        node: NodeId,
        expected: NodeKind,
        found: NodeKind,
    },

    /// Value does not fit the declared type of its slot.
    InvalidValue { target: String, reason: ValueReason },

    /// Collection position outside the current length.
    IndexOutOfBounds { index: usize, len: usize },

    /// Node is not attached to the root.
    DetachedNode { node: NodeId },

    /// Node is still referenced and cannot be disposed.
    NodeInUse { node: NodeId },

    /// Decoded stream does not match local definitions.
    DefinitionMismatch {
        ref_id: RefId,
        reason: MismatchReason,
    },
}

/// Details for invalid value errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueReason {
    /// Primitive of the wrong kind.
    KindMismatch {
        expected: PrimitiveType,
        found: &'static str,
    },
    /// Integer outside the range of the declared width.
    OutOfRange { expected: PrimitiveType, value: i128 },
    /// Fractional or infinite value for an integer kind.
    NotIntegral { expected: PrimitiveType },
    /// Nul byte inside a nul-terminated string.
    InteriorNul,
    /// Structure of the wrong type, or a primitive where a structure is declared.
    StructureMismatch { expected: String, found: String },
    /// Node assigned into one of its own slots.
    SelfReference,
}

/// Details for definition mismatches found while decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MismatchReason {
    /// Reference id is not known locally.
    UnknownRef,
    /// Field index is not declared on the local type.
    UnknownField { index: usize },
    /// Type id is not registered locally.
    UnknownTypeId { type_id: u32 },
    /// Operation is not valid for the current node.
    UnexpectedOperation { op: Operation },
    /// Collection slot index exceeds the configured limit.
    IndexLimit { index: usize, max: usize },
    /// Referenced node has the wrong shape.
    WrongShape { expected: String },
    /// Stream ended or contained malformed bytes.
    Malformed(String),
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Schema(e) => write!(f, "schema error: {e}"),
            Self::Byte(e) => write!(f, "byte error: {e}"),
            Self::Wire(e) => write!(f, "wire error: {e}"),
            Self::UnknownType { name } => write!(f, "unknown type '{name}'"),
            Self::UnknownField { type_name, field } => {
                write!(f, "type '{type_name}' has no field '{field}'")
            }
            Self::UnknownNode { node } => write!(f, "node {node} does not exist"),
            Self::NodeKindMismatch {
                node,
                expected,
                found,
            } => {
                write!(f, "node {node} is a {found}, expected a {expected}")
            }
            Self::InvalidValue { target, reason } => {
                write!(f, "invalid value for {target}: {reason}")
            }
            Self::IndexOutOfBounds { index, len } => {
                write!(f, "index {index} out of bounds for length {len}")
            }
            Self::DetachedNode { node } => {
                write!(f, "node {node} is not attached to the root")
            }
            Self::NodeInUse { node } => write!(f, "node {node} is still referenced"),
            Self::DefinitionMismatch { ref_id, reason } => {
                write!(f, "definition mismatch at {ref_id}: {reason}")
            }
        }
    }
}

impl fmt::Display for ValueReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KindMismatch { expected, found } => {
                write!(f, "expected {} but got {found}", expected.name())
            }
            Self::OutOfRange { expected, value } => {
                write!(f, "value {value} does not fit in {}", expected.name())
            }
            Self::NotIntegral { expected } => {
                write!(f, "non-integral value for {}", expected.name())
            }
            Self::InteriorNul => write!(f, "cstring contains a nul byte"),
            Self::StructureMismatch { expected, found } => {
                write!(f, "expected {expected} but got {found}")
            }
            Self::SelfReference => write!(f, "node cannot contain itself"),
        }
    }
}

impl fmt::Display for MismatchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownRef => write!(f, "unknown reference id"),
            Self::UnknownField { index } => write!(f, "unknown field index {index}"),
            Self::UnknownTypeId { type_id } => write!(f, "unknown type id {type_id}"),
            Self::UnexpectedOperation { op } => write!(f, "unexpected operation {op}"),
            Self::IndexLimit { index, max } => {
                write!(f, "collection index {index} exceeds limit {max}")
            }
            Self::WrongShape { expected } => write!(f, "expected a {expected}"),
            Self::Malformed(detail) => write!(f, "malformed stream: {detail}"),
        }
    }
}

impl std::error::Error for CodecError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Schema(e) => Some(e),
            Self::Byte(e) => Some(e),
            Self::Wire(e) => Some(e),
            _ => None,
        }
    }
}

impl From<schema::SchemaError> for CodecError {
    fn from(err: schema::SchemaError) -> Self {
        Self::Schema(err)
    }
}

impl From<bytestream::ByteError> for CodecError {
    fn from(err: bytestream::ByteError) -> Self {
        Self::Byte(err)
    }
}

impl From<wire::WireError> for CodecError {
    fn from(err: wire::WireError) -> Self {
        Self::Wire(err)
    }
}
