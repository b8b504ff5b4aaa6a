//! Change records produced by decoding.

use std::fmt;

use wire::Operation;

use crate::types::{NodeId, RefId};
use crate::value::Value;

/// The slot a decoded change applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChangeTarget {
    /// A schema field.
    Field { index: usize, name: String },
    /// A map entry.
    Key(String),
    /// An array slot, or the synthetic index of a set or collection item.
    Index(usize),
}

impl fmt::Display for ChangeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field { name, .. } => f.write_str(name),
            Self::Key(key) => write!(f, "[{key:?}]"),
            Self::Index(index) => write!(f, "[{index}]"),
        }
    }
}

/// One effective change applied to the decoded graph.
///
/// Only slots whose value actually changed are reported. Structure values
/// are handles into the decoder's graph.
#[derive(Debug, Clone, PartialEq)]
pub struct DataChange {
    pub node: NodeId,
    pub ref_id: RefId,
    pub op: Operation,
    pub target: ChangeTarget,
    pub value: Option<Value>,
    pub previous_value: Option<Value>,
}

impl DataChange {
    /// Returns `true` if the slot was emptied.
    #[must_use]
    pub const fn is_removal(&self) -> bool {
        self.value.is_none()
    }

    #[must_use]
    pub fn field_name(&self) -> Option<&str> {
        match &self.target {
            ChangeTarget::Field { name, .. } => Some(name),
            _ => None,
        }
    }
}
