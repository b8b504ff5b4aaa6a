//! Core identifier types for the codec.

use std::fmt;

/// A wire identity for a structural node.
///
/// Reference ids are assigned by the encoding side on first attachment to a
/// root and are never reused for the lifetime of that root. The root node is
/// always `0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct RefId(u32);

impl RefId {
    /// The reference id of the top-level state object.
    pub const ROOT: Self = Self(0);

    /// Creates a new reference id.
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw reference id value.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl From<u32> for RefId {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

impl From<RefId> for u32 {
    fn from(ref_id: RefId) -> Self {
        ref_id.0
    }
}

impl fmt::Display for RefId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// A handle to a node stored in an arena.
///
/// Handles are generational: once the node is freed, the slot may be reused
/// but stale handles no longer resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl NodeId {
    /// Returns the arena slot of this handle.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Returns the generation of this handle.
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

/// The shape of a structural node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Schema,
    Array,
    Map,
    Set,
    Collection,
}

impl NodeKind {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Schema => "schema",
            Self::Array => "array",
            Self::Map => "map",
            Self::Set => "set",
            Self::Collection => "collection",
        }
    }
}

impl From<schema::CollectionKind> for NodeKind {
    fn from(kind: schema::CollectionKind) -> Self {
        match kind {
            schema::CollectionKind::Array => Self::Array,
            schema::CollectionKind::Map => Self::Map,
            schema::CollectionKind::Set => Self::Set,
            schema::CollectionKind::Collection => Self::Collection,
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ref_id_roundtrip() {
        let id = RefId::new(42);
        assert_eq!(id.raw(), 42);
        assert_eq!(u32::from(id), 42);
        assert_eq!(RefId::from(7u32), RefId::new(7));
        assert_eq!(RefId::ROOT.raw(), 0);
    }

    #[test]
    fn ref_id_display() {
        assert_eq!(RefId::new(3).to_string(), "@3");
    }

    #[test]
    fn node_id_display() {
        let id = NodeId {
            index: 4,
            generation: 2,
        };
        assert_eq!(id.to_string(), "#4v2");
    }

    #[test]
    fn kind_from_collection() {
        assert_eq!(NodeKind::from(schema::CollectionKind::Map), NodeKind::Map);
        assert_eq!(NodeKind::Collection.to_string(), "collection");
    }
}
