//! Decode-only object graph.
//!
//! Mirrors the encode-side shapes without change tracking. Array slots may
//! hold holes while a section is being applied; holes are compacted when the
//! decoder leaves the section.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use schema::{CollectionKind, ItemType, TypeId, TypeRegistry};

use crate::arena::Arena;
use crate::types::{NodeId, NodeKind, RefId};
use crate::value::Value;

#[derive(Debug, Clone)]
pub(crate) enum DecodedData {
    Schema {
        type_id: TypeId,
        fields: Vec<Option<Value>>,
    },
    Array {
        item: ItemType,
        items: Vec<Option<Value>>,
    },
    Map {
        item: ItemType,
        entries: IndexMap<String, Value>,
        key_of: HashMap<usize, String>,
    },
    Set {
        item: ItemType,
        unique: bool,
        items: IndexMap<usize, Value>,
    },
}

impl DecodedData {
    pub(crate) fn collection(kind: CollectionKind, item: ItemType) -> Self {
        match kind {
            CollectionKind::Array => Self::Array {
                item,
                items: Vec::new(),
            },
            CollectionKind::Map => Self::Map {
                item,
                entries: IndexMap::new(),
                key_of: HashMap::new(),
            },
            CollectionKind::Set => Self::Set {
                item,
                unique: true,
                items: IndexMap::new(),
            },
            CollectionKind::Collection => Self::Set {
                item,
                unique: false,
                items: IndexMap::new(),
            },
        }
    }

    pub(crate) const fn kind(&self) -> NodeKind {
        match self {
            Self::Schema { .. } => NodeKind::Schema,
            Self::Array { .. } => NodeKind::Array,
            Self::Map { .. } => NodeKind::Map,
            Self::Set { unique: true, .. } => NodeKind::Set,
            Self::Set { unique: false, .. } => NodeKind::Collection,
        }
    }

    /// Structural children, one entry per holding slot.
    pub(crate) fn children(&self) -> Vec<NodeId> {
        let refs = |value: &Value| value.as_node();
        match self {
            Self::Schema { fields, .. } => fields.iter().flatten().filter_map(refs).collect(),
            Self::Array { items, .. } => items.iter().flatten().filter_map(refs).collect(),
            Self::Map { entries, .. } => entries.values().filter_map(refs).collect(),
            Self::Set { items, .. } => items.values().filter_map(refs).collect(),
        }
    }

    /// Drops array holes left by deletes and moves.
    pub(crate) fn compact(&mut self) {
        if let Self::Array { items, .. } = self {
            items.retain(Option::is_some);
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct DecodedNode {
    pub(crate) ref_id: RefId,
    pub(crate) data: DecodedData,
}

/// The object graph reconstructed by a [`Decoder`](super::Decoder).
///
/// Structure-valued slots hold [`Value::Ref`] handles into this graph. Nodes
/// shared by several slots on the encoding side are shared here as well.
#[derive(Debug, Clone)]
pub struct DecodedGraph {
    registry: Arc<TypeRegistry>,
    pub(crate) nodes: Arena<DecodedNode>,
    root: NodeId,
}

impl DecodedGraph {
    pub(crate) fn new(registry: Arc<TypeRegistry>, root_type: TypeId) -> Self {
        let mut nodes = Arena::new();
        let len = registry.get(root_type).map_or(0, schema::Metadata::len);
        let root = nodes.insert(DecodedNode {
            ref_id: RefId::ROOT,
            data: DecodedData::Schema {
                type_id: root_type,
                fields: vec![None; len],
            },
        });
        Self {
            registry,
            nodes,
            root,
        }
    }

    #[must_use]
    pub const fn root(&self) -> NodeId {
        self.root
    }

    #[must_use]
    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Number of live decoded nodes, the root included.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn contains(&self, node: NodeId) -> bool {
        self.nodes.contains(node)
    }

    #[must_use]
    pub fn kind(&self, node: NodeId) -> Option<NodeKind> {
        self.nodes.get(node).map(|n| n.data.kind())
    }

    #[must_use]
    pub fn ref_id(&self, node: NodeId) -> Option<RefId> {
        self.nodes.get(node).map(|n| n.ref_id)
    }

    pub(crate) fn schema_type(&self, node: NodeId) -> Option<TypeId> {
        match &self.nodes.get(node)?.data {
            DecodedData::Schema { type_id, .. } => Some(*type_id),
            _ => None,
        }
    }

    pub(crate) fn collection_item(&self, node: NodeId) -> Option<ItemType> {
        match &self.nodes.get(node)?.data {
            DecodedData::Schema { .. } => None,
            DecodedData::Array { item, .. }
            | DecodedData::Map { item, .. }
            | DecodedData::Set { item, .. } => Some(*item),
        }
    }

    /// Type name of a schema instance.
    #[must_use]
    pub fn type_name(&self, node: NodeId) -> Option<&str> {
        match &self.nodes.get(node)?.data {
            DecodedData::Schema { type_id, .. } => {
                self.registry.get(*type_id).map(schema::Metadata::name)
            }
            _ => None,
        }
    }

    /// Value of a schema field by name.
    #[must_use]
    pub fn get(&self, node: NodeId, field: &str) -> Option<&Value> {
        let DecodedData::Schema { type_id, fields } = &self.nodes.get(node)?.data else {
            return None;
        };
        let index = self.registry.get(*type_id)?.field_index(field)?;
        fields.get(index)?.as_ref()
    }

    /// Structure held by a schema field.
    #[must_use]
    pub fn child(&self, node: NodeId, field: &str) -> Option<NodeId> {
        self.get(node, field)?.as_node()
    }

    /// Number of entries in a collection, or set fields of an instance.
    #[must_use]
    pub fn len(&self, node: NodeId) -> Option<usize> {
        Some(match &self.nodes.get(node)?.data {
            DecodedData::Schema { fields, .. } => fields.iter().flatten().count(),
            DecodedData::Array { items, .. } => items.iter().flatten().count(),
            DecodedData::Map { entries, .. } => entries.len(),
            DecodedData::Set { items, .. } => items.len(),
        })
    }

    /// Array items in slot order.
    pub fn array_items(&self, node: NodeId) -> impl Iterator<Item = &Value> {
        let items = match self.nodes.get(node).map(|n| &n.data) {
            Some(DecodedData::Array { items, .. }) => items.as_slice(),
            _ => &[],
        };
        items.iter().flatten()
    }

    #[must_use]
    pub fn array_get(&self, node: NodeId, index: usize) -> Option<&Value> {
        self.array_items(node).nth(index)
    }

    #[must_use]
    pub fn map_get(&self, node: NodeId, key: &str) -> Option<&Value> {
        match &self.nodes.get(node)?.data {
            DecodedData::Map { entries, .. } => entries.get(key),
            _ => None,
        }
    }

    /// Map entries in insertion order.
    pub fn map_entries(&self, node: NodeId) -> impl Iterator<Item = (&str, &Value)> {
        let entries = match self.nodes.get(node).map(|n| &n.data) {
            Some(DecodedData::Map { entries, .. }) => Some(entries),
            _ => None,
        };
        entries
            .into_iter()
            .flat_map(|entries| entries.iter().map(|(key, value)| (key.as_str(), value)))
    }

    /// Set or collection values in insertion order.
    pub fn set_items(&self, node: NodeId) -> impl Iterator<Item = &Value> {
        let items = match self.nodes.get(node).map(|n| &n.data) {
            Some(DecodedData::Set { items, .. }) => Some(items),
            _ => None,
        };
        items.into_iter().flat_map(IndexMap::values)
    }

    pub(crate) fn insert_schema(&mut self, ref_id: RefId, type_id: TypeId) -> NodeId {
        let len = self.registry.get(type_id).map_or(0, schema::Metadata::len);
        self.nodes.insert(DecodedNode {
            ref_id,
            data: DecodedData::Schema {
                type_id,
                fields: vec![None; len],
            },
        })
    }

    pub(crate) fn insert_collection(
        &mut self,
        ref_id: RefId,
        kind: CollectionKind,
        item: ItemType,
    ) -> NodeId {
        self.nodes.insert(DecodedNode {
            ref_id,
            data: DecodedData::collection(kind, item),
        })
    }

    pub(crate) fn remove(&mut self, node: NodeId) -> Option<DecodedNode> {
        if node == self.root {
            return None;
        }
        self.nodes.remove(node)
    }

    pub(crate) fn data(&self, node: NodeId) -> Option<&DecodedData> {
        self.nodes.get(node).map(|n| &n.data)
    }

    pub(crate) fn data_mut(&mut self, node: NodeId) -> Option<&mut DecodedData> {
        self.nodes.get_mut(node).map(|n| &mut n.data)
    }
}
