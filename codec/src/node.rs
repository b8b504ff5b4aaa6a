//! Encode-side node storage.

use std::collections::HashMap;

use indexmap::IndexMap;
use schema::{ItemType, TypeId};

use crate::change_tree::ChangeTree;
use crate::types::{NodeId, NodeKind};
use crate::value::Value;

#[derive(Debug, Clone)]
pub(crate) struct SchemaData {
    pub(crate) type_id: TypeId,
    pub(crate) fields: Vec<Option<Value>>,
}

/// Slot storage plus the slots as of the last encode.
#[derive(Debug, Clone)]
pub(crate) struct ArrayData {
    pub(crate) item: ItemType,
    pub(crate) items: Vec<Value>,
    pub(crate) tmp_items: Vec<Value>,
}

#[derive(Debug, Clone)]
pub(crate) struct MapData {
    pub(crate) item: ItemType,
    pub(crate) entries: IndexMap<String, Value>,
    pub(crate) index_of: HashMap<String, usize>,
    pub(crate) key_of: HashMap<usize, String>,
    pub(crate) next_index: usize,
    /// Indexes from here on were allocated after the last encode.
    pub(crate) unsent_from: usize,
    /// Values removed since the last encode, by index.
    pub(crate) deleted: HashMap<usize, Value>,
}

/// Storage shared by sets and ordered collections.
#[derive(Debug, Clone)]
pub(crate) struct SetData {
    pub(crate) item: ItemType,
    pub(crate) unique: bool,
    pub(crate) items: IndexMap<usize, Value>,
    pub(crate) next_index: usize,
    pub(crate) unsent_from: usize,
    pub(crate) deleted: HashMap<usize, Value>,
}

#[derive(Debug, Clone)]
pub(crate) enum NodeData {
    Schema(SchemaData),
    Array(ArrayData),
    Map(MapData),
    Set(SetData),
}

impl NodeData {
    pub(crate) fn schema(type_id: TypeId, len: usize) -> Self {
        Self::Schema(SchemaData {
            type_id,
            fields: vec![None; len],
        })
    }

    pub(crate) const fn array(item: ItemType) -> Self {
        Self::Array(ArrayData {
            item,
            items: Vec::new(),
            tmp_items: Vec::new(),
        })
    }

    pub(crate) fn map(item: ItemType) -> Self {
        Self::Map(MapData {
            item,
            entries: IndexMap::new(),
            index_of: HashMap::new(),
            key_of: HashMap::new(),
            next_index: 0,
            unsent_from: 0,
            deleted: HashMap::new(),
        })
    }

    pub(crate) fn set(item: ItemType, unique: bool) -> Self {
        Self::Set(SetData {
            item,
            unique,
            items: IndexMap::new(),
            next_index: 0,
            unsent_from: 0,
            deleted: HashMap::new(),
        })
    }

    pub(crate) const fn kind(&self) -> NodeKind {
        match self {
            Self::Schema(_) => NodeKind::Schema,
            Self::Array(_) => NodeKind::Array,
            Self::Map(_) => NodeKind::Map,
            Self::Set(data) if data.unique => NodeKind::Set,
            Self::Set(_) => NodeKind::Collection,
        }
    }

    /// Declared item type; `None` for schema instances.
    pub(crate) const fn item(&self) -> Option<ItemType> {
        match self {
            Self::Schema(_) => None,
            Self::Array(data) => Some(data.item),
            Self::Map(data) => Some(data.item),
            Self::Set(data) => Some(data.item),
        }
    }

    /// Live value at a field index.
    pub(crate) fn value_at(&self, index: usize) -> Option<&Value> {
        match self {
            Self::Schema(data) => data.fields.get(index).and_then(Option::as_ref),
            Self::Array(data) => data.items.get(index),
            Self::Map(data) => data
                .key_of
                .get(&index)
                .and_then(|key| data.entries.get(key)),
            Self::Set(data) => data.items.get(&index),
        }
    }

    /// Value removed at `index` since the last encode.
    pub(crate) fn removed_at(&self, index: usize) -> Option<&Value> {
        match self {
            Self::Schema(_) => None,
            Self::Array(data) => data.tmp_items.get(index),
            Self::Map(data) => data.deleted.get(&index),
            Self::Set(data) => data.deleted.get(&index),
        }
    }

    /// Current structural children with the index they occupy.
    pub(crate) fn children(&self) -> Vec<(NodeId, usize)> {
        let mut out = Vec::new();
        match self {
            Self::Schema(data) => {
                for (index, value) in data.fields.iter().enumerate() {
                    if let Some(Value::Ref(child)) = value {
                        out.push((*child, index));
                    }
                }
            }
            Self::Array(data) => {
                for (index, value) in data.items.iter().enumerate() {
                    if let Value::Ref(child) = value {
                        out.push((*child, index));
                    }
                }
            }
            Self::Map(data) => {
                for (key, value) in &data.entries {
                    if let (Value::Ref(child), Some(index)) = (value, data.index_of.get(key)) {
                        out.push((*child, *index));
                    }
                }
            }
            Self::Set(data) => {
                for (index, value) in &data.items {
                    if let Value::Ref(child) = value {
                        out.push((*child, *index));
                    }
                }
            }
        }
        out
    }

    /// Number of live entries.
    pub(crate) fn len(&self) -> usize {
        match self {
            Self::Schema(data) => data.fields.iter().filter(|value| value.is_some()).count(),
            Self::Array(data) => data.items.len(),
            Self::Map(data) => data.entries.len(),
            Self::Set(data) => data.items.len(),
        }
    }

    /// Bookkeeping after this node's pending operations were flushed.
    pub(crate) fn on_encode_end(&mut self) {
        match self {
            Self::Schema(_) => {}
            Self::Array(data) => data.tmp_items.clone_from(&data.items),
            Self::Map(data) => {
                data.unsent_from = data.next_index;
                for (index, _) in data.deleted.drain() {
                    if let Some(key) = data.key_of.remove(&index) {
                        if !data.entries.contains_key(&key) {
                            data.index_of.remove(&key);
                        } else {
                            data.key_of.insert(index, key);
                        }
                    }
                }
            }
            Self::Set(data) => {
                data.unsent_from = data.next_index;
                data.deleted.clear();
            }
        }
    }
}

/// A node of the encode-side arena.
#[derive(Debug, Clone)]
pub(crate) struct Node {
    pub(crate) data: NodeData,
    pub(crate) tree: ChangeTree,
}

#[cfg(test)]
mod tests {
    use super::*;
    use schema::PrimitiveType;

    fn child(index: u32) -> NodeId {
        NodeId {
            index,
            generation: 0,
        }
    }

    #[test]
    fn schema_children_follow_fields() {
        let mut data = NodeData::schema(TypeId::new(0), 3);
        if let NodeData::Schema(schema) = &mut data {
            schema.fields[0] = Some(Value::Int(1));
            schema.fields[2] = Some(Value::Ref(child(5)));
        }
        assert_eq!(data.children(), vec![(child(5), 2)]);
        assert_eq!(data.len(), 2);
        assert_eq!(data.kind(), NodeKind::Schema);
    }

    #[test]
    fn array_snapshot_on_encode_end() {
        let mut data = NodeData::array(ItemType::Primitive(PrimitiveType::Int32));
        if let NodeData::Array(array) = &mut data {
            array.items.push(Value::Int(4));
        }
        assert_eq!(data.removed_at(0), None);
        data.on_encode_end();
        assert_eq!(data.removed_at(0), Some(&Value::Int(4)));
    }

    #[test]
    fn map_forgets_deleted_keys_on_encode_end() {
        let mut data = NodeData::map(ItemType::Primitive(PrimitiveType::String));
        if let NodeData::Map(map) = &mut data {
            map.index_of.insert("a".to_owned(), 0);
            map.key_of.insert(0, "a".to_owned());
            map.deleted.insert(0, Value::from("x"));
        }
        data.on_encode_end();
        let NodeData::Map(map) = &data else {
            panic!("expected map");
        };
        assert!(map.index_of.is_empty());
        assert!(map.key_of.is_empty());
    }

    #[test]
    fn set_kind_depends_on_uniqueness() {
        let item = ItemType::Primitive(PrimitiveType::Int8);
        assert_eq!(NodeData::set(item, true).kind(), NodeKind::Set);
        assert_eq!(NodeData::set(item, false).kind(), NodeKind::Collection);
    }
}
