//! Plain-tree snapshots of encode-side and decoded graphs.
//!
//! Snapshots drop node identity and change tracking, so a [`State`] and a
//! [`Decoder`](crate::Decoder) that replicated it produce equal snapshots.

use std::collections::{BTreeMap, HashSet};

use crate::decoder::DecodedGraph;
use crate::node::NodeData;
use crate::state::State;
use crate::types::NodeId;
use crate::value::Value;

/// A detached, comparable copy of a subtree.
#[derive(Debug, Clone, PartialEq)]
pub enum Snapshot {
    /// Unresolvable handle, or a node already on the current path.
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(String),
    /// Schema instance; only fields holding a value are present.
    Object {
        type_name: String,
        fields: BTreeMap<String, Snapshot>,
    },
    Array(Vec<Snapshot>),
    Map(BTreeMap<String, Snapshot>),
    /// Set or collection values in insertion order.
    Set(Vec<Snapshot>),
}

impl Snapshot {
    /// Snapshots the subtree of an encode-side node.
    #[must_use]
    pub fn of_state(state: &State, node: NodeId) -> Self {
        build(state, node, &mut HashSet::new())
    }

    /// Snapshots the subtree of a decoded node.
    #[must_use]
    pub fn of_graph(graph: &DecodedGraph, node: NodeId) -> Self {
        build(graph, node, &mut HashSet::new())
    }

    /// Field of an object or entry of a map.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Self> {
        match self {
            Self::Object { fields, .. } => fields.get(key),
            Self::Map(entries) => entries.get(key),
            _ => None,
        }
    }

    /// Item of an array, set or collection.
    #[must_use]
    pub fn at(&self, index: usize) -> Option<&Self> {
        match self {
            Self::Array(items) | Self::Set(items) => items.get(index),
            _ => None,
        }
    }

    /// Number of items, entries or present fields.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Object { fields, .. } => fields.len(),
            Self::Array(items) | Self::Set(items) => items.len(),
            Self::Map(entries) => entries.len(),
            _ => 0,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn type_name(&self) -> Option<&str> {
        match self {
            Self::Object { type_name, .. } => Some(type_name),
            _ => None,
        }
    }
}

impl State {
    /// Snapshots the whole tree under the root.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::of_state(self, self.root())
    }
}

/// Borrowed view of one node.
enum Shape<'a> {
    Object {
        type_name: &'a str,
        fields: Vec<(&'a str, &'a Value)>,
    },
    Array(Vec<&'a Value>),
    Map(Vec<(&'a str, &'a Value)>),
    Set(Vec<&'a Value>),
}

trait Source {
    fn shape(&self, node: NodeId) -> Option<Shape<'_>>;
}

impl Source for State {
    fn shape(&self, node: NodeId) -> Option<Shape<'_>> {
        Some(match &self.nodes.get(node)?.data {
            NodeData::Schema(data) => {
                let metadata = self.registry.get(data.type_id)?;
                Shape::Object {
                    type_name: metadata.name(),
                    fields: metadata
                        .fields()
                        .iter()
                        .filter_map(|field| {
                            let value = data.fields.get(field.index)?.as_ref()?;
                            Some((field.name.as_str(), value))
                        })
                        .collect(),
                }
            }
            NodeData::Array(data) => Shape::Array(data.items.iter().collect()),
            NodeData::Map(data) => Shape::Map(
                data.entries
                    .iter()
                    .map(|(key, value)| (key.as_str(), value))
                    .collect(),
            ),
            NodeData::Set(data) => Shape::Set(data.items.values().collect()),
        })
    }
}

impl Source for DecodedGraph {
    fn shape(&self, node: NodeId) -> Option<Shape<'_>> {
        use crate::decoder::DecodedData;

        Some(match self.data(node)? {
            DecodedData::Schema { type_id, fields } => {
                let metadata = self.registry().get(*type_id)?;
                Shape::Object {
                    type_name: metadata.name(),
                    fields: metadata
                        .fields()
                        .iter()
                        .filter_map(|field| {
                            let value = fields.get(field.index)?.as_ref()?;
                            Some((field.name.as_str(), value))
                        })
                        .collect(),
                }
            }
            DecodedData::Array { items, .. } => Shape::Array(items.iter().flatten().collect()),
            DecodedData::Map { entries, .. } => Shape::Map(
                entries
                    .iter()
                    .map(|(key, value)| (key.as_str(), value))
                    .collect(),
            ),
            DecodedData::Set { items, .. } => Shape::Set(items.values().collect()),
        })
    }
}

fn build<S: Source>(source: &S, node: NodeId, path: &mut HashSet<NodeId>) -> Snapshot {
    if !path.insert(node) {
        return Snapshot::Null;
    }
    let snapshot = match source.shape(node) {
        None => Snapshot::Null,
        Some(Shape::Object { type_name, fields }) => Snapshot::Object {
            type_name: type_name.to_owned(),
            fields: fields
                .into_iter()
                .map(|(name, value)| (name.to_owned(), leaf(source, value, path)))
                .collect(),
        },
        Some(Shape::Array(items)) => {
            Snapshot::Array(items.into_iter().map(|value| leaf(source, value, path)).collect())
        }
        Some(Shape::Map(entries)) => Snapshot::Map(
            entries
                .into_iter()
                .map(|(key, value)| (key.to_owned(), leaf(source, value, path)))
                .collect(),
        ),
        Some(Shape::Set(items)) => {
            Snapshot::Set(items.into_iter().map(|value| leaf(source, value, path)).collect())
        }
    };
    path.remove(&node);
    snapshot
}

fn leaf<S: Source>(source: &S, value: &Value, path: &mut HashSet<NodeId>) -> Snapshot {
    match value {
        Value::Bool(value) => Snapshot::Bool(*value),
        Value::Int(value) => Snapshot::Int(*value),
        Value::UInt(value) => Snapshot::UInt(*value),
        Value::Float(value) => Snapshot::Float(*value),
        Value::String(value) => Snapshot::String(value.clone()),
        Value::Ref(child) => build(source, *child, path),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use schema::{ChildType, FieldDef, FieldType, PrimitiveType, TypeDef, TypeRegistry};

    use super::*;

    fn state() -> State {
        let registry = TypeRegistry::builder()
            .register(TypeDef::new("Player").field(FieldDef::new("name", FieldType::string())))
            .register(
                TypeDef::new("Room")
                    .field(FieldDef::new("tick", FieldType::primitive(PrimitiveType::UInt16)))
                    .field(FieldDef::new("players", FieldType::map(ChildType::schema("Player"))))
                    .field(FieldDef::new("log", FieldType::array(PrimitiveType::String))),
            )
            .build()
            .unwrap();
        State::new(Arc::new(registry), "Room").unwrap()
    }

    #[test]
    fn unset_fields_are_absent() {
        let mut state = state();
        let root = state.root();
        state.set(root, "tick", 4u32).unwrap();
        let snapshot = state.snapshot();
        assert_eq!(snapshot.type_name(), Some("Room"));
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.get("tick"), Some(&Snapshot::UInt(4)));
        assert_eq!(snapshot.get("players"), None);
    }

    #[test]
    fn nested_structures_are_inlined() {
        let mut state = state();
        let root = state.root();
        let players = state.create_field(root, "players").unwrap();
        let log = state.create_field(root, "log").unwrap();
        let ada = state.create("Player").unwrap();
        state.set(ada, "name", "ada").unwrap();
        state.map(players).unwrap().insert("p1", ada).unwrap();
        state.array(log).unwrap().push("joined").unwrap();

        let snapshot = state.snapshot();
        let player = snapshot.get("players").and_then(|players| players.get("p1")).unwrap();
        assert_eq!(player.get("name"), Some(&Snapshot::String("ada".to_owned())));
        assert_eq!(
            snapshot.get("log").and_then(|log| log.at(0)),
            Some(&Snapshot::String("joined".to_owned()))
        );
    }
}
