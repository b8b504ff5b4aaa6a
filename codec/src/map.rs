//! Mutable map handle.
//!
//! Each key owns a numeric index for its lifetime in the map. A key removed
//! and re-inserted before the next encode keeps its index and collapses to
//! DELETE_AND_ADD; a removed key is forgotten once the removal is encoded.

use wire::Operation;

use crate::error::{CodecError, CodecResult};
use crate::node::{MapData, NodeData};
use crate::state::State;
use crate::types::{NodeId, NodeKind};
use crate::value::Value;

/// Mutable access to a map node.
#[derive(Debug)]
pub struct MapMut<'a> {
    state: &'a mut State,
    node: NodeId,
}

impl State {
    /// Returns a mutable handle to a map node.
    pub fn map(&mut self, node: NodeId) -> CodecResult<MapMut<'_>> {
        self.expect_kind(node, NodeKind::Map)?;
        Ok(MapMut { state: self, node })
    }
}

impl MapMut<'_> {
    #[must_use]
    pub const fn node(&self) -> NodeId {
        self.node
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.state.map_get(self.node, key)
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.state.len(self.node).unwrap_or_default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.state.map_entries(self.node).map(|(key, _)| key)
    }

    /// Inserts or replaces the value under `key`, returning the previous one.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> CodecResult<Option<Value>> {
        self.state.map_insert(self.node, key.into(), value.into())
    }

    /// Removes `key`. Removing an absent key is logged and ignored.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.state.map_remove(self.node, key)
    }

    /// Removes every entry with a single CLEAR operation.
    pub fn clear(&mut self) {
        self.state.map_clear(self.node);
    }
}

impl State {
    fn map_data_mut(&mut self, node: NodeId) -> Option<&mut MapData> {
        match &mut self.nodes.get_mut(node)?.data {
            NodeData::Map(data) => Some(data),
            _ => None,
        }
    }

    pub(crate) fn map_insert(&mut self, node: NodeId, key: String, value: Value) -> CodecResult<Option<Value>> {
        let item = match &self.node(node)?.data {
            NodeData::Map(data) => data.item,
            other => {
                return Err(CodecError::NodeKindMismatch {
                    node,
                    expected: NodeKind::Map,
                    found: other.kind(),
                })
            }
        };
        let target = || format!("{}[{key:?}]", self.describe_node(node));
        let value = self.check_value(node, item.into(), value, &target)?;

        let Some(data) = self.map_data_mut(node) else {
            return Err(CodecError::UnknownNode { node });
        };
        let (index, previous, op) = if let Some(&index) = data.index_of.get(&key) {
            let previous = data.entries.get(&key).cloned();
            if previous.as_ref() == Some(&value) {
                return Ok(previous);
            }
            data.deleted.remove(&index);
            // A key removed earlier in this cycle turns into DELETE_AND_ADD
            // through the recorded DELETE.
            let op = if matches!(value, Value::Ref(_)) && previous.is_some() {
                Operation::DeleteAndAdd
            } else {
                Operation::Replace
            };
            (index, previous, op)
        } else {
            let index = data.next_index;
            data.next_index += 1;
            data.index_of.insert(key.clone(), index);
            data.key_of.insert(index, key.clone());
            (index, None, Operation::Add)
        };
        data.entries.insert(key, value.clone());

        self.record_change(node, index, op, false);
        if let Value::Ref(child) = value {
            self.adopt_child(child, node, index);
        }
        if let Some(Value::Ref(previous_child)) = &previous {
            self.release_child(*previous_child, node, index);
        }
        Ok(previous)
    }

    pub(crate) fn map_remove(&mut self, node: NodeId, key: &str) -> Option<Value> {
        let data = self.map_data_mut(node)?;
        let (Some(&index), Some(previous)) = (data.index_of.get(key), data.entries.shift_remove(key))
        else {
            tracing::warn!(%node, key, "delete of unknown map key");
            return None;
        };
        if index >= data.unsent_from {
            data.index_of.remove(key);
            data.key_of.remove(&index);
            self.retract_change(node, index);
        } else {
            data.deleted.insert(index, previous.clone());
            self.record_delete(node, index, false);
        }
        if let Value::Ref(child) = &previous {
            self.release_child(*child, node, index);
        }
        Some(previous)
    }

    pub(crate) fn map_clear(&mut self, node: NodeId) {
        let Some(n) = self.nodes.get_mut(node) else {
            return;
        };
        let NodeData::Map(data) = &mut n.data else {
            return;
        };
        if data.entries.is_empty() {
            return;
        }
        let removed: Vec<(usize, Value)> = data
            .entries
            .drain(..)
            .filter_map(|(key, value)| data.index_of.get(&key).map(|index| (*index, value)))
            .collect();
        data.index_of.clear();
        data.key_of.clear();
        data.deleted.clear();
        n.tree.discard(true);
        self.record_operation(node, Operation::Clear);
        for (index, value) in removed {
            if let Value::Ref(child) = value {
                self.release_child(child, node, index);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use schema::{ChildType, FieldDef, FieldType, PrimitiveType, TypeDef, TypeRegistry};

    use super::*;
    use crate::change_set::ChangeSetName;

    fn state() -> (State, NodeId, NodeId) {
        let registry = TypeRegistry::builder()
            .register(TypeDef::new("Player").field(FieldDef::new("x", FieldType::number())))
            .register(
                TypeDef::new("Game")
                    .field(FieldDef::new("scores", FieldType::map(PrimitiveType::UInt16)))
                    .field(FieldDef::new("players", FieldType::map(ChildType::schema("Player")))),
            )
            .build()
            .unwrap();
        let mut state = State::new(Arc::new(registry), "Game").unwrap();
        let root = state.root();
        let scores = state.create_field(root, "scores").unwrap();
        let players = state.create_field(root, "players").unwrap();
        (state, scores, players)
    }

    fn op(state: &State, node: NodeId, index: usize) -> Option<Operation> {
        state.nodes.get(node).unwrap().tree.indexed_op(index)
    }

    #[test]
    fn new_keys_get_fresh_indexes() {
        let (mut state, scores, _) = state();
        let mut map = state.map(scores).unwrap();
        map.insert("a", 1u32).unwrap();
        map.insert("b", 2u32).unwrap();
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(op(&state, scores, 1), Some(Operation::Add));
    }

    #[test]
    fn existing_key_is_replaced() {
        let (mut state, scores, _) = state();
        state.map(scores).unwrap().insert("a", 1u32).unwrap();
        state.flush_queue(ChangeSetName::Changes);
        let previous = state.map(scores).unwrap().insert("a", 5u32).unwrap();
        assert_eq!(previous, Some(Value::UInt(1)));
        assert_eq!(op(&state, scores, 0), Some(Operation::Replace));
    }

    #[test]
    fn remove_and_reinsert_keeps_index() {
        let (mut state, scores, _) = state();
        state.map(scores).unwrap().insert("a", 1u32).unwrap();
        state.flush_queue(ChangeSetName::Changes);
        let mut map = state.map(scores).unwrap();
        assert_eq!(map.remove("a"), Some(Value::UInt(1)));
        map.insert("a", 2u32).unwrap();
        assert_eq!(op(&state, scores, 0), Some(Operation::DeleteAndAdd));
    }

    #[test]
    fn removed_key_forgotten_after_encode() {
        let (mut state, scores, _) = state();
        state.map(scores).unwrap().insert("a", 1u32).unwrap();
        state.flush_queue(ChangeSetName::Changes);
        state.map(scores).unwrap().remove("a");
        state.flush_queue(ChangeSetName::Changes);
        state.map(scores).unwrap().insert("a", 3u32).unwrap();
        assert_eq!(op(&state, scores, 1), Some(Operation::Add));
    }

    #[test]
    fn key_added_and_removed_before_encode_leaves_no_trace() {
        let (mut state, scores, _) = state();
        state.map(scores).unwrap().insert("keep", 1u32).unwrap();
        state.flush_queue(ChangeSetName::Changes);
        let mut map = state.map(scores).unwrap();
        map.insert("a", 2u32).unwrap();
        assert_eq!(map.remove("a"), Some(Value::UInt(2)));
        let tree = &state.nodes.get(scores).unwrap().tree;
        assert_eq!(tree.indexed_op(1), None);
        assert!(tree.set(ChangeSetName::Changes).unwrap().is_empty());
        assert!(!tree.set(ChangeSetName::AllChanges).unwrap().contains(1));

        state.map(scores).unwrap().insert("a", 3u32).unwrap();
        assert_eq!(op(&state, scores, 2), Some(Operation::Add));
    }

    #[test]
    fn removing_unknown_key_is_ignored() {
        let (mut state, scores, _) = state();
        assert_eq!(state.map(scores).unwrap().remove("ghost"), None);
        assert_eq!(op(&state, scores, 0), None);
        assert_eq!(state.len(scores), Some(0));
    }

    #[test]
    fn replacing_a_structure_releases_the_old_one() {
        let (mut state, _, players) = state();
        let first = state.create("Player").unwrap();
        let second = state.create("Player").unwrap();
        state.map(players).unwrap().insert("p", first).unwrap();
        state.flush_queue(ChangeSetName::Changes);
        state.map(players).unwrap().insert("p", second).unwrap();
        assert!(!state.is_attached(first));
        assert!(state.is_attached(second));
        assert_eq!(op(&state, players, 0), Some(Operation::DeleteAndAdd));
    }

    #[test]
    fn clear_releases_children() {
        let (mut state, _, players) = state();
        let player = state.create("Player").unwrap();
        let mut map = state.map(players).unwrap();
        map.insert("p", player).unwrap();
        map.clear();
        assert!(map.is_empty());
        assert!(!state.is_attached(player));
    }
}
