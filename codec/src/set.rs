//! Mutable handle for sets and ordered collections.
//!
//! Both assign every added value a fresh synthetic index. Sets refuse a value
//! equal to one already present; collections keep duplicates.

use wire::Operation;

use crate::error::{CodecError, CodecResult};
use crate::node::{NodeData, SetData};
use crate::state::State;
use crate::types::{NodeId, NodeKind};
use crate::value::Value;

/// Mutable access to a set or collection node.
#[derive(Debug)]
pub struct SetMut<'a> {
    state: &'a mut State,
    node: NodeId,
}

impl State {
    /// Returns a mutable handle to a set node.
    pub fn set_of(&mut self, node: NodeId) -> CodecResult<SetMut<'_>> {
        self.expect_kind(node, NodeKind::Set)?;
        Ok(SetMut { state: self, node })
    }

    /// Returns a mutable handle to an ordered collection node.
    pub fn collection(&mut self, node: NodeId) -> CodecResult<SetMut<'_>> {
        self.expect_kind(node, NodeKind::Collection)?;
        Ok(SetMut { state: self, node })
    }
}

impl SetMut<'_> {
    #[must_use]
    pub const fn node(&self) -> NodeId {
        self.node
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.state.len(self.node).unwrap_or_default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn contains(&self, value: &Value) -> bool {
        self.values().any(|item| item == value)
    }

    /// Values in insertion order.
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.state.set_items(self.node)
    }

    /// Adds a value. Returns `false` if a set already holds an equal value.
    pub fn add(&mut self, value: impl Into<Value>) -> CodecResult<bool> {
        self.state.set_add(self.node, value.into())
    }

    /// Removes the first value equal to `value`.
    pub fn delete(&mut self, value: &Value) -> bool {
        self.state.set_delete(self.node, value)
    }

    /// Removes every value with a single CLEAR operation.
    pub fn clear(&mut self) {
        self.state.set_clear(self.node);
    }
}

impl State {
    fn set_data_mut(&mut self, node: NodeId) -> Option<&mut SetData> {
        match &mut self.nodes.get_mut(node)?.data {
            NodeData::Set(data) => Some(data),
            _ => None,
        }
    }

    pub(crate) fn set_add(&mut self, node: NodeId, value: Value) -> CodecResult<bool> {
        let (item, unique) = match &self.node(node)?.data {
            NodeData::Set(data) => (data.item, data.unique),
            other => {
                return Err(CodecError::NodeKindMismatch {
                    node,
                    expected: NodeKind::Set,
                    found: other.kind(),
                })
            }
        };
        let target = || self.describe_node(node);
        let value = self.check_value(node, item.into(), value, &target)?;

        let Some(data) = self.set_data_mut(node) else {
            return Err(CodecError::UnknownNode { node });
        };
        if unique && data.items.values().any(|existing| *existing == value) {
            return Ok(false);
        }
        let index = data.next_index;
        data.next_index += 1;
        data.items.insert(index, value.clone());

        self.record_change(node, index, Operation::Add, false);
        if let Value::Ref(child) = value {
            self.adopt_child(child, node, index);
        }
        Ok(true)
    }

    pub(crate) fn set_delete(&mut self, node: NodeId, value: &Value) -> bool {
        let Some(data) = self.set_data_mut(node) else {
            return false;
        };
        let Some(index) = data
            .items
            .iter()
            .find_map(|(index, item)| (item == value).then_some(*index))
        else {
            tracing::warn!(%node, value = value.kind_name(), "delete of a value not in the set");
            return false;
        };
        let Some(previous) = data.items.shift_remove(&index) else {
            return false;
        };
        if index >= data.unsent_from {
            self.retract_change(node, index);
        } else {
            data.deleted.insert(index, previous.clone());
            self.record_delete(node, index, false);
        }
        if let Value::Ref(child) = previous {
            self.release_child(child, node, index);
        }
        true
    }

    pub(crate) fn set_clear(&mut self, node: NodeId) {
        let Some(n) = self.nodes.get_mut(node) else {
            return;
        };
        let NodeData::Set(data) = &mut n.data else {
            return;
        };
        if data.items.is_empty() {
            return;
        }
        let removed: Vec<(usize, Value)> = data.items.drain(..).collect();
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

    use schema::{FieldDef, FieldType, PrimitiveType, TypeDef, TypeRegistry};

    use super::*;
    use crate::change_set::ChangeSetName;

    fn state() -> (State, NodeId, NodeId) {
        let registry = TypeRegistry::builder()
            .register(
                TypeDef::new("Game")
                    .field(FieldDef::new("tags", FieldType::set(PrimitiveType::String)))
                    .field(FieldDef::new("log", FieldType::collection(PrimitiveType::String))),
            )
            .build()
            .unwrap();
        let mut state = State::new(Arc::new(registry), "Game").unwrap();
        let root = state.root();
        let tags = state.create_field(root, "tags").unwrap();
        let log = state.create_field(root, "log").unwrap();
        (state, tags, log)
    }

    #[test]
    fn sets_reject_duplicates() {
        let (mut state, tags, _) = state();
        let mut set = state.set_of(tags).unwrap();
        assert!(set.add("a").unwrap());
        assert!(!set.add("a").unwrap());
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn collections_keep_duplicates() {
        let (mut state, _, log) = state();
        let mut collection = state.collection(log).unwrap();
        assert!(collection.add("x").unwrap());
        assert!(collection.add("x").unwrap());
        assert_eq!(collection.len(), 2);
        assert!(collection.delete(&Value::from("x")));
        assert_eq!(collection.len(), 1);
    }

    #[test]
    fn indexes_are_never_reused() {
        let (mut state, tags, _) = state();
        {
            let mut set = state.set_of(tags).unwrap();
            set.add("a").unwrap();
            set.delete(&Value::from("a"));
            set.add("b").unwrap();
        }
        let tree = &state.nodes.get(tags).unwrap().tree;
        assert_eq!(tree.indexed_op(0), None);
        assert_eq!(tree.indexed_op(1), Some(Operation::Add));
        assert!(tree.set(ChangeSetName::AllChanges).unwrap().contains(1));
    }

    #[test]
    fn deleting_an_encoded_value_records_delete() {
        let (mut state, tags, _) = state();
        state.set_of(tags).unwrap().add("a").unwrap();
        state.flush_queue(ChangeSetName::Changes);
        assert!(state.set_of(tags).unwrap().delete(&Value::from("a")));
        let tree = &state.nodes.get(tags).unwrap().tree;
        assert_eq!(tree.indexed_op(0), Some(Operation::Delete));
        assert!(tree.set(ChangeSetName::Changes).unwrap().contains(0));
    }

    #[test]
    fn handle_checks_kind() {
        let (mut state, tags, log) = state();
        assert!(state.collection(tags).is_err());
        assert!(state.set_of(log).is_err());
        assert!(!state.set_of(tags).unwrap().delete(&Value::from("missing")));
    }
}
