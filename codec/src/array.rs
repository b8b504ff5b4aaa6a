//! Mutable array handle.
//!
//! Every mutation rewrites the affected slots: a slot the decoder has not
//! seen is sent as ADD, a known slot as REPLACE (or DELETE_AND_ADD when it
//! holds a structure) and slots past the new end as DELETE.

use std::cmp::Ordering;

use indexmap::IndexMap;
use wire::Operation;

use crate::error::{CodecError, CodecResult};
use crate::node::NodeData;
use crate::state::State;
use crate::types::{NodeId, NodeKind};
use crate::value::Value;

/// Mutable access to an array node.
#[derive(Debug)]
pub struct ArrayMut<'a> {
    state: &'a mut State,
    node: NodeId,
}

impl State {
    /// Returns a mutable handle to an array node.
    pub fn array(&mut self, node: NodeId) -> CodecResult<ArrayMut<'_>> {
        self.expect_kind(node, NodeKind::Array)?;
        Ok(ArrayMut { state: self, node })
    }
}

impl ArrayMut<'_> {
    #[must_use]
    pub const fn node(&self) -> NodeId {
        self.node
    }

    #[must_use]
    pub fn items(&self) -> &[Value] {
        self.state.array_items(self.node).unwrap_or_default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items().is_empty()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.items().get(index)
    }

    /// Appends a value, returning the new length.
    pub fn push(&mut self, value: impl Into<Value>) -> CodecResult<usize> {
        let len = self.len();
        self.state.array_splice(self.node, len, 0, vec![value.into()])?;
        Ok(self.len())
    }

    pub fn pop(&mut self) -> Option<Value> {
        let last = self.len().checked_sub(1)?;
        self.remove_at(last).ok()
    }

    /// Removes the first value, shifting the rest down.
    pub fn shift(&mut self) -> Option<Value> {
        if self.is_empty() {
            return None;
        }
        self.remove_at(0).ok()
    }

    /// Inserts a value at the front, returning the new length.
    pub fn unshift(&mut self, value: impl Into<Value>) -> CodecResult<usize> {
        self.state.array_splice(self.node, 0, 0, vec![value.into()])?;
        Ok(self.len())
    }

    pub fn insert_at(&mut self, index: usize, value: impl Into<Value>) -> CodecResult<()> {
        self.state.array_splice(self.node, index, 0, vec![value.into()])?;
        Ok(())
    }

    /// Overwrites slot `index`; `index == len` appends.
    pub fn set_at(&mut self, index: usize, value: impl Into<Value>) -> CodecResult<()> {
        let len = self.len();
        if index > len {
            return Err(CodecError::IndexOutOfBounds { index, len });
        }
        let replaced = usize::from(index < len);
        self.state.array_splice(self.node, index, replaced, vec![value.into()])?;
        Ok(())
    }

    pub fn remove_at(&mut self, index: usize) -> CodecResult<Value> {
        let len = self.len();
        if index >= len {
            return Err(CodecError::IndexOutOfBounds { index, len });
        }
        let mut removed = self.state.array_splice(self.node, index, 1, Vec::new())?;
        removed.pop().ok_or(CodecError::IndexOutOfBounds { index, len })
    }

    /// Removes `delete_count` values at `start` and inserts `items` in their
    /// place, returning the removed values.
    pub fn splice(
        &mut self,
        start: usize,
        delete_count: usize,
        items: impl IntoIterator<Item = Value>,
    ) -> CodecResult<Vec<Value>> {
        self.state
            .array_splice(self.node, start, delete_count, items.into_iter().collect())
    }

    /// Sorts the array; every slot is rewritten.
    ///
    /// The comparator gets read access to the state so structures can be
    /// ordered by their fields.
    pub fn sort_by<F>(&mut self, compare: F)
    where
        F: FnMut(&State, &Value, &Value) -> Ordering,
    {
        self.state.array_sort_by(self.node, compare);
    }

    pub fn reverse(&mut self) {
        self.state.array_reverse(self.node);
    }

    /// Removes every value with a single CLEAR operation.
    pub fn clear(&mut self) {
        self.state.array_clear(self.node);
    }
}

impl State {
    fn array_data_mut(&mut self, node: NodeId) -> Option<&mut crate::node::ArrayData> {
        match &mut self.nodes.get_mut(node)?.data {
            NodeData::Array(data) => Some(data),
            _ => None,
        }
    }

    pub(crate) fn array_splice(
        &mut self,
        node: NodeId,
        start: usize,
        delete_count: usize,
        insert: Vec<Value>,
    ) -> CodecResult<Vec<Value>> {
        let (item, len) = match &self.node(node)?.data {
            NodeData::Array(data) => (data.item, data.items.len()),
            other => {
                return Err(CodecError::NodeKindMismatch {
                    node,
                    expected: NodeKind::Array,
                    found: other.kind(),
                })
            }
        };
        if start > len {
            return Err(CodecError::IndexOutOfBounds { index: start, len });
        }
        let delete_count = delete_count.min(len - start);
        let mut checked = Vec::with_capacity(insert.len());
        for (offset, value) in insert.into_iter().enumerate() {
            let target = || format!("{}[{}]", self.describe_node(node), start + offset);
            checked.push(self.check_value(node, item.into(), value, &target)?);
        }

        let Some(data) = self.array_data_mut(node) else {
            return Err(CodecError::UnknownNode { node });
        };
        let before = data.items.clone();
        let removed: Vec<Value> = data
            .items
            .splice(start..start + delete_count, checked)
            .collect();
        self.sync_array(node, &before, false);
        Ok(removed)
    }

    pub(crate) fn array_sort_by<F>(&mut self, node: NodeId, mut compare: F)
    where
        F: FnMut(&State, &Value, &Value) -> Ordering,
    {
        let Some(NodeData::Array(data)) = self.nodes.get(node).map(|n| &n.data) else {
            return;
        };
        let before = data.items.clone();
        let mut sorted = before.clone();
        let view: &State = self;
        sorted.sort_by(|a, b| compare(view, a, b));
        if let Some(data) = self.array_data_mut(node) {
            data.items = sorted;
        }
        self.sync_array(node, &before, true);
    }

    pub(crate) fn array_reverse(&mut self, node: NodeId) {
        let Some(n) = self.nodes.get_mut(node) else {
            return;
        };
        let pure = !n.tree.is_new && !n.tree.has_pending();
        let NodeData::Array(data) = &mut n.data else {
            return;
        };
        let before = data.items.clone();
        data.items.reverse();
        if !pure {
            self.sync_array(node, &before, false);
            return;
        }
        let last = before.len().saturating_sub(1);
        for (index, value) in before.iter().enumerate() {
            if let Value::Ref(child) = value {
                if let Some(c) = self.nodes.get_mut(*child) {
                    c.tree.remove_parent(node, index);
                    c.tree.add_parent(node, last - index);
                }
            }
        }
        self.record_operation(node, Operation::Reverse);
    }

    pub(crate) fn array_clear(&mut self, node: NodeId) {
        let Some(n) = self.nodes.get_mut(node) else {
            return;
        };
        let NodeData::Array(data) = &mut n.data else {
            return;
        };
        if data.items.is_empty() {
            return;
        }
        let removed = std::mem::take(&mut data.items);
        data.tmp_items.clear();
        n.tree.discard(true);
        self.record_operation(node, Operation::Clear);
        for (index, value) in removed.into_iter().enumerate() {
            if let Value::Ref(child) = value {
                self.release_child(child, node, index);
            }
        }
    }

    /// Records slot operations for every slot that differs from `before`
    /// (every slot when `force` is set), then relinks and recounts children.
    fn sync_array(&mut self, node: NodeId, before: &[Value], force: bool) {
        let Some(n) = self.nodes.get(node) else {
            return;
        };
        let NodeData::Array(data) = &n.data else {
            return;
        };
        let after = data.items.clone();
        let known = data.tmp_items.len();
        let is_new = n.tree.is_new;
        let span = before.len().max(after.len());

        for index in 0..span {
            match (before.get(index), after.get(index)) {
                (Some(old), Some(new)) if old == new && !force => {}
                (_, Some(new)) => {
                    let op = if is_new || index >= known {
                        Operation::Add
                    } else if matches!(new, Value::Ref(_)) {
                        Operation::DeleteAndAdd
                    } else {
                        Operation::Replace
                    };
                    self.record_change(node, index, op, false);
                }
                (Some(_), None) => self.record_delete(node, index, false),
                (None, None) => {}
            }
        }

        let mut deltas: IndexMap<NodeId, (i64, usize)> = IndexMap::new();
        for index in 0..span {
            let (old, new) = (before.get(index), after.get(index));
            if old == new {
                continue;
            }
            if let Some(Value::Ref(child)) = old {
                if let Some(c) = self.nodes.get_mut(*child) {
                    c.tree.remove_parent(node, index);
                }
                deltas.entry(*child).or_insert((0, index)).0 -= 1;
            }
            if let Some(Value::Ref(child)) = new {
                if let Some(c) = self.nodes.get_mut(*child) {
                    c.tree.add_parent(node, index);
                }
                let entry = deltas.entry(*child).or_insert((0, index));
                entry.0 += 1;
                entry.1 = index;
            }
        }

        for (child, (delta, index)) in &deltas {
            for _ in 0..*delta {
                self.attach_child(*child, node, *index);
            }
        }
        for (child, (delta, _)) in &deltas {
            for _ in *delta..0 {
                self.detach_child(*child, node);
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

    fn state() -> (State, NodeId) {
        let registry = TypeRegistry::builder()
            .register(TypeDef::new("Item").field(FieldDef::new("id", FieldType::number())))
            .register(
                TypeDef::new("Game")
                    .field(FieldDef::new("numbers", FieldType::array(PrimitiveType::Int32)))
                    .field(FieldDef::new("items", FieldType::array(ChildType::schema("Item")))),
            )
            .build()
            .unwrap();
        let mut state = State::new(Arc::new(registry), "Game").unwrap();
        let root = state.root();
        let numbers = state.create_field(root, "numbers").unwrap();
        (state, numbers)
    }

    fn flush(state: &mut State) {
        state.flush_queue(ChangeSetName::Changes);
    }

    fn op(state: &State, node: NodeId, index: usize) -> Option<Operation> {
        state.nodes.get(node).unwrap().tree.indexed_op(index)
    }

    #[test]
    fn push_on_new_array_is_add() {
        let (mut state, numbers) = state();
        let mut array = state.array(numbers).unwrap();
        assert_eq!(array.push(1i64).unwrap(), 1);
        assert_eq!(array.push(2i64).unwrap(), 2);
        assert_eq!(op(&state, numbers, 1), Some(Operation::Add));
    }

    #[test]
    fn shift_rewrites_slots_and_deletes_tail() {
        let (mut state, numbers) = state();
        {
            let mut array = state.array(numbers).unwrap();
            for value in [1i64, 2, 3] {
                array.push(value).unwrap();
            }
        }
        flush(&mut state);
        let mut array = state.array(numbers).unwrap();
        assert_eq!(array.shift(), Some(Value::Int(1)));
        assert_eq!(array.items(), &[Value::Int(2), Value::Int(3)]);
        assert_eq!(op(&state, numbers, 0), Some(Operation::Replace));
        assert_eq!(op(&state, numbers, 1), Some(Operation::Replace));
        assert_eq!(op(&state, numbers, 2), Some(Operation::Delete));
    }

    #[test]
    fn pop_then_push_collapses_to_delete_and_add() {
        let (mut state, numbers) = state();
        state.array(numbers).unwrap().push(5i64).unwrap();
        flush(&mut state);
        let mut array = state.array(numbers).unwrap();
        array.pop();
        array.push(6i64).unwrap();
        assert_eq!(op(&state, numbers, 0), Some(Operation::DeleteAndAdd));
    }

    #[test]
    fn reverse_without_pending_is_pure() {
        let (mut state, numbers) = state();
        {
            let mut array = state.array(numbers).unwrap();
            array.push(1i64).unwrap();
            array.push(2i64).unwrap();
        }
        flush(&mut state);
        state.array(numbers).unwrap().reverse();
        let tree = &state.nodes.get(numbers).unwrap().tree;
        assert_eq!(op(&state, numbers, 0), None);
        assert_eq!(tree.set(ChangeSetName::Changes).unwrap().len(), 1);
        assert_eq!(
            state.array_items(numbers).unwrap(),
            &[Value::Int(2), Value::Int(1)]
        );
    }

    #[test]
    fn sort_rewrites_every_slot() {
        let (mut state, numbers) = state();
        {
            let mut array = state.array(numbers).unwrap();
            for value in [3i64, 1, 2] {
                array.push(value).unwrap();
            }
        }
        flush(&mut state);
        state
            .array(numbers)
            .unwrap()
            .sort_by(|_, a, b| a.as_i64().cmp(&b.as_i64()));
        for index in 0..3 {
            assert_eq!(op(&state, numbers, index), Some(Operation::Replace));
        }
    }

    #[test]
    fn clear_is_a_single_operation() {
        let (mut state, numbers) = state();
        {
            let mut array = state.array(numbers).unwrap();
            array.push(1i64).unwrap();
            array.clear();
            assert!(array.is_empty());
        }
        let tree = &state.nodes.get(numbers).unwrap().tree;
        assert_eq!(tree.set(ChangeSetName::Changes).unwrap().len(), 1);
        assert!(tree.set(ChangeSetName::AllChanges).unwrap().is_empty());
    }

    #[test]
    fn moved_children_keep_their_refcount() {
        let (mut state, _) = state();
        let root = state.root();
        let items = state.create_field(root, "items").unwrap();
        let a = state.create("Item").unwrap();
        let b = state.create("Item").unwrap();
        {
            let mut array = state.array(items).unwrap();
            array.push(a).unwrap();
            array.push(b).unwrap();
        }
        flush(&mut state);
        state.array(items).unwrap().shift();
        let a_ref = state.ref_id(a).unwrap();
        let b_ref = state.ref_id(b).unwrap();
        assert_eq!(state.root.ref_count(b_ref), 1);
        assert_eq!(state.root.ref_count(a_ref), 0);
        assert!(!state.is_attached(a));
        assert_eq!(op(&state, items, 0), Some(Operation::DeleteAndAdd));
    }

    #[test]
    fn wrong_item_type_rejected() {
        let (mut state, numbers) = state();
        let err = state.array(numbers).unwrap().push("x").unwrap_err();
        assert!(matches!(err, CodecError::InvalidValue { ref target, .. } if target == "array<int32>[0]"));
        assert!(state.array(state.root()).is_err());
    }

    #[test]
    fn set_at_past_end_is_out_of_bounds() {
        let (mut state, numbers) = state();
        let err = state.array(numbers).unwrap().set_at(3, 1i64).unwrap_err();
        assert_eq!(err, CodecError::IndexOutOfBounds { index: 3, len: 0 });
    }
}
