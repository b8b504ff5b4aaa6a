//! Incremental and full-state encoding.
//!
//! A pass walks one of the root's node queues in parent-first order. Each
//! node with entries to send opens a section with a structure switch (the
//! root's section at the very start of a shared encode omits it), followed by
//! one operation per entry.
//!
//! The output buffer grows on demand: a pass that overflows is rewound and
//! run again with a larger buffer, so no partial output is ever returned.

use std::collections::HashSet;

use bytestream::ByteWriter;
use schema::{ItemType, PrimitiveType, TypeId, ValueType, ViewTag};
use wire::Operation;

use crate::change_set::{ChangeSetName, Entry};
use crate::limits::CodecLimits;
use crate::node::{Node, NodeData};
use crate::state::State;
use crate::types::{NodeId, RefId};
use crate::value::{write_primitive, Value};
use crate::view::{View, ViewChange};

/// Encodes a [`State`] into patches and full-state snapshots.
#[derive(Debug)]
pub struct Encoder {
    state: State,
    writer: ByteWriter,
    limits: CodecLimits,
}

impl Encoder {
    #[must_use]
    pub fn new(state: State) -> Self {
        Self::with_limits(state, CodecLimits::default())
    }

    #[must_use]
    pub fn with_limits(state: State, limits: CodecLimits) -> Self {
        Self {
            state,
            writer: ByteWriter::new(limits.initial_buffer_bytes),
            limits,
        }
    }

    #[must_use]
    pub const fn state(&self) -> &State {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut State {
        &mut self.state
    }

    #[must_use]
    pub fn into_state(self) -> State {
        self.state
    }

    #[must_use]
    pub const fn limits(&self) -> &CodecLimits {
        &self.limits
    }

    /// Current output buffer capacity.
    #[must_use]
    pub fn buffer_capacity(&self) -> usize {
        self.writer.capacity()
    }

    /// Returns `true` if any shared or filtered operation is pending.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        let root = &self.state.root;
        !root.queue(ChangeSetName::Changes).is_empty()
            || !root.queue(ChangeSetName::FilteredChanges).is_empty()
    }

    /// Encodes pending shared changes and flushes them.
    ///
    /// Filtered changes stay pending for [`encode_view`](Self::encode_view)
    /// until [`discard_changes`](Self::discard_changes).
    pub fn encode(&mut self) -> &[u8] {
        self.run(ChangeSetName::Changes, None, 0, false);
        self.state.flush_queue(ChangeSetName::Changes);
        tracing::trace!(bytes = self.writer.offset(), "encoded shared patch");
        self.writer.as_bytes()
    }

    /// Encodes the full shared state as ADD operations. Nothing is flushed.
    pub fn encode_all(&mut self) -> &[u8] {
        self.run(ChangeSetName::AllChanges, None, 0, false);
        tracing::trace!(bytes = self.writer.offset(), "encoded full shared state");
        self.writer.as_bytes()
    }

    /// Appends one viewer's filtered changes after the first `shared_offset`
    /// bytes of the previous shared encode and returns prefix and suffix.
    ///
    /// Sends the view's queued visibility operations first, then consumes
    /// them.
    pub fn encode_view(&mut self, view: &mut View, shared_offset: usize) -> &[u8] {
        self.run(ChangeSetName::FilteredChanges, Some(view), shared_offset, true);
        view.clear_pending();
        self.writer.as_bytes()
    }

    /// Appends the full filtered state visible to `view` after the first
    /// `shared_offset` bytes of a previous [`encode_all`](Self::encode_all).
    ///
    /// Queued visibility operations are subsumed by the full state and
    /// dropped.
    pub fn encode_all_view(&mut self, view: &mut View, shared_offset: usize) -> &[u8] {
        self.run(ChangeSetName::AllFilteredChanges, Some(view), shared_offset, false);
        view.clear_pending();
        self.writer.as_bytes()
    }

    /// Flushes pending shared and filtered changes without encoding them.
    pub fn discard_changes(&mut self) {
        self.state.flush_queue(ChangeSetName::Changes);
        self.state.flush_queue(ChangeSetName::FilteredChanges);
    }

    fn run(&mut self, name: ChangeSetName, view: Option<&View>, start: usize, with_view_changes: bool) {
        self.writer.grow(start);
        loop {
            self.writer.set_offset(start);
            let mut pass = Pass {
                state: &self.state,
                writer: &mut self.writer,
                view,
                start,
                force_add: name.is_cumulative(),
                replayed: HashSet::new(),
            };
            if let (true, Some(view)) = (with_view_changes, view) {
                pass.write_view_changes(view);
            }
            pass.write_queue(name);
            if !self.writer.overflowed() {
                return;
            }
            let needed = self.writer.offset();
            let capacity = self.limits.grown_capacity(needed);
            tracing::warn!(
                needed,
                capacity,
                previous = self.writer.capacity(),
                "encode buffer overflow, growing and re-encoding"
            );
            self.writer.grow(capacity);
        }
    }
}

/// A resolved value ready to be written after its header.
enum Prepared<'a> {
    Primitive(PrimitiveType, &'a Value),
    Ref { ref_id: RefId, type_id: Option<TypeId> },
}

struct Pass<'a> {
    state: &'a State,
    writer: &'a mut ByteWriter,
    view: Option<&'a View>,
    start: usize,
    force_add: bool,
    /// Slots already sent from the view's visibility operations.
    replayed: HashSet<(NodeId, usize)>,
}

impl Pass<'_> {
    fn write_queue(&mut self, name: ChangeSetName) {
        let state = self.state;
        for &node in state.root.queue(name) {
            let Some(n) = state.nodes.get(node) else {
                continue;
            };
            if let Some(view) = self.view {
                if n.tree.is_filtered && !view.sees(state, node) {
                    continue;
                }
            }
            let (Some(set), Some(ref_id)) = (n.tree.set(name), n.tree.ref_id) else {
                continue;
            };
            let mut section = Section::new(node, ref_id);
            for entry in set.iter() {
                match entry {
                    Entry::Pure(op) => {
                        self.open(&mut section);
                        wire::write_pure_op(self.writer, op);
                    }
                    Entry::Index(index) => {
                        let op = if self.force_add {
                            Some(Operation::Add)
                        } else {
                            n.tree.indexed_op(index)
                        };
                        match op {
                            Some(op) => self.write_entry(&mut section, n, index, op, None),
                            None => tracing::debug!(%node, index, "pending index without an operation"),
                        }
                    }
                }
            }
        }
    }

    fn write_view_changes(&mut self, view: &View) {
        let state = self.state;
        for (&node, entries) in &view.changes {
            let Some(n) = state.nodes.get(node) else {
                continue;
            };
            let Some(ref_id) = n.tree.ref_id.filter(|_| n.tree.attached) else {
                continue;
            };
            let mut section = Section::new(node, ref_id);
            for (&index, change) in entries {
                let before = self.writer.offset();
                self.write_entry(&mut section, n, index, change.op, Some(change));
                if change.op != Operation::Delete && self.writer.offset() != before {
                    self.replayed.insert((node, index));
                }
            }
        }
    }

    /// Opens the node's section before its first operation.
    fn open(&mut self, section: &mut Section) {
        if section.open {
            return;
        }
        section.open = true;
        let omit = self.view.is_none()
            && self.writer.offset() == self.start
            && section.node == self.state.root_node;
        if !omit {
            wire::write_switch(self.writer, section.ref_id.raw());
        }
    }

    fn write_entry(
        &mut self,
        section: &mut Section,
        n: &Node,
        index: usize,
        op: Operation,
        replay: Option<&ViewChange>,
    ) {
        let replayed = replay.is_none() && self.replayed.contains(&(section.node, index));
        match &n.data {
            NodeData::Schema(data) => {
                let state = self.state;
                let Some(field) = state
                    .registry
                    .get(data.type_id)
                    .and_then(|metadata| metadata.field(index))
                else {
                    return;
                };
                if replayed || (replay.is_none() && !self.field_visible(section.node, field.tag)) {
                    return;
                }
                let value = data.fields.get(index).and_then(Option::as_ref);
                self.write_field(section, index, op, field.ty, value);
            }
            NodeData::Array(data) => {
                let by_ref = self.view.is_some()
                    && n.tree.is_filtered
                    && matches!(data.item, ItemType::Schema(_));
                if by_ref {
                    self.write_array_by_ref(section, n, index, op, replay);
                    return;
                }
                if replayed {
                    return;
                }
                let current = data.items.get(index);
                let removed = n.data.removed_at(index);
                if replay.is_none() && !self.item_visible(n, op, current, removed) {
                    return;
                }
                self.write_item(section, index, op, data.item, current, None);
            }
            NodeData::Map(data) => {
                let key = data.key_of.get(&index);
                let current = key.and_then(|key| data.entries.get(key));
                let removed = n.data.removed_at(index);
                if replayed || (replay.is_none() && !self.item_visible(n, op, current, removed)) {
                    return;
                }
                self.write_item(section, index, op, data.item, current, key.map(String::as_str));
            }
            NodeData::Set(data) => {
                let current = data.items.get(&index);
                let removed = n.data.removed_at(index);
                if replayed || (replay.is_none() && !self.item_visible(n, op, current, removed)) {
                    return;
                }
                self.write_item(section, index, op, data.item, current, None);
            }
        }
    }

    fn field_visible(&self, node: NodeId, tag: Option<ViewTag>) -> bool {
        let Some(view) = self.view else {
            return true;
        };
        match tag {
            None => true,
            Some(ViewTag::DEFAULT) => view.sees(self.state, node),
            Some(tag) => view.has_tag(node, tag),
        }
    }

    /// Items of a filtered collection are visible when their structure is.
    fn item_visible(
        &self,
        n: &Node,
        op: Operation,
        current: Option<&Value>,
        removed: Option<&Value>,
    ) -> bool {
        let Some(view) = self.view else {
            return true;
        };
        if !n.tree.is_filtered {
            return true;
        }
        let value = if op == Operation::Delete { removed } else { current };
        match value.and_then(Value::as_node) {
            Some(child) => view.sees(self.state, child),
            None => true,
        }
    }

    fn write_field(
        &mut self,
        section: &mut Section,
        index: usize,
        op: Operation,
        ty: ValueType,
        value: Option<&Value>,
    ) {
        let op = match (op, value) {
            (Operation::Delete, _) => Operation::Delete,
            (_, None) => return,
            (op, Some(_)) => op,
        };
        let prepared = match value {
            Some(value) if op != Operation::Delete => match self.prepare(ty, value) {
                Some(prepared) => Some(prepared),
                None => return,
            },
            _ => None,
        };
        let (byte, written) = match wire::field_op_byte(op, index) {
            Ok(header) => header,
            Err(err) => {
                tracing::warn!(error = %err, index, "field operation not encodable");
                return;
            }
        };
        self.open(section);
        self.writer.write_u8(byte);
        if let Some(prepared) = prepared {
            self.write_prepared(&prepared, written);
        }
    }

    fn write_item(
        &mut self,
        section: &mut Section,
        index: usize,
        op: Operation,
        item: ItemType,
        value: Option<&Value>,
        key: Option<&str>,
    ) {
        let Ok(index) = u32::try_from(index) else {
            tracing::warn!(index, "collection index exceeds the wire range");
            return;
        };
        if op == Operation::Delete {
            self.open(section);
            wire::write_item_op(self.writer, op, index);
            return;
        }
        let Some(prepared) = value.and_then(|value| self.prepare(item.into(), value)) else {
            return;
        };
        self.open(section);
        wire::write_item_op(self.writer, op, index);
        if op.has_add() {
            if let Some(key) = key {
                self.writer.write_string(key);
            }
        }
        self.write_prepared(&prepared, op);
    }

    /// Filtered arrays of structures are addressed by ref id in view passes,
    /// since each viewer holds a different subset of the slots.
    fn write_array_by_ref(
        &mut self,
        section: &mut Section,
        n: &Node,
        index: usize,
        op: Operation,
        replay: Option<&ViewChange>,
    ) {
        let NodeData::Array(data) = &n.data else {
            return;
        };
        let Some(view) = self.view else {
            return;
        };
        let still_present = |child: NodeId| data.items.contains(&Value::Ref(child));

        if let Some(change) = replay {
            let Some(child) = change.child.or_else(|| data.items.get(index).and_then(Value::as_node))
            else {
                return;
            };
            if change.op == Operation::Delete {
                self.write_by_ref(section, Operation::DeleteByRefId, child, data.item);
            } else if still_present(child) {
                self.write_by_ref(section, Operation::AddByRefId, child, data.item);
            }
            return;
        }

        if op.has_delete() || op == Operation::Replace {
            if let Some(previous) = n.data.removed_at(index).and_then(Value::as_node) {
                if view.sees(self.state, previous) && !still_present(previous) {
                    self.write_by_ref(section, Operation::DeleteByRefId, previous, data.item);
                }
            }
        }
        if op == Operation::Delete || self.replayed.contains(&(section.node, index)) {
            return;
        }
        if let Some(child) = data.items.get(index).and_then(Value::as_node) {
            if view.sees(self.state, child) {
                self.write_by_ref(section, Operation::AddByRefId, child, data.item);
            }
        }
    }

    fn write_by_ref(&mut self, section: &mut Section, op: Operation, child: NodeId, item: ItemType) {
        let Some(ref_id) = self.state.nodes.get(child).and_then(|c| c.tree.ref_id) else {
            return;
        };
        if op == Operation::DeleteByRefId {
            self.open(section);
            wire::write_item_op(self.writer, op, ref_id.raw());
            return;
        }
        let value = Value::Ref(child);
        let Some(prepared) = self.prepare(item.into(), &value) else {
            return;
        };
        self.open(section);
        wire::write_item_op(self.writer, op, ref_id.raw());
        self.write_prepared(&prepared, Operation::Add);
    }

    fn prepare<'v>(&self, ty: ValueType, value: &'v Value) -> Option<Prepared<'v>> {
        match ty {
            ValueType::Primitive(primitive) => Some(Prepared::Primitive(primitive, value)),
            ValueType::Schema(declared) => {
                let child = self.state.nodes.get(value.as_node()?)?;
                let ref_id = child.tree.ref_id?;
                let type_id = match &child.data {
                    NodeData::Schema(data) if data.type_id != declared => Some(data.type_id),
                    _ => None,
                };
                Some(Prepared::Ref { ref_id, type_id })
            }
            ValueType::Collection { .. } => {
                let child = self.state.nodes.get(value.as_node()?)?;
                Some(Prepared::Ref {
                    ref_id: child.tree.ref_id?,
                    type_id: None,
                })
            }
        }
    }

    fn write_prepared(&mut self, prepared: &Prepared<'_>, op: Operation) {
        match prepared {
            Prepared::Primitive(primitive, value) => write_primitive(self.writer, *primitive, value),
            Prepared::Ref { ref_id, type_id } => {
                self.writer.write_varu32(ref_id.raw());
                if let (true, Some(type_id)) = (op.has_add(), type_id) {
                    wire::write_type_id(self.writer, u32::from(type_id.raw()));
                }
            }
        }
    }
}

/// Lazily opened section of one node.
struct Section {
    node: NodeId,
    ref_id: RefId,
    open: bool,
}

impl Section {
    const fn new(node: NodeId, ref_id: RefId) -> Self {
        Self {
            node,
            ref_id,
            open: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use schema::{FieldDef, FieldType, TypeDef, TypeRegistry};

    use super::*;

    fn encoder() -> Encoder {
        let registry = TypeRegistry::builder()
            .register(
                TypeDef::new("Point")
                    .field(FieldDef::new("x", FieldType::number()))
                    .field(FieldDef::new("y", FieldType::number())),
            )
            .register(
                TypeDef::new("Game")
                    .field(FieldDef::new("tick", FieldType::primitive(PrimitiveType::UInt8)))
                    .field(FieldDef::new("origin", FieldType::schema("Point"))),
            )
            .build()
            .unwrap();
        let state = State::new(Arc::new(registry), "Game").unwrap();
        Encoder::with_limits(state, CodecLimits::for_testing())
    }

    #[test]
    fn root_section_omits_switch() {
        let mut encoder = encoder();
        let root = encoder.state().root();
        encoder.state_mut().set(root, "tick", 7u32).unwrap();
        assert_eq!(encoder.encode(), &[0x80, 7]);
    }

    #[test]
    fn nested_section_switches() {
        let mut encoder = encoder();
        let root = encoder.state().root();
        let state = encoder.state_mut();
        let origin = state.create_field(root, "origin").unwrap();
        state.set(origin, "x", 1i64).unwrap();
        // root: ADD field 1 -> ref 1; switch to ref 1: ADD field 0 -> 1.
        assert_eq!(encoder.encode(), &[0x81, 1, 0xFF, 1, 0x80, 1]);
    }

    #[test]
    fn second_encode_is_empty() {
        let mut encoder = encoder();
        let root = encoder.state().root();
        encoder.state_mut().set(root, "tick", 1u32).unwrap();
        assert!(encoder.has_changes());
        assert!(!encoder.encode().is_empty());
        assert!(!encoder.has_changes());
        assert!(encoder.encode().is_empty());
    }

    #[test]
    fn full_state_is_repeatable() {
        let mut encoder = encoder();
        let root = encoder.state().root();
        encoder.state_mut().set(root, "tick", 9u32).unwrap();
        let _ = encoder.encode();
        let first = encoder.encode_all().to_vec();
        let second = encoder.encode_all().to_vec();
        assert_eq!(first, vec![0x80, 9]);
        assert_eq!(first, second);
    }

    #[test]
    fn unset_sends_delete() {
        let mut encoder = encoder();
        let root = encoder.state().root();
        encoder.state_mut().set(root, "tick", 1u32).unwrap();
        let _ = encoder.encode();
        encoder.state_mut().unset(root, "tick").unwrap();
        assert_eq!(encoder.encode(), &[0x40]);
    }

    #[test]
    fn buffer_grows_on_overflow() {
        let mut encoder = encoder();
        let root = encoder.state().root();
        let state = encoder.state_mut();
        let origin = state.create_field(root, "origin").unwrap();
        state.set(origin, "x", 1.5).unwrap();
        state.set(origin, "y", 2.5).unwrap();
        state.set(root, "tick", 3u32).unwrap();
        let initial = encoder.buffer_capacity();
        let bytes = encoder.encode().to_vec();
        assert!(bytes.len() > initial);
        assert_eq!(encoder.buffer_capacity() % encoder.limits().buffer_chunk_bytes, 0);
    }
}
