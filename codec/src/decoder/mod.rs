//! Applies encoded patches to a decode-only object graph.
//!
//! A stream is a sequence of sections. Decoding starts at the root (or a
//! caller-chosen node) and each `SWITCH_TO_STRUCTURE` sentinel moves to the
//! node registered under the following reference id.
//!
//! Streams that do not match local definitions never fail a decode: an
//! unknown reference id, an unknown field index or a malformed operation is
//! logged, counted and skipped up to the next switch to a known structure.
//!
//! Besides the operations the encoder emits, arrays understand the move
//! family:
//! - `MOVE to from`: the item at `from` moves to `to`, leaving a hole.
//! - `DELETE_AND_MOVE to from`: the item at `to` is deleted first.
//! - `MOVE_AND_ADD at to value`: the item at `at` moves to `to` and `value`
//!   is added at `at`.

mod change;
mod graph;
mod refs;

use std::sync::Arc;

use bytestream::ByteReader;
use schema::{ItemType, TypeId, TypeRegistry, ValueType};
use wire::{ItemHeader, Operation, SWITCH_TO_STRUCTURE, TYPE_ID};

use crate::error::{CodecError, CodecResult, MismatchReason};
use crate::limits::CodecLimits;
use crate::snapshot::Snapshot;
use crate::types::{NodeId, NodeKind, RefId};
use crate::value::{read_primitive, Value};

pub use change::{ChangeTarget, DataChange};
pub use graph::DecodedGraph;

pub(crate) use graph::DecodedData;
use refs::ReferenceTracker;

const fn mismatch(ref_id: RefId, reason: MismatchReason) -> CodecError {
    CodecError::DefinitionMismatch { ref_id, reason }
}

/// Reconstructs an encoder's object graph from its patches.
#[derive(Debug, Clone)]
pub struct Decoder {
    graph: DecodedGraph,
    refs: ReferenceTracker,
    limits: CodecLimits,
    mismatches: u64,
}

impl Decoder {
    /// Creates a decoder whose root is an empty instance of `root_type`.
    pub fn new(registry: Arc<TypeRegistry>, root_type: &str) -> CodecResult<Self> {
        Self::with_limits(registry, root_type, CodecLimits::default())
    }

    pub fn with_limits(
        registry: Arc<TypeRegistry>,
        root_type: &str,
        limits: CodecLimits,
    ) -> CodecResult<Self> {
        let type_id = registry
            .id_of(root_type)
            .ok_or_else(|| CodecError::UnknownType {
                name: root_type.to_owned(),
            })?;
        let graph = DecodedGraph::new(registry, type_id);
        let refs = ReferenceTracker::new(graph.root());
        Ok(Self {
            graph,
            refs,
            limits,
            mismatches: 0,
        })
    }

    #[must_use]
    pub const fn root(&self) -> NodeId {
        self.graph.root()
    }

    #[must_use]
    pub const fn graph(&self) -> &DecodedGraph {
        &self.graph
    }

    #[must_use]
    pub fn registry(&self) -> &TypeRegistry {
        self.graph.registry()
    }

    /// Value of a schema field by name.
    #[must_use]
    pub fn get(&self, node: NodeId, field: &str) -> Option<&Value> {
        self.graph.get(node, field)
    }

    /// Node registered under a wire reference id.
    #[must_use]
    pub fn node(&self, ref_id: RefId) -> Option<NodeId> {
        self.refs.node(ref_id)
    }

    /// Number of slots holding the node registered under `ref_id`.
    #[must_use]
    pub fn ref_count(&self, ref_id: RefId) -> u32 {
        self.refs.count(ref_id)
    }

    /// Definition mismatches skipped since creation.
    #[must_use]
    pub const fn mismatch_count(&self) -> u64 {
        self.mismatches
    }

    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::of_graph(&self.graph, self.graph.root())
    }

    /// Applies one encoded patch and returns the effective changes in order.
    pub fn decode(&mut self, bytes: &[u8]) -> Vec<DataChange> {
        self.decode_from(bytes, self.graph.root())
    }

    /// Applies a patch whose first section targets `start`.
    pub fn decode_from(&mut self, bytes: &[u8], start: NodeId) -> Vec<DataChange> {
        let mut reader = ByteReader::new(bytes);
        let mut changes = Vec::new();
        let mut current = start;

        while let Some(byte) = reader.peek_u8() {
            let result = if byte == SWITCH_TO_STRUCTURE {
                self.end_section(current);
                self.read_switch(&mut reader).map(|node| current = node)
            } else {
                self.decode_operation(&mut reader, current, &mut changes)
            };
            if let Err(err) = result {
                let context = self.graph.ref_id(current).unwrap_or_default();
                self.report(err, context);
                if !self.skip_to_known(&mut reader) {
                    break;
                }
            }
        }
        self.end_section(current);

        let freed = self.refs.collect(&mut self.graph);
        tracing::trace!(
            bytes = bytes.len(),
            changes = changes.len(),
            freed = freed.len(),
            "decoded patch"
        );
        changes
    }

    fn report(&mut self, err: CodecError, context: RefId) {
        let err = match err {
            CodecError::DefinitionMismatch { .. } => err,
            other => mismatch(context, MismatchReason::Malformed(other.to_string())),
        };
        self.mismatches += 1;
        tracing::warn!(error = %err, "definition mismatch, skipping to the next known structure");
    }

    /// Positions the reader on the next switch to a known reference id.
    fn skip_to_known(&self, reader: &mut ByteReader<'_>) -> bool {
        let mut position = reader.position();
        while let Some(byte) = reader.byte_at(position) {
            if byte == SWITCH_TO_STRUCTURE {
                reader.seek(position + 1);
                let known = reader
                    .read_varu32()
                    .is_ok_and(|raw| self.refs.node(RefId::new(raw)).is_some());
                if known {
                    reader.seek(position);
                    return true;
                }
            }
            position += 1;
        }
        reader.seek(position);
        false
    }

    fn read_switch(&self, reader: &mut ByteReader<'_>) -> CodecResult<NodeId> {
        reader.skip(1)?;
        let ref_id = RefId::new(reader.read_varu32()?);
        self.refs
            .node(ref_id)
            .ok_or(mismatch(ref_id, MismatchReason::UnknownRef))
    }

    fn end_section(&mut self, node: NodeId) {
        if let Some(data) = self.graph.data_mut(node) {
            data.compact();
        }
    }

    fn decode_operation(
        &mut self,
        reader: &mut ByteReader<'_>,
        node: NodeId,
        changes: &mut Vec<DataChange>,
    ) -> CodecResult<()> {
        let kind = self.graph.kind(node).ok_or(CodecError::UnknownNode { node })?;
        match kind {
            NodeKind::Schema => self.decode_field(reader, node, changes),
            NodeKind::Array => self.decode_array(reader, node, changes),
            NodeKind::Map => self.decode_map(reader, node, changes),
            NodeKind::Set | NodeKind::Collection => self.decode_set(reader, node, changes),
        }
    }

    fn decode_field(
        &mut self,
        reader: &mut ByteReader<'_>,
        node: NodeId,
        changes: &mut Vec<DataChange>,
    ) -> CodecResult<()> {
        let ref_id = self.graph.ref_id(node).unwrap_or_default();
        let (op, index) = wire::split_field_op_byte(reader.read_u8()?);
        let index = usize::from(index);
        let Some(DecodedData::Schema { type_id, fields }) = self.graph.data(node) else {
            return Err(CodecError::UnknownNode { node });
        };
        let (name, ty) = self
            .graph
            .registry()
            .get(*type_id)
            .and_then(|metadata| metadata.field(index))
            .map(|field| (field.name.clone(), field.ty))
            .ok_or(mismatch(ref_id, MismatchReason::UnknownField { index }))?;
        let previous = fields.get(index).cloned().flatten();

        let value = self.decode_value(reader, ref_id, op, ty, previous.as_ref(), changes)?;
        if let Some(DecodedData::Schema { fields, .. }) = self.graph.data_mut(node) {
            if let Some(slot) = fields.get_mut(index) {
                slot.clone_from(&value);
            }
        }
        push_change(changes, node, ref_id, op, ChangeTarget::Field { index, name }, value, previous);
        Ok(())
    }

    fn decode_array(
        &mut self,
        reader: &mut ByteReader<'_>,
        node: NodeId,
        changes: &mut Vec<DataChange>,
    ) -> CodecResult<()> {
        let ref_id = self.graph.ref_id(node).unwrap_or_default();
        let Some(DecodedData::Array { item, .. }) = self.graph.data(node) else {
            return Err(CodecError::UnknownNode { node });
        };
        let item = *item;

        match wire::read_item_header(reader)? {
            ItemHeader::Pure(Operation::Clear) => {
                self.clear_collection(node, ref_id, changes);
                Ok(())
            }
            ItemHeader::Pure(Operation::Reverse) => {
                if let Some(DecodedData::Array { items, .. }) = self.graph.data_mut(node) {
                    items.retain(Option::is_some);
                    items.reverse();
                }
                Ok(())
            }
            ItemHeader::ByRefId {
                op: Operation::DeleteByRefId,
                ref_id: raw,
            } => {
                let position = self
                    .refs
                    .node(RefId::new(raw))
                    .and_then(|child| self.array_position(node, child));
                match position {
                    Some(index) => {
                        self.apply_array_slot(reader, node, ref_id, item, index, Operation::Delete, changes)
                    }
                    None => {
                        tracing::warn!(%ref_id, item = raw, "delete of an item not in the array");
                        Ok(())
                    }
                }
            }
            ItemHeader::ByRefId {
                op: Operation::AddByRefId,
                ref_id: raw,
            } => {
                let index = self
                    .refs
                    .node(RefId::new(raw))
                    .and_then(|child| self.array_position(node, child))
                    .unwrap_or_else(|| self.slot_count(node));
                self.apply_array_slot(reader, node, ref_id, item, index, Operation::Add, changes)
            }
            ItemHeader::Indexed { op, index } => {
                let index = self.check_index(ref_id, index)?;
                match op {
                    Operation::Move => {
                        let from = self.read_index(reader, ref_id)?;
                        self.move_slot(node, from, index);
                        Ok(())
                    }
                    Operation::DeleteAndMove => {
                        let from = self.read_index(reader, ref_id)?;
                        self.apply_array_slot(reader, node, ref_id, item, index, Operation::Delete, changes)?;
                        self.move_slot(node, from, index);
                        Ok(())
                    }
                    Operation::MoveAndAdd => {
                        let to = self.read_index(reader, ref_id)?;
                        self.move_slot(node, index, to);
                        self.apply_array_slot(reader, node, ref_id, item, index, Operation::Add, changes)
                    }
                    op => self.apply_array_slot(reader, node, ref_id, item, index, op, changes),
                }
            }
            ItemHeader::Pure(op) | ItemHeader::ByRefId { op, .. } => {
                Err(mismatch(ref_id, MismatchReason::UnexpectedOperation { op }))
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn apply_array_slot(
        &mut self,
        reader: &mut ByteReader<'_>,
        node: NodeId,
        ref_id: RefId,
        item: ItemType,
        index: usize,
        op: Operation,
        changes: &mut Vec<DataChange>,
    ) -> CodecResult<()> {
        let previous = match self.graph.data(node) {
            Some(DecodedData::Array { items, .. }) => items.get(index).cloned().flatten(),
            _ => None,
        };
        let value = self.decode_value(reader, ref_id, op, item.into(), previous.as_ref(), changes)?;
        if let Some(DecodedData::Array { items, .. }) = self.graph.data_mut(node) {
            if items.len() <= index {
                items.resize(index + 1, None);
            }
            items[index].clone_from(&value);
        }
        push_change(changes, node, ref_id, op, ChangeTarget::Index(index), value, previous);
        Ok(())
    }

    fn move_slot(&mut self, node: NodeId, from: usize, to: usize) {
        let Some(DecodedData::Array { items, .. }) = self.graph.data_mut(node) else {
            return;
        };
        let Some(moved) = items.get_mut(from).and_then(Option::take) else {
            tracing::warn!(%node, from, to, "move from an empty array slot");
            return;
        };
        if items.len() <= to {
            items.resize(to + 1, None);
        }
        items[to] = Some(moved);
    }

    fn array_position(&self, node: NodeId, child: NodeId) -> Option<usize> {
        match self.graph.data(node)? {
            DecodedData::Array { items, .. } => items
                .iter()
                .position(|value| value.as_ref().and_then(Value::as_node) == Some(child)),
            _ => None,
        }
    }

    fn slot_count(&self, node: NodeId) -> usize {
        match self.graph.data(node) {
            Some(DecodedData::Array { items, .. }) => items.len(),
            _ => 0,
        }
    }

    fn decode_map(
        &mut self,
        reader: &mut ByteReader<'_>,
        node: NodeId,
        changes: &mut Vec<DataChange>,
    ) -> CodecResult<()> {
        let ref_id = self.graph.ref_id(node).unwrap_or_default();
        let Some(DecodedData::Map { item, .. }) = self.graph.data(node) else {
            return Err(CodecError::UnknownNode { node });
        };
        let item = *item;

        let (op, index) = match wire::read_item_header(reader)? {
            ItemHeader::Pure(Operation::Clear) => {
                self.clear_collection(node, ref_id, changes);
                return Ok(());
            }
            ItemHeader::Indexed { op, index } => (op, self.check_index(ref_id, index)?),
            ItemHeader::Pure(op) | ItemHeader::ByRefId { op, .. } => {
                return Err(mismatch(ref_id, MismatchReason::UnexpectedOperation { op }));
            }
        };
        let key = if op.has_add() {
            reader.read_string_limited(self.limits.max_string_bytes)?
        } else {
            let known = match self.graph.data(node) {
                Some(DecodedData::Map { key_of, .. }) => key_of.get(&index).cloned(),
                _ => None,
            };
            match known {
                Some(key) => key,
                // Nothing to remove; a DELETE carries no payload to skip.
                None if op == Operation::Delete => return Ok(()),
                None => return Err(mismatch(ref_id, MismatchReason::UnknownField { index })),
            }
        };
        let previous = match self.graph.data(node) {
            Some(DecodedData::Map { entries, .. }) => entries.get(&key).cloned(),
            _ => None,
        };

        let value = self.decode_value(reader, ref_id, op, item.into(), previous.as_ref(), changes)?;
        if let Some(DecodedData::Map {
            entries, key_of, ..
        }) = self.graph.data_mut(node)
        {
            match &value {
                Some(value) => {
                    entries.insert(key.clone(), value.clone());
                    key_of.insert(index, key.clone());
                }
                None => {
                    entries.shift_remove(&key);
                    key_of.remove(&index);
                }
            }
        }
        push_change(changes, node, ref_id, op, ChangeTarget::Key(key), value, previous);
        Ok(())
    }

    fn decode_set(
        &mut self,
        reader: &mut ByteReader<'_>,
        node: NodeId,
        changes: &mut Vec<DataChange>,
    ) -> CodecResult<()> {
        let ref_id = self.graph.ref_id(node).unwrap_or_default();
        let Some(DecodedData::Set { item, .. }) = self.graph.data(node) else {
            return Err(CodecError::UnknownNode { node });
        };
        let item = *item;

        let (op, index) = match wire::read_item_header(reader)? {
            ItemHeader::Pure(Operation::Clear) => {
                self.clear_collection(node, ref_id, changes);
                return Ok(());
            }
            ItemHeader::Indexed { op, index } => (op, self.check_index(ref_id, index)?),
            ItemHeader::Pure(op) | ItemHeader::ByRefId { op, .. } => {
                return Err(mismatch(ref_id, MismatchReason::UnexpectedOperation { op }));
            }
        };
        let previous = match self.graph.data(node) {
            Some(DecodedData::Set { items, .. }) => items.get(&index).cloned(),
            _ => None,
        };
        if previous.is_none() && op == Operation::Delete {
            return Ok(());
        }

        let value = self.decode_value(reader, ref_id, op, item.into(), previous.as_ref(), changes)?;
        if let Some(DecodedData::Set { items, .. }) = self.graph.data_mut(node) {
            match &value {
                Some(value) => {
                    items.insert(index, value.clone());
                }
                None => {
                    items.shift_remove(&index);
                }
            }
        }
        push_change(changes, node, ref_id, op, ChangeTarget::Index(index), value, previous);
        Ok(())
    }

    /// Decodes the value following an operation header.
    ///
    /// Returns `None` for a pure delete. Keeps holder counts in step with the
    /// slot's previous content.
    fn decode_value(
        &mut self,
        reader: &mut ByteReader<'_>,
        owner: RefId,
        op: Operation,
        ty: ValueType,
        previous: Option<&Value>,
        changes: &mut Vec<DataChange>,
    ) -> CodecResult<Option<Value>> {
        if op.has_delete() {
            if let Some(child) = previous.and_then(Value::as_node) {
                self.release(child);
            }
            if !op.has_add() {
                return Ok(None);
            }
        }

        let (child_ref, child) = match ty {
            ValueType::Primitive(primitive) => {
                return Ok(Some(read_primitive(reader, primitive, &self.limits)?));
            }
            ValueType::Schema(declared) => {
                let child_ref = RefId::new(reader.read_varu32()?);
                let type_id = if op.has_add() {
                    self.read_type_override(reader, owner, declared)?
                } else {
                    declared
                };
                let child = match self.refs.node(child_ref) {
                    Some(child) => {
                        self.expect_schema(child_ref, child, declared)?;
                        child
                    }
                    None if op.has_add() => self.graph.insert_schema(child_ref, type_id),
                    None => return Err(mismatch(child_ref, MismatchReason::UnknownRef)),
                };
                (child_ref, child)
            }
            ValueType::Collection { kind, item } => {
                let child_ref = RefId::new(reader.read_varu32()?);
                let child = match self.refs.node(child_ref) {
                    Some(child) => {
                        self.expect_collection(child_ref, child, kind.into(), item)?;
                        child
                    }
                    None if op.has_add() => self.graph.insert_collection(child_ref, kind, item),
                    None => return Err(mismatch(child_ref, MismatchReason::UnknownRef)),
                };
                if let Some(replaced) = previous.and_then(Value::as_node).filter(|p| *p != child) {
                    self.report_replaced(replaced, changes);
                }
                (child_ref, child)
            }
        };

        let same = previous.and_then(Value::as_node) == Some(child);
        self.refs
            .add(child_ref, child, !same || op == Operation::DeleteAndAdd);
        if !same && !op.has_delete() {
            if let Some(replaced) = previous.and_then(Value::as_node) {
                self.release(replaced);
            }
        }
        Ok(Some(Value::Ref(child)))
    }

    fn read_type_override(
        &self,
        reader: &mut ByteReader<'_>,
        owner: RefId,
        declared: TypeId,
    ) -> CodecResult<TypeId> {
        if reader.peek_u8() != Some(TYPE_ID) {
            return Ok(declared);
        }
        reader.skip(1)?;
        let raw = reader.read_varu32()?;
        let registry = self.graph.registry();
        let type_id = u16::try_from(raw)
            .ok()
            .map(TypeId::new)
            .filter(|id| registry.get(*id).is_some())
            .ok_or(mismatch(owner, MismatchReason::UnknownTypeId { type_id: raw }))?;
        if !registry.is_assignable(type_id, declared) {
            let expected = registry
                .get(declared)
                .map_or_else(|| declared.to_string(), |metadata| metadata.name().to_owned());
            return Err(mismatch(owner, MismatchReason::WrongShape { expected }));
        }
        Ok(type_id)
    }

    /// A known ref reused for a structure slot must hold that type or a subtype.
    fn expect_schema(&self, ref_id: RefId, node: NodeId, declared: TypeId) -> CodecResult<()> {
        let registry = self.graph.registry();
        match self.graph.schema_type(node) {
            Some(actual) if registry.is_assignable(actual, declared) => Ok(()),
            _ => {
                let expected = registry
                    .get(declared)
                    .map_or_else(|| declared.to_string(), |metadata| metadata.name().to_owned());
                Err(mismatch(ref_id, MismatchReason::WrongShape { expected }))
            }
        }
    }

    fn expect_collection(
        &self,
        ref_id: RefId,
        node: NodeId,
        expected: NodeKind,
        item: ItemType,
    ) -> CodecResult<()> {
        let same_kind = self.graph.kind(node) == Some(expected);
        if same_kind && self.graph.collection_item(node) == Some(item) {
            return Ok(());
        }
        Err(mismatch(
            ref_id,
            MismatchReason::WrongShape {
                expected: expected.name().to_owned(),
            },
        ))
    }

    fn check_index(&self, ref_id: RefId, raw: u32) -> CodecResult<usize> {
        let index = usize::try_from(raw).unwrap_or(usize::MAX);
        let max = self.limits.max_collection_index;
        if index > max {
            return Err(mismatch(ref_id, MismatchReason::IndexLimit { index, max }));
        }
        Ok(index)
    }

    fn read_index(&self, reader: &mut ByteReader<'_>, ref_id: RefId) -> CodecResult<usize> {
        let raw = reader.read_varu32()?;
        self.check_index(ref_id, raw)
    }

    fn release(&mut self, node: NodeId) {
        if let Some(ref_id) = self.graph.ref_id(node) {
            self.refs.remove(ref_id);
        }
    }

    /// Empties a collection, releasing its children.
    fn clear_collection(&mut self, node: NodeId, ref_id: RefId, changes: &mut Vec<DataChange>) {
        let removed: Vec<(ChangeTarget, Value)> = match self.graph.data_mut(node) {
            Some(DecodedData::Array { items, .. }) => items
                .drain(..)
                .enumerate()
                .filter_map(|(index, value)| value.map(|value| (ChangeTarget::Index(index), value)))
                .collect(),
            Some(DecodedData::Map {
                entries, key_of, ..
            }) => {
                key_of.clear();
                entries
                    .drain(..)
                    .map(|(key, value)| (ChangeTarget::Key(key), value))
                    .collect()
            }
            Some(DecodedData::Set { items, .. }) => items
                .drain(..)
                .map(|(index, value)| (ChangeTarget::Index(index), value))
                .collect(),
            _ => Vec::new(),
        };
        for (target, value) in removed {
            if let Some(child) = value.as_node() {
                self.release(child);
            }
            push_change(changes, node, ref_id, Operation::Delete, target, None, Some(value));
        }
    }

    /// Reports the entries of a collection replaced by another one as
    /// deleted. Holder counts are settled by collection.
    fn report_replaced(&self, node: NodeId, changes: &mut Vec<DataChange>) {
        let Some(ref_id) = self.graph.ref_id(node) else {
            return;
        };
        let entries: Vec<(ChangeTarget, Value)> = match self.graph.data(node) {
            Some(DecodedData::Array { items, .. }) => items
                .iter()
                .enumerate()
                .filter_map(|(index, value)| {
                    value.clone().map(|value| (ChangeTarget::Index(index), value))
                })
                .collect(),
            Some(DecodedData::Map { entries, .. }) => entries
                .iter()
                .map(|(key, value)| (ChangeTarget::Key(key.clone()), value.clone()))
                .collect(),
            Some(DecodedData::Set { items, .. }) => items
                .iter()
                .map(|(index, value)| (ChangeTarget::Index(*index), value.clone()))
                .collect(),
            _ => Vec::new(),
        };
        for (target, value) in entries {
            push_change(changes, node, ref_id, Operation::Delete, target, None, Some(value));
        }
    }
}

fn push_change(
    changes: &mut Vec<DataChange>,
    node: NodeId,
    ref_id: RefId,
    op: Operation,
    target: ChangeTarget,
    value: Option<Value>,
    previous_value: Option<Value>,
) {
    if value == previous_value {
        return;
    }
    changes.push(DataChange {
        node,
        ref_id,
        op,
        target,
        value,
        previous_value,
    });
}

#[cfg(test)]
mod tests {
    use schema::{ChildType, FieldDef, FieldType, PrimitiveType, TypeDef};

    use super::*;

    fn decoder() -> Decoder {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let registry = TypeRegistry::builder()
            .register(TypeDef::new("Item").field(FieldDef::new("v", FieldType::number())))
            .register(
                TypeDef::new("Special")
                    .extends("Item")
                    .field(FieldDef::new("bonus", FieldType::number())),
            )
            .register(
                TypeDef::new("Game")
                    .field(FieldDef::new("round", FieldType::number()))
                    .field(FieldDef::new("names", FieldType::array(PrimitiveType::String)))
                    .field(FieldDef::new("items", FieldType::array(ChildType::schema("Item"))))
                    .field(FieldDef::new("scores", FieldType::map(PrimitiveType::UInt8)))
                    .field(FieldDef::new("featured", FieldType::schema("Item"))),
            )
            .build()
            .unwrap();
        Decoder::with_limits(Arc::new(registry), "Game", CodecLimits::for_testing()).unwrap()
    }

    fn names(decoder: &Decoder) -> Vec<String> {
        let names = decoder.graph().child(decoder.root(), "names").unwrap();
        decoder
            .graph()
            .array_items(names)
            .filter_map(|value| value.as_str().map(str::to_owned))
            .collect()
    }

    #[test]
    fn primitive_field() {
        let mut decoder = decoder();
        let changes = decoder.decode(&[0x80, 5]);
        assert_eq!(decoder.get(decoder.root(), "round"), Some(&Value::Int(5)));
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].field_name(), Some("round"));
        assert_eq!(changes[0].previous_value, None);
    }

    #[test]
    fn unchanged_value_is_not_reported() {
        let mut decoder = decoder();
        decoder.decode(&[0x80, 5]);
        assert!(decoder.decode(&[0x00, 5]).is_empty());
    }

    #[test]
    fn empty_patch_is_a_no_op() {
        let mut decoder = decoder();
        assert!(decoder.decode(&[]).is_empty());
        assert_eq!(decoder.mismatch_count(), 0);
    }

    #[test]
    fn move_family() {
        let mut decoder = decoder();
        decoder.decode(&[0x81, 1, 0xFF, 1, 128, 0, 1, b'a', 128, 1, 1, b'b']);
        assert_eq!(names(&decoder), ["a", "b"]);

        decoder.decode(&[0xFF, 1, 32, 2, 0]);
        assert_eq!(names(&decoder), ["b", "a"]);

        let changes = decoder.decode(&[0xFF, 1, 96, 0, 1]);
        assert_eq!(names(&decoder), ["a"]);
        assert_eq!(changes[0].op, Operation::Delete);
        assert_eq!(changes[0].previous_value, Some(Value::from("b")));

        decoder.decode(&[0xFF, 1, 160, 0, 1, 1, b'z']);
        assert_eq!(names(&decoder), ["z", "a"]);
        assert_eq!(decoder.mismatch_count(), 0);
    }

    #[test]
    fn reverse_and_clear() {
        let mut decoder = decoder();
        decoder.decode(&[0x81, 1, 0xFF, 1, 128, 0, 1, b'a', 128, 1, 1, b'b']);
        decoder.decode(&[0xFF, 1, 15]);
        assert_eq!(names(&decoder), ["b", "a"]);
        let changes = decoder.decode(&[0xFF, 1, 10]);
        assert!(names(&decoder).is_empty());
        assert_eq!(changes.len(), 2);
        assert!(changes.iter().all(|change| change.op == Operation::Delete));
    }

    #[test]
    fn unknown_ref_skips_to_known_section() {
        let mut decoder = decoder();
        decoder.decode(&[0xFF, 9, 0x80, 7, 0xFF, 0, 0x80, 3]);
        assert_eq!(decoder.mismatch_count(), 1);
        assert_eq!(decoder.get(decoder.root(), "round"), Some(&Value::Int(3)));
    }

    #[test]
    fn unknown_field_skips_to_known_section() {
        let mut decoder = decoder();
        decoder.decode(&[0x86, 1, 0xFF, 0, 0x80, 2]);
        assert_eq!(decoder.mismatch_count(), 1);
        assert_eq!(decoder.get(decoder.root(), "round"), Some(&Value::Int(2)));
    }

    #[test]
    fn truncated_stream_is_a_mismatch() {
        let mut decoder = decoder();
        assert!(decoder.decode(&[0x80]).is_empty());
        assert_eq!(decoder.mismatch_count(), 1);
    }

    #[test]
    fn index_limit_is_enforced() {
        let mut decoder = decoder();
        decoder.decode(&[0x81, 1, 0xFF, 1, 128, 0xD0, 0x0F, 1, b'x']);
        assert_eq!(decoder.mismatch_count(), 1);
        assert!(names(&decoder).is_empty());
    }

    #[test]
    fn type_override_creates_subtype() {
        let mut decoder = decoder();
        decoder.decode(&[0x84, 1, 0xD5, 1, 0xFF, 1, 0x81, 4]);
        let featured = decoder.graph().child(decoder.root(), "featured").unwrap();
        assert_eq!(decoder.graph().type_name(featured), Some("Special"));
        assert_eq!(decoder.get(featured, "bonus"), Some(&Value::Int(4)));
    }

    #[test]
    fn unknown_type_id_is_a_mismatch() {
        let mut decoder = decoder();
        decoder.decode(&[0x84, 1, 0xD5, 40]);
        assert_eq!(decoder.mismatch_count(), 1);
        assert_eq!(decoder.get(decoder.root(), "featured"), None);
    }

    #[test]
    fn shared_item_is_counted_per_slot() {
        let mut decoder = decoder();
        decoder.decode(&[0x82, 1, 0xFF, 1, 128, 0, 2, 128, 1, 2]);
        assert_eq!(decoder.ref_count(RefId::new(2)), 2);

        decoder.decode(&[0xFF, 1, 64, 0]);
        assert_eq!(decoder.ref_count(RefId::new(2)), 1);
        assert!(decoder.node(RefId::new(2)).is_some());

        decoder.decode(&[0xFF, 1, 10]);
        assert_eq!(decoder.node(RefId::new(2)), None);
    }

    #[test]
    fn map_add_and_delete() {
        let mut decoder = decoder();
        decoder.decode(&[0x83, 1, 0xFF, 1, 128, 0, 1, b'k', 9]);
        let scores = decoder.graph().child(decoder.root(), "scores").unwrap();
        assert_eq!(decoder.graph().map_get(scores, "k"), Some(&Value::UInt(9)));

        let changes = decoder.decode(&[0xFF, 1, 64, 0]);
        assert_eq!(decoder.graph().len(scores), Some(0));
        assert_eq!(changes[0].target, ChangeTarget::Key("k".to_owned()));
    }

    #[test]
    fn replaced_collection_reports_old_entries() {
        let mut decoder = decoder();
        decoder.decode(&[0x81, 1, 0xFF, 1, 128, 0, 1, b'a']);
        let old = decoder.node(RefId::new(1)).unwrap();

        let changes = decoder.decode(&[0x81, 3]);
        assert!(changes
            .iter()
            .any(|change| change.node == old && change.target == ChangeTarget::Index(0)));
        assert_eq!(decoder.node(RefId::new(1)), None);
        assert!(names(&decoder).is_empty());
    }

    #[test]
    fn add_by_ref_id_reuses_slot() {
        let mut decoder = decoder();
        decoder.decode(&[0x82, 1, 0xFF, 1, 129, 2, 2, 129, 3, 3]);
        let items = decoder.graph().child(decoder.root(), "items").unwrap();
        assert_eq!(decoder.graph().len(items), Some(2));

        decoder.decode(&[0xFF, 1, 129, 2, 2]);
        assert_eq!(decoder.graph().len(items), Some(2));
        assert_eq!(decoder.ref_count(RefId::new(2)), 1);

        decoder.decode(&[0xFF, 1, 33, 2]);
        assert_eq!(decoder.graph().len(items), Some(1));
        assert_eq!(decoder.node(RefId::new(2)), None);
    }
}
