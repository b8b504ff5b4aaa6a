//! The encode-side object graph.
//!
//! [`State`] owns every structural node in an arena. Nodes become part of the
//! replicated graph when they are reachable from the root; attachment assigns
//! reference ids, counts references and keeps the root's pending-node queues
//! in parent-first order.

use std::collections::HashSet;
use std::sync::Arc;

use schema::{ChildType, CollectionKind, ItemType, Metadata, TypeRegistry, ValueType};
use wire::Operation;

use crate::arena::Arena;
use crate::change_set::ChangeSetName;
use crate::change_tree::ChangeTree;
use crate::error::{CodecError, CodecResult, ValueReason};
use crate::node::{Node, NodeData};
use crate::root::Root;
use crate::types::{NodeId, NodeKind, RefId};
use crate::value::{normalize, Value};

/// A replicated object graph with change tracking.
#[derive(Debug)]
pub struct State {
    pub(crate) registry: Arc<TypeRegistry>,
    pub(crate) nodes: Arena<Node>,
    pub(crate) root: Root,
    pub(crate) root_node: NodeId,
}

impl State {
    /// Creates a state whose root is a fresh instance of `root_type`.
    pub fn new(registry: Arc<TypeRegistry>, root_type: &str) -> CodecResult<Self> {
        let node = schema_node(&registry, root_type)?;
        let mut nodes = Arena::new();
        let root_node = nodes.insert(node);
        let mut state = Self {
            registry,
            nodes,
            root: Root::new(),
            root_node,
        };
        state.attach(root_node, None);
        Ok(state)
    }

    #[must_use]
    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Returns a shared handle to the registry.
    #[must_use]
    pub fn shared_registry(&self) -> Arc<TypeRegistry> {
        Arc::clone(&self.registry)
    }

    /// Returns the top-level node.
    #[must_use]
    pub const fn root(&self) -> NodeId {
        self.root_node
    }

    /// Number of nodes in the arena, attached or not.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Creates a detached instance of a schema type.
    pub fn create(&mut self, type_name: &str) -> CodecResult<NodeId> {
        let node = schema_node(&self.registry, type_name)?;
        Ok(self.nodes.insert(node))
    }

    /// Creates a detached, empty array.
    pub fn create_array(&mut self, item: impl Into<ChildType>) -> CodecResult<NodeId> {
        self.create_collection_node(CollectionKind::Array, item.into())
    }

    /// Creates a detached, empty map.
    pub fn create_map(&mut self, item: impl Into<ChildType>) -> CodecResult<NodeId> {
        self.create_collection_node(CollectionKind::Map, item.into())
    }

    /// Creates a detached, empty set.
    pub fn create_set(&mut self, item: impl Into<ChildType>) -> CodecResult<NodeId> {
        self.create_collection_node(CollectionKind::Set, item.into())
    }

    /// Creates a detached, empty ordered collection.
    pub fn create_collection(&mut self, item: impl Into<ChildType>) -> CodecResult<NodeId> {
        self.create_collection_node(CollectionKind::Collection, item.into())
    }

    /// Creates an empty node matching the declared type of `field` and
    /// assigns it.
    pub fn create_field(&mut self, node: NodeId, field: &str) -> CodecResult<NodeId> {
        let index = self.field_index(node, field)?;
        let ty = self.field_type(node, index)?;
        let child = match ty {
            ValueType::Schema(id) => {
                let metadata = self.registry.get(id).ok_or_else(|| CodecError::UnknownType {
                    name: id.to_string(),
                })?;
                self.nodes.insert(schema_node_for(metadata))
            }
            ValueType::Collection { kind, item } => self.nodes.insert(collection_node(kind, item)),
            ValueType::Primitive(primitive) => {
                return Err(CodecError::InvalidValue {
                    target: self.field_target(node, index),
                    reason: ValueReason::StructureMismatch {
                        expected: primitive.name().to_owned(),
                        found: "structure".to_owned(),
                    },
                })
            }
        };
        self.assign_field(node, index, Some(Value::Ref(child)))?;
        Ok(child)
    }

    /// Assigns a field by name.
    pub fn set(&mut self, node: NodeId, field: &str, value: impl Into<Value>) -> CodecResult<()> {
        let index = self.field_index(node, field)?;
        self.assign_field(node, index, Some(value.into()))?;
        Ok(())
    }

    /// Clears a field by name, returning the previous value.
    pub fn unset(&mut self, node: NodeId, field: &str) -> CodecResult<Option<Value>> {
        let index = self.field_index(node, field)?;
        self.assign_field(node, index, None)
    }

    /// Reads a field by name.
    #[must_use]
    pub fn get(&self, node: NodeId, field: &str) -> Option<&Value> {
        let index = self.field_index(node, field).ok()?;
        self.nodes.get(node)?.data.value_at(index)
    }

    /// Reads a structural field by name.
    #[must_use]
    pub fn child(&self, node: NodeId, field: &str) -> Option<NodeId> {
        self.get(node, field).and_then(Value::as_node)
    }

    #[must_use]
    pub fn kind(&self, node: NodeId) -> Option<NodeKind> {
        self.nodes.get(node).map(|n| n.data.kind())
    }

    /// Type name of a schema instance.
    #[must_use]
    pub fn type_name(&self, node: NodeId) -> Option<&str> {
        match &self.nodes.get(node)?.data {
            NodeData::Schema(data) => self.registry.get(data.type_id).map(Metadata::name),
            _ => None,
        }
    }

    /// Reference id, once the node has been attached.
    #[must_use]
    pub fn ref_id(&self, node: NodeId) -> Option<RefId> {
        self.nodes.get(node)?.tree.ref_id
    }

    #[must_use]
    pub fn is_attached(&self, node: NodeId) -> bool {
        self.nodes.get(node).is_some_and(|n| n.tree.attached)
    }

    /// Number of live entries: set fields, array slots, map entries or items.
    #[must_use]
    pub fn len(&self, node: NodeId) -> Option<usize> {
        self.nodes.get(node).map(|n| n.data.len())
    }

    #[must_use]
    pub fn array_items(&self, node: NodeId) -> Option<&[Value]> {
        match &self.nodes.get(node)?.data {
            NodeData::Array(data) => Some(&data.items),
            _ => None,
        }
    }

    #[must_use]
    pub fn map_get(&self, node: NodeId, key: &str) -> Option<&Value> {
        match &self.nodes.get(node)?.data {
            NodeData::Map(data) => data.entries.get(key),
            _ => None,
        }
    }

    /// Map entries in insertion order.
    pub fn map_entries(&self, node: NodeId) -> impl Iterator<Item = (&str, &Value)> {
        let entries = match self.nodes.get(node).map(|n| &n.data) {
            Some(NodeData::Map(data)) => Some(&data.entries),
            _ => None,
        };
        entries
            .into_iter()
            .flatten()
            .map(|(key, value)| (key.as_str(), value))
    }

    /// Set or collection items in insertion order.
    pub fn set_items(&self, node: NodeId) -> impl Iterator<Item = &Value> {
        let items = match self.nodes.get(node).map(|n| &n.data) {
            Some(NodeData::Set(data)) => Some(&data.items),
            _ => None,
        };
        items.into_iter().flat_map(indexmap::IndexMap::values)
    }

    /// Frees a node that is neither attached nor held by another node.
    ///
    /// Children left without any holder are freed as well.
    pub fn dispose(&mut self, node: NodeId) -> CodecResult<()> {
        let n = self.node(node)?;
        if node == self.root_node || n.tree.attached || !n.tree.parents().is_empty() {
            return Err(CodecError::NodeInUse { node });
        }
        let children = n.data.children();
        if let Some(removed) = self.nodes.remove(node) {
            if let Some(ref_id) = removed.tree.ref_id {
                self.root.forget(ref_id);
            }
        }
        for (child, index) in children {
            let orphaned = self.nodes.get_mut(child).is_some_and(|c| {
                c.tree.remove_parent(node, index);
                !c.tree.attached && c.tree.parents().is_empty()
            });
            if orphaned {
                self.dispose(child)?;
            }
        }
        Ok(())
    }

    pub(crate) fn node(&self, node: NodeId) -> CodecResult<&Node> {
        self.nodes.get(node).ok_or(CodecError::UnknownNode { node })
    }

    pub(crate) fn node_mut(&mut self, node: NodeId) -> CodecResult<&mut Node> {
        self.nodes.get_mut(node).ok_or(CodecError::UnknownNode { node })
    }

    /// Checks that `node` has the expected shape.
    pub(crate) fn expect_kind(&self, node: NodeId, expected: NodeKind) -> CodecResult<()> {
        let found = self.node(node)?.data.kind();
        if found == expected {
            Ok(())
        } else {
            Err(CodecError::NodeKindMismatch {
                node,
                expected,
                found,
            })
        }
    }

    fn create_collection_node(&mut self, kind: CollectionKind, item: ChildType) -> CodecResult<NodeId> {
        let item = match item {
            ChildType::Primitive(primitive) => ItemType::Primitive(primitive),
            ChildType::Schema(name) => ItemType::Schema(
                self.registry
                    .id_of(&name)
                    .ok_or(CodecError::UnknownType { name })?,
            ),
        };
        Ok(self.nodes.insert(collection_node(kind, item)))
    }

    fn schema_metadata(&self, node: NodeId) -> CodecResult<&Metadata> {
        match &self.node(node)?.data {
            NodeData::Schema(data) => self.registry.get(data.type_id).ok_or_else(|| {
                CodecError::UnknownType {
                    name: data.type_id.to_string(),
                }
            }),
            other => Err(CodecError::NodeKindMismatch {
                node,
                expected: NodeKind::Schema,
                found: other.kind(),
            }),
        }
    }

    fn field_index(&self, node: NodeId, field: &str) -> CodecResult<usize> {
        let metadata = self.schema_metadata(node)?;
        metadata
            .field_index(field)
            .ok_or_else(|| CodecError::UnknownField {
                type_name: metadata.name().to_owned(),
                field: field.to_owned(),
            })
    }

    fn field_type(&self, node: NodeId, index: usize) -> CodecResult<ValueType> {
        let metadata = self.schema_metadata(node)?;
        metadata
            .field(index)
            .map(|field| field.ty)
            .ok_or_else(|| CodecError::UnknownField {
                type_name: metadata.name().to_owned(),
                field: index.to_string(),
            })
    }

    fn field_target(&self, node: NodeId, index: usize) -> String {
        self.schema_metadata(node)
            .ok()
            .and_then(|metadata| {
                metadata
                    .field(index)
                    .map(|field| format!("{}.{}", metadata.name(), field.name))
            })
            .unwrap_or_else(|| format!("{node}.{index}"))
    }

    /// Assigns or clears a schema field and records the change.
    pub(crate) fn assign_field(
        &mut self,
        node: NodeId,
        index: usize,
        value: Option<Value>,
    ) -> CodecResult<Option<Value>> {
        let (ty, tagged) = {
            let metadata = self.schema_metadata(node)?;
            let field = metadata.field(index).ok_or_else(|| CodecError::UnknownField {
                type_name: metadata.name().to_owned(),
                field: index.to_string(),
            })?;
            (field.ty, field.tag.is_some())
        };
        let target = || self.field_target(node, index);
        let value = match value {
            Some(value) => Some(self.check_value(node, ty, value, &target)?),
            None => None,
        };

        let NodeData::Schema(data) = &mut self.node_mut(node)?.data else {
            return Err(CodecError::UnknownNode { node });
        };
        let Some(slot) = data.fields.get_mut(index) else {
            return Err(CodecError::IndexOutOfBounds {
                index,
                len: data.fields.len(),
            });
        };
        let previous = slot.clone();
        if previous == value {
            return Ok(previous);
        }
        slot.clone_from(&value);

        match &value {
            None => self.record_delete(node, index, tagged),
            Some(value) => {
                let op = if matches!(previous, Some(Value::Ref(_))) {
                    Operation::DeleteAndAdd
                } else {
                    Operation::Add
                };
                self.record_change(node, index, op, tagged);
                if let Value::Ref(child) = value {
                    self.adopt_child(*child, node, index);
                }
            }
        }
        if let Some(Value::Ref(previous_child)) = &previous {
            self.release_child(*previous_child, node, index);
        }
        Ok(previous)
    }

    /// Validates and normalizes a value for a slot of type `expected`.
    pub(crate) fn check_value(
        &self,
        owner: NodeId,
        expected: ValueType,
        value: Value,
        target: &dyn Fn() -> String,
    ) -> CodecResult<Value> {
        let mismatch = |found: String| CodecError::InvalidValue {
            target: target(),
            reason: ValueReason::StructureMismatch {
                expected: self.describe_type(expected),
                found,
            },
        };
        match expected {
            ValueType::Primitive(primitive) => {
                normalize(primitive, value, target).map_err(|reason| CodecError::InvalidValue {
                    target: target(),
                    reason,
                })
            }
            ValueType::Schema(_) | ValueType::Collection { .. } => {
                let child = match value {
                    Value::Ref(child) => child,
                    other => return Err(mismatch(other.kind_name().to_owned())),
                };
                if child == owner {
                    return Err(CodecError::InvalidValue {
                        target: target(),
                        reason: ValueReason::SelfReference,
                    });
                }
                let data = &self.node(child)?.data;
                let accepted = match (expected, data) {
                    (ValueType::Schema(declared), NodeData::Schema(actual)) => {
                        self.registry.is_assignable(actual.type_id, declared)
                    }
                    (ValueType::Collection { kind, item }, data) => {
                        data.kind() == NodeKind::from(kind) && data.item() == Some(item)
                    }
                    _ => false,
                };
                if accepted {
                    Ok(Value::Ref(child))
                } else {
                    Err(mismatch(self.describe_node(child)))
                }
            }
        }
    }

    pub(crate) fn describe_type(&self, ty: ValueType) -> String {
        match ty {
            ValueType::Primitive(primitive) => primitive.name().to_owned(),
            ValueType::Schema(id) => self.describe_item(ItemType::Schema(id)),
            ValueType::Collection { kind, item } => {
                format!("{}<{}>", kind.name(), self.describe_item(item))
            }
        }
    }

    fn describe_item(&self, item: ItemType) -> String {
        match item {
            ItemType::Primitive(primitive) => primitive.name().to_owned(),
            ItemType::Schema(id) => self
                .registry
                .get(id)
                .map_or_else(|| id.to_string(), |metadata| metadata.name().to_owned()),
        }
    }

    pub(crate) fn describe_node(&self, node: NodeId) -> String {
        match self.nodes.get(node).map(|n| &n.data) {
            Some(NodeData::Schema(data)) => self.describe_item(ItemType::Schema(data.type_id)),
            Some(data) => match data.item() {
                Some(item) => format!("{}<{}>", data.kind(), self.describe_item(item)),
                None => data.kind().to_string(),
            },
            None => "unknown node".to_owned(),
        }
    }

    pub(crate) fn record_change(&mut self, node: NodeId, index: usize, op: Operation, tagged: bool) {
        let Some(n) = self.nodes.get_mut(node) else {
            tracing::warn!(%node, index, "change recorded on unknown node");
            return;
        };
        let pending = n.tree.change(index, op, tagged);
        if n.tree.attached {
            self.root.enqueue(pending, node);
        }
    }

    pub(crate) fn record_delete(&mut self, node: NodeId, index: usize, tagged: bool) {
        let Some(n) = self.nodes.get_mut(node) else {
            tracing::warn!(%node, index, "delete recorded on unknown node");
            return;
        };
        let pending = n.tree.delete(index, tagged);
        if n.tree.attached {
            self.root.enqueue(pending, node);
        }
    }

    /// Drops a slot added since the last encode instead of sending its
    /// ADD followed by a DELETE.
    pub(crate) fn retract_change(&mut self, node: NodeId, index: usize) {
        if let Some(n) = self.nodes.get_mut(node) {
            n.tree.retract(index);
        }
    }

    pub(crate) fn record_operation(&mut self, node: NodeId, op: Operation) {
        let Some(n) = self.nodes.get_mut(node) else {
            tracing::warn!(%node, %op, "operation recorded on unknown node");
            return;
        };
        let pending = n.tree.operation(op);
        if n.tree.attached {
            self.root.enqueue(pending, node);
        }
    }

    /// Links `child` under `parent` at `index` and counts the reference.
    pub(crate) fn adopt_child(&mut self, child: NodeId, parent: NodeId, index: usize) {
        if let Some(c) = self.nodes.get_mut(child) {
            c.tree.add_parent(parent, index);
        }
        self.attach_child(child, parent, index);
    }

    /// Unlinks `child` from `parent` at `index` and releases the reference.
    pub(crate) fn release_child(&mut self, child: NodeId, parent: NodeId, index: usize) {
        if let Some(c) = self.nodes.get_mut(child) {
            c.tree.remove_parent(parent, index);
        }
        self.detach_child(child, parent);
    }

    pub(crate) fn attach_child(&mut self, child: NodeId, parent: NodeId, index: usize) {
        if self.is_attached(parent) {
            self.attach(child, Some((parent, index)));
        }
    }

    pub(crate) fn detach_child(&mut self, child: NodeId, parent: NodeId) {
        if self.is_attached(parent) {
            self.detach(child);
        }
    }

    /// Counts one more reference to `node`; the first one attaches its subtree.
    fn attach(&mut self, node: NodeId, parent: Option<(NodeId, usize)>) {
        let Some(n) = self.nodes.get_mut(node) else {
            tracing::warn!(%node, "attach of unknown node");
            return;
        };
        let ref_id = match n.tree.ref_id {
            Some(ref_id) => ref_id,
            None => {
                let ref_id = self.root.allocate();
                n.tree.ref_id = Some(ref_id);
                ref_id
            }
        };
        let registration = self.root.add(ref_id, node);
        if !registration.is_new {
            if let Some((parent, _)) = parent {
                self.move_after_parent(node, parent, &mut HashSet::new());
            }
            return;
        }
        if registration.reattached {
            n.tree.requeue_all_as_add();
        }
        n.tree.attached = true;
        tracing::debug!(%node, %ref_id, "node attached");

        if let Some((parent, index)) = parent {
            self.resolve_filtering(node, parent, index);
        }
        self.enqueue_attached(node);

        let children = self
            .nodes
            .get(node)
            .map(|n| n.data.children())
            .unwrap_or_default();
        for (child, index) in children {
            if let Some(c) = self.nodes.get_mut(child) {
                c.tree.add_parent(node, index);
            }
            self.attach(child, Some((node, index)));
        }
    }

    /// Releases one reference to `node`; the last one detaches its subtree.
    fn detach(&mut self, node: NodeId) {
        let Some(n) = self.nodes.get_mut(node) else {
            return;
        };
        let Some(ref_id) = n.tree.ref_id else {
            tracing::warn!(%node, "remove of a node without a reference id");
            return;
        };
        match self.root.remove(ref_id) {
            None => {
                tracing::warn!(%node, %ref_id, "remove of a node without a registered refcount");
            }
            Some(0) => {
                n.tree.attached = false;
                tracing::debug!(%node, %ref_id, "node detached");
                let children = n.data.children();
                for (child, _) in children {
                    self.detach(child);
                }
            }
            Some(_) => {}
        }
    }

    fn move_after_parent(&mut self, node: NodeId, parent: NodeId, visited: &mut HashSet<NodeId>) {
        if !visited.insert(node) || !self.root.move_after(node, parent) {
            return;
        }
        let children = self
            .nodes
            .get(node)
            .map(|n| n.data.children())
            .unwrap_or_default();
        for (child, _) in children {
            self.move_after_parent(child, node, visited);
        }
    }

    /// A node is filtered under a filtered parent or in a tagged slot.
    fn resolve_filtering(&mut self, node: NodeId, parent: NodeId, index: usize) {
        if !self.registry.has_filters() {
            return;
        }
        let Some(p) = self.nodes.get(parent) else {
            return;
        };
        let slot_tagged = match &p.data {
            NodeData::Schema(data) => self
                .registry
                .get(data.type_id)
                .and_then(|metadata| metadata.field(index))
                .is_some_and(|field| field.tag.is_some()),
            _ => false,
        };
        let filtered = p.tree.is_filtered || slot_tagged;
        if let Some(n) = self.nodes.get_mut(node) {
            if filtered && !n.tree.is_filtered {
                n.tree.mark_filtered();
            }
        }
    }

    fn enqueue_attached(&mut self, node: NodeId) {
        let Some(n) = self.nodes.get(node) else {
            return;
        };
        let tree = &n.tree;
        let mut names = Vec::with_capacity(4);
        if tree.has_filtered_sets() {
            if tree
                .set(ChangeSetName::FilteredChanges)
                .is_some_and(|set| !set.is_empty())
            {
                names.push(ChangeSetName::FilteredChanges);
            }
            names.push(ChangeSetName::AllFilteredChanges);
        }
        if !tree.is_filtered {
            if tree.set(ChangeSetName::Changes).is_some_and(|set| !set.is_empty()) {
                names.push(ChangeSetName::Changes);
            }
            names.push(ChangeSetName::AllChanges);
        }
        for name in names {
            self.root.enqueue(name, node);
        }
    }

    /// Flushes a pending queue after it has been encoded.
    pub(crate) fn flush_queue(&mut self, name: ChangeSetName) {
        let queued: Vec<NodeId> = self.root.queue(name).iter().copied().collect();
        for node in queued {
            if let Some(n) = self.nodes.get_mut(node) {
                n.tree.end_encode(name);
                n.data.on_encode_end();
            }
        }
        self.root.clear_queue(name);
    }
}

fn schema_node(registry: &TypeRegistry, type_name: &str) -> CodecResult<Node> {
    registry
        .by_name(type_name)
        .map(schema_node_for)
        .ok_or_else(|| CodecError::UnknownType {
            name: type_name.to_owned(),
        })
}

fn schema_node_for(metadata: &Metadata) -> Node {
    Node {
        data: NodeData::schema(metadata.id(), metadata.len()),
        tree: ChangeTree::new(metadata.has_view_fields()),
    }
}

fn collection_node(kind: CollectionKind, item: ItemType) -> Node {
    let data = match kind {
        CollectionKind::Array => NodeData::array(item),
        CollectionKind::Map => NodeData::map(item),
        CollectionKind::Set => NodeData::set(item, true),
        CollectionKind::Collection => NodeData::set(item, false),
    };
    Node {
        data,
        tree: ChangeTree::new(false),
    }
}
