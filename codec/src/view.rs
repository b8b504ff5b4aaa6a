//! Per-client visibility over filtered nodes and tagged fields.

use std::collections::{BTreeSet, HashMap, HashSet};

use indexmap::IndexMap;
use schema::{Metadata, ViewTag};
use wire::Operation;

use crate::change_set::ChangeSetName;
use crate::error::{CodecError, CodecResult};
use crate::node::NodeData;
use crate::state::State;
use crate::types::NodeId;

/// A visibility operation queued for one viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ViewChange {
    pub(crate) op: Operation,
    /// Child at the slot, for collections addressed by ref id.
    pub(crate) child: Option<NodeId>,
}

/// The set of filtered nodes and tags one client may see.
///
/// A node is visible when it was added, or when it is filtered only because
/// its parent is and sits in an untagged field of a visible parent. Adding a
/// node also makes its parent chain visible and its children (restricted to
/// fields carrying the same tag). Adding or removing queues the operations
/// the client needs to catch up; they are sent by the next view encode.
#[derive(Debug, Clone, Default)]
pub struct View {
    visible: HashSet<NodeId>,
    tags: HashMap<NodeId, BTreeSet<ViewTag>>,
    pub(crate) changes: IndexMap<NodeId, IndexMap<usize, ViewChange>>,
}

impl View {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `node` visible with the default tag.
    pub fn add(&mut self, state: &State, node: NodeId) -> CodecResult<()> {
        self.add_with_tag(state, node, ViewTag::DEFAULT)
    }

    /// Makes `node` visible and grants `tag` on it.
    pub fn add_with_tag(&mut self, state: &State, node: NodeId, tag: ViewTag) -> CodecResult<()> {
        if !state.node(node)?.tree.attached {
            return Err(CodecError::DetachedNode { node });
        }
        self.add_node(state, node, tag, true, &mut HashSet::new());
        Ok(())
    }

    /// Hides `node` (default tag) and queues deletes for what the client
    /// loses.
    pub fn remove(&mut self, state: &State, node: NodeId) -> CodecResult<()> {
        self.remove_with_tag(state, node, ViewTag::DEFAULT)
    }

    /// Revokes `tag` on `node`; the default tag hides the node itself.
    pub fn remove_with_tag(&mut self, state: &State, node: NodeId, tag: ViewTag) -> CodecResult<()> {
        let n = state.node(node)?;
        self.visible.remove(&node);
        let metadata = schema_metadata(state, node);

        if tag == ViewTag::DEFAULT {
            let collection_parent = n.tree.parent().filter(|link| {
                n.tree.is_filtered
                    && state
                        .nodes
                        .get(link.parent)
                        .is_some_and(|p| !matches!(p.data, NodeData::Schema(_)))
            });
            if let Some(link) = collection_parent {
                self.queue(link.parent, link.index, Operation::Delete, Some(node));
                self.forget_children(state, node, &mut HashSet::new());
            } else if let Some(metadata) = metadata {
                for &index in metadata.view_field_indexes() {
                    self.queue(node, index, Operation::Delete, None);
                    self.forget_field(state, node, index);
                }
            }
        } else if let Some(metadata) = metadata {
            for &index in metadata.field_indexes_for_tag(tag) {
                self.queue(node, index, Operation::Delete, None);
                self.forget_field(state, node, index);
            }
        }

        if let Some(tags) = self.tags.get_mut(&node) {
            tags.remove(&tag);
            if tags.is_empty() {
                self.tags.remove(&node);
            }
        }
        Ok(())
    }

    /// Returns `true` if `node` was added to this view.
    #[must_use]
    pub fn has(&self, node: NodeId) -> bool {
        self.visible.contains(&node)
    }

    #[must_use]
    pub fn has_tag(&self, node: NodeId, tag: ViewTag) -> bool {
        self.tags.get(&node).is_some_and(|tags| tags.contains(&tag))
    }

    /// Returns `true` if the client sees `node`'s content.
    #[must_use]
    pub fn is_visible(&self, state: &State, node: NodeId) -> bool {
        let filtered = state.nodes.get(node).is_some_and(|n| n.tree.is_filtered);
        !filtered || self.sees(state, node)
    }

    /// Returns `true` if visibility operations are queued.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.changes.values().any(|entries| !entries.is_empty())
    }

    /// Drops queued visibility operations.
    pub fn clear_pending(&mut self) {
        self.changes.clear();
    }

    /// Visible through an explicit add or through an untagged slot of a
    /// visible filtered parent.
    pub(crate) fn sees(&self, state: &State, node: NodeId) -> bool {
        let mut current = node;
        for _ in 0..=state.nodes.len() {
            if self.visible.contains(&current) {
                return true;
            }
            let Some(n) = state.nodes.get(current) else {
                return false;
            };
            let Some(link) = n.tree.parent() else {
                return false;
            };
            let shared_slot = n.tree.is_filtered
                && schema_metadata(state, link.parent)
                    .and_then(|metadata| metadata.field(link.index))
                    .is_some_and(|field| field.tag.is_none());
            if !shared_slot {
                return false;
            }
            current = link.parent;
        }
        false
    }

    fn queue(&mut self, node: NodeId, index: usize, op: Operation, child: Option<NodeId>) {
        self.changes
            .entry(node)
            .or_default()
            .insert(index, ViewChange { op, child });
    }

    fn add_node(
        &mut self,
        state: &State,
        node: NodeId,
        tag: ViewTag,
        check_parent: bool,
        visited: &mut HashSet<NodeId>,
    ) -> bool {
        let Some(n) = state.nodes.get(node) else {
            return false;
        };
        if !visited.insert(node) {
            return false;
        }
        let newly_visible = self.visible.insert(node);

        if check_parent {
            self.add_parent_of(state, node, tag, &mut HashSet::new());
        }

        let metadata = schema_metadata(state, node);
        let mut child_added = false;
        for (child, index) in n.data.children() {
            let field_tag = metadata
                .and_then(|metadata| metadata.field(index))
                .and_then(|field| field.tag);
            if field_tag.is_some_and(|field_tag| field_tag != tag) {
                continue;
            }
            if self.add_node(state, child, tag, false, visited) {
                child_added = true;
            }
        }

        if tag != ViewTag::DEFAULT {
            self.tags.entry(node).or_default().insert(tag);
            if let Some(metadata) = metadata {
                for &index in metadata.field_indexes_for_tag(tag) {
                    if n.tree.indexed_op(index) != Some(Operation::Delete)
                        && n.data.value_at(index).is_some()
                    {
                        let child = n.data.value_at(index).and_then(crate::value::Value::as_node);
                        self.queue(node, index, Operation::Add, child);
                    }
                }
            }
        } else if (!n.tree.is_new || child_added) && n.tree.has_filtered_sets() {
            let replay: Vec<usize> = n
                .tree
                .set(ChangeSetName::AllFilteredChanges)
                .map(|set| set.indexes().collect())
                .unwrap_or_default();
            for index in replay {
                let field_tag = metadata
                    .and_then(|metadata| metadata.field(index))
                    .and_then(|field| field.tag);
                let allowed = match field_tag {
                    None | Some(ViewTag::DEFAULT) => true,
                    Some(other) => self.has_tag(node, other),
                };
                if allowed && n.tree.indexed_op(index) != Some(Operation::Delete) {
                    let child = n.data.value_at(index).and_then(crate::value::Value::as_node);
                    self.queue(node, index, Operation::Add, child);
                }
            }
        }
        newly_visible || child_added
    }

    /// Makes the parent chain of `child` visible and queues the slots that
    /// reference it.
    fn add_parent_of(
        &mut self,
        state: &State,
        child: NodeId,
        tag: ViewTag,
        visited: &mut HashSet<NodeId>,
    ) {
        let Some(link) = state.nodes.get(child).and_then(|c| c.tree.parent()) else {
            return;
        };
        let Some(parent) = state.nodes.get(link.parent) else {
            return;
        };
        if !parent.tree.has_filtered_sets() || !visited.insert(link.parent) {
            return;
        }
        if self.visible.insert(link.parent) {
            self.add_parent_of(state, link.parent, tag, visited);
        }
        if parent.tree.indexed_op(link.index) != Some(Operation::Delete) {
            self.queue(link.parent, link.index, Operation::Add, Some(child));
            if tag != ViewTag::DEFAULT {
                self.tags.entry(link.parent).or_default().insert(tag);
            }
        }
    }

    fn forget_field(&mut self, state: &State, node: NodeId, index: usize) {
        let child = state
            .nodes
            .get(node)
            .and_then(|n| n.data.value_at(index))
            .and_then(crate::value::Value::as_node);
        if let Some(child) = child {
            self.visible.remove(&child);
            self.forget_children(state, child, &mut HashSet::new());
        }
    }

    fn forget_children(&mut self, state: &State, node: NodeId, visited: &mut HashSet<NodeId>) {
        if !visited.insert(node) {
            return;
        }
        let Some(n) = state.nodes.get(node) else {
            return;
        };
        for (child, _) in n.data.children() {
            self.visible.remove(&child);
            self.forget_children(state, child, visited);
        }
    }
}

fn schema_metadata(state: &State, node: NodeId) -> Option<&Metadata> {
    match &state.nodes.get(node)?.data {
        NodeData::Schema(data) => state.registry.get(data.type_id),
        _ => None,
    }
}
