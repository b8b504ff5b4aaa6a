//! Per-node change tracking.

use std::collections::HashMap;

use wire::Operation;

use crate::change_set::{ChangeSet, ChangeSetName};
use crate::types::{NodeId, RefId};

/// A `(parent, slot)` link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct ParentLink {
    pub(crate) parent: NodeId,
    pub(crate) index: usize,
}

#[derive(Debug, Clone, Default)]
struct FilteredSets {
    changes: ChangeSet,
    all_changes: ChangeSet,
}

/// Pending and cumulative operations of one structural node.
#[derive(Debug, Clone)]
pub(crate) struct ChangeTree {
    pub(crate) ref_id: Option<RefId>,
    pub(crate) attached: bool,
    pub(crate) is_new: bool,
    pub(crate) is_filtered: bool,
    parents: Vec<ParentLink>,
    indexed: HashMap<usize, Operation>,
    changes: ChangeSet,
    all_changes: ChangeSet,
    filtered: Option<FilteredSets>,
}

impl ChangeTree {
    /// Nodes whose type declares tagged fields carry filtered sets up front.
    pub(crate) fn new(has_view_fields: bool) -> Self {
        Self {
            ref_id: None,
            attached: false,
            is_new: true,
            is_filtered: false,
            parents: Vec::new(),
            indexed: HashMap::new(),
            changes: ChangeSet::new(),
            all_changes: ChangeSet::new(),
            filtered: has_view_fields.then(FilteredSets::default),
        }
    }

    pub(crate) const fn has_filtered_sets(&self) -> bool {
        self.filtered.is_some()
    }

    pub(crate) fn set(&self, name: ChangeSetName) -> Option<&ChangeSet> {
        match name {
            ChangeSetName::Changes => Some(&self.changes),
            ChangeSetName::AllChanges => Some(&self.all_changes),
            ChangeSetName::FilteredChanges => self.filtered.as_ref().map(|sets| &sets.changes),
            ChangeSetName::AllFilteredChanges => {
                self.filtered.as_ref().map(|sets| &sets.all_changes)
            }
        }
    }

    fn set_mut(&mut self, name: ChangeSetName) -> &mut ChangeSet {
        match name {
            ChangeSetName::Changes => &mut self.changes,
            ChangeSetName::AllChanges => &mut self.all_changes,
            ChangeSetName::FilteredChanges => {
                &mut self.filtered.get_or_insert_with(FilteredSets::default).changes
            }
            ChangeSetName::AllFilteredChanges => {
                &mut self
                    .filtered
                    .get_or_insert_with(FilteredSets::default)
                    .all_changes
            }
        }
    }

    /// Returns the (pending, cumulative) set names an index records into.
    pub(crate) const fn names_for(&self, tagged: bool) -> (ChangeSetName, ChangeSetName) {
        if self.is_filtered || tagged {
            (
                ChangeSetName::FilteredChanges,
                ChangeSetName::AllFilteredChanges,
            )
        } else {
            (ChangeSetName::Changes, ChangeSetName::AllChanges)
        }
    }

    /// Records a change at `index`, collapsing DELETE followed by ADD.
    pub(crate) fn change(&mut self, index: usize, op: Operation, tagged: bool) -> ChangeSetName {
        match self.indexed.get(&index) {
            None => {
                self.indexed.insert(index, op);
            }
            Some(Operation::Delete) => {
                self.indexed.insert(index, Operation::DeleteAndAdd);
            }
            Some(_) => {}
        }
        let (pending, all) = self.names_for(tagged);
        self.set_mut(pending).insert(index);
        self.set_mut(all).insert(index);
        pending
    }

    /// Records a removal at `index`.
    pub(crate) fn delete(&mut self, index: usize, tagged: bool) -> ChangeSetName {
        self.indexed.insert(index, Operation::Delete);
        let (pending, all) = self.names_for(tagged);
        self.set_mut(pending).insert(index);
        self.set_mut(all).remove(index);
        pending
    }

    /// Forgets every trace of `index`, for slots no peer has seen.
    pub(crate) fn retract(&mut self, index: usize) {
        self.indexed.remove(&index);
        self.changes.remove(index);
        self.all_changes.remove(index);
        if let Some(sets) = &mut self.filtered {
            sets.changes.remove(index);
            sets.all_changes.remove(index);
        }
    }

    /// Records an index-less operation.
    pub(crate) fn operation(&mut self, op: Operation) -> ChangeSetName {
        let (pending, _) = self.names_for(false);
        self.set_mut(pending).push_pure(op);
        pending
    }

    pub(crate) fn indexed_op(&self, index: usize) -> Option<Operation> {
        self.indexed.get(&index).copied()
    }

    pub(crate) fn has_pending(&self) -> bool {
        !self.changes.is_empty()
            || self
                .filtered
                .as_ref()
                .is_some_and(|sets| !sets.changes.is_empty())
    }

    /// Clears a pending set after it has been encoded.
    pub(crate) fn end_encode(&mut self, name: ChangeSetName) {
        let set = self.set_mut(name);
        let flushed: Vec<usize> = set.indexes().collect();
        set.clear();
        for index in flushed {
            self.indexed.remove(&index);
        }
        self.is_new = false;
    }

    /// Drops pending operations; `all` also resets the cumulative sets.
    pub(crate) fn discard(&mut self, all: bool) {
        self.changes.clear();
        self.indexed.clear();
        if let Some(sets) = &mut self.filtered {
            sets.changes.clear();
        }
        if all {
            self.all_changes.clear();
            if let Some(sets) = &mut self.filtered {
                sets.all_changes.clear();
            }
        }
    }

    /// Moves every unfiltered entry into the filtered sets.
    pub(crate) fn mark_filtered(&mut self) {
        self.is_filtered = true;
        let sets = self.filtered.get_or_insert_with(FilteredSets::default);
        sets.changes.absorb(&mut self.changes);
        sets.all_changes.absorb(&mut self.all_changes);
    }

    /// Re-queues every cumulative index as a fresh ADD.
    pub(crate) fn requeue_all_as_add(&mut self) {
        let unfiltered: Vec<usize> = self.all_changes.indexes().collect();
        for index in unfiltered {
            self.indexed.insert(index, Operation::Add);
            self.changes.insert(index);
        }
        if let Some(sets) = &mut self.filtered {
            let filtered: Vec<usize> = sets.all_changes.indexes().collect();
            for index in filtered {
                self.indexed.insert(index, Operation::Add);
                sets.changes.insert(index);
            }
        }
    }

    pub(crate) fn parent(&self) -> Option<ParentLink> {
        self.parents.last().copied()
    }

    pub(crate) fn parents(&self) -> &[ParentLink] {
        &self.parents
    }

    /// Links the node under `parent` at `index`; the newest link is primary.
    pub(crate) fn add_parent(&mut self, parent: NodeId, index: usize) {
        let link = ParentLink { parent, index };
        self.parents.retain(|existing| *existing != link);
        self.parents.push(link);
    }

    pub(crate) fn remove_parent(&mut self, parent: NodeId, index: usize) -> bool {
        let before = self.parents.len();
        self.parents
            .retain(|link| !(link.parent == parent && link.index == index));
        before != self.parents.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(index: u32) -> NodeId {
        NodeId {
            index,
            generation: 0,
        }
    }

    #[test]
    fn delete_then_add_collapses() {
        let mut tree = ChangeTree::new(false);
        tree.delete(2, false);
        tree.change(2, Operation::Add, false);
        assert_eq!(tree.indexed_op(2), Some(Operation::DeleteAndAdd));
        assert_eq!(tree.set(ChangeSetName::Changes).unwrap().len(), 1);
    }

    #[test]
    fn first_operation_wins_until_flushed() {
        let mut tree = ChangeTree::new(false);
        tree.change(0, Operation::Add, false);
        tree.change(0, Operation::Replace, false);
        assert_eq!(tree.indexed_op(0), Some(Operation::Add));
        tree.end_encode(ChangeSetName::Changes);
        assert_eq!(tree.indexed_op(0), None);
        assert!(!tree.is_new);
        tree.change(0, Operation::Replace, false);
        assert_eq!(tree.indexed_op(0), Some(Operation::Replace));
    }

    #[test]
    fn delete_removes_from_cumulative() {
        let mut tree = ChangeTree::new(false);
        tree.change(1, Operation::Add, false);
        tree.delete(1, false);
        assert!(!tree.set(ChangeSetName::AllChanges).unwrap().contains(1));
        assert!(tree.set(ChangeSetName::Changes).unwrap().contains(1));
    }

    #[test]
    fn tagged_indexes_go_to_filtered_sets() {
        let mut tree = ChangeTree::new(true);
        let name = tree.change(3, Operation::Add, true);
        assert_eq!(name, ChangeSetName::FilteredChanges);
        assert!(tree.set(ChangeSetName::Changes).unwrap().is_empty());
        assert!(tree.set(ChangeSetName::AllFilteredChanges).unwrap().contains(3));
    }

    #[test]
    fn mark_filtered_moves_recorded_changes() {
        let mut tree = ChangeTree::new(false);
        tree.change(0, Operation::Add, false);
        tree.operation(Operation::Clear);
        tree.mark_filtered();
        assert!(tree.set(ChangeSetName::Changes).unwrap().is_empty());
        assert_eq!(tree.set(ChangeSetName::FilteredChanges).unwrap().len(), 2);
        assert!(tree.set(ChangeSetName::AllFilteredChanges).unwrap().contains(0));
    }

    #[test]
    fn discard_all_resets_cumulative() {
        let mut tree = ChangeTree::new(true);
        tree.change(0, Operation::Add, false);
        tree.change(1, Operation::Add, true);
        tree.discard(false);
        assert!(!tree.has_pending());
        assert!(tree.set(ChangeSetName::AllChanges).unwrap().contains(0));
        tree.discard(true);
        assert!(tree.set(ChangeSetName::AllChanges).unwrap().is_empty());
        assert!(tree.set(ChangeSetName::AllFilteredChanges).unwrap().is_empty());
    }

    #[test]
    fn requeue_marks_everything_as_add() {
        let mut tree = ChangeTree::new(false);
        tree.change(0, Operation::Add, false);
        tree.change(1, Operation::Add, false);
        tree.end_encode(ChangeSetName::Changes);
        tree.requeue_all_as_add();
        assert_eq!(tree.indexed_op(1), Some(Operation::Add));
        assert_eq!(tree.set(ChangeSetName::Changes).unwrap().len(), 2);
    }

    #[test]
    fn parent_links_are_deduplicated() {
        let mut tree = ChangeTree::new(false);
        tree.add_parent(node(1), 0);
        tree.add_parent(node(2), 4);
        tree.add_parent(node(1), 0);
        assert_eq!(tree.parents().len(), 2);
        assert_eq!(tree.parent(), Some(ParentLink { parent: node(1), index: 0 }));
        assert!(tree.remove_parent(node(1), 0));
        assert!(!tree.remove_parent(node(1), 0));
        assert_eq!(tree.parent().map(|link| link.index), Some(4));
    }
}
