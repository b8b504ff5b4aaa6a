//! Reference registry of the encode side: ref ids, refcounts and the
//! ordered pending-node queues the encoder walks.

use std::collections::HashMap;

use indexmap::IndexSet;

use crate::change_set::ChangeSetName;
use crate::types::{NodeId, RefId};

/// Outcome of registering a node with the root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Registration {
    /// The node was not tracked before this call.
    pub(crate) is_new: bool,
    /// The node's count had dropped to zero and it is being re-attached.
    pub(crate) reattached: bool,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Root {
    next_ref_id: u32,
    ref_counts: HashMap<RefId, u32>,
    nodes: HashMap<RefId, NodeId>,
    queues: [IndexSet<NodeId>; 4],
}

impl Root {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn allocate(&mut self) -> RefId {
        let ref_id = RefId::new(self.next_ref_id);
        self.next_ref_id = self.next_ref_id.wrapping_add(1);
        ref_id
    }

    #[cfg(test)]
    pub(crate) fn node(&self, ref_id: RefId) -> Option<NodeId> {
        self.nodes.get(&ref_id).copied()
    }

    #[cfg(test)]
    pub(crate) fn ref_count(&self, ref_id: RefId) -> u32 {
        self.ref_counts.get(&ref_id).copied().unwrap_or(0)
    }

    /// Increments the refcount of `ref_id`.
    pub(crate) fn add(&mut self, ref_id: RefId, node: NodeId) -> Registration {
        let previous = self.ref_counts.get(&ref_id).copied();
        self.ref_counts.insert(ref_id, previous.unwrap_or(0) + 1);
        let is_new = !self.nodes.contains_key(&ref_id);
        if is_new {
            self.nodes.insert(ref_id, node);
        }
        Registration {
            is_new,
            reattached: previous == Some(0),
        }
    }

    /// Decrements the refcount; returns the new count, or `None` if untracked.
    ///
    /// At zero the node leaves every queue but keeps its count entry so a
    /// later re-attachment can be recognized.
    pub(crate) fn remove(&mut self, ref_id: RefId) -> Option<u32> {
        let count = self.ref_counts.get_mut(&ref_id)?;
        if *count == 0 {
            return None;
        }
        *count -= 1;
        let count = *count;
        if count == 0 {
            if let Some(node) = self.nodes.remove(&ref_id) {
                self.dequeue_all(node);
            }
        }
        Some(count)
    }

    /// Forgets `ref_id` entirely.
    pub(crate) fn forget(&mut self, ref_id: RefId) {
        self.ref_counts.remove(&ref_id);
        self.nodes.remove(&ref_id);
    }

    pub(crate) fn enqueue(&mut self, name: ChangeSetName, node: NodeId) {
        self.queues[name.slot()].insert(node);
    }

    pub(crate) fn dequeue_all(&mut self, node: NodeId) {
        for queue in &mut self.queues {
            queue.shift_remove(&node);
        }
    }

    pub(crate) fn queue(&self, name: ChangeSetName) -> &IndexSet<NodeId> {
        &self.queues[name.slot()]
    }

    pub(crate) fn clear_queue(&mut self, name: ChangeSetName) {
        self.queues[name.slot()].clear();
    }

    /// Moves `node` right after `anchor` in every queue where it sits before it.
    ///
    /// Returns `true` if the node moved in any queue.
    pub(crate) fn move_after(&mut self, node: NodeId, anchor: NodeId) -> bool {
        let mut moved = false;
        for queue in &mut self.queues {
            let (Some(from), Some(to)) = (queue.get_index_of(&node), queue.get_index_of(&anchor))
            else {
                continue;
            };
            if from < to {
                queue.move_index(from, to);
                moved = true;
            }
        }
        moved
    }
}
