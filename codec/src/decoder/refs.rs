//! Reference ids and holder counts on the decoding side.

use std::collections::HashMap;

use crate::decoder::graph::DecodedGraph;
use crate::types::{NodeId, RefId};

/// Maps wire reference ids to decoded nodes and counts their holders.
///
/// A node whose count drops to zero is queued and freed by
/// [`collect`](Self::collect) at the end of a decode, unless something took
/// hold of it again in the meantime. Freeing a node releases its children.
#[derive(Debug, Default, Clone)]
pub(crate) struct ReferenceTracker {
    nodes: HashMap<RefId, NodeId>,
    counts: HashMap<RefId, u32>,
    released: Vec<RefId>,
}

impl ReferenceTracker {
    pub(crate) fn new(root: NodeId) -> Self {
        let mut tracker = Self::default();
        tracker.add(RefId::ROOT, root, true);
        tracker
    }

    pub(crate) fn node(&self, ref_id: RefId) -> Option<NodeId> {
        self.nodes.get(&ref_id).copied()
    }

    pub(crate) fn count(&self, ref_id: RefId) -> u32 {
        self.counts.get(&ref_id).copied().unwrap_or_default()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Registers `node` under `ref_id`, counting one more holder if
    /// `increment` is set.
    pub(crate) fn add(&mut self, ref_id: RefId, node: NodeId, increment: bool) {
        self.nodes.insert(ref_id, node);
        let count = self.counts.entry(ref_id).or_default();
        if increment {
            *count += 1;
        }
    }

    /// Drops one holder. Returns `false` on underflow.
    pub(crate) fn remove(&mut self, ref_id: RefId) -> bool {
        match self.counts.get_mut(&ref_id) {
            Some(count) if *count > 0 => {
                *count -= 1;
                if *count == 0 {
                    self.released.push(ref_id);
                }
                true
            }
            _ => {
                tracing::warn!(%ref_id, "reference count underflow");
                false
            }
        }
    }

    /// Frees every released node still without holders, cascading into
    /// children. Returns the freed reference ids.
    pub(crate) fn collect(&mut self, graph: &mut DecodedGraph) -> Vec<RefId> {
        let mut freed = Vec::new();
        while let Some(ref_id) = self.released.pop() {
            if ref_id == RefId::ROOT || self.count(ref_id) > 0 {
                continue;
            }
            let Some(node) = self.nodes.remove(&ref_id) else {
                continue;
            };
            self.counts.remove(&ref_id);
            let Some(removed) = graph.remove(node) else {
                continue;
            };
            for child in removed.data.children() {
                if let Some(child_ref) = graph.ref_id(child) {
                    self.remove(child_ref);
                }
            }
            freed.push(ref_id);
        }
        if !freed.is_empty() {
            tracing::debug!(count = freed.len(), "collected unreachable references");
        }
        freed
    }
}
