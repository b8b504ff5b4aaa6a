//! Ordered, index-addressable sets of pending field operations.

use indexmap::IndexSet;
use wire::Operation;

/// Names of the four change sets a node tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum ChangeSetName {
    /// Pending, unfiltered.
    Changes,
    /// Cumulative since creation, unfiltered.
    AllChanges,
    /// Pending, visible only through views.
    FilteredChanges,
    /// Cumulative since creation, visible only through views.
    AllFilteredChanges,
}

impl ChangeSetName {
    pub(crate) const fn slot(self) -> usize {
        match self {
            Self::Changes => 0,
            Self::AllChanges => 1,
            Self::FilteredChanges => 2,
            Self::AllFilteredChanges => 3,
        }
    }

    /// Returns `true` for the cumulative sets used by full-state encodes.
    pub(crate) const fn is_cumulative(self) -> bool {
        matches!(self, Self::AllChanges | Self::AllFilteredChanges)
    }
}

/// One entry of a change set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Entry {
    /// A field or slot index.
    Index(usize),
    /// An index-less operation (CLEAR, REVERSE).
    Pure(Operation),
}

/// Key of an entry. Pure operations may repeat, so each carries a sequence
/// number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Key {
    Index(usize),
    Pure(u64, Operation),
}

/// Ordered list of indexes with O(1) lookup.
#[derive(Debug, Clone, Default)]
pub(crate) struct ChangeSet {
    entries: IndexSet<Key>,
    next_pure: u64,
}

impl ChangeSet {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Adds `index` unless already present.
    pub(crate) fn insert(&mut self, index: usize) {
        self.entries.insert(Key::Index(index));
    }

    /// Appends an index-less operation.
    pub(crate) fn push_pure(&mut self, op: Operation) {
        self.entries.insert(Key::Pure(self.next_pure, op));
        self.next_pure = self.next_pure.wrapping_add(1);
    }

    /// Removes `index`, returning whether it was present.
    pub(crate) fn remove(&mut self, index: usize) -> bool {
        self.entries.shift_remove(&Key::Index(index))
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, index: usize) -> bool {
        self.entries.contains(&Key::Index(index))
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    /// Entries in insertion order.
    pub(crate) fn iter(&self) -> impl Iterator<Item = Entry> + '_ {
        self.entries.iter().map(|key| match *key {
            Key::Index(index) => Entry::Index(index),
            Key::Pure(_, op) => Entry::Pure(op),
        })
    }

    /// Field indexes in insertion order.
    pub(crate) fn indexes(&self) -> impl Iterator<Item = usize> + '_ {
        self.iter().filter_map(|entry| match entry {
            Entry::Index(index) => Some(index),
            Entry::Pure(_) => None,
        })
    }

    /// Moves every entry of `other` to the end of this set.
    pub(crate) fn absorb(&mut self, other: &mut Self) {
        for entry in other.iter() {
            match entry {
                Entry::Index(index) => self.insert(index),
                Entry::Pure(op) => self.push_pure(op),
            }
        }
        other.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_is_idempotent_and_ordered() {
        let mut set = ChangeSet::new();
        set.insert(3);
        set.insert(1);
        set.insert(3);
        assert_eq!(set.indexes().collect::<Vec<_>>(), vec![3, 1]);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn remove_keeps_other_positions() {
        let mut set = ChangeSet::new();
        for index in 0..5 {
            set.insert(index);
        }
        assert!(set.remove(2));
        assert!(!set.remove(2));
        assert!(set.remove(3));
        assert_eq!(set.indexes().collect::<Vec<_>>(), vec![0, 1, 4]);
        assert!(!set.contains(3));
        assert!(set.contains(4));
    }

    #[test]
    fn pure_operations_are_kept_in_order() {
        let mut set = ChangeSet::new();
        set.insert(0);
        set.push_pure(Operation::Clear);
        set.insert(1);
        let entries: Vec<_> = set.iter().collect();
        assert_eq!(
            entries,
            vec![
                Entry::Index(0),
                Entry::Pure(Operation::Clear),
                Entry::Index(1)
            ]
        );
        assert_eq!(set.indexes().count(), 2);
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn reinsert_after_remove_appends() {
        let mut set = ChangeSet::new();
        set.insert(7);
        set.insert(8);
        set.remove(7);
        set.insert(7);
        assert_eq!(set.indexes().collect::<Vec<_>>(), vec![8, 7]);
    }

    #[test]
    fn mass_removal_keeps_order() {
        let mut set = ChangeSet::new();
        for index in 0..100 {
            set.insert(index);
        }
        for index in 0..90 {
            assert!(set.remove(index));
        }
        assert_eq!(set.len(), 10);
        assert!(set.remove(95));
        assert_eq!(set.indexes().collect::<Vec<_>>(), vec![90, 91, 92, 93, 94, 96, 97, 98, 99]);
    }

    #[test]
    fn repeated_pure_operations_are_all_kept() {
        let mut set = ChangeSet::new();
        set.push_pure(Operation::Reverse);
        set.insert(0);
        set.push_pure(Operation::Reverse);
        assert_eq!(set.len(), 3);
        set.clear();
        assert!(set.is_empty());
    }

    #[test]
    fn absorb_moves_entries() {
        let mut a = ChangeSet::new();
        let mut b = ChangeSet::new();
        a.insert(1);
        b.insert(2);
        b.push_pure(Operation::Reverse);
        a.absorb(&mut b);
        assert!(b.is_empty());
        assert_eq!(a.len(), 3);
    }

    #[test]
    fn names() {
        assert!(ChangeSetName::AllFilteredChanges.is_cumulative());
        assert!(!ChangeSetName::Changes.is_cumulative());
        assert_eq!(ChangeSetName::AllFilteredChanges.slot(), 3);
    }
}
