//! Id-granular staleness bookkeeping.
//!
//! "A key is stale" is tracked separately from "a key is loaded". A key can be
//! dirty without being present in the container, and requesting a key is enough
//! to clear its staleness even when the server no longer returns it.

use std::collections::BTreeSet;

use crate::key::Key;

/// Set of stale keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirtySet {
    ids: BTreeSet<Key>,
}

impl DirtySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add keys. Returns how many were not already dirty.
    pub fn mark<I>(&mut self, ids: I) -> usize
    where
        I: IntoIterator<Item = Key>,
    {
        ids.into_iter().filter(|id| self.ids.insert(id.clone())).count()
    }

    /// Clear every requested key. Returns how many were dirty.
    ///
    /// Called after each successful fetch with the keys that were *requested*,
    /// not just the ones the server returned.
    pub fn resolve<'a, I>(&mut self, requested: I) -> usize
    where
        I: IntoIterator<Item = &'a Key>,
    {
        requested
            .into_iter()
            .filter(|id| self.ids.remove(*id))
            .count()
    }

    /// Drop keys whose records were removed.
    pub fn purge<'a, I>(&mut self, ids: I) -> usize
    where
        I: IntoIterator<Item = &'a Key>,
    {
        self.resolve(ids)
    }

    /// A full refresh proves everything current.
    pub fn clear(&mut self) {
        self.ids.clear();
    }

    pub fn contains(&self, id: &Key) -> bool {
        self.ids.contains(id)
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Key> {
        self.ids.iter()
    }

    /// Owned copy for snapshots.
    pub fn to_set(&self) -> BTreeSet<Key> {
        self.ids.clone()
    }
}
