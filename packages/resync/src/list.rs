//! Unkeyed list container.
//!
//! Display order is insertion order. Targeted id fetches put the freshly
//! fetched records in front of the older ones, de-duplicated by key, so the
//! most recent server answer takes precedence.

use std::collections::{BTreeSet, HashSet};

use crate::dirty::DirtySet;
use crate::error::SyncError;
use crate::key::{Key, Record};
use crate::state::{ContainerState, Lifecycle, Transition};

/// Ordered list of records with staleness tracking.
#[derive(Debug, Clone)]
pub struct ListContainer<T> {
    lifecycle: Lifecycle,
    dirty: DirtySet,
    content: Vec<T>,
}

impl<T> Default for ListContainer<T> {
    fn default() -> Self {
        Self {
            lifecycle: Lifecycle::new(),
            dirty: DirtySet::new(),
            content: Vec::new(),
        }
    }
}

impl<T: Record> ListContainer<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ContainerState {
        self.lifecycle.state()
    }

    pub fn content(&self) -> &[T] {
        &self.content
    }

    pub fn dirty(&self) -> &DirtySet {
        &self.dirty
    }

    pub fn begin_request(&mut self) {
        self.lifecycle.apply(Transition::Request);
    }

    pub fn reject(&mut self, error: SyncError) {
        self.lifecycle.fail(error);
    }

    /// Replace the whole list.
    pub fn resolve_all(&mut self, data: Vec<T>) {
        self.content = dedup_by_key(data);
        self.dirty.clear();
        self.finish();
    }

    /// Put fetched records first, followed by the untouched older ones.
    pub fn resolve_ids(&mut self, requested: &[Key], data: Vec<T>) {
        let fresh = dedup_by_key(data);
        let fresh_keys: HashSet<Key> = fresh.iter().map(|r| r.key()).collect();

        let older = std::mem::take(&mut self.content)
            .into_iter()
            .filter(|r| !fresh_keys.contains(&r.key()));
        self.content = fresh.into_iter().chain(older).collect();

        self.dirty.resolve(requested);
        self.dirty.resolve(&fresh_keys);
        self.finish();
    }

    /// Mark keys stale. Ignored before the first load and while loading.
    pub fn mark_dirty(&mut self, ids: Vec<Key>) -> bool {
        if ids.is_empty() || self.state().next(Transition::MarkDirty).is_none() {
            return false;
        }
        self.dirty.mark(ids);
        self.lifecycle.apply(Transition::MarkDirty)
    }

    /// Drop records by key. Returns how many were removed.
    pub fn remove(&mut self, ids: &[Key]) -> usize {
        let before = self.content.len();
        self.content.retain(|r| !ids.contains(&r.key()));

        self.dirty.purge(ids);
        self.lifecycle.apply(Transition::Settle {
            dirty_remaining: !self.dirty.is_empty(),
        });
        before - self.content.len()
    }

    pub fn snapshot(&self) -> ListSnapshot<T> {
        ListSnapshot {
            state: self.state(),
            error: self.lifecycle.error().cloned(),
            dirty_ids: self.dirty.to_set(),
            content: self.content.clone(),
        }
    }

    fn finish(&mut self) {
        self.lifecycle.apply(Transition::Resolve {
            dirty_remaining: !self.dirty.is_empty(),
        });
    }
}

fn dedup_by_key<T: Record>(data: Vec<T>) -> Vec<T> {
    let mut seen = HashSet::with_capacity(data.len());
    data.into_iter().filter(|r| seen.insert(r.key())).collect()
}

/// Read-only copy of a [`ListContainer`].
#[derive(Debug, Clone)]
pub struct ListSnapshot<T> {
    pub state: ContainerState,
    pub error: Option<SyncError>,
    pub dirty_ids: BTreeSet<Key>,
    pub content: Vec<T>,
}
