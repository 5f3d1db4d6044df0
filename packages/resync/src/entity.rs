//! Id-keyed entity set with windowed loading.
//!
//! An [`EntitySet`] represents a conceptually complete, server-ordered
//! collection whose size is only known from the last reported total. It is
//! filled piecewise by range requests, targeted id requests or a full refresh,
//! and never needs the whole collection at once.
//!
//! # Merge Semantics
//!
//! | Fetch | Index | Records | Dirty |
//! |-------|-------|---------|-------|
//! | `all` | rebuilt 1:1 from the response | exactly the response | cleared |
//! | `range(start, len)` | resized to `total`, window overwritten | upserted, displaced evicted | window keys + returned keys resolved |
//! | `ids(keys)` | known keys keep their slot, unseen keys go to the frontier | upserted | requested + returned keys resolved |
//!
//! Re-requesting a loaded window is idempotent, and overlapping windows merge
//! to their union.

use std::collections::{BTreeSet, HashMap};

use tracing::debug;

use crate::dirty::DirtySet;
use crate::error::SyncError;
use crate::key::{Key, Record};
use crate::source::Page;
use crate::state::{ContainerState, Lifecycle, Transition};
use crate::window::{Slot, WindowedIndex};

/// Index plus records: the readable part of an entity set.
#[derive(Debug, Clone)]
pub struct EntityContent<T> {
    index: WindowedIndex,
    records: HashMap<Key, T>,
    total_known: bool,
}

impl<T> Default for EntityContent<T> {
    fn default() -> Self {
        Self {
            index: WindowedIndex::new(),
            records: HashMap::new(),
            total_known: false,
        }
    }
}

impl<T> EntityContent<T> {
    /// Last observed server total.
    pub fn total(&self) -> usize {
        self.index.len()
    }

    /// Number of loaded slots.
    pub fn loaded_count(&self) -> usize {
        self.index.loaded_count()
    }

    pub fn slots(&self) -> &[Slot] {
        self.index.slots()
    }

    pub fn get(&self, key: &Key) -> Option<&T> {
        self.records.get(key)
    }

    pub fn position(&self, key: &Key) -> Option<usize> {
        self.index.position(key)
    }

    /// Loaded records in index order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.index.keys().filter_map(|key| self.records.get(key))
    }

    /// Whether every position of the window is loaded.
    ///
    /// Always false until a range or full fetch has reported a total.
    pub fn is_window_loaded(&self, start: usize, length: usize) -> bool {
        self.total_known && self.index.missing_in(start, length).is_empty()
    }

    /// Pending positions of the window, clipped to the total.
    pub fn missing_in(&self, start: usize, length: usize) -> Vec<usize> {
        self.index.missing_in(start, length)
    }

    fn check_invariants(&self) -> bool {
        self.records.len() == self.index.loaded_count()
            && self.index.keys().all(|key| self.records.contains_key(key))
    }
}

/// Id-keyed entity container.
#[derive(Debug, Clone)]
pub struct EntitySet<T> {
    lifecycle: Lifecycle,
    dirty: DirtySet,
    content: EntityContent<T>,
}

impl<T> Default for EntitySet<T> {
    fn default() -> Self {
        Self {
            lifecycle: Lifecycle::new(),
            dirty: DirtySet::new(),
            content: EntityContent::default(),
        }
    }
}

impl<T: Record> EntitySet<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ContainerState {
        self.lifecycle.state()
    }

    pub fn error(&self) -> Option<&SyncError> {
        self.lifecycle.error()
    }

    pub fn dirty(&self) -> &DirtySet {
        &self.dirty
    }

    pub fn content(&self) -> &EntityContent<T> {
        &self.content
    }

    /// A fetch was issued. Content stays readable.
    pub fn begin_request(&mut self) {
        self.lifecycle.apply(Transition::Request);
    }

    /// Record a failed fetch. Content and staleness are kept.
    pub fn reject(&mut self, error: SyncError) {
        self.lifecycle.fail(error);
    }

    /// Full replace from a complete response.
    pub fn resolve_all(&mut self, data: Vec<T>) {
        let content = &mut self.content;
        content.index.rebuild(data.iter().map(|record| record.key()));
        content.records = data.into_iter().map(|r| (r.key(), r)).collect();
        content.total_known = true;

        self.dirty.clear();
        self.finish();
    }

    /// Merge one page of a range request.
    pub fn resolve_range(&mut self, start: usize, length: usize, page: Page<T>) {
        let content = &mut self.content;

        // Keys in the window before the merge were requested too, even if the
        // server no longer returns them there.
        let mut requested = content.index.keys_in(start, length);

        for key in content.index.resize(page.total) {
            content.records.remove(&key);
        }

        let window = content.index.clip(start, length);
        let returned = page.data.len();
        if returned > window.len() {
            debug!(
                returned,
                window = window.len(),
                "range response longer than window, extra records ignored"
            );
        }

        for (pos, record) in window.zip(page.data) {
            let key = record.key();
            if let Some(displaced) = content.index.place(pos, key.clone()) {
                content.records.remove(&displaced);
            }
            content.records.insert(key.clone(), record);
            requested.push(key);
        }
        content.total_known = true;

        self.dirty.resolve(&requested);
        self.finish();
    }

    /// Merge the records returned for a targeted id request.
    ///
    /// Requested ids missing from the response are only cleared from the dirty
    /// set; absence is a valid answer.
    pub fn resolve_ids(&mut self, requested: &[Key], data: Vec<T>) {
        let content = &mut self.content;
        let mut returned = Vec::with_capacity(data.len());

        for record in data {
            let key = record.key();
            if !content.index.contains(&key) {
                let frontier = content.index.frontier();
                if frontier >= content.index.len() {
                    debug!(%key, total = content.index.len(), "no free slot for unseen record");
                    returned.push(key);
                    continue;
                }
                content.index.place(frontier, key.clone());
            }
            content.records.insert(key.clone(), record);
            returned.push(key);
        }

        self.dirty.resolve(requested);
        self.dirty.resolve(&returned);
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

    /// Delete records and their slots. Returns how many records were removed.
    pub fn remove(&mut self, ids: &[Key]) -> usize {
        let content = &mut self.content;
        let mut removed = 0;
        for key in ids {
            content.index.remove(key);
            if content.records.remove(key).is_some() {
                removed += 1;
            }
        }

        self.dirty.purge(ids);
        self.lifecycle.apply(Transition::Settle {
            dirty_remaining: !self.dirty.is_empty(),
        });
        removed
    }

    /// Whether the window has pending or stale positions.
    pub fn needs_refresh(&self, start: usize, length: usize) -> bool {
        !self.content.is_window_loaded(start, length)
            || self
                .content
                .index
                .keys_in(start, length)
                .iter()
                .any(|key| self.dirty.contains(key))
    }

    pub fn snapshot(&self) -> EntitySnapshot<T> {
        debug_assert!(self.content.check_invariants());
        EntitySnapshot {
            state: self.state(),
            error: self.error().cloned(),
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

/// Read-only copy of an [`EntitySet`].
#[derive(Debug, Clone)]
pub struct EntitySnapshot<T> {
    pub state: ContainerState,
    pub error: Option<SyncError>,
    pub dirty_ids: BTreeSet<Key>,
    pub content: EntityContent<T>,
}

impl<T> EntitySnapshot<T> {
    pub fn is_dirty(&self, key: &Key) -> bool {
        self.dirty_ids.contains(key)
    }

    pub fn loaded_count(&self) -> usize {
        self.content.loaded_count()
    }

    pub fn is_window_loaded(&self, start: usize, length: usize) -> bool {
        self.content.is_window_loaded(start, length)
    }
}
