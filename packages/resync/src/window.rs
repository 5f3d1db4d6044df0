//! Order-preserving, resizable index for partially loaded collections.
//!
//! The index mirrors the server's ordering of a collection whose size is only
//! known from the last `total` the server reported. Each position is either a
//! [`Slot::Pending`] placeholder or a [`Slot::Loaded`] key pointing into the
//! owning record map.
//!
//! # Invariants
//!
//! - A key occupies at most one slot. Placing a key somewhere else vacates its
//!   old slot.
//! - `positions` is the exact inverse of the loaded slots.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::key::Key;

/// One position of a windowed index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Slot {
    /// Not loaded yet.
    Pending,
    /// Loaded; the record lives under this key.
    Loaded(Key),
}

impl Slot {
    pub fn is_loaded(&self) -> bool {
        matches!(self, Slot::Loaded(_))
    }

    pub fn key(&self) -> Option<&Key> {
        match self {
            Slot::Loaded(key) => Some(key),
            Slot::Pending => None,
        }
    }
}

/// Positions of a server-ordered collection, loaded or pending.
#[derive(Debug, Clone, Default)]
pub struct WindowedIndex {
    slots: Vec<Slot>,
    positions: HashMap<Key, usize>,
}

impl WindowedIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last observed server total.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn position(&self, key: &Key) -> Option<usize> {
        self.positions.get(key).copied()
    }

    pub fn contains(&self, key: &Key) -> bool {
        self.positions.contains_key(key)
    }

    pub fn loaded_count(&self) -> usize {
        self.positions.len()
    }

    /// Loaded keys in index order.
    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.slots.iter().filter_map(Slot::key)
    }

    /// Resize to a new server total.
    ///
    /// Growing appends placeholders. Shrinking drops trailing slots; the keys
    /// they held are returned so the caller can evict their records.
    pub fn resize(&mut self, total: usize) -> Vec<Key> {
        if total >= self.slots.len() {
            self.slots.resize(total, Slot::Pending);
            return Vec::new();
        }

        let dropped: Vec<Key> = self
            .slots
            .drain(total..)
            .filter_map(|slot| match slot {
                Slot::Loaded(key) => Some(key),
                Slot::Pending => None,
            })
            .collect();
        for key in &dropped {
            self.positions.remove(key);
        }
        dropped
    }

    /// Put `key` at `pos`.
    ///
    /// If the key already sat elsewhere, that slot becomes pending. Returns the
    /// key previously stored at `pos` when it differs from `key`; that key is no
    /// longer indexed.
    ///
    /// # Panics
    ///
    /// Panics if `pos` is out of range; callers clip to `len()` first.
    pub fn place(&mut self, pos: usize, key: Key) -> Option<Key> {
        if let Some(old) = self.positions.get(&key).copied() {
            if old == pos {
                return None;
            }
            self.slots[old] = Slot::Pending;
        }

        let displaced = match std::mem::replace(&mut self.slots[pos], Slot::Loaded(key.clone())) {
            Slot::Loaded(prev) if prev != key => {
                self.positions.remove(&prev);
                Some(prev)
            }
            _ => None,
        };
        self.positions.insert(key, pos);
        displaced
    }

    /// Replace the whole index with `keys` in order.
    ///
    /// Repeated keys keep their first position; the duplicates are skipped.
    pub fn rebuild<I>(&mut self, keys: I)
    where
        I: IntoIterator<Item = Key>,
    {
        self.slots.clear();
        self.positions.clear();
        for key in keys {
            if self.positions.contains_key(&key) {
                continue;
            }
            self.positions.insert(key.clone(), self.slots.len());
            self.slots.push(Slot::Loaded(key));
        }
    }

    /// Delete the slot holding `key`, shifting later slots down by one.
    pub fn remove(&mut self, key: &Key) -> bool {
        let Some(pos) = self.positions.remove(key) else {
            return false;
        };
        self.slots.remove(pos);
        for slot in &self.slots[pos..] {
            if let Slot::Loaded(k) = slot {
                if let Some(p) = self.positions.get_mut(k) {
                    *p -= 1;
                }
            }
        }
        true
    }

    /// Position just past the last loaded slot.
    pub fn frontier(&self) -> usize {
        self.slots
            .iter()
            .rposition(Slot::is_loaded)
            .map_or(0, |pos| pos + 1)
    }

    /// `[start, start + length)` clipped to the current total.
    pub fn clip(&self, start: usize, length: usize) -> std::ops::Range<usize> {
        let end = start.saturating_add(length).min(self.slots.len());
        start.min(end)..end
    }

    /// Keys currently loaded inside the window.
    pub fn keys_in(&self, start: usize, length: usize) -> Vec<Key> {
        self.slots[self.clip(start, length)]
            .iter()
            .filter_map(|slot| slot.key().cloned())
            .collect()
    }

    /// Pending positions inside the window.
    pub fn missing_in(&self, start: usize, length: usize) -> Vec<usize> {
        self.clip(start, length)
            .filter(|&pos| !self.slots[pos].is_loaded())
            .collect()
    }
}
