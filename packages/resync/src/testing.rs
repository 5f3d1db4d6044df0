//! Testing utilities for stores and push handlers.
//!
//! # Feature Flag
//!
//! This module is only available with the `testing` feature:
//!
//! ```toml
//! [dev-dependencies]
//! resync = { version = "0.1", features = ["testing"] }
//! ```
//!
//! # Quick Start
//!
//! ```ignore
//! use resync::testing::{FakeSource, HandlerLog};
//!
//! let store = EntityStore::new("movie", FakeSource::new((0..8).map(movie)));
//! store.request_range(0, 2).await;
//!
//! // Simulate the server changing underneath the client.
//! store.source().upsert(renamed_movie);
//! store.source().set_failing(true);
//!
//! // Observe what the bus hands to handlers.
//! let log = HandlerLog::new();
//! bus.register("movie", log.handlers());
//! ```

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::event::Operation;
use crate::key::{Key, Record};
use crate::router::ResourceHandlers;
use crate::source::{EntitySource, ItemSource, Page};

/// A fetch the fake server received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchCall {
    All,
    Range { start: usize, length: usize },
    Ids(Vec<Key>),
}

struct FakeState<T> {
    records: Vec<T>,
    failing: bool,
    latency: Option<Duration>,
    calls: Vec<FetchCall>,
}

/// In-memory server for an id-keyed collection.
///
/// Serves ranges, ids and full fetches from an ordered `Vec`, records every
/// call, and can be switched into failure mode or given artificial latency
/// (which runs on tokio's clock, so it is instant under `start_paused`).
pub struct FakeSource<T> {
    state: Mutex<FakeState<T>>,
}

impl<T: Record> FakeSource<T> {
    pub fn new(records: impl IntoIterator<Item = T>) -> Self {
        Self {
            state: Mutex::new(FakeState {
                records: records.into_iter().collect(),
                failing: false,
                latency: None,
                calls: Vec::new(),
            }),
        }
    }

    pub fn with_latency(self, latency: Duration) -> Self {
        self.lock().latency = Some(latency);
        self
    }

    /// Make every following fetch fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.lock().failing = failing;
    }

    /// Replace a record with the same key, or append it.
    pub fn upsert(&self, record: T) {
        let mut state = self.lock();
        let key = record.key();
        match state.records.iter().position(|r| r.key() == key) {
            Some(pos) => state.records[pos] = record,
            None => state.records.push(record),
        }
    }

    pub fn delete(&self, key: &Key) {
        self.lock().records.retain(|r| &r.key() != key);
    }

    pub fn calls(&self) -> Vec<FetchCall> {
        self.lock().calls.clone()
    }

    fn lock(&self) -> MutexGuard<'_, FakeState<T>> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Log the call and report latency/failure without holding the lock.
    fn begin(&self, call: FetchCall) -> (Option<Duration>, bool) {
        let mut state = self.lock();
        state.calls.push(call);
        (state.latency, state.failing)
    }
}

async fn simulate(latency: Option<Duration>, failing: bool) -> Result<()> {
    if let Some(latency) = latency {
        tokio::time::sleep(latency).await;
    }
    if failing {
        return Err(anyhow!("fake server unavailable (503)"));
    }
    Ok(())
}

#[async_trait]
impl<T: Record> EntitySource<T> for FakeSource<T> {
    async fn fetch_all(&self) -> Result<Vec<T>> {
        let (latency, failing) = self.begin(FetchCall::All);
        simulate(latency, failing).await?;
        Ok(self.lock().records.clone())
    }

    async fn fetch_range(&self, start: usize, length: usize) -> Result<Page<T>> {
        let (latency, failing) = self.begin(FetchCall::Range { start, length });
        simulate(latency, failing).await?;

        let state = self.lock();
        let data = state.records.iter().skip(start).take(length).cloned().collect();
        Ok(Page {
            total: state.records.len(),
            data,
        })
    }

    async fn fetch_by_ids(&self, ids: &[Key]) -> Result<Vec<T>> {
        let (latency, failing) = self.begin(FetchCall::Ids(ids.to_vec()));
        simulate(latency, failing).await?;

        Ok(self
            .lock()
            .records
            .iter()
            .filter(|r| ids.contains(&r.key()))
            .cloned()
            .collect())
    }
}

/// In-memory server for a single value.
pub struct FakeItemSource<T> {
    value: Mutex<T>,
    failing: Mutex<bool>,
}

impl<T: Clone + Send + Sync + 'static> FakeItemSource<T> {
    pub fn new(value: T) -> Self {
        Self {
            value: Mutex::new(value),
            failing: Mutex::new(false),
        }
    }

    pub fn set(&self, value: T) {
        *self.value.lock().unwrap_or_else(|p| p.into_inner()) = value;
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap_or_else(|p| p.into_inner()) = failing;
    }
}

#[async_trait]
impl<T: Clone + Send + Sync + 'static> ItemSource<T> for FakeItemSource<T> {
    async fn fetch(&self) -> Result<T> {
        let failing = *self.failing.lock().unwrap_or_else(|p| p.into_inner());
        if failing {
            return Err(anyhow!("fake server unavailable (503)"));
        }
        Ok(self.value.lock().unwrap_or_else(|p| p.into_inner()).clone())
    }
}

/// Records every handler invocation the bus makes.
#[derive(Clone, Default)]
pub struct HandlerLog {
    entries: Arc<Mutex<Vec<(Operation, Vec<Key>)>>>,
}

impl HandlerLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handlers for all three slots that append to this log.
    pub fn handlers(&self) -> ResourceHandlers {
        let (any, update, delete) = (self.clone(), self.clone(), self.clone());
        ResourceHandlers::new()
            .on_any(move || {
                any.push(Operation::Any, Vec::new());
                Ok(())
            })
            .on_update(move |ids| {
                update.push(Operation::Update, ids.to_vec());
                Ok(())
            })
            .on_delete(move |ids| {
                delete.push(Operation::Delete, ids.to_vec());
                Ok(())
            })
    }

    pub fn entries(&self) -> Vec<(Operation, Vec<Key>)> {
        self.lock().clone()
    }

    /// Invocations of one slot.
    pub fn calls(&self, operation: Operation) -> Vec<Vec<Key>> {
        self.lock()
            .iter()
            .filter(|(op, _)| *op == operation)
            .map(|(_, ids)| ids.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn push(&self, operation: Operation, ids: Vec<Key>) {
        self.lock().push((operation, ids));
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(Operation, Vec<Key>)>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
