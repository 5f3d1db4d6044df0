//! Async drivers that run the fetch lifecycle of a container.
//!
//! A [`Store`] owns exactly one container behind a mutex and one fetch source.
//! Every mutation is synchronous and finishes while the lock is held; the lock
//! is never held across an `.await`. Suspension happens only at the fetch
//! boundary, which is what keeps concurrent fetches race-free: each resolution
//! is merged atomically, and the last one to resolve wins on overlapping slots.
//!
//! Fetch errors stay inside the store. Request methods return `()`; callers
//! read the outcome from [`Store::snapshot`].
//!
//! # Example
//!
//! ```ignore
//! let movies = EntityStore::new("movie", MoviesApi::new(client));
//!
//! movies.request_range(0, 25).await;
//! let snapshot = movies.snapshot();
//! for movie in snapshot.content.iter() {
//!     render(movie, snapshot.is_dirty(&movie.key()));
//! }
//!
//! // Keep it fresh from push events.
//! bus.register("movie", movies.refreshing_handlers());
//! ```

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, warn};

use crate::dirty::DirtySet;
use crate::entity::{EntitySet, EntitySnapshot};
use crate::error::SyncError;
use crate::item::{ItemContainer, ItemSnapshot};
use crate::key::{Key, Record};
use crate::list::{ListContainer, ListSnapshot};
use crate::router::ResourceHandlers;
use crate::source::{EntitySource, ItemSource};

/// A container plus the source that fills it.
pub struct Store<C, S> {
    name: Arc<str>,
    container: Arc<Mutex<C>>,
    source: Arc<S>,
}

/// Windowed, id-keyed collection store.
pub type EntityStore<T, S> = Store<EntitySet<T>, S>;

/// Unkeyed list store.
pub type ListStore<T, S> = Store<ListContainer<T>, S>;

/// Single-value store.
pub type ItemStore<T, S> = Store<ItemContainer<T>, S>;

impl<C, S> Clone for Store<C, S> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            container: self.container.clone(),
            source: self.source.clone(),
        }
    }
}

impl<C, S> std::fmt::Debug for Store<C, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").field("name", &self.name).finish()
    }
}

impl<C: Default, S> Store<C, S> {
    /// Create a store with an empty, uninitialized container.
    ///
    /// `name` is used in logs and in [`SyncError::FetchFailed`]; by convention it
    /// is the push resource type the store listens to.
    pub fn new(name: impl Into<String>, source: S) -> Self {
        Self {
            name: Arc::from(name.into()),
            container: Arc::new(Mutex::new(C::default())),
            source: Arc::new(source),
        }
    }
}

impl<C, S> Store<C, S> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The source this store fetches from.
    pub fn source(&self) -> &S {
        &self.source
    }

    fn lock(&self) -> MutexGuard<'_, C> {
        match self.container.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!(resource = %self.name, "container mutex was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn fetch_error(&self, operation: &'static str, error: &anyhow::Error) -> SyncError {
        warn!(resource = %self.name, operation, error = %format!("{error:#}"), "fetch failed");
        SyncError::fetch_failed(&self.name, error)
    }
}

// =============================================================================
// Keyed Stores
// =============================================================================

/// The fetch surface shared by the id-keyed containers.
///
/// Lives in a private module, so only [`EntitySet`] and [`ListContainer`]
/// implement it; it exists to let the store drive both with one set of
/// methods.
pub trait KeyedContainer: Default + Send + 'static {
    type Record: Record;

    fn begin_request(&mut self);
    fn reject(&mut self, error: SyncError);
    fn resolve_all(&mut self, data: Vec<Self::Record>);
    fn resolve_ids(&mut self, requested: &[Key], data: Vec<Self::Record>);
    fn mark_dirty(&mut self, ids: Vec<Key>) -> bool;
    fn remove(&mut self, ids: &[Key]) -> usize;
    fn dirty(&self) -> &DirtySet;
}

macro_rules! keyed_container {
    ($container:ident) => {
        impl<T: Record> KeyedContainer for $container<T> {
            type Record = T;

            fn begin_request(&mut self) {
                $container::begin_request(self)
            }

            fn reject(&mut self, error: SyncError) {
                $container::reject(self, error)
            }

            fn resolve_all(&mut self, data: Vec<T>) {
                $container::resolve_all(self, data)
            }

            fn resolve_ids(&mut self, requested: &[Key], data: Vec<T>) {
                $container::resolve_ids(self, requested, data)
            }

            fn mark_dirty(&mut self, ids: Vec<Key>) -> bool {
                $container::mark_dirty(self, ids)
            }

            fn remove(&mut self, ids: &[Key]) -> usize {
                $container::remove(self, ids)
            }

            fn dirty(&self) -> &DirtySet {
                $container::dirty(self)
            }
        }
    };
}

keyed_container!(EntitySet);
keyed_container!(ListContainer);

impl<C, S> Store<C, S>
where
    C: KeyedContainer,
    S: EntitySource<C::Record>,
{
    /// Fetch the complete collection and replace the container's content.
    pub async fn request_all(&self) {
        self.lock().begin_request();
        debug!(resource = %self.name, "requesting all");

        match self.source.fetch_all().await {
            Ok(data) => {
                debug!(resource = %self.name, returned = data.len(), "all resolved");
                self.lock().resolve_all(data);
            }
            Err(e) => {
                let error = self.fetch_error("fetch_all", &e);
                self.lock().reject(error);
            }
        }
    }

    /// Fetch specific records and merge whatever comes back.
    pub async fn request_by_ids(&self, ids: Vec<Key>) {
        if ids.is_empty() {
            return;
        }
        self.lock().begin_request();
        debug!(resource = %self.name, count = ids.len(), "requesting ids");

        match self.source.fetch_by_ids(&ids).await {
            Ok(data) => {
                debug!(
                    resource = %self.name,
                    requested = ids.len(),
                    returned = data.len(),
                    "ids resolved"
                );
                self.lock().resolve_ids(&ids, data);
            }
            Err(e) => {
                let error = self.fetch_error("fetch_by_ids", &e);
                self.lock().reject(error);
            }
        }
    }

    /// Re-fetch every key currently marked dirty.
    pub async fn refresh_dirty(&self) {
        let ids: Vec<Key> = self.lock().dirty().iter().cloned().collect();
        self.request_by_ids(ids).await;
    }

    pub fn mark_dirty(&self, ids: Vec<Key>) -> bool {
        let accepted = self.lock().mark_dirty(ids);
        if !accepted {
            debug!(resource = %self.name, "mark_dirty ignored");
        }
        accepted
    }

    pub fn remove(&self, ids: &[Key]) -> usize {
        self.lock().remove(ids)
    }

    /// Handlers that mark updated ids dirty and drop deleted ones.
    ///
    /// The UI decides when to re-fetch (e.g. via [`Store::refresh_dirty`]).
    pub fn push_handlers(&self) -> ResourceHandlers {
        self.keyed_handlers(false)
    }

    /// Like [`Store::push_handlers`], but also re-fetches updated ids right away.
    pub fn refreshing_handlers(&self) -> ResourceHandlers {
        self.keyed_handlers(true)
    }

    fn keyed_handlers(&self, refetch: bool) -> ResourceHandlers {
        let on_update = self.clone();
        let on_delete = self.clone();
        ResourceHandlers::new()
            .on_update(move |ids| {
                on_update.mark_dirty(ids.to_vec());
                if refetch {
                    let store = on_update.clone();
                    let ids = ids.to_vec();
                    tokio::spawn(async move { store.request_by_ids(ids).await });
                }
                Ok(())
            })
            .on_delete(move |ids| {
                on_delete.remove(ids);
                Ok(())
            })
    }
}

impl<T: Record, S: EntitySource<T>> Store<EntitySet<T>, S> {
    /// Fetch the window `[start, start + length)` and merge it.
    pub async fn request_range(&self, start: usize, length: usize) {
        self.lock().begin_request();
        debug!(resource = %self.name, start, length, "requesting range");

        match self.source.fetch_range(start, length).await {
            Ok(page) => {
                debug!(
                    resource = %self.name,
                    start,
                    length,
                    total = page.total,
                    returned = page.data.len(),
                    "range resolved"
                );
                self.lock().resolve_range(start, length, page);
            }
            Err(e) => {
                let error = self.fetch_error("fetch_range", &e);
                self.lock().reject(error);
            }
        }
    }

    /// Request the window only when it has pending or stale positions.
    ///
    /// Returns whether a fetch was issued.
    pub async fn ensure_range(&self, start: usize, length: usize) -> bool {
        let needed = self.lock().needs_refresh(start, length);
        if needed {
            self.request_range(start, length).await;
        }
        needed
    }

    pub fn needs_refresh(&self, start: usize, length: usize) -> bool {
        self.lock().needs_refresh(start, length)
    }

    pub fn snapshot(&self) -> EntitySnapshot<T> {
        self.lock().snapshot()
    }
}

impl<T: Record, S: EntitySource<T>> Store<ListContainer<T>, S> {
    pub fn snapshot(&self) -> ListSnapshot<T> {
        self.lock().snapshot()
    }
}

// =============================================================================
// Item Store
// =============================================================================

impl<T: Clone + Send + Sync + 'static, S: ItemSource<T>> Store<ItemContainer<T>, S> {
    pub async fn request(&self) {
        self.lock().begin_request();
        debug!(resource = %self.name, "requesting item");

        match self.source.fetch().await {
            Ok(value) => {
                debug!(resource = %self.name, "item resolved");
                self.lock().resolve(value);
            }
            Err(e) => {
                let error = self.fetch_error("fetch", &e);
                self.lock().reject(error);
            }
        }
    }

    pub fn mark_dirty(&self) -> bool {
        self.lock().mark_dirty()
    }

    pub fn remove(&self) -> bool {
        self.lock().remove()
    }

    pub fn snapshot(&self) -> ItemSnapshot<T> {
        self.lock().snapshot()
    }

    /// Any event for the resource marks the item stale.
    pub fn push_handlers(&self) -> ResourceHandlers {
        let store = self.clone();
        ResourceHandlers::new().on_any(move || {
            store.mark_dirty();
            Ok(())
        })
    }

    /// Any event for the resource re-fetches the item.
    pub fn refreshing_handlers(&self) -> ResourceHandlers {
        let store = self.clone();
        ResourceHandlers::new().on_any(move || {
            store.mark_dirty();
            let store = store.clone();
            tokio::spawn(async move { store.request().await });
            Ok(())
        })
    }
}
