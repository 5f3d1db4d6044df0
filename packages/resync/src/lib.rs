//! # Resync
//!
//! The client-side synchronization core of a data-heavy app: containers that
//! track the fetch lifecycle of remote data, a windowed store that holds a
//! partially loaded remote collection, a tracker of records known to be stale,
//! and a debounced bus that turns server push notifications into handler calls.
//!
//! ## Core Concepts
//!
//! Resync separates **what is loaded** from **what is true on the server**:
//! - [`ContainerState`] = Where a container is in its fetch lifecycle
//! - [`DirtySet`] = Which loaded records the server has since changed
//! - [`PushEvent`] = A server notification that something changed
//!
//! ## Architecture
//!
//! ```text
//! Server push (WebSocket/SSE)
//!     │
//!     ▼ emit() / ingest_json()
//! PushBus ─── mpsc ───► bus task
//!                           │
//!                           ▼ Debouncer (quiet period)
//!                       group() by resource type
//!                           │
//!                           ▼ deliver()
//!                   ResourceHandlers (any / update / delete)
//!                           │
//!        ┌──────────────────┴──────────────────┐
//!        ▼                                     ▼
//!   mark_dirty / remove                 request_by_ids
//!        │                                     │
//!        ▼                                     ▼
//!   Store ── Mutex<container> ◄── resolve ── EntitySource
//!        │
//!        ▼ snapshot()
//!      UI
//! ```
//!
//! ## Key Invariants
//!
//! 1. **Transitions are explicit** - Every state change goes through [`ContainerState::next`]
//! 2. **Windows never duplicate** - A key occupies at most one slot
//! 3. **Dirty is cleared only by fetched data** - Failures leave dirty ids in place
//! 4. **Bursts coalesce** - Events arriving within the quiet period reach handlers once
//! 5. **Handlers are isolated** - A failing or panicking handler never stops delivery
//!
//! ## Example
//!
//! ```ignore
//! use resync::{EntityStore, PushBus, PushEvent, SyncConfig};
//!
//! let movies = EntityStore::new("movie", MoviesApi::new(client));
//! movies.request_range(0, 25).await;
//!
//! let bus = PushBus::new(SyncConfig::from_env()?);
//! bus.register("movie", movies.refreshing_handlers());
//! bus.init();
//!
//! // From the socket reader:
//! bus.ingest_json(r#"{"resourceType":"movie","operation":"update","ids":[3,4]}"#)?;
//! ```

// Core modules
mod bus;
mod config;
mod debounce;
mod dirty;
mod entity;
mod error;
mod event;
mod item;
mod key;
mod list;
mod router;
mod source;
mod state;
mod store;
mod window;

// Testing utilities (feature-gated)
#[cfg(any(test, feature = "testing"))]
pub mod testing;


// Re-export lifecycle types
pub use state::{ContainerState, Lifecycle, Transition};

// Re-export container types
pub use dirty::DirtySet;
pub use entity::{EntityContent, EntitySet, EntitySnapshot};
pub use item::{ItemContainer, ItemSnapshot};
pub use list::{ListContainer, ListSnapshot};
pub use window::{Slot, WindowedIndex};

// Re-export store types
pub use source::{EntitySource, ItemSource, Page};
pub use store::{EntityStore, ItemStore, ListStore, Store};

// Re-export key types
pub use key::{keys, Key, Record};

// Re-export push types
pub use bus::PushBus;
pub use debounce::Debouncer;
pub use event::{Operation, PushEvent};
pub use router::{deliver, group, DeliveryReport, Registration, ResourceBatch, ResourceHandlers, Router};

// Re-export error and config types
pub use config::{SyncConfig, DEFAULT_BACKLOG_WARNING, DEFAULT_DEBOUNCE};
pub use error::SyncError;

// Re-export commonly used external types
pub use async_trait::async_trait;
