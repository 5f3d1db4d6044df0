//! Fetch collaborators.
//!
//! The HTTP client and endpoint wrappers are outside this crate. Stores talk to
//! them through these traits, which are plain async functions returning typed
//! payloads.
//!
//! # Example
//!
//! ```ignore
//! use resync::{async_trait, EntitySource, Key, Page};
//!
//! struct MoviesApi {
//!     client: reqwest::Client,
//! }
//!
//! #[async_trait]
//! impl EntitySource<Movie> for MoviesApi {
//!     async fn fetch_range(&self, start: usize, length: usize) -> anyhow::Result<Page<Movie>> {
//!         let page = self
//!             .client
//!             .get("/api/movies")
//!             .query(&[("start", start), ("length", length)])
//!             .send()
//!             .await?
//!             .json()
//!             .await?;
//!         Ok(page)
//!     }
//!
//!     async fn fetch_by_ids(&self, ids: &[Key]) -> anyhow::Result<Vec<Movie>> {
//!         // ...
//!     }
//! }
//! ```

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SyncError;
use crate::key::Key;

/// One page of a range query plus the collection's current total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub total: usize,
    pub data: Vec<T>,
}

/// Source for id-keyed collections.
///
/// Implement only the operations the endpoint offers; the rest report
/// [`SyncError::Unsupported`], which the store records like any failed fetch.
#[async_trait]
pub trait EntitySource<T>: Send + Sync + 'static {
    /// The complete collection.
    async fn fetch_all(&self) -> Result<Vec<T>> {
        Err(SyncError::Unsupported {
            operation: "fetch_all",
        }
        .into())
    }

    /// Records `[start, start + length)` and the current total.
    async fn fetch_range(&self, _start: usize, _length: usize) -> Result<Page<T>> {
        Err(SyncError::Unsupported {
            operation: "fetch_range",
        }
        .into())
    }

    /// Whichever of `ids` still exist. Missing ids are not an error.
    async fn fetch_by_ids(&self, _ids: &[Key]) -> Result<Vec<T>> {
        Err(SyncError::Unsupported {
            operation: "fetch_by_ids",
        }
        .into())
    }
}

/// Source for a single value.
#[async_trait]
pub trait ItemSource<T>: Send + Sync + 'static {
    async fn fetch(&self) -> Result<T>;
}
