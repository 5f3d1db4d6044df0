//! Structured error types for resync.
//!
//! `SyncError` provides pattern-matchable errors instead of generic `anyhow::Error`.
//!
//! # The Error Boundary Rule
//!
//! > **No fetch error ever crosses the store boundary.**
//!
//! - `anyhow` is internal transport (ergonomic for fetch collaborators)
//! - `SyncError` is what a container records and what snapshots expose
//!
//! A store converts a failed fetch into [`SyncError::FetchFailed`], records it
//! in the container and moves the container to `Failed`. Callers observe the
//! failure through the snapshot, never through a returned `Err`.
//!
//! # Example
//!
//! ```ignore
//! use resync::{ContainerState, SyncError};
//!
//! store.request_range(0, 25).await;
//! let snapshot = store.snapshot();
//! if snapshot.state == ContainerState::Failed {
//!     match &snapshot.error {
//!         Some(SyncError::FetchFailed { message, .. }) => show_banner(message),
//!         Some(other) => show_banner(&other.to_string()),
//!         None => {}
//!     }
//! }
//! ```

use thiserror::Error;

use crate::event::Operation;

/// Errors produced by the synchronization core.
///
/// Every variant is `Clone` so it can be stored inside a container and handed
/// out in snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// A fetch collaborator returned an error.
    ///
    /// Recorded in the container; previously loaded content is retained.
    #[error("fetch for {resource} failed: {message}")]
    FetchFailed {
        /// Name of the store the fetch belonged to.
        resource: String,
        /// Rendered collaborator error (including its context chain).
        message: String,
    },

    /// The source does not implement the requested fetch operation.
    #[error("source does not support {operation}")]
    Unsupported {
        /// The fetch operation that was attempted.
        operation: &'static str,
    },

    /// A push event named a resource type with no registered handlers.
    ///
    /// Non-fatal; listed in the delivery report.
    #[error("no handlers registered for resource type {resource_type}")]
    UnroutedEvent {
        /// The unrouted resource type.
        resource_type: String,
    },

    /// A push handler returned an error or panicked.
    #[error("{operation} handler for {resource_type} failed: {message}")]
    HandlerFailed {
        /// Resource type being delivered.
        resource_type: String,
        /// Which handler slot failed.
        operation: Operation,
        /// Error or panic message.
        message: String,
    },

    /// A push payload could not be decoded.
    #[error("malformed push event: {message}")]
    MalformedEvent {
        /// Decoder message.
        message: String,
    },

    /// The bus was used before `init()` or after `shutdown()`.
    #[error("push bus is not running")]
    BusNotRunning,

    /// Invalid configuration value.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the offending setting.
        message: String,
    },
}

impl SyncError {
    /// Build a `FetchFailed` from a collaborator error.
    ///
    /// Uses the alternate formatting so the whole context chain survives.
    pub fn fetch_failed(resource: &str, error: &anyhow::Error) -> Self {
        // A collaborator may hand back one of ours (e.g. `Unsupported`) wrapped in anyhow.
        if let Some(sync) = error.downcast_ref::<SyncError>() {
            return sync.clone();
        }
        SyncError::FetchFailed {
            resource: resource.to_string(),
            message: format!("{error:#}"),
        }
    }

    /// Returns true for errors that come out of a fetch.
    pub fn is_fetch_error(&self) -> bool {
        matches!(
            self,
            SyncError::FetchFailed { .. } | SyncError::Unsupported { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_fetch_failed_keeps_context_chain() {
        let err = Err::<(), _>(anyhow::anyhow!("connection reset"))
            .context("GET /api/movies")
            .unwrap_err();

        let sync = SyncError::fetch_failed("movies", &err);
        match sync {
            SyncError::FetchFailed { resource, message } => {
                assert_eq!(resource, "movies");
                assert!(message.contains("GET /api/movies"));
                assert!(message.contains("connection reset"));
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn test_fetch_failed_unwraps_sync_error() {
        let err = anyhow::Error::new(SyncError::Unsupported {
            operation: "fetch_range",
        });

        let sync = SyncError::fetch_failed("series", &err);
        assert_eq!(
            sync,
            SyncError::Unsupported {
                operation: "fetch_range"
            }
        );
        assert!(sync.is_fetch_error());
    }

    #[test]
    fn test_display_messages() {
        assert_eq!(
            SyncError::UnroutedEvent {
                resource_type: "badges".into()
            }
            .to_string(),
            "no handlers registered for resource type badges"
        );
        assert_eq!(
            SyncError::BusNotRunning.to_string(),
            "push bus is not running"
        );
        assert!(!SyncError::BusNotRunning.is_fetch_error());
    }
}
