//! Container lifecycle state machine.
//!
//! Every container flavor (item, list, entity set) shares the same finite-state
//! contract:
//!
//! ```text
//!                 request                resolve
//! Uninitialized ──────────► Loading ───────────────► Succeeded ◄──┐
//!                             ▲  │                      │         │ settle (clean)
//!                     request │  │ reject     mark_dirty│         │
//!                             │  ▼                      ▼         │
//!                            Failed ─────────────────► Dirty ─────┘
//!                                       mark_dirty
//! ```
//!
//! `resolve` lands in `Dirty` instead of `Succeeded` when stale keys remain
//! after the fetch. Illegal transitions are rejected (`next` returns `None`) and
//! leave the state untouched; they are not errors, just no-ops.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::SyncError;

/// Lifecycle state of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerState {
    /// Nothing has been requested yet.
    #[default]
    Uninitialized,
    /// A fetch is in flight. Existing content is still readable.
    Loading,
    /// The last fetch succeeded and nothing is known to be stale.
    Succeeded,
    /// The last fetch failed. Existing content is retained.
    Failed,
    /// Some content is known to be stale and needs re-fetching.
    Dirty,
}

/// Inputs to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// A fetch was issued.
    Request,
    /// A fetch completed; `dirty_remaining` reports whether stale keys are left.
    Resolve { dirty_remaining: bool },
    /// A fetch failed.
    Reject,
    /// Some content was reported stale.
    MarkDirty,
    /// Content was removed; `dirty_remaining` reports whether stale keys are left.
    Settle { dirty_remaining: bool },
}

impl ContainerState {
    /// Compute the state reached by applying `transition`.
    ///
    /// Returns `None` when the transition is not legal from this state.
    pub fn next(self, transition: Transition) -> Option<ContainerState> {
        use ContainerState::*;

        match (self, transition) {
            (_, Transition::Request) => Some(Loading),

            // Nothing was ever requested, so nothing can resolve.
            (Uninitialized, Transition::Resolve { .. } | Transition::Reject) => None,
            (_, Transition::Resolve { dirty_remaining }) => {
                Some(if dirty_remaining { Dirty } else { Succeeded })
            }
            (_, Transition::Reject) => Some(Failed),

            (Succeeded | Failed | Dirty, Transition::MarkDirty) => Some(Dirty),
            (Uninitialized | Loading, Transition::MarkDirty) => None,

            (Dirty, Transition::Settle { dirty_remaining: false }) => Some(Succeeded),
            (state, Transition::Settle { .. }) => Some(state),
        }
    }

}

/// State plus the error of the last failed fetch.
#[derive(Debug, Clone, Default)]
pub struct Lifecycle {
    state: ContainerState,
    error: Option<SyncError>,
}

impl Lifecycle {
    /// A fresh, uninitialized lifecycle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    pub fn state(&self) -> ContainerState {
        self.state
    }

    /// Error recorded by the last failed fetch, if the container is still failed.
    pub fn error(&self) -> Option<&SyncError> {
        self.error.as_ref()
    }

    /// Apply a transition. Returns whether it was accepted.
    ///
    /// `Request` and `Resolve` clear the recorded error, so a fetch that
    /// succeeds after an overlapping one failed leaves no stale error behind.
    pub fn apply(&mut self, transition: Transition) -> bool {
        match self.state.next(transition) {
            Some(next) => {
                trace!(from = ?self.state, to = ?next, ?transition, "container transition");
                if matches!(transition, Transition::Request | Transition::Resolve { .. }) {
                    self.error = None;
                }
                self.state = next;
                true
            }
            None => {
                trace!(state = ?self.state, ?transition, "transition ignored");
                false
            }
        }
    }

    /// Record a failed fetch.
    pub fn fail(&mut self, error: SyncError) -> bool {
        if self.apply(Transition::Reject) {
            self.error = Some(error);
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ContainerState::*;

    #[test]
    fn test_happy_path() {
        let mut lc = Lifecycle::new();
        assert_eq!(lc.state(), Uninitialized);

        assert!(lc.apply(Transition::Request));
        assert_eq!(lc.state(), Loading);

        assert!(lc.apply(Transition::Resolve {
            dirty_remaining: false
        }));
        assert_eq!(lc.state(), Succeeded);
    }

    #[test]
    fn test_mark_dirty_ignored_before_first_load_and_while_loading() {
        assert_eq!(Uninitialized.next(Transition::MarkDirty), None);
        assert_eq!(Loading.next(Transition::MarkDirty), None);
        assert_eq!(Succeeded.next(Transition::MarkDirty), Some(Dirty));
        assert_eq!(Failed.next(Transition::MarkDirty), Some(Dirty));
        assert_eq!(Dirty.next(Transition::MarkDirty), Some(Dirty));
    }

    #[test]
    fn test_resolve_with_remaining_dirty_keys() {
        assert_eq!(
            Loading.next(Transition::Resolve {
                dirty_remaining: true
            }),
            Some(Dirty)
        );
    }

    #[test]
    fn test_failed_can_retry() {
        let mut lc = Lifecycle::new();
        lc.apply(Transition::Request);
        assert!(lc.fail(SyncError::BusNotRunning));
        assert_eq!(lc.state(), Failed);
        assert!(lc.error().is_some());

        assert!(lc.apply(Transition::Request));
        assert_eq!(lc.state(), Loading);
        assert!(lc.error().is_none(), "request clears the error");
    }

    #[test]
    fn test_resolve_clears_error_of_overlapping_failure() {
        let mut lc = Lifecycle::new();
        lc.apply(Transition::Request);
        lc.apply(Transition::Request);

        assert!(lc.fail(SyncError::BusNotRunning));
        assert!(lc.apply(Transition::Resolve {
            dirty_remaining: false
        }));

        assert_eq!(lc.state(), Succeeded);
        assert!(lc.error().is_none());
    }

    #[test]
    fn test_reject_requires_prior_request() {
        let mut lc = Lifecycle::new();
        assert!(!lc.fail(SyncError::BusNotRunning));
        assert_eq!(lc.state(), Uninitialized);
        assert!(lc.error().is_none());
    }

    #[test]
    fn test_settle_only_leaves_dirty_when_clean() {
        assert_eq!(
            Dirty.next(Transition::Settle {
                dirty_remaining: false
            }),
            Some(Succeeded)
        );
        assert_eq!(
            Dirty.next(Transition::Settle {
                dirty_remaining: true
            }),
            Some(Dirty)
        );
        assert_eq!(
            Failed.next(Transition::Settle {
                dirty_remaining: false
            }),
            Some(Failed)
        );
    }
}
