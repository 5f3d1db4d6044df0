//! Single-item container (settings, system status, one detail record).

use crate::error::SyncError;
use crate::state::{ContainerState, Lifecycle, Transition};

/// One value with lifecycle state.
#[derive(Debug, Clone)]
pub struct ItemContainer<T> {
    lifecycle: Lifecycle,
    content: Option<T>,
}

impl<T> Default for ItemContainer<T> {
    fn default() -> Self {
        Self {
            lifecycle: Lifecycle::new(),
            content: None,
        }
    }
}

impl<T: Clone> ItemContainer<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ContainerState {
        self.lifecycle.state()
    }

    pub fn content(&self) -> Option<&T> {
        self.content.as_ref()
    }

    pub fn begin_request(&mut self) {
        self.lifecycle.apply(Transition::Request);
    }

    pub fn resolve(&mut self, value: T) {
        self.content = Some(value);
        self.lifecycle.apply(Transition::Resolve {
            dirty_remaining: false,
        });
    }

    pub fn reject(&mut self, error: SyncError) {
        self.lifecycle.fail(error);
    }

    /// The whole item is stale. Ignored before the first load and while loading.
    pub fn mark_dirty(&mut self) -> bool {
        self.lifecycle.apply(Transition::MarkDirty)
    }

    /// Drop the content (the server deleted it).
    pub fn remove(&mut self) -> bool {
        let removed = self.content.take().is_some();
        self.lifecycle.apply(Transition::Settle {
            dirty_remaining: false,
        });
        removed
    }

    pub fn snapshot(&self) -> ItemSnapshot<T> {
        ItemSnapshot {
            state: self.state(),
            error: self.lifecycle.error().cloned(),
            content: self.content.clone(),
        }
    }
}

/// Read-only copy of an [`ItemContainer`].
#[derive(Debug, Clone)]
pub struct ItemSnapshot<T> {
    pub state: ContainerState,
    pub error: Option<SyncError>,
    pub content: Option<T>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stale_while_revalidate() {
        let mut item = ItemContainer::new();
        item.begin_request();
        item.resolve("v1.4.2".to_string());

        assert!(item.mark_dirty());
        assert_eq!(item.state(), ContainerState::Dirty);

        item.begin_request();
        assert_eq!(item.content().map(String::as_str), Some("v1.4.2"));

        item.resolve("v1.4.3".to_string());
        assert_eq!(item.state(), ContainerState::Succeeded);
        assert_eq!(item.content().map(String::as_str), Some("v1.4.3"));
    }

    #[test]
    fn test_mark_dirty_before_load_is_noop() {
        let mut item: ItemContainer<String> = ItemContainer::new();
        assert!(!item.mark_dirty());
        assert_eq!(item.state(), ContainerState::Uninitialized);
    }

    #[test]
    fn test_remove_settles_dirty_item() {
        let mut item = ItemContainer::new();
        item.begin_request();
        item.resolve(3_u8);
        item.mark_dirty();

        assert!(item.remove());
        let snap = item.snapshot();
        assert_eq!(snap.state, ContainerState::Succeeded);
        assert!(snap.content.is_none());
    }
}
