//! Quiet-period batching.
//!
//! A [`Debouncer`] buffers items and keeps a deadline that moves forward on
//! every push. Once the deadline passes without a new push, the whole buffer
//! is released in arrival order. It holds no timer of its own: the owner asks
//! for [`Debouncer::deadline`] and sleeps until then, which keeps it
//! deterministic under tokio's paused clock.

use std::time::Duration;

use tokio::time::Instant;

/// Buffer released after a quiet period.
#[derive(Debug)]
pub struct Debouncer<T> {
    window: Duration,
    pending: Vec<T>,
    deadline: Option<Instant>,
}

impl<T> Debouncer<T> {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: Vec::new(),
            deadline: None,
        }
    }

    /// Buffer `item` and restart the quiet period from `now`.
    pub fn push(&mut self, item: T, now: Instant) {
        self.pending.push(item);
        self.deadline = Some(now + self.window);
    }

    /// When the buffer becomes ready, if anything is buffered.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Release the buffer if the quiet period has elapsed at `now`.
    pub fn take_ready(&mut self, now: Instant) -> Option<Vec<T>> {
        match self.deadline {
            Some(deadline) if deadline <= now => Some(self.take_all()),
            _ => None,
        }
    }

    /// Release the buffer regardless of the deadline.
    pub fn take_all(&mut self) -> Vec<T> {
        self.deadline = None;
        std::mem::take(&mut self.pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_millis(100);

    #[test]
    fn test_releases_after_quiet_period() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(WINDOW);
        debouncer.push(1, start);
        debouncer.push(2, start + Duration::from_millis(10));

        assert!(debouncer.take_ready(start + Duration::from_millis(100)).is_none());
        assert_eq!(
            debouncer.take_ready(start + Duration::from_millis(110)),
            Some(vec![1, 2])
        );
        assert!(debouncer.is_empty());
        assert!(debouncer.deadline().is_none());
    }

    #[test]
    fn test_each_push_moves_deadline() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(WINDOW);
        for i in 0..5_u64 {
            debouncer.push(i, start + Duration::from_millis(i * 50));
        }
        assert_eq!(
            debouncer.deadline(),
            Some(start + Duration::from_millis(300))
        );
        assert_eq!(debouncer.len(), 5);
    }

    #[test]
    fn test_empty_never_ready() {
        let mut debouncer: Debouncer<u8> = Debouncer::new(WINDOW);
        assert!(debouncer.take_ready(Instant::now()).is_none());
        assert!(debouncer.take_all().is_empty());
    }
}
