use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Single-slot handoff between one producer and one consumer.
///
/// `publish` overwrites whatever is waiting; `take_latest` empties the
/// slot. The producer never waits on the consumer beyond the short
/// critical section of a swap, and nothing ever queues behind the slot,
/// so a slow consumer sees stale frames skipped rather than lag building
/// up.
pub struct LatestValueBuffer<T> {
    slot: Mutex<Option<T>>,
    published: AtomicU64,
    overwritten: AtomicU64,
}

impl<T> LatestValueBuffer<T> {
    pub const fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            published: AtomicU64::new(0),
            overwritten: AtomicU64::new(0),
        }
    }

    /// Replace the slot contents. Returns `true` if an unconsumed value
    /// was discarded.
    pub fn publish(&self, value: T) -> bool {
        let previous = self.lock().replace(value);
        self.published.fetch_add(1, Ordering::Relaxed);
        if previous.is_some() {
            self.overwritten.fetch_add(1, Ordering::Relaxed);
            log::trace!("latest-value slot overwritten before it was taken");
            true
        } else {
            false
        }
    }

    /// Empty the slot and return what was in it.
    pub fn take_latest(&self) -> Option<T> {
        self.lock().take()
    }

    /// Whether a value is waiting.
    pub fn is_pending(&self) -> bool {
        self.lock().is_some()
    }

    /// Total values ever published.
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Values replaced before the consumer took them.
    pub fn overwritten(&self) -> u64 {
        self.overwritten.load(Ordering::Relaxed)
    }

    // Neither side can leave the Option half-written, so a poisoned lock
    // still guards a consistent value.
    fn lock(&self) -> MutexGuard<'_, Option<T>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Clone> LatestValueBuffer<T> {
    /// Copy of the waiting value, leaving it in place.
    pub fn peek(&self) -> Option<T> {
        self.lock().clone()
    }
}

impl<T> Default for LatestValueBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Grid, ZONE_COUNT};
    use std::sync::Arc;
    use std::thread;

    fn grid_of(mm: f32) -> Grid {
        Grid::new([Some(mm); ZONE_COUNT])
    }

    #[test]
    fn test_starts_empty() {
        let buffer: LatestValueBuffer<Grid> = LatestValueBuffer::new();
        assert!(!buffer.is_pending());
        assert_eq!(buffer.take_latest(), None);
    }

    #[test]
    fn test_second_publish_overwrites_first() {
        let buffer = LatestValueBuffer::new();
        assert!(!buffer.publish(grid_of(100.0)));
        assert!(buffer.publish(grid_of(200.0)));

        assert_eq!(buffer.take_latest(), Some(grid_of(200.0)));
        assert_eq!(buffer.take_latest(), None);
        assert_eq!(buffer.published(), 2);
        assert_eq!(buffer.overwritten(), 1);
    }

    #[test]
    fn test_take_consumes_once() {
        let buffer = LatestValueBuffer::new();
        buffer.publish(grid_of(50.0));
        assert!(buffer.take_latest().is_some());
        assert!(buffer.take_latest().is_none());
    }

    #[test]
    fn test_peek_does_not_consume() {
        let buffer = LatestValueBuffer::new();
        buffer.publish(grid_of(75.0));
        assert_eq!(buffer.peek(), Some(grid_of(75.0)));
        assert_eq!(buffer.take_latest(), Some(grid_of(75.0)));
        assert_eq!(buffer.peek(), None);
    }

    #[test]
    fn test_concurrent_producer_and_consumer() {
        const FRAMES: u32 = 10_000;
        let buffer = Arc::new(LatestValueBuffer::new());

        let producer = {
            let buffer = buffer.clone();
            thread::spawn(move || {
                for i in 1..=FRAMES {
                    buffer.publish(i);
                }
            })
        };

        // Values must come out in increasing order even when many are skipped.
        let mut last_seen = 0;
        while last_seen < FRAMES {
            if let Some(v) = buffer.take_latest() {
                assert!(v > last_seen, "{} after {}", v, last_seen);
                last_seen = v;
            } else {
                thread::yield_now();
            }
        }

        producer.join().unwrap();
        assert_eq!(buffer.published(), FRAMES as u64);
        assert_eq!(buffer.take_latest(), None);
    }
}
