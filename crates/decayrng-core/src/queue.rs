//! Bounded FIFO of detected entropy values shared between the detection
//! thread (writer) and the protocol server (reader).

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use serde::Serialize;

/// Largest value a detection can produce.
pub const MAX_RESULT: u16 = 255;
/// Sentinel reported when the queue is empty. Never produced by a detection.
pub const INVALID_RESULT: u16 = MAX_RESULT + 1;
/// Default queue capacity.
pub const DEFAULT_CAPACITY: usize = 10_240;

/// One detected pulse: the reduced value plus the registry counter it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EntropyEntry {
    pub value: u16,
    pub source_counter: u32,
}

impl EntropyEntry {
    /// `(256, 0)`: "nothing available".
    pub const INVALID: Self = Self {
        value: INVALID_RESULT,
        source_counter: 0,
    };

    /// Derive an entry from a registry counter snapshot.
    pub fn from_counter(counter: u32) -> Self {
        Self {
            value: (counter % (MAX_RESULT as u32 + 1)) as u16,
            source_counter: counter,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.value <= MAX_RESULT
    }
}

/// Drop-oldest bounded queue behind a single mutex.
#[derive(Debug)]
pub struct EntropyQueue {
    entries: Mutex<VecDeque<EntropyEntry>>,
    capacity: usize,
}

impl EntropyQueue {
    /// Create an empty queue. A zero capacity is bumped to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn locked(&self) -> MutexGuard<'_, VecDeque<EntropyEntry>> {
        // Critical sections cannot leave the deque half-modified.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append an entry, evicting the oldest one when full.
    ///
    /// Returns the evicted entry, if any.
    pub fn push(&self, entry: EntropyEntry) -> Option<EntropyEntry> {
        let mut entries = self.locked();
        let evicted = if entries.len() >= self.capacity {
            entries.pop_front()
        } else {
            None
        };
        entries.push_back(entry);
        evicted
    }

    /// Remove and return the oldest entry. Emptiness check and removal happen
    /// under the same lock.
    pub fn pop(&self) -> Option<EntropyEntry> {
        self.locked().pop_front()
    }

    /// Current length. Stale as soon as it is returned.
    pub fn len(&self) -> usize {
        self.locked().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EntropyQueue {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_is_counter_mod_256() {
        assert_eq!(EntropyEntry::from_counter(10).value, 10);
        assert_eq!(EntropyEntry::from_counter(266).value, 10);
        assert_eq!(EntropyEntry::from_counter(520).value, 8);
        assert_eq!(EntropyEntry::from_counter(u32::MAX).value, 255);
        assert!(EntropyEntry::from_counter(u32::MAX).is_valid());
        assert!(!EntropyEntry::INVALID.is_valid());
    }

    #[test]
    fn pop_on_empty_returns_none() {
        let q = EntropyQueue::new(4);
        assert_eq!(q.pop(), None);
        assert!(q.is_empty());
    }

    #[test]
    fn overflow_evicts_oldest_and_keeps_order() {
        let q = EntropyQueue::new(3);
        for c in 0..3 {
            assert_eq!(q.push(EntropyEntry::from_counter(c)), None);
        }
        let evicted = q.push(EntropyEntry::from_counter(3));
        assert_eq!(evicted, Some(EntropyEntry::from_counter(0)));
        assert_eq!(q.len(), 3);

        let drained: Vec<u32> = std::iter::from_fn(|| q.pop())
            .map(|e| e.source_counter)
            .collect();
        assert_eq!(drained, vec![1, 2, 3]);
    }

    #[test]
    fn never_exceeds_capacity() {
        let q = EntropyQueue::new(DEFAULT_CAPACITY);
        for c in 0..(DEFAULT_CAPACITY as u32 * 2 + 7) {
            q.push(EntropyEntry::from_counter(c));
            assert!(q.len() <= DEFAULT_CAPACITY);
        }
        assert_eq!(q.len(), DEFAULT_CAPACITY);
        // Survivors are the newest entries, oldest first.
        let first = q.pop().map(|e| e.source_counter);
        assert_eq!(first, Some(DEFAULT_CAPACITY as u32 + 7));
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let q = EntropyQueue::new(0);
        q.push(EntropyEntry::from_counter(1));
        q.push(EntropyEntry::from_counter(2));
        assert_eq!(q.capacity(), 1);
        assert_eq!(q.pop().map(|e| e.source_counter), Some(2));
    }
}
