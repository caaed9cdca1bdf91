//! Fixed-capacity event history for late-viewer replay
//!
//! Append-only ring: once full, each append evicts the oldest entry.
//! Everything happens under one mutex; readers copy out before releasing.
//! Reads are rare (a viewer connecting), so write-side simplicity wins.

use std::collections::VecDeque;
use std::sync::Mutex;

use super::types::MonitorEvent;

/// Default ring capacity (events)
pub const DEFAULT_RING_CAPACITY: usize = 1000;

pub struct EventRing {
    inner: Mutex<VecDeque<MonitorEvent>>,
    capacity: usize,
}

impl EventRing {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Append an event, evicting the oldest entry when at capacity
    pub fn append(&self, event: MonitorEvent) {
        let mut inner = self.inner.lock().expect("ring lock poisoned");
        if inner.len() == self.capacity {
            inner.pop_front();
        }
        inner.push_back(event);
    }

    /// Ordered copy of the current contents, oldest first
    pub fn snapshot(&self) -> Vec<MonitorEvent> {
        let inner = self.inner.lock().expect("ring lock poisoned");
        inner.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("ring lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventRing {
    fn default() -> Self {
        Self::new(DEFAULT_RING_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::types::EventPayload;

    fn event(task_id: &str) -> MonitorEvent {
        MonitorEvent::new(task_id, EventPayload::OrchestratorCompleted)
    }

    #[test]
    fn test_append_and_snapshot_order() {
        let ring = EventRing::new(10);
        for i in 0..5 {
            ring.append(event(&format!("T{i}")));
        }

        let snapshot = ring.snapshot();
        assert_eq!(snapshot.len(), 5);
        for (i, entry) in snapshot.iter().enumerate() {
            assert_eq!(entry.task_id, format!("T{i}"));
        }
    }

    #[test]
    fn test_eviction_is_strictly_fifo() {
        let ring = EventRing::new(3);
        for i in 0..4 {
            ring.append(event(&format!("T{i}")));
        }

        // The (capacity+1)-th append discarded the oldest element
        let snapshot = ring.snapshot();
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot[0].task_id, "T1");
        assert_eq!(snapshot[1].task_id, "T2");
        assert_eq!(snapshot[2].task_id, "T3");
    }

    #[test]
    fn test_len_is_min_of_count_and_capacity() {
        let ring = EventRing::new(8);
        for published in 1..=20 {
            ring.append(event("T"));
            assert_eq!(ring.len(), published.min(8));
        }
    }

    #[test]
    fn test_capacity_one() {
        let ring = EventRing::new(1);
        ring.append(event("a"));
        ring.append(event("b"));
        let snapshot = ring.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].task_id, "b");
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let ring = EventRing::new(4);
        ring.append(event("a"));
        let snapshot = ring.snapshot();
        ring.append(event("b"));
        assert_eq!(snapshot.len(), 1);
        assert_eq!(ring.len(), 2);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn ring_never_exceeds_capacity(capacity in 1usize..64, count in 0usize..256) {
                let ring = EventRing::new(capacity);
                for i in 0..count {
                    ring.append(event(&format!("T{i}")));
                }
                prop_assert_eq!(ring.len(), count.min(capacity));

                // Survivors are the most recent `min(count, capacity)` in order
                let snapshot = ring.snapshot();
                let first = count.saturating_sub(capacity);
                for (offset, entry) in snapshot.iter().enumerate() {
                    prop_assert_eq!(&entry.task_id, &format!("T{}", first + offset));
                }
            }
        }
    }
}
