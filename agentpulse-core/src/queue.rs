//! Bounded in-memory event queue
//!
//! Ordered FIFO buffer of pending events. When full, the oldest event is
//! evicted to make room (the pipeline prefers fresh telemetry over old).
//!
//! Delivery uses a peek-then-remove lifecycle rather than a destructive
//! drain: events stay queued while a batch is in flight and are removed
//! only for the identifiers the collector accepted. A crash or failed
//! attempt leaves them in place for the next cycle.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::event::TaskEvent;

/// Thread-safe bounded queue of pending events.
///
/// The lock is held only for short, non-blocking critical sections and
/// never across an await point.
pub struct EventQueue {
    events: Mutex<VecDeque<TaskEvent>>,
    capacity: usize,
    /// Total events ever enqueued
    enqueued: AtomicU64,
    /// Total events evicted due to a full queue
    evicted: AtomicU64,
}

impl EventQueue {
    /// Create a queue holding at most `capacity` events
    pub fn new(capacity: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            enqueued: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<TaskEvent>> {
        // A poisoned queue lock only means another thread panicked while
        // holding it; the VecDeque itself is still coherent.
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an event, evicting the oldest one if the queue is full.
    ///
    /// Never blocks and never fails; returns the evicted event so the
    /// caller can log the loss.
    pub fn push(&self, event: TaskEvent) -> Option<TaskEvent> {
        let mut events = self.lock();

        let displaced = if events.len() >= self.capacity {
            events.pop_front()
        } else {
            None
        };
        events.push_back(event);

        self.enqueued.fetch_add(1, Ordering::Relaxed);
        if displaced.is_some() {
            self.evicted.fetch_add(1, Ordering::Relaxed);
        }

        displaced
    }

    /// Clone up to `count` of the oldest events without removing them.
    ///
    /// Repeatable: calling twice with no interleaved mutation returns the
    /// same events in the same order.
    pub fn peek(&self, count: usize) -> Vec<TaskEvent> {
        let events = self.lock();
        events.iter().take(count).cloned().collect()
    }

    /// Remove the named events wherever they sit in the queue.
    ///
    /// Retried batches interleave with new pushes, so the targets are not
    /// necessarily a prefix. Unknown identifiers are ignored. Returns the
    /// number of events removed.
    pub fn remove(&self, ids: &[String]) -> usize {
        if ids.is_empty() {
            return 0;
        }
        let targets: HashSet<&str> = ids.iter().map(String::as_str).collect();

        let mut events = self.lock();
        let before = events.len();
        events.retain(|e| !targets.contains(e.id.as_str()));
        before - events.len()
    }

    /// Drop everything, returning how many events were discarded
    pub fn clear(&self) -> usize {
        let mut events = self.lock();
        let count = events.len();
        events.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total events ever enqueued
    pub fn total_enqueued(&self) -> u64 {
        self.enqueued.load(Ordering::Relaxed)
    }

    /// Total events evicted due to a full queue
    pub fn total_evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::TaskReport;

    fn make_event(n: usize) -> TaskEvent {
        TaskEvent::from_report(TaskReport::success(format!("task-{}", n), 100), "agent-test")
    }

    #[test]
    fn test_push_and_peek_preserve_order() {
        let queue = EventQueue::new(10);
        for n in 0..5 {
            assert!(queue.push(make_event(n)).is_none());
        }

        assert_eq!(queue.len(), 5);

        let peeked = queue.peek(3);
        assert_eq!(peeked.len(), 3);
        assert_eq!(peeked[0].task_id, "task-0");
        assert_eq!(peeked[2].task_id, "task-2");

        // Peek does not consume
        assert_eq!(queue.len(), 5);
    }

    #[test]
    fn test_peek_is_repeatable() {
        let queue = EventQueue::new(10);
        for n in 0..4 {
            queue.push(make_event(n));
        }

        let first = queue.peek(10);
        let second = queue.peek(10);

        assert_eq!(first.len(), 4);
        let first_ids: Vec<_> = first.iter().map(|e| e.id.clone()).collect();
        let second_ids: Vec<_> = second.iter().map(|e| e.id.clone()).collect();
        assert_eq!(first_ids, second_ids);
    }

    #[test]
    fn test_overflow_evicts_oldest() {
        let queue = EventQueue::new(3);

        // Push 5 events into a queue of size 3
        for n in 0..5 {
            let displaced = queue.push(make_event(n));
            if n < 3 {
                assert!(displaced.is_none());
            } else {
                // task-0 then task-1 get pushed out
                let evicted = displaced.unwrap();
                assert_eq!(evicted.task_id, format!("task-{}", n - 3));
            }
        }

        assert_eq!(queue.len(), 3);

        // Survivors are the last 3, oldest first
        let remaining = queue.peek(10);
        assert_eq!(remaining[0].task_id, "task-2");
        assert_eq!(remaining[1].task_id, "task-3");
        assert_eq!(remaining[2].task_id, "task-4");
    }

    #[test]
    fn test_len_never_exceeds_capacity() {
        let queue = EventQueue::new(7);
        for n in 0..100 {
            queue.push(make_event(n));
            assert!(queue.len() <= 7);
        }
        assert_eq!(queue.len(), 7);
    }

    #[test]
    fn test_remove_mid_queue_events() {
        let queue = EventQueue::new(10);
        let mut ids = Vec::new();
        for n in 0..5 {
            let event = make_event(n);
            ids.push(event.id.clone());
            queue.push(event);
        }

        // Remove two from the middle, not a prefix
        let removed = queue.remove(&[ids[1].clone(), ids[3].clone()]);
        assert_eq!(removed, 2);
        assert_eq!(queue.len(), 3);

        let remaining = queue.peek(10);
        assert_eq!(remaining[0].task_id, "task-0");
        assert_eq!(remaining[1].task_id, "task-2");
        assert_eq!(remaining[2].task_id, "task-4");
    }

    #[test]
    fn test_remove_ignores_unknown_ids() {
        let queue = EventQueue::new(10);
        queue.push(make_event(0));

        let removed = queue.remove(&["no-such-id".to_string()]);
        assert_eq!(removed, 0);
        assert_eq!(queue.len(), 1);

        let removed = queue.remove(&[]);
        assert_eq!(removed, 0);
    }

    #[test]
    fn test_clear_reports_discarded_count() {
        let queue = EventQueue::new(10);
        for n in 0..4 {
            queue.push(make_event(n));
        }

        assert_eq!(queue.clear(), 4);
        assert!(queue.is_empty());
        assert_eq!(queue.clear(), 0);
    }

    #[test]
    fn test_counters_track_enqueued_and_evicted() {
        let queue = EventQueue::new(2);
        for n in 0..5 {
            queue.push(make_event(n));
        }

        assert_eq!(queue.total_enqueued(), 5);
        assert_eq!(queue.total_evicted(), 3);
        assert_eq!(queue.capacity(), 2);
    }
}
