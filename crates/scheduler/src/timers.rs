//! Timer queue with cancellation.
//!
//! Deadlines live in a min-heap of `(deadline, id)`. Cancelling removes the
//! payload; the heap entry is discarded when it reaches the head. IDs are
//! issued in increasing order, so timers with equal deadlines expire in the
//! order they were scheduled.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap};
use std::time::{Duration, Instant};

/// Upper bound used when a delay would overflow `Instant`; roughly 30 years.
const FAR_FUTURE: Duration = Duration::from_secs(946_080_000);

/// Handle to a scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

impl std::fmt::Display for TimerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "timer-{}", self.0)
    }
}

/// Pending timers carrying a payload of type `T`.
#[derive(Debug)]
pub struct TimerQueue<T> {
    heap: BinaryHeap<Reverse<(Instant, TimerId)>>,
    pending: BTreeMap<TimerId, T>,
    next_id: u64,
}

impl<T> TimerQueue<T> {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            pending: BTreeMap::new(),
            next_id: 0,
        }
    }

    /// Schedule a payload at an absolute deadline.
    pub fn schedule_at(&mut self, deadline: Instant, payload: T) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        self.heap.push(Reverse((deadline, id)));
        self.pending.insert(id, payload);
        id
    }

    /// Schedule a payload `delay` after `now`.
    pub fn schedule_after(&mut self, now: Instant, delay: Duration, payload: T) -> TimerId {
        let deadline = now
            .checked_add(delay)
            .or_else(|| now.checked_add(FAR_FUTURE))
            .unwrap_or(now);
        self.schedule_at(deadline, payload)
    }

    /// Cancel a timer, returning its payload if it was still pending.
    pub fn cancel(&mut self, id: TimerId) -> Option<T> {
        self.pending.remove(&id)
    }

    /// Whether a timer is still pending.
    #[must_use]
    pub fn is_pending(&self, id: TimerId) -> bool {
        self.pending.contains_key(&id)
    }

    /// Pop the earliest timer whose deadline is at or before `now`.
    pub fn pop_due(&mut self, now: Instant) -> Option<(TimerId, T)> {
        while let Some(Reverse((deadline, id))) = self.heap.peek().copied() {
            if deadline > now {
                return None;
            }
            self.heap.pop();
            if let Some(payload) = self.pending.remove(&id) {
                return Some((id, payload));
            }
        }
        None
    }

    /// Deadline of the earliest pending timer.
    pub fn next_deadline(&mut self) -> Option<Instant> {
        while let Some(Reverse((deadline, id))) = self.heap.peek().copied() {
            if self.pending.contains_key(&id) {
                return Some(deadline);
            }
            self.heap.pop();
        }
        None
    }

    /// Payloads of all pending timers, in scheduling order.
    pub fn payloads(&self) -> impl Iterator<Item = &T> {
        self.pending.values()
    }

    /// Number of pending timers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether no timers are pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl<T> Default for TimerQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
