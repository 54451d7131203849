//! Discrete-event queue
//!
//! Events are kept in a binary heap ordered by firing time, then by the order
//! in which they were scheduled. Two events due at the same instant therefore
//! fire first-in, first-out.

use std::{cmp::Ordering, collections::BinaryHeap, time::Duration};

/// An event scheduled for execution at a specific simulation time.
#[derive(Debug, Clone)]
pub struct ScheduledEvent<E> {
    time: Duration,
    sequence: u64,
    event: E,
}

impl<E> ScheduledEvent<E> {
    /// Returns the scheduled execution time.
    pub fn time(&self) -> Duration {
        self.time
    }

    /// Returns a reference to the event.
    pub fn event(&self) -> &E {
        &self.event
    }
}

impl<E> PartialEq for ScheduledEvent<E> {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.sequence == other.sequence
    }
}

impl<E> Eq for ScheduledEvent<E> {}

impl<E> PartialOrd for ScheduledEvent<E> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<E> Ord for ScheduledEvent<E> {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max heap: reverse both keys so the earliest,
        // first-scheduled event is on top
        match other.time.cmp(&self.time) {
            Ordering::Equal => other.sequence.cmp(&self.sequence),
            other => other,
        }
    }
}

/// Priority queue of future events plus the current simulation time.
#[derive(Debug)]
pub struct EventQueue<E> {
    heap: BinaryHeap<ScheduledEvent<E>>,
    now: Duration,
    next_sequence: u64,
}

impl<E> EventQueue<E> {
    /// Creates a new empty event queue at time zero.
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            now: Duration::ZERO,
            next_sequence: 0,
        }
    }

    /// Current simulation time.
    pub fn now(&self) -> Duration {
        self.now
    }

    /// Schedules `event` to fire `delay` after now.
    pub fn schedule(&mut self, delay: Duration, event: E) {
        let at = self.now.saturating_add(delay);
        self.schedule_at(at, event);
    }

    /// Schedules `event` at an absolute time; times in the past fire now.
    pub fn schedule_at(&mut self, at: Duration, event: E) {
        let time = at.max(self.now);
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.heap.push(ScheduledEvent { time, sequence, event });
    }

    /// Removes the earliest event and advances the clock to its time.
    pub fn pop_next(&mut self) -> Option<(Duration, E)> {
        let scheduled = self.heap.pop()?;
        self.now = scheduled.time;
        Some((scheduled.time, scheduled.event))
    }

    /// Firing time of the earliest event, if any.
    pub fn peek_time(&self) -> Option<Duration> {
        self.heap.peek().map(|e| e.time)
    }

    /// Returns `true` if the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Returns the number of pending events.
    pub fn len(&self) -> usize {
        self.heap.len()
    }
}

impl<E> Default for EventQueue<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_order() {
        let mut queue = EventQueue::new();
        queue.schedule(Duration::from_nanos(30), "c");
        queue.schedule(Duration::from_nanos(10), "a");
        queue.schedule(Duration::from_nanos(20), "b");

        assert_eq!(queue.pop_next(), Some((Duration::from_nanos(10), "a")));
        assert_eq!(queue.now(), Duration::from_nanos(10));
        assert_eq!(queue.pop_next(), Some((Duration::from_nanos(20), "b")));
        assert_eq!(queue.pop_next(), Some((Duration::from_nanos(30), "c")));
        assert!(queue.pop_next().is_none());
    }

    #[test]
    fn test_fifo_at_same_instant() {
        let mut queue = EventQueue::new();
        for i in 0..100 {
            queue.schedule(Duration::from_nanos(5), i);
        }
        for i in 0..100 {
            assert_eq!(queue.pop_next().map(|(_, e)| e), Some(i));
        }
    }

    #[test]
    fn test_relative_scheduling_uses_current_time() {
        let mut queue = EventQueue::new();
        queue.schedule(Duration::from_nanos(100), 1);
        queue.pop_next();
        queue.schedule(Duration::from_nanos(1), 2);
        // absolute times in the past are clamped to now
        queue.schedule_at(Duration::from_nanos(50), 3);
        assert_eq!(queue.pop_next(), Some((Duration::from_nanos(100), 3)));
        assert_eq!(queue.pop_next(), Some((Duration::from_nanos(101), 2)));
    }
}
