//! Lifecycle events and the bounded notification queue.

use std::collections::VecDeque;
use tracing::warn;

/// A session lifecycle notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// The attached identity changed: a new match was found, or the prior
    /// one died and a replacement was attached.
    ProcessChanged,
}

/// Bounded FIFO of lifecycle events.
///
/// Overflow policy: drop everything queued, then enqueue the new event, so
/// a consumer that fell behind sees only the newest state change.
#[derive(Debug)]
pub struct EventQueue {
    queue: VecDeque<Event>,
    capacity: usize,
}

impl EventQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: VecDeque::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, event: Event) {
        if self.queue.len() >= self.capacity {
            warn!("event queue full, discarding old events");
            self.queue.clear();
        }
        self.queue.push_back(event);
    }

    pub fn pop(&mut self) -> Option<Event> {
        self.queue.pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let mut queue = EventQueue::new(4);
        queue.push(Event::ProcessChanged);
        queue.push(Event::ProcessChanged);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop(), Some(Event::ProcessChanged));
        assert_eq!(queue.pop(), Some(Event::ProcessChanged));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn test_overflow_keeps_only_newest() {
        let mut queue = EventQueue::new(3);
        // The fourth push drains the queue and enqueues only itself.
        for _ in 0..4 {
            queue.push(Event::ProcessChanged);
        }
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.pop(), Some(Event::ProcessChanged));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_zero_capacity_still_holds_one() {
        let mut queue = EventQueue::new(0);
        queue.push(Event::ProcessChanged);
        assert_eq!(queue.len(), 1);
    }
}
