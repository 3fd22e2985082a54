//! FIFO of triggered event tasks
//!
//! Each event slot is queued at most once (its `queued` flag guards the
//! push), so the queue never holds more entries than there are event
//! slots. Reserving that many up front means a push never allocates,
//! which is what lets the interrupt path use it.

use super::task::SlotKey;
use std::collections::VecDeque;

pub(crate) struct EventQueue {
    pending: VecDeque<SlotKey>,
}

impl EventQueue {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            pending: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, key: SlotKey) {
        debug_assert!(
            self.pending.len() < self.pending.capacity(),
            "event queue would reallocate"
        );
        self.pending.push_back(key);
    }

    pub fn pop(&mut self) -> Option<SlotKey> {
        self.pending.pop_front()
    }

    pub fn remove(&mut self, key: SlotKey) -> bool {
        match self.pending.iter().position(|k| *k == key) {
            Some(position) => {
                self.pending.remove(position);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::super::task::Slots;
    use super::*;

    #[test]
    fn test_fifo_order() {
        let mut slots = Slots::with_capacity(3);
        let k: Vec<_> = (0..3).map(|i| slots.insert(i).ok().unwrap()).collect();
        let mut queue = EventQueue::with_capacity(3);

        queue.push(k[2]);
        queue.push(k[0]);
        queue.push(k[1]);

        assert_eq!(queue.pop(), Some(k[2]));
        assert_eq!(queue.pop(), Some(k[0]));
        assert_eq!(queue.pop(), Some(k[1]));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn test_remove_middle() {
        let mut slots = Slots::with_capacity(3);
        let k: Vec<_> = (0..3).map(|i| slots.insert(i).ok().unwrap()).collect();
        let mut queue = EventQueue::with_capacity(3);
        for key in &k {
            queue.push(*key);
        }

        assert!(queue.remove(k[1]));
        assert!(!queue.remove(k[1]));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop(), Some(k[0]));
        assert_eq!(queue.pop(), Some(k[2]));
        assert!(queue.is_empty());
    }
}
