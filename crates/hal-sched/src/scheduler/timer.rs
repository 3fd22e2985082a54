//! Deadline-ordered timer queue
//!
//! Entries are kept sorted by absolute deadline. Since deadlines live on
//! a wrapping timeline, "a is due before b" is decided from a's own
//! reference point: b's deadline is at or after a's when the distance
//! from a's begin tick to b's deadline is at least a's period.
//!
//! Equal deadlines keep insertion order: a new entry is placed after
//! every entry due at or before it.

use super::task::SlotKey;
use crate::time::Tick;
use std::collections::VecDeque;

/// Distances beyond this are read as "behind", not "far ahead"
const HALF_RANGE: u32 = u32::MAX / 2;

/// A queued countdown
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) struct TimerEntry {
    pub key: SlotKey,
    pub begin: Tick,
    pub period: u32,
}

impl TimerEntry {
    pub fn deadline(&self) -> Tick {
        self.begin.wrapping_add(self.period)
    }

    /// Microseconds until due, zero once the deadline has passed
    ///
    /// A `now` behind the begin tick (a stale reading) counts as a
    /// countdown that has not started yet rather than one that wrapped.
    pub fn remaining(&self, now: Tick) -> u32 {
        let elapsed = now.elapsed_since(self.begin);
        if elapsed > self.period && elapsed > HALF_RANGE {
            return self.period.saturating_add(self.begin.elapsed_since(now));
        }
        self.period.saturating_sub(elapsed)
    }

    /// Whether `deadline` falls at or after this entry's deadline
    fn due_no_later_than(&self, deadline: Tick) -> bool {
        deadline.elapsed_since(self.begin) >= self.period
    }
}

pub(crate) struct TimerQueue {
    entries: VecDeque<TimerEntry>,
}

impl TimerQueue {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
        }
    }

    /// Insert in deadline order; returns true when the entry became the head
    pub fn insert(&mut self, entry: TimerEntry) -> bool {
        let deadline = entry.deadline();
        let position = self
            .entries
            .iter()
            .position(|queued| !queued.due_no_later_than(deadline))
            .unwrap_or(self.entries.len());
        self.entries.insert(position, entry);
        position == 0
    }

    pub fn remove(&mut self, key: SlotKey) -> Option<TimerEntry> {
        let position = self.entries.iter().position(|e| e.key == key)?;
        self.entries.remove(position)
    }

    pub fn peek(&self) -> Option<&TimerEntry> {
        self.entries.front()
    }

    pub fn pop(&mut self) -> Option<TimerEntry> {
        self.entries.pop_front()
    }

    /// Microseconds until the head is due, `None` when empty
    pub fn remaining(&self, now: Tick) -> Option<u32> {
        self.peek().map(|head| head.remaining(now))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TimerEntry> {
        self.entries.iter()
    }

    /// Whether every adjacent pair is in deadline order
    pub fn is_sorted(&self) -> bool {
        self.entries
            .iter()
            .zip(self.entries.iter().skip(1))
            .all(|(a, b)| a.due_no_later_than(b.deadline()))
    }
}

#[cfg(test)]
mod tests {
    use super::super::task::Slots;
    use super::*;

    fn keys(n: usize) -> Vec<SlotKey> {
        let mut slots = Slots::with_capacity(n);
        (0..n).map(|i| slots.insert(i).ok().unwrap()).collect()
    }

    fn entry(key: SlotKey, begin: u32, period: u32) -> TimerEntry {
        TimerEntry {
            key,
            begin: Tick::from_micros(begin),
            period,
        }
    }

    fn order(queue: &TimerQueue) -> Vec<SlotKey> {
        queue.iter().map(|e| e.key).collect()
    }

    #[test]
    fn test_insert_sorted() {
        let k = keys(3);
        let mut queue = TimerQueue::with_capacity(3);

        assert!(queue.insert(entry(k[0], 0, 300)));
        assert!(queue.insert(entry(k[1], 0, 100)));
        assert!(!queue.insert(entry(k[2], 0, 200)));

        assert_eq!(order(&queue), vec![k[1], k[2], k[0]]);
        assert!(queue.is_sorted());
    }

    #[test]
    fn test_equal_deadlines_keep_insertion_order() {
        let k = keys(3);
        let mut queue = TimerQueue::with_capacity(3);

        queue.insert(entry(k[0], 0, 500));
        // Same deadline reached from a different begin tick
        queue.insert(entry(k[1], 200, 300));
        queue.insert(entry(k[2], 100, 400));

        assert_eq!(order(&queue), vec![k[0], k[1], k[2]]);
    }

    #[test]
    fn test_order_across_wrap() {
        let k = keys(2);
        let mut queue = TimerQueue::with_capacity(2);
        let near_end = u32::MAX - 100;

        // Deadline past the wrap point
        queue.insert(entry(k[0], near_end, 1_000));
        // Deadline just before the wrap point
        queue.insert(entry(k[1], near_end, 50));

        assert_eq!(order(&queue), vec![k[1], k[0]]);
        assert!(queue.is_sorted());
    }

    #[test]
    fn test_remaining() {
        let k = keys(1);
        let mut queue = TimerQueue::with_capacity(1);
        assert_eq!(queue.remaining(Tick::ZERO), None);

        queue.insert(entry(k[0], 1_000, 10_000));
        assert_eq!(queue.remaining(Tick::from_micros(4_000)), Some(7_000));
        assert_eq!(queue.remaining(Tick::from_micros(11_000)), Some(0));
        assert_eq!(queue.remaining(Tick::from_micros(20_000)), Some(0));
    }

    #[test]
    fn test_remaining_with_reading_before_begin() {
        let k = keys(1);
        let e = entry(k[0], 1_001, 5_000);
        assert_eq!(e.remaining(Tick::from_micros(1_000)), 5_001);
        assert_eq!(e.remaining(Tick::from_micros(1_001)), 5_000);

        // Same relation straddling the wrap point
        let e = entry(k[0], 2, 5_000);
        assert_eq!(e.remaining(Tick::from_micros(u32::MAX)), 5_003);
    }

    #[test]
    fn test_remaining_when_long_overdue() {
        let k = keys(1);
        let e = entry(k[0], 0, 1_000);
        assert_eq!(e.remaining(Tick::from_micros(1_000_000)), 0);
    }

    #[test]
    fn test_remove() {
        let k = keys(3);
        let mut queue = TimerQueue::with_capacity(3);
        queue.insert(entry(k[0], 0, 100));
        queue.insert(entry(k[1], 0, 200));
        queue.insert(entry(k[2], 0, 300));

        assert_eq!(queue.remove(k[1]).map(|e| e.period), Some(200));
        assert_eq!(queue.remove(k[1]), None);
        assert_eq!(order(&queue), vec![k[0], k[2]]);
        assert_eq!(queue.pop().map(|e| e.key), Some(k[0]));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_stays_sorted_under_churn() {
        let k = keys(16);
        let mut queue = TimerQueue::with_capacity(16);

        for (i, key) in k.iter().enumerate() {
            let period = ((i as u32 * 7_919) % 5_000) + 1;
            queue.insert(entry(*key, (i as u32) * 13, period));
            assert!(queue.is_sorted());
        }
        for key in k.iter().step_by(3) {
            queue.remove(*key);
            assert!(queue.is_sorted());
        }
        for key in k.iter().step_by(3) {
            queue.insert(entry(*key, 2_000, 1_500));
            assert!(queue.is_sorted());
        }
        assert_eq!(queue.len(), 16);
    }
}
