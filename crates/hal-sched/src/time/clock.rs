//! Clock sources for the tick domain
//!
//! The scheduler never reads the system time directly. It asks a
//! [`Clock`], which lets hosts run against the real monotonic clock and
//! tests drive time by hand.

use crate::time::Tick;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Source of the current tick
///
/// The dispatch loop samples it inside its critical section, so `now`
/// must be cheap and must not block.
pub trait Clock: Send + Sync {
    /// Current tick
    fn now(&self) -> Tick;
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> Tick {
        (**self).now()
    }
}

/// Monotonic host clock, microseconds since construction
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    /// Create a clock whose origin is now
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Tick {
        // Truncation is the wrap
        Tick::from_micros(self.origin.elapsed().as_micros() as u32)
    }
}

/// Hand-driven clock for deterministic tests
///
/// ```ignore
/// let clock = MockClock::new();
/// clock.advance(3_000);
/// assert_eq!(clock.now().as_micros(), 3_000);
/// ```
#[derive(Debug, Default)]
pub struct MockClock {
    micros: AtomicU32,
}

impl MockClock {
    /// Clock starting at tick zero
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    /// Clock starting at an arbitrary tick, e.g. just before a wrap
    pub fn starting_at(micros: u32) -> Self {
        Self {
            micros: AtomicU32::new(micros),
        }
    }

    /// Jump to an absolute tick
    pub fn set(&self, micros: u32) {
        self.micros.store(micros, Ordering::Release);
    }

    /// Move forward by `micros`, wrapping
    pub fn advance(&self, micros: u32) {
        self.micros.fetch_add(micros, Ordering::AcqRel);
    }
}

impl Clock for MockClock {
    fn now(&self) -> Tick {
        Tick::from_micros(self.micros.load(Ordering::Acquire))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_mock_clock_advance_wraps() {
        let clock = MockClock::starting_at(u32::MAX - 10);
        clock.advance(20);
        assert_eq!(clock.now().as_micros(), 9);
    }

    #[test]
    fn test_mock_clock_concurrent_advance() {
        let clock = Arc::new(MockClock::starting_at(u32::MAX - 1_000));
        let workers: Vec<_> = (0..4)
            .map(|_| {
                let clock = clock.clone();
                thread::spawn(move || {
                    for _ in 0..1_000 {
                        clock.advance(3);
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }
        assert_eq!(clock.now().as_micros(), 10_999);
    }

    #[test]
    fn test_mock_clock_set() {
        let clock = MockClock::new();
        clock.set(3_000);
        assert_eq!(clock.now(), Tick::from_micros(3_000));
    }

    #[test]
    fn test_monotonic_clock_moves_forward() {
        let clock = MonotonicClock::new();
        let start = clock.now();
        thread::sleep(Duration::from_millis(2));
        assert!(clock.now().elapsed_since(start) >= 2_000);
    }

    #[test]
    fn test_shared_clock() {
        let clock = Arc::new(MockClock::new());
        let shared: Arc<dyn Clock> = clock.clone();
        clock.advance(5);
        assert_eq!(shared.now().as_micros(), 5);
    }
}
