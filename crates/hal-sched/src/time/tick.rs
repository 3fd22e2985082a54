//! Wraparound-safe tick arithmetic
//!
//! Ticks are 32-bit microsecond counts that overflow roughly every 71
//! minutes. Two ticks are only ever compared through the distance from a
//! reference point (`later.wrapping_sub(earlier)`), which stays correct
//! across an overflow as long as both points are less than one full range
//! apart.

use std::fmt;
use std::time::Duration;

/// A point on the monotonic microsecond timeline
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct Tick(u32);

impl Tick {
    /// Tick at the origin of the timeline
    pub const ZERO: Tick = Tick(0);

    /// Create a tick from a raw microsecond count
    pub const fn from_micros(micros: u32) -> Self {
        Tick(micros)
    }

    /// Raw microsecond count
    pub const fn as_micros(self) -> u32 {
        self.0
    }

    /// Tick `micros` after this one, wrapping at the end of the range
    pub const fn wrapping_add(self, micros: u32) -> Self {
        Tick(self.0.wrapping_add(micros))
    }

    /// Microseconds elapsed since `reference`
    ///
    /// `reference` must not lie in the future of `self` by more than
    /// the wrap period, otherwise the result aliases.
    pub const fn elapsed_since(self, reference: Tick) -> u32 {
        self.0.wrapping_sub(reference.0)
    }
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}us", self.0)
    }
}

/// How long a timer task counts before it is due
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Period {
    /// Never fire. The task exists but stays out of the queue.
    Never,
    /// Fire after this many microseconds
    After(u32),
}

impl Period {
    /// Period of `micros` microseconds
    pub const fn micros(micros: u32) -> Self {
        Period::After(micros)
    }

    /// Period of `millis` milliseconds, saturating
    pub const fn millis(millis: u32) -> Self {
        Period::After(millis.saturating_mul(1_000))
    }

    /// Microsecond length, `None` for [`Period::Never`]
    pub const fn as_micros(self) -> Option<u32> {
        match self {
            Period::Never => None,
            Period::After(us) => Some(us),
        }
    }

    /// Whether this is the never-fire sentinel
    pub const fn is_never(self) -> bool {
        matches!(self, Period::Never)
    }
}

impl From<Duration> for Period {
    fn from(duration: Duration) -> Self {
        let micros = u32::try_from(duration.as_micros()).unwrap_or(u32::MAX);
        Period::After(micros)
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Period::Never => write!(f, "never"),
            Period::After(us) => write!(f, "{}us", us),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elapsed_across_wrap() {
        let before = Tick::from_micros(u32::MAX - 99);
        let after = before.wrapping_add(250);

        assert_eq!(after.as_micros(), 150);
        assert_eq!(after.elapsed_since(before), 250);
    }

    #[test]
    fn test_elapsed_same_point() {
        let t = Tick::from_micros(42);
        assert_eq!(t.elapsed_since(t), 0);
    }

    #[test]
    fn test_period_from_duration_saturates() {
        assert_eq!(Period::from(Duration::from_millis(10)), Period::After(10_000));
        assert_eq!(
            Period::from(Duration::from_secs(10_000)),
            Period::After(u32::MAX)
        );
    }

    #[test]
    fn test_period_never() {
        assert!(Period::Never.is_never());
        assert_eq!(Period::Never.as_micros(), None);
        assert_eq!(Period::millis(3).as_micros(), Some(3_000));
    }
}
