//! Tick domain and clock sources

mod clock;
mod tick;

pub use clock::{Clock, MockClock, MonotonicClock};
pub use tick::{Period, Tick};
