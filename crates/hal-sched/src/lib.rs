//! hal-sched - cooperative task scheduling for HAL worker contexts
//!
//! Each [`Scheduler`] is bound to a single execution context and runs two
//! kinds of work on it:
//!
//! - **timer tasks**: periodic or one-shot callbacks ordered by deadline
//! - **event tasks**: reusable callbacks queued on demand, including from
//!   interrupt handlers, and run oldest first
//!
//! # Example
//!
//! ```ignore
//! use hal_sched::{Period, Scheduler, SchedulerConfig};
//!
//! let io = Scheduler::spawn(SchedulerConfig::new("io", 181));
//! let poll = io.add_timer_task(|| read_pressure(), Period::millis(10), true);
//! let irq = io.create_event_task(|| drain_fifo());
//!
//! // from the data-ready interrupt
//! io.send_event_from_interrupt(irq);
//! ```

#![warn(missing_docs)]

pub mod error;
pub mod scheduler;
pub mod time;

pub use error::SchedulerError;
pub use scheduler::{
    EventHandle, Parker, Pass, PassEnd, Scheduler, SchedulerBuilder, SchedulerConfig,
    SchedulerId, SchedulerStats, ThreadParker, TimerHandle,
};
pub use time::{Clock, MockClock, MonotonicClock, Period, Tick};
