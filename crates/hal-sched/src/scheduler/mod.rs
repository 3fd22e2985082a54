//! Timer and event task scheduler
//!
//! One scheduler per execution context. Drivers register periodic or
//! one-shot timer tasks and reusable event tasks; the context runs the
//! dispatch loop, sleeping until the next deadline or until an event
//! (possibly sent from an interrupt handler) wakes it.

mod config;
mod context;
mod event;
#[allow(clippy::module_inception)]
mod scheduler;
mod stats;
mod task;
mod timer;

pub use config::{
    SchedulerConfig, DEFAULT_MAX_EVENT_TASKS, DEFAULT_MAX_SLEEP, DEFAULT_MAX_TIMER_TASKS,
    DEFAULT_SLEEP_FLOOR, DEFAULT_STACK_SIZE,
};
pub use context::{Parker, ThreadParker};
pub use scheduler::{Pass, PassEnd, Scheduler, SchedulerBuilder};
pub use stats::SchedulerStats;
pub use task::{EventHandle, SchedulerId, SlotKey, TaskFn, TimerHandle};
