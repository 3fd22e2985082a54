//! Scheduler diagnostics

/// Counter snapshot for one scheduler
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Event callbacks run
    pub events_dispatched: u64,

    /// Timer callbacks run
    pub timers_fired: u64,

    /// Times the context blocked
    pub parks: u64,

    /// Force-wakes issued by registration and trigger calls
    pub forced_wakes: u64,

    /// Passes cut short because an event landed after the drain
    pub rechecks: u64,

    /// Live timer tasks
    pub timer_tasks: usize,

    /// Timer tasks currently queued
    pub queued_timers: usize,

    /// Live event tasks
    pub event_tasks: usize,

    /// Event tasks currently pending
    pub pending_events: usize,
}
