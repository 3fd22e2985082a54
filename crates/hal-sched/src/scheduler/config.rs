//! Scheduler configuration

use std::time::Duration;

/// Shortest park the dispatch loop will take while a timer is pending
///
/// Keeps two timers with nearly identical deadlines from turning the
/// loop into a spin that never yields the processor.
pub const DEFAULT_SLEEP_FLOOR: Duration = Duration::from_micros(400);

/// Longest park when the timer queue is empty
pub const DEFAULT_MAX_SLEEP: Duration = Duration::from_secs(1);

/// Stack reserved for a host execution context
pub const DEFAULT_STACK_SIZE: usize = 64 * 1024;

/// Default timer slot count
pub const DEFAULT_MAX_TIMER_TASKS: usize = 64;

/// Default event slot count
pub const DEFAULT_MAX_EVENT_TASKS: usize = 32;

/// Identity and limits for one scheduler / execution context pair
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Context name, used for the thread name and diagnostics
    pub name: String,

    /// Priority hint handed to the execution context
    ///
    /// Priority between unrelated contexts is the platform's business;
    /// the host context records it for diagnostics only.
    pub priority: u32,

    /// Stack size for the execution context in bytes
    pub stack_size: usize,

    /// Minimum park while a timer is pending
    pub sleep_floor: Duration,

    /// Park length when no timer is pending
    pub max_sleep: Duration,

    /// Maximum number of live timer tasks
    pub max_timer_tasks: usize,

    /// Maximum number of live event tasks
    pub max_event_tasks: usize,
}

impl SchedulerConfig {
    /// Config with a name and priority and default limits
    pub fn new(name: impl Into<String>, priority: u32) -> Self {
        Self {
            name: name.into(),
            priority,
            ..Self::default()
        }
    }

    /// Override the stack size
    pub fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = stack_size;
        self
    }

    /// Override the sleep floor
    pub fn with_sleep_floor(mut self, floor: Duration) -> Self {
        self.sleep_floor = floor;
        self
    }

    /// Override the idle park length
    pub fn with_max_sleep(mut self, max_sleep: Duration) -> Self {
        self.max_sleep = max_sleep;
        self
    }

    /// Override the slot limits
    pub fn with_task_limits(mut self, timers: usize, events: usize) -> Self {
        self.max_timer_tasks = timers;
        self.max_event_tasks = events;
        self
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            name: "hal-sched".to_string(),
            priority: 0,
            stack_size: DEFAULT_STACK_SIZE,
            sleep_floor: DEFAULT_SLEEP_FLOOR,
            max_sleep: DEFAULT_MAX_SLEEP,
            max_timer_tasks: DEFAULT_MAX_TIMER_TASKS,
            max_event_tasks: DEFAULT_MAX_EVENT_TASKS,
        }
    }
}
