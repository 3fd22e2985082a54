//! Scheduler errors and the fatal path
//!
//! Every error here is fatal when it reaches one of the infallible entry
//! points: continuing would run against corrupted or exhausted scheduler
//! state. The `try_*` entry points hand the same errors back instead.

use thiserror::Error;

/// Errors raised by the scheduler
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The execution context could not be created
    #[error("Unable to create thread {name}: {source}")]
    ContextSpawn {
        /// Context name
        name: String,
        /// Underlying spawn failure
        #[source]
        source: std::io::Error,
    },

    /// `start` was called on a context that is already running
    #[error("Thread {name} already started")]
    AlreadyStarted {
        /// Context name
        name: String,
    },

    /// No free timer task slot
    #[error("Unable to create timer task on thread {name}: all {capacity} slots in use")]
    TimerSlotsExhausted {
        /// Context name
        name: String,
        /// Configured slot count
        capacity: usize,
    },

    /// No free event task slot
    #[error("Unable to create event task on thread {name}: all {capacity} slots in use")]
    EventSlotsExhausted {
        /// Context name
        name: String,
        /// Configured slot count
        capacity: usize,
    },

    /// A timer task already in the queue was registered again
    #[error("Task already registered on thread {name}")]
    TimerAlreadyQueued {
        /// Context name
        name: String,
    },
}

/// Report an unrecoverable scheduler error and terminate
///
/// Must not be called while holding the critical section.
#[cold]
#[track_caller]
pub(crate) fn fatal(err: SchedulerError) -> ! {
    log::error!("PANIC: {}", err);
    panic!("{}", err);
}
