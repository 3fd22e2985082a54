//! Execution context primitive
//!
//! The dispatch loop needs exactly three things from the platform: block
//! the context for at most a given time, resume it early from another
//! context, and resume it early from an interrupt handler. [`Parker`] is
//! that surface. [`ThreadParker`] implements it for a host OS thread
//! with a condvar timed wait.

use parking_lot::{Condvar, Mutex};
use std::io;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Blocking and force-wake for one execution context
pub trait Parker: Send + Sync {
    /// Called on the execution context before its first dispatch pass
    fn bind(&self) {}

    /// Block the calling context for at most `timeout`
    ///
    /// May return early, either because of an [`unpark`](Parker::unpark)
    /// or spuriously. An unpark that lands before the park must make the
    /// park return immediately.
    fn park(&self, timeout: Duration);

    /// Force-wake the context from thread context
    fn unpark(&self);

    /// Force-wake the context from an interrupt handler
    ///
    /// Must not block and must not allocate.
    fn unpark_from_interrupt(&self) {
        self.unpark();
    }
}

/// Parker for a host thread, built on a condvar timed wait
///
/// The `notified` flag makes an unpark issued between "decided to sleep"
/// and "actually parked" stick, so no wake is lost in that window.
#[derive(Debug, Default)]
pub struct ThreadParker {
    /// Set by unpark, consumed by the next park
    notified: Mutex<bool>,
    notify: Condvar,
}

impl ThreadParker {
    /// Create a parker with no pending wake
    pub fn new() -> Self {
        Self::default()
    }
}

impl Parker for ThreadParker {
    fn park(&self, timeout: Duration) {
        let mut notified = self.notified.lock();
        if !*notified {
            // Times out or wakes early on unpark; spurious wakes are fine
            self.notify.wait_for(&mut notified, timeout);
        }
        *notified = false;
    }

    fn unpark(&self) {
        *self.notified.lock() = true;
        self.notify.notify_one();
    }
}

/// Create a named OS thread to serve as an execution context
pub(crate) fn spawn_context<F>(name: &str, stack_size: usize, body: F) -> io::Result<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name(name.to_string())
        .stack_size(stack_size)
        .spawn(body)
}
