//! Shared harness for driving a scheduler pass by pass
//!
//! [`StepParker`] stands in for the execution context: a park lets the
//! mock clock run out the full timeout, so each dispatch pass moves time
//! exactly as a real context would if nothing woke it early.

#![allow(dead_code)]

use hal_sched::{Clock, MockClock, Parker, Scheduler, SchedulerConfig, Tick};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub struct StepParker {
    clock: Arc<MockClock>,
    parks: Mutex<Vec<Duration>>,
    unparks: AtomicUsize,
}

impl StepParker {
    pub fn new(clock: Arc<MockClock>) -> Self {
        Self {
            clock,
            parks: Mutex::new(Vec::new()),
            unparks: AtomicUsize::new(0),
        }
    }

    pub fn parks(&self) -> Vec<Duration> {
        self.parks.lock().clone()
    }

    pub fn unparks(&self) -> usize {
        self.unparks.load(Ordering::SeqCst)
    }
}

impl Parker for StepParker {
    fn park(&self, timeout: Duration) {
        self.parks.lock().push(timeout);
        self.clock.advance(timeout.as_micros() as u32);
    }

    fn unpark(&self) {
        self.unparks.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct Harness {
    pub scheduler: Scheduler,
    pub clock: Arc<MockClock>,
    pub parker: Arc<StepParker>,
}

impl Harness {
    pub fn new(config: SchedulerConfig) -> Self {
        Self::starting_at(config, 0)
    }

    pub fn starting_at(config: SchedulerConfig, micros: u32) -> Self {
        let clock = Arc::new(MockClock::starting_at(micros));
        let parker = Arc::new(StepParker::new(clock.clone()));
        let scheduler = Scheduler::builder(config)
            .clock(clock.clone())
            .parker(parker.clone())
            .build();
        Self {
            scheduler,
            clock,
            parker,
        }
    }

    pub fn now(&self) -> Tick {
        self.clock.now()
    }
}

/// Shared log of labelled ticks, appended to by task callbacks
#[derive(Clone, Default)]
pub struct Trace {
    entries: Arc<Mutex<Vec<(&'static str, Tick)>>>,
}

impl Trace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Callback that records `label` at the clock's current tick
    pub fn recorder(
        &self,
        label: &'static str,
        clock: &Arc<MockClock>,
    ) -> impl FnMut() + Send + 'static {
        let entries = self.entries.clone();
        let clock = clock.clone();
        move || entries.lock().push((label, clock.now()))
    }

    pub fn labels(&self) -> Vec<&'static str> {
        self.entries.lock().iter().map(|(label, _)| *label).collect()
    }

    pub fn ticks(&self, label: &str) -> Vec<u32> {
        self.entries
            .lock()
            .iter()
            .filter(|(l, _)| *l == label)
            .map(|(_, tick)| tick.as_micros())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }
}
