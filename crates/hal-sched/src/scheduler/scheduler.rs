//! Per-context timer and event scheduler
//!
//! One [`Scheduler`] owns a deadline-ordered timer queue, a FIFO event
//! queue and the "sleeping" flag of the execution context that runs its
//! dispatch loop. All three sit behind one critical section that is only
//! held across queue and flag updates, never across a task callback, so
//! callbacks can freely call back into the scheduler.
//!
//! A dispatch pass:
//!
//! 1. run every pending event, oldest first
//! 2. if an event landed since, end the pass so the next one runs it
//! 3. if the earliest timer is due, run that one timer (re-queueing it
//!    if it repeats)
//! 4. otherwise park for the time left, never less than the sleep floor
//!
//! Every pass either runs a callback, bails out on a freshly queued
//! event, or parks. The loop can't spin without doing one of those.

use super::config::SchedulerConfig;
use super::context::{spawn_context, Parker, ThreadParker};
use super::event::EventQueue;
use super::stats::SchedulerStats;
use super::task::{
    EventHandle, EventTask, SchedulerId, SlotKey, Slots, TaskFn, TimerHandle, TimerState,
    TimerTask,
};
use super::timer::{TimerEntry, TimerQueue};
use crate::error::{fatal, SchedulerError};
use crate::time::{Clock, MonotonicClock, Period, Tick};
use critical_section::Mutex as CsMutex;
use log::{debug, info, trace};
use parking_lot::Mutex;
use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// How a dispatch pass ended
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PassEnd {
    /// A due timer task ran
    Fired(TimerHandle),
    /// An event arrived after the drain; nothing ran and no park
    Recheck,
    /// The context parked for this long (or until force-woken)
    Parked(Duration),
}

/// Outcome of one dispatch pass
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Pass {
    /// Event callbacks run at the start of the pass
    pub events: usize,
    /// How the pass ended
    pub end: PassEnd,
}

/// Shared mutable state, only touched inside the critical section
struct State {
    timers: Slots<TimerTask>,
    events: Slots<EventTask>,
    timer_queue: TimerQueue,
    event_queue: EventQueue,
    /// Context is parked or about to park
    sleeping: bool,
    stats: SchedulerStats,
}

struct Inner {
    id: SchedulerId,
    config: SchedulerConfig,
    clock: Arc<dyn Clock>,
    parker: Arc<dyn Parker>,
    state: CsMutex<RefCell<State>>,
    started: AtomicBool,
    shutdown: AtomicBool,
    handle: Mutex<Option<JoinHandle<()>>>,
}

/// What the timer evaluation step decided
enum Decision {
    Fire(SlotKey, Option<TaskFn>),
    Recheck,
    Park(Duration),
}

/// Builder for schedulers with a custom clock or parker
pub struct SchedulerBuilder {
    config: SchedulerConfig,
    clock: Option<Arc<dyn Clock>>,
    parker: Option<Arc<dyn Parker>>,
}

impl SchedulerBuilder {
    /// Start from a config; defaults to the monotonic clock and a thread parker
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            clock: None,
            parker: None,
        }
    }

    /// Use a different tick source
    pub fn clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    /// Use a different execution context primitive
    pub fn parker<P: Parker + 'static>(mut self, parker: Arc<P>) -> Self {
        self.parker = Some(parker);
        self
    }

    /// Build the scheduler; nothing runs until it is started
    pub fn build(self) -> Scheduler {
        let config = self.config;
        let state = State {
            timers: Slots::with_capacity(config.max_timer_tasks),
            events: Slots::with_capacity(config.max_event_tasks),
            timer_queue: TimerQueue::with_capacity(config.max_timer_tasks),
            event_queue: EventQueue::with_capacity(config.max_event_tasks),
            sleeping: false,
            stats: SchedulerStats::default(),
        };

        let clock: Arc<dyn Clock> = match self.clock {
            Some(clock) => clock,
            None => Arc::new(MonotonicClock::new()),
        };
        let parker: Arc<dyn Parker> = match self.parker {
            Some(parker) => parker,
            None => Arc::new(ThreadParker::new()),
        };

        Scheduler {
            inner: Arc::new(Inner {
                id: SchedulerId::new(),
                clock,
                parker,
                state: CsMutex::new(RefCell::new(state)),
                started: AtomicBool::new(false),
                shutdown: AtomicBool::new(false),
                handle: Mutex::new(None),
                config,
            }),
        }
    }
}

/// Timer and event scheduler bound to one execution context
///
/// Cloning is cheap and every clone drives the same scheduler, so a
/// clone can be handed to each driver that registers work on it.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    /// Scheduler with the default clock and a thread execution context
    pub fn new(config: SchedulerConfig) -> Self {
        SchedulerBuilder::new(config).build()
    }

    /// Builder for a scheduler with a custom clock or parker
    pub fn builder(config: SchedulerConfig) -> SchedulerBuilder {
        SchedulerBuilder::new(config)
    }

    /// Name and prioritise a context without starting it
    pub fn create_context(name: impl Into<String>, priority: u32) -> Self {
        Self::new(SchedulerConfig::new(name, priority))
    }

    /// Create a scheduler and start its context with the configured stack
    pub fn spawn(config: SchedulerConfig) -> Self {
        let stack_size = config.stack_size;
        let scheduler = Self::new(config);
        scheduler.start(stack_size);
        scheduler
    }

    /// Scheduler id, carried by every handle it issues
    pub fn id(&self) -> SchedulerId {
        self.inner.id
    }

    /// Context name
    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    /// Context priority hint
    pub fn priority(&self) -> u32 {
        self.inner.config.priority
    }

    /// Current tick of this scheduler's clock
    pub fn now(&self) -> Tick {
        self.inner.clock.now()
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        critical_section::with(|cs| {
            let mut state = self.inner.state.borrow_ref_mut(cs);
            f(&mut state)
        })
    }

    fn wake(&self) {
        trace!("{}: force-wake", self.name());
        self.inner.parker.unpark();
    }

    fn owns_timer(&self, handle: TimerHandle) -> bool {
        handle.owner == self.inner.id
    }

    fn owns_event(&self, handle: EventHandle) -> bool {
        handle.owner == self.inner.id
    }

    // ------------------------------------------------------------------
    // Execution context
    // ------------------------------------------------------------------

    /// Launch the execution context running the dispatch loop
    ///
    /// Terminates the process if the context cannot be created.
    pub fn start(&self, stack_size: usize) {
        if let Err(err) = self.try_start(stack_size) {
            fatal(err);
        }
    }

    /// Launch the execution context, reporting failure to the caller
    pub fn try_start(&self, stack_size: usize) -> Result<(), SchedulerError> {
        if self.inner.started.swap(true, Ordering::AcqRel) {
            return Err(SchedulerError::AlreadyStarted {
                name: self.name().to_string(),
            });
        }

        let scheduler = self.clone();
        match spawn_context(self.name(), stack_size, move || scheduler.run_loop()) {
            Ok(handle) => {
                *self.inner.handle.lock() = Some(handle);
                info!(
                    "thread {} started (priority {}, stack {} bytes)",
                    self.name(),
                    self.priority(),
                    stack_size
                );
                Ok(())
            }
            Err(source) => {
                self.inner.started.store(false, Ordering::Release);
                Err(SchedulerError::ContextSpawn {
                    name: self.name().to_string(),
                    source,
                })
            }
        }
    }

    /// Run the dispatch loop on the calling thread until [`stop`](Self::stop)
    pub fn run(&self) {
        if self.inner.started.swap(true, Ordering::AcqRel) {
            fatal(SchedulerError::AlreadyStarted {
                name: self.name().to_string(),
            });
        }
        info!("thread {} running on caller", self.name());
        self.run_loop();
    }

    fn run_loop(&self) {
        self.inner.parker.bind();
        while !self.inner.shutdown.load(Ordering::Acquire) {
            self.run_pass();
        }
        info!("thread {} stopped", self.name());
    }

    /// Ask the loop to exit after its current pass and wait for it
    pub fn stop(&self) {
        self.inner.shutdown.store(true, Ordering::Release);
        self.inner.parker.unpark();

        let handle = self.inner.handle.lock().take();
        if let Some(handle) = handle {
            // A callback stopping its own context can't join itself
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }

    /// Whether the context is parked or committed to parking
    pub fn is_sleeping(&self) -> bool {
        self.with_state(|s| s.sleeping)
    }

    // ------------------------------------------------------------------
    // Timer tasks
    // ------------------------------------------------------------------

    /// Register a timer task due `period` from now
    ///
    /// With [`Period::Never`] the task is created inert and only runs once
    /// rescheduled. Terminates the process if no timer slot is free.
    pub fn add_timer_task<F>(&self, callback: F, period: Period, auto_repeat: bool) -> TimerHandle
    where
        F: FnMut() + Send + 'static,
    {
        match self.try_add_timer_task(callback, period, auto_repeat) {
            Ok(handle) => handle,
            Err(err) => fatal(err),
        }
    }

    /// Register a timer task, reporting slot exhaustion to the caller
    pub fn try_add_timer_task<F>(
        &self,
        callback: F,
        period: Period,
        auto_repeat: bool,
    ) -> Result<TimerHandle, SchedulerError>
    where
        F: FnMut() + Send + 'static,
    {
        let begin = self.now();
        let task = TimerTask::new(Box::new(callback), period, auto_repeat, begin);

        let inserted = self.with_state(|s| -> Result<(SlotKey, bool), TimerTask> {
            let key = s.timers.insert(task)?;
            let mut wake = false;
            if let Some(micros) = period.as_micros() {
                if let Some(task) = s.timers.get_mut(key) {
                    task.state = TimerState::Queued;
                }
                let head = s.timer_queue.insert(TimerEntry {
                    key,
                    begin,
                    period: micros,
                });
                wake = head && s.sleeping;
                if wake {
                    s.stats.forced_wakes += 1;
                }
            }
            Ok((key, wake))
        });

        let (key, wake) = match inserted {
            Ok(inserted) => inserted,
            Err(rejected) => {
                drop(rejected);
                return Err(SchedulerError::TimerSlotsExhausted {
                    name: self.name().to_string(),
                    capacity: self.inner.config.max_timer_tasks,
                });
            }
        };

        let handle = TimerHandle {
            owner: self.inner.id,
            key,
        };
        debug!(
            "{}: add {} period {} repeat {}",
            self.name(),
            handle,
            period,
            auto_repeat
        );
        if wake {
            self.wake();
        }
        Ok(handle)
    }

    /// Restart a timer task's countdown from now with a new period
    ///
    /// Works whether or not the task is queued, including from the task's
    /// own callback (the new countdown replaces the auto-repeat). A stale
    /// or foreign handle is ignored.
    pub fn reschedule_timer_task(&self, handle: TimerHandle, period: Period) {
        if !self.owns_timer(handle) {
            return;
        }
        let now = self.now();

        let wake = self.with_state(|s| {
            let Some(task) = s.timers.get_mut(handle.key) else {
                return None;
            };
            if task.state == TimerState::Queued {
                s.timer_queue.remove(handle.key);
                task.state = TimerState::Inert;
            }
            if task.state == TimerState::Running {
                task.rearm = false;
            }
            task.period = period;
            task.begin = now;

            let Some(micros) = period.as_micros() else {
                return Some(false);
            };
            task.state = TimerState::Queued;
            s.timer_queue.insert(TimerEntry {
                key: handle.key,
                begin: now,
                period: micros,
            });
            let wake = s.sleeping;
            if wake {
                s.stats.forced_wakes += 1;
            }
            Some(wake)
        });

        if let Some(wake) = wake {
            debug!("{}: reschedule {} period {}", self.name(), handle, period);
            if wake {
                self.wake();
            }
        }
    }

    /// Take a timer task out of the queue
    ///
    /// A task removed from inside its own callback will not auto-repeat.
    /// Unqueued, stale and foreign handles are ignored. The task itself
    /// stays allocated and can be rescheduled later.
    pub fn remove_timer_task(&self, handle: TimerHandle) {
        if !self.owns_timer(handle) {
            return;
        }
        self.with_state(|s| {
            let Some(task) = s.timers.get_mut(handle.key) else {
                return;
            };
            match task.state {
                TimerState::Queued => {
                    s.timer_queue.remove(handle.key);
                    task.state = TimerState::Inert;
                }
                TimerState::Running => task.rearm = false,
                TimerState::Inert => {}
            }
        });
    }

    /// Re-add an inert timer task with its stored period, counting from now
    ///
    /// Re-adding a task that is already queued is a bug in the caller and
    /// terminates the process.
    pub fn rearm_timer_task(&self, handle: TimerHandle) {
        if let Err(err) = self.try_rearm_timer_task(handle) {
            fatal(err);
        }
    }

    /// Re-add an inert timer task, reporting a double registration
    pub fn try_rearm_timer_task(&self, handle: TimerHandle) -> Result<(), SchedulerError> {
        if !self.owns_timer(handle) {
            return Ok(());
        }
        let now = self.now();

        let wake = self.with_state(|s| {
            let Some(task) = s.timers.get_mut(handle.key) else {
                return Ok(false);
            };
            if task.state == TimerState::Queued {
                return Err(());
            }
            if task.state == TimerState::Running {
                task.rearm = false;
            }
            task.begin = now;

            let Some(micros) = task.period.as_micros() else {
                return Ok(false);
            };
            task.state = TimerState::Queued;
            let head = s.timer_queue.insert(TimerEntry {
                key: handle.key,
                begin: now,
                period: micros,
            });
            let wake = head && s.sleeping;
            if wake {
                s.stats.forced_wakes += 1;
            }
            Ok(wake)
        });

        match wake {
            Ok(true) => {
                self.wake();
                Ok(())
            }
            Ok(false) => Ok(()),
            Err(()) => Err(SchedulerError::TimerAlreadyQueued {
                name: self.name().to_string(),
            }),
        }
    }

    /// Dequeue a timer task and free its slot; the handle goes stale
    ///
    /// Released from inside its own callback, the slot is freed once the
    /// callback returns.
    pub fn release_timer_task(&self, handle: TimerHandle) {
        if !self.owns_timer(handle) {
            return;
        }
        let released = self.with_state(|s| {
            let task = s.timers.get_mut(handle.key)?;
            let state = task.state;
            match state {
                TimerState::Running => {
                    task.released = true;
                    task.rearm = false;
                    None
                }
                TimerState::Queued => {
                    s.timer_queue.remove(handle.key);
                    s.timers.remove(handle.key)
                }
                TimerState::Inert => s.timers.remove(handle.key),
            }
        });
        // Drop the callback outside the critical section
        drop(released);
    }

    /// Whether the timer task is currently in the queue
    pub fn is_timer_queued(&self, handle: TimerHandle) -> bool {
        self.owns_timer(handle)
            && self.with_state(|s| {
                s.timers
                    .get(handle.key)
                    .is_some_and(|t| t.state == TimerState::Queued)
            })
    }

    /// Deadline of a queued timer task
    pub fn timer_deadline(&self, handle: TimerHandle) -> Option<Tick> {
        if !self.owns_timer(handle) {
            return None;
        }
        self.with_state(|s| {
            s.timers
                .get(handle.key)
                .filter(|t| t.state == TimerState::Queued)
                .and_then(|t| t.deadline())
        })
    }

    /// Queued timer tasks in dispatch order with their deadlines
    pub fn queued_timers(&self) -> Vec<(TimerHandle, Tick)> {
        let owner = self.inner.id;
        self.with_state(|s| {
            s.timer_queue
                .iter()
                .map(|e| (TimerHandle { owner, key: e.key }, e.deadline()))
                .collect()
        })
    }

    /// Whether the timer queue is in deadline order
    pub fn timers_in_order(&self) -> bool {
        self.with_state(|s| s.timer_queue.is_sorted())
    }

    // ------------------------------------------------------------------
    // Event tasks
    // ------------------------------------------------------------------

    /// Create a reusable event task; it runs each time it is sent
    ///
    /// Terminates the process if no event slot is free.
    pub fn create_event_task<F>(&self, callback: F) -> EventHandle
    where
        F: FnMut() + Send + 'static,
    {
        match self.try_create_event_task(callback) {
            Ok(handle) => handle,
            Err(err) => fatal(err),
        }
    }

    /// Create an event task, reporting slot exhaustion to the caller
    pub fn try_create_event_task<F>(&self, callback: F) -> Result<EventHandle, SchedulerError>
    where
        F: FnMut() + Send + 'static,
    {
        let task = EventTask::new(Box::new(callback));
        match self.with_state(|s| s.events.insert(task)) {
            Ok(key) => Ok(EventHandle {
                owner: self.inner.id,
                key,
            }),
            Err(rejected) => {
                drop(rejected);
                Err(SchedulerError::EventSlotsExhausted {
                    name: self.name().to_string(),
                    capacity: self.inner.config.max_event_tasks,
                })
            }
        }
    }

    /// Queue an event task's callback and wake the context
    ///
    /// Sending an event that is already pending does nothing.
    pub fn send_event(&self, handle: EventHandle) {
        if self.enqueue_event(handle) {
            self.wake();
        }
    }

    /// Queue an event task from an interrupt handler
    ///
    /// Only touches the interrupt-safe critical section, never blocks,
    /// never allocates and never runs a callback.
    pub fn send_event_from_interrupt(&self, handle: EventHandle) {
        if self.enqueue_event(handle) {
            self.inner.parker.unpark_from_interrupt();
        }
    }

    /// Push onto the FIFO; returns whether the context needs waking
    fn enqueue_event(&self, handle: EventHandle) -> bool {
        if !self.owns_event(handle) {
            return false;
        }
        self.with_state(|s| {
            let Some(event) = s.events.get_mut(handle.key) else {
                return false;
            };
            if event.queued || event.released {
                return false;
            }
            event.queued = true;
            s.event_queue.push(handle.key);
            let wake = s.sleeping;
            if wake {
                s.stats.forced_wakes += 1;
            }
            wake
        })
    }

    /// Dequeue an event task and free its slot; the handle goes stale
    pub fn release_event_task(&self, handle: EventHandle) {
        if !self.owns_event(handle) {
            return;
        }
        let released = self.with_state(|s| {
            let event = s.events.get_mut(handle.key)?;
            if event.queued {
                event.queued = false;
                s.event_queue.remove(handle.key);
            }
            if event.running {
                event.released = true;
                return None;
            }
            s.events.remove(handle.key)
        });
        drop(released);
    }

    /// Whether the event task is waiting to run
    pub fn is_event_pending(&self, handle: EventHandle) -> bool {
        self.owns_event(handle)
            && self.with_state(|s| s.events.get(handle.key).is_some_and(|e| e.queued))
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    /// Run one dispatch pass on the calling context
    ///
    /// This is the body of the dispatch loop. Hosts that own their own
    /// loop call it repeatedly from a single context.
    pub fn run_pass(&self) -> Pass {
        let events = self.drain_events();
        let floor = self.inner.config.sleep_floor;
        let idle = self.inner.config.max_sleep.max(floor);

        let decision = critical_section::with(|cs| {
            // Sampled under the lock, so every queued begin tick is at or
            // before it
            let now = self.now();
            let mut state = self.inner.state.borrow_ref_mut(cs);
            let s = &mut *state;

            // Events that landed after the drain still go before timers
            if !s.event_queue.is_empty() {
                s.stats.rechecks += 1;
                return Decision::Recheck;
            }

            while let Some(head) = s.timer_queue.peek().copied() {
                if head.remaining(now) > 0 {
                    break;
                }
                s.timer_queue.pop();
                if let Some(task) = s.timers.get_mut(head.key) {
                    task.state = TimerState::Running;
                    task.rearm = task.auto_repeat;
                    s.stats.timers_fired += 1;
                    return Decision::Fire(head.key, task.callback.take());
                }
            }

            let wait = match s.timer_queue.remaining(now) {
                Some(micros) => Duration::from_micros(u64::from(micros)).max(floor),
                None => idle,
            };
            s.sleeping = true;
            s.stats.parks += 1;
            Decision::Park(wait)
        });

        let end = match decision {
            Decision::Fire(key, callback) => {
                self.run_timer(key, callback);
                PassEnd::Fired(TimerHandle {
                    owner: self.inner.id,
                    key,
                })
            }
            Decision::Recheck => PassEnd::Recheck,
            Decision::Park(wait) => {
                trace!("{}: park {:?}", self.name(), wait);
                self.inner.parker.park(wait);
                self.with_state(|s| s.sleeping = false);
                PassEnd::Parked(wait)
            }
        };

        Pass { events, end }
    }

    /// Run pending events in FIFO order until the queue is empty
    fn drain_events(&self) -> usize {
        let mut count = 0;
        loop {
            let next = self.with_state(|s| {
                while let Some(key) = s.event_queue.pop() {
                    if let Some(event) = s.events.get_mut(key) {
                        event.queued = false;
                        event.running = true;
                        s.stats.events_dispatched += 1;
                        return Some((key, event.callback.take()));
                    }
                }
                None
            });
            let Some((key, mut callback)) = next else {
                return count;
            };
            count += 1;

            if let Some(callback) = callback.as_mut() {
                callback();
            }

            let leftover = self.with_state(|s| {
                let Some(event) = s.events.get_mut(key) else {
                    return callback;
                };
                event.running = false;
                if event.released {
                    s.events.remove(key);
                    return callback;
                }
                event.callback = callback;
                None
            });
            drop(leftover);
        }
    }

    /// Run a popped timer task and put it back where its callback left it
    fn run_timer(&self, key: SlotKey, mut callback: Option<TaskFn>) {
        if let Some(callback) = callback.as_mut() {
            callback();
        }
        let after = self.now();

        let leftover = self.with_state(|s| {
            let Some(task) = s.timers.get_mut(key) else {
                return callback;
            };
            if task.released {
                s.timers.remove(key);
                return callback;
            }
            task.callback = callback;

            // A callback that rescheduled or removed itself already decided
            if task.state == TimerState::Running {
                match (task.rearm, task.period.as_micros()) {
                    (true, Some(micros)) => {
                        task.begin = after;
                        task.state = TimerState::Queued;
                        s.timer_queue.insert(TimerEntry {
                            key,
                            begin: after,
                            period: micros,
                        });
                    }
                    _ => task.state = TimerState::Inert,
                }
            }
            task.rearm = false;
            None
        });
        drop(leftover);
    }

    /// Counter snapshot
    pub fn stats(&self) -> SchedulerStats {
        self.with_state(|s| {
            let mut stats = s.stats.clone();
            stats.timer_tasks = s.timers.len();
            stats.queued_timers = s.timer_queue.len();
            stats.event_tasks = s.events.len();
            stats.pending_events = s.event_queue.len();
            stats
        })
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("id", &self.inner.id)
            .field("name", &self.inner.config.name)
            .field("priority", &self.inner.config.priority)
            .finish()
    }
}
