//! Task records and the handles that address them
//!
//! Task records live in a generational slot arena owned by their
//! scheduler. A handle is an index plus the generation the slot had when
//! the record was created, plus the id of the owning scheduler. Once a
//! record is released its slot generation moves on, so an old handle can
//! never reach whatever is allocated there next.

use crate::time::{Period, Tick};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

/// Work run by the dispatch loop
///
/// The closure carries whatever context the caller needs.
pub type TaskFn = Box<dyn FnMut() + Send + 'static>;

/// Unique identifier for a Scheduler
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct SchedulerId(u32);

static NEXT_SCHEDULER_ID: AtomicU32 = AtomicU32::new(1);

impl SchedulerId {
    /// Generate a new unique SchedulerId
    pub fn new() -> Self {
        SchedulerId(NEXT_SCHEDULER_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Numeric id
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl Default for SchedulerId {
    fn default() -> Self {
        Self::new()
    }
}

/// Position of a record in a slot arena
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct SlotKey {
    index: u32,
    generation: u32,
}

impl SlotKey {
    /// Slot index
    pub fn index(self) -> u32 {
        self.index
    }

    /// Slot generation at creation time
    pub fn generation(self) -> u32 {
        self.generation
    }
}

/// Handle to a timer task
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct TimerHandle {
    pub(crate) owner: SchedulerId,
    pub(crate) key: SlotKey,
}

impl TimerHandle {
    /// Scheduler that owns the task
    pub fn owner(&self) -> SchedulerId {
        self.owner
    }
}

impl fmt::Display for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "timer#{}.{}@{}",
            self.key.index,
            self.key.generation,
            self.owner.as_u32()
        )
    }
}

/// Handle to an event task
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct EventHandle {
    pub(crate) owner: SchedulerId,
    pub(crate) key: SlotKey,
}

impl EventHandle {
    /// Scheduler that owns the task
    pub fn owner(&self) -> SchedulerId {
        self.owner
    }
}

impl fmt::Display for EventHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "event#{}.{}@{}",
            self.key.index,
            self.key.generation,
            self.owner.as_u32()
        )
    }
}

/// Where a timer task is in its lifecycle
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum TimerState {
    /// Exists but not queued
    Inert,
    /// In the deadline queue
    Queued,
    /// Callback currently executing on the context
    Running,
}

pub(crate) struct TimerTask {
    /// `None` while the callback is out being run
    pub callback: Option<TaskFn>,
    pub period: Period,
    pub auto_repeat: bool,
    /// Tick the current countdown started from
    pub begin: Tick,
    pub state: TimerState,
    /// Re-insert after the running callback returns
    pub rearm: bool,
    /// Free the slot after the running callback returns
    pub released: bool,
}

impl TimerTask {
    pub fn new(callback: TaskFn, period: Period, auto_repeat: bool, begin: Tick) -> Self {
        Self {
            callback: Some(callback),
            period,
            auto_repeat,
            begin,
            state: TimerState::Inert,
            rearm: false,
            released: false,
        }
    }

    /// Deadline of the current countdown, `None` when the task never fires
    pub fn deadline(&self) -> Option<Tick> {
        self.period.as_micros().map(|us| self.begin.wrapping_add(us))
    }
}

pub(crate) struct EventTask {
    pub callback: Option<TaskFn>,
    pub queued: bool,
    pub running: bool,
    pub released: bool,
}

impl EventTask {
    pub fn new(callback: TaskFn) -> Self {
        Self {
            callback: Some(callback),
            queued: false,
            running: false,
            released: false,
        }
    }
}

enum Entry<T> {
    Occupied { generation: u32, value: T },
    Vacant { generation: u32 },
}

/// Fixed-capacity generational arena
pub(crate) struct Slots<T> {
    entries: Vec<Entry<T>>,
    free: Vec<u32>,
    len: usize,
    capacity: usize,
}

impl<T> Slots<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            free: Vec::with_capacity(capacity),
            len: 0,
            capacity,
        }
    }

    /// Store `value`, handing it back when every slot is taken
    pub fn insert(&mut self, value: T) -> Result<SlotKey, T> {
        if let Some(index) = self.free.pop() {
            let entry = &mut self.entries[index as usize];
            let generation = match &*entry {
                Entry::Vacant { generation } => *generation,
                Entry::Occupied { .. } => unreachable!("free list points at occupied slot"),
            };
            *entry = Entry::Occupied { generation, value };
            self.len += 1;
            return Ok(SlotKey { index, generation });
        }

        if self.entries.len() >= self.capacity {
            return Err(value);
        }

        let index = self.entries.len() as u32;
        self.entries.push(Entry::Occupied {
            generation: 0,
            value,
        });
        self.len += 1;
        Ok(SlotKey {
            index,
            generation: 0,
        })
    }

    pub fn get(&self, key: SlotKey) -> Option<&T> {
        match self.entries.get(key.index as usize)? {
            Entry::Occupied { generation, value } if *generation == key.generation => Some(value),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, key: SlotKey) -> Option<&mut T> {
        match self.entries.get_mut(key.index as usize)? {
            Entry::Occupied { generation, value } if *generation == key.generation => Some(value),
            _ => None,
        }
    }

    /// Free the slot and return its record; the key goes stale
    pub fn remove(&mut self, key: SlotKey) -> Option<T> {
        let entry = self.entries.get_mut(key.index as usize)?;
        match &*entry {
            Entry::Occupied { generation, .. } if *generation == key.generation => {}
            _ => return None,
        }

        let next = Entry::Vacant {
            generation: key.generation.wrapping_add(1),
        };
        match std::mem::replace(entry, next) {
            Entry::Occupied { value, .. } => {
                self.free.push(key.index);
                self.len -= 1;
                Some(value)
            }
            Entry::Vacant { .. } => None,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }
}
