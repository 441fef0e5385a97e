use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use super::engine::AsyncFetchEngine;
use super::slot::FetchSlot;

/// Fixed set of slots shared by short-lived consumers.
///
/// Consumers that do not own a slot of their own (HTTP handlers, one-shot
/// CLI fetches) borrow one for the duration of a fetch. The pool size
/// bounds how many tiles of the source are wanted at once.
pub struct SlotPool {
    idle: Mutex<Vec<FetchSlot>>,
    returned: Condvar,
    capacity: usize,
}

impl SlotPool {
    /// Open `capacity` slots on `engine`. A zero capacity is raised to one.
    pub fn new(engine: &AsyncFetchEngine, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let slots = (0..capacity).map(|_| engine.open_slot()).collect();
        Self {
            idle: Mutex::new(slots),
            returned: Condvar::new(),
            capacity,
        }
    }

    /// Run `f` with a borrowed slot.
    ///
    /// Waits up to `timeout` for a slot to become free and returns `None`
    /// if none does. The slot is closed before it goes back to the pool.
    pub fn with_slot<R>(&self, timeout: Duration, f: impl FnOnce(&mut FetchSlot) -> R) -> Option<R> {
        let deadline = Instant::now() + timeout;
        let mut slot = {
            let mut idle = self.idle.lock();
            loop {
                if let Some(slot) = idle.pop() {
                    break slot;
                }
                if self.returned.wait_until(&mut idle, deadline).timed_out() {
                    break idle.pop()?;
                }
            }
        };

        let result = f(&mut slot);
        slot.close();

        self.idle.lock().push(slot);
        self.returned.notify_one();
        Some(result)
    }

    /// Slots currently free.
    pub fn available(&self) -> usize {
        self.idle.lock().len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl std::fmt::Debug for SlotPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotPool")
            .field("capacity", &self.capacity)
            .field("available", &self.available())
            .finish()
    }
}
