//! Capacity-1 rendezvous slot between the scan worker and a waiting caller.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

/// A blocking operation was interrupted because the session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation cancelled")]
pub struct Cancelled;

#[derive(Debug)]
struct SlotState<T> {
    value: Option<T>,
    closed: bool,
}

/// A single-value handoff.
///
/// `put` blocks while the slot is full, `take` blocks while it is empty.
/// Once closed, blocked and future callers get [`Cancelled`], except that
/// a value already in the slot can still be taken.
#[derive(Debug)]
pub struct HandoffSlot<T> {
    state: Mutex<SlotState<T>>,
    changed: Condvar,
}

impl<T> Default for HandoffSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> HandoffSlot<T> {
    /// An empty, open slot.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SlotState {
                value: None,
                closed: false,
            }),
            changed: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SlotState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, SlotState<T>>) -> MutexGuard<'a, SlotState<T>> {
        self.changed
            .wait(guard)
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Places a value, waiting for the slot to drain first.
    pub fn put(&self, value: T) -> Result<(), Cancelled> {
        self.put_unless(value, || false)
    }

    /// Like [`put`](Self::put), but gives up once `abort` returns true.
    ///
    /// `abort` is checked under the slot lock, so a value is never stored
    /// after `abort` has started returning true.
    pub fn put_unless(&self, value: T, abort: impl Fn() -> bool) -> Result<(), Cancelled> {
        let mut state = self.lock();
        loop {
            if state.closed || abort() {
                return Err(Cancelled);
            }
            if state.value.is_none() {
                break;
            }
            state = self.wait(state);
        }
        state.value = Some(value);
        drop(state);
        self.changed.notify_all();
        Ok(())
    }

    /// Removes the value, waiting for one to arrive.
    pub fn take(&self) -> Result<T, Cancelled> {
        let mut state = self.lock();
        loop {
            if let Some(value) = state.value.take() {
                drop(state);
                self.changed.notify_all();
                return Ok(value);
            }
            if state.closed {
                return Err(Cancelled);
            }
            state = self.wait(state);
        }
    }

    /// Removes the value if one is present.
    pub fn try_take(&self) -> Option<T> {
        let value = self.lock().value.take();
        if value.is_some() {
            self.changed.notify_all();
        }
        value
    }

    /// Closes the slot and releases every waiter.
    pub fn close(&self) {
        self.lock().closed = true;
        self.changed.notify_all();
    }

    /// Returns true once the slot has been closed.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Returns true if no value is waiting.
    pub fn is_empty(&self) -> bool {
        self.lock().value.is_none()
    }
}
