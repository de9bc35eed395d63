//! Admission control for inbound connections.
//!
//! The [`AdmissionGate`] is a counting permit pool. The listener takes a
//! [`Permit`] before every accept and hands it to the session it spawns;
//! the permit goes back to the pool when the session drops it, on every
//! exit path. While the pool is empty the listener simply stops
//! accepting and the kernel's listen backlog holds new clients.
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use log::trace;

#[derive(Debug)]
struct GateState {
    permits: usize,
    closed: bool,
}

#[derive(Debug)]
struct GateInner {
    capacity: usize,
    state: Mutex<GateState>,
    released: Condvar,
}

impl GateInner {
    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug, Clone)]
pub struct AdmissionGate {
    inner: Arc<GateInner>,
}

impl AdmissionGate {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(GateInner {
                capacity,
                state: Mutex::new(GateState {
                    permits: capacity,
                    closed: false,
                }),
                released: Condvar::new(),
            }),
        }
    }

    /// Blocks until a permit is free.
    ///
    /// Returns `None` once the gate has been closed, including when the
    /// close happens while this call is waiting.
    pub fn acquire(&self) -> Option<Permit> {
        let mut state = self.inner.lock();
        while state.permits == 0 && !state.closed {
            state = self
                .inner
                .released
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        self.take(&mut state)
    }

    pub fn try_acquire(&self) -> Option<Permit> {
        let mut state = self.inner.lock();
        self.take(&mut state)
    }

    /// Refuses all future acquisitions and wakes blocked callers.
    /// Outstanding permits still return to the pool when dropped.
    pub fn close(&self) {
        self.inner.lock().closed = true;
        self.inner.released.notify_all();
    }

    pub fn available(&self) -> usize {
        self.inner.lock().permits
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    fn take(&self, state: &mut GateState) -> Option<Permit> {
        if state.closed || state.permits == 0 {
            return None;
        }
        state.permits -= 1;
        trace!("permit acquired, {} left", state.permits);
        Some(Permit {
            inner: Arc::clone(&self.inner),
        })
    }
}

/// A single unit of admission capacity, returned to its gate on drop.
#[derive(Debug)]
pub struct Permit {
    inner: Arc<GateInner>,
}

impl Drop for Permit {
    fn drop(&mut self) {
        let mut state = self.inner.lock();
        state.permits += 1;
        debug_assert!(state.permits <= self.inner.capacity);
        trace!("permit released, {} left", state.permits);
        drop(state);
        self.inner.released.notify_one();
    }
}
