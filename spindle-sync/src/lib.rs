//! Blocking synchronization primitives routed through the `spindle-io`
//! capability surface.
//!
//! [`Mutex::lock`] and [`Condition::wait`] suspend through [`Io::park`], so
//! a contended task yields to whichever backend is active instead of
//! spinning. Unlock and signal are synchronous and never suspend.
#![deny(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    clippy::missing_safety_doc
)]
use std::cell::UnsafeCell;
use std::collections::VecDeque;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::sync::{self, Arc};

use spindle_io::{Io, ParkSlot};

/// A mutual-exclusion lock whose blocking path goes through the active
/// backend.
///
/// Contended [`Mutex::lock`] calls queue in FIFO order and park through
/// [`Io::park`]; unlock hands the lock directly to the longest waiter, so
/// no waiter can be starved by a stream of later arrivals. Unlock happens
/// when the [`MutexGuard`] drops and never suspends.
pub struct Mutex<T> {
    inner: sync::Mutex<LockState>,
    value: UnsafeCell<T>,
}

// The value is only reachable through a held guard, making Mutex<T> usable
// from multiple threads whenever T itself may move between them.
unsafe impl<T: Send> Send for Mutex<T> {}
unsafe impl<T: Send> Sync for Mutex<T> {}

struct LockState {
    locked: bool,
    waiters: VecDeque<Arc<ParkSlot>>,
}

impl<T: std::fmt::Debug> std::fmt::Debug for Mutex<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.lock().unwrap();
        let mut d = f.debug_struct("Mutex");
        d.field("locked", &state.locked);
        if !state.locked {
            // Safety: the lock is free, so no guard aliases the value.
            d.field("value", unsafe { &*self.value.get() });
        }
        d.finish()
    }
}

impl<T> Mutex<T> {
    /// Create an unlocked mutex holding `value`.
    pub fn new(value: T) -> Self {
        Self {
            inner: sync::Mutex::new(LockState {
                locked: false,
                waiters: VecDeque::new(),
            }),
            value: UnsafeCell::new(value),
        }
    }

    /// Acquire the lock, suspending through `io` while contended.
    ///
    /// Returns a guard granting access to the value; dropping the guard
    /// unlocks. Lock acquisition is a suspension point; everything done
    /// while holding the guard, and the unlock itself, is ordinary
    /// synchronous code.
    pub fn lock<'m>(&'m self, io: Io<'_>) -> MutexGuard<'m, T> {
        let slot = {
            let mut state = self.inner.lock().unwrap();
            if !state.locked {
                state.locked = true;
                return MutexGuard::new(self);
            }
            let slot = Arc::new(ParkSlot::new());
            state.waiters.push_back(slot.clone());
            slot
        };
        // Direct handoff: the unlocker that pops our slot leaves the mutex
        // locked on our behalf, so waking is acquiring.
        io.park(&slot);
        MutexGuard::new(self)
    }

    /// Consume the mutex and return the inner value.
    pub fn into_inner(self) -> T {
        self.value.into_inner()
    }

    fn unlock(&self) {
        let mut state = self.inner.lock().unwrap();
        debug_assert!(state.locked, "unlock of an unlocked mutex");
        if let Some(waiter) = state.waiters.pop_front() {
            waiter.wake();
        } else {
            state.locked = false;
        }
    }
}

/// Access to a [`Mutex`]'s value; unlocks on drop.
#[must_use = "the lock is released immediately if the guard is dropped"]
pub struct MutexGuard<'a, T> {
    mutex: &'a Mutex<T>,
    /// Keeps the guard on the locking thread, matching the handoff
    /// discipline in [`Mutex::unlock`].
    _not_send: PhantomData<*mut ()>,
}

impl<T: std::fmt::Debug> std::fmt::Debug for MutexGuard<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutexGuard").field("value", &**self).finish()
    }
}

impl<'a, T> MutexGuard<'a, T> {
    fn new(mutex: &'a Mutex<T>) -> Self {
        Self {
            mutex,
            _not_send: PhantomData,
        }
    }
}

impl<T> Deref for MutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Safety: a guard exists only while its thread holds the lock.
        unsafe { &*self.mutex.value.get() }
    }
}

impl<T> DerefMut for MutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // Safety: see Deref; the guard is unique while the lock is held.
        unsafe { &mut *self.mutex.value.get() }
    }
}

impl<T> Drop for MutexGuard<'_, T> {
    fn drop(&mut self) {
        self.mutex.unlock();
    }
}

/// How many waiters a [`Condition::signal`] call releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    /// Wake the longest-waiting task, if any.
    One,
    /// Wake every current waiter.
    All,
}

/// A condition variable paired with a [`Mutex`], following the standard
/// monitor contract.
///
/// [`Condition::wait`] atomically releases the mutex and suspends; on
/// wakeup it reacquires the mutex before returning. As with any monitor,
/// waiters should re-check their predicate in a loop.
#[derive(Default)]
pub struct Condition {
    waiters: sync::Mutex<VecDeque<Arc<ParkSlot>>>,
}

impl std::fmt::Debug for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Condition")
            .field("waiters", &self.waiters.lock().unwrap().len())
            .finish()
    }
}

impl Condition {
    /// Create a condition with no waiters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Release `guard`, suspend until signalled, then reacquire the lock.
    ///
    /// The waiter is registered before the mutex is released, so a signal
    /// issued by the next lock holder cannot slip between release and
    /// suspension.
    pub fn wait<'m, T>(&self, io: Io<'_>, guard: MutexGuard<'m, T>) -> MutexGuard<'m, T> {
        let mutex = guard.mutex;
        let slot = Arc::new(ParkSlot::new());
        self.waiters.lock().unwrap().push_back(slot.clone());
        drop(guard);
        io.park(&slot);
        mutex.lock(io)
    }

    /// Wake one or all waiters. Never suspends.
    ///
    /// Woken tasks contend for the associated mutex as usual; by the time
    /// one runs, the state it was signalled about may have changed again.
    pub fn signal(&self, kind: SignalKind) {
        let mut waiters = self.waiters.lock().unwrap();
        match kind {
            SignalKind::One => {
                if let Some(waiter) = waiters.pop_front() {
                    waiter.wake();
                }
            }
            SignalKind::All => {
                for waiter in waiters.drain(..) {
                    waiter.wake();
                }
            }
        }
    }
}
