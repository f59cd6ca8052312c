//! Backend-agnostic blocking task execution.
//!
//! The central type is [`Io`], a small copyable capability value wrapping a
//! [`Backend`]. Application code passes an [`Io`] explicitly to every
//! operation that needs concurrency: launching work, joining or cancelling a
//! [`Future`], sleeping, or parking on a [`ParkSlot`]. Code written against
//! [`Io`] does not know whether work runs inline, on a thread pool, or on
//! some other execution substrate.
//!
//! # Components
//! - [`Io`]: the capability surface handed to application code.
//! - [`Backend`]: the swappable dispatch trait behind an [`Io`].
//! - [`TaskRecord`]: a backend's unit of schedulable work.
//! - [`Future`]: caller-held handle used to obtain or cancel a task's
//!   result exactly once.
#![deny(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    clippy::missing_safety_doc
)]
use std::time::Duration;

mod backend;
mod clock;
mod error;
mod future;
mod park;
mod record;


pub use backend::Backend;
pub use clock::ClockKind;
pub use error::{Canceled, ConcurrencyUnavailable};
pub use future::Future;
pub use park::{ParkSlot, SelectSignal, SelectWaiter};
pub use record::{Stage, TaskBody, TaskOutput, TaskRecord, TaskRef};

/// A capability value granting access to a concurrency [`Backend`].
///
/// [`Io`] is a pair of a dispatch reference and opaque backend state, passed
/// as an explicit argument to every operation that may suspend. It is `Copy`:
/// handing an [`Io`] to a task body or helper costs nothing and never
/// transfers ownership of the backend.
///
/// Multiple [`Io`] values may wrap the same backend. All operations performed
/// through one value are safe to interleave with operations on any other
/// value wrapping the same backend.
#[derive(Clone, Copy)]
pub struct Io<'a> {
    backend: &'a dyn Backend,
}

impl std::fmt::Debug for Io<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Io").finish()
    }
}

impl<'a> Io<'a> {
    /// Construct an [`Io`] from a backend reference.
    pub fn new(backend: &'a dyn Backend) -> Self {
        Self { backend }
    }

    /// Returns the underlying [`Backend`].
    pub fn backend(self) -> &'a dyn Backend {
        self.backend
    }

    /// Launch `body` as a new task, returning a [`Future`] for its result.
    ///
    /// This always succeeds. The backend is free to run the task immediately
    /// on the calling thread, defer it to a worker, or any mixture; callers
    /// must not assume either. The body receives its own [`Io`] so it can
    /// recursively launch, sleep, and poll for cancellation.
    pub fn launch<F, R>(self, body: F) -> Future<R>
    where
        F: FnOnce(Io<'_>) -> R + Send + 'static,
        R: Send + 'static,
    {
        Future::new(self.backend.launch(erase(body)))
    }

    /// Launch `body` with a guarantee that it executes concurrently with the
    /// caller.
    ///
    /// Unlike [`Io::launch`], the task is never run synchronously on the
    /// calling thread: either it begins executing (or is guaranteed to begin,
    /// once scheduled) on a separate thread of control, or the call fails
    /// with [`ConcurrencyUnavailable`]. Callers may recover by retrying,
    /// falling back to [`Io::launch`], or propagating the error.
    pub fn launch_concurrent<F, R>(self, body: F) -> Result<Future<R>, ConcurrencyUnavailable>
    where
        F: FnOnce(Io<'_>) -> R + Send + 'static,
        R: Send + 'static,
    {
        Ok(Future::new(self.backend.launch_concurrent(erase(body))?))
    }

    /// Suspend the calling task for `duration`, measured against `clock`.
    ///
    /// Returns [`Canceled`] if a cancellation request for the calling task
    /// was observed before the deadline.
    pub fn sleep(self, duration: Duration, clock: ClockKind) -> Result<(), Canceled> {
        self.backend.sleep(duration, clock)
    }

    /// Returns `true` if cancellation of the calling task has been requested.
    ///
    /// Cancellation is cooperative: a task body observes this flag
    /// voluntarily and decides how to wind down. Nothing is ever preempted.
    /// Outside of any task this always returns `false`.
    pub fn cancel_requested(self) -> bool {
        self.backend.cancel_requested()
    }

    /// Suspend the calling task until `slot` is woken.
    ///
    /// This is the building block for blocking primitives layered above the
    /// capability surface; see [`ParkSlot`].
    pub fn park(self, slot: &ParkSlot) {
        self.backend.park(slot);
    }
}

fn erase<F, R>(body: F) -> TaskBody
where
    F: FnOnce(Io<'_>) -> R + Send + 'static,
    R: Send + 'static,
{
    Box::new(move |io: Io<'_>| Box::new(body(io)) as TaskOutput)
}
