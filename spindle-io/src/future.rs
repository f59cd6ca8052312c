use std::panic;
use std::sync::Arc;

use crate::record::TaskRef;
use crate::Io;

/// A caller-held handle to a launched task's eventual result.
///
/// A [`Future`] is consumed by its first [`Future::join`] or
/// [`Future::cancel`]: the call blocks until the task completes, moves the
/// result into a local cache, and releases the task record. Every later
/// `join`/`cancel` on the same handle returns the cached value without
/// touching the backend. This idempotence is a hard contract, not an
/// optimization.
///
/// A [`Future`] is designed for a single logical owner; it is not meant to
/// be joined concurrently from multiple threads (and `join` taking
/// `&mut self` enforces as much).
///
/// Dropping an unconsumed [`Future`] detaches the task: the body keeps
/// running and its result is discarded.
#[must_use = "a Future's task result is lost unless joined or cancelled"]
pub struct Future<R> {
    state: State<R>,
}

enum State<R> {
    /// Unconsumed; the record is still owned by the backend.
    Pending(TaskRef),
    /// Consumed; the cached result.
    Ready(R),
    /// Consumed, but the task panicked and its payload was rethrown.
    Poisoned,
}

impl<R> std::fmt::Debug for Future<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &self.state {
            State::Pending(_) => "Pending",
            State::Ready(_) => "Ready",
            State::Poisoned => "Poisoned",
        };
        f.debug_struct("Future").field("state", &state).finish()
    }
}

impl<R: Send + 'static> Future<R> {
    pub(crate) fn new(task: TaskRef) -> Self {
        Self {
            state: State::Pending(task),
        }
    }

    /// Block until the task completes and return its result.
    ///
    /// The first call consumes the task record; subsequent calls return the
    /// cached value immediately.
    ///
    /// ### Panics
    /// If the task body panicked, the first consuming call rethrows the
    /// captured payload; later calls panic with a fixed message.
    pub fn join(&mut self, io: Io<'_>) -> &R {
        self.consume(io, false)
    }

    /// Request cancellation, then block until the task completes and return
    /// its result.
    ///
    /// Cancellation is a cooperative signal: the task body may observe it
    /// via [`Io::cancel_requested`] and wind down early, or run to its
    /// natural end. Either way the (possibly partial) result is returned.
    /// Idempotent identically to [`Future::join`].
    pub fn cancel(&mut self, io: Io<'_>) -> &R {
        self.consume(io, true)
    }

    /// Request cancellation without waiting.
    ///
    /// A no-op once the future is consumed. This exists so aggregates can
    /// signal a whole batch before joining any member of it.
    pub fn request_cancel(&self) {
        if let State::Pending(task) = &self.state {
            task.request_cancel();
        }
    }

    /// Returns `true` if the result is available without blocking.
    pub fn is_completed(&self) -> bool {
        match &self.state {
            State::Pending(task) => task.is_completed(),
            State::Ready(_) | State::Poisoned => true,
        }
    }

    /// The underlying task record, or `None` once consumed.
    pub fn task(&self) -> Option<&TaskRef> {
        match &self.state {
            State::Pending(task) => Some(task),
            State::Ready(_) | State::Poisoned => None,
        }
    }

    fn consume(&mut self, io: Io<'_>, cancel: bool) -> &R {
        let pending = match &self.state {
            State::Pending(task) => Some(Arc::clone(task)),
            State::Ready(_) | State::Poisoned => None,
        };
        if let Some(task) = pending {
            if cancel {
                task.request_cancel();
            }
            io.backend().wait(&task);
            let output = task
                .take_output()
                .expect("task result consumed through another handle");
            match output {
                Ok(value) => {
                    let value = value
                        .downcast::<R>()
                        .expect("task output does not match Future type");
                    self.state = State::Ready(*value);
                }
                Err(payload) => {
                    self.state = State::Poisoned;
                    panic::resume_unwind(payload);
                }
            }
        }
        match &self.state {
            State::Ready(value) => value,
            State::Poisoned => panic!("task panicked"),
            State::Pending(_) => unreachable!("future consumed above"),
        }
    }
}
