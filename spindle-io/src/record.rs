//! [`TaskRecord`] is the unit of schedulable work tracked by a backend.
//!
//! A record holds the task's boxed body until it runs, and its result slot
//! afterwards. Panics inside the body are captured into the result slot so a
//! failing task never unwinds into a worker loop; the panic resurfaces at
//! whichever caller eventually consumes the owning [`Future`].
//!
//! [`Future`]: crate::Future
use std::any::Any;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use crate::clock::Deadline;
use crate::park::{SelectSignal, SelectWaiter};
use crate::{Canceled, ClockKind, Io};

/// A type-erased task result, as produced by the task body.
pub type TaskOutput = Box<dyn Any + Send>;

/// A type-erased task body.
///
/// The body receives an [`Io`] wrapping whichever backend executes it, so
/// task code can recursively launch, sleep, and poll for cancellation.
pub type TaskBody = Box<dyn FnOnce(Io<'_>) -> TaskOutput + Send>;

/// A shared reference to a [`TaskRecord`].
pub type TaskRef = Arc<TaskRecord>;

/// Primary execution stage of a [`TaskRecord`].
///
/// Stages only move forward. The cancellation-request flag is orthogonal:
/// it may be set from `Pending` or `Running` and does not by itself change
/// the stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Created but not yet picked up by any thread.
    Pending,
    /// The body is executing.
    Running,
    /// The result slot is filled.
    Completed,
}

/// The unit of schedulable work: a callable and a slot for its result.
///
/// A record is exclusively owned by its backend until completion, after
/// which exactly one [`Future`] consumes the result. The result slot is
/// written once, under the record lock, before the completed stage becomes
/// observable; it is read-only afterwards.
///
/// [`Future`]: crate::Future
pub struct TaskRecord {
    inner: Mutex<Inner>,
    /// Signalled on completion and on cancellation requests, waking joiners
    /// and in-progress sleeps.
    completed: Condvar,
}

struct Inner {
    stage: Stage,
    cancel_requested: bool,
    body: Option<TaskBody>,
    output: Option<std::thread::Result<TaskOutput>>,
    waiters: Vec<SelectWaiter>,
}

impl std::fmt::Debug for TaskRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock().unwrap();
        f.debug_struct("TaskRecord")
            .field("stage", &inner.stage)
            .field("cancel_requested", &inner.cancel_requested)
            .finish()
    }
}

impl TaskRecord {
    /// Create a pending record for `body`.
    pub fn new(body: TaskBody) -> TaskRef {
        Arc::new(Self {
            inner: Mutex::new(Inner {
                stage: Stage::Pending,
                cancel_requested: false,
                body: Some(body),
                output: None,
                waiters: Vec::new(),
            }),
            completed: Condvar::new(),
        })
    }

    /// Execute the task body on the calling thread.
    ///
    /// Advances `Pending -> Running`, runs the body with `io`, captures its
    /// output (or panic payload) into the result slot, advances to
    /// `Completed`, and wakes joiners, sleepers, and registered select
    /// waiters. A panic in the body does not unwind out of this method.
    pub fn run(&self, io: Io<'_>) {
        let body = {
            let mut inner = self.inner.lock().unwrap();
            debug_assert_eq!(inner.stage, Stage::Pending, "task record run twice");
            inner.stage = Stage::Running;
            inner.body.take()
        };
        let Some(body) = body else {
            return;
        };
        let result = panic::catch_unwind(AssertUnwindSafe(move || body(io)));
        let waiters = {
            let mut inner = self.inner.lock().unwrap();
            inner.output = Some(result);
            inner.stage = Stage::Completed;
            self.completed.notify_all();
            mem::take(&mut inner.waiters)
        };
        // Fired outside the lock: the signal has its own synchronization.
        for waiter in waiters {
            waiter.fire();
        }
    }

    /// Request cooperative cancellation.
    ///
    /// Sets the cancellation flag and wakes an in-progress [`Io::sleep`].
    /// The body is never preempted; it observes the flag via
    /// [`Io::cancel_requested`] or not at all.
    pub fn request_cancel(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.stage != Stage::Completed && !inner.cancel_requested {
            inner.cancel_requested = true;
            self.completed.notify_all();
        }
    }

    /// Returns `true` if cancellation has been requested.
    pub fn cancel_requested(&self) -> bool {
        self.inner.lock().unwrap().cancel_requested
    }

    /// The current [`Stage`].
    pub fn stage(&self) -> Stage {
        self.inner.lock().unwrap().stage
    }

    /// Returns `true` once the result slot is filled.
    pub fn is_completed(&self) -> bool {
        self.stage() == Stage::Completed
    }

    /// Block the calling thread until the record completes.
    pub fn wait_completed(&self) {
        let mut inner = self.inner.lock().unwrap();
        while inner.stage != Stage::Completed {
            inner = self.completed.wait(inner).unwrap();
        }
    }

    /// Take the result out of the slot.
    ///
    /// Returns `None` if the record has not completed or the result was
    /// already taken. Exactly one caller observes `Some`.
    pub fn take_output(&self) -> Option<std::thread::Result<TaskOutput>> {
        self.inner.lock().unwrap().output.take()
    }

    /// Register a select waiter, to be fired on completion.
    ///
    /// Returns `true` (dropping `waiter`) if the record already completed;
    /// the caller should treat the race as won rather than wait.
    pub fn subscribe(&self, waiter: SelectWaiter) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if inner.stage == Stage::Completed {
            return true;
        }
        inner.waiters.push(waiter);
        false
    }

    /// Remove any waiter registered for `signal`.
    ///
    /// Called for the losers once a race has a winner, so a long-running
    /// task does not accumulate dead registrations.
    pub fn unsubscribe(&self, signal: &Arc<SelectSignal>) {
        let mut inner = self.inner.lock().unwrap();
        inner.waiters.retain(|waiter| !waiter.belongs_to(signal));
    }

    /// Suspend the calling thread on this record until `duration` elapses
    /// on `clock`, waking early with [`Canceled`] if cancellation is
    /// requested.
    ///
    /// Backends call this for [`Io::sleep`] issued from within the task.
    pub fn sleep(&self, duration: Duration, clock: ClockKind) -> Result<(), Canceled> {
        let deadline = Deadline::after(clock, duration);
        let mut inner = self.inner.lock().unwrap();
        loop {
            if inner.cancel_requested {
                return Err(Canceled);
            }
            let remaining = deadline.remaining();
            if remaining.is_zero() {
                return Ok(());
            }
            let (guard, _timeout) = self.completed.wait_timeout(inner, remaining).unwrap();
            inner = guard;
        }
    }
}
