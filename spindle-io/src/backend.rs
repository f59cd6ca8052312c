use std::time::Duration;

use crate::park::ParkSlot;
use crate::record::{TaskBody, TaskRecord, TaskRef};
use crate::{Canceled, ClockKind, ConcurrencyUnavailable};

/// A concrete scheduling strategy behind an [`Io`] value.
///
/// Implementations decide where and when task bodies run. The trait is
/// object safe: bodies and results cross it type-erased, and the typed
/// surface is recovered by [`Io`] and [`Future`].
///
/// The blocking operations (`wait`, `sleep`, `park`) are the backend's
/// suspension points. The default `wait` and `park` implementations block
/// the calling OS thread on the record's or slot's own condition variable,
/// which is the correct behavior for thread-per-task backends; backends
/// multiplexing many tasks onto fewer threads override them.
///
/// [`Io`]: crate::Io
/// [`Future`]: crate::Future
pub trait Backend: Send + Sync {
    /// Admit a new task. Must not fail and must not block indefinitely.
    ///
    /// The backend may run the body synchronously on the calling thread
    /// before returning, defer it to another thread, or queue it.
    fn launch(&self, body: TaskBody) -> TaskRef;

    /// Admit a new task that is guaranteed to run concurrently with the
    /// caller, or fail with [`ConcurrencyUnavailable`].
    ///
    /// On success the task either already began executing on a separate
    /// thread of control, or is guaranteed to once scheduled. This never
    /// falls back to synchronous execution on the calling thread.
    fn launch_concurrent(&self, body: TaskBody) -> Result<TaskRef, ConcurrencyUnavailable>;

    /// Run `task` on the calling thread if it is admitted but still
    /// waiting for a thread, returning `true` if it ran.
    ///
    /// Blocked callers use this to lend their thread to work they depend
    /// on, so a join or race never stalls on a task that is runnable but
    /// unscheduled. Backends that run every admitted task immediately
    /// have nothing to advance and keep the default.
    fn advance(&self, task: &TaskRecord) -> bool {
        let _ = task;
        false
    }

    /// Block the caller until `task` completes.
    fn wait(&self, task: &TaskRecord) {
        self.advance(task);
        task.wait_completed();
    }

    /// Suspend the calling task for `duration` measured on `clock`,
    /// returning [`Canceled`] if a cancellation request is observed first.
    fn sleep(&self, duration: Duration, clock: ClockKind) -> Result<(), Canceled>;

    /// Returns `true` if the calling task has been asked to cancel.
    ///
    /// Returns `false` when called from outside any task.
    fn cancel_requested(&self) -> bool;

    /// Suspend the caller until `slot` is woken.
    fn park(&self, slot: &ParkSlot) {
        slot.wait();
    }
}
