//! Worker threads and the current-task context.
use std::cell::RefCell;
use std::sync::Arc;

use spindle_io::{Io, TaskRecord, TaskRef};

use crate::Shared;

thread_local! {
    /// The task record executing on this thread, if any. Backs
    /// `cancel_requested` and in-task `sleep`. A stack is maintained
    /// through guard save/restore because a task can run another task in
    /// place (inline fallback, or a claim of a queued task the caller
    /// blocks on).
    static CURRENT: RefCell<Option<TaskRef>> = const { RefCell::new(None) };
}

struct CurrentGuard {
    prev: Option<TaskRef>,
}

impl CurrentGuard {
    fn enter(task: TaskRef) -> Self {
        let prev = CURRENT.with(|cell| cell.borrow_mut().replace(task));
        Self { prev }
    }
}

impl Drop for CurrentGuard {
    fn drop(&mut self) {
        let prev = self.prev.take();
        CURRENT.with(|cell| *cell.borrow_mut() = prev);
    }
}

/// Run `f` with the task currently executing on this thread, if any.
pub(crate) fn with_current<R>(f: impl FnOnce(Option<&TaskRecord>) -> R) -> R {
    CURRENT.with(|cell| {
        let current = cell.borrow();
        f(current.as_deref())
    })
}

/// Execute `task` on the calling thread with the current-task context set.
pub(crate) fn execute(shared: &Shared, task: &TaskRef) {
    let _guard = CurrentGuard::enter(task.clone());
    task.run(Io::new(shared));
}

/// The worker thread main loop: run the directly-handed task if any, then
/// pop and execute from the shared queue until shutdown drains it.
pub(crate) fn run(shared: Arc<Shared>, first: Option<TaskRef>) {
    log::trace!("worker started");
    if let Some(task) = first {
        execute(&shared, &task);
    }
    while let Some(task) = shared.next_task() {
        execute(&shared, &task);
    }
    log::trace!("worker exiting");
}
