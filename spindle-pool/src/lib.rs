//! The reference thread-pool backend for `spindle-io`.
//!
//! [`ThreadPool`] owns a FIFO run queue and a bounded set of worker
//! threads. Admission follows a fixed ladder: hand work to a spare idle
//! worker, spawn a new worker while under the configured limit, and
//! otherwise queue behind the busy workers. Queued entries stay claimable:
//! a caller that blocks on one runs it in place, so joining starved work
//! always makes progress even when every worker is stuck. Synchronous
//! execution at launch time is reserved for pools that cannot have workers
//! at all, so launching never blocks on capacity and never fails.
//!
//! ```rust
//! use spindle_pool::ThreadPool;
//!
//! let pool = ThreadPool::new();
//! let io = pool.io();
//! let mut fut = io.launch(|_| 1 + 1);
//! assert_eq!(*fut.join(io), 2);
//! ```
#![deny(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    clippy::missing_safety_doc
)]
use std::collections::VecDeque;
use std::mem;
use std::num::NonZeroUsize;
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::thread;
use std::time::Duration;

use spindle_io::{
    Backend, Canceled, ClockKind, ConcurrencyUnavailable, Io, TaskBody, TaskRecord, TaskRef,
};

mod worker;

/// Configuration for a [`ThreadPool`].
#[derive(Debug, Clone)]
pub struct Options {
    /// Maximum worker threads available to best-effort [`Io::launch`]
    /// tasks. Defaults to the number of available processing units. A limit
    /// of zero yields a pool with no workers where every launch runs on the
    /// calling thread.
    pub async_limit: usize,
    /// Maximum number of in-flight [`Io::launch_concurrent`] tasks.
    /// `None` means unbounded. A limit of zero makes every
    /// `launch_concurrent` fail immediately.
    pub concurrent_limit: Option<usize>,
    /// Worker threads spawned up front, capped by `async_limit`. Defaults
    /// to zero; workers otherwise spawn on demand.
    pub initial_workers: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            async_limit: thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1),
            concurrent_limit: None,
            initial_workers: 0,
        }
    }
}

impl Options {
    /// Default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap best-effort parallelism at `limit` worker threads.
    pub fn with_async_limit(mut self, limit: usize) -> Self {
        self.async_limit = limit;
        self
    }

    /// Cap guaranteed parallelism at `limit` in-flight tasks.
    pub fn with_concurrent_limit(mut self, limit: usize) -> Self {
        self.concurrent_limit = Some(limit);
        self
    }

    /// Warm-start the pool with `count` workers.
    pub fn with_initial_workers(mut self, count: usize) -> Self {
        self.initial_workers = count;
        self
    }
}

/// A thread-pool implementation of the [`Backend`] capability surface.
///
/// Dropping the pool flags shutdown, wakes every worker, drains the run
/// queue, and joins all worker threads. Outstanding queued tasks are run to
/// completion during the drain.
pub struct ThreadPool {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadPool")
            .field("async_limit", &self.shared.async_limit)
            .field("concurrent_limit", &self.shared.concurrent_limit)
            .finish()
    }
}

impl Default for ThreadPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ThreadPool {
    /// Create a pool with default [`Options`].
    pub fn new() -> Self {
        Self::with_options(Options::default())
    }

    /// Create a pool with the provided [`Options`].
    pub fn with_options(options: Options) -> Self {
        let shared = Arc::new_cyclic(|me| Shared {
            me: me.clone(),
            async_limit: options.async_limit,
            concurrent_limit: options.concurrent_limit,
            state: Mutex::new(PoolState {
                queue: VecDeque::new(),
                idle: 0,
                threads: 0,
                concurrent_active: 0,
                next_worker_id: 0,
                shutdown: false,
                handles: Vec::new(),
            }),
            work_available: Condvar::new(),
        });
        let warm = options.initial_workers.min(options.async_limit);
        if warm > 0 {
            let mut state = shared.state.lock().unwrap();
            for _ in 0..warm {
                if !shared.spawn_worker(&mut state, None) {
                    break;
                }
            }
        }
        Self { shared }
    }

    /// The capability value for this pool, handed to application code.
    pub fn io(&self) -> Io<'_> {
        Io::new(&*self.shared)
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        log::trace!("shutting down thread pool");
        let handles = {
            let mut state = self.shared.state.lock().unwrap();
            state.shutdown = true;
            self.shared.work_available.notify_all();
            mem::take(&mut state.handles)
        };
        for handle in handles {
            let _ = handle.join();
        }
    }
}

pub(crate) struct Shared {
    me: Weak<Shared>,
    async_limit: usize,
    concurrent_limit: Option<usize>,
    state: Mutex<PoolState>,
    work_available: Condvar,
}

pub(crate) struct PoolState {
    queue: VecDeque<QueueEntry>,
    /// Workers currently blocked waiting for work.
    idle: usize,
    /// Live worker threads.
    threads: usize,
    /// In-flight tasks admitted through `launch_concurrent`.
    concurrent_active: usize,
    next_worker_id: usize,
    shutdown: bool,
    handles: Vec<thread::JoinHandle<()>>,
}

pub(crate) struct QueueEntry {
    task: TaskRef,
    /// Concurrent tasks must not be run in place by a joining worker; their
    /// thread-of-control guarantee would be lost.
    concurrent: bool,
}

impl Shared {
    /// Spawn one worker thread, optionally handing it `first` to run before
    /// it starts serving the shared queue. Returns `false` if the spawn
    /// failed; the failure is isolated to this call and the pool remains
    /// usable.
    fn spawn_worker(&self, state: &mut PoolState, first: Option<TaskRef>) -> bool {
        let Some(shared) = self.me.upgrade() else {
            return false;
        };
        let id = state.next_worker_id;
        state.next_worker_id += 1;
        let builder = thread::Builder::new().name(format!("spindle-worker-{id}"));
        match builder.spawn(move || worker::run(shared, first)) {
            Ok(handle) => {
                state.threads += 1;
                state.handles.push(handle);
                true
            }
            Err(err) => {
                log::warn!("failed to spawn worker thread: {err}");
                false
            }
        }
    }

    /// Spawn a dedicated thread for one concurrently-admitted task.
    ///
    /// The thread runs exactly that task and exits; it never serves the
    /// shared queue and is not counted in `threads`, so `async_limit`
    /// keeps binding best-effort work no matter how many concurrent tasks
    /// have been admitted.
    fn spawn_concurrent(&self, state: &mut PoolState, task: TaskRef) -> bool {
        let Some(shared) = self.me.upgrade() else {
            return false;
        };
        let id = state.next_worker_id;
        state.next_worker_id += 1;
        let builder = thread::Builder::new().name(format!("spindle-concurrent-{id}"));
        match builder.spawn(move || worker::execute(&shared, &task)) {
            Ok(handle) => {
                state.handles.push(handle);
                true
            }
            Err(err) => {
                log::warn!("failed to spawn concurrent task thread: {err}");
                false
            }
        }
    }

    /// True if an idle worker exists beyond those already spoken for by
    /// queued entries.
    ///
    /// `idle` alone is stale: a worker notified for an earlier enqueue
    /// still counts as idle until it wakes, and it will pop that earlier
    /// entry first.
    fn has_spare_worker(&self, state: &PoolState) -> bool {
        state.idle > state.queue.len()
    }

    fn enqueue(&self, state: &mut PoolState, task: &TaskRef, concurrent: bool) {
        state.queue.push_back(QueueEntry {
            task: task.clone(),
            concurrent,
        });
        self.work_available.notify_one();
    }

    /// Remove `task` from the run queue if it is still pending there and
    /// may be run in place.
    fn try_claim(&self, task: &TaskRecord) -> Option<TaskRef> {
        let mut state = self.state.lock().unwrap();
        let position = state
            .queue
            .iter()
            .position(|entry| !entry.concurrent && std::ptr::eq(&*entry.task, task))?;
        state.queue.remove(position).map(|entry| entry.task)
    }

    pub(crate) fn next_task(&self) -> Option<TaskRef> {
        let mut state = self.state.lock().unwrap();
        loop {
            if let Some(entry) = state.queue.pop_front() {
                // Chain the wakeup so one notification per enqueue cannot
                // strand work behind a single woken worker.
                if !state.queue.is_empty() && state.idle > 0 {
                    self.work_available.notify_one();
                }
                return Some(entry.task);
            }
            if state.shutdown {
                state.threads -= 1;
                return None;
            }
            state.idle += 1;
            state = self.work_available.wait(state).unwrap();
            state.idle -= 1;
        }
    }
}

impl Backend for Shared {
    fn launch(&self, body: TaskBody) -> TaskRef {
        let task = TaskRecord::new(body);
        let mut state = self.state.lock().unwrap();
        if self.has_spare_worker(&state) {
            self.enqueue(&mut state, &task, false);
            return task;
        }
        if !state.shutdown
            && state.threads < self.async_limit
            && self.spawn_worker(&mut state, Some(task.clone()))
        {
            return task;
        }
        if state.threads > 0 {
            // All workers busy: queue behind them rather than borrowing the
            // caller's thread up front, so launches admitted in sequence
            // drain at the pool's configured width. The entry stays
            // claimable through `advance` for any caller that blocks on it.
            self.enqueue(&mut state, &task, false);
            return task;
        }
        drop(state);
        // The pool cannot have workers (async_limit is zero, or the only
        // spawn attempt failed). Run on the caller; launch has no error
        // path and must not wait for capacity.
        log::trace!("no workers available, running task on the caller");
        worker::execute(self, &task);
        task
    }

    fn launch_concurrent(&self, body: TaskBody) -> Result<TaskRef, ConcurrencyUnavailable> {
        let mut state = self.state.lock().unwrap();
        if state.shutdown {
            return Err(ConcurrencyUnavailable);
        }
        if let Some(limit) = self.concurrent_limit {
            if state.concurrent_active >= limit {
                return Err(ConcurrencyUnavailable);
            }
        }
        let Some(shared) = self.me.upgrade() else {
            return Err(ConcurrencyUnavailable);
        };
        // The slot decrements `concurrent_active` when the body finishes,
        // panic included.
        let body: TaskBody = Box::new(move |io: Io<'_>| {
            let _slot = ConcurrentSlot(shared);
            body(io)
        });
        let task = TaskRecord::new(body);
        state.concurrent_active += 1;
        // A spare idle worker picks the entry up ahead of anything queued
        // later, so the concurrency guarantee holds; a busy or obligated
        // worker is never trusted with it. Otherwise the task gets a
        // thread of its own.
        if self.has_spare_worker(&state) {
            self.enqueue(&mut state, &task, true);
            return Ok(task);
        }
        if self.spawn_concurrent(&mut state, task.clone()) {
            Ok(task)
        } else {
            state.concurrent_active -= 1;
            Err(ConcurrencyUnavailable)
        }
    }

    fn advance(&self, task: &TaskRecord) -> bool {
        // A caller blocking on a task that is still sitting in the queue
        // runs it in place. Without this, callers could park forever on
        // work that is runnable but starved behind stuck workers.
        match self.try_claim(task) {
            Some(claimed) => {
                worker::execute(self, &claimed);
                true
            }
            None => false,
        }
    }

    fn sleep(&self, duration: Duration, clock: ClockKind) -> Result<(), Canceled> {
        worker::with_current(|current| match current {
            Some(task) => task.sleep(duration, clock),
            None => {
                // Not inside a task; nothing can cancel this sleep.
                thread::sleep(duration);
                Ok(())
            }
        })
    }

    fn cancel_requested(&self) -> bool {
        worker::with_current(|current| current.is_some_and(TaskRecord::cancel_requested))
    }
}

struct ConcurrentSlot(Arc<Shared>);

impl Drop for ConcurrentSlot {
    fn drop(&mut self) {
        let mut state = self.0.state.lock().unwrap();
        state.concurrent_active -= 1;
    }
}
