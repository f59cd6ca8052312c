//! Batch and racing combinators over `spindle-io` futures.
//!
//! [`Group`] collects launched tasks for aggregate wait and cancel;
//! [`select`] races a fixed set of heterogeneous futures and reports the
//! first to complete. Both are built purely on [`Io`] operations, so they
//! behave identically on every backend.
#![deny(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    clippy::missing_safety_doc
)]
use std::panic::{self, AssertUnwindSafe};

use spindle_io::{Future, Io, SelectSignal, SelectWaiter, TaskRef};

/// An unordered batch of launched tasks with aggregate wait and cancel.
///
/// Tasks enter the group through [`Group::launch`]; their individual results
/// are discarded. [`Group::wait`] consumes every member exactly once, after
/// which the group is empty and may be reused for a fresh batch.
///
/// Completion order within a batch is unspecified and must not be relied
/// upon.
#[derive(Default)]
pub struct Group {
    members: Vec<Future<()>>,
}

impl std::fmt::Debug for Group {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Group")
            .field("members", &self.members.len())
            .finish()
    }
}

impl Group {
    /// Create an empty group.
    pub fn new() -> Self {
        Self::default()
    }

    /// Launch `body` and register the task with this group.
    ///
    /// Identical to [`Io::launch`] except that the resulting future is owned
    /// by the group: it is consumed by the next [`Group::wait`] or
    /// [`Group::cancel_all`] rather than by the caller.
    pub fn launch<F>(&mut self, io: Io<'_>, body: F)
    where
        F: FnOnce(Io<'_>) + Send + 'static,
    {
        self.members.push(io.launch(body));
    }

    /// Number of unconsumed members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Returns `true` if the group has no unconsumed members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Block until every member has completed.
    ///
    /// Joins each member exactly once. The group is empty afterwards.
    ///
    /// ### Panics
    /// If a member's body panicked, the first captured payload is rethrown,
    /// but only after every member has been consumed, so the batch is fully
    /// drained either way.
    pub fn wait(&mut self, io: Io<'_>) {
        let mut first_panic = None;
        for mut member in self.members.drain(..) {
            let joined = panic::catch_unwind(AssertUnwindSafe(|| {
                member.join(io);
            }));
            if let Err(payload) = joined {
                first_panic.get_or_insert(payload);
            }
        }
        if let Some(payload) = first_panic {
            panic::resume_unwind(payload);
        }
    }

    /// Request cancellation of every member, then wait for all of them.
    ///
    /// The requests are issued to the whole batch before any member is
    /// joined, so cooperative bodies wind down in parallel rather than one
    /// at a time.
    pub fn cancel_all(&mut self, io: Io<'_>) {
        for member in &self.members {
            member.request_cancel();
        }
        self.wait(io);
    }
}

/// A future that can take part in [`select`].
///
/// Implemented for every [`Future`]; the trait erases the result type so a
/// race can span heterogeneous futures.
pub trait Selectable {
    /// The underlying task record, or `None` if already consumed.
    fn task(&self) -> Option<&TaskRef>;
}

impl<R: Send + 'static> Selectable for Future<R> {
    fn task(&self) -> Option<&TaskRef> {
        self.task()
    }
}

/// Race `entries` and return the index of the first to complete.
///
/// Blocks until at least one entry's task has completed. Exactly one winner
/// is reported; ties are broken by the backend's completion signalling, and
/// an entry that already completed (or was already consumed) wins
/// immediately, lowest index first.
///
/// The non-winning futures are left untouched: still running, neither
/// consumed nor cancelled. The caller decides whether to `join`, `cancel`,
/// or abandon them. Joining the winner afterwards returns its cached result
/// without re-running anything.
///
/// The implementation registers one shared completion notification per
/// racing future and parks on it, so it does not require the backend to
/// support polling many futures cheaply. If every racing task is still
/// waiting for a thread, the race is decided by running one of them on the
/// calling thread rather than parking on a stalled backend.
///
/// ### Panics
/// Panics if `entries` is empty.
pub fn select(io: Io<'_>, entries: &[&dyn Selectable]) -> usize {
    assert!(!entries.is_empty(), "select requires at least one future");
    let signal = SelectSignal::new();
    for (index, entry) in entries.iter().enumerate() {
        let already_done = match entry.task() {
            // A consumed future has its result at hand.
            None => true,
            Some(task) => task.subscribe(SelectWaiter::new(signal.clone(), index)),
        };
        if already_done {
            unsubscribe(&signal, &entries[..index], None);
            return index;
        }
    }
    let winner = loop {
        if let Some(winner) = signal.winner() {
            break winner;
        }
        // Lend this thread to an entry still waiting for one; its
        // completion fires the signal. Park only when nothing is runnable
        // here.
        let advanced = entries
            .iter()
            .filter_map(|entry| entry.task())
            .any(|task| io.backend().advance(task));
        if !advanced {
            io.park(signal.slot());
        }
    };
    unsubscribe(&signal, entries, Some(winner));
    winner
}

fn unsubscribe(
    signal: &std::sync::Arc<SelectSignal>,
    entries: &[&dyn Selectable],
    winner: Option<usize>,
) {
    for (index, entry) in entries.iter().enumerate() {
        if Some(index) == winner {
            continue;
        }
        if let Some(task) = entry.task() {
            task.unsubscribe(signal);
        }
    }
}
