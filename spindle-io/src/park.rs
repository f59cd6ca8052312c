//! Wakeup plumbing shared by backends and the primitives built above them.
use std::sync::{Arc, Condvar, Mutex};

/// A one-shot wakeup slot.
///
/// A [`ParkSlot`] holds a single wake token. [`ParkSlot::wait`] blocks until
/// a token is present and consumes it; [`ParkSlot::wake`] deposits one. A
/// token deposited before the wait begins is not lost: the wait returns
/// immediately. This absorbs the race between a waiter deciding to suspend
/// and a waker firing.
///
/// Waiting through [`Io::park`] rather than on the slot directly keeps the
/// suspension under the control of the active backend.
///
/// [`Io::park`]: crate::Io::park
#[derive(Debug, Default)]
pub struct ParkSlot {
    woken: Mutex<bool>,
    condvar: Condvar,
}

impl ParkSlot {
    /// Create an empty slot with no pending wake token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Deposit a wake token, releasing a current or future waiter.
    ///
    /// Never suspends, and may be called from any thread.
    pub fn wake(&self) {
        let mut woken = self.woken.lock().unwrap();
        *woken = true;
        self.condvar.notify_one();
    }

    /// Block the calling thread until a wake token arrives, then consume it.
    ///
    /// Backends without a more suitable suspension mechanism use this as
    /// their [`Backend::park`] implementation.
    ///
    /// [`Backend::park`]: crate::Backend::park
    pub fn wait(&self) {
        let mut woken = self.woken.lock().unwrap();
        while !*woken {
            woken = self.condvar.wait(woken).unwrap();
        }
        *woken = false;
    }
}

/// A shared completion signal for racing several tasks.
///
/// Each racing task registers a [`SelectWaiter`] carrying a clone of the
/// same signal and the task's position in the race. The first completion to
/// fire records its position as the winner; later completions only deposit
/// wake tokens. The racing caller loops on [`SelectSignal::winner`] and
/// parks on [`SelectSignal::slot`] in between.
#[derive(Debug)]
pub struct SelectSignal {
    winner: Mutex<Option<usize>>,
    slot: ParkSlot,
}

impl SelectSignal {
    /// Create a signal with no winner yet.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            winner: Mutex::new(None),
            slot: ParkSlot::new(),
        })
    }

    /// The position of the first task to complete, if any completed yet.
    pub fn winner(&self) -> Option<usize> {
        *self.winner.lock().unwrap()
    }

    /// The slot a racing caller parks on between winner checks.
    pub fn slot(&self) -> &ParkSlot {
        &self.slot
    }

    fn complete(&self, index: usize) {
        let mut winner = self.winner.lock().unwrap();
        if winner.is_none() {
            *winner = Some(index);
        }
        drop(winner);
        self.slot.wake();
    }
}

/// A registration of one racing task against a [`SelectSignal`].
///
/// Handed to [`TaskRecord::subscribe`]; fired by the backend when the task
/// completes.
///
/// [`TaskRecord::subscribe`]: crate::TaskRecord::subscribe
#[derive(Debug)]
pub struct SelectWaiter {
    signal: Arc<SelectSignal>,
    index: usize,
}

impl SelectWaiter {
    /// Register `signal` for the task at `index` in the race.
    pub fn new(signal: Arc<SelectSignal>, index: usize) -> Self {
        Self { signal, index }
    }

    pub(crate) fn fire(self) {
        self.signal.complete(self.index);
    }

    pub(crate) fn belongs_to(&self, signal: &Arc<SelectSignal>) -> bool {
        Arc::ptr_eq(&self.signal, signal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wake_before_wait_is_not_lost() {
        let slot = ParkSlot::new();
        slot.wake();
        slot.wait();
    }

    #[test]
    fn first_completion_wins() {
        let signal = SelectSignal::new();
        SelectWaiter::new(signal.clone(), 2).fire();
        SelectWaiter::new(signal.clone(), 0).fire();
        assert_eq!(signal.winner(), Some(2));
    }
}
