use std::time::{Duration, Instant, SystemTime};

/// The clock a sleep deadline is measured against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClockKind {
    /// A monotonic clock ([`Instant`]). Unaffected by wall-clock
    /// adjustments; the usual choice for timeouts.
    #[default]
    Monotonic,
    /// The wall clock ([`SystemTime`]). A sleep measured against this clock
    /// tracks adjustments made to the system time while it is in progress.
    Real,
}

/// A point in time on one of the [`ClockKind`] sources.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Deadline {
    Monotonic(Instant),
    Real(SystemTime),
}

impl Deadline {
    pub(crate) fn after(clock: ClockKind, duration: Duration) -> Self {
        match clock {
            ClockKind::Monotonic => Deadline::Monotonic(Instant::now() + duration),
            ClockKind::Real => Deadline::Real(SystemTime::now() + duration),
        }
    }

    /// Time left until the deadline, saturating at zero.
    pub(crate) fn remaining(&self) -> Duration {
        match self {
            Deadline::Monotonic(at) => at.saturating_duration_since(Instant::now()),
            Deadline::Real(at) => at
                .duration_since(SystemTime::now())
                .unwrap_or(Duration::ZERO),
        }
    }
}
