/// Error returned by [`Io::launch_concurrent`] when the backend cannot
/// guarantee that the task runs concurrently with the caller.
///
/// This happens when the backend has exhausted its concurrent capacity, or
/// does not support true parallelism at all. The error is recoverable: the
/// caller may retry later, fall back to [`Io::launch`], or propagate it.
///
/// [`Io::launch`]: crate::Io::launch
/// [`Io::launch_concurrent`]: crate::Io::launch_concurrent
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("backend cannot guarantee concurrent execution")]
pub struct ConcurrencyUnavailable;

/// Error returned by suspension points that observed a cancellation request.
///
/// Returned by [`Io::sleep`] when the calling task was asked to cancel while
/// suspended. Task bodies are expected to surface this as their own result.
///
/// [`Io::sleep`]: crate::Io::sleep
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("a cancellation request was observed")]
pub struct Canceled;
