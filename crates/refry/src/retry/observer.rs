//! Hooks notified before each backoff wait.

use std::fmt::Display;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Duration;

/// Receives a notification each time a failed attempt is about to be retried.
///
/// Observers are side-effecting collaborators only: they cannot influence the
/// retry loop, and a panicking observer is contained and logged.
///
/// Any `Fn(u32, Duration, &E)` closure is an observer:
///
/// ```rust
/// use refry::retry::RetryObserver;
/// use std::time::Duration;
///
/// let observer = |attempt: u32, wait: Duration, error: &std::io::Error| {
///     eprintln!("attempt {attempt} failed ({error}), waiting {wait:?}");
/// };
/// observer.on_retry(1, Duration::from_secs(1), &std::io::Error::other("busy"));
/// ```
pub trait RetryObserver<E>: Send + Sync {
    /// Called after a retryable failure, before sleeping.
    ///
    /// # Parameters
    /// - `attempt`: 1-based number of the attempt that failed
    /// - `wait`: how long the executor will wait before the next attempt
    /// - `error`: the error the attempt failed with
    fn on_retry(&self, attempt: u32, wait: Duration, error: &E);
}

impl<E, F> RetryObserver<E> for F
where
    F: Fn(u32, Duration, &E) + Send + Sync,
{
    fn on_retry(&self, attempt: u32, wait: Duration, error: &E) {
        self(attempt, wait, error)
    }
}

/// Observer that ignores every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl<E> RetryObserver<E> for NoopObserver {
    fn on_retry(&self, _attempt: u32, _wait: Duration, _error: &E) {}
}

/// Observer that reports retries as `tracing` events.
///
/// Emits one `WARN` event per retried attempt with the fields `attempt`,
/// `retries`, `wait_secs` and `error`.
#[derive(Debug, Clone, Copy)]
pub struct TracingObserver {
    retries: u32,
}

impl TracingObserver {
    /// Create an observer that reports attempts out of `retries`.
    pub fn new(retries: u32) -> Self {
        Self { retries }
    }
}

impl<E: Display> RetryObserver<E> for TracingObserver {
    fn on_retry(&self, attempt: u32, wait: Duration, error: &E) {
        tracing::warn!(
            attempt = attempt,
            retries = self.retries,
            wait_secs = wait.as_secs_f64(),
            error = %error,
            "Attempt {} failed, retrying in {:.2} seconds",
            attempt,
            wait.as_secs_f64()
        );
    }
}

/// Notify an observer, containing any panic it raises.
pub(crate) fn notify<E>(observer: &dyn RetryObserver<E>, attempt: u32, wait: Duration, error: &E) {
    let outcome = catch_unwind(AssertUnwindSafe(|| observer.on_retry(attempt, wait, error)));
    if outcome.is_err() {
        tracing::warn!(attempt = attempt, "retry observer panicked; continuing");
    }
}
