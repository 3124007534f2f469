//! The retry loop.

use super::observer::{self, RetryObserver, TracingObserver};
use super::policy::RetryPolicy;
use super::sleeper::{Sleeper, ThreadSleeper};
use crate::error::RetryError;
use std::fmt;
use std::future::Future;
use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

/// Per-invocation bookkeeping. Never shared between calls.
#[derive(Debug)]
struct AttemptState<E> {
    /// Zero-based index of the attempt about to run.
    attempt_index: u32,
    /// Most recent retryable failure, held across the wait.
    ///
    /// Only cancellation reads it, to hand the error back in
    /// [`RetryError::Cancelled`]; permanent and exhausted outcomes carry the
    /// fresh error directly.
    last_error: Option<E>,
}

impl<E> AttemptState<E> {
    fn new() -> Self {
        Self {
            attempt_index: 0,
            last_error: None,
        }
    }
}

/// Runs operations under a [`RetryPolicy`].
///
/// The executor owns the policy, an optional observer and the sleeper used by
/// the blocking [`execute`](Self::execute). It holds no per-call state, so one
/// executor can be shared (or cloned) across threads and tasks freely.
///
/// # Examples
///
/// ```rust
/// use refry::retry::{RetryExecutor, RetryPolicy};
/// use std::time::Duration;
///
/// let policy = RetryPolicy::builder()
///     .retries(3)
///     .backoff_increment(Duration::from_millis(1))
///     .build()
///     .unwrap();
/// let executor = RetryExecutor::new(policy);
///
/// let mut calls = 0;
/// let result = executor.execute(|| {
///     calls += 1;
///     if calls < 3 { Err("busy") } else { Ok(calls) }
/// });
///
/// assert_eq!(result.unwrap(), 3);
/// ```
pub struct RetryExecutor<E> {
    policy: RetryPolicy<E>,
    observer: Option<Arc<dyn RetryObserver<E>>>,
    sleeper: Arc<dyn Sleeper>,
}

impl<E> RetryExecutor<E> {
    /// Create an executor with no observer that blocks with [`ThreadSleeper`].
    pub fn new(policy: RetryPolicy<E>) -> Self {
        Self {
            policy,
            observer: None,
            sleeper: Arc::new(ThreadSleeper),
        }
    }

    /// Notify `observer` before every backoff wait.
    pub fn with_observer<O>(mut self, observer: O) -> Self
    where
        O: RetryObserver<E> + 'static,
    {
        self.observer = Some(Arc::new(observer));
        self
    }

    /// Report every retry as a `tracing` event (see [`TracingObserver`]).
    pub fn with_tracing(self) -> Self
    where
        E: fmt::Display,
    {
        let retries = self.policy.retries();
        self.with_observer(TracingObserver::new(retries))
    }

    /// Replace the sleeper used by [`execute`](Self::execute).
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// The policy this executor applies.
    pub fn policy(&self) -> &RetryPolicy<E> {
        &self.policy
    }

    /// Run `operation`, blocking the calling thread between attempts.
    ///
    /// # Returns
    /// - `Ok(T)`: the first successful result
    /// - `Err(RetryError::Permanent)`: the first non-retryable error, untouched,
    ///   with the number of attempts made so far
    /// - `Err(RetryError::Exhausted)`: the last error after `retries` failures
    pub fn execute<T, F>(&self, mut operation: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Result<T, E>,
    {
        self.log_start();
        let mut state = AttemptState::new();
        loop {
            match operation() {
                Ok(value) => return Ok(value),
                Err(err) => {
                    let wait = self.record_failure(&mut state, err)?;
                    self.sleeper.sleep(wait);
                }
            }
        }
    }

    /// Run an async `operation`, suspending with `tokio::time::sleep` between attempts.
    ///
    /// Dropping the returned future cancels the invocation, including
    /// mid-wait.
    pub async fn execute_async<T, F, Fut>(&self, operation: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.execute_async_until(operation, std::future::pending())
            .await
    }

    /// Like [`execute_async`](Self::execute_async), but give up when `cancel` resolves.
    ///
    /// `cancel` is only observed during backoff waits; a running attempt is
    /// always allowed to finish. On cancellation the result is
    /// [`RetryError::Cancelled`] carrying the error that triggered the wait.
    pub async fn execute_async_until<T, F, Fut, C>(
        &self,
        mut operation: F,
        cancel: C,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: Future<Output = ()>,
    {
        self.log_start();
        let mut cancel = pin!(cancel);
        let mut state = AttemptState::new();
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    let wait = self.record_failure(&mut state, err)?;
                    tokio::select! {
                        () = tokio::time::sleep(wait) => {}
                        () = &mut cancel => {
                            tracing::info!(
                                attempts = state.attempt_index,
                                "retry cancelled during backoff"
                            );
                            return Err(RetryError::Cancelled {
                                attempts: state.attempt_index,
                                last: state.last_error.take(),
                            });
                        }
                    }
                }
            }
        }
    }

    /// Turn `operation` into a closure with the same call shape that retries
    /// under this executor.
    ///
    /// ```rust
    /// use refry::retry::{RetryExecutor, RetryPolicy};
    ///
    /// let policy = RetryPolicy::builder().retries(2).backoff_increment_secs(0.0).build().unwrap();
    /// let mut fetch = RetryExecutor::new(policy).wrap(|| Ok::<_, String>("payload"));
    ///
    /// assert_eq!(fetch().unwrap(), "payload");
    /// ```
    pub fn wrap<T, F>(self, mut operation: F) -> impl FnMut() -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Result<T, E>,
    {
        move || self.execute(&mut operation)
    }

    /// Wrap a one-argument operation. Each attempt receives a clone of the
    /// argument; use a tuple for several arguments.
    pub fn wrap_with<A, T, F>(self, mut operation: F) -> impl FnMut(A) -> Result<T, RetryError<E>>
    where
        A: Clone,
        F: FnMut(A) -> Result<T, E>,
    {
        move |arg: A| self.execute(|| operation(arg.clone()))
    }

    fn log_start(&self) {
        tracing::debug!(
            backoff_strategy = %self.policy.backoff_strategy(),
            backoff_increment_secs = self.policy.backoff_increment().as_secs_f64(),
            jitter = self.policy.jitter(),
            retries = self.policy.retries(),
            "Applying retry policy"
        );
    }

    /// Classify a failure and either schedule the next wait or end the loop.
    fn record_failure(&self, state: &mut AttemptState<E>, err: E) -> Result<Duration, RetryError<E>> {
        if !self.policy.is_retryable(&err) {
            tracing::debug!(
                attempt = state.attempt_index + 1,
                "error is not retryable, propagating"
            );
            return Err(RetryError::Permanent {
                attempts: state.attempt_index + 1,
                source: err,
            });
        }

        let attempts = state.attempt_index + 1;
        if attempts >= self.policy.retries() {
            tracing::error!(attempts = attempts, "All {} retries failed", attempts);
            return Err(RetryError::Exhausted {
                attempts,
                source: err,
            });
        }

        let wait = self.policy.next_delay(state.attempt_index);
        if let Some(observer) = &self.observer {
            observer::notify(observer.as_ref(), attempts, wait, &err);
        }
        tracing::trace!(
            attempt = attempts,
            wait_secs = wait.as_secs_f64(),
            "waiting before next attempt"
        );

        state.last_error = Some(err);
        state.attempt_index = attempts;
        Ok(wait)
    }
}

impl<E> Clone for RetryExecutor<E> {
    fn clone(&self) -> Self {
        Self {
            policy: self.policy.clone(),
            observer: self.observer.clone(),
            sleeper: Arc::clone(&self.sleeper),
        }
    }
}

impl<E> fmt::Debug for RetryExecutor<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("policy", &self.policy)
            .field("observer", &self.observer.is_some())
            .finish_non_exhaustive()
    }
}

/// Run `operation` once under `policy`, blocking between attempts.
///
/// Shorthand for `RetryExecutor::new(policy.clone()).execute(operation)`.
pub fn retry<T, E, F>(policy: &RetryPolicy<E>, operation: F) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Result<T, E>,
{
    RetryExecutor::new(policy.clone()).execute(operation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::BackoffStrategy;
    use crate::retry::sleeper::testing::RecordingSleeper;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, Clone, PartialEq, thiserror::Error)]
    enum TestError {
        #[error("rate limited")]
        RateLimited,
        #[error("invalid input")]
        Invalid,
    }

    fn executor(
        retries: u32,
        strategy: BackoffStrategy,
        jitter: bool,
    ) -> (RetryExecutor<TestError>, Arc<RecordingSleeper>) {
        let policy = RetryPolicy::builder()
            .retries(retries)
            .backoff_increment(Duration::from_secs(1))
            .backoff_strategy(strategy)
            .jitter(jitter)
            .retry_if(|err: &TestError| matches!(err, TestError::RateLimited))
            .build()
            .unwrap();
        let sleeper = Arc::new(RecordingSleeper::default());
        let executor = RetryExecutor::new(policy).with_sleeper(sleeper.clone());
        (executor, sleeper)
    }

    #[test]
    fn test_immediate_success() {
        let (executor, sleeper) = executor(3, BackoffStrategy::Sequential, false);
        let mut calls = 0;

        let result = executor.execute(|| {
            calls += 1;
            Ok::<_, TestError>("success")
        });

        assert_eq!(result.unwrap(), "success");
        assert_eq!(calls, 1);
        assert!(sleeper.waits().is_empty());
    }

    #[test]
    fn test_eventual_success() {
        let (executor, sleeper) = executor(5, BackoffStrategy::Sequential, false);
        let mut calls = 0;

        let result = executor.execute(|| {
            calls += 1;
            if calls < 3 {
                Err(TestError::RateLimited)
            } else {
                Ok(calls)
            }
        });

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls, 3);
        assert_eq!(
            sleeper.waits(),
            vec![Duration::from_secs(1), Duration::from_secs(2)]
        );
    }

    #[test]
    fn test_exhausted_returns_original_error() {
        let (executor, sleeper) = executor(3, BackoffStrategy::Sequential, false);
        let mut calls = 0;

        let result: Result<(), _> = executor.execute(|| {
            calls += 1;
            Err(TestError::RateLimited)
        });

        let err = result.unwrap_err();
        assert!(err.is_exhausted());
        assert_eq!(err.attempts(), 3);
        assert_eq!(err.into_inner(), Some(TestError::RateLimited));
        assert_eq!(calls, 3);
        // No wait after the final attempt
        assert_eq!(sleeper.waits().len(), 2);
    }

    #[test]
    fn test_non_retryable_propagates_immediately() {
        let (executor, sleeper) = executor(5, BackoffStrategy::Exponential, true);
        let mut calls = 0;

        let result: Result<(), _> = executor.execute(|| {
            calls += 1;
            Err(TestError::Invalid)
        });

        let err = result.unwrap_err();
        assert!(err.is_permanent());
        assert_eq!(err.into_inner(), Some(TestError::Invalid));
        assert_eq!(calls, 1);
        assert!(sleeper.waits().is_empty());
    }

    #[test]
    fn test_non_retryable_after_retryable() {
        let (executor, sleeper) = executor(5, BackoffStrategy::Sequential, false);
        let mut calls = 0;

        let result: Result<(), _> = executor.execute(|| {
            calls += 1;
            if calls == 1 {
                Err(TestError::RateLimited)
            } else {
                Err(TestError::Invalid)
            }
        });

        let err = result.unwrap_err();
        assert!(err.is_permanent());
        assert_eq!(err.attempts(), 2);
        assert!(matches!(err.inner(), Some(TestError::Invalid)));
        assert_eq!(calls, 2);
        assert_eq!(sleeper.waits(), vec![Duration::from_secs(1)]);
    }

    #[test]
    fn test_single_attempt_policy() {
        let (executor, sleeper) = executor(1, BackoffStrategy::Sequential, false);
        let mut calls = 0;

        let result: Result<(), _> = executor.execute(|| {
            calls += 1;
            Err(TestError::RateLimited)
        });

        assert!(result.unwrap_err().is_exhausted());
        assert_eq!(calls, 1);
        assert!(sleeper.waits().is_empty());
    }

    #[test]
    fn test_strategy_schedules() {
        let cases = [
            (BackoffStrategy::Sequential, vec![1.0, 2.0, 3.0]),
            (BackoffStrategy::Exponential, vec![1.0, 2.0, 4.0]),
            (BackoffStrategy::Logarithmic, vec![2f64.ln(), 3f64.ln(), 4f64.ln()]),
        ];

        for (strategy, expected) in cases {
            let (executor, sleeper) = executor(4, strategy, false);
            let _ = executor.execute(|| Err::<(), _>(TestError::RateLimited));

            let waits = sleeper.waits();
            assert_eq!(waits.len(), expected.len(), "{strategy}");
            for (wait, want) in waits.iter().zip(expected) {
                assert!(
                    (wait.as_secs_f64() - want).abs() < 1e-6,
                    "{strategy}: expected {want}s, got {wait:?}"
                );
            }
        }
    }

    #[test]
    fn test_jitter_never_reduces_total_wait() {
        for strategy in [
            BackoffStrategy::Sequential,
            BackoffStrategy::Logarithmic,
            BackoffStrategy::Exponential,
        ] {
            for _ in 0..25 {
                let (executor, sleeper) = executor(3, strategy, true);
                let _ = executor.execute(|| Err::<(), _>(TestError::RateLimited));

                let minimum = executor.policy().max_total_wait();
                assert!(sleeper.total() >= minimum);
                // Two waits, each with less than one increment of jitter
                assert!(sleeper.total() < minimum + Duration::from_secs(2));
            }
        }
    }

    #[test]
    fn test_observer_sees_each_retry() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let (executor, _sleeper) = executor(3, BackoffStrategy::Exponential, false);
        let executor = executor.with_observer(move |attempt: u32, wait: Duration, err: &TestError| {
            seen_clone.lock().unwrap().push((attempt, wait, err.clone()));
        });

        let _ = executor.execute(|| Err::<(), _>(TestError::RateLimited));

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                (1, Duration::from_secs(1), TestError::RateLimited),
                (2, Duration::from_secs(2), TestError::RateLimited),
            ]
        );
    }

    #[test]
    fn test_panicking_observer_does_not_abort_retries() {
        fn exploding(_: u32, _: Duration, _: &TestError) {
            panic!("observer failure");
        }

        let (executor, sleeper) = executor(3, BackoffStrategy::Sequential, false);
        let executor = executor.with_observer(exploding);
        let mut calls = 0;

        let result = executor.execute(|| {
            calls += 1;
            if calls < 3 {
                Err(TestError::RateLimited)
            } else {
                Ok("recovered")
            }
        });

        assert_eq!(result.unwrap(), "recovered");
        assert_eq!(sleeper.waits().len(), 2);
    }

    #[test]
    fn test_tracing_observer_wiring() {
        let (executor, _sleeper) = executor(2, BackoffStrategy::Sequential, false);
        let executor = executor.with_tracing();

        let result: Result<(), _> = executor.execute(|| Err(TestError::RateLimited));
        assert!(result.unwrap_err().is_exhausted());
    }

    #[test]
    fn test_wrap_preserves_call_shape() {
        let (executor, sleeper) = executor(3, BackoffStrategy::Sequential, false);
        let calls = AtomicU32::new(0);

        let mut wrapped = executor.wrap(|| {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(TestError::RateLimited)
            } else {
                Ok("ok")
            }
        });

        assert_eq!(wrapped().unwrap(), "ok");
        // Each call of the wrapper is an independent invocation
        assert_eq!(wrapped().unwrap(), "ok");
        drop(wrapped);

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(sleeper.waits(), vec![Duration::from_secs(1)]);
    }

    #[test]
    fn test_wrap_with_argument() {
        let (executor, _sleeper) = executor(3, BackoffStrategy::Sequential, false);
        let mut seen = Vec::new();

        let mut double = executor.wrap_with(|(a, b): (u32, u32)| {
            seen.push((a, b));
            if seen.len() < 2 {
                Err(TestError::RateLimited)
            } else {
                Ok((a + b) * 2)
            }
        });

        assert_eq!(double((1, 2)).unwrap(), 6);
        drop(double);
        assert_eq!(seen, vec![(1, 2), (1, 2)]);
    }

    #[test]
    fn test_retry_free_function() {
        let policy = RetryPolicy::<TestError>::builder()
            .retries(2)
            .backoff_increment(Duration::ZERO)
            .build()
            .unwrap();
        let mut calls = 0;

        let result: Result<(), _> = retry(&policy, || {
            calls += 1;
            Err(TestError::Invalid)
        });

        // Default predicate retries everything
        assert!(result.unwrap_err().is_exhausted());
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_concurrent_invocations_are_independent() {
        let (executor, sleeper) = executor(3, BackoffStrategy::Sequential, false);

        std::thread::scope(|scope| {
            for _ in 0..4 {
                let executor = &executor;
                scope.spawn(move || {
                    let mut calls = 0;
                    let result = executor.execute(|| {
                        calls += 1;
                        if calls < 2 {
                            Err(TestError::RateLimited)
                        } else {
                            Ok(calls)
                        }
                    });
                    assert_eq!(result.unwrap(), 2);
                });
            }
        });

        // One 1s wait per invocation
        assert_eq!(sleeper.waits(), vec![Duration::from_secs(1); 4]);
    }

    #[test]
    fn test_async_immediate_success() {
        let (executor, _) = executor(3, BackoffStrategy::Sequential, false);

        let result = tokio_test::block_on(
            executor.execute_async(|| async { Ok::<_, TestError>(42) }),
        );

        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test(start_paused = true)]
    async fn test_async_sequential_timing() {
        let (executor, _) = executor(3, BackoffStrategy::Sequential, false);
        let calls = AtomicU32::new(0);
        let start = tokio::time::Instant::now();

        let result: Result<(), _> = executor
            .execute_async(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(TestError::RateLimited) }
            })
            .await;

        assert!(result.unwrap_err().is_exhausted());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 1s + 2s
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(3), "waited {elapsed:?}");
        assert!(elapsed < Duration::from_millis(3050), "waited {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_async_cancel_during_wait() {
        let (executor, _) = executor(5, BackoffStrategy::Sequential, false);
        let calls = AtomicU32::new(0);

        // Waits are 1s then 2s; cancel lands inside the second wait.
        let result: Result<(), _> = executor
            .execute_async_until(
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err(TestError::RateLimited) }
                },
                tokio::time::sleep(Duration::from_millis(1500)),
            )
            .await;

        let err = result.unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(err.attempts(), 2);
        assert_eq!(err.into_inner(), Some(TestError::RateLimited));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_async_drop_cancels() {
        let (executor, _) = executor(5, BackoffStrategy::Exponential, false);
        let calls = AtomicU32::new(0);

        let outcome = tokio::time::timeout(
            Duration::from_millis(500),
            executor.execute_async(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(TestError::RateLimited) }
            }),
        )
        .await;

        assert!(outcome.is_err(), "timeout should have dropped the retry loop");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
