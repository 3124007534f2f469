//! Immutable retry policies and their builder.

use super::strategy::{BackoffStrategy, secs_to_duration};
use crate::error::{ConfigError, ConfigResult};
use rand::Rng;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

type Predicate<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

/// Backoff increment as handed to the builder.
///
/// A `Duration` is already valid and is kept bit-for-bit; only float seconds
/// need checking.
#[derive(Debug, Clone, Copy)]
enum Increment {
    Exact(Duration),
    Secs(f64),
}

impl Increment {
    fn resolve(self) -> ConfigResult<Duration> {
        match self {
            Self::Exact(increment) => Ok(increment),
            Self::Secs(secs) => increment_from_secs(secs),
        }
    }
}

/// Convert a backoff increment given in seconds, rejecting values that are
/// negative, NaN, infinite, or too large for a `Duration`.
pub(crate) fn increment_from_secs(secs: f64) -> ConfigResult<Duration> {
    if !secs.is_finite() || secs < 0.0 {
        return Err(ConfigError::InvalidIncrement(secs));
    }
    Duration::try_from_secs_f64(secs).map_err(|_| ConfigError::InvalidIncrement(secs))
}

/// How many times to attempt an operation and how long to wait in between.
///
/// A policy is validated once, when built, and is immutable afterwards.
/// Cloning is cheap and clones share the retry predicate, so one policy can
/// back any number of concurrent invocations.
///
/// # Examples
///
/// ```rust
/// use refry::retry::{BackoffStrategy, RetryPolicy};
/// use std::time::Duration;
///
/// let policy = RetryPolicy::<std::io::Error>::builder()
///     .retries(3)
///     .backoff_increment(Duration::from_millis(100))
///     .backoff_strategy(BackoffStrategy::Exponential)
///     .retry_if(|err| err.kind() == std::io::ErrorKind::TimedOut)
///     .build()
///     .unwrap();
///
/// assert_eq!(policy.base_delay(2), Duration::from_millis(400));
/// ```
pub struct RetryPolicy<E> {
    retries: u32,
    increment: Duration,
    strategy: BackoffStrategy,
    jitter: bool,
    retryable: Option<Predicate<E>>,
}

impl<E> RetryPolicy<E> {
    /// Create a new builder with the default settings.
    ///
    /// Defaults:
    /// - `retries`: 5
    /// - `backoff_increment`: 5s
    /// - `backoff_strategy`: sequential
    /// - `jitter`: off
    /// - every error is retryable
    pub fn builder() -> RetryPolicyBuilder<E> {
        RetryPolicyBuilder::default()
    }

    /// Maximum number of attempts, including the first.
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Seed value shared by every backoff strategy.
    pub fn backoff_increment(&self) -> Duration {
        self.increment
    }

    /// The active backoff formula.
    pub fn backoff_strategy(&self) -> BackoffStrategy {
        self.strategy
    }

    /// Whether random jitter is added to each wait.
    pub fn jitter(&self) -> bool {
        self.jitter
    }

    /// Whether `error` should be retried.
    pub fn is_retryable(&self, error: &E) -> bool {
        self.retryable
            .as_ref()
            .is_none_or(|predicate| predicate(error))
    }

    /// Unjittered wait after the zero-based `attempt` fails.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        self.strategy.base_delay(attempt, self.increment)
    }

    /// Wait after the zero-based `attempt` fails, jittered with the thread RNG.
    pub fn next_delay(&self, attempt: u32) -> Duration {
        self.next_delay_with(attempt, &mut rand::thread_rng())
    }

    /// Wait after the zero-based `attempt` fails, using `rng` for jitter.
    ///
    /// Jitter is additive: the result lies in `[base, base + increment)`.
    pub fn next_delay_with<R: Rng>(&self, attempt: u32, rng: &mut R) -> Duration {
        let base = self.base_delay(attempt);
        if !self.jitter || self.increment.is_zero() {
            return base;
        }
        // The sample is below the increment in f64, but rounding back to
        // whole nanoseconds can land on it.
        let ceiling = self.increment - Duration::from_nanos(1);
        let sample = rng.gen_range(0.0..self.increment.as_secs_f64());
        base.saturating_add(secs_to_duration(sample).min(ceiling))
    }

    /// Total unjittered time spent waiting if every attempt fails.
    ///
    /// There are `retries - 1` waits; the final attempt is not followed by one.
    pub fn max_total_wait(&self) -> Duration {
        (0..self.retries.saturating_sub(1))
            .map(|attempt| self.base_delay(attempt))
            .fold(Duration::ZERO, Duration::saturating_add)
    }
}

impl<E> Clone for RetryPolicy<E> {
    fn clone(&self) -> Self {
        Self {
            retries: self.retries,
            increment: self.increment,
            strategy: self.strategy,
            jitter: self.jitter,
            retryable: self.retryable.clone(),
        }
    }
}

impl<E> fmt::Debug for RetryPolicy<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("retries", &self.retries)
            .field("backoff_increment", &self.increment)
            .field("backoff_strategy", &self.strategy)
            .field("jitter", &self.jitter)
            .finish_non_exhaustive()
    }
}

/// Builder for [`RetryPolicy`].
///
/// Values are validated by [`RetryPolicyBuilder::build`], so a bad setting
/// is reported before the operation is ever invoked.
pub struct RetryPolicyBuilder<E> {
    retries: Option<u32>,
    increment: Option<Increment>,
    strategy: Option<BackoffStrategy>,
    jitter: Option<bool>,
    retryable: Option<Predicate<E>>,
}

impl<E> Default for RetryPolicyBuilder<E> {
    fn default() -> Self {
        Self {
            retries: None,
            increment: None,
            strategy: None,
            jitter: None,
            retryable: None,
        }
    }
}

impl<E> RetryPolicyBuilder<E> {
    /// Set the maximum number of attempts (the first attempt counts).
    ///
    /// Default: 5. Must be at least 1.
    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    /// Set the backoff increment.
    ///
    /// Default: 5s. Zero is allowed and disables waiting (except jitter,
    /// which is bounded by the increment and therefore also zero). The
    /// value is used exactly as given.
    pub fn backoff_increment(mut self, increment: Duration) -> Self {
        self.increment = Some(Increment::Exact(increment));
        self
    }

    /// Set the backoff increment in (possibly fractional) seconds.
    ///
    /// Negative, NaN and infinite values are rejected by `build`.
    pub fn backoff_increment_secs(mut self, secs: f64) -> Self {
        self.increment = Some(Increment::Secs(secs));
        self
    }

    /// Set the backoff formula.
    ///
    /// Default: [`BackoffStrategy::Sequential`].
    pub fn backoff_strategy(mut self, strategy: BackoffStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Set the backoff formula by name; unknown names mean sequential.
    pub fn strategy_name(self, name: &str) -> Self {
        self.backoff_strategy(BackoffStrategy::from_name(name))
    }

    /// Enable or disable additive jitter in `[0, increment)`.
    ///
    /// Default: off.
    pub fn jitter(mut self, jitter: bool) -> Self {
        self.jitter = Some(jitter);
        self
    }

    /// Only retry errors for which `predicate` returns `true`.
    ///
    /// Default: every error is retryable.
    pub fn retry_if<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.retryable = Some(Arc::new(predicate));
        self
    }

    /// Validate the settings and build the policy.
    ///
    /// # Errors
    /// - [`ConfigError::InvalidRetries`] if `retries` is 0
    /// - [`ConfigError::InvalidIncrement`] if an increment given in seconds
    ///   is negative, NaN, infinite, or too large for a `Duration`
    pub fn build(self) -> ConfigResult<RetryPolicy<E>> {
        let retries = self.retries.unwrap_or(5);
        if retries == 0 {
            return Err(ConfigError::InvalidRetries(retries));
        }

        let increment = self
            .increment
            .unwrap_or(Increment::Exact(Duration::from_secs(5)))
            .resolve()?;

        Ok(RetryPolicy {
            retries,
            increment,
            strategy: self.strategy.unwrap_or_default(),
            jitter: self.jitter.unwrap_or(false),
            retryable: self.retryable,
        })
    }
}

impl<E> fmt::Debug for RetryPolicyBuilder<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicyBuilder")
            .field("retries", &self.retries)
            .field("increment", &self.increment)
            .field("strategy", &self.strategy)
            .field("jitter", &self.jitter)
            .field("retry_if", &self.retryable.is_some())
            .finish()
    }
}
