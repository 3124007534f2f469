//! Error types for retried operations and retry configuration.

use thiserror::Error;

/// Result type alias for configuration that can fail validation.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Terminal failure of a retried operation.
///
/// The operation's own error is never replaced: every variant that carries
/// one hands it back unchanged through [`RetryError::into_inner`], and the
/// permanent and exhausted cases also expose it as the
/// [`std::error::Error::source`].
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// The operation failed with an error the policy does not retry.
    ///
    /// Returned on first occurrence, possibly after earlier retryable
    /// failures. `Display` is the operation's own message.
    #[error("{source}")]
    Permanent {
        /// Number of times the operation was invoked, including the failing one.
        attempts: u32,
        /// The non-retryable error.
        #[source]
        source: E,
    },

    /// Every attempt failed with a retryable error.
    #[error("all {attempts} attempts failed: {source}")]
    Exhausted {
        /// Number of times the operation was invoked.
        attempts: u32,
        /// The error raised by the final attempt.
        #[source]
        source: E,
    },

    /// The caller cancelled the invocation while it was waiting to retry.
    #[error("retry cancelled after {attempts} attempts")]
    Cancelled {
        /// Number of times the operation was invoked before cancellation.
        attempts: u32,
        /// The retryable error that triggered the interrupted wait.
        last: Option<E>,
    },
}

impl<E> RetryError<E> {
    /// Recover the operation's original error, if there is one.
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Permanent { source, .. } | Self::Exhausted { source, .. } => Some(source),
            Self::Cancelled { last, .. } => last,
        }
    }

    /// Borrow the operation's original error, if there is one.
    pub fn inner(&self) -> Option<&E> {
        match self {
            Self::Permanent { source, .. } | Self::Exhausted { source, .. } => Some(source),
            Self::Cancelled { last, .. } => last.as_ref(),
        }
    }

    /// How many times the operation was invoked.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Permanent { attempts, .. }
            | Self::Exhausted { attempts, .. }
            | Self::Cancelled { attempts, .. } => *attempts,
        }
    }

    /// Whether the retry budget ran out.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }

    /// Whether the failure was classified as non-retryable.
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent { .. })
    }

    /// Whether the invocation was cancelled during a backoff wait.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Invalid retry configuration, reported when a policy is built.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// `retries` must allow at least one attempt.
    #[error("retries must be at least 1, got {0}")]
    InvalidRetries(u32),

    /// The backoff increment must be a finite, non-negative number of seconds.
    #[error("backoff increment must be a finite, non-negative number of seconds, got {0}")]
    InvalidIncrement(f64),

    /// An environment variable held a value that could not be parsed.
    #[error("{var} has an invalid value: '{value}'")]
    InvalidEnv {
        /// Variable name
        var: &'static str,
        /// Raw value found in the environment
        value: String,
    },
}
