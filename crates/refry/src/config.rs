//! Loadable retry settings.

use crate::error::{ConfigError, ConfigResult};
use crate::retry::{BackoffStrategy, RetryPolicy, increment_from_secs};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry settings in plain data form.
///
/// This is what an application reads from a config file or the environment;
/// [`RetryConfig::into_policy`] validates it and produces a [`RetryPolicy`].
/// Missing fields take their defaults, and an unrecognized
/// `backoff_strategy` name means sequential. The increment is written as
/// (possibly fractional) seconds and rejected on load if it is negative or
/// not a finite number.
///
/// # Examples
///
/// ```rust
/// use refry::config::RetryConfig;
/// use refry::retry::BackoffStrategy;
///
/// let config: RetryConfig = serde_json::from_str(
///     r#"{ "retries": 3, "backoff_increment": 0.5, "backoff_strategy": "exponential" }"#,
/// ).unwrap();
///
/// assert_eq!(config.backoff_strategy, BackoffStrategy::Exponential);
/// let policy = config.into_policy::<std::io::Error>().unwrap();
/// assert_eq!(policy.retries(), 3);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first
    pub retries: u32,

    /// Backoff increment, as seconds in serialized form
    #[serde(with = "secs")]
    pub backoff_increment: Duration,

    /// Backoff formula
    pub backoff_strategy: BackoffStrategy,

    /// Add random jitter in `[0, backoff_increment)` to each wait
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            retries: 5,
            backoff_increment: Duration::from_secs(5),
            backoff_strategy: BackoffStrategy::Sequential,
            jitter: false,
        }
    }
}

impl RetryConfig {
    /// Set the maximum number of attempts.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Set the backoff increment.
    pub fn with_backoff_increment(mut self, increment: Duration) -> Self {
        self.backoff_increment = increment;
        self
    }

    /// Set the backoff strategy.
    pub fn with_backoff_strategy(mut self, strategy: BackoffStrategy) -> Self {
        self.backoff_strategy = strategy;
        self
    }

    /// Enable or disable jitter.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Load configuration from environment variables.
    ///
    /// This will look for:
    /// - `REFRY_RETRIES` for the attempt budget (must be a valid u32)
    /// - `REFRY_BACKOFF_INCREMENT` for the increment in seconds (must be a
    ///   finite, non-negative number)
    /// - `REFRY_BACKOFF_STRATEGY` for the strategy name (unknown names mean sequential)
    /// - `REFRY_JITTER` for jitter (`true`/`false`/`1`/`0`)
    ///
    /// Unset variables keep their defaults. Unparseable values give
    /// [`ConfigError::InvalidEnv`]; an increment that parses but is out of
    /// range gives [`ConfigError::InvalidIncrement`]. The attempt budget is
    /// checked later, in [`RetryConfig::into_policy`].
    pub fn from_env() -> ConfigResult<Self> {
        use std::env;

        let mut config = Self::default();

        if let Ok(value) = env::var("REFRY_RETRIES") {
            config.retries = value.trim().parse::<u32>().map_err(|_| ConfigError::InvalidEnv {
                var: "REFRY_RETRIES",
                value: value.clone(),
            })?;
        }

        if let Ok(value) = env::var("REFRY_BACKOFF_INCREMENT") {
            let secs = value.trim().parse::<f64>().map_err(|_| ConfigError::InvalidEnv {
                var: "REFRY_BACKOFF_INCREMENT",
                value: value.clone(),
            })?;
            config.backoff_increment = increment_from_secs(secs)?;
        }

        if let Ok(value) = env::var("REFRY_BACKOFF_STRATEGY") {
            config.backoff_strategy = BackoffStrategy::from_name(&value);
        }

        if let Ok(value) = env::var("REFRY_JITTER") {
            config.jitter = match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => {
                    return Err(ConfigError::InvalidEnv {
                        var: "REFRY_JITTER",
                        value,
                    });
                }
            };
        }

        Ok(config)
    }

    /// Validate and build a policy that retries every error.
    ///
    /// Narrow it afterwards with [`RetryConfig::into_builder`] and
    /// `retry_if` if only some errors are transient.
    pub fn into_policy<E>(self) -> ConfigResult<RetryPolicy<E>> {
        self.into_builder().build()
    }

    /// A policy builder preloaded with these settings.
    pub fn into_builder<E>(self) -> crate::retry::RetryPolicyBuilder<E> {
        RetryPolicy::builder()
            .retries(self.retries)
            .backoff_increment(self.backoff_increment)
            .backoff_strategy(self.backoff_strategy)
            .jitter(self.jitter)
    }
}

/// Serde adapter storing a `Duration` as float seconds.
mod secs {
    use super::increment_from_secs;
    use serde::{Deserialize, Deserializer, Serializer, de};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        increment_from_secs(secs).map_err(de::Error::custom)
    }
}
