//! Backoff strategies: the wait-time formulas selected by a retry policy.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// The formula used to turn an attempt index into a wait.
///
/// Every strategy is seeded by the policy's backoff increment `I` and the
/// zero-based index of the attempt that just failed:
///
/// ```text
/// sequential   I * (attempt + 1)
/// logarithmic  ln(attempt + 2) * I
/// exponential  2^attempt * I
/// ```
///
/// # Examples
///
/// ```rust
/// use refry::retry::BackoffStrategy;
/// use std::time::Duration;
///
/// let increment = Duration::from_secs(1);
/// assert_eq!(BackoffStrategy::Sequential.base_delay(1, increment), Duration::from_secs(2));
/// assert_eq!(BackoffStrategy::Exponential.base_delay(3, increment), Duration::from_secs(8));
///
/// // Unknown names fall back to sequential.
/// assert_eq!(BackoffStrategy::from_name("fibonacci"), BackoffStrategy::Sequential);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    /// Linear growth. Also the fallback for unrecognized names.
    #[default]
    Sequential,
    /// Slow growth; `+2` keeps the first wait away from `ln(0)` and `ln(1)`.
    Logarithmic,
    /// Doubles every attempt.
    Exponential,
}

impl BackoffStrategy {
    /// Resolve a strategy by name, falling back to [`BackoffStrategy::Sequential`].
    ///
    /// Matching is case-insensitive and ignores surrounding whitespace.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "sequential" => Self::Sequential,
            "logarithmic" => Self::Logarithmic,
            "exponential" => Self::Exponential,
            other => {
                tracing::debug!(
                    strategy = other,
                    "unknown backoff strategy, falling back to sequential"
                );
                Self::Sequential
            }
        }
    }

    /// The canonical lowercase name of this strategy.
    pub fn name(self) -> &'static str {
        match self {
            Self::Sequential => "sequential",
            Self::Logarithmic => "logarithmic",
            Self::Exponential => "exponential",
        }
    }

    /// Multiplier applied to the increment for the given zero-based attempt.
    pub fn factor(self, attempt: u32) -> f64 {
        let attempt = f64::from(attempt);
        match self {
            Self::Sequential => attempt + 1.0,
            Self::Logarithmic => (attempt + 2.0).ln(),
            Self::Exponential => attempt.exp2(),
        }
    }

    /// Unjittered wait after the given zero-based attempt fails.
    ///
    /// Saturates at [`Duration::MAX`] instead of overflowing.
    pub fn base_delay(self, attempt: u32, increment: Duration) -> Duration {
        secs_to_duration(self.factor(attempt) * increment.as_secs_f64())
    }
}

/// Convert seconds to a `Duration`, clamping negatives to zero and overflow to `MAX`.
pub(crate) fn secs_to_duration(secs: f64) -> Duration {
    if secs.is_nan() || secs <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

impl fmt::Display for BackoffStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BackoffStrategy {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_name(s))
    }
}

impl<'de> Deserialize<'de> for BackoffStrategy {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let name = String::deserialize(deserializer)?;
        Ok(Self::from_name(&name))
    }
}
