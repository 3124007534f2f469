#![deny(unsafe_code)]
#![warn(missing_docs)]

//! Retry wrapper with configurable backoff.
//!
//! `refry` re-invokes an operation that fails with a transient error until it
//! succeeds or a fixed attempt budget runs out, waiting between attempts
//! according to a backoff schedule:
//!
//! - **Strategies** via [`BackoffStrategy`](retry::BackoffStrategy)
//!   - sequential: `increment * (attempt + 1)`
//!   - logarithmic: `ln(attempt + 2) * increment`
//!   - exponential: `2^attempt * increment`
//! - **Additive jitter** in `[0, increment)`
//! - **Retry predicates** separating transient errors from permanent ones
//! - **Blocking and async execution**, with cancellation during waits
//! - **Observers** notified before every wait, with a `tracing` default
//!
//! Terminal failures are reported as [`RetryError`](error::RetryError), which
//! always hands back the operation's own error unchanged.
//!
//! # Examples
//!
//! Using the prelude for convenient imports:
//!
//! ```rust
//! use refry::prelude::*;
//! use std::time::Duration;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let policy = RetryPolicy::builder()
//!     .retries(3)
//!     .backoff_increment(Duration::from_millis(10))
//!     .backoff_strategy(BackoffStrategy::Exponential)
//!     .jitter(true)
//!     .retry_if(|err: &std::io::Error| err.kind() == std::io::ErrorKind::TimedOut)
//!     .build()?;
//!
//! let value = RetryExecutor::new(policy)
//!     .with_tracing()
//!     .execute(|| Ok::<_, std::io::Error>(42))?;
//! assert_eq!(value, 42);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod retry;

/// Convenient re-exports of commonly used items.
///
/// Import all core abstractions with:
///
/// ```rust
/// use refry::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::RetryConfig;
    pub use crate::error::{ConfigError, RetryError};
    pub use crate::retry::{
        BackoffStrategy, RetryExecutor, RetryObserver, RetryPolicy, RetryPolicyBuilder, retry,
    };
}
