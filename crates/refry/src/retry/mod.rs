//! Retry execution with sequential, logarithmic and exponential backoff.
//!
//! # Key Types
//!
//! - [`RetryPolicy`] - Validated, immutable retry settings
//! - [`BackoffStrategy`] - The wait-time formula
//! - [`RetryExecutor`] - Runs (or wraps) an operation under a policy
//! - [`RetryObserver`] - Hook called before each backoff wait
//!
//! # Examples
//!
//! ```rust
//! use refry::retry::{BackoffStrategy, RetryExecutor, RetryPolicy};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let policy = RetryPolicy::builder()
//!     .retries(3)
//!     .backoff_increment(Duration::from_millis(100))
//!     .backoff_strategy(BackoffStrategy::Exponential)
//!     .build()?;
//!
//! let result = RetryExecutor::new(policy)
//!     .execute_async(|| async {
//!         // Your operation here
//!         Ok::<_, std::io::Error>(42)
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod executor;
mod observer;
mod policy;
mod sleeper;
mod strategy;

pub use executor::{RetryExecutor, retry};
pub use observer::{NoopObserver, RetryObserver, TracingObserver};
pub(crate) use policy::increment_from_secs;
pub use policy::{RetryPolicy, RetryPolicyBuilder};
pub use sleeper::{Sleeper, ThreadSleeper};
pub use strategy::BackoffStrategy;
