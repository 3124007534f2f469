//! Example: retrying a flaky operation with refry
//!
//! This example demonstrates:
//! 1. Blocking retry with sequential backoff and `tracing` output
//! 2. Retry predicate (only retry rate-limit errors)
//! 3. Async retry with exponential backoff and jitter
//!
//! Run with:
//! ```bash
//! RUST_LOG=refry=debug cargo run -p refry --example retry_demo
//! ```

use refry::prelude::*;
use std::error::Error;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
enum ApiError {
    #[error("rate limit exceeded")]
    RateLimit,
    #[error("authentication failed")]
    Auth,
}

/// A simulated API that fails the first few times
struct UnreliableApi {
    attempts: AtomicU32,
    fail_count: u32,
}

impl UnreliableApi {
    fn new(fail_count: u32) -> Self {
        Self {
            attempts: AtomicU32::new(0),
            fail_count,
        }
    }

    fn call(&self) -> Result<String, ApiError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);

        if attempt < self.fail_count {
            println!("  Attempt {}: FAILED (rate limited)", attempt + 1);
            Err(ApiError::RateLimit)
        } else {
            println!("  Attempt {}: SUCCESS", attempt + 1);
            Ok("API response data".to_string())
        }
    }

    fn total_attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

/// Example 1: Blocking retry with sequential backoff
fn example_sequential() -> Result<(), Box<dyn Error>> {
    println!("\n=== Example 1: Sequential Backoff (blocking) ===\n");

    let policy = RetryPolicy::builder()
        .retries(4)
        .backoff_increment(Duration::from_millis(100))
        .backoff_strategy(BackoffStrategy::Sequential)
        .build()?;
    let executor = RetryExecutor::new(policy).with_tracing();

    let api = UnreliableApi::new(2);
    let start = Instant::now();
    let result = executor.execute(|| api.call())?;

    println!("\nResult: {}", result);
    println!("Total attempts: {}", api.total_attempts());
    println!("Total time: {:?}", start.elapsed());
    println!("Expected delays: 100ms + 200ms = ~300ms");

    Ok(())
}

/// Example 2: Only rate-limit errors are retried
fn example_predicate() -> Result<(), Box<dyn Error>> {
    println!("\n=== Example 2: Retry Predicate (rate limits only) ===\n");

    let policy = RetryPolicy::builder()
        .retries(3)
        .backoff_increment(Duration::from_millis(10))
        .retry_if(|err: &ApiError| matches!(err, ApiError::RateLimit))
        .build()?;
    let executor = RetryExecutor::new(policy).with_observer(
        |attempt: u32, wait: Duration, err: &ApiError| {
            println!("  observer: attempt {attempt} failed ({err}), waiting {wait:?}");
        },
    );

    let attempts = AtomicU32::new(0);
    let result = executor.execute(|| {
        attempts.fetch_add(1, Ordering::SeqCst);
        Err::<(), _>(ApiError::Auth)
    });

    match result {
        Err(err) if err.is_permanent() => println!("  Not retried: {}", err),
        other => println!("  Unexpected outcome: {:?}", other),
    }
    println!("Total attempts: {}", attempts.load(Ordering::SeqCst));

    let result: Result<(), _> = executor.execute(|| Err(ApiError::RateLimit));
    if let Err(err) = result {
        println!("  Gave up: {} (after {} attempts)", err, err.attempts());
    }

    Ok(())
}

/// Example 3: Async retry with exponential backoff and jitter
async fn example_async_jitter() -> Result<(), Box<dyn Error>> {
    println!("\n=== Example 3: Exponential Backoff with Jitter (async) ===\n");

    let policy = RetryConfig::default()
        .with_retries(4)
        .with_backoff_increment(Duration::from_millis(50))
        .with_backoff_strategy(BackoffStrategy::Exponential)
        .with_jitter(true)
        .into_policy::<ApiError>()?;
    println!(
        "Unjittered worst case: {:?}",
        policy.max_total_wait()
    );
    let executor = RetryExecutor::new(policy).with_tracing();

    let api = UnreliableApi::new(3);
    let start = Instant::now();
    let result = executor.execute_async(|| async { api.call() }).await?;

    println!("\nResult: {}", result);
    println!("Total attempts: {}", api.total_attempts());
    println!("Total time: {:?} (at least 50ms + 100ms + 200ms)", start.elapsed());

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("==============================================");
    println!("   refry: Retry Examples");
    println!("==============================================");

    example_sequential()?;
    example_predicate()?;
    example_async_jitter().await?;

    println!("\n==============================================");
    println!("   All examples completed successfully!");
    println!("==============================================\n");

    Ok(())
}
