//! Blocking waits used by the synchronous executor.

use std::time::Duration;

/// Suspends the calling thread between attempts.
///
/// [`ThreadSleeper`] is the default. Substitute another implementation to
/// make the wait interruptible or to observe the schedule without waiting.
pub trait Sleeper: Send + Sync {
    /// Block for `duration`.
    fn sleep(&self, duration: Duration);
}

/// Sleeps with [`std::thread::sleep`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::Sleeper;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Records requested waits instead of sleeping.
    #[derive(Debug, Default)]
    pub(crate) struct RecordingSleeper {
        waits: Mutex<Vec<Duration>>,
    }

    impl RecordingSleeper {
        pub(crate) fn waits(&self) -> Vec<Duration> {
            self.waits.lock().unwrap().clone()
        }

        pub(crate) fn total(&self) -> Duration {
            self.waits().iter().sum()
        }
    }

    impl Sleeper for RecordingSleeper {
        fn sleep(&self, duration: Duration) {
            self.waits.lock().unwrap().push(duration);
        }
    }
}
