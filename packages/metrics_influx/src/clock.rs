use std::fmt::Debug;
use std::time::SystemTime;

/// Source of the wall-clock timestamp attached to every reported batch.
///
/// This allows tests to produce deterministic timestamps.
#[cfg_attr(test, mockall::automock)]
pub trait Clock: Debug + Send + Sync {
    /// The current wall-clock time.
    fn now(&self) -> SystemTime;
}

/// Real clock implementation using [`SystemTime::now()`].
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}
