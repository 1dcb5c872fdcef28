//! Monotonic time sources.

use std::time::Instant;

/// A monotonic clock.
///
/// The registry reads time only through this trait so window expiry can be
/// driven deterministically in tests.
pub trait Clock: Send + Sync {
    /// The current instant.
    fn now(&self) -> Instant;
}

/// Clock backed by `Instant::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    /// Create a new system clock.
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[cfg(any(test, feature = "test-helpers"))]
pub use mock::MockClock;

#[cfg(any(test, feature = "test-helpers"))]
mod mock {
    use super::Clock;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    /// Manually driven clock.
    ///
    /// Clones share the same underlying instant, so a test can hand one clone
    /// to a registry and advance time through another.
    #[derive(Debug, Clone)]
    pub struct MockClock {
        current: Arc<Mutex<Instant>>,
    }

    impl MockClock {
        /// Create a mock clock starting at `start`.
        pub fn new(start: Instant) -> Self {
            Self {
                current: Arc::new(Mutex::new(start)),
            }
        }

        /// Move the clock forward.
        pub fn advance(&self, by: Duration) {
            *self.current.lock() += by;
        }

        /// Jump to a specific instant.
        pub fn set(&self, instant: Instant) {
            *self.current.lock() = instant;
        }
    }

    impl Default for MockClock {
        fn default() -> Self {
            Self::new(Instant::now())
        }
    }

    impl Clock for MockClock {
        fn now(&self) -> Instant {
            *self.current.lock()
        }
    }
}
