//! Per-identity attempt counter.

use std::time::{Duration, Instant};

/// Attempts recorded by one identity against one limiter.
///
/// Every recorded attempt moves `window_started_at` forward, so a counter only
/// expires once the identity has been quiet for a full window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptCounter {
    /// Attempts within the current window
    count: u32,
    /// When the current window was last refreshed
    window_started_at: Instant,
}

impl AttemptCounter {
    /// Create a counter holding its first attempt.
    pub fn first_attempt(now: Instant) -> Self {
        Self {
            count: 1,
            window_started_at: now,
        }
    }

    /// Record another attempt and refresh the window start.
    ///
    /// Returns the new count.
    pub fn record(&mut self, now: Instant) -> u32 {
        self.count = self.count.saturating_add(1);
        self.window_started_at = now;
        self.count
    }

    /// Get the current count.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// When the current window started.
    pub fn window_started_at(&self) -> Instant {
        self.window_started_at
    }

    /// Time since the window was last refreshed.
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.window_started_at)
    }

    /// Whether a full window has elapsed since the last refresh.
    pub fn is_expired(&self, now: Instant, window: Duration) -> bool {
        self.idle_for(now) >= window
    }

    /// Whether the count has reached `limit`.
    pub fn reaches(&self, limit: u32) -> bool {
        self.count >= limit
    }

    /// Zero the count, leaving the window start untouched.
    pub fn reset(&mut self) {
        self.count = 0;
    }
}
