//! A single named limiter and its per-identity counters.

use dashmap::DashMap;
use std::time::{Duration, Instant};
use tracing::trace;

use super::counter::AttemptCounter;

/// A named limiter.
///
/// `name` and `limit` are fixed at registration. Counters live in a sharded
/// map, so every insert, increment, reset and removal on one identity is
/// mutually exclusive with every other.
#[derive(Debug)]
pub struct LimiterDefinition {
    name: String,
    limit: u32,
    counters: DashMap<String, AttemptCounter>,
}

/// What one sweep pass did to a limiter's counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    /// Counters looked at
    pub inspected: usize,
    /// Counters whose count was zeroed
    pub reset: usize,
    /// Counters removed by idle eviction
    pub evicted: usize,
}

impl SweepStats {
    /// Whether the pass changed anything.
    pub fn is_noop(&self) -> bool {
        self.reset == 0 && self.evicted == 0
    }
}

impl std::ops::AddAssign for SweepStats {
    fn add_assign(&mut self, other: Self) {
        self.inspected += other.inspected;
        self.reset += other.reset;
        self.evicted += other.evicted;
    }
}

impl LimiterDefinition {
    /// Create a limiter with no counters.
    pub(crate) fn new(name: impl Into<String>, limit: u32) -> Self {
        Self {
            name: name.into(),
            limit,
            counters: DashMap::new(),
        }
    }

    /// The limiter's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attempts allowed per window.
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Record an attempt for `identity`, returning the new count.
    pub(crate) fn record(&self, identity: &str, now: Instant) -> u32 {
        let count = match self.counters.get_mut(identity) {
            Some(mut counter) => counter.record(now),
            None => self
                .counters
                .entry(identity.to_string())
                .and_modify(|counter| {
                    counter.record(now);
                })
                .or_insert_with(|| AttemptCounter::first_attempt(now))
                .count(),
        };

        trace!(limiter = %self.name, identity = %identity, count, "Recorded attempt");
        count
    }

    /// Current count for `identity`, `None` if it has no counter.
    pub fn attempts(&self, identity: &str) -> Option<u32> {
        self.counters.get(identity).map(|c| c.count())
    }

    /// Whether `identity` has reached this limiter's threshold.
    pub fn is_limited(&self, identity: &str) -> bool {
        self.counters
            .get(identity)
            .is_some_and(|c| c.reaches(self.limit))
    }

    /// Drop `identity`'s counter. Returns whether one existed.
    pub(crate) fn forget(&self, identity: &str) -> bool {
        self.counters.remove(identity).is_some()
    }

    /// Number of identities holding a counter.
    pub fn tracked_identities(&self) -> usize {
        self.counters.len()
    }

    /// Reset every counter whose window has elapsed.
    ///
    /// With `evict_after` set, counters that are already zero and have been
    /// idle at least that long are removed instead.
    pub(crate) fn sweep(
        &self,
        now: Instant,
        window: Duration,
        evict_after: Option<Duration>,
    ) -> SweepStats {
        let mut stats = SweepStats::default();

        self.counters.retain(|_, counter| {
            stats.inspected += 1;

            if let Some(evict_after) = evict_after {
                if counter.count() == 0 && counter.idle_for(now) >= evict_after {
                    stats.evicted += 1;
                    return false;
                }
            }

            if counter.count() > 0 && counter.is_expired(now, window) {
                counter.reset();
                stats.reset += 1;
            }
            true
        });

        stats
    }
}
