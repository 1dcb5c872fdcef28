//! Registry of named limiters.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

use super::limiter::{LimiterDefinition, SweepStats};
use crate::clock::Clock;
use crate::config::LimiterSettings;
use crate::error::{Result, WardenError};

/// Owns every limiter and its counters.
///
/// The registry is an ordinary value: build one per process (or per test) and
/// share it behind an `Arc`. All methods take `&self` and are safe to call
/// concurrently with a running sweep.
pub struct LimiterRegistry {
    /// Registered limiters indexed by name
    limiters: RwLock<HashMap<String, Arc<LimiterDefinition>>>,
    /// Window duration shared by all limiters
    window: Duration,
    /// Idle age after which zeroed counters are evicted
    evict_after: Option<Duration>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for LimiterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LimiterRegistry")
            .field("limiters", &self.limiter_names())
            .field("window", &self.window)
            .field("evict_after", &self.evict_after)
            .finish()
    }
}

impl LimiterRegistry {
    /// Create an empty registry.
    ///
    /// Fails if `settings` would leave the sweep unable to run.
    pub fn new(settings: &LimiterSettings, clock: Arc<dyn Clock>) -> Result<Self> {
        settings.validate()?;

        Ok(Self {
            limiters: RwLock::new(HashMap::new()),
            window: settings.window(),
            evict_after: settings.eviction_age(),
            clock,
        })
    }

    /// The window duration.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Register a limiter, logging instead of failing on misuse.
    ///
    /// A duplicate name keeps the existing definition untouched.
    pub fn register(&self, name: &str, limit: u32) {
        if let Err(e) = self.try_register(name, limit) {
            warn!(limiter = %name, limit, error = %e, "Rejected rate limiter registration");
        }
    }

    /// Register a limiter.
    pub fn try_register(&self, name: &str, limit: u32) -> Result<()> {
        if name.is_empty() {
            return Err(WardenError::InvalidLimiterName);
        }
        if limit == 0 {
            return Err(WardenError::InvalidLimit {
                name: name.to_string(),
                limit,
            });
        }

        let mut limiters = self.limiters.write();
        if limiters.contains_key(name) {
            return Err(WardenError::DuplicateLimiter(name.to_string()));
        }
        limiters.insert(
            name.to_string(),
            Arc::new(LimiterDefinition::new(name, limit)),
        );

        info!(limiter = %name, limit, "Registered rate limiter");
        Ok(())
    }

    /// Record an attempt, logging instead of failing on misuse.
    pub fn record_attempt(&self, name: &str, identity: &str) {
        if let Err(e) = self.try_record_attempt(name, identity) {
            warn!(limiter = %name, identity = %identity, error = %e, "Dropped rate limiter attempt");
        }
    }

    /// Record an attempt, returning the identity's new count.
    pub fn try_record_attempt(&self, name: &str, identity: &str) -> Result<u32> {
        if identity.is_empty() {
            return Err(WardenError::EmptyIdentity);
        }
        let limiter = self.get(name)?;
        Ok(limiter.record(identity, self.clock.now()))
    }

    /// Whether `identity` has reached the threshold of any limiter.
    pub fn is_in_timeout(&self, identity: &str) -> bool {
        let limited = self
            .limiters
            .read()
            .values()
            .find(|limiter| limiter.is_limited(identity))
            .map(|limiter| limiter.name().to_string());

        match limited {
            Some(name) => {
                trace!(identity = %identity, limiter = %name, "Identity is in timeout");
                true
            }
            None => false,
        }
    }

    /// Whether `identity` is still below the threshold of `name`.
    ///
    /// An identity with no counter yet is below the threshold. An unknown
    /// limiter answers `false`.
    pub fn is_within_limit(&self, identity: &str, name: &str) -> bool {
        match self.get(name) {
            Ok(limiter) => !limiter.is_limited(identity),
            Err(e) => {
                warn!(limiter = %name, identity = %identity, error = %e, "Queried unknown rate limiter");
                false
            }
        }
    }

    /// Remove `identity`'s counters from every limiter.
    ///
    /// Returns how many limiters held one.
    pub fn forget_identity(&self, identity: &str) -> usize {
        let removed = self
            .snapshot()
            .iter()
            .filter(|limiter| limiter.forget(identity))
            .count();

        if removed > 0 {
            debug!(identity = %identity, limiters = removed, "Forgot identity");
        }
        removed
    }

    /// Run one sweep pass over every limiter.
    pub fn sweep(&self) -> SweepStats {
        let now = self.clock.now();
        let mut stats = SweepStats::default();

        for limiter in self.snapshot() {
            stats += limiter.sweep(now, self.window, self.evict_after);
        }
        stats
    }

    /// The configured limit of `name`.
    pub fn limit_of(&self, name: &str) -> Option<u32> {
        self.get(name).ok().map(|limiter| limiter.limit())
    }

    /// Current count for `identity` under `name`.
    pub fn attempts(&self, name: &str, identity: &str) -> Option<u32> {
        self.get(name).ok()?.attempts(identity)
    }

    /// Number of identities holding a counter under `name`.
    pub fn tracked_identities(&self, name: &str) -> Option<usize> {
        self.get(name).ok().map(|limiter| limiter.tracked_identities())
    }

    /// Names of all registered limiters, sorted.
    pub fn limiter_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.limiters.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered limiters.
    pub fn len(&self) -> usize {
        self.limiters.read().len()
    }

    /// Whether no limiter is registered.
    pub fn is_empty(&self) -> bool {
        self.limiters.read().is_empty()
    }

    fn get(&self, name: &str) -> Result<Arc<LimiterDefinition>> {
        self.limiters
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| WardenError::UnknownLimiter(name.to_string()))
    }

    /// Clone out the limiter handles so the registry lock is not held while
    /// counters are touched.
    fn snapshot(&self) -> Vec<Arc<LimiterDefinition>> {
        self.limiters.read().values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use std::time::Instant;

    fn registry() -> (LimiterRegistry, MockClock) {
        let clock = MockClock::new(Instant::now());
        let registry =
            LimiterRegistry::new(&LimiterSettings::default(), Arc::new(clock.clone())).unwrap();
        (registry, clock)
    }

    #[test]
    fn test_register() {
        let (registry, _) = registry();
        assert!(registry.is_empty());

        registry.try_register("login", 5).unwrap();
        registry.try_register("chat", 20).unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.limiter_names(), vec!["chat", "login"]);
        assert_eq!(registry.limit_of("login"), Some(5));
    }

    #[test]
    fn test_duplicate_registration_keeps_original() {
        let (registry, _) = registry();
        registry.register("login", 5);

        let err = registry.try_register("login", 10).unwrap_err();
        assert!(matches!(err, WardenError::DuplicateLimiter(_)));
        registry.register("login", 10);

        assert_eq!(registry.limit_of("login"), Some(5));
        for _ in 0..4 {
            registry.record_attempt("login", "abc");
        }
        assert!(!registry.is_in_timeout("abc"));
        registry.record_attempt("login", "abc");
        assert!(registry.is_in_timeout("abc"));
    }

    #[test]
    fn test_invalid_registrations() {
        let (registry, _) = registry();

        assert!(matches!(
            registry.try_register("", 5),
            Err(WardenError::InvalidLimiterName)
        ));
        assert!(matches!(
            registry.try_register("login", 0),
            Err(WardenError::InvalidLimit { limit: 0, .. })
        ));
        registry.register("login", 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_record_unknown_limiter_is_noop() {
        let (registry, _) = registry();

        assert!(matches!(
            registry.try_record_attempt("missing", "abc"),
            Err(WardenError::UnknownLimiter(_))
        ));
        registry.record_attempt("missing", "abc");
        assert!(!registry.is_in_timeout("abc"));
    }

    #[test]
    fn test_record_empty_identity_is_rejected() {
        let (registry, _) = registry();
        registry.register("login", 1);

        assert!(matches!(
            registry.try_record_attempt("login", ""),
            Err(WardenError::EmptyIdentity)
        ));
        assert_eq!(registry.tracked_identities("login"), Some(0));
    }

    #[test]
    fn test_global_timeout_is_or_across_limiters() {
        let (registry, _) = registry();
        registry.register("login", 3);
        registry.register("chat", 1);

        assert!(!registry.is_in_timeout("abc"));

        registry.record_attempt("login", "abc");
        assert!(!registry.is_in_timeout("abc"));

        registry.record_attempt("chat", "abc");
        assert!(registry.is_in_timeout("abc"));
        assert!(!registry.is_in_timeout("other"));
    }

    #[test]
    fn test_scoped_query() {
        let (registry, _) = registry();
        registry.register("login", 2);
        registry.register("chat", 1);

        // No counter yet counts as zero attempts.
        assert!(registry.is_within_limit("abc", "login"));

        registry.record_attempt("chat", "abc");
        assert!(registry.is_within_limit("abc", "login"));
        assert!(!registry.is_within_limit("abc", "chat"));

        registry.record_attempt("login", "abc");
        registry.record_attempt("login", "abc");
        assert!(!registry.is_within_limit("abc", "login"));

        assert!(!registry.is_within_limit("abc", "missing"));
    }

    #[test]
    fn test_forget_identity_is_idempotent() {
        let (registry, _) = registry();
        registry.register("login", 1);
        registry.register("chat", 1);
        registry.register("trade", 1);
        registry.record_attempt("login", "abc");
        registry.record_attempt("chat", "abc");
        registry.record_attempt("chat", "other");

        assert_eq!(registry.forget_identity("abc"), 2);
        assert_eq!(registry.forget_identity("abc"), 0);

        assert!(!registry.is_in_timeout("abc"));
        assert!(registry.is_within_limit("abc", "login"));
        assert_eq!(registry.attempts("login", "abc"), None);
        assert!(registry.is_in_timeout("other"));

        registry.record_attempt("login", "abc");
        assert_eq!(registry.attempts("login", "abc"), Some(1));
    }

    #[test]
    fn test_window_refreshes_on_every_attempt() {
        let (registry, clock) = registry();
        registry.register("login", 10);

        // Keep attempting every 50s: each one pushes the window out again.
        for expected in 1..=5 {
            registry.record_attempt("login", "abc");
            clock.advance(Duration::from_secs(50));
            registry.sweep();
            assert_eq!(registry.attempts("login", "abc"), Some(expected));
        }

        clock.advance(Duration::from_secs(10));
        registry.sweep();
        assert_eq!(registry.attempts("login", "abc"), Some(0));
    }

    #[test]
    fn test_sweep_boundary() {
        let (registry, clock) = registry();
        registry.register("login", 10);
        for _ in 0..5 {
            registry.record_attempt("login", "abc");
        }

        clock.advance(Duration::from_millis(59_999));
        let stats = registry.sweep();
        assert_eq!(stats.reset, 0);
        assert_eq!(registry.attempts("login", "abc"), Some(5));

        clock.advance(Duration::from_millis(1));
        let stats = registry.sweep();
        assert_eq!(stats.reset, 1);
        assert_eq!(registry.attempts("login", "abc"), Some(0));
        assert_eq!(registry.tracked_identities("login"), Some(1));
    }

    #[test]
    fn test_end_to_end_timeout_and_recovery() {
        let (registry, clock) = registry();
        registry.register("login", 3);

        for _ in 0..3 {
            registry.record_attempt("login", "abc");
        }
        assert!(registry.is_in_timeout("abc"));

        clock.advance(Duration::from_secs(61));
        registry.sweep();
        assert!(!registry.is_in_timeout("abc"));

        registry.record_attempt("login", "abc");
        assert_eq!(registry.attempts("login", "abc"), Some(1));
        assert!(!registry.is_in_timeout("abc"));
    }

    #[test]
    fn test_idle_eviction_policy() {
        let clock = MockClock::new(Instant::now());
        let settings = LimiterSettings {
            idle_eviction_windows: Some(2),
            ..LimiterSettings::default()
        };
        let registry = LimiterRegistry::new(&settings, Arc::new(clock.clone())).unwrap();
        registry.register("login", 3);
        registry.record_attempt("login", "abc");

        clock.advance(Duration::from_secs(60));
        assert_eq!(registry.sweep().reset, 1);
        assert_eq!(registry.tracked_identities("login"), Some(1));

        clock.advance(Duration::from_secs(59));
        assert_eq!(registry.sweep().evicted, 0);

        clock.advance(Duration::from_secs(1));
        assert_eq!(registry.sweep().evicted, 1);
        assert_eq!(registry.tracked_identities("login"), Some(0));
    }

    #[test]
    fn test_new_rejects_unusable_settings() {
        let clock: Arc<dyn Clock> = Arc::new(MockClock::new(Instant::now()));

        let zero_window = LimiterSettings {
            window_secs: 0,
            ..LimiterSettings::default()
        };
        assert!(matches!(
            LimiterRegistry::new(&zero_window, clock.clone()),
            Err(WardenError::Config(_))
        ));

        let zero_eviction = LimiterSettings {
            idle_eviction_windows: Some(0),
            ..LimiterSettings::default()
        };
        assert!(matches!(
            LimiterRegistry::new(&zero_eviction, clock.clone()),
            Err(WardenError::Config(_))
        ));

        let overflowing = LimiterSettings {
            window_secs: u64::MAX,
            sweep_interval_ms: 1000,
            idle_eviction_windows: Some(2),
        };
        assert!(matches!(
            LimiterRegistry::new(&overflowing, clock),
            Err(WardenError::Config(_))
        ));
    }

    #[test]
    fn test_concurrent_records_are_not_lost() {
        let (registry, _) = registry();
        registry.register("login", u32::MAX);
        registry.register("chat", u32::MAX);

        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..1000 {
                        registry.record_attempt("login", "abc");
                    }
                });
            }
            s.spawn(|| {
                for i in 0..1000 {
                    registry.sweep();
                    registry.record_attempt("chat", &format!("id-{}", i % 10));
                    registry.forget_identity(&format!("id-{}", i % 10));
                }
            });
        });

        // The clock never moved, so the sweep must not have reset anything.
        assert_eq!(registry.attempts("login", "abc"), Some(8000));
        assert_eq!(registry.tracked_identities("chat"), Some(0));
    }
}
