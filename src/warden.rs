//! Host-facing entry point.

use std::sync::Arc;
use tracing::info;

use crate::clock::{Clock, SystemClock};
use crate::config::WardenConfig;
use crate::error::Result;
use crate::ratelimit::{ExpirySweeper, LimiterRegistry, SweeperHandle};
use crate::session::{IdentifierLookup, IdentityLifecycleBridge, PrefixedIdentifierResolver};

/// The operations a host calls.
///
/// None of these fail: misuse is logged and answered with a default.
pub trait RateLimiterExports {
    /// Register a limiter allowing `attempts_per_minute` attempts per window.
    fn register_rate_limiter(&self, name: &str, attempts_per_minute: u32);

    /// Record an attempt by `identity` against limiter `name`.
    fn hit_rate_limiter(&self, identity: &str, name: &str);

    /// Whether `identity` has reached the threshold of any limiter.
    fn is_player_in_timeout(&self, identity: &str) -> bool;

    /// Scoped check against a single limiter.
    ///
    /// Note the polarity: `true` means `identity` is still *below* the
    /// threshold of `name`. Unknown limiters answer `false`.
    fn is_player_in_timeout_for(&self, identity: &str, name: &str) -> bool;
}

/// Process-wide rate limiting context.
///
/// Build one at startup and hand clones of it (or of its registry) to
/// whatever needs to rate limit.
#[derive(Debug, Clone)]
pub struct Warden {
    registry: Arc<LimiterRegistry>,
    config: Arc<WardenConfig>,
}

impl Warden {
    /// Build from configuration using the system clock.
    pub fn from_config(config: WardenConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock::new()))
    }

    /// Build from configuration with an explicit clock.
    ///
    /// Limiters listed in the configuration are registered immediately.
    pub fn with_clock(config: WardenConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;

        let registry = Arc::new(LimiterRegistry::new(&config.limiter, clock)?);
        for rule in &config.limiters {
            registry.try_register(&rule.name, rule.attempts_per_minute)?;
        }

        info!(
            limiters = registry.len(),
            window = ?registry.window(),
            "Rate limiter registry initialized"
        );

        Ok(Self {
            registry,
            config: Arc::new(config),
        })
    }

    /// The underlying registry.
    pub fn registry(&self) -> &Arc<LimiterRegistry> {
        &self.registry
    }

    /// The configuration this context was built from.
    pub fn config(&self) -> &WardenConfig {
        &self.config
    }

    /// Start the background sweep at the configured cadence.
    ///
    /// The sweep keeps running if the handle is dropped.
    pub fn spawn_sweeper(&self) -> SweeperHandle {
        ExpirySweeper::new(self.registry.clone(), self.config.limiter.sweep_interval()).spawn()
    }

    /// Bridge session events from the host's identifier lookup.
    pub fn bridge<L: IdentifierLookup + 'static>(
        &self,
        lookup: L,
    ) -> IdentityLifecycleBridge<PrefixedIdentifierResolver<L>> {
        let resolver = PrefixedIdentifierResolver::new(lookup, &self.config.identity);
        IdentityLifecycleBridge::new(self.registry.clone(), resolver)
    }
}

impl RateLimiterExports for Warden {
    fn register_rate_limiter(&self, name: &str, attempts_per_minute: u32) {
        self.registry.register(name, attempts_per_minute);
    }

    fn hit_rate_limiter(&self, identity: &str, name: &str) {
        self.registry.record_attempt(name, identity);
    }

    fn is_player_in_timeout(&self, identity: &str) -> bool {
        self.registry.is_in_timeout(identity)
    }

    fn is_player_in_timeout_for(&self, identity: &str, name: &str) -> bool {
        self.registry.is_within_limit(identity, name)
    }
}
