//! Configuration management for Ratewarden.

use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{Result, WardenError};

/// Main configuration for the Ratewarden service.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WardenConfig {
    /// Window and sweep configuration
    #[serde(default)]
    pub limiter: LimiterSettings,

    /// How session handles map to identities
    #[serde(default)]
    pub identity: IdentitySettings,

    /// Limiters registered at startup
    #[serde(default)]
    pub limiters: Vec<LimiterRule>,
}

/// Window and sweep configuration shared by every limiter.
#[derive(Debug, Clone, Deserialize)]
pub struct LimiterSettings {
    /// Window duration in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Sweep cadence in milliseconds
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,

    /// Evict zeroed counters idle for this many windows. `None` keeps
    /// counters until the identity's session ends.
    #[serde(default)]
    pub idle_eviction_windows: Option<u32>,
}

impl Default for LimiterSettings {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            sweep_interval_ms: default_sweep_interval_ms(),
            idle_eviction_windows: None,
        }
    }
}

impl LimiterSettings {
    /// The window as a `Duration`.
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    /// The sweep cadence as a `Duration`.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    /// Idle age after which zeroed counters are evicted.
    ///
    /// `None` when eviction is disabled or the age does not fit a `Duration`.
    pub fn eviction_age(&self) -> Option<Duration> {
        self.window().checked_mul(self.idle_eviction_windows?)
    }

    /// Reject values that would stall or break the sweep.
    pub fn validate(&self) -> Result<()> {
        if self.window_secs == 0 {
            return Err(WardenError::Config("window_secs must be positive".into()));
        }
        if self.sweep_interval_ms == 0 {
            return Err(WardenError::Config(
                "sweep_interval_ms must be positive".into(),
            ));
        }
        match self.idle_eviction_windows {
            Some(0) => Err(WardenError::Config(
                "idle_eviction_windows must be at least 1 when set".into(),
            )),
            Some(windows) if self.eviction_age().is_none() => Err(WardenError::Config(format!(
                "idle_eviction_windows {} times window_secs {} overflows",
                windows, self.window_secs
            ))),
            _ => Ok(()),
        }
    }
}

fn default_window_secs() -> u64 {
    60
}

fn default_sweep_interval_ms() -> u64 {
    1000
}

/// Identifier lookup configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct IdentitySettings {
    /// Identifier kind requested from the session provider
    #[serde(default = "default_identity_kind")]
    pub kind: String,

    /// Prefix stripped from the raw identifier
    #[serde(default = "default_identity_prefix")]
    pub prefix: String,
}

impl Default for IdentitySettings {
    fn default() -> Self {
        Self {
            kind: default_identity_kind(),
            prefix: default_identity_prefix(),
        }
    }
}

fn default_identity_kind() -> String {
    "license".to_string()
}

fn default_identity_prefix() -> String {
    "license:".to_string()
}

/// A limiter registered at startup.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LimiterRule {
    /// Unique limiter name
    pub name: String,
    /// Attempts allowed per window
    pub attempts_per_minute: u32,
}

impl WardenConfig {
    /// Load configuration from a file path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: WardenConfig = serde_yaml::from_str(yaml)
            .map_err(|e| WardenError::Config(format!("Failed to parse configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check values serde cannot express.
    pub fn validate(&self) -> Result<()> {
        self.limiter.validate()?;

        let mut seen = HashSet::new();
        for rule in &self.limiters {
            if rule.name.is_empty() {
                return Err(WardenError::InvalidLimiterName);
            }
            if rule.attempts_per_minute == 0 {
                return Err(WardenError::InvalidLimit {
                    name: rule.name.clone(),
                    limit: 0,
                });
            }
            if !seen.insert(rule.name.as_str()) {
                return Err(WardenError::DuplicateLimiter(rule.name.clone()));
            }
        }

        Ok(())
    }
}
