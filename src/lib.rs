//! Ratewarden - In-process per-identity rate limiting
//!
//! This crate keeps a registry of named limiters, each allowing a fixed number
//! of attempts per identity within a rolling window. A background sweeper
//! zeroes counters whose window has elapsed, and a session bridge drops an
//! identity's counters when the host reports that its session ended.

pub mod clock;
pub mod config;
pub mod error;
pub mod ratelimit;
pub mod session;
pub mod warden;

pub use error::{Result, WardenError};
pub use warden::{RateLimiterExports, Warden};
