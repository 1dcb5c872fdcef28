//! Error types for the Ratewarden service.

use thiserror::Error;

/// Main error type for Ratewarden operations.
///
/// None of these are fatal: the host-facing surface downgrades every one of
/// them to a logged diagnostic and a default result.
#[derive(Error, Debug)]
pub enum WardenError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A limiter with this name is already registered
    #[error("Rate limiter '{0}' has already been registered")]
    DuplicateLimiter(String),

    /// No limiter with this name has been registered
    #[error("Rate limiter '{0}' does not exist")]
    UnknownLimiter(String),

    /// Limiter names must be non-empty
    #[error("Rate limiter name must not be empty")]
    InvalidLimiterName,

    /// Limits must be positive
    #[error("Rate limiter '{name}' has invalid limit {limit}, expected at least 1")]
    InvalidLimit { name: String, limit: u32 },

    /// Attempts must be recorded against a non-empty identity
    #[error("Identity must not be empty")]
    EmptyIdentity,

    /// The session provider had no identifier for the handle
    #[error("No identifier for session handle '{0}'")]
    ResolutionFailed(String),

    /// The session provider returned an identifier in an unexpected shape
    #[error("Malformed identifier '{identifier}' for session handle '{handle}'")]
    MalformedIdentifier { handle: String, identifier: String },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Ratewarden operations.
pub type Result<T> = std::result::Result<T, WardenError>;
