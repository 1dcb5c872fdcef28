//! Session lifecycle integration.
//!
//! The host's session layer knows players by transient handles; counters are
//! keyed by a stable identifier looked up from the handle. This module
//! resolves one into the other and purges an identity's counters when its
//! session ends.

use futures::{Stream, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info, instrument, warn};

use crate::config::IdentitySettings;
use crate::error::{Result, WardenError};
use crate::ratelimit::LimiterRegistry;

/// Raw identifier lookup provided by the host's session layer.
pub trait IdentifierLookup: Send + Sync {
    /// The identifier of `kind` attached to the session `handle`, e.g.
    /// `"license:1a2b3c"` for kind `"license"`.
    fn identifier(&self, handle: &str, kind: &str) -> Option<String>;
}

impl<F> IdentifierLookup for F
where
    F: Fn(&str, &str) -> Option<String> + Send + Sync,
{
    fn identifier(&self, handle: &str, kind: &str) -> Option<String> {
        self(handle, kind)
    }
}

/// Maps a session handle to the identity counters are keyed by.
pub trait IdentityResolver: Send + Sync {
    fn resolve_identity(&self, handle: &str) -> Result<String>;
}

/// Resolves identities by stripping a fixed prefix from a looked-up
/// identifier.
pub struct PrefixedIdentifierResolver<L> {
    lookup: L,
    kind: String,
    prefix: String,
}

impl<L: IdentifierLookup> PrefixedIdentifierResolver<L> {
    pub fn new(lookup: L, settings: &IdentitySettings) -> Self {
        Self {
            lookup,
            kind: settings.kind.clone(),
            prefix: settings.prefix.clone(),
        }
    }
}

impl<L: IdentifierLookup> IdentityResolver for PrefixedIdentifierResolver<L> {
    fn resolve_identity(&self, handle: &str) -> Result<String> {
        let identifier = self
            .lookup
            .identifier(handle, &self.kind)
            .ok_or_else(|| WardenError::ResolutionFailed(handle.to_string()))?;

        match identifier.strip_prefix(&self.prefix) {
            Some(identity) if !identity.is_empty() => Ok(identity.to_string()),
            _ => Err(WardenError::MalformedIdentifier {
                handle: handle.to_string(),
                identifier,
            }),
        }
    }
}

/// A session ended, e.g. because the player disconnected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEnded {
    /// Session handle of the departed player
    pub handle: String,
    /// Free-form reason supplied by the host
    pub reason: String,
}

impl SessionEnded {
    pub fn new(handle: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            handle: handle.into(),
            reason: reason.into(),
        }
    }
}

/// Connects session events to the registry.
pub struct IdentityLifecycleBridge<R> {
    registry: Arc<LimiterRegistry>,
    resolver: R,
}

impl<R: IdentityResolver + 'static> IdentityLifecycleBridge<R> {
    pub fn new(registry: Arc<LimiterRegistry>, resolver: R) -> Self {
        Self { registry, resolver }
    }

    /// Forget the departed identity across all limiters.
    ///
    /// Returns how many counters were removed. A handle that cannot be
    /// resolved removes nothing.
    #[instrument(skip(self, event), fields(handle = %event.handle, reason = %event.reason))]
    pub fn on_session_ended(&self, event: &SessionEnded) -> usize {
        match self.resolver.resolve_identity(&event.handle) {
            Ok(identity) => self.registry.forget_identity(&identity),
            Err(e) => {
                debug!(error = %e, "Nothing to forget for ended session");
                0
            }
        }
    }

    /// Record an attempt against `name` for the identity behind `handle`.
    #[instrument(skip(self))]
    pub fn hit_for_session(&self, handle: &str, name: &str) {
        match self.resolver.resolve_identity(handle) {
            Ok(identity) => self.registry.record_attempt(name, &identity),
            Err(e) => warn!(error = %e, "Dropped attempt from unresolvable session"),
        }
    }

    /// Handle session events until the stream ends.
    pub async fn run<S>(&self, events: S)
    where
        S: Stream<Item = SessionEnded>,
    {
        futures::pin_mut!(events);
        while let Some(event) = events.next().await {
            self.on_session_ended(&event);
        }
        info!("Session event stream closed");
    }

    /// Run the bridge on a tokio task fed by `receiver`.
    pub fn spawn(self, receiver: mpsc::UnboundedReceiver<SessionEnded>) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run(UnboundedReceiverStream::new(receiver)).await;
        })
    }
}
