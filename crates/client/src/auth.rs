//! Deduplication of concurrent authentication handshakes.
//!
//! A cold session (no cookies) needs a handshake before any request can be
//! sent. When many requests arrive for the same `username@host:port` at
//! once, the first registers a shared handshake future and every other
//! request awaits that same future instead of starting its own.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::debug;

use atelier_core::{AtelierError, AuthTarget};

/// Outcome of a handshake: the session cookies it established.
pub type HandshakeResult = Result<Vec<String>, AtelierError>;

type Handshake = Shared<BoxFuture<'static, HandshakeResult>>;

/// Registry of in-flight handshakes, at most one per [`AuthTarget`].
///
/// The lock only guards the map lookup and insertion; it is never held
/// across an await.
#[derive(Default)]
pub struct AuthCoordinator {
    pending: Mutex<HashMap<AuthTarget, Handshake>>,
}

impl AuthCoordinator {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Awaits the handshake for `target`, starting it with `start` only when
    /// none is in flight.
    ///
    /// The registry entry is removed once the handshake resolves, whether it
    /// succeeded or failed.
    pub async fn acquire<F>(&self, target: &AuthTarget, start: F) -> HandshakeResult
    where
        F: FnOnce() -> BoxFuture<'static, HandshakeResult>,
    {
        let handshake = {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            pending
                .entry(target.clone())
                .or_insert_with(|| {
                    debug!(auth_target = %target, "Starting authentication handshake");
                    start().shared()
                })
                .clone()
        };

        let outcome = handshake.clone().await;
        self.release(target, &handshake);
        outcome
    }

    /// Drops the registry entry for `target` regardless of which handshake it
    /// holds.
    pub fn forget(&self, target: &AuthTarget) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if pending.remove(target).is_some() {
            debug!(auth_target = %target, "Dropped pending authentication handshake");
        }
    }

    /// Returns `true` if a handshake for `target` is in flight.
    pub fn is_pending(&self, target: &AuthTarget) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(target)
    }

    /// Removes the entry only if it still holds `handshake`, so a newer
    /// handshake registered after this one resolved is never evicted.
    fn release(&self, target: &AuthTarget, handshake: &Handshake) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if pending
            .get(target)
            .is_some_and(|current| current.ptr_eq(handshake))
        {
            pending.remove(target);
        }
    }
}

impl std::fmt::Debug for AuthCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("AuthCoordinator")
            .field("pending", &pending.keys().collect::<Vec<_>>())
            .finish()
    }
}
