//! Process-wide session state: the persistent cookie cache plus the
//! in-flight handshake registry.

use std::sync::Arc;

use tracing::warn;

use atelier_core::{AuthTarget, ConnectionIdentity, SessionCache, StateStore};

use crate::auth::AuthCoordinator;

/// Owns every piece of mutable session state shared between requests.
///
/// One instance lives in each [`crate::ClientEnvironment`]; all clients
/// created from that environment share it.
#[derive(Debug)]
pub struct SessionManager {
    cache: SessionCache,
    auth: AuthCoordinator,
}

impl SessionManager {
    /// Creates a manager persisting cookies in `store`.
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self {
            cache: SessionCache::new(store),
            auth: AuthCoordinator::new(),
        }
    }

    /// Persistent cookie cache.
    pub fn cache(&self) -> &SessionCache {
        &self.cache
    }

    /// Handshake registry.
    pub fn auth(&self) -> &AuthCoordinator {
        &self.auth
    }

    /// Cookies currently held for `identity`.
    pub fn cookies(&self, identity: &ConnectionIdentity) -> Vec<String> {
        self.cache.cookies(identity)
    }

    /// Merges response cookies. A storage failure is logged, not raised: the
    /// request itself succeeded and the next response refreshes the cookies.
    pub fn absorb_cookies(&self, identity: &ConnectionIdentity, set_cookies: &[String]) -> Vec<String> {
        if set_cookies.is_empty() {
            return self.cache.cookies(identity);
        }
        match self.cache.update_cookies(identity, set_cookies) {
            Ok(merged) => merged,
            Err(e) => {
                warn!(identity = %identity, error = %e, "Could not persist session cookies");
                self.cache.cookies(identity)
            }
        }
    }

    /// Drops the stored session and any pending handshake (logout, forced
    /// reconnection).
    pub fn invalidate(&self, identity: &ConnectionIdentity, target: &AuthTarget) {
        self.auth.forget(target);
        if let Err(e) = self.cache.clear(identity) {
            warn!(identity = %identity, error = %e, "Could not clear session cookies");
        }
    }
}
