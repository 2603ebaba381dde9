//! Tunables for the request pipeline.

use std::time::Duration;

use atelier_core::{REFUSED_RECHECK_DELAY, UNAUTHORIZED_RECHECK_DELAY};

/// Default bound on concurrent connections.
pub const DEFAULT_MAX_CONNECTIONS: usize = 10;

/// Transport and reconnection settings shared by every client of one
/// [`crate::ClientEnvironment`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    /// Validate TLS certificates on secure connections. Has no effect on
    /// plain HTTP connections.
    pub strict_ssl: bool,
    /// Maximum requests in flight at once, and idle keep-alive connections
    /// kept per host. `0` is treated as `1`.
    pub max_connections: usize,
    /// Delay before the forced re-check scheduled after a 401.
    pub unauthorized_recheck_delay: Duration,
    /// Delay before the re-check scheduled after a refused connection.
    pub refused_recheck_delay: Duration,
    /// `User-Agent` header value.
    pub user_agent: String,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            strict_ssl: true,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            unauthorized_recheck_delay: UNAUTHORIZED_RECHECK_DELAY,
            refused_recheck_delay: REFUSED_RECHECK_DELAY,
            user_agent: concat!("atelier-client/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}
