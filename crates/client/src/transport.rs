//! Pooled HTTP transport and transport-error classification.

use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use atelier_core::{AtelierError, ConnectionSettings, TransportErrorKind};

use crate::ClientOptions;

const KEEPALIVE: Duration = Duration::from_secs(60);
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// Keep-alive connection pools, one per TLS validation policy.
///
/// Certificate validation is only relaxed for secure connections when
/// `strict_ssl` is off; plain HTTP always uses the validating pool. At most
/// `max_connections` requests are in flight at once across both pools.
#[derive(Debug, Clone)]
pub(crate) struct TransportPool {
    validating: Client,
    permissive: Client,
    strict_ssl: bool,
    permits: Arc<Semaphore>,
}

impl TransportPool {
    pub(crate) fn new(options: &ClientOptions) -> Result<Self, AtelierError> {
        Ok(Self {
            validating: build_client(options, true)?,
            permissive: build_client(options, false)?,
            strict_ssl: options.strict_ssl,
            permits: Arc::new(Semaphore::new(options.max_connections.max(1))),
        })
    }

    /// Waits for a free connection slot. The slot is released when the
    /// permit drops.
    pub(crate) async fn permit(&self) -> Result<OwnedSemaphorePermit, AtelierError> {
        Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|e| AtelierError::Transport {
                kind: TransportErrorKind::Other,
                message: format!("connection pool closed: {e}"),
            })
    }

    /// Client to use for `settings`.
    pub(crate) fn client_for(&self, settings: &ConnectionSettings) -> &Client {
        if settings.is_secure && !self.strict_ssl {
            &self.permissive
        } else {
            &self.validating
        }
    }
}

fn build_client(options: &ClientOptions, validate_certs: bool) -> Result<Client, AtelierError> {
    debug!(
        max_connections = options.max_connections,
        validate_certs, "Building HTTP transport"
    );
    Client::builder()
        .pool_max_idle_per_host(options.max_connections)
        .pool_idle_timeout(POOL_IDLE_TIMEOUT)
        .tcp_keepalive(KEEPALIVE)
        .danger_accept_invalid_certs(!validate_certs)
        .build()
        .map_err(|e| AtelierError::Configuration {
            message: format!("cannot build HTTP transport: {e}"),
        })
}

/// Maps a `reqwest` failure onto [`AtelierError::Transport`].
pub(crate) fn transport_error(err: &reqwest::Error) -> AtelierError {
    let kind = if is_refused(err) {
        TransportErrorKind::ConnectionRefused
    } else if err.is_timeout() {
        TransportErrorKind::Timeout
    } else if err.is_connect() {
        TransportErrorKind::Connect
    } else {
        TransportErrorKind::Other
    };
    AtelierError::Transport {
        kind,
        message: error_chain(err),
    }
}

fn is_refused(err: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            if io.kind() == std::io::ErrorKind::ConnectionRefused {
                return true;
            }
        }
        current = e.source();
    }
    false
}

fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut message = err.to_string();
    let mut current = err.source();
    while let Some(e) = current {
        let text = e.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        current = e.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Wrapper(std::io::Error);

    impl std::fmt::Display for Wrapper {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("tcp connect error")
        }
    }

    impl StdError for Wrapper {
        fn source(&self) -> Option<&(dyn StdError + 'static)> {
            Some(&self.0)
        }
    }

    #[test]
    fn refused_connections_are_found_in_the_source_chain() {
        let err = Wrapper(std::io::Error::from(std::io::ErrorKind::ConnectionRefused));
        assert!(is_refused(&err));

        let err = Wrapper(std::io::Error::from(std::io::ErrorKind::TimedOut));
        assert!(!is_refused(&err));
    }

    #[test]
    fn error_chain_joins_distinct_messages() {
        let err = Wrapper(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "Connection refused (os error 111)",
        ));
        assert_eq!(
            error_chain(&err),
            "tcp connect error: Connection refused (os error 111)"
        );
    }

    #[tokio::test]
    async fn permits_bound_in_flight_requests() {
        let pool = TransportPool::new(&ClientOptions {
            max_connections: 2,
            ..ClientOptions::default()
        })
        .unwrap();

        let first = pool.permit().await.unwrap();
        let _second = pool.permit().await.unwrap();
        assert!(
            tokio::time::timeout(Duration::from_millis(50), pool.permit())
                .await
                .is_err()
        );

        drop(first);
        pool.permit().await.unwrap();
    }

    #[test]
    fn zero_connections_still_allows_one_request() {
        let pool = TransportPool::new(&ClientOptions {
            max_connections: 0,
            ..ClientOptions::default()
        })
        .unwrap();
        assert_eq!(pool.permits.available_permits(), 1);
    }
}
