//! Error and retry-policy types for the Atelier client.
//!
//! [`AtelierError`] is the closed set of failures any request can produce.
//! The request pipeline never retries on its own; [`RetryPolicy`] tells the
//! caller whether a retry is sensible and how long the pipeline's own
//! reconnection check needs before one can succeed.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Delay before the re-check scheduled after a `401 Unauthorized` response.
pub const UNAUTHORIZED_RECHECK_DELAY: Duration = Duration::from_secs(1);

/// Delay before the re-check scheduled after a refused connection.
pub const REFUSED_RECHECK_DELAY: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Retry semantics
// ---------------------------------------------------------------------------

/// Whether an error condition is safe to retry and, if so, after what delay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RetryPolicy {
    /// The operation may be retried.
    Retryable {
        /// Minimum back-off before the next attempt. `None` means retry
        /// immediately or apply the caller's own back-off schedule.
        after: Option<Duration>,
    },
    /// Retrying without a change of input or configuration will fail again.
    NonRetryable,
}

// ---------------------------------------------------------------------------
// Transport failure classification
// ---------------------------------------------------------------------------

/// Low-level cause of a [`AtelierError::Transport`] failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportErrorKind {
    /// The server actively refused the TCP connection (nothing listening).
    ConnectionRefused,
    /// Any other failure while establishing the connection (DNS, TLS, routing).
    Connect,
    /// The request timed out.
    Timeout,
    /// Failure after the connection was established (body read, protocol).
    Other,
}

impl std::fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::ConnectionRefused => "connection refused",
            Self::Connect => "connect error",
            Self::Timeout => "timeout",
            Self::Other => "transport error",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Client errors
// ---------------------------------------------------------------------------

/// Every failure a request against the Atelier API can produce.
///
/// Variants carry structured fields so callers can branch on them without
/// parsing messages. The type is `Clone` because one handshake outcome is
/// shared between all requests waiting on it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AtelierError {
    /// The connection is inactive or has no host/port; no request was sent.
    #[error("Connection '{connection}' is not active")]
    Inactive {
        /// Logical name of the connection that was used.
        connection: String,
    },

    /// The operation needs a newer API than the server negotiated.
    #[error("This operation requires Atelier API version {required}; the server supports version {negotiated}")]
    VersionUnsupported {
        /// Minimum API version the operation declares.
        required: u32,
        /// Version negotiated with the server.
        negotiated: u32,
    },

    /// The server answered with a non-2xx HTTP status.
    #[error("HTTP {status}: {message}")]
    HttpStatus {
        /// Numeric HTTP status code.
        status: u16,
        /// Status text (reason phrase).
        message: String,
    },

    /// The response envelope reported a failure (`result.status` or
    /// `status.summary`).
    #[error("{message}")]
    Protocol {
        /// Server-supplied error text.
        message: String,
    },

    /// The resolved namespace does not exist on the server.
    #[error("This server does not have namespace '{namespace}'. Valid namespaces: {}", .available.join(", "))]
    NamespaceNotFound {
        /// Namespace the connection resolved to.
        namespace: String,
        /// Namespaces the server advertises.
        available: Vec<String>,
    },

    /// The request never produced an HTTP response.
    #[error("{kind}: {message}")]
    Transport {
        /// Classified cause.
        kind: TransportErrorKind,
        /// Underlying error text.
        message: String,
    },

    /// The response body was not a valid envelope or its content could not
    /// be decoded.
    #[error("Invalid response: {message}")]
    InvalidResponse {
        /// Description of the decoding problem.
        message: String,
    },

    /// Configuration is unusable (unparseable file, unbuildable transport).
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem.
        message: String,
    },

    /// The runtime-state store could not be read or written.
    #[error("State store error: {message}")]
    State {
        /// Description of the storage problem.
        message: String,
    },
}

impl AtelierError {
    /// HTTP status code carried by this error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns `true` for a `401 Unauthorized` response.
    pub fn is_unauthorized(&self) -> bool {
        self.status_code() == Some(401)
    }

    /// Returns `true` if the server refused the connection.
    pub fn is_connection_refused(&self) -> bool {
        matches!(
            self,
            Self::Transport {
                kind: TransportErrorKind::ConnectionRefused,
                ..
            }
        )
    }

    /// Whether retrying the same call can succeed without caller changes.
    ///
    /// Unauthorized and refused connections become retryable once the
    /// scheduled reconnection check has run.
    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            Self::HttpStatus { status: 401, .. } => RetryPolicy::Retryable {
                after: Some(UNAUTHORIZED_RECHECK_DELAY),
            },
            Self::HttpStatus { status, .. } if *status >= 500 => {
                RetryPolicy::Retryable { after: None }
            }
            Self::Transport {
                kind: TransportErrorKind::ConnectionRefused,
                ..
            } => RetryPolicy::Retryable {
                after: Some(REFUSED_RECHECK_DELAY),
            },
            Self::Transport {
                kind: TransportErrorKind::Timeout,
                ..
            } => RetryPolicy::Retryable { after: None },
            _ => RetryPolicy::NonRetryable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_not_found_lists_valid_namespaces() {
        let err = AtelierError::NamespaceNotFound {
            namespace: "FOO".into(),
            available: vec!["%SYS".into(), "USER".into()],
        };
        assert_eq!(
            err.to_string(),
            "This server does not have namespace 'FOO'. Valid namespaces: %SYS, USER"
        );
    }

    #[test]
    fn unauthorized_is_retryable_after_recheck_delay() {
        let err = AtelierError::HttpStatus {
            status: 401,
            message: "Unauthorized".into(),
        };
        assert!(err.is_unauthorized());
        assert_eq!(
            err.retry_policy(),
            RetryPolicy::Retryable {
                after: Some(UNAUTHORIZED_RECHECK_DELAY)
            }
        );
    }

    #[test]
    fn protocol_errors_are_not_retryable() {
        let err = AtelierError::Protocol {
            message: "ERROR #5001".into(),
        };
        assert_eq!(err.retry_policy(), RetryPolicy::NonRetryable);
        assert_eq!(err.status_code(), None);
    }
}
