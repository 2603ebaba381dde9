//! Newtype domain identifiers.
//!
//! Every addressing concept in the client is a distinct newtype so that, for
//! example, a [`ServerName`] cannot be passed where a [`WorkId`] is expected
//! even though both wrap a `String`.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() returning Option<Self>, as_str(), Display.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, returning `None` if the value is empty.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                if v.is_empty() { None } else { Some(Self(v)) }
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

string_id! {
    /// Name of a registered external server definition (`[servers.<name>]`).
    ///
    /// External servers are defined outside any workspace and take precedence
    /// over workspace-local connection fields when a connection refers to one.
    ServerName
}

string_id! {
    /// Identifier of a queued asynchronous work request on the server.
    WorkId
}

// ---------------------------------------------------------------------------
// Namespace
// ---------------------------------------------------------------------------

/// A server-side partition of stored code and data, addressed per request.
///
/// Namespaces compare case-insensitively; the canonical form held here is
/// uppercase, so derived equality already ignores case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Namespace(String);

impl Namespace {
    /// Creates a namespace in canonical uppercase form.
    ///
    /// Returns `None` if the value is empty or only whitespace.
    pub fn new(value: impl AsRef<str>) -> Option<Self> {
        let trimmed = value.as_ref().trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_uppercase()))
        }
    }

    /// Returns the canonical (uppercase) namespace name.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if `other` names this namespace, ignoring case.
    pub fn matches(&self, other: &str) -> bool {
        self.0.eq_ignore_ascii_case(other.trim())
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Connection identity and authentication target
// ---------------------------------------------------------------------------

/// The `(host, port)` pair a session belongs to.
///
/// Session cookies and the status display are both addressed by identity,
/// never by logical connection name: two workspace folders pointing at the
/// same server share one session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionIdentity {
    /// Server host name or address.
    pub host: String,
    /// Web server port.
    pub port: u16,
}

impl ConnectionIdentity {
    /// Creates an identity from its parts.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Key under which this identity's session is persisted in the state store.
    pub fn session_key(&self) -> String {
        format!("session:{}:{}", self.host, self.port)
    }
}

impl std::fmt::Display for ConnectionIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Key of an authentication handshake: `username@host:port`.
///
/// At most one handshake per target is in flight at any time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AuthTarget(String);

impl AuthTarget {
    /// Builds the target for `username` at `identity`. An absent username
    /// (unauthenticated access) yields `@host:port`.
    pub fn new(username: Option<&str>, identity: &ConnectionIdentity) -> Self {
        Self(format!("{}@{}", username.unwrap_or_default(), identity))
    }

    /// Returns the target as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AuthTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_is_canonical_uppercase() {
        let ns = Namespace::new(" user ").unwrap();
        assert_eq!(ns.as_str(), "USER");
        assert_eq!(ns, Namespace::new("User").unwrap());
        assert!(ns.matches("uSeR"));
        assert!(Namespace::new("  ").is_none());
    }

    #[test]
    fn auth_target_formats_user_at_identity() {
        let identity = ConnectionIdentity::new("localhost", 52773);
        assert_eq!(
            AuthTarget::new(Some("_SYSTEM"), &identity).as_str(),
            "_SYSTEM@localhost:52773"
        );
        assert_eq!(AuthTarget::new(None, &identity).as_str(), "@localhost:52773");
    }

    #[test]
    fn string_ids_reject_empty_values() {
        assert!(ServerName::new("").is_none());
        assert_eq!(ServerName::new("dev").unwrap().as_str(), "dev");
    }
}
