//! Port traits for the collaborators the client consumes.
//!
//! Infrastructure crates implement these; the request pipeline only sees the
//! traits. Configuration and runtime state are synchronous (small, local
//! reads), the connectivity check is async because it performs a request.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{AtelierError, Namespace, Scheme, ServerName};

// ---------------------------------------------------------------------------
// Connection context
// ---------------------------------------------------------------------------

/// The logical origin of a request: which connection definition applies.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionContext {
    /// A workspace-local connection block, by name.
    Workspace(String),
    /// A direct reference to a registered external server, as carried by a
    /// server-addressed file URI (`server:namespace`).
    Server {
        /// Registered server definition.
        server: ServerName,
        /// Namespace named by the reference, if any.
        namespace: Option<String>,
    },
}

impl ConnectionContext {
    /// Human-readable logical name (`name` or `server:namespace`).
    pub fn name(&self) -> String {
        match self {
            Self::Workspace(name) => name.clone(),
            Self::Server {
                server,
                namespace: Some(ns),
            } => format!("{server}:{ns}"),
            Self::Server {
                server,
                namespace: None,
            } => server.to_string(),
        }
    }

    /// Namespace named by the context itself, if any.
    pub fn namespace(&self) -> Option<Namespace> {
        match self {
            Self::Server { namespace, .. } => namespace.as_deref().and_then(Namespace::new),
            Self::Workspace(_) => None,
        }
    }

    /// Prefix of the runtime-state keys holding this connection's overrides.
    pub fn state_key(&self) -> String {
        self.name().to_lowercase()
    }
}

impl std::fmt::Display for ConnectionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name())
    }
}

// ---------------------------------------------------------------------------
// Static configuration
// ---------------------------------------------------------------------------

/// A registered external server (`[servers.<name>]`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerDefinition {
    /// Web server protocol.
    pub scheme: Scheme,
    /// Web server host.
    pub host: String,
    /// Web server port.
    pub port: u16,
    /// Path the web application is mounted under (e.g. `/iris`).
    pub path_prefix: String,
    /// Account name; `None` for unauthenticated access.
    pub username: Option<String>,
    /// Account password.
    pub password: Option<String>,
    /// Free-form description shown to users.
    pub description: Option<String>,
}

/// A workspace-local connection block (`[connections.<name>]`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionBlock {
    /// Whether the connection is switched on.
    pub active: bool,
    /// External server to use instead of the inline address fields.
    pub server: Option<ServerName>,
    /// Inline host.
    pub host: String,
    /// Inline port.
    pub port: u16,
    /// Inline protocol flag.
    pub https: bool,
    /// Inline path prefix.
    pub path_prefix: String,
    /// Namespace.
    pub ns: Option<String>,
    /// Inline account name.
    pub username: Option<String>,
    /// Inline password.
    pub password: Option<String>,
    /// Whether the server runs in a container whose port mapping is learned
    /// at runtime.
    pub docker: bool,
    /// Container service name.
    pub docker_service: Option<String>,
}

/// Provider of static connection definitions.
pub trait ConfigProvider: Send + Sync {
    /// Returns the registered external server `name`, if defined.
    fn server(&self, name: &ServerName) -> Option<ServerDefinition>;

    /// Returns the workspace connection block `name`, if defined.
    fn connection(&self, name: &str) -> Option<ConnectionBlock>;
}

// ---------------------------------------------------------------------------
// Runtime state
// ---------------------------------------------------------------------------

/// Persistent key-value store for runtime-learned state (connection
/// overrides and session cookies).
pub trait StateStore: Send + Sync {
    /// Returns the value stored under `key`.
    fn get(&self, key: &str) -> Option<Value>;

    /// Stores `value` under `key`; `None` removes the key.
    fn update(&self, key: &str, value: Option<Value>) -> Result<(), AtelierError>;
}

/// Typed helpers over any [`StateStore`].
pub trait StateStoreExt: StateStore {
    /// Returns the value under `key` decoded as `T`; undecodable values read
    /// as absent.
    fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get(key)
            .and_then(|value| serde_json::from_value(value).ok())
    }

    /// Encodes `value` and stores it under `key`.
    fn put<T: Serialize>(&self, key: &str, value: &T) -> Result<(), AtelierError> {
        let encoded = serde_json::to_value(value).map_err(|e| AtelierError::State {
            message: format!("cannot encode '{key}': {e}"),
        })?;
        self.update(key, Some(encoded))
    }

    /// Removes `key`.
    fn remove(&self, key: &str) -> Result<(), AtelierError> {
        self.update(key, None)
    }
}

impl<S: StateStore + ?Sized> StateStoreExt for S {}

// ---------------------------------------------------------------------------
// Output surfaces
// ---------------------------------------------------------------------------

/// Externally visible connection indicator.
pub trait StatusSink: Send + Sync {
    /// Sets the indicator text.
    fn set_text(&self, text: &str);

    /// Sets the indicator tooltip.
    fn set_tooltip(&self, tooltip: &str);
}

/// Line-oriented output surface for server console text.
pub trait ConsoleSink: Send + Sync {
    /// Appends one line.
    fn append_line(&self, line: &str);
}

// ---------------------------------------------------------------------------
// Reconnection
// ---------------------------------------------------------------------------

/// Trigger for a background connectivity re-check.
#[async_trait]
pub trait ConnectivityChecker: Send + Sync {
    /// Re-checks the connection for `context` (or every known connection when
    /// `None`). `force` discards the current session first. `namespace` is
    /// the namespace override of the client whose request triggered the
    /// check, if it had one.
    async fn check_connection(
        &self,
        force: bool,
        context: Option<ConnectionContext>,
        namespace: Option<String>,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_keys_are_lowercase_logical_names() {
        let ctx = ConnectionContext::Workspace("MyProject".into());
        assert_eq!(ctx.state_key(), "myproject");

        let ctx = ConnectionContext::Server {
            server: ServerName::new("Dev").unwrap(),
            namespace: Some("USER".into()),
        };
        assert_eq!(ctx.name(), "Dev:USER");
        assert_eq!(ctx.state_key(), "dev:user");
        assert_eq!(ctx.namespace().unwrap().as_str(), "USER");
    }
}
