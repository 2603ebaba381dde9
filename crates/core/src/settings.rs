//! Effective connection settings: a static layer from configuration plus a
//! sparse override layer learned at runtime.
//!
//! Settings are never cached. Every [`SettingsResolver::resolve`] call reads
//! the configuration and the runtime-state store afresh, so an override
//! written by one request (a negotiated API version, a forgotten port) is seen
//! by the next.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ports::{ConfigProvider, ConnectionContext, StateStore, StateStoreExt};
use crate::{ApiVersion, AtelierError, ConnectionIdentity, Namespace, Scheme, ServerName};

// ---------------------------------------------------------------------------
// Settings value
// ---------------------------------------------------------------------------

/// Effective parameters for one logical connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSettings {
    /// External server the connection resolved through, if any.
    pub server_name: Option<ServerName>,
    /// Configured on/off switch; see [`Self::is_active`] for the effective state.
    pub active: bool,
    /// Negotiated (or assumed) API version.
    pub api_version: ApiVersion,
    /// `true` for HTTPS.
    pub is_secure: bool,
    /// Web server host.
    pub host: String,
    /// Web server port.
    pub port: u16,
    /// Normalized path prefix (`""` or `/segment`, never a trailing `/`).
    pub path_prefix: String,
    /// Namespace all document operations are scoped to.
    pub namespace: Option<Namespace>,
    /// Account name.
    pub username: Option<String>,
    /// Account password.
    pub password: Option<String>,
    /// Whether the server runs in a container.
    pub is_containerized: bool,
    /// Container service name.
    pub container_service: Option<String>,
    /// Learned server family flag (IRIS vs. Caché/Ensemble).
    pub is_iris: bool,
}

impl ConnectionSettings {
    /// A connection is operable only when switched on and addressable.
    pub fn is_active(&self) -> bool {
        self.active && !self.host.is_empty() && self.port > 0
    }

    /// The `(host, port)` this connection talks to.
    pub fn identity(&self) -> ConnectionIdentity {
        ConnectionIdentity::new(self.host.clone(), self.port)
    }

    /// URL scheme.
    pub fn scheme(&self) -> Scheme {
        if self.is_secure {
            Scheme::Https
        } else {
            Scheme::Http
        }
    }

    /// Status indicator text: `host:port[NS]`.
    pub fn connection_info(&self) -> String {
        let ns = self
            .namespace
            .as_ref()
            .map(Namespace::as_str)
            .unwrap_or_default();
        format!("{}:{}[{}]", self.host, self.port, ns)
    }
}

// ---------------------------------------------------------------------------
// Override layer
// ---------------------------------------------------------------------------

/// Runtime-learned values layered over static configuration. Each field is
/// independently optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsOverrides {
    /// Host the server was found at.
    pub host: Option<String>,
    /// Port the server was found at.
    pub port: Option<u16>,
    /// Password entered at runtime.
    pub password: Option<String>,
    /// API version the server reported.
    pub api_version: Option<ApiVersion>,
    /// Learned container flag.
    pub is_containerized: Option<bool>,
    /// Learned server family flag.
    pub is_iris: Option<bool>,
}

/// Effective value = override if present, else static value.
pub fn merge(base: ConnectionSettings, overrides: &SettingsOverrides) -> ConnectionSettings {
    ConnectionSettings {
        host: overrides.host.clone().unwrap_or(base.host),
        port: overrides.port.unwrap_or(base.port),
        password: overrides.password.clone().or(base.password),
        api_version: overrides.api_version.unwrap_or(base.api_version),
        is_containerized: overrides.is_containerized.unwrap_or(base.is_containerized),
        is_iris: overrides.is_iris.unwrap_or(base.is_iris),
        ..base
    }
}

/// Normalizes a path prefix to `""` or `/a/b` (one leading slash, no
/// trailing slash).
pub fn normalize_path_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

const HOST: &str = "host";
const PORT: &str = "port";
const PASSWORD: &str = "password";
const API_VERSION: &str = "apiVersion";
const DOCKER: &str = "docker";
const IRIS: &str = "iris";

/// Produces [`ConnectionSettings`] for a [`ConnectionContext`] and writes the
/// override layer.
#[derive(Clone)]
pub struct SettingsResolver {
    config: Arc<dyn ConfigProvider>,
    state: Arc<dyn StateStore>,
}

impl SettingsResolver {
    /// Creates a resolver over a configuration provider and a state store.
    pub fn new(config: Arc<dyn ConfigProvider>, state: Arc<dyn StateStore>) -> Self {
        Self { config, state }
    }

    /// Resolves the effective settings for `context`.
    ///
    /// `namespace` overrides the configured namespace when given.
    pub fn resolve(
        &self,
        context: &ConnectionContext,
        namespace: Option<&str>,
    ) -> ConnectionSettings {
        let (base, through_server) = self.static_layer(context);
        let mut settings = merge(base, &self.overrides(context));

        if let Some(ns) = namespace.and_then(Namespace::new) {
            settings.namespace = Some(ns);
        }

        // A server-only reference without a namespace cannot address documents.
        if through_server && settings.namespace.is_none() {
            settings.active = false;
        }
        debug!(
            connection = %context,
            active = settings.is_active(),
            api = %settings.api_version,
            "Resolved connection settings"
        );
        settings
    }

    /// Reads the sparse override layer for `context`.
    pub fn overrides(&self, context: &ConnectionContext) -> SettingsOverrides {
        let key = context.state_key();
        let field = |name: &str| format!("{key}:{name}");
        SettingsOverrides {
            host: self.state.get_as(&field(HOST)),
            port: self.state.get_as(&field(PORT)),
            password: self.state.get_as(&field(PASSWORD)),
            api_version: self.state.get_as(&field(API_VERSION)),
            is_containerized: self.state.get_as(&field(DOCKER)),
            is_iris: self.state.get_as(&field(IRIS)),
        }
    }

    /// Records the API version the server reported.
    pub fn remember_api_version(
        &self,
        context: &ConnectionContext,
        version: ApiVersion,
    ) -> Result<(), AtelierError> {
        self.state.put(&state_field(context, API_VERSION), &version)
    }

    /// Records the server family flag.
    pub fn remember_server_family(
        &self,
        context: &ConnectionContext,
        is_iris: bool,
    ) -> Result<(), AtelierError> {
        self.state.put(&state_field(context, IRIS), &is_iris)
    }

    /// Records a password entered at runtime.
    pub fn remember_password(
        &self,
        context: &ConnectionContext,
        password: &str,
    ) -> Result<(), AtelierError> {
        self.state.put(&state_field(context, PASSWORD), &password)
    }

    /// Records where the server actually answers (moved port, container
    /// port mapping).
    pub fn remember_address(
        &self,
        context: &ConnectionContext,
        host: &str,
        port: u16,
        is_containerized: bool,
    ) -> Result<(), AtelierError> {
        self.state.put(&state_field(context, HOST), &host)?;
        self.state.put(&state_field(context, PORT), &port)?;
        self.state
            .put(&state_field(context, DOCKER), &is_containerized)
    }

    /// Drops learned host/port so the next resolution uses static
    /// configuration.
    pub fn forget_address(&self, context: &ConnectionContext) -> Result<(), AtelierError> {
        self.state.remove(&state_field(context, HOST))?;
        self.state.remove(&state_field(context, PORT))
    }

    /// Builds the static layer and reports whether it came from an external
    /// server definition.
    fn static_layer(&self, context: &ConnectionContext) -> (ConnectionSettings, bool) {
        match context {
            ConnectionContext::Workspace(name) => {
                let Some(block) = self.config.connection(name) else {
                    return (ConnectionSettings::default(), false);
                };
                let mut settings = ConnectionSettings {
                    server_name: None,
                    active: block.active,
                    api_version: ApiVersion::DEFAULT,
                    is_secure: block.https,
                    host: block.host,
                    port: block.port,
                    path_prefix: normalize_path_prefix(&block.path_prefix),
                    namespace: block.ns.as_deref().and_then(Namespace::new),
                    username: block.username,
                    password: block.password,
                    is_containerized: block.docker,
                    container_service: block.docker_service,
                    is_iris: false,
                };
                let Some(server) = block.server else {
                    return (settings, false);
                };
                match self.config.server(&server) {
                    Some(def) => {
                        settings.is_secure = def.scheme == Scheme::Https;
                        settings.host = def.host;
                        settings.port = def.port;
                        settings.path_prefix = normalize_path_prefix(&def.path_prefix);
                        settings.username = def.username;
                        settings.password = def.password;
                        settings.server_name = Some(server);
                        (settings, true)
                    }
                    None => {
                        debug!(server = %server, "Connection refers to an undefined server");
                        settings.active = false;
                        (settings, false)
                    }
                }
            }
            ConnectionContext::Server { server, .. } => match self.config.server(server) {
                Some(def) => (
                    ConnectionSettings {
                        server_name: Some(server.clone()),
                        active: true,
                        api_version: ApiVersion::DEFAULT,
                        is_secure: def.scheme == Scheme::Https,
                        host: def.host,
                        port: def.port,
                        path_prefix: normalize_path_prefix(&def.path_prefix),
                        namespace: context.namespace(),
                        username: def.username,
                        password: def.password,
                        is_containerized: false,
                        container_service: None,
                        is_iris: false,
                    },
                    true,
                ),
                None => (ConnectionSettings::default(), true),
            },
        }
    }
}

fn state_field(context: &ConnectionContext, name: &str) -> String {
    format!("{}:{name}", context.state_key())
}

impl std::fmt::Debug for SettingsResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsResolver").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use serde_json::Value;

    use super::*;
    use crate::ports::{ConnectionBlock, ServerDefinition};

    #[derive(Default)]
    struct StaticConfig {
        servers: HashMap<String, ServerDefinition>,
        connections: HashMap<String, ConnectionBlock>,
    }

    impl ConfigProvider for StaticConfig {
        fn server(&self, name: &ServerName) -> Option<ServerDefinition> {
            self.servers.get(name.as_str()).cloned()
        }

        fn connection(&self, name: &str) -> Option<ConnectionBlock> {
            self.connections.get(name).cloned()
        }
    }

    #[derive(Default)]
    struct MapStore(Mutex<HashMap<String, Value>>);

    impl StateStore for MapStore {
        fn get(&self, key: &str) -> Option<Value> {
            self.0.lock().unwrap().get(key).cloned()
        }

        fn update(&self, key: &str, value: Option<Value>) -> Result<(), AtelierError> {
            let mut map = self.0.lock().unwrap();
            match value {
                Some(v) => map.insert(key.to_string(), v),
                None => map.remove(key),
            };
            Ok(())
        }
    }

    fn dev_server() -> ServerDefinition {
        ServerDefinition {
            scheme: Scheme::Https,
            host: "iris.example.com".into(),
            port: 443,
            path_prefix: "iris/".into(),
            username: Some("dev".into()),
            password: Some("secret".into()),
            description: None,
        }
    }

    fn resolver() -> SettingsResolver {
        let mut config = StaticConfig::default();
        config.servers.insert("dev".into(), dev_server());
        config.connections.insert(
            "local".into(),
            ConnectionBlock {
                active: true,
                host: "localhost".into(),
                port: 52773,
                ns: Some("user".into()),
                username: Some("_SYSTEM".into()),
                password: Some("SYS".into()),
                ..ConnectionBlock::default()
            },
        );
        config.connections.insert(
            "remote".into(),
            ConnectionBlock {
                active: true,
                server: ServerName::new("dev"),
                host: "ignored".into(),
                ns: Some("APP".into()),
                ..ConnectionBlock::default()
            },
        );
        config.connections.insert(
            "remote-no-ns".into(),
            ConnectionBlock {
                active: true,
                server: ServerName::new("dev"),
                ..ConnectionBlock::default()
            },
        );
        SettingsResolver::new(Arc::new(config), Arc::new(MapStore::default()))
    }

    #[test]
    fn workspace_block_resolves_inline_fields() {
        let settings = resolver().resolve(&ConnectionContext::Workspace("local".into()), None);
        assert!(settings.is_active());
        assert_eq!(settings.identity().to_string(), "localhost:52773");
        assert_eq!(settings.namespace.as_ref().unwrap().as_str(), "USER");
        assert_eq!(settings.api_version, ApiVersion::DEFAULT);
        assert_eq!(settings.scheme(), Scheme::Http);
    }

    #[test]
    fn external_server_takes_precedence_over_inline_fields() {
        let settings = resolver().resolve(&ConnectionContext::Workspace("remote".into()), None);
        assert_eq!(settings.host, "iris.example.com");
        assert_eq!(settings.path_prefix, "/iris");
        assert!(settings.is_secure);
        assert_eq!(settings.server_name.as_ref().unwrap().as_str(), "dev");
        assert_eq!(settings.username.as_deref(), Some("dev"));
    }

    #[test]
    fn explicit_namespace_overrides_configured_one() {
        let settings =
            resolver().resolve(&ConnectionContext::Workspace("local".into()), Some("%sys"));
        assert_eq!(settings.namespace.unwrap().as_str(), "%SYS");
    }

    #[test]
    fn external_server_without_namespace_is_inactive() {
        let r = resolver();
        let settings = r.resolve(&ConnectionContext::Workspace("remote-no-ns".into()), None);
        assert!(!settings.active);
        assert!(!settings.is_active());

        let ctx = ConnectionContext::Server {
            server: ServerName::new("dev").unwrap(),
            namespace: Some(String::new()),
        };
        assert!(!r.resolve(&ctx, None).is_active());

        let ctx = ConnectionContext::Server {
            server: ServerName::new("dev").unwrap(),
            namespace: Some("app".into()),
        };
        assert!(r.resolve(&ctx, None).is_active());
    }

    #[test]
    fn overrides_win_and_are_forgotten() {
        let r = resolver();
        let ctx = ConnectionContext::Workspace("local".into());
        r.remember_address(&ctx, "127.0.0.1", 55000, true).unwrap();
        r.remember_api_version(&ctx, ApiVersion::new(6)).unwrap();

        let settings = r.resolve(&ctx, None);
        assert_eq!(settings.identity().to_string(), "127.0.0.1:55000");
        assert!(settings.is_containerized);
        assert_eq!(settings.api_version, ApiVersion::new(6));

        r.forget_address(&ctx).unwrap();
        let settings = r.resolve(&ctx, None);
        assert_eq!(settings.identity().to_string(), "localhost:52773");
        assert_eq!(settings.api_version, ApiVersion::new(6));
    }

    #[test]
    fn remembered_passwords_override_static_ones() {
        let r = resolver();
        let ctx = ConnectionContext::Workspace("local".into());
        r.remember_password(&ctx, "entered").unwrap();
        assert_eq!(r.resolve(&ctx, None).password.as_deref(), Some("entered"));

        r.forget_address(&ctx).unwrap();
        assert_eq!(r.resolve(&ctx, None).password.as_deref(), Some("entered"));
    }

    #[test]
    fn unknown_and_unaddressable_connections_are_inactive() {
        let r = resolver();
        assert!(!r
            .resolve(&ConnectionContext::Workspace("missing".into()), None)
            .is_active());

        let base = ConnectionSettings {
            active: true,
            host: "localhost".into(),
            port: 0,
            ..ConnectionSettings::default()
        };
        assert!(!base.is_active());
    }

    #[test]
    fn path_prefixes_are_normalized() {
        assert_eq!(normalize_path_prefix(""), "");
        assert_eq!(normalize_path_prefix("/"), "");
        assert_eq!(normalize_path_prefix("iris"), "/iris");
        assert_eq!(normalize_path_prefix("/iris/"), "/iris");
    }

    #[test]
    fn merge_prefers_overrides_per_field() {
        let base = ConnectionSettings {
            host: "a".into(),
            port: 1,
            password: Some("static".into()),
            ..ConnectionSettings::default()
        };
        let overrides = SettingsOverrides {
            port: Some(2),
            ..SettingsOverrides::default()
        };
        let merged = merge(base, &overrides);
        assert_eq!((merged.host.as_str(), merged.port), ("a", 2));
        assert_eq!(merged.password.as_deref(), Some("static"));
    }
}
