//! `atelier.toml`: server definitions, connection blocks and transport
//! tunables.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use atelier_core::{ConfigProvider, ConnectionBlock, ServerDefinition, ServerName};

use crate::WorkspaceError;

/// Default configuration file name.
pub const CONFIG_FILE: &str = "atelier.toml";

/// `[transport]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportSection {
    /// Validate TLS certificates on secure connections.
    #[serde(default = "default_true")]
    pub strict_ssl: bool,

    /// Maximum idle keep-alive connections per host.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

fn default_true() -> bool {
    true
}

fn default_max_connections() -> usize {
    10
}

impl Default for TransportSection {
    fn default() -> Self {
        Self {
            strict_ssl: true,
            max_connections: default_max_connections(),
        }
    }
}

/// Parsed configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    #[serde(default)]
    pub transport: TransportSection,

    /// External server definitions by name.
    #[serde(default)]
    pub servers: BTreeMap<String, ServerDefinition>,

    /// Workspace connection blocks by name.
    #[serde(default)]
    pub connections: BTreeMap<String, ConnectionBlock>,
}

impl WorkspaceConfig {
    /// Reads and parses `path`.
    pub fn load(path: &Path) -> Result<Self, WorkspaceError> {
        let text = std::fs::read_to_string(path).map_err(|source| WorkspaceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::parse(&text).map_err(|source| WorkspaceError::Config {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(
            path = %path.display(),
            servers = config.servers.len(),
            connections = config.connections.len(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Parses TOML text.
    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Names of all connection blocks, sorted.
    pub fn connection_names(&self) -> impl Iterator<Item = &str> {
        self.connections.keys().map(String::as_str)
    }
}

impl ConfigProvider for WorkspaceConfig {
    fn server(&self, name: &ServerName) -> Option<ServerDefinition> {
        self.servers.get(name.as_str()).cloned()
    }

    fn connection(&self, name: &str) -> Option<ConnectionBlock> {
        self.connections.get(name).cloned()
    }
}
