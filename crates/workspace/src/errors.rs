//! Errors raised while loading configuration or persisting runtime state.

use std::path::PathBuf;

use thiserror::Error;

use atelier_core::AtelierError;

/// Failure of a workspace-side collaborator.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    /// A file could not be read or written.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for the expected shape.
    #[error("invalid configuration in {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// The state file is not valid JSON.
    #[error("invalid state file {path}: {source}")]
    State {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl From<WorkspaceError> for AtelierError {
    fn from(err: WorkspaceError) -> Self {
        match err {
            WorkspaceError::Config { .. } => AtelierError::Configuration {
                message: err.to_string(),
            },
            WorkspaceError::Io { .. } | WorkspaceError::State { .. } => AtelierError::State {
                message: err.to_string(),
            },
        }
    }
}
