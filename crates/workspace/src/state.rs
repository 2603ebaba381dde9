//! Runtime-state stores: learned overrides and session cookies, keyed by
//! string.

use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde_json::Value;
use tracing::{debug, warn};

use atelier_core::{AtelierError, StateStore};

use crate::WorkspaceError;

/// Default state file location, relative to the workspace root.
pub const DEFAULT_STATE_PATH: &str = ".atelier/state.json";

/// JSON-file-backed state.
///
/// The whole map is kept in memory and rewritten on every change. Writes go
/// to a temporary file in the same directory which then replaces the state
/// file, so a crash never leaves a truncated file behind.
#[derive(Debug)]
pub struct FileStateStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, Value>>,
}

impl FileStateStore {
    /// Opens `path`, starting empty if it does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, WorkspaceError> {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(text) if text.trim().is_empty() => BTreeMap::new(),
            Ok(text) => serde_json::from_str(&text).map_err(|source| WorkspaceError::State {
                path: path.clone(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => return Err(WorkspaceError::Io { path, source }),
        };
        debug!(path = %path.display(), entries = entries.len(), "Opened state file");
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// Location of the state file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &BTreeMap<String, Value>) -> Result<(), WorkspaceError> {
        let io_err = |source| WorkspaceError::Io {
            path: self.path.clone(),
            source,
        };
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(io_err)?;

        let json = serde_json::to_vec_pretty(entries).map_err(|source| WorkspaceError::State {
            path: self.path.clone(),
            source,
        })?;
        let mut file = tempfile::NamedTempFile::new_in(&dir).map_err(io_err)?;
        file.write_all(&json).map_err(io_err)?;
        file.as_file().sync_all().map_err(io_err)?;
        file.persist(&self.path).map_err(|e| io_err(e.error))?;
        Ok(())
    }
}

impl StateStore for FileStateStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn update(&self, key: &str, value: Option<Value>) -> Result<(), AtelierError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let previous = match value {
            Some(value) => entries.insert(key.to_string(), value),
            None => entries.remove(key),
        };
        if let Err(e) = self.persist(&entries) {
            warn!(key, error = %e, "Could not write state file");
            // Keep memory consistent with what is on disk.
            match previous {
                Some(old) => entries.insert(key.to_string(), old),
                None => entries.remove(key),
            };
            return Err(e.into());
        }
        Ok(())
    }
}

/// In-memory state for tests and one-shot use.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    entries: Mutex<HashMap<String, Value>>,
}

impl MemoryStateStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StateStore for MemoryStateStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn update(&self, key: &str, value: Option<Value>) -> Result<(), AtelierError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        match value {
            Some(value) => entries.insert(key.to_string(), value),
            None => entries.remove(key),
        };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn missing_file_starts_empty_and_is_created_on_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".atelier").join("state.json");
        let store = FileStateStore::open(&path).unwrap();
        assert!(store.get("project:port").is_none());

        store.update("project:port", Some(json!(52774))).unwrap();
        assert!(path.exists());

        let reopened = FileStateStore::open(&path).unwrap();
        assert_eq!(reopened.get("project:port"), Some(json!(52774)));
    }

    #[test]
    fn removing_a_key_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let store = FileStateStore::open(&path).unwrap();
        store.update("a", Some(json!(true))).unwrap();
        store.update("b", Some(json!("x"))).unwrap();
        store.update("a", None).unwrap();

        let reopened = FileStateStore::open(&path).unwrap();
        assert!(reopened.get("a").is_none());
        assert_eq!(reopened.get("b"), Some(json!("x")));
    }

    #[test]
    fn corrupt_state_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            FileStateStore::open(&path),
            Err(WorkspaceError::State { .. })
        ));
    }

    #[test]
    fn memory_store_round_trips() {
        let store = MemoryStateStore::new();
        store.update("k", Some(json!([1, 2]))).unwrap();
        assert_eq!(store.get("k"), Some(json!([1, 2])));
        assert_eq!(store.len(), 1);
        store.update("k", None).unwrap();
        assert!(store.is_empty());
    }
}
