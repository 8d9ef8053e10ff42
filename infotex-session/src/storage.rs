//! Durable Storage - key-value persistence for client state
//!
//! The session layer only needs what browser local storage offers: string
//! values under string keys that survive a restart. Two backends are provided:
//!
//! | Backend | Survives restart | Used by |
//! |---------|------------------|---------|
//! | [`MemoryStorage`] | no | tests, throwaway sessions |
//! | [`FileStorage`] | yes | the CLI and any desktop front end |
//!
//! Callers in this crate treat every storage error as best-effort: they log it
//! and keep going with the in-memory state.

use infotex_core::{
    storage_error, validation_error, InfotexResult, StorageBackend, StorageConfig,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// String key-value store that outlives the process (or pretends to)
pub trait DurableStorage: Send + Sync {
    /// Read the value under `key`; `Ok(None)` when the key was never written
    fn get(&self, key: &str) -> InfotexResult<Option<String>>;

    /// Write `value` under `key`, replacing any previous value
    fn set(&self, key: &str, value: &str) -> InfotexResult<()>;

    /// Delete `key`; deleting a missing key is not an error
    fn remove(&self, key: &str) -> InfotexResult<()>;
}

/// In-memory storage for testing and ephemeral sessions
#[derive(Clone, Debug, Default)]
pub struct MemoryStorage {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently held
    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DurableStorage for MemoryStorage {
    fn get(&self, key: &str) -> InfotexResult<Option<String>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| storage_error!("memory storage lock poisoned", "memory_storage"))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> InfotexResult<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| storage_error!("memory storage lock poisoned", "memory_storage"))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> InfotexResult<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| storage_error!("memory storage lock poisoned", "memory_storage"))?;
        entries.remove(key);
        Ok(())
    }
}

/// Filesystem-backed storage: one `<key>.json` file per key under a directory.
///
/// ```text
/// <base_dir>/
/// ├── auth.json
/// └── ...
/// ```
#[derive(Clone, Debug)]
pub struct FileStorage {
    base: PathBuf,
}

impl FileStorage {
    /// Create a file storage rooted at `base`; the directory is created lazily
    pub fn new<P: AsRef<Path>>(base: P) -> Self {
        Self {
            base: base.as_ref().to_path_buf(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base
    }

    fn key_path(&self, key: &str) -> InfotexResult<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(validation_error!(
                format!("Invalid storage key '{}'", key),
                "key",
                "file_storage"
            ));
        }
        Ok(self.base.join(format!("{}.json", key)))
    }
}

impl DurableStorage for FileStorage {
    fn get(&self, key: &str) -> InfotexResult<Option<String>> {
        let path = self.key_path(key)?;
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(storage_error!(
                format!("Failed to read {}", path.display()),
                "file_storage",
                e
            )),
        }
    }

    fn set(&self, key: &str, value: &str) -> InfotexResult<()> {
        let path = self.key_path(key)?;
        std::fs::create_dir_all(&self.base).map_err(|e| {
            storage_error!(
                format!("Failed to create {}", self.base.display()),
                "file_storage",
                e
            )
        })?;

        // Write-then-rename so a crash never leaves a half-written value behind
        let staging = path.with_extension("json.tmp");
        std::fs::write(&staging, value)
            .and_then(|_| std::fs::rename(&staging, &path))
            .map_err(|e| {
                storage_error!(
                    format!("Failed to write {}", path.display()),
                    "file_storage",
                    e
                )
            })?;

        debug!(key = key, path = %path.display(), "Stored value");
        Ok(())
    }

    fn remove(&self, key: &str) -> InfotexResult<()> {
        let path = self.key_path(key)?;
        match std::fs::remove_file(&path) {
            Ok(()) => {
                debug!(key = key, path = %path.display(), "Removed value");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(storage_error!(
                format!("Failed to remove {}", path.display()),
                "file_storage",
                e
            )),
        }
    }
}

/// Build the storage backend selected by configuration
pub fn open_storage(config: &StorageConfig) -> Arc<dyn DurableStorage> {
    match config.backend {
        StorageBackend::Memory => {
            info!("Using in-memory session storage");
            Arc::new(MemoryStorage::new())
        }
        StorageBackend::File => {
            let dir = config.resolved_data_dir();
            info!("Using file session storage at: {}", dir.display());
            Arc::new(FileStorage::new(dir))
        }
    }
}
