//! Key-value persistence backends for the offline cache.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::debug;

use crate::error::PersistenceError;

/// String-keyed storage for serialized snapshots.
#[async_trait]
pub trait LocalStore: Send + Sync {
    async fn save(&self, key: &str, value: String) -> Result<(), PersistenceError>;

    /// Returns `Ok(None)` when nothing has been stored under `key`.
    async fn load(&self, key: &str) -> Result<Option<String>, PersistenceError>;
}

/// Stores each key as `<cache_dir>/<key>.json`.
pub struct FileStore {
    cache_dir: PathBuf,
}

impl FileStore {
    pub fn new(cache_dir: PathBuf) -> std::io::Result<Self> {
        std::fs::create_dir_all(&cache_dir)?;
        Ok(Self { cache_dir })
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn cache_path(&self, key: &str) -> Result<PathBuf, PersistenceError> {
        // Keys become file names; keep them from escaping the cache dir
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(PersistenceError::InvalidKey(key.to_string()));
        }
        Ok(self.cache_dir.join(format!("{}.json", key)))
    }
}

#[async_trait]
impl LocalStore for FileStore {
    async fn save(&self, key: &str, value: String) -> Result<(), PersistenceError> {
        let path = self.cache_path(key)?;
        let tmp = path.with_extension("json.tmp");
        let io_err = |source| PersistenceError::Io {
            key: key.to_string(),
            source,
        };

        // Write then rename so a crash never leaves a half-written cache file
        tokio::fs::write(&tmp, value.as_bytes()).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, &path).await.map_err(io_err)?;
        debug!(key, bytes = value.len(), "Cache entry written");
        Ok(())
    }

    async fn load(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        let path = self.cache_path(key)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(PersistenceError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }
}

/// In-process store for loopback mode and tests.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        // A poisoned map is still a valid map
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl LocalStore for MemoryStore {
    async fn save(&self, key: &str, value: String) -> Result<(), PersistenceError> {
        self.lock().insert(key.to_string(), value);
        Ok(())
    }

    async fn load(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        Ok(self.lock().get(key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_store_save_then_load() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileStore::new(dir.path().join("cache")).expect("create store");

        store.save("messages_list", "[1,2]".to_string()).await.expect("save");
        let loaded = store.load("messages_list").await.expect("load");
        assert_eq!(loaded.as_deref(), Some("[1,2]"));

        // Overwrite replaces the previous value
        store.save("messages_list", "[]".to_string()).await.expect("save");
        let loaded = store.load("messages_list").await.expect("load");
        assert_eq!(loaded.as_deref(), Some("[]"));
    }

    #[tokio::test]
    async fn test_file_store_missing_key_is_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileStore::new(dir.path().to_path_buf()).expect("create store");
        assert!(store.load("nothing_here").await.expect("load").is_none());
    }

    #[tokio::test]
    async fn test_file_store_rejects_path_keys() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileStore::new(dir.path().to_path_buf()).expect("create store");
        let result = store.save("../escape", String::new()).await;
        assert!(matches!(result, Err(PersistenceError::InvalidKey(_))));
    }

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert!(store.load("k").await.expect("load").is_none());
        store.save("k", "v".to_string()).await.expect("save");
        assert_eq!(store.load("k").await.expect("load").as_deref(), Some("v"));
    }
}
