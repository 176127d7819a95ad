//! Destination-agnostic object storage.
//!
//! Results and catalogue objects are addressed by `/`-separated string keys.
//! Callers never branch on where the bytes live; a cloud-backed
//! implementation plugs in behind the same trait.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::StoreError;

/// Byte storage addressed by string keys.
pub trait ObjectStore: Send + Sync {
    /// Fetch an object's bytes.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ObjectNotFound`] when the key does not exist.
    fn get(&self, key: &str) -> Result<Vec<u8>, StoreError>;

    /// Store an object, replacing any existing one at the same key.
    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError>;

    /// Whether an object exists at the key.
    fn exists(&self, key: &str) -> Result<bool, StoreError>;

    /// All keys starting with `prefix`, in sorted order.
    fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// Remove an object. Removing a missing key is not an error.
    fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// Filesystem-backed store: keys map to paths under a root directory.
#[derive(Debug)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    /// Create a store rooted at `root`. The directory is created on first
    /// write, not here.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    fn io_err(key: &str, e: std::io::Error) -> StoreError {
        StoreError::Io {
            key: key.to_string(),
            reason: e.to_string(),
        }
    }

    fn collect_keys(
        &self,
        dir: &Path,
        prefix: &str,
        out: &mut Vec<String>,
    ) -> Result<(), StoreError> {
        let entries = std::fs::read_dir(dir).map_err(|e| Self::io_err(prefix, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| Self::io_err(prefix, e))?;
            let path = entry.path();
            if path.is_dir() {
                self.collect_keys(&path, prefix, out)?;
            } else if let Ok(rel) = path.strip_prefix(&self.root) {
                let key = rel.to_string_lossy().replace('\\', "/");
                if key.starts_with(prefix) {
                    out.push(key);
                }
            }
        }
        Ok(())
    }
}

impl ObjectStore for LocalStore {
    fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Err(StoreError::ObjectNotFound {
                key: key.to_string(),
            });
        }
        std::fs::read(&path).map_err(|e| Self::io_err(key, e))
    }

    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Self::io_err(key, e))?;
        }
        std::fs::write(&path, bytes).map_err(|e| Self::io_err(key, e))
    }

    fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.path_for(key).exists())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut keys = Vec::new();
        let root = self.root.clone();
        self.collect_keys(&root, prefix, &mut keys)?;
        keys.sort();
        Ok(keys)
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        let path = self.path_for(key);
        if path.exists() {
            std::fs::remove_file(&path).map_err(|e| Self::io_err(key, e))?;
        }
        Ok(())
    }
}

/// In-memory store for tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ObjectStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.objects
            .lock()
            .map_err(|_| StoreError::Io {
                key: key.to_string(),
                reason: "poisoned lock".to_string(),
            })?
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::ObjectNotFound {
                key: key.to_string(),
            })
    }

    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        self.objects
            .lock()
            .map_err(|_| StoreError::Io {
                key: key.to_string(),
                reason: "poisoned lock".to_string(),
            })?
            .insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self
            .objects
            .lock()
            .map_err(|_| StoreError::Io {
                key: key.to_string(),
                reason: "poisoned lock".to_string(),
            })?
            .contains_key(key))
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .objects
            .lock()
            .map_err(|_| StoreError::Io {
                key: prefix.to_string(),
                reason: "poisoned lock".to_string(),
            })?
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.objects
            .lock()
            .map_err(|_| StoreError::Io {
                key: key.to_string(),
                reason: "poisoned lock".to_string(),
            })?
            .remove(key);
        Ok(())
    }
}
