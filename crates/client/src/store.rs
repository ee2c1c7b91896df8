//! Small JSON persistence for client state.
//!
//! One file per key under a state directory, written atomically via a
//! temporary file and rename. Without a directory the store is in-memory
//! only, which is what tests and ephemeral sessions use.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Errors from reading or writing persisted state.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Corrupt value for key {key}: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid key: {0}")]
    InvalidKey(String),
}

/// Key-value JSON store.
#[derive(Clone, Debug)]
pub struct LocalStore {
    backend: Backend,
}

#[derive(Clone, Debug)]
enum Backend {
    Dir(PathBuf),
    Memory(Arc<Mutex<HashMap<String, String>>>),
}

impl LocalStore {
    /// A store persisting under `dir` (created on first write).
    #[must_use]
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            backend: Backend::Dir(dir.into()),
        }
    }

    /// A store that keeps values in memory only.
    #[must_use]
    pub fn memory() -> Self {
        Self {
            backend: Backend::Memory(Arc::default()),
        }
    }

    /// Read and decode a value.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or does not decode as `T`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        validate_key(key)?;
        let raw = match &self.backend {
            Backend::Dir(dir) => {
                let path = key_path(dir, key);
                match fs::read_to_string(&path) {
                    Ok(raw) => Some(raw),
                    Err(e) if e.kind() == io::ErrorKind::NotFound => None,
                    Err(source) => return Err(StoreError::Io { path, source }),
                }
            }
            Backend::Memory(map) => map
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(key)
                .cloned(),
        };

        raw.map(|raw| {
            serde_json::from_str(&raw).map_err(|source| StoreError::Corrupt {
                key: key.to_string(),
                source,
            })
        })
        .transpose()
    }

    /// Encode and write a value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be encoded or the file written.
    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        validate_key(key)?;
        let raw = serde_json::to_string_pretty(value).map_err(|source| StoreError::Corrupt {
            key: key.to_string(),
            source,
        })?;

        match &self.backend {
            Backend::Dir(dir) => {
                fs::create_dir_all(dir).map_err(|source| StoreError::Io {
                    path: dir.clone(),
                    source,
                })?;
                let path = key_path(dir, key);
                let tmp = path.with_extension("json.tmp");
                fs::write(&tmp, raw).map_err(|source| StoreError::Io {
                    path: tmp.clone(),
                    source,
                })?;
                fs::rename(&tmp, &path).map_err(|source| StoreError::Io { path, source })
            }
            Backend::Memory(map) => {
                map.lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(key.to_string(), raw);
                Ok(())
            }
        }
    }

    /// Delete a value. Missing keys are not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be removed.
    pub fn remove(&self, key: &str) -> Result<(), StoreError> {
        validate_key(key)?;
        match &self.backend {
            Backend::Dir(dir) => {
                let path = key_path(dir, key);
                match fs::remove_file(&path) {
                    Err(e) if e.kind() != io::ErrorKind::NotFound => {
                        Err(StoreError::Io { path, source: e })
                    }
                    _ => Ok(()),
                }
            }
            Backend::Memory(map) => {
                map.lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(key);
                Ok(())
            }
        }
    }
}

fn key_path(dir: &Path, key: &str) -> PathBuf {
    dir.join(format!("{key}.json"))
}

fn validate_key(key: &str) -> Result<(), StoreError> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidKey(key.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_dir_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        LocalStore::in_dir(dir.path())
            .set("location_id", &"WH-1")
            .unwrap();

        let reopened = LocalStore::in_dir(dir.path());
        assert_eq!(
            reopened.get::<String>("location_id").unwrap().as_deref(),
            Some("WH-1")
        );

        reopened.remove("location_id").unwrap();
        assert!(reopened.get::<String>("location_id").unwrap().is_none());
        // Removing twice is fine
        reopened.remove("location_id").unwrap();
    }

    #[test]
    fn test_memory_store_is_shared_between_clones() {
        let store = LocalStore::memory();
        let clone = store.clone();
        store.set("guest_cart", &vec![1, 2, 3]).unwrap();
        assert_eq!(clone.get::<Vec<u8>>("guest_cart").unwrap(), Some(vec![1, 2, 3]));
    }

    #[test]
    fn test_corrupt_value_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("guest_cart.json"), "{not json").unwrap();
        let store = LocalStore::in_dir(dir.path());
        assert!(matches!(
            store.get::<Vec<u8>>("guest_cart"),
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_rejects_path_like_keys() {
        let store = LocalStore::memory();
        assert!(matches!(
            store.set("../escape", &1),
            Err(StoreError::InvalidKey(_))
        ));
    }
}
