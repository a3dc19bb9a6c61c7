//! Durable client-side key/value storage.
//!
//! The hub persists a handful of small string values (selected wallet,
//! remembered popup-wallet key, onboarding profile). `JsonFileStore` keeps
//! them in a single JSON object on disk; `MemoryStore` is the ephemeral
//! variant used by tests and throwaway runs.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::StorageError;

/// Key holding the id of the last connected wallet.
pub const WALLET_TYPE_KEY: &str = "stellar_wallet_type";
/// Key holding the popup wallet's remembered public key.
pub const ALBEDO_PUBLIC_KEY: &str = "albedo_public_key";
/// Key holding the onboarding-derived user profile (JSON).
pub const USER_PROFILE_KEY: &str = "stellar_user_profile";
/// Key set to `"true"` once onboarding has been completed.
pub const ONBOARDING_COMPLETED_KEY: &str = "stellar_onboarding_completed";

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Removing an absent key is not an error.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(lock(&self.entries)?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        lock(&self.entries)?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        lock(&self.entries)?.remove(key);
        Ok(())
    }
}

/// File-backed store. Every write rewrites the whole file through a
/// temporary sibling and a rename so a crash never leaves a torn file.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl JsonFileStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let entries = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            if raw.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&raw)?
            }
        } else {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            BTreeMap::new()
        };

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(entries)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(lock(&self.entries)?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = lock(&self.entries)?;
        entries.insert(key.to_string(), value.to_string());
        self.flush(&entries)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = lock(&self.entries)?;
        if entries.remove(key).is_some() {
            self.flush(&entries)?;
        }
        Ok(())
    }
}

fn lock<T>(m: &Mutex<T>) -> Result<std::sync::MutexGuard<'_, T>, StorageError> {
    m.lock()
        .map_err(|_| StorageError::Io("storage lock poisoned".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_set_get_remove() {
        let store = MemoryStore::new();
        assert_eq!(store.get(WALLET_TYPE_KEY).unwrap(), None);
        store.set(WALLET_TYPE_KEY, "freighter").unwrap();
        assert_eq!(store.get(WALLET_TYPE_KEY).unwrap().as_deref(), Some("freighter"));
        store.remove(WALLET_TYPE_KEY).unwrap();
        store.remove(WALLET_TYPE_KEY).unwrap();
        assert_eq!(store.get(WALLET_TYPE_KEY).unwrap(), None);
    }

    #[test]
    fn test_json_file_store_survives_reopen() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("client-storage.json");

        {
            let store = JsonFileStore::open(&path).unwrap();
            store.set(WALLET_TYPE_KEY, "lobstr").unwrap();
            store.set(ALBEDO_PUBLIC_KEY, "GABC").unwrap();
            store.remove(ALBEDO_PUBLIC_KEY).unwrap();
        }

        let reopened = JsonFileStore::open(&path).unwrap();
        assert_eq!(reopened.get(WALLET_TYPE_KEY).unwrap().as_deref(), Some("lobstr"));
        assert_eq!(reopened.get(ALBEDO_PUBLIC_KEY).unwrap(), None);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_json_file_store_rejects_corrupt_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("client-storage.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            JsonFileStore::open(&path),
            Err(StorageError::Serialization(_))
        ));
    }
}
