//! Key-value persistence backed by one JSON file per key.
//!
//! Components receive a store through the repositories in [`repositories`]
//! instead of reaching for a global.

pub mod repositories;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub use repositories::{
    ColorMode, StoredTable, TableMeta, TableRepository, ThemeRepository, UploadHistoryRepository,
    UploadRecord,
};

/// Raw JSON storage keyed by short names such as `theme-config`.
pub trait KeyValueStore: Send + Sync {
    /// Returns `Ok(None)` when the key has never been written.
    fn get_raw(&self, key: &str) -> Result<Option<Value>>;
    fn set_raw(&self, key: &str, value: &Value) -> Result<()>;
    /// Returns `true` if something was removed.
    fn remove(&self, key: &str) -> Result<bool>;
}

/// Envelope written around every repository value.
#[derive(Debug, Serialize, Deserialize)]
struct Versioned<T> {
    version: u32,
    data: T,
}

impl dyn KeyValueStore {
    /// Reads `key`, falling back to `default` when it is missing or unreadable.
    ///
    /// Accepts both versioned envelopes and plain legacy values.
    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        match self.get_raw(key) {
            Ok(Some(value)) => match decode(value) {
                Ok(decoded) => decoded,
                Err(e) => {
                    tracing::warn!("Stored value for {:?} is unreadable: {}. Using default.", key, e);
                    default
                }
            },
            Ok(None) => default,
            Err(e) => {
                tracing::warn!("Failed to read {:?}: {}. Using default.", key, e);
                default
            }
        }
    }

    /// Writes `value` under `key` in a versioned envelope.
    pub fn put<T: Serialize>(&self, key: &str, version: u32, value: &T) -> Result<()> {
        let envelope = serde_json::to_value(Versioned {
            version,
            data: value,
        })?;
        self.set_raw(key, &envelope)
    }
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, serde_json::Error> {
    let is_envelope = value
        .as_object()
        .map(|obj| obj.len() == 2 && obj.contains_key("version") && obj.contains_key("data"))
        .unwrap_or(false);

    if is_envelope {
        let envelope: Versioned<T> = serde_json::from_value(value)?;
        Ok(envelope.data)
    } else {
        serde_json::from_value(value)
    }
}

fn validate_key(key: &str) -> Result<()> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(anyhow::anyhow!("Invalid storage key: {:?}", key))
    }
}

/// Stores each key as `<dir>/<key>.json`.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn directory(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    fn ensure_dir(&self) -> Result<()> {
        if !self.dir.exists() {
            fs::create_dir_all(&self.dir)
                .with_context(|| format!("Failed to create data directory {:?}", self.dir))?;
            tracing::info!("Created data directory: {:?}", self.dir);
        }
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn get_raw(&self, key: &str) -> Result<Option<Value>> {
        validate_key(key)?;
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let content =
            fs::read_to_string(&path).with_context(|| format!("Failed to read {:?}", path))?;
        let value =
            serde_json::from_str(&content).with_context(|| format!("Failed to parse {:?}", path))?;
        Ok(Some(value))
    }

    fn set_raw(&self, key: &str, value: &Value) -> Result<()> {
        validate_key(key)?;
        self.ensure_dir()?;

        let path = self.path_for(key);
        let json = serde_json::to_string_pretty(value)?;

        // Write next to the target, then rename over it.
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(json.as_bytes())?;
        tmp.persist(&path)
            .with_context(|| format!("Failed to persist {:?}", path))?;
        tracing::debug!("Stored {:?}", path);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool> {
        validate_key(key)?;
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path).with_context(|| format!("Failed to remove {:?}", path))?;
        Ok(true)
    }
}

/// In-process store, used by tests and by hosts that do not persist.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get_raw(&self, key: &str) -> Result<Option<Value>> {
        validate_key(key)?;
        let values = self
            .values
            .lock()
            .expect("Mutex was poisoned. This should not happen.");
        Ok(values.get(key).cloned())
    }

    fn set_raw(&self, key: &str, value: &Value) -> Result<()> {
        validate_key(key)?;
        self.values
            .lock()
            .expect("Mutex was poisoned. This should not happen.")
            .insert(key.to_string(), value.clone());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool> {
        validate_key(key)?;
        Ok(self
            .values
            .lock()
            .expect("Mutex was poisoned. This should not happen.")
            .remove(key)
            .is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempdir().unwrap();
        let store: Arc<dyn KeyValueStore> = Arc::new(JsonFileStore::new(dir.path().join("data")));

        store.put("greeting", 1, &vec!["你好".to_string()]).unwrap();
        let back: Vec<String> = store.get_or("greeting", Vec::new());
        assert_eq!(back, vec!["你好".to_string()]);

        let on_disk = fs::read_to_string(dir.path().join("data/greeting.json")).unwrap();
        let raw: Value = serde_json::from_str(&on_disk).unwrap();
        assert_eq!(raw, json!({"version": 1, "data": ["你好"]}));
    }

    #[test]
    fn test_missing_key_returns_default() {
        let dir = tempdir().unwrap();
        let store: Arc<dyn KeyValueStore> = Arc::new(JsonFileStore::new(dir.path()));
        assert_eq!(store.get_or("absent", 7u32), 7);
    }

    #[test]
    fn test_corrupt_file_returns_default() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("broken.json"), "{ not json").unwrap();
        let store: Arc<dyn KeyValueStore> = Arc::new(JsonFileStore::new(dir.path()));
        assert_eq!(store.get_or("broken", "fallback".to_string()), "fallback");
    }

    #[test]
    fn test_legacy_unversioned_value_is_readable() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("theme-config.json"), r#"{"colorMode":"dark"}"#).unwrap();
        let store: Arc<dyn KeyValueStore> = Arc::new(JsonFileStore::new(dir.path()));
        let raw: Value = store.get_or("theme-config", Value::Null);
        assert_eq!(raw, json!({"colorMode": "dark"}));
    }

    #[test]
    fn test_remove_and_invalid_keys() {
        let store = MemoryStore::new();
        store.set_raw("k", &json!(1)).unwrap();
        assert!(store.remove("k").unwrap());
        assert!(!store.remove("k").unwrap());
        assert!(store.set_raw("../escape", &json!(1)).is_err());
        assert!(store.get_raw("").is_err());
    }
}
