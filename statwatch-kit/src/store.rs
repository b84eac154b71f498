//! Persistent key-value store for per-module settings.
//!
//! Keys follow fixed patterns so settings survive restarts:
//!
//! | Key | Meaning |
//! |-----|---------|
//! | `<Module>_state` | module enabled |
//! | `<Module>_widget` | comma-separated active widget kinds |
//! | `<Module>_notifications_<id>` | notification level |
//! | `<Title>_updateInterval` | reader interval in seconds |
//! | `<Module>@<Reader>` | last value of a persisting reader (JSON) |
//! | `pause` | global pause flag |
//!
//! Writes are last-write-wins. Nothing is transactional.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::StoreError;

/// Key holding the global pause flag.
pub const PAUSE_KEY: &str = "pause";

/// A single stored value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoreValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl From<bool> for StoreValue {
    fn from(value: bool) -> Self {
        StoreValue::Bool(value)
    }
}

impl From<i64> for StoreValue {
    fn from(value: i64) -> Self {
        StoreValue::Int(value)
    }
}

impl From<f64> for StoreValue {
    fn from(value: f64) -> Self {
        StoreValue::Float(value)
    }
}

impl From<String> for StoreValue {
    fn from(value: String) -> Self {
        StoreValue::String(value)
    }
}

impl From<&str> for StoreValue {
    fn from(value: &str) -> Self {
        StoreValue::String(value.to_string())
    }
}

/// Process-wide key-value settings.
///
/// Implementations must be safe to call from any thread. The typed getters
/// fall back to the default when the key is missing or holds another type.
pub trait ConfigStore: Send + Sync + fmt::Debug {
    fn get(&self, key: &str) -> Option<StoreValue>;

    fn set(&self, key: &str, value: StoreValue);

    fn remove(&self, key: &str);

    fn exist(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    fn bool(&self, key: &str, default: bool) -> bool {
        match self.get(key) {
            Some(StoreValue::Bool(value)) => value,
            _ => default,
        }
    }

    fn int(&self, key: &str, default: i64) -> i64 {
        match self.get(key) {
            Some(StoreValue::Int(value)) => value,
            _ => default,
        }
    }

    fn string(&self, key: &str, default: &str) -> String {
        match self.get(key) {
            Some(StoreValue::String(value)) => value,
            _ => default.to_string(),
        }
    }

    fn set_bool(&self, key: &str, value: bool) {
        self.set(key, StoreValue::Bool(value));
    }

    fn set_int(&self, key: &str, value: i64) {
        self.set(key, StoreValue::Int(value));
    }

    fn set_string(&self, key: &str, value: &str) {
        self.set(key, StoreValue::from(value));
    }
}

/// In-memory store. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RwLock<BTreeMap<String, StoreValue>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }
}

impl ConfigStore for MemoryStore {
    fn get(&self, key: &str) -> Option<StoreValue> {
        self.values.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: StoreValue) {
        self.values.write().insert(key.to_string(), value);
    }

    fn remove(&self, key: &str) {
        self.values.write().remove(key);
    }
}

/// JSON-file backed store.
///
/// The whole document is kept in memory and rewritten on every change. A
/// failed write is logged and the in-memory value is kept.
///
/// # Example
///
/// ```rust,no_run
/// use statwatch_kit::{ConfigStore, FileStore};
///
/// let store = FileStore::open("/tmp/statwatch.json").unwrap();
/// store.set_bool("CPU_state", true);
/// assert!(store.bool("CPU_state", false));
/// ```
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    values: RwLock<BTreeMap<String, StoreValue>>,
    /// Serializes snapshot and write so the file never goes back in time.
    writer: Mutex<()>,
}

impl FileStore {
    /// Open the store at `path`, loading existing values.
    ///
    /// A missing or empty file yields an empty store. A malformed file is an error.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let values = match fs::read_to_string(&path) {
            Ok(contents) if contents.trim().is_empty() => BTreeMap::new(),
            Ok(contents) => serde_json::from_str(&contents)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => return Err(err.into()),
        };
        debug!(path = %path.display(), keys = values.len(), "Opened settings store");

        Ok(Self {
            path,
            values: RwLock::new(values),
            writer: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the current document to disk.
    pub fn flush(&self) -> Result<(), StoreError> {
        let _writer = self.writer.lock();
        let json = {
            let values = self.values.read();
            serde_json::to_string_pretty(&*values)?
        };
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&self.path, json)?;
        Ok(())
    }

    fn write_through(&self) {
        if let Err(err) = self.flush() {
            warn!(path = %self.path.display(), error = %err, "Failed to persist settings");
        }
    }
}

impl ConfigStore for FileStore {
    fn get(&self, key: &str) -> Option<StoreValue> {
        self.values.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: StoreValue) {
        self.values.write().insert(key.to_string(), value);
        self.write_through();
    }

    fn remove(&self, key: &str) {
        let removed = self.values.write().remove(key).is_some();
        if removed {
            self.write_through();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_getters_fall_back_to_default() {
        let store = MemoryStore::new();
        assert!(store.bool("CPU_state", true));
        assert_eq!(store.int("count", 7), 7);
        assert_eq!(store.string("CPU_widget", "mini"), "mini");

        store.set_string("CPU_state", "yes");
        assert!(!store.bool("CPU_state", false));
    }

    #[test]
    fn set_get_remove() {
        let store = MemoryStore::new();
        store.set_bool("RAM_state", false);
        assert!(store.exist("RAM_state"));
        assert!(!store.bool("RAM_state", true));

        store.remove("RAM_state");
        assert!(!store.exist("RAM_state"));
        assert!(store.is_empty());
    }

    #[test]
    fn untagged_values_keep_their_type() {
        let json = r#"{"a":true,"b":3,"c":1.5,"d":"x"}"#;
        let values: BTreeMap<String, StoreValue> = serde_json::from_str(json).unwrap();
        assert_eq!(values["a"], StoreValue::Bool(true));
        assert_eq!(values["b"], StoreValue::Int(3));
        assert_eq!(values["c"], StoreValue::Float(1.5));
        assert_eq!(values["d"], StoreValue::String("x".to_string()));
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        {
            let store = FileStore::open(&path).unwrap();
            store.set_bool("CPU_state", false);
            store.set_string("CPU_updateInterval", "2");
        }

        let store = FileStore::open(&path).unwrap();
        assert!(!store.bool("CPU_state", true));
        assert_eq!(store.string("CPU_updateInterval", "1"), "2");
    }

    #[test]
    fn concurrent_sets_all_reach_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let store = std::sync::Arc::new(FileStore::open(&path).unwrap());

        let writers: Vec<_> = (0..8)
            .map(|n| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for round in 0..20 {
                        store.set_int(&format!("module{n}_updateInterval"), round);
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        let reopened = FileStore::open(&path).unwrap();
        for n in 0..8 {
            assert_eq!(reopened.int(&format!("module{n}_updateInterval"), -1), 19);
        }
    }

    #[test]
    fn file_store_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().join("nested/none.json")).unwrap();
        assert!(!store.exist("pause"));

        store.set_bool(PAUSE_KEY, true);
        assert!(dir.path().join("nested/none.json").exists());
    }

    #[test]
    fn file_store_rejects_malformed_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{not json").unwrap();

        let err = FileStore::open(&path).unwrap_err();
        assert!(matches!(err, StoreError::Format(_)));
    }
}
