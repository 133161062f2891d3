use dashmap::DashMap;
use serde_json::{Map, Value};
use smol_str::SmolStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::StorageError;

/// Synchronous, origin-scoped string key/value storage.
///
/// This is the shape of browser `localStorage`: every value is a string, reads
/// of a missing key are not errors, and removing a missing key is a no-op.
/// Implementations are shared between the session manager and any number of
/// request wrappers, so all methods take `&self`.
pub trait Storage: Send + Sync {
    /// Read the value stored under `key`.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    /// Store `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    /// Remove `key` if present.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
    /// Drop every key, including ones the backing store can no longer parse.
    fn clear(&self) -> Result<(), StorageError>;
}

impl<T: Storage + ?Sized> Storage for Arc<T> {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.as_ref().get(key)
    }
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.as_ref().set(key, value)
    }
    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.as_ref().remove(key)
    }
    fn clear(&self) -> Result<(), StorageError> {
        self.as_ref().clear()
    }
}

/// In-memory storage suitable for short-lived sessions and tests.
///
/// Clones share the same underlying map.
#[derive(Clone, Debug, Default)]
pub struct MemoryStorage(Arc<DashMap<SmolStr, String>>);

impl MemoryStorage {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently held.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the store holds no keys.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.0.get(key).map(|v| v.value().clone()))
    }
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.0.insert(SmolStr::new(key), value.to_owned());
        Ok(())
    }
    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.0.remove(key);
        Ok(())
    }
    fn clear(&self) -> Result<(), StorageError> {
        self.0.clear();
        Ok(())
    }
}

/// File-backed storage keeping every key in one flat JSON object.
///
/// NOT secure: tokens are written in plain text, exactly as a browser keeps
/// them in `localStorage`. The file is created on first write.
///
/// ```ignore
/// use latchkey_common::{FileStorage, Storage};
/// let store = FileStorage::new("/tmp/latchkey/session.json");
/// store.set("returnTo", "/dashboard")?;
/// ```
#[derive(Clone, Debug)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    /// Create a file store at the given path. Nothing is touched on disk yet.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> Result<Map<String, Value>, StorageError> {
        let file = match std::fs::read_to_string(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(e.into()),
        };
        if file.trim().is_empty() {
            return Ok(Map::new());
        }
        match serde_json::from_str(&file)? {
            Value::Object(map) => Ok(map),
            _ => Err(StorageError::Other("invalid store".into())),
        }
    }

    fn write_map(&self, map: &Map<String, Value>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let buf = serde_json::to_vec_pretty(map)?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, &buf)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let map = self.read_map()?;
        match map.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(other) => Ok(Some(other.to_string())),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut map = self.read_map()?;
        map.insert(key.to_owned(), Value::String(value.to_owned()));
        self.write_map(&map)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut map = self.read_map()?;
        if map.remove(key).is_some() {
            self.write_map(&map)?;
        }
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        match std::fs::remove_file(&self.path) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}
