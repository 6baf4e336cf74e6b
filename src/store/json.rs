//! Single-document JSON file store
//!
//! The whole database lives in memory and is rewritten to disk after every
//! mutation (temp file + rename), so a crash never leaves a half-written file.

use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::error::{Error, Result};

use super::{KeyValueStore, Mutation};

/// JSON-file backed [`KeyValueStore`]
pub struct JsonFileStore {
    /// Backing file; `None` keeps everything in memory
    path: Option<PathBuf>,
    data: Mutex<Map<String, Value>>,
}

impl JsonFileStore {
    /// Open (or create on first write) the store at `path`
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let data = if path.exists() {
            let content = fs::read_to_string(&path).map_err(|e| Error::StoreRead {
                path: path.clone(),
                source: e,
            })?;
            if content.trim().is_empty() {
                Map::new()
            } else {
                match serde_json::from_str::<Value>(&content) {
                    Ok(Value::Object(map)) => map,
                    Ok(_) => {
                        return Err(Error::store_corrupt(
                            path.display().to_string(),
                            "top-level value is not an object",
                        ))
                    }
                    Err(e) => return Err(Error::store_corrupt(path.display().to_string(), e)),
                }
            }
        } else {
            Map::new()
        };

        info!(path = %path.display(), keys = data.len(), "Store opened");

        Ok(Self {
            path: Some(path),
            data: Mutex::new(data),
        })
    }

    /// Create a store that never touches disk
    pub fn in_memory() -> Self {
        Self {
            path: None,
            data: Mutex::new(Map::new()),
        }
    }

    /// Path of the backing file, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Write the current document to disk. Caller holds the lock.
    fn persist(&self, data: &Map<String, Value>) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| Error::StoreWrite {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
            }
        }

        let body = serde_json::to_vec_pretty(data)
            .map_err(|e| Error::store_corrupt(path.display().to_string(), e))?;
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, body).map_err(|e| Error::StoreWrite {
            path: tmp.clone(),
            source: e,
        })?;
        fs::rename(&tmp, path).map_err(|e| Error::StoreWrite {
            path: path.clone(),
            source: e,
        })?;

        debug!(path = %path.display(), "Store persisted");
        Ok(())
    }
}

/// Namespace object for `namespace`, or an error if something else lives there
fn namespace_object<'a>(
    data: &'a Map<String, Value>,
    namespace: &str,
) -> Result<Option<&'a Map<String, Value>>> {
    match data.get(namespace) {
        None => Ok(None),
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(_) => Err(Error::store_corrupt(namespace, "namespace is not an object")),
    }
}

fn namespace_object_mut<'a>(
    data: &'a mut Map<String, Value>,
    namespace: &str,
) -> Result<&'a mut Map<String, Value>> {
    match data
        .entry(namespace.to_string())
        .or_insert_with(|| Value::Object(Map::new()))
    {
        Value::Object(map) => Ok(map),
        _ => Err(Error::store_corrupt(namespace, "namespace is not an object")),
    }
}

impl KeyValueStore for JsonFileStore {
    fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.data.lock().contains_key(key))
    }

    fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.data.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut data = self.data.lock();
        data.insert(key.to_string(), value);
        self.persist(&data)
    }

    fn update(&self, key: &str, mutation: Mutation<'_>) -> Result<()> {
        let mut data = self.data.lock();
        let current = data.get(key).cloned();
        match mutation(current) {
            Some(next) => {
                data.insert(key.to_string(), next);
            }
            None => {
                data.remove(key);
            }
        }
        self.persist(&data)
    }

    fn dexists(&self, namespace: &str, key: &str) -> Result<bool> {
        let data = self.data.lock();
        Ok(namespace_object(&data, namespace)?.is_some_and(|ns| ns.contains_key(key)))
    }

    fn dget(&self, namespace: &str, key: &str) -> Result<Option<Value>> {
        let data = self.data.lock();
        Ok(namespace_object(&data, namespace)?.and_then(|ns| ns.get(key).cloned()))
    }

    fn dset(&self, namespace: &str, key: &str, value: Value) -> Result<()> {
        let mut data = self.data.lock();
        namespace_object_mut(&mut data, namespace)?.insert(key.to_string(), value);
        self.persist(&data)
    }

    fn dremove(&self, namespace: &str, key: &str) -> Result<bool> {
        let mut data = self.data.lock();
        if namespace_object(&data, namespace)?.is_none() {
            return Ok(false);
        }
        let removed = namespace_object_mut(&mut data, namespace)?.remove(key).is_some();
        if removed {
            self.persist(&data)?;
        }
        Ok(removed)
    }

    fn dupdate(&self, namespace: &str, key: &str, mutation: Mutation<'_>) -> Result<()> {
        let mut data = self.data.lock();
        let ns = namespace_object_mut(&mut data, namespace)?;
        let current = ns.get(key).cloned();
        match mutation(current) {
            Some(next) => {
                ns.insert(key.to_string(), next);
            }
            None => {
                ns.remove(key);
            }
        }
        self.persist(&data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_in_memory_nested_ops() {
        let store = JsonFileStore::in_memory();
        assert!(!store.dexists("roles", "1").unwrap());

        store.dset("roles", "1", json!({"2": 3})).unwrap();
        assert!(store.exists("roles").unwrap());
        assert!(store.dexists("roles", "1").unwrap());
        assert_eq!(store.dget("roles", "1").unwrap(), Some(json!({"2": 3})));

        assert!(store.dremove("roles", "1").unwrap());
        assert!(!store.dremove("roles", "1").unwrap());
        assert_eq!(store.dget("roles", "1").unwrap(), None);
    }

    #[test]
    fn test_persists_and_reloads() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db").join("store.json");

        {
            let store = JsonFileStore::open(&path).unwrap();
            store.set("apps", json!(["1", "2"])).unwrap();
            store.dset("user_apps", "7", json!({"9": {"timestamp": 100}})).unwrap();
        }

        assert!(path.exists());
        assert!(!path.with_extension("tmp").exists());

        let store = JsonFileStore::open(&path).unwrap();
        assert_eq!(store.get("apps").unwrap(), Some(json!(["1", "2"])));
        assert_eq!(
            store.dget("user_apps", "7").unwrap(),
            Some(json!({"9": {"timestamp": 100}}))
        );
    }

    #[test]
    fn test_open_rejects_non_object_document() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");
        fs::write(&path, "[1, 2, 3]").unwrap();

        assert!(matches!(
            JsonFileStore::open(&path),
            Err(Error::StoreCorrupt { .. })
        ));
    }

    #[test]
    fn test_nested_op_on_scalar_namespace_fails() {
        let store = JsonFileStore::in_memory();
        store.set("roles", json!(1)).unwrap();
        assert!(store.dget("roles", "1").is_err());
        assert!(store.dset("roles", "1", json!({})).is_err());
    }

    #[test]
    fn test_update_is_read_modify_write() {
        let store = JsonFileStore::in_memory();
        for _ in 0..3 {
            store
                .update("counter", &mut |v| {
                    let n = v.and_then(|v| v.as_u64()).unwrap_or(0);
                    Some(json!(n + 1))
                })
                .unwrap();
        }
        assert_eq!(store.get("counter").unwrap(), Some(json!(3)));

        store.update("counter", &mut |_| None).unwrap();
        assert!(!store.exists("counter").unwrap());
    }
}
