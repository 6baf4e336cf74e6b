//! Persistent key-value store
//!
//! A flat map of top-level keys to JSON values. Nested ("d") operations treat a
//! top-level key as a namespace object and address one field inside it, which is
//! how community- and member-scoped data is laid out:
//!
//! ```text
//! roles      -> { "<community>": { "<for_role>": <listener_role> } }
//! apps       -> [ "<application id>", ... ]
//! user_apps  -> { "<member>": { "<application id>": { "timestamp": <unix secs> } } }
//! ```
//!
//! Every read-modify-write goes through [`KeyValueStore::update`] or
//! [`KeyValueStore::dupdate`], which run under the store's lock so no torn write
//! is ever visible.

mod json;

pub use json::JsonFileStore;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{Error, Result};

/// Namespace holding role mappings per community
pub const ROLES_NAMESPACE: &str = "roles";

/// Key holding the recognized application set
pub const APPS_KEY: &str = "apps";

/// Namespace holding learned application ids per member
pub const USER_APPS_NAMESPACE: &str = "user_apps";

/// Mutation applied inside a critical section; returning `None` removes the value
pub type Mutation<'a> = &'a mut dyn FnMut(Option<Value>) -> Option<Value>;

/// Storage backend
///
/// Failures are I/O catastrophes and surface as fatal errors.
pub trait KeyValueStore: Send + Sync {
    /// Check whether a top-level key exists
    fn exists(&self, key: &str) -> Result<bool>;

    /// Read a top-level value
    fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Replace a top-level value
    fn set(&self, key: &str, value: Value) -> Result<()>;

    /// Atomically read, mutate and write back a top-level value
    fn update(&self, key: &str, mutation: Mutation<'_>) -> Result<()>;

    /// Check whether `key` exists inside the `namespace` object
    fn dexists(&self, namespace: &str, key: &str) -> Result<bool>;

    /// Read `key` inside the `namespace` object
    fn dget(&self, namespace: &str, key: &str) -> Result<Option<Value>>;

    /// Write `key` inside the `namespace` object, creating the namespace if needed
    fn dset(&self, namespace: &str, key: &str, value: Value) -> Result<()>;

    /// Remove `key` from the `namespace` object; returns whether it existed
    fn dremove(&self, namespace: &str, key: &str) -> Result<bool>;

    /// Atomically read, mutate and write back `key` inside `namespace`
    fn dupdate(&self, namespace: &str, key: &str, mutation: Mutation<'_>) -> Result<()>;
}

// ─────────────────────────────────────────────────────────────────
// Typed Access
// ─────────────────────────────────────────────────────────────────

impl dyn KeyValueStore {
    /// Read and decode a top-level value
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.get(key)?.map(|v| decode(key, v)).transpose()
    }

    /// Encode and write a top-level value
    pub fn set_as<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        self.set(key, encode(key, value)?)
    }

    /// Read and decode a nested value
    pub fn dget_as<T: DeserializeOwned>(&self, namespace: &str, key: &str) -> Result<Option<T>> {
        self.dget(namespace, key)?
            .map(|v| decode(&format!("{}/{}", namespace, key), v))
            .transpose()
    }

    /// Encode and write a nested value
    pub fn dset_as<T: Serialize>(&self, namespace: &str, key: &str, value: &T) -> Result<()> {
        self.dset(namespace, key, encode(&format!("{}/{}", namespace, key), value)?)
    }

    /// Typed read-modify-write of a top-level value
    pub fn update_as<T, F>(&self, key: &str, f: F) -> Result<()>
    where
        T: Serialize + DeserializeOwned,
        F: FnMut(Option<T>) -> Option<T>,
    {
        let mut failure: Option<Error> = None;
        let mut mutation = typed_mutation(key.to_string(), f, &mut failure);
        self.update(key, &mut mutation)?;
        drop(mutation);
        failure.map_or(Ok(()), Err)
    }

    /// Typed read-modify-write of a nested value
    ///
    /// The closure sees the decoded value (or `None`) and returns the value to store,
    /// or `None` to remove the key. Decoding errors abort without changing the value.
    pub fn dupdate_as<T, F>(&self, namespace: &str, key: &str, f: F) -> Result<()>
    where
        T: Serialize + DeserializeOwned,
        F: FnMut(Option<T>) -> Option<T>,
    {
        let mut failure: Option<Error> = None;
        let mut mutation = typed_mutation(format!("{}/{}", namespace, key), f, &mut failure);
        self.dupdate(namespace, key, &mut mutation)?;
        drop(mutation);
        failure.map_or(Ok(()), Err)
    }
}

/// Wrap a typed closure into a raw [`Mutation`], parking any codec error in `failure`
fn typed_mutation<'a, T, F>(
    path: String,
    mut f: F,
    failure: &'a mut Option<Error>,
) -> impl FnMut(Option<Value>) -> Option<Value> + 'a
where
    T: Serialize + DeserializeOwned + 'a,
    F: FnMut(Option<T>) -> Option<T> + 'a,
{
    move |current| {
        let decoded = match current.clone().map(|v| decode::<T>(&path, v)).transpose() {
            Ok(decoded) => decoded,
            Err(e) => {
                *failure = Some(e);
                return current;
            }
        };
        match f(decoded).map(|next| encode(&path, &next)).transpose() {
            Ok(next) => next,
            Err(e) => {
                *failure = Some(e);
                current
            }
        }
    }
}

fn decode<T: DeserializeOwned>(key: &str, value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| Error::store_corrupt(key, e))
}

fn encode<T: Serialize>(key: &str, value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| Error::store_corrupt(key, e))
}
