//! LocalStore trait abstraction for the device-local key/value store.
//!
//! Implementations:
//! - `InMemoryStore` - For testing
//! - `SyncedStore` (in `interceptor`) - Wraps another store and mirrors tracked keys
//! - `JsonFileStore` (in team-sync-cli) - A JSON file on disk
//!
//! Local store calls are synchronous: they never suspend, which is what lets
//! a mirrored push be issued strictly after the local write completes.

use std::collections::HashMap;
use std::sync::RwLock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    Io(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// String-keyed, string-valued local storage.
///
/// Callers that are unaware of synchronization program against this trait,
/// which is what allows `SyncedStore` to sit underneath them.
pub trait LocalStore: Send + Sync {
    /// Read a value, `None` if the key is absent.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value, replacing any previous one.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a key. Removing an absent key is not an error.
    fn remove(&self, key: &str) -> Result<()>;
}

/// In-memory store for testing
#[derive(Default)]
pub struct InMemoryStore {
    values: RwLock<HashMap<String, String>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with the given entries.
    pub fn with_entries<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let values = entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self {
            values: RwLock::new(values),
        }
    }

    /// Number of keys currently held.
    pub fn len(&self) -> usize {
        self.values.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LocalStore for InMemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let values = self.values.read().unwrap_or_else(|e| e.into_inner());
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self.values.write().unwrap_or_else(|e| e.into_inner());
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut values = self.values.write().unwrap_or_else(|e| e.into_inner());
        values.remove(key);
        Ok(())
    }
}

// Implement LocalStore for Arc<T> where T: LocalStore
// This lets a test keep a handle on the raw store it gave to the engine
impl<T: LocalStore + ?Sized> LocalStore for std::sync::Arc<T> {
    fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        (**self).remove(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inmemory_store_basic_operations() {
        let store = InMemoryStore::new();

        store.set("laxkeeper_roster", "[]").unwrap();
        assert_eq!(store.get("laxkeeper_roster").unwrap().as_deref(), Some("[]"));

        store.set("laxkeeper_roster", "[1]").unwrap();
        assert_eq!(store.get("laxkeeper_roster").unwrap().as_deref(), Some("[1]"));

        store.remove("laxkeeper_roster").unwrap();
        assert!(store.get("laxkeeper_roster").unwrap().is_none());
    }

    #[test]
    fn test_remove_absent_key_is_ok() {
        let store = InMemoryStore::new();
        assert!(store.remove("missing").is_ok());
        assert!(store.is_empty());
    }

    #[test]
    fn test_arc_store_shares_state() {
        let store = std::sync::Arc::new(InMemoryStore::with_entries([("a", "1")]));
        let handle = std::sync::Arc::clone(&store);

        handle.set("b", "2").unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(LocalStore::get(&handle, "a").unwrap().as_deref(), Some("1"));
    }
}
