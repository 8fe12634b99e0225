//! Local key/value store persisted as a single JSON file.
//!
//! Values are cached in memory and the whole map is rewritten on every
//! change, which is plenty for a handful of keys.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use team_sync::store::{self, LocalStore, StoreError};

pub struct JsonFileStore {
    path: PathBuf,
    values: RwLock<BTreeMap<String, String>>,
}

impl JsonFileStore {
    /// Open the store at `path`, starting empty if the file does not exist.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let values = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read store file: {:?}", path))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse store file: {:?}", path))?
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            path,
            values: RwLock::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every key currently stored.
    pub fn keys(&self) -> Vec<String> {
        self.values
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect()
    }

    fn save(&self, values: &BTreeMap<String, String>) -> store::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| StoreError::Io(e.to_string()))?;
        }
        let contents =
            serde_json::to_string_pretty(values).map_err(|e| StoreError::Io(e.to_string()))?;
        let temp = self.path.with_extension("json.tmp");
        fs::write(&temp, contents).map_err(|e| StoreError::Io(e.to_string()))?;
        fs::rename(&temp, &self.path).map_err(|e| StoreError::Io(e.to_string()))
    }

    fn update(&self, f: impl FnOnce(&mut BTreeMap<String, String>)) -> store::Result<()> {
        let mut values = self.values.write().unwrap_or_else(|e| e.into_inner());
        f(&mut values);
        self.save(&values)
    }
}

impl LocalStore for JsonFileStore {
    fn get(&self, key: &str) -> store::Result<Option<String>> {
        Ok(self
            .values
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned())
    }

    fn set(&self, key: &str, value: &str) -> store::Result<()> {
        self.update(|values| {
            values.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> store::Result<()> {
        self.update(|values| {
            values.remove(key);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_values_survive_reopen() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("device/store.json");

        let store = JsonFileStore::open(&path).unwrap();
        store.set("laxkeeper_roster", r#"["A"]"#).unwrap();
        store.set("laxkeeper_team_name", "Hawks").unwrap();
        store.remove("laxkeeper_team_name").unwrap();

        let reopened = JsonFileStore::open(&path).unwrap();
        assert_eq!(reopened.get("laxkeeper_roster").unwrap().as_deref(), Some(r#"["A"]"#));
        assert!(reopened.get("laxkeeper_team_name").unwrap().is_none());
        assert_eq!(reopened.keys(), ["laxkeeper_roster"]);
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("store.json");
        fs::write(&path, "not json").unwrap();

        assert!(JsonFileStore::open(&path).is_err());
    }
}
