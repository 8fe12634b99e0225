//! Backup files: a portable snapshot of the tracked keys.
//!
//! Import writes through whatever store it is handed. Given the engine's
//! `SyncedStore`, imported values are mirrored to the active team like any
//! other local edit.

use crate::events::now_ms;
use crate::store::{self, LocalStore, StoreError};
use crate::tracked::{CURRENT_GAME_KEY, GAMES_KEY, ROSTER_KEY, TEAM_NAME_KEY, TrackedKey};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("Backup is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Contents of a backup file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Backup {
    #[serde(default)]
    pub roster: Option<Value>,
    #[serde(default)]
    pub games: Option<Value>,
    #[serde(default)]
    pub team_name: Option<String>,
    #[serde(default)]
    pub exported_at: u64,
}

impl Backup {
    pub fn from_json(raw: &str) -> Result<Self, BackupError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn to_json_pretty(&self) -> Result<String, BackupError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Suggested file name, dated by export time.
    pub fn file_name(&self) -> String {
        format!("laxkeeper-backup-{}.json", self.exported_at)
    }
}

/// Snapshot the tracked keys. Unreadable list values export as empty lists.
pub fn export(store: &dyn LocalStore) -> store::Result<Backup> {
    let list = |key: &str| -> store::Result<Option<Value>> {
        Ok(Some(match store.get(key)? {
            Some(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!("Exporting unreadable {} as empty: {}", key, e);
                Value::Array(Vec::new())
            }),
            None => Value::Array(Vec::new()),
        }))
    };

    Ok(Backup {
        roster: list(ROSTER_KEY)?,
        games: list(GAMES_KEY)?,
        team_name: store.get(TEAM_NAME_KEY)?,
        exported_at: now_ms(),
    })
}

/// Write a backup's values into `store`. Absent or empty fields are skipped.
///
/// Returns the number of keys written.
pub fn import(store: &dyn LocalStore, backup: &Backup) -> store::Result<usize> {
    let mut written = 0;
    for (key, value) in [(ROSTER_KEY, &backup.roster), (GAMES_KEY, &backup.games)] {
        if let Some(value) = value.as_ref().filter(|v| !v.is_null()) {
            store.set(key, &value.to_string())?;
            written += 1;
        }
    }
    if let Some(name) = backup.team_name.as_deref().filter(|n| !n.is_empty()) {
        store.set(TEAM_NAME_KEY, name)?;
        written += 1;
    }
    info!("Imported {} keys from backup", written);
    Ok(written)
}

/// Remove every tracked key and the in-progress game.
pub fn clear_tracked(store: &dyn LocalStore) -> store::Result<()> {
    for key in TrackedKey::ALL {
        store.remove(key.local_key())?;
    }
    store.remove(CURRENT_GAME_KEY)?;
    info!("Cleared local team data");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use serde_json::json;

    #[test]
    fn test_export_parses_lists() {
        let store = InMemoryStore::with_entries([
            (ROSTER_KEY, r#"[{"number":7}]"#),
            (GAMES_KEY, "not json"),
            (TEAM_NAME_KEY, "Hawks"),
        ]);

        let backup = export(&store).unwrap();

        assert_eq!(backup.roster, Some(json!([{"number": 7}])));
        assert_eq!(backup.games, Some(json!([])));
        assert_eq!(backup.team_name.as_deref(), Some("Hawks"));
        assert!(backup.exported_at > 0);
    }

    #[test]
    fn test_import_skips_missing_fields() {
        let store = InMemoryStore::with_entries([(GAMES_KEY, "[1]")]);
        let backup = Backup::from_json(r#"{"roster": ["A"], "teamName": ""}"#).unwrap();

        assert_eq!(import(&store, &backup).unwrap(), 1);
        assert_eq!(store.get(ROSTER_KEY).unwrap().as_deref(), Some(r#"["A"]"#));
        assert_eq!(store.get(GAMES_KEY).unwrap().as_deref(), Some("[1]"));
        assert!(store.get(TEAM_NAME_KEY).unwrap().is_none());
    }

    #[test]
    fn test_clear_tracked_includes_current_game() {
        let store = InMemoryStore::with_entries([
            (ROSTER_KEY, "[]"),
            (CURRENT_GAME_KEY, "{}"),
            ("laxkeeper_teams", "[]"),
        ]);

        clear_tracked(&store).unwrap();

        assert!(store.get(ROSTER_KEY).unwrap().is_none());
        assert!(store.get(CURRENT_GAME_KEY).unwrap().is_none());
        assert_eq!(store.get("laxkeeper_teams").unwrap().as_deref(), Some("[]"));
    }

    #[test]
    fn test_malformed_backup() {
        assert!(matches!(
            Backup::from_json("{roster"),
            Err(BackupError::Parse(_))
        ));
    }
}
