//! Tracked keys: the fixed set of local keys mirrored to the team's dataset.
//!
//! Each key maps 1:1 onto one remote document. The document names are part
//! of the wire protocol shared by every device on a team, so they must never
//! change.

use serde_json::{Map, Value, json};
use thiserror::Error;

/// Local key holding the roster (JSON array).
pub const ROSTER_KEY: &str = "laxkeeper_roster";
/// Local key holding scheduled and completed games (JSON array).
pub const GAMES_KEY: &str = "laxkeeper_games";
/// Local key holding the team display name (plain string).
pub const TEAM_NAME_KEY: &str = "laxkeeper_team_name";
/// Local key for the in-progress game. Device-local, never synchronized.
pub const CURRENT_GAME_KEY: &str = "laxkeeper_current_game";

/// Field carrying the server-side write time (ms since epoch).
pub const UPDATED_AT_FIELD: &str = "updatedAt";

const ITEMS_FIELD: &str = "items";
const TEAM_NAME_FIELD: &str = "teamName";

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("Local value for {key} is not valid JSON: {reason}")]
    MalformedLocal { key: &'static str, reason: String },

    #[error("Remote document {document} has no '{field}' field")]
    MissingField {
        document: &'static str,
        field: &'static str,
    },

    #[error("Remote document {document} field '{field}' has the wrong type")]
    WrongType {
        document: &'static str,
        field: &'static str,
    },
}

/// One of the local keys this engine mirrors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackedKey {
    Roster,
    Games,
    TeamName,
}

impl TrackedKey {
    pub const ALL: [TrackedKey; 3] = [TrackedKey::Roster, TrackedKey::Games, TrackedKey::TeamName];

    /// The local store key.
    pub fn local_key(self) -> &'static str {
        match self {
            TrackedKey::Roster => ROSTER_KEY,
            TrackedKey::Games => GAMES_KEY,
            TrackedKey::TeamName => TEAM_NAME_KEY,
        }
    }

    /// The remote document name inside a team's data collection.
    pub fn document_name(self) -> &'static str {
        match self {
            TrackedKey::Roster => "roster",
            TrackedKey::Games => "games",
            TrackedKey::TeamName => "settings",
        }
    }

    pub fn from_local_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.local_key() == key)
    }

    pub fn from_document_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.document_name() == name)
    }

    fn field(self) -> &'static str {
        match self {
            TrackedKey::Roster | TrackedKey::Games => ITEMS_FIELD,
            TrackedKey::TeamName => TEAM_NAME_FIELD,
        }
    }

    /// Build the remote document for a local value.
    ///
    /// List keys store the parsed JSON under `items`; the team name is stored
    /// verbatim under `teamName`. A list value that is not valid JSON cannot
    /// be pushed.
    pub fn encode(self, value: &str, updated_at: u64) -> Result<Value, PayloadError> {
        let payload = match self {
            TrackedKey::Roster | TrackedKey::Games => {
                serde_json::from_str::<Value>(value).map_err(|e| PayloadError::MalformedLocal {
                    key: self.local_key(),
                    reason: e.to_string(),
                })?
            }
            TrackedKey::TeamName => Value::String(value.to_string()),
        };

        let mut doc = Map::new();
        doc.insert(self.field().to_string(), payload);
        doc.insert(UPDATED_AT_FIELD.to_string(), json!(updated_at));
        Ok(Value::Object(doc))
    }

    /// Extract the local value from a remote document.
    ///
    /// Returns `Ok(None)` when the field is explicitly `null` (the local key
    /// should be cleared). Strings are returned as-is; any other JSON value
    /// is returned as its serialized text.
    pub fn decode(self, doc: &Value) -> Result<Option<String>, PayloadError> {
        let field = self.field();
        let value = doc.get(field).ok_or(PayloadError::MissingField {
            document: self.document_name(),
            field,
        })?;

        match (self, value) {
            (_, Value::Null) => Ok(None),
            (_, Value::String(s)) => Ok(Some(s.clone())),
            (TrackedKey::TeamName, _) => Err(PayloadError::WrongType {
                document: self.document_name(),
                field,
            }),
            (_, other) => Ok(Some(other.to_string())),
        }
    }
}
