//! Remote mapper: where each piece of state lives in the document store.
//!
//! ```text
//! teams/{code}                  team metadata (name, creator, creation time)
//! teams/{code}/data/{document}  one record per tracked key
//! users/{uid}                   user profile + membership list
//! team_events/{id}              append-only audit log
//! ```
//!
//! Collection names come from `SyncConfig`; document names come from
//! `TrackedKey` and are fixed.

use crate::config::SyncConfig;
use crate::remote::{CollectionPath, DocumentPath};
use crate::team_code::TeamCode;
use crate::tracked::TrackedKey;

/// Where one tracked record lives: the team's dataset and the document name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordLocation {
    pub team: TeamCode,
    pub document: &'static str,
}

#[derive(Debug, Clone)]
pub struct RemoteMapper {
    teams: CollectionPath,
    data_collection: String,
    users: CollectionPath,
    events: CollectionPath,
}

impl RemoteMapper {
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            teams: CollectionPath::new(config.teams_collection.as_str()),
            data_collection: config.data_collection.clone(),
            users: CollectionPath::new(config.users_collection.as_str()),
            events: CollectionPath::new(config.events_collection.as_str()),
        }
    }

    pub fn record_location(&self, team: &TeamCode, key: TrackedKey) -> RecordLocation {
        RecordLocation {
            team: team.clone(),
            document: key.document_name(),
        }
    }

    /// `teams/{code}`
    pub fn team(&self, team: &TeamCode) -> DocumentPath {
        self.teams.doc(team.as_str())
    }

    /// `teams/{code}/data`
    pub fn team_data(&self, team: &TeamCode) -> CollectionPath {
        self.team(team).collection(&self.data_collection)
    }

    /// `teams/{code}/data/{document}`
    pub fn record(&self, team: &TeamCode, key: TrackedKey) -> DocumentPath {
        let location = self.record_location(team, key);
        self.team_data(&location.team).doc(location.document)
    }

    /// `users/{uid}`
    pub fn user_profile(&self, uid: &str) -> DocumentPath {
        self.users.doc(uid)
    }

    /// `team_events`
    pub fn events(&self) -> &CollectionPath {
        &self.events
    }
}
