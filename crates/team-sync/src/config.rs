//! Engine configuration.

use serde::{Deserialize, Serialize};

/// Configuration for a `TeamSync` engine.
///
/// Every field has a default, so an empty JSON object is a valid config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Top-level collection holding one document per team
    #[serde(default = "default_teams_collection")]
    pub teams_collection: String,

    /// Sub-collection (under each team) holding the tracked records
    #[serde(default = "default_data_collection")]
    pub data_collection: String,

    /// Top-level collection holding one profile document per user
    #[serde(default = "default_users_collection")]
    pub users_collection: String,

    /// Append-only collection receiving audit events
    #[serde(default = "default_events_collection")]
    pub events_collection: String,

    /// Team name used when creating a team with no local name set
    #[serde(default = "default_team_name")]
    pub default_team_name: String,

    /// Refresh hooks invoked, in order, after remote data lands locally
    #[serde(default = "default_refresh_hooks")]
    pub refresh_hooks: Vec<String>,
}

fn default_teams_collection() -> String {
    "teams".to_string()
}

fn default_data_collection() -> String {
    "data".to_string()
}

fn default_users_collection() -> String {
    "users".to_string()
}

fn default_events_collection() -> String {
    "team_events".to_string()
}

fn default_team_name() -> String {
    "My Team".to_string()
}

fn default_refresh_hooks() -> Vec<String> {
    ["team_name", "roster", "scheduled_games", "game_history"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            teams_collection: default_teams_collection(),
            data_collection: default_data_collection(),
            users_collection: default_users_collection(),
            events_collection: default_events_collection(),
            default_team_name: default_team_name(),
            refresh_hooks: default_refresh_hooks(),
        }
    }
}
