//! User profile document: identity fields plus the membership list.
//!
//! Profiles are written with shallow merges so identity updates and
//! membership updates never clobber each other.

use crate::identity::UserIdentity;
use crate::membership::{Membership, MembershipList};
use crate::team_code::TeamCode;
use serde_json::{Value, json};
use tracing::warn;

/// Membership state recovered from a profile document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileMemberships {
    pub teams: Vec<Membership>,
    pub active_team: Option<TeamCode>,
}

impl ProfileMemberships {
    /// Parse the membership part of a profile document.
    ///
    /// Unreadable entries are skipped individually rather than failing the
    /// whole document.
    pub fn from_document(doc: &Value) -> Self {
        let teams = doc
            .get("teams")
            .and_then(Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|entry| match serde_json::from_value::<Membership>(entry.clone()) {
                        Ok(m) => Some(m),
                        Err(e) => {
                            warn!("Skipping unreadable profile membership {}: {}", entry, e);
                            None
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();

        let active_team = doc
            .get("activeTeam")
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok());

        Self { teams, active_team }
    }

    /// The team a fresh device should activate: the designated active team
    /// if it is still listed, otherwise the first entry.
    pub fn preferred_active(&self) -> Option<&TeamCode> {
        self.active_team
            .as_ref()
            .filter(|code| self.teams.iter().any(|m| m.code == **code))
            .or_else(|| self.teams.first().map(|m| &m.code))
    }
}

/// Fields merged into the profile for a membership change.
pub fn membership_fields(list: &MembershipList, updated_at: u64) -> Value {
    json!({
        "teams": list.entries(),
        "activeTeam": list.active(),
        "updatedAt": updated_at,
    })
}

/// Fields merged into the profile on sign-in.
pub fn identity_fields(identity: &UserIdentity, updated_at: u64) -> Value {
    json!({
        "displayName": identity.display_name.clone().unwrap_or_default(),
        "email": identity.email.clone().unwrap_or_default(),
        "photoURL": identity.photo_url.clone().unwrap_or_default(),
        "updatedAt": updated_at,
    })
}
