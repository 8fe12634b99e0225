//! Membership list: the teams this device belongs to and which one is active.
//!
//! The list is cached in the local store so the device can start (and keep
//! editing offline) without a round trip. The authoritative cross-device copy
//! lives in the user's profile document, see `profile`.

use crate::events::now_ms;
use crate::store::{self, LocalStore};
use crate::team_code::TeamCode;
use crate::tracked::TEAM_NAME_KEY;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Local key holding the membership list (JSON array).
pub const TEAMS_KEY: &str = "laxkeeper_teams";
/// Local key holding the active team code.
pub const ACTIVE_TEAM_KEY: &str = "laxkeeper_active_team";
/// Single-team marker written by builds that supported only one team.
pub const LEGACY_TEAM_CODE_KEY: &str = "laxkeeper_team_code";

/// One team the local user belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Membership {
    pub code: TeamCode,
    /// Cached display name (the team's own name lives in its settings record)
    pub name: String,
    /// When this device joined, ms since epoch
    pub joined_at: u64,
}

impl Membership {
    pub fn new(code: TeamCode, name: impl Into<String>) -> Self {
        Self {
            code,
            name: name.into(),
            joined_at: now_ms(),
        }
    }
}

/// Ordered membership entries, unique by code, plus the active pointer.
///
/// Invariant: `active`, when set, names an entry in `entries`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MembershipList {
    entries: Vec<Membership>,
    active: Option<TeamCode>,
}

impl MembershipList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[Membership] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn contains(&self, code: &TeamCode) -> bool {
        self.get(code).is_some()
    }

    pub fn get(&self, code: &TeamCode) -> Option<&Membership> {
        self.entries.iter().find(|m| m.code == *code)
    }

    pub fn first(&self) -> Option<&Membership> {
        self.entries.first()
    }

    pub fn active(&self) -> Option<&TeamCode> {
        self.active.as_ref()
    }

    pub fn active_entry(&self) -> Option<&Membership> {
        self.active.as_ref().and_then(|code| self.get(code))
    }

    /// Append an entry. Returns false (and changes nothing) if the code is present.
    pub fn insert(&mut self, membership: Membership) -> bool {
        if self.contains(&membership.code) {
            return false;
        }
        self.entries.push(membership);
        true
    }

    /// Remove an entry, clearing the active pointer if it pointed there.
    pub fn remove(&mut self, code: &TeamCode) -> Option<Membership> {
        let pos = self.entries.iter().position(|m| m.code == *code)?;
        if self.active.as_ref() == Some(code) {
            self.active = None;
        }
        Some(self.entries.remove(pos))
    }

    /// Point at an existing entry. Returns false if `code` is not a member.
    pub fn set_active(&mut self, code: &TeamCode) -> bool {
        if !self.contains(code) {
            return false;
        }
        self.active = Some(code.clone());
        true
    }

    pub fn clear_active(&mut self) {
        self.active = None;
    }

    /// Update the cached name. Returns true if it changed.
    pub fn rename(&mut self, code: &TeamCode, name: &str) -> bool {
        match self.entries.iter_mut().find(|m| m.code == *code) {
            Some(entry) if entry.name != name => {
                entry.name = name.to_string();
                true
            }
            _ => false,
        }
    }

    /// Merge a membership list from another device, keyed by code.
    ///
    /// Local entries win on conflicting fields; remote-only entries are
    /// appended in remote order. Entries missing remotely are kept (there are
    /// no tombstones). Returns the number of entries appended.
    pub fn merge_remote(&mut self, remote: &[Membership]) -> usize {
        let mut appended = 0;
        for entry in remote {
            if self.insert(entry.clone()) {
                appended += 1;
            }
        }
        appended
    }

    /// Load the cached list from the local store.
    ///
    /// A corrupt list is logged and treated as empty: the profile copy can
    /// rebuild it. An active pointer naming a non-member is dropped.
    pub fn load(store: &dyn LocalStore) -> store::Result<Self> {
        let entries: Vec<Membership> = match store.get(TEAMS_KEY)? {
            Some(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!("Ignoring unreadable membership list: {}", e);
                Vec::new()
            }),
            None => Vec::new(),
        };

        let mut list = Self {
            entries: Vec::new(),
            active: None,
        };
        for entry in entries {
            list.insert(entry);
        }

        if let Some(raw) = store.get(ACTIVE_TEAM_KEY)? {
            match raw.parse::<TeamCode>() {
                Ok(code) if list.set_active(&code) => {}
                _ => warn!("Dropping stale active team pointer {:?}", raw),
            }
        }

        Ok(list)
    }

    /// Write the list and active pointer to the local store.
    pub fn save(&self, store: &dyn LocalStore) -> store::Result<()> {
        let raw = serde_json::to_string(&self.entries)
            .map_err(|e| store::StoreError::Io(e.to_string()))?;
        store.set(TEAMS_KEY, &raw)?;
        match &self.active {
            Some(code) => store.set(ACTIVE_TEAM_KEY, code.as_str()),
            None => store.remove(ACTIVE_TEAM_KEY),
        }
    }

    /// Convert a legacy single-team marker into a membership.
    ///
    /// If the marker names a team not yet in the list, it is appended (named
    /// after the local team-name value, or the code when unset) and made
    /// active. The marker is removed in every case, so a second run finds
    /// nothing to do. Returns the migrated code, if any.
    pub fn migrate_legacy(&mut self, store: &dyn LocalStore) -> store::Result<Option<TeamCode>> {
        let Some(raw) = store.get(LEGACY_TEAM_CODE_KEY)? else {
            return Ok(None);
        };

        let migrated = match raw.parse::<TeamCode>() {
            Ok(code) if !self.contains(&code) => {
                let name = store
                    .get(TEAM_NAME_KEY)?
                    .filter(|n| !n.trim().is_empty())
                    .unwrap_or_else(|| code.to_string());
                self.insert(Membership::new(code.clone(), name));
                self.set_active(&code);
                self.save(store)?;
                info!("Migrated legacy team {} into membership list", code);
                Some(code)
            }
            Ok(code) => {
                info!("Legacy team {} already in membership list", code);
                None
            }
            Err(e) => {
                warn!("Discarding unreadable legacy team code {:?}: {}", raw, e);
                None
            }
        };

        store.remove(LEGACY_TEAM_CODE_KEY)?;
        Ok(migrated)
    }
}
