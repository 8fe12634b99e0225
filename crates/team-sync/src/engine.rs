//! The team sync engine.
//!
//! `TeamSync` owns the interceptor, the live subscription set, the signed-in
//! identity and the code generator. It drives every membership operation:
//!
//! ```text
//! start ──> migrate legacy marker ──> resolve identity ──> merge profile
//!                                                              │
//!               create / join / switch / leave ───> activate(team)
//!                                                   │
//!                    cancel subscriptions ──> hydrate ──> set target ──> subscribe
//! ```
//!
//! A team is either fully live (hydrated, sync target set, subscriptions
//! open) or the engine is dormant. Failed activations never leave a partial
//! subscription set behind.

use crate::config::SyncConfig;
use crate::error::{Result, TeamSyncError};
use crate::events::{EventBus, SyncEvent, now_ms};
use crate::hooks::{ConfirmPrompt, RefreshHooks, SettingsUi};
use crate::hydration::{HydrationOutcome, hydrate};
use crate::identity::{IdentityProvider, UserIdentity};
use crate::interceptor::SyncedStore;
use crate::mapper::RemoteMapper;
use crate::membership::{Membership, MembershipList};
use crate::profile::{ProfileMemberships, identity_fields, membership_fields};
use crate::remote::RemoteStore;
use crate::store::LocalStore;
use crate::subscriptions::SubscriptionSet;
use crate::team_code::{CodeGenerator, RandomCodes, TeamCode};
use crate::tracked::TEAM_NAME_KEY;
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

/// Result of leaving a team.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaveOutcome {
    /// The left team was active; syncing moved to this one.
    Switched(TeamCode),
    /// The left team was the last one; the engine is dormant.
    Dormant,
    /// The left team was not active; nothing else changed.
    Unchanged,
}

/// Team synchronization engine for one device.
pub struct TeamSync<L, R> {
    store: Arc<SyncedStore<L, R>>,
    config: SyncConfig,
    subscriptions: SubscriptionSet,
    identity: Option<UserIdentity>,
    codes: Box<dyn CodeGenerator>,
    /// Completion signal of the last queued profile write.
    profile_tail: Mutex<Option<oneshot::Receiver<()>>>,
}

impl<L, R> TeamSync<L, R>
where
    L: LocalStore + 'static,
    R: RemoteStore + 'static,
{
    /// Wrap `store` and sync it against `remote`.
    ///
    /// Nothing is mirrored until `start` installs the interceptor.
    pub fn new(store: L, remote: R, config: SyncConfig) -> Self {
        let mapper = RemoteMapper::new(&config);
        let store = SyncedStore::new(store, Arc::new(remote), mapper, config.refresh_hooks.clone());
        Self {
            store: Arc::new(store),
            config,
            subscriptions: SubscriptionSet::new(),
            identity: None,
            codes: Box::new(RandomCodes),
            profile_tail: Mutex::new(None),
        }
    }

    pub fn with_ui(self, ui: impl SettingsUi + 'static) -> Self {
        self.store.set_ui(Arc::new(ui));
        self
    }

    pub fn with_code_generator(mut self, codes: impl CodeGenerator + 'static) -> Self {
        self.codes = Box::new(codes);
        self
    }

    pub fn set_ui(&self, ui: Arc<dyn SettingsUi>) {
        self.store.set_ui(ui);
    }

    /// The store domain code should read and write through.
    pub fn store(&self) -> &Arc<SyncedStore<L, R>> {
        &self.store
    }

    pub fn events(&self) -> &Arc<EventBus> {
        self.store.events()
    }

    pub fn refresh_hooks(&self) -> &Arc<RefreshHooks> {
        self.store.refresh_hooks()
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn identity(&self) -> Option<&UserIdentity> {
        self.identity.as_ref()
    }

    /// Install the interceptor, migrate legacy state, wait for sign-in, merge
    /// the profile's memberships and bring the active team live.
    ///
    /// Failing to activate the team is not an error here: it is logged,
    /// reported on the event bus, and the engine stays dormant.
    pub async fn start(&mut self, provider: &dyn IdentityProvider) -> Result<()> {
        self.store.install();

        let (list, migrated) = {
            let raw = self.store.raw();
            let mut list = MembershipList::load(raw)?;
            let migrated = list.migrate_legacy(raw)?;
            (list, migrated)
        };
        *self.store.memberships() = list.clone();
        self.store.render(&list);

        self.identity = provider.resolve().await;
        let Some(identity) = self.identity.clone() else {
            info!("Not signed in, team sync stays local-only");
            return Ok(());
        };
        info!("Signed in as {}", identity.uid);

        self.write_profile(identity_fields(&identity, now_ms()), "profile identity");

        let merged = self.reconcile_profile(&identity).await?;
        if migrated.is_some() || merged {
            self.persist_memberships();
        }

        if let Some(team) = self.active_code()
            && let Err(e) = self.activate(&team).await
        {
            warn!("Team {} not synced this session: {}", team, e);
        }
        Ok(())
    }

    /// Merge the profile's membership list into the local one.
    ///
    /// Returns true when the local list gained entries.
    async fn reconcile_profile(&self, identity: &UserIdentity) -> Result<bool> {
        let path = self.store.mapper().user_profile(&identity.uid);
        let doc = match self.store.remote().get(&path).await {
            Ok(Some(doc)) => doc,
            Ok(None) => {
                debug!("No profile for {} yet", identity.uid);
                return Ok(false);
            }
            Err(e) => {
                warn!("Could not read profile for {}: {}", identity.uid, e);
                return Ok(false);
            }
        };

        let profile = ProfileMemberships::from_document(&doc);
        if profile.teams.is_empty() {
            return Ok(false);
        }

        let appended = self.store.update_memberships(|list| {
            let was_empty = list.is_empty();
            let appended = list.merge_remote(&profile.teams);
            if was_empty && let Some(code) = profile.preferred_active() {
                list.set_active(code);
            }
            appended
        })?;

        if appended > 0 {
            info!("Recovered {} team memberships from profile", appended);
        }
        Ok(appended > 0)
    }

    /// Create a new team seeded with this device's data and make it active.
    pub async fn create_team(&mut self) -> Result<TeamCode> {
        let identity = self.require_identity()?.clone();
        let code = self.unused_code().await?;

        let team_name = self
            .store
            .raw()
            .get(TEAM_NAME_KEY)?
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| self.config.default_team_name.clone());
        let created_at = now_ms();

        let metadata = json!({
            "teamName": team_name,
            "createdAt": created_at,
            "createdBy": identity.uid,
        });
        self.store
            .remote()
            .set(&self.store.mapper().team(&code), metadata)
            .await?;
        info!("Created team {} ({})", code, team_name);

        self.go_dormant();
        self.store.update_memberships(|list| {
            list.insert(Membership::new(code.clone(), team_name.as_str()));
            list.set_active(&code);
        })?;

        let activated = self.activate(&code).await;
        self.persist_memberships();
        self.log_team_created(&code, &team_name, &identity.uid, created_at);
        activated?;
        Ok(code)
    }

    /// Pick a code with no existing team, regenerating once on collision.
    async fn unused_code(&mut self) -> Result<TeamCode> {
        for attempt in 1..=2 {
            let code = self.codes.next_code();
            let existing = self.store.remote().get(&self.store.mapper().team(&code)).await?;
            if existing.is_none() {
                return Ok(code);
            }
            warn!("Team code {} already taken (attempt {})", code, attempt);
        }
        Err(TeamSyncError::CodeCollision)
    }

    /// Join an existing team and replace local data with the team's.
    pub async fn join_team(&mut self, input: &str) -> Result<Membership> {
        let code: TeamCode = input.parse()?;
        self.require_identity()?;
        if self.store.memberships().contains(&code) {
            return Err(TeamSyncError::AlreadyMember(code));
        }

        let metadata = self
            .store
            .remote()
            .get(&self.store.mapper().team(&code))
            .await?
            .ok_or_else(|| TeamSyncError::TeamNotFound(code.clone()))?;
        let team_name = metadata
            .get("teamName")
            .and_then(Value::as_str)
            .unwrap_or(code.as_str())
            .to_string();

        let prompt = ConfirmPrompt::JoinTeam {
            code: code.clone(),
            team_name: team_name.clone(),
        };
        if !self.store.ui().confirm(&prompt) {
            info!("Join of team {} declined", code);
            return Err(TeamSyncError::Declined);
        }

        self.go_dormant();
        let membership = Membership::new(code.clone(), team_name);
        self.store.update_memberships(|list| {
            list.insert(membership.clone());
            list.set_active(&code);
        })?;
        info!("Joined team {}", code);

        let activated = self.activate(&code).await;
        self.persist_memberships();
        activated?;
        Ok(membership)
    }

    /// Stop belonging to a team. Local data is kept.
    pub async fn leave_team(&mut self, code: &TeamCode) -> Result<LeaveOutcome> {
        let entry = self
            .store
            .memberships()
            .get(code)
            .cloned()
            .ok_or_else(|| TeamSyncError::NotMember(code.clone()))?;

        let prompt = ConfirmPrompt::LeaveTeam {
            code: code.clone(),
            team_name: entry.name,
        };
        if !self.store.ui().confirm(&prompt) {
            info!("Leaving team {} declined", code);
            return Err(TeamSyncError::Declined);
        }

        let was_active = self.store.memberships().active() == Some(code);
        if was_active {
            self.go_dormant();
        }

        let next = self.store.update_memberships(|list| {
            list.remove(code);
            let next = if was_active {
                list.first().map(|m| m.code.clone())
            } else {
                None
            };
            if let Some(next) = &next {
                list.set_active(next);
            }
            next
        })?;
        info!("Left team {}", code);

        let outcome = match next {
            Some(next) => {
                let activated = self.activate(&next).await;
                self.persist_memberships();
                activated?;
                LeaveOutcome::Switched(next)
            }
            None if was_active => {
                info!("No teams left, sync is dormant");
                self.persist_memberships();
                LeaveOutcome::Dormant
            }
            None => {
                self.persist_memberships();
                LeaveOutcome::Unchanged
            }
        };
        Ok(outcome)
    }

    /// Make another joined team active and pull its data.
    ///
    /// Switching to the team that is already active reruns activation, which
    /// is how a caller retries after a failed hydration.
    pub async fn switch_team(&mut self, code: &TeamCode) -> Result<HydrationOutcome> {
        self.require_identity()?;
        if !self.store.memberships().contains(code) {
            return Err(TeamSyncError::NotMember(code.clone()));
        }

        self.go_dormant();
        self.store.update_memberships(|list| {
            list.set_active(code);
        })?;
        info!("Switching to team {}", code);

        let activated = self.activate(code).await;
        self.persist_memberships();
        activated
    }

    /// Hydrate `team`, then point pushes and subscriptions at it.
    async fn activate(&mut self, team: &TeamCode) -> Result<HydrationOutcome> {
        self.go_dormant();

        let outcome = match hydrate(&*self.store, team).await {
            Ok(outcome) => outcome,
            Err(e) => return Err(self.activation_failed(team, e)),
        };

        self.store.set_sync_target(Some(team.clone()));
        if let Err(source) = self.subscriptions.open(&self.store, team).await {
            self.store.set_sync_target(None);
            let e = TeamSyncError::Hydration {
                team: team.clone(),
                source,
            };
            return Err(self.activation_failed(team, e));
        }

        info!("Team {} is live ({})", team, outcome.mode());
        self.store.events().emit(SyncEvent::Hydrated {
            team: team.to_string(),
            mode: outcome.mode().to_string(),
            timestamp: now_ms(),
        });
        Ok(outcome)
    }

    fn activation_failed(&self, team: &TeamCode, e: TeamSyncError) -> TeamSyncError {
        error!("Failed to load team {}: {}", team, e);
        self.store.events().emit(SyncEvent::HydrationFailed {
            team: team.to_string(),
            error: e.to_string(),
            timestamp: now_ms(),
        });
        e
    }

    /// Stop all syncing without touching memberships.
    fn go_dormant(&mut self) {
        self.subscriptions.cancel_all();
        self.store.set_sync_target(None);
    }

    fn require_identity(&self) -> Result<&UserIdentity> {
        self.identity.as_ref().ok_or(TeamSyncError::NotSignedIn)
    }

    /// Merge the membership list into the profile, in the background.
    fn persist_memberships(&self) {
        let fields = membership_fields(&self.store.memberships(), now_ms());
        self.write_profile(fields, "profile memberships");
    }

    /// Queue a merge into the user's profile.
    ///
    /// Profile writes run in the order they were queued; each one waits for
    /// the previous before touching the document.
    fn write_profile(&self, fields: Value, operation: &'static str) {
        let Some(identity) = &self.identity else {
            return;
        };
        let path = self.store.mapper().user_profile(&identity.uid);
        let remote = Arc::clone(self.store.remote());
        let events = Arc::clone(self.store.events());

        let (done, tail) = oneshot::channel::<()>();
        let previous = self
            .profile_tail
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(tail);

        self.store.spawn_background(async move {
            if let Some(previous) = previous {
                // Resolves once the earlier write finished or was dropped
                let _ = previous.await;
            }
            let result = remote.merge(&path, fields).await;
            drop(done);
            match result {
                Ok(()) => debug!("Updated {}", operation),
                Err(e) => {
                    warn!("Failed to update {}: {}", operation, e);
                    events.emit(SyncEvent::BackgroundWriteFailed {
                        operation: operation.to_string(),
                        error: e.to_string(),
                        timestamp: now_ms(),
                    });
                }
            }
        });
    }

    fn log_team_created(&self, code: &TeamCode, team_name: &str, uid: &str, created_at: u64) {
        let collection = self.store.mapper().events().clone();
        let remote = Arc::clone(self.store.remote());
        let events = Arc::clone(self.store.events());
        let entry = json!({
            "type": "team_created",
            "teamCode": code,
            "teamName": team_name,
            "createdBy": uid,
            "createdAt": created_at,
        });

        self.store.spawn_background(async move {
            if let Err(e) = remote.add(&collection, entry).await {
                warn!("Failed to record team creation: {}", e);
                events.emit(SyncEvent::BackgroundWriteFailed {
                    operation: "audit event".to_string(),
                    error: e.to_string(),
                    timestamp: now_ms(),
                });
            }
        });
    }

    pub fn memberships(&self) -> Vec<Membership> {
        self.store.memberships().entries().to_vec()
    }

    /// The active membership, if any.
    pub fn active_team(&self) -> Option<Membership> {
        self.store.memberships().active_entry().cloned()
    }

    /// Code of the active team, for sharing with other devices.
    pub fn active_code(&self) -> Option<TeamCode> {
        self.store.memberships().active().cloned()
    }

    /// True while a team is live (pushes and subscriptions running).
    pub fn is_syncing(&self) -> bool {
        self.store.sync_target().is_some()
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Stop syncing and forget the identity. Memberships and local data stay.
    pub fn sign_out(&mut self) {
        self.go_dormant();
        if let Some(identity) = self.identity.take() {
            info!("Signed out {}", identity.uid);
        }
    }

    /// Wait for every background write issued so far.
    pub async fn flush(&self) {
        self.store.flush().await;
    }

    /// Stop syncing and drain outstanding writes.
    pub async fn shutdown(&mut self) {
        self.go_dormant();
        self.store.flush().await;
    }
}
