//! Store interceptor: mirrors tracked-key writes to the active team.
//!
//! `SyncedStore` wraps the raw local store and implements `LocalStore`
//! itself, so domain code keeps calling `get`/`set`/`remove` without knowing
//! about synchronization:
//!
//! ```text
//! domain code ──set──> SyncedStore ──set──> raw store
//!                           │
//!                           └─ tracked key, installed, team live?
//!                                  └─ spawn push (not awaited)
//! ```
//!
//! Writes that originate from the engine itself (hydration, inbound remote
//! changes) carry `WriteOrigin::Remote` and never mirror, which is what
//! keeps a remote change from echoing back out. The marker travels with
//! each write instead of living in shared state, so concurrent writers on a
//! multi-threaded runtime cannot observe each other's suppression.

use crate::events::{EventBus, SyncEvent, now_ms};
use crate::hooks::{NoUi, RefreshHooks, SettingsUi};
use crate::mapper::RemoteMapper;
use crate::membership::MembershipList;
use crate::remote::{DocumentPath, RemoteStore};
use crate::store::{self, LocalStore};
use crate::team_code::TeamCode;
use crate::tracked::TrackedKey;
use serde_json::Value;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// Who caused a local write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOrigin {
    /// Domain code on this device. Tracked keys are mirrored.
    Local,
    /// The engine applying remote state. Never mirrored.
    Remote,
}

/// Local store decorator that mirrors tracked keys to the live team.
///
/// Also owns the state every sync path shares: the live sync target, the
/// membership list (renamed implicitly by team-name writes), refresh hooks,
/// the settings UI and the event bus.
pub struct SyncedStore<L, R> {
    raw: L,
    remote: Arc<R>,
    mapper: RemoteMapper,
    installed: AtomicBool,
    /// Team receiving pushes. `None` while dormant or mid-switch.
    target: RwLock<Option<TeamCode>>,
    memberships: Mutex<MembershipList>,
    refresh: Arc<RefreshHooks>,
    refresh_order: Vec<String>,
    ui: RwLock<Arc<dyn SettingsUi>>,
    events: Arc<EventBus>,
    pending: Mutex<Vec<JoinHandle<()>>>,
}

impl<L: LocalStore, R: RemoteStore + 'static> SyncedStore<L, R> {
    pub(crate) fn new(
        raw: L,
        remote: Arc<R>,
        mapper: RemoteMapper,
        refresh_order: Vec<String>,
    ) -> Self {
        Self {
            raw,
            remote,
            mapper,
            installed: AtomicBool::new(false),
            target: RwLock::new(None),
            memberships: Mutex::new(MembershipList::new()),
            refresh: Arc::new(RefreshHooks::new()),
            refresh_order,
            ui: RwLock::new(Arc::new(NoUi)),
            events: Arc::new(EventBus::new()),
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Start mirroring. Returns true the first time, false on every later call.
    pub fn install(&self) -> bool {
        let first = !self.installed.swap(true, Ordering::SeqCst);
        if first {
            debug!("Store interceptor installed");
        }
        first
    }

    pub fn is_installed(&self) -> bool {
        self.installed.load(Ordering::SeqCst)
    }

    /// The wrapped store. Writes made here bypass synchronization entirely.
    pub fn raw(&self) -> &L {
        &self.raw
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn refresh_hooks(&self) -> &Arc<RefreshHooks> {
        &self.refresh
    }

    pub(crate) fn remote(&self) -> &Arc<R> {
        &self.remote
    }

    pub(crate) fn mapper(&self) -> &RemoteMapper {
        &self.mapper
    }

    /// Team currently receiving pushes and subscription updates.
    pub fn sync_target(&self) -> Option<TeamCode> {
        self.target.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub(crate) fn set_sync_target(&self, team: Option<TeamCode>) {
        *self.target.write().unwrap_or_else(|e| e.into_inner()) = team;
    }

    pub(crate) fn is_target(&self, team: &TeamCode) -> bool {
        self.target
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            == Some(team)
    }

    pub(crate) fn set_ui(&self, ui: Arc<dyn SettingsUi>) {
        *self.ui.write().unwrap_or_else(|e| e.into_inner()) = ui;
    }

    pub(crate) fn ui(&self) -> Arc<dyn SettingsUi> {
        Arc::clone(&self.ui.read().unwrap_or_else(|e| e.into_inner()))
    }

    /// Invoke the configured refresh hooks so presentation re-reads the store.
    pub(crate) fn refresh(&self) {
        self.refresh.invoke_all(&self.refresh_order);
    }

    pub(crate) fn memberships(&self) -> MutexGuard<'_, MembershipList> {
        self.memberships.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Mutate the membership list, persist it locally, and redraw the UI.
    pub(crate) fn update_memberships<T>(
        &self,
        f: impl FnOnce(&mut MembershipList) -> T,
    ) -> store::Result<T> {
        let (out, snapshot) = {
            let mut list = self.memberships();
            let out = f(&mut list);
            list.save(&self.raw)?;
            (out, list.clone())
        };
        self.render(&snapshot);
        Ok(out)
    }

    pub(crate) fn render(&self, list: &MembershipList) {
        self.ui().render_memberships(list.entries(), list.active());
        self.events.emit(SyncEvent::MembershipChanged {
            active: list.active().map(|c| c.to_string()),
            count: list.len(),
            timestamp: now_ms(),
        });
    }

    /// Write (or remove, when `value` is `None`) a key.
    ///
    /// The raw write completes first. Only `WriteOrigin::Local` writes to
    /// tracked keys are mirrored.
    pub fn write(&self, key: &str, value: Option<&str>, origin: WriteOrigin) -> store::Result<()> {
        match value {
            Some(v) => self.raw.set(key, v)?,
            None => self.raw.remove(key)?,
        }

        let Some(tracked) = TrackedKey::from_local_key(key) else {
            return Ok(());
        };

        if tracked == TrackedKey::TeamName
            && let Some(name) = value
        {
            self.rename_active(name);
        }

        if origin == WriteOrigin::Local {
            self.mirror(tracked, value);
        }
        Ok(())
    }

    /// Apply a value that came from the remote side without mirroring it.
    ///
    /// Returns false when the local value already matched.
    pub(crate) fn write_suppressed(
        &self,
        key: TrackedKey,
        value: Option<&str>,
    ) -> store::Result<bool> {
        let current = self.raw.get(key.local_key())?;
        if current.as_deref() == value {
            return Ok(false);
        }
        self.write(key.local_key(), value, WriteOrigin::Remote)?;
        Ok(true)
    }

    fn rename_active(&self, name: &str) {
        let changed = {
            let mut list = self.memberships();
            match list.active().cloned() {
                Some(code) => list.rename(&code, name),
                None => false,
            }
        };
        if changed {
            if let Err(e) = self.update_memberships(|_| ()) {
                warn!("Failed to persist renamed team: {}", e);
            }
        }
    }

    fn mirror(&self, key: TrackedKey, value: Option<&str>) {
        if !self.is_installed() {
            return;
        }
        let Some(team) = self.sync_target() else {
            debug!("No live team, not mirroring {}", key.local_key());
            return;
        };

        let path = self.mapper.record(&team, key);
        let doc = match value {
            Some(v) => match key.encode(v, now_ms()) {
                Ok(doc) => Some(doc),
                Err(e) => {
                    warn!("Skipping push for {}: {}", key.local_key(), e);
                    self.events.emit(SyncEvent::PushSkipped {
                        key: key.local_key().to_string(),
                        reason: e.to_string(),
                        timestamp: now_ms(),
                    });
                    return;
                }
            },
            None => None,
        };

        self.spawn_push(team, key, path, doc);
    }

    fn spawn_push(&self, team: TeamCode, key: TrackedKey, path: DocumentPath, doc: Option<Value>) {
        let remote = Arc::clone(&self.remote);
        let events = Arc::clone(&self.events);
        let document = key.document_name();

        self.spawn_background(async move {
            let (operation, result) = match doc {
                Some(doc) => ("set", remote.set(&path, doc).await),
                None => ("delete", remote.delete(&path).await),
            };
            match result {
                Ok(()) => {
                    debug!("Pushed {} {} for team {}", operation, document, team);
                    events.emit(SyncEvent::RecordPushed {
                        team: team.to_string(),
                        document: document.to_string(),
                        operation: operation.to_string(),
                        timestamp: now_ms(),
                    });
                }
                Err(e) => {
                    error!("Remote {} of {} failed: {}", operation, path, e);
                    events.emit(SyncEvent::PushFailed {
                        team: team.to_string(),
                        document: document.to_string(),
                        operation: operation.to_string(),
                        error: e.to_string(),
                        timestamp: now_ms(),
                    });
                }
            }
        });
    }

    /// Run a fire-and-forget task, tracked so `flush` can wait for it.
    pub(crate) fn spawn_background<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime.spawn(fut),
            Err(_) => {
                error!("No async runtime available, dropping background write");
                return;
            }
        };
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.retain(|h| !h.is_finished());
        pending.push(handle);
    }

    /// Wait for every outstanding push and background write.
    pub async fn flush(&self) {
        loop {
            let handles =
                std::mem::take(&mut *self.pending.lock().unwrap_or_else(|e| e.into_inner()));
            if handles.is_empty() {
                return;
            }
            for handle in handles {
                if let Err(e) = handle.await {
                    warn!("Background task ended abnormally: {}", e);
                }
            }
        }
    }
}

impl<L: LocalStore, R: RemoteStore + 'static> LocalStore for SyncedStore<L, R> {
    fn get(&self, key: &str) -> store::Result<Option<String>> {
        self.raw.get(key)
    }

    fn set(&self, key: &str, value: &str) -> store::Result<()> {
        self.write(key, Some(value), WriteOrigin::Local)
    }

    fn remove(&self, key: &str) -> store::Result<()> {
        self.write(key, None, WriteOrigin::Local)
    }
}
