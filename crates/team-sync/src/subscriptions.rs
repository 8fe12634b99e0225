//! Live subscriptions to the active team's records.
//!
//! One task per tracked document. Each task drops the watch's first delivery
//! (the value hydration just settled) and applies every later one through
//! the suppressed write path.

use crate::events::{SyncEvent, now_ms};
use crate::interceptor::SyncedStore;
use crate::remote::{self, DocumentWatch, RemoteStore};
use crate::store::LocalStore;
use crate::team_code::TeamCode;
use crate::tracked::TrackedKey;
use futures::StreamExt;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// The set of watch tasks for one team.
///
/// Dropping the set cancels every task.
#[derive(Default)]
pub struct SubscriptionSet {
    team: Option<TeamCode>,
    tasks: Vec<(TrackedKey, JoinHandle<()>)>,
}

impl SubscriptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Team the live subscriptions belong to.
    pub fn team(&self) -> Option<&TeamCode> {
        self.team.as_ref()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Replace the current subscriptions with one watch per tracked key of
    /// `team`.
    ///
    /// Existing subscriptions are cancelled first. Either every watch opens
    /// or none stays open.
    pub async fn open<L, R>(
        &mut self,
        store: &Arc<SyncedStore<L, R>>,
        team: &TeamCode,
    ) -> remote::Result<()>
    where
        L: LocalStore + 'static,
        R: RemoteStore + 'static,
    {
        self.cancel_all();

        let mut watches = Vec::with_capacity(TrackedKey::ALL.len());
        for key in TrackedKey::ALL {
            let path = store.mapper().record(team, key);
            // An early return drops the watches opened so far, which closes them
            let watch = store.remote().watch(&path).await?;
            watches.push((key, watch));
        }

        for (key, watch) in watches {
            let handle = tokio::spawn(run_watch(Arc::clone(store), team.clone(), key, watch));
            self.tasks.push((key, handle));
        }
        self.team = Some(team.clone());
        info!("Listening for changes to team {}", team);
        Ok(())
    }

    /// Abort every watch task.
    pub fn cancel_all(&mut self) {
        if let Some(team) = self.team.take() {
            debug!("Cancelling {} subscriptions for team {}", self.tasks.len(), team);
        }
        for (_, handle) in self.tasks.drain(..) {
            handle.abort();
        }
    }
}

impl Drop for SubscriptionSet {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

async fn run_watch<L, R>(
    store: Arc<SyncedStore<L, R>>,
    team: TeamCode,
    key: TrackedKey,
    mut watch: DocumentWatch,
) where
    L: LocalStore + 'static,
    R: RemoteStore + 'static,
{
    let document = key.document_name();
    let mut primed = false;

    while let Some(delivery) = watch.next().await {
        let doc = match delivery {
            Ok(doc) => doc,
            Err(e) => {
                warn!("Subscription to {} for team {} failed: {}", document, team, e);
                store.events().emit(SyncEvent::SubscriptionError {
                    team: team.to_string(),
                    document: document.to_string(),
                    error: e.to_string(),
                    timestamp: now_ms(),
                });
                continue;
            }
        };

        if !primed {
            primed = true;
            continue;
        }

        if !store.is_target(&team) {
            debug!("Ignoring {} change for inactive team {}", document, team);
            continue;
        }

        let value = match doc {
            Some(doc) => match key.decode(&doc) {
                Ok(value) => value,
                Err(e) => {
                    warn!("Ignoring malformed {} change for team {}: {}", document, team, e);
                    continue;
                }
            },
            None => None,
        };

        match store.write_suppressed(key, value.as_deref()) {
            Ok(true) => {
                debug!("Applied remote {} change for team {}", document, team);
                store.events().emit(SyncEvent::RemoteApplied {
                    team: team.to_string(),
                    document: document.to_string(),
                    timestamp: now_ms(),
                });
                store.refresh();
            }
            Ok(false) => {}
            Err(e) => warn!("Failed to apply remote {} change locally: {}", document, e),
        }
    }

    debug!("Subscription to {} for team {} ended", document, team);
}
