//! Hydration: decide which side is authoritative when a team becomes active.
//!
//! If the team already holds any tracked record, the remote wins outright:
//! every tracked key is overwritten from its record or removed when the
//! record is missing. A team with no records yet is seeded from whatever
//! this device holds locally, in a single batch.

use crate::error::{Result, TeamSyncError};
use crate::events::now_ms;
use crate::interceptor::SyncedStore;
use crate::remote::{RemoteStore, WriteBatch};
use crate::store::LocalStore;
use crate::team_code::TeamCode;
use crate::tracked::TrackedKey;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// What a hydration pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HydrationOutcome {
    /// Remote records existed and replaced local state.
    Pulled {
        /// Keys whose local value changed.
        applied: usize,
        /// Keys removed because their record is absent.
        cleared: usize,
    },
    /// The team was empty and local values were uploaded.
    Pushed { records: usize },
}

impl HydrationOutcome {
    pub fn mode(&self) -> &'static str {
        match self {
            HydrationOutcome::Pulled { .. } => "pull",
            HydrationOutcome::Pushed { .. } => "push",
        }
    }
}

/// Reconcile the local store with `team`.
///
/// All local writes go through the suppressed path, so nothing pulled here is
/// echoed back. Remote failures are returned as `TeamSyncError::Hydration`.
pub async fn hydrate<L, R>(store: &SyncedStore<L, R>, team: &TeamCode) -> Result<HydrationOutcome>
where
    L: LocalStore,
    R: RemoteStore + 'static,
{
    let collection = store.mapper().team_data(team);
    let docs = store
        .remote()
        .list(&collection)
        .await
        .map_err(|source| TeamSyncError::Hydration {
            team: team.clone(),
            source,
        })?;

    let records: HashMap<TrackedKey, Value> = docs
        .into_iter()
        .filter_map(|(id, doc)| TrackedKey::from_document_name(&id).map(|key| (key, doc)))
        .collect();

    if records.is_empty() {
        return push_local(store, team).await;
    }

    let mut applied = 0;
    let mut cleared = 0;
    for key in TrackedKey::ALL {
        let value = match records.get(&key) {
            Some(doc) => match key.decode(doc) {
                Ok(value) => value,
                Err(e) => {
                    warn!(
                        "Ignoring malformed {} record for team {}: {}",
                        key.document_name(),
                        team,
                        e
                    );
                    continue;
                }
            },
            None => None,
        };

        if store.write_suppressed(key, value.as_deref())? {
            match value {
                Some(_) => applied += 1,
                None => cleared += 1,
            }
        }
    }

    info!(
        "Hydrated team {} from remote ({} applied, {} cleared)",
        team, applied, cleared
    );
    store.refresh();
    Ok(HydrationOutcome::Pulled { applied, cleared })
}

async fn push_local<L, R>(store: &SyncedStore<L, R>, team: &TeamCode) -> Result<HydrationOutcome>
where
    L: LocalStore,
    R: RemoteStore + 'static,
{
    let now = now_ms();
    let mut batch = WriteBatch::new();
    for key in TrackedKey::ALL {
        let Some(value) = store.raw().get(key.local_key())? else {
            continue;
        };
        match key.encode(&value, now) {
            Ok(doc) => {
                batch.set(store.mapper().record(team, key), doc);
            }
            Err(e) => warn!("Not seeding {} for team {}: {}", key.document_name(), team, e),
        }
    }

    let records = batch.len();
    if records == 0 {
        debug!("Team {} is empty and so is this device", team);
        return Ok(HydrationOutcome::Pushed { records });
    }

    store
        .remote()
        .commit(batch)
        .await
        .map_err(|source| TeamSyncError::Hydration {
            team: team.clone(),
            source,
        })?;
    info!("Seeded team {} with {} local records", team, records);
    Ok(HydrationOutcome::Pushed { records })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::mapper::RemoteMapper;
    use crate::remote::InMemoryRemote;
    use crate::store::InMemoryStore;
    use crate::tracked::{GAMES_KEY, ROSTER_KEY, TEAM_NAME_KEY};
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn team() -> TeamCode {
        "HAWK23".parse().unwrap()
    }

    fn setup(
        local: &[(&str, &str)],
    ) -> (SyncedStore<InMemoryStore, InMemoryRemote>, Arc<InMemoryRemote>) {
        let remote = Arc::new(InMemoryRemote::new());
        let store = SyncedStore::new(
            InMemoryStore::with_entries(local.iter().copied()),
            Arc::clone(&remote),
            RemoteMapper::new(&SyncConfig::default()),
            vec!["roster".to_string()],
        );
        store.install();
        store.set_sync_target(Some(team()));
        (store, remote)
    }

    #[tokio::test]
    async fn test_remote_wins_when_records_exist() {
        let (store, remote) = setup(&[
            (ROSTER_KEY, r#"["A","B"]"#),
            (GAMES_KEY, r#"[{"id":1}]"#),
        ]);
        remote.seed("teams/HAWK23/data/roster", json!({"items": ["C"], "updatedAt": 1}));
        let refreshed = Arc::new(AtomicUsize::new(0));
        let r = Arc::clone(&refreshed);
        store.refresh_hooks().register("roster", move || {
            r.fetch_add(1, Ordering::SeqCst);
        });

        let outcome = hydrate(&store, &team()).await.unwrap();
        store.flush().await;

        assert_eq!(outcome, HydrationOutcome::Pulled { applied: 1, cleared: 1 });
        assert_eq!(store.get(ROSTER_KEY).unwrap().as_deref(), Some(r#"["C"]"#));
        assert!(store.get(GAMES_KEY).unwrap().is_none());
        assert_eq!(refreshed.load(Ordering::SeqCst), 1);
        // Nothing pulled was echoed
        assert_eq!(remote.write_count(), 0);
    }

    #[tokio::test]
    async fn test_first_use_pushes_local_values() {
        let (store, remote) = setup(&[
            (ROSTER_KEY, r#"["A","B"]"#),
            (TEAM_NAME_KEY, "Hawks"),
        ]);

        let outcome = hydrate(&store, &team()).await.unwrap();

        assert_eq!(outcome, HydrationOutcome::Pushed { records: 2 });
        assert_eq!(
            remote.snapshot("teams/HAWK23/data/roster").unwrap()["items"],
            json!(["A", "B"])
        );
        assert_eq!(
            remote.snapshot("teams/HAWK23/data/settings").unwrap()["teamName"],
            "Hawks"
        );
        assert!(remote.snapshot("teams/HAWK23/data/games").is_none());
        assert_eq!(remote.write_count(), 1);
    }

    #[tokio::test]
    async fn test_first_use_skips_malformed_values() {
        let (store, remote) = setup(&[(ROSTER_KEY, "{oops"), (GAMES_KEY, "[]")]);

        let outcome = hydrate(&store, &team()).await.unwrap();

        assert_eq!(outcome, HydrationOutcome::Pushed { records: 1 });
        assert!(remote.snapshot("teams/HAWK23/data/roster").is_none());
        assert!(remote.snapshot("teams/HAWK23/data/games").is_some());
    }

    #[tokio::test]
    async fn test_untracked_documents_do_not_count_as_records() {
        let (store, remote) = setup(&[(GAMES_KEY, "[]")]);
        remote.seed("teams/HAWK23/data/notes", json!({"text": "hi"}));

        let outcome = hydrate(&store, &team()).await.unwrap();
        assert_eq!(outcome.mode(), "push");
    }

    #[tokio::test]
    async fn test_failure_is_reported_and_leaves_local_alone() {
        let (store, remote) = setup(&[(ROSTER_KEY, "[1]")]);
        remote.set_offline(true);

        let err = hydrate(&store, &team()).await.unwrap_err();

        assert!(matches!(err, TeamSyncError::Hydration { .. }));
        assert_eq!(store.get(ROSTER_KEY).unwrap().as_deref(), Some("[1]"));
    }
}
