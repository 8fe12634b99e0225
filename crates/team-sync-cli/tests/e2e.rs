//! End-to-end tests for teamsync.
//!
//! Each device is a JSON file store in its own temp directory; all devices
//! share one document directory standing in for the cloud.

use std::path::Path;
use std::time::Duration;

use team_sync::membership::LEGACY_TEAM_CODE_KEY;
use team_sync::tracked::{GAMES_KEY, ROSTER_KEY, TEAM_NAME_KEY};
use team_sync::{AutoConfirm, LocalStore, StaticIdentity, SyncConfig, TeamSync, UserIdentity};
use team_sync_cli::watcher::read_document;
use team_sync_cli::{DirectoryRemote, JsonFileStore};
use tempfile::TempDir;
use tokio::time::{sleep, timeout};

type Device = TeamSync<JsonFileStore, DirectoryRemote>;

async fn device(dir: &Path, shared: &Path, uid: &str) -> Device {
    let store = JsonFileStore::open(dir.join("store.json")).expect("Failed to open store");
    let remote = DirectoryRemote::new(shared).with_debounce(Duration::from_millis(50));
    let mut engine = TeamSync::new(store, remote, SyncConfig::default()).with_ui(AutoConfirm);
    engine
        .start(&StaticIdentity(Some(UserIdentity::new(uid))))
        .await
        .expect("Failed to start");
    engine
}

/// Poll the device's local store until `key` holds `expected`.
async fn wait_for(engine: &Device, key: &str, expected: &str) {
    let result = timeout(Duration::from_secs(10), async {
        loop {
            if engine.store().get(key).unwrap().as_deref() == Some(expected) {
                return;
            }
            sleep(Duration::from_millis(50)).await;
        }
    })
    .await;
    assert!(result.is_ok(), "Timed out waiting for {} = {}", key, expected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_two_devices_share_a_team() {
    let shared = TempDir::new().unwrap();
    let dir_a = TempDir::new().unwrap();
    let dir_b = TempDir::new().unwrap();

    let mut coach = device(dir_a.path(), shared.path(), "coach").await;
    coach.store().set(ROSTER_KEY, r#"["Ava","Ben"]"#).unwrap();
    let code = coach.create_team().await.expect("Failed to create team");
    coach.flush().await;
    assert!(shared.path().join("teams").join(code.as_str()).with_extension("json").exists());

    let mut assistant = device(dir_b.path(), shared.path(), "assistant").await;
    assistant.store().set(ROSTER_KEY, r#"["Old"]"#).unwrap();
    let membership = assistant
        .join_team(code.as_str())
        .await
        .expect("Failed to join team");
    assert_eq!(membership.code, code);
    assert_eq!(
        assistant.store().get(ROSTER_KEY).unwrap().as_deref(),
        Some(r#"["Ava","Ben"]"#)
    );
    assert!(assistant.is_syncing());

    // Give the watchers a moment to register before the first change
    sleep(Duration::from_millis(300)).await;

    let games = r#"[{"id":"g1","opponent":"Eagles"}]"#;
    coach.store().set(GAMES_KEY, games).unwrap();
    coach.flush().await;

    wait_for(&assistant, GAMES_KEY, games).await;

    // And back the other way
    assistant.store().set(ROSTER_KEY, r#"["Ava","Ben","Cal"]"#).unwrap();
    assistant.flush().await;

    wait_for(&coach, ROSTER_KEY, r#"["Ava","Ben","Cal"]"#).await;

    coach.shutdown().await;
    assistant.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_new_device_recovers_memberships_from_profile() {
    let shared = TempDir::new().unwrap();
    let phone = TempDir::new().unwrap();
    let tablet = TempDir::new().unwrap();

    let mut first = device(phone.path(), shared.path(), "coach").await;
    first.store().set(ROSTER_KEY, r#"["Ava"]"#).unwrap();
    let code = first.create_team().await.unwrap();
    first.shutdown().await;

    let mut second = device(tablet.path(), shared.path(), "coach").await;

    assert_eq!(second.active_code(), Some(code.clone()));
    assert_eq!(second.memberships().len(), 1);
    assert!(second.is_syncing());
    assert_eq!(
        second.store().get(ROSTER_KEY).unwrap().as_deref(),
        Some(r#"["Ava"]"#)
    );

    second.shutdown().await;
}

#[tokio::test]
async fn test_signed_out_device_stays_local() {
    let shared = TempDir::new().unwrap();
    let dir = TempDir::new().unwrap();

    let store = JsonFileStore::open(dir.path().join("store.json")).unwrap();
    let remote = DirectoryRemote::new(shared.path());
    let mut engine = TeamSync::new(store, remote, SyncConfig::default());
    engine.start(&StaticIdentity(None)).await.unwrap();

    engine.store().set(ROSTER_KEY, r#"["Solo"]"#).unwrap();
    engine.flush().await;

    assert!(!engine.is_syncing());
    assert!(engine.create_team().await.is_err());
    assert!(std::fs::read_dir(shared.path()).unwrap().next().is_none());
    engine.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_migrating_start_keeps_identity_and_teams_in_profile() {
    for _ in 0..10 {
        let shared = TempDir::new().unwrap();
        let dir = TempDir::new().unwrap();

        let store = JsonFileStore::open(dir.path().join("store.json")).unwrap();
        store.set(LEGACY_TEAM_CODE_KEY, "HAWK23").unwrap();
        store.set(TEAM_NAME_KEY, "Hawks").unwrap();
        let remote = DirectoryRemote::new(shared.path());
        let mut engine = TeamSync::new(store, remote, SyncConfig::default());
        let identity = UserIdentity {
            display_name: Some("Coach".to_string()),
            email: Some("coach@team.org".to_string()),
            ..UserIdentity::new("coach")
        };
        engine.start(&StaticIdentity(Some(identity))).await.unwrap();
        engine.shutdown().await;

        let profile = read_document(&shared.path().join("users/coach.json"))
            .unwrap()
            .expect("profile written");
        assert_eq!(profile["displayName"], "Coach");
        assert_eq!(profile["email"], "coach@team.org");
        assert_eq!(profile["activeTeam"], "HAWK23");
        assert_eq!(profile["teams"][0]["code"], "HAWK23");
    }
}
