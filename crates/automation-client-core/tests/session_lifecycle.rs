mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use automation_client_core::{
    CapabilityRoute, FileSessionStorage, FrontendPermission, MemorySessionStorage,
    NotificationCenter, PermissionGrant, PersistedSession, SessionPhase, SessionStorage,
    SessionStore,
};
use chrono::{TimeDelta, Utc};
use common::{FakeApi, PASSWORD, live_token, token_expiring_at, user};
use tokio::sync::Semaphore;

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition reached in time");
}

fn bearer(api: &FakeApi) -> Option<String> {
    api.token.lock().expect("token lock").clone()
}

fn permissions_held() -> FakeApi {
    FakeApi {
        permission_gate: Semaphore::new(0),
        ..FakeApi::new()
    }
}

fn login_held() -> FakeApi {
    FakeApi {
        login_gate: Semaphore::new(0),
        ..FakeApi::new()
    }
}

fn stored(token: String) -> Arc<MemorySessionStorage> {
    let storage = Arc::new(MemorySessionStorage::new());
    storage
        .persist_session(&PersistedSession {
            user: user("u-1"),
            token,
        })
        .expect("persist");
    storage
}

#[tokio::test]
async fn restore_with_live_token_authenticates_then_loads_permissions() {
    let api = Arc::new(FakeApi::new());
    let token = live_token();
    let store = SessionStore::restore(api.clone(), stored(token.clone()), NotificationCenter::new());

    let snapshot = store.snapshot();
    assert_eq!(snapshot.phase, SessionPhase::Authenticated);
    assert_eq!(snapshot.token.as_deref(), Some(token.as_str()));
    assert_eq!(bearer(&api), Some(token));

    wait_until(|| store.has_permission(FrontendPermission::BACKUPS_WRITE)).await;
    assert!(store.has_permission(FrontendPermission::BACKUPS_READ));
    assert!(!store.has_permission(FrontendPermission::USERS_READ));
}

#[tokio::test]
async fn restore_with_expired_token_is_anonymous_and_keeps_storage() {
    let api = Arc::new(FakeApi::new());
    let expired = (Utc::now() - TimeDelta::minutes(1)).timestamp();
    let storage = stored(token_expiring_at(expired));
    let store = SessionStore::restore(api.clone(), storage.clone(), NotificationCenter::new());

    assert_eq!(store.snapshot().phase, SessionPhase::Anonymous);
    assert!(bearer(&api).is_none());
    assert!(storage.raw().is_some());
    assert_eq!(api.permission_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn restore_treats_corrupt_or_partial_records_as_anonymous() {
    for raw in ["{}", "not json", r#"{"user":{"id":""},"token":"a.b.c"}"#] {
        let storage = Arc::new(MemorySessionStorage::with_raw(raw));
        let store = SessionStore::restore(
            Arc::new(FakeApi::new()),
            storage.clone(),
            NotificationCenter::new(),
        );
        assert_eq!(store.snapshot().phase, SessionPhase::Anonymous, "raw: {raw}");
        assert_eq!(storage.raw().as_deref(), Some(raw));
    }
}

#[tokio::test]
async fn login_persists_to_file_and_survives_restore() {
    let temp_dir = tempfile::tempdir().expect("tempdir");
    let storage = Arc::new(FileSessionStorage::new(temp_dir.path().join("session.json")));
    let api = Arc::new(FakeApi::new());

    let store = SessionStore::new(api.clone(), storage.clone(), NotificationCenter::new());
    assert!(store.login("  ADA@home.example", PASSWORD).await);
    assert_eq!(store.snapshot().phase, SessionPhase::Authenticated);
    assert!(bearer(&api).is_some());

    let persisted = storage.load_session().expect("load").expect("session");
    assert_eq!(persisted.user.email, "ada@home.example");

    let restored = SessionStore::restore(api, storage, NotificationCenter::new());
    assert!(restored.is_authenticated());
}

#[tokio::test]
async fn failed_login_notifies_and_persists_nothing() {
    let storage = Arc::new(MemorySessionStorage::new());
    let notifications = NotificationCenter::new();
    let api = Arc::new(FakeApi::new());
    let store = SessionStore::new(api.clone(), storage.clone(), notifications.clone());

    assert!(!store.login("ada@home.example", "wrong").await);
    assert_eq!(store.snapshot().phase, SessionPhase::Anonymous);
    assert!(storage.raw().is_none());
    assert!(bearer(&api).is_none());

    let queue = notifications.snapshot();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].title, "Login Error");
    assert_eq!(queue[0].message, "Invalid email or password");
}

#[tokio::test]
async fn logout_discards_refresh_in_flight() {
    let api = Arc::new(permissions_held());
    let storage = Arc::new(MemorySessionStorage::new());
    let store = SessionStore::new(api.clone(), storage.clone(), NotificationCenter::new());

    assert!(store.login("ada@home.example", PASSWORD).await);
    let pending = store.spawn_permission_refresh().expect("runtime");
    wait_until(|| api.permission_calls.load(Ordering::SeqCst) >= 1).await;

    store.logout();
    store.logout();
    api.permission_gate.add_permits(2);

    assert!(!pending.await.expect("join"));
    let snapshot = store.snapshot();
    assert_eq!(snapshot.phase, SessionPhase::Anonymous);
    assert!(snapshot.permissions.is_empty());
    assert!(storage.raw().is_none());
    assert!(bearer(&api).is_none());
}

#[tokio::test]
async fn logout_during_login_leaves_nothing_to_restore() {
    let api = Arc::new(login_held());
    let storage = Arc::new(MemorySessionStorage::new());
    let store = SessionStore::new(api.clone(), storage.clone(), NotificationCenter::new());

    let pending = tokio::spawn({
        let store = store.clone();
        async move { store.login("ada@home.example", PASSWORD).await }
    });
    wait_until(|| api.login_calls.load(Ordering::SeqCst) >= 1).await;
    store.logout();
    api.login_gate.add_permits(1);

    assert!(!pending.await.expect("join"));
    assert_eq!(store.snapshot().phase, SessionPhase::Anonymous);
    assert!(storage.raw().is_none());
    assert!(bearer(&api).is_none());

    let restarted = SessionStore::restore(api.clone(), storage, NotificationCenter::new());
    assert!(!restarted.is_authenticated());
    assert!(bearer(&api).is_none());
}

#[tokio::test]
async fn rejected_relogin_keeps_session_token_and_storage_aligned() {
    let api = Arc::new(FakeApi::new());
    let storage = Arc::new(MemorySessionStorage::new());
    let notifications = NotificationCenter::new();
    let store = SessionStore::new(api.clone(), storage.clone(), notifications.clone());
    assert!(store.login("ada@home.example", PASSWORD).await);
    let token = bearer(&api);
    assert!(token.is_some());

    assert!(!store.login("ada@home.example", "wrong").await);
    let snapshot = store.snapshot();
    assert_eq!(snapshot.phase, SessionPhase::Authenticated);
    assert_eq!(snapshot.token, token);
    assert_eq!(bearer(&api), token);
    let persisted = storage.load_session().expect("load").expect("session");
    assert_eq!(Some(persisted.token), token);
    assert!(store.is_authenticated());
    assert_eq!(
        notifications.snapshot().last().map(|note| note.title.clone()),
        Some("Login Error".to_string())
    );
}

#[tokio::test]
async fn refresh_from_previous_login_is_dropped() {
    let api = Arc::new(permissions_held());
    let store = SessionStore::new(
        api.clone(),
        Arc::new(MemorySessionStorage::new()),
        NotificationCenter::new(),
    );

    assert!(store.login("ada@home.example", PASSWORD).await);
    let stale = store.spawn_permission_refresh().expect("runtime");
    wait_until(|| api.permission_calls.load(Ordering::SeqCst) >= 2).await;

    *api.grants.lock().expect("grants lock") = vec![PermissionGrant {
        routes: vec![CapabilityRoute::new("/meal", ["GET"])],
    }];
    assert!(store.login("ada@home.example", PASSWORD).await);
    api.permission_gate.add_permits(8);

    assert!(!stale.await.expect("join"));
    assert!(store.refresh_permissions().await);
    assert!(store.has_permission(FrontendPermission::MEAL_READ));
    assert!(!store.has_permission(FrontendPermission::BACKUPS_READ));
}

#[tokio::test]
async fn failed_refresh_keeps_permissions_and_notifies() {
    let api = Arc::new(FakeApi::new());
    let notifications = NotificationCenter::new();
    let store = SessionStore::new(
        api.clone(),
        Arc::new(MemorySessionStorage::new()),
        notifications.clone(),
    );
    assert!(store.login("ada@home.example", PASSWORD).await);
    assert!(store.refresh_permissions().await);
    let before = store.snapshot().permissions.clone();
    assert!(!before.is_empty());

    *api.permissions_fail.lock().expect("fail lock") = true;
    assert!(!store.refresh_permissions().await);
    assert_eq!(store.snapshot().permissions, before);
    assert!(
        notifications
            .snapshot()
            .iter()
            .any(|note| note.title == "Permission Error")
    );
}

#[tokio::test]
async fn unknown_domains_do_not_affect_other_routes() {
    let api = Arc::new(FakeApi::new());
    *api.grants.lock().expect("grants lock") = vec![PermissionGrant {
        routes: vec![
            CapabilityRoute::new("/garage", ["GET", "POST"]),
            CapabilityRoute::new("/finance/accounts", ["get"]),
        ],
    }];
    let store = SessionStore::new(
        api,
        Arc::new(MemorySessionStorage::new()),
        NotificationCenter::new(),
    );
    assert!(store.login("ada@home.example", PASSWORD).await);
    assert!(store.refresh_permissions().await);

    let permissions: Vec<_> = store.snapshot().permissions.iter().collect();
    assert_eq!(permissions, vec![FrontendPermission::FINANCE_READ]);
}

#[tokio::test]
async fn expired_session_is_demoted_lazily() {
    let api = Arc::new(FakeApi::new());
    let exp = (Utc::now() + TimeDelta::minutes(5)).timestamp();
    *api.login_token.lock().expect("login token lock") = token_expiring_at(exp);
    let storage = Arc::new(MemorySessionStorage::new());
    let store = SessionStore::new(api.clone(), storage.clone(), NotificationCenter::new());
    assert!(store.login("ada@home.example", PASSWORD).await);

    let later = Utc::now() + TimeDelta::minutes(10);
    assert!(!store.is_authenticated_at(later));
    assert_eq!(store.snapshot().phase, SessionPhase::Anonymous);
    assert!(bearer(&api).is_none());
    assert!(storage.raw().is_some());
}
