//! Session controller behaviour against fault-injecting stores

mod common;

use common::{init_logging, FaultyStore, Op};
use edulink_core::{ROLE_KEY, SESSION_KEYS, TOKEN_KEY, USER_ID_KEY};
use edulink_session::{
    route, select, EdulinkError, FileStore, KeyValueStore, MemoryStore, Role, ScreenGraph, Session,
    SessionController, SessionState, Transition,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

fn recorder(controller: &SessionController) -> (Arc<Mutex<Vec<Session>>>, edulink_session::Subscription) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let subscription = controller.subscribe(move |session| sink.lock().unwrap().push(session.clone()));
    (seen, subscription)
}

#[tokio::test]
async fn test_new_controller_is_bootstrapping() {
    let controller = SessionController::new(Arc::new(MemoryStore::new()));
    assert_eq!(controller.state(), SessionState::Bootstrapping);
    assert!(controller.snapshot().is_bootstrapping());
    assert!(!controller.is_authenticated());
}

#[tokio::test]
async fn test_restore_determinism() {
    init_logging();

    let tokens = [None, Some("tok")];
    let roles = [None, Some("parent"), Some("teacher"), Some("administrator")];

    for token in tokens {
        for role in roles {
            let store = MemoryStore::new();
            if let Some(token) = token {
                store.set(TOKEN_KEY, token).await.unwrap();
            }
            if let Some(role) = role {
                store.set(ROLE_KEY, role).await.unwrap();
            }
            store.set(USER_ID_KEY, "42").await.unwrap();

            let controller = SessionController::bootstrap(Arc::new(store)).await;
            let session = controller.snapshot();
            assert!(!session.is_bootstrapping());

            let valid_role = matches!(role, Some("parent") | Some("teacher"));
            if token.is_some() && valid_role {
                let expected = Role::from(role.unwrap());
                assert_eq!(session.state(), SessionState::Authenticated(expected));
                assert_eq!(session.user_id(), Some("42"));
            } else {
                assert_eq!(
                    session,
                    Session::unauthenticated(),
                    "token={:?} role={:?}",
                    token,
                    role
                );
            }
        }
    }
}

#[tokio::test]
async fn test_restore_failure_safety() {
    init_logging();

    for key in [TOKEN_KEY, ROLE_KEY, USER_ID_KEY] {
        let store = FaultyStore::with_entries([
            (TOKEN_KEY, "tok"),
            (ROLE_KEY, "teacher"),
            (USER_ID_KEY, "7"),
        ]);
        store.fail(Op::Get, key);

        let controller = SessionController::new(Arc::new(store));
        let (seen, _subscription) = recorder(&controller);

        let restored = controller.restore().await;
        assert_eq!(restored, Session::unauthenticated());
        assert_eq!(controller.state(), SessionState::Unauthenticated);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }
}

#[tokio::test]
async fn test_sign_in_round_trip() {
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());

    let controller = SessionController::bootstrap(Arc::clone(&store)).await;
    controller
        .sign_in("tok123", "parent", Some("42".to_string()))
        .await
        .unwrap();
    assert_eq!(route(&controller.snapshot()), ScreenGraph::Parent);

    // Simulated restart against the same store
    let restarted = SessionController::bootstrap(store).await;
    let session = restarted.snapshot();
    assert_eq!(session.token(), Some("tok123"));
    assert_eq!(session.role(), Some(&Role::Parent));
    assert_eq!(session.user_id(), Some("42"));
}

#[tokio::test]
async fn test_file_store_session_survives_restart() {
    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().join("session.json");

    let controller = SessionController::new(Arc::new(FileStore::new(&path).unwrap()));
    controller
        .sign_in("tok-file", Role::Teacher, Some("t-9".to_string()))
        .await
        .unwrap();
    drop(controller);

    let restarted = SessionController::bootstrap(Arc::new(FileStore::new(&path).unwrap())).await;
    assert_eq!(restarted.state(), SessionState::Authenticated(Role::Teacher));
    assert_eq!(restarted.snapshot().user_id(), Some("t-9"));

    restarted.sign_out().await;
    let reopened = SessionController::bootstrap(Arc::new(FileStore::new(&path).unwrap())).await;
    assert_eq!(reopened.state(), SessionState::Unauthenticated);
}

#[tokio::test]
async fn test_sign_out_clears_storage() {
    let store = Arc::new(FaultyStore::new());

    let controller = SessionController::bootstrap(store.clone()).await;
    controller
        .sign_in("tok123", Role::Teacher, Some("42".to_string()))
        .await
        .unwrap();
    controller.sign_out().await;

    for key in SESSION_KEYS {
        assert_eq!(store.raw(key).await, None, "{key} left behind");
    }

    let restarted = SessionController::bootstrap(store).await;
    let session = restarted.snapshot();
    assert_eq!(session.state(), SessionState::Unauthenticated);
    assert_eq!(session.token(), None);
    assert_eq!(session.role(), None);
    assert_eq!(session.user_id(), None);
}

#[tokio::test]
async fn test_unrecognized_role_routes_unauthenticated() {
    let controller = SessionController::bootstrap(Arc::new(MemoryStore::new())).await;

    // The controller accepts the role; routing refuses to honour it
    let session = assert_ok!(controller.sign_in("tok", "administrator", None).await);
    assert_eq!(session.token(), Some("tok"));
    assert_eq!(route(&session), ScreenGraph::Unauthenticated);
    assert_eq!(session.state(), SessionState::Unauthenticated);
    assert_eq!(controller.state(), SessionState::Unauthenticated);
    assert!(!controller.is_authenticated());
}

#[tokio::test]
async fn test_notification_cardinality() {
    let controller = SessionController::new(Arc::new(MemoryStore::new()));
    let (seen, _subscription) = recorder(&controller);

    controller.restore().await;
    assert_eq!(seen.lock().unwrap().len(), 1);
    assert_eq!(seen.lock().unwrap()[0], Session::unauthenticated());

    controller
        .sign_in("tok", Role::Parent, Some("1".to_string()))
        .await
        .unwrap();
    assert_eq!(seen.lock().unwrap().len(), 2);
    assert_eq!(
        seen.lock().unwrap()[1],
        Session::authenticated("tok", Role::Parent, Some("1".to_string()))
    );

    controller.sign_out().await;
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 3);
    assert_eq!(seen[2], Session::signed_out());
    assert_eq!(seen[2], controller.snapshot());
}

#[tokio::test]
async fn test_sign_out_is_idempotent() {
    let controller = SessionController::bootstrap(Arc::new(MemoryStore::new())).await;
    assert_ok!(controller.sign_in("tok", Role::Teacher, None).await);
    let (seen, _subscription) = recorder(&controller);

    let first = controller.sign_out().await;
    assert_eq!(seen.lock().unwrap().len(), 1);

    let second = controller.sign_out().await;
    assert_eq!(first, second);
    assert_eq!(controller.state(), SessionState::Unauthenticated);

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[1], Session::signed_out());
}

#[tokio::test]
async fn test_empty_token_is_rejected_without_side_effects() {
    let store = Arc::new(FaultyStore::new());
    let controller = SessionController::bootstrap(store.clone()).await;
    let (seen, _subscription) = recorder(&controller);

    let error = assert_err!(
        controller
            .sign_in("  ", Role::Parent, Some("1".to_string()))
            .await
    );
    assert!(matches!(error, EdulinkError::Validation { .. }));
    assert!(seen.lock().unwrap().is_empty());
    assert_eq!(store.raw(ROLE_KEY).await, None);
    assert_eq!(controller.state(), SessionState::Unauthenticated);
}

#[tokio::test]
async fn test_sign_in_persists_best_effort() {
    init_logging();

    let store = Arc::new(FaultyStore::new());
    store.fail(Op::Set, TOKEN_KEY);

    let controller = SessionController::bootstrap(store.clone()).await;
    let session = controller
        .sign_in("tok", Role::Teacher, Some("9".to_string()))
        .await
        .unwrap();

    // The in-memory transition happens regardless
    assert_eq!(session.state(), SessionState::Authenticated(Role::Teacher));
    // The other keys were still attempted
    assert_eq!(store.raw(TOKEN_KEY).await, None);
    assert_eq!(store.raw(ROLE_KEY).await.as_deref(), Some("teacher"));
    assert_eq!(store.raw(USER_ID_KEY).await.as_deref(), Some("9"));

    // Without the token the session does not survive a restart
    store.heal();
    let restarted = SessionController::bootstrap(store).await;
    assert_eq!(restarted.state(), SessionState::Unauthenticated);
}

#[tokio::test]
async fn test_sign_out_removes_best_effort() {
    let store = Arc::new(FaultyStore::new());
    let controller = SessionController::bootstrap(store.clone()).await;
    controller
        .sign_in("tok", Role::Parent, Some("3".to_string()))
        .await
        .unwrap();

    store.fail(Op::Remove, ROLE_KEY);
    let session = controller.sign_out().await;

    assert_eq!(session, Session::signed_out());
    assert_eq!(store.raw(TOKEN_KEY).await, None);
    assert_eq!(store.raw(USER_ID_KEY).await, None);
    assert_eq!(store.raw(ROLE_KEY).await.as_deref(), Some("parent"));

    // A leftover role without a token restores as signed out
    store.heal();
    let restarted = SessionController::bootstrap(store).await;
    assert_eq!(restarted.snapshot(), Session::unauthenticated());
}

#[tokio::test]
async fn test_sign_in_without_user_id_clears_previous_id() {
    let store = Arc::new(FaultyStore::with_entries([(USER_ID_KEY, "old-user")]));
    let controller = SessionController::bootstrap(store.clone()).await;

    controller.sign_in("tok", Role::Parent, None).await.unwrap();
    assert_eq!(store.raw(USER_ID_KEY).await, None);

    let restarted = SessionController::bootstrap(store).await;
    assert_eq!(restarted.snapshot().user_id(), None);
    assert!(restarted.is_authenticated());
}

#[tokio::test]
async fn test_sign_out_waits_for_inflight_restore() {
    let store = Arc::new(FaultyStore::with_entries([
        (TOKEN_KEY, "tok"),
        (ROLE_KEY, "teacher"),
    ]));
    store.delay_gets(Duration::from_millis(50));

    let controller = SessionController::new(store);
    let (seen, _subscription) = recorder(&controller);

    let (restored, signed_out) = tokio::join!(controller.restore(), async {
        tokio::time::sleep(Duration::from_millis(5)).await;
        controller.sign_out().await
    });

    assert!(restored.is_authenticated());
    assert_eq!(signed_out, Session::signed_out());
    // The later operation wins and notifications arrive in issue order
    assert_eq!(controller.snapshot(), Session::signed_out());
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert!(seen[0].is_authenticated());
    assert!(seen[1].is_signing_out());
}

#[tokio::test]
async fn test_dropping_subscription_stops_notifications() {
    let controller = SessionController::bootstrap(Arc::new(MemoryStore::new())).await;
    let (seen, subscription) = recorder(&controller);
    assert_eq!(controller.subscriber_count(), 1);

    controller.sign_in("tok", Role::Parent, None).await.unwrap();
    subscription.unsubscribe();
    assert_eq!(controller.subscriber_count(), 0);

    controller.sign_out().await;
    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_subscriber_may_subscribe_from_callback() {
    let controller = Arc::new(SessionController::bootstrap(Arc::new(MemoryStore::new())).await);
    let nested = Arc::new(Mutex::new(Vec::new()));

    let inner_controller = Arc::downgrade(&controller);
    let nested_sink = Arc::clone(&nested);
    let _subscription = controller.subscribe(move |_| {
        if let Some(controller) = inner_controller.upgrade() {
            nested_sink
                .lock()
                .unwrap()
                .push(controller.subscribe(|_| {}));
        }
    });

    controller.sign_in("tok", Role::Parent, None).await.unwrap();
    assert_eq!(nested.lock().unwrap().len(), 1);
    assert_eq!(controller.subscriber_count(), 2);
}

#[tokio::test]
async fn test_watch_receives_latest_snapshot() {
    let controller = SessionController::new(Arc::new(MemoryStore::new()));
    let mut receiver = controller.watch();
    assert!(receiver.borrow().is_bootstrapping());

    controller.restore().await;
    receiver.changed().await.unwrap();
    assert_eq!(*receiver.borrow_and_update(), Session::unauthenticated());

    controller.sign_in("tok", Role::Teacher, None).await.unwrap();
    receiver.changed().await.unwrap();
    let selection = select(&receiver.borrow_and_update());
    assert_eq!(selection.graph, ScreenGraph::Teacher);

    controller.sign_out().await;
    receiver.changed().await.unwrap();
    let selection = select(&receiver.borrow_and_update());
    assert_eq!(selection.graph, ScreenGraph::Unauthenticated);
    assert_eq!(selection.transition, Transition::Pop);
}
