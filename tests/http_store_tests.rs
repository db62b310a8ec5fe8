#![cfg(feature = "store-http")]
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! `HttpStatusStore` against a mock REST endpoint.

use std::sync::Arc;
use std::time::Duration;

use game_status_client::{
    ControllerConfig, GameStatus, GameStatusController, HttpStatusStore, HttpStoreConfig,
    Identity, SessionStore, StatusEvent, StatusRecordStore, StatusState, StoreError, UserId,
};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn store_for(server: &MockServer) -> HttpStatusStore {
    HttpStatusStore::new(HttpStoreConfig::new(server.uri())).unwrap()
}

fn user() -> UserId {
    UserId::Numeric(42)
}

// ════════════════════════════════════════════════════════════════════
// Fetch
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn fetch_returns_first_record() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/games/42/1942"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"game_id": 1942, "user_id": 42, "current_status": 1},
            {"game_id": 1942, "user_id": 42, "current_status": 0},
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let record = store_for(&server)
        .fetch_status(&user(), 1942)
        .await
        .unwrap()
        .expect("record");
    assert_eq!(record.current_status, GameStatus::Playing);
    assert_eq!(record.user_id, user());
}

#[tokio::test]
async fn fetch_empty_array_is_untracked() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/games/42/7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    assert_eq!(store_for(&server).fetch_status(&user(), 7).await, Ok(None));
}

#[tokio::test]
async fn fetch_with_text_user_id() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/games/u-abc/3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"game_id": 3, "user_id": "u-abc", "current_status": 2}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let record = store_for(&server)
        .fetch_status(&UserId::from("u-abc"), 3)
        .await
        .unwrap();
    assert_eq!(record.map(|r| r.current_status), Some(GameStatus::Want));
}

#[tokio::test]
async fn text_user_id_stays_in_one_path_segment() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/games/a%2F..%2F..%2Fx/7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"game_id": 7, "user_id": "a/../../x", "current_status": 0}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let record = store_for(&server)
        .fetch_status(&UserId::from("a/../../x"), 7)
        .await
        .unwrap();
    assert_eq!(record.map(|r| r.current_status), Some(GameStatus::Completed));
}

#[tokio::test]
async fn base_url_path_prefix_is_kept() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/games/delete"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let store = HttpStatusStore::new(HttpStoreConfig::new(format!("{}/api/v1/", server.uri())))
        .unwrap();
    store.delete_status(&user(), 1).await.unwrap();
}

#[tokio::test]
async fn malformed_body_is_persistence_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let err = store_for(&server).fetch_status(&user(), 1).await.unwrap_err();
    assert!(matches!(err, StoreError::PersistenceUnavailable(_)), "got {err:?}");
}

#[tokio::test]
async fn unknown_status_code_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"game_id": 1, "user_id": 42, "current_status": 9}
        ])))
        .mount(&server)
        .await;

    let err = store_for(&server).fetch_status(&user(), 1).await.unwrap_err();
    assert!(matches!(err, StoreError::PersistenceUnavailable(_)), "got {err:?}");
}

// ════════════════════════════════════════════════════════════════════
// Mutations
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn upsert_posts_full_record() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/games"))
        .and(body_json(json!({"game_id": 1942, "user_id": 42, "current_status": 2})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let record = store_for(&server)
        .upsert_status(&user(), 1942, GameStatus::Want)
        .await
        .unwrap();
    assert_eq!(record.current_status, GameStatus::Want);
    assert_eq!(record.game_id, 1942);
}

#[tokio::test]
async fn delete_posts_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/games/delete"))
        .and(body_json(json!({"game_id": 1942, "user_id": 42})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    store_for(&server).delete_status(&user(), 1942).await.unwrap();
}

#[tokio::test]
async fn delete_of_absent_record_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/games/delete"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    assert_eq!(store_for(&server).delete_status(&user(), 5).await, Ok(()));
}

// ════════════════════════════════════════════════════════════════════
// Errors and auth
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn rejected_credentials_are_unauthorized() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = store_for(&server)
        .upsert_status(&user(), 1, GameStatus::Playing)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Unauthorized(_)), "got {err:?}");
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn server_error_is_retryable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = store_for(&server).delete_status(&user(), 1).await.unwrap_err();
    assert!(matches!(err, StoreError::PersistenceUnavailable(_)), "got {err:?}");
    assert!(err.is_retryable());
}

#[tokio::test]
async fn unreachable_endpoint_is_persistence_unavailable() {
    let config = HttpStoreConfig::new("http://127.0.0.1:1")
        .with_request_timeout(Duration::from_millis(500));
    let store = HttpStatusStore::new(config).unwrap();

    let err = store.fetch_status(&user(), 1).await.unwrap_err();
    assert!(matches!(err, StoreError::PersistenceUnavailable(_)), "got {err:?}");
}

#[tokio::test]
async fn bearer_token_is_sent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(header("authorization", "Bearer s3cret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let config = HttpStoreConfig::new(format!("{}/", server.uri())).with_bearer_token("s3cret");
    let store = HttpStatusStore::new(config).unwrap();
    assert_eq!(store.fetch_status(&user(), 1).await, Ok(None));
}

// ════════════════════════════════════════════════════════════════════
// End to end
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn controller_over_http_store() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/games/42/1942"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/games"))
        .and(body_json(json!({"game_id": 1942, "user_id": 42, "current_status": 1})))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let session = SessionStore::new();
    session.sign_in(Identity::new(42_u64));
    let store: Arc<dyn StatusRecordStore> = Arc::new(store_for(&server));
    let (mut controller, mut events) =
        GameStatusController::start(store, session.reader(), 1942, ControllerConfig::new());

    controller.load().unwrap();
    let mut seen = Vec::new();
    controller_events_until(&mut events, &mut seen, |ev| {
        *ev == StatusEvent::StateChanged {
            state: StatusState::Untracked,
        }
    })
    .await;

    controller.add(GameStatus::Playing).unwrap();
    controller_events_until(&mut events, &mut seen, |ev| {
        matches!(ev, StatusEvent::MutationFailed { .. })
    })
    .await;

    assert_eq!(controller.state(), StatusState::Untracked);
    assert!(seen.contains(&StatusEvent::StateChanged {
        state: StatusState::Tracked(GameStatus::Playing)
    }));
    controller.shutdown().await;
}

async fn controller_events_until(
    events: &mut tokio::sync::mpsc::Receiver<StatusEvent>,
    seen: &mut Vec<StatusEvent>,
    stop: impl Fn(&StatusEvent) -> bool,
) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(ev) = events.recv().await {
            let done = stop(&ev);
            seen.push(ev);
            if done {
                return;
            }
        }
        panic!("event channel closed early");
    })
    .await
    .expect("timed out waiting for event");
}
