use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use reserva_api::{app, AppState};
use reserva_core::cache::{AtomicCache, InMemoryCache};
use reserva_core::repository::{BookingStore, InMemoryBookingStore};
use reserva_store::BookingRules;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::util::ServiceExt;

struct TestApp {
    app: Router,
    store: Arc<InMemoryBookingStore>,
}

fn test_app() -> TestApp {
    let cache: Arc<dyn AtomicCache> = Arc::new(InMemoryCache::new());
    let store = Arc::new(InMemoryBookingStore::new());
    let state = AppState::new(
        cache,
        store.clone() as Arc<dyn BookingStore>,
        BookingRules::default(),
    );
    TestApp {
        app: app(state),
        store,
    }
}

fn payload(user: &str, resource: &str, date: &str) -> Value {
    json!({ "userId": user, "resourceId": resource, "date": date })
}

async fn post_booking(
    app: &Router,
    body: &Value,
    idempotency_key: Option<&str>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/bookings")
        .header("content-type", "application/json");
    if let Some(key) = idempotency_key {
        builder = builder.header("idempotency-key", key);
    }
    let request = builder
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn create_booking_returns_201() {
    let t = test_app();
    let (status, body) =
        post_booking(&t.app, &payload("user_alice", "room_A", "2026-02-15"), None).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    assert_eq!(body["booking"]["userId"], "user_alice");
    assert_eq!(body["booking"]["resourceId"], "room_A");
    assert_eq!(body["booking"]["status"], "confirmed");
    assert_eq!(t.store.len(), 1);
}

#[tokio::test]
async fn repeated_idempotency_key_replays_booking() {
    let t = test_app();
    let body = payload("user_alice", "room_A", "2026-02-15");

    let (first_status, first) = post_booking(&t.app, &body, Some("idem_repeat_key")).await;
    assert_eq!(first_status, StatusCode::CREATED);

    let (second_status, second) = post_booking(&t.app, &body, Some("idem_repeat_key")).await;
    assert_eq!(second_status, StatusCode::CREATED);
    assert_eq!(second["booking"]["id"], first["booking"]["id"]);
    assert_eq!(t.store.len(), 1);
}

#[tokio::test]
async fn changed_payload_with_same_key_replays_original() {
    let t = test_app();
    let (_, first) = post_booking(
        &t.app,
        &payload("user_alice", "room_A", "2026-02-15"),
        Some("idem_payload_change"),
    )
    .await;

    let (status, second) = post_booking(
        &t.app,
        &payload("user_alice", "room_B", "2026-02-15"),
        Some("idem_payload_change"),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(second["booking"]["id"], first["booking"]["id"]);
    assert_eq!(second["booking"]["resourceId"], "room_A");
    assert_eq!(t.store.len(), 1);
}

#[tokio::test]
async fn identical_payloads_without_header_deduplicate() {
    let t = test_app();
    let body = payload("user_alice", "room_A", "2026-02-15");

    let (_, first) = post_booking(&t.app, &body, None).await;
    let (status, second) = post_booking(&t.app, &body, None).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(second["booking"]["id"], first["booking"]["id"]);
    assert_eq!(t.store.len(), 1);
}

#[tokio::test]
async fn taken_slot_returns_already_booked() {
    let t = test_app();
    post_booking(&t.app, &payload("user_alice", "room_A", "2026-02-15"), None).await;

    let (status, body) =
        post_booking(&t.app, &payload("user_bob", "room_A", "2026-02-15"), None).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "ALREADY_BOOKED");
    assert_eq!(t.store.len(), 1);
}

#[tokio::test]
async fn invalid_date_is_rejected() {
    let t = test_app();
    let (status, body) =
        post_booking(&t.app, &payload("user_alice", "room_A", "2026/02/15"), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "date must be in YYYY-MM-DD format");

    let (status, _) =
        post_booking(&t.app, &payload("user_alice", "room_A", "2026-2-15"), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(t.store.is_empty());
}

#[tokio::test]
async fn missing_user_id_is_rejected() {
    let t = test_app();
    let (status, body) = post_booking(&t.app, &payload("", "room_A", "2026-02-15"), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "userId is required");
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_requests_allow_exactly_one_booking() {
    let t = test_app();

    let mut handles = Vec::new();
    for i in 0..8 {
        let app = t.app.clone();
        handles.push(tokio::spawn(async move {
            let body = payload(&format!("user_{i}"), "room_A", "2026-02-15");
            post_booking(&app, &body, Some(&format!("key_{i}"))).await
        }));
    }

    let mut created = 0;
    for handle in handles {
        let (status, body) = handle.await.unwrap();
        if status == StatusCode::CREATED {
            created += 1;
        } else {
            assert_eq!(status, StatusCode::CONFLICT);
            assert!(
                body["code"] == "RESOURCE_LOCKED" || body["code"] == "ALREADY_BOOKED",
                "unexpected conflict body: {body}"
            );
        }
    }

    assert_eq!(created, 1);
    assert_eq!(t.store.len(), 1);
}

#[tokio::test]
async fn cancelled_booking_frees_the_slot() {
    let t = test_app();
    let (_, created) =
        post_booking(&t.app, &payload("user_alice", "room_A", "2026-02-15"), None).await;
    let booking_id = created["booking"]["id"].as_str().unwrap().to_string();

    let request = Request::builder()
        .method("PATCH")
        .uri(format!("/api/bookings/{booking_id}/cancel"))
        .header("content-type", "application/json")
        .body(Body::from(
            serde_json::to_vec(&json!({ "userId": "user_alice" })).unwrap(),
        ))
        .unwrap();
    let response = t.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let (status, _) = post_booking(
        &t.app,
        &payload("user_bob", "room_A", "2026-02-15"),
        Some("fresh_key"),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn list_returns_only_the_users_confirmed_bookings() {
    let t = test_app();
    post_booking(&t.app, &payload("user_alice", "room_A", "2026-02-15"), None).await;
    post_booking(&t.app, &payload("user_alice", "room_B", "2026-02-16"), None).await;
    post_booking(&t.app, &payload("user_bob", "room_C", "2026-02-15"), None).await;

    let (status, body) = get_json(&t.app, "/api/bookings/user_alice").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["bookings"].as_array().unwrap().len(), 2);

    let (_, filtered) = get_json(&t.app, "/api/bookings/user_alice?resourceId=room_A").await;
    assert_eq!(filtered["bookings"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn available_resources_excludes_booked_slots() {
    let t = test_app();
    post_booking(&t.app, &payload("user_alice", "room_A", "2026-02-15"), None).await;

    let (status, body) = get_json(&t.app, "/api/resources/available?date=2026-02-15").await;
    assert_eq!(status, StatusCode::OK);
    let available = body["availableResources"].as_array().unwrap();
    assert!(!available.iter().any(|r| r == "room_A"));
    assert!(available.iter().any(|r| r == "room_B"));

    let (status, _) = get_json(&t.app, "/api/resources/available").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn health_endpoints_respond_ok() {
    let t = test_app();
    for uri in ["/health", "/api/health", "/api/health-cache", "/api/health-db"] {
        let (status, body) = get_json(&t.app, uri).await;
        assert_eq!(status, StatusCode::OK, "uri: {uri}");
        assert_eq!(body["status"], "ok");
    }
}
