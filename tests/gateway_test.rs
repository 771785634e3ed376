// In-process tests of the composed HTTP and WebSocket gateway

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use warp::http::StatusCode;

use ghostbox::config::ServerConfig;
use ghostbox::core::message_types::{ServerPacket, SystemNotice};
use ghostbox::core::server::AppState;
use ghostbox::error::{GhostboxError, Result};
use ghostbox::handlers::routes;
use ghostbox::storage::{Cache, MemoryCache, PushOutcome, SharedCache};

const ADMIN_TOKEN: &str = "test-admin-token-0123456789abcdef";

fn state() -> AppState {
    let cache: SharedCache = Arc::new(MemoryCache::new());
    AppState::new(ServerConfig::for_testing(), cache)
}

/// Cache whose every call fails the way an unreachable backend does
struct UnreachableCache;

fn unreachable() -> GhostboxError {
    GhostboxError::Unavailable("connection refused to 10.0.0.7:6379".to_string())
}

#[async_trait]
impl Cache for UnreachableCache {
    async fn incr_with_expiry(&self, _key: &str, _ttl: Duration) -> Result<u64> {
        Err(unreachable())
    }

    async fn incr(&self, _key: &str) -> Result<u64> {
        Err(unreachable())
    }

    async fn get_counter(&self, _key: &str) -> Result<Option<u64>> {
        Err(unreachable())
    }

    async fn push_capped(
        &self,
        _key: &str,
        _value: &str,
        _capacity: usize,
        _ttl: Duration,
    ) -> Result<PushOutcome> {
        Err(unreachable())
    }

    async fn take_all(&self, _key: &str) -> Result<Vec<String>> {
        Err(unreachable())
    }

    async fn health_check(&self) -> Result<bool> {
        Err(unreachable())
    }
}

fn upgrade_request(path: &str) -> warp::test::RequestBuilder {
    warp::test::request()
        .path(path)
        .header("connection", "upgrade")
        .header("upgrade", "websocket")
        .header("sec-websocket-version", "13")
        .header("sec-websocket-key", "dGhlIHNhbXBsZSBub25jZQ==")
}

fn body_json(body: &[u8]) -> Value {
    serde_json::from_slice(body).unwrap()
}

async fn post<F>(filter: &F, path: &str, body: Value) -> (StatusCode, Value)
where
    F: warp::Filter + 'static,
    F::Extract: warp::Reply + Send,
{
    let response = warp::test::request()
        .method("POST")
        .path(path)
        .json(&body)
        .reply(filter)
        .await;
    (response.status(), body_json(response.body()))
}

async fn wait_for_connections(state: &AppState, room_id: &str, expected: usize) {
    for _ in 0..100 {
        if let Some(room) = state.rooms.get(room_id).await {
            if let Ok(snapshot) = room.snapshot().await {
                if snapshot.connections == expected {
                    return;
                }
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("room {} never reached {} connections", room_id, expected);
}

#[tokio::test]
async fn test_health() {
    let filter = routes(state());

    let response = warp::test::request().path("/health").reply(&filter).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response.body());
    assert_eq!(body["status"], "ok");
    assert!(body["time"].is_string());
    assert_eq!(response.headers()["x-content-type-options"], "nosniff");
}

#[tokio::test]
async fn test_put_then_take_once() {
    let filter = routes(state());

    let (status, body) = post(
        &filter,
        "/mailbox/put",
        json!({ "key": "ABC123", "data": "cGxhaW50ZXh0" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": true }));

    let (status, body) = post(&filter, "/mailbox/take", json!({ "key": "ABC123" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "found": true, "messages": ["cGxhaW50ZXh0"] }));

    let (status, body) = post(&filter, "/mailbox/take", json!({ "key": "ABC123" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "found": false }));
}

#[tokio::test]
async fn test_mailbox_errors() {
    let filter = routes(state());

    let (status, body) = post(&filter, "/mailbox/put", json!({ "key": "no", "data": "x" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "Invalid data" }));

    let (status, body) = post(&filter, "/mailbox/put", json!({ "key": "ABC123" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "Invalid data" }));

    let oversized = "a".repeat(16 * 1024 + 1);
    let (status, body) = post(
        &filter,
        "/mailbox/put",
        json!({ "key": "ABC123", "data": oversized }),
    )
    .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body, json!({ "error": "Payload too large" }));

    for i in 0..5 {
        let (status, _) = post(
            &filter,
            "/mailbox/put",
            json!({ "key": "FULL99", "data": format!("p{}", i) }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, body) = post(
        &filter,
        "/mailbox/put",
        json!({ "key": "FULL99", "data": "one too many" }),
    )
    .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body, json!({ "error": "Mailbox full" }));
}

#[tokio::test]
async fn test_malformed_json_body() {
    let filter = routes(state());

    let response = warp::test::request()
        .method("POST")
        .path("/mailbox/take")
        .header("content-type", "application/json")
        .body("{not json")
        .reply(&filter)
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response.body()), json!({ "error": "Invalid data" }));
}

#[tokio::test]
async fn test_unknown_route() {
    let filter = routes(state());

    let response = warp::test::request().path("/nowhere").reply(&filter).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response.body()), json!({ "error": "Route not found" }));
}

#[tokio::test]
async fn test_ip_rate_limit() {
    let filter = routes(state());

    // Distinct keys so only the per-client budget applies
    for i in 0..60 {
        let (status, _) = post(
            &filter,
            "/mailbox/take",
            json!({ "key": format!("IPRATE{:03}", i) }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = post(&filter, "/mailbox/take", json!({ "key": "IPRATE999" })).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body, json!({ "error": "Too many requests" }));

    // Health checks are not budgeted
    let response = warp::test::request().path("/health").reply(&filter).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_admin_stats_requires_token() {
    let filter = routes(state());

    let response = warp::test::request().path("/admin/stats").reply(&filter).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response.body()), json!({ "error": "Unauthorized" }));

    let response = warp::test::request()
        .path("/admin/stats")
        .header("x-admin-token", "wrong-token-wrong-token-wrong")
        .reply(&filter)
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_stats_reports_aggregates() {
    let filter = routes(state());

    post(&filter, "/mailbox/put", json!({ "key": "STAT01", "data": "a" })).await;
    post(&filter, "/mailbox/put", json!({ "key": "STAT01", "data": "b" })).await;
    post(&filter, "/mailbox/take", json!({ "key": "STAT01" })).await;
    post(&filter, "/mailbox/take", json!({ "key": "STAT01" })).await;

    let response = warp::test::request()
        .path("/admin/stats")
        .header("x-admin-token", ADMIN_TOKEN)
        .reply(&filter)
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response.body());
    assert_eq!(body["stats"], json!({ "send": 2, "get": 1 }));
    assert_eq!(body["rooms"]["rooms_created"], 0);
    assert_eq!(body["active_rooms"], 0);
}

#[tokio::test]
async fn test_admin_login() {
    let filter = routes(state());

    let (status, body) = post(&filter, "/admin/login", json!({ "secret": "guess" })).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({ "success": false }));

    let (status, body) = post(&filter, "/admin/login", json!({ "secret": ADMIN_TOKEN })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": true }));
}

#[tokio::test]
async fn test_room_id_too_short() {
    let filter = routes(state());

    let response = upgrade_request("/room/a-b-c")
        .reply(&filter)
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response.body()), json!({ "error": "Invalid room" }));
}

#[tokio::test]
async fn test_room_relay_over_websocket() {
    let state = state();
    let filter = routes(state.clone());

    let mut alice = warp::test::ws()
        .path("/room/k3j9xQ2pLm")
        .handshake(filter.clone())
        .await
        .expect("handshake");
    let mut bob = warp::test::ws()
        .path("/room/k3j9xQ2pLm")
        .handshake(filter.clone())
        .await
        .expect("handshake");
    wait_for_connections(&state, "k3j9xQ2pLm", 2).await;

    alice
        .send_text(json!({ "type": "chat", "data": "ciphertext" }).to_string())
        .await;
    let received = bob.recv().await.unwrap();
    let packet: ServerPacket = serde_json::from_str(received.to_str().unwrap()).unwrap();
    assert_eq!(packet, ServerPacket::Chat("ciphertext".to_string()));

    // Straight away again: inside the throttle window
    alice
        .send_text(json!({ "type": "chat", "data": "too soon" }).to_string())
        .await;
    let notice = alice.recv().await.unwrap();
    let packet: ServerPacket = serde_json::from_str(notice.to_str().unwrap()).unwrap();
    assert_eq!(packet, ServerPacket::System(SystemNotice::Throttled));
}

#[tokio::test]
async fn test_oversized_room_packet_closes_with_policy_code() {
    let state = state();
    let filter = routes(state.clone());

    let mut client = warp::test::ws()
        .path("/room/abcdef12")
        .handshake(filter)
        .await
        .expect("handshake");
    wait_for_connections(&state, "abcdef12", 1).await;

    client
        .send_text(json!({ "type": "chat", "data": "x".repeat(201) }).to_string())
        .await;

    let notice = client.recv().await.unwrap();
    let packet: ServerPacket = serde_json::from_str(notice.to_str().unwrap()).unwrap();
    assert_eq!(
        packet,
        ServerPacket::System(SystemNotice::PacketSizeViolation)
    );

    // The close frame itself is swallowed by the test client
    client.recv_closed().await.unwrap();
    wait_for_connections(&state, "abcdef12", 0).await;
}

#[tokio::test(start_paused = true)]
async fn test_upgrade_to_expired_room_is_gone() {
    let state = state();
    let filter = routes(state.clone());

    let room = state.rooms.get_or_create("abcdef12").await.unwrap();
    tokio::time::advance(Duration::from_secs(121)).await;
    for _ in 0..100 {
        if !room.is_alive() && state.rooms.is_expired("abcdef12").await {
            break;
        }
        tokio::task::yield_now().await;
    }

    let response = upgrade_request("/room/abcdef12").reply(&filter).await;
    assert_eq!(response.status(), StatusCode::GONE);
    assert_eq!(body_json(response.body()), json!({ "error": "Room expired" }));
    assert_eq!(state.rooms.active_rooms().await, 0);

    // A different id still opens normally
    let response = upgrade_request("/room/fresh0001").reply(&filter).await;
    assert_eq!(response.status(), StatusCode::SWITCHING_PROTOCOLS);
}

#[tokio::test]
async fn test_cache_outage_is_opaque_and_gate_fails_open() {
    let cache: SharedCache = Arc::new(UnreachableCache);
    let filter = routes(AppState::new(ServerConfig::for_testing(), cache));

    for (path, body) in [
        ("/mailbox/put", json!({ "key": "ABC123", "data": "cGxhaW50ZXh0" })),
        ("/mailbox/take", json!({ "key": "ABC123" })),
    ] {
        let response = warp::test::request()
            .method("POST")
            .path(path)
            .json(&body)
            .reply(&filter)
            .await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            body_json(response.body()),
            json!({ "error": "Service unavailable" })
        );
        let raw = String::from_utf8_lossy(response.body()).to_string();
        assert!(!raw.contains("10.0.0.7"));
    }

    // The per-client gate cannot count, but still lets the request reach its handler
    let (status, body) = post(&filter, "/admin/login", json!({ "secret": ADMIN_TOKEN })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": true }));
}

#[tokio::test]
async fn test_origin_allow_list() {
    let mut config = ServerConfig::for_testing();
    config.allowed_origins = vec!["https://ghost.example".to_string()];
    let cache: SharedCache = Arc::new(MemoryCache::new());
    let filter = routes(AppState::new(config, cache));

    let response = warp::test::request()
        .method("POST")
        .path("/mailbox/take")
        .header("origin", "https://evil.example")
        .json(&json!({ "key": "ABC123" }))
        .reply(&filter)
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(
        body_json(response.body()),
        json!({ "error": "Origin not allowed" })
    );

    let response = upgrade_request("/room/abcdef12")
        .header("origin", "https://evil.example")
        .reply(&filter)
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = warp::test::request()
        .method("POST")
        .path("/mailbox/take")
        .header("origin", "https://ghost.example")
        .json(&json!({ "key": "ABC123" }))
        .reply(&filter)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["access-control-allow-origin"],
        "https://ghost.example"
    );
    assert_eq!(body_json(response.body()), json!({ "found": false }));
}
