#![cfg(feature = "http")]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use channel_dispatcher::{
    ClientConfig, CooldownStore, DeliveryOutcome, Dispatcher, DispatcherConfig, EndpointId,
    FailureReason, HttpTransport, Registry, Transport,
};
use serde_json::{json, Value};
use tokio::sync::Mutex;

/// Mock channel API. Channel "limited" is rate limited on its first
/// request, "slow" answers with slow mode, "forbidden" always 403s.
#[derive(Default)]
struct MockApi {
    received: Mutex<Vec<(String, Option<String>, Value)>>,
    hits: Mutex<HashMap<String, usize>>,
}

async fn handle_message(
    State(state): State<Arc<MockApi>>,
    Path(channel): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    state.received.lock().await.push((channel.clone(), auth, body));

    let hit = {
        let mut hits = state.hits.lock().await;
        let count = hits.entry(channel.clone()).or_insert(0);
        *count += 1;
        *count
    };

    match channel.as_str() {
        "limited" if hit == 1 => (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({ "message": "You are being rate limited.", "retry_after": 0.2 })),
        ),
        "slow" => (StatusCode::OK, Json(json!({ "id": "1", "slowmode_delay": 30 }))),
        "forbidden" => (StatusCode::FORBIDDEN, Json(json!({ "message": "Missing Access" }))),
        _ => (StatusCode::OK, Json(json!({ "id": "1" }))),
    }
}

async fn start_mock_api() -> (SocketAddr, Arc<MockApi>) {
    let state = Arc::new(MockApi::default());
    let app = Router::new()
        .route("/api/v9/channels/{channel}/messages", post(handle_message))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, state)
}

fn client_config(addr: SocketAddr) -> ClientConfig {
    ClientConfig::new("Bot test-token")
        .with_api_base(format!("http://{}/api/v9", addr))
        .with_timeout(Duration::from_secs(5))
}

#[tokio::test]
async fn posts_content_with_authorization_header() {
    let (addr, api) = start_mock_api().await;
    let transport = HttpTransport::new(&client_config(addr)).unwrap();

    let response = transport
        .post_message(&EndpointId::new("123"), "hello there")
        .await
        .unwrap();

    assert_eq!(response.status, 200);
    let received = api.received.lock().await;
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].0, "123");
    assert_eq!(received[0].1.as_deref(), Some("Bot test-token"));
    assert_eq!(received[0].2, json!({ "content": "hello there" }));
}

#[tokio::test]
async fn unreachable_api_is_a_network_failure() {
    // Bind then drop to get a port nothing listens on.
    let addr = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let dispatcher = Dispatcher::from_client_config(&client_config(addr), DispatcherConfig::default()).unwrap();
    let registry = Registry::from_pairs([("123", "hi")]).unwrap();

    let cycle = dispatcher.dispatch_all(&registry).await;

    assert_eq!(cycle.report.failed.len(), 1);
    assert!(matches!(cycle.report.failed[0].1, FailureReason::Network(_)));
    assert!(cycle.retry.is_none());
}

#[tokio::test]
async fn end_to_end_cycle_against_mock_api() {
    let (addr, api) = start_mock_api().await;
    let dispatcher = Dispatcher::from_client_config(&client_config(addr), DispatcherConfig::default()).unwrap();
    let registry = Registry::from_pairs([
        ("plain", "a"),
        ("limited", "b"),
        ("slow", "c"),
        ("forbidden", "d"),
    ])
    .unwrap();

    let cycle = dispatcher.dispatch_all(&registry).await;

    assert_eq!(
        cycle.report.sent,
        vec![EndpointId::new("plain"), EndpointId::new("slow")]
    );
    assert_eq!(cycle.report.pending.len(), 1);
    let retry_after = cycle.report.pending[0].retry_after;
    assert!(retry_after > Duration::from_millis(199) && retry_after < Duration::from_millis(201));
    assert!(matches!(
        cycle.report.failed[0].1,
        FailureReason::Status { status: 403, .. }
    ));
    assert!(dispatcher.cooldowns().remaining(&EndpointId::new("slow")).await > Duration::from_secs(25));

    let summary = tokio::time::timeout(Duration::from_secs(5), cycle.retry.unwrap().wait())
        .await
        .expect("retry finished in time")
        .expect("retry not aborted");

    assert_eq!(
        summary.sent,
        vec![EndpointId::new("plain"), EndpointId::new("slow"), EndpointId::new("limited")]
    );
    assert_eq!(api.hits.lock().await.get("limited"), Some(&2));
    assert_eq!(api.hits.lock().await.get("forbidden"), Some(&1));
}

#[tokio::test]
async fn transport_feeds_classification() {
    let (addr, _api) = start_mock_api().await;
    let transport = HttpTransport::new(&client_config(addr)).unwrap();

    let response = transport.post_message(&EndpointId::new("slow"), "x").await.unwrap();
    assert_eq!(
        channel_dispatcher::classify(&response),
        DeliveryOutcome::Sent { cooldown: Some(Duration::from_secs(30)) }
    );
}
