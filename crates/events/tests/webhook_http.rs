//! End-to-end delivery over real HTTP to a local axum receiver.

mod common;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use archibus_core::delivery::DeliveryState;
use archibus_core::hashing::verify_delivery_signature;
use archibus_events::{
    AuditEmitter, BroadcastChannel, DeliveryDispatcher, EventBusService, HttpWebhookSender,
    MemoryAuditSink, Stores, SubscribeRequest,
};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::Router;
use common::{caller, collect_outcomes, fast_config, publish_req};
use serde_json::json;
use tokio::sync::mpsc;

type Received = mpsc::UnboundedSender<(HeaderMap, Bytes)>;

async fn ok_hook(State(tx): State<Received>, headers: HeaderMap, body: Bytes) -> StatusCode {
    let _ = tx.send((headers, body));
    StatusCode::NO_CONTENT
}

async fn broken_hook(State(tx): State<Received>, headers: HeaderMap, body: Bytes) -> StatusCode {
    let _ = tx.send((headers, body));
    StatusCode::SERVICE_UNAVAILABLE
}

async fn spawn_receiver() -> (SocketAddr, mpsc::UnboundedReceiver<(HeaderMap, Bytes)>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let app = Router::new()
        .route("/hook", post(ok_hook))
        .route("/broken", post(broken_hook))
        .with_state(tx);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, rx)
}

fn http_bus() -> (EventBusService, Arc<DeliveryDispatcher>) {
    let stores = Stores::in_memory();
    let audit = AuditEmitter::new(Arc::new(MemoryAuditSink::new()));
    let sender = Arc::new(HttpWebhookSender::new(Duration::from_secs(2)).unwrap());
    let dispatcher =
        DeliveryDispatcher::start(fast_config(), sender, stores.deliveries.clone(), audit.clone());
    let bus = EventBusService::new(
        stores,
        Arc::new(BroadcastChannel::default()),
        audit,
        dispatcher.clone(),
    );
    (bus, dispatcher)
}

#[tokio::test]
async fn signed_delivery_reaches_a_real_receiver() {
    let (addr, mut received) = spawn_receiver().await;
    let (bus, dispatcher) = http_bus();
    let mut outcomes = dispatcher.subscribe_outcomes();

    bus.subscribe(
        &caller("analytics"),
        SubscribeRequest {
            event_type: "goal.created".into(),
            subscriber_service: None,
            callback_url: format!("http://{addr}/hook"),
            id: Some("sub-1".into()),
            secret: Some("s3cret".into()),
        },
    )
    .await
    .unwrap();

    let event = bus
        .publish(&caller("goals"), publish_req("goal.created", json!({"goal_id": "g1"})))
        .await
        .unwrap();

    let (headers, body) = tokio::time::timeout(Duration::from_secs(5), received.recv())
        .await
        .unwrap()
        .unwrap();

    let payload: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(payload, json!({"goal_id": "g1"}));
    assert_eq!(headers["content-type"], "application/json");
    assert_eq!(headers["x-event-id"], event.event_id.as_str());
    assert_eq!(headers["x-source-service"], "goals");

    let signature = headers["x-signature"].to_str().unwrap();
    assert!(verify_delivery_signature("s3cret", &body, signature));

    let done = collect_outcomes(&mut outcomes, 1).await;
    assert_eq!(done[0].state, DeliveryState::Delivered);
}

#[tokio::test]
async fn non_success_status_is_retried_then_dead_lettered() {
    let (addr, mut received) = spawn_receiver().await;
    let (bus, dispatcher) = http_bus();
    let mut outcomes = dispatcher.subscribe_outcomes();

    bus.subscribe(
        &caller("analytics"),
        common::subscribe_req("goal.created", &format!("http://{addr}/broken")),
    )
    .await
    .unwrap();
    let event = bus
        .publish(&caller("goals"), publish_req("goal.created", json!({"goal_id": "g1"})))
        .await
        .unwrap();

    let done = collect_outcomes(&mut outcomes, 1).await;
    assert_eq!(done[0].state, DeliveryState::DeadLettered);
    assert_eq!(done[0].attempts, 2);

    let mut hits = 0;
    while received.try_recv().is_ok() {
        hits += 1;
    }
    assert_eq!(hits, 2);

    let records = bus.list_deliveries(&event.event_id).await.unwrap();
    assert_eq!(records[0].last_status_code, Some(503));
}
