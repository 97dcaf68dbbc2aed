#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use archibus_api::auth::token::{issue_service_token, TokenConfig};
use archibus_api::auth::{verifier_from_config, SERVICE_NAME_HEADER};
use archibus_api::config::{IdentityMode, ServerConfig};
use archibus_api::router::build_app_router;
use archibus_api::state::AppState;
use archibus_core::retry::RetryPolicy;
use archibus_events::{
    AuditEmitter, BroadcastChannel, DeliveryDispatcher, DeliveryOutcome, DeliveryRequest,
    DispatcherConfig, EventBusService, MemoryAuditSink, Stores, WebhookError, WebhookSender,
};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use tokio::sync::broadcast;
use tower::ServiceExt;

pub const TEST_SECRET: &str = "test-secret-that-is-long-enough-for-hmac";

/// Records every delivery; URLs in `failing` always answer 500.
#[derive(Default)]
pub struct RecordingSender {
    calls: Mutex<Vec<DeliveryRequest>>,
    failing: Mutex<HashSet<String>>,
}

impl RecordingSender {
    pub fn fail_always(&self, url: &str) {
        self.failing.lock().unwrap().insert(url.to_string());
    }

    pub fn calls(&self) -> Vec<DeliveryRequest> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl WebhookSender for RecordingSender {
    async fn send(&self, request: &DeliveryRequest) -> Result<u16, WebhookError> {
        self.calls.lock().unwrap().push(request.clone());
        if self.failing.lock().unwrap().contains(&request.url) {
            return Err(WebhookError::HttpStatus(500));
        }
        Ok(200)
    }
}

/// Build a test `ServerConfig` with safe defaults and in-memory storage.
pub fn test_config(identity_mode: IdentityMode) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
        database_url: None,
        broadcast_capacity: 16,
        identity_mode,
        token: Some(token_config()),
    }
}

pub fn token_config() -> TokenConfig {
    TokenConfig {
        secret: TEST_SECRET.to_string(),
        expiry_mins: 5,
    }
}

/// A signed token naming `service`.
pub fn token_for(service: &str) -> String {
    issue_service_token(service, &token_config()).unwrap()
}

/// Everything a test may want to poke at behind the router.
pub struct TestApp {
    pub router: Router,
    pub bus: Arc<EventBusService>,
    pub dispatcher: Arc<DeliveryDispatcher>,
    pub sender: Arc<RecordingSender>,
    pub audit: Arc<MemoryAuditSink>,
}

/// Full router over in-memory stores, token identity mode.
pub fn build_test_app() -> TestApp {
    build_test_app_with(IdentityMode::Token)
}

pub fn build_test_app_with(identity_mode: IdentityMode) -> TestApp {
    let config = test_config(identity_mode);
    let stores = Stores::in_memory();
    let sender = Arc::new(RecordingSender::default());
    let audit = Arc::new(MemoryAuditSink::new());
    let emitter = AuditEmitter::new(audit.clone());

    let dispatch_config = DispatcherConfig {
        retry: RetryPolicy::new(2, Duration::from_millis(10), Duration::from_millis(50), 0.0),
        ..DispatcherConfig::default()
    };
    let dispatcher = DeliveryDispatcher::start(
        dispatch_config,
        sender.clone(),
        stores.deliveries.clone(),
        emitter.clone(),
    );
    let bus = Arc::new(EventBusService::new(
        stores,
        Arc::new(BroadcastChannel::new(config.broadcast_capacity)),
        emitter,
        dispatcher.clone(),
    ));

    let state = AppState {
        config: Arc::new(config.clone()),
        bus: bus.clone(),
        identity: verifier_from_config(&config),
        pool: None,
    };

    TestApp {
        router: build_app_router(state, &config),
        bus,
        dispatcher,
        sender,
        audit,
    }
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::get(uri).body(Body::empty()).unwrap();
    app.oneshot(request).await.unwrap()
}

/// GET with a bearer token for `service`.
pub async fn get_as(app: Router, uri: &str, service: &str) -> Response<Body> {
    let request = Request::get(uri)
        .header("authorization", format!("Bearer {}", token_for(service)))
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    let request = Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

/// POST JSON with a bearer token for `service`.
pub async fn post_json_as(
    app: Router,
    uri: &str,
    body: serde_json::Value,
    service: &str,
) -> Response<Body> {
    let request = Request::post(uri)
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {}", token_for(service)))
        .body(Body::from(body.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

/// POST JSON with a plain `X-Service-Name` header.
pub async fn post_json_with_service_header(
    app: Router,
    uri: &str,
    body: serde_json::Value,
    service: &str,
) -> Response<Body> {
    let request = Request::post(uri)
        .header("content-type", "application/json")
        .header(SERVICE_NAME_HEADER, service)
        .body(Body::from(body.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Wait for `n` terminal delivery outcomes.
pub async fn collect_outcomes(
    rx: &mut broadcast::Receiver<DeliveryOutcome>,
    n: usize,
) -> Vec<DeliveryOutcome> {
    let mut outcomes = Vec::with_capacity(n);
    tokio::time::timeout(Duration::from_secs(5), async {
        while outcomes.len() < n {
            outcomes.push(rx.recv().await.expect("outcome channel closed"));
        }
    })
    .await
    .expect("timed out waiting for delivery outcomes");
    outcomes
}
