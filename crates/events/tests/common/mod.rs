#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use archibus_core::identity::ServiceIdentity;
use archibus_core::retry::RetryPolicy;
use archibus_events::{
    AuditEmitter, BroadcastChannel, DeliveryDispatcher, DeliveryOutcome, DeliveryRequest,
    DispatcherConfig, EventBusService, MemoryAuditSink, PublishRequest, Stores,
    SubscribeRequest, WebhookError, WebhookSender,
};
use async_trait::async_trait;
use tokio::sync::broadcast;

/// Fails every attempt to a URL.
pub const ALWAYS: u32 = u32::MAX;

/// Webhook sender that records every request and fails on demand.
#[derive(Default)]
pub struct ScriptedSender {
    calls: Mutex<Vec<DeliveryRequest>>,
    failures: Mutex<HashMap<String, u32>>,
    stall: Option<Duration>,
}

impl ScriptedSender {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A sender whose every request hangs for `stall`.
    pub fn stalling(stall: Duration) -> Arc<Self> {
        Arc::new(Self {
            stall: Some(stall),
            ..Self::default()
        })
    }

    /// Fail the next `times` requests to `url` with HTTP 500.
    pub fn fail(&self, url: &str, times: u32) {
        self.failures.lock().unwrap().insert(url.to_string(), times);
    }

    pub fn calls(&self) -> Vec<DeliveryRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, url: &str) -> Vec<DeliveryRequest> {
        self.calls().into_iter().filter(|c| c.url == url).collect()
    }
}

#[async_trait]
impl WebhookSender for ScriptedSender {
    async fn send(&self, request: &DeliveryRequest) -> Result<u16, WebhookError> {
        self.calls.lock().unwrap().push(request.clone());
        if let Some(stall) = self.stall {
            tokio::time::sleep(stall).await;
        }
        let mut failures = self.failures.lock().unwrap();
        match failures.get_mut(&request.url) {
            Some(remaining) if *remaining > 0 => {
                if *remaining != ALWAYS {
                    *remaining -= 1;
                }
                Err(WebhookError::HttpStatus(500))
            }
            _ => Ok(200),
        }
    }
}

/// A bus over in-memory stores with short retry delays.
pub struct Harness {
    pub bus: EventBusService,
    pub stores: Stores,
    pub sender: Arc<ScriptedSender>,
    pub audit: Arc<MemoryAuditSink>,
    pub dispatcher: Arc<DeliveryDispatcher>,
}

pub fn fast_config() -> DispatcherConfig {
    DispatcherConfig {
        retry: RetryPolicy::new(2, Duration::from_millis(10), Duration::from_millis(50), 0.0),
        ..DispatcherConfig::default()
    }
}

pub fn harness() -> Harness {
    harness_with(fast_config(), Stores::in_memory(), ScriptedSender::new())
}

pub fn harness_with(
    config: DispatcherConfig,
    stores: Stores,
    sender: Arc<ScriptedSender>,
) -> Harness {
    let audit = Arc::new(MemoryAuditSink::new());
    let emitter = AuditEmitter::new(audit.clone());
    let dispatcher = DeliveryDispatcher::start(
        config,
        sender.clone(),
        stores.deliveries.clone(),
        emitter.clone(),
    );
    let bus = EventBusService::new(
        stores.clone(),
        Arc::new(BroadcastChannel::default()),
        emitter,
        dispatcher.clone(),
    );
    Harness {
        bus,
        stores,
        sender,
        audit,
        dispatcher,
    }
}

pub fn caller(service: &str) -> ServiceIdentity {
    ServiceIdentity::new(service)
}

pub fn publish_req(event_type: &str, payload: serde_json::Value) -> PublishRequest {
    PublishRequest {
        event_type: event_type.to_string(),
        payload,
        event_id: None,
    }
}

pub fn subscribe_req(event_type: &str, callback_url: &str) -> SubscribeRequest {
    SubscribeRequest {
        event_type: event_type.to_string(),
        subscriber_service: None,
        callback_url: callback_url.to_string(),
        id: None,
        secret: None,
    }
}

/// Wait for `n` terminal outcomes, failing the test after five seconds.
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
