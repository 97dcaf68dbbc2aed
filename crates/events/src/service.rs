//! Publish / subscribe / unsubscribe orchestration.
//!
//! [`EventBusService`] is the single entry point the HTTP layer talks to.
//! It owns nothing mutable itself; every collaborator is injected at
//! construction and shared for the lifetime of the process.

use std::sync::Arc;

use archibus_core::audit::action_kinds;
use archibus_core::delivery::DeliveryState;
use archibus_core::error::CoreError;
use archibus_core::identity::ServiceIdentity;
use archibus_core::validation::{
    validate_event_type, validate_identifier, validate_payload, validate_service_name,
};
use archibus_db::models::delivery::Delivery;
use archibus_db::models::event::CreateEvent;
use archibus_db::models::subscription::{CreateSubscription, Subscription};
use serde::Deserialize;

use crate::audit::AuditEmitter;
use crate::bus::BroadcastChannel;
use crate::dispatcher::DeliveryDispatcher;
use crate::envelope::{generate_id, EventEnvelope};
use crate::store::{StoreError, Stores};

/// Errors surfaced to the caller of a bus operation.
///
/// Delivery failures never appear here.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

// ---------------------------------------------------------------------------
// Request DTOs
// ---------------------------------------------------------------------------

/// Body of `POST /event_bus/publish`.
#[derive(Debug, Clone, Deserialize)]
pub struct PublishRequest {
    pub event_type: String,
    pub payload: serde_json::Value,
    pub event_id: Option<String>,
}

/// Body of `POST /event_bus/subscribe`.
///
/// `subscriber_service` defaults to the verified caller.
#[derive(Debug, Clone, Deserialize)]
pub struct SubscribeRequest {
    pub event_type: String,
    pub subscriber_service: Option<String>,
    pub callback_url: String,
    pub id: Option<String>,
    pub secret: Option<String>,
}

/// Body of `POST /event_bus/unsubscribe`.
#[derive(Debug, Clone, Deserialize)]
pub struct UnsubscribeRequest {
    pub id: String,
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// Audit reason when matching subscriptions could not be loaded.
pub const SUBSCRIPTION_LOOKUP_FAILED: &str = "subscription lookup failed";

pub struct EventBusService {
    stores: Stores,
    broadcast: Arc<BroadcastChannel>,
    audit: AuditEmitter,
    dispatcher: Arc<DeliveryDispatcher>,
}

impl EventBusService {
    pub fn new(
        stores: Stores,
        broadcast: Arc<BroadcastChannel>,
        audit: AuditEmitter,
        dispatcher: Arc<DeliveryDispatcher>,
    ) -> Self {
        Self {
            stores,
            broadcast,
            audit,
            dispatcher,
        }
    }

    pub fn broadcast_channel(&self) -> &Arc<BroadcastChannel> {
        &self.broadcast
    }

    pub fn dispatcher(&self) -> &Arc<DeliveryDispatcher> {
        &self.dispatcher
    }

    /// Persist an event, broadcast it, audit it and hand its deliveries to
    /// the dispatcher.
    ///
    /// Returns once the event is durable. Only validation and persistence
    /// failures reach the caller; nothing is delivered if persistence fails.
    pub async fn publish(
        &self,
        caller: &ServiceIdentity,
        req: PublishRequest,
    ) -> Result<EventEnvelope, BusError> {
        let event_type = validate_event_type(&req.event_type)?.to_string();
        validate_payload(&req.payload)?;
        let event_id = match req.event_id.as_deref() {
            Some(id) => validate_identifier("event_id", id)?.to_string(),
            None => generate_id(),
        };

        let event = self
            .stores
            .events
            .append(CreateEvent {
                event_id,
                event_type,
                payload: req.payload,
                source_service: caller.service.clone(),
            })
            .await?;

        tracing::info!(
            event_id = %event.event_id,
            event_type = %event.event_type,
            source_service = %event.source_service,
            "Event published"
        );

        let listeners = self.broadcast.broadcast(&event.event_type, &event.payload);
        tracing::debug!(event_id = %event.event_id, listeners, "Event broadcast");

        self.audit
            .record(
                action_kinds::PUBLISH,
                Some(caller.as_str()),
                serde_json::json!({
                    "event_id": event.event_id,
                    "event_type": event.event_type,
                }),
            )
            .await;

        self.fan_out(&event).await;

        Ok(event)
    }

    /// Resolve matching subscriptions and hand them to the dispatcher.
    ///
    /// A failed lookup leaves the event undelivered; that is recorded as a
    /// single `delivery_failed` audit entry for the whole event.
    async fn fan_out(&self, event: &EventEnvelope) {
        let subscriptions = match self
            .stores
            .subscriptions
            .list_for_event_type(&event.event_type)
            .await
        {
            Ok(subscriptions) => subscriptions,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    event_id = %event.event_id,
                    "Failed to resolve subscriptions, event will not be delivered"
                );
                self.audit
                    .record(
                        action_kinds::DELIVERY_FAILED,
                        Some(&event.source_service),
                        serde_json::json!({
                            "event_id": event.event_id,
                            "event_type": event.event_type,
                            "reason": SUBSCRIPTION_LOOKUP_FAILED,
                            "error": e.to_string(),
                        }),
                    )
                    .await;
                return;
            }
        };

        let handed_off = self
            .dispatcher
            .dispatch(Arc::new(event.clone()), subscriptions);
        tracing::debug!(event_id = %event.event_id, deliveries = handed_off, "Fan-out dispatched");
    }

    /// Register a webhook for an event type. Always creates a new record.
    pub async fn subscribe(
        &self,
        caller: &ServiceIdentity,
        req: SubscribeRequest,
    ) -> Result<Subscription, BusError> {
        let event_type = validate_event_type(&req.event_type)?.to_string();
        let subscriber_service =
            validate_service_name(req.subscriber_service.as_deref().unwrap_or(caller.as_str()))?
                .to_string();
        let callback_url = validate_callback_url(&req.callback_url)?;
        let id = match req.id.as_deref() {
            Some(id) => validate_identifier("id", id)?.to_string(),
            None => generate_id(),
        };
        let secret = req.secret.filter(|s| !s.is_empty());

        let subscription = self
            .stores
            .subscriptions
            .create(CreateSubscription {
                id,
                event_type,
                subscriber_service,
                callback_url,
                secret,
            })
            .await?;

        tracing::info!(
            subscription_id = %subscription.id,
            event_type = %subscription.event_type,
            subscriber_service = %subscription.subscriber_service,
            "Subscription created"
        );

        self.audit
            .record(
                action_kinds::SUBSCRIBE,
                Some(caller.as_str()),
                serde_json::json!({
                    "subscription_id": subscription.id,
                    "event_type": subscription.event_type,
                    "subscriber_service": subscription.subscriber_service,
                    "callback_url": subscription.callback_url,
                }),
            )
            .await;

        Ok(subscription)
    }

    /// Remove a subscription. Unknown ids are a no-op; returns whether a
    /// record was removed.
    pub async fn unsubscribe(&self, caller: &ServiceIdentity, id: &str) -> Result<bool, BusError> {
        let id = validate_identifier("id", id)?;
        let removed = self.stores.subscriptions.delete(id).await?;

        tracing::info!(subscription_id = %id, removed, "Unsubscribe processed");

        self.audit
            .record(
                action_kinds::UNSUBSCRIBE,
                Some(caller.as_str()),
                serde_json::json!({
                    "subscription_id": id,
                    "removed": removed,
                }),
            )
            .await;

        Ok(removed)
    }

    pub async fn list_subscriptions(&self) -> Result<Vec<Subscription>, BusError> {
        Ok(self.stores.subscriptions.list().await?)
    }

    /// All stored rows carrying `event_id` (ids are not deduplicated).
    pub async fn find_events(&self, event_id: &str) -> Result<Vec<EventEnvelope>, BusError> {
        Ok(self.stores.events.find_by_event_id(event_id).await?)
    }

    pub async fn list_deliveries(&self, event_id: &str) -> Result<Vec<Delivery>, BusError> {
        Ok(self.stores.deliveries.list_for_event(event_id).await?)
    }

    /// Dead-lettered deliveries, newest first.
    pub async fn list_dead_letters(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Delivery>, BusError> {
        Ok(self
            .stores
            .deliveries
            .list_by_state(DeliveryState::DeadLettered, limit, offset)
            .await?)
    }
}

/// Callback targets must be absolute `http`/`https` URLs with a host.
fn validate_callback_url(url: &str) -> Result<String, CoreError> {
    let trimmed = url.trim();
    let parsed = reqwest::Url::parse(trimmed)
        .map_err(|e| CoreError::Validation(format!("callback_url is not a valid URL: {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(CoreError::Validation(
            "callback_url must use http or https".into(),
        ));
    }
    if parsed.host_str().unwrap_or_default().is_empty() {
        return Err(CoreError::Validation("callback_url must have a host".into()));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn accepts_http_and_https_callbacks() {
        assert_eq!(
            validate_callback_url(" https://analytics/ingest ").unwrap(),
            "https://analytics/ingest"
        );
        assert!(validate_callback_url("http://127.0.0.1:9000/hook").is_ok());
    }

    #[test]
    fn rejects_other_schemes_and_relative_urls() {
        assert_matches!(
            validate_callback_url("ftp://files/drop"),
            Err(CoreError::Validation(_))
        );
        assert_matches!(
            validate_callback_url("/relative/path"),
            Err(CoreError::Validation(_))
        );
        assert_matches!(validate_callback_url(""), Err(CoreError::Validation(_)));
    }
}
