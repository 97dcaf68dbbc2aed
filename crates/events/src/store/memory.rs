//! In-memory implementations of the storage traits.
//!
//! Used when no `DATABASE_URL` is configured and throughout the test suites.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::RwLock;

use archibus_core::delivery::DeliveryState;
use archibus_core::types::DbId;
use archibus_db::models::delivery::{CreateDelivery, Delivery, UpdateDelivery};
use archibus_db::models::event::{CreateEvent, Event};
use archibus_db::models::subscription::{CreateSubscription, Subscription};
use async_trait::async_trait;
use chrono::Utc;

use super::{DeliveryLog, EventStore, StoreError, SubscriptionStore};
use crate::envelope::EventEnvelope;

fn poisoned() -> StoreError {
    StoreError::Backend("Lock poison".to_string())
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryEventStore {
    rows: RwLock<Vec<Event>>,
    next_id: AtomicI64,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored rows.
    pub fn len(&self) -> usize {
        self.rows.read().map(|rows| rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn append(&self, event: CreateEvent) -> Result<EventEnvelope, StoreError> {
        let row = Event {
            id: self.next_id.fetch_add(1, Ordering::Relaxed) + 1,
            event_id: event.event_id,
            event_type: event.event_type,
            payload: event.payload,
            source_service: event.source_service,
            created_at: Utc::now(),
        };
        self.rows.write().map_err(|_| poisoned())?.push(row.clone());
        Ok(row.into())
    }

    async fn find_by_event_id(&self, event_id: &str) -> Result<Vec<EventEnvelope>, StoreError> {
        let rows = self.rows.read().map_err(|_| poisoned())?;
        Ok(rows
            .iter()
            .filter(|row| row.event_id == event_id)
            .cloned()
            .map(EventEnvelope::from)
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Subscriptions
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemorySubscriptionStore {
    rows: RwLock<Vec<Subscription>>,
}

impl MemorySubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SubscriptionStore for MemorySubscriptionStore {
    async fn create(&self, input: CreateSubscription) -> Result<Subscription, StoreError> {
        let mut rows = self.rows.write().map_err(|_| poisoned())?;
        if rows.iter().any(|row| row.id == input.id) {
            return Err(StoreError::Conflict(format!(
                "Subscription '{}' already exists",
                input.id
            )));
        }
        let row = Subscription {
            id: input.id,
            event_type: input.event_type,
            subscriber_service: input.subscriber_service,
            callback_url: input.callback_url,
            secret: input.secret,
            created_at: Utc::now(),
        };
        rows.push(row.clone());
        Ok(row)
    }

    async fn list(&self) -> Result<Vec<Subscription>, StoreError> {
        Ok(self.rows.read().map_err(|_| poisoned())?.clone())
    }

    async fn list_for_event_type(
        &self,
        event_type: &str,
    ) -> Result<Vec<Subscription>, StoreError> {
        let rows = self.rows.read().map_err(|_| poisoned())?;
        Ok(rows
            .iter()
            .filter(|row| row.event_type == event_type)
            .cloned()
            .collect())
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let mut rows = self.rows.write().map_err(|_| poisoned())?;
        let before = rows.len();
        rows.retain(|row| row.id != id);
        Ok(rows.len() != before)
    }
}

// ---------------------------------------------------------------------------
// Deliveries
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryDeliveryLog {
    rows: RwLock<Vec<Delivery>>,
    next_id: AtomicI64,
}

impl MemoryDeliveryLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeliveryLog for MemoryDeliveryLog {
    async fn create(&self, input: CreateDelivery) -> Result<DbId, StoreError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let now = Utc::now();
        let row = Delivery {
            id,
            event_id: input.event_id,
            subscription_id: input.subscription_id,
            callback_url: input.callback_url,
            state: input.state.as_str().to_string(),
            attempt_count: 0,
            last_error: None,
            last_status_code: None,
            created_at: now,
            updated_at: now,
        };
        self.rows.write().map_err(|_| poisoned())?.push(row);
        Ok(id)
    }

    async fn update(&self, id: DbId, input: UpdateDelivery) -> Result<(), StoreError> {
        let mut rows = self.rows.write().map_err(|_| poisoned())?;
        if let Some(row) = rows.iter_mut().find(|row| row.id == id) {
            row.state = input.state.as_str().to_string();
            row.attempt_count = input.attempt_count;
            row.last_error = input.last_error;
            row.last_status_code = input.last_status_code;
            row.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn list_for_event(&self, event_id: &str) -> Result<Vec<Delivery>, StoreError> {
        let rows = self.rows.read().map_err(|_| poisoned())?;
        Ok(rows
            .iter()
            .filter(|row| row.event_id == event_id)
            .cloned()
            .collect())
    }

    async fn list_by_state(
        &self,
        state: DeliveryState,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Delivery>, StoreError> {
        let rows = self.rows.read().map_err(|_| poisoned())?;
        Ok(rows
            .iter()
            .rev()
            .filter(|row| row.state == state.as_str())
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}
