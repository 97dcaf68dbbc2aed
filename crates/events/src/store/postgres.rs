//! PostgreSQL implementations of the storage traits.

use archibus_core::delivery::DeliveryState;
use archibus_core::types::DbId;
use archibus_db::models::delivery::{CreateDelivery, Delivery, UpdateDelivery};
use archibus_db::models::event::CreateEvent;
use archibus_db::models::subscription::{CreateSubscription, Subscription};
use archibus_db::repositories::{DeliveryRepo, EventRepo, SubscriptionRepo};
use archibus_db::DbPool;
use async_trait::async_trait;

use super::{DeliveryLog, EventStore, StoreError, SubscriptionStore};
use crate::envelope::EventEnvelope;

/// PostgreSQL unique-violation SQLSTATE.
const UNIQUE_VIOLATION: &str = "23505";

/// Map unique-constraint violations to [`StoreError::Conflict`].
fn map_insert_error(err: sqlx::Error, what: &str) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) {
            return StoreError::Conflict(format!("{what} already exists"));
        }
    }
    StoreError::Database(err)
}

pub struct PgEventStore {
    pool: DbPool,
}

impl PgEventStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventStore for PgEventStore {
    async fn append(&self, event: CreateEvent) -> Result<EventEnvelope, StoreError> {
        let row = EventRepo::insert(&self.pool, &event).await?;
        Ok(row.into())
    }

    async fn find_by_event_id(&self, event_id: &str) -> Result<Vec<EventEnvelope>, StoreError> {
        let rows = EventRepo::list_by_event_id(&self.pool, event_id).await?;
        Ok(rows.into_iter().map(EventEnvelope::from).collect())
    }
}

pub struct PgSubscriptionStore {
    pool: DbPool,
}

impl PgSubscriptionStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubscriptionStore for PgSubscriptionStore {
    async fn create(&self, input: CreateSubscription) -> Result<Subscription, StoreError> {
        SubscriptionRepo::create(&self.pool, &input)
            .await
            .map_err(|e| map_insert_error(e, &format!("Subscription '{}'", input.id)))
    }

    async fn list(&self) -> Result<Vec<Subscription>, StoreError> {
        Ok(SubscriptionRepo::list(&self.pool).await?)
    }

    async fn list_for_event_type(
        &self,
        event_type: &str,
    ) -> Result<Vec<Subscription>, StoreError> {
        Ok(SubscriptionRepo::list_for_event_type(&self.pool, event_type).await?)
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        Ok(SubscriptionRepo::delete(&self.pool, id).await?)
    }
}

pub struct PgDeliveryLog {
    pool: DbPool,
}

impl PgDeliveryLog {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DeliveryLog for PgDeliveryLog {
    async fn create(&self, input: CreateDelivery) -> Result<DbId, StoreError> {
        let row = DeliveryRepo::create(&self.pool, &input).await?;
        Ok(row.id)
    }

    async fn update(&self, id: DbId, input: UpdateDelivery) -> Result<(), StoreError> {
        if !DeliveryRepo::update(&self.pool, id, &input).await? {
            tracing::warn!(delivery_id = id, "Delivery record vanished before update");
        }
        Ok(())
    }

    async fn list_for_event(&self, event_id: &str) -> Result<Vec<Delivery>, StoreError> {
        Ok(DeliveryRepo::list_for_event(&self.pool, event_id).await?)
    }

    async fn list_by_state(
        &self,
        state: DeliveryState,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Delivery>, StoreError> {
        Ok(DeliveryRepo::list_by_state(&self.pool, state, limit, offset).await?)
    }
}
