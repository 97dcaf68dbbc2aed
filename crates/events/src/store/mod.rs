//! Storage seams for the bus.
//!
//! The event store is append-only, the subscription registry supports
//! create / list / delete, and the delivery log is best-effort bookkeeping.
//! [`postgres`] backs them with the `archibus-db` repositories; [`memory`]
//! keeps everything in process for development and tests.

use std::sync::Arc;

use archibus_core::delivery::DeliveryState;
use archibus_core::types::DbId;
use archibus_db::models::delivery::{CreateDelivery, Delivery, UpdateDelivery};
use archibus_db::models::event::CreateEvent;
use archibus_db::models::subscription::{CreateSubscription, Subscription};
use archibus_db::DbPool;
use async_trait::async_trait;

use crate::envelope::EventEnvelope;

pub mod memory;
pub mod postgres;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A record with the same unique key already exists.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The underlying database rejected or failed the operation.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Any other backend failure (e.g. a poisoned in-memory lock).
    #[error("Storage error: {0}")]
    Backend(String),
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Append-only event log. Events are never updated or deleted.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Persist an event; the store assigns the timestamp.
    async fn append(&self, event: CreateEvent) -> Result<EventEnvelope, StoreError>;

    /// Every stored event with this id, oldest first.
    async fn find_by_event_id(&self, event_id: &str) -> Result<Vec<EventEnvelope>, StoreError>;
}

/// Registry of (event type -> callback) subscriptions.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn create(&self, input: CreateSubscription) -> Result<Subscription, StoreError>;

    async fn list(&self) -> Result<Vec<Subscription>, StoreError>;

    /// Subscriptions whose event type equals `event_type` exactly.
    async fn list_for_event_type(&self, event_type: &str)
        -> Result<Vec<Subscription>, StoreError>;

    /// Returns `false` when nothing was deleted.
    async fn delete(&self, id: &str) -> Result<bool, StoreError>;
}

/// Record of delivery attempts, queryable by event and by state.
#[async_trait]
pub trait DeliveryLog: Send + Sync {
    async fn create(&self, input: CreateDelivery) -> Result<DbId, StoreError>;

    async fn update(&self, id: DbId, input: UpdateDelivery) -> Result<(), StoreError>;

    async fn list_for_event(&self, event_id: &str) -> Result<Vec<Delivery>, StoreError>;

    async fn list_by_state(
        &self,
        state: DeliveryState,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Delivery>, StoreError>;
}

// ---------------------------------------------------------------------------
// Stores bundle
// ---------------------------------------------------------------------------

/// The three stores a bus instance is composed from. One per process.
#[derive(Clone)]
pub struct Stores {
    pub events: Arc<dyn EventStore>,
    pub subscriptions: Arc<dyn SubscriptionStore>,
    pub deliveries: Arc<dyn DeliveryLog>,
}

impl Stores {
    /// PostgreSQL-backed stores sharing one pool.
    pub fn postgres(pool: DbPool) -> Self {
        Self {
            events: Arc::new(postgres::PgEventStore::new(pool.clone())),
            subscriptions: Arc::new(postgres::PgSubscriptionStore::new(pool.clone())),
            deliveries: Arc::new(postgres::PgDeliveryLog::new(pool)),
        }
    }

    /// Process-local stores. Nothing survives a restart.
    pub fn in_memory() -> Self {
        Self {
            events: Arc::new(memory::MemoryEventStore::new()),
            subscriptions: Arc::new(memory::MemorySubscriptionStore::new()),
            deliveries: Arc::new(memory::MemoryDeliveryLog::new()),
        }
    }
}
