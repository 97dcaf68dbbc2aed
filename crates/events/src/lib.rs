//! Archibus event bus.
//!
//! Building blocks, leaves first:
//!
//! - [`store`] -- append-only event store, subscription registry and
//!   delivery log behind async traits, with PostgreSQL and in-memory
//!   implementations.
//! - [`BroadcastChannel`] -- best-effort per-topic fan-out for co-located
//!   listeners, backed by `tokio::sync::broadcast`.
//! - [`delivery`] -- outbound webhook requests and the `reqwest` sender.
//! - [`DeliveryDispatcher`] -- bounded worker pool that drives each
//!   (event, subscription) delivery through retry to a terminal state.
//! - [`AuditEmitter`] -- never-failing front for the external audit sink.
//! - [`EventBusService`] -- publish / subscribe / unsubscribe orchestration.

pub mod audit;
pub mod bus;
pub mod delivery;
pub mod dispatcher;
pub mod envelope;
pub mod service;
pub mod store;

pub use audit::{
    AuditEmitter, AuditRecord, AuditSink, LogAuditSink, MemoryAuditSink, PgAuditSink,
};
pub use bus::BroadcastChannel;
pub use delivery::webhook::{HttpWebhookSender, WebhookError, WebhookSender};
pub use delivery::{BodyMode, DeliveryRequest};
pub use dispatcher::{DeliveryDispatcher, DeliveryOutcome, DispatchError, DispatcherConfig};
pub use envelope::EventEnvelope;
pub use service::{
    BusError, EventBusService, PublishRequest, SubscribeRequest, UnsubscribeRequest,
    SUBSCRIPTION_LOOKUP_FAILED,
};
pub use store::{DeliveryLog, EventStore, StoreError, Stores, SubscriptionStore};
