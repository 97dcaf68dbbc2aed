//! Subscription entity model.

use archibus_core::types::Timestamp;
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `subscriptions` table.
///
/// The optional signing `secret` is never serialized.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Subscription {
    pub id: String,
    pub event_type: String,
    pub subscriber_service: String,
    pub callback_url: String,
    #[serde(skip_serializing)]
    pub secret: Option<String>,
    pub created_at: Timestamp,
}

/// DTO for creating a subscription. All fields are already validated.
#[derive(Debug, Clone)]
pub struct CreateSubscription {
    pub id: String,
    pub event_type: String,
    pub subscriber_service: String,
    pub callback_url: String,
    pub secret: Option<String>,
}
