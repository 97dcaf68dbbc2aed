//! Event entity model.

use archibus_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the append-only `events` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Event {
    #[serde(skip_serializing)]
    pub id: DbId,
    pub event_id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub source_service: String,
    /// Assigned by the database at insert time.
    #[serde(rename = "timestamp")]
    pub created_at: Timestamp,
}

/// DTO for appending an event.
#[derive(Debug, Clone)]
pub struct CreateEvent {
    pub event_id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub source_service: String,
}
