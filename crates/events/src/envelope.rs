//! The event envelope that flows from the store through the dispatcher.

use archibus_core::types::Timestamp;
use archibus_db::models::event::Event;
use serde::{Deserialize, Serialize};

/// A persisted, immutable event.
///
/// `source_service` comes from the identity gate, `timestamp` from the
/// store at persistence time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_id: String,
    pub event_type: String,
    pub source_service: String,
    pub timestamp: Timestamp,
    pub payload: serde_json::Value,
}

impl From<Event> for EventEnvelope {
    fn from(row: Event) -> Self {
        Self {
            event_id: row.event_id,
            event_type: row.event_type,
            source_service: row.source_service,
            timestamp: row.created_at,
            payload: row.payload,
        }
    }
}

/// Generate a server-side event or subscription id.
///
/// UUID v7 keeps generated ids roughly time-ordered.
pub fn generate_id() -> String {
    uuid::Uuid::now_v7().to_string()
}
