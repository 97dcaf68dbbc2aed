//! Delivery-attempt record model.

use archibus_core::delivery::DeliveryState;
use archibus_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `deliveries` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Delivery {
    pub id: DbId,
    pub event_id: String,
    pub subscription_id: String,
    pub callback_url: String,
    pub state: String,
    pub attempt_count: i32,
    pub last_error: Option<String>,
    pub last_status_code: Option<i16>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Delivery {
    /// Parsed state. Rows are constrained by a CHECK, so parsing only fails
    /// if the schema and the enum drift apart.
    pub fn parsed_state(&self) -> Option<DeliveryState> {
        self.state.parse().ok()
    }
}

/// DTO for recording a new delivery.
#[derive(Debug, Clone)]
pub struct CreateDelivery {
    pub event_id: String,
    pub subscription_id: String,
    pub callback_url: String,
    pub state: DeliveryState,
}

/// Progress update for an existing delivery.
#[derive(Debug, Clone)]
pub struct UpdateDelivery {
    pub state: DeliveryState,
    pub attempt_count: i32,
    pub last_error: Option<String>,
    pub last_status_code: Option<i16>,
}
