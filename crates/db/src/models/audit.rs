//! Audit log entity model. Immutable once written (no `updated_at`).

use archibus_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A single hash-chained audit entry.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AuditLog {
    pub id: DbId,
    pub action_type: String,
    pub actor_service: Option<String>,
    pub details_json: serde_json::Value,
    pub integrity_hash: String,
    pub created_at: Timestamp,
}

/// DTO for inserting an audit entry. Details must already be redacted.
#[derive(Debug, Clone)]
pub struct CreateAuditLog {
    pub action_type: String,
    pub actor_service: Option<String>,
    pub details_json: serde_json::Value,
}
