//! Repository for the append-only `events` table.

use sqlx::PgPool;

use crate::models::event::{CreateEvent, Event};

/// Column list for `events` queries.
const COLUMNS: &str = "id, event_id, event_type, payload, source_service, created_at";

/// Append and read operations for events. There is no update or delete.
pub struct EventRepo;

impl EventRepo {
    /// Append a new event row, returning it with its store-assigned timestamp.
    pub async fn insert(pool: &PgPool, input: &CreateEvent) -> Result<Event, sqlx::Error> {
        let query = format!(
            "INSERT INTO events (event_id, event_type, payload, source_service) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Event>(&query)
            .bind(&input.event_id)
            .bind(&input.event_type)
            .bind(&input.payload)
            .bind(&input.source_service)
            .fetch_one(pool)
            .await
    }

    /// All rows stored under an event id, oldest first.
    ///
    /// Ids are not deduplicated, so more than one row may come back.
    pub async fn list_by_event_id(
        pool: &PgPool,
        event_id: &str,
    ) -> Result<Vec<Event>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM events WHERE event_id = $1 ORDER BY id ASC");
        sqlx::query_as::<_, Event>(&query)
            .bind(event_id)
            .fetch_all(pool)
            .await
    }
}
