//! Repository for the `deliveries` table.

use archibus_core::delivery::DeliveryState;
use archibus_core::types::DbId;
use sqlx::PgPool;

use crate::models::delivery::{CreateDelivery, Delivery, UpdateDelivery};

const COLUMNS: &str = "\
    id, event_id, subscription_id, callback_url, state, attempt_count, \
    last_error, last_status_code, created_at, updated_at";

/// Bookkeeping for (event, subscription) delivery attempts.
pub struct DeliveryRepo;

impl DeliveryRepo {
    /// Record a new delivery.
    pub async fn create(pool: &PgPool, input: &CreateDelivery) -> Result<Delivery, sqlx::Error> {
        let query = format!(
            "INSERT INTO deliveries (event_id, subscription_id, callback_url, state) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Delivery>(&query)
            .bind(&input.event_id)
            .bind(&input.subscription_id)
            .bind(&input.callback_url)
            .bind(input.state.as_str())
            .fetch_one(pool)
            .await
    }

    /// Overwrite the progress fields of a delivery.
    ///
    /// Returns `false` when the row does not exist.
    pub async fn update(
        pool: &PgPool,
        id: DbId,
        input: &UpdateDelivery,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE deliveries SET \
                 state = $2, \
                 attempt_count = $3, \
                 last_error = $4, \
                 last_status_code = $5 \
             WHERE id = $1",
        )
        .bind(id)
        .bind(input.state.as_str())
        .bind(input.attempt_count)
        .bind(&input.last_error)
        .bind(input.last_status_code)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Every delivery recorded for an event id, oldest first.
    pub async fn list_for_event(
        pool: &PgPool,
        event_id: &str,
    ) -> Result<Vec<Delivery>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM deliveries WHERE event_id = $1 ORDER BY id ASC");
        sqlx::query_as::<_, Delivery>(&query)
            .bind(event_id)
            .fetch_all(pool)
            .await
    }

    /// Deliveries in a given state, newest first, paginated.
    pub async fn list_by_state(
        pool: &PgPool,
        state: DeliveryState,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Delivery>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM deliveries WHERE state = $1 \
             ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3"
        );
        sqlx::query_as::<_, Delivery>(&query)
            .bind(state.as_str())
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }
}
