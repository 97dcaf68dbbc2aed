//! Repository for the `subscriptions` table.

use sqlx::PgPool;

use crate::models::subscription::{CreateSubscription, Subscription};

const COLUMNS: &str = "id, event_type, subscriber_service, callback_url, secret, created_at";

/// Create, list and delete operations for subscriptions. There is no update:
/// changing a callback is unsubscribe followed by subscribe.
pub struct SubscriptionRepo;

impl SubscriptionRepo {
    /// Insert a subscription. A duplicate `id` violates `uq_subscriptions_id`.
    pub async fn create(
        pool: &PgPool,
        input: &CreateSubscription,
    ) -> Result<Subscription, sqlx::Error> {
        let query = format!(
            "INSERT INTO subscriptions (id, event_type, subscriber_service, callback_url, secret) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Subscription>(&query)
            .bind(&input.id)
            .bind(&input.event_type)
            .bind(&input.subscriber_service)
            .bind(&input.callback_url)
            .bind(&input.secret)
            .fetch_one(pool)
            .await
    }

    /// List every subscription, oldest first. Unpaginated.
    pub async fn list(pool: &PgPool) -> Result<Vec<Subscription>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM subscriptions ORDER BY created_at ASC, id ASC");
        sqlx::query_as::<_, Subscription>(&query).fetch_all(pool).await
    }

    /// Subscriptions whose `event_type` equals the given one exactly.
    pub async fn list_for_event_type(
        pool: &PgPool,
        event_type: &str,
    ) -> Result<Vec<Subscription>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM subscriptions WHERE event_type = $1 \
             ORDER BY created_at ASC, id ASC"
        );
        sqlx::query_as::<_, Subscription>(&query)
            .bind(event_type)
            .fetch_all(pool)
            .await
    }

    /// Delete by id. Returns `false` when no row matched.
    pub async fn delete(pool: &PgPool, id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM subscriptions WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
