//! Repository for the hash-chained `audit_logs` table.

use archibus_core::audit::{canonical_entry, compute_integrity_hash};
use archibus_core::types::DbId;
use sqlx::PgPool;

use crate::models::audit::{AuditLog, CreateAuditLog};

const COLUMNS: &str = "id, action_type, actor_service, details_json, integrity_hash, created_at";

/// Arbitrary key for the advisory lock serializing chain appends.
const CHAIN_LOCK_KEY: i64 = 0x6172_6368_6175_6474;

/// Append and query operations for audit entries.
pub struct AuditLogRepo;

impl AuditLogRepo {
    /// Append an entry, linking it to the previous entry's hash.
    ///
    /// The read of the previous hash and the insert run in one transaction
    /// holding an advisory lock, so concurrent appends cannot fork the chain.
    pub async fn append(pool: &PgPool, input: &CreateAuditLog) -> Result<AuditLog, sqlx::Error> {
        let mut tx = pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(CHAIN_LOCK_KEY)
            .execute(&mut *tx)
            .await?;

        let prev_hash: Option<String> =
            sqlx::query_scalar("SELECT integrity_hash FROM audit_logs ORDER BY id DESC LIMIT 1")
                .fetch_optional(&mut *tx)
                .await?;

        let entry = canonical_entry(
            &input.action_type,
            input.actor_service.as_deref(),
            &input.details_json,
        );
        let hash = compute_integrity_hash(prev_hash.as_deref(), &entry);

        let query = format!(
            "INSERT INTO audit_logs (action_type, actor_service, details_json, integrity_hash) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {COLUMNS}"
        );
        let row = sqlx::query_as::<_, AuditLog>(&query)
            .bind(&input.action_type)
            .bind(&input.actor_service)
            .bind(&input.details_json)
            .bind(&hash)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(row)
    }

    /// Entries of one action type, oldest first.
    pub async fn list_by_action(
        pool: &PgPool,
        action_type: &str,
    ) -> Result<Vec<AuditLog>, sqlx::Error> {
        let query =
            format!("SELECT {COLUMNS} FROM audit_logs WHERE action_type = $1 ORDER BY id ASC");
        sqlx::query_as::<_, AuditLog>(&query)
            .bind(action_type)
            .fetch_all(pool)
            .await
    }

    /// Recompute the whole chain and return the id of the first entry whose
    /// stored hash does not match, or `None` when the chain is intact.
    pub async fn verify_chain(pool: &PgPool) -> Result<Option<DbId>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM audit_logs ORDER BY id ASC");
        let rows = sqlx::query_as::<_, AuditLog>(&query).fetch_all(pool).await?;

        let mut prev: Option<String> = None;
        for row in rows {
            let entry = canonical_entry(
                &row.action_type,
                row.actor_service.as_deref(),
                &row.details_json,
            );
            let expected = compute_integrity_hash(prev.as_deref(), &entry);
            if expected != row.integrity_hash {
                tracing::warn!(audit_id = row.id, "Audit chain mismatch");
                return Ok(Some(row.id));
            }
            prev = Some(row.integrity_hash);
        }
        Ok(None)
    }
}
