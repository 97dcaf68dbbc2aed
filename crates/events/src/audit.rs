//! Audit emitter.
//!
//! The bus records `publish`, `subscribe`, `unsubscribe` and
//! `delivery_failed` through an [`AuditSink`]. [`AuditEmitter`] wraps the
//! sink so that a failing sink is logged and never surfaces to the caller.

use std::sync::{Arc, Mutex, PoisonError};

use archibus_core::audit::redact_sensitive_fields;
use archibus_db::models::audit::CreateAuditLog;
use archibus_db::repositories::AuditLogRepo;
use archibus_db::DbPool;
use async_trait::async_trait;

// ---------------------------------------------------------------------------
// Record + error
// ---------------------------------------------------------------------------

/// One audit record. Details are redacted before they reach a sink.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditRecord {
    pub action: String,
    pub actor_service: Option<String>,
    pub details: serde_json::Value,
}

/// Error type for audit sinks.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("Audit database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Audit sink unavailable: {0}")]
    Unavailable(String),
}

// ---------------------------------------------------------------------------
// Sink trait + implementations
// ---------------------------------------------------------------------------

/// External audit log collaborator.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, record: AuditRecord) -> Result<(), AuditError>;
}

/// Writes hash-chained rows to `audit_logs`.
pub struct PgAuditSink {
    pool: DbPool,
}

impl PgAuditSink {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditSink for PgAuditSink {
    async fn record(&self, record: AuditRecord) -> Result<(), AuditError> {
        AuditLogRepo::append(
            &self.pool,
            &CreateAuditLog {
                action_type: record.action,
                actor_service: record.actor_service,
                details_json: record.details,
            },
        )
        .await?;
        Ok(())
    }
}

/// Emits audit records as structured log lines on the `audit` target.
///
/// Used when the bus runs without a database.
#[derive(Debug, Default)]
pub struct LogAuditSink;

#[async_trait]
impl AuditSink for LogAuditSink {
    async fn record(&self, record: AuditRecord) -> Result<(), AuditError> {
        tracing::info!(
            target: "audit",
            action = %record.action,
            actor_service = record.actor_service.as_deref().unwrap_or("-"),
            details = %record.details,
            "Audit record"
        );
        Ok(())
    }
}

/// Keeps records in memory. Handy for inspection in tests.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every record so far.
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Records of one action kind.
    pub fn records_of(&self, action: &str) -> Vec<AuditRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.action == action)
            .collect()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, record: AuditRecord) -> Result<(), AuditError> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Emitter
// ---------------------------------------------------------------------------

/// Never-failing front for an [`AuditSink`].
#[derive(Clone)]
pub struct AuditEmitter {
    sink: Arc<dyn AuditSink>,
}

impl AuditEmitter {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    /// Record an audit event. Sink failures are logged and swallowed.
    pub async fn record(
        &self,
        action: &str,
        actor_service: Option<&str>,
        details: serde_json::Value,
    ) {
        let record = AuditRecord {
            action: action.to_string(),
            actor_service: actor_service.map(str::to_string),
            details: redact_sensitive_fields(&details),
        };

        if let Err(e) = self.sink.record(record).await {
            tracing::warn!(error = %e, action, "Failed to record audit event");
        }
    }
}
