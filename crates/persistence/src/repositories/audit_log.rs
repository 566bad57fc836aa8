//! Audit log repository for database operations.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use domain::errors::QuoteError;
use domain::models::AuditLogEntry;
use domain::services::AuditLogStore;

use super::db_error;
use crate::entities::AuditLogEntity;
use crate::metrics::QueryTimer;

/// Persistent mirror of the in-memory audit trail.
#[derive(Clone)]
pub struct AuditLogRepository {
    pool: PgPool,
}

impl AuditLogRepository {
    /// Create a new repository instance.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl AuditLogStore for AuditLogRepository {
    async fn append(&self, entry: &AuditLogEntry) -> Result<(), QuoteError> {
        let row = AuditLogEntity::from(entry);

        let timer = QueryTimer::new("insert_audit_entry");
        let result = sqlx::query(
            r#"
            INSERT INTO audit_log_entries (
                id, timestamp, operation, entity_kind, entity_id, actor_id, details,
                result, duration_ms, error_code, error_message, error_severity,
                error_temporary
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(row.id)
        .bind(row.timestamp)
        .bind(&row.operation)
        .bind(&row.entity_kind)
        .bind(&row.entity_id)
        .bind(&row.actor_id)
        .bind(&row.details)
        .bind(&row.result)
        .bind(row.duration_ms)
        .bind(&row.error_code)
        .bind(&row.error_message)
        .bind(&row.error_severity)
        .bind(row.error_temporary)
        .execute(&self.pool)
        .await;
        timer.record();

        result
            .map(|_| ())
            .map_err(|e| db_error("insert_audit_entry", e))
    }

    async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, QuoteError> {
        let timer = QueryTimer::new("prune_audit_entries");
        let result = sqlx::query("DELETE FROM audit_log_entries WHERE timestamp < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await;
        timer.record();

        result
            .map(|r| r.rows_affected())
            .map_err(|e| db_error("prune_audit_entries", e))
    }
}
