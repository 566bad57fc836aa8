//! Audit log entity.

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::FromRow;
use uuid::Uuid;

use domain::errors::QuoteError;
use domain::models::{AuditError, AuditLogEntry};

use super::parse_column;

/// Database entity for mirrored audit entries.
///
/// The structured error is flattened into nullable columns.
#[derive(Debug, Clone, FromRow)]
pub struct AuditLogEntity {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub operation: String,
    pub entity_kind: String,
    pub entity_id: Option<String>,
    pub actor_id: Option<String>,
    pub details: JsonValue,
    pub result: String,
    pub duration_ms: Option<i64>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub error_severity: Option<String>,
    pub error_temporary: Option<bool>,
}

impl From<&AuditLogEntry> for AuditLogEntity {
    fn from(entry: &AuditLogEntry) -> Self {
        Self {
            id: entry.id,
            timestamp: entry.timestamp,
            operation: entry.operation.as_str().to_string(),
            entity_kind: entry.entity_kind.as_str().to_string(),
            entity_id: entry.entity_id.clone(),
            actor_id: entry.actor_id.clone(),
            details: JsonValue::Object(entry.details.clone()),
            result: entry.result.as_str().to_string(),
            duration_ms: entry
                .duration_ms
                .map(|ms| i64::try_from(ms).unwrap_or(i64::MAX)),
            error_code: entry.error.as_ref().map(|e| e.code.as_str().to_string()),
            error_message: entry.error.as_ref().map(|e| e.message.clone()),
            error_severity: entry.error.as_ref().map(|e| e.severity.as_str().to_string()),
            error_temporary: entry.error.as_ref().map(|e| e.temporary),
        }
    }
}

impl TryFrom<AuditLogEntity> for AuditLogEntry {
    type Error = QuoteError;

    fn try_from(entity: AuditLogEntity) -> Result<Self, Self::Error> {
        let error = match (entity.error_code, entity.error_severity) {
            (Some(code), Some(severity)) => Some(AuditError {
                code: parse_column("audit_log_entries.error_code", &code)?,
                severity: parse_column("audit_log_entries.error_severity", &severity)?,
                message: entity.error_message.unwrap_or_default(),
                temporary: entity.error_temporary.unwrap_or(false),
            }),
            _ => None,
        };

        let details = match entity.details {
            JsonValue::Object(map) => map,
            _ => serde_json::Map::new(),
        };

        Ok(Self {
            id: entity.id,
            timestamp: entity.timestamp,
            operation: parse_column("audit_log_entries.operation", &entity.operation)?,
            entity_kind: parse_column("audit_log_entries.entity_kind", &entity.entity_kind)?,
            entity_id: entity.entity_id,
            actor_id: entity.actor_id,
            details,
            result: parse_column("audit_log_entries.result", &entity.result)?,
            duration_ms: entity.duration_ms.and_then(|ms| u64::try_from(ms).ok()),
            error,
        })
    }
}
