//! Operator notification entity.

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::FromRow;
use uuid::Uuid;

use domain::errors::QuoteError;
use domain::models::NotificationRecord;

use super::parse_column;

/// Database row mapping for the operator_notifications table.
#[derive(Debug, Clone, FromRow)]
pub struct NotificationEntity {
    pub id: Uuid,
    pub kind: String,
    pub title: String,
    pub message: String,
    pub severity: String,
    pub source: String,
    pub error: Option<JsonValue>,
    pub context: Option<JsonValue>,
    pub created_at: DateTime<Utc>,
}

impl From<&NotificationRecord> for NotificationEntity {
    fn from(record: &NotificationRecord) -> Self {
        Self {
            id: record.id,
            kind: record.kind.as_str().to_string(),
            title: record.title.clone(),
            message: record.message.clone(),
            severity: record.severity.as_str().to_string(),
            source: record.source.clone(),
            error: record
                .error
                .as_ref()
                .and_then(|e| serde_json::to_value(e).ok()),
            context: record.context.clone().map(JsonValue::Object),
            created_at: record.timestamp,
        }
    }
}

impl TryFrom<NotificationEntity> for NotificationRecord {
    type Error = QuoteError;

    fn try_from(entity: NotificationEntity) -> Result<Self, Self::Error> {
        let error = entity
            .error
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| QuoteError::database("decode operator_notifications.error", e))?;

        let context = match entity.context {
            Some(JsonValue::Object(map)) => Some(map),
            _ => None,
        };

        Ok(Self {
            id: entity.id,
            kind: parse_column("operator_notifications.kind", &entity.kind)?,
            title: entity.title,
            message: entity.message,
            severity: parse_column("operator_notifications.severity", &entity.severity)?,
            timestamp: entity.created_at,
            source: entity.source,
            error,
            context,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::models::{NotificationError, NotificationKind, Severity};

    #[test]
    fn test_record_survives_row_mapping() {
        let mut context = serde_json::Map::new();
        context.insert("operation".to_string(), serde_json::json!("send_directly"));

        let record = NotificationRecord {
            id: Uuid::new_v4(),
            kind: NotificationKind::Error,
            title: "Error: delivery_failed".to_string(),
            message: "Message delivery failed: mailbox busy".to_string(),
            severity: Severity::Error,
            timestamp: Utc::now(),
            source: "quote-desk".to_string(),
            error: Some(NotificationError {
                code: "delivery_failed".to_string(),
                message: "mailbox busy".to_string(),
                detail: None,
            }),
            context: Some(context),
        };

        let row = NotificationEntity::from(&record);
        assert_eq!(row.severity, "error");

        let restored = NotificationRecord::try_from(row).unwrap();
        assert_eq!(restored, record);
    }
}
