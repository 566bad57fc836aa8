//! Operator notification repository.
//!
//! Doubles as the `database` notification channel.

use sqlx::PgPool;

use domain::errors::QuoteError;
use domain::models::{ChannelKind, NotificationRecord};
use domain::services::{ChannelError, NotificationChannel};

use super::db_error;
use crate::entities::NotificationEntity;
use crate::metrics::QueryTimer;

/// Repository for persisted operator notifications.
#[derive(Clone)]
pub struct NotificationRepository {
    pool: PgPool,
}

impl NotificationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, record: &NotificationRecord) -> Result<(), QuoteError> {
        let row = NotificationEntity::from(record);

        let timer = QueryTimer::new("insert_operator_notification");
        let result = sqlx::query(
            r#"
            INSERT INTO operator_notifications (
                id, kind, title, message, severity, source, error, context, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(row.id)
        .bind(&row.kind)
        .bind(&row.title)
        .bind(&row.message)
        .bind(&row.severity)
        .bind(&row.source)
        .bind(&row.error)
        .bind(&row.context)
        .bind(row.created_at)
        .execute(&self.pool)
        .await;
        timer.record();

        result
            .map(|_| ())
            .map_err(|e| db_error("insert_operator_notification", e))
    }
}

#[async_trait::async_trait]
impl NotificationChannel for NotificationRepository {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Database
    }

    async fn deliver(&self, record: &NotificationRecord) -> Result<(), ChannelError> {
        self.insert(record)
            .await
            .map_err(|e| ChannelError::Unavailable(e.to_string()))
    }
}
