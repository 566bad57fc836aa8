//! Quote submission repository.

use sqlx::PgPool;

use domain::errors::QuoteError;
use domain::models::{NewSubmission, SubmissionRecord};
use domain::services::SubmissionStore;

use super::{db_error, is_unique_violation};
use crate::entities::SubmissionEntity;
use crate::metrics::QueryTimer;

/// Repository for persisted quote submissions.
#[derive(Clone)]
pub struct SubmissionRepository {
    pool: PgPool,
}

impl SubmissionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl SubmissionStore for SubmissionRepository {
    async fn find_by_idempotency_key(
        &self,
        key: &str,
    ) -> Result<Option<SubmissionRecord>, QuoteError> {
        let timer = QueryTimer::new("find_submission_by_key");
        let result = sqlx::query_as::<_, SubmissionEntity>(
            r#"
            SELECT id, idempotency_key, product, modality, company_name, tax_id,
                   contact_email, template_id, fallback_kind, subject, body, status,
                   payload, created_at
            FROM quote_submissions
            WHERE idempotency_key = $1
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await;
        timer.record();

        result
            .map_err(|e| db_error("find_submission_by_key", e))?
            .map(SubmissionRecord::try_from)
            .transpose()
    }

    async fn insert(&self, submission: NewSubmission) -> Result<SubmissionRecord, QuoteError> {
        let record = SubmissionRecord::from_new(submission, chrono::Utc::now());

        let timer = QueryTimer::new("insert_submission");
        let result = sqlx::query(
            r#"
            INSERT INTO quote_submissions (
                id, idempotency_key, product, modality, company_name, tax_id,
                contact_email, template_id, fallback_kind, subject, body, status,
                payload, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(record.id)
        .bind(&record.idempotency_key)
        .bind(record.product.as_str())
        .bind(record.modality.map(|m| m.as_str()))
        .bind(&record.company_name)
        .bind(&record.tax_id)
        .bind(&record.contact_email)
        .bind(record.template_id)
        .bind(record.fallback_kind.as_str())
        .bind(&record.subject)
        .bind(&record.body)
        .bind(record.status.as_str())
        .bind(&record.payload)
        .bind(record.created_at)
        .execute(&self.pool)
        .await;
        timer.record();

        match result {
            Ok(_) => Ok(record),
            Err(e) if is_unique_violation(&e) => {
                let existing_id = self
                    .find_by_idempotency_key(&record.idempotency_key)
                    .await
                    .ok()
                    .flatten()
                    .map(|r| r.id);
                Err(QuoteError::DuplicateSubmission {
                    idempotency_key: record.idempotency_key,
                    existing_id,
                })
            }
            Err(e) => Err(db_error("insert_submission", e)),
        }
    }
}
