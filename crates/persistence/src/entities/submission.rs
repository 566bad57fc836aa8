//! Quote submission entity (database row mapping).

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use domain::errors::QuoteError;
use domain::models::SubmissionRecord;

use super::{parse_column, parse_optional_column};

/// Database row mapping for the quote_submissions table.
#[derive(Debug, Clone, FromRow)]
pub struct SubmissionEntity {
    pub id: Uuid,
    pub idempotency_key: String,
    pub product: String,
    pub modality: Option<String>,
    pub company_name: String,
    pub tax_id: String,
    pub contact_email: String,
    pub template_id: Uuid,
    pub fallback_kind: String,
    pub subject: String,
    pub body: String,
    pub status: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<SubmissionEntity> for SubmissionRecord {
    type Error = QuoteError;

    fn try_from(entity: SubmissionEntity) -> Result<Self, Self::Error> {
        Ok(Self {
            product: parse_column("quote_submissions.product", &entity.product)?,
            modality: parse_optional_column(
                "quote_submissions.modality",
                entity.modality.as_deref(),
            )?,
            fallback_kind: parse_column("quote_submissions.fallback_kind", &entity.fallback_kind)?,
            status: parse_column("quote_submissions.status", &entity.status)?,
            id: entity.id,
            idempotency_key: entity.idempotency_key,
            company_name: entity.company_name,
            tax_id: entity.tax_id,
            contact_email: entity.contact_email,
            template_id: entity.template_id,
            subject: entity.subject,
            body: entity.body,
            payload: entity.payload,
            created_at: entity.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::models::{FallbackKind, FormKind, SubmissionStatus};

    #[test]
    fn test_entity_into_record() {
        let entity = SubmissionEntity {
            id: Uuid::new_v4(),
            idempotency_key: "abc123".to_string(),
            product: "crm".to_string(),
            modality: None,
            company_name: "Acme Ltd".to_string(),
            tax_id: "B12345678".to_string(),
            contact_email: "buyer@acme.test".to_string(),
            template_id: Uuid::new_v4(),
            fallback_kind: "form_default".to_string(),
            subject: "Quote".to_string(),
            body: "Body".to_string(),
            status: "pending_approval".to_string(),
            payload: serde_json::json!({"company_name": "Acme Ltd"}),
            created_at: Utc::now(),
        };

        let record = SubmissionRecord::try_from(entity).unwrap();
        assert_eq!(record.product, FormKind::Crm);
        assert_eq!(record.fallback_kind, FallbackKind::FormDefault);
        assert_eq!(record.status, SubmissionStatus::PendingApproval);
        assert_eq!(record.modality, None);
    }
}
