//! Quote submission domain models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use shared::crypto::digest_parts;
use shared::validation::{validate_field_key, validate_phone, validate_tax_id, MAX_QUOTE_FIELDS};
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::models::{FallbackKind, FormKind, Modality};

/// Quote request payload submitted by the form flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "snake_case")]
pub struct QuoteRequest {
    #[validate(length(min = 1, max = 200, message = "Company name must be 1-200 characters"))]
    pub company_name: String,

    #[validate(custom(function = "validate_tax_id"))]
    pub tax_id: String,

    #[validate(length(min = 1, max = 200, message = "Contact name must be 1-200 characters"))]
    pub contact_name: String,

    #[validate(email(message = "Invalid email format"))]
    pub contact_email: String,

    #[validate(custom(function = "validate_phone"))]
    pub phone: Option<String>,

    pub modality: Option<Modality>,

    /// Product-specific answers, also available as template variables.
    #[serde(default)]
    #[validate(custom(function = "validate_fields"))]
    pub fields: BTreeMap<String, String>,

    /// Optional reference supplied by the client to distinguish otherwise
    /// identical requests.
    #[validate(length(max = 100, message = "Client reference must be at most 100 characters"))]
    pub client_reference: Option<String>,
}

fn validate_fields(fields: &BTreeMap<String, String>) -> Result<(), ValidationError> {
    if fields.len() > MAX_QUOTE_FIELDS {
        let mut err = ValidationError::new("too_many_fields");
        err.message = Some(format!("At most {} fields are allowed", MAX_QUOTE_FIELDS).into());
        return Err(err);
    }
    fields.keys().try_for_each(|key| validate_field_key(key))
}

impl QuoteRequest {
    /// Deterministic idempotency key over the identifying fields plus product.
    ///
    /// Email and tax id are normalised so that cosmetic differences do not
    /// defeat duplicate detection.
    pub fn idempotency_key(&self, product: FormKind) -> String {
        let mut parts: Vec<String> = vec![
            product.as_str().to_string(),
            self.modality.map(|m| m.as_str()).unwrap_or("").to_string(),
            self.company_name.trim().to_string(),
            normalize_tax_id(&self.tax_id),
            self.contact_email.trim().to_lowercase(),
            self.client_reference.clone().unwrap_or_default(),
        ];
        for (key, value) in &self.fields {
            parts.push(format!("{}={}", key, value));
        }
        digest_parts(parts)
    }

    /// Variables available to `{{placeholder}}` substitution.
    pub fn template_variables(&self, product: FormKind) -> HashMap<String, String> {
        let mut vars: HashMap<String, String> = self
            .fields
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        vars.insert("company_name".to_string(), self.company_name.clone());
        vars.insert("tax_id".to_string(), self.tax_id.clone());
        vars.insert("contact_name".to_string(), self.contact_name.clone());
        vars.insert("contact_email".to_string(), self.contact_email.clone());
        vars.insert("product".to_string(), product.to_string());
        if let Some(phone) = &self.phone {
            vars.insert("phone".to_string(), phone.clone());
        }
        if let Some(modality) = self.modality {
            vars.insert("modality".to_string(), modality.to_string());
        }
        if let Some(reference) = &self.client_reference {
            vars.insert("client_reference".to_string(), reference.clone());
        }
        vars
    }
}

fn normalize_tax_id(tax_id: &str) -> String {
    tax_id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Status of a persisted submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    /// Queued for operator approval.
    PendingApproval,
    /// Sent directly to the contact.
    Sent,
}

impl SubmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::PendingApproval => "pending_approval",
            SubmissionStatus::Sent => "sent",
        }
    }
}

impl FromStr for SubmissionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending_approval" => Ok(SubmissionStatus::PendingApproval),
            "sent" => Ok(SubmissionStatus::Sent),
            _ => Err(format!("Unknown submission status: {}", s)),
        }
    }
}

impl std::fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Input for persisting a submission.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSubmission {
    pub idempotency_key: String,
    pub product: FormKind,
    pub modality: Option<Modality>,
    pub company_name: String,
    pub tax_id: String,
    pub contact_email: String,
    pub template_id: Uuid,
    pub fallback_kind: FallbackKind,
    pub subject: String,
    pub body: String,
    pub status: SubmissionStatus,
    pub payload: JsonValue,
}

/// A persisted submission record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SubmissionRecord {
    pub id: Uuid,
    pub idempotency_key: String,
    pub product: FormKind,
    pub modality: Option<Modality>,
    pub company_name: String,
    pub tax_id: String,
    pub contact_email: String,
    pub template_id: Uuid,
    pub fallback_kind: FallbackKind,
    pub subject: String,
    pub body: String,
    pub status: SubmissionStatus,
    pub payload: JsonValue,
    pub created_at: DateTime<Utc>,
}

impl SubmissionRecord {
    pub fn from_new(input: NewSubmission, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            idempotency_key: input.idempotency_key,
            product: input.product,
            modality: input.modality,
            company_name: input.company_name,
            tax_id: input.tax_id,
            contact_email: input.contact_email,
            template_id: input.template_id,
            fallback_kind: input.fallback_kind,
            subject: input.subject,
            body: input.body,
            status: input.status,
            payload: input.payload,
            created_at,
        }
    }
}

/// Response returned to the form flow for a queued submission.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct SubmissionReceipt {
    pub submission_id: Uuid,
    pub status: SubmissionStatus,
}

#[cfg(test)]
mod tests {
    use super::*;
    use fake::faker::company::en::CompanyName;
    use fake::faker::internet::en::SafeEmail;
    use fake::faker::name::en::Name;
    use fake::Fake;

    fn request() -> QuoteRequest {
        QuoteRequest {
            company_name: CompanyName().fake(),
            tax_id: "B12345678".to_string(),
            contact_name: Name().fake(),
            contact_email: SafeEmail().fake(),
            phone: Some("+34 600 123 456".to_string()),
            modality: Some(Modality::Saas),
            fields: BTreeMap::from([("seats".to_string(), "25".to_string())]),
            client_reference: None,
        }
    }

    #[test]
    fn test_valid_request() {
        assert!(request().validate().is_ok());
    }

    #[test]
    fn test_invalid_email_rejected() {
        let mut r = request();
        r.contact_email = "not-an-email".to_string();
        assert!(r.validate().is_err());
    }

    #[test]
    fn test_invalid_field_key_rejected() {
        let mut r = request();
        r.fields.insert("bad key".to_string(), "x".to_string());
        assert!(r.validate().is_err());
    }

    #[test]
    fn test_idempotency_key_is_deterministic() {
        let r = request();
        assert_eq!(r.idempotency_key(FormKind::Erp), r.clone().idempotency_key(FormKind::Erp));
    }

    #[test]
    fn test_idempotency_key_depends_on_product() {
        let r = request();
        assert_ne!(r.idempotency_key(FormKind::Erp), r.idempotency_key(FormKind::Crm));
    }

    #[test]
    fn test_idempotency_key_normalises_email_and_tax_id() {
        let r = request();
        let mut cosmetic = r.clone();
        cosmetic.contact_email = format!("  {}  ", r.contact_email.to_uppercase());
        cosmetic.tax_id = "b-1234.5678".to_string();
        assert_eq!(r.idempotency_key(FormKind::Erp), cosmetic.idempotency_key(FormKind::Erp));
    }

    #[test]
    fn test_idempotency_key_depends_on_fields() {
        let r = request();
        let mut other = r.clone();
        other.fields.insert("seats".to_string(), "26".to_string());
        assert_ne!(r.idempotency_key(FormKind::Erp), other.idempotency_key(FormKind::Erp));
    }

    #[test]
    fn test_template_variables() {
        let r = request();
        let vars = r.template_variables(FormKind::Payroll);
        assert_eq!(vars.get("company_name"), Some(&r.company_name));
        assert_eq!(vars.get("product").map(String::as_str), Some("payroll"));
        assert_eq!(vars.get("modality").map(String::as_str), Some("saas"));
        assert_eq!(vars.get("seats").map(String::as_str), Some("25"));
        assert!(!vars.contains_key("client_reference"));
    }

    #[test]
    fn test_submission_status_names() {
        assert_eq!(
            "pending_approval".parse::<SubmissionStatus>().unwrap(),
            SubmissionStatus::PendingApproval
        );
        assert_eq!(SubmissionStatus::Sent.to_string(), "sent");
    }
}
