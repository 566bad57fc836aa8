//! Template entity (database row mapping).

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use domain::errors::QuoteError;
use domain::models::Template;

use super::parse_optional_column;

/// Database row mapping for the templates table.
#[derive(Debug, Clone, FromRow)]
pub struct TemplateEntity {
    pub id: Uuid,
    pub name: String,
    pub subject: String,
    pub body: String,
    pub description: Option<String>,
    pub active: bool,
    pub bound_to_form: bool,
    pub form: Option<String>,
    pub modality: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<TemplateEntity> for Template {
    type Error = QuoteError;

    fn try_from(entity: TemplateEntity) -> Result<Self, Self::Error> {
        Ok(Self {
            form: parse_optional_column("templates.form", entity.form.as_deref())?,
            modality: parse_optional_column("templates.modality", entity.modality.as_deref())?,
            id: entity.id,
            name: entity.name,
            subject: entity.subject,
            body: entity.body,
            description: entity.description,
            active: entity.active,
            bound_to_form: entity.bound_to_form,
            created_at: entity.created_at,
            updated_at: entity.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::models::{FormKind, Modality};

    fn entity(form: Option<&str>, modality: Option<&str>) -> TemplateEntity {
        TemplateEntity {
            id: Uuid::new_v4(),
            name: "ERP on-premise".to_string(),
            subject: "Quote for {{company_name}}".to_string(),
            body: "Hello {{contact_name}}".to_string(),
            description: None,
            active: true,
            bound_to_form: true,
            form: form.map(str::to_string),
            modality: modality.map(str::to_string),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_entity_into_template() {
        let row = entity(Some("erp"), Some("on-premise"));
        let id = row.id;
        let template = Template::try_from(row).unwrap();

        assert_eq!(template.id, id);
        assert_eq!(template.form, Some(FormKind::Erp));
        assert_eq!(template.modality, Some(Modality::OnPremise));
        assert!(template.is_resolvable());
    }

    #[test]
    fn test_generic_template_has_no_modality() {
        let template = Template::try_from(entity(Some("payroll"), None)).unwrap();
        assert_eq!(template.modality, None);
    }

    #[test]
    fn test_unknown_form_is_a_decode_error() {
        let err = Template::try_from(entity(Some("hr"), None)).unwrap_err();
        assert!(matches!(err, QuoteError::Database { .. }));
    }
}
