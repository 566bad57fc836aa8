//! Template repository for database operations.

use sqlx::PgPool;
use uuid::Uuid;

use domain::errors::QuoteError;
use domain::models::{FormKind, Modality, Template};
use domain::services::TemplateStore;

use super::{db_error, is_unique_violation};
use crate::entities::TemplateEntity;
use crate::metrics::QueryTimer;

const TEMPLATE_COLUMNS: &str = "id, name, subject, body, description, active, bound_to_form, \
                                form, modality, created_at, updated_at";

/// Repository for email templates.
#[derive(Clone)]
pub struct TemplateRepository {
    pool: PgPool,
}

impl TemplateRepository {
    /// Creates a new TemplateRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn into_templates(rows: Vec<TemplateEntity>) -> Result<Vec<Template>, QuoteError> {
        rows.into_iter().map(Template::try_from).collect()
    }
}

#[async_trait::async_trait]
impl TemplateStore for TemplateRepository {
    async fn find_bound(
        &self,
        form: FormKind,
        modality: Option<Modality>,
    ) -> Result<Option<Template>, QuoteError> {
        let timer = QueryTimer::new("find_bound_template");
        let result = sqlx::query_as::<_, TemplateEntity>(&format!(
            r#"
            SELECT {TEMPLATE_COLUMNS} FROM templates
            WHERE active AND bound_to_form
              AND form = $1
              AND modality IS NOT DISTINCT FROM $2
            ORDER BY created_at DESC
            LIMIT 1
            "#
        ))
        .bind(form.as_str())
        .bind(modality.map(|m| m.as_str()))
        .fetch_optional(&self.pool)
        .await;
        timer.record();

        result
            .map_err(|e| db_error("find_bound_template", e))?
            .map(Template::try_from)
            .transpose()
    }

    async fn find_any_for_form(&self, form: FormKind) -> Result<Option<Template>, QuoteError> {
        let timer = QueryTimer::new("find_any_template_for_form");
        let result = sqlx::query_as::<_, TemplateEntity>(&format!(
            r#"
            SELECT {TEMPLATE_COLUMNS} FROM templates
            WHERE active AND bound_to_form AND form = $1
            ORDER BY created_at DESC
            LIMIT 1
            "#
        ))
        .bind(form.as_str())
        .fetch_optional(&self.pool)
        .await;
        timer.record();

        result
            .map_err(|e| db_error("find_any_template_for_form", e))?
            .map(Template::try_from)
            .transpose()
    }

    async fn find_active_by_id(&self, id: Uuid) -> Result<Option<Template>, QuoteError> {
        let timer = QueryTimer::new("find_active_template_by_id");
        let result = sqlx::query_as::<_, TemplateEntity>(&format!(
            "SELECT {TEMPLATE_COLUMNS} FROM templates WHERE id = $1 AND active"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await;
        timer.record();

        result
            .map_err(|e| db_error("find_active_template_by_id", e))?
            .map(Template::try_from)
            .transpose()
    }

    async fn bound_ids(
        &self,
        form: FormKind,
        modality: Option<Modality>,
    ) -> Result<Vec<Uuid>, QuoteError> {
        let timer = QueryTimer::new("bound_template_ids");
        let result = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT id FROM templates
            WHERE active AND bound_to_form
              AND form = $1
              AND modality IS NOT DISTINCT FROM $2
            ORDER BY created_at DESC
            "#,
        )
        .bind(form.as_str())
        .bind(modality.map(|m| m.as_str()))
        .fetch_all(&self.pool)
        .await;
        timer.record();

        result.map_err(|e| db_error("bound_template_ids", e))
    }

    async fn list_bound(&self) -> Result<Vec<Template>, QuoteError> {
        let timer = QueryTimer::new("list_bound_templates");
        let result = sqlx::query_as::<_, TemplateEntity>(&format!(
            r#"
            SELECT {TEMPLATE_COLUMNS} FROM templates
            WHERE active AND bound_to_form
              AND form IS NOT NULL AND modality IS NOT NULL
            ORDER BY form, modality
            "#
        ))
        .fetch_all(&self.pool)
        .await;
        timer.record();

        Self::into_templates(result.map_err(|e| db_error("list_bound_templates", e))?)
    }

    async fn insert(&self, template: Template) -> Result<Template, QuoteError> {
        let timer = QueryTimer::new("insert_template");
        let result = sqlx::query_as::<_, TemplateEntity>(&format!(
            r#"
            INSERT INTO templates (
                id, name, subject, body, description, active, bound_to_form,
                form, modality, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {TEMPLATE_COLUMNS}
            "#
        ))
        .bind(template.id)
        .bind(&template.name)
        .bind(&template.subject)
        .bind(&template.body)
        .bind(&template.description)
        .bind(template.active)
        .bind(template.bound_to_form)
        .bind(template.form.map(|f| f.as_str()))
        .bind(template.modality.map(|m| m.as_str()))
        .bind(template.created_at)
        .bind(template.updated_at)
        .fetch_one(&self.pool)
        .await;
        timer.record();

        match result {
            Ok(row) => Template::try_from(row),
            Err(e) if is_unique_violation(&e) => {
                // Lost a race with a concurrent registration for the same slot.
                let form = template.form.ok_or_else(|| db_error("insert_template", e))?;
                let existing_id = self
                    .bound_ids(form, template.modality)
                    .await?
                    .into_iter()
                    .next()
                    .unwrap_or_else(Uuid::nil);
                Err(QuoteError::DuplicateMapping {
                    form,
                    modality: template.modality,
                    existing_id,
                })
            }
            Err(e) => Err(db_error("insert_template", e)),
        }
    }
}
