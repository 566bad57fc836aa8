//! Template resolution through the fallback hierarchy.
//!
//! Order, short-circuiting on the first hit:
//! 1. `specific` - exact (form, modality) mapping (skipped for generic requests)
//! 2. `configured_default` - the form's configured default, if still active
//! 3. `form_default` - a template bound to the form with no modality
//! 4. `any_active` - any template bound to the form, if allowed
//! 5. `global_fallback` - the configured global template, if still active
//! 6. `none` - raise or return an empty result, per configuration
//!
//! Templates are never cached; every resolution re-queries the store.

use serde_json::{json, Map};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::errors::QuoteError;
use crate::models::{
    modality_label, AuditOperation, AuditResult, EntityKind, FallbackConfig, FallbackKind,
    FormKind, Modality, NewTemplate, ResolutionResult, Template, TemplateMapping,
};
use crate::services::audit::{AuditEntryBuilder, AuditTrail};
use crate::services::notification::NotificationDispatcher;
use crate::services::recovery::{Alternates, RecoveryContext, RecoveryExecutor};

/// Backing store for templates.
///
/// "Bound" queries only consider templates that are both active and bound to
/// a form, newest first.
#[async_trait::async_trait]
pub trait TemplateStore: Send + Sync {
    /// Newest bound template tagged exactly with `form` and `modality`
    /// (`None` matches templates without a modality tag).
    async fn find_bound(
        &self,
        form: FormKind,
        modality: Option<Modality>,
    ) -> Result<Option<Template>, QuoteError>;

    /// Newest bound template of `form`, whatever its modality.
    async fn find_any_for_form(&self, form: FormKind) -> Result<Option<Template>, QuoteError>;

    /// Template by id, only if active.
    async fn find_active_by_id(&self, id: Uuid) -> Result<Option<Template>, QuoteError>;

    /// Ids of bound templates tagged exactly with (`form`, `modality`).
    async fn bound_ids(
        &self,
        form: FormKind,
        modality: Option<Modality>,
    ) -> Result<Vec<Uuid>, QuoteError>;

    /// Bound templates carrying both tags, ordered by form then modality.
    async fn list_bound(&self) -> Result<Vec<Template>, QuoteError>;

    async fn insert(&self, template: Template) -> Result<Template, QuoteError>;
}

/// Resolves the template for a (form, modality) pair.
pub struct TemplateResolver {
    store: Arc<dyn TemplateStore>,
    config: RwLock<FallbackConfig>,
    executor: Arc<RecoveryExecutor>,
    audit: Arc<AuditTrail>,
    dispatcher: Arc<NotificationDispatcher>,
}

impl TemplateResolver {
    pub fn new(
        store: Arc<dyn TemplateStore>,
        config: FallbackConfig,
        executor: Arc<RecoveryExecutor>,
        audit: Arc<AuditTrail>,
        dispatcher: Arc<NotificationDispatcher>,
    ) -> Self {
        Self {
            store,
            config: RwLock::new(config),
            executor,
            audit,
            dispatcher,
        }
    }

    /// Snapshot of the current fallback configuration.
    pub async fn fallback_config(&self) -> FallbackConfig {
        self.config.read().await.clone()
    }

    /// Replace the whole fallback configuration.
    pub async fn update_fallback_config(&self, config: FallbackConfig, actor_id: Option<&str>) {
        let previous = {
            let mut current = self.config.write().await;
            std::mem::replace(&mut *current, config.clone())
        };
        self.audit
            .log_configuration_change("fallback_config", json!(previous), json!(config), actor_id)
            .await;
        tracing::info!(actor = ?actor_id, "Fallback configuration replaced");
    }

    /// Exact-match lookup; `None` when no specific template exists.
    pub async fn find_specific(
        &self,
        form: FormKind,
        modality: Modality,
    ) -> Result<Option<Template>, QuoteError> {
        let context = RecoveryContext::new("find_specific")
            .with_entity(format!("{}:{}", form, modality));
        let started = Instant::now();

        let found = self
            .executor
            .execute_with_recovery(
                &context,
                || self.store.find_bound(form, Some(modality)),
                Alternates::none(),
            )
            .await
            .into_result()?;

        self.audit
            .log_template_search(
                form,
                Some(modality),
                found.as_ref().map(|t| t.id),
                started.elapsed(),
            )
            .await;
        Ok(found)
    }

    /// True iff no other bound template shares the exact tag pair.
    pub async fn validate_uniqueness(
        &self,
        form: FormKind,
        modality: Option<Modality>,
        exclude_id: Option<Uuid>,
    ) -> Result<bool, QuoteError> {
        Ok(self
            .conflicting_template(form, modality, exclude_id)
            .await?
            .is_none())
    }

    /// Like [`validate_uniqueness`](Self::validate_uniqueness), failing with
    /// `DuplicateMapping` on a conflict.
    pub async fn ensure_unique(
        &self,
        form: FormKind,
        modality: Option<Modality>,
        exclude_id: Option<Uuid>,
    ) -> Result<(), QuoteError> {
        match self.conflicting_template(form, modality, exclude_id).await? {
            None => Ok(()),
            Some(existing_id) => Err(QuoteError::DuplicateMapping {
                form,
                modality,
                existing_id,
            }),
        }
    }

    async fn conflicting_template(
        &self,
        form: FormKind,
        modality: Option<Modality>,
        exclude_id: Option<Uuid>,
    ) -> Result<Option<Uuid>, QuoteError> {
        let context = RecoveryContext::new("validate_uniqueness")
            .with_entity(format!("{}:{}", form, modality_label(&modality)));

        let ids = self
            .executor
            .execute_with_recovery(
                &context,
                || self.store.bound_ids(form, modality),
                Alternates::none(),
            )
            .await
            .into_result()?;

        let conflict = ids.into_iter().find(|id| Some(*id) != exclude_id);
        self.audit
            .log_validation(form, modality, exclude_id, conflict.is_none())
            .await;
        Ok(conflict)
    }

    /// Every specific mapping, ordered by form then modality.
    pub async fn list_mappings(&self) -> Result<Vec<TemplateMapping>, QuoteError> {
        let templates = self
            .executor
            .execute_with_recovery(
                &RecoveryContext::new("list_mappings"),
                || self.store.list_bound(),
                Alternates::none(),
            )
            .await
            .into_result()?;

        let mut mappings: Vec<TemplateMapping> = templates
            .iter()
            .filter_map(TemplateMapping::from_template)
            .collect();
        mappings.sort_by(|a, b| (a.form, a.modality).cmp(&(b.form, b.modality)));
        Ok(mappings)
    }

    /// Active template by id.
    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<Template>, QuoteError> {
        self.executor
            .execute_with_recovery(
                &RecoveryContext::new("get_by_id").with_entity(id.to_string()),
                || self.store.find_active_by_id(id),
                Alternates::none(),
            )
            .await
            .into_result()
    }

    /// Point `form` at template `id`; false if the template is missing or
    /// inactive.
    pub async fn set_default_template(
        &self,
        form: FormKind,
        id: Uuid,
        actor_id: Option<&str>,
    ) -> Result<bool, QuoteError> {
        if self.get_by_id(id).await?.is_none() {
            tracing::warn!(form = %form, template_id = %id, "Rejected default template: not active");
            self.record_rejected_change(&format!("default_templates.{}", form), id, actor_id)
                .await;
            return Ok(false);
        }

        let previous = {
            let mut config = self.config.write().await;
            config.default_templates.insert(form, id)
        };
        self.audit
            .log_configuration_change(
                &format!("default_templates.{}", form),
                json!(previous),
                json!(id),
                actor_id,
            )
            .await;
        Ok(true)
    }

    /// Set the global fallback template; false if missing or inactive.
    pub async fn set_global_fallback(
        &self,
        id: Uuid,
        actor_id: Option<&str>,
    ) -> Result<bool, QuoteError> {
        if self.get_by_id(id).await?.is_none() {
            tracing::warn!(template_id = %id, "Rejected global fallback: not active");
            self.record_rejected_change("global_fallback_id", id, actor_id)
                .await;
            return Ok(false);
        }

        let previous = {
            let mut config = self.config.write().await;
            config.global_fallback_id.replace(id)
        };
        self.audit
            .log_configuration_change("global_fallback_id", json!(previous), json!(id), actor_id)
            .await;
        Ok(true)
    }

    async fn record_rejected_change(&self, setting: &str, id: Uuid, actor_id: Option<&str>) {
        let mut builder =
            AuditEntryBuilder::new(AuditOperation::ConfigurationChange, EntityKind::Configuration)
                .entity(setting)
                .detail("rejected_template_id", id.to_string())
                .detail("reason", "template missing or inactive")
                .result(AuditResult::Warning);
        if let Some(actor) = actor_id {
            builder = builder.actor(actor);
        }
        self.audit.record(builder.build()).await;
    }

    /// Register a template, enforcing one bound template per (form, modality) slot.
    pub async fn register_template(
        &self,
        input: NewTemplate,
        actor_id: Option<&str>,
    ) -> Result<Template, QuoteError> {
        if input.active && input.bound_to_form {
            if let Some(form) = input.form {
                self.ensure_unique(form, input.modality, None).await?;
            }
        }

        let template = self.store.insert(input.into_template()).await?;

        let mut builder =
            AuditEntryBuilder::new(AuditOperation::ConfigurationChange, EntityKind::Template)
                .entity(template.id.to_string())
                .detail("name", template.name.clone())
                .detail("form", json!(template.form))
                .detail("modality", json!(template.modality));
        if let Some(actor) = actor_id {
            builder = builder.actor(actor);
        }
        self.audit.record(builder.build()).await;

        tracing::info!(template_id = %template.id, name = %template.name, "Template registered");
        Ok(template)
    }

    /// Resolve the best available template for (`form`, `modality`).
    pub async fn resolve_with_fallback(
        &self,
        form: FormKind,
        modality: Option<Modality>,
    ) -> Result<ResolutionResult, QuoteError> {
        let config = self.fallback_config().await;
        let context = RecoveryContext::new("resolve_with_fallback")
            .with_entity(format!("{}:{}", form, modality_label(&modality)));

        let result = self
            .executor
            .execute_with_recovery(
                &context,
                || self.run_chain(form, modality, &config),
                Alternates::none(),
            )
            .await
            .into_result()?;

        metrics::counter!(
            "template_resolutions_total",
            "fallback_kind" => result.fallback_kind.as_str()
        )
        .increment(1);

        if result.template.is_none() {
            let error = QuoteError::FallbackChainExhausted { form, modality };
            if config.raise_on_exhausted {
                let mut details = Map::new();
                details.insert("form".to_string(), json!(form));
                details.insert("modality".to_string(), json!(modality));
                self.audit
                    .log_error(EntityKind::Template, &error, details)
                    .await;
                return Err(error);
            }
            tracing::warn!(
                form = %form,
                modality = modality_label(&modality),
                "Fallback chain exhausted, returning empty resolution"
            );
        }

        Ok(result)
    }

    async fn run_chain(
        &self,
        form: FormKind,
        modality: Option<Modality>,
        config: &FallbackConfig,
    ) -> Result<ResolutionResult, QuoteError> {
        // 1. specific
        if let Some(modality) = modality {
            let started = Instant::now();
            let found = self.store.find_bound(form, Some(modality)).await?;
            if config.log_searches {
                self.audit
                    .log_template_search(
                        form,
                        Some(modality),
                        found.as_ref().map(|t| t.id),
                        started.elapsed(),
                    )
                    .await;
            }
            if let Some(template) = found {
                return Ok(ResolutionResult::hit(
                    template,
                    FallbackKind::Specific,
                    format!("Specific mapping for {}/{}", form, modality),
                ));
            }
        }

        // 2. configured_default
        if let Some(id) = config.default_templates.get(&form).copied() {
            match self.store.find_active_by_id(id).await? {
                Some(template) => {
                    return Ok(self
                        .fallback_hit(
                            form,
                            modality,
                            template,
                            FallbackKind::ConfiguredDefault,
                            format!("Configured default for {}", form),
                            config,
                        )
                        .await);
                }
                None => {
                    self.report_stale_setting(
                        &format!("default_templates.{}", form),
                        id,
                    )
                    .await;
                }
            }
        }

        // 3. form_default
        if let Some(template) = self.store.find_bound(form, None).await? {
            return Ok(self
                .fallback_hit(
                    form,
                    modality,
                    template,
                    FallbackKind::FormDefault,
                    format!("Generic template for {}", form),
                    config,
                )
                .await);
        }

        // 4. any_active
        if config.allow_any_active {
            if let Some(template) = self.store.find_any_for_form(form).await? {
                return Ok(self
                    .fallback_hit(
                        form,
                        modality,
                        template,
                        FallbackKind::AnyActive,
                        format!("Any active template for {}", form),
                        config,
                    )
                    .await);
            }
        }

        // 5. global_fallback
        if let Some(id) = config.global_fallback_id {
            match self.store.find_active_by_id(id).await? {
                Some(template) => {
                    return Ok(self
                        .fallback_hit(
                            form,
                            modality,
                            template,
                            FallbackKind::GlobalFallback,
                            "Global fallback template".to_string(),
                            config,
                        )
                        .await);
                }
                None => {
                    self.report_stale_setting("global_fallback_id", id).await;
                }
            }
        }

        // 6. none
        self.audit
            .record(
                AuditEntryBuilder::new(AuditOperation::TemplateSearch, EntityKind::Mapping)
                    .entity(format!("{}:{}", form, modality_label(&modality)))
                    .detail("fallback_kind", FallbackKind::None.as_str())
                    .result(AuditResult::Failure)
                    .build(),
            )
            .await;
        Ok(ResolutionResult::exhausted(format!(
            "No template available for {}/{}",
            form,
            modality_label(&modality)
        )))
    }

    async fn fallback_hit(
        &self,
        form: FormKind,
        modality: Option<Modality>,
        template: Template,
        kind: FallbackKind,
        reason: String,
        config: &FallbackConfig,
    ) -> ResolutionResult {
        if config.log_fallbacks {
            self.audit
                .log_fallback_used(form, modality, kind, template.id, &reason)
                .await;
        }
        tracing::debug!(
            form = %form,
            modality = modality_label(&modality),
            fallback_kind = %kind,
            template_id = %template.id,
            "Resolved template through fallback"
        );
        ResolutionResult::hit(template, kind, reason)
    }

    /// A configured template id no longer resolves to an active template.
    async fn report_stale_setting(&self, setting: &str, id: Uuid) {
        let error = QuoteError::configuration(
            setting,
            format!("template {} is missing or inactive", id),
        );
        let mut details = Map::new();
        details.insert("template_id".to_string(), json!(id));
        self.audit
            .log_error(EntityKind::Configuration, &error, details)
            .await;
        self.dispatcher
            .notify_configuration_issue(setting, error.to_string())
            .await;
    }
}
