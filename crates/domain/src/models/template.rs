//! Email template domain models and fallback configuration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

/// Quote form a template can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormKind {
    Erp,
    Crm,
    Payroll,
}

impl FormKind {
    pub const ALL: [FormKind; 3] = [FormKind::Erp, FormKind::Crm, FormKind::Payroll];

    pub fn as_str(&self) -> &'static str {
        match self {
            FormKind::Erp => "erp",
            FormKind::Crm => "crm",
            FormKind::Payroll => "payroll",
        }
    }
}

impl FromStr for FormKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "erp" => Ok(FormKind::Erp),
            "crm" => Ok(FormKind::Crm),
            "payroll" => Ok(FormKind::Payroll),
            _ => Err(format!("Unknown form: {}", s)),
        }
    }
}

impl std::fmt::Display for FormKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Deployment modality a template can be specialised for.
///
/// A template without a modality is the generic template for its form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Modality {
    #[serde(alias = "on_premise")]
    OnPremise,
    Saas,
}

impl Modality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Modality::OnPremise => "on-premise",
            Modality::Saas => "saas",
        }
    }
}

impl FromStr for Modality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "on-premise" | "on_premise" | "onpremise" => Ok(Modality::OnPremise),
            "saas" => Ok(Modality::Saas),
            _ => Err(format!("Unknown modality: {}", s)),
        }
    }
}

impl std::fmt::Display for Modality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Human readable label for an optional modality.
pub fn modality_label(modality: &Option<Modality>) -> &'static str {
    match modality {
        Some(m) => m.as_str(),
        None => "generic",
    }
}

/// An email template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Template {
    pub id: Uuid,
    pub name: String,
    pub subject: String,
    pub body: String,
    pub description: Option<String>,
    pub active: bool,
    /// Only templates bound to a form take part in resolution.
    pub bound_to_form: bool,
    pub form: Option<FormKind>,
    pub modality: Option<Modality>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Template {
    /// Whether the template is eligible for fallback resolution.
    pub fn is_resolvable(&self) -> bool {
        self.active && self.bound_to_form
    }

    /// Whether the template is resolvable and tagged with exactly this pair.
    pub fn matches(&self, form: FormKind, modality: Option<Modality>) -> bool {
        self.is_resolvable() && self.form == Some(form) && self.modality == modality
    }
}

fn default_true() -> bool {
    true
}

/// Request payload for registering a new template.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "snake_case")]
pub struct NewTemplate {
    #[validate(length(min = 1, max = 200, message = "Name must be 1-200 characters"))]
    pub name: String,

    #[validate(length(min = 1, max = 500, message = "Subject must be 1-500 characters"))]
    pub subject: String,

    #[validate(length(min = 1, max = 100000, message = "Body must not be empty"))]
    pub body: String,

    #[validate(length(max = 1000, message = "Description must be at most 1000 characters"))]
    pub description: Option<String>,

    #[serde(default = "default_true")]
    pub active: bool,

    #[serde(default = "default_true")]
    pub bound_to_form: bool,

    pub form: Option<FormKind>,

    pub modality: Option<Modality>,
}

impl NewTemplate {
    /// Build the stored template, stamping id and timestamps.
    pub fn into_template(self) -> Template {
        let now = Utc::now();
        Template {
            id: Uuid::new_v4(),
            name: self.name,
            subject: self.subject,
            body: self.body,
            description: self.description,
            active: self.active,
            bound_to_form: self.bound_to_form,
            form: self.form,
            modality: self.modality,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Derived (form, modality) to template pairing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TemplateMapping {
    pub form: FormKind,
    pub modality: Modality,
    pub template_id: Uuid,
    pub template_name: String,
    pub updated_at: DateTime<Utc>,
}

impl TemplateMapping {
    /// Build a mapping from a template carrying both tags.
    pub fn from_template(template: &Template) -> Option<Self> {
        match (template.form, template.modality) {
            (Some(form), Some(modality)) => Some(Self {
                form,
                modality,
                template_id: template.id,
                template_name: template.name.clone(),
                updated_at: template.updated_at,
            }),
            _ => None,
        }
    }
}

/// Level of the fallback hierarchy that produced a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackKind {
    Specific,
    ConfiguredDefault,
    FormDefault,
    AnyActive,
    GlobalFallback,
    None,
}

impl FallbackKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FallbackKind::Specific => "specific",
            FallbackKind::ConfiguredDefault => "configured_default",
            FallbackKind::FormDefault => "form_default",
            FallbackKind::AnyActive => "any_active",
            FallbackKind::GlobalFallback => "global_fallback",
            FallbackKind::None => "none",
        }
    }
}

impl FromStr for FallbackKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "specific" => Ok(FallbackKind::Specific),
            "configured_default" => Ok(FallbackKind::ConfiguredDefault),
            "form_default" => Ok(FallbackKind::FormDefault),
            "any_active" => Ok(FallbackKind::AnyActive),
            "global_fallback" => Ok(FallbackKind::GlobalFallback),
            "none" => Ok(FallbackKind::None),
            _ => Err(format!("Unknown fallback kind: {}", s)),
        }
    }
}

impl std::fmt::Display for FallbackKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of a fallback resolution.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct ResolutionResult {
    pub template: Option<Template>,
    /// True for every level except `specific`.
    pub is_default: bool,
    /// True only when a specific (form, modality) mapping was found.
    pub mapping_found: bool,
    pub fallback_kind: FallbackKind,
    pub reason: String,
}

impl ResolutionResult {
    pub fn hit(template: Template, kind: FallbackKind, reason: impl Into<String>) -> Self {
        Self {
            template: Some(template),
            is_default: kind != FallbackKind::Specific,
            mapping_found: kind == FallbackKind::Specific,
            fallback_kind: kind,
            reason: reason.into(),
        }
    }

    pub fn exhausted(reason: impl Into<String>) -> Self {
        Self {
            template: None,
            is_default: true,
            mapping_found: false,
            fallback_kind: FallbackKind::None,
            reason: reason.into(),
        }
    }

    pub fn template_id(&self) -> Option<Uuid> {
        self.template.as_ref().map(|t| t.id)
    }
}

/// Process-wide fallback configuration read by every resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct FallbackConfig {
    /// Configured default template per form.
    #[serde(default)]
    pub default_templates: HashMap<FormKind, Uuid>,

    /// Template used when every form-level step misses.
    #[serde(default)]
    pub global_fallback_id: Option<Uuid>,

    /// Whether any active template of the form may be used, ignoring modality.
    #[serde(default = "default_true")]
    pub allow_any_active: bool,

    /// Whether an exhausted chain raises instead of returning no template.
    #[serde(default)]
    pub raise_on_exhausted: bool,

    #[serde(default = "default_true")]
    pub log_searches: bool,

    #[serde(default = "default_true")]
    pub log_fallbacks: bool,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            default_templates: HashMap::new(),
            global_fallback_id: None,
            allow_any_active: true,
            raise_on_exhausted: false,
            log_searches: true,
            log_fallbacks: true,
        }
    }
}
