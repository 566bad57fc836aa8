//! Error taxonomy for template resolution and quote submission.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{modality_label, FormKind, Modality, Severity};

/// Stable code for each error kind, used by audit statistics and the
/// recovery allow-list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Database,
    DuplicateMapping,
    FallbackChainExhausted,
    Configuration,
    DuplicateSubmission,
    LockContention,
    TemplateUnavailable,
    DeliveryFailed,
    System,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Database => "database",
            ErrorCode::DuplicateMapping => "duplicate_mapping",
            ErrorCode::FallbackChainExhausted => "fallback_chain_exhausted",
            ErrorCode::Configuration => "configuration",
            ErrorCode::DuplicateSubmission => "duplicate_submission",
            ErrorCode::LockContention => "lock_contention",
            ErrorCode::TemplateUnavailable => "template_unavailable",
            ErrorCode::DeliveryFailed => "delivery_failed",
            ErrorCode::System => "system",
        }
    }
}

impl FromStr for ErrorCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "database" => Ok(ErrorCode::Database),
            "duplicate_mapping" => Ok(ErrorCode::DuplicateMapping),
            "fallback_chain_exhausted" => Ok(ErrorCode::FallbackChainExhausted),
            "configuration" => Ok(ErrorCode::Configuration),
            "duplicate_submission" => Ok(ErrorCode::DuplicateSubmission),
            "lock_contention" => Ok(ErrorCode::LockContention),
            "template_unavailable" => Ok(ErrorCode::TemplateUnavailable),
            "delivery_failed" => Ok(ErrorCode::DeliveryFailed),
            "system" => Ok(ErrorCode::System),
            _ => Err(format!("Unknown error code: {}", s)),
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors raised by the resolution and submission core.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QuoteError {
    #[error("Database error during {operation}: {message}")]
    Database { operation: String, message: String },

    #[error(
        "Template {existing_id} is already mapped to {form}/{}",
        modality_label(.modality)
    )]
    DuplicateMapping {
        form: FormKind,
        modality: Option<Modality>,
        existing_id: Uuid,
    },

    #[error("No template available for {form}/{} after exhausting the fallback chain", modality_label(.modality))]
    FallbackChainExhausted {
        form: FormKind,
        modality: Option<Modality>,
    },

    #[error("Configuration error in {setting}: {message}")]
    Configuration { setting: String, message: String },

    #[error("Submission already processed{}", existing_suffix(.existing_id))]
    DuplicateSubmission {
        idempotency_key: String,
        existing_id: Option<Uuid>,
    },

    #[error("Submission {lock_name} is already being processed")]
    LockContention { lock_name: String },

    #[error("No email template available for {form}/{}", modality_label(.modality))]
    TemplateUnavailable {
        form: FormKind,
        modality: Option<Modality>,
    },

    #[error("Message delivery failed: {message}")]
    DeliveryFailed { message: String, temporary: bool },

    #[error("Unexpected error: {0}")]
    System(String),
}

fn existing_suffix(existing_id: &Option<Uuid>) -> String {
    match existing_id {
        Some(id) => format!(", id={}", id),
        None => String::new(),
    }
}

impl QuoteError {
    /// Wrap a backing-store failure.
    pub fn database(operation: impl Into<String>, message: impl std::fmt::Display) -> Self {
        QuoteError::Database {
            operation: operation.into(),
            message: message.to_string(),
        }
    }

    pub fn configuration(setting: impl Into<String>, message: impl Into<String>) -> Self {
        QuoteError::Configuration {
            setting: setting.into(),
            message: message.into(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            QuoteError::Database { .. } => ErrorCode::Database,
            QuoteError::DuplicateMapping { .. } => ErrorCode::DuplicateMapping,
            QuoteError::FallbackChainExhausted { .. } => ErrorCode::FallbackChainExhausted,
            QuoteError::Configuration { .. } => ErrorCode::Configuration,
            QuoteError::DuplicateSubmission { .. } => ErrorCode::DuplicateSubmission,
            QuoteError::LockContention { .. } => ErrorCode::LockContention,
            QuoteError::TemplateUnavailable { .. } => ErrorCode::TemplateUnavailable,
            QuoteError::DeliveryFailed { .. } => ErrorCode::DeliveryFailed,
            QuoteError::System(_) => ErrorCode::System,
        }
    }

    /// Whether retrying the same operation may succeed.
    pub fn is_temporary(&self) -> bool {
        match self {
            QuoteError::Database { .. } | QuoteError::LockContention { .. } => true,
            QuoteError::DeliveryFailed { temporary, .. } => *temporary,
            _ => false,
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            QuoteError::Database { .. } => Severity::Error,
            QuoteError::DuplicateMapping { .. } => Severity::Warning,
            QuoteError::FallbackChainExhausted { .. } => Severity::Critical,
            QuoteError::Configuration { .. } => Severity::Warning,
            QuoteError::DuplicateSubmission { .. } => Severity::Info,
            QuoteError::LockContention { .. } => Severity::Warning,
            QuoteError::TemplateUnavailable { .. } => Severity::Error,
            QuoteError::DeliveryFailed { .. } => Severity::Error,
            QuoteError::System(_) => Severity::Critical,
        }
    }

    /// The single actionable message shown to end users.
    ///
    /// Never mentions which fallback level or store was involved.
    pub fn user_message(&self) -> &'static str {
        match self {
            QuoteError::DuplicateSubmission { .. } => {
                "This request has already been submitted."
            }
            QuoteError::LockContention { .. } => {
                "Your request is already being processed, please wait a few seconds."
            }
            QuoteError::TemplateUnavailable { .. } | QuoteError::FallbackChainExhausted { .. } => {
                "No email template is available for this request, please contact support."
            }
            QuoteError::DuplicateMapping { .. } => {
                "A template is already assigned to this form and modality."
            }
            _ => "An unexpected error occurred, please try again.",
        }
    }
}
