//! Audit trail domain models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;
use std::str::FromStr;
use uuid::Uuid;

use crate::errors::{ErrorCode, QuoteError};
use crate::models::Severity;

/// Audited operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOperation {
    TemplateSearch,
    FallbackUsed,
    MappingValidation,
    ConfigurationChange,
    NotificationSent,
    NotificationRateLimited,
    RecoveryAttempted,
    RecoverySucceeded,
    RecoveryFailed,
    SubmissionReceived,
    SubmissionCompleted,
    SubmissionRejected,
    Error,
}

impl AuditOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditOperation::TemplateSearch => "template_search",
            AuditOperation::FallbackUsed => "fallback_used",
            AuditOperation::MappingValidation => "mapping_validation",
            AuditOperation::ConfigurationChange => "configuration_change",
            AuditOperation::NotificationSent => "notification_sent",
            AuditOperation::NotificationRateLimited => "notification_rate_limited",
            AuditOperation::RecoveryAttempted => "recovery_attempted",
            AuditOperation::RecoverySucceeded => "recovery_succeeded",
            AuditOperation::RecoveryFailed => "recovery_failed",
            AuditOperation::SubmissionReceived => "submission_received",
            AuditOperation::SubmissionCompleted => "submission_completed",
            AuditOperation::SubmissionRejected => "submission_rejected",
            AuditOperation::Error => "error",
        }
    }

    /// Dispatcher bookkeeping; never forwarded back to the dispatcher.
    pub fn is_notification_bookkeeping(&self) -> bool {
        matches!(
            self,
            AuditOperation::NotificationSent | AuditOperation::NotificationRateLimited
        )
    }
}

impl FromStr for AuditOperation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "template_search" => Ok(AuditOperation::TemplateSearch),
            "fallback_used" => Ok(AuditOperation::FallbackUsed),
            "mapping_validation" => Ok(AuditOperation::MappingValidation),
            "configuration_change" => Ok(AuditOperation::ConfigurationChange),
            "notification_sent" => Ok(AuditOperation::NotificationSent),
            "notification_rate_limited" => Ok(AuditOperation::NotificationRateLimited),
            "recovery_attempted" => Ok(AuditOperation::RecoveryAttempted),
            "recovery_succeeded" => Ok(AuditOperation::RecoverySucceeded),
            "recovery_failed" => Ok(AuditOperation::RecoveryFailed),
            "submission_received" => Ok(AuditOperation::SubmissionReceived),
            "submission_completed" => Ok(AuditOperation::SubmissionCompleted),
            "submission_rejected" => Ok(AuditOperation::SubmissionRejected),
            "error" => Ok(AuditOperation::Error),
            _ => Err(format!("Unknown audit operation: {}", s)),
        }
    }
}

impl std::fmt::Display for AuditOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of entity an audit entry refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Template,
    Mapping,
    Configuration,
    Submission,
    Notification,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Template => "template",
            EntityKind::Mapping => "mapping",
            EntityKind::Configuration => "configuration",
            EntityKind::Submission => "submission",
            EntityKind::Notification => "notification",
        }
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "template" => Ok(EntityKind::Template),
            "mapping" => Ok(EntityKind::Mapping),
            "configuration" => Ok(EntityKind::Configuration),
            "submission" => Ok(EntityKind::Submission),
            "notification" => Ok(EntityKind::Notification),
            _ => Err(format!("Unknown entity kind: {}", s)),
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome recorded on an audit entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditResult {
    Success,
    Failure,
    Warning,
}

impl AuditResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditResult::Success => "success",
            AuditResult::Failure => "failure",
            AuditResult::Warning => "warning",
        }
    }
}

impl FromStr for AuditResult {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(AuditResult::Success),
            "failure" => Ok(AuditResult::Failure),
            "warning" => Ok(AuditResult::Warning),
            _ => Err(format!("Unknown audit result: {}", s)),
        }
    }
}

impl std::fmt::Display for AuditResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Structured error carried by an audit entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AuditError {
    pub code: ErrorCode,
    pub message: String,
    pub severity: Severity,
    pub temporary: bool,
}

impl From<&QuoteError> for AuditError {
    fn from(err: &QuoteError) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
            severity: err.severity(),
            temporary: err.is_temporary(),
        }
    }
}

/// Immutable audit log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub operation: AuditOperation,
    pub entity_kind: EntityKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<String>,
    pub details: Map<String, JsonValue>,
    pub result: AuditResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<AuditError>,
}

impl AuditLogEntry {
    /// Severity of the attached error, if any.
    pub fn error_severity(&self) -> Option<Severity> {
        self.error.as_ref().map(|e| e.severity)
    }
}

/// Input for recording an audit entry; id and timestamp are stamped on write.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAuditEntry {
    pub operation: AuditOperation,
    pub entity_kind: EntityKind,
    pub entity_id: Option<String>,
    pub actor_id: Option<String>,
    pub details: Map<String, JsonValue>,
    pub result: AuditResult,
    pub duration_ms: Option<u64>,
    pub error: Option<AuditError>,
}

impl NewAuditEntry {
    pub fn into_entry(self, timestamp: DateTime<Utc>) -> AuditLogEntry {
        AuditLogEntry {
            id: Uuid::new_v4(),
            timestamp,
            operation: self.operation,
            entity_kind: self.entity_kind,
            entity_id: self.entity_id,
            actor_id: self.actor_id,
            details: self.details,
            result: self.result,
            duration_ms: self.duration_ms,
            error: self.error,
        }
    }
}

/// Filter for querying the audit trail.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditQuery {
    pub operation: Option<AuditOperation>,
    pub entity_kind: Option<EntityKind>,
    pub entity_id: Option<String>,
    pub result: Option<AuditResult>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl AuditQuery {
    pub fn matches(&self, entry: &AuditLogEntry) -> bool {
        self.operation.map_or(true, |op| entry.operation == op)
            && self.entity_kind.map_or(true, |kind| entry.entity_kind == kind)
            && self
                .entity_id
                .as_ref()
                .map_or(true, |id| entry.entity_id.as_deref() == Some(id.as_str()))
            && self.result.map_or(true, |result| entry.result == result)
            && self.from.map_or(true, |from| entry.timestamp >= from)
            && self.to.map_or(true, |to| entry.timestamp <= to)
    }
}

/// Aggregated view over the audit trail.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct AuditStatistics {
    pub total: usize,
    pub success_rate: f64,
    pub error_rate: f64,
    pub warning_rate: f64,
    pub per_operation: BTreeMap<String, usize>,
    pub per_error_code: BTreeMap<String, usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_duration_ms: Option<f64>,
}

fn default_max_entries() -> usize {
    10_000
}

fn default_retention_days() -> u32 {
    30
}

/// Retention policy for the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AuditConfig {
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            retention_days: default_retention_days(),
        }
    }
}
