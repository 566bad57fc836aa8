//! Operator notification domain models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;
use std::str::FromStr;
use uuid::Uuid;

/// Severity of an operator-visible problem, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
        }
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "info" => Ok(Severity::Info),
            "warning" => Ok(Severity::Warning),
            "error" => Ok(Severity::Error),
            "critical" => Ok(Severity::Critical),
            _ => Err(format!("Unknown severity: {}", s)),
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of operator notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Error,
    SystemIssue,
    PerformanceDegradation,
    ConfigurationIssue,
    SubmissionPending,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Error => "error",
            NotificationKind::SystemIssue => "system_issue",
            NotificationKind::PerformanceDegradation => "performance_degradation",
            NotificationKind::ConfigurationIssue => "configuration_issue",
            NotificationKind::SubmissionPending => "submission_pending",
        }
    }
}

impl FromStr for NotificationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "error" => Ok(NotificationKind::Error),
            "system_issue" => Ok(NotificationKind::SystemIssue),
            "performance_degradation" => Ok(NotificationKind::PerformanceDegradation),
            "configuration_issue" => Ok(NotificationKind::ConfigurationIssue),
            "submission_pending" => Ok(NotificationKind::SubmissionPending),
            _ => Err(format!("Unknown notification kind: {}", s)),
        }
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Delivery channel for operator notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Console,
    InApp,
    Email,
    Webhook,
    Database,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Console => "console",
            ChannelKind::InApp => "in_app",
            ChannelKind::Email => "email",
            ChannelKind::Webhook => "webhook",
            ChannelKind::Database => "database",
        }
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error details attached to a notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct NotificationError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// A notification that was accepted for delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct NotificationRecord {
    pub id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<NotificationError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Map<String, JsonValue>>,
}

fn default_enabled() -> bool {
    true
}

fn default_channels() -> Vec<ChannelKind> {
    vec![ChannelKind::Console, ChannelKind::InApp]
}

fn default_rate_limit_minutes() -> u64 {
    15
}

fn default_severity_threshold() -> Severity {
    Severity::Warning
}

fn default_history_limit() -> usize {
    500
}

/// Dispatcher configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct NotificationConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Channels notifications are fanned out to.
    #[serde(default = "default_channels")]
    pub channels: Vec<ChannelKind>,

    #[serde(default)]
    pub email_recipients: Vec<String>,

    #[serde(default)]
    pub webhook_url: Option<String>,

    /// Shared secret used to sign webhook payloads.
    #[serde(default)]
    pub webhook_secret: Option<String>,

    /// Cooldown per (kind, title); 0 disables rate limiting.
    #[serde(default = "default_rate_limit_minutes")]
    pub rate_limit_minutes: u64,

    #[serde(default = "default_severity_threshold")]
    pub severity_threshold: Severity,

    #[serde(default)]
    pub include_stack_trace: bool,

    #[serde(default = "default_enabled")]
    pub include_context: bool,

    /// Maximum number of records kept in the in-memory history.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            channels: default_channels(),
            email_recipients: Vec::new(),
            webhook_url: None,
            webhook_secret: None,
            rate_limit_minutes: default_rate_limit_minutes(),
            severity_threshold: default_severity_threshold(),
            include_stack_trace: false,
            include_context: true,
            history_limit: default_history_limit(),
        }
    }
}

/// Result of a single dispatch call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DispatchOutcome {
    /// The dispatcher is disabled.
    Disabled,
    /// Severity was below the configured threshold.
    BelowThreshold,
    /// Same (kind, title) fired within the cooldown window.
    RateLimited,
    /// Fanned out to the channels.
    Dispatched {
        notification_id: Uuid,
        delivered: Vec<ChannelKind>,
        failed: Vec<ChannelFailure>,
    },
}

impl DispatchOutcome {
    pub fn is_dispatched(&self) -> bool {
        matches!(self, DispatchOutcome::Dispatched { .. })
    }
}

/// A channel that failed during fan-out.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct ChannelFailure {
    pub channel: ChannelKind,
    pub error: String,
}

/// Dispatcher counters exposed to operators.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct NotificationStatistics {
    pub dispatched: u64,
    pub rate_limited: u64,
    pub suppressed: u64,
    pub channel_failures: u64,
    pub by_severity: BTreeMap<String, u64>,
    pub by_kind: BTreeMap<String, u64>,
    pub history_size: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Info < Severity::Warning);
        assert!(Severity::Warning < Severity::Error);
        assert!(Severity::Error < Severity::Critical);
    }

    #[test]
    fn test_severity_from_str() {
        assert_eq!("CRITICAL".parse::<Severity>().unwrap(), Severity::Critical);
        assert!("fatal".parse::<Severity>().is_err());
    }

    #[test]
    fn test_notification_config_defaults() {
        let config: NotificationConfig = serde_json::from_str("{}").unwrap();
        assert!(config.enabled);
        assert_eq!(config.channels, vec![ChannelKind::Console, ChannelKind::InApp]);
        assert_eq!(config.rate_limit_minutes, 15);
        assert_eq!(config.severity_threshold, Severity::Warning);
        assert_eq!(config, NotificationConfig::default());
    }

    #[test]
    fn test_dispatch_outcome_serialization() {
        let outcome = DispatchOutcome::RateLimited;
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "rate_limited");
        assert!(!outcome.is_dispatched());
    }
}
