//! Operator notification dispatcher.
//!
//! Alerts are filtered by severity, rate-limited per `(kind, title)` and fanned
//! out to every configured [`NotificationChannel`]. A failing channel never
//! blocks the others, and every outcome is written to the audit trail.

use chrono::Utc;
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter as GovRateLimiter};
use serde_json::{json, Map, Value as JsonValue};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::errors::QuoteError;
use crate::models::{
    AuditLogEntry, AuditOperation, AuditResult, ChannelFailure, ChannelKind, DispatchOutcome,
    EntityKind, NotificationConfig, NotificationError, NotificationKind, NotificationRecord,
    NotificationStatistics, Severity,
};
use crate::services::audit::{AuditAlertSink, AuditEntryBuilder, AuditTrail};

/// Errors returned by a single channel.
#[derive(Debug, Clone, Error)]
pub enum ChannelError {
    #[error("Channel not configured: {0}")]
    NotConfigured(String),

    #[error("Channel unavailable: {0}")]
    Unavailable(String),

    #[error("Delivery rejected: {0}")]
    Rejected(String),
}

/// A pluggable sink for operator notifications.
#[async_trait::async_trait]
pub trait NotificationChannel: Send + Sync {
    fn kind(&self) -> ChannelKind;

    async fn deliver(&self, record: &NotificationRecord) -> Result<(), ChannelError>;
}

/// Writes notifications to the structured log.
#[derive(Debug, Clone, Default)]
pub struct ConsoleChannel;

#[async_trait::async_trait]
impl NotificationChannel for ConsoleChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Console
    }

    async fn deliver(&self, record: &NotificationRecord) -> Result<(), ChannelError> {
        match record.severity {
            Severity::Critical | Severity::Error => tracing::error!(
                notification_id = %record.id,
                kind = %record.kind,
                source = %record.source,
                "{}: {}",
                record.title,
                record.message
            ),
            Severity::Warning => tracing::warn!(
                notification_id = %record.id,
                kind = %record.kind,
                source = %record.source,
                "{}: {}",
                record.title,
                record.message
            ),
            Severity::Info => tracing::info!(
                notification_id = %record.id,
                kind = %record.kind,
                source = %record.source,
                "{}: {}",
                record.title,
                record.message
            ),
        }
        Ok(())
    }
}

/// Bounded in-app feed read by the admin screens.
#[derive(Debug)]
pub struct InAppChannel {
    capacity: usize,
    feed: RwLock<VecDeque<NotificationRecord>>,
}

impl InAppChannel {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            feed: RwLock::new(VecDeque::new()),
        }
    }

    /// Most recent notifications first.
    pub async fn feed(&self, limit: Option<usize>) -> Vec<NotificationRecord> {
        self.feed
            .read()
            .await
            .iter()
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.feed.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.feed.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl NotificationChannel for InAppChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::InApp
    }

    async fn deliver(&self, record: &NotificationRecord) -> Result<(), ChannelError> {
        let mut feed = self.feed.write().await;
        feed.push_front(record.clone());
        feed.truncate(self.capacity);
        Ok(())
    }
}

/// Channel that records deliveries, for development and testing.
#[derive(Debug)]
pub struct MockNotificationChannel {
    kind: ChannelKind,
    simulate_failure: bool,
    delivered: Mutex<Vec<NotificationRecord>>,
}

impl MockNotificationChannel {
    pub fn new(kind: ChannelKind) -> Self {
        Self {
            kind,
            simulate_failure: false,
            delivered: Mutex::new(Vec::new()),
        }
    }

    /// A channel whose every delivery fails.
    pub fn failing(kind: ChannelKind) -> Self {
        Self {
            simulate_failure: true,
            ..Self::new(kind)
        }
    }

    pub fn delivered(&self) -> Vec<NotificationRecord> {
        self.delivered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait::async_trait]
impl NotificationChannel for MockNotificationChannel {
    fn kind(&self) -> ChannelKind {
        self.kind
    }

    async fn deliver(&self, record: &NotificationRecord) -> Result<(), ChannelError> {
        if self.simulate_failure {
            tracing::warn!(
                channel = %self.kind,
                notification_id = %record.id,
                "Mock channel simulating failure"
            );
            return Err(ChannelError::Unavailable("Simulated failure".to_string()));
        }
        self.delivered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
        Ok(())
    }
}

/// Keyed on `(kind, title)`; one notification per key per cooldown period.
/// `None` when the cooldown is zero.
struct CooldownLimiter(Option<DefaultKeyedRateLimiter<String>>);

impl CooldownLimiter {
    fn new(cooldown_minutes: u64) -> Self {
        Self(
            Quota::with_period(Duration::from_secs(cooldown_minutes * 60))
                .map(GovRateLimiter::keyed),
        )
    }

    /// Returns true when `key` may fire now.
    fn allow(&self, key: &str) -> bool {
        self.0
            .as_ref()
            .map_or(true, |limiter| limiter.check_key(&key.to_string()).is_ok())
    }

    /// Drop keys whose cooldown has elapsed.
    fn shrink(&self) -> usize {
        self.0.as_ref().map_or(0, |limiter| {
            limiter.retain_recent();
            limiter.shrink_to_fit();
            limiter.len()
        })
    }

    fn len(&self) -> usize {
        self.0.as_ref().map_or(0, |limiter| limiter.len())
    }
}

/// Parameters for a single notification.
struct Alert {
    kind: NotificationKind,
    title: String,
    message: String,
    severity: Severity,
    source: String,
    error: Option<NotificationError>,
    context: Option<Map<String, JsonValue>>,
    // Work items skip the severity threshold and the cooldown.
    work_item: bool,
}

/// Rate-limited, multi-channel operator alerting.
pub struct NotificationDispatcher {
    config: NotificationConfig,
    audit: Arc<AuditTrail>,
    channels: Vec<Arc<dyn NotificationChannel>>,
    cooldown: CooldownLimiter,
    history: RwLock<VecDeque<NotificationRecord>>,
    stats: Mutex<NotificationStatistics>,
}

impl NotificationDispatcher {
    /// Create a dispatcher and register it as the audit trail's alert sink.
    ///
    /// Only channels whose kind is enabled in `config` receive notifications.
    pub fn new(
        config: NotificationConfig,
        audit: Arc<AuditTrail>,
        channels: Vec<Arc<dyn NotificationChannel>>,
    ) -> Arc<Self> {
        let channels = channels
            .into_iter()
            .filter(|c| config.channels.contains(&c.kind()))
            .collect();
        let dispatcher = Arc::new(Self {
            cooldown: CooldownLimiter::new(config.rate_limit_minutes),
            config,
            audit: audit.clone(),
            channels,
            history: RwLock::new(VecDeque::new()),
            stats: Mutex::new(NotificationStatistics::default()),
        });
        let sink: Arc<dyn AuditAlertSink> = dispatcher.clone();
        audit.attach_alert_sink(Arc::downgrade(&sink));
        dispatcher
    }

    pub fn config(&self) -> &NotificationConfig {
        &self.config
    }

    /// Alert operators about an error.
    pub async fn notify_error(
        &self,
        error: &QuoteError,
        context: Option<Map<String, JsonValue>>,
        audit_entry: Option<&AuditLogEntry>,
    ) -> DispatchOutcome {
        let mut context = context.unwrap_or_default();
        if let Some(entry) = audit_entry {
            context.insert("audit_id".to_string(), json!(entry.id));
            context.insert("operation".to_string(), json!(entry.operation));
        }

        self.dispatch(Alert {
            kind: NotificationKind::Error,
            title: format!("{} error", error.code()),
            message: error.to_string(),
            severity: error.severity(),
            source: audit_entry
                .map(|e| e.operation.as_str().to_string())
                .unwrap_or_else(|| "quote-desk".to_string()),
            error: Some(NotificationError {
                code: error.code().as_str().to_string(),
                message: error.to_string(),
                detail: Some(format!("{:?}", error)),
            }),
            context: Some(context),
            work_item: false,
        })
        .await
    }

    pub async fn notify_system_issue(
        &self,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
        severity: Severity,
        context: Option<Map<String, JsonValue>>,
    ) -> DispatchOutcome {
        self.dispatch(Alert {
            kind,
            title: title.into(),
            message: message.into(),
            severity,
            source: "system".to_string(),
            error: None,
            context,
            work_item: false,
        })
        .await
    }

    pub async fn notify_performance_degradation(
        &self,
        operation: &str,
        duration: Duration,
        threshold: Duration,
    ) -> DispatchOutcome {
        let mut context = Map::new();
        context.insert("duration_ms".to_string(), json!(duration.as_millis() as u64));
        context.insert("threshold_ms".to_string(), json!(threshold.as_millis() as u64));

        self.notify_system_issue(
            NotificationKind::PerformanceDegradation,
            format!("Slow operation: {}", operation),
            format!(
                "{} took {} ms (threshold {} ms)",
                operation,
                duration.as_millis(),
                threshold.as_millis()
            ),
            Severity::Warning,
            Some(context),
        )
        .await
    }

    pub async fn notify_configuration_issue(
        &self,
        setting: &str,
        message: impl Into<String>,
    ) -> DispatchOutcome {
        let mut context = Map::new();
        context.insert("setting".to_string(), json!(setting));

        self.notify_system_issue(
            NotificationKind::ConfigurationIssue,
            format!("Configuration issue: {}", setting),
            message,
            Severity::Warning,
            Some(context),
        )
        .await
    }

    /// Operator work item for a submission queued for approval.
    ///
    /// Delivered regardless of the severity threshold and the cooldown.
    pub async fn notify_submission_pending(
        &self,
        submission_id: Uuid,
        summary: impl Into<String>,
        mut context: Map<String, JsonValue>,
    ) -> DispatchOutcome {
        context.insert("submission_id".to_string(), json!(submission_id));
        self.dispatch(Alert {
            kind: NotificationKind::SubmissionPending,
            title: "Submission pending approval".to_string(),
            message: format!("{} ({})", summary.into(), submission_id),
            severity: Severity::Info,
            source: "submission".to_string(),
            error: None,
            context: Some(context),
            work_item: true,
        })
        .await
    }

    async fn dispatch(&self, alert: Alert) -> DispatchOutcome {
        if !self.config.enabled {
            self.with_stats(|s| s.suppressed += 1);
            return DispatchOutcome::Disabled;
        }
        if !alert.work_item && alert.severity < self.config.severity_threshold {
            self.with_stats(|s| s.suppressed += 1);
            return DispatchOutcome::BelowThreshold;
        }

        let key = format!("{}:{}", alert.kind, alert.title);
        if !alert.work_item && !self.cooldown.allow(&key) {
            self.with_stats(|s| s.rate_limited += 1);
            metrics::counter!("notifications_total", "outcome" => "rate_limited").increment(1);
            tracing::debug!(key = %key, "Notification rate limited");
            self.audit
                .record(
                    AuditEntryBuilder::new(
                        AuditOperation::NotificationRateLimited,
                        EntityKind::Notification,
                    )
                    .entity(key)
                    .detail("severity", alert.severity.as_str())
                    .result(AuditResult::Warning)
                    .build(),
                )
                .await;
            return DispatchOutcome::RateLimited;
        }

        let record = self.build_record(alert);
        {
            let mut history = self.history.write().await;
            history.push_front(record.clone());
            history.truncate(self.config.history_limit);
        }

        let mut delivered = Vec::new();
        let mut failed = Vec::new();
        for channel in &self.channels {
            match channel.deliver(&record).await {
                Ok(()) => delivered.push(channel.kind()),
                Err(e) => {
                    tracing::warn!(
                        channel = %channel.kind(),
                        notification_id = %record.id,
                        error = %e,
                        "Notification channel failed"
                    );
                    failed.push(ChannelFailure {
                        channel: channel.kind(),
                        error: e.to_string(),
                    });
                }
            }
        }

        let history_size = self.history.read().await.len();
        self.with_stats(|s| {
            s.dispatched += 1;
            s.channel_failures += failed.len() as u64;
            *s.by_severity
                .entry(record.severity.as_str().to_string())
                .or_insert(0) += 1;
            *s.by_kind.entry(record.kind.as_str().to_string()).or_insert(0) += 1;
            s.history_size = history_size;
        });
        metrics::counter!("notifications_total", "outcome" => "dispatched").increment(1);

        let result = match (delivered.is_empty(), failed.is_empty()) {
            (_, true) => AuditResult::Success,
            (false, false) => AuditResult::Warning,
            (true, false) => AuditResult::Failure,
        };
        self.audit
            .record(
                AuditEntryBuilder::new(AuditOperation::NotificationSent, EntityKind::Notification)
                    .entity(record.id.to_string())
                    .detail("kind", record.kind.as_str())
                    .detail("title", record.title.clone())
                    .detail("severity", record.severity.as_str())
                    .detail("delivered", json!(delivered))
                    .detail("failed", json!(failed))
                    .result(result)
                    .build(),
            )
            .await;

        DispatchOutcome::Dispatched {
            notification_id: record.id,
            delivered,
            failed,
        }
    }

    fn build_record(&self, alert: Alert) -> NotificationRecord {
        let error = alert.error.map(|mut e| {
            if !self.config.include_stack_trace {
                e.detail = None;
            }
            e
        });
        let context = alert
            .context
            .filter(|c| self.config.include_context && !c.is_empty());

        NotificationRecord {
            id: Uuid::new_v4(),
            kind: alert.kind,
            title: alert.title,
            message: alert.message,
            severity: alert.severity,
            timestamp: Utc::now(),
            source: alert.source,
            error,
            context,
        }
    }

    fn with_stats(&self, f: impl FnOnce(&mut NotificationStatistics)) {
        f(&mut self.stats.lock().unwrap_or_else(PoisonError::into_inner));
    }

    /// Most recent notifications first.
    pub async fn history(&self, limit: Option<usize>) -> Vec<NotificationRecord> {
        self.history
            .read()
            .await
            .iter()
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }

    /// Release cooldown keys that have expired; returns the keys still held.
    pub fn shrink_cooldowns(&self) -> usize {
        self.cooldown.shrink()
    }

    pub fn cooldown_keys(&self) -> usize {
        self.cooldown.len()
    }

    pub async fn statistics(&self) -> NotificationStatistics {
        let history_size = self.history.read().await.len();
        let mut stats = self
            .stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        stats.history_size = history_size;
        stats
    }
}

#[async_trait::async_trait]
impl AuditAlertSink for NotificationDispatcher {
    async fn alert(&self, entry: &AuditLogEntry) {
        let Some(error) = &entry.error else {
            return;
        };

        let mut context = Map::new();
        context.insert("audit_id".to_string(), json!(entry.id));
        context.insert("entity_kind".to_string(), json!(entry.entity_kind));
        if let Some(id) = &entry.entity_id {
            context.insert("entity_id".to_string(), json!(id));
        }
        context.extend(entry.details.clone());

        self.dispatch(Alert {
            kind: NotificationKind::Error,
            title: format!("{} error", error.code),
            message: error.message.clone(),
            severity: error.severity,
            source: entry.operation.as_str().to_string(),
            error: Some(NotificationError {
                code: error.code.as_str().to_string(),
                message: error.message.clone(),
                detail: Some(format!("{:?}", error)),
            }),
            context: Some(context),
            work_item: false,
        })
        .await;
    }
}
