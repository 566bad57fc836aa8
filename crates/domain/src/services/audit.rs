//! Audit trail for resolution, validation, recovery and submission operations.
//!
//! Entries are kept in memory, pruned by age and count after every write, and
//! optionally mirrored to a persistent [`AuditLogStore`]. Entries carrying an
//! error of severity `error` or above are forwarded to the attached
//! [`AuditAlertSink`].

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde_json::{Map, Value as JsonValue};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, PoisonError, RwLock as StdRwLock, Weak};
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::errors::QuoteError;
use crate::models::{
    modality_label, AuditConfig, AuditError, AuditLogEntry, AuditOperation, AuditQuery,
    AuditResult, AuditStatistics, EntityKind, FallbackKind, FormKind, Modality, NewAuditEntry,
    Severity,
};

/// Receives audit entries whose error is severe enough to alert operators.
#[async_trait::async_trait]
pub trait AuditAlertSink: Send + Sync {
    async fn alert(&self, entry: &AuditLogEntry);
}

/// Persistent mirror of the audit trail.
#[async_trait::async_trait]
pub trait AuditLogStore: Send + Sync {
    async fn append(&self, entry: &AuditLogEntry) -> Result<(), QuoteError>;

    /// Deletes entries older than `cutoff`, returning how many were removed.
    async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, QuoteError>;
}

/// Builder for audit entries with a fluent API.
#[derive(Debug, Clone)]
pub struct AuditEntryBuilder {
    operation: AuditOperation,
    entity_kind: EntityKind,
    entity_id: Option<String>,
    actor_id: Option<String>,
    details: Map<String, JsonValue>,
    result: AuditResult,
    duration_ms: Option<u64>,
    error: Option<AuditError>,
}

impl AuditEntryBuilder {
    /// Start a successful entry for the given operation.
    pub fn new(operation: AuditOperation, entity_kind: EntityKind) -> Self {
        Self {
            operation,
            entity_kind,
            entity_id: None,
            actor_id: None,
            details: Map::new(),
            result: AuditResult::Success,
            duration_ms: None,
            error: None,
        }
    }

    pub fn entity(mut self, id: impl Into<String>) -> Self {
        self.entity_id = Some(id.into());
        self
    }

    pub fn actor(mut self, id: impl Into<String>) -> Self {
        self.actor_id = Some(id.into());
        self
    }

    pub fn detail(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    pub fn details(mut self, details: Map<String, JsonValue>) -> Self {
        self.details.extend(details);
        self
    }

    pub fn result(mut self, result: AuditResult) -> Self {
        self.result = result;
        self
    }

    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration_ms = Some(duration.as_millis() as u64);
        self
    }

    /// Attach an error and mark the entry as a failure.
    pub fn failure(mut self, error: &QuoteError) -> Self {
        self.result = AuditResult::Failure;
        self.error = Some(AuditError::from(error));
        self
    }

    pub fn build(self) -> NewAuditEntry {
        NewAuditEntry {
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

/// Append-only, queryable audit trail.
pub struct AuditTrail {
    config: AuditConfig,
    // Oldest at the front.
    entries: RwLock<VecDeque<AuditLogEntry>>,
    alert_sink: StdRwLock<Option<Weak<dyn AuditAlertSink>>>,
    store: Option<Arc<dyn AuditLogStore>>,
}

impl AuditTrail {
    pub fn new(config: AuditConfig) -> Self {
        Self {
            config,
            entries: RwLock::new(VecDeque::new()),
            alert_sink: StdRwLock::new(None),
            store: None,
        }
    }

    /// Mirror every entry to a persistent store.
    pub fn with_store(mut self, store: Arc<dyn AuditLogStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Attach the sink that receives entries with severe errors.
    pub fn attach_alert_sink(&self, sink: Weak<dyn AuditAlertSink>) {
        *self
            .alert_sink
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(sink);
    }

    pub fn config(&self) -> &AuditConfig {
        &self.config
    }

    /// Record an entry, prune, mirror, and run the severity check.
    pub async fn record(&self, input: NewAuditEntry) -> AuditLogEntry {
        let now = Utc::now();
        let entry = input.into_entry(now);

        {
            let mut entries = self.entries.write().await;
            entries.push_back(entry.clone());
            self.prune(&mut entries, now);
        }

        metrics::counter!(
            "audit_entries_total",
            "operation" => entry.operation.as_str(),
            "result" => entry.result.as_str()
        )
        .increment(1);

        tracing::debug!(
            audit_id = %entry.id,
            operation = %entry.operation,
            entity_kind = %entry.entity_kind,
            entity_id = ?entry.entity_id,
            result = %entry.result,
            "Audit entry recorded"
        );

        if let Some(store) = &self.store {
            if let Err(e) = store.append(&entry).await {
                tracing::warn!(
                    audit_id = %entry.id,
                    error = %e,
                    "Failed to persist audit entry"
                );
            }
        }

        self.check_severity(&entry).await;
        entry
    }

    fn prune(&self, entries: &mut VecDeque<AuditLogEntry>, now: DateTime<Utc>) {
        let cutoff = now - ChronoDuration::days(i64::from(self.config.retention_days));
        while entries.front().is_some_and(|e| e.timestamp < cutoff) {
            entries.pop_front();
        }
        while entries.len() > self.config.max_entries {
            entries.pop_front();
        }
    }

    async fn check_severity(&self, entry: &AuditLogEntry) {
        if entry.operation.is_notification_bookkeeping() {
            return;
        }
        if !entry.error_severity().is_some_and(|s| s >= Severity::Error) {
            return;
        }

        let sink = self
            .alert_sink
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .and_then(Weak::upgrade);

        if let Some(sink) = sink {
            sink.alert(entry).await;
        }
    }

    /// Entries matching `filter`, newest first.
    pub async fn query(&self, filter: &AuditQuery) -> Vec<AuditLogEntry> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .rev()
            .filter(|e| filter.matches(e))
            .take(filter.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }

    /// Aggregate statistics, optionally restricted to entries newer than `since`.
    pub async fn statistics(&self, since: Option<DateTime<Utc>>) -> AuditStatistics {
        let entries = self.entries.read().await;
        let scoped: Vec<&AuditLogEntry> = entries
            .iter()
            .filter(|e| since.map_or(true, |s| e.timestamp >= s))
            .collect();

        let total = scoped.len();
        if total == 0 {
            return AuditStatistics::default();
        }

        let count = |result: AuditResult| scoped.iter().filter(|e| e.result == result).count();
        let rate = |n: usize| n as f64 / total as f64;

        let mut per_operation = BTreeMap::new();
        let mut per_error_code = BTreeMap::new();
        let mut duration_sum = 0u64;
        let mut duration_count = 0u64;

        for entry in &scoped {
            *per_operation
                .entry(entry.operation.as_str().to_string())
                .or_insert(0) += 1;
            if let Some(error) = &entry.error {
                *per_error_code
                    .entry(error.code.as_str().to_string())
                    .or_insert(0) += 1;
            }
            if let Some(ms) = entry.duration_ms {
                duration_sum += ms;
                duration_count += 1;
            }
        }

        AuditStatistics {
            total,
            success_rate: rate(count(AuditResult::Success)),
            error_rate: rate(count(AuditResult::Failure)),
            warning_rate: rate(count(AuditResult::Warning)),
            per_operation,
            per_error_code,
            avg_duration_ms: (duration_count > 0)
                .then(|| duration_sum as f64 / duration_count as f64),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Prune the persistent mirror past the retention window.
    pub async fn prune_persisted(&self) -> Result<u64, QuoteError> {
        match &self.store {
            Some(store) => {
                let cutoff =
                    Utc::now() - ChronoDuration::days(i64::from(self.config.retention_days));
                store.prune_older_than(cutoff).await
            }
            None => Ok(0),
        }
    }

    pub async fn log_template_search(
        &self,
        form: FormKind,
        modality: Option<Modality>,
        found: Option<Uuid>,
        duration: Duration,
    ) -> AuditLogEntry {
        let builder = AuditEntryBuilder::new(AuditOperation::TemplateSearch, EntityKind::Template)
            .detail("form", form.as_str())
            .detail("modality", modality_label(&modality))
            .detail("found", found.is_some())
            .duration(duration);
        let builder = match found {
            Some(id) => builder.entity(id.to_string()),
            None => builder.result(AuditResult::Warning),
        };
        self.record(builder.build()).await
    }

    pub async fn log_fallback_used(
        &self,
        form: FormKind,
        modality: Option<Modality>,
        kind: FallbackKind,
        template_id: Uuid,
        reason: &str,
    ) -> AuditLogEntry {
        let entry = AuditEntryBuilder::new(AuditOperation::FallbackUsed, EntityKind::Template)
            .entity(template_id.to_string())
            .detail("form", form.as_str())
            .detail("modality", modality_label(&modality))
            .detail("fallback_kind", kind.as_str())
            .detail("reason", reason)
            .result(AuditResult::Warning)
            .build();
        self.record(entry).await
    }

    pub async fn log_validation(
        &self,
        form: FormKind,
        modality: Option<Modality>,
        exclude_id: Option<Uuid>,
        unique: bool,
    ) -> AuditLogEntry {
        let mut builder =
            AuditEntryBuilder::new(AuditOperation::MappingValidation, EntityKind::Mapping)
                .entity(format!("{}:{}", form, modality_label(&modality)))
                .detail("unique", unique)
                .result(if unique {
                    AuditResult::Success
                } else {
                    AuditResult::Warning
                });
        if let Some(id) = exclude_id {
            builder = builder.detail("exclude_id", id.to_string());
        }
        self.record(builder.build()).await
    }

    pub async fn log_error(
        &self,
        entity_kind: EntityKind,
        error: &QuoteError,
        details: Map<String, JsonValue>,
    ) -> AuditLogEntry {
        let entry = AuditEntryBuilder::new(AuditOperation::Error, entity_kind)
            .details(details)
            .failure(error)
            .build();
        self.record(entry).await
    }

    /// Record one recovery attempt or its final outcome.
    pub async fn log_recovery(
        &self,
        operation: AuditOperation,
        context: &str,
        attempt: u32,
        strategy: &str,
        duration: Duration,
        error: Option<&QuoteError>,
    ) -> AuditLogEntry {
        let mut builder = AuditEntryBuilder::new(operation, EntityKind::Template)
            .entity(context)
            .detail("attempt", attempt)
            .detail("strategy", strategy)
            .duration(duration);
        builder = match (operation, error) {
            // Intermediate failures stay out of the severity hook.
            (AuditOperation::RecoveryAttempted, Some(err)) => builder
                .detail("error_code", err.code().as_str())
                .detail("error", err.to_string())
                .detail("temporary", err.is_temporary())
                .result(AuditResult::Failure),
            (_, Some(err)) => builder.failure(err),
            (_, None) => builder,
        };
        self.record(builder.build()).await
    }

    pub async fn log_configuration_change(
        &self,
        setting: &str,
        old_value: JsonValue,
        new_value: JsonValue,
        actor_id: Option<&str>,
    ) -> AuditLogEntry {
        let mut builder =
            AuditEntryBuilder::new(AuditOperation::ConfigurationChange, EntityKind::Configuration)
                .entity(setting)
                .detail("old", old_value)
                .detail("new", new_value);
        if let Some(actor) = actor_id {
            builder = builder.actor(actor);
        }
        self.record(builder.build()).await
    }
}
