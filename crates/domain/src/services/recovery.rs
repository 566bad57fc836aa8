//! Bounded retry with exponential backoff and alternate strategies.
//!
//! The executor knows nothing about templates or submissions: callers supply
//! the operation closure, a context label and whichever [`Alternates`] they
//! can offer.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::errors::{ErrorCode, QuoteError};
use crate::models::AuditOperation;
use crate::services::audit::AuditTrail;
use crate::services::notification::NotificationDispatcher;

/// How an operation ultimately produced its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStrategy {
    /// The operation itself succeeded, possibly after retries.
    Retry,
    FallbackToDefault,
    UseCachedResult,
    SkipOperation,
    /// Nothing worked; an operator has to step in.
    ManualInterventionRequired,
}

impl RecoveryStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryStrategy::Retry => "retry",
            RecoveryStrategy::FallbackToDefault => "fallback_to_default",
            RecoveryStrategy::UseCachedResult => "use_cached_result",
            RecoveryStrategy::SkipOperation => "skip_operation",
            RecoveryStrategy::ManualInterventionRequired => "manual_intervention_required",
        }
    }
}

impl std::fmt::Display for RecoveryStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    200
}

fn default_max_delay_ms() -> u64 {
    5_000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_strategies() -> Vec<RecoveryStrategy> {
    vec![
        RecoveryStrategy::FallbackToDefault,
        RecoveryStrategy::UseCachedResult,
        RecoveryStrategy::SkipOperation,
    ]
}

fn default_slow_operation_ms() -> u64 {
    2_000
}

/// Retry and alternate-strategy policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RecoveryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Codes retried even when the error is not flagged temporary.
    #[serde(default)]
    pub retryable_codes: Vec<ErrorCode>,

    /// Alternate strategies tried in order once retries are exhausted.
    #[serde(default = "default_strategies")]
    pub strategies: Vec<RecoveryStrategy>,

    /// Operations slower than this raise a performance alert.
    #[serde(default = "default_slow_operation_ms")]
    pub slow_operation_ms: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
            retryable_codes: Vec::new(),
            strategies: default_strategies(),
            slow_operation_ms: default_slow_operation_ms(),
        }
    }
}

impl RecoveryConfig {
    /// Delay before the attempt following `attempt` (1-based):
    /// `min(base * multiplier^(attempt-1), max)`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay_ms = self.base_delay_ms as f64 * self.multiplier.powi(exponent);
        let delay_ms = delay_ms.min(self.max_delay_ms as f64);
        Duration::from_millis(delay_ms as u64)
    }

    pub fn is_retryable(&self, error: &QuoteError) -> bool {
        error.is_temporary() || self.retryable_codes.contains(&error.code())
    }
}

/// Label and identifiers for the operation being recovered.
#[derive(Debug, Clone, PartialEq)]
pub struct RecoveryContext {
    pub operation: String,
    pub entity_id: Option<String>,
}

impl RecoveryContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            entity_id: None,
        }
    }

    pub fn with_entity(mut self, id: impl Into<String>) -> Self {
        self.entity_id = Some(id.into());
        self
    }

    fn label(&self) -> String {
        match &self.entity_id {
            Some(id) => format!("{}:{}", self.operation, id),
            None => self.operation.clone(),
        }
    }
}

/// A lazily evaluated alternate computation.
pub type AlternateFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, QuoteError>> + Send + 'a>>;

/// Alternate results a caller can offer once retries are exhausted.
///
/// Each strategy only runs when the caller supplied it.
pub struct Alternates<'a, T> {
    fallback_to_default: Option<AlternateFuture<'a, T>>,
    cached: Option<T>,
    skip: Option<T>,
}

impl<'a, T> Default for Alternates<'a, T> {
    fn default() -> Self {
        Self {
            fallback_to_default: None,
            cached: None,
            skip: None,
        }
    }
}

impl<'a, T> Alternates<'a, T> {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn fallback_to_default<F>(mut self, fallback: F) -> Self
    where
        F: Future<Output = Result<T, QuoteError>> + Send + 'a,
    {
        self.fallback_to_default = Some(Box::pin(fallback));
        self
    }

    pub fn cached(mut self, value: T) -> Self {
        self.cached = Some(value);
        self
    }

    /// Value returned when the operation may be skipped altogether.
    pub fn skip_with(mut self, value: T) -> Self {
        self.skip = Some(value);
        self
    }
}

/// Result of [`RecoveryExecutor::execute_with_recovery`].
#[derive(Debug)]
pub struct RecoveryOutcome<T> {
    pub result: Result<T, QuoteError>,
    pub strategy_used: RecoveryStrategy,
    pub attempts: u32,
    pub total_duration: Duration,
}

impl<T> RecoveryOutcome<T> {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn into_result(self) -> Result<T, QuoteError> {
        self.result
    }
}

/// Central retry/backoff executor.
pub struct RecoveryExecutor {
    config: RecoveryConfig,
    audit: Arc<AuditTrail>,
    dispatcher: Arc<NotificationDispatcher>,
}

impl RecoveryExecutor {
    pub fn new(
        config: RecoveryConfig,
        audit: Arc<AuditTrail>,
        dispatcher: Arc<NotificationDispatcher>,
    ) -> Self {
        Self {
            config,
            audit,
            dispatcher,
        }
    }

    pub fn config(&self) -> &RecoveryConfig {
        &self.config
    }

    /// Run `operation` up to `max_retries + 1` times, then the alternates.
    pub async fn execute_with_recovery<T, F, Fut>(
        &self,
        context: &RecoveryContext,
        mut operation: F,
        alternates: Alternates<'_, T>,
    ) -> RecoveryOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, QuoteError>>,
    {
        let started = Instant::now();
        let label = context.label();
        let max_attempts = self.config.max_retries.saturating_add(1);
        let mut attempts = 0;

        let last_error = loop {
            attempts += 1;
            let attempt_started = Instant::now();

            match operation().await {
                Ok(value) => {
                    let elapsed = attempt_started.elapsed();
                    self.audit
                        .log_recovery(
                            AuditOperation::RecoveryAttempted,
                            &label,
                            attempts,
                            RecoveryStrategy::Retry.as_str(),
                            elapsed,
                            None,
                        )
                        .await;
                    if attempts > 1 {
                        self.audit
                            .log_recovery(
                                AuditOperation::RecoverySucceeded,
                                &label,
                                attempts,
                                RecoveryStrategy::Retry.as_str(),
                                started.elapsed(),
                                None,
                            )
                            .await;
                    }
                    return self
                        .finish(context, Ok(value), RecoveryStrategy::Retry, attempts, started)
                        .await;
                }
                Err(err) => {
                    self.audit
                        .log_recovery(
                            AuditOperation::RecoveryAttempted,
                            &label,
                            attempts,
                            RecoveryStrategy::Retry.as_str(),
                            attempt_started.elapsed(),
                            Some(&err),
                        )
                        .await;

                    if attempts >= max_attempts || !self.config.is_retryable(&err) {
                        break err;
                    }

                    let delay = self.config.delay_for_attempt(attempts);
                    tracing::debug!(
                        operation = %label,
                        attempt = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Retrying after transient failure"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        };

        let mut alternates = alternates;
        for strategy in &self.config.strategies {
            let strategy = *strategy;
            let attempt_started = Instant::now();
            let result = match strategy {
                RecoveryStrategy::FallbackToDefault => match alternates.fallback_to_default.take() {
                    Some(fallback) => Some(fallback.await),
                    None => None,
                },
                RecoveryStrategy::UseCachedResult => alternates.cached.take().map(Ok),
                RecoveryStrategy::SkipOperation => alternates.skip.take().map(Ok),
                RecoveryStrategy::Retry | RecoveryStrategy::ManualInterventionRequired => None,
            };

            match result {
                Some(Ok(value)) => {
                    self.audit
                        .log_recovery(
                            AuditOperation::RecoverySucceeded,
                            &label,
                            attempts,
                            strategy.as_str(),
                            attempt_started.elapsed(),
                            None,
                        )
                        .await;
                    tracing::info!(
                        operation = %label,
                        strategy = %strategy,
                        "Recovered with alternate strategy"
                    );
                    return self
                        .finish(context, Ok(value), strategy, attempts, started)
                        .await;
                }
                Some(Err(err)) => {
                    self.audit
                        .log_recovery(
                            AuditOperation::RecoveryAttempted,
                            &label,
                            attempts,
                            strategy.as_str(),
                            attempt_started.elapsed(),
                            Some(&err),
                        )
                        .await;
                }
                None => {}
            }
        }

        self.audit
            .log_recovery(
                AuditOperation::RecoveryFailed,
                &label,
                attempts,
                RecoveryStrategy::ManualInterventionRequired.as_str(),
                started.elapsed(),
                Some(&last_error),
            )
            .await;
        tracing::warn!(
            operation = %label,
            attempts,
            error = %last_error,
            "Recovery exhausted"
        );

        self.finish(
            context,
            Err(last_error),
            RecoveryStrategy::ManualInterventionRequired,
            attempts,
            started,
        )
        .await
    }

    async fn finish<T>(
        &self,
        context: &RecoveryContext,
        result: Result<T, QuoteError>,
        strategy_used: RecoveryStrategy,
        attempts: u32,
        started: Instant,
    ) -> RecoveryOutcome<T> {
        let total_duration = started.elapsed();
        let threshold = Duration::from_millis(self.config.slow_operation_ms);
        if total_duration > threshold {
            self.dispatcher
                .notify_performance_degradation(&context.operation, total_duration, threshold)
                .await;
        }

        metrics::counter!(
            "recovery_outcomes_total",
            "strategy" => strategy_used.as_str()
        )
        .increment(1);

        RecoveryOutcome {
            result,
            strategy_used,
            attempts,
            total_duration,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        AuditConfig, AuditQuery, AuditResult, ChannelKind, NotificationConfig, NotificationKind,
    };
    use crate::services::notification::{MockNotificationChannel, NotificationChannel};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_config() -> RecoveryConfig {
        RecoveryConfig {
            max_retries: 2,
            base_delay_ms: 1,
            max_delay_ms: 4,
            ..Default::default()
        }
    }

    struct Harness {
        audit: Arc<AuditTrail>,
        channel: Arc<MockNotificationChannel>,
        executor: RecoveryExecutor,
    }

    fn harness(config: RecoveryConfig) -> Harness {
        let audit = Arc::new(AuditTrail::new(AuditConfig::default()));
        let channel = Arc::new(MockNotificationChannel::new(ChannelKind::InApp));
        let channels: Vec<Arc<dyn NotificationChannel>> = vec![channel.clone()];
        let dispatcher = NotificationDispatcher::new(
            NotificationConfig::default(),
            audit.clone(),
            channels,
        );
        Harness {
            executor: RecoveryExecutor::new(config, audit.clone(), dispatcher),
            audit,
            channel,
        }
    }

    async fn count(audit: &AuditTrail, operation: AuditOperation) -> usize {
        audit
            .query(&AuditQuery {
                operation: Some(operation),
                ..Default::default()
            })
            .await
            .len()
    }

    #[test]
    fn test_delay_progression_is_capped() {
        let config = RecoveryConfig {
            base_delay_ms: 100,
            max_delay_ms: 1_000,
            multiplier: 2.0,
            ..Default::default()
        };
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(config.delay_for_attempt(3), Duration::from_millis(400));
        assert_eq!(config.delay_for_attempt(5), Duration::from_millis(1_000));
        for attempt in 1..64 {
            assert!(config.delay_for_attempt(attempt) <= Duration::from_millis(1_000));
        }
    }

    #[test]
    fn test_retryable_codes_extend_temporary_errors() {
        let config = RecoveryConfig {
            retryable_codes: vec![ErrorCode::System],
            ..Default::default()
        };
        assert!(config.is_retryable(&QuoteError::database("q", "timeout")));
        assert!(config.is_retryable(&QuoteError::System("flaky".to_string())));
        assert!(!config.is_retryable(&QuoteError::configuration("x", "y")));
    }

    #[tokio::test]
    async fn test_always_temporary_error_uses_all_attempts() {
        let h = harness(fast_config());
        let calls = AtomicU32::new(0);

        let outcome: RecoveryOutcome<()> = h
            .executor
            .execute_with_recovery(
                &RecoveryContext::new("find_specific"),
                || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(QuoteError::database("find_specific", "timeout"))
                },
                Alternates::none(),
            )
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(
            outcome.strategy_used,
            RecoveryStrategy::ManualInterventionRequired
        );
        assert!(matches!(outcome.result, Err(QuoteError::Database { .. })));
        assert_eq!(count(&h.audit, AuditOperation::RecoveryAttempted).await, 3);
        assert_eq!(count(&h.audit, AuditOperation::RecoveryFailed).await, 1);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let h = harness(fast_config());
        let calls = AtomicU32::new(0);

        let outcome: RecoveryOutcome<()> = h
            .executor
            .execute_with_recovery(
                &RecoveryContext::new("validate"),
                || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(QuoteError::DuplicateSubmission {
                        idempotency_key: "k".to_string(),
                        existing_id: None,
                    })
                },
                Alternates::none(),
            )
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.attempts, 1);
        assert!(!outcome.is_success());
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let h = harness(fast_config());
        let calls = AtomicU32::new(0);

        let outcome = h
            .executor
            .execute_with_recovery(
                &RecoveryContext::new("find_specific").with_entity("erp:saas"),
                || async {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(QuoteError::database("find_specific", "timeout"))
                    } else {
                        Ok(42)
                    }
                },
                Alternates::none(),
            )
            .await;

        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.strategy_used, RecoveryStrategy::Retry);
        assert_eq!(outcome.into_result(), Ok(42));
        assert_eq!(count(&h.audit, AuditOperation::RecoverySucceeded).await, 1);
        // Intermediate failures do not alert operators.
        assert!(h.channel.delivered().is_empty());
    }

    #[tokio::test]
    async fn test_alternates_run_in_configured_order() {
        let h = harness(fast_config());

        let outcome = h
            .executor
            .execute_with_recovery(
                &RecoveryContext::new("resolve"),
                || async { Err(QuoteError::database("resolve", "down")) },
                Alternates::none().cached("cached").skip_with("skipped"),
            )
            .await;

        assert_eq!(outcome.strategy_used, RecoveryStrategy::UseCachedResult);
        assert_eq!(outcome.result, Ok("cached"));
    }

    #[tokio::test]
    async fn test_failed_fallback_moves_to_next_strategy() {
        let h = harness(RecoveryConfig {
            max_retries: 0,
            ..fast_config()
        });

        let outcome = h
            .executor
            .execute_with_recovery(
                &RecoveryContext::new("resolve"),
                || async { Err(QuoteError::database("resolve", "down")) },
                Alternates::none()
                    .fallback_to_default(async { Err(QuoteError::System("no default".into())) })
                    .skip_with(0),
            )
            .await;

        assert_eq!(outcome.strategy_used, RecoveryStrategy::SkipOperation);
        assert_eq!(outcome.result, Ok(0));
    }

    #[tokio::test]
    async fn test_exhausted_recovery_alerts_once() {
        let h = harness(fast_config());

        let _: RecoveryOutcome<()> = h
            .executor
            .execute_with_recovery(
                &RecoveryContext::new("find_specific"),
                || async { Err(QuoteError::database("find_specific", "timeout")) },
                Alternates::none(),
            )
            .await;

        let failed = h
            .audit
            .query(&AuditQuery {
                operation: Some(AuditOperation::RecoveryFailed),
                ..Default::default()
            })
            .await;
        assert_eq!(failed[0].result, AuditResult::Failure);
        assert_eq!(h.channel.delivered().len(), 1);
    }

    #[tokio::test]
    async fn test_slow_operation_raises_performance_alert() {
        let h = harness(RecoveryConfig {
            slow_operation_ms: 0,
            ..fast_config()
        });

        let outcome = h
            .executor
            .execute_with_recovery(
                &RecoveryContext::new("list_mappings"),
                || async {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    Ok(())
                },
                Alternates::none(),
            )
            .await;

        assert!(outcome.is_success());
        let delivered = h.channel.delivered();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].kind, NotificationKind::PerformanceDegradation);
    }
}
