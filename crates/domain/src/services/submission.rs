//! Submission coordinator: idempotency, locking and orchestration of a quote
//! request from resolution to persistence or direct delivery.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map};
use shared::placeholders::render;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::errors::QuoteError;
use crate::models::{
    modality_label, AuditOperation, EntityKind, FormKind, NewSubmission, QuoteRequest,
    ResolutionResult, SubmissionRecord, SubmissionStatus, Template,
};
use crate::services::audit::{AuditEntryBuilder, AuditTrail};
use crate::services::locks::{IdempotencyRegistry, SubmissionLocks};
use crate::services::notification::NotificationDispatcher;
use crate::services::recovery::{Alternates, RecoveryContext, RecoveryExecutor};
use crate::services::template_resolution::TemplateResolver;

/// Persisted submissions, keyed by idempotency key.
#[async_trait::async_trait]
pub trait SubmissionStore: Send + Sync {
    async fn find_by_idempotency_key(
        &self,
        key: &str,
    ) -> Result<Option<SubmissionRecord>, QuoteError>;

    async fn insert(&self, submission: NewSubmission) -> Result<SubmissionRecord, QuoteError>;
}

/// Failure reported by the outbound send capability.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DeliveryError {
    #[error("Transient delivery failure: {0}")]
    Transient(String),

    #[error("Delivery rejected: {0}")]
    Rejected(String),
}

impl From<DeliveryError> for QuoteError {
    fn from(err: DeliveryError) -> Self {
        QuoteError::DeliveryFailed {
            temporary: matches!(err, DeliveryError::Transient(_)),
            message: err.to_string(),
        }
    }
}

/// A fully rendered message ready for delivery.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Outbound send-a-message capability.
#[async_trait::async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(&self, message: &OutboundMessage) -> Result<(), DeliveryError>;
}

fn default_lock_timeout_secs() -> u64 {
    30
}

fn default_send_lock_timeout_secs() -> u64 {
    15
}

fn default_acquire_wait_ms() -> u64 {
    2_000
}

/// Lock timing for the submission critical section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SubmissionConfig {
    /// Hold timeout of `submission:<key>` locks.
    #[serde(default = "default_lock_timeout_secs")]
    pub lock_timeout_secs: u64,

    /// Hold timeout of `send:<key>` locks on the direct path.
    #[serde(default = "default_send_lock_timeout_secs")]
    pub send_lock_timeout_secs: u64,

    /// Bounded wait when acquiring either lock.
    #[serde(default = "default_acquire_wait_ms")]
    pub acquire_wait_ms: u64,
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            lock_timeout_secs: default_lock_timeout_secs(),
            send_lock_timeout_secs: default_send_lock_timeout_secs(),
            acquire_wait_ms: default_acquire_wait_ms(),
        }
    }
}

impl SubmissionConfig {
    fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }

    fn send_lock_timeout(&self) -> Duration {
        Duration::from_secs(self.send_lock_timeout_secs)
    }

    fn acquire_wait(&self) -> Duration {
        Duration::from_millis(self.acquire_wait_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SubmissionPath {
    Queued,
    Direct,
}

impl SubmissionPath {
    fn as_str(&self) -> &'static str {
        match self {
            SubmissionPath::Queued => "queued",
            SubmissionPath::Direct => "direct",
        }
    }
}

/// How a request left the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Processed {
    Queued(Uuid),
    /// `None` when the message went out but the record could not be stored.
    Sent(Option<Uuid>),
}

impl Processed {
    fn submission_id(&self) -> Option<Uuid> {
        match self {
            Processed::Queued(id) => Some(*id),
            Processed::Sent(id) => *id,
        }
    }
}

/// Rendered subject and body for a request.
struct RenderedQuote {
    resolution: ResolutionResult,
    template: Template,
    subject: String,
    body: String,
}

/// Entry point of the quote form flow.
pub struct SubmissionCoordinator {
    config: SubmissionConfig,
    resolver: Arc<TemplateResolver>,
    store: Arc<dyn SubmissionStore>,
    sender: Arc<dyn MessageSender>,
    executor: Arc<RecoveryExecutor>,
    audit: Arc<AuditTrail>,
    dispatcher: Arc<NotificationDispatcher>,
    locks: SubmissionLocks,
    idempotency: IdempotencyRegistry,
}

impl SubmissionCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: SubmissionConfig,
        resolver: Arc<TemplateResolver>,
        store: Arc<dyn SubmissionStore>,
        sender: Arc<dyn MessageSender>,
        executor: Arc<RecoveryExecutor>,
        audit: Arc<AuditTrail>,
        dispatcher: Arc<NotificationDispatcher>,
        locks: SubmissionLocks,
    ) -> Self {
        Self {
            config,
            resolver,
            store,
            sender,
            executor,
            audit,
            dispatcher,
            locks,
            idempotency: IdempotencyRegistry::new(),
        }
    }

    pub fn locks(&self) -> &SubmissionLocks {
        &self.locks
    }

    pub fn idempotency(&self) -> &IdempotencyRegistry {
        &self.idempotency
    }

    /// Queue a quote for operator approval, returning the submission id.
    pub async fn submit(
        &self,
        request: &QuoteRequest,
        product: FormKind,
        idempotency_key: Option<String>,
    ) -> Result<Uuid, QuoteError> {
        match self
            .process(request, product, idempotency_key, SubmissionPath::Queued)
            .await?
        {
            Processed::Queued(id) => Ok(id),
            Processed::Sent(_) => Err(QuoteError::System(
                "Queued submission took the direct path".to_string(),
            )),
        }
    }

    /// Send the quote straight to the contact, bypassing approval.
    pub async fn send_directly(
        &self,
        request: &QuoteRequest,
        product: FormKind,
        idempotency_key: Option<String>,
    ) -> Result<bool, QuoteError> {
        self.process(request, product, idempotency_key, SubmissionPath::Direct)
            .await
            .map(|processed| matches!(processed, Processed::Sent(_)))
    }

    async fn process(
        &self,
        request: &QuoteRequest,
        product: FormKind,
        idempotency_key: Option<String>,
        path: SubmissionPath,
    ) -> Result<Processed, QuoteError> {
        let key = idempotency_key.unwrap_or_else(|| request.idempotency_key(product));

        self.audit
            .record(
                AuditEntryBuilder::new(AuditOperation::SubmissionReceived, EntityKind::Submission)
                    .entity(key.clone())
                    .detail("product", product.as_str())
                    .detail("modality", modality_label(&request.modality))
                    .detail("path", path.as_str())
                    .build(),
            )
            .await;

        if !self.idempotency.try_mark(&key) {
            let error = QuoteError::DuplicateSubmission {
                idempotency_key: key.clone(),
                existing_id: None,
            };
            self.record_rejection(&key, path, &error).await;
            return Err(error);
        }

        let result = self.process_marked(request, product, &key, path).await;

        match &result {
            Ok(processed) => {
                let id = processed.submission_id();
                metrics::counter!(
                    "submissions_total",
                    "path" => path.as_str(),
                    "outcome" => "accepted"
                )
                .increment(1);
                self.audit
                    .record(
                        AuditEntryBuilder::new(
                            AuditOperation::SubmissionCompleted,
                            EntityKind::Submission,
                        )
                        .entity(id.map_or_else(|| key.clone(), |id| id.to_string()))
                        .detail("idempotency_key", key.clone())
                        .detail("path", path.as_str())
                        .detail("recorded", id.is_some())
                        .build(),
                    )
                    .await;
                tracing::info!(
                    submission_id = ?id,
                    product = %product,
                    path = path.as_str(),
                    "Quote submission processed"
                );
            }
            Err(error) => {
                self.idempotency.unmark(&key);
                self.record_rejection(&key, path, error).await;
            }
        }

        result
    }

    async fn record_rejection(&self, key: &str, path: SubmissionPath, error: &QuoteError) {
        metrics::counter!(
            "submissions_total",
            "path" => path.as_str(),
            "outcome" => error.code().as_str()
        )
        .increment(1);
        self.audit
            .record(
                AuditEntryBuilder::new(AuditOperation::SubmissionRejected, EntityKind::Submission)
                    .entity(key)
                    .detail("path", path.as_str())
                    .failure(error)
                    .build(),
            )
            .await;
        tracing::warn!(idempotency_key = %key, error = %error, "Quote submission rejected");
    }

    /// Steps run while the idempotency key is marked.
    async fn process_marked(
        &self,
        request: &QuoteRequest,
        product: FormKind,
        key: &str,
        path: SubmissionPath,
    ) -> Result<Processed, QuoteError> {
        let _guard = self
            .locks
            .acquire(
                &format!("submission:{}", key),
                self.config.lock_timeout(),
                self.config.acquire_wait(),
            )
            .await?;

        let existing = self
            .executor
            .execute_with_recovery(
                &RecoveryContext::new("find_submission").with_entity(key),
                || self.store.find_by_idempotency_key(key),
                Alternates::none(),
            )
            .await
            .into_result()?;
        if let Some(existing) = existing {
            return Err(QuoteError::DuplicateSubmission {
                idempotency_key: key.to_string(),
                existing_id: Some(existing.id),
            });
        }

        let rendered = self.render(request, product).await?;

        match path {
            SubmissionPath::Queued => self
                .queue(request, product, key, rendered)
                .await
                .map(Processed::Queued),
            SubmissionPath::Direct => self
                .deliver(request, product, key, rendered)
                .await
                .map(Processed::Sent),
        }
    }

    async fn render(
        &self,
        request: &QuoteRequest,
        product: FormKind,
    ) -> Result<RenderedQuote, QuoteError> {
        let resolution = self
            .resolver
            .resolve_with_fallback(product, request.modality)
            .await?;
        let template = resolution
            .template
            .clone()
            .ok_or(QuoteError::TemplateUnavailable {
                form: product,
                modality: request.modality,
            })?;

        let vars = request.template_variables(product);
        Ok(RenderedQuote {
            subject: render(&template.subject, &vars),
            body: render(&template.body, &vars),
            resolution,
            template,
        })
    }

    fn new_submission(
        &self,
        request: &QuoteRequest,
        product: FormKind,
        key: &str,
        rendered: &RenderedQuote,
        status: SubmissionStatus,
    ) -> Result<NewSubmission, QuoteError> {
        let payload = serde_json::to_value(request)
            .map_err(|e| QuoteError::System(format!("Failed to serialize request: {}", e)))?;
        Ok(NewSubmission {
            idempotency_key: key.to_string(),
            product,
            modality: request.modality,
            company_name: request.company_name.clone(),
            tax_id: request.tax_id.clone(),
            contact_email: request.contact_email.clone(),
            template_id: rendered.template.id,
            fallback_kind: rendered.resolution.fallback_kind,
            subject: rendered.subject.clone(),
            body: rendered.body.clone(),
            status,
            payload,
        })
    }

    async fn insert(&self, submission: NewSubmission) -> Result<SubmissionRecord, QuoteError> {
        let context = RecoveryContext::new("insert_submission")
            .with_entity(submission.idempotency_key.clone());
        self.executor
            .execute_with_recovery(
                &context,
                || self.store.insert(submission.clone()),
                Alternates::none(),
            )
            .await
            .into_result()
    }

    async fn queue(
        &self,
        request: &QuoteRequest,
        product: FormKind,
        key: &str,
        rendered: RenderedQuote,
    ) -> Result<Uuid, QuoteError> {
        let submission = self.new_submission(
            request,
            product,
            key,
            &rendered,
            SubmissionStatus::PendingApproval,
        )?;
        let record = self.insert(submission).await?;

        let mut context = Map::new();
        context.insert("product".to_string(), json!(product));
        context.insert("modality".to_string(), json!(request.modality));
        context.insert("company_name".to_string(), json!(request.company_name));
        context.insert("contact_email".to_string(), json!(request.contact_email));
        context.insert("template_id".to_string(), json!(rendered.template.id));
        context.insert(
            "fallback_kind".to_string(),
            json!(rendered.resolution.fallback_kind),
        );
        self.dispatcher
            .notify_submission_pending(
                record.id,
                format!(
                    "{} requested a {} quote",
                    request.company_name, product
                ),
                context,
            )
            .await;

        Ok(record.id)
    }

    async fn deliver(
        &self,
        request: &QuoteRequest,
        product: FormKind,
        key: &str,
        rendered: RenderedQuote,
    ) -> Result<Option<Uuid>, QuoteError> {
        let _send_guard = self
            .locks
            .acquire(
                &format!("send:{}", key),
                self.config.send_lock_timeout(),
                self.config.acquire_wait(),
            )
            .await?;

        let message = OutboundMessage {
            to: request.contact_email.clone(),
            subject: rendered.subject.clone(),
            body: rendered.body.clone(),
        };
        self.executor
            .execute_with_recovery(
                &RecoveryContext::new("send_quote").with_entity(key),
                || async { self.sender.send(&message).await.map_err(QuoteError::from) },
                Alternates::none(),
            )
            .await
            .into_result()?;

        let submission =
            self.new_submission(request, product, key, &rendered, SubmissionStatus::Sent)?;
        match self.insert(submission).await {
            Ok(record) => Ok(Some(record.id)),
            Err(error) => {
                // Already delivered; keep the key marked so a retry cannot resend.
                let mut details = Map::new();
                details.insert("idempotency_key".to_string(), json!(key));
                details.insert("delivered".to_string(), json!(true));
                self.audit
                    .log_error(EntityKind::Submission, &error, details)
                    .await;
                tracing::error!(
                    idempotency_key = %key,
                    error = %error,
                    "Quote delivered but not recorded"
                );
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        AuditConfig, AuditQuery, AuditResult, ChannelKind, FallbackConfig, Modality,
        NewTemplate, NotificationConfig, NotificationKind,
    };
    use crate::services::in_memory::{
        InMemorySubmissionStore, InMemoryTemplateStore, MockMessageSender,
    };
    use crate::services::notification::{MockNotificationChannel, NotificationChannel};
    use crate::services::recovery::RecoveryConfig;
    use std::collections::BTreeMap;

    struct Harness {
        templates: Arc<InMemoryTemplateStore>,
        submissions: Arc<InMemorySubmissionStore>,
        sender: Arc<MockMessageSender>,
        channel: Arc<MockNotificationChannel>,
        audit: Arc<AuditTrail>,
        coordinator: Arc<SubmissionCoordinator>,
    }

    fn harness_with(sender: MockMessageSender) -> Harness {
        let templates = Arc::new(InMemoryTemplateStore::new());
        let submissions = Arc::new(InMemorySubmissionStore::new());
        let sender = Arc::new(sender);
        let audit = Arc::new(AuditTrail::new(AuditConfig::default()));
        let channel = Arc::new(MockNotificationChannel::new(ChannelKind::InApp));
        let channels: Vec<Arc<dyn NotificationChannel>> = vec![channel.clone()];
        let dispatcher = NotificationDispatcher::new(
            NotificationConfig::default(),
            audit.clone(),
            channels,
        );
        let executor = Arc::new(RecoveryExecutor::new(
            RecoveryConfig {
                max_retries: 2,
                base_delay_ms: 1,
                max_delay_ms: 2,
                ..Default::default()
            },
            audit.clone(),
            dispatcher.clone(),
        ));
        let resolver = Arc::new(TemplateResolver::new(
            templates.clone(),
            FallbackConfig::default(),
            executor.clone(),
            audit.clone(),
            dispatcher.clone(),
        ));
        let coordinator = Arc::new(SubmissionCoordinator::new(
            SubmissionConfig {
                acquire_wait_ms: 50,
                ..Default::default()
            },
            resolver,
            submissions.clone(),
            sender.clone(),
            executor,
            audit.clone(),
            dispatcher,
            SubmissionLocks::new(),
        ));
        Harness {
            templates,
            submissions,
            sender,
            channel,
            audit,
            coordinator,
        }
    }

    fn harness() -> Harness {
        harness_with(MockMessageSender::new())
    }

    fn seed_template(h: &Harness) -> Template {
        h.templates.seed(
            NewTemplate {
                name: "ERP SaaS".to_string(),
                subject: "Quote for {{company_name}}".to_string(),
                body: "Dear {{contact_name}}, {{seats}} seats. {{unknown}}".to_string(),
                description: None,
                active: true,
                bound_to_form: true,
                form: Some(FormKind::Erp),
                modality: Some(Modality::Saas),
            }
            .into_template(),
        )
    }

    fn request() -> QuoteRequest {
        QuoteRequest {
            company_name: "Acme Ltd".to_string(),
            tax_id: "B12345678".to_string(),
            contact_name: "Jo Doe".to_string(),
            contact_email: "jo@acme.test".to_string(),
            phone: None,
            modality: Some(Modality::Saas),
            fields: BTreeMap::from([("seats".to_string(), "25".to_string())]),
            client_reference: None,
        }
    }

    #[tokio::test]
    async fn test_submit_persists_rendered_submission() {
        let h = harness();
        let template = seed_template(&h);

        let id = h
            .coordinator
            .submit(&request(), FormKind::Erp, None)
            .await
            .unwrap();

        let records = h.submissions.records();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.id, id);
        assert_eq!(record.template_id, template.id);
        assert_eq!(record.status, SubmissionStatus::PendingApproval);
        assert_eq!(record.subject, "Quote for Acme Ltd");
        assert_eq!(record.body, "Dear Jo Doe, 25 seats. {{unknown}}");

        let pending = h.channel.delivered();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].kind, NotificationKind::SubmissionPending);

        assert!(h.coordinator.locks().is_empty());
        assert!(h
            .coordinator
            .idempotency()
            .is_marked(&request().idempotency_key(FormKind::Erp)));
    }

    #[tokio::test]
    async fn test_duplicate_submit_is_rejected() {
        let h = harness();
        seed_template(&h);

        h.coordinator
            .submit(&request(), FormKind::Erp, None)
            .await
            .unwrap();
        let err = h
            .coordinator
            .submit(&request(), FormKind::Erp, None)
            .await
            .unwrap_err();

        assert!(matches!(err, QuoteError::DuplicateSubmission { .. }));
        assert_eq!(h.submissions.records().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_identical_submits_yield_one_record() {
        let h = harness();
        seed_template(&h);

        let first = {
            let coordinator = h.coordinator.clone();
            tokio::spawn(async move { coordinator.submit(&request(), FormKind::Erp, None).await })
        };
        let second = {
            let coordinator = h.coordinator.clone();
            tokio::spawn(async move { coordinator.submit(&request(), FormKind::Erp, None).await })
        };

        let results = [first.await.unwrap(), second.await.unwrap()];
        let successes = results.iter().filter(|r| r.is_ok()).count();
        let rejected = results
            .iter()
            .filter(|r| {
                matches!(
                    r,
                    Err(QuoteError::DuplicateSubmission { .. })
                        | Err(QuoteError::LockContention { .. })
                )
            })
            .count();

        assert_eq!(successes, 1);
        assert_eq!(rejected, 1);
        assert_eq!(h.submissions.records().len(), 1);
        assert!(h.coordinator.locks().is_empty());
    }

    #[tokio::test]
    async fn test_different_requests_from_same_company_are_independent() {
        let h = harness();
        seed_template(&h);

        let mut second = request();
        second.fields.insert("seats".to_string(), "50".to_string());

        h.coordinator
            .submit(&request(), FormKind::Erp, None)
            .await
            .unwrap();
        h.coordinator
            .submit(&second, FormKind::Erp, None)
            .await
            .unwrap();
        assert_eq!(h.submissions.records().len(), 2);
    }

    #[tokio::test]
    async fn test_template_unavailable_rolls_back_idempotency() {
        let h = harness();

        let err = h
            .coordinator
            .submit(&request(), FormKind::Erp, None)
            .await
            .unwrap_err();
        assert!(matches!(err, QuoteError::TemplateUnavailable { .. }));
        assert!(h.submissions.records().is_empty());
        assert!(h.coordinator.locks().is_empty());
        assert!(h.coordinator.idempotency().is_empty());

        // A retry after the template appears is accepted.
        seed_template(&h);
        assert!(h
            .coordinator
            .submit(&request(), FormKind::Erp, None)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_store_failure_rolls_back_idempotency() {
        let h = harness();
        seed_template(&h);
        h.submissions.fail_inserts(true);

        let err = h
            .coordinator
            .submit(&request(), FormKind::Erp, None)
            .await
            .unwrap_err();
        assert!(matches!(err, QuoteError::Database { .. }));
        assert!(h.coordinator.idempotency().is_empty());
        assert!(h.coordinator.locks().is_empty());

        h.submissions.fail_inserts(false);
        assert!(h
            .coordinator
            .submit(&request(), FormKind::Erp, None)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_existing_persisted_record_is_detected() {
        let h = harness();
        seed_template(&h);
        let key = request().idempotency_key(FormKind::Erp);
        let existing = h.submissions.seed_key(&key);

        let err = h
            .coordinator
            .submit(&request(), FormKind::Erp, None)
            .await
            .unwrap_err();

        assert_eq!(
            err,
            QuoteError::DuplicateSubmission {
                idempotency_key: key.clone(),
                existing_id: Some(existing.id),
            }
        );
        assert!(err.to_string().contains(&existing.id.to_string()));
        assert!(!h.coordinator.idempotency().is_marked(&key));
    }

    #[tokio::test]
    async fn test_held_lock_yields_contention_and_unmarks() {
        let h = harness();
        seed_template(&h);
        let key = "client-key".to_string();
        let _held = h
            .coordinator
            .locks()
            .try_acquire(&format!("submission:{}", key), Duration::from_secs(30));

        let err = h
            .coordinator
            .submit(&request(), FormKind::Erp, Some(key.clone()))
            .await
            .unwrap_err();
        assert!(matches!(err, QuoteError::LockContention { .. }));
        assert!(!h.coordinator.idempotency().is_marked(&key));
    }

    #[tokio::test]
    async fn test_send_directly_delivers_rendered_message() {
        let h = harness();
        seed_template(&h);

        let sent = h
            .coordinator
            .send_directly(&request(), FormKind::Erp, None)
            .await
            .unwrap();
        assert!(sent);

        let messages = h.sender.sent();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].to, "jo@acme.test");
        assert_eq!(messages[0].subject, "Quote for Acme Ltd");
        assert_eq!(h.submissions.records()[0].status, SubmissionStatus::Sent);
        assert!(h.coordinator.locks().is_empty());
    }

    #[tokio::test]
    async fn test_send_directly_retries_transient_failures() {
        let h = harness_with(MockMessageSender::failing_transiently(2));
        seed_template(&h);

        assert!(h
            .coordinator
            .send_directly(&request(), FormKind::Erp, None)
            .await
            .unwrap());
        assert_eq!(h.sender.attempts(), 3);
        assert_eq!(h.sender.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_send_directly_rejected_is_not_retried() {
        let h = harness_with(MockMessageSender::rejecting());
        seed_template(&h);

        let err = h
            .coordinator
            .send_directly(&request(), FormKind::Erp, None)
            .await
            .unwrap_err();
        assert_eq!(
            err.code(),
            crate::errors::ErrorCode::DeliveryFailed
        );
        assert!(!err.is_temporary());
        assert_eq!(h.sender.attempts(), 1);
        assert!(h.submissions.records().is_empty());
        assert!(h.coordinator.idempotency().is_empty());
        assert!(h.coordinator.locks().is_empty());
    }

    #[tokio::test]
    async fn test_delivered_but_unrecorded_keeps_key_marked() {
        let h = harness();
        seed_template(&h);
        h.submissions.fail_inserts(true);
        let key = request().idempotency_key(FormKind::Erp);

        let sent = h
            .coordinator
            .send_directly(&request(), FormKind::Erp, None)
            .await
            .unwrap();
        assert!(sent);
        assert_eq!(h.sender.sent().len(), 1);
        assert!(h.submissions.records().is_empty());
        assert!(h.coordinator.idempotency().is_marked(&key));

        let completed = h
            .audit
            .query(&AuditQuery {
                operation: Some(AuditOperation::SubmissionCompleted),
                ..Default::default()
            })
            .await;
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].entity_id.as_deref(), Some(key.as_str()));
        assert_eq!(completed[0].details["recorded"], json!(false));

        h.submissions.fail_inserts(false);
        let err = h
            .coordinator
            .send_directly(&request(), FormKind::Erp, None)
            .await
            .unwrap_err();
        assert!(matches!(err, QuoteError::DuplicateSubmission { .. }));
        assert_eq!(h.sender.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_rejections_are_audited() {
        let h = harness();
        let _ = h.coordinator.submit(&request(), FormKind::Erp, None).await;

        let rejected = h
            .audit
            .query(&AuditQuery {
                operation: Some(AuditOperation::SubmissionRejected),
                ..Default::default()
            })
            .await;
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].result, AuditResult::Failure);
    }
}
