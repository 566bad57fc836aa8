//! In-memory stores and senders.
//!
//! Used by unit tests and by the HTTP integration tests of the api crate.

use chrono::Utc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};
use uuid::Uuid;

use crate::errors::QuoteError;
use crate::models::{
    FallbackKind, FormKind, Modality, NewSubmission, SubmissionRecord, SubmissionStatus, Template,
};
use crate::services::submission::{
    DeliveryError, MessageSender, OutboundMessage, SubmissionStore,
};
use crate::services::template_resolution::TemplateStore;

/// Per-method call counters of [`InMemoryTemplateStore`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TemplateStoreCalls {
    pub find_bound: u32,
    pub find_any_for_form: u32,
    pub find_active_by_id: u32,
    pub bound_ids: u32,
    pub list_bound: u32,
    pub insert: u32,
}

#[derive(Debug, Default)]
struct TemplateState {
    templates: Vec<Template>,
    calls: TemplateStoreCalls,
    failures_remaining: u32,
}

/// Template store backed by a vector.
#[derive(Debug, Default)]
pub struct InMemoryTemplateStore {
    state: Mutex<TemplateState>,
}

impl InMemoryTemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a template directly, bypassing call counting.
    pub fn seed(&self, template: Template) -> Template {
        self.lock().templates.push(template.clone());
        template
    }

    pub fn calls(&self) -> TemplateStoreCalls {
        self.lock().calls
    }

    /// Fail the next `n` store calls with a database error.
    pub fn fail_next(&self, n: u32) {
        self.lock().failures_remaining = n;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TemplateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Count the call and apply any injected failure.
    fn call<T>(
        &self,
        operation: &str,
        count: impl FnOnce(&mut TemplateStoreCalls),
        query: impl FnOnce(&[Template]) -> T,
    ) -> Result<T, QuoteError> {
        let mut state = self.lock();
        count(&mut state.calls);
        if state.failures_remaining > 0 {
            state.failures_remaining -= 1;
            return Err(QuoteError::database(operation, "simulated connection failure"));
        }
        Ok(query(&state.templates))
    }
}

fn newest<'a>(templates: impl Iterator<Item = &'a Template>) -> Option<Template> {
    templates.max_by_key(|t| t.created_at).cloned()
}

#[async_trait::async_trait]
impl TemplateStore for InMemoryTemplateStore {
    async fn find_bound(
        &self,
        form: FormKind,
        modality: Option<Modality>,
    ) -> Result<Option<Template>, QuoteError> {
        self.call(
            "find_bound",
            |c| c.find_bound += 1,
            |all| newest(all.iter().filter(|t| t.matches(form, modality))),
        )
    }

    async fn find_any_for_form(&self, form: FormKind) -> Result<Option<Template>, QuoteError> {
        self.call(
            "find_any_for_form",
            |c| c.find_any_for_form += 1,
            |all| {
                newest(
                    all.iter()
                        .filter(|t| t.is_resolvable() && t.form == Some(form)),
                )
            },
        )
    }

    async fn find_active_by_id(&self, id: Uuid) -> Result<Option<Template>, QuoteError> {
        self.call(
            "find_active_by_id",
            |c| c.find_active_by_id += 1,
            |all| all.iter().find(|t| t.id == id && t.active).cloned(),
        )
    }

    async fn bound_ids(
        &self,
        form: FormKind,
        modality: Option<Modality>,
    ) -> Result<Vec<Uuid>, QuoteError> {
        self.call(
            "bound_ids",
            |c| c.bound_ids += 1,
            |all| {
                let mut matching: Vec<&Template> =
                    all.iter().filter(|t| t.matches(form, modality)).collect();
                matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
                matching.into_iter().map(|t| t.id).collect()
            },
        )
    }

    async fn list_bound(&self) -> Result<Vec<Template>, QuoteError> {
        self.call(
            "list_bound",
            |c| c.list_bound += 1,
            |all| {
                let mut bound: Vec<Template> = all
                    .iter()
                    .filter(|t| t.is_resolvable() && t.form.is_some() && t.modality.is_some())
                    .cloned()
                    .collect();
                bound.sort_by(|a, b| (a.form, a.modality).cmp(&(b.form, b.modality)));
                bound
            },
        )
    }

    async fn insert(&self, template: Template) -> Result<Template, QuoteError> {
        self.call("insert_template", |c| c.insert += 1, |_| ())?;
        self.lock().templates.push(template.clone());
        Ok(template)
    }
}

#[derive(Debug, Default)]
struct SubmissionState {
    records: Vec<SubmissionRecord>,
    fail_inserts: bool,
}

/// Submission store backed by a vector.
#[derive(Debug, Default)]
pub struct InMemorySubmissionStore {
    state: Mutex<SubmissionState>,
}

impl InMemorySubmissionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<SubmissionRecord> {
        self.lock().records.clone()
    }

    /// Make every insert fail with a database error until reset.
    pub fn fail_inserts(&self, fail: bool) {
        self.lock().fail_inserts = fail;
    }

    /// Store a placeholder record under `key`, as if a previous process
    /// had already handled it.
    pub fn seed_key(&self, key: &str) -> SubmissionRecord {
        let record = SubmissionRecord::from_new(
            NewSubmission {
                idempotency_key: key.to_string(),
                product: FormKind::Erp,
                modality: None,
                company_name: String::new(),
                tax_id: String::new(),
                contact_email: String::new(),
                template_id: Uuid::nil(),
                fallback_kind: FallbackKind::Specific,
                subject: String::new(),
                body: String::new(),
                status: SubmissionStatus::PendingApproval,
                payload: serde_json::Value::Null,
            },
            Utc::now(),
        );
        self.lock().records.push(record.clone());
        record
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SubmissionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait::async_trait]
impl SubmissionStore for InMemorySubmissionStore {
    async fn find_by_idempotency_key(
        &self,
        key: &str,
    ) -> Result<Option<SubmissionRecord>, QuoteError> {
        Ok(self
            .lock()
            .records
            .iter()
            .find(|r| r.idempotency_key == key)
            .cloned())
    }

    async fn insert(&self, submission: NewSubmission) -> Result<SubmissionRecord, QuoteError> {
        let mut state = self.lock();
        if state.fail_inserts {
            return Err(QuoteError::database(
                "insert_submission",
                "simulated connection failure",
            ));
        }
        if state
            .records
            .iter()
            .any(|r| r.idempotency_key == submission.idempotency_key)
        {
            return Err(QuoteError::DuplicateSubmission {
                idempotency_key: submission.idempotency_key,
                existing_id: None,
            });
        }
        let record = SubmissionRecord::from_new(submission, Utc::now());
        state.records.push(record.clone());
        Ok(record)
    }
}

/// Message sender that records what it sends, for development and testing.
#[derive(Debug, Default)]
pub struct MockMessageSender {
    sent: Mutex<Vec<OutboundMessage>>,
    attempts: AtomicU32,
    transient_failures: AtomicU32,
    reject: bool,
}

impl MockMessageSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the first `n` sends with a transient error.
    pub fn failing_transiently(n: u32) -> Self {
        Self {
            transient_failures: AtomicU32::new(n),
            ..Self::default()
        }
    }

    /// Reject every send permanently.
    pub fn rejecting() -> Self {
        Self {
            reject: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl MessageSender for MockMessageSender {
    async fn send(&self, message: &OutboundMessage) -> Result<(), DeliveryError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.reject {
            return Err(DeliveryError::Rejected(format!(
                "recipient {} refused",
                message.to
            )));
        }
        let remaining = self.transient_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.transient_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(DeliveryError::Transient("mailbox busy".to_string()));
        }

        tracing::info!(to = %message.to, subject = %message.subject, "Mock: Would send quote");
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.clone());
        Ok(())
    }
}
